//! Severity levels and inclusive ranges over them.

use std::str::FromStr;

use crate::error::CoreError;

/// Eight-level severity, totally ordered in declaration order
/// (`Debug` least severe, `Emergency` most).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Severity {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl Severity {
    pub const ALL: [Severity; 8] = [
        Severity::Debug,
        Severity::Info,
        Severity::Notice,
        Severity::Warning,
        Severity::Error,
        Severity::Critical,
        Severity::Alert,
        Severity::Emergency,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Notice => "notice",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
            Severity::Alert => "alert",
            Severity::Emergency => "emergency",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Severity::Debug),
            "info" => Ok(Severity::Info),
            "notice" => Ok(Severity::Notice),
            "warning" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "critical" => Ok(Severity::Critical),
            "alert" => Ok(Severity::Alert),
            "emergency" => Ok(Severity::Emergency),
            other => Err(CoreError::InvalidArgument(format!("unknown severity `{other}`"))),
        }
    }
}

/// An inclusive `[low, high]` severity range, expanded to explicit
/// severities during condition normalisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeverityRange {
    pub low: Severity,
    pub high: Severity,
}

impl SeverityRange {
    pub fn new(low: Severity, high: Severity) -> Self {
        Self { low, high }
    }

    pub fn expand(&self) -> impl Iterator<Item = Severity> + '_ {
        Severity::ALL.into_iter().filter(move |s| *s >= self.low && *s <= self.high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_debug_below_emergency() {
        assert!(Severity::Debug < Severity::Emergency);
        assert!(Severity::Warning < Severity::Error);
    }

    #[test]
    fn round_trips_through_str() {
        for s in Severity::ALL {
            assert_eq!(s.as_str().parse::<Severity>().unwrap(), s);
        }
    }

    #[test]
    fn range_expands_inclusive() {
        let r = SeverityRange::new(Severity::Info, Severity::Error);
        let expanded: Vec<_> = r.expand().collect();
        assert_eq!(
            expanded,
            vec![Severity::Info, Severity::Notice, Severity::Warning, Severity::Error]
        );
    }

    #[test]
    fn unknown_severity_is_invalid_argument() {
        assert!(matches!("bogus".parse::<Severity>(), Err(CoreError::InvalidArgument(_))));
    }
}
