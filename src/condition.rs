//! Sink conditions, their normalised match-key form, and the diff used to
//! update the index table when a condition changes.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::CoreError;
use crate::severity::{Severity, SeverityRange};

pub type AppName = Arc<str>;
pub type ModuleName = Arc<str>;

/// A single lookup key in the index table. Arity is implied by which of
/// `application`/`module` are present: 1 (severity only), 2 (+application),
/// or 3 (+module). `module.is_some()` without `application.is_some()`
/// never occurs — `Condition::normalise` is the only constructor path and
/// it never produces that shape (see its doc comment).
///
/// `Ord` is derived over the field order `(severity, application, module)`,
/// and `Option`'s derived `Ord` sorts `None` before `Some`, which is
/// exactly the "missing fields sort before present ones" rule the index
/// relies on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MatchKey {
    pub severity: Severity,
    pub application: Option<AppName>,
    pub module: Option<ModuleName>,
}

impl MatchKey {
    pub fn severity_only(severity: Severity) -> Self {
        Self { severity, application: None, module: None }
    }

    pub fn severity_app(severity: Severity, application: AppName) -> Self {
        Self { severity, application: Some(application), module: None }
    }

    pub fn severity_app_module(severity: Severity, application: AppName, module: ModuleName) -> Self {
        Self { severity, application: Some(application), module: Some(module) }
    }

    pub fn arity(&self) -> u8 {
        match (&self.application, &self.module) {
            (None, None) => 1,
            (Some(_), None) => 2,
            (Some(_), Some(_)) => 3,
            (None, Some(_)) => unreachable!("module without application is not a valid match-key"),
        }
    }

    /// The key obtained by dropping fields beyond the given arity.
    pub fn prefix(&self, arity: u8) -> Self {
        match arity {
            1 => Self::severity_only(self.severity),
            2 => Self { severity: self.severity, application: self.application.clone(), module: None },
            _ => self.clone(),
        }
    }
}

/// How a condition's severity component is expressed before normalisation.
#[derive(Debug, Clone)]
pub enum SeveritySpec {
    /// A threshold: covers this severity and everything more severe, same
    /// as `Range(severity, Emergency)`.
    Single(Severity),
    Range(SeverityRange),
    /// An explicit, non-contiguous set of severities — unlike `Single`,
    /// this is an exact match against only the listed severities.
    List(Vec<Severity>),
    /// Every declared severity — the `logi`-style catch-all condition.
    All,
}

/// A sink's install-time or updated condition, in the form callers build.
/// `Condition::normalise` turns this into the canonical [`NormalisedCondition`]
/// the index table actually stores.
#[derive(Debug, Clone)]
pub struct Condition {
    pub severity: SeveritySpec,
    pub application: Option<AppName>,
    pub module: Option<ModuleName>,
}

impl Condition {
    /// A threshold condition: matches `severity` and everything more severe.
    pub fn severity(severity: Severity) -> Self {
        Self { severity: SeveritySpec::Single(severity), application: None, module: None }
    }

    pub fn severities(list: impl IntoIterator<Item = Severity>) -> Self {
        Self { severity: SeveritySpec::List(list.into_iter().collect()), application: None, module: None }
    }

    pub fn range(low: Severity, high: Severity) -> Self {
        Self { severity: SeveritySpec::Range(SeverityRange::new(low, high)), application: None, module: None }
    }

    pub fn all() -> Self {
        Self { severity: SeveritySpec::All, application: None, module: None }
    }

    pub fn with_application(mut self, application: impl Into<AppName>) -> Self {
        self.application = Some(application.into());
        self
    }

    pub fn with_module(mut self, module: impl Into<ModuleName>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// Expands this condition into a sorted, deduplicated set of match
    /// keys. A structured condition naming a `module` without an
    /// `application` has no valid arity-3 shape to produce (arity 3
    /// requires both) and no arity-2 shape either, so it degrades to the
    /// coarsest fully-specified prefix: severity alone. That degrade pins
    /// to the single lowest severity named, rather than re-thresholding
    /// it: the degrade already approximates away the module scoping, and
    /// broadening it to every more-severe level on top of that would
    /// match records the original condition never intended to reach.
    /// This only matters for that one edge case; application-only and
    /// application+module conditions normalise exactly as named.
    pub fn normalise(&self) -> Result<NormalisedCondition, CoreError> {
        let severities = self.expand_severities()?;

        if self.module.is_some() && self.application.is_none() {
            let lowest = severities.into_iter().min().expect("expand_severities never returns an empty list");
            return Ok(NormalisedCondition::canonicalize(vec![MatchKey::severity_only(lowest)]));
        }

        let mut keys = Vec::with_capacity(severities.len());
        for severity in severities {
            let key = match (&self.application, &self.module) {
                (Some(app), Some(module)) => MatchKey::severity_app_module(severity, app.clone(), module.clone()),
                (Some(app), None) => MatchKey::severity_app(severity, app.clone()),
                (None, None) => MatchKey::severity_only(severity),
                (None, Some(_)) => unreachable!("module-without-application handled above"),
            };
            keys.push(key);
        }
        Ok(NormalisedCondition::canonicalize(keys))
    }

    fn expand_severities(&self) -> Result<Vec<Severity>, CoreError> {
        match &self.severity {
            // A bare severity is a threshold, not an exact match: it covers
            // every severity at least as severe, same as `range(s, Emergency)`.
            SeveritySpec::Single(s) => Ok(SeverityRange::new(*s, Severity::Emergency).expand().collect()),
            SeveritySpec::Range(r) => {
                if r.low > r.high {
                    return Err(CoreError::InvalidArgument(format!(
                        "severity range low ({}) is greater than high ({})",
                        r.low, r.high
                    )));
                }
                Ok(r.expand().collect())
            }
            SeveritySpec::List(list) => {
                if list.is_empty() {
                    return Err(CoreError::InvalidArgument("severity list must not be empty".into()));
                }
                Ok(list.clone())
            }
            SeveritySpec::All => Ok(Severity::ALL.to_vec()),
        }
    }
}

/// The canonical, sorted, deduplicated set of match keys a condition
/// expands to. This is what the index table and registry operate on;
/// `Condition` is just the ergonomic constructor for it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NormalisedCondition(Vec<MatchKey>);

impl NormalisedCondition {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn canonicalize(mut keys: Vec<MatchKey>) -> Self {
        keys.sort();
        keys.dedup();
        Self(keys)
    }

    pub fn keys(&self) -> &[MatchKey] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The three-way partition between an old and a new normalised condition:
/// keys only the new one has, keys both share, keys only the old one had.
#[derive(Debug, Clone, Default)]
pub struct Diff {
    pub added: Vec<MatchKey>,
    pub common: Vec<MatchKey>,
    pub removed: Vec<MatchKey>,
}

/// Linear merge of two sorted key lists into a three-way diff.
pub fn diff(new: &NormalisedCondition, old: &NormalisedCondition) -> Diff {
    let (new_keys, old_keys) = (new.keys(), old.keys());
    let mut out = Diff::default();
    let (mut i, mut j) = (0, 0);
    while i < new_keys.len() && j < old_keys.len() {
        match new_keys[i].cmp(&old_keys[j]) {
            Ordering::Less => {
                out.added.push(new_keys[i].clone());
                i += 1;
            }
            Ordering::Greater => {
                out.removed.push(old_keys[j].clone());
                j += 1;
            }
            Ordering::Equal => {
                out.common.push(new_keys[i].clone());
                i += 1;
                j += 1;
            }
        }
    }
    out.added.extend_from_slice(&new_keys[i..]);
    out.removed.extend_from_slice(&old_keys[j..]);
    out
}
