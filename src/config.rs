//! The handful of knobs this crate leaves open for callers to tune, loaded
//! the same way the teacher's configuration loads: an environment
//! variable, falling back to a documented default.

use std::time::Duration;

/// Runtime configuration for a [`crate::registry::ChannelManager`].
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// How long a composite sink coordinator waits for each child's
    /// initial writer before proceeding with that child's writer unset.
    pub composite_initial_wait: Duration,
    /// Capacity of a channel actor's administrative command queue. A full
    /// inbox applies ordinary backpressure to administrative callers only
    /// — it never affects the `select` hot path.
    pub channel_inbox_capacity: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            composite_initial_wait: Duration::from_millis(100),
            channel_inbox_capacity: 256,
        }
    }
}

impl CoreConfig {
    /// Reads `LOGCHAN_COMPOSITE_WAIT_MS` and `LOGCHAN_CHANNEL_INBOX_CAPACITY`,
    /// falling back to [`CoreConfig::default`] for either that's unset or
    /// unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let composite_initial_wait = std::env::var("LOGCHAN_COMPOSITE_WAIT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.composite_initial_wait);

        let channel_inbox_capacity = std::env::var("LOGCHAN_CHANNEL_INBOX_CAPACITY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults.channel_inbox_capacity);

        Self { composite_initial_wait, channel_inbox_capacity }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = CoreConfig::default();
        assert_eq!(config.composite_initial_wait, Duration::from_millis(100));
        assert_eq!(config.channel_inbox_capacity, 256);
    }
}
