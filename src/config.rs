//! Configuration types for the alert scheduler.

use serde::{Deserialize, Serialize};

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Past-due horizon in seconds. An alert whose scheduled time precedes
    /// `now - past_due_tolerance_secs` is announced as past due instead of
    /// fired.
    pub past_due_tolerance_secs: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            past_due_tolerance_secs: 1800,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn default_tolerance_is_thirty_minutes() {
        let config = SchedulerConfig::default();
        assert_eq!(config.past_due_tolerance_secs, 1800);
    }

    #[test]
    fn config_serde_round_trip() {
        let config = SchedulerConfig {
            past_due_tolerance_secs: 30,
        };
        let json = serde_json::to_string(&config).unwrap();
        let restored: SchedulerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.past_due_tolerance_secs, 30);
    }
}
