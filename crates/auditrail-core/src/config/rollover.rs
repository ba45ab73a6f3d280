use crate::error::{AuditError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Rollover settings as they appear in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolloverConfig {
    /// Run the background rollover scheduler (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// Maximum age of an open log file in seconds (default: 86400)
    ///
    /// Zero or negative disables time-based rollover, regardless of `enabled`.
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: i64,

    /// How often the scheduler checks the open file's age, in seconds (default: 60)
    #[serde(default = "default_check_period_seconds")]
    pub check_period_seconds: i64,
}

impl Default for RolloverConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_seconds: default_interval_seconds(),
            check_period_seconds: default_check_period_seconds(),
        }
    }
}

fn default_interval_seconds() -> i64 {
    86_400
}

fn default_check_period_seconds() -> i64 {
    60
}

impl RolloverConfig {
    /// Periodic rollover every `interval_seconds`, checked every `check_period_seconds`
    pub fn periodic(interval_seconds: i64, check_period_seconds: i64) -> Self {
        Self {
            enabled: true,
            interval_seconds,
            check_period_seconds,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.enabled && self.interval_seconds > 0 && self.check_period_seconds <= 0 {
            return Err(AuditError::Config(format!(
                "rollover.checkPeriodSeconds must be positive, got {}",
                self.check_period_seconds
            )));
        }
        Ok(())
    }
}

/// Effective rollover policy, fixed when the writer is initialized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RolloverPolicy {
    enabled: bool,
    interval: Option<Duration>,
    check_period: Duration,
}

impl RolloverPolicy {
    /// Background rollover every `interval`, polled every `check_period`
    ///
    /// A zero interval disables time-based rollover.
    pub fn periodic(interval: Duration, check_period: Duration) -> Self {
        Self {
            enabled: true,
            interval: (!interval.is_zero()).then_some(interval),
            check_period,
        }
    }

    /// Rollover only when a write finds the open file older than `interval`
    pub fn on_write(interval: Duration) -> Self {
        Self {
            enabled: false,
            interval: (!interval.is_zero()).then_some(interval),
            check_period: Duration::ZERO,
        }
    }

    /// No time-based rollover at all
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            interval: None,
            check_period: Duration::ZERO,
        }
    }

    pub fn from_config(config: &RolloverConfig) -> Result<Self> {
        config.validate()?;

        let interval = u64::try_from(config.interval_seconds)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        let check_period = u64::try_from(config.check_period_seconds)
            .map(Duration::from_secs)
            .unwrap_or(Duration::ZERO);

        Ok(Self {
            enabled: config.enabled,
            interval,
            check_period,
        })
    }

    /// Whether the background scheduler should run
    pub fn is_periodic(&self) -> bool {
        self.enabled && self.interval.is_some() && !self.check_period.is_zero()
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    pub fn check_period(&self) -> Duration {
        self.check_period
    }

    /// Whether a file opened at `opened_at` is due for rollover at `now`
    pub fn is_expired(&self, opened_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let Some(interval) = self.interval else {
            return false;
        };
        match (now - opened_at).to_std() {
            Ok(age) => age >= interval,
            // opened_at is in the future (clock went backwards)
            Err(_) => false,
        }
    }
}

impl Default for RolloverPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_positive_interval_disables_rollover() {
        let policy = RolloverPolicy::from_config(&RolloverConfig::periodic(0, 2)).unwrap();
        assert!(policy.enabled());
        assert!(policy.interval().is_none());
        assert!(!policy.is_periodic());

        let policy = RolloverPolicy::from_config(&RolloverConfig::periodic(-10, 2)).unwrap();
        assert!(policy.interval().is_none());
        assert!(!policy.is_periodic());

        let opened = Utc::now() - chrono::Duration::days(30);
        assert!(!policy.is_expired(opened, Utc::now()));
    }

    #[test]
    fn test_periodic_policy_from_config() {
        let policy = RolloverPolicy::from_config(&RolloverConfig::periodic(5, 2)).unwrap();
        assert!(policy.is_periodic());
        assert_eq!(policy.interval(), Some(Duration::from_secs(5)));
        assert_eq!(policy.check_period(), Duration::from_secs(2));
    }

    #[test]
    fn test_disabled_scheduler_keeps_interval() {
        let policy = RolloverPolicy::from_config(&RolloverConfig::default()).unwrap();
        assert!(!policy.is_periodic());
        assert_eq!(policy.interval(), Some(Duration::from_secs(86_400)));
    }

    #[test]
    fn test_enabled_requires_positive_check_period() {
        assert!(RolloverPolicy::from_config(&RolloverConfig::periodic(5, 0)).is_err());
        // Irrelevant when time-based rollover is off
        assert!(RolloverPolicy::from_config(&RolloverConfig::periodic(0, 0)).is_ok());
    }

    #[test]
    fn test_is_expired() {
        let policy = RolloverPolicy::on_write(Duration::from_secs(5));
        let now = Utc::now();
        assert!(!policy.is_expired(now - chrono::Duration::seconds(4), now));
        assert!(policy.is_expired(now - chrono::Duration::seconds(5), now));
        assert!(!policy.is_expired(now + chrono::Duration::seconds(5), now));
    }
}
