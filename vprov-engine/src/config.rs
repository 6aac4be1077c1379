//! Run configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::diff::DiffPolicy;
use crate::error::ConfigError;

/// Default cap on readiness polls.
pub const DEFAULT_MAX_WAIT_ATTEMPTS: u32 = 30;
/// Default delay between readiness polls.
pub const DEFAULT_WAIT_DELAY: Duration = Duration::from_secs(15);

/// Bounded polling parameters. The defaults allow roughly 7.5 minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_delay", rename = "delay_seconds", with = "secs")]
    pub delay: Duration,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_WAIT_ATTEMPTS
}

fn default_delay() -> Duration {
    DEFAULT_WAIT_DELAY
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_WAIT_ATTEMPTS,
            delay: DEFAULT_WAIT_DELAY,
        }
    }
}

impl WaitConfig {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        Ok(())
    }

    /// Upper bound on time spent sleeping between polls.
    pub fn max_wait(&self) -> Duration {
        self.delay * self.max_attempts.saturating_sub(1)
    }
}

/// Configuration for one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileConfig {
    pub wait: WaitConfig,
    /// Timeout applied to each observe, act and readiness call.
    /// `None` leaves timeouts to the remote-system client.
    pub operation_timeout: Option<Duration>,
    pub diff: DiffPolicy,
}

impl ReconcileConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.wait.validate()?;
        if self.operation_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::Invalid {
                field: "operation_timeout".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_are_thirty_by_fifteen() {
        let w = WaitConfig::default();
        assert_eq!(w.max_attempts, 30);
        assert_eq!(w.delay, Duration::from_secs(15));
        assert_eq!(w.max_wait(), Duration::from_secs(29 * 15));
    }

    #[test]
    fn zero_attempts_rejected() {
        let w = WaitConfig::new(0, Duration::from_secs(1));
        assert_eq!(w.validate(), Err(ConfigError::ZeroAttempts));
    }

    #[test]
    fn zero_operation_timeout_rejected() {
        let cfg = ReconcileConfig {
            operation_timeout: Some(Duration::ZERO),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn wait_config_from_json() {
        let w: WaitConfig = serde_json::from_value(json!({ "delay_seconds": 5 })).unwrap();
        assert_eq!(w.max_attempts, 30);
        assert_eq!(w.delay, Duration::from_secs(5));
    }
}
