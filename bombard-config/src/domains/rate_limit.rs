//! Rate limiter configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};

/// Slow-start rate limiter configuration.
///
/// The per-flow target rate itself arrives with the start-testing request;
/// this domain only carries the ramp policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Whether flows ramp up from a fraction of the target rate
    #[serde(default = "crate::domains::utils::default_true")]
    pub slow_start: bool,

    /// How often the ramp raises the current rate
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_ramp_interval")]
    pub ramp_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            slow_start: true,
            ramp_interval: default_ramp_interval(),
        }
    }
}

impl Validatable for RateLimitConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(
            self.ramp_interval.as_millis(),
            "ramp_interval",
            self.domain_name(),
        )?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "rate_limit"
    }
}

fn default_ramp_interval() -> Duration {
    Duration::from_secs(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_defaults() {
        let config = RateLimitConfig::default();
        assert!(config.slow_start);
        assert_eq!(config.ramp_interval, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rate_limit_validation() {
        let mut config = RateLimitConfig::default();
        config.ramp_interval = Duration::from_millis(0);
        assert!(config.validate().is_err());
    }
}
