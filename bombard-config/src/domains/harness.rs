//! Test-engine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigResult;
use crate::validation::{validate_positive, validate_probability, Validatable};

/// Test-engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Size of the runtime worker-thread pool the flows multiplex over
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,

    /// Concurrent worker tasks per testing flow
    #[serde(default = "default_workers_per_flow")]
    pub workers_per_flow: usize,

    /// Credit each pool user is created with
    #[serde(default = "default_user_account_amount")]
    pub user_account_amount: i64,

    /// Polling interval for condition awaiting
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_poll_interval")]
    pub poll_interval: Duration,

    /// How long a cart must sit idle before the abandonment sweep applies
    #[serde(
        with = "crate::domains::utils::serde_duration",
        default = "default_abandoned_idle_threshold"
    )]
    pub abandoned_idle_threshold: Duration,

    /// Probability that a test exercises the abandoned-cart branch
    #[serde(default = "default_abandoned_probability")]
    pub abandoned_probability: f64,

    /// Probability that a test changes items after finalization
    #[serde(default = "default_change_after_finalization_probability")]
    pub change_after_finalization_probability: f64,

    /// How long to wait for quiescence when stopping a flow
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_stop_timeout")]
    pub stop_timeout: Duration,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: default_worker_pool_size(),
            workers_per_flow: default_workers_per_flow(),
            user_account_amount: default_user_account_amount(),
            poll_interval: default_poll_interval(),
            abandoned_idle_threshold: default_abandoned_idle_threshold(),
            abandoned_probability: default_abandoned_probability(),
            change_after_finalization_probability: default_change_after_finalization_probability(),
            stop_timeout: default_stop_timeout(),
        }
    }
}

impl Validatable for HarnessConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.worker_pool_size, "worker_pool_size", self.domain_name())?;
        validate_positive(self.workers_per_flow, "workers_per_flow", self.domain_name())?;
        validate_positive(
            self.user_account_amount,
            "user_account_amount",
            self.domain_name(),
        )?;
        validate_positive(
            self.poll_interval.as_millis(),
            "poll_interval",
            self.domain_name(),
        )?;
        validate_probability(
            self.abandoned_probability,
            "abandoned_probability",
            self.domain_name(),
        )?;
        validate_probability(
            self.change_after_finalization_probability,
            "change_after_finalization_probability",
            self.domain_name(),
        )?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "harness"
    }
}

// Default value functions
fn default_worker_pool_size() -> usize {
    16
}

fn default_workers_per_flow() -> usize {
    100
}

fn default_user_account_amount() -> i64 {
    i64::MAX
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_abandoned_idle_threshold() -> Duration {
    Duration::from_secs(120)
}

fn default_abandoned_probability() -> f64 {
    0.5
}

fn default_change_after_finalization_probability() -> f64 {
    0.5
}

fn default_stop_timeout() -> Duration {
    Duration::from_secs(30)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_harness_config_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.worker_pool_size, 16);
        assert_eq!(config.workers_per_flow, 100);
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.abandoned_idle_threshold, Duration::from_secs(120));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_harness_config_validation() {
        let mut config = HarnessConfig::default();
        config.abandoned_probability = 1.2;
        assert!(config.validate().is_err());

        let mut config = HarnessConfig::default();
        config.workers_per_flow = 0;
        assert!(config.validate().is_err());
    }
}
