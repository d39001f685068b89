//! Domain-specific configuration modules

pub mod harness;
pub mod http;
pub mod rate_limit;
pub mod utils;

use serde::{Deserialize, Serialize};

use crate::error::ConfigResult;
use crate::validation::Validatable;

/// Top-level harness configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BombardConfig {
    pub harness: harness::HarnessConfig,
    pub rate_limit: rate_limit::RateLimitConfig,
    pub http: http::HttpConfig,
}

impl BombardConfig {
    /// Validate every domain
    pub fn validate(&self) -> ConfigResult<()> {
        self.harness.validate()?;
        self.rate_limit.validate()?;
        self.http.validate()?;
        Ok(())
    }
}
