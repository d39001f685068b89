//! Domain-driven configuration management for the bombard harness
//!
//! Configuration is split by functional domain, each with validation and
//! serde defaults, so a partial YAML file always yields a runnable config.

pub mod error;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

// Re-export domain configurations
pub use domains::{
    harness::HarnessConfig, http::HttpConfig, rate_limit::RateLimitConfig, BombardConfig,
};

// Re-export utilities
pub use domains::utils::serde_duration;
