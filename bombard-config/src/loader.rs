//! Configuration loading from files and the environment

use std::path::Path;

use crate::domains::BombardConfig;
use crate::error::{ConfigError, ConfigResult};

/// Environment variable naming the config file path
pub const CONFIG_PATH_ENV: &str = "BOMBARD_CONFIG";

/// Loads and validates harness configuration
#[derive(Debug, Default)]
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load from a YAML file and validate
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<BombardConfig> {
        let content = std::fs::read_to_string(path)?;
        self.from_yaml_str(&content)
    }

    /// Parse from a YAML string and validate
    pub fn from_yaml_str(&self, content: &str) -> ConfigResult<BombardConfig> {
        let config: BombardConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the path named by `BOMBARD_CONFIG`, or fall back to the
    /// built-in defaults when the variable is unset
    pub fn from_env(&self) -> ConfigResult<BombardConfig> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.is_empty() => self.from_file(path),
            Ok(_) => Err(ConfigError::EnvError(format!(
                "{} is set but empty",
                CONFIG_PATH_ENV
            ))),
            Err(_) => Ok(BombardConfig::default()),
        }
    }
}
