//! Configuration loading from disk.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable overriding `auth.app_secret`.
pub const APP_SECRET_ENV_VAR: &str = "GATEWAY_APP_SECRET";

/// Environment variable overriding `demo.secret`.
pub const DEMO_SECRET_ENV_VAR: &str = "GATEWAY_DEMO_SECRET";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
///
/// Secrets from the environment take precedence over the file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<GatewayConfig, ConfigError> {
    let mut config: GatewayConfig = toml::from_str(content)?;
    apply_env_overrides(&mut config);

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Build a configuration from defaults and the environment only.
pub fn default_config() -> Result<GatewayConfig, ConfigError> {
    parse_config("")
}

fn apply_env_overrides(config: &mut GatewayConfig) {
    if let Ok(secret) = std::env::var(APP_SECRET_ENV_VAR) {
        config.auth.app_secret = secret;
    }
    if let Ok(secret) = std::env::var(DEMO_SECRET_ENV_VAR) {
        config.demo.secret = secret;
    }
}
