//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, percentages <= 100)
//! - Check that public URLs and the bind address parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use url::Url;

use crate::config::schema::GatewayConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    let timeouts = &config.timeouts;
    for (field, value) in [
        ("timeouts.config_build_ms", timeouts.config_build_ms),
        ("timeouts.settings_write_ms", timeouts.settings_write_ms),
        ("timeouts.read_ms", timeouts.read_ms),
        ("timeouts.request_secs", timeouts.request_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than zero"));
        }
    }

    let breaker = &config.circuit_breaker;
    if breaker.timeout_ms == 0 {
        errors.push(ValidationError::new("circuit_breaker.timeout_ms", "must be greater than zero"));
    }
    if breaker.max_concurrent == 0 {
        errors.push(ValidationError::new("circuit_breaker.max_concurrent", "must be greater than zero"));
    }
    if breaker.error_percent_threshold > 100 {
        errors.push(ValidationError::new(
            "circuit_breaker.error_percent_threshold",
            "must be a percentage between 0 and 100",
        ));
    }
    if breaker.rolling_window_secs == 0 {
        errors.push(ValidationError::new("circuit_breaker.rolling_window_secs", "must be greater than zero"));
    }

    for (field, value) in [
        ("editor.gateway_url", &config.editor.gateway_url),
        ("editor.callback_url", &config.editor.callback_url),
    ] {
        if let Err(e) = Url::parse(value) {
            errors.push(ValidationError::new(field, format!("invalid URL: {}", e)));
        }
    }

    if config.editor.download_token_ttl_secs == 0 || config.editor.config_token_ttl_secs == 0 {
        errors.push(ValidationError::new("editor", "token lifetimes must be greater than zero"));
    }

    if config.auth.app_secret.trim().is_empty() {
        errors.push(ValidationError::new("auth.app_secret", "must be set"));
    }
    if config.auth.context_header.trim().is_empty() {
        errors.push(ValidationError::new("auth.context_header", "must be set"));
    }

    let demo = &config.demo;
    if !demo.address.is_empty() {
        if Url::parse(&demo.address).is_err() {
            errors.push(ValidationError::new("demo.address", "invalid URL"));
        }
        if demo.secret.is_empty() {
            errors.push(ValidationError::new("demo.secret", "required when demo.address is set"));
        }
    }

    let mut seen = std::collections::HashSet::new();
    for user in &config.users {
        if user.access_token.trim().is_empty() {
            errors.push(ValidationError::new(
                "users.access_token",
                format!("missing for user {}:{}", user.tenant_id, user.user_id),
            ));
        }
        match Url::parse(&user.api_domain) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => errors.push(ValidationError::new(
                "users.api_domain",
                format!("'{}' is not an http(s) URL", user.api_domain),
            )),
        }
        if !seen.insert((user.tenant_id, user.user_id)) {
            errors.push(ValidationError::new(
                "users",
                format!("user {}:{} listed twice", user.tenant_id, user.user_id),
            ));
        }
    }

    if config.security.max_filename_len == 0 {
        errors.push(ValidationError::new("security.max_filename_len", "must be greater than zero"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
