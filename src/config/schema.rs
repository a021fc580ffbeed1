//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Deadline budgets per entry point.
    pub timeouts: TimeoutConfig,

    /// Inbound rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Outbound circuit breaking, applied per dependency.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Editor descriptor and trust token settings.
    pub editor: EditorConfig,

    /// Identity context verification.
    pub auth: AuthConfig,

    /// Demo document server offered to tenants without their own.
    pub demo: DemoConfig,

    /// CRM API client settings.
    pub crm: CrmConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub security: SecurityConfig,

    /// CRM users known at startup, as `[[users]]` tables.
    pub users: Vec<UserSeed>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Deadlines for each entry point, in milliseconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Budget for building an editor config (both fan-out branches).
    pub config_build_ms: u64,

    /// Budget for validating and persisting tenant settings.
    pub settings_write_ms: u64,

    /// Budget for reads (settings, access code data).
    pub read_ms: u64,

    /// Hard ceiling on any request, enforced by the HTTP layer, in seconds.
    pub request_secs: u64,
}

impl TimeoutConfig {
    pub fn config_build(&self) -> Duration {
        Duration::from_millis(self.config_build_ms)
    }

    pub fn settings_write(&self) -> Duration {
        Duration::from_millis(self.settings_write_ms)
    }

    pub fn read(&self) -> Duration {
        Duration::from_millis(self.read_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            config_build_ms: 6_000,
            settings_write_ms: 4_000,
            read_ms: 3_000,
            request_secs: 30,
        }
    }
}

/// Rate limiting configuration.
///
/// Both quotas count requests per one-second window. Zero disables a limiter.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests per second across all callers.
    pub global_per_second: u64,

    /// Requests per second per caller IP.
    pub per_ip_per_second: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            global_per_second: 2_000,
            per_ip_per_second: 100,
        }
    }
}

/// Circuit breaker settings shared by every outbound dependency.
///
/// Each dependency still gets its own breaker instance and state.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Per-call timeout; a call exceeding it counts as a failure.
    pub timeout_ms: u64,

    /// Maximum in-flight calls per dependency.
    pub max_concurrent: usize,

    /// Minimum calls in the rolling window before the breaker may trip.
    pub volume_threshold: u64,

    /// Time spent open before a trial call is let through.
    pub sleep_window_ms: u64,

    /// Error percentage (0-100) above which the breaker opens.
    pub error_percent_threshold: u8,

    /// Length of the rolling window, in one-second buckets.
    pub rolling_window_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 1_000,
            max_concurrent: 10,
            volume_threshold: 20,
            sleep_window_ms: 5_000,
            error_percent_threshold: 50,
            rolling_window_secs: 10,
        }
    }
}

/// Editor descriptor settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Public base URL the document server downloads files from.
    pub gateway_url: String,

    /// Public base URL the document server posts save callbacks to.
    pub callback_url: String,

    /// Lifetime of download/callback tokens.
    pub download_token_ttl_secs: u64,

    /// Lifetime of the signed config token.
    pub config_token_ttl_secs: u64,

    /// Reject config requests for file types the editor cannot open.
    pub require_known_format: bool,

    /// Issue an access code alongside each config.
    pub issue_access_codes: bool,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            gateway_url: "http://localhost:8080".to_string(),
            callback_url: "http://localhost:8080".to_string(),
            download_token_ttl_secs: 240,
            config_token_ttl_secs: 3_600,
            require_known_format: true,
            issue_access_codes: true,
        }
    }
}

/// Identity context verification.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Header carrying the CRM-signed app context token.
    pub context_header: String,

    /// Secret the CRM signs app context tokens with.
    /// Overridden by `GATEWAY_APP_SECRET` when set.
    pub app_secret: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            context_header: "x-app-context".to_string(),
            app_secret: String::new(),
        }
    }
}

/// Demo document server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DemoConfig {
    pub address: String,

    /// Overridden by `GATEWAY_DEMO_SECRET` when set.
    pub secret: String,

    pub header: String,

    /// Days a tenant may use the demo server after first enabling it.
    pub trial_days: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            secret: String::new(),
            header: "AuthorizationJwt".to_string(),
            trial_days: 30,
        }
    }
}

/// CRM API client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CrmConfig {
    /// Request timeout for CRM API calls in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 3_000,
        }
    }
}

/// Stored CRM credentials for one user of one tenant.
#[derive(Clone, Deserialize, Serialize)]
pub struct UserSeed {
    pub tenant_id: u64,
    pub user_id: u64,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub scope: String,
    /// Base URL of the tenant's CRM API.
    pub api_domain: String,
    #[serde(default)]
    pub expires_at: u64,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl std::fmt::Debug for UserSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserSeed")
            .field("tenant_id", &self.tenant_id)
            .field("user_id", &self.user_id)
            .field("api_domain", &self.api_domain)
            .finish_non_exhaustive()
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Enable security headers.
    pub enable_headers: bool,
    /// Maximum body size in bytes.
    pub max_body_size: usize,
    /// Longest file name accepted by the config endpoint.
    pub max_filename_len: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_headers: true,
            max_body_size: 1024 * 1024, // 1MB
            max_filename_len: 200,
        }
    }
}
