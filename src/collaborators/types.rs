//! Records exchanged with collaborators.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{DemoConfig, UserSeed};
use crate::error::{GatewayError, GatewayResult};

/// Errors a collaborator adapter can report.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("record not found")]
    NotFound,

    #[error("collaborator timed out")]
    Timeout,

    #[error("collaborator answered {code}: {message}")]
    Status { code: u16, message: String },

    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
}

impl CollaboratorError {
    /// Whether the error says something about the dependency's health.
    /// Missing records and client errors do not.
    pub fn is_dependency_failure(&self) -> bool {
        match self {
            CollaboratorError::NotFound => false,
            CollaboratorError::Status { code, .. } => *code >= 500,
            CollaboratorError::Timeout | CollaboratorError::Unavailable(_) => true,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CollaboratorError::NotFound => "not_found",
            CollaboratorError::Timeout => "timeout",
            CollaboratorError::Status { .. } => "status",
            CollaboratorError::Unavailable(_) => "unavailable",
        }
    }
}

impl From<reqwest::Error> for CollaboratorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CollaboratorError::Timeout
        } else if let Some(status) = err.status() {
            CollaboratorError::Status {
                code: status.as_u16(),
                message: status.canonical_reason().unwrap_or("unexpected status").to_string(),
            }
        } else {
            CollaboratorError::Unavailable(err.without_url().to_string())
        }
    }
}

/// Result type for collaborator calls.
pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

/// OAuth credentials the user directory holds for one CRM user.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredUser {
    /// Composite `{tenant}:{user}` id.
    pub id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub scope: String,
    pub api_domain: String,
    pub expires_at: u64,
}

impl From<&UserSeed> for StoredUser {
    fn from(seed: &UserSeed) -> Self {
        Self {
            id: format!("{}:{}", seed.tenant_id, seed.user_id),
            access_token: seed.access_token.clone(),
            refresh_token: seed.refresh_token.clone(),
            token_type: seed.token_type.clone(),
            scope: seed.scope.clone(),
            api_domain: seed.api_domain.clone(),
            expires_at: seed.expires_at,
        }
    }
}

impl StoredUser {
    pub fn credentials(&self) -> CrmCredentials {
        CrmCredentials {
            access_token: self.access_token.clone(),
            api_domain: self.api_domain.clone(),
        }
    }
}

impl std::fmt::Debug for StoredUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredUser")
            .field("id", &self.id)
            .field("api_domain", &self.api_domain)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// What a CRM API call needs to act on behalf of a user.
#[derive(Clone, PartialEq, Eq)]
pub struct CrmCredentials {
    pub access_token: String,
    pub api_domain: String,
}

impl std::fmt::Debug for CrmCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrmCredentials")
            .field("api_domain", &self.api_domain)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// One entry of the CRM user's access list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessEntry {
    pub app: String,
    #[serde(default)]
    pub admin: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Language {
    #[serde(default)]
    pub language_code: String,
    #[serde(default)]
    pub country_code: String,
}

/// CRM `users/me` profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CrmProfile {
    pub id: u64,
    pub company_id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub access: Vec<AccessEntry>,
}

/// Resolved CRM user for one request. Holds live credentials and is never
/// cached past the request.
#[derive(Debug, Clone)]
pub struct UserIdentity {
    pub external_user_id: u64,
    pub tenant_id: u64,
    pub display_name: String,
    pub locale: String,
    pub credentials: CrmCredentials,
}

impl UserIdentity {
    pub fn from_profile(profile: &CrmProfile, stored: &StoredUser) -> Self {
        Self {
            external_user_id: profile.id,
            tenant_id: profile.company_id,
            display_name: profile.name.clone(),
            locale: profile.language.language_code.clone(),
            credentials: stored.credentials(),
        }
    }

    pub fn composite_id(&self) -> String {
        format!("{}:{}", self.tenant_id, self.external_user_id)
    }
}

/// Document server settings for one tenant.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TenantDocumentSettings {
    pub tenant_id: u64,
    pub server_address: String,
    pub server_secret: String,
    pub server_header: String,
    #[serde(default)]
    pub demo_enabled: bool,
    /// Unix seconds of the first demo enablement.
    #[serde(default)]
    pub demo_started_at: Option<u64>,
}

impl std::fmt::Debug for TenantDocumentSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantDocumentSettings")
            .field("tenant_id", &self.tenant_id)
            .field("server_address", &self.server_address)
            .field("server_header", &self.server_header)
            .field("demo_enabled", &self.demo_enabled)
            .field("demo_started_at", &self.demo_started_at)
            .finish_non_exhaustive()
    }
}

impl TenantDocumentSettings {
    pub fn has_own_server(&self) -> bool {
        !self.server_address.trim().is_empty() && !self.server_secret.trim().is_empty()
    }

    /// Whether the demo trial is still running at `now` (unix seconds).
    pub fn demo_active(&self, demo: &DemoConfig, now: u64) -> bool {
        if !self.demo_enabled || demo.address.is_empty() || demo.secret.is_empty() {
            return false;
        }
        let trial = demo.trial_days.saturating_mul(86_400);
        match self.demo_started_at {
            Some(started) => now < started.saturating_add(trial),
            None => false,
        }
    }

    /// The document server this tenant's configs are signed for.
    ///
    /// Own credentials saved alongside demo mode were never checked against
    /// the document server, so they are only used once demo mode is off.
    pub fn resolve_server(&self, demo: &DemoConfig, now: u64) -> GatewayResult<ServerCredentials> {
        if self.demo_enabled {
            if self.demo_active(demo, now) {
                return Ok(ServerCredentials {
                    address: demo.address.clone(),
                    secret: demo.secret.clone(),
                    header: demo.header.clone(),
                    demo: true,
                });
            }
        } else if self.has_own_server() {
            return Ok(ServerCredentials {
                address: self.server_address.trim().to_string(),
                secret: self.server_secret.trim().to_string(),
                header: self.server_header.clone(),
                demo: false,
            });
        }

        Err(GatewayError::NotConfigured {
            tenant_id: self.tenant_id.to_string(),
        })
    }
}

/// Usable document server address and signing key.
#[derive(Clone, PartialEq, Eq)]
pub struct ServerCredentials {
    pub address: String,
    pub secret: String,
    pub header: String,
    pub demo: bool,
}

impl std::fmt::Debug for ServerCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerCredentials")
            .field("address", &self.address)
            .field("header", &self.header)
            .field("demo", &self.demo)
            .finish_non_exhaustive()
    }
}

/// Opaque pairing handle for one (user, file) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessCode {
    pub code: String,
    /// Composite `{tenant}:{user}` id.
    pub user_id: String,
    pub deal_id: String,
    pub file_id: String,
    pub issued_at: u64,
}
