//! Outbound collaborators.
//!
//! # Data Flow
//! ```text
//! builder / access / http handlers
//!     → dependencies.rs (named circuit breaker per collaborator, error mapping)
//!     → trait object (UserDirectory, CrmApi, SettingsStore, DocumentServer, AccessCodeStore)
//!     → memory.rs or http.rs adapter
//! ```
//!
//! # Design Decisions
//! - Collaborators are traits injected as `Arc<dyn Trait>`; nothing is global
//! - Adapters report `CollaboratorError`; only `Dependencies` speaks `GatewayError`
//! - Durability is the adapter's business, not the gateway's

pub mod dependencies;
pub mod http;
pub mod memory;
pub mod types;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::GatewayConfig;
use self::http::{HttpCrmApi, HttpDocumentServer};
use self::memory::{MemoryAccessCodeStore, MemorySettingsStore, MemoryUserDirectory};

pub use dependencies::Dependencies;
pub use types::{
    AccessCode, AccessEntry, CollaboratorError, CollaboratorResult, CrmCredentials, CrmProfile,
    Language, ServerCredentials, StoredUser, TenantDocumentSettings, UserIdentity,
};

/// Stored OAuth credentials, keyed by composite `{tenant}:{user}` id.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, composite_id: &str) -> CollaboratorResult<StoredUser>;
}

/// Per-tenant document server settings.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get_settings(&self, tenant_id: u64) -> CollaboratorResult<TenantDocumentSettings>;

    async fn put_settings(&self, settings: TenantDocumentSettings) -> CollaboratorResult<()>;
}

/// The document editing server.
#[async_trait]
pub trait DocumentServer: Send + Sync {
    /// Check that `secret` is accepted by the server at `address`.
    async fn validate_credentials(
        &self,
        address: &str,
        secret: &str,
        header: &str,
    ) -> CollaboratorResult<()>;
}

/// The CRM's REST API.
#[async_trait]
pub trait CrmApi: Send + Sync {
    async fn get_user_profile(&self, credentials: &CrmCredentials) -> CollaboratorResult<CrmProfile>;

    async fn get_deal(
        &self,
        credentials: &CrmCredentials,
        deal_id: &str,
    ) -> CollaboratorResult<serde_json::Value>;
}

/// Active access codes. At most one per (user, file) pair.
#[async_trait]
pub trait AccessCodeStore: Send + Sync {
    /// Store `code`, superseding any earlier code for the same pair.
    async fn upsert(&self, code: AccessCode) -> CollaboratorResult<()>;

    async fn get(&self, code: &str) -> CollaboratorResult<AccessCode>;

    /// Remove `code`. `NotFound` if it is no longer active, so exactly one
    /// of several concurrent removers succeeds.
    async fn remove(&self, code: &str) -> CollaboratorResult<()>;
}

/// The full set of collaborator implementations.
#[derive(Clone)]
pub struct Collaborators {
    pub users: Arc<dyn UserDirectory>,
    pub crm: Arc<dyn CrmApi>,
    pub settings: Arc<dyn SettingsStore>,
    pub document_server: Arc<dyn DocumentServer>,
    pub access_codes: Arc<dyn AccessCodeStore>,
}

impl Collaborators {
    /// Production wiring: HTTP adapters for the CRM and the document server,
    /// in-memory stores for users (seeded from `[[users]]`), settings and
    /// access codes.
    pub fn from_config(config: &GatewayConfig) -> CollaboratorResult<Self> {
        let timeout = Duration::from_millis(config.crm.request_timeout_ms);
        Ok(Self {
            users: Arc::new(MemoryUserDirectory::seeded(&config.users)),
            crm: Arc::new(HttpCrmApi::new(timeout)?),
            settings: Arc::new(MemorySettingsStore::new()),
            document_server: Arc::new(HttpDocumentServer::new(timeout)?),
            access_codes: Arc::new(MemoryAccessCodeStore::new()),
        })
    }
}
