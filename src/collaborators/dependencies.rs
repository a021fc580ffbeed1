//! Breaker-guarded access to every collaborator.

use std::future::Future;

use crate::collaborators::{
    AccessCode, CollaboratorError, Collaborators, CrmCredentials, CrmProfile, StoredUser,
    TenantDocumentSettings,
};
use crate::error::{GatewayError, GatewayResult, RejectReason};
use crate::observability::metrics;
use crate::resilience::{BreakerError, BreakerSettings, BreakerState, CircuitBreaker};

pub const USER_DIRECTORY: &str = "user-directory";
pub const CRM_API: &str = "crm-api";
pub const SETTINGS_STORE: &str = "settings-store";
pub const DOCUMENT_SERVER_VALIDATION: &str = "document-server-validation";
pub const ACCESS_CODES: &str = "access-codes";

/// Collaborators plus one circuit breaker per dependency.
pub struct Dependencies {
    collaborators: Collaborators,
    user_directory: CircuitBreaker,
    crm_api: CircuitBreaker,
    settings_store: CircuitBreaker,
    document_server: CircuitBreaker,
    access_codes: CircuitBreaker,
}

impl Dependencies {
    pub fn new(collaborators: Collaborators, settings: BreakerSettings) -> Self {
        Self {
            collaborators,
            user_directory: CircuitBreaker::new(USER_DIRECTORY, settings.clone()),
            crm_api: CircuitBreaker::new(CRM_API, settings.clone()),
            settings_store: CircuitBreaker::new(SETTINGS_STORE, settings.clone()),
            document_server: CircuitBreaker::new(DOCUMENT_SERVER_VALIDATION, settings.clone()),
            access_codes: CircuitBreaker::new(ACCESS_CODES, settings),
        }
    }

    /// Current state of every breaker, for health reporting.
    pub fn breaker_states(&self) -> Vec<(&'static str, BreakerState)> {
        [
            &self.user_directory,
            &self.crm_api,
            &self.settings_store,
            &self.document_server,
            &self.access_codes,
        ]
        .into_iter()
        .map(|breaker| (breaker.name(), breaker.state()))
        .collect()
    }

    pub async fn get_user(&self, composite_id: &str) -> GatewayResult<StoredUser> {
        let users = &self.collaborators.users;
        guarded(&self.user_directory, || users.get_user(composite_id)).await
    }

    pub async fn get_user_profile(&self, credentials: &CrmCredentials) -> GatewayResult<CrmProfile> {
        let crm = &self.collaborators.crm;
        guarded(&self.crm_api, || crm.get_user_profile(credentials)).await
    }

    pub async fn get_deal(
        &self,
        credentials: &CrmCredentials,
        deal_id: &str,
    ) -> GatewayResult<serde_json::Value> {
        let crm = &self.collaborators.crm;
        guarded(&self.crm_api, || crm.get_deal(credentials, deal_id)).await
    }

    /// A tenant with no stored settings is `NotConfigured`.
    pub async fn get_settings(&self, tenant_id: u64) -> GatewayResult<TenantDocumentSettings> {
        let store = &self.collaborators.settings;
        match guarded(&self.settings_store, || store.get_settings(tenant_id)).await {
            Err(GatewayError::UpstreamUnavailable { status: Some(404), .. }) => {
                Err(GatewayError::NotConfigured {
                    tenant_id: tenant_id.to_string(),
                })
            }
            other => other,
        }
    }

    /// Like `get_settings`, but a missing record is an empty one.
    pub async fn find_settings(&self, tenant_id: u64) -> GatewayResult<Option<TenantDocumentSettings>> {
        match self.get_settings(tenant_id).await {
            Ok(settings) => Ok(Some(settings)),
            Err(GatewayError::NotConfigured { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub async fn put_settings(&self, settings: TenantDocumentSettings) -> GatewayResult<()> {
        let store = &self.collaborators.settings;
        guarded(&self.settings_store, || store.put_settings(settings)).await
    }

    pub async fn validate_credentials(
        &self,
        address: &str,
        secret: &str,
        header: &str,
    ) -> GatewayResult<()> {
        let server = &self.collaborators.document_server;
        guarded(&self.document_server, || {
            server.validate_credentials(address, secret, header)
        })
        .await
    }

    pub async fn upsert_code(&self, code: AccessCode) -> GatewayResult<()> {
        let codes = &self.collaborators.access_codes;
        guarded(&self.access_codes, || codes.upsert(code)).await
    }

    /// An unknown code is an authorization failure.
    pub async fn get_code(&self, code: &str) -> GatewayResult<AccessCode> {
        let codes = &self.collaborators.access_codes;
        guarded(&self.access_codes, || codes.get(code))
            .await
            .map_err(|err| unknown_code(err, "unknown access code"))
    }

    /// Fails with `AuthorizationDenied` if another caller already removed it.
    pub async fn remove_code(&self, code: &str) -> GatewayResult<()> {
        let codes = &self.collaborators.access_codes;
        guarded(&self.access_codes, || codes.remove(code))
            .await
            .map_err(|err| unknown_code(err, "access code already used"))
    }
}

fn unknown_code(err: GatewayError, reason: &str) -> GatewayError {
    match err {
        GatewayError::UpstreamUnavailable { status: Some(404), .. } => {
            GatewayError::AuthorizationDenied(reason.to_string())
        }
        other => other,
    }
}

async fn guarded<T, F, Fut>(breaker: &CircuitBreaker, f: F) -> GatewayResult<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, CollaboratorError>>,
{
    breaker
        .call_classified(f, CollaboratorError::is_dependency_failure)
        .await
        .map_err(|err| map_breaker_error(breaker.name(), err))
}

fn map_breaker_error(dependency: &'static str, err: BreakerError<CollaboratorError>) -> GatewayError {
    let rejected = |reason: RejectReason| {
        metrics::record_admission_rejected(reason.as_str());
        tracing::warn!(dependency, reason = reason.as_str(), "Dependency call rejected");
        GatewayError::AdmissionRejected {
            reason,
            dependency: Some(dependency),
        }
    };

    match err {
        BreakerError::Open => rejected(RejectReason::CircuitOpen),
        BreakerError::ConcurrencyLimit => rejected(RejectReason::ConcurrencyLimit),
        BreakerError::Timeout => {
            metrics::record_upstream_error(dependency, "timeout");
            GatewayError::UpstreamTimeout { dependency }
        }
        BreakerError::Inner(inner) => {
            metrics::record_upstream_error(dependency, inner.kind());
            tracing::debug!(dependency, error = %inner, "Dependency call failed");
            match inner {
                CollaboratorError::Timeout => GatewayError::UpstreamTimeout { dependency },
                CollaboratorError::NotFound => GatewayError::UpstreamUnavailable {
                    dependency,
                    status: Some(404),
                    message: "not found".to_string(),
                },
                CollaboratorError::Status { code, message } => GatewayError::UpstreamUnavailable {
                    dependency,
                    status: Some(code),
                    message,
                },
                CollaboratorError::Unavailable(message) => GatewayError::UpstreamUnavailable {
                    dependency,
                    status: None,
                    message,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::memory::{MemoryAccessCodeStore, MemorySettingsStore, MemoryUserDirectory};
    use crate::collaborators::{CrmApi, DocumentServer};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    struct DownCrm;

    #[async_trait]
    impl CrmApi for DownCrm {
        async fn get_user_profile(&self, _: &CrmCredentials) -> Result<CrmProfile, CollaboratorError> {
            Err(CollaboratorError::Unavailable("connection refused".into()))
        }

        async fn get_deal(&self, _: &CrmCredentials, _: &str) -> Result<serde_json::Value, CollaboratorError> {
            Err(CollaboratorError::Timeout)
        }
    }

    struct AcceptAll;

    #[async_trait]
    impl DocumentServer for AcceptAll {
        async fn validate_credentials(&self, _: &str, _: &str, _: &str) -> Result<(), CollaboratorError> {
            Ok(())
        }
    }

    fn dependencies() -> Dependencies {
        Dependencies::new(
            Collaborators {
                users: Arc::new(MemoryUserDirectory::new()),
                crm: Arc::new(DownCrm),
                settings: Arc::new(MemorySettingsStore::new()),
                document_server: Arc::new(AcceptAll),
                access_codes: Arc::new(MemoryAccessCodeStore::new()),
            },
            BreakerSettings {
                timeout: Duration::from_secs(1),
                max_concurrent: 10,
                volume_threshold: 2,
                sleep_window: Duration::from_secs(5),
                error_percent_threshold: 50,
                window_buckets: 10,
            },
        )
    }

    fn creds() -> CrmCredentials {
        CrmCredentials {
            access_token: "t".into(),
            api_domain: "https://crm.example.com".into(),
        }
    }

    #[tokio::test]
    async fn test_missing_settings_is_not_configured() {
        let deps = dependencies();
        assert_eq!(
            deps.get_settings(77).await,
            Err(GatewayError::NotConfigured { tenant_id: "77".into() })
        );
        assert_eq!(deps.find_settings(77).await, Ok(None));
    }

    #[tokio::test]
    async fn test_unknown_user_maps_to_upstream_status() {
        let deps = dependencies();
        let err = deps.get_user("1:1").await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::UpstreamUnavailable { dependency: USER_DIRECTORY, status: Some(404), .. }
        ));
    }

    #[tokio::test]
    async fn test_collaborator_timeout_maps_to_upstream_timeout() {
        let deps = dependencies();
        assert_eq!(
            deps.get_deal(&creds(), "1").await,
            Err(GatewayError::UpstreamTimeout { dependency: CRM_API })
        );
    }

    #[tokio::test]
    async fn test_breaker_opens_and_rejects() {
        let deps = dependencies();
        for _ in 0..2 {
            let err = deps.get_user_profile(&creds()).await.unwrap_err();
            assert_eq!(err.status(), axum::http::StatusCode::UNAUTHORIZED);
        }

        let err = deps.get_user_profile(&creds()).await.unwrap_err();
        assert_eq!(
            err,
            GatewayError::AdmissionRejected {
                reason: RejectReason::CircuitOpen,
                dependency: Some(CRM_API),
            }
        );

        let states = deps.breaker_states();
        assert!(states.contains(&(CRM_API, BreakerState::Open)));
        assert!(states.contains(&(USER_DIRECTORY, BreakerState::Closed)));
    }

    #[tokio::test]
    async fn test_removed_code_cannot_be_removed_again() {
        let deps = dependencies();
        deps.upsert_code(AccessCode {
            code: "c1".into(),
            user_id: "1:1".into(),
            deal_id: "d".into(),
            file_id: "f".into(),
            issued_at: 0,
        })
        .await
        .unwrap();

        assert!(deps.remove_code("c1").await.is_ok());
        assert!(matches!(
            deps.remove_code("c1").await,
            Err(GatewayError::AuthorizationDenied(_))
        ));
        assert!(matches!(
            deps.get_code("c1").await,
            Err(GatewayError::AuthorizationDenied(_))
        ));
    }
}
