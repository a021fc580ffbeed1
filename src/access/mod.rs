//! Access code issuance and rotation.
//!
//! A code pairs one user with one file. Redeeming it returns the deal data
//! the code points at and a fresh code; the redeemed one stops working.
//! At most one code per (user, file) pair is live at any time.

use serde::Serialize;
use std::sync::Arc;

use crate::collaborators::{AccessCode, Dependencies};
use crate::error::{GatewayError, GatewayResult};
use crate::security::CallerContext;
use crate::signing::token::now_secs;

/// Body of `GET /api/data`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RedeemedData {
    pub data: serde_json::Value,
    pub code: String,
}

#[derive(Clone)]
pub struct AccessCodeService {
    deps: Arc<Dependencies>,
}

impl AccessCodeService {
    pub fn new(deps: Arc<Dependencies>) -> Self {
        Self { deps }
    }

    /// Issue a new code for (user, file), replacing any live one.
    pub async fn issue(&self, user_id: &str, deal_id: &str, file_id: &str) -> GatewayResult<AccessCode> {
        check_deal_id(deal_id)?;
        let code = AccessCode {
            code: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            deal_id: deal_id.to_string(),
            file_id: file_id.to_string(),
            issued_at: now_secs(),
        };
        self.deps.upsert_code(code.clone()).await?;
        tracing::debug!(file_id = %file_id, "Access code issued");
        Ok(code)
    }

    /// Exchange `code` for its deal data and a rotated code.
    ///
    /// Of two concurrent redemptions of the same code only one gets past
    /// removal; the other fails with `AuthorizationDenied`. If the rotated
    /// code cannot be stored the redeemed one is put back.
    pub async fn redeem(&self, caller: CallerContext, code: &str) -> GatewayResult<RedeemedData> {
        if code.is_empty() {
            return Err(GatewayError::ValidationFailed("code is required".to_string()));
        }

        let current = self.deps.get_code(code).await?;
        if current.user_id != caller.composite_id() {
            tracing::warn!(tenant_id = caller.tenant_id, "Access code presented by another user");
            return Err(GatewayError::AuthorizationDenied(
                "access code belongs to another user".to_string(),
            ));
        }
        check_deal_id(&current.deal_id)?;

        let stored = self.deps.get_user(&current.user_id).await?;
        let data = self.deps.get_deal(&stored.credentials(), &current.deal_id).await?;

        self.deps.remove_code(code).await?;
        let rotated = match self
            .issue(&current.user_id, &current.deal_id, &current.file_id)
            .await
        {
            Ok(rotated) => rotated,
            Err(err) => {
                if let Err(restore) = self.deps.upsert_code(current).await {
                    tracing::error!(error = %restore, "Failed to restore redeemed access code");
                }
                return Err(err);
            }
        };

        Ok(RedeemedData {
            data,
            code: rotated.code,
        })
    }
}

/// Deal ids are plain alphanumeric CRM record ids.
pub fn check_deal_id(deal_id: &str) -> GatewayResult<()> {
    if deal_id.is_empty() || !deal_id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(GatewayError::ValidationFailed(
            "deal_id must be alphanumeric".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::memory::{
        MemoryAccessCodeStore, MemoryCrmApi, MemoryDocumentServer, MemorySettingsStore,
        MemoryUserDirectory,
    };
    use crate::collaborators::{
        AccessCodeStore, CollaboratorError, CollaboratorResult, Collaborators, CrmProfile, Language,
        StoredUser,
    };
    use crate::resilience::BreakerSettings;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Code store whose next `failing` upserts fail.
    #[derive(Clone, Default)]
    struct FlakyCodes {
        inner: MemoryAccessCodeStore,
        failing: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl AccessCodeStore for FlakyCodes {
        async fn upsert(&self, code: AccessCode) -> CollaboratorResult<()> {
            let fail = self
                .failing
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if fail {
                return Err(CollaboratorError::Unavailable("write failed".into()));
            }
            self.inner.upsert(code).await
        }

        async fn get(&self, code: &str) -> CollaboratorResult<AccessCode> {
            self.inner.get(code).await
        }

        async fn remove(&self, code: &str) -> CollaboratorResult<()> {
            self.inner.remove(code).await
        }
    }

    fn service() -> (AccessCodeService, MemoryAccessCodeStore) {
        let codes = MemoryAccessCodeStore::new();
        (service_with(Arc::new(codes.clone())), codes)
    }

    fn service_with(codes: Arc<dyn AccessCodeStore>) -> AccessCodeService {
        let users = MemoryUserDirectory::new();
        users.insert(StoredUser {
            id: "42:7".into(),
            access_token: "token-7".into(),
            refresh_token: String::new(),
            token_type: "Bearer".into(),
            scope: String::new(),
            api_domain: "https://crm.example.com".into(),
            expires_at: 0,
        });

        let crm = MemoryCrmApi::new();
        crm.insert_profile(
            "token-7",
            CrmProfile {
                id: 7,
                company_id: 42,
                name: "Ada".into(),
                language: Language::default(),
                access: Vec::new(),
            },
        );
        crm.insert_deal("15", json!({"id": 15, "title": "Renewal"}));

        let deps = Arc::new(Dependencies::new(
            Collaborators {
                users: Arc::new(users),
                crm: Arc::new(crm),
                settings: Arc::new(MemorySettingsStore::new()),
                document_server: Arc::new(MemoryDocumentServer::new()),
                access_codes: codes,
            },
            BreakerSettings::default(),
        ));
        AccessCodeService::new(deps)
    }

    fn caller() -> CallerContext {
        CallerContext { user_id: 7, tenant_id: 42 }
    }

    #[tokio::test]
    async fn test_redeem_rotates_code() {
        let (service, codes) = service();
        let issued = service.issue("42:7", "15", "99").await.unwrap();

        let redeemed = service.redeem(caller(), &issued.code).await.unwrap();
        assert_eq!(redeemed.data["title"], "Renewal");
        assert_ne!(redeemed.code, issued.code);
        assert_eq!(codes.len(), 1);

        let err = service.redeem(caller(), &issued.code).await.unwrap_err();
        assert!(matches!(err, GatewayError::AuthorizationDenied(_)));

        assert!(service.redeem(caller(), &redeemed.code).await.is_ok());
    }

    #[tokio::test]
    async fn test_reissue_supersedes_previous_code() {
        let (service, codes) = service();
        let first = service.issue("42:7", "15", "99").await.unwrap();
        let second = service.issue("42:7", "15", "99").await.unwrap();

        assert_eq!(codes.len(), 1);
        assert!(service.redeem(caller(), &first.code).await.is_err());
        assert!(service.redeem(caller(), &second.code).await.is_ok());
    }

    #[tokio::test]
    async fn test_code_of_another_user_is_rejected() {
        let (service, _) = service();
        let issued = service.issue("42:7", "15", "99").await.unwrap();

        let stranger = CallerContext { user_id: 8, tenant_id: 42 };
        let err = service.redeem(stranger, &issued.code).await.unwrap_err();
        assert!(matches!(err, GatewayError::AuthorizationDenied(_)));

        assert!(service.redeem(caller(), &issued.code).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_redemptions_single_winner() {
        let (service, codes) = service();
        let issued = service.issue("42:7", "15", "99").await.unwrap();

        let (a, b) = tokio::join!(
            service.redeem(caller(), &issued.code),
            service.redeem(caller(), &issued.code),
        );
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        assert_eq!(codes.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_rotation_keeps_redeemed_code() {
        let codes = FlakyCodes::default();
        let service = service_with(Arc::new(codes.clone()));
        let issued = service.issue("42:7", "15", "99").await.unwrap();

        codes.failing.store(1, Ordering::SeqCst);
        let err = service.redeem(caller(), &issued.code).await.unwrap_err();
        assert!(matches!(err, GatewayError::UpstreamUnavailable { .. }));
        assert_eq!(codes.inner.len(), 1);

        let redeemed = service.redeem(caller(), &issued.code).await.unwrap();
        assert_ne!(redeemed.code, issued.code);
        assert_eq!(codes.inner.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_deal_id_is_invalid() {
        let (service, codes) = service();

        for deal in ["", "../users", "15?x=1"] {
            assert!(matches!(
                service.issue("42:7", deal, "99").await,
                Err(GatewayError::ValidationFailed(_))
            ));
        }
        assert!(codes.is_empty());
    }

    #[tokio::test]
    async fn test_empty_code_is_invalid() {
        let (service, _) = service();
        assert!(matches!(
            service.redeem(caller(), "").await,
            Err(GatewayError::ValidationFailed(_))
        ));
    }
}
