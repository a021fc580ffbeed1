//! Tenant settings reads and writes.
//!
//! Writes run credential validation and the admin check as two branches
//! under one deadline, then persist. Reads coalesce on (user, tenant).

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::builder::coalescer::Coalescer;
use crate::builder::fanout::resolve_profile;
use crate::collaborators::dependencies::{CRM_API, DOCUMENT_SERVER_VALIDATION, SETTINGS_STORE};
use crate::collaborators::{Dependencies, TenantDocumentSettings};
use crate::config::{DemoConfig, GatewayConfig};
use crate::error::{GatewayError, GatewayResult};
use crate::resilience::{deadline_after, join_with_deadline, with_deadline};
use crate::security::{require_global_admin, CallerContext};
use crate::signing::token::now_secs;

/// Body of `POST /api/settings`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SettingsUpdate {
    pub doc_address: String,
    pub doc_secret: String,
    pub doc_header: String,
    pub demo_enabled: bool,
}

impl SettingsUpdate {
    /// Trim every field and check the result is storable.
    pub fn normalize(mut self, demo: &DemoConfig) -> GatewayResult<Self> {
        self.doc_address = self.doc_address.trim().trim_end_matches('/').to_string();
        self.doc_secret = self.doc_secret.trim().to_string();
        self.doc_header = self.doc_header.trim().to_string();

        if self.demo_enabled {
            if demo.address.is_empty() || demo.secret.is_empty() {
                return Err(GatewayError::ValidationFailed(
                    "demo mode is not available".to_string(),
                ));
            }
        } else if self.doc_address.is_empty() || self.doc_secret.is_empty() || self.doc_header.is_empty() {
            return Err(GatewayError::ValidationFailed(
                "doc_address, doc_secret and doc_header are required".to_string(),
            ));
        }

        if !self.doc_address.is_empty() {
            match url::Url::parse(&self.doc_address) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.has_host() => {}
                _ => {
                    return Err(GatewayError::ValidationFailed(
                        "doc_address must be an absolute http(s) URL".to_string(),
                    ))
                }
            }
        }

        Ok(self)
    }

    fn validates_server(&self) -> bool {
        !self.demo_enabled
    }
}

/// Body of `GET /api/settings`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SettingsView {
    pub doc_address: String,
    pub doc_secret: String,
    pub doc_header: String,
    pub demo_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub demo_started_at: Option<u64>,
}

impl From<TenantDocumentSettings> for SettingsView {
    fn from(settings: TenantDocumentSettings) -> Self {
        Self {
            doc_address: settings.server_address,
            doc_secret: settings.server_secret,
            doc_header: settings.server_header,
            demo_enabled: settings.demo_enabled,
            demo_started_at: settings.demo_started_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SettingsKey {
    user_id: u64,
    tenant_id: u64,
}

pub struct SettingsService {
    deps: Arc<Dependencies>,
    coalescer: Coalescer<SettingsKey, SettingsView>,
    demo: DemoConfig,
    read_budget: Duration,
    write_budget: Duration,
}

impl SettingsService {
    pub fn new(deps: Arc<Dependencies>, config: &GatewayConfig) -> Self {
        Self {
            deps,
            coalescer: Coalescer::new(),
            demo: config.demo.clone(),
            read_budget: config.timeouts.read(),
            write_budget: config.timeouts.settings_write(),
        }
    }

    /// Current settings for the caller's tenant. Admin only; a tenant with
    /// nothing stored gets an empty view.
    pub async fn get(self: &Arc<Self>, caller: CallerContext) -> GatewayResult<SettingsView> {
        let key = SettingsKey {
            user_id: caller.user_id,
            tenant_id: caller.tenant_id,
        };
        let this = Arc::clone(self);
        self.coalescer
            .coalesce(key, move || async move { this.read(caller).await })
            .await
    }

    async fn read(&self, caller: CallerContext) -> GatewayResult<SettingsView> {
        let deadline = deadline_after(self.read_budget);
        let deps = &self.deps;

        let ((), stored) = join_with_deadline(
            deadline,
            (CRM_API, require_admin(deps, caller)),
            (SETTINGS_STORE, deps.find_settings(caller.tenant_id)),
        )
        .await?;

        Ok(stored.map(SettingsView::from).unwrap_or_default())
    }

    /// Validate, check credentials and admin rights concurrently, persist.
    pub async fn save(&self, caller: CallerContext, update: SettingsUpdate) -> GatewayResult<()> {
        let update = update.normalize(&self.demo)?;
        let deadline = deadline_after(self.write_budget);
        let deps = &self.deps;

        let validate = async {
            if update.validates_server() {
                deps.validate_credentials(&update.doc_address, &update.doc_secret, &update.doc_header)
                    .await
            } else {
                Ok(())
            }
        };

        join_with_deadline(
            deadline,
            (DOCUMENT_SERVER_VALIDATION, validate),
            (CRM_API, require_admin(deps, caller)),
        )
        .await?;

        let existing = with_deadline(deadline, SETTINGS_STORE, deps.find_settings(caller.tenant_id)).await?;
        let demo_started_at = existing
            .and_then(|settings| settings.demo_started_at)
            .or_else(|| update.demo_enabled.then(now_secs));

        let settings = TenantDocumentSettings {
            tenant_id: caller.tenant_id,
            server_address: update.doc_address,
            server_secret: update.doc_secret,
            server_header: update.doc_header,
            demo_enabled: update.demo_enabled,
            demo_started_at,
        };
        with_deadline(deadline, SETTINGS_STORE, deps.put_settings(settings)).await?;

        tracing::info!(
            tenant_id = caller.tenant_id,
            demo = update.demo_enabled,
            "Tenant settings saved"
        );
        Ok(())
    }
}

async fn require_admin(deps: &Dependencies, caller: CallerContext) -> GatewayResult<()> {
    let (_, profile) = resolve_profile(deps, caller).await?;
    require_global_admin(&profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::memory::{
        MemoryAccessCodeStore, MemoryCrmApi, MemoryDocumentServer, MemorySettingsStore,
        MemoryUserDirectory,
    };
    use crate::collaborators::{AccessEntry, Collaborators, CrmProfile, Language, SettingsStore, StoredUser};
    use crate::resilience::BreakerSettings;

    struct Fixture {
        service: Arc<SettingsService>,
        store: MemorySettingsStore,
        crm: MemoryCrmApi,
    }

    fn profile(id: u64, admin: bool) -> CrmProfile {
        CrmProfile {
            id,
            company_id: 42,
            name: format!("user {id}"),
            language: Language::default(),
            access: vec![AccessEntry { app: "global".into(), admin }],
        }
    }

    fn user(id: u64) -> StoredUser {
        StoredUser {
            id: format!("42:{id}"),
            access_token: format!("token-{id}"),
            refresh_token: String::new(),
            token_type: "Bearer".into(),
            scope: String::new(),
            api_domain: "https://crm.example.com".into(),
            expires_at: 0,
        }
    }

    fn fixture(demo: DemoConfig) -> Fixture {
        let users = MemoryUserDirectory::new();
        users.insert(user(1));
        users.insert(user(2));

        let crm = MemoryCrmApi::new();
        crm.insert_profile("token-1", profile(1, true));
        crm.insert_profile("token-2", profile(2, false));

        let server = MemoryDocumentServer::new();
        server.accept("https://docs.example.com", "good-secret");

        let store = MemorySettingsStore::new();
        let deps = Arc::new(Dependencies::new(
            Collaborators {
                users: Arc::new(users),
                crm: Arc::new(crm.clone()),
                settings: Arc::new(store.clone()),
                document_server: Arc::new(server),
                access_codes: Arc::new(MemoryAccessCodeStore::new()),
            },
            BreakerSettings::default(),
        ));

        let mut config = GatewayConfig::default();
        config.demo = demo;
        Fixture {
            service: Arc::new(SettingsService::new(deps, &config)),
            store,
            crm,
        }
    }

    fn admin() -> CallerContext {
        CallerContext { user_id: 1, tenant_id: 42 }
    }

    fn update(address: &str, secret: &str) -> SettingsUpdate {
        SettingsUpdate {
            doc_address: address.into(),
            doc_secret: secret.into(),
            doc_header: "Authorization".into(),
            demo_enabled: false,
        }
    }

    fn demo_config() -> DemoConfig {
        DemoConfig {
            address: "https://demo.example.com".into(),
            secret: "demo-secret".into(),
            ..DemoConfig::default()
        }
    }

    #[tokio::test]
    async fn test_admin_saves_valid_credentials() {
        let f = fixture(DemoConfig::default());

        f.service
            .save(admin(), update("  https://docs.example.com/ ", " good-secret "))
            .await
            .unwrap();

        let stored = f.store.get_settings(42).await.unwrap();
        assert_eq!(stored.server_address, "https://docs.example.com");
        assert_eq!(stored.server_secret, "good-secret");
        assert_eq!(stored.demo_started_at, None);
    }

    #[tokio::test]
    async fn test_rejected_credentials_are_not_stored() {
        let f = fixture(DemoConfig::default());

        let err = f
            .service
            .save(admin(), update("https://docs.example.com", "wrong"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::UpstreamUnavailable { status: Some(403), .. }));
        assert!(f.store.get_settings(42).await.is_err());
    }

    #[tokio::test]
    async fn test_non_admin_cannot_save() {
        let f = fixture(DemoConfig::default());

        let caller = CallerContext { user_id: 2, tenant_id: 42 };
        let err = f
            .service
            .save(caller, update("https://docs.example.com", "good-secret"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::AuthorizationDenied(_)));
    }

    #[tokio::test]
    async fn test_validation_rejects_before_upstream() {
        let f = fixture(DemoConfig::default());

        for bad in [update("", "s"), update("ftp://docs.example.com", "s"), update("docs", "s")] {
            let err = f.service.save(admin(), bad).await.unwrap_err();
            assert!(matches!(err, GatewayError::ValidationFailed(_)));
        }
        assert_eq!(f.crm.profile_calls(), 0);
    }

    #[tokio::test]
    async fn test_demo_mode_skips_validation_and_keeps_start() {
        let f = fixture(demo_config());

        let demo = SettingsUpdate {
            demo_enabled: true,
            ..SettingsUpdate::default()
        };
        f.service.save(admin(), demo.clone()).await.unwrap();
        let started = f.store.get_settings(42).await.unwrap().demo_started_at;
        assert!(started.is_some());

        f.service.save(admin(), demo).await.unwrap();
        assert_eq!(f.store.get_settings(42).await.unwrap().demo_started_at, started);
    }

    #[tokio::test]
    async fn test_demo_mode_stores_unchecked_address() {
        let f = fixture(demo_config());

        let demo = SettingsUpdate {
            demo_enabled: true,
            ..update("https://docs.example.com", "wrong")
        };
        f.service.save(admin(), demo).await.unwrap();

        let stored = f.store.get_settings(42).await.unwrap();
        assert!(stored.demo_enabled);
        assert_eq!(stored.server_secret, "wrong");
        let server = stored.resolve_server(&demo_config(), now_secs()).unwrap();
        assert!(server.demo);
        assert_eq!(server.address, "https://demo.example.com");
    }

    #[tokio::test]
    async fn test_demo_mode_requires_gateway_demo() {
        let f = fixture(DemoConfig::default());

        let demo = SettingsUpdate {
            demo_enabled: true,
            ..SettingsUpdate::default()
        };
        assert!(matches!(
            f.service.save(admin(), demo).await,
            Err(GatewayError::ValidationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_get_returns_empty_view_when_unset() {
        let f = fixture(DemoConfig::default());

        assert_eq!(f.service.get(admin()).await.unwrap(), SettingsView::default());

        f.service
            .save(admin(), update("https://docs.example.com", "good-secret"))
            .await
            .unwrap();
        let view = f.service.get(admin()).await.unwrap();
        assert_eq!(view.doc_address, "https://docs.example.com");
        assert_eq!(view.doc_header, "Authorization");
    }

    #[tokio::test]
    async fn test_get_is_admin_only() {
        let f = fixture(DemoConfig::default());

        let caller = CallerContext { user_id: 2, tenant_id: 42 };
        assert!(matches!(
            f.service.get(caller).await,
            Err(GatewayError::AuthorizationDenied(_))
        ));
    }
}
