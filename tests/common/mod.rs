//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use docs_gateway::collaborators::memory::{
    MemoryAccessCodeStore, MemoryCrmApi, MemoryDocumentServer, MemorySettingsStore,
    MemoryUserDirectory,
};
use docs_gateway::collaborators::{
    AccessEntry, Collaborators, CrmProfile, Language, SettingsStore, StoredUser,
    TenantDocumentSettings,
};
use docs_gateway::security::CallerContext;
use docs_gateway::signing::TokenSigner;
use docs_gateway::{GatewayConfig, HttpServer, Shutdown};

pub const APP_SECRET: &str = "integration-app-secret";
pub const TENANT: u64 = 42;
pub const ADMIN: u64 = 1;
pub const MEMBER: u64 = 2;

/// In-memory collaborators seeded with one tenant, an admin and a member.
#[derive(Clone)]
pub struct Fixture {
    pub users: MemoryUserDirectory,
    pub crm: MemoryCrmApi,
    pub settings: MemorySettingsStore,
    pub document_server: MemoryDocumentServer,
    pub access_codes: MemoryAccessCodeStore,
}

impl Fixture {
    pub async fn new(crm_latency: Duration) -> Self {
        let users = MemoryUserDirectory::new();
        let crm = MemoryCrmApi::new().with_latency(crm_latency);
        for (id, admin) in [(ADMIN, true), (MEMBER, false)] {
            let token = format!("crm-token-{id}");
            users.insert(StoredUser {
                id: format!("{TENANT}:{id}"),
                access_token: token.clone(),
                refresh_token: String::new(),
                token_type: "Bearer".into(),
                scope: String::new(),
                api_domain: "https://crm.example.com".into(),
                expires_at: 0,
            });
            crm.insert_profile(
                &token,
                CrmProfile {
                    id,
                    company_id: TENANT,
                    name: format!("User {id}"),
                    language: Language {
                        language_code: "en".into(),
                        country_code: "US".into(),
                    },
                    access: vec![AccessEntry { app: "global".into(), admin }],
                },
            );
        }
        crm.insert_deal("15", serde_json::json!({"id": 15, "title": "Renewal"}));

        let document_server = MemoryDocumentServer::new();
        document_server.accept("https://docs.example.com", "server-secret");

        Self {
            users,
            crm,
            settings: MemorySettingsStore::new(),
            document_server,
            access_codes: MemoryAccessCodeStore::new(),
        }
    }

    /// Store working document server settings for the tenant.
    pub async fn configure_tenant(&self) {
        self.settings
            .put_settings(TenantDocumentSettings {
                tenant_id: TENANT,
                server_address: "https://docs.example.com".into(),
                server_secret: "server-secret".into(),
                server_header: "Authorization".into(),
                ..Default::default()
            })
            .await
            .unwrap();
    }

    fn collaborators(&self) -> Collaborators {
        Collaborators {
            users: Arc::new(self.users.clone()),
            crm: Arc::new(self.crm.clone()),
            settings: Arc::new(self.settings.clone()),
            document_server: Arc::new(self.document_server.clone()),
            access_codes: Arc::new(self.access_codes.clone()),
        }
    }
}

pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.auth.app_secret = APP_SECRET.into();
    config.editor.gateway_url = "https://gateway.example.com".into();
    config.editor.callback_url = "https://gateway.example.com".into();
    config
}

/// A running gateway on an ephemeral port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    shutdown: Shutdown,
}

impl TestGateway {
    pub async fn start(config: GatewayConfig, fixture: &Fixture) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let shutdown = Shutdown::new();
        let server = HttpServer::new(config, fixture.collaborators()).unwrap();
        let server_shutdown = shutdown.subscribe();
        tokio::spawn(async move {
            let _ = server.run(listener, server_shutdown).await;
        });

        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .no_proxy()
            .build()
            .unwrap();

        Self {
            addr,
            client,
            shutdown,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// GET `path` as `user` of the test tenant.
    pub fn get_as(&self, user: u64, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(self.url(path))
            .header("x-app-context", context_token(user, TENANT))
    }

    pub fn post_as(&self, user: u64, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(self.url(path))
            .header("x-app-context", context_token(user, TENANT))
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// App context token as the CRM frame would send it.
pub fn context_token(user_id: u64, tenant_id: u64) -> String {
    TokenSigner::new()
        .sign(
            APP_SECRET,
            &CallerContext { user_id, tenant_id },
            Duration::from_secs(300),
        )
        .unwrap()
}

pub fn config_path(file_id: &str) -> String {
    format!("/api/config?id={file_id}&name=report.docx&key=doc-key-{file_id}&deal_id=15")
}
