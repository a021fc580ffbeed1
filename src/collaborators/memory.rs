//! In-memory collaborator adapters.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::collaborators::{
    AccessCode, AccessCodeStore, CollaboratorError, CollaboratorResult, CrmApi, CrmCredentials,
    CrmProfile, DocumentServer, SettingsStore, StoredUser, TenantDocumentSettings, UserDirectory,
};
use crate::config::UserSeed;

/// User directory backed by a concurrent map.
#[derive(Debug, Clone, Default)]
pub struct MemoryUserDirectory {
    users: Arc<DashMap<String, StoredUser>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A directory holding the users listed in the configuration.
    pub fn seeded(seeds: &[UserSeed]) -> Self {
        let directory = Self::new();
        for seed in seeds {
            directory.insert(StoredUser::from(seed));
        }
        directory
    }

    pub fn insert(&self, user: StoredUser) {
        self.users.insert(user.id.clone(), user);
    }

    pub fn remove(&self, composite_id: &str) -> Option<StoredUser> {
        self.users.remove(composite_id).map(|(_, user)| user)
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn get_user(&self, composite_id: &str) -> CollaboratorResult<StoredUser> {
        self.users
            .get(composite_id)
            .map(|entry| entry.value().clone())
            .ok_or(CollaboratorError::NotFound)
    }
}

/// Settings store backed by a concurrent map.
#[derive(Debug, Clone, Default)]
pub struct MemorySettingsStore {
    settings: Arc<DashMap<u64, TenantDocumentSettings>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn get_settings(&self, tenant_id: u64) -> CollaboratorResult<TenantDocumentSettings> {
        self.settings
            .get(&tenant_id)
            .map(|entry| entry.value().clone())
            .ok_or(CollaboratorError::NotFound)
    }

    async fn put_settings(&self, settings: TenantDocumentSettings) -> CollaboratorResult<()> {
        self.settings.insert(settings.tenant_id, settings);
        Ok(())
    }
}

/// CRM stand-in keyed by access token. Counts profile lookups.
#[derive(Debug, Clone, Default)]
pub struct MemoryCrmApi {
    profiles: Arc<DashMap<String, CrmProfile>>,
    deals: Arc<DashMap<String, serde_json::Value>>,
    latency: Duration,
    profile_calls: Arc<AtomicUsize>,
}

impl MemoryCrmApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn insert_profile(&self, access_token: &str, profile: CrmProfile) {
        self.profiles.insert(access_token.to_string(), profile);
    }

    pub fn insert_deal(&self, deal_id: &str, deal: serde_json::Value) {
        self.deals.insert(deal_id.to_string(), deal);
    }

    pub fn profile_calls(&self) -> usize {
        self.profile_calls.load(Ordering::SeqCst)
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl CrmApi for MemoryCrmApi {
    async fn get_user_profile(&self, credentials: &CrmCredentials) -> CollaboratorResult<CrmProfile> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        self.profiles
            .get(&credentials.access_token)
            .map(|entry| entry.value().clone())
            .ok_or(CollaboratorError::Status {
                code: 401,
                message: "unknown access token".to_string(),
            })
    }

    async fn get_deal(
        &self,
        credentials: &CrmCredentials,
        deal_id: &str,
    ) -> CollaboratorResult<serde_json::Value> {
        self.delay().await;
        if !self.profiles.contains_key(&credentials.access_token) {
            return Err(CollaboratorError::Status {
                code: 401,
                message: "unknown access token".to_string(),
            });
        }
        self.deals
            .get(deal_id)
            .map(|entry| entry.value().clone())
            .ok_or(CollaboratorError::NotFound)
    }
}

/// Document server stand-in accepting registered (address, secret) pairs.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentServer {
    accepted: Arc<DashMap<String, String>>,
}

impl MemoryDocumentServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(&self, address: &str, secret: &str) {
        self.accepted.insert(address.to_string(), secret.to_string());
    }
}

#[async_trait]
impl DocumentServer for MemoryDocumentServer {
    async fn validate_credentials(
        &self,
        address: &str,
        secret: &str,
        _header: &str,
    ) -> CollaboratorResult<()> {
        match self.accepted.get(address) {
            Some(expected) if expected.value() == secret => Ok(()),
            _ => Err(CollaboratorError::Status {
                code: 403,
                message: "document server rejected credentials".to_string(),
            }),
        }
    }
}

#[derive(Debug, Default)]
struct CodeIndex {
    by_code: HashMap<String, AccessCode>,
    by_pair: HashMap<(String, String), String>,
}

/// Access code store. Both indexes live under one lock so superseding a
/// pair's code is atomic.
#[derive(Debug, Clone, Default)]
pub struct MemoryAccessCodeStore {
    index: Arc<Mutex<CodeIndex>>,
}

impl MemoryAccessCodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CodeIndex> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl AccessCodeStore for MemoryAccessCodeStore {
    async fn upsert(&self, code: AccessCode) -> CollaboratorResult<()> {
        let mut index = self.lock();
        let pair = (code.user_id.clone(), code.file_id.clone());
        if let Some(previous) = index.by_pair.insert(pair, code.code.clone()) {
            index.by_code.remove(&previous);
        }
        index.by_code.insert(code.code.clone(), code);
        Ok(())
    }

    async fn get(&self, code: &str) -> CollaboratorResult<AccessCode> {
        self.lock()
            .by_code
            .get(code)
            .cloned()
            .ok_or(CollaboratorError::NotFound)
    }

    async fn remove(&self, code: &str) -> CollaboratorResult<()> {
        let mut index = self.lock();
        let removed = index.by_code.remove(code).ok_or(CollaboratorError::NotFound)?;
        let pair = (removed.user_id, removed.file_id);
        if index.by_pair.get(&pair).map(String::as_str) == Some(code) {
            index.by_pair.remove(&pair);
        }
        Ok(())
    }
}
