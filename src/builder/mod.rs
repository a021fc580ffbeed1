//! Configuration-build orchestration.
//!
//! # Data Flow
//! ```text
//! BuildRequest (validated)
//!     → coalescer.rs (join an identical in-flight build)
//!     → fanout.rs (identity ‖ tenant settings, one deadline)
//!     → access code issued for (user, file)
//!     → assembler.rs (URLs, permissions, customization, signing)
//!     → ConfigResult to every waiter
//! ```
//!
//! # Design Decisions
//! - Validation happens before coalescing, so bad input never reaches upstream
//! - The whole build, access code included, runs under the build budget
//! - Settings reads and writes live in settings.rs and reuse the same pieces

pub mod assembler;
pub mod coalescer;
pub mod fanout;
pub mod settings;

use std::sync::Arc;
use std::time::Duration;

use crate::access::{check_deal_id, AccessCodeService};
use crate::collaborators::dependencies::ACCESS_CODES;
use crate::collaborators::Dependencies;
use crate::config::{DemoConfig, GatewayConfig};
use crate::error::{GatewayError, GatewayResult};
use crate::resilience::{deadline_after, with_deadline};
use crate::security::CallerContext;

pub use assembler::{ConfigAssembler, ConfigResult, DeviceType, DownloadClaims};
pub use coalescer::Coalescer;
pub use fanout::Resolved;
pub use settings::{SettingsService, SettingsUpdate, SettingsView};

/// Longest document key the editor accepts.
const MAX_DOC_KEY_LEN: usize = 128;

/// One admitted request for an editor config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub user_id: u64,
    pub tenant_id: u64,
    pub deal_id: String,
    pub file_id: String,
    pub file_name: String,
    pub doc_key: String,
    pub user_agent: String,
    pub dark_mode: bool,
}

impl BuildRequest {
    pub fn caller(&self) -> CallerContext {
        CallerContext {
            user_id: self.user_id,
            tenant_id: self.tenant_id,
        }
    }

    /// Requests that would produce the same signed config share a key.
    pub fn key(&self) -> ConfigKey {
        ConfigKey {
            user_id: self.user_id,
            tenant_id: self.tenant_id,
            file_id: self.file_id.clone(),
            file_name: self.file_name.clone(),
            doc_key: self.doc_key.clone(),
            deal_id: self.deal_id.clone(),
            dark_mode: self.dark_mode,
            device: DeviceType::from_user_agent(&self.user_agent),
        }
    }
}

/// Coalescing key for config builds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigKey {
    pub user_id: u64,
    pub tenant_id: u64,
    pub file_id: String,
    pub file_name: String,
    pub doc_key: String,
    pub deal_id: String,
    pub dark_mode: bool,
    pub device: DeviceType,
}

/// Builds editor configs.
pub struct ConfigService {
    deps: Arc<Dependencies>,
    assembler: ConfigAssembler,
    access: AccessCodeService,
    coalescer: Coalescer<ConfigKey, ConfigResult>,
    demo: DemoConfig,
    budget: Duration,
    max_filename_len: usize,
    require_known_format: bool,
    issue_access_codes: bool,
}

impl ConfigService {
    pub fn new(deps: Arc<Dependencies>, access: AccessCodeService, config: &GatewayConfig) -> Self {
        Self {
            deps,
            assembler: ConfigAssembler::new(config.editor.clone()),
            access,
            coalescer: Coalescer::new(),
            demo: config.demo.clone(),
            budget: config.timeouts.config_build(),
            max_filename_len: config.security.max_filename_len,
            require_known_format: config.editor.require_known_format,
            issue_access_codes: config.editor.issue_access_codes,
        }
    }

    /// Reject malformed requests before any upstream call.
    pub fn validate(&self, request: &BuildRequest) -> GatewayResult<()> {
        if request.file_name.is_empty() {
            return Err(GatewayError::ValidationFailed("file name is required".into()));
        }
        if request.file_name.chars().count() > self.max_filename_len {
            return Err(GatewayError::ValidationFailed(format!(
                "file name is longer than {} characters",
                self.max_filename_len
            )));
        }
        if request.file_id.is_empty() {
            return Err(GatewayError::ValidationFailed("file id is required".into()));
        }
        if request.doc_key.is_empty() || request.doc_key.len() > MAX_DOC_KEY_LEN {
            return Err(GatewayError::ValidationFailed("document key is missing or too long".into()));
        }
        check_deal_id(&request.deal_id)?;
        if self.require_known_format && self.assembler.formats().resolve_file(&request.file_name).is_none() {
            return Err(GatewayError::ValidationFailed("unsupported file type".into()));
        }
        Ok(())
    }

    /// Validate, then join or start the build for the request's key.
    pub async fn build(self: &Arc<Self>, request: BuildRequest) -> GatewayResult<ConfigResult> {
        self.validate(&request)?;

        let this = Arc::clone(self);
        self.coalescer
            .coalesce(request.key(), move || async move { this.build_now(request).await })
            .await
    }

    async fn build_now(&self, request: BuildRequest) -> GatewayResult<ConfigResult> {
        let deadline = deadline_after(self.budget);
        let resolved = fanout::resolve(&self.deps, &self.demo, request.caller(), deadline).await?;

        let access_code = if self.issue_access_codes {
            let code = with_deadline(
                deadline,
                ACCESS_CODES,
                self.access.issue(
                    &resolved.identity.composite_id(),
                    &request.deal_id,
                    &request.file_id,
                ),
            )
            .await?;
            Some(code.code)
        } else {
            None
        };

        let config = self.assembler.assemble(&request, &resolved, access_code)?;
        tracing::info!(
            tenant_id = request.tenant_id,
            file_id = %request.file_id,
            demo = resolved.server.demo,
            "Editor config built"
        );
        Ok(config)
    }
}
