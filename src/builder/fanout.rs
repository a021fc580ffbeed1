//! Fan-out of the two independent upstream lookups a config needs.
//!
//! ```text
//!   (A) user directory ──▶ CRM profile ──┐
//!                                         ├──▶ Resolved
//!   (B) settings store ──▶ server creds ─┘
//! ```
//!
//! Both branches share one deadline. The first failure wins and the other
//! branch is dropped.

use tokio::time::Instant;

use crate::collaborators::dependencies::{CRM_API, SETTINGS_STORE};
use crate::collaborators::{
    CrmProfile, Dependencies, ServerCredentials, StoredUser, TenantDocumentSettings, UserIdentity,
};
use crate::config::DemoConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::resilience::join_with_deadline;
use crate::security::CallerContext;
use crate::signing::token::now_secs;

/// Everything upstream knows about one caller.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub identity: UserIdentity,
    pub settings: TenantDocumentSettings,
    pub server: ServerCredentials,
}

/// Resolve the caller's identity and tenant settings concurrently.
pub async fn resolve(
    deps: &Dependencies,
    demo: &DemoConfig,
    caller: CallerContext,
    deadline: Instant,
) -> GatewayResult<Resolved> {
    let (identity, (settings, server)) = join_with_deadline(
        deadline,
        (CRM_API, resolve_identity(deps, caller)),
        (SETTINGS_STORE, resolve_settings(deps, demo, caller.tenant_id)),
    )
    .await?;

    Ok(Resolved {
        identity,
        settings,
        server,
    })
}

/// Branch A: stored credentials, then the CRM profile they unlock.
pub async fn resolve_identity(deps: &Dependencies, caller: CallerContext) -> GatewayResult<UserIdentity> {
    let (stored, profile) = resolve_profile(deps, caller).await?;
    Ok(UserIdentity::from_profile(&profile, &stored))
}

/// Stored credentials and the caller's CRM profile. The profile must belong
/// to the caller's tenant.
pub async fn resolve_profile(
    deps: &Dependencies,
    caller: CallerContext,
) -> GatewayResult<(StoredUser, CrmProfile)> {
    let stored = deps.get_user(&caller.composite_id()).await?;
    let profile = deps.get_user_profile(&stored.credentials()).await?;

    if profile.company_id != caller.tenant_id {
        tracing::warn!(
            tenant_id = caller.tenant_id,
            profile_tenant = profile.company_id,
            "CRM profile belongs to another tenant"
        );
        return Err(GatewayError::AuthorizationDenied("tenant mismatch".to_string()));
    }

    Ok((stored, profile))
}

/// Branch B: tenant settings and the document server they resolve to.
async fn resolve_settings(
    deps: &Dependencies,
    demo: &DemoConfig,
    tenant_id: u64,
) -> GatewayResult<(TenantDocumentSettings, ServerCredentials)> {
    let settings = deps.get_settings(tenant_id).await?;
    let server = settings.resolve_server(demo, now_secs())?;
    Ok((settings, server))
}
