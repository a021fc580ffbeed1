//! Caller identity from the CRM-signed app context token.
//!
//! The CRM frame attaches a JWT to every request it proxies. The token is
//! verified with the application secret and its `userId` / `companyId`
//! claims become the [`CallerContext`] every `/api` handler works from.

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{request::Parts, HeaderName, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::collaborators::CrmProfile;
use crate::config::AuthConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::signing::TokenSigner;

/// Authenticated caller attached to the request extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallerContext {
    #[serde(rename = "userId")]
    pub user_id: u64,
    #[serde(rename = "companyId")]
    pub tenant_id: u64,
}

impl CallerContext {
    /// Key the user directory stores this caller's credentials under.
    pub fn composite_id(&self) -> String {
        format!("{}:{}", self.tenant_id, self.user_id)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CallerContext {
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerContext>()
            .copied()
            .ok_or(GatewayError::Unauthenticated)
    }
}

/// Verifies app context tokens.
#[derive(Debug, Clone)]
pub struct IdentityVerifier {
    header: HeaderName,
    secret: String,
    signer: TokenSigner,
}

impl IdentityVerifier {
    pub fn new(config: &AuthConfig) -> GatewayResult<Self> {
        let header = HeaderName::try_from(config.context_header.as_str())
            .map_err(|e| GatewayError::Internal(format!("invalid context header name: {}", e)))?;
        Ok(Self {
            header,
            secret: config.app_secret.clone(),
            signer: TokenSigner::new(),
        })
    }

    pub fn verify(&self, token: &str) -> GatewayResult<CallerContext> {
        let claims = self
            .signer
            .verify::<CallerContext>(&self.secret, token)
            .map_err(|e| {
                tracing::debug!(error = %e, "App context rejected");
                GatewayError::Unauthenticated
            })?;
        Ok(claims.body)
    }

    fn extract(&self, request: &Request<Body>) -> GatewayResult<CallerContext> {
        let token = request
            .headers()
            .get(&self.header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(GatewayError::Unauthenticated)?;
        self.verify(token)
    }
}

/// Middleware attaching [`CallerContext`] or rejecting with 403.
pub async fn identity_middleware(
    State(verifier): State<Arc<IdentityVerifier>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    match verifier.extract(&request) {
        Ok(caller) => {
            request.extensions_mut().insert(caller);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}

/// Settings access requires an explicit global admin entry.
pub fn require_global_admin(profile: &CrmProfile) -> GatewayResult<()> {
    let is_admin = profile
        .access
        .iter()
        .any(|entry| entry.app == "global" && entry.admin);

    if is_admin {
        Ok(())
    } else {
        Err(GatewayError::AuthorizationDenied(
            "global admin access required".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::AccessEntry;
    use std::time::Duration;

    fn verifier() -> IdentityVerifier {
        IdentityVerifier::new(&AuthConfig {
            context_header: "x-app-context".to_string(),
            app_secret: "app-secret".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_valid_token_yields_context() {
        let caller = CallerContext { user_id: 7, tenant_id: 42 };
        let token = TokenSigner::new()
            .sign("app-secret", &caller, Duration::from_secs(60))
            .unwrap();

        let verified = verifier().verify(&token).unwrap();
        assert_eq!(verified, caller);
        assert_eq!(verified.composite_id(), "42:7");
    }

    #[test]
    fn test_foreign_token_is_unauthenticated() {
        let token = TokenSigner::new()
            .sign("other", &CallerContext { user_id: 1, tenant_id: 1 }, Duration::from_secs(60))
            .unwrap();
        assert_eq!(verifier().verify(&token), Err(GatewayError::Unauthenticated));
        assert_eq!(verifier().verify("garbage"), Err(GatewayError::Unauthenticated));
    }

    #[test]
    fn test_missing_header_is_unauthenticated() {
        let request = Request::builder().uri("/api/config").body(Body::empty()).unwrap();
        assert_eq!(verifier().extract(&request), Err(GatewayError::Unauthenticated));
    }

    #[test]
    fn test_admin_check() {
        let mut profile = CrmProfile {
            id: 7,
            company_id: 42,
            name: "Ada".into(),
            language: Default::default(),
            access: vec![AccessEntry { app: "sales".into(), admin: true }],
        };
        assert!(matches!(
            require_global_admin(&profile),
            Err(GatewayError::AuthorizationDenied(_))
        ));

        profile.access.push(AccessEntry { app: "global".into(), admin: true });
        assert!(require_global_admin(&profile).is_ok());
    }
}
