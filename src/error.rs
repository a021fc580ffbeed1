//! Gateway error taxonomy and its HTTP mapping.
//!
//! Every failure path in the gateway ends up as one of these kinds. Errors are
//! `Clone` so a coalesced computation can hand the same failure to every
//! waiter.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::signing::SigningError;

/// Why admission control turned a request away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Global or per-origin quota exhausted for the current window.
    RateLimited,
    /// The dependency's circuit breaker is open.
    CircuitOpen,
    /// The dependency already has its maximum number of calls in flight.
    ConcurrencyLimit,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::RateLimited => "rate_limited",
            RejectReason::CircuitOpen => "circuit_open",
            RejectReason::ConcurrencyLimit => "concurrency_limit",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by the gateway to its callers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// Rate limit or circuit breaker said no. Never retried internally.
    #[error("admission rejected: {reason}")]
    AdmissionRejected {
        reason: RejectReason,
        dependency: Option<&'static str>,
    },

    /// A dependency did not answer before the deadline.
    #[error("upstream {dependency} timed out")]
    UpstreamTimeout { dependency: &'static str },

    /// A dependency answered with a failure.
    #[error("upstream {dependency} failed: {message}")]
    UpstreamUnavailable {
        dependency: &'static str,
        status: Option<u16>,
        message: String,
    },

    /// The tenant has no usable document server settings.
    #[error("tenant {tenant_id} has no document server configured")]
    NotConfigured { tenant_id: String },

    /// Malformed input, rejected before any upstream call.
    #[error("invalid request: {0}")]
    ValidationFailed(String),

    /// No valid identity context was attached to the request.
    #[error("missing or invalid identity context")]
    Unauthenticated,

    /// Authenticated, but lacking the required privilege.
    #[error("access denied: {0}")]
    AuthorizationDenied(String),

    /// Token signing failed; no partial config is ever returned.
    #[error("signing failed: {0}")]
    SigningFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    pub fn rate_limited() -> Self {
        GatewayError::AdmissionRejected {
            reason: RejectReason::RateLimited,
            dependency: None,
        }
    }

    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::AdmissionRejected { .. } => "admission_rejected",
            GatewayError::UpstreamTimeout { .. } => "upstream_timeout",
            GatewayError::UpstreamUnavailable { .. } => "upstream_unavailable",
            GatewayError::NotConfigured { .. } => "not_configured",
            GatewayError::ValidationFailed(_) => "validation_failed",
            GatewayError::Unauthenticated => "unauthenticated",
            GatewayError::AuthorizationDenied(_) => "authorization_denied",
            GatewayError::SigningFailed(_) => "signing_failed",
            GatewayError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::AdmissionRejected {
                reason: RejectReason::RateLimited,
                ..
            } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::AdmissionRejected { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::UpstreamTimeout { .. } => StatusCode::REQUEST_TIMEOUT,
            GatewayError::UpstreamUnavailable { status, .. } => status
                .and_then(|code| StatusCode::from_u16(code).ok())
                .filter(|code| code.is_client_error() || code.is_server_error())
                .unwrap_or(StatusCode::UNAUTHORIZED),
            GatewayError::NotConfigured { .. } => StatusCode::NOT_FOUND,
            GatewayError::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthenticated | GatewayError::AuthorizationDenied(_) => {
                StatusCode::FORBIDDEN
            }
            GatewayError::SigningFailed(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn code(&self) -> &'static str {
        match self {
            GatewayError::AdmissionRejected {
                reason: RejectReason::RateLimited,
                ..
            } => "ERR_RATE_LIMITED",
            GatewayError::AdmissionRejected { .. } => "ERR_CIRCUIT_OPEN",
            GatewayError::UpstreamTimeout { .. } => "ERR_UPSTREAM_TIMEOUT",
            GatewayError::UpstreamUnavailable { .. } => "ERR_UPSTREAM_UNAVAILABLE",
            GatewayError::NotConfigured { .. } => "ERR_NOT_CONFIGURED",
            GatewayError::ValidationFailed(_) => "ERR_VALIDATION",
            GatewayError::Unauthenticated => "ERR_UNAUTHENTICATED",
            GatewayError::AuthorizationDenied(_) => "ERR_FORBIDDEN",
            GatewayError::SigningFailed(_) | GatewayError::Internal(_) => "ERR_INTERNAL",
        }
    }

    fn retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::AdmissionRejected { .. }
                | GatewayError::UpstreamTimeout { .. }
                | GatewayError::UpstreamUnavailable { .. }
        )
    }

    /// Message safe to show to the caller. Internal details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            GatewayError::SigningFailed(_) | GatewayError::Internal(_) => {
                "internal error".to_string()
            }
            GatewayError::UpstreamUnavailable { dependency, .. } => {
                format!("upstream {} unavailable", dependency)
            }
            other => other.to_string(),
        }
    }
}

impl From<SigningError> for GatewayError {
    fn from(err: SigningError) -> Self {
        GatewayError::SigningFailed(err.to_string())
    }
}

/// JSON body attached to every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    pub retryable: bool,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "Request failed");
        } else {
            tracing::debug!(kind = self.kind(), error = %self, "Request rejected");
        }

        let body = ErrorBody {
            code: self.code(),
            message: self.public_message(),
            retryable: self.retryable(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(GatewayError::rate_limited().status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            GatewayError::AdmissionRejected {
                reason: RejectReason::CircuitOpen,
                dependency: Some("crm-api"),
            }
            .status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            GatewayError::UpstreamTimeout { dependency: "crm-api" }.status(),
            StatusCode::REQUEST_TIMEOUT
        );
        assert_eq!(GatewayError::Unauthenticated.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            GatewayError::SigningFailed("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_upstream_status_is_embedded_when_present() {
        let err = GatewayError::UpstreamUnavailable {
            dependency: "settings-store",
            status: Some(404),
            message: "missing".into(),
        };
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = GatewayError::UpstreamUnavailable {
            dependency: "settings-store",
            status: None,
            message: "connection reset".into(),
        };
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let err = GatewayError::UpstreamUnavailable {
            dependency: "settings-store",
            status: Some(200),
            message: "odd".into(),
        };
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_internal_details_are_not_exposed() {
        let err = GatewayError::SigningFailed("secret=abc".into());
        assert_eq!(err.public_message(), "internal error");
    }
}
