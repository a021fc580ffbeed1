//! Signed, time-bounded trust tokens.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Errors that can occur while issuing or checking tokens.
#[derive(Debug, Error)]
pub enum SigningError {
    /// Refuse to sign with an empty key.
    #[error("signing secret is empty")]
    EmptySecret,

    #[error("failed to encode token: {0}")]
    Encode(String),

    /// Bad signature, expired, or malformed.
    #[error("token rejected: {0}")]
    Invalid(String),
}

/// Token payload: the caller's claims plus issue and expiry times (seconds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims<C> {
    pub iat: u64,
    pub exp: u64,
    #[serde(flatten)]
    pub body: C,
}

/// Issues and verifies HS256 tokens.
#[derive(Debug, Clone)]
pub struct TokenSigner {
    /// Clock skew tolerated when checking `exp`.
    leeway_secs: u64,
}

impl TokenSigner {
    pub fn new() -> Self {
        Self { leeway_secs: 30 }
    }

    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway_secs = leeway.as_secs();
        self
    }

    /// Sign `body` with `secret`, valid for `ttl` from now.
    pub fn sign<C: Serialize>(
        &self,
        secret: &str,
        body: &C,
        ttl: Duration,
    ) -> Result<String, SigningError> {
        if secret.is_empty() {
            return Err(SigningError::EmptySecret);
        }

        let iat = now_secs();
        let claims = Claims {
            iat,
            exp: iat + ttl.as_secs(),
            body,
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(|e| SigningError::Encode(e.to_string()))
    }

    /// Check signature and expiry, returning the claims.
    pub fn verify<C: DeserializeOwned>(
        &self,
        secret: &str,
        token: &str,
    ) -> Result<Claims<C>, SigningError> {
        if secret.is_empty() {
            return Err(SigningError::EmptySecret);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = self.leeway_secs;

        decode::<Claims<C>>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| SigningError::Invalid(e.to_string()))
    }
}

impl Default for TokenSigner {
    fn default() -> Self {
        Self::new()
    }
}

/// Seconds since the Unix epoch.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
