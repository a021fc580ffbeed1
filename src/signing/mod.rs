//! Trust token signing subsystem.
//!
//! # Data Flow
//! ```text
//! Config assembly:
//!     → token.rs sign(server secret, {uid, cid}, short ttl)   → download/callback URLs
//!     → token.rs sign(server secret, full config, config ttl) → config token
//!
//! Inbound identity:
//!     → token.rs verify(app secret, X-App-Context) → caller context
//! ```
//!
//! # Design Decisions
//! - HS256 JWTs, the format the document server verifies natively
//! - Every token carries `iat` and `exp`
//! - Secrets are never logged

pub mod token;

pub use token::{Claims, SigningError, TokenSigner};
