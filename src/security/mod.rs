//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming /api request:
//!     → rate_limit.rs (per-origin quota, then global quota)
//!     → identity.rs (verify app context token, attach CallerContext)
//!     → handler
//! ```
//!
//! # Design Decisions
//! - Fail closed: a missing or invalid identity is a 403, never a guest
//! - Admission runs before identity so floods are cheap to reject
//! - No trust in client input

pub mod identity;
pub mod rate_limit;

pub use identity::{identity_middleware, require_global_admin, CallerContext, IdentityVerifier};
pub use rate_limit::{admission_middleware, client_origin, AdmissionController};
