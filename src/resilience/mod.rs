//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound dependency call:
//!     → timeouts.rs (request-wide deadline shared by all branches)
//!     → circuit_breaker.rs (fail fast when open, per-call timeout,
//!       concurrency ceiling, rolling error window)
//! ```
//!
//! # Design Decisions
//! - Every external call has a deadline
//! - One breaker per named dependency, owned by whoever makes the calls
//! - No retries: a rejected or failed call is reported, never replayed

pub mod circuit_breaker;
pub mod timeouts;

pub use circuit_breaker::{BreakerError, BreakerSettings, BreakerState, CircuitBreaker};
pub use timeouts::{deadline_after, join_with_deadline, with_deadline};
