//! Document editor config gateway.
//!
//! Sits between a CRM frame and a document server. For every editor open it
//! resolves the caller's CRM identity and the tenant's document server
//! settings concurrently, derives permissions from the file type, and returns
//! a config signed with the tenant's server secret.
//!
//! ```text
//!   CRM frame ──▶ admission ──▶ identity ──▶ coalescer ──▶ fan-out ──┬──▶ user directory → CRM API
//!                 (rate limit)  (app JWT)    (per key)     (deadline) └──▶ settings store
//!                                                              │
//!                                                              ▼
//!                                    assembler (formats + access code + signing) ──▶ ConfigResult
//! ```

// Request path
pub mod http;
pub mod builder;
pub mod access;
pub mod formats;
pub mod signing;

// Outbound calls
pub mod collaborators;
pub mod resilience;

// Cross-cutting concerns
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
