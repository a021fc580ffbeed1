//! HTTP surface of the gateway.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (request id, trace, timeout, body limit, security headers)
//!     → /health                       (no admission, no identity)
//!     → /api/* → admission → identity → handlers.rs
//!     → builder / access services
//!     → JSON response or GatewayError body
//! ```

pub mod handlers;
pub mod server;

pub use server::{AppState, HttpServer};
