//! Format capability resolution.
//!
//! # Data Flow
//! ```text
//! file name
//!     → table.rs extension_of() / resolve()  → FormatCapability (or none)
//!     → permissions.rs for_format()           → Permissions block
//! ```
//!
//! # Design Decisions
//! - The table is static, built once, and shared without locking
//! - An unknown extension is not an error here; callers decide whether it is

pub mod permissions;
pub mod table;

pub use permissions::Permissions;
pub use table::{extension_of, DocumentType, FormatCapability, FormatTable};
