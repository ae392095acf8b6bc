//! Common Utilities
//!
//! Shared error handling and path resolution used across the crate.

pub mod error;
pub mod paths;
pub mod result;

pub use error::{BlueprintError, ErrorCode};
pub use paths::{blueprint_dir, config_path, cstar_dir};
pub use result::BlueprintResult;
