//! Common Result Type
//!
//! Type alias for blueprint results.

use super::error::BlueprintError;

/// Blueprint result type
pub type BlueprintResult<T> = Result<T, BlueprintError>;
