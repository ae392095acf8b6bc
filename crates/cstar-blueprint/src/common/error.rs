//! Common Error Types
//!
//! Blueprint validation errors with stable numeric code mapping.

use std::io;
use std::path::PathBuf;

/// Stable error codes
///
/// The CLI uses these as process exit statuses, so values must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Structural and semantic validation
    MalformedManifest = 2,
    InvalidRange = 3,
    InvalidParameter = 4,
    InvalidHash = 5,

    // Data integrity
    HashMismatch = 6,

    // Input handling
    ParseError = 7,
    IoError = 8,
    TooLarge = 9,
    ConfigError = 10,
}

impl ErrorCode {
    pub fn code(&self) -> i32 {
        *self as i32
    }
}

/// Blueprint error type
///
/// Validation variants carry the dotted field path of the offending entry,
/// e.g. `components[1].component.discretization.n_procs_x`.
#[derive(Debug, thiserror::Error)]
pub enum BlueprintError {
    #[error("malformed manifest at `{path}`: {reason}")]
    MalformedManifest { path: String, reason: String },

    #[error("invalid date range at `{path}`: {reason}")]
    InvalidRange { path: String, reason: String },

    #[error("invalid parameter `{path}`: {reason}")]
    InvalidParameter { path: String, reason: String },

    #[error("invalid hash at `{path}`: {reason}")]
    InvalidHash { path: String, reason: String },

    #[error("hash mismatch for {location}: expected {expected}, computed {actual}")]
    HashMismatch {
        location: String,
        expected: String,
        actual: String,
    },

    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("manifest {path:?} is too large ({size} bytes, max {max})")]
    TooLarge { path: PathBuf, size: u64, max: u64 },

    #[error("invalid configuration {path:?}: {reason}")]
    Config { path: PathBuf, reason: String },
}

impl BlueprintError {
    pub fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedManifest {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_range(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRange {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_parameter(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_hash(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidHash {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MalformedManifest { .. } => ErrorCode::MalformedManifest,
            Self::InvalidRange { .. } => ErrorCode::InvalidRange,
            Self::InvalidParameter { .. } => ErrorCode::InvalidParameter,
            Self::InvalidHash { .. } => ErrorCode::InvalidHash,
            Self::HashMismatch { .. } => ErrorCode::HashMismatch,
            Self::Parse(_) => ErrorCode::ParseError,
            Self::Io { .. } => ErrorCode::IoError,
            Self::TooLarge { .. } => ErrorCode::TooLarge,
            Self::Config { .. } => ErrorCode::ConfigError,
        }
    }

    /// Field path of a validation failure, if the error has one
    pub fn field_path(&self) -> Option<&str> {
        match self {
            Self::MalformedManifest { path, .. }
            | Self::InvalidRange { path, .. }
            | Self::InvalidParameter { path, .. }
            | Self::InvalidHash { path, .. } => Some(path),
            _ => None,
        }
    }
}
