//! Loader configuration
//!
//! Read from an explicit path, `$CSTAR_BLUEPRINT_CONFIG`, or
//! `~/.cstar/blueprint.json`, in that order. Missing files fall back to
//! defaults; a file that exists but does not parse is an error.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::common::{paths, BlueprintError, BlueprintResult};
use crate::manifest::HashAlgorithm;

/// Default manifest size cap (1MB)
pub const DEFAULT_MAX_MANIFEST_BYTES: u64 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Files larger than this are refused before parsing
    pub max_manifest_bytes: u64,
    /// Digest algorithms accepted for `file_hash`
    pub accepted_hash_algorithms: Vec<HashAlgorithm>,
    /// Name given to components with neither `component_type` nor `base_model.name`
    pub unknown_component_name: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_manifest_bytes: DEFAULT_MAX_MANIFEST_BYTES,
            accepted_hash_algorithms: HashAlgorithm::ALL.to_vec(),
            unknown_component_name: "unknown".to_string(),
        }
    }
}

impl LoaderConfig {
    /// Resolve and load the configuration
    pub fn load(explicit: Option<&Path>) -> BlueprintResult<Self> {
        match explicit {
            // An explicitly requested file must exist
            Some(path) => Self::from_file(path),
            None => match paths::config_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                Some(path) => {
                    debug!("No loader config at {:?}, using defaults", path);
                    Ok(Self::default())
                }
                None => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> BlueprintResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BlueprintError::io(path, e))?;
        let config: Self = serde_json::from_str(&content).map_err(|e| BlueprintError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        config.validate(path)?;
        info!("Loaded loader config from {:?}", path);
        Ok(config)
    }

    fn validate(&self, path: &Path) -> BlueprintResult<()> {
        let invalid = |reason: &str| BlueprintError::Config {
            path: PathBuf::from(path),
            reason: reason.to_string(),
        };

        if self.accepted_hash_algorithms.is_empty() {
            return Err(invalid("accepted_hash_algorithms cannot be empty"));
        }
        if self.max_manifest_bytes == 0 {
            return Err(invalid("max_manifest_bytes must be positive"));
        }
        if self.unknown_component_name.trim().is_empty() {
            return Err(invalid("unknown_component_name cannot be empty"));
        }
        Ok(())
    }
}
