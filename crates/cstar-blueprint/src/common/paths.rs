//! Path Utilities
//!
//! Common path resolution for C-Star directories and files.

use std::path::PathBuf;

/// Environment variable overriding the loader configuration path
pub const CONFIG_ENV_VAR: &str = "CSTAR_BLUEPRINT_CONFIG";

/// Get the C-Star base directory (`~/.cstar/`)
pub fn cstar_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".cstar"))
}

/// Get a path within the C-Star directory
pub fn cstar_path(relative_path: &str) -> Option<PathBuf> {
    cstar_dir().map(|dir| dir.join(relative_path))
}

/// Resolve the loader configuration file
///
/// `$CSTAR_BLUEPRINT_CONFIG` wins over `~/.cstar/blueprint.json`.
pub fn config_path() -> Option<PathBuf> {
    match std::env::var_os(CONFIG_ENV_VAR) {
        Some(path) if !path.is_empty() => Some(PathBuf::from(path)),
        _ => cstar_path("blueprint.json"),
    }
}

/// Get the default blueprint directory (`~/.cstar/blueprints/`)
pub fn blueprint_dir() -> Option<PathBuf> {
    cstar_path("blueprints")
}
