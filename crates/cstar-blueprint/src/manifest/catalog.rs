//! Blueprint Catalog
//!
//! In-memory index of loaded blueprints keyed by registry name.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use super::loader;
use super::types::{Component, Registry};
use crate::common::BlueprintResult;
use crate::config::LoaderConfig;

/// Read-only blueprint index with lookup by registry name
#[derive(Debug, Default)]
pub struct BlueprintCatalog {
    /// Registries indexed by `registry_attrs.name`
    registries: HashMap<String, Arc<Registry>>,
    /// Source file of each registry
    sources: HashMap<String, PathBuf>,
}

impl BlueprintCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every blueprint under `base_dir`
    ///
    /// Files are visited in sorted path order; on a name collision the later
    /// file wins.
    pub fn load_dir(base_dir: &Path, config: &LoaderConfig) -> BlueprintResult<Self> {
        let mut catalog = Self::new();
        for (path, registry) in loader::load_dir(base_dir, config)? {
            catalog.insert(path, registry);
        }

        info!(
            "Blueprint catalog initialized: {} registries, {} components",
            catalog.len(),
            catalog
                .registries
                .values()
                .map(|r| r.components.len())
                .sum::<usize>()
        );
        Ok(catalog)
    }

    pub fn insert(&mut self, source: PathBuf, registry: Registry) {
        let name = registry.name().to_string();
        if let Some(previous) = self.sources.get(&name) {
            warn!(
                "Blueprint '{}' from {:?} overrides the one from {:?}",
                name, source, previous
            );
        }
        self.sources.insert(name.clone(), source);
        self.registries.insert(name, Arc::new(registry));
    }

    pub fn get(&self, name: &str) -> Option<Arc<Registry>> {
        self.registries.get(name).cloned()
    }

    pub fn source(&self, name: &str) -> Option<&Path> {
        self.sources.get(name).map(PathBuf::as_path)
    }

    /// Registry names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.registries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Look up a component inside a named registry
    pub fn find_component(&self, registry: &str, component: &str) -> Option<(Arc<Registry>, Component)> {
        let registry = self.get(registry)?;
        let component = registry.component(component)?.clone();
        Some((registry, component))
    }

    pub fn len(&self) -> usize {
        self.registries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registries.is_empty()
    }
}
