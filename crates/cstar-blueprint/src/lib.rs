//! C-Star blueprint manifests
//!
//! A blueprint describes an ocean simulation: an ordered list of model
//! components, each pinned to source revisions and to input datasets that are
//! identified by location and content hash. This crate loads and validates
//! blueprints. It never fetches anything; dataset hashes are checked only for
//! bytes the caller already has.
//!
//! ```no_run
//! use std::path::Path;
//! use cstar_blueprint::{load_file, LoaderConfig};
//!
//! let config = LoaderConfig::load(None)?;
//! let registry = load_file(Path::new("blueprint.yaml"), &config)?;
//! for (component, kind, dataset) in registry.dataset_references() {
//!     println!("{} {} {}", component.name, kind, dataset.location);
//! }
//! # Ok::<(), cstar_blueprint::BlueprintError>(())
//! ```

pub mod common;
pub mod config;
pub mod manifest;

pub use common::{BlueprintError, BlueprintResult, ErrorCode};
pub use config::LoaderConfig;
pub use manifest::{
    load_dir, load_file, load_str, AdditionalCode, BaseModel, BlueprintCatalog, Component,
    DatasetKind, DatasetReference, DateRange, Discretization, HashAlgorithm, Registry,
    RegistryAttrs, SourceFormat,
};
