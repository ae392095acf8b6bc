//! Blueprint Manifests
//!
//! Loads, normalizes and validates blueprint YAML into [`Registry`] values,
//! and indexes many of them in a [`BlueprintCatalog`].

pub mod catalog;
pub mod dates;
pub mod hash;
pub mod loader;
mod raw;
pub mod types;

pub use catalog::BlueprintCatalog;
pub use hash::HashAlgorithm;
pub use loader::{load_dir, load_file, load_str};
pub use types::{
    AdditionalCode, BaseModel, Component, DatasetKind, DatasetReference, DateRange,
    Discretization, Registry, RegistryAttrs, SourceFormat,
};
