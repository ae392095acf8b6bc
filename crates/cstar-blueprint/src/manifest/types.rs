//! Blueprint Types
//!
//! Canonical in-memory form of a blueprint. Every accepted schema variant
//! normalizes into these structs.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use chrono::NaiveDateTime;
use serde::Serialize;

use super::dates::{self, blueprint_format};
use super::hash;
use super::raw;
use crate::common::{BlueprintError, BlueprintResult};

/// A loaded blueprint: registry metadata plus its ordered components
#[derive(Debug, Clone, PartialEq)]
pub struct Registry {
    pub attrs: RegistryAttrs,
    /// Build order for the external interpreter
    pub components: Vec<Component>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistryAttrs {
    pub name: String,
    pub valid_date_range: DateRange,
}

/// Validity window, `start_date < end_date`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    #[serde(serialize_with = "blueprint_format::serialize")]
    pub start_date: NaiveDateTime,
    #[serde(serialize_with = "blueprint_format::serialize")]
    pub end_date: NaiveDateTime,
}

impl DateRange {
    pub fn contains(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        self.start_date <= start && end <= self.end_date
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} .. {}",
            dates::format_timestamp(&self.start_date),
            dates::format_timestamp(&self.end_date)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    /// Model tag such as `ROMS` or `MARBL`
    pub name: String,
    pub base_model: Option<BaseModel>,
    pub discretization: Option<Discretization>,
    /// Compile-time code
    pub additional_source_code: Option<AdditionalCode>,
    /// Runtime namelists
    pub namelists: Option<AdditionalCode>,
    /// Dataset groups; each group holds at least one reference
    pub input_datasets: BTreeMap<DatasetKind, Vec<DatasetReference>>,
}

/// Upstream model source pinned to a revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BaseModel {
    pub source_repo: String,
    /// Branch, tag or commit hash; opaque at this layer
    pub checkout_target: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Discretization {
    pub n_procs_x: u32,
    pub n_procs_y: u32,
    pub time_step: f64,
}

impl Discretization {
    /// Total processors required by the domain decomposition
    pub fn n_procs_tot(&self) -> u64 {
        u64::from(self.n_procs_x) * u64::from(self.n_procs_y)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdditionalCode {
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subdir: Option<String>,
    /// Paths relative to `subdir`
    pub files: Vec<String>,
}

/// Named dataset group. Ordering follows the order the model consumes them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DatasetKind {
    ModelGrid,
    InitialConditions,
    TidalForcing,
    BoundaryForcing,
    SurfaceForcing,
    Other(String),
}

impl DatasetKind {
    pub const KNOWN: [DatasetKind; 5] = [
        Self::ModelGrid,
        Self::InitialConditions,
        Self::TidalForcing,
        Self::BoundaryForcing,
        Self::SurfaceForcing,
    ];

    pub fn from_key(key: &str) -> Self {
        match key {
            "model_grid" => Self::ModelGrid,
            "initial_conditions" => Self::InitialConditions,
            "tidal_forcing" => Self::TidalForcing,
            "boundary_forcing" => Self::BoundaryForcing,
            "surface_forcing" => Self::SurfaceForcing,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_key(&self) -> &str {
        match self {
            Self::ModelGrid => "model_grid",
            Self::InitialConditions => "initial_conditions",
            Self::TidalForcing => "tidal_forcing",
            Self::BoundaryForcing => "boundary_forcing",
            Self::SurfaceForcing => "surface_forcing",
            Self::Other(name) => name,
        }
    }

    /// Whether the group may hold several sequential files
    pub fn allows_multiple(&self) -> bool {
        !matches!(
            self,
            Self::ModelGrid | Self::InitialConditions | Self::TidalForcing
        )
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_key())
    }
}

/// Remote file identified by location and content hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetReference {
    pub location: String,
    /// Lowercase hex digest
    pub file_hash: String,
    #[serde(
        serialize_with = "blueprint_format::option::serialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_date: Option<NaiveDateTime>,
    #[serde(
        serialize_with = "blueprint_format::option::serialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_date: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    NetCdf,
    Yaml,
    Other,
}

impl DatasetReference {
    /// Last path segment of the location
    pub fn file_name(&self) -> &str {
        let trimmed = self.location.trim_end_matches('/');
        let without_query = trimmed.split(['?', '#']).next().unwrap_or(trimmed);
        without_query.rsplit('/').next().unwrap_or(without_query)
    }

    pub fn is_remote(&self) -> bool {
        self.location.contains("://")
    }

    pub fn source_format(&self) -> SourceFormat {
        let name = self.file_name().to_ascii_lowercase();
        if name.ends_with(".nc") {
            SourceFormat::NetCdf
        } else if name.ends_with(".yaml") || name.ends_with(".yml") {
            SourceFormat::Yaml
        } else {
            SourceFormat::Other
        }
    }

    /// True when the file's own date range touches `[start, end]`.
    /// References without a complete range always match.
    pub fn overlaps(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        match (self.start_date, self.end_date) {
            (Some(ds), Some(de)) => ds <= end && de >= start,
            _ => true,
        }
    }

    /// Check fetched bytes against `file_hash`
    pub fn verify_bytes(&self, bytes: &[u8]) -> BlueprintResult<()> {
        hash::verify_bytes(&self.location, &self.file_hash, bytes)
    }

    /// Check a local copy against `file_hash`
    pub fn verify_file(&self, path: &Path) -> BlueprintResult<()> {
        hash::verify_file(&self.location, &self.file_hash, path)
    }
}

impl Component {
    /// All references in consumer order: grid, initial conditions, tides,
    /// boundary forcing, surface forcing, then other kinds by name
    pub fn input_datasets(&self) -> impl Iterator<Item = (&DatasetKind, &DatasetReference)> {
        self.input_datasets
            .iter()
            .flat_map(|(kind, refs)| refs.iter().map(move |r| (kind, r)))
    }

    pub fn datasets(&self, kind: &DatasetKind) -> &[DatasetReference] {
        self.input_datasets
            .get(kind)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// References needed for a run over `[start, end]`
    pub fn datasets_for_window(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Vec<(&DatasetKind, &DatasetReference)> {
        self.input_datasets()
            .filter(|(_, r)| r.overlaps(start, end))
            .collect()
    }

    /// Number of compile-time and runtime file references
    pub fn code_file_count(&self) -> usize {
        let count = |code: &Option<AdditionalCode>| code.as_ref().map_or(0, |c| c.files.len());
        count(&self.additional_source_code) + count(&self.namelists)
    }
}

impl Registry {
    pub fn name(&self) -> &str {
        &self.attrs.name
    }

    /// Render in the current blueprint layout; reloading gives an equal value
    pub fn to_yaml(&self) -> BlueprintResult<String> {
        raw::to_yaml(self)
    }

    /// First component with the given name
    pub fn component(&self, name: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.name == name)
    }

    /// Every dataset reference, component by component
    pub fn dataset_references(&self) -> impl Iterator<Item = (&Component, &DatasetKind, &DatasetReference)> {
        self.components
            .iter()
            .flat_map(|c| c.input_datasets().map(move |(k, r)| (c, k, r)))
    }

    /// Check that a run window is ordered and inside `valid_date_range`
    pub fn check_run_window(&self, start: NaiveDateTime, end: NaiveDateTime) -> BlueprintResult<()> {
        if start >= end {
            return Err(BlueprintError::invalid_range(
                "run_window",
                format!(
                    "start {} is not before end {}",
                    dates::format_timestamp(&start),
                    dates::format_timestamp(&end)
                ),
            ));
        }

        let valid = &self.attrs.valid_date_range;
        if !valid.contains(start, end) {
            return Err(BlueprintError::invalid_range(
                "run_window",
                format!(
                    "{} .. {} falls outside registry_attrs.valid_date_range ({})",
                    dates::format_timestamp(&start),
                    dates::format_timestamp(&end),
                    valid
                ),
            ));
        }

        Ok(())
    }
}
