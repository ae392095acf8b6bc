//! Raw blueprint shapes and normalization
//!
//! Two blueprint layouts are in circulation:
//!
//! ```yaml
//! # current
//! - component:
//!     component_type: ROMS
//!     base_model: { source_repo: ..., checkout_target: ... }
//!     additional_source_code: { location: ..., files: [...] }
//!     namelists: { location: ..., files: [...] }
//!     model_grid: { location: ..., file_hash: ... }
//!
//! # older
//! - component:
//!     base_model: { name: ROMS, source_repo: ..., checkout_target: ... }
//!     additional_code: { location: ..., source_mods: [...], namelists: [...] }
//!     input_datasets:
//!       model_grid: { location: ..., file_hash: ... }
//! ```
//!
//! Both normalize into [`Component`]. Output always uses the current layout.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::{Mapping, Value};
use tracing::{debug, warn};

use super::dates;
use super::hash;
use super::types::{
    AdditionalCode, BaseModel, Component, DatasetKind, DatasetReference, DateRange,
    Discretization, Registry, RegistryAttrs,
};
use crate::common::{BlueprintError, BlueprintResult};
use crate::config::LoaderConfig;

const COMPONENT_KEYS: &[&str] = &[
    "component_type",
    "base_model",
    "discretization",
    "additional_source_code",
    "additional_code",
    "namelists",
    "input_datasets",
];

// ---------------------------------------------------------------------------
// Leaf shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawBaseModel {
    #[serde(default, deserialize_with = "opt_scalar_string")]
    name: Option<String>,
    source_repo: String,
    #[serde(deserialize_with = "scalar_string")]
    checkout_target: String,
}

#[derive(Debug, Deserialize)]
struct RawDiscretization {
    #[serde(default = "one")]
    n_procs_x: i64,
    #[serde(default = "one")]
    n_procs_y: i64,
    time_step: f64,
}

fn one() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
struct RawAdditionalCode {
    location: String,
    #[serde(default, deserialize_with = "opt_scalar_string")]
    checkout_target: Option<String>,
    #[serde(default)]
    subdir: Option<String>,
    #[serde(default)]
    files: Option<Vec<String>>,
    #[serde(default)]
    source_mods: Option<Vec<String>>,
    #[serde(default)]
    namelists: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawDatasetReference {
    location: String,
    #[serde(deserialize_with = "scalar_string")]
    file_hash: String,
    #[serde(default, deserialize_with = "opt_scalar_string")]
    start_date: Option<String>,
    #[serde(default, deserialize_with = "opt_scalar_string")]
    end_date: Option<String>,
}

/// Accept strings, numbers and booleans as strings.
/// Unquoted tags like `1.0` or all-digit hashes come through YAML as numbers.
/// Every scalar field in a blueprint goes through this one rule.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn scalar_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let value = Value::deserialize(d)?;
    scalar_text(&value).ok_or_else(|| {
        serde::de::Error::custom(format!("expected a scalar, found {}", describe(&value)))
    })
}

fn opt_scalar_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    match Value::deserialize(d)? {
        Value::Null => Ok(None),
        value => scalar_text(&value).map(Some).ok_or_else(|| {
            serde::de::Error::custom(format!("expected a scalar, found {}", describe(&value)))
        }),
    }
}

// ---------------------------------------------------------------------------
// Output document (current layout)
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct DocumentOut<'a> {
    registry_attrs: &'a RegistryAttrs,
    components: Vec<ComponentEntryOut<'a>>,
}

#[derive(Serialize)]
struct ComponentEntryOut<'a> {
    component: ComponentOut<'a>,
}

#[derive(Serialize)]
struct ComponentOut<'a> {
    component_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    base_model: Option<&'a BaseModel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    discretization: Option<&'a Discretization>,
    #[serde(skip_serializing_if = "Option::is_none")]
    additional_source_code: Option<&'a AdditionalCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namelists: Option<&'a AdditionalCode>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    input_datasets: BTreeMap<&'a str, &'a [DatasetReference]>,
}

/// Render a registry in the current layout
pub(crate) fn to_yaml(registry: &Registry) -> BlueprintResult<String> {
    let doc = DocumentOut {
        registry_attrs: &registry.attrs,
        components: registry
            .components
            .iter()
            .map(|c| ComponentEntryOut {
                component: ComponentOut {
                    component_type: &c.name,
                    base_model: c.base_model.as_ref(),
                    discretization: c.discretization.as_ref(),
                    additional_source_code: c.additional_source_code.as_ref(),
                    namelists: c.namelists.as_ref(),
                    input_datasets: c
                        .input_datasets
                        .iter()
                        .map(|(kind, refs)| (kind.as_key(), refs.as_slice()))
                        .collect(),
                },
            })
            .collect(),
    };
    Ok(serde_yaml::to_string(&doc)?)
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Normalize a parsed YAML document into a validated [`Registry`]
pub(crate) fn normalize(doc: &Value, config: &LoaderConfig) -> BlueprintResult<Registry> {
    let root = as_mapping(doc, "<root>")?;

    let attrs_value = get(root, "registry_attrs")
        .ok_or_else(|| BlueprintError::malformed("registry_attrs", "missing required key"))?;
    let attrs = normalize_attrs(attrs_value)?;

    let components_value = get(root, "components")
        .ok_or_else(|| BlueprintError::malformed("components", "missing required key"))?;
    let entries = components_value.as_sequence().ok_or_else(|| {
        BlueprintError::malformed(
            "components",
            format!("expected a list, found {}", describe(components_value)),
        )
    })?;

    if entries.is_empty() {
        warn!("Blueprint '{}' declares no components", attrs.name);
    }

    let components = entries
        .iter()
        .enumerate()
        .map(|(idx, entry)| normalize_component_entry(entry, idx, config))
        .collect::<BlueprintResult<Vec<_>>>()?;

    Ok(Registry { attrs, components })
}

fn normalize_attrs(value: &Value) -> BlueprintResult<RegistryAttrs> {
    let path = "registry_attrs";
    let map = as_mapping(value, path)?;

    let name_path = "registry_attrs.name";
    let name = match get(map, "name") {
        Some(v) => decode_scalar(v, name_path)?,
        None => return Err(BlueprintError::malformed(name_path, "missing required key")),
    };
    if name.trim().is_empty() {
        return Err(BlueprintError::malformed(name_path, "name is empty"));
    }

    let range_path = "registry_attrs.valid_date_range";
    let range_value = get(map, "valid_date_range")
        .ok_or_else(|| BlueprintError::malformed(range_path, "missing required key"))?;
    let range_map = as_mapping(range_value, range_path)?;

    let start_date = required_timestamp(range_map, "start_date", range_path)?;
    let end_date = required_timestamp(range_map, "end_date", range_path)?;

    if start_date >= end_date {
        return Err(BlueprintError::invalid_range(
            range_path,
            format!(
                "start_date {} is not before end_date {}",
                dates::format_timestamp(&start_date),
                dates::format_timestamp(&end_date)
            ),
        ));
    }

    Ok(RegistryAttrs {
        name,
        valid_date_range: DateRange {
            start_date,
            end_date,
        },
    })
}

fn normalize_component_entry(
    entry: &Value,
    idx: usize,
    config: &LoaderConfig,
) -> BlueprintResult<Component> {
    let entry_path = format!("components[{}]", idx);
    let entry_map = as_mapping(entry, &entry_path)?;
    let path = format!("{}.component", entry_path);
    let body = get(entry_map, "component")
        .ok_or_else(|| BlueprintError::malformed(&path, "missing required key"))?;
    let map = as_mapping(body, &path)?;

    let base = match get(map, "base_model") {
        Some(v) => Some(decode::<RawBaseModel>(v, &format!("{}.base_model", path))?),
        None => None,
    };

    let component_type = match get(map, "component_type") {
        Some(v) => Some(decode_scalar(v, &format!("{}.component_type", path))?),
        None => None,
    };

    let name = resolve_name(component_type, base.as_ref(), &path, config);

    let base_model = base.map(|b| BaseModel {
        source_repo: b.source_repo,
        checkout_target: b.checkout_target,
    });

    let discretization = match get(map, "discretization") {
        Some(v) => Some(normalize_discretization(v, &format!("{}.discretization", path))?),
        None => None,
    };

    let (additional_source_code, namelists) = normalize_code(map, &path)?;
    let input_datasets = normalize_datasets(map, &path, config)?;

    for key in map.keys() {
        match key.as_str() {
            Some(k) if COMPONENT_KEYS.contains(&k) => {}
            Some(k) if is_known_dataset_key(k) => {}
            Some(k) => warn!("Ignoring unrecognized key '{}.{}'", path, k),
            None => warn!("Ignoring non-string key in {}", path),
        }
    }

    debug!(
        "Normalized component '{}' ({} dataset groups, {} code files)",
        name,
        input_datasets.len(),
        additional_source_code.as_ref().map_or(0, |c| c.files.len())
            + namelists.as_ref().map_or(0, |c| c.files.len())
    );

    Ok(Component {
        name,
        base_model,
        discretization,
        additional_source_code,
        namelists,
        input_datasets,
    })
}

fn resolve_name(
    component_type: Option<String>,
    base: Option<&RawBaseModel>,
    path: &str,
    config: &LoaderConfig,
) -> String {
    let base_name = base.and_then(|b| b.name.clone());
    match (component_type, base_name) {
        (Some(ct), Some(bn)) => {
            if ct != bn {
                warn!(
                    "{}: component_type '{}' disagrees with base_model.name '{}', using '{}'",
                    path, ct, bn, ct
                );
            }
            ct
        }
        (Some(ct), None) => ct,
        (None, Some(bn)) => bn,
        (None, None) => {
            warn!(
                "{}: no component_type or base_model.name, naming it '{}'",
                path, config.unknown_component_name
            );
            config.unknown_component_name.clone()
        }
    }
}

fn normalize_discretization(value: &Value, path: &str) -> BlueprintResult<Discretization> {
    let raw: RawDiscretization = decode(value, path)?;

    let positive_count = |v: i64, field: &str| -> BlueprintResult<u32> {
        if v <= 0 {
            return Err(BlueprintError::invalid_parameter(
                format!("{}.{}", path, field),
                format!("must be positive, got {}", v),
            ));
        }
        u32::try_from(v).map_err(|_| {
            BlueprintError::invalid_parameter(
                format!("{}.{}", path, field),
                format!("{} is out of range", v),
            )
        })
    };

    let n_procs_x = positive_count(raw.n_procs_x, "n_procs_x")?;
    let n_procs_y = positive_count(raw.n_procs_y, "n_procs_y")?;

    if !raw.time_step.is_finite() || raw.time_step <= 0.0 {
        return Err(BlueprintError::invalid_parameter(
            format!("{}.time_step", path),
            format!("must be a positive number, got {}", raw.time_step),
        ));
    }

    Ok(Discretization {
        n_procs_x,
        n_procs_y,
        time_step: raw.time_step,
    })
}

/// Returns `(additional_source_code, namelists)`
fn normalize_code(
    map: &Mapping,
    path: &str,
) -> BlueprintResult<(Option<AdditionalCode>, Option<AdditionalCode>)> {
    let flat = get(map, "additional_source_code");
    let split = get(map, "additional_code");

    if flat.is_some() && split.is_some() {
        return Err(BlueprintError::malformed(
            path,
            "both additional_source_code and additional_code are present; use one",
        ));
    }

    let mut namelists = match get(map, "namelists") {
        Some(v) => {
            let p = format!("{}.namelists", path);
            let raw: RawAdditionalCode = decode(v, &p)?;
            Some(flat_code(raw, &p)?)
        }
        None => None,
    };

    let source = if let Some(v) = flat {
        let p = format!("{}.additional_source_code", path);
        let raw: RawAdditionalCode = decode(v, &p)?;
        Some(flat_code(raw, &p)?)
    } else if let Some(v) = split {
        let p = format!("{}.additional_code", path);
        let raw: RawAdditionalCode = decode(v, &p)?;
        let (source, split_namelists) = split_code(raw, &p)?;
        if let Some(nl) = split_namelists {
            if namelists.is_some() {
                return Err(BlueprintError::malformed(
                    format!("{}.namelists", p),
                    "namelists listed both here and in the component's namelists entry",
                ));
            }
            namelists = Some(nl);
        }
        source
    } else {
        None
    };

    Ok((source, namelists))
}

fn flat_code(raw: RawAdditionalCode, path: &str) -> BlueprintResult<AdditionalCode> {
    if raw.source_mods.is_some() || raw.namelists.is_some() {
        return Err(BlueprintError::malformed(
            path,
            "source_mods/namelists lists belong under additional_code; use files here",
        ));
    }
    let files = checked_files(raw.files.unwrap_or_default(), &format!("{}.files", path))?;
    Ok(AdditionalCode {
        location: raw.location,
        checkout_target: raw.checkout_target,
        subdir: raw.subdir,
        files,
    })
}

fn split_code(
    raw: RawAdditionalCode,
    path: &str,
) -> BlueprintResult<(Option<AdditionalCode>, Option<AdditionalCode>)> {
    let make = |files: Vec<String>| AdditionalCode {
        location: raw.location.clone(),
        checkout_target: raw.checkout_target.clone(),
        subdir: raw.subdir.clone(),
        files,
    };

    // A flat files list under additional_code is treated as source files.
    let mut source_files = Vec::new();
    if let Some(files) = raw.files.clone() {
        source_files.extend(checked_files(files, &format!("{}.files", path))?);
    }
    if let Some(mods) = raw.source_mods.clone() {
        source_files.extend(checked_files(mods, &format!("{}.source_mods", path))?);
    }

    let namelists = match raw.namelists.clone() {
        Some(files) => Some(make(checked_files(files, &format!("{}.namelists", path))?)),
        None => None,
    };

    let source = if source_files.is_empty() && namelists.is_some() {
        None
    } else {
        Some(make(source_files))
    };

    Ok((source, namelists))
}

fn checked_files(files: Vec<String>, path: &str) -> BlueprintResult<Vec<String>> {
    for (i, f) in files.iter().enumerate() {
        let escapes = f.split('/').any(|seg| seg == "..");
        if f.is_empty() || f.starts_with('/') || escapes {
            return Err(BlueprintError::malformed(
                format!("{}[{}]", path, i),
                format!("{:?} is not a relative path inside the repository", f),
            ));
        }
    }
    Ok(files)
}

fn normalize_datasets(
    map: &Mapping,
    path: &str,
    config: &LoaderConfig,
) -> BlueprintResult<BTreeMap<DatasetKind, Vec<DatasetReference>>> {
    let mut groups: BTreeMap<DatasetKind, Vec<DatasetReference>> = BTreeMap::new();

    // Older layout nests every kind under input_datasets, any name allowed.
    if let Some(nested) = get(map, "input_datasets") {
        let nested_path = format!("{}.input_datasets", path);
        let nested_map = as_mapping(nested, &nested_path)?;
        for (key, value) in nested_map {
            let key = key.as_str().ok_or_else(|| {
                BlueprintError::malformed(&nested_path, "dataset kind must be a string")
            })?;
            let kind = DatasetKind::from_key(key);
            let refs = normalize_group(&kind, value, &format!("{}.{}", nested_path, key), config)?;
            groups.insert(kind, refs);
        }
    }

    // Current layout puts the known kinds directly on the component.
    for kind in DatasetKind::KNOWN {
        let Some(value) = get(map, kind.as_key()) else {
            continue;
        };
        let group_path = format!("{}.{}", path, kind.as_key());
        if groups.contains_key(&kind) {
            return Err(BlueprintError::malformed(
                group_path,
                "dataset kind also appears under input_datasets",
            ));
        }
        let refs = normalize_group(&kind, value, &group_path, config)?;
        groups.insert(kind, refs);
    }

    Ok(groups)
}

fn normalize_group(
    kind: &DatasetKind,
    value: &Value,
    path: &str,
    config: &LoaderConfig,
) -> BlueprintResult<Vec<DatasetReference>> {
    let refs = match value {
        Value::Sequence(items) => {
            if items.is_empty() {
                return Err(BlueprintError::malformed(path, "dataset list is empty"));
            }
            if items.len() > 1 && !kind.allows_multiple() {
                return Err(BlueprintError::malformed(
                    path,
                    format!("{} takes a single dataset, found {}", kind, items.len()),
                ));
            }
            items
                .iter()
                .enumerate()
                .map(|(i, item)| normalize_reference(item, &format!("{}[{}]", path, i), config))
                .collect::<BlueprintResult<Vec<_>>>()?
        }
        Value::Mapping(_) => vec![normalize_reference(value, path, config)?],
        other => {
            return Err(BlueprintError::malformed(
                path,
                format!(
                    "expected a dataset mapping or list of mappings, found {}",
                    describe(other)
                ),
            ))
        }
    };
    Ok(refs)
}

fn normalize_reference(
    value: &Value,
    path: &str,
    config: &LoaderConfig,
) -> BlueprintResult<DatasetReference> {
    let raw: RawDatasetReference = decode(value, path)?;

    if raw.location.trim().is_empty() {
        return Err(BlueprintError::malformed(
            format!("{}.location", path),
            "location is empty",
        ));
    }

    let (file_hash, _) = hash::normalize_digest(
        &raw.file_hash,
        &config.accepted_hash_algorithms,
        &format!("{}.file_hash", path),
    )?;

    let start_date = optional_timestamp(raw.start_date, &format!("{}.start_date", path))?;
    let end_date = optional_timestamp(raw.end_date, &format!("{}.end_date", path))?;

    if let (Some(s), Some(e)) = (start_date, end_date) {
        if s > e {
            return Err(BlueprintError::invalid_range(
                path,
                format!(
                    "start_date {} is after end_date {}",
                    dates::format_timestamp(&s),
                    dates::format_timestamp(&e)
                ),
            ));
        }
    }

    Ok(DatasetReference {
        location: raw.location,
        file_hash,
        start_date,
        end_date,
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn is_known_dataset_key(key: &str) -> bool {
    DatasetKind::KNOWN.iter().any(|k| k.as_key() == key)
}

fn get<'a>(map: &'a Mapping, key: &str) -> Option<&'a Value> {
    map.get(key)
}

fn as_mapping<'a>(value: &'a Value, path: &str) -> BlueprintResult<&'a Mapping> {
    value.as_mapping().ok_or_else(|| {
        BlueprintError::malformed(
            path,
            format!("expected a mapping, found {}", describe(value)),
        )
    })
}

fn decode<T: DeserializeOwned>(value: &Value, path: &str) -> BlueprintResult<T> {
    serde_yaml::from_value(value.clone())
        .map_err(|e| BlueprintError::malformed(path, e.to_string()))
}

fn decode_scalar(value: &Value, path: &str) -> BlueprintResult<String> {
    scalar_text(value).ok_or_else(|| {
        BlueprintError::malformed(path, format!("expected a scalar, found {}", describe(value)))
    })
}

fn required_timestamp(map: &Mapping, key: &str, parent: &str) -> BlueprintResult<NaiveDateTime> {
    let path = format!("{}.{}", parent, key);
    let value = get(map, key).ok_or_else(|| BlueprintError::malformed(&path, "missing required key"))?;
    let raw = decode_scalar(value, &path)?;
    parse_or_malformed(&raw, &path)
}

fn optional_timestamp(raw: Option<String>, path: &str) -> BlueprintResult<Option<NaiveDateTime>> {
    raw.map(|r| parse_or_malformed(&r, path)).transpose()
}

fn parse_or_malformed(raw: &str, path: &str) -> BlueprintResult<NaiveDateTime> {
    dates::parse_timestamp(raw).ok_or_else(|| {
        BlueprintError::malformed(path, format!("{:?} is not a recognized timestamp", raw))
    })
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
