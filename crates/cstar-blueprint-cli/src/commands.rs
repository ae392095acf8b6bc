use std::collections::HashMap;
use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDateTime;
use tracing::{debug, info};

use cstar_blueprint::common::blueprint_dir;
use cstar_blueprint::manifest::dates::parse_timestamp;
use cstar_blueprint::{
    load_file, BlueprintCatalog, BlueprintError, DatasetKind, DatasetReference, LoaderConfig,
    Registry,
};

/// Exit status when a data file matches no reference in the blueprint
const UNREFERENCED_FILE: i32 = 1;

pub fn validate(files: &[PathBuf], config: &LoaderConfig) -> i32 {
    let mut status = 0;
    for file in files {
        match load_file(file, config) {
            Ok(registry) => println!(
                "ok     {} ({}, {} components)",
                file.display(),
                registry.name(),
                registry.components.len()
            ),
            Err(e) => {
                println!("error  {}: {}", file.display(), e);
                if status == 0 {
                    status = e.code().code();
                }
            }
        }
    }
    status
}

pub fn show(file: &Path, config: &LoaderConfig) -> anyhow::Result<i32> {
    let registry = load_file(file, config)?;
    print!("{}", render_summary(&registry)?);
    Ok(0)
}

pub fn normalize(file: &Path, config: &LoaderConfig) -> anyhow::Result<i32> {
    let registry = load_file(file, config)?;
    print!("{}", registry.to_yaml()?);
    Ok(0)
}

pub fn datasets(
    file: &Path,
    component: Option<&str>,
    window: Option<(String, String)>,
    config: &LoaderConfig,
) -> anyhow::Result<i32> {
    let registry = load_file(file, config)?;

    let window = match window {
        Some((start, end)) => {
            let start = parse_cli_timestamp(&start)?;
            let end = parse_cli_timestamp(&end)?;
            registry.check_run_window(start, end)?;
            Some((start, end))
        }
        None => None,
    };

    if let Some(name) = component {
        if registry.component(name).is_none() {
            anyhow::bail!("no component named '{}' in {}", name, registry.name());
        }
    }

    for c in &registry.components {
        if component.is_some_and(|name| name != c.name) {
            continue;
        }
        let selected: Vec<(&DatasetKind, &DatasetReference)> = match window {
            Some((start, end)) => c.datasets_for_window(start, end),
            None => c.input_datasets().collect(),
        };
        for (kind, dataset) in selected {
            println!(
                "{}\t{}\t{}\t{}",
                c.name, kind, dataset.file_hash, dataset.location
            );
        }
    }
    Ok(0)
}

pub fn list(dir: Option<PathBuf>, config: &LoaderConfig) -> anyhow::Result<i32> {
    let dir = match dir {
        Some(dir) => dir,
        None => blueprint_dir().context("could not determine home directory")?,
    };
    let catalog = BlueprintCatalog::load_dir(&dir, config)?;

    for name in catalog.names() {
        let components = catalog
            .get(name)
            .map(|r| {
                r.components
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .unwrap_or_default();
        let source = catalog
            .source(name)
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        println!("{}\t[{}]\t{}", name, components, source);
    }
    Ok(0)
}

pub fn verify(file: &Path, data_files: &[PathBuf], config: &LoaderConfig) -> anyhow::Result<i32> {
    let registry = load_file(file, config)?;
    let by_name = index_by_file_name(&registry);
    debug!("{} referenced file names in {}", by_name.len(), registry.name());

    let mut status = 0;
    for data_file in data_files {
        let name = data_file
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("not a file path: {}", data_file.display()))?;

        let Some(candidates) = by_name.get(name) else {
            println!("unreferenced  {}", data_file.display());
            if status == 0 {
                status = UNREFERENCED_FILE;
            }
            continue;
        };

        // Same file name may appear under several locations; any match passes
        let mut first_mismatch = None;
        let mut matched = None;
        for dataset in candidates {
            match dataset.verify_file(data_file) {
                Ok(()) => {
                    matched = Some(dataset);
                    break;
                }
                Err(e @ BlueprintError::HashMismatch { .. }) => {
                    if first_mismatch.is_none() {
                        first_mismatch = Some(e);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        match (matched, first_mismatch) {
            (Some(dataset), _) => {
                info!("Verified {} against {}", data_file.display(), dataset.location);
                println!("ok            {}", data_file.display());
            }
            (None, Some(e)) => {
                if candidates.len() > 1 {
                    println!(
                        "mismatch      {}: none of {} references named {} match; first: {}",
                        data_file.display(),
                        candidates.len(),
                        name,
                        e
                    );
                } else {
                    println!("mismatch      {}: {}", data_file.display(), e);
                }
                if status == 0 {
                    status = e.code().code();
                }
            }
            (None, None) => {}
        }
    }
    Ok(status)
}

fn parse_cli_timestamp(raw: &str) -> anyhow::Result<NaiveDateTime> {
    parse_timestamp(raw).with_context(|| format!("unrecognized timestamp: {:?}", raw))
}

/// File name to every reference carrying it, in blueprint order
fn index_by_file_name(registry: &Registry) -> HashMap<&str, Vec<&DatasetReference>> {
    let mut index: HashMap<&str, Vec<&DatasetReference>> = HashMap::new();
    for (_, _, dataset) in registry.dataset_references() {
        index.entry(dataset.file_name()).or_default().push(dataset);
    }
    index
}

fn render_summary(registry: &Registry) -> Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(out, "registry: {}", registry.name())?;
    writeln!(out, "valid:    {}", registry.attrs.valid_date_range)?;

    for (idx, c) in registry.components.iter().enumerate() {
        writeln!(out, "\n[{}] {}", idx, c.name)?;
        if let Some(base) = &c.base_model {
            writeln!(out, "  base model:     {} @ {}", base.source_repo, base.checkout_target)?;
        }
        if let Some(d) = &c.discretization {
            writeln!(
                out,
                "  discretization: {}x{} procs ({} total), time step {}",
                d.n_procs_x,
                d.n_procs_y,
                d.n_procs_tot(),
                d.time_step
            )?;
        }
        if let Some(code) = &c.additional_source_code {
            writeln!(out, "  source files:   {}", code.files.len())?;
        }
        if let Some(code) = &c.namelists {
            writeln!(out, "  namelists:      {}", code.files.len())?;
        }
        for (kind, refs) in &c.input_datasets {
            writeln!(out, "  {:<16}{}", format!("{}:", kind), refs.len())?;
        }
    }
    Ok(out)
}
