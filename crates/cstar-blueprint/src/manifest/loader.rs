//! Blueprint Loader
//!
//! Reads blueprint YAML, normalizes schema variants, validates, returns
//! [`Registry`] values.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::raw;
use super::types::Registry;
use crate::common::{BlueprintError, BlueprintResult};
use crate::config::LoaderConfig;

/// Load a blueprint from YAML text
pub fn load_str(text: &str, config: &LoaderConfig) -> BlueprintResult<Registry> {
    let doc: serde_yaml::Value = serde_yaml::from_str(text)?;
    raw::normalize(&doc, config)
}

/// Load a single blueprint file
pub fn load_file(path: &Path, config: &LoaderConfig) -> BlueprintResult<Registry> {
    let metadata = fs::metadata(path).map_err(|e| BlueprintError::io(path, e))?;
    if metadata.len() > config.max_manifest_bytes {
        return Err(BlueprintError::TooLarge {
            path: path.to_path_buf(),
            size: metadata.len(),
            max: config.max_manifest_bytes,
        });
    }

    let content = fs::read_to_string(path).map_err(|e| BlueprintError::io(path, e))?;
    let registry = load_str(&content, config)?;

    info!(
        "Loaded blueprint: {} ({} components) from {:?}",
        registry.name(),
        registry.components.len(),
        path
    );
    Ok(registry)
}

/// Load all blueprints from a directory tree (recursive)
///
/// Files that fail to load are logged and skipped. Results come back in
/// sorted path order.
pub fn load_dir(base_dir: &Path, config: &LoaderConfig) -> BlueprintResult<Vec<(PathBuf, Registry)>> {
    let mut blueprints = Vec::new();

    if !base_dir.exists() {
        info!("Blueprint directory does not exist: {:?}", base_dir);
        return Ok(blueprints);
    }

    load_dir_recursive(base_dir, config, &mut blueprints)?;

    info!("Loaded {} blueprints from {:?}", blueprints.len(), base_dir);
    Ok(blueprints)
}

fn load_dir_recursive(
    dir: &Path,
    config: &LoaderConfig,
    blueprints: &mut Vec<(PathBuf, Registry)>,
) -> BlueprintResult<()> {
    let mut paths = fs::read_dir(dir)
        .map_err(|e| BlueprintError::io(dir, e))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| BlueprintError::io(dir, e))?;
    paths.sort();

    for path in paths {
        // Skip dotfiles and editor temp files
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if name.starts_with('.') || name.ends_with(".tmp") || name.ends_with(".swp") {
                continue;
            }
        }

        if path.is_dir() {
            load_dir_recursive(&path, config, blueprints)?;
        } else if is_blueprint_file(&path) {
            match load_file(&path, config) {
                Ok(registry) => blueprints.push((path, registry)),
                Err(e) => {
                    warn!("Failed to load blueprint {:?}: {}", path, e);
                }
            }
        }
    }

    Ok(())
}

fn is_blueprint_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|s| s.to_str()),
        Some("yaml") | Some("yml")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{DatasetKind, HashAlgorithm};

    const CURRENT: &str = include_str!("../../fixtures/roms_marbl_example.yaml");
    const LEGACY: &str = include_str!("../../fixtures/roms_marbl_legacy.yaml");

    const HASH: &str = "5a3e0579bf7b6489ef6acc313cbd2fdaf3371286abccbb73536eca5a156f4c43";

    fn load(text: &str) -> BlueprintResult<Registry> {
        load_str(text, &LoaderConfig::default())
    }

    fn minimal(component: &str) -> String {
        format!(
            "registry_attrs:\n  name: test\n  valid_date_range:\n    start_date: 2012-01-01 00:00:00\n    end_date: 2012-02-01 00:00:00\ncomponents:\n  - component:\n{}",
            component
        )
    }

    #[test]
    fn test_load_current_layout() {
        let registry = load(CURRENT).unwrap();
        assert_eq!(registry.name(), "roms_marbl_example_case");
        assert_eq!(registry.components.len(), 2);
        assert_eq!(registry.components[0].name, "MARBL");

        let roms = registry.component("ROMS").unwrap();
        let disc = roms.discretization.unwrap();
        assert_eq!((disc.n_procs_x, disc.n_procs_y, disc.time_step), (3, 3, 60.0));
        assert_eq!(
            roms.base_model.as_ref().unwrap().checkout_target,
            "594ac425e9dbe663ce48ced0915c0007c6cca843"
        );
        assert_eq!(roms.datasets(&DatasetKind::BoundaryForcing).len(), 2);
        assert_eq!(roms.datasets(&DatasetKind::SurfaceForcing).len(), 3);
    }

    #[test]
    fn test_both_layouts_agree() {
        let current = load(CURRENT).unwrap();
        let legacy = load(LEGACY).unwrap();

        assert_eq!(current.components.len(), legacy.components.len());
        for (a, b) in current.components.iter().zip(&legacy.components) {
            assert_eq!(a.name, b.name);
            assert_eq!(a.base_model, b.base_model);
            assert_eq!(a.discretization, b.discretization);
            assert_eq!(a.code_file_count(), b.code_file_count());
        }

        let roms = legacy.component("ROMS").unwrap();
        let disc = roms.discretization.unwrap();
        assert_eq!((disc.n_procs_x, disc.n_procs_y, disc.time_step), (3, 3, 60.0));
        assert_eq!(roms.additional_source_code.as_ref().unwrap().files.len(), 8);
        assert_eq!(roms.namelists.as_ref().unwrap().files.len(), 4);
        assert_eq!(
            roms.namelists.as_ref().unwrap().subdir.as_deref(),
            Some("additional_code/ROMS")
        );
    }

    #[test]
    fn test_single_reference_becomes_list() {
        let legacy = load(LEGACY).unwrap();
        let roms = legacy.component("ROMS").unwrap();
        let bry = roms.datasets(&DatasetKind::BoundaryForcing);
        assert_eq!(bry.len(), 1);
        assert!(bry[0].location.ends_with("roms_bry_2012.nc"));
    }

    #[test]
    fn test_hash_normalized_to_lowercase() {
        let legacy = load(LEGACY).unwrap();
        let grid = &legacy.component("ROMS").unwrap().datasets(&DatasetKind::ModelGrid)[0];
        assert_eq!(grid.file_hash, HASH);
    }

    #[test]
    fn test_idempotent() {
        assert_eq!(load(CURRENT).unwrap(), load(CURRENT).unwrap());
        assert_eq!(load(LEGACY).unwrap(), load(LEGACY).unwrap());
    }

    #[test]
    fn test_round_trip() {
        for text in [CURRENT, LEGACY] {
            let registry = load(text).unwrap();
            let yaml = registry.to_yaml().unwrap();
            let reloaded = load(&yaml).unwrap();
            assert_eq!(registry, reloaded);
        }
    }

    #[test]
    fn test_round_trip_keeps_fractional_seconds() {
        let text = "registry_attrs:\n  name: test\n  valid_date_range:\n    start_date: '2012-01-01T00:00:00.25Z'\n    end_date: '2012-01-01T00:00:00.75Z'\ncomponents: []\n";
        let registry = load(text).unwrap();
        let yaml = registry.to_yaml().unwrap();
        assert!(yaml.contains("2012-01-01 00:00:00.250"));
        assert_eq!(load(&yaml).unwrap(), registry);
    }

    #[test]
    fn test_key_order_irrelevant() {
        let a = minimal(&format!(
            "      component_type: ROMS\n      discretization: {{ n_procs_x: 2, n_procs_y: 4, time_step: 30 }}\n      model_grid: {{ location: grid.nc, file_hash: {HASH} }}\n"
        ));
        let b = minimal(&format!(
            "      model_grid: {{ file_hash: {HASH}, location: grid.nc }}\n      discretization: {{ time_step: 30, n_procs_y: 4, n_procs_x: 2 }}\n      component_type: ROMS\n"
        ));
        assert_eq!(load(&a).unwrap(), load(&b).unwrap());
    }

    #[test]
    fn test_missing_components() {
        let text = "registry_attrs:\n  name: test\n  valid_date_range:\n    start_date: 2012-01-01\n    end_date: 2012-02-01\n";
        let err = load(text).unwrap_err();
        assert!(matches!(err, BlueprintError::MalformedManifest { .. }));
        assert_eq!(err.field_path(), Some("components"));
    }

    #[test]
    fn test_missing_registry_attrs() {
        let err = load("components: []\n").unwrap_err();
        assert!(matches!(err, BlueprintError::MalformedManifest { .. }));
        assert_eq!(err.field_path(), Some("registry_attrs"));
    }

    #[test]
    fn test_components_wrong_shape() {
        let text = "registry_attrs:\n  name: test\n  valid_date_range:\n    start_date: 2012-01-01\n    end_date: 2012-02-01\ncomponents:\n  roms: {}\n";
        let err = load(text).unwrap_err();
        assert!(matches!(err, BlueprintError::MalformedManifest { .. }));
        assert!(err.to_string().contains("expected a list"));
    }

    #[test]
    fn test_reversed_dates() {
        let text = CURRENT
            .replace("start_date: 2012-01-01 12:00:00", "start_date: 2013-01-01 12:00:00");
        let err = load(&text).unwrap_err();
        assert!(matches!(err, BlueprintError::InvalidRange { .. }));
        assert_eq!(err.field_path(), Some("registry_attrs.valid_date_range"));
    }

    #[test]
    fn test_equal_dates_rejected() {
        let text = "registry_attrs:\n  name: test\n  valid_date_range:\n    start_date: 2012-01-01\n    end_date: 2012-01-01\ncomponents: []\n";
        assert!(matches!(
            load(text).unwrap_err(),
            BlueprintError::InvalidRange { .. }
        ));
    }

    #[test]
    fn test_unparseable_date() {
        let text = "registry_attrs:\n  name: test\n  valid_date_range:\n    start_date: soon\n    end_date: 2012-01-01\ncomponents: []\n";
        let err = load(text).unwrap_err();
        assert_eq!(err.field_path(), Some("registry_attrs.valid_date_range.start_date"));
    }

    #[test]
    fn test_short_hash() {
        let text = minimal(
            "      component_type: ROMS\n      model_grid:\n        location: grid.nc\n        file_hash: 'abc12'\n",
        );
        let err = load(&text).unwrap_err();
        assert!(matches!(err, BlueprintError::InvalidHash { .. }));
        assert_eq!(
            err.field_path(),
            Some("components[0].component.model_grid.file_hash")
        );
    }

    #[test]
    fn test_numeric_hash_is_hash_error() {
        let text = minimal(
            "      component_type: ROMS\n      model_grid:\n        location: grid.nc\n        file_hash: 12345\n",
        );
        assert!(matches!(
            load(&text).unwrap_err(),
            BlueprintError::InvalidHash { .. }
        ));
    }

    #[test]
    fn test_restricted_hash_algorithms() {
        let sha512 = "b".repeat(128);
        let text = minimal(&format!(
            "      component_type: ROMS\n      model_grid: {{ location: grid.nc, file_hash: {sha512} }}\n"
        ));
        assert!(load(&text).is_ok());

        let config = LoaderConfig {
            accepted_hash_algorithms: vec![HashAlgorithm::Sha256],
            ..LoaderConfig::default()
        };
        assert!(matches!(
            load_str(&text, &config).unwrap_err(),
            BlueprintError::InvalidHash { .. }
        ));
    }

    #[test]
    fn test_non_positive_discretization() {
        for (field, body) in [
            ("n_procs_x", "{ n_procs_x: 0, n_procs_y: 3, time_step: 60 }"),
            ("n_procs_y", "{ n_procs_x: 3, n_procs_y: -1, time_step: 60 }"),
            ("time_step", "{ n_procs_x: 3, n_procs_y: 3, time_step: 0 }"),
            ("time_step", "{ n_procs_x: 3, n_procs_y: 3, time_step: -2.5 }"),
        ] {
            let text = minimal(&format!(
                "      component_type: ROMS\n      discretization: {}\n",
                body
            ));
            let err = load(&text).unwrap_err();
            assert!(
                matches!(err, BlueprintError::InvalidParameter { .. }),
                "{body}: {err}"
            );
            let expected = format!("components[0].component.discretization.{}", field);
            assert_eq!(err.field_path(), Some(expected.as_str()));
        }
    }

    #[test]
    fn test_discretization_defaults() {
        let text = minimal("      component_type: ROMS\n      discretization: { time_step: 90 }\n");
        let registry = load(&text).unwrap();
        let disc = registry.components[0].discretization.unwrap();
        assert_eq!(disc.n_procs_tot(), 1);
        assert_eq!(disc.time_step, 90.0);
    }

    #[test]
    fn test_large_decomposition_total() {
        let text = minimal(
            "      component_type: ROMS\n      discretization: { n_procs_x: 100000, n_procs_y: 100000, time_step: 60 }\n",
        );
        let registry = load(&text).unwrap();
        let disc = registry.components[0].discretization.unwrap();
        assert_eq!(disc.n_procs_tot(), 10_000_000_000);
    }

    #[test]
    fn test_missing_time_step_is_malformed() {
        let text = minimal("      component_type: ROMS\n      discretization: { n_procs_x: 2 }\n");
        assert!(matches!(
            load(&text).unwrap_err(),
            BlueprintError::MalformedManifest { .. }
        ));
    }

    #[test]
    fn test_unknown_component_name() {
        let text = minimal(
            "      base_model:\n        source_repo: https://example.org/model.git\n        checkout_target: v1\n",
        );
        let registry = load(&text).unwrap();
        assert_eq!(registry.components.len(), 1);
        assert_eq!(registry.components[0].name, "unknown");
    }

    #[test]
    fn test_component_type_wins_over_base_model_name() {
        let text = minimal(
            "      component_type: ROMS\n      base_model:\n        name: roms-legacy\n        source_repo: https://example.org/roms.git\n        checkout_target: main\n",
        );
        assert_eq!(load(&text).unwrap().components[0].name, "ROMS");
    }

    #[test]
    fn test_numeric_checkout_target_kept_as_string() {
        let text = minimal(
            "      component_type: MARBL\n      base_model:\n        source_repo: https://example.org/marbl.git\n        checkout_target: 1.5\n",
        );
        let registry = load(&text).unwrap();
        assert_eq!(
            registry.components[0].base_model.as_ref().unwrap().checkout_target,
            "1.5"
        );
    }

    #[test]
    fn test_scalar_fields_share_one_rule() {
        let text = "registry_attrs:\n  name: 2024\n  valid_date_range:\n    start_date: 20120101\n    end_date: 20120201\ncomponents:\n  - component:\n      component_type: true\n";
        let registry = load(text).unwrap();
        assert_eq!(registry.name(), "2024");
        assert_eq!(registry.components[0].name, "true");
        assert_eq!(load(&registry.to_yaml().unwrap()).unwrap(), registry);

        let text = "registry_attrs:\n  name: [a, b]\n  valid_date_range:\n    start_date: 2012-01-01\n    end_date: 2012-02-01\ncomponents: []\n";
        let err = load(text).unwrap_err();
        assert!(matches!(err, BlueprintError::MalformedManifest { .. }));
        assert_eq!(err.field_path(), Some("registry_attrs.name"));
    }

    #[test]
    fn test_singular_kind_rejects_many() {
        let text = minimal(&format!(
            "      component_type: ROMS\n      model_grid:\n        - {{ location: a.nc, file_hash: {HASH} }}\n        - {{ location: b.nc, file_hash: {HASH} }}\n"
        ));
        let err = load(&text).unwrap_err();
        assert!(matches!(err, BlueprintError::MalformedManifest { .. }));
    }

    #[test]
    fn test_singular_kind_accepts_one_item_list() {
        let text = minimal(&format!(
            "      component_type: ROMS\n      model_grid:\n        - {{ location: a.nc, file_hash: {HASH} }}\n"
        ));
        let registry = load(&text).unwrap();
        assert_eq!(registry.components[0].datasets(&DatasetKind::ModelGrid).len(), 1);
    }

    #[test]
    fn test_empty_dataset_list_rejected() {
        let text = minimal("      component_type: ROMS\n      surface_forcing: []\n");
        assert!(matches!(
            load(&text).unwrap_err(),
            BlueprintError::MalformedManifest { .. }
        ));
    }

    #[test]
    fn test_other_dataset_kinds_under_input_datasets() {
        let text = minimal(&format!(
            "      component_type: ROMS\n      input_datasets:\n        river_forcing:\n          - {{ location: r1.nc, file_hash: {HASH} }}\n          - {{ location: r2.nc, file_hash: {HASH} }}\n"
        ));
        let registry = load(&text).unwrap();
        let kind = DatasetKind::Other("river_forcing".to_string());
        assert_eq!(registry.components[0].datasets(&kind).len(), 2);
    }

    #[test]
    fn test_duplicate_dataset_kind_rejected() {
        let text = minimal(&format!(
            "      component_type: ROMS\n      model_grid: {{ location: a.nc, file_hash: {HASH} }}\n      input_datasets:\n        model_grid: {{ location: b.nc, file_hash: {HASH} }}\n"
        ));
        assert!(matches!(
            load(&text).unwrap_err(),
            BlueprintError::MalformedManifest { .. }
        ));
    }

    #[test]
    fn test_both_code_keys_rejected() {
        let text = minimal(
            "      component_type: ROMS\n      additional_source_code: { location: repo, files: [a.opt] }\n      additional_code: { location: repo, source_mods: [a.opt] }\n",
        );
        assert!(matches!(
            load(&text).unwrap_err(),
            BlueprintError::MalformedManifest { .. }
        ));
    }

    #[test]
    fn test_absolute_code_path_rejected() {
        let text = minimal(
            "      component_type: ROMS\n      additional_source_code: { location: repo, files: [/etc/passwd] }\n",
        );
        let err = load(&text).unwrap_err();
        assert_eq!(
            err.field_path(),
            Some("components[0].component.additional_source_code.files[0]")
        );
    }

    #[test]
    fn test_dataset_window_dates() {
        let registry = load(CURRENT).unwrap();
        let roms = registry.component("ROMS").unwrap();
        let jan = crate::manifest::dates::parse_timestamp("2012-01-03 12:00:00").unwrap();
        let jan_end = crate::manifest::dates::parse_timestamp("2012-01-03 12:30:00").unwrap();

        let selected: Vec<&str> = roms
            .datasets_for_window(jan, jan_end)
            .into_iter()
            .map(|(_, r)| r.file_name())
            .collect();
        assert!(selected.contains(&"roms_frc_201201.nc"));
        assert!(!selected.contains(&"roms_frc_201202.nc"));
        assert!(selected.contains(&"roms_frc_bgc_2012.nc"));
        assert_eq!(selected[0], "roms_grd.nc");
    }

    #[test]
    fn test_reversed_dataset_dates() {
        let text = minimal(&format!(
            "      component_type: ROMS\n      surface_forcing:\n        - {{ location: a.nc, file_hash: {HASH}, start_date: 2012-02-01, end_date: 2012-01-01 }}\n"
        ));
        assert!(matches!(
            load(&text).unwrap_err(),
            BlueprintError::InvalidRange { .. }
        ));
    }

    #[test]
    fn test_yaml_syntax_error() {
        assert!(matches!(
            load("registry_attrs: [unclosed").unwrap_err(),
            BlueprintError::Parse(_)
        ));
    }

    #[test]
    fn test_load_file_size_cap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.yaml");
        fs::write(&path, CURRENT).unwrap();

        let config = LoaderConfig {
            max_manifest_bytes: 100,
            ..LoaderConfig::default()
        };
        assert!(matches!(
            load_file(&path, &config).unwrap_err(),
            BlueprintError::TooLarge { .. }
        ));
        assert!(load_file(&path, &LoaderConfig::default()).is_ok());
    }

    #[test]
    fn test_load_dir_skips_broken_and_hidden() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("a.yaml"), CURRENT).unwrap();
        fs::write(dir.path().join("nested/b.yml"), LEGACY).unwrap();
        fs::write(dir.path().join(".hidden.yaml"), CURRENT).unwrap();
        fs::write(dir.path().join("broken.yaml"), "components: 3").unwrap();
        fs::write(dir.path().join("notes.txt"), "not a blueprint").unwrap();

        let loaded = load_dir(dir.path(), &LoaderConfig::default()).unwrap();
        let names: Vec<String> = loaded
            .iter()
            .map(|(p, _)| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.yaml", "b.yml"]);
    }

    #[test]
    fn test_load_dir_missing_is_empty() {
        let loaded = load_dir(Path::new("/nonexistent/blueprints"), &LoaderConfig::default()).unwrap();
        assert!(loaded.is_empty());
    }
}
