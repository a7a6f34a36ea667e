// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! Three tiers, later ones winning:
//! 1. TOML file (or built-in defaults when no file exists)
//! 2. Environment variables
//! 3. Explicit key/value overrides

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::validation::validate_config;
use crate::{ConfigError, ConfigResult, SimulatorConfig};

/// File name searched for when no path is given
pub const CONFIG_FILE_NAME: &str = "neurocl.toml";

/// Find the configuration file
///
/// Search order:
/// 1. `NEUROCL_CONFIG_PATH` environment variable (must exist if set)
/// 2. `./neurocl.toml`
/// 3. Up to five parent directories
///
/// Returns `Ok(None)` when nothing is found.
pub fn find_config_file() -> ConfigResult<Option<PathBuf>> {
    if let Ok(env_path) = env::var("NEUROCL_CONFIG_PATH") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(Some(path));
        }
        return Err(ConfigError::FileNotFound(format!(
            "Config file specified by NEUROCL_CONFIG_PATH not found: {}",
            path.display()
        )));
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));
        let mut current = cwd.as_path();
        for _ in 0..5 {
            match current.parent() {
                Some(parent) => {
                    search_paths.push(parent.join(CONFIG_FILE_NAME));
                    current = parent;
                }
                None => break,
            }
        }
    }

    Ok(search_paths.into_iter().find(|p| p.exists()))
}

/// Load, override and validate the configuration
///
/// # Arguments
///
/// * `config_path` - Explicit file; if `None` the file is searched for
/// * `overrides` - Key/value overrides applied last (see [`apply_overrides`])
///
/// # Errors
///
/// Missing explicit file, unreadable file, invalid TOML, or validation
/// failure.
pub fn load_config(
    config_path: Option<&Path>,
    overrides: Option<&HashMap<String, String>>,
) -> ConfigResult<SimulatorConfig> {
    let config_file = match config_path {
        Some(path) if !path.exists() => {
            return Err(ConfigError::FileNotFound(path.display().to_string()))
        }
        Some(path) => Some(path.to_path_buf()),
        None => find_config_file()?,
    };

    let mut config = match config_file {
        Some(path) => {
            let content = fs::read_to_string(&path)?;
            toml::from_str(&content)?
        }
        None => SimulatorConfig::default(),
    };

    apply_environment_overrides(&mut config);
    if let Some(overrides) = overrides {
        apply_overrides(&mut config, overrides);
    }

    validate_config(&config)?;
    Ok(config)
}

fn parse_bool(value: &str) -> bool {
    let value = value.to_lowercase();
    value == "true" || value == "1" || value == "yes"
}

/// Apply environment variable overrides
///
/// Supported environment variables:
/// - `NEUROCL_DT` -> `simulation.dt`
/// - `NEUROCL_N_PREALLOC_PROBES` -> `simulation.n_prealloc_probes`
/// - `NEUROCL_STRICT_KERNELS` -> `simulation.strict_kernels`
/// - `NEUROCL_PROFILING` -> `profiling.level`
/// - `NEUROCL_LIF_UPSAMPLE` -> `planning.lif_upsample`
/// - `NEUROCL_LOG_LEVEL` -> `logging.level`
///
/// Values that fail to parse are ignored.
pub fn apply_environment_overrides(config: &mut SimulatorConfig) {
    if let Ok(value) = env::var("NEUROCL_DT") {
        if let Ok(dt) = value.parse::<f64>() {
            config.simulation.dt = dt;
        }
    }
    if let Ok(value) = env::var("NEUROCL_N_PREALLOC_PROBES") {
        if let Ok(n) = value.parse::<usize>() {
            config.simulation.n_prealloc_probes = n;
        }
    }
    if let Ok(value) = env::var("NEUROCL_STRICT_KERNELS") {
        config.simulation.strict_kernels = parse_bool(&value);
    }
    if let Ok(value) = env::var("NEUROCL_PROFILING") {
        if let Ok(level) = value.parse::<u8>() {
            config.profiling.level = level;
        }
    }
    if let Ok(value) = env::var("NEUROCL_LIF_UPSAMPLE") {
        if let Ok(upsample) = value.parse::<usize>() {
            config.planning.lif_upsample = upsample;
        }
    }
    if let Ok(value) = env::var("NEUROCL_LOG_LEVEL") {
        config.logging.level = value;
    }
}

/// Apply explicit key/value overrides
///
/// Keys: `dt`, `n_prealloc_probes`, `strict_kernels`, `lif_upsample`,
/// `lif_n_elements`, `lif_rate_n_elements`, `max_local_size`, `profiling`,
/// `sort_column`, `log_level`, `log_format`.
pub fn apply_overrides(config: &mut SimulatorConfig, overrides: &HashMap<String, String>) {
    if let Some(dt) = overrides.get("dt").and_then(|v| v.parse::<f64>().ok()) {
        config.simulation.dt = dt;
    }
    if let Some(n) = overrides
        .get("n_prealloc_probes")
        .and_then(|v| v.parse::<usize>().ok())
    {
        config.simulation.n_prealloc_probes = n;
    }
    if let Some(value) = overrides.get("strict_kernels") {
        config.simulation.strict_kernels = parse_bool(value);
    }

    let planning = [
        ("lif_upsample", &mut config.planning.lif_upsample),
        ("lif_n_elements", &mut config.planning.lif_n_elements),
        ("lif_rate_n_elements", &mut config.planning.lif_rate_n_elements),
        ("max_local_size", &mut config.planning.max_local_size),
    ];
    for (key, field) in planning {
        if let Some(n) = overrides.get(key).and_then(|v| v.parse::<usize>().ok()) {
            *field = n;
        }
    }

    if let Some(level) = overrides.get("profiling").and_then(|v| v.parse::<u8>().ok()) {
        config.profiling.level = level;
    }
    if let Some(column) = overrides.get("sort_column") {
        config.profiling.sort_column = Some(column.clone());
    }
    if let Some(level) = overrides.get("log_level") {
        config.logging.level = level.clone();
    }
    if let Some(format) = overrides.get("log_format") {
        config.logging.format = format.clone();
    }
}
