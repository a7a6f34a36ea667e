// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! Every violation is collected so one error lists all of them.

use crate::{ConfigError, ConfigResult, SimulatorConfig};

/// Validation errors that can occur during config validation
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    InvalidValue { field: String, reason: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
        }
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["text", "json"];

/// Validate the complete configuration
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` listing every problem found
pub fn validate_config(config: &SimulatorConfig) -> ConfigResult<()> {
    let mut errors = Vec::new();
    let mut invalid = |field: &str, reason: String| {
        errors.push(ConfigValidationError::InvalidValue {
            field: field.to_string(),
            reason,
        })
    };

    let sim = &config.simulation;
    if !(sim.dt.is_finite() && sim.dt > 0.0) {
        invalid(
            "simulation.dt",
            format!("must be a positive number of seconds (got {})", sim.dt),
        );
    }
    if sim.n_prealloc_probes == 0 {
        invalid("simulation.n_prealloc_probes", "must be at least 1".to_string());
    }

    let planning = &config.planning;
    if planning.lif_upsample == 0 {
        invalid("planning.lif_upsample", "must be at least 1".to_string());
    }
    if !planning.max_local_size.is_power_of_two() {
        invalid(
            "planning.max_local_size",
            format!("must be a non-zero power of two (got {})", planning.max_local_size),
        );
    }

    if config.profiling.level > 2 {
        invalid(
            "profiling.level",
            format!("must be 0, 1 or 2 (got {})", config.profiling.level),
        );
    }

    let level = config.logging.level.to_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        invalid(
            "logging.level",
            format!("must be one of {} (got '{}')", LOG_LEVELS.join(", "), config.logging.level),
        );
    }
    let format = config.logging.format.to_lowercase();
    if !LOG_FORMATS.contains(&format.as_str()) {
        invalid(
            "logging.format",
            format!("must be text or json (got '{}')", config.logging.format),
        );
    }

    if !errors.is_empty() {
        let error_messages = errors
            .iter()
            .map(|e| format!("  - {}", e))
            .collect::<Vec<_>>()
            .join("\n");

        return Err(ConfigError::ValidationError(format!(
            "Configuration validation failed:\n{}",
            error_messages
        )));
    }

    Ok(())
}
