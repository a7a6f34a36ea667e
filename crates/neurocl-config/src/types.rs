// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! Each struct maps to one section of `neurocl.toml`. Missing keys take the
//! defaults below.

use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub simulation: SimulationConfig,
    pub planning: PlanningConfig,
    pub profiling: ProfilingConfig,
    pub logging: LoggingConfig,
}

/// Time step, probe buffering and strictness
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Simulation tick in seconds
    pub dt: f64,
    /// Probe ring slots per probe between drains
    pub n_prealloc_probes: usize,
    /// Fail when a function cannot run on the device instead of falling
    /// back to the host
    pub strict_kernels: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            dt: 0.001,
            n_prealloc_probes: 1000,
            strict_kernels: false,
        }
    }
}

/// Kernel planning knobs
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PlanningConfig {
    /// LIF sub-steps per tick
    pub lif_upsample: usize,
    /// Elements per work-item for LIF kernels (0 = Block regime)
    pub lif_n_elements: usize,
    /// Elements per work-item for LIF rate kernels (0 = Block regime)
    pub lif_rate_n_elements: usize,
    /// Upper bound on work-group width (power of two)
    pub max_local_size: usize,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            lif_upsample: 1,
            lif_n_elements: 0,
            lif_rate_n_elements: 10,
            max_local_size: 256,
        }
    }
}

/// Per-plan profiling
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProfilingConfig {
    /// 0 = off, 1 = collect, 2 = collect and log a report after each run
    pub level: u8,
    /// Report sort column, `-` prefix for ascending (e.g. `"-runtime"`)
    pub sort_column: Option<String>,
}

/// Logging section
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    pub level: String,
    /// text or json
    pub format: String,
    /// Colour console output
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            ansi: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: SimulatorConfig = toml::from_str(
            r#"
            [simulation]
            dt = 0.0005

            [profiling]
            level = 1
            "#,
        )
        .unwrap();
        assert_eq!(config.simulation.dt, 0.0005);
        assert_eq!(config.simulation.n_prealloc_probes, 1000);
        assert_eq!(config.planning, PlanningConfig::default());
        assert_eq!(config.profiling.level, 1);
        assert_eq!(config.logging.level, "info");
    }
}
