// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # neurocl - ragged-batch kernel engine for spiking simulation
//!
//! Plans thousands of small, variable-length vector updates (LIF neurons,
//! user functions, probes) into a handful of parallel kernels and replays
//! them once per simulation step.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! neurocl = "0.1"
//! ```
//!
//! ## Feature Flags
//!
//! - **`observability`** (default): logging initialisation helpers
//! - **`gpu`**: WGPU device (Metal/Vulkan/DirectX)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use neurocl::prelude::*;
//!
//! let config = neurocl::config::load_config(None, None)?;
//!
//! let mut model = Model::new();
//! let j = model.add_vector("j", &[2.0; 100]);
//! let v = model.add_vector("v", &[0.0; 100]);
//! let w = model.add_vector("w", &[0.0; 100]);
//! let s = model.add_vector("s", &[0.0; 100]);
//! model.add_group(OperatorGroup::Lif(vec![SimLif {
//!     j,
//!     voltage: v,
//!     refractory_time: w,
//!     output: s,
//!     params: LIFParameters::default(),
//! }]))?;
//! let spikes = model.add_probe(s, config.simulation.dt)?;
//!
//! let mut sim = Simulator::new(Arc::new(HostDevice::new()), &model, &config)?;
//! sim.run_steps(1000)?;
//! let data = sim.probe_data(spikes)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Foundation: neurocl-config, neurocl-observability      │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Models: neurocl-npu-neural                             │
//! │  (host LIF reference)                                   │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Runtime: neurocl-npu-runtime                           │
//! │  (Device trait, kernel IR, ragged arrays, host + wgpu)  │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Engine: neurocl-npu-engine                             │
//! │  (planner, probes, execution DAG, simulator)            │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## License
//!
//! Apache-2.0

pub use neurocl_config as config;
pub use neurocl_npu_engine as engine;
pub use neurocl_npu_neural as neural;
pub use neurocl_npu_runtime as runtime;

#[cfg(feature = "observability")]
pub use neurocl_observability as observability;

/// Logging settings for [`observability::init_logging`] from the simulator
/// configuration
#[cfg(feature = "observability")]
pub fn logging_config(config: &config::SimulatorConfig) -> observability::LoggingConfig {
    observability::LoggingConfig {
        level: config.logging.level.clone(),
        format: observability::LogFormat::from_name(&config.logging.format),
        ansi: config.logging.ansi,
        log_dir: None,
    }
}

/// Prelude - commonly used types and traits
pub mod prelude {
    pub use crate::config::SimulatorConfig;
    pub use crate::engine::{
        DirectFunction, ElementwiseKernel, EngineError, KernelForm, Model, OperatorGroup, ProbeId,
        SignalId, SimDirect, SimElementwise, SimLif, SimLifRate, Simulator,
    };
    pub use crate::neural::{LIFParameters, NeuronModel};
    pub use crate::runtime::{Device, HostDevice};

    #[cfg(feature = "gpu")]
    pub use crate::runtime::WgpuDevice;
}
