// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! # neurocl Engine
//!
//! Plans a [`Model`] into device kernels and runs it step by step.
//!
//! ## Components
//!
//! - **planner**: elementwise kernels over ragged batches, in the Block or
//!   Flattened regime, with scalar-or-per-element parameter broadcast
//! - **lif**: spiking LIF update (with sub-step upsampling) and LIF rate
//! - **direct**: user functions lowered to kernels, or run on the host
//! - **probes**: periodic sampling into device rings, drained to the host
//! - **dag**: dependency-ordered plan playback
//! - **profiling**: per-plan call counts, time and throughput
//! - **simulator**: ties everything together
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use neurocl_config::SimulatorConfig;
//! use neurocl_npu_engine::{Model, OperatorGroup, SimLif, Simulator};
//! use neurocl_npu_neural::LIFParameters;
//! use neurocl_npu_runtime::HostDevice;
//!
//! let mut model = Model::new();
//! let j = model.add_vector("j", &[2.0; 4]);
//! let v = model.add_vector("v", &[0.0; 4]);
//! let w = model.add_vector("w", &[0.0; 4]);
//! let s = model.add_vector("s", &[0.0; 4]);
//! model
//!     .add_group(OperatorGroup::Lif(vec![SimLif {
//!         j,
//!         voltage: v,
//!         refractory_time: w,
//!         output: s,
//!         params: LIFParameters::default(),
//!     }]))
//!     .unwrap();
//! let probe = model.add_probe(s, 0.001).unwrap();
//!
//! let device = Arc::new(HostDevice::new());
//! let mut sim = Simulator::new(device, &model, &SimulatorConfig::default()).unwrap();
//! sim.run_steps(100).unwrap();
//! assert_eq!(sim.probe_data(probe).unwrap().nrows(), 100);
//! ```

pub mod codegen;
pub mod dag;
pub mod direct;
pub mod error;
pub mod lif;
pub mod model;
pub mod plan;
pub mod planner;
pub mod probes;
pub mod profiling;
pub mod simulator;

pub use dag::{DagBuilder, ExecutionDag, PlanId};
pub use direct::{
    group_by_function, plan_direct, plan_direct_group, plan_direct_host, DirectFunction,
    DirectOptions, FunctionTranslator, KernelForm, KernelFormTranslator,
};
pub use error::{EngineError, Result};
pub use lif::{lif_fragment, lif_rate_fragment, plan_lif, plan_lif_rate, LifArgs, LifOptions};
pub use model::{
    ElementwiseKernel, Model, OperatorGroup, Probe, ProbeId, Signal, SignalId, SimDirect,
    SimElementwise, SimLif, SimLifRate,
};
pub use plan::{CostHints, HostPlan, KernelPlan, Marker, Plan};
pub use planner::{ElementwisePlanner, ParamArg};
pub use probes::{plan_probes, ProbeSampler};
pub use profiling::{ProfileReport, ProfileRow, Profiler, ReportColumn, ReportSort};
pub use simulator::Simulator;
