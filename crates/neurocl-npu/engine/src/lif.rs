// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! LIF neuron kernels
//!
//! The spiking rule is the sub-stepped integrator of
//! [`neurocl_npu_neural::LIFModel`] unrolled `upsample` times into one
//! fragment, using the same f32 sub-step constants, so device results match
//! the host model exactly on the host device.

use std::sync::Arc;

use neurocl_npu_neural::{SubStep, V_THRESHOLD};
use neurocl_npu_runtime::kernel::{Expr, Fragment, Stmt};
use neurocl_npu_runtime::{Device, DeviceRaggedArray};

use crate::error::{EngineError, Result};
use crate::plan::KernelPlan;
use crate::planner::{ElementwisePlanner, ParamArg, DEFAULT_MAX_LOCAL_SIZE};

/// Planning options shared by the LIF kernels
#[derive(Debug, Clone)]
pub struct LifOptions {
    /// Simulation tick in seconds
    pub dt: f64,
    /// Sub-steps per tick (spiking rule only)
    pub upsample: usize,
    /// 0 = Block regime, otherwise elements per flattened work-item
    pub n_elements: usize,
    pub max_local_size: usize,
    pub tag: Option<String>,
}

impl Default for LifOptions {
    fn default() -> Self {
        Self {
            dt: 0.001,
            upsample: 1,
            n_elements: 0,
            max_local_size: DEFAULT_MAX_LOCAL_SIZE,
            tag: None,
        }
    }
}

/// Buffers of one LIF group
///
/// `voltage`/`refractory` are read as state and `out_*` written; they
/// normally alias the same rows.
pub struct LifArgs<D: Device> {
    pub j: DeviceRaggedArray<D>,
    pub voltage: DeviceRaggedArray<D>,
    pub refractory: DeviceRaggedArray<D>,
    pub out_voltage: DeviceRaggedArray<D>,
    pub out_refractory: DeviceRaggedArray<D>,
    pub out_spikes: DeviceRaggedArray<D>,
    pub tau_rc: ParamArg<D>,
    pub tau_ref: ParamArg<D>,
}

/// Sub-stepped LIF update over scalars `j`, `v`, `w` into `ov`, `ow`, `os`
pub fn lif_fragment(dt: f64, upsample: usize) -> Result<Fragment> {
    if upsample == 0 {
        return Err(EngineError::Configuration(
            "LIF upsample must be at least 1".to_string(),
        ));
    }
    if !(dt.is_finite() && dt > 0.0) {
        return Err(EngineError::Configuration(format!(
            "LIF dt must be positive (got {})",
            dt
        )));
    }
    let sub = SubStep::new(dt, upsample);
    let v = || Expr::var("v");
    let w = || Expr::var("w");

    let mut body = vec![Stmt::assign("spiked", 0.0)];
    for _ in 0..upsample {
        body.push(Stmt::assign(
            "dv",
            Expr::c(sub.dt) / "tau" * (Expr::var("j") - "v"),
        ));
        body.push(Stmt::assign("v", v() + "dv"));
        body.push(Stmt::if_else(
            v().lt(0.0).or(w().gt(sub.two_dt)),
            vec![Stmt::assign("v", 0.0)],
            vec![Stmt::when(
                w().gt(sub.dt),
                vec![Stmt::assign(
                    "v",
                    v() * (Expr::c(1.0) - (w() - sub.dt) * sub.dt_inv),
                )],
            )],
        ));
        body.push(Stmt::if_else(
            v().gt(V_THRESHOLD),
            vec![
                Stmt::assign(
                    "overshoot",
                    Expr::c(sub.dt) * (v() - V_THRESHOLD) / "dv",
                ),
                Stmt::assign("w", Expr::var("ref") - "overshoot" + sub.dt),
                Stmt::assign("v", 0.0),
                Stmt::assign("spiked", 1.0),
            ],
            vec![Stmt::assign("w", w() - sub.dt)],
        ));
    }
    body.push(Stmt::assign("ov", v()));
    body.push(Stmt::assign("ow", w()));
    body.push(Stmt::assign(
        "os",
        Expr::select(Expr::var("spiked").gt(0.0), 1.0, 0.0),
    ));

    Ok(Fragment::new(body).with_locals(["spiked", "dv", "overshoot"]))
}

/// Steady-state LIF rate of scalar `j` into `r`
pub fn lif_rate_fragment() -> Fragment {
    Fragment::new(vec![
        Stmt::assign("j", (Expr::var("j") - 1.0).max(0.0)),
        Stmt::assign(
            "r",
            Expr::select(
                Expr::var("j").gt(0.0),
                Expr::c(1.0) / (Expr::var("ref") + Expr::var("tau") * (Expr::c(1.0) / "j").log1p()),
                0.0,
            ),
        ),
    ])
}

/// Plan one spiking LIF update kernel
pub fn plan_lif<D: Device>(
    device: &Arc<D>,
    args: LifArgs<D>,
    options: &LifOptions,
) -> Result<KernelPlan<D>> {
    let mut planner = ElementwisePlanner::new("lif", lif_fragment(options.dt, options.upsample)?)
        .input("j", args.j)
        .input("v", args.voltage)
        .input("w", args.refractory)
        .output("ov", args.out_voltage)
        .output("ow", args.out_refractory)
        .output("os", args.out_spikes)
        .param("tau", args.tau_rc)
        .param("ref", args.tau_ref)
        .n_elements(options.n_elements)
        .max_local_size(options.max_local_size);
    if let Some(tag) = &options.tag {
        planner = planner.tag(tag.clone());
    }
    planner.build(device)
}

/// Plan one LIF rate kernel
pub fn plan_lif_rate<D: Device>(
    device: &Arc<D>,
    j: DeviceRaggedArray<D>,
    rates: DeviceRaggedArray<D>,
    tau_rc: ParamArg<D>,
    tau_ref: ParamArg<D>,
    options: &LifOptions,
) -> Result<KernelPlan<D>> {
    let mut planner = ElementwisePlanner::new("lif_rate", lif_rate_fragment())
        .input("j", j)
        .output("r", rates)
        .param("tau", tau_rc)
        .param("ref", tau_ref)
        .n_elements(options.n_elements)
        .max_local_size(options.max_local_size);
    if let Some(tag) = &options.tag {
        planner = planner.tag(tag.clone());
    }
    planner.build(device)
}
