// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Probe sampler
//!
//! One kernel samples every probed signal into a per-probe ring of
//! `n_prealloc` slots on the device. Each row keeps a countdown (steps until
//! the next sample) and a buffer position (next free slot). Rings are copied
//! back to the host by [`ProbeSampler::drain`], which also resets the
//! positions; the countdowns keep their phase across drains.

use std::sync::Arc;

use neurocl_npu_runtime::kernel::{
    Access, KernelBody, KernelSource, LaunchGeometry, ProbeBody,
};
use neurocl_npu_runtime::{Device, DeviceBuffer, DeviceRaggedArray};
use tracing::{debug, trace};

use crate::codegen::wgsl;
use crate::error::{EngineError, Result};
use crate::plan::{CostHints, KernelPlan};
use crate::planner::check_vector_batch;
use crate::planner::layout::{work_group_width, BindingTable, MetaBuilder};

/// Probe kernel plus the device state it samples into
pub struct ProbeSampler<D: Device> {
    device: Arc<D>,
    plan: Arc<KernelPlan<D>>,
    countdowns: D::Buffer,
    bufpositions: D::Buffer,
    ring: DeviceRaggedArray<D>,
    periods: Vec<usize>,
    dims: Vec<usize>,
    n_prealloc: usize,
}

impl<D: Device> ProbeSampler<D> {
    /// Shared handle to the sampling kernel
    pub fn plan(&self) -> Arc<KernelPlan<D>> {
        Arc::clone(&self.plan)
    }

    pub fn n_rows(&self) -> usize {
        self.periods.len()
    }

    pub fn periods(&self) -> &[usize] {
        &self.periods
    }

    pub fn n_prealloc(&self) -> usize {
        self.n_prealloc
    }

    /// Longest run that cannot overflow any ring when started drained
    pub fn max_steps_between_drains(&self) -> usize {
        let min_period = self.periods.iter().copied().min().unwrap_or(1);
        self.n_prealloc * min_period
    }

    /// Ring row for probe `row`
    pub fn ring(&self) -> &DeviceRaggedArray<D> {
        &self.ring
    }

    /// Samples currently buffered per row (waits for the device)
    pub fn buffered(&self) -> Result<Vec<usize>> {
        self.device.finish()?;
        let positions = self
            .device
            .read_i32(&self.bufpositions, 0..self.bufpositions.len())?;
        Ok(positions
            .into_iter()
            .map(|p| usize::try_from(p).unwrap_or(0))
            .collect())
    }

    /// Steps until each row takes its next sample, minus one
    pub fn countdowns(&self) -> Result<Vec<i32>> {
        self.device.finish()?;
        Ok(self
            .device
            .read_i32(&self.countdowns, 0..self.countdowns.len())?)
    }

    /// Fail unless every ring is empty
    pub fn ensure_drained(&self) -> Result<()> {
        match self.buffered()?.into_iter().enumerate().find(|(_, n)| *n > 0) {
            Some((row, buffered)) => Err(EngineError::ProbeBufferNotDrained { row, buffered }),
            None => Ok(()),
        }
    }

    /// Copy buffered samples to the host and empty the rings
    ///
    /// Returns, per row, the first `n_buffered * dims` values of its ring
    /// (samples in order, each `dims` long).
    pub fn drain(&self) -> Result<Vec<Vec<f32>>> {
        let buffered = self.buffered()?;
        let mut out = Vec::with_capacity(buffered.len());
        for (row, &n_buffered) in buffered.iter().enumerate() {
            let n_values = n_buffered * self.dims[row];
            if n_values == 0 {
                out.push(Vec::new());
                continue;
            }
            let start = self.ring.starts()[row];
            out.push(
                self.device
                    .read_f32(self.ring.buffer(), start..start + n_values)?,
            );
        }
        self.device.fill_i32(&self.bufpositions, 0)?;
        self.device.finish()?;
        trace!(
            target: "neurocl-engine",
            "[PROBES] Drained {} samples across {} rows",
            buffered.iter().sum::<usize>(),
            buffered.len()
        );
        Ok(out)
    }
}

/// Plan the sampler for probed signals `x` with per-row `periods` (steps)
///
/// Returns `None` when there is nothing to probe.
pub fn plan_probes<D: Device>(
    device: &Arc<D>,
    x: &DeviceRaggedArray<D>,
    periods: &[usize],
    n_prealloc: usize,
    max_local_size: usize,
    tag: Option<String>,
) -> Result<Option<ProbeSampler<D>>> {
    if x.is_empty() {
        return Ok(None);
    }
    if periods.len() != x.len() {
        return Err(EngineError::RowCountMismatch {
            name: "probes.periods".to_string(),
            expected: x.len(),
            actual: periods.len(),
        });
    }
    if let Some(row) = periods.iter().position(|&p| p == 0) {
        return Err(EngineError::Configuration(format!(
            "probe row {} has a sampling period of zero steps",
            row
        )));
    }
    if n_prealloc == 0 {
        return Err(EngineError::Configuration(
            "probe rings need at least one slot".to_string(),
        ));
    }
    let dims = x.lengths();
    check_vector_batch("probes.signals", x, &dims)?;

    let n_rows = x.len();
    let period_values = periods
        .iter()
        .map(|&p| {
            i32::try_from(p).map_err(|_| {
                EngineError::Configuration(format!("probe period {} is too large", p))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let countdowns = device.alloc_i32(&vec![0; n_rows], "probes.countdowns")?;
    let bufpositions = device.alloc_i32(&vec![0; n_rows], "probes.bufpositions")?;
    let period_buffer = device.alloc_i32(&period_values, "probes.periods")?;
    let shapes: Vec<(usize, usize)> = dims.iter().map(|&d| (n_prealloc, d)).collect();
    let ring = DeviceRaggedArray::zeros(Arc::clone(device), &shapes, "probes.ring")?;

    let mut bindings = BindingTable::<D>::new();
    let countdown_slot = bindings.bind("countdowns", &countdowns, Access::ReadWrite);
    let bufposition_slot = bindings.bind("bufpositions", &bufpositions, Access::ReadWrite);
    let period_slot = bindings.bind("periods", &period_buffer, Access::Read);
    let x_slot = bindings.bind("x", x.buffer(), Access::Read);
    let y_slot = bindings.bind("y", ring.buffer(), Access::ReadWrite);

    let max_dims = dims.iter().copied().max().unwrap_or(0);
    let local_width = work_group_width(device.max_work_group_size(), max_local_size, max_dims);
    let mut meta = MetaBuilder::new();
    let body = ProbeBody {
        n_rows,
        countdowns: countdown_slot,
        bufpositions: bufposition_slot,
        periods: period_slot,
        x: x_slot,
        y: y_slot,
        x_starts: meta.section(x.starts().iter().copied())?,
        x_shape0s: meta.section(dims.iter().copied())?,
        y_starts: meta.section(ring.starts().iter().copied())?,
        y_lengths: meta.section(ring.lengths())?,
        local_width,
    };
    let geometry = LaunchGeometry::new([local_width, n_rows], [local_width, 1]);
    let text = wgsl::render_probe("probes", &body, bindings.decls(), geometry.local);
    let source = KernelSource {
        name: "probes".to_string(),
        text,
        bindings: bindings.decls().to_vec(),
        local_size: geometry.local,
        body: KernelBody::Probe(body),
    };
    // Per call: counters always, plus one sample per row in the worst case.
    let cost = CostHints {
        flops_per_call: n_rows as u64,
        bytes_per_call: (4 * (3 * n_rows + 2 * dims.iter().sum::<usize>())) as u64,
    };
    let meta_buffer = device.alloc_i32(&meta.into_vec(), "probes.meta")?;
    let args = bindings.into_args(meta_buffer);
    let plan = KernelPlan::new(Arc::clone(device), source, args, geometry)?
        .with_tag(tag)
        .with_cost(cost);

    let sampler = ProbeSampler {
        device: Arc::clone(device),
        plan: Arc::new(plan),
        countdowns,
        bufpositions,
        ring,
        periods: periods.to_vec(),
        dims,
        n_prealloc,
    };
    debug!(
        target: "neurocl-engine",
        "[PROBES] {} probe rows, {} slots each, drain at most every {} steps",
        n_rows,
        n_prealloc,
        sampler.max_steps_between_drains()
    );
    Ok(Some(sampler))
}
