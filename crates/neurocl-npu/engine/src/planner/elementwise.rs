// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Elementwise kernel planner
//!
//! Turns a fragment plus named ragged inputs, outputs and parameters into
//! one [`KernelPlan`] that evaluates the fragment for every element of every
//! row, in either the Block or the Flattened regime.

use std::collections::BTreeSet;
use std::sync::Arc;

use neurocl_npu_runtime::kernel::{
    flattened_work_items, is_identifier, Access, ElementwiseBody, Fragment, KernelBody,
    KernelSource, LaunchGeometry, Regime, VarBinding, VarRole,
};
use neurocl_npu_runtime::{Device, DeviceRaggedArray};
use tracing::debug;

use super::broadcast::{check_constant, resolve_rows, Broadcast, ParamArg};
use super::layout::{fragment_flops, round_up, work_group_width, BindingTable, MetaBuilder};
use crate::codegen::wgsl;
use crate::error::{EngineError, Result};
use crate::plan::{CostHints, KernelPlan};

/// Default cap on work-group width
pub const DEFAULT_MAX_LOCAL_SIZE: usize = 256;

/// Builder for one elementwise kernel plan
///
/// Inputs are loaded before the fragment runs, outputs are loaded too (so a
/// conditional assignment keeps the old value) and stored afterwards.
/// Parameters and constants are read-only.
pub struct ElementwisePlanner<D: Device> {
    name: String,
    tag: Option<String>,
    inputs: Vec<(String, DeviceRaggedArray<D>)>,
    outputs: Vec<(String, DeviceRaggedArray<D>)>,
    params: Vec<(String, ParamArg<D>)>,
    fragment: Fragment,
    n_elements: usize,
    max_local_size: usize,
}

impl<D: Device> ElementwisePlanner<D> {
    pub fn new(name: impl Into<String>, fragment: Fragment) -> Self {
        Self {
            name: name.into(),
            tag: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            params: Vec::new(),
            fragment,
            n_elements: 0,
            max_local_size: DEFAULT_MAX_LOCAL_SIZE,
        }
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn input(mut self, name: impl Into<String>, array: DeviceRaggedArray<D>) -> Self {
        self.inputs.push((name.into(), array));
        self
    }

    pub fn output(mut self, name: impl Into<String>, array: DeviceRaggedArray<D>) -> Self {
        self.outputs.push((name.into(), array));
        self
    }

    pub fn param(mut self, name: impl Into<String>, param: ParamArg<D>) -> Self {
        self.params.push((name.into(), param));
        self
    }

    pub fn constant(self, name: impl Into<String>, value: f32) -> Self {
        self.param(name, ParamArg::Constant(value))
    }

    /// 0 selects the Block regime, n >= 1 the Flattened regime
    pub fn n_elements(mut self, n_elements: usize) -> Self {
        self.n_elements = n_elements;
        self
    }

    pub fn max_local_size(mut self, max_local_size: usize) -> Self {
        self.max_local_size = max_local_size;
        self
    }

    /// Validate, generate source, compile and bind
    pub fn build(self, device: &Arc<D>) -> Result<KernelPlan<D>> {
        let base = self
            .inputs
            .first()
            .or_else(|| self.outputs.first())
            .map(|(_, array)| array)
            .ok_or_else(|| {
                EngineError::Configuration(format!(
                    "kernel '{}' needs at least one input or output",
                    self.name
                ))
            })?;
        let n_rows = base.len();
        let lengths = base.shape0s().to_vec();

        self.check_names()?;
        for (name, array) in self.inputs.iter().chain(&self.outputs) {
            check_vector_batch(name, array, &lengths)?;
        }

        let mut bindings = BindingTable::<D>::new();
        let mut meta = MetaBuilder::new();
        let lengths_offset = meta.section(lengths.iter().copied())?;
        let mut vars = Vec::new();
        let mut constants = Vec::new();
        let mut vector_param_elements = 0usize;

        let roles = self
            .inputs
            .iter()
            .map(|(n, a)| (n, a, VarRole::Input))
            .chain(self.outputs.iter().map(|(n, a)| (n, a, VarRole::Output)));
        for (name, array, role) in roles {
            let access = if role == VarRole::Output {
                Access::ReadWrite
            } else {
                Access::Read
            };
            vars.push(VarBinding {
                name: name.clone(),
                role,
                binding: bindings.bind(name, array.buffer(), access),
                starts: meta.section(array.starts().iter().copied())?,
                shape0s: None,
            });
        }
        for (name, param) in &self.params {
            match param {
                ParamArg::Constant(value) => {
                    check_constant(name, *value)?;
                    constants.push((name.clone(), *value));
                }
                ParamArg::Ragged(array) => {
                    let kinds = resolve_rows(name, &lengths, array)?;
                    vector_param_elements += kinds
                        .iter()
                        .zip(&lengths)
                        .filter(|(k, _)| **k == Broadcast::Vector)
                        .map(|(_, len)| len)
                        .sum::<usize>();
                    vars.push(VarBinding {
                        name: name.clone(),
                        role: VarRole::Param,
                        binding: bindings.bind(name, array.buffer(), Access::Read),
                        starts: meta.section(array.starts().iter().copied())?,
                        shape0s: Some(meta.section(array.shape0s().iter().copied())?),
                    });
                }
            }
        }

        let total: usize = lengths.iter().sum();
        let max_len = lengths.iter().copied().max().unwrap_or(0);
        let regime = Regime::from_n_elements(self.n_elements);
        let device_max = device.max_work_group_size();
        let (n_items, geometry) = match regime {
            Regime::Block => {
                let local0 = work_group_width(device_max, self.max_local_size, max_len);
                (
                    0,
                    LaunchGeometry::new([round_up(max_len, local0), n_rows], [local0, 1]),
                )
            }
            Regime::Flattened { n_elements } => {
                let n_items = flattened_work_items(total, n_elements);
                let fits_i32 = |value: usize| i32::try_from(value).is_ok();
                if !fits_i32(n_elements) || !n_items.checked_mul(n_elements).is_some_and(fits_i32) {
                    return Err(EngineError::Configuration(format!(
                        "kernel '{}': {} elements per work-item over {} work-items does not fit a 32-bit index",
                        self.name, n_elements, n_items
                    )));
                }
                let local0 = work_group_width(device_max, self.max_local_size, n_items);
                (
                    n_items,
                    LaunchGeometry::new([round_up(n_items, local0), 1], [local0, 1]),
                )
            }
        };

        let body = ElementwiseBody {
            n_rows,
            regime,
            n_items,
            lengths: lengths_offset,
            vars,
            constants,
            fragment: self.fragment,
        };
        let local_size = geometry.local;
        let text = wgsl::render_elementwise(&self.name, &body, bindings.decls(), local_size);
        let source = KernelSource {
            name: self.name.clone(),
            text,
            bindings: bindings.decls().to_vec(),
            local_size,
            body: KernelBody::Elementwise(body),
        };

        let n_vectors = self.inputs.len() + self.outputs.len();
        let cost = CostHints {
            flops_per_call: total as u64 * element_flops(&source),
            bytes_per_call: 4 * (total * n_vectors + vector_param_elements) as u64,
        };
        let meta_buffer = device.alloc_i32(&meta.into_vec(), &format!("{}.meta", self.name))?;
        let args = bindings.into_args(meta_buffer);

        debug!(
            target: "neurocl-engine",
            "[PLANNER] '{}': {:?}, {} rows, {} elements, {} work-items",
            self.name,
            regime,
            n_rows,
            total,
            geometry.n_work_items()
        );
        Ok(KernelPlan::new(Arc::clone(device), source, args, geometry)?
            .with_tag(self.tag)
            .with_cost(cost))
    }

    fn check_names(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        let names = self
            .inputs
            .iter()
            .map(|(n, _)| n)
            .chain(self.outputs.iter().map(|(n, _)| n))
            .chain(self.params.iter().map(|(n, _)| n))
            .chain(self.fragment.locals.iter());
        for name in names {
            if !is_identifier(name) {
                return Err(EngineError::Configuration(format!(
                    "'{}' is not a valid kernel identifier",
                    name
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(EngineError::NameClash(name.clone()));
            }
        }
        let assigned = self.fragment.assigned_names();
        if let Some((name, _)) = self
            .params
            .iter()
            .find(|(n, _)| assigned.contains(n.as_str()))
        {
            return Err(EngineError::ReadOnlyAssignment(name.clone()));
        }
        Ok(())
    }
}

fn element_flops(source: &KernelSource) -> u64 {
    match &source.body {
        KernelBody::Elementwise(body) => fragment_flops(&body.fragment),
        _ => 0,
    }
}

/// Inputs and outputs must be vectors with the base row lengths
pub(crate) fn check_vector_batch<D: Device>(
    name: &str,
    array: &DeviceRaggedArray<D>,
    lengths: &[usize],
) -> Result<()> {
    if array.len() != lengths.len() {
        return Err(EngineError::RowCountMismatch {
            name: name.to_string(),
            expected: lengths.len(),
            actual: array.len(),
        });
    }
    for (row, &expected) in lengths.iter().enumerate() {
        let shape1 = array.shape1s()[row];
        if shape1 != 1 {
            return Err(EngineError::NonVectorSignal {
                name: name.to_string(),
                row,
                shape1,
            });
        }
        let actual = array.shape0s()[row];
        if actual != expected {
            return Err(EngineError::LengthMismatch {
                name: name.to_string(),
                row,
                expected,
                actual,
            });
        }
    }
    Ok(())
}
