// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Direct (user-function) operators
//!
//! A direct function maps one input vector to one output vector per row.
//! Ops sharing the same function are planned together: one kernel with a
//! work-item per row when the function has a kernel form, otherwise a
//! host-side fallback plan (unless strict mode forbids it).

use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;
use neurocl_npu_runtime::kernel::{
    Access, DirectBody, Fragment, KernelBody, KernelSource, LaunchGeometry,
};
use neurocl_npu_runtime::{Device, DeviceRaggedArray};
use tracing::{debug, warn};

use crate::codegen::wgsl;
use crate::error::{EngineError, Result};
use crate::plan::{CostHints, HostPlan, KernelPlan, Plan};
use crate::planner::layout::{fragment_flops, round_up, work_group_width, BindingTable, MetaBuilder};
use crate::planner::{check_vector_batch, DEFAULT_MAX_LOCAL_SIZE};

/// Host implementation of a direct function
pub type HostFunction = Arc<dyn Fn(&[f32]) -> Vec<f32> + Send + Sync>;

/// Kernel-language body of a direct function
///
/// The fragment reads the input vector through `Expr::index(arg_name, i)`
/// and writes the output with `Stmt::store("y", i, value)`.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelForm {
    pub arg_name: String,
    pub fragment: Fragment,
}

impl KernelForm {
    pub fn new(arg_name: impl Into<String>, fragment: Fragment) -> Self {
        Self {
            arg_name: arg_name.into(),
            fragment,
        }
    }
}

/// User function applied by direct operators
pub struct DirectFunction {
    name: String,
    host: HostFunction,
    kernel_form: Option<KernelForm>,
}

impl DirectFunction {
    pub fn new<F>(name: impl Into<String>, host: F) -> Self
    where
        F: Fn(&[f32]) -> Vec<f32> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            host: Arc::new(host),
            kernel_form: None,
        }
    }

    /// Attach an equivalent kernel body
    pub fn with_kernel_form(mut self, form: KernelForm) -> Self {
        self.kernel_form = Some(form);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kernel_form(&self) -> Option<&KernelForm> {
        self.kernel_form.as_ref()
    }

    /// Evaluate on the host
    pub fn call(&self, x: &[f32]) -> Vec<f32> {
        (self.host)(x)
    }
}

impl fmt::Debug for DirectFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectFunction")
            .field("name", &self.name)
            .field("kernel_form", &self.kernel_form.is_some())
            .finish()
    }
}

/// Lowers a direct function to kernel form
pub trait FunctionTranslator: Send + Sync {
    /// Fails with [`EngineError::Translation`] when the function cannot run
    /// on the device
    fn translate(&self, function: &DirectFunction, in_dim: usize, out_dim: usize)
        -> Result<KernelForm>;
}

/// Uses the kernel form attached to the function, if any
#[derive(Debug, Default, Clone, Copy)]
pub struct KernelFormTranslator;

impl FunctionTranslator for KernelFormTranslator {
    fn translate(
        &self,
        function: &DirectFunction,
        _in_dim: usize,
        _out_dim: usize,
    ) -> Result<KernelForm> {
        function
            .kernel_form()
            .cloned()
            .ok_or_else(|| EngineError::Translation {
                name: function.name().to_string(),
                reason: "no kernel form attached".to_string(),
            })
    }
}

/// Ops sharing one function, as (input row, output row) pairs
#[derive(Debug, Clone)]
pub struct DirectGroup<K> {
    pub function: Arc<DirectFunction>,
    pub rows: Vec<(K, K)>,
}

/// Group ops by function identity, keeping first-seen order
pub fn group_by_function<K, I>(ops: I) -> Vec<DirectGroup<K>>
where
    I: IntoIterator<Item = (Arc<DirectFunction>, K, K)>,
{
    let mut index: AHashMap<usize, usize> = AHashMap::new();
    let mut groups: Vec<DirectGroup<K>> = Vec::new();
    for (function, input, output) in ops {
        let key = Arc::as_ptr(&function) as *const () as usize;
        let slot = *index.entry(key).or_insert_with(|| {
            groups.push(DirectGroup {
                function: Arc::clone(&function),
                rows: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].rows.push((input, output));
    }
    groups
}

/// Options for planning one direct group
#[derive(Debug, Clone)]
pub struct DirectOptions {
    /// Fail instead of falling back to the host
    pub strict: bool,
    pub max_local_size: usize,
}

impl Default for DirectOptions {
    fn default() -> Self {
        Self {
            strict: false,
            max_local_size: DEFAULT_MAX_LOCAL_SIZE,
        }
    }
}

/// Check that every row of `x` and `y` is a vector of the group's dimensions
fn check_signals<D: Device>(
    name: &str,
    x: &DeviceRaggedArray<D>,
    y: &DeviceRaggedArray<D>,
) -> Result<(usize, usize)> {
    if x.len() != y.len() {
        return Err(EngineError::RowCountMismatch {
            name: format!("{}.output", name),
            expected: x.len(),
            actual: y.len(),
        });
    }
    let in_dim = x.shape0s().first().copied().unwrap_or(0);
    let out_dim = y.shape0s().first().copied().unwrap_or(0);
    check_vector_batch(&format!("{}.input", name), x, &vec![in_dim; x.len()])?;
    check_vector_batch(&format!("{}.output", name), y, &vec![out_dim; y.len()])?;
    Ok((in_dim, out_dim))
}

/// Plan one kernel evaluating `form` for every row of `x` into `y`
pub fn plan_direct<D: Device>(
    device: &Arc<D>,
    name: &str,
    form: KernelForm,
    x: &DeviceRaggedArray<D>,
    y: &DeviceRaggedArray<D>,
    tag: Option<String>,
    max_local_size: usize,
) -> Result<KernelPlan<D>> {
    let n_rows = x.len();
    if y.len() != n_rows {
        return Err(EngineError::RowCountMismatch {
            name: format!("{}.output", name),
            expected: n_rows,
            actual: y.len(),
        });
    }

    let mut bindings = BindingTable::<D>::new();
    let x_slot = bindings.bind("x", x.buffer(), Access::Read);
    let y_slot = bindings.bind("y", y.buffer(), Access::ReadWrite);
    let mut meta = MetaBuilder::new();
    let body = DirectBody {
        n_rows,
        x: x_slot,
        y: y_slot,
        x_starts: meta.section(x.starts().iter().copied())?,
        x_lengths: meta.section(x.shape0s().iter().copied())?,
        y_starts: meta.section(y.starts().iter().copied())?,
        y_lengths: meta.section(y.shape0s().iter().copied())?,
        arg_name: form.arg_name,
        fragment: form.fragment,
    };

    let local0 = work_group_width(device.max_work_group_size(), max_local_size, n_rows);
    let geometry = LaunchGeometry::new([round_up(n_rows, local0), 1], [local0, 1]);
    let kernel_name = format!("direct_{}", name);
    let text = wgsl::render_direct(&kernel_name, &body, bindings.decls(), geometry.local);
    let cost = CostHints {
        flops_per_call: n_rows as u64 * fragment_flops(&body.fragment),
        bytes_per_call: 4 * (x.lengths().iter().sum::<usize>() + y.lengths().iter().sum::<usize>())
            as u64,
    };
    let source = KernelSource {
        name: kernel_name,
        text,
        bindings: bindings.decls().to_vec(),
        local_size: geometry.local,
        body: KernelBody::Direct(body),
    };
    let meta_buffer = device.alloc_i32(&meta.into_vec(), &format!("{}.meta", source.name))?;
    let args = bindings.into_args(meta_buffer);

    debug!(
        target: "neurocl-engine",
        "[DIRECT] '{}': {} rows on the device",
        name,
        n_rows
    );
    Ok(KernelPlan::new(Arc::clone(device), source, args, geometry)?
        .with_tag(tag)
        .with_cost(cost))
}

/// Host-side plan applying the function row by row
pub fn plan_direct_host<D: Device>(
    function: Arc<DirectFunction>,
    x: DeviceRaggedArray<D>,
    y: DeviceRaggedArray<D>,
) -> HostPlan {
    let name = function.name().to_string();
    HostPlan::new(name.clone(), move || {
        x.device().finish()?;
        for row in 0..x.len() {
            let input = x.read_row(row)?;
            let output = function.call(&input);
            if output.len() != y.row_len(row) {
                return Err(EngineError::LengthMismatch {
                    name: format!("{}.output", function.name()),
                    row,
                    expected: y.row_len(row),
                    actual: output.len(),
                });
            }
            y.write_row(row, &output)?;
        }
        Ok(())
    })
    .with_tag(Some(name))
}

/// Plan one group of ops sharing a function
///
/// A translation failure is returned in strict mode and otherwise logged
/// before falling back to [`plan_direct_host`].
pub fn plan_direct_group<D: Device>(
    device: &Arc<D>,
    function: &Arc<DirectFunction>,
    translator: &dyn FunctionTranslator,
    x: DeviceRaggedArray<D>,
    y: DeviceRaggedArray<D>,
    options: &DirectOptions,
) -> Result<Box<dyn Plan>> {
    let name = function.name().to_string();
    let (in_dim, out_dim) = check_signals(&name, &x, &y)?;

    match translator.translate(function, in_dim, out_dim) {
        Ok(form) => {
            let plan = plan_direct(
                device,
                &name,
                form,
                &x,
                &y,
                Some(name.clone()),
                options.max_local_size,
            )?;
            Ok(Box::new(plan))
        }
        Err(err @ EngineError::Translation { .. }) => {
            if options.strict {
                return Err(err);
            }
            warn!(
                target: "neurocl-engine",
                "[DIRECT] Function '{}' could not be converted to a kernel ({}); running on the host",
                name,
                err
            );
            Ok(Box::new(plan_direct_host(Arc::clone(function), x, y)))
        }
        Err(err) => Err(err),
    }
}
