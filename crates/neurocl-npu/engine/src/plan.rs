// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Plans: immutable, pre-compiled, pre-bound units of work

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use neurocl_npu_runtime::kernel::{KernelSource, LaunchGeometry};
use neurocl_npu_runtime::Device;
use tracing::debug;

use crate::error::Result;

/// Static cost of one call, for throughput reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CostHints {
    pub flops_per_call: u64,
    pub bytes_per_call: u64,
}

/// One node of work in the execution DAG
pub trait Plan: Send + Sync {
    fn name(&self) -> &str;

    fn tag(&self) -> Option<&str> {
        None
    }

    /// Enqueue the work (may return before the device has finished)
    fn call(&self) -> Result<()>;

    /// Block until work enqueued by `call` has completed
    fn sync(&self) -> Result<()>;

    fn cost(&self) -> CostHints {
        CostHints::default()
    }
}

/// Compiled kernel bound to its arguments
///
/// The plan holds a clone of every buffer it binds (metadata buffer
/// included), so the allocations live at least as long as the plan.
pub struct KernelPlan<D: Device> {
    device: Arc<D>,
    source: KernelSource,
    kernel: D::Kernel,
    args: Vec<D::Buffer>,
    geometry: LaunchGeometry,
    tag: Option<String>,
    cost: CostHints,
}

impl<D: Device> KernelPlan<D> {
    /// Compile `source` and bind `args`
    pub fn new(
        device: Arc<D>,
        source: KernelSource,
        args: Vec<D::Buffer>,
        geometry: LaunchGeometry,
    ) -> Result<Self> {
        let program = device.compile(&source)?;
        let kernel = device.bind(&program, &args)?;
        debug!(
            target: "neurocl-engine",
            "[PLAN] '{}' ready: global {:?}, local {:?}, {} buffers",
            source.name,
            geometry.global,
            geometry.local,
            args.len()
        );
        Ok(Self {
            device,
            source,
            kernel,
            args,
            geometry,
            tag: None,
            cost: CostHints::default(),
        })
    }

    pub fn with_tag(mut self, tag: Option<String>) -> Self {
        self.tag = tag;
        self
    }

    pub fn with_cost(mut self, cost: CostHints) -> Self {
        self.cost = cost;
        self
    }

    pub fn source(&self) -> &KernelSource {
        &self.source
    }

    pub fn geometry(&self) -> &LaunchGeometry {
        &self.geometry
    }

    /// Buffers owned by the plan, in binding order
    pub fn args(&self) -> &[D::Buffer] {
        &self.args
    }
}

impl<D: Device> Plan for KernelPlan<D> {
    fn name(&self) -> &str {
        &self.source.name
    }

    fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    fn call(&self) -> Result<()> {
        self.device.launch(&self.kernel, &self.geometry)?;
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        self.device.finish()?;
        Ok(())
    }

    fn cost(&self) -> CostHints {
        self.cost
    }
}

type HostFn = Box<dyn Fn() -> Result<()> + Send + Sync>;

/// Host-side callable (non-accelerated fallback)
pub struct HostPlan {
    name: String,
    tag: Option<String>,
    func: HostFn,
}

impl HostPlan {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            tag: None,
            func: Box::new(func),
        }
    }

    pub fn with_tag(mut self, tag: Option<String>) -> Self {
        self.tag = tag;
        self
    }
}

impl Plan for HostPlan {
    fn name(&self) -> &str {
        &self.name
    }

    fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    fn call(&self) -> Result<()> {
        (self.func)()
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

/// Step-boundary marker; counts how many times it was reached
#[derive(Debug, Default)]
pub struct Marker {
    count: AtomicU64,
}

impl Marker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl Plan for Marker {
    fn name(&self) -> &str {
        "step_marker"
    }

    fn call(&self) -> Result<()> {
        self.count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_counts_calls() {
        let marker = Marker::new();
        marker.call().unwrap();
        marker.call().unwrap();
        assert_eq!(marker.count(), 2);
    }

    #[test]
    fn test_host_plan_runs_closure() {
        let hits = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&hits);
        let plan = HostPlan::new("count", move || {
            counter.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
        .with_tag(Some("test".to_string()));
        plan.call().unwrap();
        assert_eq!(hits.load(Ordering::Relaxed), 1);
        assert_eq!(plan.tag(), Some("test"));
    }
}
