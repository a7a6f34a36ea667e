// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Execution DAG
//!
//! Plans are registered with the ids of the plans they depend on and played
//! back in a topological order. Ties are broken by insertion order, so a
//! graph whose edges all point backwards replays in registration order.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::error::{EngineError, Result};
use crate::plan::Plan;
use crate::profiling::Profiler;

/// Handle of a plan registered with a [`DagBuilder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlanId(usize);

impl PlanId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "plan#{}", self.0)
    }
}

struct Node {
    plan: Arc<dyn Plan>,
    deps: BTreeSet<usize>,
}

/// Collects plans and their dependencies
#[derive(Default)]
pub struct DagBuilder {
    nodes: Vec<Node>,
}

impl DagBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Register `plan`, which must run after every plan in `deps`
    pub fn add(&mut self, plan: Arc<dyn Plan>, deps: &[PlanId]) -> Result<PlanId> {
        for dep in deps {
            self.check(*dep)?;
        }
        self.nodes.push(Node {
            plan,
            deps: deps.iter().map(|d| d.0).collect(),
        });
        Ok(PlanId(self.nodes.len() - 1))
    }

    /// Make `node` wait for `dep`
    pub fn add_dependency(&mut self, node: PlanId, dep: PlanId) -> Result<()> {
        self.check(node)?;
        self.check(dep)?;
        self.nodes[node.0].deps.insert(dep.0);
        Ok(())
    }

    fn check(&self, id: PlanId) -> Result<()> {
        if id.0 < self.nodes.len() {
            Ok(())
        } else {
            Err(EngineError::UnknownPlan(id.0))
        }
    }

    /// Topologically order the plans (Kahn's algorithm)
    pub fn build(self) -> Result<ExecutionDag> {
        let n = self.nodes.len();
        let mut pending: Vec<usize> = self.nodes.iter().map(|node| node.deps.len()).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, node) in self.nodes.iter().enumerate() {
            for &dep in &node.deps {
                dependents[dep].push(i);
            }
        }

        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| pending[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(i) = ready.pop_first() {
            order.push(i);
            for &next in &dependents[i] {
                pending[next] -= 1;
                if pending[next] == 0 {
                    ready.insert(next);
                }
            }
        }

        if order.len() < n {
            let stuck = (0..n).find(|&i| pending[i] > 0).unwrap_or(0);
            return Err(EngineError::CircularDependency(
                self.nodes[stuck].plan.name().to_string(),
            ));
        }

        let position: Vec<usize> = {
            let mut position = vec![0; n];
            for (pos, &i) in order.iter().enumerate() {
                position[i] = pos;
            }
            position
        };
        let deps = order
            .iter()
            .map(|&i| self.nodes[i].deps.iter().map(|&d| position[d]).collect())
            .collect();
        let mut nodes: Vec<Option<Node>> = self.nodes.into_iter().map(Some).collect();
        let plans: Vec<Arc<dyn Plan>> = order
            .iter()
            .filter_map(|&i| nodes[i].take().map(|node| node.plan))
            .collect();

        debug!(
            target: "neurocl-engine",
            "[DAG] Ordered {} plans",
            plans.len()
        );
        Ok(ExecutionDag { plans, deps })
    }
}

/// Plans in execution order
pub struct ExecutionDag {
    plans: Vec<Arc<dyn Plan>>,
    /// Positions (in `plans`) each plan depends on
    deps: Vec<Vec<usize>>,
}

impl ExecutionDag {
    pub fn order(&self) -> &[Arc<dyn Plan>] {
        &self.plans
    }

    /// Positions of the plans the plan at `position` depends on
    pub fn dependencies(&self, position: usize) -> &[usize] {
        self.deps.get(position).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    /// Play the whole order `n` times
    ///
    /// With a running profiler every call is followed by a sync so its
    /// execution time can be attributed to the plan.
    pub fn call_n_times(&self, n: usize, mut profiler: Option<&mut Profiler>) -> Result<()> {
        let profiling = profiler.as_ref().is_some_and(|p| p.is_running());
        for _ in 0..n {
            for (position, plan) in self.plans.iter().enumerate() {
                if profiling {
                    let started = Instant::now();
                    plan.call()?;
                    plan.sync()?;
                    if let Some(profiler) = profiler.as_deref_mut() {
                        profiler.record(position, started.elapsed());
                    }
                } else {
                    plan.call()?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::HostPlan;
    use parking_lot::Mutex;

    fn logging_plan(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> Arc<dyn Plan> {
        let log = Arc::clone(log);
        Arc::new(HostPlan::new(name, move || {
            log.lock().push(name);
            Ok(())
        }))
    }

    #[test]
    fn test_insertion_order_without_edges() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut builder = DagBuilder::new();
        builder.add(logging_plan("a", &log), &[]).unwrap();
        builder.add(logging_plan("b", &log), &[]).unwrap();
        builder.build().unwrap().call_n_times(2, None).unwrap();
        assert_eq!(*log.lock(), vec!["a", "b", "a", "b"]);
    }

    #[test]
    fn test_dependency_moves_plan_later() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut builder = DagBuilder::new();
        let a = builder.add(logging_plan("a", &log), &[]).unwrap();
        let b = builder.add(logging_plan("b", &log), &[]).unwrap();
        builder.add_dependency(a, b).unwrap();
        let dag = builder.build().unwrap();
        dag.call_n_times(1, None).unwrap();
        assert_eq!(*log.lock(), vec!["b", "a"]);
        assert_eq!(dag.dependencies(1), &[0]);
    }

    #[test]
    fn test_cycle_detected() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut builder = DagBuilder::new();
        let a = builder.add(logging_plan("a", &log), &[]).unwrap();
        let b = builder.add(logging_plan("b", &log), &[a]).unwrap();
        builder.add_dependency(a, b).unwrap();
        assert!(matches!(
            builder.build(),
            Err(EngineError::CircularDependency(name)) if name == "a"
        ));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut builder = DagBuilder::new();
        assert!(matches!(
            builder.add(logging_plan("a", &log), &[PlanId(3)]),
            Err(EngineError::UnknownPlan(3))
        ));
    }
}
