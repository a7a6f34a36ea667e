// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Simulation model description
//!
//! A [`Model`] lists the signals (named host arrays), the operator groups in
//! their per-step execution order, and the probes. The simulator packs all
//! signals into one device allocation and plans each group once.

use std::sync::Arc;

use ndarray::Array2;
use neurocl_npu_neural::LIFParameters;
use neurocl_npu_runtime::kernel::Fragment;

use crate::direct::DirectFunction;
use crate::error::{EngineError, Result};

/// Handle of a signal in a [`Model`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SignalId(pub(crate) usize);

impl SignalId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Handle of a probe in a [`Model`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProbeId(pub(crate) usize);

impl ProbeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Named array with its initial value (row-major)
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub name: String,
    pub shape: (usize, usize),
    pub initial: Vec<f32>,
}

impl Signal {
    pub fn size(&self) -> usize {
        self.shape.0 * self.shape.1
    }

    pub fn is_vector(&self) -> bool {
        self.shape.1 == 1
    }
}

/// Samples a vector signal every `sample_every` seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Probe {
    pub signal: SignalId,
    pub sample_every: f64,
}

/// Spiking LIF population
///
/// `voltage` and `refractory_time` are updated in place; `output` receives
/// 1.0 for every neuron that spiked during the tick and 0.0 otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct SimLif {
    pub j: SignalId,
    pub voltage: SignalId,
    pub refractory_time: SignalId,
    pub output: SignalId,
    pub params: LIFParameters,
}

/// LIF population reporting steady-state rates
#[derive(Debug, Clone, PartialEq)]
pub struct SimLifRate {
    pub j: SignalId,
    pub output: SignalId,
    pub params: LIFParameters,
}

/// `output = function(input)` every tick
#[derive(Debug, Clone)]
pub struct SimDirect {
    pub function: Arc<DirectFunction>,
    pub input: SignalId,
    pub output: SignalId,
}

/// Computation shared by every op of an elementwise group
#[derive(Debug, Clone, PartialEq)]
pub struct ElementwiseKernel {
    pub name: String,
    pub fragment: Fragment,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    /// Per-op parameter names (row values come from each op)
    pub params: Vec<String>,
    /// Compile-time constants shared by the group
    pub constants: Vec<(String, f32)>,
    /// 0 for the Block regime, else elements per work-item
    pub n_elements: usize,
}

/// One row of an elementwise group
///
/// Signals and parameter rows line up with the kernel's name lists.
/// Each parameter row holds one value or one value per element.
#[derive(Debug, Clone, PartialEq)]
pub struct SimElementwise {
    pub inputs: Vec<SignalId>,
    pub outputs: Vec<SignalId>,
    pub params: Vec<Vec<f32>>,
}

/// Ops planned together, in model order
#[derive(Debug, Clone)]
pub enum OperatorGroup {
    Lif(Vec<SimLif>),
    LifRate(Vec<SimLifRate>),
    Direct(Vec<SimDirect>),
    Elementwise {
        kernel: ElementwiseKernel,
        ops: Vec<SimElementwise>,
    },
}

impl OperatorGroup {
    /// Short kind name used as the default plan tag
    pub fn kind(&self) -> &'static str {
        match self {
            OperatorGroup::Lif(_) => "lif",
            OperatorGroup::LifRate(_) => "lif_rate",
            OperatorGroup::Direct(_) => "direct",
            OperatorGroup::Elementwise { .. } => "elementwise",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            OperatorGroup::Lif(ops) => ops.len(),
            OperatorGroup::LifRate(ops) => ops.len(),
            OperatorGroup::Direct(ops) => ops.len(),
            OperatorGroup::Elementwise { ops, .. } => ops.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn signals(&self) -> Vec<SignalId> {
        match self {
            OperatorGroup::Lif(ops) => ops
                .iter()
                .flat_map(|op| [op.j, op.voltage, op.refractory_time, op.output])
                .collect(),
            OperatorGroup::LifRate(ops) => ops.iter().flat_map(|op| [op.j, op.output]).collect(),
            OperatorGroup::Direct(ops) => ops.iter().flat_map(|op| [op.input, op.output]).collect(),
            OperatorGroup::Elementwise { ops, .. } => ops
                .iter()
                .flat_map(|op| op.inputs.iter().chain(&op.outputs).copied())
                .collect(),
        }
    }
}

/// Signals, operator groups and probes of one simulation
#[derive(Debug, Clone, Default)]
pub struct Model {
    signals: Vec<Signal>,
    groups: Vec<OperatorGroup>,
    probes: Vec<Probe>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vector signal
    pub fn add_vector(&mut self, name: impl Into<String>, initial: &[f32]) -> SignalId {
        self.signals.push(Signal {
            name: name.into(),
            shape: (initial.len(), 1),
            initial: initial.to_vec(),
        });
        SignalId(self.signals.len() - 1)
    }

    /// Add a matrix signal
    pub fn add_matrix(&mut self, name: impl Into<String>, initial: &Array2<f32>) -> SignalId {
        let (rows, cols) = initial.dim();
        self.signals.push(Signal {
            name: name.into(),
            shape: (rows, cols),
            initial: initial.iter().copied().collect(),
        });
        SignalId(self.signals.len() - 1)
    }

    /// Append a group; groups run in the order they are added
    pub fn add_group(&mut self, group: OperatorGroup) -> Result<()> {
        for id in group.signals() {
            self.check_signal(id)?;
        }
        self.groups.push(group);
        Ok(())
    }

    pub fn add_probe(&mut self, signal: SignalId, sample_every: f64) -> Result<ProbeId> {
        self.check_signal(signal)?;
        self.probes.push(Probe {
            signal,
            sample_every,
        });
        Ok(ProbeId(self.probes.len() - 1))
    }

    pub fn signal(&self, id: SignalId) -> Result<&Signal> {
        self.signals
            .get(id.0)
            .ok_or(EngineError::UnknownSignal(id.0))
    }

    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    pub fn groups(&self) -> &[OperatorGroup] {
        &self.groups
    }

    pub fn probes(&self) -> &[Probe] {
        &self.probes
    }

    fn check_signal(&self, id: SignalId) -> Result<()> {
        self.signal(id).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_signals_get_sequential_ids() {
        let mut model = Model::new();
        let a = model.add_vector("a", &[1.0, 2.0]);
        let b = model.add_matrix("b", &array![[1.0f32, 2.0], [3.0, 4.0]]);
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert!(model.signal(a).unwrap().is_vector());
        assert!(!model.signal(b).unwrap().is_vector());
        assert_eq!(model.signal(b).unwrap().initial, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_unknown_signal_rejected() {
        let mut model = Model::new();
        let a = model.add_vector("a", &[0.0]);
        let bogus = SignalId(7);
        assert!(matches!(
            model.add_group(OperatorGroup::LifRate(vec![SimLifRate {
                j: a,
                output: bogus,
                params: LIFParameters::default(),
            }])),
            Err(EngineError::UnknownSignal(7))
        ));
        assert!(model.add_probe(bogus, 0.001).is_err());
    }
}
