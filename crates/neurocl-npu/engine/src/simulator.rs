// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Simulator driver
//!
//! Setup packs every model signal into one device ragged array (row `i` is
//! signal `i`), plans each operator group in model order, then the probes,
//! then a step marker. Every plan depends on all plans of earlier groups.
//!
//! [`Simulator::run_steps`] replays the DAG in batches no longer than the
//! probe rings can absorb and drains the rings after each batch, so the
//! result does not depend on how the steps are split across calls.

use std::sync::Arc;

use ndarray::Array2;
use neurocl_config::{validate_config, SimulatorConfig};
use neurocl_npu_neural::{LIFParameters, ModelParameters};
use neurocl_npu_runtime::{Device, DeviceRaggedArray, RaggedArray};
use tracing::{debug, info};

use crate::dag::{DagBuilder, ExecutionDag, PlanId};
use crate::direct::{
    group_by_function, plan_direct_group, DirectOptions, FunctionTranslator, KernelFormTranslator,
};
use crate::error::{EngineError, Result};
use crate::lif::{plan_lif, plan_lif_rate, LifArgs, LifOptions};
use crate::model::{
    ElementwiseKernel, Model, OperatorGroup, ProbeId, SignalId, SimElementwise, SimLif, SimLifRate,
};
use crate::plan::{KernelPlan, Marker, Plan};
use crate::planner::{ElementwisePlanner, ParamArg};
use crate::probes::{plan_probes, ProbeSampler};
use crate::profiling::{ProfileReport, Profiler, ReportSort};

/// Runs a [`Model`] on a device
pub struct Simulator<D: Device> {
    device: Arc<D>,
    config: SimulatorConfig,
    signal_shapes: Vec<(usize, usize)>,
    data: DeviceRaggedArray<D>,
    dag: ExecutionDag,
    marker: Arc<Marker>,
    probes: Option<ProbeSampler<D>>,
    probe_dims: Vec<usize>,
    probe_outputs: Vec<Vec<f32>>,
    profiler: Profiler,
    report_sort: Option<ReportSort>,
    n_steps: u64,
}

impl<D: Device> Simulator<D> {
    /// Plan `model` using attached kernel forms for direct functions
    pub fn new(device: Arc<D>, model: &Model, config: &SimulatorConfig) -> Result<Self> {
        Self::with_translator(device, model, config, &KernelFormTranslator)
    }

    /// Plan `model` with a custom function translator
    pub fn with_translator(
        device: Arc<D>,
        model: &Model,
        config: &SimulatorConfig,
        translator: &dyn FunctionTranslator,
    ) -> Result<Self> {
        validate_config(config).map_err(|e| EngineError::Configuration(e.to_string()))?;
        let report_sort = config
            .profiling
            .sort_column
            .as_deref()
            .map(str::parse::<ReportSort>)
            .transpose()?;

        let mut host = RaggedArray::new();
        let mut signal_shapes = Vec::with_capacity(model.signals().len());
        for signal in model.signals() {
            if signal.initial.len() != signal.size() {
                return Err(EngineError::Configuration(format!(
                    "signal '{}' has {} initial values for shape {:?}",
                    signal.name,
                    signal.initial.len(),
                    signal.shape
                )));
            }
            if signal.is_vector() {
                host.push_vector(&signal.initial);
            } else {
                let matrix = Array2::from_shape_vec(signal.shape, signal.initial.clone())
                    .map_err(|e| EngineError::Configuration(format!("signal '{}': {}", signal.name, e)))?;
                host.push_matrix(&matrix);
            }
            signal_shapes.push(signal.shape);
        }
        let data = DeviceRaggedArray::from_host(Arc::clone(&device), &host, "signals")?;

        let mut setup = Setup {
            device: &device,
            config,
            data: &data,
            builder: DagBuilder::new(),
            previous: Vec::new(),
        };
        for group in model.groups() {
            if group.is_empty() {
                continue;
            }
            let plans = setup.plan_group(group, translator)?;
            debug!(
                target: "neurocl-engine",
                "[SIM] Group '{}' ({} ops) -> {} plans",
                group.kind(),
                group.len(),
                plans.len()
            );
            setup.add_stage(plans)?;
        }

        let probes = setup.plan_probes(model)?;
        if let Some(sampler) = &probes {
            setup.add_stage(vec![sampler.plan() as Arc<dyn Plan>])?;
        }
        let marker = Arc::new(Marker::new());
        setup.add_stage(vec![Arc::clone(&marker) as Arc<dyn Plan>])?;
        let dag = setup.builder.build()?;

        let probe_dims: Vec<usize> = model
            .probes()
            .iter()
            .map(|p| signal_shapes[p.signal.index()].0)
            .collect();
        let mut profiler = Profiler::new();
        if config.profiling.level > 0 {
            profiler.start();
        }

        info!(
            target: "neurocl-engine",
            "[SIM] {} signals, {} operator groups, {} probes -> {} plans on '{}'",
            model.signals().len(),
            model.groups().len(),
            model.probes().len(),
            dag.len(),
            device.name()
        );

        Ok(Self {
            device,
            config: config.clone(),
            signal_shapes,
            data,
            dag,
            marker,
            probes,
            probe_outputs: vec![Vec::new(); probe_dims.len()],
            probe_dims,
            profiler,
            report_sort,
            n_steps: 0,
        })
    }

    /// Advance one tick
    pub fn step(&mut self) -> Result<()> {
        self.run_steps(1)
    }

    /// Advance `n` ticks, draining probe rings as needed
    ///
    /// # Errors
    ///
    /// [`EngineError::ProbeBufferNotDrained`] if the rings were not empty on
    /// entry; device errors abort the run.
    pub fn run_steps(&mut self, n: usize) -> Result<()> {
        if let Some(probes) = &self.probes {
            probes.ensure_drained()?;
        }

        let mut remaining = n;
        while remaining > 0 {
            let batch = match &self.probes {
                Some(probes) => remaining.min(probes.max_steps_between_drains()),
                None => remaining,
            };
            let profiler = if self.profiler.is_running() {
                Some(&mut self.profiler)
            } else {
                None
            };
            self.dag.call_n_times(batch, profiler)?;
            self.n_steps += batch as u64;
            if self.probes.is_some() {
                self.drain_probe_buffers()?;
            }
            remaining -= batch;
        }
        self.device.finish()?;

        if self.config.profiling.level > 1 {
            if let Some(report) = self.profiling_report() {
                info!(target: "neurocl-engine", "[SIM] Profile after {} steps\n{}", self.n_steps, report);
            }
        }
        Ok(())
    }

    /// Copy buffered probe samples to the host logs and empty the rings
    pub fn drain_probe_buffers(&mut self) -> Result<()> {
        let Some(probes) = &self.probes else {
            return Ok(());
        };
        for (log, samples) in self.probe_outputs.iter_mut().zip(probes.drain()?) {
            log.extend(samples);
        }
        Ok(())
    }

    /// Samples of `probe` so far, one row per sample
    pub fn probe_data(&self, probe: ProbeId) -> Result<Array2<f32>> {
        let index = probe.index();
        let values = self
            .probe_outputs
            .get(index)
            .ok_or(EngineError::UnknownProbe(index))?;
        let dims = self.probe_dims[index];
        let n_samples = if dims == 0 { 0 } else { values.len() / dims };
        Array2::from_shape_vec((n_samples, dims), values.clone())
            .map_err(|e| EngineError::Configuration(format!("probe {}: {}", index, e)))
    }

    /// Current value of a signal (waits for the device)
    pub fn signal(&self, id: SignalId) -> Result<Array2<f32>> {
        let shape = self.signal_shape(id)?;
        self.device.finish()?;
        let values = self.data.read_row(id.index())?;
        Array2::from_shape_vec(shape, values)
            .map_err(|e| EngineError::Configuration(format!("signal {}: {}", id.index(), e)))
    }

    /// Overwrite a signal between runs
    pub fn set_signal(&mut self, id: SignalId, values: &[f32]) -> Result<()> {
        self.signal_shape(id)?;
        self.device.finish()?;
        self.data.write_row(id.index(), values)?;
        Ok(())
    }

    fn signal_shape(&self, id: SignalId) -> Result<(usize, usize)> {
        self.signal_shapes
            .get(id.index())
            .copied()
            .ok_or(EngineError::UnknownSignal(id.index()))
    }

    /// Ticks simulated so far
    pub fn n_steps(&self) -> u64 {
        self.n_steps
    }

    /// Simulated time in seconds
    pub fn time(&self) -> f64 {
        self.n_steps as f64 * self.config.simulation.dt
    }

    pub fn dt(&self) -> f64 {
        self.config.simulation.dt
    }

    /// Step boundaries the DAG has passed
    pub fn marker_count(&self) -> u64 {
        self.marker.count()
    }

    pub fn dag(&self) -> &ExecutionDag {
        &self.dag
    }

    pub fn probe_sampler(&self) -> Option<&ProbeSampler<D>> {
        self.probes.as_ref()
    }

    /// Per-plan profile, if profiling is enabled
    pub fn profiling_report(&self) -> Option<ProfileReport> {
        (self.config.profiling.level > 0).then(|| self.profiler.report(&self.dag, self.report_sort))
    }

    /// Mutable access to the profiling context (start/stop/reset)
    pub fn profiler_mut(&mut self) -> &mut Profiler {
        &mut self.profiler
    }
}

/// Planning state while the DAG is assembled
struct Setup<'a, D: Device> {
    device: &'a Arc<D>,
    config: &'a SimulatorConfig,
    data: &'a DeviceRaggedArray<D>,
    builder: DagBuilder,
    previous: Vec<PlanId>,
}

impl<D: Device> Setup<'_, D> {
    /// Add plans that depend on everything added before them
    fn add_stage(&mut self, plans: Vec<Arc<dyn Plan>>) -> Result<()> {
        let mut ids = Vec::with_capacity(plans.len());
        for plan in plans {
            ids.push(self.builder.add(plan, &self.previous)?);
        }
        self.previous.extend(ids);
        Ok(())
    }

    fn rows(&self, ids: impl IntoIterator<Item = SignalId>) -> Result<DeviceRaggedArray<D>> {
        let rows: Vec<usize> = ids.into_iter().map(|id| id.index()).collect();
        Ok(self.data.select(&rows)?)
    }

    fn plan_group(
        &self,
        group: &OperatorGroup,
        translator: &dyn FunctionTranslator,
    ) -> Result<Vec<Arc<dyn Plan>>> {
        let mut plans: Vec<Arc<dyn Plan>> = Vec::new();
        match group {
            OperatorGroup::Lif(ops) => plans.push(Arc::new(self.plan_lif(ops)?)),
            OperatorGroup::LifRate(ops) => plans.push(Arc::new(self.plan_lif_rate(ops)?)),
            OperatorGroup::Direct(ops) => {
                let options = DirectOptions {
                    strict: self.config.simulation.strict_kernels,
                    max_local_size: self.config.planning.max_local_size,
                };
                let groups = group_by_function(
                    ops.iter()
                        .map(|op| (Arc::clone(&op.function), op.input, op.output)),
                );
                for g in groups {
                    let x = self.rows(g.rows.iter().map(|r| r.0))?;
                    let y = self.rows(g.rows.iter().map(|r| r.1))?;
                    let plan =
                        plan_direct_group(self.device, &g.function, translator, x, y, &options)?;
                    plans.push(Arc::from(plan));
                }
            }
            OperatorGroup::Elementwise { kernel, ops } => {
                plans.push(Arc::new(self.plan_elementwise(kernel, ops)?))
            }
        }
        Ok(plans)
    }

    /// Constant when every op agrees, else one scalar row per op
    fn lif_param(&self, name: &str, values: Vec<f32>) -> Result<ParamArg<D>> {
        match values.first() {
            Some(&first) if values.iter().all(|&v| v == first) => Ok(ParamArg::Constant(first)),
            _ => {
                let host = RaggedArray::from_vectors(values.iter().map(|v| [*v]));
                Ok(ParamArg::Ragged(DeviceRaggedArray::from_host(
                    Arc::clone(self.device),
                    &host,
                    name,
                )?))
            }
        }
    }

    fn lif_params<'p>(
        &self,
        params: impl Iterator<Item = &'p LIFParameters> + Clone,
    ) -> Result<(ParamArg<D>, ParamArg<D>)> {
        for p in params.clone() {
            p.validate()
                .map_err(|reason| EngineError::Configuration(reason.to_string()))?;
        }
        let tau_rc = self.lif_param("lif.tau_rc", params.clone().map(|p| p.tau_rc).collect())?;
        let tau_ref = self.lif_param("lif.tau_ref", params.map(|p| p.tau_ref).collect())?;
        Ok((tau_rc, tau_ref))
    }

    fn lif_options(&self, n_elements: usize, tag: &str) -> LifOptions {
        LifOptions {
            dt: self.config.simulation.dt,
            upsample: self.config.planning.lif_upsample,
            n_elements,
            max_local_size: self.config.planning.max_local_size,
            tag: Some(tag.to_string()),
        }
    }

    fn plan_lif(&self, ops: &[SimLif]) -> Result<KernelPlan<D>> {
        let voltage = self.rows(ops.iter().map(|op| op.voltage))?;
        let refractory = self.rows(ops.iter().map(|op| op.refractory_time))?;
        let (tau_rc, tau_ref) = self.lif_params(ops.iter().map(|op| &op.params))?;
        let args = LifArgs {
            j: self.rows(ops.iter().map(|op| op.j))?,
            out_voltage: voltage.clone(),
            out_refractory: refractory.clone(),
            voltage,
            refractory,
            out_spikes: self.rows(ops.iter().map(|op| op.output))?,
            tau_rc,
            tau_ref,
        };
        let options = self.lif_options(self.config.planning.lif_n_elements, "lif");
        plan_lif(self.device, args, &options)
    }

    fn plan_lif_rate(&self, ops: &[SimLifRate]) -> Result<KernelPlan<D>> {
        let (tau_rc, tau_ref) = self.lif_params(ops.iter().map(|op| &op.params))?;
        let options = self.lif_options(self.config.planning.lif_rate_n_elements, "lif_rate");
        plan_lif_rate(
            self.device,
            self.rows(ops.iter().map(|op| op.j))?,
            self.rows(ops.iter().map(|op| op.output))?,
            tau_rc,
            tau_ref,
            &options,
        )
    }

    fn plan_elementwise(
        &self,
        kernel: &ElementwiseKernel,
        ops: &[SimElementwise],
    ) -> Result<KernelPlan<D>> {
        for (i, op) in ops.iter().enumerate() {
            if op.inputs.len() != kernel.inputs.len()
                || op.outputs.len() != kernel.outputs.len()
                || op.params.len() != kernel.params.len()
            {
                return Err(EngineError::Configuration(format!(
                    "op {} of '{}' does not match the kernel's inputs/outputs/params",
                    i, kernel.name
                )));
            }
        }

        let mut planner = ElementwisePlanner::new(kernel.name.clone(), kernel.fragment.clone())
            .tag(kernel.name.clone())
            .n_elements(kernel.n_elements)
            .max_local_size(self.config.planning.max_local_size);
        for (k, name) in kernel.inputs.iter().enumerate() {
            planner = planner.input(name.clone(), self.rows(ops.iter().map(|op| op.inputs[k]))?);
        }
        for (k, name) in kernel.outputs.iter().enumerate() {
            planner = planner.output(name.clone(), self.rows(ops.iter().map(|op| op.outputs[k]))?);
        }
        for (k, name) in kernel.params.iter().enumerate() {
            let host = RaggedArray::from_vectors(ops.iter().map(|op| op.params[k].as_slice()));
            let label = format!("{}.{}", kernel.name, name);
            let array = DeviceRaggedArray::from_host(Arc::clone(self.device), &host, &label)?;
            planner = planner.param(name.clone(), ParamArg::Ragged(array));
        }
        for (name, value) in &kernel.constants {
            planner = planner.constant(name.clone(), *value);
        }
        planner.build(self.device)
    }

    fn plan_probes(&self, model: &Model) -> Result<Option<ProbeSampler<D>>> {
        if model.probes().is_empty() {
            return Ok(None);
        }
        let dt = self.config.simulation.dt;
        let mut periods = Vec::with_capacity(model.probes().len());
        for (i, probe) in model.probes().iter().enumerate() {
            let steps = (probe.sample_every / dt).round();
            if !(steps.is_finite() && steps >= 1.0) {
                return Err(EngineError::Configuration(format!(
                    "probe {} samples every {} s, shorter than one {} s step",
                    i, probe.sample_every, dt
                )));
            }
            periods.push(steps as usize);
        }
        let x = self.rows(model.probes().iter().map(|p| p.signal))?;
        plan_probes(
            self.device,
            &x,
            &periods,
            self.config.simulation.n_prealloc_probes,
            self.config.planning.max_local_size,
            Some("probes".to_string()),
        )
    }
}
