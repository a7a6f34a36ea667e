// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Whole-stack runs: configuration file, model, simulator, probes

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use neurocl::config::load_config;
use neurocl::neural::LIFModel;
use neurocl::prelude::*;
use neurocl::runtime::kernel::{Expr, Fragment, Stmt};

const CONFIG: &str = r#"
[simulation]
dt = 0.001
n_prealloc_probes = 50

[planning]
lif_n_elements = 4

[profiling]
level = 1
sort_column = "runtime"
"#;

fn config_from_file() -> SimulatorConfig {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CONFIG.as_bytes()).unwrap();
    load_config(Some(file.path()), None).unwrap()
}

/// One neuron driven at J = 2, its spikes probed every step
fn single_neuron() -> (Model, ProbeId) {
    let mut model = Model::new();
    let j = model.add_vector("j", &[2.0]);
    let v = model.add_vector("v", &[0.0]);
    let w = model.add_vector("w", &[0.0]);
    let s = model.add_vector("s", &[0.0]);
    model
        .add_group(OperatorGroup::Lif(vec![SimLif {
            j,
            voltage: v,
            refractory_time: w,
            output: s,
            params: LIFParameters::default(),
        }]))
        .unwrap();
    let probe = model.add_probe(s, 0.001).unwrap();
    (model, probe)
}

#[test]
fn test_one_second_of_spiking_matches_analytic_rate() {
    let config = config_from_file();
    assert_eq!(config.simulation.n_prealloc_probes, 50);

    let (model, probe) = single_neuron();
    let mut sim = Simulator::new(Arc::new(HostDevice::new()), &model, &config).unwrap();
    sim.run_steps(1000).unwrap();

    let spikes = sim.probe_data(probe).unwrap();
    assert_eq!(spikes.nrows(), 1000);
    assert!(spikes.iter().all(|&s| s == 0.0 || s == 1.0));
    let count: f32 = spikes.sum();
    let analytic = LIFModel::new().rate(&LIFParameters::default(), 2.0);
    assert!((count - analytic).abs() <= 2.0, "{} vs {}", count, analytic);

    let report = sim.profiling_report().unwrap();
    assert!(report.rows.iter().all(|row| row.n_calls == 1000));
    assert!(report.to_string().contains("totals:"));
}

#[test]
fn test_upsampling_changes_spike_count_by_at_most_integration_error() {
    let (model, probe) = single_neuron();
    let mut counts = Vec::new();
    for upsample in [1, 2, 5] {
        let mut overrides = HashMap::new();
        overrides.insert("lif_upsample".to_string(), upsample.to_string());
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();
        let config = load_config(Some(file.path()), Some(&overrides)).unwrap();
        assert_eq!(config.planning.lif_upsample, upsample);

        let mut sim = Simulator::new(Arc::new(HostDevice::new()), &model, &config).unwrap();
        sim.run_steps(1000).unwrap();
        counts.push(sim.probe_data(probe).unwrap().sum());
    }
    for count in &counts[1..] {
        assert!((count - counts[0]).abs() <= 2.0, "{:?}", counts);
    }
}

/// LIF rate feeding an elementwise scale, then a direct function
fn pipeline() -> (Model, [ProbeId; 2]) {
    let mut model = Model::new();
    let j = model.add_vector("j", &[0.5, 1.5, 2.0, 4.0]);
    let rates = model.add_vector("rates", &[0.0; 4]);
    let scaled = model.add_vector("scaled", &[0.0; 4]);
    let summed = model.add_vector("summed", &[0.0]);
    model
        .add_group(OperatorGroup::LifRate(vec![SimLifRate {
            j,
            output: rates,
            params: LIFParameters::default(),
        }]))
        .unwrap();
    model
        .add_group(OperatorGroup::Elementwise {
            kernel: ElementwiseKernel {
                name: "scale".to_string(),
                fragment: Fragment::new(vec![Stmt::assign("y", Expr::var("x") * "gain")]),
                inputs: vec!["x".to_string()],
                outputs: vec!["y".to_string()],
                params: vec!["gain".to_string()],
                constants: vec![],
                n_elements: 3,
            },
            ops: vec![SimElementwise {
                inputs: vec![rates],
                outputs: vec![scaled],
                params: vec![vec![0.001]],
            }],
        })
        .unwrap();
    let total = Arc::new(DirectFunction::new("total", |x: &[f32]| vec![x.iter().sum()]));
    model
        .add_group(OperatorGroup::Direct(vec![SimDirect {
            function: total,
            input: scaled,
            output: summed,
        }]))
        .unwrap();
    let probes = [
        model.add_probe(scaled, 0.002).unwrap(),
        model.add_probe(summed, 0.001).unwrap(),
    ];
    (model, probes)
}

#[test]
fn test_pipeline_output_independent_of_run_chunking() {
    let (model, probes) = pipeline();
    let mut config = SimulatorConfig::default();
    config.simulation.n_prealloc_probes = 3;
    let device = Arc::new(HostDevice::new());

    let mut whole = Simulator::new(Arc::clone(&device), &model, &config).unwrap();
    whole.run_steps(25).unwrap();
    let mut pieces = Simulator::new(Arc::clone(&device), &model, &config).unwrap();
    for chunk in [1, 7, 2, 15] {
        pieces.run_steps(chunk).unwrap();
    }

    for probe in probes {
        assert_eq!(whole.probe_data(probe).unwrap(), pieces.probe_data(probe).unwrap());
    }
    assert_eq!(whole.probe_data(probes[0]).unwrap().nrows(), 13);
    assert_eq!(whole.probe_data(probes[1]).unwrap().nrows(), 25);
}

#[test]
fn test_each_group_reads_values_written_earlier_in_the_step() {
    let (model, probes) = pipeline();
    let mut sim = Simulator::new(
        Arc::new(HostDevice::new()),
        &model,
        &SimulatorConfig::default(),
    )
    .unwrap();
    sim.step().unwrap();

    let scaled = sim.probe_data(probes[0]).unwrap();
    let summed = sim.probe_data(probes[1]).unwrap();
    let model_rate = LIFModel::new();
    let expected: Vec<f32> = [0.5f32, 1.5, 2.0, 4.0]
        .iter()
        .map(|&j| model_rate.rate(&LIFParameters::default(), j) * 0.001)
        .collect();
    for (got, want) in scaled.row(0).iter().zip(&expected) {
        assert!((got - want).abs() < 1e-4, "{} vs {}", got, want);
    }
    assert!((summed[[0, 0]] - scaled.row(0).sum()).abs() < 1e-6);
}

#[cfg(feature = "observability")]
#[test]
fn test_logging_can_be_initialised_from_config() {
    let config = config_from_file();
    let _guard = neurocl::observability::try_init_logging(
        &neurocl::logging_config(&config),
        &neurocl::observability::CrateDebugFlags::default(),
    );
    tracing::info!(target: "neurocl", "[TEST] logging initialised");

    let (model, _) = single_neuron();
    let mut sim = Simulator::new(Arc::new(HostDevice::new()), &model, &config).unwrap();
    sim.run_steps(10).unwrap();
    assert_eq!(sim.n_steps(), 10);
}
