// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! End-to-end runs of the simulator on the host device

use std::sync::Arc;

use ndarray::array;
use neurocl_config::SimulatorConfig;
use neurocl_npu_engine::{
    DirectFunction, ElementwiseKernel, EngineError, KernelForm, Model, OperatorGroup, ProbeId,
    SimDirect, SimElementwise, SimLif, SimLifRate, Simulator,
};
use neurocl_npu_neural::LIFParameters;
use neurocl_npu_runtime::kernel::{Expr, Fragment, Stmt};
use neurocl_npu_runtime::HostDevice;

fn config(n_prealloc: usize) -> SimulatorConfig {
    let mut config = SimulatorConfig::default();
    config.simulation.n_prealloc_probes = n_prealloc;
    config
}

/// Two LIF populations of different sizes, probed at different periods
fn lif_model() -> (Model, Vec<ProbeId>) {
    let mut model = Model::new();
    let j1 = model.add_vector("j1", &[1.5, 2.0, 3.0]);
    let v1 = model.add_vector("v1", &[0.0; 3]);
    let w1 = model.add_vector("w1", &[0.0; 3]);
    let s1 = model.add_vector("s1", &[0.0; 3]);
    let j2 = model.add_vector("j2", &[2.5; 5]);
    let v2 = model.add_vector("v2", &[0.0; 5]);
    let w2 = model.add_vector("w2", &[0.0; 5]);
    let s2 = model.add_vector("s2", &[0.0; 5]);
    model
        .add_group(OperatorGroup::Lif(vec![
            SimLif {
                j: j1,
                voltage: v1,
                refractory_time: w1,
                output: s1,
                params: LIFParameters::default(),
            },
            SimLif {
                j: j2,
                voltage: v2,
                refractory_time: w2,
                output: s2,
                params: LIFParameters::with_values(0.03, 0.001),
            },
        ]))
        .unwrap();
    let probes = vec![
        model.add_probe(v1, 0.001).unwrap(),
        model.add_probe(s2, 0.003).unwrap(),
        model.add_probe(w2, 0.002).unwrap(),
    ];
    (model, probes)
}

#[test]
fn test_run_steps_equals_repeated_single_steps() {
    let (model, probes) = lif_model();
    let device = Arc::new(HostDevice::new());
    let mut batched = Simulator::new(Arc::clone(&device), &model, &config(7)).unwrap();
    let mut stepped = Simulator::new(Arc::clone(&device), &model, &config(7)).unwrap();

    batched.run_steps(40).unwrap();
    batched.run_steps(33).unwrap();
    for _ in 0..73 {
        stepped.step().unwrap();
    }

    assert_eq!(batched.n_steps(), 73);
    for probe in probes {
        assert_eq!(
            batched.probe_data(probe).unwrap(),
            stepped.probe_data(probe).unwrap()
        );
    }
}

#[test]
fn test_probe_sample_counts_follow_periods() {
    let (model, probes) = lif_model();
    let device = Arc::new(HostDevice::new());
    let mut sim = Simulator::new(device, &model, &config(4)).unwrap();
    let sampler = sim.probe_sampler().unwrap();
    assert_eq!(sampler.periods(), &[1, 3, 2]);
    assert_eq!(sampler.max_steps_between_drains(), 4);

    sim.run_steps(100).unwrap();
    // samples at steps 0, p, 2p, ...
    assert_eq!(sim.probe_data(probes[0]).unwrap().dim(), (100, 3));
    assert_eq!(sim.probe_data(probes[1]).unwrap().dim(), (34, 5));
    assert_eq!(sim.probe_data(probes[2]).unwrap().dim(), (50, 5));
    assert_eq!(sim.probe_sampler().unwrap().buffered().unwrap(), vec![0, 0, 0]);
}

#[test]
fn test_probe_records_state_after_each_step() {
    let (model, probes) = lif_model();
    let device = Arc::new(HostDevice::new());
    let mut sim = Simulator::new(device, &model, &config(1000)).unwrap();
    sim.run_steps(5).unwrap();
    let current = sim
        .signal(model.probes()[0].signal)
        .unwrap()
        .column(0)
        .to_vec();
    let data = sim.probe_data(probes[0]).unwrap();
    assert_eq!(data.nrows(), 5);
    assert_eq!(data.row(4).to_vec(), current);
}

#[test]
fn test_later_group_sees_earlier_group_writes() {
    let mut model = Model::new();
    let a = model.add_vector("a", &[1.0, 2.0, 3.0]);
    let b = model.add_vector("b", &[0.0; 3]);
    let c = model.add_vector("c", &[0.0; 3]);
    let kernel = |name: &str, fragment: Fragment| ElementwiseKernel {
        name: name.to_string(),
        fragment,
        inputs: vec!["x".to_string()],
        outputs: vec!["y".to_string()],
        params: vec![],
        constants: vec![],
        n_elements: 0,
    };
    model
        .add_group(OperatorGroup::Elementwise {
            kernel: kernel("inc", Fragment::new(vec![Stmt::assign("y", Expr::var("x") + 1.0)])),
            ops: vec![SimElementwise {
                inputs: vec![a],
                outputs: vec![b],
                params: vec![],
            }],
        })
        .unwrap();
    model
        .add_group(OperatorGroup::Elementwise {
            kernel: kernel("dbl", Fragment::new(vec![Stmt::assign("y", Expr::var("x") * 2.0)])),
            ops: vec![SimElementwise {
                inputs: vec![b],
                outputs: vec![c],
                params: vec![],
            }],
        })
        .unwrap();
    model
        .add_group(OperatorGroup::Elementwise {
            kernel: kernel("acc", Fragment::new(vec![Stmt::assign("y", Expr::var("x") + 0.5)])),
            ops: vec![SimElementwise {
                inputs: vec![a],
                outputs: vec![a],
                params: vec![],
            }],
        })
        .unwrap();

    let device = Arc::new(HostDevice::new());
    let mut sim = Simulator::new(device, &model, &SimulatorConfig::default()).unwrap();
    for steps in 1..=3 {
        sim.step().unwrap();
        let a_before = sim.signal(a).unwrap() - 0.5f32;
        assert_eq!(
            sim.signal(c).unwrap(),
            (a_before + 1.0f32) * 2.0f32,
            "step {}",
            steps
        );
    }
    assert_eq!(sim.dag().len(), 4);
    assert_eq!(sim.marker_count(), 3);
}

fn reverse_function() -> DirectFunction {
    DirectFunction::new("reverse", |x: &[f32]| x.iter().rev().copied().collect())
}

fn direct_model(function: DirectFunction) -> (Model, ProbeId) {
    let function = Arc::new(function);
    let mut model = Model::new();
    let x = model.add_vector("x", &[1.0, 2.0]);
    let y = model.add_vector("y", &[0.0, 0.0]);
    let x2 = model.add_vector("x2", &[5.0, 6.0]);
    let y2 = model.add_vector("y2", &[0.0, 0.0]);
    model
        .add_group(OperatorGroup::Direct(vec![
            SimDirect {
                function: Arc::clone(&function),
                input: x,
                output: y,
            },
            SimDirect {
                function,
                input: x2,
                output: y2,
            },
        ]))
        .unwrap();
    let probe = model.add_probe(y2, 0.001).unwrap();
    (model, probe)
}

#[test]
fn test_direct_function_kernel_and_host_agree() {
    let form = KernelForm::new(
        "x",
        Fragment::new(vec![
            Stmt::store("y", 0.0, Expr::index("x", 1.0)),
            Stmt::store("y", 1.0, Expr::index("x", 0.0)),
        ]),
    );
    let device = Arc::new(HostDevice::new());
    let (model, probe) = direct_model(reverse_function().with_kernel_form(form));
    let mut on_device = Simulator::new(Arc::clone(&device), &model, &config(10)).unwrap();
    let (model, _) = direct_model(reverse_function());
    let mut on_host = Simulator::new(Arc::clone(&device), &model, &config(10)).unwrap();

    on_device.run_steps(3).unwrap();
    on_host.run_steps(3).unwrap();
    let expected = array![[6.0f32, 5.0], [6.0, 5.0], [6.0, 5.0]];
    assert_eq!(on_device.probe_data(probe).unwrap(), expected);
    assert_eq!(on_host.probe_data(probe).unwrap(), expected);
}

#[test]
fn test_strict_mode_rejects_host_fallback() {
    let (model, _) = direct_model(reverse_function());
    let mut config = config(10);
    config.simulation.strict_kernels = true;
    let result = Simulator::new(Arc::new(HostDevice::new()), &model, &config);
    assert!(matches!(result, Err(EngineError::Translation { .. })));
}

#[test]
fn test_matrix_probe_rejected() {
    let mut model = Model::new();
    let m = model.add_matrix("m", &array![[1.0f32, 2.0], [3.0, 4.0]]);
    model.add_probe(m, 0.001).unwrap();
    let result = Simulator::new(Arc::new(HostDevice::new()), &model, &config(10));
    assert!(matches!(result, Err(EngineError::NonVectorSignal { .. })));
}

#[test]
fn test_probe_faster_than_dt_rejected() {
    let mut model = Model::new();
    let x = model.add_vector("x", &[0.0]);
    model.add_probe(x, 0.0001).unwrap();
    let result = Simulator::new(Arc::new(HostDevice::new()), &model, &config(10));
    assert!(matches!(result, Err(EngineError::Configuration(_))));
}

#[test]
fn test_invalid_config_rejected() {
    let (model, _) = lif_model();
    let mut config = config(10);
    config.planning.max_local_size = 100;
    let result = Simulator::new(Arc::new(HostDevice::new()), &model, &config);
    assert!(matches!(result, Err(EngineError::Configuration(_))));
}

#[test]
fn test_rate_group_and_signal_writes() {
    let mut model = Model::new();
    let j = model.add_vector("j", &[0.0, 2.0]);
    let r = model.add_vector("r", &[0.0, 0.0]);
    model
        .add_group(OperatorGroup::LifRate(vec![SimLifRate {
            j,
            output: r,
            params: LIFParameters::default(),
        }]))
        .unwrap();
    let mut sim = Simulator::new(Arc::new(HostDevice::new()), &model, &config(10)).unwrap();
    sim.step().unwrap();
    let rates = sim.signal(r).unwrap();
    assert_eq!(rates[[0, 0]], 0.0);
    assert!((rates[[1, 0]] - 63.04).abs() < 0.1);

    sim.set_signal(j, &[0.0, 0.0]).unwrap();
    sim.step().unwrap();
    assert_eq!(sim.signal(r).unwrap().column(0).to_vec(), vec![0.0, 0.0]);
    assert!((sim.time() - 0.002).abs() < 1e-12);
}

#[test]
fn test_profiling_counts_every_plan() {
    let (model, _) = lif_model();
    let mut config = config(16);
    config.profiling.level = 1;
    config.profiling.sort_column = Some("-name".to_string());
    let mut sim = Simulator::new(Arc::new(HostDevice::new()), &model, &config).unwrap();
    sim.run_steps(20).unwrap();

    let report = sim.profiling_report().unwrap();
    assert_eq!(report.rows.len(), sim.dag().len());
    assert!(report.rows.iter().all(|row| row.n_calls == 20));
    let names: Vec<&str> = report.rows.iter().map(|r| r.name.as_str()).collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
    assert!(report.rows.iter().any(|r| r.tag.as_deref() == Some("lif")));

    sim.profiler_mut().stop();
    sim.run_steps(5).unwrap();
    assert!(sim
        .profiling_report()
        .unwrap()
        .rows
        .iter()
        .all(|row| row.n_calls == 20));
}

#[test]
fn test_profiling_disabled_by_default() {
    let (model, _) = lif_model();
    let mut sim = Simulator::new(Arc::new(HostDevice::new()), &model, &config(16)).unwrap();
    sim.run_steps(3).unwrap();
    assert!(sim.profiling_report().is_none());
}
