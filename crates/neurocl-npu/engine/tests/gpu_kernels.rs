// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! GPU kernel correctness tests
//!
//! Runs the same plans on the WGPU device and on the host device and
//! compares the results:
//! - Block and Flattened elementwise kernels over a skewed batch
//! - LIF spiking and LIF rate kernels
//! - Probe sampler rings
//! - Direct-function kernels, including one that ignores its input
//!
//! Every test returns early when no adapter is available.
//!
//! Run with:
//!   cargo test -p neurocl-npu-engine --test gpu_kernels --features gpu

#![cfg(feature = "gpu")]

use std::sync::Arc;

use neurocl_config::SimulatorConfig;
use neurocl_npu_engine::{
    plan_direct, plan_lif, plan_lif_rate, plan_probes, ElementwisePlanner, KernelForm, LifArgs,
    LifOptions, Model, OperatorGroup, ParamArg, Plan, SimLif, Simulator,
};
use neurocl_npu_neural::LIFParameters;
use neurocl_npu_runtime::kernel::{Expr, Fragment, Stmt};
use neurocl_npu_runtime::{Device, DeviceRaggedArray, HostDevice, RaggedArray, WgpuDevice};

/// Open the GPU, or `None` when the machine has no usable adapter
fn gpu_device() -> Option<Arc<WgpuDevice>> {
    match WgpuDevice::new() {
        Ok(device) => Some(Arc::new(device)),
        Err(e) => {
            println!("Skipping GPU test: {}", e);
            None
        }
    }
}

/// Row lengths mixing empty, tiny and long rows
const LENGTHS: [usize; 6] = [5, 0, 1, 37, 3, 12];

fn ragged<D: Device>(device: &Arc<D>, rows: Vec<Vec<f32>>, label: &str) -> DeviceRaggedArray<D> {
    DeviceRaggedArray::from_host(Arc::clone(device), &RaggedArray::from_vectors(rows), label)
        .unwrap()
}

fn read_rows<D: Device>(array: &DeviceRaggedArray<D>) -> Vec<Vec<f32>> {
    (0..array.len()).map(|row| array.read_row(row).unwrap()).collect()
}

fn assert_close(gpu: &[Vec<f32>], host: &[Vec<f32>], tolerance: f32, context: &str) {
    assert_eq!(gpu.len(), host.len(), "{}", context);
    for (row, (g, h)) in gpu.iter().zip(host).enumerate() {
        assert_eq!(g.len(), h.len(), "{} row {}", context, row);
        for (i, (a, b)) in g.iter().zip(h).enumerate() {
            assert!(
                (a - b).abs() <= tolerance,
                "{} row {} element {}: gpu {} vs host {}",
                context,
                row,
                i,
                a,
                b
            );
        }
    }
}

fn run_affine<D: Device>(device: &Arc<D>, n_elements: usize) -> Vec<Vec<f32>> {
    let x: Vec<Vec<f32>> = LENGTHS
        .iter()
        .enumerate()
        .map(|(row, &len)| (0..len).map(|i| row as f32 - i as f32 * 0.25).collect())
        .collect();
    let gains: Vec<Vec<f32>> = LENGTHS
        .iter()
        .enumerate()
        .map(|(row, &len)| {
            if row % 2 == 0 {
                vec![2.0 + row as f32]
            } else {
                (0..len).map(|i| 0.5 + i as f32).collect()
            }
        })
        .collect();
    let zeros: Vec<Vec<f32>> = LENGTHS.iter().map(|&len| vec![0.0; len]).collect();
    let y = ragged(device, zeros, "y");

    let plan = ElementwisePlanner::new(
        "affine",
        Fragment::new(vec![
            Stmt::assign("t", Expr::var("x") * "g"),
            Stmt::if_else(
                Expr::var("t").gt(0.0),
                vec![Stmt::assign("y", Expr::var("t") + "bias")],
                vec![Stmt::assign("y", Expr::var("t") - "bias")],
            ),
        ])
        .with_locals(["t"]),
    )
    .input("x", ragged(device, x, "x"))
    .output("y", y.clone())
    .param("g", ParamArg::Ragged(ragged(device, gains, "g")))
    .constant("bias", 0.25)
    .n_elements(n_elements)
    .build(device)
    .unwrap();
    plan.call().unwrap();
    plan.sync().unwrap();
    read_rows(&y)
}

#[test]
fn test_gpu_elementwise_regimes_match_host() {
    let Some(gpu) = gpu_device() else { return };
    let host = Arc::new(HostDevice::new());

    for n_elements in [0, 1, 3, 7, 64] {
        let expected = run_affine(&host, n_elements);
        let actual = run_affine(&gpu, n_elements);
        // Products and sums only: identical up to contraction.
        assert_close(&actual, &expected, 1e-3, &format!("n_elements = {}", n_elements));
    }
}

/// Spike counts and final voltages of a LIF batch after `steps` ticks
fn run_lif<D: Device>(
    device: &Arc<D>,
    n_elements: usize,
    upsample: usize,
    steps: usize,
) -> (Vec<Vec<f32>>, Vec<Vec<f32>>) {
    let currents = vec![
        vec![0.5, 1.2, 2.0],
        vec![4.0],
        vec![1.01, 1.5, 2.5, 3.0, 6.0, 10.0, 0.0, -1.0],
    ];
    let zeros: Vec<Vec<f32>> = currents.iter().map(|row| vec![0.0; row.len()]).collect();
    let v = ragged(device, zeros.clone(), "v");
    let w = ragged(device, zeros.clone(), "w");
    let s = ragged(device, zeros.clone(), "s");
    let tau_rc = ragged(device, vec![vec![0.02], vec![0.03], vec![0.02]], "tau_rc");

    let plan = plan_lif(
        device,
        LifArgs {
            j: ragged(device, currents, "j"),
            voltage: v.clone(),
            refractory: w.clone(),
            out_voltage: v.clone(),
            out_refractory: w,
            out_spikes: s.clone(),
            tau_rc: ParamArg::Ragged(tau_rc),
            tau_ref: ParamArg::Constant(0.002),
        },
        &LifOptions {
            upsample,
            n_elements,
            ..LifOptions::default()
        },
    )
    .unwrap();

    let mut counts = zeros;
    for _ in 0..steps {
        plan.call().unwrap();
        for (row, spikes) in read_rows(&s).into_iter().enumerate() {
            for (count, spike) in counts[row].iter_mut().zip(spikes) {
                *count += spike;
            }
        }
    }
    (counts, read_rows(&v))
}

#[test]
fn test_gpu_lif_spike_counts_match_host() {
    let Some(gpu) = gpu_device() else { return };
    let host = Arc::new(HostDevice::new());

    for (n_elements, upsample) in [(0, 1), (1, 1), (4, 2), (0, 4)] {
        let (host_counts, host_v) = run_lif(&host, n_elements, upsample, 200);
        let (gpu_counts, gpu_v) = run_lif(&gpu, n_elements, upsample, 200);
        let context = format!("n_elements = {}, upsample = {}", n_elements, upsample);
        // A spike may shift by one tick under fused multiply-add.
        assert_close(&gpu_counts, &host_counts, 1.0, &context);
        for row in &gpu_v {
            assert!(row.iter().all(|v| (0.0..=1.0).contains(v)), "{}", context);
        }
        assert_eq!(gpu_v.len(), host_v.len());
    }
}

#[test]
fn test_gpu_lif_rate_matches_host() {
    let Some(gpu) = gpu_device() else { return };
    let host = Arc::new(HostDevice::new());

    for n_elements in [0, 10] {
        let options = LifOptions {
            n_elements,
            ..LifOptions::default()
        };
        let currents = vec![vec![0.5, 1.01, 1.5, 2.0], vec![4.0, 10.0], vec![]];
        let zeros = vec![vec![0.0; 4], vec![0.0; 2], vec![]];

        let r = ragged(&host, zeros.clone(), "r");
        let plan = plan_lif_rate(
            &host,
            ragged(&host, currents.clone(), "j"),
            r.clone(),
            ParamArg::Constant(0.02),
            ParamArg::Constant(0.002),
            &options,
        )
        .unwrap();
        plan.call().unwrap();
        let expected = read_rows(&r);

        let r = ragged(&gpu, zeros, "r");
        let plan = plan_lif_rate(
            &gpu,
            ragged(&gpu, currents, "j"),
            r.clone(),
            ParamArg::Constant(0.02),
            ParamArg::Constant(0.002),
            &options,
        )
        .unwrap();
        plan.call().unwrap();
        let actual = read_rows(&r);

        // Rates peak near 250 Hz; GPU `log` is accurate to a few ulp.
        assert_close(&actual, &expected, 0.25, &format!("n_elements = {}", n_elements));
    }
}

/// Count up by one each step and probe the counter at periods 1 and 3
fn run_probes<D: Device>(device: &Arc<D>) -> Vec<Vec<f32>> {
    let x = ragged(device, vec![vec![0.0; 3], vec![10.0; 2]], "x");
    let inc = ElementwisePlanner::new(
        "inc",
        Fragment::new(vec![Stmt::assign("x", Expr::var("x") + 1.0)]),
    )
    .output("x", x.clone())
    .build(device)
    .unwrap();
    let sampler = plan_probes(device, &x, &[1, 3], 8, 256, None)
        .unwrap()
        .unwrap();
    let probe = sampler.plan();

    for _ in 0..8 {
        inc.call().unwrap();
        probe.call().unwrap();
    }
    let drained = sampler.drain().unwrap();
    sampler.ensure_drained().unwrap();
    drained
}

#[test]
fn test_gpu_probe_rings_match_host() {
    let Some(gpu) = gpu_device() else { return };
    let host = Arc::new(HostDevice::new());

    let expected = run_probes(&host);
    assert_eq!(expected[0].len(), 8 * 3);
    assert_eq!(expected[1], vec![11.0, 11.0, 14.0, 14.0, 17.0, 17.0]);
    assert_eq!(run_probes(&gpu), expected);
}

/// Direct kernels over separate input and output buffers
fn run_direct<D: Device>(device: &Arc<D>, form: KernelForm) -> Vec<Vec<f32>> {
    let x = ragged(device, vec![vec![1.0, 2.0], vec![3.0, 4.0]], "x");
    let y = ragged(device, vec![vec![0.0; 2], vec![0.0; 2]], "y");
    let plan = plan_direct(device, "direct", form, &x, &y, None, 256).unwrap();
    plan.call().unwrap();
    read_rows(&y)
}

fn swap() -> KernelForm {
    KernelForm::new(
        "x",
        Fragment::new(vec![
            Stmt::store("y", 0.0, Expr::index("x", 1.0)),
            Stmt::store("y", 1.0, Expr::index("x", 0.0)),
        ]),
    )
}

#[test]
fn test_gpu_direct_kernel_matches_host() {
    let Some(gpu) = gpu_device() else { return };
    let host = Arc::new(HostDevice::new());

    let expected = run_direct(&host, swap());
    assert_eq!(expected, vec![vec![2.0, 1.0], vec![4.0, 3.0]]);
    assert_eq!(run_direct(&gpu, swap()), expected);
}

#[test]
fn test_gpu_direct_kernel_ignoring_its_input_binds() {
    let Some(gpu) = gpu_device() else { return };

    // The input binding is declared but never read by the shader.
    let constant = KernelForm::new(
        "x",
        Fragment::new(vec![Stmt::store("y", 0.0, 0.5), Stmt::store("y", 1.0, -0.5)]),
    );
    assert_eq!(
        run_direct(&gpu, constant),
        vec![vec![0.5, -0.5], vec![0.5, -0.5]]
    );
}

#[test]
fn test_gpu_simulator_spike_rate_matches_host() {
    let Some(gpu) = gpu_device() else { return };
    let host = Arc::new(HostDevice::new());

    let mut model = Model::new();
    let j = model.add_vector("j", &[1.5, 2.0, 3.0]);
    let v = model.add_vector("v", &[0.0; 3]);
    let w = model.add_vector("w", &[0.0; 3]);
    let s = model.add_vector("s", &[0.0; 3]);
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
    let mut config = SimulatorConfig::default();
    config.simulation.n_prealloc_probes = 64;

    let mut on_host = Simulator::new(host, &model, &config).unwrap();
    let mut on_gpu = Simulator::new(gpu, &model, &config).unwrap();
    on_host.run_steps(500).unwrap();
    on_gpu.run_steps(500).unwrap();

    let host_counts = on_host.probe_data(probe).unwrap().sum_axis(ndarray::Axis(0));
    let gpu_counts = on_gpu.probe_data(probe).unwrap().sum_axis(ndarray::Axis(0));
    for (g, h) in gpu_counts.iter().zip(host_counts.iter()) {
        assert!((g - h).abs() <= 1.0, "gpu {} vs host {}", g, h);
    }
}
