// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Block vs Flattened regime on the host device
//!
//! Notes:
//! - Uniform batches favour the Block regime.
//! - One long row among many short ones is the case the Flattened regime
//!   exists for.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use neurocl_npu_engine::{plan_lif, KernelPlan, LifArgs, LifOptions, ParamArg, Plan};
use neurocl_npu_runtime::{DeviceRaggedArray, HostDevice, RaggedArray};

fn lif_batch(device: &Arc<HostDevice>, lengths: &[usize], n_elements: usize) -> KernelPlan<HostDevice> {
    let currents: Vec<Vec<f32>> = lengths
        .iter()
        .map(|&len| (0..len).map(|i| 1.0 + (i % 7) as f32 * 0.5).collect())
        .collect();
    let shapes: Vec<(usize, usize)> = lengths.iter().map(|&len| (len, 1)).collect();
    let zeros = |label: &str| DeviceRaggedArray::zeros(Arc::clone(device), &shapes, label).unwrap();
    let v = zeros("v");
    let w = zeros("w");
    let args = LifArgs {
        j: DeviceRaggedArray::from_host(
            Arc::clone(device),
            &RaggedArray::from_vectors(&currents),
            "j",
        )
        .unwrap(),
        voltage: v.clone(),
        refractory: w.clone(),
        out_voltage: v,
        out_refractory: w,
        out_spikes: zeros("s"),
        tau_rc: ParamArg::Constant(0.02),
        tau_ref: ParamArg::Constant(0.002),
    };
    let options = LifOptions {
        n_elements,
        ..LifOptions::default()
    };
    plan_lif(device, args, &options).unwrap()
}

fn bench_regimes(c: &mut Criterion) {
    let mut group = c.benchmark_group("lif_regimes");
    group.sample_size(20);

    let uniform = vec![64; 64];
    let mut skewed = vec![2; 255];
    skewed.push(3584);

    for (label, lengths) in [("uniform", &uniform), ("skewed", &skewed)] {
        let total: usize = lengths.iter().sum();
        group.throughput(Throughput::Elements(total as u64));
        for n_elements in [0, 1, 8, 32] {
            let device = Arc::new(HostDevice::new());
            let plan = lif_batch(&device, lengths, n_elements);
            let regime = if n_elements == 0 {
                "block".to_string()
            } else {
                format!("flattened_{}", n_elements)
            };
            group.bench_with_input(BenchmarkId::new(label, regime), &plan, |b, plan| {
                b.iter(|| black_box(plan.call()).unwrap());
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_regimes);
criterion_main!(benches);
