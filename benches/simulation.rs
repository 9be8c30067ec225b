// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Benchmarks for Ground State Space construction and the exact simulators.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sidbsim::cluster_hierarchy::{ClusterTree, LinkageMethod};
use sidbsim::clustercomplete::{clustercomplete, ClusterCompleteParams};
use sidbsim::exhaustive::{exhaustive_ground_state_simulation, ExhaustiveParams};
use sidbsim::flitsim::flitsim;
use sidbsim::ground_state_space::{ground_state_space, GroundStateSpaceParams};
use sidbsim::layout::{SidbLayout, SiqadCoord};
use sidbsim::physics::SimulationParameters;

/// Pairs of SiDBs along a wire, a few dimer columns apart.
fn bdl_wire(num_pairs: i64) -> SidbLayout {
    SidbLayout::from_cells((0..num_pairs).flat_map(|i| {
        let x = i * 5;
        [SiqadCoord::new(x, 0, 0), SiqadCoord::new(x + 2, 0, 0)]
    }))
}

fn bench_cluster_hierarchy(c: &mut Criterion) {
    let mut group = c.benchmark_group("cluster_hierarchy");
    let layout = bdl_wire(30);
    for linkage in [LinkageMethod::MinimumVariance, LinkageMethod::Complete] {
        group.bench_with_input(
            BenchmarkId::new(format!("{linkage:?}"), layout.num_cells()),
            &layout,
            |b, layout| b.iter(|| black_box(ClusterTree::build(black_box(layout), linkage))),
        );
    }
    group.finish();
}

fn bench_ground_state_space(c: &mut Criterion) {
    let mut group = c.benchmark_group("ground_state_space");
    for pairs in [4, 8, 12] {
        let layout = bdl_wire(pairs);
        group.bench_with_input(BenchmarkId::new("bdl_wire", pairs * 2), &layout, |b, layout| {
            let params = GroundStateSpaceParams::default();
            b.iter(|| black_box(ground_state_space(black_box(layout), &params)))
        });
    }
    group.finish();
}

fn bench_simulators(c: &mut Criterion) {
    let mut group = c.benchmark_group("simulators");
    group.sample_size(10);
    let params = SimulationParameters::new(3, -0.32);
    for pairs in [3, 5] {
        let layout = bdl_wire(pairs);
        let n = pairs * 2;
        group.bench_with_input(BenchmarkId::new("clustercomplete", n), &layout, |b, layout| {
            let cc_params = ClusterCompleteParams {
                simulation_parameters: params,
                ..Default::default()
            };
            b.iter(|| black_box(clustercomplete(black_box(layout), &cc_params)))
        });
        group.bench_with_input(BenchmarkId::new("flitsim", n), &layout, |b, layout| {
            b.iter(|| black_box(flitsim(black_box(layout), &params, 6, 4)))
        });
        group.bench_with_input(BenchmarkId::new("exhaustive", n), &layout, |b, layout| {
            let ex_params = ExhaustiveParams {
                simulation_parameters: params,
                ..Default::default()
            };
            b.iter(|| black_box(exhaustive_ground_state_simulation(black_box(layout), &ex_params)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_cluster_hierarchy, bench_ground_state_space, bench_simulators);
criterion_main!(benches);
