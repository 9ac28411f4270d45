//! Criterion benchmarks for device assembly and the precision holder.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use tcad_bench::drift_diffusion_profile;
use tcad_core::{AssemblyBuffers, Extended, TimeMode, WhatToLoad};
use tcad_equation::DeviceHolder;

const NODES: usize = 20_000;

/// Benchmark: permutation pass plus a DC matrix-and-residual pass.
fn bench_dc_cycle(c: &mut Criterion) {
    let mut device = drift_diffusion_profile::<f64>(NODES);
    c.bench_function("dc_cycle_20k", |b| {
        b.iter(|| {
            let mut out = AssemblyBuffers::new();
            device
                .assemble_cycle(WhatToLoad::MatrixAndRhs, TimeMode::Dc, &mut out)
                .unwrap();
            black_box(out);
        });
    });
}

/// Benchmark: one Newton-style update followed by re-assembly.
fn bench_update_and_assemble(c: &mut Criterion) {
    let mut device = drift_diffusion_profile::<f64>(NODES);
    device.load_permutations().unwrap();
    let step = vec![1.0e-6; device.row_count()];
    c.bench_function("update_then_dc_20k", |b| {
        b.iter(|| {
            device.update(&step).unwrap();
            let mut out = AssemblyBuffers::new();
            device
                .assemble(WhatToLoad::MatrixAndRhs, TimeMode::Dc, &mut out)
                .unwrap();
            black_box(out);
        });
    });
}

/// Benchmark: an extended-precision device narrowed into double buffers.
fn bench_holder_narrowing(c: &mut Criterion) {
    let mut holder = DeviceHolder::from(drift_diffusion_profile::<Extended>(NODES));
    holder.load_permutations().unwrap();
    c.bench_function("holder_extended_to_f64_20k", |b| {
        b.iter(|| {
            let mut out = AssemblyBuffers::<f64>::new();
            holder
                .assemble(WhatToLoad::MatrixAndRhs, TimeMode::Dc, &mut out)
                .unwrap();
            black_box(out);
        });
    });
}

criterion_group!(
    benches,
    bench_dc_cycle,
    bench_update_and_assemble,
    bench_holder_narrowing
);
criterion_main!(benches);
