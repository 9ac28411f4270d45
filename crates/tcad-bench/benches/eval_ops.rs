//! Criterion benchmarks for expression evaluation and invalidation.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use tcad_core::DomainKind;
use tcad_model::Region;
use tcad_test_utils::line_topology;
use tcad_bench::linear_xs;
use tcad_expr::{declare_expression, Expr};

const NODES: usize = 50_000;

fn region() -> Region<f64> {
    let mut r = Region::new("bench", "bulk", line_topology(&linear_xs(NODES)));
    let vdiff = Expr::model("x@n1") - Expr::model("x@n0");
    declare_expression(
        &mut r,
        DomainKind::Edge,
        "flux",
        Expr::call("B", vec![vdiff.clone()]) * Expr::call("exp", vec![vdiff]),
    );
    r
}

/// Benchmark: a full re-evaluation after the coordinates change.
fn bench_reevaluate_after_write(c: &mut Criterion) {
    let mut r = region();
    let xs = linear_xs(NODES);
    c.bench_function("edge_flux_reevaluate_50k", |b| {
        b.iter(|| {
            r.set_values(DomainKind::Node, "x", xs.clone()).unwrap();
            black_box(r.values(DomainKind::Edge, "flux").unwrap());
        });
    });
}

/// Benchmark: reading an up-to-date model (cache hit).
fn bench_cached_read(c: &mut Criterion) {
    let mut r = region();
    r.values(DomainKind::Edge, "flux").unwrap();
    c.bench_function("edge_flux_cached_50k", |b| {
        b.iter(|| black_box(r.values(DomainKind::Edge, "flux").unwrap()));
    });
}

criterion_group!(benches, bench_reevaluate_after_write, bench_cached_read);
criterion_main!(benches);
