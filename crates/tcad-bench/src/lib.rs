//! Benchmark profiles for the tcad engine.
//!
//! - [`drift_diffusion_profile`]: a long 1-D region solving a nonlinear
//!   carrier equation with expression-backed fluxes and derivatives
//! - [`linear_xs`]: evenly spaced node coordinates

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use tcad_core::{AssemblyConfig, DomainKind, Precision};
use tcad_equation::{BulkEquation, ContactEquation, Device, UpdatePolicy};
use tcad_expr::{declare_expression, Expr};
use tcad_test_utils::{line_topology, write_line_measures};

/// `nodes` coordinates from 0 to 1.
pub fn linear_xs(nodes: usize) -> Vec<f64> {
    let last = nodes.saturating_sub(1).max(1) as f64;
    (0..nodes).map(|i| i as f64 / last).collect()
}

/// One region of `nodes` nodes solving `n` with a Bernoulli-weighted
/// flux and an ohmic contact at each end.
///
/// The flux is `B(psi@n1 - psi@n0) * n@n1 - B(psi@n0 - psi@n1) * n@n0`
/// with `psi = x`, so every pass evaluates two function calls per edge.
pub fn drift_diffusion_profile<T: Precision>(nodes: usize) -> Device<T> {
    let mut d = Device::new("bench", AssemblyConfig::default()).expect("default config is valid");
    let r = d
        .add_region("bulk", line_topology(&linear_xs(nodes)))
        .expect("fresh device");
    write_line_measures(r);
    d.add_equation(
        "bulk",
        BulkEquation::new("Electron", "n")
            .with_edge_model("Jn")
            .with_node_model("R")
            .with_time_node_model("n")
            .with_update(UpdatePolicy::Positive),
    )
    .expect("fresh equation");
    d.add_contact("left", "bulk", vec![0]).expect("node in range");
    d.add_contact("right", "bulk", vec![nodes - 1]).expect("node in range");
    for contact in ["left", "right"] {
        d.add_contact_equation(
            ContactEquation::new("Electron", contact).with_node_model("nfix"),
        )
        .expect("contact exists");
    }

    let r = d.region_mut("bulk").expect("region exists");
    r.set_uniform(DomainKind::Node, "n", T::one());
    declare_expression(r, DomainKind::Node, "psi", Expr::model("x"));
    declare_expression(r, DomainKind::Node, "nfix", Expr::model("n") - Expr::constant(1.0));
    declare_expression(
        r,
        DomainKind::Node,
        "R",
        (Expr::model("n") - Expr::constant(1.0)) * Expr::constant(-1.0e-3),
    );
    declare_expression(r, DomainKind::Node, "R:n", Expr::constant(-1.0e-3));
    let vdiff = Expr::model("psi@n1") - Expr::model("psi@n0");
    let forward = Expr::call("B", vec![vdiff.clone()]);
    let backward = Expr::call("B", vec![-vdiff]);
    declare_expression(
        r,
        DomainKind::Edge,
        "Jn",
        forward.clone() * Expr::model("n@n1") - backward.clone() * Expr::model("n@n0"),
    );
    declare_expression(r, DomainKind::Edge, "Jn:n@n1", forward);
    declare_expression(r, DomainKind::Edge, "Jn:n@n0", -backward);
    d
}
