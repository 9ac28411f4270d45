//! Reusable mesh and device fixtures.
//!
//! - [`line_topology`] / [`line_region`]: a 1-D chain of nodes.
//! - [`triangle_topology`] / [`triangle_region`]: one right triangle.
//! - [`two_region_device`]: two 2-node lines meeting at an interface.
//!
//! Measure models are written under the default
//! [`MeasureModels`](tcad_core::MeasureModels) names.

use std::sync::Arc;

use tcad_core::{AssemblyConfig, Diagnostics, DomainKind, Precision, Severity};
use tcad_equation::Device;
use tcad_mesh::Topology;
use tcad_model::Region;

/// A 1-D topology through `xs`.
pub fn line_topology(xs: &[f64]) -> Arc<Topology> {
    Arc::new(Topology::line(xs).expect("line coordinates must be valid"))
}

/// Write unit measures on a 1-D region: half-cell node volumes, edge
/// couple 1 and edge node volume 0.5.
pub fn write_line_measures<T: Precision>(region: &mut Region<T>) {
    let n = region.node_count();
    let mut volume = vec![T::one(); n];
    if n > 1 {
        volume[0] = T::narrow(0.5);
        volume[n - 1] = T::narrow(0.5);
    }
    region
        .set_values(DomainKind::Node, "NodeVolume", volume)
        .expect("node volume length matches");
    region.set_uniform(DomainKind::Edge, "EdgeCouple", T::one());
    region.set_uniform(DomainKind::Edge, "EdgeNodeVolume", T::narrow(0.5));
    region.set_uniform(DomainKind::Node, "SurfaceArea", T::one());
}

/// A standalone 1-D region on device `dev` with measures written.
pub fn line_region(name: &str, xs: &[f64]) -> Region<f64> {
    let mut r = Region::new("dev", name, line_topology(xs));
    write_line_measures(&mut r);
    r
}

/// One right triangle with legs along `x` and `y`.
pub fn triangle_topology() -> Arc<Topology> {
    Arc::new(
        Topology::triangles(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            &[[0, 1, 2]],
        )
        .expect("triangle must be valid"),
    )
}

/// A standalone triangle region with every measure model set to one.
pub fn triangle_region(name: &str) -> Region<f64> {
    let mut r = Region::new("dev", name, triangle_topology());
    for (kind, model) in [
        (DomainKind::Node, "NodeVolume"),
        (DomainKind::Edge, "EdgeCouple"),
        (DomainKind::Edge, "EdgeNodeVolume"),
        (DomainKind::TriangleEdge, "ElementEdgeCouple"),
        (DomainKind::TriangleEdge, "ElementNodeVolume"),
    ] {
        r.set_uniform(kind, model, 1.0);
    }
    r
}

/// Device `dev` with regions `left` (x = 0, 1) and `right` (x = 1, 2)
/// joined by interface `mid` at left node 1 / right node 0.
///
/// No equations are registered.
pub fn two_region_device<T: Precision>() -> Device<T> {
    let mut device = Device::new("dev", AssemblyConfig::default()).expect("default config is valid");
    for (name, xs) in [("left", [0.0, 1.0]), ("right", [1.0, 2.0])] {
        let region = device
            .add_region(name, line_topology(&xs))
            .expect("region names are distinct");
        write_line_measures(region);
    }
    device
        .add_interface("mid", "left", "right", &[(1, 0)])
        .expect("interface nodes are in range");
    device
}

/// Messages of every record at exactly `severity`.
pub fn messages_at(diagnostics: &Diagnostics, severity: Severity) -> Vec<String> {
    diagnostics
        .records()
        .iter()
        .filter(|d| d.severity == severity)
        .map(|d| d.message.clone())
        .collect()
}
