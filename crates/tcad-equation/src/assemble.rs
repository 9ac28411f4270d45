//! Integration of models into sparse contributions.
//!
//! A contribution is a model scaled by a geometric measure and scattered
//! to the rows of the nodes it touches. Node models land on their own
//! node. Edge and element-edge models land on both ends of the edge,
//! each end weighted by its sign; `(+1, -1)` makes a flux leave one node
//! exactly as much as it enters the other.
//!
//! Jacobian columns come from derivative models named
//! `<model>:<variable>` with a corner suffix (`@n0`, `@n1` on edges,
//! `@en0` .. `@en3` on element edges). Each derivative adds to every row
//! its entity touches, in the column of the corner it differentiates.

use std::sync::Arc;

use smallvec::SmallVec;
use tcad_core::{
    derivative_name, AssemblyBuffers, AssemblyConfig, AssemblyError, Diagnostics, DomainKind,
    MeasureModels, ModelError, NameSuffix, Precision, Scope, Severity, WhatToLoad,
};
use tcad_mesh::Topology;
use tcad_model::{ModelData, Region};

// ── Rows ───────────────────────────────────────────────────────────

/// Where the contribution of each node lands.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Rows<'n> {
    /// Row `start + node` for every node of the region.
    Block { start: usize },
    /// Row `start + node` for the nodes set in `active`.
    Nodes { start: usize, active: &'n [bool] },
    /// One shared row for the nodes set in `active`.
    Single { row: usize, active: &'n [bool] },
}

impl Rows<'_> {
    pub(crate) fn row(&self, node: usize) -> Option<usize> {
        match *self {
            Self::Block { start } => Some(start + node),
            Self::Nodes { start, active } => is_set(active, node).then_some(start + node),
            Self::Single { row, active } => is_set(active, node).then_some(row),
        }
    }
}

pub(crate) fn is_set(mask: &[bool], node: usize) -> bool {
    mask.get(node).copied().unwrap_or(false)
}

/// A circuit node whose value is an extra Jacobian column.
#[derive(Clone, Copy, Debug)]
pub(crate) struct CircuitColumn<'c> {
    pub name: &'c str,
    pub col: usize,
}

// ── Flux ───────────────────────────────────────────────────────────

/// An edge or element-edge model integrated with a measure.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Flux<'m> {
    pub model: &'m str,
    pub kind: DomainKind,
    pub measure: &'m str,
    pub signs: [f64; 2],
}

/// The sign pairs of a volume-split term.
///
/// When both halves use the same model and the same measure one pass
/// with `(+1, +1)` suffices; otherwise each half goes to its own end.
pub(crate) fn volume_split<'m>(
    kind: DomainKind,
    models: [Option<&'m str>; 2],
    measures: [&'m str; 2],
) -> SmallVec<[Flux<'m>; 2]> {
    let mut out = SmallVec::new();
    if let [Some(m0), Some(m1)] = models {
        if m0 == m1 && measures[0] == measures[1] {
            out.push(Flux {
                model: m0,
                kind,
                measure: measures[0],
                signs: [1.0, 1.0],
            });
            return out;
        }
    }
    for (end, model) in models.into_iter().enumerate() {
        if let Some(model) = model {
            let mut signs = [0.0; 2];
            signs[end] = 1.0;
            out.push(Flux {
                model,
                kind,
                measure: measures[end],
                signs,
            });
        }
    }
    out
}

// ── Stencil ────────────────────────────────────────────────────────

/// Corner nodes of every entity of an edge or element-edge domain.
///
/// Corners `0` and `1` are the two ends; element edges list the
/// remaining element corners after them.
#[derive(Clone, Debug)]
pub(crate) struct Stencil {
    kind: DomainKind,
    corners: Vec<SmallVec<[usize; 4]>>,
}

impl Stencil {
    pub(crate) fn new(topology: &Topology, kind: DomainKind) -> Option<Self> {
        let corners = match kind {
            DomainKind::Node => return None,
            DomainKind::Edge => topology
                .edges()
                .iter()
                .map(|e| SmallVec::from_slice(&e.nodes))
                .collect(),
            DomainKind::TriangleEdge | DomainKind::TetrahedronEdge => (0..topology
                .domain_len(kind))
                .filter_map(|i| topology.element_edge(kind, i))
                .map(|ee| ee.corners)
                .collect(),
        };
        Some(Self { kind, corners })
    }

    pub(crate) fn len(&self) -> usize {
        self.corners.len()
    }

    pub(crate) fn corner(&self, entity: usize, corner: usize) -> usize {
        self.corners[entity][corner]
    }

    pub(crate) fn corner_count(&self) -> usize {
        self.kind.corners_per_element_edge()
    }

    pub(crate) fn suffix(&self, corner: usize) -> NameSuffix {
        if self.kind == DomainKind::Edge {
            NameSuffix::EdgeEnd(corner)
        } else {
            NameSuffix::ElementCorner(corner)
        }
    }
}

// ── Assembler ──────────────────────────────────────────────────────

/// One region borrowed for one equation's assembly.
pub(crate) struct Assembler<'a, T: Precision> {
    region: &'a mut Region<T>,
    scope: Scope,
    config: &'a AssemblyConfig,
    diagnostics: &'a mut Diagnostics,
}

impl<'a, T: Precision> Assembler<'a, T> {
    pub(crate) fn new(
        region: &'a mut Region<T>,
        scope: Scope,
        config: &'a AssemblyConfig,
        diagnostics: &'a mut Diagnostics,
    ) -> Self {
        Self {
            region,
            scope,
            config,
            diagnostics,
        }
    }

    pub(crate) fn measures(&self) -> &'a MeasureModels {
        &self.config.measures
    }

    /// Values of a model the equation depends on.
    ///
    /// Absence is reported at the configured severity; below fatal the
    /// contribution is skipped.
    pub(crate) fn required(
        &mut self,
        kind: DomainKind,
        name: &str,
    ) -> Result<Option<Arc<ModelData<T>>>, AssemblyError> {
        if self.region.models().contains(kind, name) {
            return self.fetch(kind, name).map(Some);
        }
        self.missing(kind, name, self.config.missing_model_severity)?;
        Ok(None)
    }

    /// Values of a derivative model, or `None` when it was never declared.
    pub(crate) fn optional(
        &mut self,
        kind: DomainKind,
        name: &str,
    ) -> Result<Option<Arc<ModelData<T>>>, AssemblyError> {
        if self.region.models().contains(kind, name) {
            return self.fetch(kind, name).map(Some);
        }
        Ok(None)
    }

    fn fetch(&mut self, kind: DomainKind, name: &str) -> Result<Arc<ModelData<T>>, AssemblyError> {
        let values = self.region.values(kind, name);
        for note in self.region.take_evaluation_notes() {
            self.diagnostics
                .write_out(Severity::Error, &self.scope, note.to_string());
        }
        values.map_err(|source| AssemblyError::Model {
            scope: self.scope.clone(),
            source,
        })
    }

    pub(crate) fn note(&mut self, severity: Severity, message: impl Into<String>) {
        self.diagnostics.write_out(severity, &self.scope, message);
    }

    pub(crate) fn missing(
        &mut self,
        kind: DomainKind,
        name: &str,
        severity: Severity,
    ) -> Result<(), AssemblyError> {
        self.diagnostics.write_out(
            severity,
            &self.scope,
            format!("missing {kind} model \"{name}\""),
        );
        if severity >= Severity::Fatal {
            return Err(AssemblyError::MissingEquationModel {
                scope: self.scope.clone(),
                model: name.to_string(),
                kind,
            });
        }
        Ok(())
    }

    /// First row of the equation solving for `variable`.
    fn variable_start(&mut self, variable: &str) -> Result<usize, AssemblyError> {
        let start = self
            .region
            .equation_for_variable(variable)
            .and_then(|eq| self.region.equation_number(eq, 0));
        match start {
            Some(start) => Ok(start),
            None => {
                self.diagnostics.write_out(
                    Severity::Fatal,
                    &self.scope,
                    format!("no equation solves for variable \"{variable}\""),
                );
                Err(AssemblyError::MissingEquationIndex {
                    scope: self.scope.clone(),
                    equation: variable.to_string(),
                })
            }
        }
    }

    /// `measure * values`, elementwise.
    fn weighted(
        &self,
        measure: &ModelData<T>,
        values: &ModelData<T>,
        name: &str,
    ) -> Result<Vec<T>, AssemblyError> {
        let mut out = measure.clone();
        out.times_equal(values, &self.config.kernel)
            .map_err(|e| AssemblyError::Model {
                scope: self.scope.clone(),
                source: ModelError::LengthMismatch {
                    name: name.to_string(),
                    expected: e.left,
                    actual: e.right,
                },
            })?;
        Ok(out.to_vec())
    }

    // ── Node terms ─────────────────────────────────────────────────

    /// Integrate node model `model` over node volumes.
    pub(crate) fn node_term(
        &mut self,
        model: &str,
        rows: Rows<'_>,
        circuit: Option<CircuitColumn<'_>>,
        what: WhatToLoad,
        out: &mut AssemblyBuffers<T>,
    ) -> Result<(), AssemblyError> {
        let measure = self.config.measures.node_volume.clone();
        let Some(volume) = self.required(DomainKind::Node, &measure)? else {
            return Ok(());
        };

        if what.loads_rhs() {
            if let Some(values) = self.required(DomainKind::Node, model)? {
                let w = self.weighted(&volume, &values, model)?;
                for (node, v) in w.into_iter().enumerate() {
                    if let Some(row) = rows.row(node) {
                        out.push_rhs(row, v);
                    }
                }
            }
        }

        if what.loads_matrix() {
            for variable in self.region.variables() {
                let name = derivative_name(model, &variable);
                let Some(d) = self.optional(DomainKind::Node, &name)? else {
                    self.missing(DomainKind::Node, &name, Severity::Verbose)?;
                    continue;
                };
                let start = self.variable_start(&variable)?;
                let w = self.weighted(&volume, &d, &name)?;
                for (node, v) in w.into_iter().enumerate() {
                    if let Some(row) = rows.row(node) {
                        out.push_matrix(row, start + node, v);
                    }
                }
            }
            if let Some(c) = circuit {
                let name = derivative_name(model, c.name);
                if let Some(d) = self.optional(DomainKind::Node, &name)? {
                    let w = self.weighted(&volume, &d, &name)?;
                    for (node, v) in w.into_iter().enumerate() {
                        if let Some(row) = rows.row(node) {
                            out.push_matrix(row, c.col, v);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    // ── Flux terms ─────────────────────────────────────────────────

    /// Integrate an edge or element-edge model and scatter it to both ends.
    pub(crate) fn flux_term(
        &mut self,
        flux: &Flux<'_>,
        rows: Rows<'_>,
        circuit: Option<CircuitColumn<'_>>,
        what: WhatToLoad,
        out: &mut AssemblyBuffers<T>,
    ) -> Result<(), AssemblyError> {
        let Some(stencil) = Stencil::new(self.region.topology(), flux.kind) else {
            return Ok(());
        };
        let Some(measure) = self.required(flux.kind, flux.measure)? else {
            return Ok(());
        };
        let signs = flux.signs.map(T::narrow);

        if what.loads_rhs() {
            if let Some(values) = self.required(flux.kind, flux.model)? {
                let w = self.weighted(&measure, &values, flux.model)?;
                scatter(&stencil, &signs, &w, rows, |row, _, v| out.push_rhs(row, v));
            }
        }

        if what.loads_matrix() {
            for variable in self.region.variables() {
                let base = derivative_name(flux.model, &variable);
                let mut derivatives: SmallVec<[(String, Option<Arc<ModelData<T>>>); 4]> =
                    SmallVec::new();
                for corner in 0..stencil.corner_count() {
                    let name = stencil.suffix(corner).apply(&base);
                    let data = self.optional(flux.kind, &name)?;
                    derivatives.push((name, data));
                }
                if derivatives.iter().all(|(_, d)| d.is_none()) {
                    self.missing(flux.kind, &base, Severity::Verbose)?;
                    continue;
                }
                for (name, d) in &derivatives {
                    if d.is_none() {
                        self.missing(flux.kind, name, self.config.missing_model_severity)?;
                    }
                }
                let start = self.variable_start(&variable)?;
                for (corner, (name, d)) in derivatives.iter().enumerate() {
                    let Some(d) = d else { continue };
                    let w = self.weighted(&measure, d, name)?;
                    scatter(&stencil, &signs, &w, rows, |row, entity, v| {
                        out.push_matrix(row, start + stencil.corner(entity, corner), v)
                    });
                }
            }
            if let Some(c) = circuit {
                let name = derivative_name(flux.model, c.name);
                match self.optional(flux.kind, &name)? {
                    Some(d) => {
                        let w = self.weighted(&measure, &d, &name)?;
                        scatter(&stencil, &signs, &w, rows, |row, _, v| {
                            out.push_matrix(row, c.col, v)
                        });
                    }
                    None => self.missing(flux.kind, &name, Severity::Verbose)?,
                }
            }
        }
        Ok(())
    }

    // ── Integrals ──────────────────────────────────────────────────

    /// Sum of `volume * model` over the nodes set in `active`.
    pub(crate) fn integrate_node(&mut self, model: &str, active: &[bool]) -> Result<T, AssemblyError> {
        let measure = self.config.measures.node_volume.clone();
        let Some(volume) = self.required(DomainKind::Node, &measure)? else {
            return Ok(T::zero());
        };
        let Some(values) = self.required(DomainKind::Node, model)? else {
            return Ok(T::zero());
        };
        let w = self.weighted(&volume, &values, model)?;
        Ok(w.into_iter()
            .enumerate()
            .filter(|(node, _)| is_set(active, *node))
            .fold(T::zero(), |acc, (_, v)| acc + v))
    }

    /// Signed flux through the nodes set in `active`.
    ///
    /// With opposite signs, an entity with both ends active carries no net
    /// flux out of the set and is skipped.
    pub(crate) fn integrate_flux(&mut self, flux: &Flux<'_>, active: &[bool]) -> Result<T, AssemblyError> {
        let Some(stencil) = Stencil::new(self.region.topology(), flux.kind) else {
            return Ok(T::zero());
        };
        let Some(measure) = self.required(flux.kind, flux.measure)? else {
            return Ok(T::zero());
        };
        let Some(values) = self.required(flux.kind, flux.model)? else {
            return Ok(T::zero());
        };
        let w = self.weighted(&measure, &values, flux.model)?;
        let signs = flux.signs.map(T::narrow);
        let antisymmetric = signs[0] == -signs[1];
        let mut total = T::zero();
        for (entity, v) in w.into_iter().enumerate().take(stencil.len()) {
            let ends = [stencil.corner(entity, 0), stencil.corner(entity, 1)];
            if antisymmetric && ends.iter().all(|&n| is_set(active, n)) {
                continue;
            }
            for (end, node) in ends.into_iter().enumerate() {
                if signs[end] != T::zero() && is_set(active, node) {
                    total += signs[end] * v;
                }
            }
        }
        Ok(total)
    }
}

/// Hand each signed end contribution of every entity to `push(row, entity, value)`.
fn scatter<T: Precision>(
    stencil: &Stencil,
    signs: &[T; 2],
    weighted: &[T],
    rows: Rows<'_>,
    mut push: impl FnMut(usize, usize, T),
) {
    for (entity, &v) in weighted.iter().enumerate().take(stencil.len()) {
        for (end, &sign) in signs.iter().enumerate() {
            if sign == T::zero() {
                continue;
            }
            if let Some(row) = rows.row(stencil.corner(entity, end)) {
                push(row, entity, sign * v);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_respect_masks() {
        let active = [false, true, true];
        assert_eq!(Rows::Block { start: 4 }.row(2), Some(6));
        assert_eq!(Rows::Nodes { start: 4, active: &active }.row(0), None);
        assert_eq!(Rows::Nodes { start: 4, active: &active }.row(1), Some(5));
        assert_eq!(Rows::Single { row: 9, active: &active }.row(2), Some(9));
        assert_eq!(Rows::Single { row: 9, active: &active }.row(7), None);
    }

    #[test]
    fn shared_volume_split_is_one_pass() {
        let fluxes = volume_split(DomainKind::Edge, [Some("q"), Some("q")], ["V", "V"]);
        assert_eq!(fluxes.len(), 1);
        assert_eq!(fluxes[0].signs, [1.0, 1.0]);

        let fluxes = volume_split(DomainKind::Edge, [Some("q"), Some("q")], ["V0", "V1"]);
        assert_eq!(fluxes.len(), 2);
        assert_eq!((fluxes[0].signs, fluxes[0].measure), ([1.0, 0.0], "V0"));
        assert_eq!((fluxes[1].signs, fluxes[1].measure), ([0.0, 1.0], "V1"));

        let fluxes = volume_split(DomainKind::TriangleEdge, [None, Some("q1")], ["V", "V"]);
        assert_eq!(fluxes.len(), 1);
        assert_eq!(fluxes[0].signs, [0.0, 1.0]);
    }

    #[test]
    fn triangle_stencil_lists_opposite_corner() {
        let topo = Topology::triangles(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            &[[0, 1, 2]],
        )
        .unwrap();
        let s = Stencil::new(&topo, DomainKind::TriangleEdge).unwrap();
        assert_eq!(s.len(), 3);
        assert_eq!(s.corner_count(), 3);
        for e in 0..3 {
            let mut c = [s.corner(e, 0), s.corner(e, 1), s.corner(e, 2)];
            c.sort_unstable();
            assert_eq!(c, [0, 1, 2]);
        }
        assert_eq!(s.suffix(2), NameSuffix::ElementCorner(2));
        assert!(Stencil::new(&topo, DomainKind::Node).is_none());
    }
}
