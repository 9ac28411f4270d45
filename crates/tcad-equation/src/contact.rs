//! Contact equations.
//!
//! A contact equation replaces the bulk equation of the same name at the
//! contact's nodes. The permutation pass drops those bulk rows; the DC
//! pass then fills them with the contact's own node, edge and element
//! terms. With a circuit node, the contact's current (DC) and charge
//! (time) are also summed into the circuit node's row.
//!
//! A node shared by two contacts belongs to the one added first.

use tcad_core::{
    AssemblyBuffers, AssemblyConfig, AssemblyError, Diagnostics, DomainKind, PermutationEntry,
    PermutationMap, Precision, Scope, Severity, TimeMode, WhatToLoad,
};
use tcad_mesh::Contact;
use tcad_model::Region;
use tracing::debug;

use crate::assemble::{is_set, volume_split, Assembler, CircuitColumn, Flux, Rows};
use crate::circuit::CircuitNodes;
use crate::command::{block, Command};

/// Model slots of a contact equation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContactModels {
    /// Node model assembled at contact nodes.
    pub node_model: Option<String>,
    /// Edge flux assembled at contact nodes.
    pub edge_model: Option<String>,
    /// Edge volume model assembled at contact nodes.
    pub edge_volume_model: Option<String>,
    /// Element-edge flux assembled at contact nodes.
    pub element_model: Option<String>,
    /// Element-edge volume model of the first edge end.
    pub volume_node0_model: Option<String>,
    /// Element-edge volume model of the second edge end.
    pub volume_node1_model: Option<String>,
    /// Node current into the circuit.
    pub node_current_model: Option<String>,
    /// Edge current into the circuit.
    pub edge_current_model: Option<String>,
    /// Element-edge current into the circuit.
    pub element_current_model: Option<String>,
    /// Node charge into the circuit.
    pub node_charge_model: Option<String>,
    /// Edge charge into the circuit.
    pub edge_charge_model: Option<String>,
    /// Element-edge charge into the circuit.
    pub element_charge_model: Option<String>,
}

/// An equation assembled at the nodes of one contact.
#[derive(Clone, Debug)]
pub struct ContactEquation {
    name: String,
    contact: String,
    models: ContactModels,
    circuit_node: Option<String>,
    current: f64,
    charge: f64,
}

impl ContactEquation {
    /// Contact equation `name` on `contact`.
    ///
    /// `name` must be a bulk equation of the contact's region.
    pub fn new(name: impl Into<String>, contact: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contact: contact.into(),
            models: ContactModels::default(),
            circuit_node: None,
            current: 0.0,
            charge: 0.0,
        }
    }

    /// Replace every model slot.
    pub fn with_models(mut self, models: ContactModels) -> Self {
        self.models = models;
        self
    }

    /// Set the node model.
    pub fn with_node_model(mut self, model: impl Into<String>) -> Self {
        self.models.node_model = Some(model.into());
        self
    }

    /// Set the edge flux model.
    pub fn with_edge_model(mut self, model: impl Into<String>) -> Self {
        self.models.edge_model = Some(model.into());
        self
    }

    /// Set the node current model.
    pub fn with_node_current_model(mut self, model: impl Into<String>) -> Self {
        self.models.node_current_model = Some(model.into());
        self
    }

    /// Set the edge current model.
    pub fn with_edge_current_model(mut self, model: impl Into<String>) -> Self {
        self.models.edge_current_model = Some(model.into());
        self
    }

    /// Set the node charge model.
    pub fn with_node_charge_model(mut self, model: impl Into<String>) -> Self {
        self.models.node_charge_model = Some(model.into());
        self
    }

    /// Set the edge charge model.
    pub fn with_edge_charge_model(mut self, model: impl Into<String>) -> Self {
        self.models.edge_charge_model = Some(model.into());
        self
    }

    /// Route current and charge into circuit node `node`.
    pub fn with_circuit_node(mut self, node: impl Into<String>) -> Self {
        self.circuit_node = Some(node.into());
        self
    }

    /// Equation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Contact name.
    pub fn contact(&self) -> &str {
        &self.contact
    }

    /// Model slots.
    pub fn models(&self) -> &ContactModels {
        &self.models
    }

    /// Circuit node, if coupled.
    pub fn circuit_node(&self) -> Option<&str> {
        self.circuit_node.as_deref()
    }

    /// Current from the last [`integrate`](Self::integrate).
    pub fn current(&self) -> f64 {
        self.current
    }

    /// Charge from the last [`integrate`](Self::integrate).
    pub fn charge(&self) -> f64 {
        self.charge
    }

    fn scope(&self, region: &Region<impl Precision>) -> Scope {
        Scope::device(region.device())
            .region(region.name())
            .contact(&self.contact)
            .equation(&self.name)
    }

    fn circuit_row(
        &self,
        circuit: &CircuitNodes,
        scope: &Scope,
        diagnostics: &mut Diagnostics,
    ) -> Result<Option<usize>, AssemblyError> {
        let Some(node) = self.circuit_node.as_deref() else {
            return Ok(None);
        };
        match circuit.row(node) {
            Some(row) => Ok(Some(row)),
            None => {
                diagnostics.write_out(
                    Severity::Fatal,
                    scope,
                    format!("circuit node \"{node}\" does not exist"),
                );
                Err(AssemblyError::MissingCircuitNode {
                    scope: scope.clone(),
                    node: node.to_string(),
                })
            }
        }
    }

    /// Append this equation's permutations or contributions.
    ///
    /// `active` marks the contact nodes this equation owns.
    #[allow(clippy::too_many_arguments)]
    pub fn assemble<T: Precision>(
        &self,
        region: &mut Region<T>,
        active: &[bool],
        circuit: &CircuitNodes,
        permutation: &mut PermutationMap,
        config: &AssemblyConfig,
        diagnostics: &mut Diagnostics,
        what: WhatToLoad,
        time: TimeMode,
        out: &mut AssemblyBuffers<T>,
    ) -> Result<(), AssemblyError> {
        let scope = self.scope(region);
        let Some(start) = region.equation_number(&self.name, 0) else {
            diagnostics.write_out(
                Severity::Fatal,
                &scope,
                format!("equation \"{}\" has no index in the region", self.name),
            );
            return Err(AssemblyError::MissingEquationIndex {
                scope,
                equation: self.name.clone(),
            });
        };

        if what.is_permutation_only() {
            for node in (0..active.len()).filter(|&n| active[n]) {
                permutation.insert(start + node, PermutationEntry::dropped())?;
            }
            return Ok(());
        }

        let circuit_row = self.circuit_row(circuit, &scope, diagnostics)?;
        let column = match (self.circuit_node.as_deref(), circuit_row) {
            (Some(name), Some(col)) => Some(CircuitColumn { name, col }),
            _ => None,
        };
        let element_kind = region.topology().element_edge_kind();
        let measures = &config.measures;
        let m = &self.models;
        let rows = Rows::Nodes { start, active };
        let mut asm = Assembler::new(region, scope, config, diagnostics);

        match time {
            TimeMode::Dc => {
                if let Some(model) = m.node_model.as_deref() {
                    asm.node_term(model, rows, column, what, out)?;
                }
                if let Some(model) = m.edge_model.as_deref() {
                    let flux = edge_flux(model, &measures.edge_couple);
                    asm.flux_term(&flux, rows, column, what, out)?;
                }
                if let Some(model) = m.edge_volume_model.as_deref() {
                    for flux in volume_split(
                        DomainKind::Edge,
                        [Some(model), Some(model)],
                        [&measures.edge_node0_volume, &measures.edge_node1_volume],
                    ) {
                        asm.flux_term(&flux, rows, column, what, out)?;
                    }
                }
                if let Some(kind) = element_kind {
                    if let Some(model) = m.element_model.as_deref() {
                        let flux = element_flux(model, kind, &measures.element_edge_couple);
                        asm.flux_term(&flux, rows, column, what, out)?;
                    }
                    for flux in volume_split(
                        kind,
                        [m.volume_node0_model.as_deref(), m.volume_node1_model.as_deref()],
                        [&measures.element_node0_volume, &measures.element_node1_volume],
                    ) {
                        asm.flux_term(&flux, rows, column, what, out)?;
                    }
                }
                if let Some(c) = column {
                    let on_circuit = Rows::Single { row: c.col, active };
                    let node = m.node_current_model.as_deref();
                    let edge = m.edge_current_model.as_deref();
                    let element = m.element_current_model.as_deref();
                    into_circuit(&mut asm, [node, edge, element], element_kind, on_circuit, c, what, out)?;
                }
            }
            TimeMode::Time => {
                if let Some(c) = column {
                    let on_circuit = Rows::Single { row: c.col, active };
                    let node = m.node_charge_model.as_deref();
                    let edge = m.edge_charge_model.as_deref();
                    let element = m.element_charge_model.as_deref();
                    into_circuit(&mut asm, [node, edge, element], element_kind, on_circuit, c, what, out)?;
                }
            }
        }
        debug!(
            contact = %self.contact,
            equation = %self.name,
            ?time,
            "contact equation assembled"
        );
        Ok(())
    }

    /// Recompute the contact's current and charge over `active` nodes.
    pub fn integrate<T: Precision>(
        &mut self,
        region: &mut Region<T>,
        active: &[bool],
        config: &AssemblyConfig,
        diagnostics: &mut Diagnostics,
    ) -> Result<(f64, f64), AssemblyError> {
        let scope = self.scope(region);
        let element_kind = region.topology().element_edge_kind();
        let measures = &config.measures;
        let m = &self.models;
        let mut asm = Assembler::new(region, scope, config, diagnostics);
        let current = integrate_slots(
            &mut asm,
            [
                m.node_current_model.as_deref(),
                m.edge_current_model.as_deref(),
                m.element_current_model.as_deref(),
            ],
            element_kind,
            &measures.edge_couple,
            &measures.element_edge_couple,
            active,
        )?;
        let charge = integrate_slots(
            &mut asm,
            [
                m.node_charge_model.as_deref(),
                m.edge_charge_model.as_deref(),
                m.element_charge_model.as_deref(),
            ],
            element_kind,
            &measures.edge_couple,
            &measures.element_edge_couple,
            active,
        )?;
        self.current = current.widen();
        self.charge = charge.widen();
        Ok((self.current, self.charge))
    }

    /// The command recreating this equation.
    pub fn command(&self, device: &str) -> Command {
        let m = &self.models;
        Command::new("contact_equation")
            .option("device", device)
            .option("contact", &self.contact)
            .option("name", &self.name)
            .slot("edge_charge_model", m.edge_charge_model.as_deref())
            .slot("edge_current_model", m.edge_current_model.as_deref())
            .slot("edge_model", m.edge_model.as_deref())
            .slot("edge_volume_model", m.edge_volume_model.as_deref())
            .slot("element_charge_model", m.element_charge_model.as_deref())
            .slot("element_current_model", m.element_current_model.as_deref())
            .slot("element_model", m.element_model.as_deref())
            .slot("volume_node0_model", m.volume_node0_model.as_deref())
            .slot("volume_node1_model", m.volume_node1_model.as_deref())
            .slot("node_charge_model", m.node_charge_model.as_deref())
            .slot("node_current_model", m.node_current_model.as_deref())
            .slot("node_model", m.node_model.as_deref())
            .slot("circuit_node", self.circuit_node.as_deref())
    }

    /// `begin_contact_equation` block for this equation.
    pub fn serialize(&self, device: &str) -> String {
        block("contact_equation", &self.name, &self.command(device).to_string())
    }
}

fn edge_flux<'m>(model: &'m str, measure: &'m str) -> Flux<'m> {
    Flux {
        model,
        kind: DomainKind::Edge,
        measure,
        signs: [1.0, -1.0],
    }
}

fn element_flux<'m>(model: &'m str, kind: DomainKind, measure: &'m str) -> Flux<'m> {
    Flux {
        model,
        kind,
        measure,
        signs: [1.0, -1.0],
    }
}

/// Sum node, edge and element models of every active node into one row.
fn into_circuit<T: Precision>(
    asm: &mut Assembler<'_, T>,
    [node, edge, element]: [Option<&str>; 3],
    element_kind: Option<DomainKind>,
    rows: Rows<'_>,
    column: CircuitColumn<'_>,
    what: WhatToLoad,
    out: &mut AssemblyBuffers<T>,
) -> Result<(), AssemblyError> {
    let measures = asm.measures();
    if let Some(model) = node {
        asm.node_term(model, rows, Some(column), what, out)?;
    }
    if let Some(model) = edge {
        asm.flux_term(&edge_flux(model, &measures.edge_couple), rows, Some(column), what, out)?;
    }
    if let (Some(model), Some(kind)) = (element, element_kind) {
        let flux = element_flux(model, kind, &measures.element_edge_couple);
        asm.flux_term(&flux, rows, Some(column), what, out)?;
    }
    Ok(())
}

fn integrate_slots<T: Precision>(
    asm: &mut Assembler<'_, T>,
    [node, edge, element]: [Option<&str>; 3],
    element_kind: Option<DomainKind>,
    edge_couple: &str,
    element_couple: &str,
    active: &[bool],
) -> Result<T, AssemblyError> {
    let mut total = T::zero();
    if let Some(model) = node {
        total += asm.integrate_node(model, active)?;
    }
    if let Some(model) = edge {
        total += asm.integrate_flux(&edge_flux(model, edge_couple), active)?;
    }
    if let (Some(model), Some(kind)) = (element, element_kind) {
        total += asm.integrate_flux(&element_flux(model, kind, element_couple), active)?;
    }
    Ok(total)
}

/// Nodes of `contact` not already owned by an earlier contact.
///
/// `claimed` lists the earlier contacts of the same region that carry a
/// contact equation of the same name.
pub fn active_nodes<'c>(
    node_count: usize,
    contact: &Contact,
    claimed: impl IntoIterator<Item = &'c Contact>,
) -> Vec<bool> {
    let mut active = vec![false; node_count];
    for &node in contact.nodes() {
        if node < node_count {
            active[node] = true;
        }
    }
    for earlier in claimed {
        for &node in earlier.nodes() {
            if is_set(&active, node) {
                active[node] = false;
            }
        }
    }
    active
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tcad_mesh::Topology;

    fn region() -> Region<f64> {
        let topo = Topology::line(&[0.0, 1.0, 2.0]).unwrap();
        let mut r = Region::new("d", "r", Arc::new(topo));
        r.set_uniform(DomainKind::Node, "NodeVolume", 0.5);
        r.set_uniform(DomainKind::Edge, "EdgeCouple", 1.0);
        r.add_equation("Poisson", "psi");
        r.add_contact(Contact::new("top", "r", vec![0], 3).unwrap());
        r
    }

    fn run(
        eq: &ContactEquation,
        r: &mut Region<f64>,
        circuit: &CircuitNodes,
        what: WhatToLoad,
        time: TimeMode,
    ) -> Result<(AssemblyBuffers<f64>, PermutationMap), AssemblyError> {
        let mut out = AssemblyBuffers::new();
        let mut perm = PermutationMap::new();
        let mut log = Diagnostics::new();
        let active = [true, false, false];
        eq.assemble(
            r,
            &active,
            circuit,
            &mut perm,
            &AssemblyConfig::default(),
            &mut log,
            what,
            time,
            &mut out,
        )?;
        Ok((out, perm))
    }

    #[test]
    fn permutation_pass_drops_contact_rows() {
        let mut r = region();
        let eq = ContactEquation::new("Poisson", "top").with_node_model("bc");
        let (out, perm) = run(&eq, &mut r, &CircuitNodes::new(), WhatToLoad::PermutationOnly, TimeMode::Dc).unwrap();
        assert!(out.is_empty());
        assert_eq!(perm.len(), 1);
        assert_eq!(perm.get(0), Some(&PermutationEntry::dropped()));
    }

    #[test]
    fn node_model_fills_only_contact_rows() {
        let mut r = region();
        r.set_values(DomainKind::Node, "bc", vec![2.0, 4.0, 6.0]).unwrap();
        let eq = ContactEquation::new("Poisson", "top").with_node_model("bc");
        let (out, _) = run(&eq, &mut r, &CircuitNodes::new(), WhatToLoad::Rhs, TimeMode::Dc).unwrap();
        assert_eq!(out.rhs.len(), 1);
        assert_eq!(out.rhs_by_row().get(&0), Some(&1.0));
    }

    #[test]
    fn current_is_routed_to_circuit_row() {
        let mut r = region();
        r.set_values(DomainKind::Edge, "J", vec![3.0, 5.0]).unwrap();
        r.set_uniform(DomainKind::Edge, "J:V1", 1.0);
        let mut circuit = CircuitNodes::new();
        circuit.add("V1", 0.0);
        circuit.set_base(3);
        let eq = ContactEquation::new("Poisson", "top")
            .with_edge_current_model("J")
            .with_circuit_node("V1");
        let (out, _) = run(&eq, &mut r, &circuit, WhatToLoad::MatrixAndRhs, TimeMode::Dc).unwrap();
        assert_eq!(out.rhs_by_row().get(&3), Some(&3.0));
        assert_eq!(out.matrix_by_entry().get(&(3, 3)), Some(&1.0));
    }

    #[test]
    fn unknown_circuit_node_is_fatal() {
        let mut r = region();
        let eq = ContactEquation::new("Poisson", "top").with_circuit_node("V9");
        match run(&eq, &mut r, &CircuitNodes::new(), WhatToLoad::Rhs, TimeMode::Dc) {
            Err(AssemblyError::MissingCircuitNode { node, scope }) => {
                assert_eq!(node, "V9");
                assert_eq!(scope.contact.as_deref(), Some("top"));
            }
            other => panic!("expected MissingCircuitNode, got {other:?}"),
        }
    }

    #[test]
    fn integrated_current_counts_outgoing_flux() {
        let mut r = region();
        r.set_values(DomainKind::Edge, "J", vec![3.0, 5.0]).unwrap();
        r.set_uniform(DomainKind::Node, "Q", 2.0);
        let mut eq = ContactEquation::new("Poisson", "top")
            .with_edge_current_model("J")
            .with_node_charge_model("Q");
        let mut log = Diagnostics::new();
        let (current, charge) = eq
            .integrate(&mut r, &[true, false, false], &AssemblyConfig::default(), &mut log)
            .unwrap();
        assert_eq!(current, 3.0);
        assert_eq!(charge, 1.0);
        assert_eq!(eq.current(), 3.0);
    }

    #[test]
    fn earlier_contacts_claim_shared_nodes() {
        let a = Contact::new("a", "r", vec![0, 1], 4).unwrap();
        let b = Contact::new("b", "r", vec![1, 2], 4).unwrap();
        assert_eq!(active_nodes(4, &b, [&a]), vec![false, false, true, false]);
        assert_eq!(active_nodes(4, &b, Vec::<&Contact>::new()), vec![false, true, true, false]);
    }

    #[test]
    fn command_keys_are_stable() {
        let eq = ContactEquation::new("Poisson", "top").with_circuit_node("V1");
        let c = eq.command("d");
        assert_eq!(c.name(), "contact_equation");
        assert_eq!(c.options().len(), 16);
        assert_eq!(c.get("circuit_node"), Some("V1"));
        assert_eq!(c.get("node_model"), Some(""));
    }
}
