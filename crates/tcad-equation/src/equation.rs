//! Bulk equations: one row per node of a region.

use tcad_core::{
    AssemblyBuffers, AssemblyConfig, AssemblyError, Diagnostics, DomainKind, Precision, Scope,
    Severity, TimeMode, UpdateConfig, UpdateError, WhatToLoad,
};
use tcad_model::Region;
use tracing::debug;

use crate::assemble::{volume_split, Assembler, Flux, Rows};
use crate::command::{block, Command};
use crate::update::{apply_update, UpdatePolicy, UpdateStats};

/// Model slots of a bulk equation. Unset slots contribute nothing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EquationModels {
    /// Node model integrated over node volumes (DC).
    pub node_model: Option<String>,
    /// Edge flux integrated over edge couples with signs `(+1, -1)`.
    pub edge_model: Option<String>,
    /// Edge model integrated over each end's share of the node volume.
    pub edge_volume_model: Option<String>,
    /// Element-edge flux integrated over element-edge couples.
    pub element_model: Option<String>,
    /// Element-edge model integrated over the first end's volume share.
    pub volume_node0_model: Option<String>,
    /// Element-edge model integrated over the second end's volume share.
    pub volume_node1_model: Option<String>,
    /// Node model integrated over node volumes in the time pass.
    pub time_node_model: Option<String>,
}

/// An equation assembled at every node of one region.
#[derive(Clone, Debug)]
pub struct BulkEquation {
    name: String,
    variable: String,
    models: EquationModels,
    update: UpdatePolicy,
    last: UpdateStats,
}

impl BulkEquation {
    /// Equation `name` solving for node model `variable`.
    pub fn new(name: impl Into<String>, variable: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variable: variable.into(),
            models: EquationModels::default(),
            update: UpdatePolicy::Default,
            last: UpdateStats::default(),
        }
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

    /// Set the edge volume model.
    pub fn with_edge_volume_model(mut self, model: impl Into<String>) -> Self {
        self.models.edge_volume_model = Some(model.into());
        self
    }

    /// Set the element-edge flux model.
    pub fn with_element_model(mut self, model: impl Into<String>) -> Self {
        self.models.element_model = Some(model.into());
        self
    }

    /// Set the element-edge volume model of the first edge end.
    pub fn with_volume_node0_model(mut self, model: impl Into<String>) -> Self {
        self.models.volume_node0_model = Some(model.into());
        self
    }

    /// Set the element-edge volume model of the second edge end.
    pub fn with_volume_node1_model(mut self, model: impl Into<String>) -> Self {
        self.models.volume_node1_model = Some(model.into());
        self
    }

    /// Set the time-pass node model.
    pub fn with_time_node_model(mut self, model: impl Into<String>) -> Self {
        self.models.time_node_model = Some(model.into());
        self
    }

    /// Set the update policy.
    pub fn with_update(mut self, policy: UpdatePolicy) -> Self {
        self.update = policy;
        self
    }

    /// Equation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Solution variable.
    pub fn variable(&self) -> &str {
        &self.variable
    }

    /// Model slots.
    pub fn models(&self) -> &EquationModels {
        &self.models
    }

    /// Update policy.
    pub fn update_policy(&self) -> UpdatePolicy {
        self.update
    }

    /// Statistics of the last update.
    pub fn last_update(&self) -> UpdateStats {
        self.last
    }

    fn scope(&self, region: &Region<impl Precision>) -> Scope {
        Scope::device(region.device())
            .region(region.name())
            .equation(&self.name)
    }

    /// Append this equation's contributions in `region` to `out`.
    ///
    /// Bulk equations never permute rows; a permutation-only pass is a
    /// no-op.
    pub fn assemble<T: Precision>(
        &self,
        region: &mut Region<T>,
        config: &AssemblyConfig,
        diagnostics: &mut Diagnostics,
        what: WhatToLoad,
        time: TimeMode,
        out: &mut AssemblyBuffers<T>,
    ) -> Result<(), AssemblyError> {
        if what.is_permutation_only() {
            return Ok(());
        }
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
        let element_kind = region.topology().element_edge_kind();
        let rows = Rows::Block { start };
        let measures = &config.measures;
        let m = &self.models;
        let mut asm = Assembler::new(region, scope, config, diagnostics);

        match time {
            TimeMode::Dc => {
                if let Some(model) = m.edge_model.as_deref() {
                    let flux = Flux {
                        model,
                        kind: DomainKind::Edge,
                        measure: &measures.edge_couple,
                        signs: [1.0, -1.0],
                    };
                    asm.flux_term(&flux, rows, None, what, out)?;
                }
                if let Some(model) = m.edge_volume_model.as_deref() {
                    for flux in volume_split(
                        DomainKind::Edge,
                        [Some(model), Some(model)],
                        [&measures.edge_node0_volume, &measures.edge_node1_volume],
                    ) {
                        asm.flux_term(&flux, rows, None, what, out)?;
                    }
                }
                if let Some(model) = m.node_model.as_deref() {
                    asm.node_term(model, rows, None, what, out)?;
                }
                let has_element_terms = m.element_model.is_some()
                    || m.volume_node0_model.is_some()
                    || m.volume_node1_model.is_some();
                match element_kind {
                    Some(kind) => {
                        if let Some(model) = m.element_model.as_deref() {
                            let flux = Flux {
                                model,
                                kind,
                                measure: &measures.element_edge_couple,
                                signs: [1.0, -1.0],
                            };
                            asm.flux_term(&flux, rows, None, what, out)?;
                        }
                        for flux in volume_split(
                            kind,
                            [m.volume_node0_model.as_deref(), m.volume_node1_model.as_deref()],
                            [&measures.element_node0_volume, &measures.element_node1_volume],
                        ) {
                            asm.flux_term(&flux, rows, None, what, out)?;
                        }
                    }
                    None if has_element_terms => asm.note(
                        Severity::Warning,
                        "element models ignored in a region without elements",
                    ),
                    None => {}
                }
            }
            TimeMode::Time => {
                if let Some(model) = m.time_node_model.as_deref() {
                    asm.node_term(model, rows, None, what, out)?;
                }
            }
        }
        debug!(
            equation = %self.name,
            matrix = out.matrix.len(),
            rhs = out.rhs.len(),
            ?time,
            "bulk equation assembled"
        );
        Ok(())
    }

    /// Apply `updates` (one per node) to the variable in `region`.
    pub fn update<T: Precision>(
        &mut self,
        region: &mut Region<T>,
        updates: &[T],
        config: &UpdateConfig,
        diagnostics: &mut Diagnostics,
    ) -> Result<UpdateStats, UpdateError> {
        let scope = self.scope(region);
        let mut values = region.values(DomainKind::Node, &self.variable)?.to_vec();
        let stats = apply_update(
            self.update,
            &mut values,
            updates,
            config,
            &self.variable,
            &scope,
            diagnostics,
        )?;
        region.set_values(DomainKind::Node, &self.variable, values)?;
        self.last = stats;
        Ok(stats)
    }

    /// The command recreating this equation in `region`.
    pub fn command(&self, device: &str, region: &str) -> Command {
        let m = &self.models;
        Command::new("equation")
            .option("device", device)
            .option("region", region)
            .option("name", &self.name)
            .option("variable_name", &self.variable)
            .slot("node_model", m.node_model.as_deref())
            .slot("edge_model", m.edge_model.as_deref())
            .slot("edge_volume_model", m.edge_volume_model.as_deref())
            .slot("element_model", m.element_model.as_deref())
            .slot("volume_node0_model", m.volume_node0_model.as_deref())
            .slot("volume_node1_model", m.volume_node1_model.as_deref())
            .slot("time_node_model", m.time_node_model.as_deref())
            .option("variable_update", self.update.as_str())
    }

    /// `begin_equation` block for this equation.
    pub fn serialize(&self, device: &str, region: &str) -> String {
        block("equation", &self.name, &self.command(device, region).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tcad_mesh::Topology;

    fn line() -> Region<f64> {
        let topo = Topology::line(&[0.0, 1.0, 2.0]).unwrap();
        let mut r = Region::new("d", "r", Arc::new(topo));
        r.set_uniform(DomainKind::Node, "NodeVolume", 0.5);
        r.set_uniform(DomainKind::Edge, "EdgeCouple", 1.0);
        r.add_equation("Poisson", "psi");
        r
    }

    fn run(
        eq: &BulkEquation,
        region: &mut Region<f64>,
        what: WhatToLoad,
        time: TimeMode,
    ) -> (Result<AssemblyBuffers<f64>, AssemblyError>, Diagnostics) {
        let mut log = Diagnostics::new();
        let mut out = AssemblyBuffers::new();
        let r = eq
            .assemble(region, &AssemblyConfig::default(), &mut log, what, time, &mut out)
            .map(|()| out);
        (r, log)
    }

    #[test]
    fn node_model_lands_on_own_rows() {
        let mut r = line();
        r.set_values(DomainKind::Node, "rho", vec![1.0, 2.0, 3.0]).unwrap();
        r.set_uniform(DomainKind::Node, "rho:psi", 4.0);
        let eq = BulkEquation::new("Poisson", "psi").with_node_model("rho");
        let out = run(&eq, &mut r, WhatToLoad::MatrixAndRhs, TimeMode::Dc).0.unwrap();
        let rhs = out.rhs_by_row();
        assert_eq!(rhs.values().copied().collect::<Vec<_>>(), vec![0.5, 1.0, 1.5]);
        let m = out.matrix_by_entry();
        assert_eq!(m.get(&(1, 1)), Some(&2.0));
        assert_eq!(m.len(), 3);
    }

    #[test]
    fn time_pass_uses_only_time_model() {
        let mut r = line();
        r.set_uniform(DomainKind::Node, "rho", 1.0);
        r.set_uniform(DomainKind::Node, "q", 2.0);
        let eq = BulkEquation::new("Poisson", "psi")
            .with_node_model("rho")
            .with_time_node_model("q");
        let out = run(&eq, &mut r, WhatToLoad::Rhs, TimeMode::Time).0.unwrap();
        assert_eq!(out.rhs_by_row().get(&2), Some(&1.0));
        assert_eq!(out.rhs.len(), 3);
    }

    #[test]
    fn permutation_pass_is_empty() {
        let mut r = line();
        let eq = BulkEquation::new("Poisson", "psi").with_node_model("missing");
        let out = run(&eq, &mut r, WhatToLoad::PermutationOnly, TimeMode::Dc).0.unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn unregistered_equation_is_fatal() {
        let mut r = line();
        let eq = BulkEquation::new("Continuity", "n");
        let (res, log) = run(&eq, &mut r, WhatToLoad::Rhs, TimeMode::Dc);
        match res {
            Err(AssemblyError::MissingEquationIndex { equation, .. }) => {
                assert_eq!(equation, "Continuity")
            }
            other => panic!("expected MissingEquationIndex, got {other:?}"),
        }
        assert!(log.has_fatal());
    }

    #[test]
    fn missing_primary_model_is_fatal_by_default() {
        let mut r = line();
        let eq = BulkEquation::new("Poisson", "psi").with_edge_model("E");
        match run(&eq, &mut r, WhatToLoad::Rhs, TimeMode::Dc).0 {
            Err(AssemblyError::MissingEquationModel { model, kind, scope }) => {
                assert_eq!(model, "E");
                assert_eq!(kind, DomainKind::Edge);
                assert_eq!(scope.equation.as_deref(), Some("Poisson"));
            }
            other => panic!("expected MissingEquationModel, got {other:?}"),
        }
    }

    #[test]
    fn element_models_in_one_dimension_warn() {
        let mut r = line();
        let eq = BulkEquation::new("Poisson", "psi").with_element_model("J");
        let (res, log) = run(&eq, &mut r, WhatToLoad::Rhs, TimeMode::Dc);
        assert!(res.unwrap().is_empty());
        assert_eq!(log.count(Severity::Warning), 1);
    }

    #[test]
    fn update_writes_variable_and_stats() {
        let mut r = line();
        let mut eq = BulkEquation::new("Poisson", "psi").with_update(UpdatePolicy::Default);
        let mut log = Diagnostics::new();
        let stats = eq
            .update(&mut r, &[1.0, -2.0, 0.5], &UpdateConfig::default(), &mut log)
            .unwrap();
        assert_eq!(stats.abs_node, 1);
        assert_eq!(eq.last_update(), stats);
        assert_eq!(
            r.values(DomainKind::Node, "psi").unwrap().to_vec(),
            vec![1.0, -2.0, 0.5]
        );
    }

    #[test]
    fn command_lists_every_slot() {
        let eq = BulkEquation::new("Poisson", "psi")
            .with_edge_model("E")
            .with_update(UpdatePolicy::LogDamp);
        let c = eq.command("d", "r");
        assert_eq!(c.get("edge_model"), Some("E"));
        assert_eq!(c.get("node_model"), Some(""));
        assert_eq!(c.get("variable_update"), Some("log_damp"));
        assert_eq!(c.options().len(), 12);
        let text = eq.serialize("d", "r");
        assert!(text.starts_with("begin_equation \"Poisson\"\nCOMMAND equation -device \"d\""));
        assert!(text.ends_with("\nend_equation\n\n"));
    }
}
