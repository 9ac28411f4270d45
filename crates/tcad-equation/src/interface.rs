//! Interface equations: coupling two regions across shared nodes.
//!
//! Each interface node pair `i` joins node `nodes0[i]` of region 0 and
//! node `nodes1[i]` of region 1. The interface model is a node model of
//! the interface; its Jacobian columns come from derivative models
//! `<model>:<var>@r0` and `<model>:<var>@r1`, one per side.
//!
//! | coupling     | permutation pass                  | DC pass                            |
//! |--------------|-----------------------------------|------------------------------------|
//! | `continuous` | region-1 row moves onto region 0  | model into the region-1 row        |
//! | `fluxterm`   | none                              | `+model*area0` / `-model*area1`    |
//! | `hybrid`     | as continuous, original row kept  | `-model*area1` into region-1 row   |

use std::fmt;
use std::sync::Arc;

use tcad_core::{
    derivative_name, AssemblyBuffers, AssemblyConfig, AssemblyError, Diagnostics, DomainKind,
    ModelError, NameSuffix, PermutationEntry, PermutationMap, Precision, Scope, Severity, TimeMode,
    WhatToLoad,
};
use tcad_model::{InterfaceModels, ModelData, Region};
use tracing::debug;

use crate::assemble::{is_set, Assembler};
use crate::command::{block, Command};

/// How an interface equation couples its two regions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum InterfaceCoupling {
    /// The interface equation replaces the region-1 row; the region-1
    /// bulk row is summed into the region-0 row.
    #[default]
    Continuous,
    /// The flux is added to region 0 and subtracted from region 1; no
    /// rows move.
    FluxTerm,
    /// Region-1 bulk rows are copied onto region 0 and kept; the flux
    /// is subtracted from region 1.
    Hybrid,
}

impl InterfaceCoupling {
    /// Keyword used in serialized commands.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Continuous => "continuous",
            Self::FluxTerm => "fluxterm",
            Self::Hybrid => "hybrid",
        }
    }

    /// Parse a serialized keyword.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "continuous" => Some(Self::Continuous),
            "fluxterm" => Some(Self::FluxTerm),
            "hybrid" => Some(Self::Hybrid),
            _ => None,
        }
    }

    fn permutation(self) -> Option<bool> {
        match self {
            Self::Continuous => Some(false),
            Self::FluxTerm => None,
            Self::Hybrid => Some(true),
        }
    }
}

impl fmt::Display for InterfaceCoupling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An equation coupling the two regions of one interface.
#[derive(Clone, Debug)]
pub struct InterfaceEquation {
    name: String,
    name0: String,
    name1: String,
    interface_model: String,
    coupling: InterfaceCoupling,
}

/// A derivative column block: one side's values and that side's first row.
struct SideDerivative<T> {
    side: usize,
    start: usize,
    values: Arc<ModelData<T>>,
}

impl InterfaceEquation {
    /// Couple equation `name` on both sides through `interface_model`.
    pub fn new(
        name: impl Into<String>,
        interface_model: impl Into<String>,
        coupling: InterfaceCoupling,
    ) -> Self {
        let name = name.into();
        Self {
            name0: name.clone(),
            name1: name.clone(),
            name,
            interface_model: interface_model.into(),
            coupling,
        }
    }

    /// Couple differently named equations on each side.
    pub fn with_sides(mut self, name0: impl Into<String>, name1: impl Into<String>) -> Self {
        self.name0 = name0.into();
        self.name1 = name1.into();
        self
    }

    /// Equation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Equation name on side `side` (0 or 1).
    pub fn side_name(&self, side: usize) -> &str {
        if side == 0 {
            &self.name0
        } else {
            &self.name1
        }
    }

    /// Interface model.
    pub fn interface_model(&self) -> &str {
        &self.interface_model
    }

    /// Coupling discipline.
    pub fn coupling(&self) -> InterfaceCoupling {
        self.coupling
    }

    fn start(
        &self,
        region: &Region<impl Precision>,
        side: usize,
        scope: &Scope,
        diagnostics: &mut Diagnostics,
    ) -> Result<usize, AssemblyError> {
        let equation = self.side_name(side);
        match region.equation_number(equation, 0) {
            Some(start) => Ok(start),
            None => {
                diagnostics.write_out(
                    Severity::Fatal,
                    scope,
                    format!(
                        "equation \"{equation}\" has no index in region \"{}\"",
                        region.name()
                    ),
                );
                Err(AssemblyError::MissingEquationIndex {
                    scope: scope.clone(),
                    equation: equation.to_string(),
                })
            }
        }
    }

    /// Append this equation's permutations or contributions.
    ///
    /// `active` marks the interface node pairs this equation owns. The
    /// time pass contributes nothing.
    #[allow(clippy::too_many_arguments)]
    pub fn assemble<T: Precision>(
        &self,
        interface: &mut InterfaceModels<T>,
        regions: [&mut Region<T>; 2],
        active: &[bool],
        permutation: &mut PermutationMap,
        config: &AssemblyConfig,
        diagnostics: &mut Diagnostics,
        what: WhatToLoad,
        time: TimeMode,
        out: &mut AssemblyBuffers<T>,
    ) -> Result<(), AssemblyError> {
        if time == TimeMode::Time {
            return Ok(());
        }
        let [region0, region1] = regions;
        let scope = interface.scope().equation(&self.name);
        let start0 = self.start(region0, 0, &scope, diagnostics)?;
        let start1 = self.start(region1, 1, &scope, diagnostics)?;
        let nodes = [
            interface.side_nodes(0).to_vec(),
            interface.side_nodes(1).to_vec(),
        ];
        let pairs = (0..nodes[0].len()).filter(|&i| is_set(active, i));

        if what.is_permutation_only() {
            if let Some(keep_copy) = self.coupling.permutation() {
                for i in pairs {
                    permutation.insert(
                        start1 + nodes[1][i],
                        PermutationEntry::new(start0 + nodes[0][i], keep_copy),
                    )?;
                }
            }
            return Ok(());
        }

        let area = match self.coupling {
            InterfaceCoupling::Continuous => [None, None],
            InterfaceCoupling::FluxTerm => [
                surface_area(region0, &scope, config, diagnostics)?,
                surface_area(region1, &scope, config, diagnostics)?,
            ],
            InterfaceCoupling::Hybrid => [None, surface_area(region1, &scope, config, diagnostics)?],
        };
        let missing_area = match self.coupling {
            InterfaceCoupling::Continuous => false,
            InterfaceCoupling::FluxTerm => area.iter().any(Option::is_none),
            InterfaceCoupling::Hybrid => area[1].is_none(),
        };
        if missing_area {
            return Ok(());
        }

        let model = self.interface_model.as_str();
        if !interface.models().contains(DomainKind::Node, model) {
            let severity = config.missing_model_severity;
            diagnostics.write_out(
                severity,
                &scope,
                format!("missing interface model \"{model}\""),
            );
            if severity >= Severity::Fatal {
                return Err(AssemblyError::MissingEquationModel {
                    scope,
                    model: model.to_string(),
                    kind: DomainKind::Node,
                });
            }
            return Ok(());
        }
        let read = |interface: &mut InterfaceModels<T>,
                    r0: &mut Region<T>,
                    r1: &mut Region<T>,
                    name: &str,
                    diagnostics: &mut Diagnostics|
         -> Result<Arc<ModelData<T>>, AssemblyError> {
            let values = interface.values(name, r0, r1);
            let notes = interface
                .take_evaluation_notes()
                .into_iter()
                .chain(r0.take_evaluation_notes())
                .chain(r1.take_evaluation_notes());
            for note in notes {
                diagnostics.write_out(Severity::Error, &scope, note.to_string());
            }
            values.map_err(|source: ModelError| AssemblyError::Model {
                scope: scope.clone(),
                source,
            })
        };

        let area = area.map(|a| a.map(|a| a.to_vec()));
        // Weight applied on each side's row: `None` means no record there.
        let weight = |side: usize, i: usize| -> Option<T> {
            match (self.coupling, side) {
                (InterfaceCoupling::Continuous, 1) => Some(T::one()),
                (InterfaceCoupling::Continuous, _) => None,
                (InterfaceCoupling::FluxTerm, 0) => area[0].as_ref().map(|a| a[nodes[0][i]]),
                (InterfaceCoupling::FluxTerm | InterfaceCoupling::Hybrid, 1) => {
                    area[1].as_ref().map(|a| -a[nodes[1][i]])
                }
                _ => None,
            }
        };
        let starts = [start0, start1];

        if what.loads_rhs() {
            let values = read(interface, region0, region1, model, &mut *diagnostics)?.to_vec();
            for i in pairs.clone() {
                for side in 0..2 {
                    if let Some(w) = weight(side, i) {
                        out.push_rhs(starts[side] + nodes[side][i], w * values[i]);
                    }
                }
            }
        }

        if what.loads_matrix() {
            let mut derivatives = Vec::new();
            for (side, region) in [&*region0, &*region1].into_iter().enumerate() {
                for variable in region.variables() {
                    let name = NameSuffix::InterfaceSide(side).apply(&derivative_name(model, &variable));
                    let Some(start) = region
                        .equation_for_variable(&variable)
                        .and_then(|eq| region.equation_number(eq, 0))
                    else {
                        continue;
                    };
                    if interface.models().contains(DomainKind::Node, &name) {
                        derivatives.push((side, start, name));
                    } else {
                        diagnostics.write_out(
                            Severity::Verbose,
                            &scope,
                            format!("missing interface model \"{name}\""),
                        );
                    }
                }
            }
            let mut columns = Vec::with_capacity(derivatives.len());
            for (side, start, name) in derivatives {
                columns.push(SideDerivative {
                    side,
                    start,
                    values: read(interface, region0, region1, &name, &mut *diagnostics)?,
                });
            }
            for d in &columns {
                let values = d.values.to_vec();
                for i in pairs.clone() {
                    let col = d.start + nodes[d.side][i];
                    for side in 0..2 {
                        if let Some(w) = weight(side, i) {
                            out.push_matrix(starts[side] + nodes[side][i], col, w * values[i]);
                        }
                    }
                }
            }
        }
        debug!(
            interface = %interface.name(),
            equation = %self.name,
            coupling = %self.coupling,
            "interface equation assembled"
        );
        Ok(())
    }

    /// The command recreating this equation.
    pub fn command(&self, device: &str, interface: &str) -> Command {
        Command::new("interface_equation")
            .option("device", device)
            .option("interface", interface)
            .option("name", &self.name)
            .option("name0", &self.name0)
            .option("name1", &self.name1)
            .option("interface_model", &self.interface_model)
            .option("type", self.coupling.as_str())
    }

    /// `begin_interface_equation` block for this equation.
    pub fn serialize(&self, device: &str, interface: &str) -> String {
        block(
            "interface_equation",
            &self.name,
            &self.command(device, interface).to_string(),
        )
    }
}

/// Surface area of `region`'s interface nodes, or `None` if it is missing
/// below fatal severity.
fn surface_area<T: Precision>(
    region: &mut Region<T>,
    scope: &Scope,
    config: &AssemblyConfig,
    diagnostics: &mut Diagnostics,
) -> Result<Option<Arc<ModelData<T>>>, AssemblyError> {
    let scope = scope.clone().region(region.name());
    let measure = config.measures.surface_area.clone();
    Assembler::new(region, scope, config, diagnostics).required(DomainKind::Node, &measure)
}
