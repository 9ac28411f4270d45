//! A bulk region: topology plus its model store.
//!
//! The region is the [`ModelContext`] for every model it owns. Name
//! resolution tries, in order:
//!
//! 1. an exact model name, by kind in [`DomainKind::LOOKUP_ORDER`];
//! 2. `m@n0` / `m@n1` where `m` is a node model: the value at each edge end;
//! 3. `m@enK`: for `K < 2` the edge model `m@nK` widened to element-edges,
//!    otherwise (or when absent) the node model `m` at element corner `K`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use tcad_core::{DisplayType, DomainKind, KernelConfig, ModelError, NameSuffix, Precision, Scope};
use tcad_mesh::{Contact, Topology};
use tracing::debug;

use crate::data::ModelData;
use crate::model::{EvaluationNote, ModelCalculator, ModelContext, ModelState, ResolvedModel};
use crate::store::{Access, ModelStore};

/// Counter for unique [`RegionId`] allocation.
static REGION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique per-instance identifier for a [`Region`].
///
/// Interfaces record the ids (and revisions) of the regions they were last
/// evaluated against, so replacing a region is never mistaken for the old one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(u64);

impl RegionId {
    /// Allocate a fresh, unique id.
    pub fn next() -> Self {
        Self(REGION_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coordinate axis of the built-in `x`, `y`, `z` node models.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    /// `x`
    X,
    /// `y`
    Y,
    /// `z`
    Z,
}

impl Axis {
    /// All axes in order.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Name of the coordinate model.
    pub fn model_name(self) -> &'static str {
        match self {
            Self::X => "x",
            Self::Y => "y",
            Self::Z => "z",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::X => 0,
            Self::Y => 1,
            Self::Z => 2,
        }
    }
}

/// A region's models, parameters, contacts and equation slots.
#[derive(Debug)]
pub struct Region<T: Precision> {
    id: RegionId,
    revision: u64,
    layout: u64,
    device: String,
    name: String,
    topology: Arc<Topology>,
    models: ModelStore<T>,
    parameters: IndexMap<String, f64>,
    contacts: IndexMap<String, Contact>,
    equations: IndexMap<String, String>,
    base_equation: usize,
    kernel: KernelConfig,
    notes: Vec<EvaluationNote>,
}

impl<T: Precision> Region<T> {
    /// Create a region over `topology`, with coordinate models `x`, `y`, `z`.
    pub fn new(device: impl Into<String>, name: impl Into<String>, topology: Arc<Topology>) -> Self {
        let mut models = ModelStore::new();
        for axis in Axis::ALL {
            let values = topology
                .coordinates()
                .iter()
                .map(|c| T::narrow(c[axis.index()]))
                .collect();
            models.insert_data(DomainKind::Node, axis.model_name(), ModelData::from_vec(values));
        }
        Self {
            id: RegionId::next(),
            revision: 0,
            layout: 0,
            device: device.into(),
            name: name.into(),
            topology,
            models,
            parameters: IndexMap::new(),
            contacts: IndexMap::new(),
            equations: IndexMap::new(),
            base_equation: 0,
            kernel: KernelConfig::default(),
            notes: Vec::new(),
        }
    }

    /// Use `kernel` for elementwise work.
    pub fn with_kernel(mut self, kernel: KernelConfig) -> Self {
        self.kernel = kernel;
        self
    }

    // ── Identity ───────────────────────────────────────────────────

    /// Instance id.
    pub fn id(&self) -> RegionId {
        self.id
    }

    /// Incremented on every model, parameter or contact change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Incremented whenever equation slots or contacts change, i.e.
    /// whenever rows or row ownership may move.
    pub fn layout_revision(&self) -> u64 {
        self.layout
    }

    /// Owning device name.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Region name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Geometry.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.topology.node_count()
    }

    /// Model tables, for inspection.
    pub fn models(&self) -> &ModelStore<T> {
        &self.models
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    // ── Model writes ───────────────────────────────────────────────

    /// Write per-element values of a data model.
    pub fn set_values(&mut self, kind: DomainKind, name: &str, values: Vec<T>) -> Result<(), ModelError> {
        self.set_data(kind, name, ModelData::from_vec(values))
    }

    /// Write a uniform data model.
    pub fn set_uniform(&mut self, kind: DomainKind, name: &str, value: T) {
        let len = self.topology.domain_len(kind);
        self.models.insert_data(kind, name, ModelData::uniform(value, len));
        self.touch();
    }

    /// Write a data model.
    pub fn set_data(&mut self, kind: DomainKind, name: &str, data: ModelData<T>) -> Result<(), ModelError> {
        let expected = self.topology.domain_len(kind);
        if data.len() != expected {
            return Err(ModelError::LengthMismatch {
                name: name.to_string(),
                expected,
                actual: data.len(),
            });
        }
        self.models.insert_data(kind, name, data);
        self.touch();
        Ok(())
    }

    /// Move node `node` along `axis`.
    pub fn set_coordinate(&mut self, node: usize, axis: Axis, value: f64) -> Result<(), ModelError> {
        let node_count = self.node_count();
        if node >= node_count {
            return Err(ModelError::NodeOutOfRange { node, node_count });
        }
        let name = axis.model_name();
        let mut values = self.values(DomainKind::Node, name)?.to_vec();
        values[node] = T::narrow(value);
        self.set_values(DomainKind::Node, name, values)
    }

    /// Declare a computed model. Returns whether one was replaced.
    pub fn declare(&mut self, kind: DomainKind, name: &str, calculator: Arc<dyn ModelCalculator<T>>) -> bool {
        debug!(region = %self.name, model = name, %kind, "declaring model");
        let replaced = self.models.insert_calculated(kind, name, calculator, None);
        self.touch();
        replaced
    }

    /// Declare a node model evaluated only at the nodes of `contact`.
    pub fn declare_contact_model(
        &mut self,
        contact: &str,
        name: &str,
        calculator: Arc<dyn ModelCalculator<T>>,
    ) -> Result<bool, ModelError> {
        if !self.contacts.contains_key(contact) {
            return Err(ModelError::UnknownContact {
                name: contact.to_string(),
            });
        }
        let replaced =
            self.models
                .insert_calculated(DomainKind::Node, name, calculator, Some(contact.to_string()));
        self.touch();
        Ok(replaced)
    }

    /// Remove a model. Returns whether it existed.
    pub fn remove_model(&mut self, kind: DomainKind, name: &str) -> bool {
        let removed = self.models.remove(kind, name).is_some();
        if removed {
            self.touch();
        }
        removed
    }

    /// Set the presentation hint of a model.
    pub fn set_display_type(&mut self, kind: DomainKind, name: &str, display_type: DisplayType) -> bool {
        self.models.set_display_type(kind, name, display_type)
    }

    /// Set a named scalar. Models using it are marked old.
    pub fn set_parameter(&mut self, name: &str, value: f64) {
        self.parameters.insert(name.to_string(), value);
        self.models.mark_old(name);
        self.touch();
    }

    /// A named scalar.
    pub fn parameter(&self, name: &str) -> Option<f64> {
        self.parameters.get(name).copied()
    }

    /// Errors from evaluations that still produced a value, oldest first.
    ///
    /// Drains the notes.
    pub fn take_evaluation_notes(&mut self) -> Vec<EvaluationNote> {
        std::mem::take(&mut self.notes)
    }

    /// Mark `name` and its dependents old.
    pub fn mark_old(&mut self, name: &str) {
        self.models.mark_old(name);
        self.touch();
    }

    // ── Contacts ───────────────────────────────────────────────────

    /// Attach a contact, replacing one of the same name.
    pub fn add_contact(&mut self, contact: Contact) {
        self.contacts.insert(contact.name().to_string(), contact);
        self.layout += 1;
        self.touch();
    }

    /// A contact by name.
    pub fn contact(&self, name: &str) -> Option<&Contact> {
        self.contacts.get(name)
    }

    /// All contacts.
    pub fn contacts(&self) -> impl Iterator<Item = &Contact> {
        self.contacts.values()
    }

    // ── Reads ──────────────────────────────────────────────────────

    /// Current values of a model, computing them if stale.
    pub fn values(&mut self, kind: DomainKind, name: &str) -> Result<Arc<ModelData<T>>, ModelError> {
        let len = self.topology.domain_len(kind);
        match self.models.begin(kind, name, len)? {
            Access::Ready(v) => Ok(v),
            Access::Compute(calc, target) => {
                debug!(region = %self.name, model = name, %kind, "computing model");
                let result = calc.calculate(&target, self);
                let contact_nodes = match &target.contact {
                    Some(c) => match self.contacts.get(c) {
                        Some(contact) => Some(contact.nodes()),
                        None => {
                            let err = ModelError::UnknownContact { name: c.clone() };
                            return self.models.finish(&target, Err(err), None);
                        }
                    },
                    None => None,
                };
                self.models.finish(&target, result, contact_nodes)
            }
        }
    }

    /// Current values of a model by name, whatever its kind.
    pub fn find(&mut self, name: &str) -> Result<Option<ResolvedModel<T>>, ModelError> {
        self.lookup(name)
    }

    /// State of a model.
    pub fn state(&self, kind: DomainKind, name: &str) -> Option<ModelState> {
        self.models.state(kind, name)
    }

    /// Whether a model's cached value is current.
    pub fn is_up_to_date(&self, kind: DomainKind, name: &str) -> bool {
        self.state(kind, name) == Some(ModelState::Fresh)
    }

    fn edge_end_projection(&mut self, base: &str, end: usize) -> Result<Option<ResolvedModel<T>>, ModelError> {
        if !self.models.contains(DomainKind::Node, base) {
            return Ok(None);
        }
        let nodes = self.values(DomainKind::Node, base)?;
        let index: Vec<usize> = self.topology.edges().iter().map(|e| e.nodes[end]).collect();
        Ok(Some(ResolvedModel {
            kind: DomainKind::Edge,
            data: Arc::new(nodes.gather(&index, &self.kernel)),
        }))
    }

    fn element_corner_projection(
        &mut self,
        base: &str,
        corner: usize,
    ) -> Result<Option<ResolvedModel<T>>, ModelError> {
        let Some(kind) = self.topology.element_edge_kind() else {
            return Ok(None);
        };
        if corner >= kind.corners_per_element_edge() {
            return Ok(None);
        }
        if corner < 2 {
            let edge_name = NameSuffix::EdgeEnd(corner).apply(base);
            if self.models.contains(DomainKind::Edge, &edge_name) {
                let edges = self.values(DomainKind::Edge, &edge_name)?;
                let map = self.topology.element_edge_map(kind);
                return Ok(Some(ResolvedModel {
                    kind,
                    data: Arc::new(edges.gather(&map, &self.kernel)),
                }));
            }
        }
        if !self.models.contains(DomainKind::Node, base) {
            return Ok(None);
        }
        let nodes = self.values(DomainKind::Node, base)?;
        let len = self.topology.domain_len(kind);
        let index: Vec<usize> = (0..len)
            .filter_map(|i| self.topology.element_edge(kind, i))
            .map(|ee| ee.corners[corner])
            .collect();
        Ok(Some(ResolvedModel {
            kind,
            data: Arc::new(nodes.gather(&index, &self.kernel)),
        }))
    }

    // ── Equation slots ─────────────────────────────────────────────

    /// Register `equation` as solving for node model `variable`.
    ///
    /// A zero-valued data model is created for the variable if none
    /// exists. Returns the equation's index within the region.
    pub fn add_equation(&mut self, equation: &str, variable: &str) -> usize {
        if !self.models.contains(DomainKind::Node, variable) {
            self.set_uniform(DomainKind::Node, variable, T::zero());
        }
        let (index, _) = self
            .equations
            .insert_full(equation.to_string(), variable.to_string());
        self.layout += 1;
        index
    }

    /// Remove an equation slot. Later equations shift down one index.
    pub fn remove_equation(&mut self, equation: &str) -> bool {
        let removed = self.equations.shift_remove(equation).is_some();
        if removed {
            self.layout += 1;
        }
        removed
    }

    /// Index of `equation` within the region.
    pub fn equation_index(&self, equation: &str) -> Option<usize> {
        self.equations.get_index_of(equation)
    }

    /// Variable solved by `equation`.
    pub fn equation_variable(&self, equation: &str) -> Option<&str> {
        self.equations.get(equation).map(String::as_str)
    }

    /// Equation solving for `variable`.
    pub fn equation_for_variable(&self, variable: &str) -> Option<&str> {
        self.equations
            .iter()
            .find(|(_, v)| v.as_str() == variable)
            .map(|(e, _)| e.as_str())
    }

    /// Solution variables in equation order.
    pub fn variables(&self) -> Vec<String> {
        self.equations.values().cloned().collect()
    }

    /// Number of equations.
    pub fn equation_slots(&self) -> usize {
        self.equations.len()
    }

    /// First global row of this region.
    pub fn base_equation(&self) -> usize {
        self.base_equation
    }

    /// Set the first global row of this region.
    pub fn set_base_equation(&mut self, base: usize) {
        self.base_equation = base;
    }

    /// Rows occupied by this region.
    pub fn equation_count(&self) -> usize {
        self.equations.len() * self.node_count()
    }

    /// Global row of `equation` at `node`: `base + index * node_count + node`.
    pub fn equation_number(&self, equation: &str, node: usize) -> Option<usize> {
        let index = self.equation_index(equation)?;
        Some(self.base_equation + index * self.node_count() + node)
    }

    /// Global rows of `equation` at every node, in node order.
    pub fn equation_numbers(&self, equation: &str) -> Option<Vec<usize>> {
        let index = self.equation_index(equation)?;
        let start = self.base_equation + index * self.node_count();
        Some((start..start + self.node_count()).collect())
    }
}

impl<T: Precision> ModelContext<T> for Region<T> {
    fn scope(&self) -> Scope {
        Scope::device(&self.device).region(&self.name)
    }

    fn domain_len(&self, kind: DomainKind) -> usize {
        self.topology.domain_len(kind)
    }

    fn element_edge_map(&self, kind: DomainKind) -> Vec<usize> {
        self.topology.element_edge_map(kind)
    }

    fn lookup(&mut self, name: &str) -> Result<Option<ResolvedModel<T>>, ModelError> {
        if let Some(kind) = self.models.kind_of(name) {
            let data = self.values(kind, name)?;
            return Ok(Some(ResolvedModel { kind, data }));
        }
        match NameSuffix::split(name) {
            Some((base, NameSuffix::EdgeEnd(end))) => self.edge_end_projection(base, end),
            Some((base, NameSuffix::ElementCorner(corner))) => self.element_corner_projection(base, corner),
            Some((_, NameSuffix::InterfaceSide(_))) | None => Ok(None),
        }
    }

    fn variable(&self, name: &str) -> Option<f64> {
        self.parameter(name)
    }

    fn kernel(&self) -> &KernelConfig {
        &self.kernel
    }

    fn record_errors(&mut self, model: &str, messages: Vec<String>) {
        self.notes.extend(messages.into_iter().map(|message| EvaluationNote {
            model: model.to_string(),
            message,
        }));
    }
}
