//! Model records, their state machine, and the calculator seam.

use std::fmt;
use std::sync::Arc;

use tcad_core::{DisplayType, DomainKind, KernelConfig, ModelError, Precision, Scope};

use crate::data::ModelData;

/// Lifecycle of a cached value.
///
/// `Stale -> Computing -> Fresh`, and back to `Stale` on invalidation.
/// A read while `Computing` is a cyclic dependency.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModelState {
    /// Must be recomputed before the next read.
    Stale,
    /// Being recomputed; re-entrant reads are errors.
    Computing,
    /// Cached value is current.
    Fresh,
}

/// What is being computed, handed to a [`ModelCalculator`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelTarget {
    /// Model name.
    pub name: String,
    /// Model domain.
    pub kind: DomainKind,
    /// Element count of the domain in the owner.
    pub len: usize,
    /// Contact the model is restricted to, if any.
    pub contact: Option<String>,
}

/// A model reference resolved by an owner.
#[derive(Clone, Debug)]
pub struct ResolvedModel<T> {
    /// Domain of the data.
    pub kind: DomainKind,
    /// The values.
    pub data: Arc<ModelData<T>>,
}

/// An error reported while computing a model whose value was still usable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvaluationNote {
    /// Model being computed.
    pub model: String,
    /// Rendered error.
    pub message: String,
}

impl fmt::Display for EvaluationNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "model \"{}\": {}", self.model, self.message)
    }
}

/// The owner-side services a calculator may use.
///
/// Implemented by regions and interfaces. Every evaluation receives its
/// owner explicitly; there is no ambient "current owner".
pub trait ModelContext<T: Precision> {
    /// Scope used for diagnostics.
    fn scope(&self) -> Scope;

    /// Element count of `kind` in this owner.
    fn domain_len(&self, kind: DomainKind) -> usize;

    /// Global edge index of each element-edge of `kind`, in flat order.
    fn element_edge_map(&self, kind: DomainKind) -> Vec<usize>;

    /// Resolve a model name, computing it if stale.
    ///
    /// `Ok(None)` when nothing by that name is known.
    fn lookup(&mut self, name: &str) -> Result<Option<ResolvedModel<T>>, ModelError>;

    /// Value of a scalar variable (parameter or circuit node).
    fn variable(&self, name: &str) -> Option<f64>;

    /// Kernel partitioning for elementwise work.
    fn kernel(&self) -> &KernelConfig;

    /// Keep errors reported while computing `model`.
    ///
    /// Called when the value is usable despite them; the owner holds the
    /// notes until its reader drains them.
    fn record_errors(&mut self, model: &str, messages: Vec<String>);
}

/// Computes a model's values from other models.
///
/// Implementations are immutable once registered; the owner caches what
/// they return.
pub trait ModelCalculator<T: Precision>: fmt::Debug + Send + Sync {
    /// Compute the values of `target`.
    fn calculate(
        &self,
        target: &ModelTarget,
        ctx: &mut dyn ModelContext<T>,
    ) -> Result<ModelData<T>, ModelError>;

    /// Names whose change must invalidate this model.
    fn dependencies(&self) -> Vec<String>;

    /// Text that recreates the calculation, for serialization.
    fn expression(&self) -> Option<String> {
        None
    }
}

/// Where a model's values come from.
#[derive(Clone, Debug)]
pub enum ModelSource<T: Precision> {
    /// Values are written directly.
    Data,
    /// Values are computed on demand.
    Calculated(Arc<dyn ModelCalculator<T>>),
}

/// One named model in an owner.
#[derive(Clone, Debug)]
pub struct Model<T: Precision> {
    pub(crate) name: String,
    pub(crate) kind: DomainKind,
    pub(crate) source: ModelSource<T>,
    pub(crate) state: ModelState,
    pub(crate) value: Option<Arc<ModelData<T>>>,
    pub(crate) display_type: DisplayType,
    pub(crate) contact: Option<String>,
}

impl<T: Precision> Model<T> {
    /// Model name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Model domain.
    pub fn kind(&self) -> DomainKind {
        self.kind
    }

    /// Current state.
    pub fn state(&self) -> ModelState {
        self.state
    }

    /// Whether the cached value is current.
    pub fn is_up_to_date(&self) -> bool {
        self.state == ModelState::Fresh
    }

    /// Whether the model is computed rather than written.
    pub fn is_calculated(&self) -> bool {
        matches!(self.source, ModelSource::Calculated(_))
    }

    /// The calculator, for computed models.
    pub fn calculator(&self) -> Option<&Arc<dyn ModelCalculator<T>>> {
        match &self.source {
            ModelSource::Calculated(c) => Some(c),
            ModelSource::Data => None,
        }
    }

    /// Presentation hint.
    pub fn display_type(&self) -> DisplayType {
        self.display_type
    }

    /// Contact the model is restricted to.
    pub fn contact(&self) -> Option<&str> {
        self.contact.as_deref()
    }

    /// The cached value, without triggering computation.
    pub fn cached(&self) -> Option<&Arc<ModelData<T>>> {
        self.value.as_ref()
    }

    /// Text that recreates the model, when computed from an expression.
    pub fn expression(&self) -> Option<String> {
        self.calculator().and_then(|c| c.expression())
    }

    pub(crate) fn missing(&self) -> ModelError {
        ModelError::MissingModel {
            kind: self.kind,
            name: self.name.clone(),
        }
    }
}
