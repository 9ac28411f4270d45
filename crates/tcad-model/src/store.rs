//! Per-owner model tables and the lazy evaluation protocol.
//!
//! A read goes through [`ModelStore::begin`], which either hands back a
//! cached value or moves the model to `Computing` and returns its
//! calculator. The owner runs the calculator with itself as context and
//! then calls [`ModelStore::finish`]. Keeping the calculator call outside
//! the store lets a calculator read other models of the same owner.

use std::sync::Arc;

use indexmap::IndexMap;
use tcad_core::{DisplayType, DomainKind, ModelError, Precision};
use tracing::trace;

use crate::data::ModelData;
use crate::graph::DependencyGraph;
use crate::model::{Model, ModelCalculator, ModelSource, ModelState, ModelTarget};

/// Result of [`ModelStore::begin`].
#[derive(Debug)]
pub enum Access<T: Precision> {
    /// The cached value is current.
    Ready(Arc<ModelData<T>>),
    /// The model is now `Computing`; run the calculator and call `finish`.
    Compute(Arc<dyn ModelCalculator<T>>, ModelTarget),
}

/// Name-keyed models of one owner, one table per domain kind.
#[derive(Debug)]
pub struct ModelStore<T: Precision> {
    tables: [IndexMap<String, Model<T>>; 4],
    graph: DependencyGraph,
}

impl<T: Precision> Default for ModelStore<T> {
    fn default() -> Self {
        Self {
            tables: Default::default(),
            graph: DependencyGraph::new(),
        }
    }
}

impl<T: Precision> ModelStore<T> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, kind: DomainKind) -> &IndexMap<String, Model<T>> {
        &self.tables[kind.index()]
    }

    fn table_mut(&mut self, kind: DomainKind) -> &mut IndexMap<String, Model<T>> {
        &mut self.tables[kind.index()]
    }

    /// Whether a model of `kind` named `name` exists.
    pub fn contains(&self, kind: DomainKind, name: &str) -> bool {
        self.table(kind).contains_key(name)
    }

    /// The model of `kind` named `name`.
    pub fn get(&self, kind: DomainKind, name: &str) -> Option<&Model<T>> {
        self.table(kind).get(name)
    }

    /// The first kind, in lookup order, holding a model named `name`.
    pub fn kind_of(&self, name: &str) -> Option<DomainKind> {
        DomainKind::LOOKUP_ORDER
            .into_iter()
            .find(|&k| self.contains(k, name))
    }

    /// Model names of `kind`, in insertion order.
    pub fn names(&self, kind: DomainKind) -> impl Iterator<Item = &str> {
        self.table(kind).keys().map(String::as_str)
    }

    /// Models of `kind`, in insertion order.
    pub fn models(&self, kind: DomainKind) -> impl Iterator<Item = &Model<T>> {
        self.table(kind).values()
    }

    /// The dependency graph.
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// State of a model.
    pub fn state(&self, kind: DomainKind, name: &str) -> Option<ModelState> {
        self.get(kind, name).map(Model::state)
    }

    /// Write a data model, replacing any model of the same kind and name.
    ///
    /// Dependents are marked old; the written model is `Fresh`.
    pub fn insert_data(&mut self, kind: DomainKind, name: &str, data: ModelData<T>) {
        self.graph.unregister(name);
        let display_type = self
            .get(kind, name)
            .map_or_else(DisplayType::default, Model::display_type);
        self.table_mut(kind).insert(
            name.to_string(),
            Model {
                name: name.to_string(),
                kind,
                source: ModelSource::Data,
                state: ModelState::Fresh,
                value: Some(Arc::new(data)),
                display_type,
                contact: None,
            },
        );
        self.mark_dependents_old(name);
    }

    /// Declare a computed model, replacing any model of the same kind and name.
    ///
    /// The new model starts `Stale` and is registered as a dependent of
    /// every name its calculator reports. Returns whether a model was
    /// replaced.
    pub fn insert_calculated(
        &mut self,
        kind: DomainKind,
        name: &str,
        calculator: Arc<dyn ModelCalculator<T>>,
        contact: Option<String>,
    ) -> bool {
        self.graph.unregister(name);
        for dep in calculator.dependencies() {
            self.graph.register(name, &dep);
        }
        let display_type = self
            .get(kind, name)
            .map_or_else(DisplayType::default, Model::display_type);
        let replaced = self
            .table_mut(kind)
            .insert(
                name.to_string(),
                Model {
                    name: name.to_string(),
                    kind,
                    source: ModelSource::Calculated(calculator),
                    state: ModelState::Stale,
                    value: None,
                    display_type,
                    contact,
                },
            )
            .is_some();
        self.mark_dependents_old(name);
        replaced
    }

    /// Set the presentation hint of an existing model.
    pub fn set_display_type(&mut self, kind: DomainKind, name: &str, display_type: DisplayType) -> bool {
        match self.table_mut(kind).get_mut(name) {
            Some(m) => {
                m.display_type = display_type;
                true
            }
            None => false,
        }
    }

    /// Remove a model. Its dependents are marked old and will report the
    /// missing name when next read.
    pub fn remove(&mut self, kind: DomainKind, name: &str) -> Option<Model<T>> {
        let removed = self.table_mut(kind).shift_remove(name)?;
        self.graph.unregister(name);
        self.mark_dependents_old(name);
        Some(removed)
    }

    /// Mark `name` and everything downstream of it old.
    ///
    /// Data models keep their values; only computed models go `Stale`.
    pub fn mark_old(&mut self, name: &str) {
        self.mark_stale(name);
        self.mark_dependents_old(name);
    }

    fn mark_dependents_old(&mut self, name: &str) {
        let wave = self.graph.invalidation_wave(name);
        if !wave.is_empty() {
            trace!(model = name, count = wave.len(), "invalidating dependents");
        }
        for dep in &wave {
            self.mark_stale(dep);
        }
    }

    fn mark_stale(&mut self, name: &str) {
        for table in &mut self.tables {
            if let Some(m) = table.get_mut(name) {
                if m.is_calculated() && m.state == ModelState::Fresh {
                    m.state = ModelState::Stale;
                }
            }
        }
    }

    /// Start a read of `kind`/`name` over a domain of `len` elements.
    pub fn begin(&mut self, kind: DomainKind, name: &str, len: usize) -> Result<Access<T>, ModelError> {
        let model = self
            .table_mut(kind)
            .get_mut(name)
            .ok_or_else(|| ModelError::MissingModel {
                kind,
                name: name.to_string(),
            })?;
        match (&model.source, model.state) {
            (_, ModelState::Computing) => Err(ModelError::CyclicDependency {
                name: name.to_string(),
            }),
            (ModelSource::Data, _) | (ModelSource::Calculated(_), ModelState::Fresh) => model
                .value
                .clone()
                .map(Access::Ready)
                .ok_or_else(|| model.missing()),
            (ModelSource::Calculated(calc), ModelState::Stale) => {
                let calc = Arc::clone(calc);
                model.state = ModelState::Computing;
                Ok(Access::Compute(
                    calc,
                    ModelTarget {
                        name: name.to_string(),
                        kind,
                        len,
                        contact: model.contact.clone(),
                    },
                ))
            }
        }
    }

    /// Complete a read started with [`begin`](Self::begin).
    ///
    /// On success the value is checked against the target length, masked to
    /// `contact_nodes` when given, cached and the model becomes `Fresh`. On
    /// failure the model returns to `Stale` and the error is passed through.
    pub fn finish(
        &mut self,
        target: &ModelTarget,
        result: Result<ModelData<T>, ModelError>,
        contact_nodes: Option<&[usize]>,
    ) -> Result<Arc<ModelData<T>>, ModelError> {
        let checked = result.and_then(|mut data| {
            if data.len() != target.len {
                return Err(ModelError::LengthMismatch {
                    name: target.name.clone(),
                    expected: target.len,
                    actual: data.len(),
                });
            }
            if let Some(nodes) = contact_nodes {
                data.restrict_to(nodes);
            }
            Ok(Arc::new(data))
        });
        let model = self
            .table_mut(target.kind)
            .get_mut(&target.name)
            .ok_or_else(|| ModelError::MissingModel {
                kind: target.kind,
                name: target.name.clone(),
            })?;
        match checked {
            Ok(value) => {
                model.value = Some(Arc::clone(&value));
                model.state = ModelState::Fresh;
                Ok(value)
            }
            Err(e) => {
                model.value = None;
                model.state = ModelState::Stale;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelContext;

    #[derive(Debug)]
    struct Constant(f64, Vec<String>);

    impl ModelCalculator<f64> for Constant {
        fn calculate(
            &self,
            target: &ModelTarget,
            _ctx: &mut dyn ModelContext<f64>,
        ) -> Result<ModelData<f64>, ModelError> {
            Ok(ModelData::uniform(self.0, target.len))
        }

        fn dependencies(&self) -> Vec<String> {
            self.1.clone()
        }
    }

    fn constant(v: f64, deps: &[&str]) -> Arc<dyn ModelCalculator<f64>> {
        Arc::new(Constant(v, deps.iter().map(|s| s.to_string()).collect()))
    }

    #[test]
    fn calculated_model_starts_stale() {
        let mut s = ModelStore::<f64>::new();
        s.insert_calculated(DomainKind::Node, "a", constant(1.0, &[]), None);
        assert_eq!(s.state(DomainKind::Node, "a"), Some(ModelState::Stale));
    }

    #[test]
    fn begin_twice_is_cyclic() {
        let mut s = ModelStore::<f64>::new();
        s.insert_calculated(DomainKind::Node, "a", constant(1.0, &[]), None);
        let first = s.begin(DomainKind::Node, "a", 2).unwrap();
        assert!(matches!(first, Access::Compute(..)));
        match s.begin(DomainKind::Node, "a", 2) {
            Err(ModelError::CyclicDependency { name }) => assert_eq!(name, "a"),
            other => panic!("expected CyclicDependency, got {other:?}"),
        }
    }

    #[test]
    fn finish_caches_and_data_write_invalidates() {
        let mut s = ModelStore::<f64>::new();
        s.insert_data(DomainKind::Node, "x", ModelData::zeros(2));
        s.insert_calculated(DomainKind::Node, "a", constant(3.0, &["x"]), None);
        let Access::Compute(_, target) = s.begin(DomainKind::Node, "a", 2).unwrap() else {
            panic!("expected Compute");
        };
        let v = s.finish(&target, Ok(ModelData::uniform(3.0, 2)), None).unwrap();
        assert_eq!(v.to_vec(), vec![3.0, 3.0]);
        assert!(matches!(s.begin(DomainKind::Node, "a", 2), Ok(Access::Ready(_))));

        s.insert_data(DomainKind::Node, "x", ModelData::uniform(1.0, 2));
        assert_eq!(s.state(DomainKind::Node, "a"), Some(ModelState::Stale));
        assert_eq!(s.state(DomainKind::Node, "x"), Some(ModelState::Fresh));
    }

    #[test]
    fn length_mismatch_resets_to_stale() {
        let mut s = ModelStore::<f64>::new();
        s.insert_calculated(DomainKind::Edge, "e", constant(1.0, &[]), None);
        let Access::Compute(_, target) = s.begin(DomainKind::Edge, "e", 3).unwrap() else {
            panic!("expected Compute");
        };
        let err = s.finish(&target, Ok(ModelData::zeros(2)), None).unwrap_err();
        assert_eq!(
            err,
            ModelError::LengthMismatch {
                name: "e".into(),
                expected: 3,
                actual: 2
            }
        );
        assert_eq!(s.state(DomainKind::Edge, "e"), Some(ModelState::Stale));
    }

    #[test]
    fn contact_mask_applied_on_finish() {
        let mut s = ModelStore::<f64>::new();
        s.insert_calculated(DomainKind::Node, "c", constant(2.0, &[]), Some("top".into()));
        let Access::Compute(_, target) = s.begin(DomainKind::Node, "c", 3).unwrap() else {
            panic!("expected Compute");
        };
        assert_eq!(target.contact.as_deref(), Some("top"));
        let v = s.finish(&target, Ok(ModelData::uniform(2.0, 3)), Some(&[2])).unwrap();
        assert_eq!(v.to_vec(), vec![0.0, 0.0, 2.0]);
    }

    #[test]
    fn mark_old_leaves_data_fresh() {
        let mut s = ModelStore::<f64>::new();
        s.insert_data(DomainKind::Node, "x", ModelData::zeros(1));
        s.mark_old("x");
        assert_eq!(s.state(DomainKind::Node, "x"), Some(ModelState::Fresh));
    }

    #[test]
    fn remove_marks_dependents_and_missing_read_reports_kind() {
        let mut s = ModelStore::<f64>::new();
        s.insert_calculated(DomainKind::Node, "a", constant(1.0, &[]), None);
        s.insert_calculated(DomainKind::Edge, "b", constant(1.0, &["a"]), None);
        let Access::Compute(_, t) = s.begin(DomainKind::Edge, "b", 1).unwrap() else {
            panic!("expected Compute");
        };
        s.finish(&t, Ok(ModelData::zeros(1)), None).unwrap();
        assert!(s.remove(DomainKind::Node, "a").is_some());
        assert_eq!(s.state(DomainKind::Edge, "b"), Some(ModelState::Stale));
        match s.begin(DomainKind::Node, "a", 1) {
            Err(ModelError::MissingModel { kind, name }) => {
                assert_eq!(kind, DomainKind::Node);
                assert_eq!(name, "a");
            }
            other => panic!("expected MissingModel, got {other:?}"),
        }
    }

    #[test]
    fn kind_of_follows_lookup_order() {
        let mut s = ModelStore::<f64>::new();
        s.insert_data(DomainKind::Edge, "m", ModelData::zeros(1));
        s.insert_data(DomainKind::Node, "m", ModelData::zeros(2));
        assert_eq!(s.kind_of("m"), Some(DomainKind::Node));
        assert_eq!(s.kind_of("nope"), None);
    }
}
