//! Models defined on the node pairs of an interface.
//!
//! Interface node models have one value per node pair. `m@r0` and `m@r1`
//! resolve to region node model `m` read at the pair's region-0 or
//! region-1 node. The interface does not own its regions; every read is
//! handed both of them, and a change in either region's id or revision
//! since the previous read marks old everything that reads through them.

use std::sync::Arc;

use tcad_core::{DomainKind, KernelConfig, ModelError, NameSuffix, Precision, Scope};
use tcad_mesh::Interface;
use tracing::{debug, trace};

use crate::data::ModelData;
use crate::model::{EvaluationNote, ModelCalculator, ModelContext, ModelState, ResolvedModel};
use crate::region::{Region, RegionId};
use crate::store::{Access, ModelStore};

/// Model store of one interface.
#[derive(Debug)]
pub struct InterfaceModels<T: Precision> {
    device: String,
    interface: Interface,
    models: ModelStore<T>,
    seen: Option<[(RegionId, u64); 2]>,
    kernel: KernelConfig,
    notes: Vec<EvaluationNote>,
}

impl<T: Precision> InterfaceModels<T> {
    /// Create an empty store for `interface`.
    pub fn new(device: impl Into<String>, interface: Interface) -> Self {
        Self {
            device: device.into(),
            interface,
            models: ModelStore::new(),
            seen: None,
            kernel: KernelConfig::default(),
            notes: Vec::new(),
        }
    }

    /// Use `kernel` for elementwise work.
    pub fn with_kernel(mut self, kernel: KernelConfig) -> Self {
        self.kernel = kernel;
        self
    }

    /// The interface geometry.
    pub fn interface(&self) -> &Interface {
        &self.interface
    }

    /// Interface name.
    pub fn name(&self) -> &str {
        self.interface.name()
    }

    /// Model tables, for inspection.
    pub fn models(&self) -> &ModelStore<T> {
        &self.models
    }

    /// Diagnostic scope.
    pub fn scope(&self) -> Scope {
        Scope::device(&self.device).interface(self.interface.name())
    }

    /// Region node of each pair on `side` (0 or 1).
    pub fn side_nodes(&self, side: usize) -> &[usize] {
        side_nodes(&self.interface, side)
    }

    /// Declare a computed interface node model.
    pub fn declare(&mut self, name: &str, calculator: Arc<dyn ModelCalculator<T>>) -> bool {
        debug!(interface = self.interface.name(), model = name, "declaring interface model");
        self.models
            .insert_calculated(DomainKind::Node, name, calculator, None)
    }

    /// Write an interface node model, one value per pair.
    pub fn set_values(&mut self, name: &str, values: Vec<T>) -> Result<(), ModelError> {
        let expected = self.interface.len();
        if values.len() != expected {
            return Err(ModelError::LengthMismatch {
                name: name.to_string(),
                expected,
                actual: values.len(),
            });
        }
        self.models
            .insert_data(DomainKind::Node, name, ModelData::from_vec(values));
        Ok(())
    }

    /// Write a uniform interface node model.
    pub fn set_uniform(&mut self, name: &str, value: T) {
        let len = self.interface.len();
        self.models
            .insert_data(DomainKind::Node, name, ModelData::uniform(value, len));
    }

    /// Remove a model. Returns whether it existed.
    pub fn remove_model(&mut self, name: &str) -> bool {
        self.models.remove(DomainKind::Node, name).is_some()
    }

    /// State of a model.
    pub fn state(&self, name: &str) -> Option<ModelState> {
        self.models.state(DomainKind::Node, name)
    }

    /// Whether a model's cached value is current.
    ///
    /// Region changes are only noticed on the next read.
    pub fn is_up_to_date(&self, name: &str) -> bool {
        self.state(name) == Some(ModelState::Fresh)
    }

    /// Mark `name` and its dependents old.
    pub fn mark_old(&mut self, name: &str) {
        self.models.mark_old(name);
    }

    /// Errors from interface evaluations that still produced a value.
    ///
    /// Drains the notes.
    pub fn take_evaluation_notes(&mut self) -> Vec<EvaluationNote> {
        std::mem::take(&mut self.notes)
    }

    /// Current values of interface node model `name`.
    pub fn values(
        &mut self,
        name: &str,
        region0: &mut Region<T>,
        region1: &mut Region<T>,
    ) -> Result<Arc<ModelData<T>>, ModelError> {
        self.context(region0, region1).node_values(name)
    }

    /// Resolve `name` against the interface and, through `@r0`/`@r1`, its regions.
    pub fn lookup(
        &mut self,
        name: &str,
        region0: &mut Region<T>,
        region1: &mut Region<T>,
    ) -> Result<Option<ResolvedModel<T>>, ModelError> {
        self.context(region0, region1).lookup(name)
    }

    /// The evaluation context over both regions, after refreshing stale reads.
    pub fn context<'a>(
        &'a mut self,
        region0: &'a mut Region<T>,
        region1: &'a mut Region<T>,
    ) -> InterfaceContext<'a, T> {
        self.refresh(region0, region1);
        InterfaceContext {
            device: &self.device,
            interface: &self.interface,
            models: &mut self.models,
            kernel: &self.kernel,
            notes: &mut self.notes,
            regions: [region0, region1],
        }
    }

    fn refresh(&mut self, region0: &Region<T>, region1: &Region<T>) {
        let fingerprint = [
            (region0.id(), region0.revision()),
            (region1.id(), region1.revision()),
        ];
        if self.seen == Some(fingerprint) {
            return;
        }
        let external: Vec<String> = self
            .models
            .graph()
            .referenced()
            .filter(|n| self.models.kind_of(n).is_none())
            .map(str::to_string)
            .collect();
        trace!(
            interface = self.interface.name(),
            count = external.len(),
            "regions changed, invalidating region reads"
        );
        for name in &external {
            self.models.mark_old(name);
        }
        self.seen = Some(fingerprint);
    }
}

fn side_nodes(interface: &Interface, side: usize) -> &[usize] {
    if side == 0 {
        interface.nodes0()
    } else {
        interface.nodes1()
    }
}

/// Evaluation context of an interface with both of its regions borrowed.
#[derive(Debug)]
pub struct InterfaceContext<'a, T: Precision> {
    device: &'a str,
    interface: &'a Interface,
    models: &'a mut ModelStore<T>,
    kernel: &'a KernelConfig,
    notes: &'a mut Vec<EvaluationNote>,
    regions: [&'a mut Region<T>; 2],
}

impl<T: Precision> InterfaceContext<'_, T> {
    /// The region on `side` (0 or 1).
    pub fn region(&mut self, side: usize) -> &mut Region<T> {
        &mut *self.regions[side.min(1)]
    }

    /// Current values of interface node model `name`.
    pub fn node_values(&mut self, name: &str) -> Result<Arc<ModelData<T>>, ModelError> {
        let len = self.interface.len();
        match self.models.begin(DomainKind::Node, name, len)? {
            Access::Ready(v) => Ok(v),
            Access::Compute(calc, target) => {
                debug!(interface = self.interface.name(), model = name, "computing interface model");
                let result = calc.calculate(&target, self);
                self.models.finish(&target, result, None)
            }
        }
    }
}

impl<T: Precision> ModelContext<T> for InterfaceContext<'_, T> {
    fn scope(&self) -> Scope {
        Scope::device(self.device).interface(self.interface.name())
    }

    fn domain_len(&self, kind: DomainKind) -> usize {
        match kind {
            DomainKind::Node => self.interface.len(),
            DomainKind::Edge | DomainKind::TriangleEdge | DomainKind::TetrahedronEdge => 0,
        }
    }

    fn element_edge_map(&self, _kind: DomainKind) -> Vec<usize> {
        Vec::new()
    }

    fn lookup(&mut self, name: &str) -> Result<Option<ResolvedModel<T>>, ModelError> {
        if self.models.contains(DomainKind::Node, name) {
            let data = self.node_values(name)?;
            return Ok(Some(ResolvedModel {
                kind: DomainKind::Node,
                data,
            }));
        }
        let Some((base, NameSuffix::InterfaceSide(side))) = NameSuffix::split(name) else {
            return Ok(None);
        };
        let region = &mut *self.regions[side];
        if !region.models().contains(DomainKind::Node, base) {
            return Ok(None);
        }
        let values = region.values(DomainKind::Node, base)?;
        let nodes = side_nodes(self.interface, side);
        Ok(Some(ResolvedModel {
            kind: DomainKind::Node,
            data: Arc::new(values.gather(nodes, self.kernel)),
        }))
    }

    fn variable(&self, name: &str) -> Option<f64> {
        self.regions
            .iter()
            .find_map(|r| r.parameter(name))
    }

    fn kernel(&self) -> &KernelConfig {
        self.kernel
    }

    fn record_errors(&mut self, model: &str, messages: Vec<String>) {
        self.notes.extend(messages.into_iter().map(|message| EvaluationNote {
            model: model.to_string(),
            message,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelTarget;
    use tcad_mesh::Topology;

    /// `out = a - b`.
    #[derive(Debug)]
    struct Diff(&'static str, &'static str);

    impl ModelCalculator<f64> for Diff {
        fn calculate(
            &self,
            target: &ModelTarget,
            ctx: &mut dyn ModelContext<f64>,
        ) -> Result<ModelData<f64>, ModelError> {
            let a = resolve(ctx, target.kind, self.0)?;
            let b = resolve(ctx, target.kind, self.1)?;
            let mut out = (*a.data).clone();
            out.zip_with(&b.data, ctx.kernel(), |x, y| x - y)
                .map_err(|e| ModelError::LengthMismatch {
                    name: target.name.clone(),
                    expected: e.left,
                    actual: e.right,
                })?;
            Ok(out)
        }

        fn dependencies(&self) -> Vec<String> {
            vec![self.0.to_string(), self.1.to_string()]
        }
    }

    fn resolve(
        ctx: &mut dyn ModelContext<f64>,
        kind: DomainKind,
        name: &str,
    ) -> Result<ResolvedModel<f64>, ModelError> {
        ctx.lookup(name)?.ok_or_else(|| ModelError::MissingModel {
            kind,
            name: name.to_string(),
        })
    }

    fn pair() -> (Region<f64>, Region<f64>, InterfaceModels<f64>) {
        let left = Region::new("dev", "left", Arc::new(Topology::line(&[0.0, 1.0]).unwrap()));
        let right = Region::new("dev", "right", Arc::new(Topology::line(&[1.0, 2.0]).unwrap()));
        let iface = Interface::new("mid", ("left", 2), ("right", 2), &[(1, 0)]).unwrap();
        (left, right, InterfaceModels::new("dev", iface))
    }

    #[test]
    fn side_references_read_region_nodes() {
        let (mut l, mut r, mut i) = pair();
        l.set_values(DomainKind::Node, "phi", vec![0.0, 0.7]).unwrap();
        r.set_values(DomainKind::Node, "phi", vec![0.2, 0.0]).unwrap();
        i.declare("jump", Arc::new(Diff("phi@r0", "phi@r1")));
        let v = i.values("jump", &mut l, &mut r).unwrap();
        assert!((v.to_vec()[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn region_write_invalidates_on_next_read() {
        let (mut l, mut r, mut i) = pair();
        l.set_values(DomainKind::Node, "phi", vec![0.0, 1.0]).unwrap();
        r.set_values(DomainKind::Node, "phi", vec![0.0, 0.0]).unwrap();
        i.declare("jump", Arc::new(Diff("phi@r0", "phi@r1")));
        i.values("jump", &mut l, &mut r).unwrap();
        assert!(i.is_up_to_date("jump"));

        r.set_values(DomainKind::Node, "phi", vec![0.25, 0.0]).unwrap();
        let v = i.values("jump", &mut l, &mut r).unwrap();
        assert_eq!(v.to_vec(), vec![0.75]);
    }

    #[test]
    fn interface_data_models_combine() {
        let (mut l, mut r, mut i) = pair();
        i.set_uniform("a", 3.0);
        i.set_values("b", vec![1.0]).unwrap();
        i.declare("d", Arc::new(Diff("a", "b")));
        assert_eq!(i.values("d", &mut l, &mut r).unwrap().to_vec(), vec![2.0]);
        assert!(matches!(
            i.set_values("c", vec![1.0, 2.0]),
            Err(ModelError::LengthMismatch { expected: 1, .. })
        ));
    }

    #[test]
    fn unknown_side_reference_is_unresolved() {
        let (mut l, mut r, mut i) = pair();
        r.set_uniform(DomainKind::Node, "x", 1.0);
        assert!(i.lookup("nothing@r0", &mut l, &mut r).unwrap().is_none());
        assert!(i.lookup("x@r1", &mut l, &mut r).unwrap().is_some());
    }
}
