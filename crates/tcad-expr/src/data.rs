//! Values flowing through expression evaluation.

use std::sync::Arc;

use tcad_core::{DomainKind, KernelConfig, Precision};
use tcad_model::ModelData;

use crate::error::EvalError;

/// An intermediate evaluation result.
#[derive(Clone, Debug, PartialEq)]
pub enum ModelExprData<T> {
    /// A scalar, broadcast against any field.
    Double(T),
    /// Values over a domain.
    Field(DomainKind, Arc<ModelData<T>>),
    /// Evaluation failed; errors were recorded.
    Invalid,
}

impl<T: Precision> ModelExprData<T> {
    /// A field result.
    pub fn field(kind: DomainKind, data: ModelData<T>) -> Self {
        Self::Field(kind, Arc::new(data))
    }

    /// Type name used in messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Double(_) => "double",
            Self::Field(DomainKind::Node, _) => "nodedata",
            Self::Field(DomainKind::Edge, _) => "edgedata",
            Self::Field(DomainKind::TriangleEdge, _) => "triangleedgedata",
            Self::Field(DomainKind::TetrahedronEdge, _) => "tetrahedronedgedata",
            Self::Invalid => "invalid",
        }
    }

    /// Whether evaluation failed.
    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid)
    }

    /// Domain of a field result.
    pub fn kind(&self) -> Option<DomainKind> {
        match self {
            Self::Field(kind, _) => Some(*kind),
            Self::Double(_) | Self::Invalid => None,
        }
    }

    /// Whether the value is exactly zero everywhere.
    pub fn is_zero(&self) -> bool {
        match self {
            Self::Double(v) => *v == T::zero(),
            Self::Field(_, d) => d.is_zero(),
            Self::Invalid => false,
        }
    }

    /// Whether every element is non-NaN and bounded.
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Double(v) => v.is_finite(),
            Self::Field(_, d) => match d.uniform_value() {
                Some(v) => v.is_finite(),
                None => d.values().iter().all(|v| v.is_finite()),
            },
            Self::Invalid => true,
        }
    }

    /// The field data, expanded from a scalar if needed, on `kind` with `len` elements.
    ///
    /// Edge data is widened through `edge_map` when `kind` is an
    /// element-edge domain.
    pub(crate) fn lift(
        &self,
        kind: DomainKind,
        len: usize,
        edge_map: &[usize],
        cfg: &KernelConfig,
    ) -> Option<ModelData<T>> {
        match self {
            Self::Double(v) => Some(ModelData::uniform(*v, len)),
            Self::Field(k, d) if *k == kind => Some((**d).clone()),
            Self::Field(DomainKind::Edge, d) if kind.is_element_edge() => {
                Some(d.gather(edge_map, cfg))
            }
            Self::Field(..) | Self::Invalid => None,
        }
    }
}

/// Common domain of two operands, or `None` when both are scalars.
///
/// Node data only combines with node data. Edge data widens into an
/// element-edge domain. Triangle and tetrahedron edges never mix.
pub fn common_domain(
    context: &str,
    left: Option<DomainKind>,
    right: Option<DomainKind>,
) -> Result<Option<DomainKind>, EvalError> {
    let (a, b) = match (left, right) {
        (None, x) | (x, None) => return Ok(x),
        (Some(a), Some(b)) => (a, b),
    };
    if a == b {
        return Ok(Some(a));
    }
    if a.widens_to(b) {
        return Ok(Some(b));
    }
    if b.widens_to(a) {
        return Ok(Some(a));
    }
    Err(EvalError::IncompatibleDomains {
        context: context.to_string(),
        left: kind_type_name(a),
        right: kind_type_name(b),
    })
}

pub(crate) fn kind_type_name(kind: DomainKind) -> &'static str {
    match kind {
        DomainKind::Node => "nodedata",
        DomainKind::Edge => "edgedata",
        DomainKind::TriangleEdge => "triangleedgedata",
        DomainKind::TetrahedronEdge => "tetrahedronedgedata",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_rules() {
        use DomainKind::*;
        assert_eq!(common_domain("+", None, None).unwrap(), None);
        assert_eq!(common_domain("+", Some(Node), None).unwrap(), Some(Node));
        assert_eq!(common_domain("+", Some(Edge), Some(TriangleEdge)).unwrap(), Some(TriangleEdge));
        assert_eq!(common_domain("+", Some(TetrahedronEdge), Some(Edge)).unwrap(), Some(TetrahedronEdge));
        match common_domain("*", Some(Node), Some(Edge)) {
            Err(EvalError::IncompatibleDomains { left, right, .. }) => {
                assert_eq!((left, right), ("nodedata", "edgedata"));
            }
            other => panic!("expected IncompatibleDomains, got {other:?}"),
        }
        assert!(common_domain("*", Some(TriangleEdge), Some(TetrahedronEdge)).is_err());
    }

    #[test]
    fn lift_widens_edge_data() {
        let cfg = KernelConfig::serial();
        let edges = ModelExprData::field(DomainKind::Edge, ModelData::from_vec(vec![1.0f64, 2.0]));
        let widened = edges
            .lift(DomainKind::TriangleEdge, 3, &[0, 1, 1], &cfg)
            .unwrap();
        assert_eq!(widened.to_vec(), vec![1.0, 2.0, 2.0]);
        assert!(edges.lift(DomainKind::Node, 2, &[], &cfg).is_none());
        assert_eq!(
            ModelExprData::Double(4.0f64).lift(DomainKind::Node, 2, &[], &cfg),
            Some(ModelData::uniform(4.0, 2))
        );
    }

    #[test]
    fn type_names() {
        assert_eq!(ModelExprData::Double(tcad_core::Extended::from(1.0)).type_name(), "double");
        assert_eq!(ModelExprData::<f64>::Invalid.type_name(), "invalid");
        let tet = ModelExprData::field(DomainKind::TetrahedronEdge, ModelData::<f64>::zeros(6));
        assert_eq!(tet.type_name(), "tetrahedronedgedata");
        assert!(tet.is_zero());
    }
}
