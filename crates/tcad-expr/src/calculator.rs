//! Expression-backed model calculators.

use std::sync::Arc;

use tcad_core::{DomainKind, ModelError, Precision};
use tcad_model::{InterfaceModels, ModelCalculator, ModelContext, ModelData, ModelTarget, Region};
use tracing::debug;

use crate::data::ModelExprData;
use crate::eval::evaluate;
use crate::expr::Expr;
use crate::functions::FunctionRegistry;

/// Computes a model by evaluating an expression tree in its owner.
#[derive(Debug)]
pub struct ExprCalculator<T> {
    expr: Expr,
    functions: Arc<FunctionRegistry<T>>,
}

impl<T: Precision> ExprCalculator<T> {
    /// Evaluate `expr` with the built-in functions.
    pub fn new(expr: Expr) -> Self {
        Self::with_functions(expr, Arc::new(FunctionRegistry::builtin()))
    }

    /// Evaluate `expr` with a custom registry.
    pub fn with_functions(expr: Expr, functions: Arc<FunctionRegistry<T>>) -> Self {
        Self { expr, functions }
    }

    /// The tree.
    pub fn expr(&self) -> &Expr {
        &self.expr
    }
}

impl<T: Precision> ModelCalculator<T> for ExprCalculator<T> {
    fn calculate(
        &self,
        target: &ModelTarget,
        ctx: &mut dyn ModelContext<T>,
    ) -> Result<ModelData<T>, ModelError> {
        let scope = ctx.scope();
        let evaluation = evaluate(ctx, &self.functions, &self.expr, Some(target.kind));

        // A cycle anywhere below must unwind every model on the stack.
        let cycle = evaluation.errors.iter().find_map(|e| match e.model_error() {
            Some(err @ ModelError::CyclicDependency { .. }) => Some(err.clone()),
            _ => None,
        });
        if let Some(err) = cycle {
            return Err(err);
        }

        let messages = evaluation.messages();
        match evaluation.data {
            ModelExprData::Invalid => Err(ModelError::EvaluationFailed {
                name: target.name.clone(),
                messages,
            }),
            data => {
                if !messages.is_empty() {
                    debug!(
                        %scope,
                        model = %target.name,
                        count = messages.len(),
                        "expression evaluated with errors"
                    );
                    ctx.record_errors(&target.name, messages);
                }
                match data {
                    ModelExprData::Double(v) => Ok(ModelData::uniform(v, target.len)),
                    ModelExprData::Field(kind, values) if kind == target.kind => {
                        Ok(Arc::try_unwrap(values).unwrap_or_else(|shared| (*shared).clone()))
                    }
                    other => Err(ModelError::InvalidResultType {
                        name: target.name.clone(),
                        kind: target.kind,
                        found: other.type_name().to_string(),
                    }),
                }
            }
        }
    }

    fn dependencies(&self) -> Vec<String> {
        self.expr.dependencies().into_iter().collect()
    }

    fn expression(&self) -> Option<String> {
        Some(self.expr.to_string())
    }
}

/// Declare `name` in `region` as computed from `expr`.
///
/// Returns whether an existing model was replaced.
pub fn declare_expression<T: Precision>(
    region: &mut Region<T>,
    kind: DomainKind,
    name: &str,
    expr: Expr,
) -> bool {
    region.declare(kind, name, Arc::new(ExprCalculator::new(expr)))
}

/// Declare node model `name` in `region`, evaluated only on `contact`.
pub fn declare_contact_expression<T: Precision>(
    region: &mut Region<T>,
    contact: &str,
    name: &str,
    expr: Expr,
) -> Result<bool, ModelError> {
    region.declare_contact_model(contact, name, Arc::new(ExprCalculator::new(expr)))
}

/// Declare interface node model `name` as computed from `expr`.
pub fn declare_interface_expression<T: Precision>(
    interface: &mut InterfaceModels<T>,
    name: &str,
    expr: Expr,
) -> bool {
    interface.declare(name, Arc::new(ExprCalculator::new(expr)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tcad_mesh::Topology;

    fn line() -> Region<f64> {
        let topo = Topology::line(&[0.0, 1.0, 3.0]).unwrap();
        Region::new("dev", "bulk", Arc::new(topo))
    }

    #[test]
    fn edge_difference_of_node_model() {
        let mut r = line();
        r.set_values(DomainKind::Node, "n", vec![1.0, 2.0, 4.0]).unwrap();
        declare_expression(
            &mut r,
            DomainKind::Edge,
            "e",
            Expr::model("n@n1") - Expr::model("n@n0"),
        );
        assert_eq!(r.values(DomainKind::Edge, "e").unwrap().to_vec(), vec![1.0, 2.0]);

        r.set_values(DomainKind::Node, "n", vec![0.0, 0.0, 1.0]).unwrap();
        assert!(!r.is_up_to_date(DomainKind::Edge, "e"));
        assert_eq!(r.values(DomainKind::Edge, "e").unwrap().to_vec(), vec![0.0, 1.0]);
    }

    #[test]
    fn scalar_result_becomes_uniform() {
        let mut r = line();
        r.set_parameter("T", 300.0);
        declare_expression(&mut r, DomainKind::Node, "kT", Expr::var("T") * Expr::constant(2.0));
        let v = r.values(DomainKind::Node, "kT").unwrap();
        assert_eq!(v.uniform_value(), Some(600.0));
        assert_eq!(v.len(), 3);
    }

    #[test]
    fn wrong_domain_is_reported() {
        let mut r = line();
        r.set_uniform(DomainKind::Node, "n", 1.0);
        declare_expression(&mut r, DomainKind::Edge, "bad", Expr::model("n") * Expr::constant(2.0));
        match r.values(DomainKind::Edge, "bad") {
            Err(ModelError::InvalidResultType { found, .. }) => assert_eq!(found, "nodedata"),
            other => panic!("expected InvalidResultType, got {other:?}"),
        }
    }

    #[test]
    fn missing_reference_fails_with_messages() {
        let mut r = line();
        declare_expression(&mut r, DomainKind::Node, "m", Expr::model("nothing") + Expr::var("Q"));
        match r.values(DomainKind::Node, "m") {
            Err(ModelError::EvaluationFailed { name, messages }) => {
                assert_eq!(name, "m");
                assert_eq!(messages.len(), 2);
                assert!(messages[0].contains("nothing"));
                assert!(messages[1].contains("\"Q\""));
            }
            other => panic!("expected EvaluationFailed, got {other:?}"),
        }
    }

    #[test]
    fn self_reference_is_cyclic() {
        let mut r = line();
        declare_expression(&mut r, DomainKind::Node, "a", Expr::model("b") + Expr::constant(1.0));
        declare_expression(&mut r, DomainKind::Node, "b", Expr::model("a") * Expr::constant(2.0));
        match r.values(DomainKind::Node, "a") {
            Err(ModelError::CyclicDependency { name }) => assert_eq!(name, "a"),
            other => panic!("expected CyclicDependency, got {other:?}"),
        }
        assert!(!r.is_up_to_date(DomainKind::Node, "b"));
    }

    #[test]
    fn serializes_canonical_text() {
        let calc = ExprCalculator::<f64>::new(Expr::call("B", vec![Expr::model("x")]));
        assert_eq!(calc.expression().as_deref(), Some("B(x)"));
        assert_eq!(calc.dependencies(), vec!["x".to_string()]);
    }
}
