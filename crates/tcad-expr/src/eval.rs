//! Tree-walking evaluation against a model owner.
//!
//! Evaluation never fails outright. Problems are recorded as
//! [`EvalError`]s and poison the affected sub-tree to
//! [`ModelExprData::Invalid`]; sibling sub-trees keep evaluating so that
//! one call reports every problem it can find.
//!
//! Results of sub-trees are cached by [`Expr::cache_key`] for the
//! duration of one evaluation, so a repeated sub-expression is computed
//! once. Invalid results are never cached.

use std::borrow::Cow;

use indexmap::IndexMap;
use rayon::prelude::*;
use tcad_core::{DomainKind, Precision};
use tcad_model::{ModelContext, ModelData};
use tracing::trace;

use crate::data::{common_domain, kind_type_name, ModelExprData};
use crate::error::EvalError;
use crate::expr::Expr;
use crate::functions::{Function, FunctionRegistry, Reduction};
use crate::math;

/// The result of one evaluation.
#[derive(Clone, Debug, PartialEq)]
pub struct Evaluation<T> {
    /// The value, `Invalid` when a problem poisoned the root.
    pub data: ModelExprData<T>,
    /// Everything that went wrong, in discovery order.
    pub errors: Vec<EvalError>,
}

impl<T: Precision> Evaluation<T> {
    /// Whether the root produced a value.
    pub fn is_valid(&self) -> bool {
        !self.data.is_invalid()
    }

    /// Rendered error messages.
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }
}

/// Operands lifted onto their common domain.
enum Operands<T> {
    Scalars(Vec<T>),
    Fields(DomainKind, Vec<ModelData<T>>),
}

/// Evaluates expression trees against one owner.
pub struct Evaluator<'a, T: Precision> {
    ctx: &'a mut dyn ModelContext<T>,
    functions: &'a FunctionRegistry<T>,
    cache: IndexMap<String, ModelExprData<T>>,
    edge_maps: IndexMap<DomainKind, Vec<usize>>,
    errors: Vec<EvalError>,
}

/// Evaluate `expr` once against `ctx`.
pub fn evaluate<T: Precision>(
    ctx: &mut dyn ModelContext<T>,
    functions: &FunctionRegistry<T>,
    expr: &Expr,
    expected: Option<DomainKind>,
) -> Evaluation<T> {
    Evaluator::new(ctx, functions).evaluate(expr, expected)
}

impl<'a, T: Precision> Evaluator<'a, T> {
    /// An evaluator with an empty cache.
    pub fn new(ctx: &'a mut dyn ModelContext<T>, functions: &'a FunctionRegistry<T>) -> Self {
        Self {
            ctx,
            functions,
            cache: IndexMap::new(),
            edge_maps: IndexMap::new(),
            errors: Vec::new(),
        }
    }

    /// Evaluate `expr`.
    ///
    /// When `expected` is an element-edge domain and the tree yields edge
    /// data, the result is widened onto that domain.
    pub fn evaluate(mut self, expr: &Expr, expected: Option<DomainKind>) -> Evaluation<T> {
        let mut data = self.eval(expr);
        if let Some(target) = expected {
            if target.is_element_edge() && data.kind() == Some(DomainKind::Edge) {
                data = self.widen(data, target);
            }
        }
        trace!(
            expression = %expr,
            result = data.type_name(),
            errors = self.errors.len(),
            "evaluated"
        );
        Evaluation {
            data,
            errors: self.errors,
        }
    }

    fn eval(&mut self, expr: &Expr) -> ModelExprData<T> {
        let key = match expr {
            Expr::Constant(v) => return ModelExprData::Double(T::narrow(*v)),
            Expr::Invalid(text) => {
                self.errors.push(EvalError::InvalidExpression { text: text.clone() });
                return ModelExprData::Invalid;
            }
            _ => expr.cache_key(),
        };
        if let Some(hit) = self.cache.get(&key) {
            return hit.clone();
        }
        let mut out = self.eval_node(expr);
        if !out.is_finite() {
            self.errors.push(EvalError::NonFinite {
                expression: expr.to_string(),
            });
            out = ModelExprData::Invalid;
        }
        if !out.is_invalid() {
            self.cache.insert(key, out.clone());
        }
        out
    }

    fn eval_node(&mut self, expr: &Expr) -> ModelExprData<T> {
        match expr {
            Expr::Constant(v) => ModelExprData::Double(T::narrow(*v)),
            Expr::Invalid(text) => {
                self.errors.push(EvalError::InvalidExpression { text: text.clone() });
                ModelExprData::Invalid
            }
            Expr::Variable(name) => match self.ctx.variable(name) {
                Some(v) => ModelExprData::Double(T::narrow(v)),
                None => {
                    self.errors.push(EvalError::MissingVariable { name: name.clone() });
                    ModelExprData::Invalid
                }
            },
            Expr::Model(name) => self.model(name),
            Expr::Add(terms) => {
                let mut iter = terms.iter();
                let Some(first) = iter.next() else {
                    return ModelExprData::Double(T::zero());
                };
                let mut acc = self.eval(first);
                for term in iter {
                    let rhs = self.eval(term);
                    acc = self.apply("+", Function::Binary(|a, b| a + b), &[acc, rhs], false);
                }
                acc
            }
            Expr::Product(factors) => {
                let mut acc = ModelExprData::Double(T::one());
                for factor in factors {
                    let rhs = self.eval(factor);
                    if matches!(rhs, ModelExprData::Double(v) if v == T::zero()) {
                        return ModelExprData::Double(T::zero());
                    }
                    acc = self.apply("*", Function::Binary(|a, b| a * b), &[acc, rhs], false);
                }
                acc
            }
            Expr::If(cond, then) => match self.eval(cond) {
                ModelExprData::Invalid => ModelExprData::Invalid,
                ModelExprData::Double(c) if c == T::zero() => ModelExprData::Double(T::zero()),
                ModelExprData::Double(_) => self.eval(then),
                mask => {
                    let value = self.eval(then);
                    self.apply("if", Function::Binary(|a, b| a * b), &[mask, value], false)
                }
            },
            Expr::IfElse(cond, then, otherwise) => match self.eval(cond) {
                ModelExprData::Invalid => ModelExprData::Invalid,
                ModelExprData::Double(c) if c != T::zero() => self.eval(then),
                ModelExprData::Double(_) => self.eval(otherwise),
                mask => {
                    let a = self.eval(then);
                    let b = self.eval(otherwise);
                    self.apply("ifelse", Function::Ternary(math::select), &[mask, a, b], false)
                }
            },
            Expr::Call(name, args) => {
                let Some(function) = self.functions.get(name) else {
                    self.errors.push(EvalError::UnknownFunction { name: name.clone() });
                    return ModelExprData::Invalid;
                };
                if function.arity() != args.len() {
                    self.errors.push(EvalError::WrongArity {
                        name: name.clone(),
                        expected: function.arity(),
                        found: args.len(),
                    });
                    return ModelExprData::Invalid;
                }
                let values: Vec<_> = args.iter().map(|a| self.eval(a)).collect();
                self.apply(name, function, &values, true)
            }
        }
    }

    fn model(&mut self, name: &str) -> ModelExprData<T> {
        match self.ctx.lookup(name) {
            Ok(Some(resolved)) => ModelExprData::Field(resolved.kind, resolved.data),
            Ok(None) => {
                self.errors.push(EvalError::MissingModel {
                    name: name.to_string(),
                });
                ModelExprData::Invalid
            }
            Err(source) => {
                self.errors.push(EvalError::Model {
                    name: name.to_string(),
                    source,
                });
                ModelExprData::Invalid
            }
        }
    }

    fn ensure_edge_map(&mut self, kind: DomainKind) {
        if kind.is_element_edge() && !self.edge_maps.contains_key(&kind) {
            let map = self.ctx.element_edge_map(kind);
            self.edge_maps.insert(kind, map);
        }
    }

    fn widen(&mut self, data: ModelExprData<T>, target: DomainKind) -> ModelExprData<T> {
        self.ensure_edge_map(target);
        let map = self.edge_maps.get(&target).map(Vec::as_slice).unwrap_or(&[]);
        match data.lift(target, map.len(), map, self.ctx.kernel()) {
            Some(widened) => ModelExprData::field(target, widened),
            None => data,
        }
    }

    /// Lift `args` onto their common domain, recording why when impossible.
    fn operands(
        &mut self,
        context: &str,
        args: &[ModelExprData<T>],
        report_invalid: bool,
    ) -> Option<Operands<T>> {
        if args.iter().any(ModelExprData::is_invalid) {
            if report_invalid {
                self.errors.push(EvalError::InvalidArgument {
                    function: context.to_string(),
                });
            }
            return None;
        }
        let mut domain = None;
        for arg in args {
            match common_domain(context, domain, arg.kind()) {
                Ok(d) => domain = d,
                Err(e) => {
                    self.errors.push(e);
                    return None;
                }
            }
        }
        let Some(kind) = domain else {
            let scalars = args
                .iter()
                .filter_map(|a| match a {
                    ModelExprData::Double(v) => Some(*v),
                    ModelExprData::Field(..) | ModelExprData::Invalid => None,
                })
                .collect();
            return Some(Operands::Scalars(scalars));
        };

        self.ensure_edge_map(kind);
        let map = self.edge_maps.get(&kind).map(Vec::as_slice).unwrap_or(&[]);
        let cfg = self.ctx.kernel();
        let len = args
            .iter()
            .find_map(|a| match a {
                ModelExprData::Field(k, d) if *k == kind => Some(d.len()),
                _ => None,
            })
            .unwrap_or(map.len());

        let mut fields = Vec::with_capacity(args.len());
        for arg in args {
            let Some(data) = arg.lift(kind, len, map, cfg) else {
                self.errors.push(EvalError::IncompatibleDomains {
                    context: context.to_string(),
                    left: arg.type_name(),
                    right: kind_type_name(kind),
                });
                return None;
            };
            if data.len() != len {
                self.errors.push(EvalError::LengthMismatch {
                    context: context.to_string(),
                    left: len,
                    right: data.len(),
                });
                return None;
            }
            fields.push(data);
        }
        Some(Operands::Fields(kind, fields))
    }

    fn apply(
        &mut self,
        context: &str,
        function: Function<T>,
        args: &[ModelExprData<T>],
        report_invalid: bool,
    ) -> ModelExprData<T> {
        if let Function::Reduce(reduction) = function {
            return self.reduce(context, reduction, args);
        }
        let Some(operands) = self.operands(context, args, report_invalid) else {
            return ModelExprData::Invalid;
        };
        let cfg = self.ctx.kernel();
        match operands {
            Operands::Scalars(s) => ModelExprData::Double(match function {
                Function::Unary(f) => f(s[0]),
                Function::Binary(f) => f(s[0], s[1]),
                Function::Ternary(f) => f(s[0], s[1], s[2]),
                Function::Reduce(_) => s[0],
            }),
            Operands::Fields(kind, fields) => {
                let mut it = fields.into_iter();
                let out = match (function, it.next(), it.next(), it.next()) {
                    (Function::Unary(f), Some(mut a), None, None) => {
                        a.map(cfg, f);
                        a
                    }
                    (Function::Binary(f), Some(mut a), Some(b), None) => {
                        // Lengths were checked when lifting.
                        if a.zip_with(&b, cfg, f).is_err() {
                            return ModelExprData::Invalid;
                        }
                        a
                    }
                    (Function::Ternary(f), Some(a), Some(b), Some(c)) => ternary(f, &a, &b, &c, cfg),
                    _ => {
                        self.errors.push(EvalError::InvalidArgument {
                            function: context.to_string(),
                        });
                        return ModelExprData::Invalid;
                    }
                };
                ModelExprData::field(kind, out)
            }
        }
    }

    fn reduce(
        &mut self,
        context: &str,
        reduction: Reduction,
        args: &[ModelExprData<T>],
    ) -> ModelExprData<T> {
        match args {
            [ModelExprData::Double(v)] => ModelExprData::Double(*v),
            [ModelExprData::Field(_, d)] => ModelExprData::Double(match d.uniform_value() {
                Some(v) => reduction.apply_uniform(v, d.len()),
                None => reduction.apply(&d.values()),
            }),
            _ => {
                self.errors.push(EvalError::InvalidArgument {
                    function: context.to_string(),
                });
                ModelExprData::Invalid
            }
        }
    }
}

fn ternary<T: Precision>(
    f: fn(T, T, T) -> T,
    a: &ModelData<T>,
    b: &ModelData<T>,
    c: &ModelData<T>,
    cfg: &tcad_core::KernelConfig,
) -> ModelData<T> {
    if let (Some(x), Some(y), Some(z)) = (a.uniform_value(), b.uniform_value(), c.uniform_value()) {
        return ModelData::uniform(f(x, y, z), a.len());
    }
    let (x, y, z): (Cow<'_, [T]>, Cow<'_, [T]>, Cow<'_, [T]>) = (a.values(), b.values(), c.values());
    let len = x.len();
    let out = if cfg.is_parallel(len) {
        (0..len).into_par_iter().map(|i| f(x[i], y[i], z[i])).collect()
    } else {
        (0..len).map(|i| f(x[i], y[i], z[i])).collect()
    };
    ModelData::from_vec(out)
}
