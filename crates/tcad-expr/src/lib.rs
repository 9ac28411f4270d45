//! Expression trees and their evaluation over model fields.
//!
//! An [`Expr`] references models, parameters and registry functions by
//! name. The [`Evaluator`] resolves those names through a
//! [`ModelContext`](tcad_model::ModelContext), combining operands by the
//! domain rules in [`common_domain`]:
//!
//! - a scalar broadcasts against any field
//! - node data combines only with node data
//! - edge data widens onto a triangle-edge or tetrahedron-edge domain
//! - triangle-edge and tetrahedron-edge data never mix
//!
//! [`ExprCalculator`] adapts a tree to the model cache.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod calculator;
pub mod data;
pub mod error;
pub mod eval;
pub mod expr;
pub mod functions;
pub mod math;

pub use calculator::{
    declare_contact_expression, declare_expression, declare_interface_expression, ExprCalculator,
};
pub use data::{common_domain, ModelExprData};
pub use error::EvalError;
pub use eval::{evaluate, Evaluation, Evaluator};
pub use expr::Expr;
pub use functions::{Function, FunctionRegistry, Reduction};
