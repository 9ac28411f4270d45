//! Lazily evaluated, dependency-tracked model cache.
//!
//! Each [`Region`] and [`InterfaceModels`] owns a [`ModelStore`]: one
//! name-keyed table per [`DomainKind`](tcad_core::DomainKind) plus a
//! [`DependencyGraph`] of names. Values are held as [`ModelData`],
//! either a single uniform value or a full vector.
//!
//! # Evaluation
//!
//! A model moves `Stale -> Computing -> Fresh`. Reading a stale model runs
//! its [`ModelCalculator`] with the owner as [`ModelContext`]; a read of a
//! model that is already `Computing` fails with
//! [`ModelError::CyclicDependency`](tcad_core::ModelError::CyclicDependency).
//! Writes never recompute; they only mark the transitive dependents old.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod data;
pub mod graph;
pub mod interface;
pub mod kernels;
pub mod model;
pub mod region;
pub mod store;

pub use data::{LengthMismatch, ModelData};
pub use graph::DependencyGraph;
pub use interface::{InterfaceContext, InterfaceModels};
pub use model::{
    EvaluationNote, Model, ModelCalculator, ModelContext, ModelSource, ModelState, ModelTarget,
    ResolvedModel,
};
pub use region::{Axis, Region, RegionId};
pub use store::{Access, ModelStore};
