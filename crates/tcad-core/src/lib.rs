//! Core types and traits for the tcad model/equation engine.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the vocabulary shared by every other crate in the workspace: domain
//! kinds and derived-model naming, error types, scoped diagnostics, the
//! [`Precision`] trait, sparse accumulator records and configuration.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod id;
pub mod matrix;
pub mod precision;

pub use config::{AssemblyConfig, ConfigError, KernelConfig, MeasureModels, UpdateConfig};
pub use diagnostics::{Diagnostic, Diagnostics, Scope, Severity};
pub use error::{AssemblyError, ModelError, UpdateError};
pub use id::{derivative_name, DisplayType, DomainKind, NameSuffix};
pub use matrix::{
    AssemblyBuffers, PermutationEntry, PermutationMap, RhsEntry, RowColValue, TimeMode, WhatToLoad,
};
pub use precision::{convert_slice, Extended, Precision, PrecisionKind};
