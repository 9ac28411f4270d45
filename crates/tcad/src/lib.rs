//! tcad: model evaluation and equation assembly for semiconductor device
//! simulation.
//!
//! This is the top-level facade crate that re-exports the public API from
//! every tcad sub-crate.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use tcad::expr::{declare_expression, Expr};
//! use tcad::mesh::Topology;
//! use tcad::prelude::*;
//!
//! let mut device = Device::<f64>::new("diode", AssemblyConfig::default()).unwrap();
//! let topology = Arc::new(Topology::line(&[0.0, 1.0, 2.0]).unwrap());
//! device.add_region("bulk", topology).unwrap();
//! device
//!     .add_equation("bulk", BulkEquation::new("Poisson", "psi").with_edge_model("E"))
//!     .unwrap();
//!
//! let region = device.region_mut("bulk").unwrap();
//! region.set_uniform(DomainKind::Edge, "EdgeCouple", 1.0);
//! declare_expression(region, DomainKind::Edge, "E", Expr::model("x@n1") - Expr::model("x@n0"));
//!
//! let mut out = AssemblyBuffers::new();
//! device.assemble_cycle(WhatToLoad::Rhs, TimeMode::Dc, &mut out).unwrap();
//! let rhs = out.rhs_by_row();
//! assert_eq!(rhs.get(&0), Some(&1.0));
//! assert_eq!(rhs.get(&1), Some(&0.0));
//! assert_eq!(rhs.get(&2), Some(&-1.0));
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `tcad-core` | domain kinds, errors, diagnostics, precision, sparse records, configuration |
//! | [`mesh`] | `tcad-mesh` | region topology, contacts, interfaces |
//! | [`model`] | `tcad-model` | lazily evaluated model cache, regions, interface models |
//! | [`expr`] | `tcad-expr` | expression trees, evaluator, function registry |
//! | [`equation`] | `tcad-equation` | bulk/contact/interface equations, device, precision holder |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Shared vocabulary (`tcad-core`).
///
/// Domain kinds and derived-model naming, error enums, scoped
/// [`types::Diagnostics`], the [`types::Precision`] trait and the sparse
/// records an assembly pass produces.
pub use tcad_core as types;

/// Geometry (`tcad-mesh`).
pub use tcad_mesh as mesh;

/// Model cache (`tcad-model`).
///
/// [`model::Region`] and [`model::InterfaceModels`] own name-keyed models
/// that recompute only when something they read has changed.
pub use tcad_model as model;

/// Expression evaluation (`tcad-expr`).
pub use tcad_expr as expr;

/// Equations and device assembly (`tcad-equation`).
///
/// [`equation::Device`] runs the permutation pass and then DC or time
/// passes; [`equation::DeviceHolder`] hides the device's precision.
pub use tcad_equation as equation;

/// Common imports for typical tcad usage.
///
/// ```rust
/// use tcad::prelude::*;
/// ```
pub mod prelude {
    // Core vocabulary
    pub use tcad_core::{
        AssemblyBuffers, AssemblyConfig, Diagnostics, DomainKind, Extended, Precision,
        PrecisionKind, Scope, Severity, TimeMode, WhatToLoad,
    };

    // Errors
    pub use tcad_core::{AssemblyError, ModelError, UpdateError};

    // Models
    pub use tcad_model::{InterfaceModels, ModelCalculator, ModelContext, ModelData, Region};

    // Equations
    pub use tcad_equation::{
        BulkEquation, ContactEquation, Device, DeviceError, DeviceHolder, InterfaceCoupling,
        InterfaceEquation, UpdatePolicy,
    };
}
