//! Equations, contacts, interfaces and the device that assembles them.
//!
//! A [`BulkEquation`] integrates region models over node volumes, edge
//! couples and element-edge couples, scattering residual and Jacobian
//! records into [`AssemblyBuffers`](tcad_core::AssemblyBuffers). A
//! [`ContactEquation`] replaces the bulk rows of the nodes it owns and
//! may drive a circuit node; an [`InterfaceEquation`] ties the two
//! regions of an interface together in one of three
//! [`InterfaceCoupling`] modes.
//!
//! # Cycle
//!
//! A [`Device`] assembles in two phases:
//!
//! 1. [`Device::load_permutations`] collects which rows are dropped or
//!    moved by contacts and interfaces.
//! 2. [`Device::assemble`] appends DC or time records with every
//!    permutation applied.
//!
//! Running the second phase without the first fails with
//! [`AssemblyError::PermutationsNotLoaded`](tcad_core::AssemblyError::PermutationsNotLoaded).
//! [`DeviceHolder`] wraps a device of either precision and converts at
//! its boundary.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

mod assemble;
pub mod circuit;
pub mod command;
pub mod contact;
pub mod device;
pub mod equation;
pub mod error;
pub mod holder;
pub mod interface;
pub mod update;

pub use circuit::CircuitNodes;
pub use command::{
    block, model_command, serialize_interface_model, serialize_model, serialize_region, Command,
};
pub use contact::{active_nodes, ContactEquation, ContactModels};
pub use device::Device;
pub use equation::{BulkEquation, EquationModels};
pub use error::DeviceError;
pub use holder::DeviceHolder;
pub use interface::{InterfaceCoupling, InterfaceEquation};
pub use update::{apply_update, UpdatePolicy, UpdateStats};
