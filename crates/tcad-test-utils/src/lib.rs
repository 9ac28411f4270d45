//! Fixtures for tcad development.
//!
//! Provides small meshes with their geometric measure models already
//! written ([`line_region`], [`triangle_region`]), two-region devices
//! ([`two_region_device`]) and helpers for inspecting a
//! [`Diagnostics`](tcad_core::Diagnostics) log.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

pub use fixtures::{
    line_region, line_topology, messages_at, triangle_region, triangle_topology,
    two_region_device, write_line_measures,
};
