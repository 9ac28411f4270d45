//! Region topology, contacts and interfaces.
//!
//! Mesh generation and import are out of scope; this crate holds the
//! already-discretized geometry a region is built on and derives the
//! connectivity tables the model cache needs: edges, per-element local
//! edges, and node-to-edge adjacency.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod boundary;
pub mod error;
pub mod topology;

pub use boundary::{Contact, Interface};
pub use error::MeshError;
pub use topology::{
    Edge, ElementEdge, Tetrahedron, Topology, Triangle, TETRAHEDRON_EDGES, TRIANGLE_EDGES,
};
