//! Error types for mesh construction.

use std::fmt;

/// Errors arising from topology, contact, or interface construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MeshError {
    /// Fewer nodes than the topology needs.
    TooFewNodes {
        /// Nodes supplied.
        count: usize,
        /// Minimum required.
        min: usize,
    },
    /// An element refers to a node that does not exist.
    NodeOutOfRange {
        /// Element index.
        element: usize,
        /// Offending node index.
        node: usize,
        /// Number of nodes.
        node_count: usize,
    },
    /// An element repeats a node.
    DegenerateElement {
        /// Element index.
        element: usize,
    },
    /// A contact or interface has no nodes.
    EmptyBoundary {
        /// Boundary name.
        name: String,
    },
    /// A contact or interface refers to a node outside its region.
    BoundaryNodeOutOfRange {
        /// Boundary name.
        name: String,
        /// Offending node index.
        node: usize,
        /// Number of nodes in the region.
        node_count: usize,
    },
}

impl fmt::Display for MeshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooFewNodes { count, min } => {
                write!(f, "topology needs at least {min} nodes, got {count}")
            }
            Self::NodeOutOfRange {
                element,
                node,
                node_count,
            } => write!(
                f,
                "element {element} refers to node {node}, but there are {node_count} nodes"
            ),
            Self::DegenerateElement { element } => {
                write!(f, "element {element} repeats a node")
            }
            Self::EmptyBoundary { name } => write!(f, "boundary \"{name}\" has no nodes"),
            Self::BoundaryNodeOutOfRange {
                name,
                node,
                node_count,
            } => write!(
                f,
                "boundary \"{name}\" refers to node {node}, but the region has {node_count} nodes"
            ),
        }
    }
}

impl std::error::Error for MeshError {}
