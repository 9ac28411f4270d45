//! Contacts and interfaces.
//!
//! A contact is a named node subset of one region. An interface pairs
//! nodes of two regions that sit at the same coordinates; pair `i` is
//! `(nodes0[i], nodes1[i])`.

use crate::error::MeshError;

/// A named set of boundary nodes of one region.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contact {
    name: String,
    region: String,
    nodes: Vec<usize>,
}

impl Contact {
    /// Create a contact on `region` covering `nodes`.
    ///
    /// Nodes are deduplicated and sorted.
    pub fn new(
        name: impl Into<String>,
        region: impl Into<String>,
        mut nodes: Vec<usize>,
        node_count: usize,
    ) -> Result<Self, MeshError> {
        let name = name.into();
        if nodes.is_empty() {
            return Err(MeshError::EmptyBoundary { name });
        }
        if let Some(&node) = nodes.iter().find(|&&n| n >= node_count) {
            return Err(MeshError::BoundaryNodeOutOfRange {
                name,
                node,
                node_count,
            });
        }
        nodes.sort_unstable();
        nodes.dedup();
        Ok(Self {
            name,
            region: region.into(),
            nodes,
        })
    }

    /// Contact name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning region name.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Contact nodes, ascending.
    pub fn nodes(&self) -> &[usize] {
        &self.nodes
    }

    /// Whether `node` is on this contact.
    pub fn contains(&self, node: usize) -> bool {
        self.nodes.binary_search(&node).is_ok()
    }
}

/// Coincident node pairs shared by two regions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Interface {
    name: String,
    region0: String,
    region1: String,
    nodes0: Vec<usize>,
    nodes1: Vec<usize>,
}

impl Interface {
    /// Create an interface from `(region0 node, region1 node)` pairs.
    pub fn new(
        name: impl Into<String>,
        region0: (&str, usize),
        region1: (&str, usize),
        pairs: &[(usize, usize)],
    ) -> Result<Self, MeshError> {
        let name = name.into();
        if pairs.is_empty() {
            return Err(MeshError::EmptyBoundary { name });
        }
        let (r0, count0) = region0;
        let (r1, count1) = region1;
        for &(a, b) in pairs {
            for (node, node_count) in [(a, count0), (b, count1)] {
                if node >= node_count {
                    return Err(MeshError::BoundaryNodeOutOfRange {
                        name,
                        node,
                        node_count,
                    });
                }
            }
        }
        Ok(Self {
            name,
            region0: r0.to_string(),
            region1: r1.to_string(),
            nodes0: pairs.iter().map(|p| p.0).collect(),
            nodes1: pairs.iter().map(|p| p.1).collect(),
        })
    }

    /// Interface name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// First region name.
    pub fn region0(&self) -> &str {
        &self.region0
    }

    /// Second region name.
    pub fn region1(&self) -> &str {
        &self.region1
    }

    /// Region-0 node of each pair.
    pub fn nodes0(&self) -> &[usize] {
        &self.nodes0
    }

    /// Region-1 node of each pair.
    pub fn nodes1(&self) -> &[usize] {
        &self.nodes1
    }

    /// Number of node pairs.
    pub fn len(&self) -> usize {
        self.nodes0.len()
    }

    /// Always `false`: construction rejects empty interfaces.
    pub fn is_empty(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contact_nodes_sorted_and_deduplicated() {
        let c = Contact::new("anode", "bulk", vec![3, 0, 3], 4).unwrap();
        assert_eq!(c.nodes(), &[0, 3]);
        assert!(c.contains(3));
        assert!(!c.contains(1));
    }

    #[test]
    fn contact_rejects_foreign_nodes() {
        assert_eq!(
            Contact::new("c", "r", vec![7], 4).unwrap_err(),
            MeshError::BoundaryNodeOutOfRange {
                name: "c".into(),
                node: 7,
                node_count: 4,
            }
        );
        assert!(matches!(
            Contact::new("c", "r", vec![], 4),
            Err(MeshError::EmptyBoundary { .. })
        ));
    }

    #[test]
    fn interface_splits_pairs() {
        let i = Interface::new("ox_si", ("oxide", 3), ("silicon", 5), &[(2, 0), (1, 4)]).unwrap();
        assert_eq!(i.nodes0(), &[2, 1]);
        assert_eq!(i.nodes1(), &[0, 4]);
        assert_eq!(i.len(), 2);
    }

    #[test]
    fn interface_checks_both_sides() {
        assert!(matches!(
            Interface::new("i", ("a", 3), ("b", 2), &[(0, 2)]),
            Err(MeshError::BoundaryNodeOutOfRange { node: 2, node_count: 2, .. })
        ));
    }
}
