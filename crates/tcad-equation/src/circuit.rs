//! Circuit coupling points.
//!
//! The netlist itself lives outside this workspace. A device only needs
//! the nodes its contact equations route current and charge into: each
//! gets one row after the last region row and a value that regions read
//! as a parameter of the same name.

use indexmap::IndexMap;

/// Named circuit nodes and their current values.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CircuitNodes {
    base: usize,
    nodes: IndexMap<String, f64>,
}

impl CircuitNodes {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` with an initial value. Returns its index.
    pub fn add(&mut self, name: &str, value: f64) -> usize {
        let (index, _) = self.nodes.insert_full(name.to_string(), value);
        index
    }

    /// Row of the first circuit node.
    pub fn base(&self) -> usize {
        self.base
    }

    /// Move the circuit rows to start at `base`.
    pub fn set_base(&mut self, base: usize) {
        self.base = base;
    }

    /// Global row of `name`.
    pub fn row(&self, name: &str) -> Option<usize> {
        self.nodes.get_index_of(name).map(|i| self.base + i)
    }

    /// Current value of `name`.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.nodes.get(name).copied()
    }

    /// Overwrite the value of `name`. Returns `false` if it does not exist.
    pub fn set_value(&mut self, name: &str, value: f64) -> bool {
        match self.nodes.get_mut(name) {
            Some(v) => {
                *v = value;
                true
            }
            None => false,
        }
    }

    /// Nodes with their rows and values, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize, f64)> {
        self.nodes
            .iter()
            .enumerate()
            .map(move |(i, (n, &v))| (n.as_str(), self.base + i, v))
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no nodes are registered.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_follow_base() {
        let mut c = CircuitNodes::new();
        c.add("V1", 0.0);
        c.add("V2", 1.5);
        c.set_base(10);
        assert_eq!(c.row("V2"), Some(11));
        assert_eq!(c.row("V3"), None);
        assert!(c.set_value("V1", 0.7));
        assert!(!c.set_value("V3", 0.7));
        let all: Vec<_> = c.iter().collect();
        assert_eq!(all, vec![("V1", 10, 0.7), ("V2", 11, 1.5)]);
    }
}
