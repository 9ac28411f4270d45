//! Name-keyed dependency graph.
//!
//! Edges are between names, never between model objects, so removing or
//! replacing a model cannot leave a dangling reference. A name may have
//! dependents before any model of that name exists.

use indexmap::{IndexMap, IndexSet};

/// `model -> upstream names` and the reverse index.
#[derive(Clone, Debug, Default)]
pub struct DependencyGraph {
    upstream: IndexMap<String, IndexSet<String>>,
    downstream: IndexMap<String, IndexSet<String>>,
}

impl DependencyGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `model` must be invalidated when `upstream` changes.
    pub fn register(&mut self, model: &str, upstream: &str) {
        self.upstream
            .entry(model.to_string())
            .or_default()
            .insert(upstream.to_string());
        self.downstream
            .entry(upstream.to_string())
            .or_default()
            .insert(model.to_string());
    }

    /// Drop every upstream registration of `model`.
    ///
    /// Models that depend on `model` keep their registrations.
    pub fn unregister(&mut self, model: &str) {
        let Some(ups) = self.upstream.shift_remove(model) else {
            return;
        };
        for up in ups {
            if let Some(down) = self.downstream.get_mut(&up) {
                down.shift_remove(model);
                if down.is_empty() {
                    self.downstream.shift_remove(&up);
                }
            }
        }
    }

    /// Names `model` depends on directly.
    pub fn upstream_of(&self, model: &str) -> impl Iterator<Item = &str> {
        self.upstream
            .get(model)
            .into_iter()
            .flat_map(|s| s.iter().map(String::as_str))
    }

    /// Names depending directly on `name`.
    pub fn dependents_of(&self, name: &str) -> impl Iterator<Item = &str> {
        self.downstream
            .get(name)
            .into_iter()
            .flat_map(|s| s.iter().map(String::as_str))
    }

    /// Every name that has at least one dependent.
    pub fn referenced(&self) -> impl Iterator<Item = &str> {
        self.downstream.keys().map(String::as_str)
    }

    /// Every name reachable downstream of `name`, each once, excluding
    /// `name` itself unless it lies on a cycle.
    pub fn invalidation_wave(&self, name: &str) -> IndexSet<String> {
        let mut wave: IndexSet<String> = IndexSet::new();
        let mut cursor = 0;
        wave.extend(self.dependents_of(name).map(str::to_string));
        while cursor < wave.len() {
            let next: Vec<String> = self
                .dependents_of(&wave[cursor])
                .filter(|d| !wave.contains(*d))
                .map(str::to_string)
                .collect();
            wave.extend(next);
            cursor += 1;
        }
        wave
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn wave_is_transitive() {
        let mut g = DependencyGraph::new();
        g.register("n", "x");
        g.register("e", "n");
        g.register("f", "e");
        g.register("unrelated", "y");
        let wave: Vec<_> = g.invalidation_wave("x").into_iter().collect();
        assert_eq!(wave, vec!["n", "e", "f"]);
    }

    #[test]
    fn diamond_visits_each_once() {
        let mut g = DependencyGraph::new();
        g.register("b", "a");
        g.register("c", "a");
        g.register("d", "b");
        g.register("d", "c");
        let wave = g.invalidation_wave("a");
        assert_eq!(wave.len(), 3);
        assert!(wave.contains("d"));
    }

    #[test]
    fn cycle_terminates() {
        let mut g = DependencyGraph::new();
        g.register("a", "b");
        g.register("b", "a");
        let wave = g.invalidation_wave("a");
        assert!(wave.contains("a"));
        assert!(wave.contains("b"));
    }

    #[test]
    fn unregister_keeps_downstream_links() {
        let mut g = DependencyGraph::new();
        g.register("e", "n");
        g.register("n", "x");
        g.unregister("n");
        assert_eq!(g.upstream_of("n").count(), 0);
        assert_eq!(g.dependents_of("x").count(), 0);
        assert_eq!(g.dependents_of("n").collect::<Vec<_>>(), vec!["e"]);
    }

    proptest! {
        #[test]
        fn chain_wave_reaches_every_dependent(len in 1usize..30) {
            let mut g = DependencyGraph::new();
            for i in 1..=len {
                g.register(&format!("m{i}"), &format!("m{}", i - 1));
            }
            let wave = g.invalidation_wave("m0");
            prop_assert_eq!(wave.len(), len);
            for i in 1..=len {
                let name = format!("m{i}");
                prop_assert!(wave.contains(name.as_str()));
            }
        }
    }
}
