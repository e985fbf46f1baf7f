//! Computed Dependency Graph
//!
//! Edges run from a key to the computed entries that read it. A key can be
//! a state key (own or inherited) or another computed key, so the graph
//! also links computed values to each other.
//!
//! # Algorithm
//!
//! When keys change we find every cached computed entry that depends on
//! them, directly or through other computed entries:
//!
//! 1. Queue the direct dependents of each changed key
//! 2. BFS through dependents, visiting each computed key once
//! 3. Sort the visited keys topologically (dependencies first)
//!
//! Only cached entries have edges. An entry's edges are replaced when it
//! recomputes and removed when it is invalidated.

use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Default)]
pub(crate) struct DependencyGraph {
    /// Computed key -> keys it read during its last evaluation.
    dependencies: HashMap<String, HashSet<String>>,

    /// Key -> computed keys that read it.
    dependents: HashMap<String, HashSet<String>>,
}

impl DependencyGraph {
    #[cfg(test)]
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record the dependency set of `computed`, replacing any previous one.
    pub(crate) fn set_dependencies(&mut self, computed: &str, dependencies: HashSet<String>) {
        self.remove(computed);

        for dependency in &dependencies {
            self.dependents
                .entry(dependency.clone())
                .or_default()
                .insert(computed.to_string());
        }
        self.dependencies.insert(computed.to_string(), dependencies);
    }

    /// Remove all outgoing edges of `computed`.
    ///
    /// Edges pointing at `computed` from entries that read it are kept;
    /// those entries are still cached and still depend on it.
    pub(crate) fn remove(&mut self, computed: &str) {
        let Some(dependencies) = self.dependencies.remove(computed) else {
            return;
        };

        for dependency in dependencies {
            if let Some(dependents) = self.dependents.get_mut(&dependency) {
                dependents.remove(computed);
                if dependents.is_empty() {
                    self.dependents.remove(&dependency);
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn dependencies(&self, computed: &str) -> Option<&HashSet<String>> {
        self.dependencies.get(computed)
    }

    /// Every computed key transitively affected by `changed`, in
    /// topological order.
    pub(crate) fn affected<'a, I>(&self, changed: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();

        for key in changed {
            if let Some(dependents) = self.dependents.get(key) {
                queue.extend(dependents.iter().cloned());
            }
        }

        let mut affected = Vec::new();
        while let Some(key) = queue.pop_front() {
            if !visited.insert(key.clone()) {
                continue;
            }

            if let Some(dependents) = self.dependents.get(&key) {
                queue.extend(dependents.iter().cloned());
            }
            affected.push(key);
        }

        self.topological_sort(affected)
    }

    /// Order `keys` so that dependencies come before dependents.
    ///
    /// Kahn's algorithm, counting only edges inside `keys`.
    fn topological_sort(&self, keys: Vec<String>) -> Vec<String> {
        let key_set: HashSet<&str> = keys.iter().map(String::as_str).collect();
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut queue = VecDeque::new();

        for key in &keys {
            let degree = self
                .dependencies
                .get(key)
                .map(|deps| deps.iter().filter(|d| key_set.contains(d.as_str())).count())
                .unwrap_or(0);
            in_degree.insert(key.as_str(), degree);
            if degree == 0 {
                queue.push_back(key.as_str());
            }
        }

        let mut result = Vec::with_capacity(keys.len());
        while let Some(key) = queue.pop_front() {
            result.push(key.to_string());

            if let Some(dependents) = self.dependents.get(key) {
                for dependent in dependents {
                    if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            queue.push_back(dependent.as_str());
                        }
                    }
                }
            }
        }

        result
    }

    /// Number of computed keys with recorded dependencies.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.dependencies.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(keys: &[&str]) -> HashSet<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn set_and_replace_dependencies() {
        let mut graph = DependencyGraph::new();

        graph.set_dependencies("total", set(&["a", "b"]));
        assert_eq!(graph.dependencies("total"), Some(&set(&["a", "b"])));
        assert_eq!(graph.affected(["a"]), vec!["total".to_string()]);

        graph.set_dependencies("total", set(&["c"]));
        assert!(graph.affected(["a"]).is_empty());
        assert_eq!(graph.affected(["c"]), vec!["total".to_string()]);
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn remove_drops_outgoing_edges() {
        let mut graph = DependencyGraph::new();
        graph.set_dependencies("total", set(&["a"]));

        graph.remove("total");

        assert!(graph.affected(["a"]).is_empty());
        assert_eq!(graph.len(), 0);
    }

    #[test]
    fn affected_is_transitive_and_ordered() {
        let mut graph = DependencyGraph::new();

        // a -> double -> quadruple, and a + double -> summary
        graph.set_dependencies("double", set(&["a"]));
        graph.set_dependencies("quadruple", set(&["double"]));
        graph.set_dependencies("summary", set(&["a", "quadruple"]));

        let affected = graph.affected(["a"]);
        assert_eq!(affected.len(), 3);

        let pos = |k: &str| affected.iter().position(|x| x == k).unwrap();
        assert!(pos("double") < pos("quadruple"));
        assert!(pos("quadruple") < pos("summary"));
    }

    #[test]
    fn unrelated_keys_affect_nothing() {
        let mut graph = DependencyGraph::new();
        graph.set_dependencies("double", set(&["a"]));

        assert!(graph.affected(["b"]).is_empty());
    }
}
