//! System dependency graph built on `petgraph`.
//!
//! Nodes are system names, deduplicated on insert; edges point from a
//! dependency to its dependent so a topological sort yields dependencies
//! first. Cycles fail fast with the offending system named.

use std::collections::BTreeMap;

use devstack_common::error::{DevstackError, Result};
use petgraph::graph::NodeIndex;

/// A dependency graph over systems of one manifest.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: petgraph::Graph<String, ()>,
    indices: BTreeMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Creates an empty dependency graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a system node, reusing the existing node for a known name.
    pub fn add_system(&mut self, name: impl Into<String>) -> NodeIndex {
        let name = name.into();
        if let Some(&index) = self.indices.get(&name) {
            return index;
        }
        let index = self.graph.add_node(name.clone());
        let _ = self.indices.insert(name, index);
        index
    }

    /// Adds a dependency edge: `dependent` depends on `dependency`.
    pub fn add_dependency(&mut self, dependent: &str, dependency: &str) {
        let dependent = self.add_system(dependent);
        let dependency = self.add_system(dependency);
        let _ = self.graph.add_edge(dependency, dependent, ());
    }

    /// Returns a launch ordering: every system appears after all of its
    /// dependencies.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming a cycle member when the
    /// declared dependencies are cyclic.
    pub fn resolve_order(&self) -> Result<Vec<String>> {
        match petgraph::algo::toposort(&self.graph, None) {
            Ok(indices) => Ok(indices
                .iter()
                .filter_map(|&idx| self.graph.node_weight(idx).cloned())
                .collect()),
            Err(cycle) => {
                let member = self
                    .graph
                    .node_weight(cycle.node_id())
                    .cloned()
                    .unwrap_or_default();
                Err(DevstackError::Config {
                    message: format!(
                        "cyclic dependency detected involving system `{member}`"
                    ),
                })
            }
        }
    }
}
