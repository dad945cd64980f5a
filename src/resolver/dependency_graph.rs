//! Feature dependency graph.
//!
//! Features reference their dependencies by name. This module turns those
//! references into an explicit graph (a `petgraph` arena plus a
//! name→index map), validates that every reference resolves, and flattens a
//! feature into a dependency-first, duplicate-free list of definitions.
//!
//! Resolution is a depth-first post-order walk with three-color marking:
//! reaching a node that is still on the stack (gray) is a cycle and is
//! reported with its full path. Completed nodes (black) are never walked
//! twice, so a diamond costs one visit per node rather than one per path.
//! Each root's flattened list is memoized for the lifetime of the graph.

use anyhow::Result;
use dashmap::DashMap;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::GadgetError;
use crate::features::FeatureDefinition;

/// A resolved, dependency-first list of features.
pub type ResolvedFeatures = Arc<[Arc<FeatureDefinition>]>;

/// Color states for cycle detection using DFS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    /// Node has not been visited.
    White,
    /// Node is currently being visited (in the DFS stack).
    Gray,
    /// Node has been fully visited.
    Black,
}

/// Dependency graph over a registry of features.
pub struct FeatureGraph {
    /// Owner of the registry, used in error messages.
    label: String,
    /// Edge `a → b` means `a` depends on `b`.
    graph: DiGraph<Arc<FeatureDefinition>, ()>,
    /// Map from feature name to graph index.
    node_map: HashMap<String, NodeIndex>,
    /// Memoized flattened lists, keyed by root node.
    resolved: DashMap<NodeIndex, ResolvedFeatures>,
}

impl FeatureGraph {
    /// Build the graph for a registry of features.
    ///
    /// When two features share a name the first one wins and the duplicate
    /// is logged.
    ///
    /// # Errors
    ///
    /// Returns [`GadgetError::UnknownDependency`] when a feature names a
    /// dependency that is not in `features`.
    pub fn build(
        label: impl Into<String>,
        features: impl IntoIterator<Item = Arc<FeatureDefinition>>,
    ) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut node_map = HashMap::new();

        for feature in features {
            if node_map.contains_key(&feature.name) {
                warn!(
                    "Duplicate feature '{}' in {} ignored",
                    feature.name,
                    feature.manifest_path.display()
                );
                continue;
            }
            let name = feature.name.clone();
            let index = graph.add_node(feature);
            node_map.insert(name, index);
        }

        let mut edges = Vec::new();
        for index in graph.node_indices() {
            let feature = &graph[index];
            for dependency in &feature.dependencies {
                let target =
                    node_map.get(dependency).ok_or_else(|| GadgetError::UnknownDependency {
                        feature: feature.name.clone(),
                        dependency: dependency.clone(),
                    })?;
                edges.push((index, *target));
            }
        }
        for (from, to) in edges {
            if !graph.contains_edge(from, to) {
                graph.add_edge(from, to, ());
            }
        }

        Ok(Self {
            label: label.into(),
            graph,
            node_map,
            resolved: DashMap::new(),
        })
    }

    /// Look a feature up by exact name.
    pub fn get(&self, name: &str) -> Option<&Arc<FeatureDefinition>> {
        self.node_map.get(name).map(|&index| &self.graph[index])
    }

    /// Whether a feature with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.node_map.contains_key(name)
    }

    /// All features in registration order.
    pub fn features(&self) -> impl Iterator<Item = &Arc<FeatureDefinition>> {
        self.graph.node_indices().map(|index| &self.graph[index])
    }

    /// Number of features in the graph.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of dependency edges in the graph.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Flatten `name` into its dependencies followed by itself.
    ///
    /// Every transitive dependency appears exactly once and strictly before
    /// every feature that depends on it.
    ///
    /// # Errors
    ///
    /// Returns [`GadgetError::FeatureNotFound`] for an unknown name and
    /// [`GadgetError::CircularDependency`] when the walk meets a cycle.
    pub fn resolve(&self, name: &str) -> Result<ResolvedFeatures> {
        let root = *self.node_map.get(name).ok_or_else(|| GadgetError::FeatureNotFound {
            feature: name.to_string(),
            container: self.label.clone(),
        })?;

        if let Some(cached) = self.resolved.get(&root) {
            debug!("Feature '{}' resolved from memo", name);
            return Ok(Arc::clone(cached.value()));
        }

        let mut colors = vec![Color::White; self.graph.node_count()];
        let mut path = Vec::new();
        let mut order = Vec::new();
        self.visit(root, &mut colors, &mut path, &mut order)?;

        let resolved: ResolvedFeatures =
            order.into_iter().map(|index| Arc::clone(&self.graph[index])).collect();
        debug!("Feature '{}' resolved to {} features", name, resolved.len());
        self.resolved.insert(root, Arc::clone(&resolved));
        Ok(resolved)
    }

    /// Resolve several features into one dependency-first list.
    ///
    /// The result is the concatenation of each name's resolution with
    /// features already emitted by an earlier name removed.
    ///
    /// # Errors
    ///
    /// Propagates the first resolution error.
    pub fn resolve_all<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Result<Vec<Arc<FeatureDefinition>>> {
        let mut seen = HashSet::new();
        let mut result = Vec::new();
        for name in names {
            for feature in self.resolve(name)?.iter() {
                if seen.insert(feature.name.clone()) {
                    result.push(Arc::clone(feature));
                }
            }
        }
        Ok(result)
    }

    fn visit(
        &self,
        node: NodeIndex,
        colors: &mut [Color],
        path: &mut Vec<NodeIndex>,
        order: &mut Vec<NodeIndex>,
    ) -> Result<()> {
        match colors[node.index()] {
            Color::Black => return Ok(()),
            Color::Gray => {
                let start = path.iter().position(|&n| n == node).unwrap_or(0);
                let cycle = path[start..]
                    .iter()
                    .chain(std::iter::once(&node))
                    .map(|&n| self.graph[n].name.as_str())
                    .collect::<Vec<_>>()
                    .join(" → ");
                return Err(GadgetError::CircularDependency {
                    cycle,
                }
                .into());
            }
            Color::White => {}
        }

        // A memoized dependency is already a valid dependency-first closure.
        if let Some(cached) = self.resolved.get(&node) {
            for feature in cached.value().iter() {
                let index = self.node_map[&feature.name];
                if colors[index.index()] != Color::Black {
                    colors[index.index()] = Color::Black;
                    order.push(index);
                }
            }
            return Ok(());
        }

        colors[node.index()] = Color::Gray;
        path.push(node);

        for dependency in &self.graph[node].dependencies {
            let next = self.node_map[dependency];
            self.visit(next, colors, path, order)?;
        }

        path.pop();
        colors[node.index()] = Color::Black;
        order.push(node);
        Ok(())
    }

    /// Detect cycles anywhere in the graph.
    ///
    /// # Errors
    ///
    /// Returns [`GadgetError::CircularDependency`] naming the first cycle found.
    pub fn detect_cycles(&self) -> Result<()> {
        let mut colors = vec![Color::White; self.graph.node_count()];
        let mut path = Vec::new();
        let mut order = Vec::new();
        for node in self.graph.node_indices() {
            if colors[node.index()] == Color::White {
                self.visit(node, &mut colors, &mut path, &mut order)?;
            }
        }
        Ok(())
    }

    /// Build a human-readable dependency tree rooted at `name`.
    pub fn to_tree_string(&self, name: &str) -> Option<String> {
        let root = *self.node_map.get(name)?;
        let mut result = String::new();
        let mut visited = HashSet::new();
        self.build_tree_string(root, &mut result, "", true, &mut visited);
        Some(result)
    }

    fn build_tree_string(
        &self,
        node: NodeIndex,
        result: &mut String,
        prefix: &str,
        is_last: bool,
        visited: &mut HashSet<NodeIndex>,
    ) {
        let connector = if is_last {
            "└── "
        } else {
            "├── "
        };
        result.push_str(&format!("{}{}{}\n", prefix, connector, self.graph[node].name));

        let child_prefix = if is_last {
            format!("{prefix}    ")
        } else {
            format!("{prefix}│   ")
        };

        if !visited.insert(node) {
            result.push_str(&format!("{child_prefix}└── (already listed)\n"));
            return;
        }

        let deps = &self.graph[node].dependencies;
        for (i, dep) in deps.iter().enumerate() {
            let is_last_child = i == deps.len() - 1;
            self.build_tree_string(self.node_map[dep], result, &child_prefix, is_last_child, visited);
        }
    }
}
