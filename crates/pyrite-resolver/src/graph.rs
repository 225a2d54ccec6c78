//! Resolved dependency graph construction and rendering.

use std::collections::{HashMap, HashSet};
use std::fmt;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use pyrite_core::requirement::PackageName;
use pyrite_core::version::Version;

/// A pinned package in the resolved graph.
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub name: PackageName,
    pub version: Version,
}

impl fmt::Display for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=={}", self.name, self.version)
    }
}

/// The depends-on graph of a successful resolution, backed by petgraph.
///
/// One node per package name; cycles are permitted.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: DiGraph<GraphNode, ()>,
    index: HashMap<PackageName, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or retrieve a node. A name is a single slot: adding it twice
    /// returns the existing index.
    pub fn add_node(&mut self, node: GraphNode) -> NodeIndex {
        if let Some(&idx) = self.index.get(&node.name) {
            return idx;
        }
        let name = node.name.clone();
        let idx = self.graph.add_node(node);
        self.index.insert(name, idx);
        idx
    }

    pub fn add_edge(&mut self, from: NodeIndex, to: NodeIndex) {
        if !self.graph.edges(from).any(|e| e.target() == to) {
            self.graph.add_edge(from, to, ());
        }
    }

    pub fn find(&self, name: &PackageName) -> Option<NodeIndex> {
        self.index.get(name).copied()
    }

    pub fn node(&self, idx: NodeIndex) -> &GraphNode {
        &self.graph[idx]
    }

    /// Direct dependencies of a node, sorted by name for determinism.
    pub fn dependencies_of(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut deps: Vec<NodeIndex> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| e.target())
            .collect();
        deps.sort_by(|a, b| self.graph[*a].name.cmp(&self.graph[*b].name));
        deps
    }

    /// Reverse dependencies (who depends on this node), sorted by name.
    pub fn dependents_of(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut deps: Vec<NodeIndex> = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| e.source())
            .collect();
        deps.sort_by(|a, b| self.graph[*a].name.cmp(&self.graph[*b].name));
        deps
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Print the dependency tree starting from the given top-level names.
    ///
    /// Cycles are cut at the first repeated node on a path.
    pub fn print_tree(&self, tops: &[PackageName], max_depth: Option<usize>) -> String {
        let mut output = String::new();
        let mut tops: Vec<&PackageName> = tops.iter().collect();
        tops.sort();
        let count = tops.len();
        let mut visited = HashSet::new();
        for (i, top) in tops.into_iter().enumerate() {
            let Some(idx) = self.find(top) else { continue };
            let is_last = i == count - 1;
            self.print_subtree(&mut output, idx, "", is_last, 1, max_depth, &mut visited);
        }
        output
    }

    #[allow(clippy::too_many_arguments)]
    fn print_subtree(
        &self,
        output: &mut String,
        idx: NodeIndex,
        prefix: &str,
        is_last: bool,
        depth: usize,
        max_depth: Option<usize>,
        visited: &mut HashSet<NodeIndex>,
    ) {
        let connector = if is_last { "└── " } else { "├── " };
        let node = &self.graph[idx];
        output.push_str(&format!("{prefix}{connector}{node}\n"));

        if let Some(max) = max_depth {
            if depth >= max {
                return;
            }
        }

        if !visited.insert(idx) {
            return;
        }

        let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
        let deps = self.dependencies_of(idx);
        let count = deps.len();
        for (i, child) in deps.iter().enumerate() {
            let is_last = i == count - 1;
            self.print_subtree(
                output,
                *child,
                &child_prefix,
                is_last,
                depth + 1,
                max_depth,
                visited,
            );
        }

        visited.remove(&idx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, version: &str) -> GraphNode {
        GraphNode {
            name: PackageName::new(name).unwrap(),
            version: Version::parse(version).unwrap(),
        }
    }

    fn name(s: &str) -> PackageName {
        PackageName::new(s).unwrap()
    }

    #[test]
    fn one_slot_per_name() {
        let mut g = DependencyGraph::new();
        let a = g.add_node(node("requests", "2.31.0"));
        let b = g.add_node(node("requests", "2.31.0"));
        assert_eq!(a, b);
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn tree_printing() {
        let mut g = DependencyGraph::new();
        let requests = g.add_node(node("requests", "2.31.0"));
        let idna = g.add_node(node("idna", "3.7"));
        let certifi = g.add_node(node("certifi", "2024.2.2"));
        g.add_edge(requests, idna);
        g.add_edge(requests, certifi);

        let tree = g.print_tree(&[name("requests")], None);
        assert!(tree.contains("requests==2.31.0"));
        assert!(tree.contains("idna==3.7"));
        assert!(tree.contains("certifi==2024.2.2"));
        // Children are sorted by name.
        assert!(tree.find("certifi").unwrap() < tree.find("idna").unwrap());
    }

    #[test]
    fn cyclic_graphs_terminate() {
        let mut g = DependencyGraph::new();
        let a = g.add_node(node("a", "1.0"));
        let b = g.add_node(node("b", "1.0"));
        g.add_edge(a, b);
        g.add_edge(b, a);

        let tree = g.print_tree(&[name("a")], None);
        assert!(tree.contains("a==1.0"));
        assert!(tree.contains("b==1.0"));
    }

    #[test]
    fn dependents_lookup() {
        let mut g = DependencyGraph::new();
        let requests = g.add_node(node("requests", "2.31.0"));
        let idna = g.add_node(node("idna", "3.7"));
        g.add_edge(requests, idna);

        let dependents = g.dependents_of(idna);
        assert_eq!(dependents.len(), 1);
        assert_eq!(g.node(dependents[0]).name, name("requests"));
    }
}
