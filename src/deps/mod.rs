// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Preset dependency graph: cycles, closures, isolation and depth
//!
//! Preset names are interned into a node arena and every traversal runs on
//! an explicit stack, so cyclic graphs neither loop forever nor blow the
//! call stack.

pub mod extract;
pub mod report;

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

pub use extract::{
    analyze_directory, collect_dependencies, infer_parameter_dependencies, DependencyAnalysis,
};

/// Index of a preset in the graph arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Where an edge came from
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EdgeKind {
    /// Named under a dependency key such as `base_preset`
    Declared { key: String },
    /// Substring match of a parameter name; may be a false positive
    Inferred { field: String },
    /// Listed in an avatar config `dependencies` map
    Config { file: String },
}

impl EdgeKind {
    pub fn is_inferred(&self) -> bool {
        matches!(self, EdgeKind::Inferred { .. })
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeKind::Declared { key } => write!(f, "{}", key),
            EdgeKind::Inferred { field } => write!(f, "{} (inferred)", field),
            EdgeKind::Config { file } => write!(f, "{} (config)", file),
        }
    }
}

/// Aggregate graph statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencySummary {
    /// Presets with at least one dependency
    pub total_presets: usize,
    /// Presets touching any edge, as source or target
    pub connected_presets: usize,
    pub max_dependencies: usize,
    pub max_dependents: usize,
    /// Longest chain counted in nodes
    pub max_depth: usize,
    /// Set when the graph has cycles; depth then depends on traversal order
    pub depth_is_approximate: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Directed graph of preset dependencies (source depends on target)
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    names: Vec<String>,
    ids: HashMap<String, NodeId>,
    out: Vec<BTreeSet<NodeId>>,
    inc: Vec<BTreeSet<NodeId>>,
    edges: BTreeSet<(NodeId, NodeId, EdgeKind)>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a plain `source -> targets` map with declared edges
    pub fn from_map<I, S, T>(map: I, key: &str) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: AsRef<str>,
        T: IntoIterator,
        T::Item: AsRef<str>,
    {
        let mut graph = Self::new();
        for (source, targets) in map {
            for target in targets {
                graph.add_edge(
                    source.as_ref(),
                    target.as_ref(),
                    EdgeKind::Declared { key: key.to_string() },
                );
            }
        }
        graph
    }

    /// Intern a preset name
    pub fn node(&mut self, name: &str) -> NodeId {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = NodeId(self.names.len());
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        self.out.push(BTreeSet::new());
        self.inc.push(BTreeSet::new());
        id
    }

    pub fn add_edge(&mut self, source: &str, target: &str, kind: EdgeKind) {
        let s = self.node(source);
        let t = self.node(target);
        self.out[s.0].insert(t);
        self.inc[t.0].insert(s);
        self.edges.insert((s, t, kind));
    }

    /// Add every edge of `other`
    pub fn merge(&mut self, other: &DependencyGraph) {
        for (s, t, kind) in other.edges() {
            self.add_edge(s, t, kind.clone());
        }
    }

    pub fn id(&self, name: &str) -> Option<NodeId> {
        self.ids.get(name).copied()
    }

    pub fn name(&self, id: NodeId) -> &str {
        &self.names[id.0]
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ids.contains_key(name)
    }

    pub fn node_count(&self) -> usize {
        self.names.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// All edges as `(source, target, kind)`
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str, &EdgeKind)> {
        self.edges
            .iter()
            .map(move |(s, t, kind)| (self.name(*s), self.name(*t), kind))
    }

    /// Same graph with heuristic edges removed
    pub fn without_inferred(&self) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for (s, t, kind) in self.edges().filter(|(_, _, k)| !k.is_inferred()) {
            graph.add_edge(s, t, kind.clone());
        }
        graph
    }

    /// Sorted neighbor lists, so traversals are deterministic
    fn sorted_adjacency(&self, sets: &[BTreeSet<NodeId>]) -> Vec<Vec<NodeId>> {
        sets.iter()
            .map(|set| {
                let mut v: Vec<NodeId> = set.iter().copied().collect();
                v.sort_by(|a, b| self.name(*a).cmp(self.name(*b)));
                v
            })
            .collect()
    }

    fn ids_by_name(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = (0..self.names.len()).map(NodeId).collect();
        ids.sort_by(|a, b| self.name(*a).cmp(self.name(*b)));
        ids
    }

    fn to_map(&self, sets: &[BTreeSet<NodeId>]) -> BTreeMap<String, BTreeSet<String>> {
        sets.iter()
            .enumerate()
            .filter(|(_, set)| !set.is_empty())
            .map(|(i, set)| {
                let names = set.iter().map(|id| self.name(*id).to_string()).collect();
                (self.names[i].clone(), names)
            })
            .collect()
    }

    /// `source -> targets` for every preset with dependencies
    pub fn dependency_map(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.to_map(&self.out)
    }

    /// `target -> sources`, the reverse lookup
    pub fn invert(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.to_map(&self.inc)
    }

    /// Dependency cycles, each rotated to start at its smallest name and
    /// closed by repeating that name at the end.
    pub fn detect_cycles(&self) -> Vec<Vec<String>> {
        let adj = self.sorted_adjacency(&self.out);
        let mut color = vec![Color::White; self.names.len()];
        let mut cycles: BTreeSet<Vec<String>> = BTreeSet::new();

        for start in self.ids_by_name() {
            if color[start.0] != Color::White {
                continue;
            }
            color[start.0] = Color::Gray;
            let mut stack: Vec<(NodeId, usize)> = vec![(start, 0)];

            while let Some(frame) = stack.last_mut() {
                let node = frame.0;
                if frame.1 < adj[node.0].len() {
                    let next = adj[node.0][frame.1];
                    frame.1 += 1;
                    match color[next.0] {
                        Color::White => {
                            color[next.0] = Color::Gray;
                            stack.push((next, 0));
                        }
                        Color::Gray => {
                            if let Some(pos) = stack.iter().position(|(id, _)| *id == next) {
                                let path: Vec<NodeId> = stack[pos..].iter().map(|(id, _)| *id).collect();
                                cycles.insert(self.normalize_cycle(&path));
                            }
                        }
                        Color::Black => {}
                    }
                } else {
                    color[node.0] = Color::Black;
                    stack.pop();
                }
            }
        }

        cycles.into_iter().collect()
    }

    fn normalize_cycle(&self, path: &[NodeId]) -> Vec<String> {
        let min = path
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| self.name(**a).cmp(self.name(**b)))
            .map(|(i, _)| i)
            .unwrap_or(0);
        let mut names: Vec<String> = path[min..]
            .iter()
            .chain(path[..min].iter())
            .map(|id| self.name(*id).to_string())
            .collect();
        if let Some(first) = names.first().cloned() {
            names.push(first);
        }
        names
    }

    fn reachable(&self, start: NodeId, sets: &[BTreeSet<NodeId>]) -> BTreeSet<String> {
        let mut seen: BTreeSet<NodeId> = BTreeSet::new();
        let mut stack: Vec<NodeId> = sets[start.0].iter().copied().collect();
        while let Some(id) = stack.pop() {
            if seen.insert(id) {
                stack.extend(sets[id.0].iter().copied().filter(|n| !seen.contains(n)));
            }
        }
        seen.into_iter().map(|id| self.name(id).to_string()).collect()
    }

    /// Every preset that depends on `name`, directly or transitively.
    ///
    /// `name` itself is included only when it sits on a cycle.
    pub fn ancestors(&self, name: &str) -> Option<BTreeSet<String>> {
        self.id(name).map(|id| self.reachable(id, &self.inc))
    }

    /// Every preset `name` depends on, directly or transitively
    pub fn descendants(&self, name: &str) -> Option<BTreeSet<String>> {
        self.id(name).map(|id| self.reachable(id, &self.out))
    }

    /// Dependency map restricted to what is reachable from `name`
    pub fn subgraph(&self, name: &str) -> Option<BTreeMap<String, BTreeSet<String>>> {
        let start = self.id(name)?;
        let mut reach = self.reachable(start, &self.out);
        reach.insert(name.to_string());
        Some(
            self.dependency_map()
                .into_iter()
                .filter(|(source, _)| reach.contains(source))
                .collect(),
        )
    }

    /// Files that neither depend on nor are depended on by anything
    pub fn isolated(&self, all_files: &BTreeSet<String>) -> BTreeSet<String> {
        let mut touched: BTreeSet<&str> = BTreeSet::new();
        for (s, t, _) in self.edges() {
            touched.insert(s);
            touched.insert(t);
        }
        all_files
            .iter()
            .filter(|f| !touched.contains(f.as_str()))
            .cloned()
            .collect()
    }

    /// Longest chain below each node (a leaf has depth 1).
    ///
    /// An edge back into the node currently being expanded counts that
    /// node as depth 1, so cyclic graphs terminate with order-dependent
    /// values.
    fn depths(&self) -> Vec<usize> {
        let adj = self.sorted_adjacency(&self.out);
        let n = self.names.len();
        let mut memo: Vec<Option<usize>> = vec![None; n];
        let mut on_stack = vec![false; n];

        for start in self.ids_by_name() {
            if memo[start.0].is_some() {
                continue;
            }
            on_stack[start.0] = true;
            // (node, next neighbor, best depth so far)
            let mut stack: Vec<(NodeId, usize, usize)> = vec![(start, 0, 1)];

            while let Some(frame) = stack.last_mut() {
                let node = frame.0;
                if frame.1 < adj[node.0].len() {
                    let child = adj[node.0][frame.1];
                    frame.1 += 1;
                    if child == node {
                        continue;
                    }
                    if let Some(d) = memo[child.0] {
                        frame.2 = frame.2.max(1 + d);
                    } else if on_stack[child.0] {
                        frame.2 = frame.2.max(2);
                    } else {
                        on_stack[child.0] = true;
                        stack.push((child, 0, 1));
                    }
                } else {
                    let depth = frame.2;
                    stack.pop();
                    on_stack[node.0] = false;
                    memo[node.0] = Some(depth);
                    if let Some(parent) = stack.last_mut() {
                        parent.2 = parent.2.max(1 + depth);
                    }
                }
            }
        }

        memo.into_iter().map(|d| d.unwrap_or(1)).collect()
    }

    /// Longest dependency chain; 0 for a graph without edges
    pub fn max_depth(&self) -> usize {
        if self.edges.is_empty() {
            return 0;
        }
        self.depths().into_iter().max().unwrap_or(0)
    }

    pub fn summary(&self) -> DependencySummary {
        DependencySummary {
            total_presets: self.out.iter().filter(|s| !s.is_empty()).count(),
            connected_presets: (0..self.names.len())
                .filter(|&i| !self.out[i].is_empty() || !self.inc[i].is_empty())
                .count(),
            max_dependencies: self.out.iter().map(BTreeSet::len).max().unwrap_or(0),
            max_dependents: self.inc.iter().map(BTreeSet::len).max().unwrap_or(0),
            max_depth: self.max_depth(),
            depth_is_approximate: !self.detect_cycles().is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &str)]) -> DependencyGraph {
        let mut g = DependencyGraph::new();
        for (s, t) in edges {
            g.add_edge(s, t, EdgeKind::Declared { key: "base_preset".into() });
        }
        g
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_three_cycle_detected_once() {
        let g = graph(&[("B", "C"), ("A", "B"), ("C", "A")]);
        assert_eq!(g.detect_cycles(), vec![vec!["A", "B", "C", "A"]]);
    }

    #[test]
    fn test_self_loop_and_acyclic() {
        assert_eq!(graph(&[("A", "A")]).detect_cycles(), vec![vec!["A", "A"]]);
        assert!(graph(&[("A", "B"), ("B", "C"), ("A", "C")]).detect_cycles().is_empty());
    }

    #[test]
    fn test_two_separate_cycles() {
        let g = graph(&[("A", "B"), ("B", "A"), ("X", "Y"), ("Y", "X"), ("B", "X")]);
        let cycles = g.detect_cycles();
        assert_eq!(cycles, vec![vec!["A", "B", "A"], vec!["X", "Y", "X"]]);
    }

    #[test]
    fn test_isolated_presets() {
        let g = graph(&[("A.json", "B.json")]);
        let files = set(&["A.json", "B.json", "C.json"]);
        assert_eq!(g.isolated(&files), set(&["C.json"]));
    }

    #[test]
    fn test_ancestors_and_descendants() {
        let g = graph(&[("A", "B"), ("B", "C"), ("D", "C")]);
        assert_eq!(g.descendants("A").unwrap(), set(&["B", "C"]));
        assert_eq!(g.ancestors("C").unwrap(), set(&["A", "B", "D"]));
        assert!(g.ancestors("Z").is_none());
    }

    #[test]
    fn test_closures_terminate_on_cycles() {
        let g = graph(&[("A", "B"), ("B", "C"), ("C", "A")]);
        assert_eq!(g.descendants("A").unwrap(), set(&["A", "B", "C"]));
        assert_eq!(g.ancestors("B").unwrap(), set(&["A", "B", "C"]));
    }

    #[test]
    fn test_invert() {
        let g = graph(&[("A", "C"), ("B", "C")]);
        let inv = g.invert();
        assert_eq!(inv.len(), 1);
        assert_eq!(inv["C"], set(&["A", "B"]));
    }

    #[test]
    fn test_subgraph() {
        let g = graph(&[("A", "B"), ("B", "C"), ("X", "Y")]);
        let sub = g.subgraph("A").unwrap();
        assert_eq!(sub.keys().cloned().collect::<Vec<_>>(), vec!["A", "B"]);
    }

    #[test]
    fn test_summary_on_chain() {
        let g = graph(&[("A", "B"), ("B", "C"), ("A", "D"), ("E", "D")]);
        let s = g.summary();
        assert_eq!(s.total_presets, 3);
        assert_eq!(s.connected_presets, 5);
        assert_eq!(s.max_dependencies, 2);
        assert_eq!(s.max_dependents, 2);
        assert_eq!(s.max_depth, 3);
        assert!(!s.depth_is_approximate);
    }

    #[test]
    fn test_depth_terminates_on_cycle() {
        let g = graph(&[("A", "B"), ("B", "A")]);
        let s = g.summary();
        assert!(s.max_depth >= 2);
        assert!(s.depth_is_approximate);
        assert_eq!(DependencyGraph::new().max_depth(), 0);
    }

    #[test]
    fn test_without_inferred() {
        let mut g = graph(&[("A", "B")]);
        g.add_edge("A", "C", EdgeKind::Inferred { field: "description".into() });
        let declared = g.without_inferred();
        assert_eq!(declared.edge_count(), 1);
        assert!(!declared.contains("C"));
    }

    #[test]
    fn test_from_map() {
        let g = DependencyGraph::from_map(vec![("A", vec!["B", "C"])], "inherits");
        assert_eq!(g.dependency_map()["A"], set(&["B", "C"]));
    }

    #[test]
    fn test_deep_chain_does_not_overflow() {
        let names: Vec<String> = (0..20_000).map(|i| format!("p{:05}", i)).collect();
        let mut g = DependencyGraph::new();
        for pair in names.windows(2) {
            g.add_edge(&pair[0], &pair[1], EdgeKind::Declared { key: "base_preset".into() });
        }
        assert_eq!(g.max_depth(), 20_000);
        assert_eq!(g.descendants("p00000").unwrap().len(), 19_999);
    }
}
