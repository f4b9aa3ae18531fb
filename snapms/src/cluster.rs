//! Connected component analysis and filtering of candidate networks
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt::Display;

use tracing::debug;

use crate::graph::{CandidateGraph, NodeKey};

/// A default minimum number of distinct compound groups in the best component
pub const DEFAULT_MIN_GROUP_COUNT: usize = 3;
pub const DEFAULT_MIN_CLUSTER_SIZE: usize = 3;
pub const DEFAULT_MAX_NODE_COUNT: usize = 2000;
pub const DEFAULT_MAX_EDGE_COUNT: usize = 10000;

/// A set of mutually reachable nodes, in ascending key order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Component {
    pub nodes: Vec<NodeKey>,
}

impl Component {
    pub fn new(mut nodes: Vec<NodeKey>) -> Self {
        nodes.sort_unstable();
        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, key: &NodeKey) -> bool {
        self.nodes.binary_search(key).is_ok()
    }

    pub fn iter(&self) -> std::slice::Iter<NodeKey> {
        self.nodes.iter()
    }

    /// The number of distinct compound groups among the nodes of `graph` in this component
    pub fn group_count(&self, graph: &CandidateGraph) -> usize {
        self.nodes
            .iter()
            .filter_map(|k| graph.get(*k).map(|n| n.compound_group))
            .collect::<BTreeSet<_>>()
            .len()
    }
}

impl std::ops::Index<usize> for Component {
    type Output = NodeKey;

    fn index(&self, index: usize) -> &Self::Output {
        &self.nodes[index]
    }
}

impl IntoIterator for Component {
    type Item = NodeKey;

    type IntoIter = <Vec<NodeKey> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.into_iter()
    }
}

/// Something whose nodes can be walked by neighbor relation
pub trait Neighborhood {
    fn node_keys(&self) -> impl Iterator<Item = NodeKey> + '_;

    fn adjacent(&self, key: NodeKey) -> impl Iterator<Item = NodeKey> + '_;
}

impl Neighborhood for CandidateGraph {
    fn node_keys(&self) -> impl Iterator<Item = NodeKey> + '_ {
        self.keys()
    }

    fn adjacent(&self, key: NodeKey) -> impl Iterator<Item = NodeKey> + '_ {
        self.neighbors(key)
    }
}

/// Visits the connected components of a graph, starting each one from the
/// smallest unvisited node key
pub struct BreadthFirstTraversal<'a, G: Neighborhood> {
    graph: &'a G,
    /// The node keys that have not yet been visited
    nodes: BTreeSet<NodeKey>,
}

impl<'a, G: Neighborhood> BreadthFirstTraversal<'a, G> {
    pub fn new(graph: &'a G) -> Self {
        let nodes = graph.node_keys().collect();
        Self { graph, nodes }
    }

    fn visit(&mut self, node: NodeKey) -> Component {
        let mut component = Vec::new();
        let mut queue = VecDeque::from(vec![node]);
        while let Some(node) = queue.pop_front() {
            // Already visited through another path
            if !self.nodes.remove(&node) {
                continue;
            }
            component.push(node);
            queue.extend(self.graph.adjacent(node).filter(|n| self.nodes.contains(n)));
        }
        Component::new(component)
    }

    fn next_component(&mut self) -> Option<Component> {
        let node = self.nodes.first().copied()?;
        Some(self.visit(node))
    }
}

impl<'a, G: Neighborhood> Iterator for BreadthFirstTraversal<'a, G> {
    type Item = Component;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_component()
    }
}

pub fn connected_components<G: Neighborhood>(graph: &G) -> Vec<Component> {
    BreadthFirstTraversal::new(graph).collect()
}

/// Map each component index to its number of distinct compound groups
pub fn group_counts(graph: &CandidateGraph) -> BTreeMap<usize, usize> {
    connected_components(graph)
        .iter()
        .enumerate()
        .map(|(i, c)| (i, c.group_count(graph)))
        .collect()
}

/// The highest distinct compound group count of any component, `None` when the
/// graph is empty
pub fn max_group_count(graph: &CandidateGraph) -> Option<usize> {
    group_counts(graph).into_values().max()
}

/// Flag every node of every component that reaches the highest compound group
/// count as a top candidate, clearing all other flags.
///
/// Returns the number of nodes flagged.
pub fn annotate_top_candidates(graph: &mut CandidateGraph) -> usize {
    let components = connected_components(graph);
    let counts: Vec<usize> = components.iter().map(|c| c.group_count(graph)).collect();
    for (_, node) in graph.nodes_mut() {
        node.top_candidate = false;
    }
    let Some(best) = counts.iter().copied().max() else {
        return 0;
    };
    let mut flagged = 0;
    for (component, count) in components.iter().zip(counts) {
        if count != best {
            continue;
        }
        for key in component.iter() {
            if let Some(node) = graph.get_mut(*key) {
                node.top_candidate = true;
                flagged += 1;
            }
        }
    }
    flagged
}

/// Remove every component with fewer than `min_cluster_size` nodes, returning the
/// number of nodes removed
pub fn remove_small_subgraphs(graph: &mut CandidateGraph, min_cluster_size: usize) -> usize {
    let mut removed = 0;
    for component in connected_components(graph) {
        if component.len() >= min_cluster_size {
            continue;
        }
        for key in component {
            if graph.remove_node(key).is_some() {
                removed += 1;
            }
        }
    }
    if removed > 0 {
        debug!("Removed {removed} nodes in components smaller than {min_cluster_size}");
    }
    removed
}

/// A reason a graph did not pass [`graph_size_check`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Empty,
    TooFewGroups { found: usize, required: usize },
    TooFewNodes { found: usize, required: usize },
    TooManyNodes { found: usize, limit: usize },
    TooManyEdges { found: usize, limit: usize },
}

impl Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::Empty => write!(f, "the network is empty"),
            Rejection::TooFewGroups { found, required } => write!(
                f,
                "the best component covers {found} compound groups, {required} required"
            ),
            Rejection::TooFewNodes { found, required } => {
                write!(f, "the network has {found} nodes, {required} required")
            }
            Rejection::TooManyNodes { found, limit } => {
                write!(f, "the network has {found} nodes, limit is {limit}")
            }
            Rejection::TooManyEdges { found, limit } => {
                write!(f, "the network has {found} edges, limit is {limit}")
            }
        }
    }
}

/// Limits a candidate network must satisfy to be reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SizePolicy {
    pub min_group_count: usize,
    pub min_cluster_size: usize,
    /// Exclusive upper bound on node count
    pub max_node_count: usize,
    /// Exclusive upper bound on edge count
    pub max_edge_count: usize,
}

impl Default for SizePolicy {
    fn default() -> Self {
        Self {
            min_group_count: DEFAULT_MIN_GROUP_COUNT,
            min_cluster_size: DEFAULT_MIN_CLUSTER_SIZE,
            max_node_count: DEFAULT_MAX_NODE_COUNT,
            max_edge_count: DEFAULT_MAX_EDGE_COUNT,
        }
    }
}

impl SizePolicy {
    pub fn new(
        min_group_count: usize,
        min_cluster_size: usize,
        max_node_count: usize,
        max_edge_count: usize,
    ) -> Self {
        Self {
            min_group_count,
            min_cluster_size,
            max_node_count,
            max_edge_count,
        }
    }

    /// Find the first limit `graph` violates, if any
    pub fn check(&self, graph: &CandidateGraph) -> Result<(), Rejection> {
        let Some(groups) = max_group_count(graph) else {
            return Err(Rejection::Empty);
        };
        if groups < self.min_group_count {
            return Err(Rejection::TooFewGroups {
                found: groups,
                required: self.min_group_count,
            });
        }
        let n_nodes = graph.node_count();
        if n_nodes < self.min_cluster_size {
            return Err(Rejection::TooFewNodes {
                found: n_nodes,
                required: self.min_cluster_size,
            });
        }
        if n_nodes >= self.max_node_count {
            return Err(Rejection::TooManyNodes {
                found: n_nodes,
                limit: self.max_node_count,
            });
        }
        let n_edges = graph.edge_count();
        if n_edges >= self.max_edge_count {
            return Err(Rejection::TooManyEdges {
                found: n_edges,
                limit: self.max_edge_count,
            });
        }
        Ok(())
    }
}

/// Whether `graph` is within the reportable size bounds
pub fn graph_size_check(
    graph: &CandidateGraph,
    min_group_count: usize,
    min_cluster_size: usize,
    max_node_count: usize,
    max_edge_count: usize,
) -> bool {
    SizePolicy::new(
        min_group_count,
        min_cluster_size,
        max_node_count,
        max_edge_count,
    )
    .check(graph)
    .is_ok()
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterOutcome {
    Accepted(CandidateGraph),
    Rejected(Rejection),
}

impl FilterOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    pub fn accepted(self) -> Option<CandidateGraph> {
        match self {
            Self::Accepted(graph) => Some(graph),
            Self::Rejected(_) => None,
        }
    }
}

/// Drop small components, check the size limits, and flag top candidates
pub fn filter_graph(mut graph: CandidateGraph, policy: &SizePolicy) -> FilterOutcome {
    remove_small_subgraphs(&mut graph, policy.min_cluster_size);
    if let Err(reason) = policy.check(&graph) {
        return FilterOutcome::Rejected(reason);
    }
    let flagged = annotate_top_candidates(&mut graph);
    debug!("Flagged {flagged} top candidates");
    FilterOutcome::Accepted(graph)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::adduct::AdductKind;
    use crate::graph::CandidateNode;

    fn node(group: usize) -> CandidateNode {
        CandidateNode {
            npaid: format!("NPA{group:06}"),
            exact_mass: 100.0,
            smiles: "C".to_string(),
            compound_name: "Test".to_string(),
            npatlas_url: String::new(),
            original_mass: 101.0,
            compound_group: group,
            adduct: AdductKind::Protonated,
            origin_organism_type: None,
            top_candidate: false,
            componentindex: None,
        }
    }

    /// Build a graph from `(key, group)` nodes and an edge list
    fn make_graph(nodes: &[(NodeKey, usize)], edges: &[(NodeKey, NodeKey)]) -> CandidateGraph {
        let mut graph = CandidateGraph::new();
        for (key, group) in nodes.iter().copied() {
            graph.add_node(key, node(group));
        }
        for (a, b) in edges.iter().copied() {
            graph.add_edge(a, b);
        }
        graph
    }

    fn tie_graph() -> CandidateGraph {
        make_graph(
            &[(0, 1), (1, 2), (2, 3), (3, 4), (4, 5), (5, 6), (6, 1), (7, 2)],
            &[(0, 1), (1, 2), (3, 4), (4, 5), (6, 7)],
        )
    }

    #[test]
    fn test_components() {
        let graph = tie_graph();
        let components = connected_components(&graph);
        assert_eq!(components.len(), 3);
        assert_eq!(components[0].nodes, vec![0, 1, 2]);
        assert_eq!(components[1].nodes, vec![3, 4, 5]);
        assert_eq!(components[2].nodes, vec![6, 7]);
        assert!(components[2].contains(&7));

        let counts = group_counts(&graph);
        assert_eq!(counts, BTreeMap::from([(0, 3), (1, 3), (2, 2)]));
        assert_eq!(max_group_count(&graph), Some(3));
        assert_eq!(max_group_count(&CandidateGraph::new()), None);
    }

    #[test]
    fn test_annotate_ties() {
        let mut graph = tie_graph();
        graph.get_mut(7).unwrap().top_candidate = true;
        let flagged = annotate_top_candidates(&mut graph);
        assert_eq!(flagged, 6);
        let flags: Vec<_> = graph.nodes().map(|(_, n)| n.top_candidate).collect();
        assert_eq!(flags, vec![true, true, true, true, true, true, false, false]);

        let mut empty = CandidateGraph::new();
        assert_eq!(annotate_top_candidates(&mut empty), 0);
    }

    #[test]
    fn test_group_count_not_node_count() {
        // Four nodes but only two distinct groups
        let mut graph = make_graph(
            &[(0, 1), (1, 1), (2, 2), (3, 2), (4, 3), (5, 4), (6, 5)],
            &[(0, 2), (1, 3), (0, 3), (4, 5), (5, 6)],
        );
        annotate_top_candidates(&mut graph);
        assert!(!graph.get(0).unwrap().top_candidate);
        assert!(graph.get(4).unwrap().top_candidate);
    }

    #[test]
    fn test_remove_small() {
        let mut graph = tie_graph();
        assert_eq!(remove_small_subgraphs(&mut graph, 3), 2);
        assert_eq!(graph.node_count(), 6);
        assert!(!graph.contains_node(6));
        assert_eq!(remove_small_subgraphs(&mut graph, 3), 0);
        assert_eq!(remove_small_subgraphs(&mut graph, 4), 6);
        assert!(graph.is_empty());
    }

    #[test]
    fn test_size_check() {
        let graph = tie_graph();
        assert!(graph_size_check(&graph, 3, 3, 2000, 10000));
        assert!(!graph_size_check(&graph, 4, 3, 2000, 10000));
        assert!(!graph_size_check(&graph, 3, 9, 2000, 10000));
        assert!(!graph_size_check(&graph, 3, 3, 8, 10000));
        assert!(graph_size_check(&graph, 3, 3, 9, 10000));
        assert!(!graph_size_check(&graph, 3, 3, 2000, 5));
        assert!(!graph_size_check(&CandidateGraph::new(), 0, 0, 2000, 10000));

        let policy = SizePolicy::default();
        assert_eq!(
            policy.check(&make_graph(&[(0, 1), (1, 2)], &[(0, 1)])),
            Err(Rejection::TooFewGroups {
                found: 2,
                required: 3
            })
        );
    }

    #[test]
    fn test_filter_graph() {
        let outcome = filter_graph(tie_graph(), &SizePolicy::default());
        let graph = outcome.accepted().unwrap();
        assert_eq!(graph.node_count(), 6);
        assert!(graph.nodes().all(|(_, n)| n.top_candidate));

        let outcome = filter_graph(
            make_graph(&[(0, 1), (1, 2)], &[(0, 1)]),
            &SizePolicy::default(),
        );
        assert_eq!(outcome, FilterOutcome::Rejected(Rejection::Empty));
    }
}
