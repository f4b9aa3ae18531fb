//! The candidate similarity network built from compound matches
use std::collections::{btree_map, BTreeMap, BTreeSet};

use tracing::{debug, instrument};

use crate::adduct::AdductKind;
use crate::matching::CompoundMatch;
use crate::similarity::StructureSimilarity;

/// Two candidates are linked when their structure similarity is at least this value
pub const SIMILARITY_THRESHOLD: f64 = 0.66;

pub type NodeKey = usize;

/// A candidate annotation for one observed mass
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateNode {
    pub npaid: String,
    pub exact_mass: f64,
    pub smiles: String,
    pub compound_name: String,
    pub npatlas_url: String,
    /// The observed mass this candidate was matched to
    pub original_mass: f64,
    pub compound_group: usize,
    pub adduct: AdductKind,
    pub origin_organism_type: Option<String>,
    pub top_candidate: bool,
    /// The GNPS component the observed mass came from, if any
    pub componentindex: Option<i64>,
}

impl From<&CompoundMatch<'_>> for CandidateNode {
    fn from(hit: &CompoundMatch<'_>) -> Self {
        Self {
            npaid: hit.npaid().to_string(),
            exact_mass: hit.exact_mass(),
            smiles: hit.smiles().to_string(),
            compound_name: hit.friendly_name(),
            npatlas_url: hit.npatlas_url(),
            original_mass: hit.mass,
            compound_group: hit.compound_group,
            adduct: hit.adduct,
            origin_organism_type: hit.compound.origin_organism_type.clone(),
            top_candidate: false,
            componentindex: None,
        }
    }
}

/// An undirected graph of [`CandidateNode`]s with deterministic key ordering
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateGraph {
    nodes: BTreeMap<NodeKey, CandidateNode>,
    adjacency: BTreeMap<NodeKey, BTreeSet<NodeKey>>,
}

impl CandidateGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, key: NodeKey, node: CandidateNode) {
        self.nodes.insert(key, node);
        self.adjacency.entry(key).or_default();
    }

    /// Link `a` and `b`. Self-loops and edges to missing nodes are ignored.
    pub fn add_edge(&mut self, a: NodeKey, b: NodeKey) -> bool {
        if a == b || !self.nodes.contains_key(&a) || !self.nodes.contains_key(&b) {
            return false;
        }
        self.adjacency.entry(a).or_default().insert(b);
        self.adjacency.entry(b).or_default().insert(a)
    }

    pub fn remove_node(&mut self, key: NodeKey) -> Option<CandidateNode> {
        let node = self.nodes.remove(&key)?;
        if let Some(neighbors) = self.adjacency.remove(&key) {
            for n in neighbors {
                if let Some(back) = self.adjacency.get_mut(&n) {
                    back.remove(&key);
                }
            }
        }
        Some(node)
    }

    pub fn contains_node(&self, key: NodeKey) -> bool {
        self.nodes.contains_key(&key)
    }

    pub fn has_edge(&self, a: NodeKey, b: NodeKey) -> bool {
        self.adjacency.get(&a).is_some_and(|n| n.contains(&b))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(|n| n.len()).sum::<usize>() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, key: NodeKey) -> Option<&CandidateNode> {
        self.nodes.get(&key)
    }

    pub fn get_mut(&mut self, key: NodeKey) -> Option<&mut CandidateNode> {
        self.nodes.get_mut(&key)
    }

    pub fn keys(&self) -> impl Iterator<Item = NodeKey> + '_ {
        self.nodes.keys().copied()
    }

    pub fn nodes(&self) -> btree_map::Iter<'_, NodeKey, CandidateNode> {
        self.nodes.iter()
    }

    pub fn nodes_mut(&mut self) -> btree_map::IterMut<'_, NodeKey, CandidateNode> {
        self.nodes.iter_mut()
    }

    pub fn neighbors(&self, key: NodeKey) -> impl Iterator<Item = NodeKey> + '_ {
        self.adjacency
            .get(&key)
            .into_iter()
            .flat_map(|n| n.iter().copied())
    }

    /// Each undirected edge once, as `(a, b)` with `a < b`
    pub fn edges(&self) -> impl Iterator<Item = (NodeKey, NodeKey)> + '_ {
        self.adjacency.iter().flat_map(|(a, neighbors)| {
            neighbors
                .range((a + 1)..)
                .map(move |b| (*a, *b))
        })
    }

    /// Set the GNPS component index on every node
    pub fn tag_component(&mut self, componentindex: i64) {
        for node in self.nodes.values_mut() {
            node.componentindex = Some(componentindex);
        }
    }
}

/// Build the candidate network for `matches`.
///
/// Node keys are the positions of the matches. Two nodes are linked when their
/// structures score at least [`SIMILARITY_THRESHOLD`] and they annotate different
/// observed masses.
#[instrument(level = "debug", skip_all, fields(n_matches = matches.len()))]
pub fn build_graph<S: StructureSimilarity>(
    matches: &[CompoundMatch<'_>],
    similarity: &S,
) -> CandidateGraph {
    let structures: Vec<&str> = matches.iter().map(|m| m.smiles()).collect();
    let matrix = similarity.similarity_matrix(&structures);

    let mut graph = CandidateGraph::new();
    for (i, hit) in matches.iter().enumerate() {
        graph.add_node(i, CandidateNode::from(hit));
    }
    for i in 0..matches.len() {
        for j in (i + 1)..matches.len() {
            if matrix[(i, j)] >= SIMILARITY_THRESHOLD
                && matches[i].compound_group != matches[j].compound_group
            {
                graph.add_edge(i, j);
            }
        }
    }
    debug!(
        "Built a network with {} nodes and {} edges",
        graph.node_count(),
        graph.edge_count()
    );
    graph
}
