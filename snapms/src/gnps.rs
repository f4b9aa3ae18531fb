//! Annotation drivers for plain mass lists and GNPS molecular networks
use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::adduct::{default_adducts, AdductKind};
use crate::cluster::{
    connected_components, filter_graph, FilterOutcome, Neighborhood, SizePolicy,
};
use crate::graph::{build_graph, CandidateGraph, NodeKey};
use crate::graphml::{AttributedGraph, GraphMLError};
use crate::mass_list::remove_mass_duplicates;
use crate::matching::{CompoundMatcher, MatchError};
use crate::reference::ReferenceTable;
use crate::similarity::StructureSimilarity;

pub const PARENT_MASS_ATTRIBUTE: &str = "parent mass";
pub const COMPONENT_INDEX_ATTRIBUTE: &str = "componentindex";

pub const DEFAULT_PPM: f64 = 10.0;
pub const DEFAULT_MIN_GNPS_SIZE: usize = 3;
pub const DEFAULT_MAX_GNPS_SIZE: usize = 5000;

#[derive(Debug, Error)]
pub enum GnpsError {
    #[error("Failed to read the molecular network: {0}")]
    GraphMLError(
        #[source]
        #[from]
        GraphMLError,
    ),
    #[error(transparent)]
    MatchError(#[from] MatchError),
}

/// The parameters shared by every annotation run
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationParams {
    pub ppm: f64,
    pub adducts: Vec<AdductKind>,
    pub remove_duplicates: bool,
    /// The smallest GNPS component to annotate
    pub min_gnps_size: usize,
    /// The largest GNPS component to annotate, after duplicate removal
    pub max_gnps_size: usize,
    pub policy: SizePolicy,
}

impl Default for AnnotationParams {
    fn default() -> Self {
        Self {
            ppm: DEFAULT_PPM,
            adducts: default_adducts(),
            remove_duplicates: true,
            min_gnps_size: DEFAULT_MIN_GNPS_SIZE,
            max_gnps_size: DEFAULT_MAX_GNPS_SIZE,
            policy: SizePolicy::default(),
        }
    }
}

impl AnnotationParams {
    fn prepare_masses(&self, masses: &[f64]) -> Vec<f64> {
        if self.remove_duplicates {
            remove_mass_duplicates(masses, self.ppm)
        } else {
            masses.to_vec()
        }
    }
}

fn annotate_with<S: StructureSimilarity>(
    masses: &[f64],
    params: &AnnotationParams,
    matcher: &CompoundMatcher<'_>,
    similarity: &S,
    componentindex: Option<i64>,
) -> Result<FilterOutcome, MatchError> {
    let matches = matcher.match_masses(masses, params.ppm, &params.adducts)?;
    let mut graph = build_graph(&matches, similarity);
    if let Some(index) = componentindex {
        graph.tag_component(index);
    }
    Ok(filter_graph(graph, &params.policy))
}

/// Annotate a single list of observed masses against `table`
pub fn annotate_mass_list<S: StructureSimilarity>(
    masses: &[f64],
    params: &AnnotationParams,
    table: &ReferenceTable,
    similarity: &S,
) -> Result<FilterOutcome, MatchError> {
    let masses = params.prepare_masses(masses);
    let matcher = CompoundMatcher::new(table, &params.adducts)?;
    let matches = matcher.match_masses(&masses, params.ppm, &params.adducts)?;
    info!("Found {} candidate adduct masses", matches.len());
    let graph = build_graph(&matches, similarity);
    Ok(filter_graph(graph, &params.policy))
}

/// The masses of one GNPS component, ready to annotate
#[derive(Debug, Clone, PartialEq)]
pub struct SubCluster {
    pub cluster_id: i64,
    pub masses: Vec<f64>,
}

impl SubCluster {
    pub fn len(&self) -> usize {
        self.masses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masses.is_empty()
    }
}

struct UndirectedView {
    adjacency: Vec<Vec<usize>>,
}

impl Neighborhood for UndirectedView {
    fn node_keys(&self) -> impl Iterator<Item = NodeKey> + '_ {
        0..self.adjacency.len()
    }

    fn adjacent(&self, key: NodeKey) -> impl Iterator<Item = NodeKey> + '_ {
        self.adjacency[key].iter().copied()
    }
}

/// Split a molecular network into the sub-clusters worth annotating
pub fn extract_sub_clusters(network: &AttributedGraph, params: &AnnotationParams) -> Vec<SubCluster> {
    let view = UndirectedView {
        adjacency: network.undirected_adjacency(),
    };
    let mut sub_clusters = Vec::new();
    for component in connected_components(&view) {
        if component.len() < params.min_gnps_size {
            continue;
        }
        let mut cluster_id = None;
        let mut masses = Vec::with_capacity(component.len());
        for position in component.iter().copied() {
            let node = &network.nodes[position];
            if cluster_id.is_none() {
                cluster_id = node.get(COMPONENT_INDEX_ATTRIBUTE).and_then(|v| v.as_i64());
            }
            match node.get(PARENT_MASS_ATTRIBUTE).and_then(|v| v.as_f64()) {
                Some(mass) => masses.push(mass),
                None => warn!("Node {} has no {PARENT_MASS_ATTRIBUTE:?}, skipping it", node.id),
            }
        }
        let Some(cluster_id) = cluster_id else {
            warn!(
                "Component starting at node {} has no {COMPONENT_INDEX_ATTRIBUTE:?}, skipping it",
                network.nodes[component[0]].id
            );
            continue;
        };
        let masses = params.prepare_masses(&masses);
        if masses.len() < params.min_gnps_size || masses.len() > params.max_gnps_size {
            debug!(
                "Component {cluster_id} has {} masses, outside [{}, {}]",
                masses.len(),
                params.min_gnps_size,
                params.max_gnps_size
            );
            continue;
        }
        sub_clusters.push(SubCluster { cluster_id, masses });
    }
    sub_clusters
}

/// Annotates each component of a GNPS molecular network independently
pub struct GnpsClusterDriver<'a, S: StructureSimilarity> {
    pub params: AnnotationParams,
    matcher: CompoundMatcher<'a>,
    similarity: S,
    sub_clusters: Vec<SubCluster>,
}

impl<'a, S: StructureSimilarity> GnpsClusterDriver<'a, S> {
    pub fn new(
        network: &AttributedGraph,
        table: &'a ReferenceTable,
        similarity: S,
        params: AnnotationParams,
    ) -> Result<Self, GnpsError> {
        let matcher = CompoundMatcher::new(table, &params.adducts)?;
        let sub_clusters = extract_sub_clusters(network, &params);
        info!(
            "Prepared {} sub-clusters from a network of {} nodes",
            sub_clusters.len(),
            network.node_count()
        );
        Ok(Self {
            params,
            matcher,
            similarity,
            sub_clusters,
        })
    }

    pub fn sub_clusters(&self) -> &[SubCluster] {
        &self.sub_clusters
    }

    /// Annotate one sub-cluster, tagging its candidates with the component index
    #[instrument(level = "debug", skip_all, fields(cluster_id = sub_cluster.cluster_id))]
    pub fn process(&self, sub_cluster: &SubCluster) -> Result<FilterOutcome, GnpsError> {
        let outcome = annotate_with(
            &sub_cluster.masses,
            &self.params,
            &self.matcher,
            &self.similarity,
            Some(sub_cluster.cluster_id),
        )?;
        Ok(outcome)
    }

    /// Annotate every sub-cluster in turn, keeping the accepted networks
    pub fn annotate(&self) -> Result<BTreeMap<i64, CandidateGraph>, GnpsError> {
        let mut accepted = BTreeMap::new();
        for sub_cluster in self.sub_clusters.iter() {
            match self.process(sub_cluster)? {
                FilterOutcome::Accepted(graph) => {
                    accepted.insert(sub_cluster.cluster_id, graph);
                }
                FilterOutcome::Rejected(reason) => {
                    warn!("Dropping component {}: {reason}", sub_cluster.cluster_id);
                }
            }
        }
        Ok(accepted)
    }
}
