//! Annotate natural product compound families in mass spectrometry feature lists
//! and GNPS molecular networks.
//!
//! Observed masses are matched against a reference database as adduct ions, the
//! candidate structures are linked into a similarity network, and the components
//! of that network which explain the most distinct masses are flagged as the top
//! candidate families.
pub mod adduct;
pub mod mass_list;
pub mod reference;
pub mod matching;
pub mod similarity;
pub mod fingerprint;
pub mod graph;
pub mod cluster;
pub mod graphml;
pub mod gnps;
pub mod publish;

pub use adduct::{default_adducts, AdductError, AdductKind};
pub use cluster::{
    annotate_top_candidates, connected_components, filter_graph, graph_size_check,
    group_counts, max_group_count, remove_small_subgraphs, FilterOutcome, Rejection, SizePolicy,
};
pub use fingerprint::MorganDiceSimilarity;
pub use gnps::{annotate_mass_list, AnnotationParams, GnpsClusterDriver, GnpsError, SubCluster};
pub use graph::{build_graph, CandidateGraph, CandidateNode, SIMILARITY_THRESHOLD};
pub use graphml::{read_graphml, write_graphml, AttributedGraph, GraphMLError};
pub use mass_list::{calculate_error, read_mass_list, remove_mass_duplicates, MassListError};
pub use matching::{compute_adduct_matches, CompoundMatch, CompoundMatcher, MatchError};
pub use publish::{NoopPublisher, PublishError, PublishHandle, Publisher, DEFAULT_CYREST_URL};
pub use reference::{OrganismFilter, ReferenceCompound, ReferenceError, ReferenceTable};
pub use similarity::{SimilarityMatrix, StructureSimilarity};
