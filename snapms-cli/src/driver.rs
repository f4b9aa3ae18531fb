use std::fs;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use std::thread;
use std::time::Instant;

use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use snapms::cluster::{
    DEFAULT_MAX_EDGE_COUNT, DEFAULT_MAX_NODE_COUNT, DEFAULT_MIN_CLUSTER_SIZE,
    DEFAULT_MIN_GROUP_COUNT,
};
use snapms::gnps::{DEFAULT_MAX_GNPS_SIZE, DEFAULT_MIN_GNPS_SIZE, DEFAULT_PPM};
use snapms::graphml::read_graphml_path;
use snapms::mass_list::MassListError;
use snapms::{
    annotate_mass_list, default_adducts, read_mass_list, AdductKind, AnnotationParams,
    FilterOutcome, GnpsClusterDriver, GnpsError, GraphMLError, MatchError, MorganDiceSimilarity,
    NoopPublisher, OrganismFilter, Publisher, ReferenceError, ReferenceTable, SizePolicy,
    DEFAULT_CYREST_URL,
};

use crate::args::{ArgOrganismFilter, InputKind};
use crate::progress::ClusterProgress;
use crate::write::{bundle_outputs, write_cluster_graphs, write_graph_file, WrittenGraph};

pub const BUFFER_SIZE: usize = 64;

fn non_negative_float(s: &str) -> Result<f64, String> {
    let value = s.parse::<f64>().map_err(|e| e.to_string())?;
    if value < 0.0 {
        Err(format!("`{s}` is less than zero"))
    } else {
        Ok(value)
    }
}

#[derive(Debug, Error)]
pub enum SnapMSError {
    #[error("An IO error occurred: {0}")]
    IOError(
        #[source]
        #[from]
        io::Error,
    ),
    #[error("The input file {0} does not exist")]
    InputNotFound(PathBuf),
    #[error("The input file {0} is not a mass list (.csv, .txt) or a molecular network (.graphml)")]
    UnsupportedInput(String),
    #[error("A custom organism filter requires at least one taxon name")]
    MissingCustomFilter,
    #[error("Failed to load the reference database: {0}")]
    ReferenceError(
        #[source]
        #[from]
        ReferenceError,
    ),
    #[error("Failed to read the mass list: {0}")]
    MassListError(
        #[source]
        #[from]
        MassListError,
    ),
    #[error(transparent)]
    MatchError(#[from] MatchError),
    #[error("A GraphML error occurred: {0}")]
    GraphMLError(
        #[source]
        #[from]
        GraphMLError,
    ),
    #[error(transparent)]
    GnpsError(#[from] GnpsError),
    #[error("Failed to bundle the outputs: {0}")]
    ZipError(
        #[source]
        #[from]
        zip::result::ZipError,
    ),
    #[error("Invalid configuration: {0}")]
    ConfigError(
        #[source]
        #[from]
        figment::Error,
    ),
    #[error("Failed to start the thread pool: {0}")]
    ThreadPoolError(
        #[source]
        #[from]
        rayon::ThreadPoolBuildError,
    ),
}

#[derive(Parser, Debug, Deserialize, Serialize)]
#[command(author, version)]
#[serde(default)]
/// Annotate natural product compound families in a mass list or a GNPS molecular network
pub struct SnapMS {
    /// The mass list (.csv, .txt) or GNPS molecular network (.graphml) to annotate
    #[arg()]
    pub input_file: PathBuf,

    /// The NP Atlas reference database, a JSON array of compound records (optionally gzipped)
    #[arg(short = 'd', long = "reference-db", default_value = "npatlas.json")]
    pub reference_db: PathBuf,

    /// The directory to write output networks to
    #[arg(short = 'o', long = "output-dir", default_value = ".")]
    pub output_dir: PathBuf,

    /// Also write log messages to this file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// A TOML configuration file to read settings from. The `snapms.toml` file in the
    /// working directory is read if it exists, and variables prefixed with `SNAPMS_`
    /// are read last.
    #[arg(long = "config-file")]
    pub config_file: Option<PathBuf>,

    /// The number of threads to use, passing a value < 1 to use all available threads
    #[arg(
        short = 't',
        long = "threads",
        allow_hyphen_values = true,
        default_value_t = -1
    )]
    pub threads: i32,

    /// The mass matching tolerance in parts per million
    #[arg(short = 'p', long = "ppm", value_parser = non_negative_float, default_value_t = DEFAULT_PPM)]
    pub ppm: f64,

    /// The adduct ions to match observed masses against, by column name or symbol
    #[arg(
        short = 'a',
        long = "adducts",
        value_delimiter = ',',
        value_parser = AdductKind::from_str,
        default_values_t = default_adducts()
    )]
    pub adducts: Vec<AdductKind>,

    /// Collapse observed masses that agree within the tolerance before matching
    #[arg(long = "remove-duplicates", default_value_t = true, action = clap::ArgAction::Set)]
    pub remove_duplicates: bool,

    /// The smallest GNPS component to annotate
    #[arg(long = "min-gnps-size", default_value_t = DEFAULT_MIN_GNPS_SIZE)]
    pub min_gnps_size: usize,

    /// The largest GNPS component to annotate, after duplicate removal
    #[arg(long = "max-gnps-size", default_value_t = DEFAULT_MAX_GNPS_SIZE)]
    pub max_gnps_size: usize,

    /// The smallest connected subgraph of candidates to keep
    #[arg(long = "min-cluster-size", default_value_t = DEFAULT_MIN_CLUSTER_SIZE)]
    pub min_cluster_size: usize,

    /// The number of distinct observed masses a candidate family must explain
    #[arg(long = "min-group-count", default_value_t = DEFAULT_MIN_GROUP_COUNT)]
    pub min_group_count: usize,

    /// Reject candidate networks with this many nodes or more
    #[arg(long = "max-node-count", default_value_t = DEFAULT_MAX_NODE_COUNT)]
    pub max_node_count: usize,

    /// Reject candidate networks with this many edges or more
    #[arg(long = "max-edge-count", default_value_t = DEFAULT_MAX_EDGE_COUNT)]
    pub max_edge_count: usize,

    /// Restrict the reference database by source organism
    #[arg(short = 'f', long = "organism-filter", default_value = "full")]
    pub organism_filter: ArgOrganismFilter,

    /// The `|` separated taxon names to keep when using the custom organism filter
    #[arg(long = "custom-filter")]
    pub custom_filter: Option<String>,

    /// Bundle GNPS component networks into a single zip archive
    #[arg(short = 'z', long = "compress-output")]
    pub compress_output: bool,

    /// Publish accepted networks to a running Cytoscape
    #[arg(long = "cytoscape")]
    pub publish: bool,

    /// The CyREST endpoint of the Cytoscape instance to publish to
    #[arg(long = "cytoscape-url", default_value = DEFAULT_CYREST_URL)]
    pub cytoscape_url: String,

    /// Save the Cytoscape session under this directory after publishing
    #[arg(long = "session-dir")]
    pub session_dir: Option<PathBuf>,

    /// The name of the session subdirectory, defaulting to the input file's stem
    #[arg(long = "job-id")]
    pub job_id: Option<String>,
}

impl Default for SnapMS {
    fn default() -> Self {
        Self {
            input_file: PathBuf::new(),
            reference_db: PathBuf::from("npatlas.json"),
            output_dir: PathBuf::from("."),
            log_file: None,
            config_file: None,
            threads: -1,
            ppm: DEFAULT_PPM,
            adducts: default_adducts(),
            remove_duplicates: true,
            min_gnps_size: DEFAULT_MIN_GNPS_SIZE,
            max_gnps_size: DEFAULT_MAX_GNPS_SIZE,
            min_cluster_size: DEFAULT_MIN_CLUSTER_SIZE,
            min_group_count: DEFAULT_MIN_GROUP_COUNT,
            max_node_count: DEFAULT_MAX_NODE_COUNT,
            max_edge_count: DEFAULT_MAX_EDGE_COUNT,
            organism_filter: ArgOrganismFilter::Full,
            custom_filter: None,
            compress_output: false,
            publish: false,
            cytoscape_url: DEFAULT_CYREST_URL.to_string(),
            session_dir: None,
            job_id: None,
        }
    }
}

impl SnapMS {
    /// Layer configuration files and environment variables over these arguments
    pub fn configure(self) -> Result<Self, SnapMSError> {
        let mut config = Figment::new()
            .merge(Serialized::defaults(&self))
            .merge(Toml::file("snapms.toml"));
        if let Some(path) = self.config_file.as_ref() {
            config = config.merge(Toml::file_exact(path));
        }
        config = config.merge(Env::prefixed("SNAPMS_"));
        Ok(config.extract()?)
    }

    fn create_threadpool(&self) -> Result<rayon::ThreadPool, SnapMSError> {
        let num_threads = if self.threads > 0 {
            self.threads as usize
        } else {
            thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
        };
        debug!("Using {} cores", num_threads);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()?;
        Ok(pool)
    }

    pub fn organism_filter(&self) -> Result<OrganismFilter, SnapMSError> {
        self.organism_filter
            .resolve(self.custom_filter.as_deref())
            .ok_or(SnapMSError::MissingCustomFilter)
    }

    pub fn annotation_params(&self) -> AnnotationParams {
        AnnotationParams {
            ppm: self.ppm,
            adducts: self.adducts.clone(),
            remove_duplicates: self.remove_duplicates,
            min_gnps_size: self.min_gnps_size,
            max_gnps_size: self.max_gnps_size,
            policy: SizePolicy::new(
                self.min_group_count,
                self.min_cluster_size,
                self.max_node_count,
                self.max_edge_count,
            ),
        }
    }

    fn input_stem(&self) -> String {
        self.input_file
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "snapms".to_string())
    }

    fn make_publisher(&self) -> Box<dyn Publisher> {
        if self.publish {
            #[cfg(feature = "cytoscape")]
            return Box::new(snapms::publish::CyRestPublisher::new(
                &self.cytoscape_url,
                &self.input_stem(),
            ));
            #[cfg(not(feature = "cytoscape"))]
            warn!("Built without Cytoscape support, networks will not be published");
        }
        Box::new(NoopPublisher)
    }

    fn session_path(&self) -> Option<PathBuf> {
        let dir = self.session_dir.as_ref()?;
        let job_id = self.job_id.clone().unwrap_or_else(|| self.input_stem());
        Some(dir.join(job_id).join("snapms.cys"))
    }

    /// Send every written network to the configured publisher. Failures are
    /// logged and never affect the written outputs.
    fn publish_graphs(&self, written: &[WrittenGraph]) {
        if !self.publish || written.is_empty() {
            return;
        }
        let publisher = self.make_publisher();
        if !publisher.is_available() {
            warn!(
                "Cytoscape is not available at {}, skipping publishing",
                self.cytoscape_url
            );
            return;
        }
        for item in written.iter() {
            let title = item.title();
            match publisher.publish(&item.graph, &title) {
                Ok(handle) => debug!("Published {} as network {}", handle.title, handle.network_id),
                Err(e) => warn!("Failed to publish {title}: {e}"),
            }
        }
        let session = self.session_path();
        if let Some(parent) = session.as_ref().and_then(|p| p.parent()) {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!("Failed to create session directory {}: {e}", parent.display());
                return;
            }
        }
        if let Err(e) = publisher.finalize(session.as_deref()) {
            warn!("Failed to finish publishing: {e}");
        }
    }

    fn load_reference(&self) -> Result<ReferenceTable, SnapMSError> {
        let filter = self.organism_filter()?;
        let start = Instant::now();
        let table = ReferenceTable::load(&self.reference_db, &filter, &self.adducts)?;
        info!(
            "Loaded {} reference compounds from {} with the {filter} filter in {:0.3} seconds",
            table.len(),
            self.reference_db.display(),
            start.elapsed().as_secs_f64()
        );
        Ok(table)
    }

    pub fn main(&self) -> Result<(), SnapMSError> {
        info!(
            "snapms v{}",
            option_env!("CARGO_PKG_VERSION").unwrap_or("?")
        );
        if !self.input_file.exists() {
            return Err(SnapMSError::InputNotFound(self.input_file.clone()));
        }
        if let Ok(config) = toml::to_string_pretty(self) {
            debug!("Configuration:\n{config}");
        }
        let kind = self
            .input_file
            .extension()
            .and_then(|e| e.to_str())
            .and_then(InputKind::from_extension)
            .ok_or_else(|| SnapMSError::UnsupportedInput(self.input_file.display().to_string()))?;

        fs::create_dir_all(&self.output_dir)?;
        let table = self.load_reference()?;
        let start = Instant::now();
        let written = self.create_threadpool()?.install(|| match kind {
            InputKind::MassList => self.annotate_mass_list(&table),
            InputKind::MolecularNetwork => self.annotate_network(&table),
        })?;
        info!(
            "Annotation finished in {:0.3} seconds",
            start.elapsed().as_secs_f64()
        );
        self.publish_graphs(&written);
        Ok(())
    }

    fn annotate_mass_list(&self, table: &ReferenceTable) -> Result<Vec<WrittenGraph>, SnapMSError> {
        let masses = read_mass_list(fs::File::open(&self.input_file)?)?;
        info!("Read {} masses from {}", masses.len(), self.input_file.display());
        let outcome = annotate_mass_list(
            &masses,
            &self.annotation_params(),
            table,
            &MorganDiceSimilarity::default(),
        )?;
        match outcome {
            FilterOutcome::Accepted(graph) => {
                let path = self
                    .output_dir
                    .join(format!("{}_snapms_output.graphml", self.input_stem()));
                write_graph_file(&path, &graph)?;
                info!(
                    "Wrote {} candidates and {} edges to {}",
                    graph.node_count(),
                    graph.edge_count(),
                    path.display()
                );
                Ok(vec![WrittenGraph {
                    cluster_id: None,
                    path,
                    graph,
                }])
            }
            FilterOutcome::Rejected(reason) => {
                warn!("No candidate network was produced: {reason}");
                Ok(Vec::new())
            }
        }
    }

    fn annotate_network(&self, table: &ReferenceTable) -> Result<Vec<WrittenGraph>, SnapMSError> {
        let network = read_graphml_path(&self.input_file)?;
        let driver = GnpsClusterDriver::new(
            &network,
            table,
            MorganDiceSimilarity::default(),
            self.annotation_params(),
        )?;

        let (sender, receiver) = crossbeam_channel::bounded(BUFFER_SIZE);
        let output_dir = self.output_dir.clone();
        let writer_task = thread::spawn(move || write_cluster_graphs(&output_dir, receiver));

        let progress = driver
            .sub_clusters()
            .par_iter()
            .map_with(sender, |sender, sub_cluster| -> Result<ClusterProgress, GnpsError> {
                let cluster_id = sub_cluster.cluster_id;
                match driver.process(sub_cluster)? {
                    FilterOutcome::Accepted(graph) => {
                        let progress =
                            ClusterProgress::accepted(graph.node_count(), graph.edge_count());
                        if let Err(e) = sender.send((cluster_id, graph)) {
                            warn!("Failed to send component {cluster_id} to the writer: {e}");
                        }
                        Ok(progress)
                    }
                    FilterOutcome::Rejected(reason) => {
                        warn!("Dropping component {cluster_id}: {reason}");
                        Ok(ClusterProgress::rejected())
                    }
                }
            })
            .try_reduce(ClusterProgress::default, |a, b| Ok(a + b));

        let written = match writer_task.join() {
            Ok(o) => o?,
            Err(e) => {
                warn!("Failed to join writer task: {e:?}");
                Vec::new()
            }
        };
        let progress: ClusterProgress = progress.map_err(SnapMSError::from)?;
        info!("{progress}");

        if self.compress_output && !written.is_empty() {
            let archive_path = self
                .output_dir
                .join(format!("{}_snapms_output.zip", self.input_stem()));
            let paths: Vec<PathBuf> = written.iter().map(|w| w.path.clone()).collect();
            bundle_outputs(&archive_path, &paths)?;
        }
        Ok(written)
    }
}
