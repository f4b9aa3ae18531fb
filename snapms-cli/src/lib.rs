mod args;
mod driver;
mod progress;
mod write;

pub use args::*;
pub use driver::{SnapMS, SnapMSError};
pub use progress::ClusterProgress;
pub use write::{bundle_outputs, write_cluster_graphs, WrittenGraph};
