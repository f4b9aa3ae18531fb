use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crossbeam_channel::Receiver;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use snapms::graphml::{cluster_file_name, cluster_id_from_path};
use snapms::{write_graphml, CandidateGraph, GraphMLError};

/// A candidate network that has been written to disk
#[derive(Debug, Clone)]
pub struct WrittenGraph {
    pub cluster_id: Option<i64>,
    pub path: PathBuf,
    pub graph: CandidateGraph,
}

impl WrittenGraph {
    pub fn title(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "snapms".to_string())
    }
}

pub fn write_graph_file(path: &Path, graph: &CandidateGraph) -> Result<(), GraphMLError> {
    let mut writer = BufWriter::new(fs::File::create(path)?);
    write_graphml(&mut writer, graph)?;
    writer.flush()?;
    Ok(())
}

/// Receive accepted cluster networks until every sender hangs up, writing each to
/// `output_dir`. The written graphs are returned ordered by cluster index.
pub fn write_cluster_graphs(
    output_dir: &Path,
    receiver: Receiver<(i64, CandidateGraph)>,
) -> Result<Vec<WrittenGraph>, GraphMLError> {
    let mut written = Vec::new();
    while let Ok((cluster_id, graph)) = receiver.recv() {
        let path = output_dir.join(cluster_file_name(cluster_id));
        write_graph_file(&path, &graph)?;
        let queue_size = receiver.len();
        tracing::info!(
            "Wrote component {cluster_id} | Nodes={} Edges={} | {queue_size} items in the write queue",
            graph.node_count(),
            graph.edge_count()
        );
        written.push(WrittenGraph {
            cluster_id: Some(cluster_id),
            path,
            graph,
        });
    }
    written.sort_by_key(|w| w.cluster_id);
    Ok(written)
}

/// Bundle `files` into a single zip archive at `archive_path`, ordering entries by
/// their cluster index, then remove the loose files.
pub fn bundle_outputs(archive_path: &Path, files: &[PathBuf]) -> zip::result::ZipResult<()> {
    let mut files: Vec<&PathBuf> = files.iter().collect();
    files.sort_by_key(|p| cluster_id_from_path(p).ok());

    let handle = fs::File::create(archive_path)?;
    let mut archive = ZipWriter::new(handle);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);
    for path in files.iter() {
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{} has no file name", path.display()),
                )
            })?;
        archive.start_file(name, options)?;
        let mut source = fs::File::open(path)?;
        io::copy(&mut source, &mut archive)?;
    }
    archive.finish()?;

    for path in files {
        fs::remove_file(path)?;
    }
    tracing::info!("Bundled outputs into {}", archive_path.display());
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_bundle_order() -> zip::result::ZipResult<()> {
        let dir = tempfile::tempdir()?;
        let mut paths = Vec::new();
        for id in [10, 2, 1] {
            let path = dir.path().join(cluster_file_name(id));
            fs::write(&path, format!("<graphml>{id}</graphml>"))?;
            paths.push(path);
        }
        let archive_path = dir.path().join("net_snapms_output.zip");
        bundle_outputs(&archive_path, &paths)?;

        assert!(paths.iter().all(|p| !p.exists()));
        let mut archive = zip::ZipArchive::new(fs::File::open(&archive_path)?)?;
        let names: Vec<_> = archive.file_names().map(|s| s.to_string()).collect();
        assert_eq!(names.len(), 3);
        let mut ordered = Vec::new();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            ordered.push(entry.name().to_string());
            if i == 0 {
                let mut content = String::new();
                entry.read_to_string(&mut content)?;
                assert_eq!(content, "<graphml>1</graphml>");
            }
        }
        assert_eq!(
            ordered,
            vec![
                "GNPS_componentindex_1.graphml",
                "GNPS_componentindex_2.graphml",
                "GNPS_componentindex_10.graphml",
            ]
        );
        Ok(())
    }

    #[test]
    fn test_writer_thread() {
        let dir = tempfile::tempdir().unwrap();
        let (sender, receiver) = crossbeam_channel::bounded(4);
        sender.send((5, CandidateGraph::new())).unwrap();
        sender.send((2, CandidateGraph::new())).unwrap();
        drop(sender);
        let written = write_cluster_graphs(dir.path(), receiver).unwrap();
        let ids: Vec<_> = written.iter().map(|w| w.cluster_id).collect();
        assert_eq!(ids, vec![Some(2), Some(5)]);
        assert!(written.iter().all(|w| w.path.exists()));
        assert_eq!(written[0].title(), "GNPS_componentindex_2");
    }
}
