//! Sending annotated networks to an external network viewer
use std::path::Path;

use serde_json::{json, Value};
use thiserror::Error;

use crate::graph::CandidateGraph;

/// The name of the visual style applied to published networks
pub const STYLE_NAME: &str = "Undirected";

pub const DEFAULT_CYREST_URL: &str = "http://localhost:1234/v1";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("The network viewer is not available: {0}")]
    Unavailable(String),
    #[cfg(feature = "cytoscape")]
    #[error("An HTTP error occurred: {0}")]
    HttpError(
        #[source]
        #[from]
        reqwest::Error,
    ),
    #[error("Failed to encode or decode a message: {0}")]
    JsonError(
        #[source]
        #[from]
        serde_json::Error,
    ),
    #[error("Unexpected response from {endpoint}: {message}")]
    UnexpectedResponse { endpoint: String, message: String },
}

/// A reference to a network that was published
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishHandle {
    pub network_id: i64,
    pub title: String,
}

/// A destination for annotated networks.
///
/// Publishing happens after the network is written, so a failure here never
/// affects the computed result.
pub trait Publisher {
    fn is_available(&self) -> bool;

    fn publish(&self, graph: &CandidateGraph, title: &str) -> Result<PublishHandle, PublishError>;

    /// Called once after every network is published, optionally saving the session
    fn finalize(&self, _session: Option<&Path>) -> Result<(), PublishError> {
        Ok(())
    }
}

/// A publisher that is never available
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

impl Publisher for NoopPublisher {
    fn is_available(&self) -> bool {
        false
    }

    fn publish(&self, _graph: &CandidateGraph, title: &str) -> Result<PublishHandle, PublishError> {
        Err(PublishError::Unavailable(format!(
            "no publisher configured for {title}"
        )))
    }
}

/// Encode `graph` as a Cytoscape.js network document
pub fn cytoscape_json(graph: &CandidateGraph, title: &str) -> Value {
    let nodes: Vec<Value> = graph
        .nodes()
        .map(|(key, node)| {
            let mut data = json!({
                "id": key.to_string(),
                "name": node.compound_name,
                "npaid": node.npaid,
                "exact_mass": node.exact_mass,
                "smiles": node.smiles,
                "compound_name": node.compound_name,
                "npatlas_url": node.npatlas_url,
                "original_gnps_mass": node.original_mass,
                "compound_group": node.compound_group,
                "adduct": node.adduct.symbol(),
                "top_candidate": node.top_candidate,
            });
            if let Some(organism) = node.origin_organism_type.as_ref() {
                data["origin_organism_type"] = json!(organism);
            }
            if let Some(component) = node.componentindex {
                data["componentindex"] = json!(component);
            }
            json!({ "data": data })
        })
        .collect();
    let edges: Vec<Value> = graph
        .edges()
        .map(|(source, target)| {
            json!({ "data": { "source": source.to_string(), "target": target.to_string() } })
        })
        .collect();
    json!({
        "data": { "name": title },
        "elements": { "nodes": nodes, "edges": edges },
    })
}

/// The visual style definition for candidate networks: labels from the compound
/// name, thick borders on top candidates
pub fn snapms_style() -> Value {
    let defaults = [
        ("NODE_SHAPE", json!("ELLIPSE")),
        ("NODE_FILL_COLOR", json!("#FFFFFF")),
        ("NODE_SIZE", json!(75)),
        ("NODE_BORDER_WIDTH", json!(2)),
        ("NODE_BORDER_PAINT", json!("#0000FF")),
        ("NODE_TRANSPARENCY", json!(255)),
        ("NODE_LABEL_COLOR", json!("#000000")),
        ("EDGE_WIDTH", json!(3)),
        ("EDGE_LINE_TYPE", json!("LINE")),
        ("EDGE_STROKE_UNSELECTED_PAINT", json!("#000000")),
        ("EDGE_TRANSPARENCY", json!(120)),
        ("NETWORK_BACKGROUND_PAINT", json!("#FFFFFF")),
    ];
    let defaults: Vec<Value> = defaults
        .into_iter()
        .map(|(property, value)| json!({ "visualProperty": property, "value": value }))
        .collect();
    json!({
        "title": STYLE_NAME,
        "defaults": defaults,
        "mappings": [
            {
                "mappingType": "passthrough",
                "mappingColumn": "compound_name",
                "mappingColumnType": "String",
                "visualProperty": "NODE_LABEL",
            },
            {
                "mappingType": "discrete",
                "mappingColumn": "top_candidate",
                "mappingColumnType": "Boolean",
                "visualProperty": "NODE_BORDER_WIDTH",
                "map": [
                    { "key": "false", "value": "2.0" },
                    { "key": "true", "value": "10.0" },
                ],
            },
        ],
    })
}

#[cfg(feature = "cytoscape")]
pub use cyrest::CyRestPublisher;

#[cfg(feature = "cytoscape")]
mod cyrest {
    use std::path::Path;

    use reqwest::blocking::{Client, Response};
    use reqwest::header::CONTENT_TYPE;
    use serde_json::Value;
    use tracing::{debug, info};

    use super::{
        cytoscape_json, snapms_style, PublishError, PublishHandle, Publisher, DEFAULT_CYREST_URL,
        STYLE_NAME,
    };
    use crate::graph::CandidateGraph;

    /// Publishes networks to a running Cytoscape through its REST API
    #[derive(Debug, Clone)]
    pub struct CyRestPublisher {
        pub base_url: String,
        pub collection: String,
        pub layout: String,
        client: Client,
    }

    impl Default for CyRestPublisher {
        fn default() -> Self {
            Self::new(DEFAULT_CYREST_URL, "SNAP-MS")
        }
    }

    impl CyRestPublisher {
        pub fn new(base_url: &str, collection: &str) -> Self {
            Self {
                base_url: base_url.trim_end_matches('/').to_string(),
                collection: collection.to_string(),
                layout: "force-directed".to_string(),
                client: Client::new(),
            }
        }

        fn url(&self, endpoint: &str) -> String {
            format!("{}{endpoint}", self.base_url)
        }

        fn read_json(response: Response) -> Result<Value, PublishError> {
            let text = response.error_for_status()?.text()?;
            Ok(serde_json::from_str(&text)?)
        }

        fn ensure_style(&self) -> Result<(), PublishError> {
            let exists = self
                .client
                .get(self.url(&format!("/styles/{STYLE_NAME}")))
                .send()?
                .status()
                .is_success();
            if !exists {
                debug!("Creating the {STYLE_NAME} visual style");
                self.client
                    .post(self.url("/styles"))
                    .header(CONTENT_TYPE, "application/json")
                    .body(serde_json::to_string(&snapms_style())?)
                    .send()?
                    .error_for_status()?;
            }
            Ok(())
        }

        pub fn apply_layout(&self, network_id: i64) -> Result<(), PublishError> {
            self.client
                .get(self.url(&format!("/apply/layouts/{}/{network_id}", self.layout)))
                .send()?
                .error_for_status()?;
            Ok(())
        }

        pub fn apply_style(&self, network_id: i64) -> Result<(), PublishError> {
            self.ensure_style()?;
            self.client
                .get(self.url(&format!("/apply/styles/{STYLE_NAME}/{network_id}")))
                .send()?
                .error_for_status()?;
            Ok(())
        }

        pub fn save_session(&self, path: &Path) -> Result<(), PublishError> {
            let file = path.display().to_string();
            self.client
                .post(self.url("/session"))
                .query(&[("file", file.as_str())])
                .send()?
                .error_for_status()?;
            info!("Saved the network session to {}", path.display());
            Ok(())
        }

        pub fn new_session(&self) -> Result<(), PublishError> {
            self.client
                .delete(self.url("/session"))
                .send()?
                .error_for_status()?;
            Ok(())
        }
    }

    impl Publisher for CyRestPublisher {
        fn is_available(&self) -> bool {
            self.client
                .get(&self.base_url)
                .send()
                .is_ok_and(|r| r.status().as_u16() == 200)
        }

        fn publish(
            &self,
            graph: &CandidateGraph,
            title: &str,
        ) -> Result<PublishHandle, PublishError> {
            let body = serde_json::to_string(&cytoscape_json(graph, title))?;
            let response = self
                .client
                .post(self.url("/networks"))
                .query(&[("collection", self.collection.as_str())])
                .header(CONTENT_TYPE, "application/json")
                .body(body)
                .send()?;
            let created = Self::read_json(response)?;
            let network_id = created
                .get("networkSUID")
                .and_then(|v| v.as_i64())
                .ok_or_else(|| PublishError::UnexpectedResponse {
                    endpoint: "/networks".to_string(),
                    message: format!("no networkSUID in {created}"),
                })?;
            self.apply_layout(network_id)?;
            self.apply_style(network_id)?;
            debug!("Published {title} as network {network_id}");
            Ok(PublishHandle {
                network_id,
                title: title.to_string(),
            })
        }

        fn finalize(&self, session: Option<&Path>) -> Result<(), PublishError> {
            if let Some(path) = session {
                self.save_session(path)?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::adduct::AdductKind;
    use crate::graph::CandidateNode;

    fn make_graph() -> CandidateGraph {
        let mut graph = CandidateGraph::new();
        for i in 0..2 {
            graph.add_node(
                i,
                CandidateNode {
                    npaid: format!("NPA00000{i}"),
                    exact_mass: 100.0,
                    smiles: "CCO".to_string(),
                    compound_name: format!("Compound {i}"),
                    npatlas_url: String::new(),
                    original_mass: 101.0073,
                    compound_group: i + 1,
                    adduct: AdductKind::Sodiated,
                    origin_organism_type: None,
                    top_candidate: i == 0,
                    componentindex: Some(3),
                },
            );
        }
        graph.add_edge(0, 1);
        graph
    }

    #[test]
    fn test_cytoscape_json() {
        let doc = cytoscape_json(&make_graph(), "GNPS_componentindex_3");
        assert_eq!(doc["data"]["name"], "GNPS_componentindex_3");
        let nodes = doc["elements"]["nodes"].as_array().unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0]["data"]["id"], "0");
        assert_eq!(nodes[0]["data"]["name"], "Compound 0");
        assert_eq!(nodes[0]["data"]["adduct"], "[M+Na]+");
        assert_eq!(nodes[0]["data"]["top_candidate"], true);
        assert_eq!(nodes[1]["data"]["componentindex"], 3);
        assert!(nodes[1]["data"].get("origin_organism_type").is_none());
        let edges = doc["elements"]["edges"].as_array().unwrap();
        assert_eq!(edges[0]["data"]["source"], "0");
        assert_eq!(edges[0]["data"]["target"], "1");
    }

    #[test]
    fn test_style() {
        let style = snapms_style();
        assert_eq!(style["title"], STYLE_NAME);
        assert_eq!(style["mappings"][1]["map"][1]["value"], "10.0");
        assert_eq!(style["defaults"].as_array().map(|d| d.len()), Some(12));
    }

    #[test]
    fn test_noop() {
        let publisher = NoopPublisher;
        assert!(!publisher.is_available());
        assert!(matches!(
            publisher.publish(&make_graph(), "net"),
            Err(PublishError::Unavailable(_))
        ));
        assert!(publisher.finalize(None).is_ok());
    }
}
