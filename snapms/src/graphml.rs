//! Reading and writing GraphML documents.
//!
//! The reader produces a generic [`AttributedGraph`] with typed node attributes,
//! which is how GNPS molecular networks arrive. The writer serializes a
//! [`CandidateGraph`] with one typed key per candidate attribute.
use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::io::{self, prelude::*};
use std::path::Path;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;
use tracing::debug;

use crate::graph::CandidateGraph;

pub const GRAPHML_NAMESPACE: &str = "http://graphml.graphdrawing.org/xmlns";

/// The file stem prefix used for per-component GNPS outputs
pub const GNPS_COMPONENT_PREFIX: &str = "GNPS_componentindex_";

#[derive(Debug, Error)]
pub enum GraphMLError {
    #[error("An IO error occurred: {0}")]
    IOError(
        #[source]
        #[from]
        io::Error,
    ),
    #[error("An XML error occurred: {0}")]
    XMLError(
        #[source]
        #[from]
        quick_xml::Error,
    ),
    #[error("Element <{element}> is missing the {attribute:?} attribute")]
    MissingAttribute { element: String, attribute: String },
    #[error("Invalid {kind} value {value:?} for key {key:?}")]
    InvalidValue {
        key: String,
        kind: AttributeType,
        value: String,
    },
    #[error("Unsupported attribute type {0:?}")]
    InvalidAttributeType(String),
    #[error("Edge refers to unknown node {0:?}")]
    UnknownNode(String),
    #[error("Cannot find a component index in file name {0:?}")]
    InvalidClusterFileName(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeType {
    Boolean,
    Int,
    Float,
    String,
}

impl AttributeType {
    pub fn from_name(name: &str) -> Result<Self, GraphMLError> {
        match name {
            "boolean" => Ok(Self::Boolean),
            "int" | "long" => Ok(Self::Int),
            "float" | "double" => Ok(Self::Float),
            "string" => Ok(Self::String),
            _ => Err(GraphMLError::InvalidAttributeType(name.to_string())),
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Int => "long",
            Self::Float => "double",
            Self::String => "string",
        }
    }

    fn parse(&self, key: &str, value: &str) -> Result<AttributeValue, GraphMLError> {
        let invalid = || GraphMLError::InvalidValue {
            key: key.to_string(),
            kind: *self,
            value: value.to_string(),
        };
        let value = value.trim();
        match self {
            Self::Boolean => match value.to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(AttributeValue::Boolean(true)),
                "false" | "0" => Ok(AttributeValue::Boolean(false)),
                _ => Err(invalid()),
            },
            Self::Int => value
                .parse()
                .map(AttributeValue::Int)
                .map_err(|_| invalid()),
            Self::Float => value
                .parse()
                .map(AttributeValue::Float)
                .map_err(|_| invalid()),
            Self::String => Ok(AttributeValue::String(value.to_string())),
        }
    }
}

impl Display for AttributeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Boolean(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::String(s) => s.trim().parse().ok(),
            Self::Boolean(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct KeyDecl {
    name: String,
    kind: AttributeType,
    domain: String,
    default: Option<AttributeValue>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphMLNode {
    pub id: String,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl GraphMLNode {
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }
}

/// A graph read from GraphML, with nodes kept in document order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributedGraph {
    pub directed: bool,
    pub nodes: Vec<GraphMLNode>,
    /// Edges as pairs of positions in `nodes`
    pub edges: Vec<(usize, usize)>,
    index: HashMap<String, usize>,
}

impl AttributedGraph {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn add_node(&mut self, node: GraphMLNode) -> usize {
        let position = self.nodes.len();
        self.index.insert(node.id.clone(), position);
        self.nodes.push(node);
        position
    }

    pub fn add_edge(&mut self, source: &str, target: &str) -> Result<(), GraphMLError> {
        let source = self.position_of(source)?;
        let target = self.position_of(target)?;
        self.edges.push((source, target));
        Ok(())
    }

    pub fn node_by_id(&self, id: &str) -> Option<&GraphMLNode> {
        self.index.get(id).map(|i| &self.nodes[*i])
    }

    fn position_of(&self, id: &str) -> Result<usize, GraphMLError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| GraphMLError::UnknownNode(id.to_string()))
    }

    /// Neighbor lists by node position, ignoring edge direction
    pub fn undirected_adjacency(&self) -> Vec<Vec<usize>> {
        let mut adjacency = vec![Vec::new(); self.nodes.len()];
        for (a, b) in self.edges.iter().copied() {
            if a == b {
                continue;
            }
            adjacency[a].push(b);
            adjacency[b].push(a);
        }
        adjacency
    }
}

fn get_attribute(e: &BytesStart, name: &str) -> Result<Option<String>, GraphMLError> {
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.as_ref() == name.as_bytes() {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn require_attribute(e: &BytesStart, name: &str) -> Result<String, GraphMLError> {
    get_attribute(e, name)?.ok_or_else(|| GraphMLError::MissingAttribute {
        element: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
        attribute: name.to_string(),
    })
}

#[derive(Debug, Default)]
struct GraphMLReaderState {
    keys: HashMap<String, KeyDecl>,
    /// The key being declared, while inside a `<key>` element
    current_key: Option<String>,
    in_default: bool,
    current_node: Option<GraphMLNode>,
    /// The key of the `<data>` element being read for the current node
    current_data: Option<String>,
    text: String,
    graph: AttributedGraph,
}

impl GraphMLReaderState {
    fn start(&mut self, e: &BytesStart, empty: bool) -> Result<(), GraphMLError> {
        match e.local_name().as_ref() {
            b"key" => {
                let id = require_attribute(e, "id")?;
                let name = get_attribute(e, "attr.name")?.unwrap_or_else(|| id.clone());
                let kind = match get_attribute(e, "attr.type")? {
                    Some(t) => AttributeType::from_name(&t)?,
                    None => AttributeType::String,
                };
                let domain = get_attribute(e, "for")?.unwrap_or_else(|| "all".to_string());
                self.keys.insert(
                    id.clone(),
                    KeyDecl {
                        name,
                        kind,
                        domain,
                        default: None,
                    },
                );
                if !empty {
                    self.current_key = Some(id);
                }
            }
            b"default" if self.current_key.is_some() => {
                self.in_default = !empty;
                self.text.clear();
            }
            b"graph" => {
                self.graph.directed =
                    get_attribute(e, "edgedefault")?.is_some_and(|d| d == "directed");
            }
            b"node" => {
                let node = GraphMLNode {
                    id: require_attribute(e, "id")?,
                    attributes: BTreeMap::new(),
                };
                if empty {
                    self.finish_node(node);
                } else {
                    self.current_node = Some(node);
                }
            }
            b"edge" => {
                let source = require_attribute(e, "source")?;
                let target = require_attribute(e, "target")?;
                self.graph.add_edge(&source, &target)?;
            }
            b"data" if self.current_node.is_some() => {
                self.current_data = Some(require_attribute(e, "key")?);
                self.text.clear();
                if empty {
                    self.end_data()?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn finish_node(&mut self, mut node: GraphMLNode) {
        for decl in self.keys.values() {
            if decl.domain != "node" && decl.domain != "all" {
                continue;
            }
            if let Some(default) = decl.default.as_ref() {
                node.attributes
                    .entry(decl.name.clone())
                    .or_insert_with(|| default.clone());
            }
        }
        self.graph.add_node(node);
    }

    fn end_data(&mut self) -> Result<(), GraphMLError> {
        let (Some(key), Some(node)) = (self.current_data.take(), self.current_node.as_mut())
        else {
            return Ok(());
        };
        let (name, value) = match self.keys.get(&key) {
            Some(decl) => (decl.name.clone(), decl.kind.parse(&decl.name, &self.text)?),
            None => (key, AttributeValue::String(self.text.clone())),
        };
        node.attributes.insert(name, value);
        Ok(())
    }

    fn end(&mut self, local_name: &[u8]) -> Result<(), GraphMLError> {
        match local_name {
            b"key" => {
                self.current_key = None;
            }
            b"default" if self.in_default => {
                self.in_default = false;
                if let Some(decl) = self
                    .current_key
                    .as_ref()
                    .and_then(|k| self.keys.get_mut(k))
                {
                    decl.default = Some(decl.kind.parse(&decl.name, &self.text)?);
                }
            }
            b"data" => self.end_data()?,
            b"node" => {
                if let Some(node) = self.current_node.take() {
                    self.finish_node(node);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Read a GraphML document into an [`AttributedGraph`]
pub fn read_graphml<R: BufRead>(reader: R) -> Result<AttributedGraph, GraphMLError> {
    let mut reader = Reader::from_reader(reader);
    reader.config_mut().trim_text(true);
    let mut state = GraphMLReaderState::default();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => state.start(e, false)?,
            Event::Empty(ref e) => state.start(e, true)?,
            Event::Text(ref t) => {
                if state.current_data.is_some() || state.in_default {
                    state.text.push_str(&t.unescape()?);
                }
            }
            Event::CData(ref t) => {
                if state.current_data.is_some() || state.in_default {
                    state.text.push_str(&String::from_utf8_lossy(t));
                }
            }
            Event::End(ref e) => state.end(e.local_name().as_ref())?,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    debug!(
        "Read a GraphML network with {} nodes and {} edges",
        state.graph.node_count(),
        state.graph.edge_count()
    );
    Ok(state.graph)
}

pub fn read_graphml_path<P: AsRef<Path>>(path: P) -> Result<AttributedGraph, GraphMLError> {
    let handle = io::BufReader::new(std::fs::File::open(path)?);
    read_graphml(handle)
}

/// The node attributes written for every candidate, in key order
const CANDIDATE_KEYS: [(&str, AttributeType); 11] = [
    ("npaid", AttributeType::String),
    ("exact_mass", AttributeType::Float),
    ("smiles", AttributeType::String),
    ("compound_name", AttributeType::String),
    ("npatlas_url", AttributeType::String),
    ("original_gnps_mass", AttributeType::Float),
    ("compound_group", AttributeType::Int),
    ("adduct", AttributeType::String),
    ("origin_organism_type", AttributeType::String),
    ("top_candidate", AttributeType::Boolean),
    ("componentindex", AttributeType::Int),
];

fn write_data<W: Write>(
    writer: &mut Writer<W>,
    key: usize,
    value: &str,
) -> Result<(), GraphMLError> {
    let key = format!("d{key}");
    writer.write_event(Event::Start(
        BytesStart::new("data").with_attributes([("key", key.as_str())]),
    ))?;
    writer.write_event(Event::Text(BytesText::new(value)))?;
    writer.write_event(Event::End(BytesEnd::new("data")))?;
    Ok(())
}

/// Write `graph` as an undirected GraphML document
pub fn write_graphml<W: Write>(writer: W, graph: &CandidateGraph) -> Result<(), GraphMLError> {
    let mut writer = Writer::new_with_indent(writer, b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(
        BytesStart::new("graphml").with_attributes([("xmlns", GRAPHML_NAMESPACE)]),
    ))?;

    for (i, (name, kind)) in CANDIDATE_KEYS.iter().enumerate() {
        let id = format!("d{i}");
        writer.write_event(Event::Empty(BytesStart::new("key").with_attributes([
            ("id", id.as_str()),
            ("for", "node"),
            ("attr.name", *name),
            ("attr.type", kind.name()),
        ])))?;
    }

    writer.write_event(Event::Start(
        BytesStart::new("graph").with_attributes([("edgedefault", "undirected")]),
    ))?;
    for (key, node) in graph.nodes() {
        let id = key.to_string();
        writer.write_event(Event::Start(
            BytesStart::new("node").with_attributes([("id", id.as_str())]),
        ))?;
        write_data(&mut writer, 0, &node.npaid)?;
        write_data(&mut writer, 1, &node.exact_mass.to_string())?;
        write_data(&mut writer, 2, &node.smiles)?;
        write_data(&mut writer, 3, &node.compound_name)?;
        write_data(&mut writer, 4, &node.npatlas_url)?;
        write_data(&mut writer, 5, &node.original_mass.to_string())?;
        write_data(&mut writer, 6, &node.compound_group.to_string())?;
        write_data(&mut writer, 7, node.adduct.symbol())?;
        if let Some(organism) = node.origin_organism_type.as_deref() {
            write_data(&mut writer, 8, organism)?;
        }
        write_data(&mut writer, 9, &node.top_candidate.to_string())?;
        if let Some(component) = node.componentindex {
            write_data(&mut writer, 10, &component.to_string())?;
        }
        writer.write_event(Event::End(BytesEnd::new("node")))?;
    }
    for (source, target) in graph.edges() {
        let (source, target) = (source.to_string(), target.to_string());
        writer.write_event(Event::Empty(BytesStart::new("edge").with_attributes([
            ("source", source.as_str()),
            ("target", target.as_str()),
        ])))?;
    }
    writer.write_event(Event::End(BytesEnd::new("graph")))?;
    writer.write_event(Event::End(BytesEnd::new("graphml")))?;
    writer.into_inner().flush()?;
    Ok(())
}

/// The output file name for the GNPS component `cluster_id`
pub fn cluster_file_name(cluster_id: i64) -> String {
    format!("{GNPS_COMPONENT_PREFIX}{cluster_id}.graphml")
}

/// Recover the component index from a `GNPS_componentindex_{id}.graphml` path
pub fn cluster_id_from_path<P: AsRef<Path>>(path: P) -> Result<i64, GraphMLError> {
    let path = path.as_ref();
    let invalid = || GraphMLError::InvalidClusterFileName(path.display().to_string());
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(invalid)?;
    let suffix = stem.rsplit('_').next().ok_or_else(invalid)?;
    suffix.parse().map_err(|_| invalid())
}
