//! Loading the reference compound database.
//!
//! The reference database is an NP Atlas style JSON export: an array of compound
//! records whose nested objects are flattened into `parent_child` column names
//! on load, e.g. `origin_organism.taxon.name` becomes `origin_organism_taxon_name`.
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;

use flate2::bufread::GzDecoder;
use itertools::Itertools;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};
use unicode_normalization::UnicodeNormalization;

use crate::adduct::{AdductError, AdductKind};

pub const UNKNOWN_NAME: &str = "Unknown";

#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("An IO error occurred: {0}")]
    IOError(
        #[source]
        #[from]
        io::Error,
    ),
    #[error("Failed to parse reference database: {0}")]
    JsonError(
        #[source]
        #[from]
        serde_json::Error,
    ),
    #[error("The reference database must be an array of compound records")]
    NotAnArray,
    #[error("None of the {0} reference database records were usable")]
    NoUsableRows(usize),
    #[error(transparent)]
    AdductError(#[from] AdductError),
}

/// Why a single reference record was skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    NotAnObject,
    MissingField(&'static str),
    InvalidField(&'static str),
}

impl Display for RowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowError::NotAnObject => write!(f, "record is not an object"),
            RowError::MissingField(name) => write!(f, "missing required field {name}"),
            RowError::InvalidField(name) => write!(f, "invalid value for field {name}"),
        }
    }
}

/// Which source organisms to retain reference compounds for
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OrganismFilter {
    #[default]
    Full,
    Bacteria,
    Fungi,
    /// Keep compounds whose taxon, or any of its ancestors, has one of these names
    Custom(Vec<String>),
}

impl OrganismFilter {
    /// Build a custom filter from a `|` separated list of taxon names
    pub fn custom(names: &str) -> Self {
        Self::Custom(
            names.split('|')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        )
    }

    pub fn accepts(&self, compound: &ReferenceCompound) -> bool {
        match self {
            OrganismFilter::Full => true,
            OrganismFilter::Bacteria => compound.origin_organism_type.as_deref() == Some("Bacterium"),
            OrganismFilter::Fungi => compound.origin_organism_type.as_deref() == Some("Fungus"),
            OrganismFilter::Custom(names) => names.iter().any(|n| {
                compound.origin_organism_taxon_name.as_deref() == Some(n.as_str())
                    || compound.taxon_ancestors.iter().any(|a| a == n)
            }),
        }
    }
}

impl Display for OrganismFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrganismFilter::Full => write!(f, "full"),
            OrganismFilter::Bacteria => write!(f, "bacteria"),
            OrganismFilter::Fungi => write!(f, "fungi"),
            OrganismFilter::Custom(names) => write!(f, "custom({})", names.iter().join("|")),
        }
    }
}

impl FromStr for OrganismFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "full" | "none" => Ok(Self::Full),
            "bacteria" | "bacterium" => Ok(Self::Bacteria),
            "fungi" | "fungus" => Ok(Self::Fungi),
            _ => Err(format!("Unknown organism filter {s}")),
        }
    }
}

/// A single compound in the reference database
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceCompound {
    pub npaid: String,
    pub name: String,
    pub smiles: String,
    pub exact_mass: f64,
    pub origin_organism_type: Option<String>,
    pub origin_organism_taxon_name: Option<String>,
    pub taxon_ancestors: Vec<String>,
    adduct_masses: BTreeMap<AdductKind, f64>,
    fields: BTreeMap<String, Value>,
}

fn normalize_name(name: &str) -> String {
    name.nfkc().collect()
}

fn string_field(fields: &BTreeMap<String, Value>, key: &str) -> Option<String> {
    match fields.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn float_field(fields: &BTreeMap<String, Value>, key: &'static str) -> Result<Option<f64>, RowError> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_f64().map(Some).ok_or(RowError::InvalidField(key)),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| RowError::InvalidField(key)),
        Some(_) => Err(RowError::InvalidField(key)),
    }
}

/// Flatten nested objects into `parent_child` keys. Arrays are kept as-is.
pub fn flatten_record(record: serde_json::Map<String, Value>) -> BTreeMap<String, Value> {
    fn flatten_into(prefix: String, value: Value, out: &mut BTreeMap<String, Value>) {
        match value {
            Value::Object(inner) => {
                for (k, v) in inner {
                    flatten_into(format!("{prefix}_{k}"), v, out);
                }
            }
            other => {
                out.insert(prefix, other);
            }
        }
    }

    let mut out = BTreeMap::new();
    for (k, v) in record {
        flatten_into(k, v, &mut out);
    }
    out
}

impl ReferenceCompound {
    pub fn new(npaid: &str, name: &str, smiles: &str, exact_mass: f64) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("npaid".to_string(), Value::String(npaid.to_string()));
        fields.insert("name".to_string(), Value::String(name.to_string()));
        fields.insert("smiles".to_string(), Value::String(smiles.to_string()));
        fields.insert("exact_mass".to_string(), Value::from(exact_mass));
        Self {
            npaid: npaid.to_string(),
            name: name.to_string(),
            smiles: smiles.to_string(),
            exact_mass,
            origin_organism_type: None,
            origin_organism_taxon_name: None,
            taxon_ancestors: Vec::new(),
            adduct_masses: BTreeMap::new(),
            fields,
        }
    }

    /// Set a precomputed ionized mass, as read from the source
    pub fn with_adduct_mass(mut self, kind: AdductKind, mass: f64) -> Self {
        self.adduct_masses.insert(kind, mass);
        self.fields
            .insert(kind.column_name().to_string(), Value::from(mass));
        self
    }

    pub fn with_organism_type(mut self, organism_type: &str) -> Self {
        self.origin_organism_type = Some(organism_type.to_string());
        self.fields.insert(
            "origin_organism_type".to_string(),
            Value::String(organism_type.to_string()),
        );
        self
    }

    /// Build a compound from a flattened record, normalizing its display name and
    /// filling in the precomputed adduct masses.
    pub fn from_fields(mut fields: BTreeMap<String, Value>) -> Result<Self, RowError> {
        let npaid = string_field(&fields, "npaid").ok_or(RowError::MissingField("npaid"))?;
        let exact_mass =
            float_field(&fields, "exact_mass")?.ok_or(RowError::MissingField("exact_mass"))?;
        let smiles = string_field(&fields, "smiles")
            .filter(|s| !s.trim().is_empty())
            .ok_or(RowError::MissingField("smiles"))?;

        let name = match fields.remove("original_name") {
            Some(Value::String(s)) => Some(s),
            _ => string_field(&fields, "name"),
        }
        .map(|s| normalize_name(&s))
        .unwrap_or_else(|| UNKNOWN_NAME.to_string());
        fields.insert("name".to_string(), Value::String(name.clone()));

        let origin_organism_type = string_field(&fields, "origin_organism_type");
        let origin_organism_taxon_name = string_field(&fields, "origin_organism_taxon_name");
        let taxon_ancestors = match fields.get("origin_organism_taxon_ancestors") {
            Some(Value::Array(ancestors)) => ancestors
                .iter()
                .filter_map(|a| a.get("name").and_then(|n| n.as_str()).map(String::from))
                .collect(),
            _ => Vec::new(),
        };

        let mut adduct_masses = BTreeMap::new();
        for kind in AdductKind::ALL.into_iter().filter(|k| k.is_precomputed()) {
            if let Some(mass) = float_field(&fields, kind.column_name())? {
                adduct_masses.insert(kind, mass);
            }
        }

        Ok(Self {
            npaid,
            name,
            smiles,
            exact_mass,
            origin_organism_type,
            origin_organism_taxon_name,
            taxon_ancestors,
            adduct_masses,
            fields,
        })
    }

    /// The ionized mass of this compound as `kind`, if it has been computed
    pub fn adduct_mass(&self, kind: AdductKind) -> Option<f64> {
        self.adduct_masses.get(&kind).copied()
    }

    /// Compute and store the ionized mass for `kind`, returning `true` if the
    /// value was newly computed
    fn compute_adduct(&mut self, kind: AdductKind) -> bool {
        if kind.is_precomputed() && self.adduct_masses.contains_key(&kind) {
            return false;
        }
        self.adduct_masses.insert(kind, kind.transform(self.exact_mass));
        true
    }

    /// Access any flattened source field by column name
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }
}

/// The loaded, filtered reference database
#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    compounds: Vec<ReferenceCompound>,
    columns: BTreeSet<String>,
    adducts: BTreeSet<AdductKind>,
}

impl ReferenceTable {
    pub fn new(compounds: Vec<ReferenceCompound>) -> Self {
        let mut columns: BTreeSet<String> = compounds
            .iter()
            .flat_map(|c| c.fields.keys().cloned())
            .collect();
        let mut adducts = BTreeSet::new();
        for kind in AdductKind::ALL.into_iter().filter(|k| k.is_precomputed()) {
            if compounds.iter().all(|c| c.adduct_mass(kind).is_some()) {
                adducts.insert(kind);
                columns.insert(kind.column_name().to_string());
            }
        }
        Self {
            compounds,
            columns,
            adducts,
        }
    }

    /// Parse a JSON array of compound records, keeping those `filter` accepts.
    ///
    /// Individual records that are unusable are skipped with a warning.
    pub fn from_reader<R: io::Read>(
        reader: R,
        filter: &OrganismFilter,
    ) -> Result<Self, ReferenceError> {
        let records = match serde_json::from_reader(reader)? {
            Value::Array(records) => records,
            _ => return Err(ReferenceError::NotAnArray),
        };
        let n_records = records.len();
        let mut n_skipped = 0usize;
        let mut compounds = Vec::with_capacity(n_records);
        for (i, record) in records.into_iter().enumerate() {
            let compound = match record {
                Value::Object(record) => ReferenceCompound::from_fields(flatten_record(record)),
                _ => Err(RowError::NotAnObject),
            };
            match compound {
                Ok(compound) => {
                    if filter.accepts(&compound) {
                        compounds.push(compound);
                    }
                }
                Err(e) => {
                    n_skipped += 1;
                    warn!("Skipping reference record {i}: {e}");
                }
            }
        }
        if n_records > 0 && n_skipped == n_records {
            return Err(ReferenceError::NoUsableRows(n_records));
        }
        if !matches!(filter, OrganismFilter::Full) {
            info!(
                "Filtering for {filter} retained {} of {} compounds",
                compounds.len(),
                n_records - n_skipped
            );
        }
        if compounds.is_empty() {
            warn!("The reference database contains no compounds");
        }

        let mut table = Self::new(compounds);
        table.fill_precomputed();
        Ok(table)
    }

    /// Read a reference database from a path, decompressing it if it ends in `.gz`
    pub fn open_path<P: AsRef<Path>>(
        path: P,
        filter: &OrganismFilter,
    ) -> Result<Self, ReferenceError> {
        let path = path.as_ref();
        let handle = io::BufReader::new(fs::File::open(path)?);
        let is_gzip = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));
        if is_gzip {
            Self::from_reader(GzDecoder::new(handle), filter)
        } else {
            Self::from_reader(handle, filter)
        }
    }

    /// Read, filter and extend a reference database in one step
    pub fn load<P: AsRef<Path>>(
        path: P,
        filter: &OrganismFilter,
        adducts: &[AdductKind],
    ) -> Result<Self, ReferenceError> {
        let table = Self::open_path(path, filter)?.with_adducts(adducts);
        info!("Finished reference database import with {} compounds", table.len());
        Ok(table)
    }

    /// Make sure every compound carries the masses the source normally ships
    fn fill_precomputed(&mut self) {
        for kind in AdductKind::ALL.into_iter().filter(|k| k.is_precomputed()) {
            let n_computed = self
                .compounds
                .iter_mut()
                .map(|c| c.compute_adduct(kind))
                .filter(|computed| *computed)
                .count();
            if n_computed > 0 {
                debug!(
                    "Computed {} for {n_computed} compounds missing it",
                    kind.column_name()
                );
            }
            self.mark_computed(kind);
        }
    }

    fn mark_computed(&mut self, kind: AdductKind) {
        self.adducts.insert(kind);
        self.columns.insert(kind.column_name().to_string());
    }

    /// Compute the mass column for `kind` for every compound
    pub fn add_adduct(&mut self, kind: AdductKind) {
        if !kind.is_precomputed() || !self.adducts.contains(&kind) {
            self.compounds.iter_mut().for_each(|c| {
                c.compute_adduct(kind);
            });
        }
        self.mark_computed(kind);
    }

    /// Compute mass columns for the named adducts, in order.
    ///
    /// Fails on the first unrecognized name. Columns computed before that
    /// point are kept.
    pub fn extend_adducts<S: AsRef<str>>(&mut self, names: &[S]) -> Result<(), ReferenceError> {
        for name in names {
            let kind: AdductKind = name.as_ref().parse()?;
            self.add_adduct(kind);
        }
        Ok(())
    }

    pub fn with_adducts(mut self, adducts: &[AdductKind]) -> Self {
        for kind in adducts {
            self.add_adduct(*kind);
        }
        self
    }

    pub fn has_adduct(&self, kind: AdductKind) -> bool {
        self.adducts.contains(&kind)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|s| s.as_str())
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(column)
    }

    pub fn len(&self) -> usize {
        self.compounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compounds.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<ReferenceCompound> {
        self.compounds.iter()
    }

    pub fn get(&self, index: usize) -> Option<&ReferenceCompound> {
        self.compounds.get(index)
    }
}

impl std::ops::Index<usize> for ReferenceTable {
    type Output = ReferenceCompound;

    fn index(&self, index: usize) -> &Self::Output {
        &self.compounds[index]
    }
}

impl<'a> IntoIterator for &'a ReferenceTable {
    type Item = &'a ReferenceCompound;

    type IntoIter = std::slice::Iter<'a, ReferenceCompound>;

    fn into_iter(self) -> Self::IntoIter {
        self.compounds.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const RECORDS: &str = r#"[
        {
            "id": 1, "npaid": "NPA000001", "original_name": "Curvularide C",
            "exact_mass": 100.0, "smiles": "CCO", "m_plus_h": 101.007276, "m_plus_na": 122.989218,
            "origin_organism": {
                "type": "Fungus",
                "taxon": {"name": "Curvularia", "ancestors": [{"name": "Fungi"}, {"name": "Ascomycota"}]}
            },
            "origin_reference": {"doi": "10.0000/abc"}
        },
        {
            "id": 2, "npaid": "NPA000002", "original_name": "Ａqabamycin E2",
            "exact_mass": 200.0, "smiles": "CCN",
            "origin_organism": {
                "type": "Bacterium",
                "taxon": {"name": "Vibrio", "ancestors": [{"name": "Bacteria"}, {"name": "Proteobacteria"}]}
            }
        },
        {
            "id": 3, "npaid": "NPA000003", "original_name": null,
            "exact_mass": 300.0, "smiles": "CCC",
            "origin_organism": {"type": "Bacterium", "taxon": {"name": "Streptomyces", "ancestors": []}}
        },
        {"id": 4, "npaid": "NPA000004", "original_name": "No structure", "exact_mass": 400.0, "smiles": ""},
        {"id": 5, "npaid": "NPA000005", "original_name": "No mass", "smiles": "C"},
        17
    ]"#;

    fn table(filter: &OrganismFilter) -> ReferenceTable {
        ReferenceTable::from_reader(RECORDS.as_bytes(), filter).unwrap()
    }

    #[test_log::test]
    fn test_load_and_skip() {
        let table = table(&OrganismFilter::Full);
        assert_eq!(table.len(), 3);
        assert_eq!(table[0].name, "Curvularide C");
        // Full-width characters are folded by NFKC normalization
        assert_eq!(table[1].name, "Aqabamycin E2");
        assert_eq!(table[2].name, UNKNOWN_NAME);
        assert!(table.has_column("origin_organism_taxon_name"));
        assert!(table.has_column("origin_reference_doi"));
        assert!(table.has_column("name"));
        assert!(!table.has_column("original_name"));
        assert!(!table.has_column("origin_organism"));
        assert_eq!(
            table[0].get("origin_organism_type"),
            Some(&Value::String("Fungus".to_string()))
        );
    }

    #[test]
    fn test_precomputed_fallback() {
        let table = table(&OrganismFilter::Full);
        assert_eq!(table[0].adduct_mass(AdductKind::Protonated), Some(101.007276));
        assert_eq!(
            table[1].adduct_mass(AdductKind::Protonated),
            Some(200.0 + crate::adduct::PROTON)
        );
        assert!(table.has_adduct(AdductKind::Sodiated));
        assert!(!table.has_adduct(AdductKind::Ammoniated));
    }

    #[test]
    fn test_filters() {
        assert_eq!(table(&OrganismFilter::Bacteria).len(), 2);
        let fungi = table(&OrganismFilter::Fungi);
        assert_eq!(fungi.len(), 1);
        assert_eq!(fungi[0].npaid, "NPA000001");

        let custom = table(&OrganismFilter::custom("Streptomyces | Ascomycota"));
        let ids: Vec<_> = custom.iter().map(|c| c.npaid.as_str()).collect();
        assert_eq!(ids, vec!["NPA000001", "NPA000003"]);

        // Names match whole taxa, not substrings
        assert!(table(&OrganismFilter::custom("Strepto")).is_empty());
    }

    #[test]
    fn test_extend_adducts() -> Result<(), ReferenceError> {
        let mut table = table(&OrganismFilter::Full);
        table.extend_adducts(&["m_plus_h", "m_plus_nh4", "2m_plus_na"])?;
        assert!(table.has_column("m_plus_nh4"));
        assert!(table.has_column("2m_plus_na"));
        assert_eq!(table[0].adduct_mass(AdductKind::Protonated), Some(101.007276));
        assert_eq!(
            table[2].adduct_mass(AdductKind::DimerSodiated),
            Some(600.0 + crate::adduct::SODIUM)
        );
        Ok(())
    }

    #[test]
    fn test_extend_unknown_adduct() {
        let mut table = table(&OrganismFilter::Full);
        let err = table.extend_adducts(&["m_plus_nh4", "xyz", "m_plus_k"]);
        assert!(matches!(
            err,
            Err(ReferenceError::AdductError(AdductError::AdductNotRecognized(ref name))) if name == "xyz"
        ));
        assert!(table.has_column("m_plus_nh4"));
        assert_eq!(
            table[0].adduct_mass(AdductKind::Ammoniated),
            Some(100.0 + crate::adduct::AMMONIUM)
        );
        assert!(!table.has_column("m_plus_k"));
    }

    #[test]
    fn test_unusable_sources() {
        assert!(matches!(
            ReferenceTable::from_reader(r#"{"npaid": "NPA1"}"#.as_bytes(), &OrganismFilter::Full),
            Err(ReferenceError::NotAnArray)
        ));
        assert!(matches!(
            ReferenceTable::from_reader(r#"[{"npaid": "NPA1"}, 3]"#.as_bytes(), &OrganismFilter::Full),
            Err(ReferenceError::NoUsableRows(2))
        ));
    }
}
