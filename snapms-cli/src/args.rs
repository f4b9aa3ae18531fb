use std::fmt::Display;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use snapms::OrganismFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgOrganismFilter {
    #[default]
    /// Keep every compound in the reference database
    Full,
    /// Keep only compounds produced by bacteria
    Bacteria,
    /// Keep only compounds produced by fungi
    Fungi,
    /// Keep compounds whose taxonomy matches `--custom-filter`
    Custom,
}

impl ArgOrganismFilter {
    /// Resolve the filter, returning `None` when a custom filter was requested
    /// without any taxa to match
    pub fn resolve(self, custom: Option<&str>) -> Option<OrganismFilter> {
        match (self, custom) {
            (Self::Custom, Some(taxa)) if !taxa.trim().is_empty() => {
                Some(OrganismFilter::custom(taxa))
            }
            (Self::Custom, _) => None,
            (kind, _) => Some(kind.into()),
        }
    }
}

impl Into<OrganismFilter> for ArgOrganismFilter {
    fn into(self) -> OrganismFilter {
        match self {
            ArgOrganismFilter::Full => OrganismFilter::Full,
            ArgOrganismFilter::Bacteria => OrganismFilter::Bacteria,
            ArgOrganismFilter::Fungi => OrganismFilter::Fungi,
            ArgOrganismFilter::Custom => OrganismFilter::Custom(Vec::new()),
        }
    }
}

impl Display for ArgOrganismFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The kind of input the driver was given, judged by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    MassList,
    MolecularNetwork,
}

impl InputKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" | "txt" => Some(Self::MassList),
            "graphml" => Some(Self::MolecularNetwork),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_resolve_filter() {
        assert_eq!(ArgOrganismFilter::Fungi.resolve(None), Some(OrganismFilter::Fungi));
        assert_eq!(
            ArgOrganismFilter::Full.resolve(Some("Aspergillus")),
            Some(OrganismFilter::Full)
        );
        assert_eq!(
            ArgOrganismFilter::Custom.resolve(Some("Aspergillus")),
            Some(OrganismFilter::custom("Aspergillus"))
        );
        assert_eq!(ArgOrganismFilter::Custom.resolve(Some("  ")), None);
        assert_eq!(ArgOrganismFilter::Custom.resolve(None), None);
    }

    #[test]
    fn test_input_kind() {
        assert_eq!(InputKind::from_extension("CSV"), Some(InputKind::MassList));
        assert_eq!(InputKind::from_extension("txt"), Some(InputKind::MassList));
        assert_eq!(
            InputKind::from_extension("graphml"),
            Some(InputKind::MolecularNetwork)
        );
        assert_eq!(InputKind::from_extension("mzML"), None);
    }
}
