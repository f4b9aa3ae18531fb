//! Ionization adducts and their deterministic mass transforms
use std::fmt::Display;
use std::str::FromStr;

use thiserror::Error;

/// The mass of a proton
pub const PROTON: f64 = 1.007276;
/// The mass of a sodium cation
pub const SODIUM: f64 = 22.989218;
/// The mass of an ammonium cation
pub const AMMONIUM: f64 = 18.033823;
/// The mass shift of a protonated ion that lost a water
pub const PROTON_MINUS_WATER: f64 = -17.00328;
/// The mass of a potassium cation
pub const POTASSIUM: f64 = 38.963158;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdductError {
    #[error("Adduct not recognized: {0}")]
    AdductNotRecognized(String),
}

/// An ionization form of a neutral molecule.
///
/// Each kind maps a neutral monoisotopic mass `M` to the mass observed
/// for that ion, and carries the column name it is stored under in a
/// [`ReferenceTable`](crate::reference::ReferenceTable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AdductKind {
    #[cfg_attr(feature = "serde", serde(rename = "m_plus_h"))]
    Protonated,
    #[cfg_attr(feature = "serde", serde(rename = "m_plus_na"))]
    Sodiated,
    #[cfg_attr(feature = "serde", serde(rename = "m_plus_nh4"))]
    Ammoniated,
    #[cfg_attr(feature = "serde", serde(rename = "m_plus_h_minus_h2o"))]
    DehydratedProtonated,
    #[cfg_attr(feature = "serde", serde(rename = "m_plus_k"))]
    Potassiated,
    #[cfg_attr(feature = "serde", serde(rename = "2m_plus_h"))]
    DimerProtonated,
    #[cfg_attr(feature = "serde", serde(rename = "2m_plus_na"))]
    DimerSodiated,
}

impl AdductKind {
    pub const ALL: [AdductKind; 7] = [
        AdductKind::Protonated,
        AdductKind::Sodiated,
        AdductKind::Ammoniated,
        AdductKind::DehydratedProtonated,
        AdductKind::Potassiated,
        AdductKind::DimerProtonated,
        AdductKind::DimerSodiated,
    ];

    /// Compute the ionized mass of a neutral molecule with monoisotopic mass `exact_mass`
    pub fn transform(&self, exact_mass: f64) -> f64 {
        match self {
            Self::Protonated => exact_mass + PROTON,
            Self::Sodiated => exact_mass + SODIUM,
            Self::Ammoniated => exact_mass + AMMONIUM,
            Self::DehydratedProtonated => exact_mass + PROTON_MINUS_WATER,
            Self::Potassiated => exact_mass + POTASSIUM,
            Self::DimerProtonated => (2.0 * exact_mass) + PROTON,
            Self::DimerSodiated => (2.0 * exact_mass) + SODIUM,
        }
    }

    /// The name of the reference table column holding this adduct's mass
    pub const fn column_name(&self) -> &'static str {
        match self {
            Self::Protonated => "m_plus_h",
            Self::Sodiated => "m_plus_na",
            Self::Ammoniated => "m_plus_nh4",
            Self::DehydratedProtonated => "m_plus_h_minus_h2o",
            Self::Potassiated => "m_plus_k",
            Self::DimerProtonated => "2m_plus_h",
            Self::DimerSodiated => "2m_plus_na",
        }
    }

    /// The conventional ion notation, e.g. `[M+H]+`
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::Protonated => "[M+H]+",
            Self::Sodiated => "[M+Na]+",
            Self::Ammoniated => "[M+NH4]+",
            Self::DehydratedProtonated => "[M+H-H2O]+",
            Self::Potassiated => "[M+K]+",
            Self::DimerProtonated => "[2M+H]+",
            Self::DimerSodiated => "[2M+Na]+",
        }
    }

    /// Whether the reference database export ships this adduct's mass already
    pub const fn is_precomputed(&self) -> bool {
        matches!(self, Self::Protonated | Self::Sodiated)
    }

    /// Look up an adduct by its symbol, e.g. `[M+Na]+`
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.symbol() == symbol)
    }
}

impl Display for AdductKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column_name())
    }
}

impl FromStr for AdductKind {
    type Err = AdductError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|a| a.column_name() == s)
            .or_else(|| Self::from_symbol(s))
            .ok_or_else(|| AdductError::AdductNotRecognized(s.to_string()))
    }
}

/// The adducts searched when none are configured, in search order.
///
/// A fresh list is built on every call.
pub fn default_adducts() -> Vec<AdductKind> {
    AdductKind::ALL.to_vec()
}
