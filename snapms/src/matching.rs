//! Matching observed masses to reference compounds as adduct ions
use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, instrument};

use crate::adduct::AdductKind;
use crate::mass_list::calculate_error;
use crate::reference::{ReferenceCompound, ReferenceTable, UNKNOWN_NAME};

pub const NPATLAS_COMPOUND_URL: &str = "https://www.npatlas.org/explore/compounds";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    #[error("The {0} adduct mass has not been computed for the reference database")]
    AdductNotComputed(AdductKind),
}

/// Whether `c` is in the set of characters accepted in display names
fn is_display_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || ('α'..='ω').contains(&c)
        || ('Α'..='Ω').contains(&c)
        || matches!(
            c,
            ' ' | '-'
                | '‐'
                | '~'
                | ','
                | '"'
                | '\''
                | '$'
                | '&'
                | '*'
                | '('
                | ')'
                | '±'
                | '['
                | ']'
                | '′'
                | '’'
                | '+'
                | '.'
                | '/'
                | '–'
                | '″'
                | '<'
                | '>'
                | '−'
                | '{'
                | '}'
                | '|'
                | '_'
                | ':'
                | ';'
        )
}

/// Check that a compound name only uses the display character set.
///
/// A single trailing newline is tolerated.
pub fn is_display_safe(name: &str) -> bool {
    let body = name.strip_suffix('\n').unwrap_or(name);
    !body.is_empty() && body.chars().all(is_display_char)
}

/// Strip form feeds and replace every non-ASCII character with `?`
pub fn xml_safe_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '\u{c}')
        .map(|c| if c.is_ascii() { c } else { '?' })
        .collect()
}

/// The name to display for a compound, falling back to [`UNKNOWN_NAME`] when the
/// name contains characters outside the display set
pub fn friendly_name(name: &str) -> String {
    if is_display_safe(name) {
        xml_safe_name(name)
    } else {
        UNKNOWN_NAME.to_string()
    }
}

pub fn npatlas_url(npaid: &str) -> String {
    format!("{NPATLAS_COMPOUND_URL}/{npaid}")
}

/// A reference compound whose ionized mass matched an observed mass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompoundMatch<'a> {
    pub compound: &'a ReferenceCompound,
    /// The 1-based position of the observed mass in the searched list
    pub compound_group: usize,
    pub adduct: AdductKind,
    /// The observed mass
    pub mass: f64,
}

impl<'a> CompoundMatch<'a> {
    pub fn new(
        compound: &'a ReferenceCompound,
        compound_group: usize,
        adduct: AdductKind,
        mass: f64,
    ) -> Self {
        Self {
            compound,
            compound_group,
            adduct,
            mass,
        }
    }

    pub fn npaid(&self) -> &str {
        &self.compound.npaid
    }

    pub fn smiles(&self) -> &str {
        &self.compound.smiles
    }

    pub fn exact_mass(&self) -> f64 {
        self.compound.exact_mass
    }

    pub fn npatlas_url(&self) -> String {
        npatlas_url(&self.compound.npaid)
    }

    pub fn friendly_name(&self) -> String {
        friendly_name(&self.compound.name)
    }
}

/// A mass-sorted index over the adduct masses of a [`ReferenceTable`].
///
/// Building the index once lets many mass lists be searched against the
/// same table.
#[derive(Debug, Clone)]
pub struct CompoundMatcher<'a> {
    table: &'a ReferenceTable,
    index: BTreeMap<AdductKind, Vec<(f64, usize)>>,
}

impl<'a> CompoundMatcher<'a> {
    pub fn new(table: &'a ReferenceTable, adducts: &[AdductKind]) -> Result<Self, MatchError> {
        let mut index = BTreeMap::new();
        for kind in adducts.iter().copied() {
            if index.contains_key(&kind) {
                continue;
            }
            if !table.has_adduct(kind) {
                return Err(MatchError::AdductNotComputed(kind));
            }
            let mut masses: Vec<(f64, usize)> = table
                .iter()
                .enumerate()
                .filter_map(|(i, c)| c.adduct_mass(kind).map(|m| (m, i)))
                .collect();
            masses.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            index.insert(kind, masses);
        }
        Ok(Self { table, index })
    }

    pub fn table(&self) -> &'a ReferenceTable {
        self.table
    }

    /// Find the rows whose `kind` mass lies in the closed interval `[lo, hi]`,
    /// in table row order
    pub fn search(&self, kind: AdductKind, lo: f64, hi: f64) -> Result<Vec<usize>, MatchError> {
        let masses = self
            .index
            .get(&kind)
            .ok_or(MatchError::AdductNotComputed(kind))?;
        let start = masses.partition_point(|(m, _)| *m < lo);
        let mut rows: Vec<usize> = masses[start..]
            .iter()
            .take_while(|(m, _)| *m <= hi)
            .map(|(_, i)| *i)
            .collect();
        rows.sort_unstable();
        Ok(rows)
    }

    /// Match every mass as every adduct in `adducts`.
    ///
    /// Matches are emitted by mass, then by adduct in the given order, then by
    /// reference table row.
    #[instrument(level = "debug", skip_all, fields(n_masses = masses.len()))]
    pub fn match_masses(
        &self,
        masses: &[f64],
        ppm: f64,
        adducts: &[AdductKind],
    ) -> Result<Vec<CompoundMatch<'a>>, MatchError> {
        let mut matches = Vec::new();
        for (i, mass) in masses.iter().copied().enumerate() {
            let tol = calculate_error(mass, ppm);
            for kind in adducts.iter().copied() {
                for row in self.search(kind, mass - tol, mass + tol)? {
                    matches.push(CompoundMatch::new(&self.table[row], i + 1, kind, mass));
                }
            }
        }
        debug!("Found {} candidate adduct masses", matches.len());
        Ok(matches)
    }
}

/// Match `masses` against `table` for each of `adducts`, see [`CompoundMatcher::match_masses`]
pub fn compute_adduct_matches<'a>(
    masses: &[f64],
    ppm: f64,
    adducts: &[AdductKind],
    table: &'a ReferenceTable,
) -> Result<Vec<CompoundMatch<'a>>, MatchError> {
    CompoundMatcher::new(table, adducts)?.match_masses(masses, ppm, adducts)
}

#[cfg(test)]
mod test {
    use super::*;

    fn make_table() -> ReferenceTable {
        ReferenceTable::new(vec![
            ReferenceCompound::new("NPA000001", "Fakamycin", "CCO", 419.135)
                .with_adduct_mass(AdductKind::Protonated, 420.1423)
                .with_adduct_mass(AdductKind::Sodiated, 442.1243),
            ReferenceCompound::new("NPA000002", "Jadomycim³", "CCN", 300.0)
                .with_adduct_mass(AdductKind::Protonated, 301.007276)
                .with_adduct_mass(AdductKind::Sodiated, 420.1421),
            ReferenceCompound::new("NPA000003", "Boundarin", "CCC", 400.0)
                .with_adduct_mass(AdductKind::Protonated, 420.1440)
                .with_adduct_mass(AdductKind::Sodiated, 422.989218),
        ])
    }

    #[test]
    fn test_display_names() {
        assert!(is_display_safe("Fakamycin"));
        assert!(!is_display_safe("Jadomycim³"));
        assert!(is_display_safe("β-Lactam (±)-[2]"));
        assert!(!is_display_safe(""));
        assert!(!is_display_safe("Tab\tname"));
        assert_eq!(friendly_name("Jadomycim³"), UNKNOWN_NAME);
        assert_eq!(friendly_name("β-Lactam"), "?-Lactam");
        assert_eq!(friendly_name("3′-Hydroxy"), "3?-Hydroxy");
        assert_eq!(xml_safe_name("A\u{c}B"), "AB");
    }

    #[test]
    fn test_url() {
        let table = make_table();
        let hit = CompoundMatch::new(&table[0], 1, AdductKind::Protonated, 420.1421);
        assert_eq!(
            hit.npatlas_url(),
            "https://www.npatlas.org/explore/compounds/NPA000001"
        );
        assert_eq!(hit.friendly_name(), "Fakamycin");
        assert_eq!(
            CompoundMatch::new(&table[1], 1, AdductKind::Protonated, 420.1421).friendly_name(),
            UNKNOWN_NAME
        );
    }

    #[test]
    fn test_single_match() -> Result<(), MatchError> {
        let table = ReferenceTable::new(vec![ReferenceCompound::new(
            "NPA000001",
            "Fakamycin",
            "CCO",
            419.135,
        )
        .with_adduct_mass(AdductKind::Protonated, 420.1423)
        .with_adduct_mass(AdductKind::Sodiated, 442.1243)]);
        let matches =
            compute_adduct_matches(&[420.1421, 438.1752], 10.0, &[AdductKind::Protonated], &table)?;
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].npaid(), "NPA000001");
        assert_eq!(matches[0].compound_group, 1);
        assert_eq!(matches[0].mass, 420.1421);
        assert_eq!(matches[0].adduct, AdductKind::Protonated);
        Ok(())
    }

    #[test]
    fn test_window_is_closed() -> Result<(), MatchError> {
        let mass = 420.1421;
        let tol = calculate_error(mass, 10.0);
        let table = ReferenceTable::new(vec![
            ReferenceCompound::new("NPA000010", "Lower", "C", 400.0)
                .with_adduct_mass(AdductKind::Protonated, mass - tol)
                .with_adduct_mass(AdductKind::Sodiated, 0.0),
            ReferenceCompound::new("NPA000011", "Outside", "C", 400.0)
                .with_adduct_mass(AdductKind::Protonated, mass + tol + 1e-4)
                .with_adduct_mass(AdductKind::Sodiated, 0.0),
            ReferenceCompound::new("NPA000012", "Upper", "C", 400.0)
                .with_adduct_mass(AdductKind::Protonated, mass + tol)
                .with_adduct_mass(AdductKind::Sodiated, 0.0),
        ]);
        let matches = compute_adduct_matches(&[mass], 10.0, &[AdductKind::Protonated], &table)?;
        let ids: Vec<_> = matches.iter().map(|m| m.npaid()).collect();
        assert_eq!(ids, vec!["NPA000010", "NPA000012"]);
        Ok(())
    }

    #[test]
    fn test_emission_order() -> Result<(), MatchError> {
        let table = make_table();
        let adducts = [AdductKind::Sodiated, AdductKind::Protonated];
        let matches = compute_adduct_matches(&[420.1421, 422.9892], 10.0, &adducts, &table)?;
        let observed: Vec<_> = matches
            .iter()
            .map(|m| (m.compound_group, m.adduct, m.npaid()))
            .collect();
        assert_eq!(
            observed,
            vec![
                (1, AdductKind::Sodiated, "NPA000002"),
                (1, AdductKind::Protonated, "NPA000001"),
                (1, AdductKind::Protonated, "NPA000003"),
                (2, AdductKind::Sodiated, "NPA000003"),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_empty_table_and_missing_adduct() -> Result<(), MatchError> {
        let table = ReferenceTable::default().with_adducts(&[AdductKind::Protonated]);
        let matches = compute_adduct_matches(&[420.1421], 10.0, &[AdductKind::Protonated], &table)?;
        assert!(matches.is_empty());

        let table = make_table();
        assert_eq!(
            compute_adduct_matches(&[420.1421], 10.0, &[AdductKind::Potassiated], &table),
            Err(MatchError::AdductNotComputed(AdductKind::Potassiated))
        );
        Ok(())
    }
}
