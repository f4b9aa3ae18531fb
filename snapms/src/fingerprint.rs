//! Circular (Morgan) fingerprints over SMILES structures, compared by the Dice
//! coefficient on feature counts.
//!
//! The SMILES reader covers the organic subset, bracket atoms, aromaticity,
//! branches, ring closures and disconnected components. Stereochemistry is
//! read and discarded. Explicit hydrogen atoms are folded into the hydrogen
//! count of their heavy neighbor.
use std::collections::{HashMap, HashSet, VecDeque};
use std::str::FromStr;

use identity_hash::BuildIdentityHasher;
use thiserror::Error;
use tracing::warn;

use crate::mass_list::round_to;
use crate::similarity::{SimilarityMatrix, StructureSimilarity};

#[rustfmt::skip]
const ELEMENTS: [&str; 119] = [
    "*", "H", "He", "Li", "Be", "B", "C", "N", "O", "F", "Ne", "Na", "Mg", "Al", "Si", "P", "S",
    "Cl", "Ar", "K", "Ca", "Sc", "Ti", "V", "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn", "Ga", "Ge",
    "As", "Se", "Br", "Kr", "Rb", "Sr", "Y", "Zr", "Nb", "Mo", "Tc", "Ru", "Rh", "Pd", "Ag", "Cd",
    "In", "Sn", "Sb", "Te", "I", "Xe", "Cs", "Ba", "La", "Ce", "Pr", "Nd", "Pm", "Sm", "Eu", "Gd",
    "Tb", "Dy", "Ho", "Er", "Tm", "Yb", "Lu", "Hf", "Ta", "W", "Re", "Os", "Ir", "Pt", "Au", "Hg",
    "Tl", "Pb", "Bi", "Po", "At", "Rn", "Fr", "Ra", "Ac", "Th", "Pa", "U", "Np", "Pu", "Am", "Cm",
    "Bk", "Cf", "Es", "Fm", "Md", "No", "Lr", "Rf", "Db", "Sg", "Bh", "Hs", "Mt", "Ds", "Rg", "Cn",
    "Nh", "Fl", "Mc", "Lv", "Ts", "Og",
];

fn element_number(symbol: &str) -> Option<u8> {
    ELEMENTS
        .iter()
        .position(|e| *e == symbol)
        .map(|i| i as u8)
}

fn aromatic_element_number(symbol: &str) -> Option<u8> {
    match symbol {
        "b" => Some(5),
        "c" => Some(6),
        "n" => Some(7),
        "o" => Some(8),
        "p" => Some(15),
        "s" => Some(16),
        "as" => Some(33),
        "se" => Some(34),
        "te" => Some(52),
        _ => None,
    }
}

/// The normal valences of the organic subset, lowest first
fn default_valences(atomic_number: u8) -> &'static [u8] {
    match atomic_number {
        5 => &[3],
        6 => &[4],
        7 => &[3, 5],
        8 => &[2],
        15 => &[3, 5],
        16 => &[2, 4, 6],
        9 | 17 | 35 | 53 => &[1],
        _ => &[],
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SmilesError {
    #[error("The structure is empty")]
    Empty,
    #[error("Unexpected character {0:?} at position {1}")]
    UnexpectedCharacter(char, usize),
    #[error("Unknown element {0:?} at position {1}")]
    UnknownElement(String, usize),
    #[error("Unclosed bracket atom starting at position {0}")]
    UnclosedBracket(usize),
    #[error("Unbalanced branch at position {0}")]
    UnbalancedBranch(usize),
    #[error("Bond or ring closure at position {0} has no preceding atom")]
    DanglingBond(usize),
    #[error("Ring closure {0} was never closed")]
    UnclosedRing(u16),
    #[error("Isotope, hydrogen count or charge out of range at position {0}")]
    CountOutOfRange(usize),
    #[error("Atom {0} carries too many hydrogens")]
    TooManyHydrogens(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BondOrder {
    Single,
    Double,
    Triple,
    Quadruple,
    Aromatic,
}

impl BondOrder {
    fn valence(&self) -> u8 {
        match self {
            BondOrder::Single | BondOrder::Aromatic => 1,
            BondOrder::Double => 2,
            BondOrder::Triple => 3,
            BondOrder::Quadruple => 4,
        }
    }

    fn invariant(&self) -> u32 {
        match self {
            BondOrder::Single => 1,
            BondOrder::Double => 2,
            BondOrder::Triple => 3,
            BondOrder::Quadruple => 4,
            BondOrder::Aromatic => 12,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atom {
    pub atomic_number: u8,
    pub aromatic: bool,
    pub isotope: u16,
    pub charge: i8,
    /// Hydrogens written inside a bracket atom, `None` for organic subset atoms
    pub bracket_hydrogens: Option<u8>,
    /// The total number of attached hydrogens, implicit or explicit
    pub hydrogens: u8,
}

impl Atom {
    fn organic(atomic_number: u8, aromatic: bool) -> Self {
        Self {
            atomic_number,
            aromatic,
            isotope: 0,
            charge: 0,
            bracket_hydrogens: None,
            hydrogens: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bond {
    pub source: usize,
    pub target: usize,
    pub order: BondOrder,
}

/// A molecular graph of heavy atoms
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Molecule {
    atoms: Vec<Atom>,
    bonds: Vec<Bond>,
    /// For each atom, `(neighbor, bond index)` pairs
    adjacency: Vec<Vec<(usize, usize)>>,
}

impl Molecule {
    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    pub fn degree(&self, atom: usize) -> usize {
        self.adjacency[atom].len()
    }

    fn add_atom(&mut self, atom: Atom) -> usize {
        self.atoms.push(atom);
        self.adjacency.push(Vec::new());
        self.atoms.len() - 1
    }

    fn add_bond(&mut self, source: usize, target: usize, order: BondOrder) {
        let index = self.bonds.len();
        self.bonds.push(Bond {
            source,
            target,
            order,
        });
        self.adjacency[source].push((target, index));
        self.adjacency[target].push((source, index));
    }

    fn default_bond(&self, a: usize, b: usize) -> BondOrder {
        if self.atoms[a].aromatic && self.atoms[b].aromatic {
            BondOrder::Aromatic
        } else {
            BondOrder::Single
        }
    }

    fn explicit_valence(&self, atom: usize) -> u8 {
        self.adjacency[atom]
            .iter()
            .map(|(_, b)| self.bonds[*b].order.valence())
            .sum()
    }

    fn assign_hydrogens(&mut self) {
        for i in 0..self.atoms.len() {
            let valence = self.explicit_valence(i) as i16;
            let atom = &self.atoms[i];
            let hydrogens = match atom.bracket_hydrogens {
                Some(h) => h as i16,
                None => {
                    let valences = default_valences(atom.atomic_number);
                    if atom.aromatic {
                        valences
                            .first()
                            .map(|v| (*v as i16 - (valence + 1)).max(0))
                            .unwrap_or_default()
                    } else {
                        valences
                            .iter()
                            .map(|v| *v as i16)
                            .find(|v| *v >= valence)
                            .map(|v| v - valence)
                            .unwrap_or_default()
                    }
                }
            };
            self.atoms[i].hydrogens = hydrogens as u8;
        }
    }

    /// Remove plain hydrogen atoms bonded to a single heavy atom, counting them
    /// on that neighbor instead
    fn fold_hydrogens(self) -> Result<Self, SmilesError> {
        let foldable: Vec<bool> = (0..self.atoms.len())
            .map(|i| {
                let atom = &self.atoms[i];
                atom.atomic_number == 1
                    && atom.isotope == 0
                    && atom.charge == 0
                    && self.adjacency[i].len() == 1
                    && self.atoms[self.adjacency[i][0].0].atomic_number != 1
            })
            .collect();
        if !foldable.iter().any(|f| *f) {
            return Ok(self);
        }

        let mut molecule = Molecule::default();
        let mut new_index = vec![usize::MAX; self.atoms.len()];
        let mut extra_hydrogens = vec![0u8; self.atoms.len()];
        for (i, atom) in self.atoms.iter().enumerate() {
            if foldable[i] {
                let heavy = self.adjacency[i][0].0;
                extra_hydrogens[heavy] = extra_hydrogens[heavy]
                    .checked_add(1)
                    .ok_or(SmilesError::TooManyHydrogens(heavy))?;
            } else {
                new_index[i] = molecule.add_atom(atom.clone());
            }
        }
        for (i, extra) in extra_hydrogens.into_iter().enumerate() {
            if !foldable[i] {
                let atom = &mut molecule.atoms[new_index[i]];
                atom.hydrogens = atom
                    .hydrogens
                    .checked_add(extra)
                    .ok_or(SmilesError::TooManyHydrogens(i))?;
            }
        }
        for bond in self.bonds.iter() {
            if foldable[bond.source] || foldable[bond.target] {
                continue;
            }
            molecule.add_bond(new_index[bond.source], new_index[bond.target], bond.order);
        }
        Ok(molecule)
    }

    fn is_ring_bond(&self, bond: usize) -> bool {
        let Bond { source, target, .. } = self.bonds[bond];
        let mut seen = vec![false; self.atoms.len()];
        let mut queue = VecDeque::from([source]);
        seen[source] = true;
        while let Some(atom) = queue.pop_front() {
            for (next, via) in self.adjacency[atom].iter().copied() {
                if via == bond || seen[next] {
                    continue;
                }
                if next == target {
                    return true;
                }
                seen[next] = true;
                queue.push_back(next);
            }
        }
        false
    }

    /// Whether each atom participates in at least one ring
    pub fn ring_atoms(&self) -> Vec<bool> {
        let mut in_ring = vec![false; self.atoms.len()];
        for (i, bond) in self.bonds.iter().enumerate() {
            if self.is_ring_bond(i) {
                in_ring[bond.source] = true;
                in_ring[bond.target] = true;
            }
        }
        in_ring
    }

    pub fn from_smiles(smiles: &str) -> Result<Self, SmilesError> {
        SmilesReader::new(smiles).read()
    }
}

impl FromStr for Molecule {
    type Err = SmilesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_smiles(s)
    }
}

struct SmilesReader {
    chars: Vec<char>,
    pos: usize,
    molecule: Molecule,
    previous: Option<usize>,
    pending_bond: Option<BondOrder>,
    branches: Vec<Option<usize>>,
    rings: HashMap<u16, (usize, Option<BondOrder>)>,
}

impl SmilesReader {
    fn new(smiles: &str) -> Self {
        Self {
            chars: smiles.trim().chars().collect(),
            pos: 0,
            molecule: Molecule::default(),
            previous: None,
            pending_bond: None,
            branches: Vec::new(),
            rings: HashMap::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn push_atom(&mut self, atom: Atom) {
        let index = self.molecule.add_atom(atom);
        if let Some(previous) = self.previous {
            let order = self
                .pending_bond
                .take()
                .unwrap_or_else(|| self.molecule.default_bond(previous, index));
            self.molecule.add_bond(previous, index, order);
        }
        self.pending_bond = None;
        self.previous = Some(index);
    }

    fn read_number(&mut self) -> Option<u32> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        if start == self.pos {
            None
        } else {
            self.chars[start..self.pos]
                .iter()
                .collect::<String>()
                .parse()
                .ok()
        }
    }

    fn read_organic(&mut self) -> Result<Atom, SmilesError> {
        let start = self.pos;
        let c = self.chars[self.pos];
        self.pos += 1;
        let two_letter = match (c, self.peek()) {
            ('C', Some('l')) => Some(17),
            ('B', Some('r')) => Some(35),
            _ => None,
        };
        if let Some(z) = two_letter {
            self.pos += 1;
            return Ok(Atom::organic(z, false));
        }
        match c {
            '*' => Ok(Atom::organic(0, false)),
            'B' => Ok(Atom::organic(5, false)),
            'C' => Ok(Atom::organic(6, false)),
            'N' => Ok(Atom::organic(7, false)),
            'O' => Ok(Atom::organic(8, false)),
            'P' => Ok(Atom::organic(15, false)),
            'S' => Ok(Atom::organic(16, false)),
            'F' => Ok(Atom::organic(9, false)),
            'I' => Ok(Atom::organic(53, false)),
            'b' | 'c' | 'n' | 'o' | 'p' | 's' => {
                let z = aromatic_element_number(&c.to_string())
                    .ok_or_else(|| SmilesError::UnknownElement(c.to_string(), start))?;
                Ok(Atom::organic(z, true))
            }
            _ => Err(SmilesError::UnexpectedCharacter(c, start)),
        }
    }

    /// Read an optional count that must fit in `T`
    fn read_count<T: TryFrom<u32>>(&mut self) -> Result<Option<T>, SmilesError> {
        let start = self.pos;
        if !self.peek().is_some_and(|c| c.is_ascii_digit()) {
            return Ok(None);
        }
        self.read_number()
            .and_then(|n| T::try_from(n).ok())
            .map(Some)
            .ok_or(SmilesError::CountOutOfRange(start))
    }

    fn read_bracket(&mut self) -> Result<Atom, SmilesError> {
        let start = self.pos;
        // Skip the opening bracket
        self.pos += 1;
        let isotope: u16 = self.read_count()?.unwrap_or_default();

        let first = self.peek().ok_or(SmilesError::UnclosedBracket(start))?;
        let (atomic_number, aromatic) = if first == '*' {
            self.pos += 1;
            (0, false)
        } else if first.is_ascii_lowercase() {
            let pair: String = [Some(first), self.peek_at(1)].into_iter().flatten().collect();
            if let Some(z) = aromatic_element_number(&pair) {
                self.pos += 2;
                (z, true)
            } else if let Some(z) = aromatic_element_number(&first.to_string()) {
                self.pos += 1;
                (z, true)
            } else {
                return Err(SmilesError::UnknownElement(first.to_string(), self.pos));
            }
        } else if first.is_ascii_uppercase() {
            let pair: Option<String> = self
                .peek_at(1)
                .filter(|c| c.is_ascii_lowercase())
                .map(|c| [first, c].iter().collect());
            match pair.as_deref().and_then(element_number) {
                Some(z) => {
                    self.pos += 2;
                    (z, false)
                }
                None => {
                    let z = element_number(&first.to_string())
                        .ok_or_else(|| SmilesError::UnknownElement(first.to_string(), self.pos))?;
                    self.pos += 1;
                    (z, false)
                }
            }
        } else {
            return Err(SmilesError::UnexpectedCharacter(first, self.pos));
        };

        // Chirality is not used
        while self.peek() == Some('@') {
            self.pos += 1;
        }
        if self.peek().is_some_and(|c| c.is_ascii_uppercase())
            && self.peek_at(1).is_some_and(|c| c.is_ascii_uppercase())
            && self.peek_at(2).is_some_and(|c| c.is_ascii_digit())
        {
            self.pos += 2;
            self.read_number();
        }

        let mut hydrogens = 0u8;
        if self.peek() == Some('H') {
            self.pos += 1;
            hydrogens = self.read_count()?.unwrap_or(1);
        }

        let mut charge = 0i8;
        while let Some(sign) = self.peek().filter(|c| *c == '+' || *c == '-') {
            let position = self.pos;
            self.pos += 1;
            let unit: i8 = if sign == '+' { 1 } else { -1 };
            let n: i8 = self.read_count()?.unwrap_or(1);
            charge = charge
                .checked_add(unit * n)
                .ok_or(SmilesError::CountOutOfRange(position))?;
        }

        if self.peek() == Some(':') {
            self.pos += 1;
            self.read_number();
        }

        match self.peek() {
            Some(']') => {
                self.pos += 1;
            }
            Some(c) => return Err(SmilesError::UnexpectedCharacter(c, self.pos)),
            None => return Err(SmilesError::UnclosedBracket(start)),
        }

        Ok(Atom {
            atomic_number,
            aromatic,
            isotope,
            charge,
            bracket_hydrogens: Some(hydrogens),
            hydrogens,
        })
    }

    fn close_ring(&mut self, label: u16, position: usize) -> Result<(), SmilesError> {
        let atom = self.previous.ok_or(SmilesError::DanglingBond(position))?;
        match self.rings.remove(&label) {
            Some((opened, opened_bond)) => {
                let order = self
                    .pending_bond
                    .take()
                    .or(opened_bond)
                    .unwrap_or_else(|| self.molecule.default_bond(opened, atom));
                self.molecule.add_bond(opened, atom, order);
            }
            None => {
                let bond = self.pending_bond.take();
                self.rings.insert(label, (atom, bond));
            }
        }
        Ok(())
    }

    fn read(mut self) -> Result<Molecule, SmilesError> {
        if self.chars.is_empty() {
            return Err(SmilesError::Empty);
        }
        while let Some(c) = self.peek() {
            let position = self.pos;
            match c {
                '(' => {
                    if self.previous.is_none() {
                        return Err(SmilesError::UnbalancedBranch(position));
                    }
                    self.branches.push(self.previous);
                    self.pos += 1;
                }
                ')' => {
                    self.previous = self
                        .branches
                        .pop()
                        .ok_or(SmilesError::UnbalancedBranch(position))?;
                    self.pos += 1;
                }
                '.' => {
                    self.previous = None;
                    self.pending_bond = None;
                    self.pos += 1;
                }
                '-' | '=' | '#' | '$' | ':' | '/' | '\\' => {
                    if self.previous.is_none() {
                        return Err(SmilesError::DanglingBond(position));
                    }
                    self.pending_bond = Some(match c {
                        '=' => BondOrder::Double,
                        '#' => BondOrder::Triple,
                        '$' => BondOrder::Quadruple,
                        ':' => BondOrder::Aromatic,
                        _ => BondOrder::Single,
                    });
                    self.pos += 1;
                }
                '[' => {
                    let atom = self.read_bracket()?;
                    self.push_atom(atom);
                }
                '%' => {
                    self.pos += 1;
                    let digits: String = self.chars[self.pos..]
                        .iter()
                        .take(2)
                        .take_while(|c| c.is_ascii_digit())
                        .collect();
                    if digits.len() != 2 {
                        return Err(SmilesError::UnexpectedCharacter(c, position));
                    }
                    self.pos += 2;
                    let label = digits
                        .parse()
                        .map_err(|_| SmilesError::UnexpectedCharacter(c, position))?;
                    self.close_ring(label, position)?;
                }
                c if c.is_ascii_digit() => {
                    self.pos += 1;
                    self.close_ring(c as u16 - '0' as u16, position)?;
                }
                _ => {
                    let atom = self.read_organic()?;
                    self.push_atom(atom);
                }
            }
        }
        if !self.branches.is_empty() {
            return Err(SmilesError::UnbalancedBranch(self.pos));
        }
        if let Some(label) = self.rings.keys().min() {
            return Err(SmilesError::UnclosedRing(*label));
        }
        if self.molecule.atoms.is_empty() {
            return Err(SmilesError::Empty);
        }
        self.molecule.assign_hydrogens();
        self.molecule.fold_hydrogens()
    }
}

fn hash_combine(seed: &mut u32, value: u32) {
    *seed ^= value
        .wrapping_add(0x9e3779b9)
        .wrapping_add(*seed << 6)
        .wrapping_add(*seed >> 2);
}

type FeatureCounts = HashMap<u32, u32, BuildIdentityHasher<u32>>;

/// A count-based circular fingerprint, as sorted `(feature, count)` pairs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fingerprint {
    features: Vec<(u32, u32)>,
}

impl Fingerprint {
    fn from_counts(counts: FeatureCounts) -> Self {
        let mut features: Vec<(u32, u32)> = counts.into_iter().collect();
        features.sort_unstable();
        Self { features }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn total(&self) -> u32 {
        self.features.iter().map(|(_, c)| *c).sum()
    }

    pub fn count(&self, feature: u32) -> u32 {
        self.features
            .binary_search_by_key(&feature, |(f, _)| *f)
            .map(|i| self.features[i].1)
            .unwrap_or_default()
    }

    /// `2 * sum(min(a, b)) / (sum(a) + sum(b))` over shared features
    pub fn dice(&self, other: &Fingerprint) -> f64 {
        let total = self.total() + other.total();
        if total == 0 {
            return 0.0;
        }
        let mut shared = 0u32;
        let (mut i, mut j) = (0, 0);
        while i < self.features.len() && j < other.features.len() {
            let (fa, ca) = self.features[i];
            let (fb, cb) = other.features[j];
            match fa.cmp(&fb) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    shared += ca.min(cb);
                    i += 1;
                    j += 1;
                }
            }
        }
        (2.0 * shared as f64) / total as f64
    }
}

fn atom_invariants(molecule: &Molecule) -> Vec<u32> {
    let in_ring = molecule.ring_atoms();
    molecule
        .atoms
        .iter()
        .enumerate()
        .map(|(i, atom)| {
            let mut seed = 0u32;
            hash_combine(&mut seed, atom.atomic_number as u32);
            hash_combine(&mut seed, (molecule.degree(i) + atom.hydrogens as usize) as u32);
            hash_combine(&mut seed, atom.hydrogens as u32);
            hash_combine(&mut seed, atom.charge as i32 as u32);
            hash_combine(&mut seed, atom.isotope as u32);
            if in_ring[i] {
                hash_combine(&mut seed, 1);
            }
            seed
        })
        .collect()
}

/// Compute the count-based Morgan fingerprint of `molecule` out to `radius` bonds.
///
/// An atom environment is only counted the first time its set of covered bonds
/// is seen, so symmetric or saturated environments are not double counted.
pub fn morgan_fingerprint(molecule: &Molecule, radius: u32) -> Fingerprint {
    let n_atoms = molecule.atoms.len();
    let n_words = molecule.bonds.len().div_ceil(64).max(1);

    let mut invariants = atom_invariants(molecule);
    let mut counts = FeatureCounts::default();
    for inv in invariants.iter() {
        *counts.entry(*inv).or_default() += 1;
    }

    let mut environments: Vec<Vec<u64>> = vec![vec![0; n_words]; n_atoms];
    let mut dead: Vec<bool> = (0..n_atoms).map(|i| molecule.degree(i) == 0).collect();
    let mut seen: HashSet<Vec<u64>> = HashSet::new();

    for layer in 0..radius {
        let mut round: Vec<(Vec<u64>, u32, usize)> = Vec::with_capacity(n_atoms);
        let mut next_invariants = invariants.clone();
        for atom in 0..n_atoms {
            if dead[atom] {
                continue;
            }
            let mut env = environments[atom].clone();
            let mut neighbors: Vec<(u32, u32)> = Vec::with_capacity(molecule.degree(atom));
            for (neighbor, bond) in molecule.adjacency[atom].iter().copied() {
                env[bond / 64] |= 1 << (bond % 64);
                for (word, other) in env.iter_mut().zip(environments[neighbor].iter()) {
                    *word |= *other;
                }
                neighbors.push((molecule.bonds[bond].order.invariant(), invariants[neighbor]));
            }
            neighbors.sort_unstable();

            let mut seed = layer;
            hash_combine(&mut seed, invariants[atom]);
            for (bond_inv, atom_inv) in neighbors {
                hash_combine(&mut seed, bond_inv);
                hash_combine(&mut seed, atom_inv);
            }
            next_invariants[atom] = seed;
            round.push((env, seed, atom));
        }
        if round.is_empty() {
            break;
        }
        round.sort();
        for (env, inv, atom) in round {
            if seen.contains(&env) {
                dead[atom] = true;
            } else {
                *counts.entry(inv).or_default() += 1;
                seen.insert(env.clone());
            }
            environments[atom] = env;
        }
        invariants = next_invariants;
    }
    Fingerprint::from_counts(counts)
}

/// Dice similarity of Morgan count fingerprints, rounded to two decimal places
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MorganDiceSimilarity {
    pub radius: u32,
}

impl Default for MorganDiceSimilarity {
    fn default() -> Self {
        Self { radius: 2 }
    }
}

impl MorganDiceSimilarity {
    pub fn new(radius: u32) -> Self {
        Self { radius }
    }

    pub fn fingerprint(&self, smiles: &str) -> Result<Fingerprint, SmilesError> {
        let molecule = Molecule::from_smiles(smiles)?;
        Ok(morgan_fingerprint(&molecule, self.radius))
    }

    fn fingerprint_or_warn(&self, smiles: &str) -> Option<Fingerprint> {
        match self.fingerprint(smiles) {
            Ok(fp) => Some(fp),
            Err(e) => {
                warn!("Failed to read structure {smiles:?}: {e}");
                None
            }
        }
    }
}

impl StructureSimilarity for MorganDiceSimilarity {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        match (self.fingerprint_or_warn(a), self.fingerprint_or_warn(b)) {
            (Some(a), Some(b)) => round_to(a.dice(&b), 2),
            _ => 0.0,
        }
    }

    fn similarity_matrix(&self, structures: &[&str]) -> SimilarityMatrix {
        let fingerprints: Vec<Option<Fingerprint>> = structures
            .iter()
            .map(|s| self.fingerprint_or_warn(s))
            .collect();
        let mut matrix = SimilarityMatrix::identity(structures.len());
        for (i, a) in fingerprints.iter().enumerate() {
            let Some(a) = a else { continue };
            for (j, b) in fingerprints.iter().enumerate().skip(i + 1) {
                if let Some(b) = b {
                    matrix.set(i, j, round_to(a.dice(b), 2));
                }
            }
        }
        matrix
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_simple() -> Result<(), SmilesError> {
        let mol = Molecule::from_smiles("CCO")?;
        assert_eq!(mol.atoms().len(), 3);
        assert_eq!(mol.bonds().len(), 2);
        let hydrogens: Vec<_> = mol.atoms().iter().map(|a| a.hydrogens).collect();
        assert_eq!(hydrogens, vec![3, 2, 1]);

        let mol = Molecule::from_smiles("C(=O)O")?;
        assert_eq!(mol.bonds()[0].order, BondOrder::Double);
        assert_eq!(mol.atoms()[0].hydrogens, 1);
        assert_eq!(mol.atoms()[1].hydrogens, 0);

        let mol = Molecule::from_smiles("ClCBr")?;
        let elements: Vec<_> = mol.atoms().iter().map(|a| a.atomic_number).collect();
        assert_eq!(elements, vec![17, 6, 35]);
        Ok(())
    }

    #[test]
    fn test_parse_rings_and_aromatics() -> Result<(), SmilesError> {
        let benzene = Molecule::from_smiles("c1ccccc1")?;
        assert_eq!(benzene.bonds().len(), 6);
        assert!(benzene.bonds().iter().all(|b| b.order == BondOrder::Aromatic));
        assert!(benzene.atoms().iter().all(|a| a.hydrogens == 1));
        assert!(benzene.ring_atoms().into_iter().all(|r| r));

        let toluene = Molecule::from_smiles("Cc1ccccc1")?;
        let ring = toluene.ring_atoms();
        assert!(!ring[0]);
        assert!(ring[1]);
        assert_eq!(toluene.atoms()[1].hydrogens, 0);

        let pyridine = Molecule::from_smiles("c1ccncc1")?;
        assert_eq!(pyridine.atoms()[3].hydrogens, 0);

        let label = Molecule::from_smiles("C%10CC%10")?;
        assert_eq!(label.bonds().len(), 3);
        Ok(())
    }

    #[test]
    fn test_parse_brackets() -> Result<(), SmilesError> {
        let mol = Molecule::from_smiles("[NH4+].[Cl-]")?;
        assert_eq!(mol.atoms()[0].charge, 1);
        assert_eq!(mol.atoms()[0].hydrogens, 4);
        assert_eq!(mol.atoms()[1].charge, -1);
        assert!(mol.bonds().is_empty());

        let mol = Molecule::from_smiles("[13CH3][C@@H](O)C(=O)[O-]")?;
        assert_eq!(mol.atoms()[0].isotope, 13);
        assert_eq!(mol.atoms()[1].hydrogens, 1);

        let mol = Molecule::from_smiles("[H]OC")?;
        assert_eq!(mol.atoms().len(), 2);
        assert_eq!(mol.atoms()[0].hydrogens, 1);
        Ok(())
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Molecule::from_smiles(""), Err(SmilesError::Empty));
        assert_eq!(Molecule::from_smiles("C1CC"), Err(SmilesError::UnclosedRing(1)));
        assert!(matches!(
            Molecule::from_smiles("C(C"),
            Err(SmilesError::UnbalancedBranch(_))
        ));
        assert!(matches!(
            Molecule::from_smiles("CC)"),
            Err(SmilesError::UnbalancedBranch(2))
        ));
        assert!(matches!(
            Molecule::from_smiles("[CH3"),
            Err(SmilesError::UnclosedBracket(0))
        ));
        assert!(matches!(
            Molecule::from_smiles("CXC"),
            Err(SmilesError::UnexpectedCharacter('X', 1))
        ));
    }

    #[test]
    fn test_parse_count_limits() -> Result<(), SmilesError> {
        assert_eq!(
            Molecule::from_smiles("[C-128]"),
            Err(SmilesError::CountOutOfRange(3))
        );
        assert_eq!(
            Molecule::from_smiles("[CH300]"),
            Err(SmilesError::CountOutOfRange(3))
        );
        assert_eq!(
            Molecule::from_smiles("[70000C]"),
            Err(SmilesError::CountOutOfRange(1))
        );
        assert_eq!(
            Molecule::from_smiles("[C+127+]"),
            Err(SmilesError::CountOutOfRange(6))
        );
        assert_eq!(Molecule::from_smiles("[C-127]")?.atoms()[0].charge, -127);
        assert_eq!(Molecule::from_smiles("[CH255]")?.atoms()[0].hydrogens, 255);
        assert_eq!(
            Molecule::from_smiles("[CH255][H]"),
            Err(SmilesError::TooManyHydrogens(0))
        );

        let sim = MorganDiceSimilarity::default();
        assert_eq!(sim.similarity("[C-128]", "C"), 0.0);
        assert_eq!(sim.similarity("C", "[CH300]"), 0.0);
        Ok(())
    }

    #[test]
    fn test_morgan_counts() -> Result<(), SmilesError> {
        let ethane = morgan_fingerprint(&Molecule::from_smiles("CC")?, 2);
        assert_eq!(ethane.total(), 3);
        let propane = morgan_fingerprint(&Molecule::from_smiles("CCC")?, 2);
        assert_eq!(propane.total(), 6);
        let methane = morgan_fingerprint(&Molecule::from_smiles("C")?, 2);
        assert_eq!(methane.total(), 1);
        Ok(())
    }

    #[test]
    fn test_dice_similarity() {
        let sim = MorganDiceSimilarity::default();
        assert_eq!(sim.similarity("C", "CC"), 0.0);
        assert_eq!(sim.similarity("CC", "CCC"), 0.44);
        assert_eq!(sim.similarity("c1ccccc1O", "Oc1ccccc1"), 1.0);
        assert_eq!(sim.similarity("not a structure", "CC"), 0.0);
    }

    #[test_log::test]
    fn test_dice_matrix() {
        let sim = MorganDiceSimilarity::default();
        let matrix = sim.similarity_matrix(&["C", "CC", "CCC", "C1C"]);
        assert_eq!(matrix[(0, 1)], 0.0);
        assert_eq!(matrix[(1, 2)], 0.44);
        assert_eq!(matrix[(2, 1)], 0.44);
        assert_eq!(matrix[(3, 3)], 1.0);
        assert_eq!(matrix[(3, 0)], 0.0);
    }
}
