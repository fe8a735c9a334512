//! SMILES reading and writing.
//!
//! [`parse_smiles`] is the lenient entry point: every `.`-separated fragment
//! becomes its own [`Molecule`], a fragment with a syntax error is dropped
//! with an error recorded, and valence problems are reported as warnings
//! alongside a flagged molecule. [`from_smiles`] is the strict convenience
//! used throughout the crate: it fails on the first syntax error, keeps all
//! fragments as components of one molecule, and runs ring and aromaticity
//! perception.

mod builder;
pub mod error;
mod parse_tree;
mod tokenizer;
mod writer;

use tracing::debug;

use crate::mol::Molecule;
pub use error::SmilesError;
pub use writer::{to_canonical_smiles, to_canonical_smiles_with, to_smiles};

/// Options for [`parse_smiles_with`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParseOptions {
    /// Check each atom against the standard valence model and report
    /// [`SmilesError::ValenceViolation`] warnings.
    pub check_valence: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            check_valence: true,
        }
    }
}

impl ParseOptions {
    pub fn with_check_valence(mut self, check: bool) -> Self {
        self.check_valence = check;
        self
    }
}

/// Result of reading a SMILES string: one molecule per valid fragment plus
/// every error and warning encountered.
#[derive(Debug, Clone, Default)]
pub struct SmilesParse {
    pub molecules: Vec<Molecule>,
    pub errors: Vec<SmilesError>,
}

impl SmilesParse {
    /// Whether any fragment was rejected.
    pub fn has_syntax_errors(&self) -> bool {
        self.errors.iter().any(|e| !e.is_warning())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &SmilesError> {
        self.errors.iter().filter(|e| e.is_warning())
    }
}

pub fn parse_smiles(input: &str) -> SmilesParse {
    parse_smiles_with(input, &ParseOptions::default())
}

pub fn parse_smiles_with(input: &str, options: &ParseOptions) -> SmilesParse {
    let chars: Vec<char> = input.chars().collect();
    let mut result = SmilesParse::default();

    if chars.iter().all(|c| c.is_whitespace()) {
        result.errors.push(SmilesError::EmptyInput);
        return result;
    }

    for (start, end) in split_fragments(&chars) {
        let mut mol = Molecule::new();
        match parse_fragment_into(&mut mol, &chars, start, end, options) {
            Ok(warnings) => {
                result.molecules.push(mol);
                result.errors.extend(warnings);
            }
            Err(e) => result.errors.push(e),
        }
    }

    debug!(
        fragments = result.molecules.len(),
        errors = result.errors.len(),
        "parsed SMILES"
    );
    result
}

/// Strict reader: all fragments in one molecule, perceived.
///
/// Returns the first syntax error, if any. Valence warnings do not fail
/// the parse; the offending atoms carry `invalid_valence`.
pub fn from_smiles(input: &str) -> Result<Molecule, SmilesError> {
    let chars: Vec<char> = input.chars().collect();
    if chars.iter().all(|c| c.is_whitespace()) {
        return Err(SmilesError::EmptyInput);
    }

    let options = ParseOptions::default();
    let mut mol = Molecule::new();
    for (start, end) in split_fragments(&chars) {
        parse_fragment_into(&mut mol, &chars, start, end, &options)?;
    }
    crate::perceive(&mut mol);
    Ok(mol)
}

/// Splits at `.` characters outside brackets. Returned ranges exclude the
/// dots themselves.
fn split_fragments(chars: &[char]) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut start = 0;
    let mut in_bracket = false;
    for (i, &c) in chars.iter().enumerate() {
        match c {
            '[' => in_bracket = true,
            ']' => in_bracket = false,
            '.' if !in_bracket => {
                ranges.push((start, i));
                start = i + 1;
            }
            _ => {}
        }
    }
    ranges.push((start, chars.len()));
    ranges
}

fn parse_fragment_into(
    mol: &mut Molecule,
    chars: &[char],
    start: usize,
    end: usize,
    options: &ParseOptions,
) -> Result<Vec<SmilesError>, SmilesError> {
    let tokens = tokenizer::tokenize_fragment(chars, start, end)?;
    if tokens.is_empty() {
        // Empty fragment: blame the dot that delimits it.
        let pos = if end < chars.len() { end } else { start.saturating_sub(1) };
        return Err(SmilesError::UnexpectedChar { pos, ch: '.' });
    }
    let tree = parse_tree::build_parse_tree(&tokens)?;
    Ok(builder::build_into(mol, &tree, options.check_valence))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::{Atom, Chirality};
    use crate::bond::{BondOrder, BondStereo};
    use petgraph::graph::NodeIndex;

    fn n(i: usize) -> NodeIndex {
        NodeIndex::new(i)
    }

    fn atom(mol: &Molecule, i: usize) -> &Atom {
        mol.atom(n(i))
    }

    fn one(s: &str) -> Molecule {
        let mut parsed = parse_smiles(s);
        assert!(!parsed.has_syntax_errors(), "{s}: {:?}", parsed.errors);
        assert_eq!(parsed.molecules.len(), 1, "{s}");
        parsed.molecules.remove(0)
    }

    fn h_counts(s: &str) -> Vec<u8> {
        let mol = one(s);
        mol.atoms().map(|a| mol.atom(a).hydrogen_count).collect()
    }

    #[test]
    fn simple_hydrides() {
        assert_eq!(h_counts("C"), vec![4]);
        assert_eq!(h_counts("N"), vec![3]);
        assert_eq!(h_counts("O"), vec![2]);
        assert_eq!(h_counts("F"), vec![1]);
        assert_eq!(h_counts("Cl"), vec![1]);
        assert_eq!(h_counts("Br"), vec![1]);
        assert_eq!(h_counts("I"), vec![1]);
        assert_eq!(h_counts("P"), vec![3]);
        assert_eq!(h_counts("S"), vec![2]);
        assert_eq!(h_counts("B"), vec![3]);
    }

    #[test]
    fn chains_and_multiple_bonds() {
        assert_eq!(h_counts("CC"), vec![3, 3]);
        assert_eq!(h_counts("C=C"), vec![2, 2]);
        assert_eq!(h_counts("C#C"), vec![1, 1]);
        assert_eq!(h_counts("CO"), vec![3, 1]);
        assert_eq!(h_counts("CC(C)C"), vec![3, 1, 3, 3]);
        assert_eq!(h_counts("CC(C)(C)C"), vec![3, 0, 3, 3, 3]);
        let mol = one("C#C");
        let edge = mol.bond_between(n(0), n(1)).unwrap();
        assert_eq!(mol.bond(edge).order, BondOrder::Triple);
    }

    #[test]
    fn rings() {
        let mol = one("C1CC1");
        assert_eq!(mol.atom_count(), 3);
        assert_eq!(mol.bond_count(), 3);
        let mol = one("C%12CCCCC%12");
        assert_eq!(mol.bond_count(), 6);
        assert_eq!(one("C1CC2C1CC2").bond_count(), 7);
        assert_eq!(one("C1=CC=CC=C1").bond_count(), 6);
    }

    #[test]
    fn bracket_atoms() {
        let mol = one("[NH4+]");
        assert_eq!(atom(&mol, 0).formal_charge, 1);
        assert_eq!(atom(&mol, 0).hydrogen_count, 4);
        assert_eq!(atom(&one("[O-2]"), 0).formal_charge, -2);
        assert_eq!(atom(&one("[13C]"), 0).isotope, 13);
        let d = one("[2H]O[2H]");
        assert_eq!(atom(&d, 0).atomic_num, 1);
        assert_eq!(atom(&d, 0).isotope, 2);
        assert_eq!(h_counts("[OH2]"), vec![2]);
        assert_eq!(h_counts("[HH]"), vec![1]);
        let fe = one("[Fe]");
        assert_eq!(atom(&fe, 0).atomic_num, 26);
        assert_eq!(atom(&fe, 0).hydrogen_count, 0);
        assert_eq!(atom(&one("[CH3:12]"), 0).atom_class, 12);
    }

    #[test]
    fn aromatic_input() {
        let mol = one("c1ccncc1");
        assert_eq!(atom(&mol, 3).atomic_num, 7);
        assert_eq!(h_counts("c1ccncc1"), vec![1, 1, 1, 0, 1, 1]);
        assert_eq!(h_counts("o1cccc1"), vec![0, 1, 1, 1, 1]);
        assert_eq!(h_counts("s1cccc1"), vec![0, 1, 1, 1, 1]);
        assert_eq!(h_counts("[nH]1cccc1"), vec![1, 1, 1, 1, 1]);
        for e in mol.bonds() {
            assert_eq!(mol.bond(e).order, BondOrder::Aromatic);
        }
        let phenol = one("Oc1ccccc1");
        let link = phenol.bond_between(n(0), n(1)).unwrap();
        assert_eq!(phenol.bond(link).order, BondOrder::Single);
    }

    #[test]
    fn hypervalent_shorthand() {
        assert_eq!(h_counts("CS(=O)C"), vec![3, 0, 0, 3]);
        assert_eq!(h_counts("P(=O)(O)(O)O"), vec![0, 0, 1, 1, 1]);
        let nitro = one("C[N+](=O)[O-]");
        assert_eq!(atom(&nitro, 1).formal_charge, 1);
        assert!(!nitro.has_invalid_valence());
    }

    #[test]
    fn larger_molecules() {
        assert_eq!(one("Cn1cnc2c1c(=O)n(c(=O)n2C)C").atom_count(), 14);
        let naph = one("c1ccc2ccccc2c1");
        assert_eq!(naph.atom_count(), 10);
        assert_eq!(naph.bond_count(), 11);
    }

    #[test]
    fn stereo_markers() {
        assert!(atom(&one("[C@](F)(Cl)(Br)I"), 0).chirality.is_specified());
        assert_eq!(atom(&one("[C@](F)(Cl)(Br)I"), 0).chirality, Chirality::Ccw);
        assert_eq!(atom(&one("[C@@](F)(Cl)(Br)I"), 0).chirality, Chirality::Cw);
        let mol = one("Cl/C=C\\Cl");
        let edge = mol.bond_between(n(1), n(2)).unwrap();
        assert!(matches!(mol.bond(edge).stereo, BondStereo::Cis(_, _)));
        let mol = one("Cl/C=C/Cl");
        let edge = mol.bond_between(n(1), n(2)).unwrap();
        assert!(matches!(mol.bond(edge).stereo, BondStereo::Trans(_, _)));
    }

    #[test]
    fn fragments_become_separate_molecules() {
        let parsed = parse_smiles("[Na+].[Cl-]");
        assert!(parsed.errors.is_empty());
        assert_eq!(parsed.molecules.len(), 2);
        assert_eq!(atom(&parsed.molecules[0], 0).atomic_num, 11);
        assert_eq!(atom(&parsed.molecules[1], 0).formal_charge, -1);
        // ids restart in every fragment
        assert_eq!(parsed.molecules[1].atoms().next(), Some(n(0)));
    }

    #[test]
    fn bad_fragment_does_not_sink_the_others() {
        let parsed = parse_smiles("CCO.C1CC.c1ccccc1");
        assert_eq!(parsed.molecules.len(), 2);
        assert_eq!(parsed.errors, vec![SmilesError::UnclosedRing { digit: 1, pos: 5 }]);
        assert_eq!(parsed.errors[0].position(), Some(5));
    }

    #[test]
    fn dot_inside_brackets_is_not_a_split() {
        let parsed = parse_smiles("[C.]C");
        assert_eq!(parsed.molecules.len(), 0);
        assert!(parsed.has_syntax_errors());
    }

    #[test]
    fn empty_fragments() {
        assert_eq!(parse_smiles("").errors, vec![SmilesError::EmptyInput]);
        assert_eq!(parse_smiles("   ").errors, vec![SmilesError::EmptyInput]);
        let parsed = parse_smiles("C..C");
        assert_eq!(parsed.molecules.len(), 2);
        assert_eq!(parsed.errors, vec![SmilesError::UnexpectedChar { pos: 2, ch: '.' }]);
    }

    #[test]
    fn syntax_errors() {
        for bad in ["C(C", "C)C", "C1CC", "X", "[C", "C=", "[Xy]", "C%1"] {
            let parsed = parse_smiles(bad);
            assert!(parsed.molecules.is_empty(), "{bad}");
            assert!(parsed.has_syntax_errors(), "{bad}");
            assert!(from_smiles(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn valence_warning_keeps_molecule() {
        let parsed = parse_smiles("FC(F)(F)(F)F");
        assert_eq!(parsed.molecules.len(), 1);
        assert!(!parsed.has_syntax_errors());
        assert_eq!(parsed.warnings().count(), 1);
        assert!(atom(&parsed.molecules[0], 1).invalid_valence);

        let quiet = parse_smiles_with("FC(F)(F)(F)F", &ParseOptions::default().with_check_valence(false));
        assert!(quiet.errors.is_empty());
        assert!(!quiet.molecules[0].has_invalid_valence());
    }

    #[test]
    fn strict_reader_merges_fragments() {
        let mol = from_smiles("[Na+].[Cl-].O").unwrap();
        assert_eq!(mol.atom_count(), 3);
        assert_eq!(mol.bond_count(), 0);
        assert_eq!(from_smiles("").unwrap_err(), SmilesError::EmptyInput);
    }

    #[test]
    fn strict_reader_perceives() {
        let mol = from_smiles("C1=CC=CC=C1").unwrap();
        assert!(mol.atoms().all(|a| mol.atom(a).is_aromatic && mol.atom(a).in_ring));
    }
}
