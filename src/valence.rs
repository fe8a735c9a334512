//! Standard valence model.
//!
//! Charged atoms are treated as their isoelectronic neutral neighbor in the
//! periodic table: `[N+]` takes carbon's valences, `[O-]` fluorine's, and
//! `[C-]` nitrogen's. Elements without default valences (metals, noble
//! gases, the wildcard) are never checked.

use petgraph::graph::NodeIndex;

use crate::element::Element;
use crate::mol::Molecule;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("atom {} ({symbol}): valence {actual_valence} exceeds {allowed_valences:?}", .atom_idx.index())]
pub struct ValenceError {
    pub atom_idx: NodeIndex,
    pub symbol: &'static str,
    pub actual_valence: u8,
    pub allowed_valences: Vec<u8>,
}

/// Allowed valences for an element carrying `charge`.
pub fn allowed_valences(atomic_num: u8, charge: i8) -> &'static [u8] {
    let shifted = i16::from(atomic_num) - i16::from(charge);
    if atomic_num == 0 || !(1..=118).contains(&shifted) {
        return &[];
    }
    let Some(base) = Element::from_atomic_num(atomic_num) else {
        return &[];
    };
    if base.default_valences().is_empty() {
        return &[];
    }
    match Element::from_atomic_num(shifted as u8) {
        // Charge must not carry the atom across a period boundary.
        Some(e) if e.period() == base.period() => e.default_valences(),
        _ => &[],
    }
}

/// Hydrogens implied on an organic-subset shorthand atom.
///
/// The lowest default valence that accommodates the bond-order sum is
/// chosen; aromatic atoms give one valence unit to the pi system.
pub fn implicit_hydrogens(element: Element, bond_order_sum: u8, aromatic: bool) -> u8 {
    let target = element
        .default_valences()
        .iter()
        .find(|&&v| v >= bond_order_sum)
        .copied();
    let Some(target) = target else {
        return 0;
    };
    let h = target - bond_order_sum;
    if aromatic && h > 0 {
        h - 1
    } else {
        h
    }
}

/// Bond-order sum plus attached hydrogens. Aromatic bonds count as one.
pub fn total_valence(mol: &Molecule, atom: NodeIndex) -> u8 {
    mol.explicit_valence(atom)
        .saturating_add(mol.atom(atom).hydrogen_count)
}

/// Checks one atom, returning the violation if its total valence exceeds
/// every allowed valence.
pub fn check_atom(mol: &Molecule, idx: NodeIndex) -> Option<ValenceError> {
    let atom = mol.atom(idx);
    let allowed = allowed_valences(atom.atomic_num, atom.formal_charge);
    let max = allowed.iter().copied().max()?;
    let v = total_valence(mol, idx);
    if v <= max {
        return None;
    }
    Some(ValenceError {
        atom_idx: idx,
        symbol: atom.symbol(),
        actual_valence: v,
        allowed_valences: allowed.to_vec(),
    })
}

pub fn check_valence(mol: &Molecule) -> Result<(), Vec<ValenceError>> {
    let errors: Vec<ValenceError> = mol.atoms().filter_map(|idx| check_atom(mol, idx)).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::Atom;
    use crate::smiles::{from_smiles, parse_smiles};

    #[test]
    fn common_molecules_valid() {
        for smi in ["C", "CC", "c1ccccc1", "O", "N", "c1cc[nH]c1", "S(F)(F)(F)(F)(F)F"] {
            let mol = from_smiles(smi).unwrap();
            assert!(check_valence(&mol).is_ok(), "{smi}");
        }
    }

    #[test]
    fn pentavalent_carbon_invalid() {
        let mut mol = Molecule::new();
        let c = mol.add_atom(Atom {
            atomic_num: 6,
            hydrogen_count: 5,
            ..Default::default()
        });
        let errs = check_valence(&mol).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].atom_idx, c);
        assert_eq!(errs[0].actual_valence, 5);
        assert_eq!(errs[0].allowed_valences, vec![4]);
    }

    #[test]
    fn charge_shifts_valence() {
        assert_eq!(allowed_valences(7, 1), &[4]);
        assert_eq!(allowed_valences(8, -1), &[1]);
        assert_eq!(allowed_valences(6, -1), &[3, 5]);
        assert_eq!(allowed_valences(8, 1), &[3, 5]);
        assert!(allowed_valences(26, 2).is_empty());
        assert!(allowed_valences(0, 0).is_empty());
        // F- maps onto neon, which has none.
        assert!(allowed_valences(9, -1).is_empty());
    }

    #[test]
    fn ammonium_and_hydroxide_valid() {
        for smi in ["[NH4+]", "[OH-]", "C[N+](C)(C)C", "[O-]C=O", "[Fe+2]"] {
            let mol = from_smiles(smi).unwrap();
            assert!(check_valence(&mol).is_ok(), "{smi}");
        }
    }

    #[test]
    fn over_bonded_bracket_atom_flagged() {
        let parsed = parse_smiles("[CH4]C");
        assert_eq!(parsed.molecules.len(), 1);
        assert!(parsed.molecules[0].has_invalid_valence());
        assert!(parsed.errors.iter().all(|e| e.is_warning()));
    }

    #[test]
    fn implicit_h_rules() {
        assert_eq!(implicit_hydrogens(Element::C, 0, false), 4);
        assert_eq!(implicit_hydrogens(Element::C, 2, true), 1);
        assert_eq!(implicit_hydrogens(Element::N, 2, true), 0);
        assert_eq!(implicit_hydrogens(Element::N, 4, false), 1);
        assert_eq!(implicit_hydrogens(Element::S, 3, false), 1);
        assert_eq!(implicit_hydrogens(Element::C, 5, false), 0);
    }
}
