use petgraph::graph::NodeIndex;
use tracing::warn;

use crate::atom::{Atom, Chirality};
use crate::bond::{Bond, BondOrder, BondStereo};
use crate::element::Element;
use crate::mol::{permutation_parity, Molecule};
use crate::smiles::error::SmilesError;
use crate::smiles::parse_tree::ParseTree;
use crate::smiles::tokenizer::{BondToken, ChiralityToken};
use crate::valence;

/// Appends the atoms and bonds of one parsed fragment to `mol`.
///
/// Returns warning-class errors (valence violations); the atoms concerned
/// are flagged `invalid_valence`.
pub fn build_into(mol: &mut Molecule, tree: &ParseTree, check_valence: bool) -> Vec<SmilesError> {
    let mut indices: Vec<NodeIndex> = Vec::with_capacity(tree.atoms.len());

    for parse_atom in &tree.atoms {
        let atom = Atom {
            atomic_num: parse_atom.atomic_num,
            formal_charge: parse_atom.charge,
            isotope: parse_atom.isotope,
            is_aromatic: parse_atom.is_aromatic,
            atom_class: parse_atom.atom_class,
            ..Atom::default()
        };
        indices.push(mol.add_atom(atom));
    }

    for (i, parse_atom) in tree.atoms.iter().enumerate() {
        for neighbor in &parse_atom.neighbors {
            let j = neighbor.atom_idx;
            if j <= i {
                continue;
            }
            let order = resolve_bond_order(
                neighbor.bond,
                parse_atom.is_aromatic,
                tree.atoms[j].is_aromatic,
            );
            mol.add_bond(indices[i], indices[j], Bond::new(order));
        }
    }

    resolve_hydrogen_counts(mol, tree, &indices);
    resolve_chirality(mol, tree, &indices);
    resolve_ez_stereo(mol, tree, &indices);

    if !check_valence {
        return Vec::new();
    }
    let mut warnings = Vec::new();
    for (i, parse_atom) in tree.atoms.iter().enumerate() {
        if let Some(violation) = valence::check_atom(mol, indices[i]) {
            warn!(
                atom = indices[i].index(),
                pos = parse_atom.pos,
                valence = violation.actual_valence,
                "valence exceeds every allowed value"
            );
            mol.atom_mut(indices[i]).invalid_valence = true;
            warnings.push(SmilesError::ValenceViolation {
                pos: parse_atom.pos,
                atom: indices[i].index(),
                valence: violation.actual_valence,
                allowed: violation.allowed_valences.iter().copied().max().unwrap_or(0),
            });
        }
    }
    warnings
}

fn resolve_bond_order(bond_tok: Option<BondToken>, from_aromatic: bool, to_aromatic: bool) -> BondOrder {
    match bond_tok {
        Some(BondToken::Single) | Some(BondToken::Up) | Some(BondToken::Down) => BondOrder::Single,
        Some(BondToken::Double) => BondOrder::Double,
        Some(BondToken::Triple) => BondOrder::Triple,
        Some(BondToken::Aromatic) => BondOrder::Aromatic,
        None if from_aromatic && to_aromatic => BondOrder::Aromatic,
        None => BondOrder::Single,
    }
}

fn resolve_hydrogen_counts(mol: &mut Molecule, tree: &ParseTree, indices: &[NodeIndex]) {
    for (i, parse_atom) in tree.atoms.iter().enumerate() {
        let h_count = if parse_atom.is_bracket {
            parse_atom.hcount.unwrap_or(0)
        } else {
            match Element::from_atomic_num(parse_atom.atomic_num) {
                Some(element) => valence::implicit_hydrogens(
                    element,
                    mol.explicit_valence(indices[i]),
                    parse_atom.is_aromatic,
                ),
                None => 0,
            }
        };
        mol.atom_mut(indices[i]).hydrogen_count = h_count;
    }
}

/// Converts `@`/`@@` from written neighbor order to the reference order
/// used by [`Chirality`]. The implicit hydrogen sits where it is written:
/// immediately after the preceding atom, or first when there is none.
fn resolve_chirality(mol: &mut Molecule, tree: &ParseTree, indices: &[NodeIndex]) {
    for (i, parse_atom) in tree.atoms.iter().enumerate() {
        let written = match parse_atom.chirality {
            ChiralityToken::None => continue,
            ChiralityToken::CounterClockwise => Chirality::Ccw,
            ChiralityToken::Clockwise => Chirality::Cw,
        };
        let node = indices[i];
        let h = mol.atom(node).hydrogen_count;
        let substituents = parse_atom.neighbors.len() + h as usize;
        if h > 1 || !(3..=4).contains(&substituents) {
            continue;
        }

        let mut smiles_order: Vec<Option<NodeIndex>> = parse_atom
            .neighbors
            .iter()
            .map(|n| Some(indices[n.atom_idx]))
            .collect();
        if h == 1 {
            let at = usize::from(parse_atom.has_preceding);
            smiles_order.insert(at, None);
        }

        let reference = mol.stereo_reference(node);
        mol.atom_mut(node).chirality = if permutation_parity(&smiles_order, &reference) {
            written
        } else {
            written.inverted()
        };
    }
}

fn resolve_ez_stereo(mol: &mut Molecule, tree: &ParseTree, indices: &[NodeIndex]) {
    for (i, parse_atom) in tree.atoms.iter().enumerate() {
        for neighbor in &parse_atom.neighbors {
            let j = neighbor.atom_idx;
            if i >= j {
                continue;
            }
            let Some(edge) = mol.bond_between(indices[i], indices[j]) else {
                continue;
            };
            if mol.bond(edge).order != BondOrder::Double {
                continue;
            }

            let left = directional_neighbor(tree, i, j, true);
            let right = directional_neighbor(tree, j, i, false);
            if let (Some((left_atom, left_dir)), Some((right_atom, right_dir))) = (left, right) {
                mol.bond_mut(edge).stereo = if left_dir == right_dir {
                    BondStereo::Trans(indices[left_atom], indices[right_atom])
                } else {
                    BondStereo::Cis(indices[left_atom], indices[right_atom])
                };
            }
        }
    }
}

/// First substituent of `db_atom` joined by `/` or `\`, with the mark
/// normalized to how it would read if written `sub/db` on the left end or
/// `db/sub` on the right end.
fn directional_neighbor(
    tree: &ParseTree,
    db_atom: usize,
    other_db_atom: usize,
    left_end: bool,
) -> Option<(usize, BondToken)> {
    tree.atoms[db_atom]
        .neighbors
        .iter()
        .filter(|n| n.atom_idx != other_db_atom)
        .find_map(|n| {
            let bond = n.bond.filter(|b| b.is_directional())?;
            let written_before = n.atom_idx < db_atom;
            let normalized = if written_before == left_end {
                bond
            } else {
                bond.flipped()
            };
            Some((n.atom_idx, normalized))
        })
}
