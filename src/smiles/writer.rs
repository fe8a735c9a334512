use petgraph::graph::{EdgeIndex, NodeIndex};
use tracing::trace;

use crate::atom::{Atom, Chirality};
use crate::bond::BondOrder;
use crate::canonical::{
    canonical_ordering, canonical_traversal, is_distinct_double_bond, is_distinct_stereocenter,
    CanonOptions, RootPolicy, Traversal, TraversalEvent,
};
use crate::element::Element;
use crate::mol::{permutation_parity, Molecule};
use crate::valence;

/// Writes SMILES following atom index order.
///
/// Stereo marks are written as stored; no symmetry check is made.
pub fn to_smiles(mol: &Molecule) -> String {
    let ranks: Vec<usize> = (0..mol.atom_count()).collect();
    let traversal = canonical_traversal(mol, &ranks, RootPolicy::LowestRank);
    write_traversal(mol, &traversal, &ranks)
}

/// Writes canonical SMILES: the same string for every atom numbering of
/// the same molecule.
///
/// Connected components are written in canonical order, so the order of
/// fragments in the input does not matter. Tetrahedral and double-bond
/// marks are dropped where two substituents are symmetry-equivalent.
pub fn to_canonical_smiles(mol: &Molecule) -> String {
    to_canonical_smiles_with(mol, &CanonOptions::default())
}

pub fn to_canonical_smiles_with(mol: &Molecule, options: &CanonOptions) -> String {
    let ordering = canonical_ordering(mol, options);
    let traversal = canonical_traversal(mol, &ordering.ranks, options.root_policy);
    write_traversal(mol, &traversal, &ordering.symmetry_classes)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

impl Direction {
    fn flip(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }

    fn as_char(self) -> char {
        match self {
            Direction::Up => '/',
            Direction::Down => '\\',
        }
    }
}

fn write_traversal(mol: &Molecule, traversal: &Traversal, classes: &[usize]) -> String {
    let positions = traversal.visit_positions();
    let directions = bond_directions(mol, traversal, &positions, classes);
    let mut out = String::with_capacity(mol.atom_count() * 2);

    for event in &traversal.events {
        match *event {
            TraversalEvent::Disconnect => out.push('.'),
            TraversalEvent::Atom { atom, via } => {
                if let Some(edge) = via {
                    write_bond(mol, edge, &directions, &mut out);
                }
                let chirality = written_chirality(mol, traversal, atom, classes);
                write_atom(mol, atom, chirality, &mut out);
            }
            TraversalEvent::RingOpen { label, bond, .. } => {
                write_bond(mol, bond, &directions, &mut out);
                write_ring_label(label, &mut out);
            }
            TraversalEvent::RingClose { label, .. } => write_ring_label(label, &mut out),
            TraversalEvent::BranchOpen => out.push('('),
            TraversalEvent::BranchClose => out.push(')'),
        }
    }
    out
}

/// Chirality as it must be written given the neighbor order of the output.
fn written_chirality(mol: &Molecule, traversal: &Traversal, atom: NodeIndex, classes: &[usize]) -> Chirality {
    if !is_distinct_stereocenter(mol, atom, classes) {
        return Chirality::None;
    }
    let neighbors = &traversal.neighbor_order[atom.index()];
    let mut written: Vec<Option<NodeIndex>> = neighbors.iter().copied().map(Some).collect();
    if mol.atom(atom).hydrogen_count == 1 {
        let has_parent = traversal.parents[atom.index()].is_some();
        written.insert(usize::from(has_parent), None);
    }
    let stored = mol.atom(atom).chirality;
    if permutation_parity(&written, &mol.stereo_reference(atom)) {
        stored
    } else {
        stored.inverted()
    }
}

/// Assigns `/` and `\` to single bonds next to stereo double bonds. Each
/// entry is the mark written between the bond's two atoms in text order.
fn bond_directions(
    mol: &Molecule,
    traversal: &Traversal,
    positions: &[usize],
    classes: &[usize],
) -> Vec<Option<Direction>> {
    let mut directions: Vec<Option<Direction>> = vec![None; mol.bond_count()];

    let mut double_bonds: Vec<(usize, EdgeIndex)> = mol
        .bonds()
        .filter(|&e| is_distinct_double_bond(mol, e, classes))
        .filter_map(|e| {
            let (a, b) = mol.bond_endpoints(e)?;
            Some((positions[a.index()].min(positions[b.index()]), e))
        })
        .collect();
    double_bonds.sort_unstable();

    for (_, edge) in double_bonds {
        let Some((a, b)) = mol.bond_endpoints(edge) else {
            continue;
        };
        let (u, v) = if positions[a.index()] < positions[b.index()] {
            (a, b)
        } else {
            (b, a)
        };
        let stereo = mol.bond(edge).stereo;
        let Some((r1, r2)) = stereo.refs() else {
            continue;
        };
        let (ref_u, ref_v) = if r1 != v && mol.bond_between(u, r1).is_some() {
            (r1, r2)
        } else {
            (r2, r1)
        };

        let (Some((su, eu)), Some((sv, ev))) = (
            marked_substituent(mol, traversal, u, v),
            marked_substituent(mol, traversal, v, u),
        ) else {
            trace!(bond = edge.index(), "no single bond available for E/Z mark");
            continue;
        };
        let cis = stereo.is_cis() ^ (su != ref_u) ^ (sv != ref_v);

        let left_first = positions[su.index()] < positions[u.index()];
        let right_after = positions[sv.index()] > positions[v.index()];

        let m_u = match directions[eu.index()] {
            Some(c) => orient(c, left_first),
            None => {
                directions[eu.index()] = Some(orient(Direction::Up, left_first));
                Direction::Up
            }
        };
        let m_v = if cis { m_u.flip() } else { m_u };
        let c_v = orient(m_v, right_after);
        match directions[ev.index()] {
            Some(existing) if existing != c_v => {
                trace!(bond = edge.index(), "conflicting E/Z marks; keeping the first");
            }
            _ => directions[ev.index()] = Some(c_v),
        }
    }
    directions
}

/// Converts between a written mark and its normalized reading.
fn orient(mark: Direction, as_written: bool) -> Direction {
    if as_written {
        mark
    } else {
        mark.flip()
    }
}

/// First substituent of `end`, in written order, joined by a single bond.
fn marked_substituent(
    mol: &Molecule,
    traversal: &Traversal,
    end: NodeIndex,
    other: NodeIndex,
) -> Option<(NodeIndex, EdgeIndex)> {
    traversal.neighbor_order[end.index()]
        .iter()
        .filter(|&&nb| nb != other)
        .find_map(|&nb| {
            let edge = mol.bond_between(end, nb)?;
            (mol.bond(edge).order == BondOrder::Single).then_some((nb, edge))
        })
}

fn write_bond(mol: &Molecule, edge: EdgeIndex, directions: &[Option<Direction>], out: &mut String) {
    if let Some(dir) = directions[edge.index()] {
        out.push(dir.as_char());
        return;
    }
    let both_aromatic = mol
        .bond_endpoints(edge)
        .is_some_and(|(a, b)| mol.atom(a).is_aromatic && mol.atom(b).is_aromatic);
    match mol.bond(edge).order {
        BondOrder::Single if both_aromatic => out.push('-'),
        BondOrder::Single => {}
        BondOrder::Aromatic if both_aromatic => {}
        order => out.push(order.symbol()),
    }
}

fn write_ring_label(label: u16, out: &mut String) {
    match label {
        0..=9 => out.push_str(&label.to_string()),
        10..=99 => {
            out.push('%');
            out.push_str(&label.to_string());
        }
        _ => {
            out.push_str("%(");
            out.push_str(&label.to_string());
            out.push(')');
        }
    }
}

fn write_atom(mol: &Molecule, node: NodeIndex, chirality: Chirality, out: &mut String) {
    let atom = mol.atom(node);
    if chirality == Chirality::None && can_write_bare(mol, node) {
        push_symbol(atom, out);
    } else {
        write_bracket_atom(atom, chirality, out);
    }
}

fn push_symbol(atom: &Atom, out: &mut String) {
    if atom.is_aromatic {
        out.push_str(&atom.symbol().to_ascii_lowercase());
    } else {
        out.push_str(atom.symbol());
    }
}

/// Whether the atom reads back identically without brackets.
fn can_write_bare(mol: &Molecule, node: NodeIndex) -> bool {
    let atom = mol.atom(node);
    if atom.isotope != 0 || atom.formal_charge != 0 || atom.atom_class != 0 {
        return false;
    }
    if atom.atomic_num == 0 {
        return atom.hydrogen_count == 0;
    }
    let Some(element) = atom.element() else {
        return false;
    };
    if !element.is_organic_subset() {
        return false;
    }
    if atom.is_aromatic && !matches!(element, Element::B | Element::C | Element::N | Element::O | Element::P | Element::S) {
        return false;
    }
    let expected = valence::implicit_hydrogens(element, mol.explicit_valence(node), atom.is_aromatic);
    atom.hydrogen_count == expected
}

fn write_bracket_atom(atom: &Atom, chirality: Chirality, out: &mut String) {
    out.push('[');
    if atom.isotope != 0 {
        out.push_str(&atom.isotope.to_string());
    }
    push_symbol(atom, out);

    match chirality {
        Chirality::Ccw => out.push('@'),
        Chirality::Cw => out.push_str("@@"),
        Chirality::None => {}
    }

    if atom.hydrogen_count > 0 {
        out.push('H');
        if atom.hydrogen_count > 1 {
            out.push_str(&atom.hydrogen_count.to_string());
        }
    }

    if atom.formal_charge > 0 {
        out.push('+');
        if atom.formal_charge > 1 {
            out.push_str(&atom.formal_charge.to_string());
        }
    } else if atom.formal_charge < 0 {
        out.push('-');
        if atom.formal_charge < -1 {
            out.push_str(&atom.formal_charge.unsigned_abs().to_string());
        }
    }

    if atom.atom_class != 0 {
        out.push(':');
        out.push_str(&atom.atom_class.to_string());
    }
    out.push(']');
}
