//! Hückel aromaticity.
//!
//! Rings are evaluated one at a time, then as bond-sharing unions of up to
//! [`AromaticityOptions::max_fused_combination`] rings, then as whole ring
//! systems. A unit is aromatic when every member atom can join the pi
//! system and the electron count is `4n + 2`. Units only ever add aromatic
//! atoms, so a fused system where one ring qualifies keeps that ring
//! aromatic even if the whole system does not.

use petgraph::graph::{EdgeIndex, NodeIndex};
use tracing::{debug, trace, warn};

use crate::bond::BondOrder;
use crate::element::Element;
use crate::mol::{Mol, Molecule};
use crate::rings::{ring_edges, RingInfo};
use crate::traits::{HasAromaticity, HasAtomicNum, HasBondOrder, HasFormalCharge, HasHydrogenCount};
use crate::valence;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AromaticityOptions {
    /// Largest number of rings combined into one unit before falling back
    /// to the whole ring system.
    pub max_fused_combination: usize,
}

impl Default for AromaticityOptions {
    fn default() -> Self {
        Self {
            max_fused_combination: 3,
        }
    }
}

impl AromaticityOptions {
    pub fn with_max_fused_combination(mut self, rings: usize) -> Self {
        self.max_fused_combination = rings;
        self
    }
}

/// Aromatic atoms and bonds, indexed by atom and bond index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AromaticSet {
    pub atoms: Vec<bool>,
    pub bonds: Vec<bool>,
}

impl AromaticSet {
    pub fn is_aromatic_atom(&self, atom: NodeIndex) -> bool {
        self.atoms.get(atom.index()).copied().unwrap_or(false)
    }

    pub fn is_aromatic_bond(&self, bond: EdgeIndex) -> bool {
        self.bonds.get(bond.index()).copied().unwrap_or(false)
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.iter().filter(|&&a| a).count()
    }
}

struct Unit {
    atoms: Vec<NodeIndex>,
    edges: Vec<EdgeIndex>,
}

pub fn find_aromatic<A, B>(mol: &Mol<A, B>, rings: &RingInfo, options: &AromaticityOptions) -> AromaticSet
where
    A: HasAtomicNum + HasFormalCharge + HasHydrogenCount + HasAromaticity,
    B: HasBondOrder,
{
    let mut set = AromaticSet {
        atoms: vec![false; mol.atom_count()],
        bonds: vec![false; mol.bond_count()],
    };
    let edges_of: Vec<Vec<EdgeIndex>> = rings.rings().iter().map(|r| ring_edges(mol, r)).collect();

    for system in rings.systems() {
        for subset in candidate_units(&system.rings, &edges_of, options.max_fused_combination) {
            let unit = build_unit(rings, &edges_of, &subset);
            if unit.edges.iter().all(|e| set.bonds[e.index()]) {
                continue;
            }
            match unit_pi_electrons(mol, &unit) {
                Some(pi) if is_huckel(pi) => {
                    trace!(rings = ?subset, pi, "aromatic unit");
                    for atom in &unit.atoms {
                        set.atoms[atom.index()] = true;
                    }
                    for edge in &unit.edges {
                        set.bonds[edge.index()] = true;
                    }
                }
                pi => trace!(rings = ?subset, ?pi, "non-aromatic unit"),
            }
        }
    }
    set
}

/// Sets aromatic flags from `rings` and retypes bonds inside aromatic units
/// to [`BondOrder::Aromatic`].
///
/// Atoms flagged aromatic in the input that belong to no aromatic unit are
/// cleared, and aromatic bonds outside every unit become single, so running
/// the pass again changes nothing.
pub fn perceive_aromaticity(mol: &mut Molecule, rings: &RingInfo) {
    perceive_aromaticity_with(mol, rings, &AromaticityOptions::default());
}

pub fn perceive_aromaticity_with(mol: &mut Molecule, rings: &RingInfo, options: &AromaticityOptions) {
    let set = find_aromatic(mol, rings, options);

    let atoms: Vec<NodeIndex> = mol.atoms().collect();
    for atom in atoms {
        let aromatic = set.is_aromatic_atom(atom);
        if mol.atom(atom).is_aromatic && !aromatic {
            warn!(atom = atom.index(), "aromatic atom is not in an aromatic ring; flag cleared");
        }
        mol.atom_mut(atom).is_aromatic = aromatic;
    }

    let bonds: Vec<EdgeIndex> = mol.bonds().collect();
    for bond in bonds {
        if set.is_aromatic_bond(bond) {
            mol.bond_mut(bond).order = BondOrder::Aromatic;
        } else if mol.bond(bond).order == BondOrder::Aromatic {
            debug!(bond = bond.index(), "aromatic bond outside aromatic rings set to single");
            mol.bond_mut(bond).order = BondOrder::Single;
        }
    }

    debug!(aromatic_atoms = set.atom_count(), "aromaticity perceived");
}

/// Ring subsets to evaluate for one system: single rings, connected
/// unions of two up to `max_combination` rings, then the whole system.
fn candidate_units(members: &[usize], edges_of: &[Vec<EdgeIndex>], max_combination: usize) -> Vec<Vec<usize>> {
    let mut units: Vec<Vec<usize>> = members.iter().map(|&r| vec![r]).collect();
    let upper = max_combination.min(members.len());
    for k in 2..=upper {
        for combo in combinations(members.len(), k) {
            let subset: Vec<usize> = combo.iter().map(|&i| members[i]).collect();
            if bond_connected(&subset, edges_of) {
                units.push(subset);
            }
        }
    }
    if members.len() > upper.max(1) && bond_connected(members, edges_of) {
        units.push(members.to_vec());
    }
    units
}

fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    if k == 0 || k > n {
        return out;
    }
    let mut idx: Vec<usize> = (0..k).collect();
    loop {
        out.push(idx.clone());
        let Some(i) = (0..k).rev().find(|&i| idx[i] != i + n - k) else {
            return out;
        };
        idx[i] += 1;
        for j in (i + 1)..k {
            idx[j] = idx[j - 1] + 1;
        }
    }
}

/// Whether the rings form one piece when joined through shared bonds.
fn bond_connected(subset: &[usize], edges_of: &[Vec<EdgeIndex>]) -> bool {
    let Some(&first) = subset.first() else {
        return false;
    };
    let mut reached = vec![first];
    let mut frontier = vec![first];
    while let Some(ring) = frontier.pop() {
        for &other in subset {
            if reached.contains(&other) {
                continue;
            }
            if edges_of[ring].iter().any(|e| edges_of[other].contains(e)) {
                reached.push(other);
                frontier.push(other);
            }
        }
    }
    reached.len() == subset.len()
}

fn build_unit(rings: &RingInfo, edges_of: &[Vec<EdgeIndex>], subset: &[usize]) -> Unit {
    let mut atoms: Vec<NodeIndex> = subset
        .iter()
        .flat_map(|&r| rings.rings()[r].iter().copied())
        .collect();
    atoms.sort_unstable();
    atoms.dedup();
    let mut edges: Vec<EdgeIndex> = subset.iter().flat_map(|&r| edges_of[r].iter().copied()).collect();
    edges.sort_unstable();
    edges.dedup();
    Unit { atoms, edges }
}

fn unit_pi_electrons<A, B>(mol: &Mol<A, B>, unit: &Unit) -> Option<u32>
where
    A: HasAtomicNum + HasFormalCharge + HasHydrogenCount + HasAromaticity,
    B: HasBondOrder,
{
    let in_unit = |e: EdgeIndex| unit.edges.binary_search(&e).is_ok();
    unit.atoms.iter().try_fold(0u32, |total, &atom| {
        pi_electrons(mol, atom, in_unit).map(|e| total + u32::from(e))
    })
}

/// Pi electrons `atom` gives to a unit, or `None` when it cannot take part.
fn pi_electrons<A, B>(mol: &Mol<A, B>, atom: NodeIndex, in_unit: impl Fn(EdgeIndex) -> bool) -> Option<u8>
where
    A: HasAtomicNum + HasFormalCharge + HasHydrogenCount + HasAromaticity,
    B: HasBondOrder,
{
    let a = mol.atom(atom);
    let element = Element::from_atomic_num(a.atomic_num()).filter(|e| e.is_sp2_capable())?;
    let charge = a.formal_charge();

    let mut unit_doubles = 0;
    let mut unit_aromatic = false;
    let mut exocyclic_double = None;
    let mut used = a.hydrogen_count();
    for edge in mol.bonds_of(atom) {
        let order = mol.bond(edge).bond_order();
        used = used.saturating_add(order.valence_contribution());
        match order {
            BondOrder::Triple => return None,
            BondOrder::Double if in_unit(edge) => unit_doubles += 1,
            BondOrder::Double => exocyclic_double = mol.other_end(edge, atom),
            BondOrder::Aromatic if in_unit(edge) => unit_aromatic = true,
            _ => {}
        }
    }

    if unit_doubles > 1 {
        return None;
    }
    if let Some(partner) = exocyclic_double {
        // C=O, C=N and C=S leave an empty p orbital in the ring
        let hetero = mol.atom(partner).atomic_num() != Element::C.atomic_num();
        return (element == Element::C && unit_doubles == 0 && hetero).then_some(0);
    }
    if unit_doubles == 1 {
        return Some(1);
    }

    let substituents = mol.degree(atom) + usize::from(a.hydrogen_count());
    if a.is_aromatic() || unit_aromatic {
        // An aromatic atom with valence to spare carries the implied double.
        let spare = valence::allowed_valences(a.atomic_num(), charge)
            .iter()
            .find(|&&v| v >= used)
            .map_or(0, |&v| v - used);
        if spare > 0 {
            return Some(1);
        }
    }
    lone_pair_electrons(element, charge, substituents)
}

/// Contribution of an atom with no double bond in the unit.
fn lone_pair_electrons(element: Element, charge: i8, substituents: usize) -> Option<u8> {
    match (element, charge) {
        (Element::C, -1) => Some(2),
        (Element::C, 1) => Some(0),
        (Element::N | Element::P | Element::As, 0) if substituents <= 3 => Some(2),
        (Element::N | Element::P | Element::As, -1) => Some(2),
        (Element::N | Element::P | Element::As, 1) => Some(0),
        (Element::O | Element::S | Element::Se | Element::Te, 0) if substituents <= 2 => Some(2),
        (Element::O | Element::S | Element::Se | Element::Te, 1) => Some(0),
        (Element::B, 0) => Some(0),
        _ => None,
    }
}

fn is_huckel(pi_electrons: u32) -> bool {
    if pi_electrons < 2 {
        return false;
    }
    (pi_electrons - 2).is_multiple_of(4)
}
