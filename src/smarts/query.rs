use std::collections::HashMap;

use petgraph::graph::{EdgeIndex, NodeIndex};

use crate::atom::Chirality;
use crate::bond::BondOrder;
use crate::mol::{Mol, Molecule};
use crate::rings::RingInfo;
use crate::valence;

/// A compiled SMARTS query.
pub type Pattern = Mol<AtomExpr, BondExpr>;

/// A `$(...)` environment. `id` is unique within the outermost pattern and
/// keys the precomputed match set of the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct RecursiveQuery {
    pub id: usize,
    pub pattern: Pattern,
}

/// Predicate tree for one query atom.
#[derive(Debug, Clone, PartialEq)]
pub enum AtomExpr {
    /// Any atom (`*`).
    True,
    /// Element test. `aromatic` is `None` for `#n`, `Some(true)` for
    /// lowercase and `Some(false)` for uppercase symbols.
    Element {
        atomic_num: u8,
        aromatic: Option<bool>,
    },
    /// `a`
    Aromatic,
    /// `A`
    Aliphatic,
    Isotope(u16),
    /// Explicit connections in the graph (`D`).
    Degree(u8),
    /// Explicit connections plus attached hydrogens (`X`).
    Connectivity(u8),
    /// Bond-order sum plus hydrogens, counting the implied aromatic double
    /// bond (`v`).
    Valence(u8),
    /// Attached hydrogens plus hydrogen neighbors (`H`).
    TotalHCount(u8),
    /// Attached hydrogens only (`h`).
    ImplicitHCount(u8),
    /// In at least one ring (`R`, `r`).
    InRing,
    /// Number of perceived rings containing the atom (`R<n>`); `R0` means
    /// acyclic.
    RingMembership(u8),
    /// Size of the smallest perceived ring containing the atom (`r<n>`).
    SmallestRingSize(u8),
    /// Number of ring bonds on the atom (`x<n>`).
    RingBondCount(u8),
    Charge(i8),
    /// Atom map class (`:n`). Always matches.
    AtomMapClass(u16),
    /// `@` or `@@`, relative to the query atom's reference order. Checked
    /// only when matching with chirality enabled.
    Chirality(Chirality),
    Recursive(RecursiveQuery),
    And(Vec<AtomExpr>),
    Or(Vec<AtomExpr>),
    Not(Box<AtomExpr>),
}

/// Predicate for one query bond. An unwritten bond is
/// [`BondExpr::SingleOrAromatic`].
#[derive(Debug, Clone, PartialEq)]
pub enum BondExpr {
    /// `~`
    True,
    Single,
    Double,
    Triple,
    Aromatic,
    /// Ring bond (`@`).
    Ring,
    SingleOrAromatic,
    /// `/`, matched as a single bond.
    Up,
    /// `\`, matched as a single bond.
    Down,
    And(Vec<BondExpr>),
    Or(Vec<BondExpr>),
    Not(Box<BondExpr>),
}

/// Per-target data the predicates read, computed once per search.
pub struct MatchContext<'a> {
    pub mol: &'a Molecule,
    ring_counts: Vec<u8>,
    smallest_rings: Vec<u8>,
    ring_bonds: Vec<bool>,
    /// Target atoms that anchor a match of each recursive environment,
    /// indexed by atom index.
    pub(crate) recursive: HashMap<usize, Vec<bool>>,
}

impl<'a> MatchContext<'a> {
    pub fn new(mol: &'a Molecule, rings: &RingInfo) -> Self {
        let n = mol.atom_count();
        let mut ring_counts = vec![0u8; n];
        let mut smallest_rings = vec![0u8; n];
        let mut ring_bonds = vec![false; mol.bond_count()];
        for ring in rings.rings() {
            let size = u8::try_from(ring.len()).unwrap_or(u8::MAX);
            for atom in ring {
                let i = atom.index();
                ring_counts[i] = ring_counts[i].saturating_add(1);
                if smallest_rings[i] == 0 || size < smallest_rings[i] {
                    smallest_rings[i] = size;
                }
            }
            for edge in crate::rings::ring_edges(mol, ring) {
                ring_bonds[edge.index()] = true;
            }
        }
        Self {
            mol,
            ring_counts,
            smallest_rings,
            ring_bonds,
            recursive: HashMap::new(),
        }
    }

    pub fn is_ring_bond(&self, edge: EdgeIndex) -> bool {
        self.ring_bonds.get(edge.index()).copied().unwrap_or(false)
    }

    fn ring_bond_count(&self, idx: NodeIndex) -> u8 {
        count(self.mol.bonds_of(idx).filter(|&e| self.is_ring_bond(e)))
    }

    fn hydrogen_neighbors(&self, idx: NodeIndex) -> u8 {
        count(self.mol.neighbors(idx).filter(|&nb| self.mol.atom(nb).atomic_num == 1))
    }

    fn valence(&self, idx: NodeIndex) -> u8 {
        let atom = self.mol.atom(idx);
        let used = self.mol.explicit_valence(idx).saturating_add(atom.hydrogen_count);
        let aromatic_bonds = self
            .mol
            .bonds_of(idx)
            .any(|e| self.mol.bond(e).order == BondOrder::Aromatic);
        if !(atom.is_aromatic && aromatic_bonds) {
            return used;
        }
        let next = valence::allowed_valences(atom.atomic_num, atom.formal_charge)
            .iter()
            .find(|&&v| v >= used)
            .copied();
        match next {
            Some(v) if v > used => used + 1,
            _ => used,
        }
    }
}

/// Reference neighbor order of a query atom: `None` for a required single
/// hydrogen, then the query neighbors in ascending index.
pub(crate) fn stereo_reference(pattern: &Pattern, idx: NodeIndex) -> Vec<Option<NodeIndex>> {
    let mut order = Vec::with_capacity(4);
    if pattern.atom(idx).requires_one_hydrogen() {
        order.push(None);
    }
    order.extend(pattern.sorted_neighbors(idx).into_iter().map(Some));
    order
}

fn count(iter: impl Iterator) -> u8 {
    u8::try_from(iter.count()).unwrap_or(u8::MAX)
}

impl AtomExpr {
    pub fn matches(&self, ctx: &MatchContext, idx: NodeIndex) -> bool {
        let atom = ctx.mol.atom(idx);
        match self {
            AtomExpr::True => true,
            AtomExpr::Element {
                atomic_num,
                aromatic,
            } => atom.atomic_num == *atomic_num && aromatic.is_none_or(|a| atom.is_aromatic == a),
            AtomExpr::Aromatic => atom.is_aromatic,
            AtomExpr::Aliphatic => !atom.is_aromatic,
            AtomExpr::Isotope(iso) => atom.isotope == *iso,
            AtomExpr::Degree(d) => count(ctx.mol.neighbors(idx)) == *d,
            AtomExpr::Connectivity(x) => {
                count(ctx.mol.neighbors(idx)).saturating_add(atom.hydrogen_count) == *x
            }
            AtomExpr::Valence(v) => ctx.valence(idx) == *v,
            AtomExpr::TotalHCount(h) => {
                atom.hydrogen_count.saturating_add(ctx.hydrogen_neighbors(idx)) == *h
            }
            AtomExpr::ImplicitHCount(h) => atom.hydrogen_count == *h,
            AtomExpr::InRing => ctx.ring_counts[idx.index()] > 0,
            AtomExpr::RingMembership(n) => ctx.ring_counts[idx.index()] == *n,
            AtomExpr::SmallestRingSize(r) => ctx.smallest_rings[idx.index()] == *r,
            AtomExpr::RingBondCount(x) => ctx.ring_bond_count(idx) == *x,
            AtomExpr::Charge(c) => atom.formal_charge == *c,
            AtomExpr::AtomMapClass(_) | AtomExpr::Chirality(_) => true,
            AtomExpr::Recursive(query) => ctx
                .recursive
                .get(&query.id)
                .is_some_and(|anchors| anchors[idx.index()]),
            AtomExpr::And(exprs) => exprs.iter().all(|e| e.matches(ctx, idx)),
            AtomExpr::Or(exprs) => exprs.iter().any(|e| e.matches(ctx, idx)),
            AtomExpr::Not(expr) => !expr.matches(ctx, idx),
        }
    }

    /// The stereo marker written on the atom, if any.
    pub fn chirality(&self) -> Chirality {
        match self {
            AtomExpr::Chirality(c) => *c,
            AtomExpr::And(parts) => parts
                .iter()
                .map(AtomExpr::chirality)
                .find(|c| c.is_specified())
                .unwrap_or(Chirality::None),
            _ => Chirality::None,
        }
    }

    pub(crate) fn set_chirality(&mut self, chirality: Chirality) {
        match self {
            AtomExpr::Chirality(c) => *c = chirality,
            AtomExpr::And(parts) => parts.iter_mut().for_each(|p| p.set_chirality(chirality)),
            _ => {}
        }
    }

    /// Whether the atom is required to carry exactly one hydrogen, which
    /// then takes a place in its stereo reference order.
    pub fn requires_one_hydrogen(&self) -> bool {
        match self {
            AtomExpr::TotalHCount(1) => true,
            AtomExpr::And(parts) => parts.iter().any(AtomExpr::requires_one_hydrogen),
            _ => false,
        }
    }

    /// Recursive environments reachable from this expression, outermost
    /// first.
    pub(crate) fn recursive_queries(&self) -> Vec<&RecursiveQuery> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(expr) = stack.pop() {
            match expr {
                AtomExpr::Recursive(query) => out.push(query),
                AtomExpr::And(parts) | AtomExpr::Or(parts) => stack.extend(parts.iter().rev()),
                AtomExpr::Not(inner) => stack.push(inner),
                _ => {}
            }
        }
        out
    }
}

impl BondExpr {
    pub fn matches(&self, ctx: &MatchContext, edge: EdgeIndex) -> bool {
        let order = ctx.mol.bond(edge).order;
        match self {
            BondExpr::True => true,
            BondExpr::Single | BondExpr::Up | BondExpr::Down => order == BondOrder::Single,
            BondExpr::Double => order == BondOrder::Double,
            BondExpr::Triple => order == BondOrder::Triple,
            BondExpr::Aromatic => order == BondOrder::Aromatic,
            BondExpr::Ring => ctx.is_ring_bond(edge),
            BondExpr::SingleOrAromatic => matches!(order, BondOrder::Single | BondOrder::Aromatic),
            BondExpr::And(exprs) => exprs.iter().all(|e| e.matches(ctx, edge)),
            BondExpr::Or(exprs) => exprs.iter().any(|e| e.matches(ctx, edge)),
            BondExpr::Not(expr) => !expr.matches(ctx, edge),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smiles::from_smiles;

    fn n(i: usize) -> NodeIndex {
        NodeIndex::new(i)
    }

    #[test]
    fn ring_counts_and_sizes() {
        let mol = from_smiles("C1CC2CCCCC2C1C").unwrap();
        let rings = RingInfo::perceive(&mol);
        let ctx = MatchContext::new(&mol, &rings);
        assert!(AtomExpr::RingMembership(2).matches(&ctx, n(2)));
        assert!(AtomExpr::SmallestRingSize(5).matches(&ctx, n(0)));
        assert!(AtomExpr::SmallestRingSize(5).matches(&ctx, n(2)));
        assert!(AtomExpr::RingBondCount(3).matches(&ctx, n(2)));
        assert!(AtomExpr::RingMembership(0).matches(&ctx, n(9)));
        assert!(!AtomExpr::InRing.matches(&ctx, n(9)));
    }

    #[test]
    fn hydrogen_and_valence_counts() {
        let mol = from_smiles("c1ccccc1[nH]1cccc1").unwrap();
        let rings = RingInfo::perceive(&mol);
        let ctx = MatchContext::new(&mol, &rings);
        assert!(AtomExpr::Valence(4).matches(&ctx, n(0)));
        assert!(AtomExpr::Connectivity(3).matches(&ctx, n(0)));
        assert!(AtomExpr::TotalHCount(1).matches(&ctx, n(0)));
        assert!(AtomExpr::Degree(2).matches(&ctx, n(0)));

        let ammonia = from_smiles("[H]N([H])[H]").unwrap();
        let rings = RingInfo::perceive(&ammonia);
        let ctx = MatchContext::new(&ammonia, &rings);
        assert!(AtomExpr::TotalHCount(3).matches(&ctx, n(1)));
        assert!(AtomExpr::ImplicitHCount(0).matches(&ctx, n(1)));
        assert!(AtomExpr::Valence(3).matches(&ctx, n(1)));
    }

    #[test]
    fn bond_predicates() {
        let mol = from_smiles("C=CC1CC1c1ccccc1").unwrap();
        let rings = RingInfo::perceive(&mol);
        let ctx = MatchContext::new(&mol, &rings);
        let edge = |a, b| mol.bond_between(n(a), n(b)).unwrap();
        assert!(BondExpr::Double.matches(&ctx, edge(0, 1)));
        assert!(!BondExpr::SingleOrAromatic.matches(&ctx, edge(0, 1)));
        assert!(BondExpr::Ring.matches(&ctx, edge(2, 3)));
        assert!(!BondExpr::Ring.matches(&ctx, edge(1, 2)));
        // cyclopropyl-phenyl link
        assert!(!BondExpr::Aromatic.matches(&ctx, edge(4, 5)));
        assert!(BondExpr::Aromatic.matches(&ctx, edge(5, 6)));
        assert!(BondExpr::Aromatic.matches(&ctx, edge(6, 7)));
        assert!(BondExpr::SingleOrAromatic.matches(&ctx, edge(6, 7)));
        let not_ring_single = BondExpr::And(vec![
            BondExpr::Single,
            BondExpr::Not(Box::new(BondExpr::Ring)),
        ]);
        assert!(not_ring_single.matches(&ctx, edge(4, 5)));
        assert!(!not_ring_single.matches(&ctx, edge(2, 3)));
    }

    #[test]
    fn chirality_and_hydrogen_lookup() {
        let expr = AtomExpr::And(vec![
            AtomExpr::Element {
                atomic_num: 6,
                aromatic: Some(false),
            },
            AtomExpr::Chirality(Chirality::Cw),
            AtomExpr::TotalHCount(1),
        ]);
        assert_eq!(expr.chirality(), Chirality::Cw);
        assert!(expr.requires_one_hydrogen());
        let mut flipped = expr.clone();
        flipped.set_chirality(Chirality::Ccw);
        assert_eq!(flipped.chirality(), Chirality::Ccw);
        assert_eq!(AtomExpr::True.chirality(), Chirality::None);
    }
}
