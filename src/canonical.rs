//! Canonical atom ranking and canonical depth-first traversal.
//!
//! Ranks come from iterative label refinement: atoms start from an
//! invariant built from element, charge, degree, aromaticity, isotope and
//! hydrogen count, and each round splits classes by the multiset of
//! neighbor labels combined with bond-order codes. Refinement only ever
//! splits classes, so the relative order of classes from earlier rounds is
//! preserved. Ties left once the partition is stable are broken one class
//! at a time; each candidate is tried, and the one giving the smallest
//! trace wins, with lowest atom index deciding exact ties.

use std::hash::{Hash, Hasher};

use petgraph::graph::{EdgeIndex, NodeIndex};
use tracing::{debug, trace};

use crate::atom::Chirality;
use crate::bond::BondOrder;
use crate::graph_ops::connected_components;
use crate::mol::{permutation_parity, Mol};
use crate::traits::{
    HasAromaticity, HasAtomicNum, HasBondOrder, HasBondStereo, HasChirality, HasFormalCharge,
    HasHydrogenCount, HasIsotope,
};

struct Fnv1aHasher(u64);

impl Fnv1aHasher {
    fn new() -> Self {
        Self(0xcbf29ce484222325)
    }
}

impl Hasher for Fnv1aHasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(0x100000001b3);
        }
    }
}

/// How the traversal picks the first atom of each connected component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RootPolicy {
    /// Start from the lowest-ranked atom.
    #[default]
    LowestRank,
    /// Start from the lowest-ranked atom that is neither carbon nor
    /// hydrogen, falling back to the lowest-ranked atom.
    PreferHeteroatom,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CanonOptions {
    /// Upper bound on refinement rounds per refinement pass. `None` refines
    /// until the partition stops splitting.
    pub max_rounds: Option<usize>,
    pub root_policy: RootPolicy,
}

impl CanonOptions {
    pub fn with_max_rounds(mut self, rounds: usize) -> Self {
        self.max_rounds = Some(rounds);
        self
    }

    pub fn with_root_policy(mut self, policy: RootPolicy) -> Self {
        self.root_policy = policy;
        self
    }
}

/// Canonical ranks of a molecule's atoms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalOrdering {
    /// Rank of each atom, indexed by atom index; a permutation of `0..n`.
    pub ranks: Vec<usize>,
    /// Atom holding each rank.
    pub order: Vec<NodeIndex>,
    /// Refined labels before tie-breaking. Atoms share a value exactly when
    /// refinement could not tell them apart.
    pub symmetry_classes: Vec<usize>,
}

impl CanonicalOrdering {
    pub fn rank(&self, atom: NodeIndex) -> usize {
        self.ranks[atom.index()]
    }

    pub fn are_equivalent(&self, a: NodeIndex, b: NodeIndex) -> bool {
        self.symmetry_classes[a.index()] == self.symmetry_classes[b.index()]
    }

    /// Number of distinct symmetry classes.
    pub fn class_count(&self) -> usize {
        count_distinct(&self.symmetry_classes)
    }
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct AtomInvariant {
    degree: usize,
    atomic_num: u8,
    isotope: u16,
    formal_charge: i8,
    is_aromatic: bool,
    hydrogen_count: u8,
}

fn atom_invariant<A, B>(mol: &Mol<A, B>, idx: NodeIndex) -> AtomInvariant
where
    A: HasAtomicNum + HasHydrogenCount + HasFormalCharge + HasAromaticity + HasIsotope,
{
    let atom = mol.atom(idx);
    AtomInvariant {
        degree: mol.degree(idx),
        atomic_num: atom.atomic_num(),
        isotope: atom.isotope(),
        formal_charge: atom.formal_charge(),
        is_aromatic: atom.is_aromatic(),
        hydrogen_count: atom.hydrogen_count(),
    }
}

/// Rank of each key: the number of keys strictly smaller than it.
fn ranks_from_keys<K: Ord>(keys: &[K]) -> Vec<usize> {
    let n = keys.len();
    let mut indices: Vec<usize> = (0..n).collect();
    indices.sort_by(|&a, &b| keys[a].cmp(&keys[b]));
    let mut ranks = vec![0usize; n];
    for i in 1..n {
        ranks[indices[i]] = if keys[indices[i]] == keys[indices[i - 1]] {
            ranks[indices[i - 1]]
        } else {
            i
        };
    }
    ranks
}

fn count_distinct(ranks: &[usize]) -> usize {
    let mut sorted: Vec<usize> = ranks.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    sorted.len()
}

fn neighborhood_hash<A, B: HasBondOrder>(mol: &Mol<A, B>, node: NodeIndex, ranks: &[usize]) -> u64 {
    let mut labels: Vec<u64> = mol
        .bonds_of(node)
        .filter_map(|edge| {
            let nb = mol.other_end(edge, node)?;
            Some(ranks[nb.index()] as u64 ^ (mol.bond(edge).bond_order().code() << 56))
        })
        .collect();
    labels.sort_unstable();
    let mut h = Fnv1aHasher::new();
    labels.hash(&mut h);
    h.finish()
}

/// Splits classes until stable or `max_rounds` is reached. Returns the
/// number of rounds run.
fn refine<A, B: HasBondOrder>(
    mol: &Mol<A, B>,
    ranks: &mut Vec<usize>,
    max_rounds: Option<usize>,
) -> usize {
    let n = ranks.len();
    let mut distinct = count_distinct(ranks);
    let mut rounds = 0;
    while distinct < n && max_rounds.is_none_or(|max| rounds < max) {
        let keys: Vec<(usize, u64)> = mol
            .atoms()
            .map(|node| (ranks[node.index()], neighborhood_hash(mol, node, ranks)))
            .collect();
        let next = ranks_from_keys(&keys);
        let next_distinct = count_distinct(&next);
        rounds += 1;
        if next_distinct == distinct {
            break;
        }
        *ranks = next;
        distinct = next_distinct;
        trace!(round = rounds, classes = distinct, "refinement round");
    }
    rounds
}

/// Whether a tetrahedral mark on `node` describes a real stereocenter: a
/// specified parity, at most one hydrogen, three or four substituents, and
/// no two explicit neighbors in the same class.
pub(crate) fn is_distinct_stereocenter<A, B>(mol: &Mol<A, B>, node: NodeIndex, classes: &[usize]) -> bool
where
    A: HasChirality + HasHydrogenCount,
{
    let atom = mol.atom(node);
    if !atom.chirality().is_specified() || atom.hydrogen_count() > 1 {
        return false;
    }
    let substituents = mol.degree(node) + atom.hydrogen_count() as usize;
    if !(3..=4).contains(&substituents) {
        return false;
    }
    let mut seen: Vec<usize> = mol.neighbors(node).map(|nb| classes[nb.index()]).collect();
    let total = seen.len();
    seen.sort_unstable();
    seen.dedup();
    seen.len() == total
}

/// Whether the stereo on a double bond distinguishes two configurations:
/// each end carries one substituent, or two from different classes.
pub(crate) fn is_distinct_double_bond<A, B>(mol: &Mol<A, B>, edge: EdgeIndex, classes: &[usize]) -> bool
where
    B: HasBondOrder + HasBondStereo,
{
    let bond = mol.bond(edge);
    if bond.bond_order() != BondOrder::Double || bond.bond_stereo().refs().is_none() {
        return false;
    }
    let Some((a, b)) = mol.bond_endpoints(edge) else {
        return false;
    };
    [(a, b), (b, a)].iter().all(|&(end, other)| {
        let subs: Vec<usize> = mol
            .neighbors(end)
            .filter(|&nb| nb != other)
            .map(|nb| classes[nb.index()])
            .collect();
        match subs.as_slice() {
            [_] => true,
            [x, y] => x != y,
            _ => false,
        }
    })
}

/// Stereo contribution of `node` to a tie-break trace, read against the
/// trial ranks.
fn stereo_signature<A, B>(mol: &Mol<A, B>, node: NodeIndex, ranks: &[usize], classes: &[usize]) -> u64
where
    A: HasChirality + HasHydrogenCount,
    B: HasBondOrder + HasBondStereo,
{
    let mut sig = 0u64;
    if is_distinct_stereocenter(mol, node, classes) {
        let reference: Vec<usize> = mol
            .stereo_reference(node)
            .into_iter()
            .map(|r| r.map_or(0, |a| ranks[a.index()] + 1))
            .collect();
        let mut by_rank = reference.clone();
        by_rank.sort_unstable();
        let tied = by_rank.windows(2).any(|w| w[0] == w[1]);
        sig = if tied {
            3
        } else {
            let chirality = if permutation_parity(&reference, &by_rank) {
                mol.atom(node).chirality()
            } else {
                mol.atom(node).chirality().inverted()
            };
            match chirality {
                Chirality::Ccw => 1,
                Chirality::Cw => 2,
                Chirality::None => 0,
            }
        };
    }

    for edge in mol.bonds_of(node) {
        if !is_distinct_double_bond(mol, edge, classes) {
            continue;
        }
        let stereo = mol.bond(edge).bond_stereo();
        let (Some((ra, rb)), Some((a, b))) = (stereo.refs(), mol.bond_endpoints(edge)) else {
            continue;
        };
        let top = |end: NodeIndex, other: NodeIndex| {
            mol.neighbors(end)
                .filter(|&nb| nb != other)
                .max_by_key(|nb| (ranks[nb.index()], std::cmp::Reverse(nb.index())))
        };
        // Orient the stored references to match the trial ranks.
        let (ref_a, ref_b) = if mol.neighbors(a).any(|nb| nb == ra) {
            (ra, rb)
        } else {
            (rb, ra)
        };
        let flips = usize::from(top(a, b) != Some(ref_a)) + usize::from(top(b, a) != Some(ref_b));
        let cis = stereo.is_cis() == (flips % 2 == 0);
        sig = sig * 8 + if cis { 4 } else { 5 };
    }
    sig
}

fn tie_break_trace<A, B>(
    mol: &Mol<A, B>,
    ranks: &[usize],
    invariants: &[AtomInvariant],
    classes: &[usize],
) -> Vec<u64>
where
    A: HasChirality + HasHydrogenCount,
    B: HasBondOrder + HasBondStereo,
{
    let mut entries: Vec<(usize, u64)> = mol
        .atoms()
        .map(|node| {
            let mut h = Fnv1aHasher::new();
            invariants[node.index()].hash(&mut h);
            let mut nbs: Vec<(usize, u64)> = mol
                .bonds_of(node)
                .filter_map(|edge| {
                    let nb = mol.other_end(edge, node)?;
                    Some((ranks[nb.index()], mol.bond(edge).bond_order().code()))
                })
                .collect();
            nbs.sort_unstable();
            nbs.hash(&mut h);
            stereo_signature(mol, node, ranks, classes).hash(&mut h);
            (ranks[node.index()], h.finish())
        })
        .collect();
    entries.sort_unstable();
    entries.into_iter().map(|(_, h)| h).collect()
}

fn break_ties<A, B>(
    mol: &Mol<A, B>,
    ranks: &mut Vec<usize>,
    invariants: &[AtomInvariant],
    classes: &[usize],
    max_rounds: Option<usize>,
) where
    A: HasChirality + HasHydrogenCount,
    B: HasBondOrder + HasBondStereo,
{
    let n = ranks.len();
    while count_distinct(ranks) < n {
        let Some(tied) = lowest_tied_rank(ranks) else {
            return;
        };
        let candidates: Vec<usize> = (0..n).filter(|&i| ranks[i] == tied).collect();

        let mut best: Option<(Vec<u64>, Vec<usize>)> = None;
        for &candidate in &candidates {
            let mut trial = ranks.clone();
            for &other in &candidates {
                if other != candidate {
                    trial[other] = tied + 1;
                }
            }
            refine(mol, &mut trial, max_rounds);
            let trace = tie_break_trace(mol, &trial, invariants, classes);
            if best.as_ref().is_none_or(|(best_trace, _)| trace < *best_trace) {
                best = Some((trace, trial));
            }
        }
        match best {
            Some((_, trial)) => *ranks = trial,
            None => return,
        }
    }
}

fn lowest_tied_rank(ranks: &[usize]) -> Option<usize> {
    let mut sorted = ranks.to_vec();
    sorted.sort_unstable();
    sorted.windows(2).find(|w| w[0] == w[1]).map(|w| w[0])
}

/// Computes canonical ranks for every atom.
///
/// Two molecules that differ only in atom numbering receive the same rank
/// for corresponding atoms, up to automorphism.
pub fn canonical_ordering<A, B>(mol: &Mol<A, B>, options: &CanonOptions) -> CanonicalOrdering
where
    A: HasAtomicNum
        + HasHydrogenCount
        + HasFormalCharge
        + HasAromaticity
        + HasIsotope
        + HasChirality,
    B: HasBondOrder + HasBondStereo,
{
    let n = mol.atom_count();
    if n == 0 {
        return CanonicalOrdering {
            ranks: Vec::new(),
            order: Vec::new(),
            symmetry_classes: Vec::new(),
        };
    }

    let invariants: Vec<AtomInvariant> = mol.atoms().map(|idx| atom_invariant(mol, idx)).collect();
    let mut ranks = ranks_from_keys(&invariants);
    let rounds = refine(mol, &mut ranks, options.max_rounds);
    let symmetry_classes = ranks.clone();
    let classes = count_distinct(&symmetry_classes);

    break_ties(mol, &mut ranks, &invariants, &symmetry_classes, options.max_rounds);

    let mut order: Vec<NodeIndex> = mol.atoms().collect();
    order.sort_by_key(|a| ranks[a.index()]);
    debug!(atoms = n, rounds, classes, "canonical ranks computed");

    CanonicalOrdering {
        ranks,
        order,
        symmetry_classes,
    }
}

/// One step of a depth-first traversal, in writing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalEvent {
    /// Start of another connected component.
    Disconnect,
    /// An atom, reached through `via` unless it starts a component.
    Atom { atom: NodeIndex, via: Option<EdgeIndex> },
    /// A ring-closure label opened at the current atom.
    RingOpen {
        label: u16,
        bond: EdgeIndex,
        partner: NodeIndex,
    },
    /// A ring-closure label closed at the current atom.
    RingClose {
        label: u16,
        bond: EdgeIndex,
        partner: NodeIndex,
    },
    BranchOpen,
    BranchClose,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Traversal {
    pub events: Vec<TraversalEvent>,
    /// Atoms in visit order.
    pub order: Vec<NodeIndex>,
    /// For each atom index, its neighbors in writing order: the atom it
    /// was reached from, ring-closure partners, then branches and the
    /// continuing chain.
    pub neighbor_order: Vec<Vec<NodeIndex>>,
    /// The atom each atom was reached from; `None` for component roots.
    pub parents: Vec<Option<NodeIndex>>,
}

impl Traversal {
    /// Position of each atom in [`Traversal::order`], indexed by atom index.
    pub fn visit_positions(&self) -> Vec<usize> {
        let mut pos = vec![0; self.neighbor_order.len()];
        for (i, atom) in self.order.iter().enumerate() {
            pos[atom.index()] = i;
        }
        pos
    }
}

struct DfsFrame {
    atom: NodeIndex,
    neighbors: Vec<(NodeIndex, EdgeIndex)>,
    next: usize,
}

enum Work {
    Visit(NodeIndex),
    OpenBranch,
    CloseBranch,
}

fn neighbors_by_rank<A, B>(mol: &Mol<A, B>, atom: NodeIndex, ranks: &[usize]) -> Vec<(NodeIndex, EdgeIndex)> {
    let mut nbs: Vec<(NodeIndex, EdgeIndex)> = mol
        .bonds_of(atom)
        .filter_map(|e| Some((mol.other_end(e, atom)?, e)))
        .collect();
    nbs.sort_by_key(|(nb, _)| ranks[nb.index()]);
    nbs
}

fn pick_root<A: HasAtomicNum, B>(
    mol: &Mol<A, B>,
    component: &[NodeIndex],
    ranks: &[usize],
    policy: RootPolicy,
) -> Option<NodeIndex> {
    let lowest = component.iter().copied().min_by_key(|a| ranks[a.index()]);
    match policy {
        RootPolicy::LowestRank => lowest,
        RootPolicy::PreferHeteroatom => component
            .iter()
            .copied()
            .filter(|&a| !matches!(mol.atom(a).atomic_num(), 1 | 6))
            .min_by_key(|a| ranks[a.index()])
            .or(lowest),
    }
}

/// Depth-first traversal visiting the lowest-ranked unvisited neighbor
/// first.
///
/// Components are visited in order of their lowest rank. Ring-closure
/// labels are handed out in discovery order, reusing the smallest free
/// label.
pub fn canonical_traversal<A: HasAtomicNum, B>(
    mol: &Mol<A, B>,
    ranks: &[usize],
    policy: RootPolicy,
) -> Traversal {
    traversal_from(mol, ranks, |component| pick_root(mol, component, ranks, policy))
}

/// Depth-first traversal by `ranks` starting each component at the atom
/// chosen by `root_of`.
pub(crate) fn traversal_from<A, B, F>(mol: &Mol<A, B>, ranks: &[usize], root_of: F) -> Traversal
where
    F: Fn(&[NodeIndex]) -> Option<NodeIndex>,
{
    let n = mol.atom_count();

    let mut components = connected_components(mol);
    components.sort_by_key(|c| c.iter().map(|a| ranks[a.index()]).min());

    let mut visited = vec![false; n];
    let mut parent_edge: Vec<Option<EdgeIndex>> = vec![None; n];
    let mut children: Vec<Vec<NodeIndex>> = vec![Vec::new(); n];
    let mut preorder_pos = vec![0usize; n];
    let mut roots = Vec::with_capacity(components.len());
    let mut visit_count = 0;

    for component in &components {
        let Some(root) = root_of(component) else {
            continue;
        };
        roots.push(root);
        visited[root.index()] = true;
        preorder_pos[root.index()] = visit_count;
        visit_count += 1;
        let mut stack = vec![DfsFrame {
            atom: root,
            neighbors: neighbors_by_rank(mol, root, ranks),
            next: 0,
        }];
        while let Some(frame) = stack.last_mut() {
            let Some(&(nb, edge)) = frame.neighbors.get(frame.next) else {
                stack.pop();
                continue;
            };
            frame.next += 1;
            let atom = frame.atom;
            if visited[nb.index()] {
                continue;
            }
            visited[nb.index()] = true;
            preorder_pos[nb.index()] = visit_count;
            visit_count += 1;
            parent_edge[nb.index()] = Some(edge);
            children[atom.index()].push(nb);
            stack.push(DfsFrame {
                atom: nb,
                neighbors: neighbors_by_rank(mol, nb, ranks),
                next: 0,
            });
        }
    }

    let mut is_tree = vec![false; mol.bond_count()];
    for edge in parent_edge.iter().flatten() {
        is_tree[edge.index()] = true;
    }
    let mut ring_bonds: Vec<Vec<(EdgeIndex, NodeIndex)>> = vec![Vec::new(); n];
    for edge in mol.bonds() {
        if is_tree[edge.index()] {
            continue;
        }
        if let Some((a, b)) = mol.bond_endpoints(edge) {
            ring_bonds[a.index()].push((edge, b));
            ring_bonds[b.index()].push((edge, a));
        }
    }

    let mut events = Vec::with_capacity(2 * n);
    let mut order = Vec::with_capacity(n);
    let mut neighbor_order: Vec<Vec<NodeIndex>> = vec![Vec::new(); n];
    let mut parents: Vec<Option<NodeIndex>> = vec![None; n];
    let mut emitted = vec![false; n];
    let mut labels: Vec<Option<u16>> = vec![None; mol.bond_count()];
    let mut labels_in_use: Vec<bool> = vec![false; 1];

    for (i, &root) in roots.iter().enumerate() {
        if i > 0 {
            events.push(TraversalEvent::Disconnect);
        }
        let mut work = vec![Work::Visit(root)];
        while let Some(item) = work.pop() {
            let atom = match item {
                Work::OpenBranch => {
                    events.push(TraversalEvent::BranchOpen);
                    continue;
                }
                Work::CloseBranch => {
                    events.push(TraversalEvent::BranchClose);
                    continue;
                }
                Work::Visit(atom) => atom,
            };
            let ai = atom.index();
            emitted[ai] = true;
            order.push(atom);
            let via = parent_edge[ai];
            events.push(TraversalEvent::Atom { atom, via });

            let mut written = Vec::with_capacity(4);
            if let Some(parent) = via.and_then(|e| mol.other_end(e, atom)) {
                written.push(parent);
                parents[ai] = Some(parent);
            }

            let mut closing: Vec<(EdgeIndex, NodeIndex)> = Vec::new();
            let mut opening: Vec<(EdgeIndex, NodeIndex)> = Vec::new();
            for &(edge, partner) in &ring_bonds[ai] {
                if emitted[partner.index()] {
                    closing.push((edge, partner));
                } else {
                    opening.push((edge, partner));
                }
            }
            closing.sort_by_key(|(_, p)| preorder_pos[p.index()]);
            opening.sort_by_key(|(_, p)| preorder_pos[p.index()]);

            let closed: Vec<(u16, EdgeIndex, NodeIndex)> = closing
                .iter()
                .filter_map(|&(edge, partner)| Some((labels[edge.index()]?, edge, partner)))
                .collect();
            for &(label, bond, partner) in &closed {
                events.push(TraversalEvent::RingClose {
                    label,
                    bond,
                    partner,
                });
                written.push(partner);
            }
            // Labels freed here become available only after this atom's
            // openings are assigned.
            for &(bond, partner) in &opening {
                let label = take_free_label(&mut labels_in_use);
                labels[bond.index()] = Some(label);
                events.push(TraversalEvent::RingOpen {
                    label,
                    bond,
                    partner,
                });
                written.push(partner);
            }
            for &(label, bond, _) in &closed {
                labels_in_use[label as usize] = false;
                labels[bond.index()] = None;
            }

            let kids = &children[ai];
            written.extend(kids.iter().copied());
            neighbor_order[ai] = written;

            if let Some((&last, rest)) = kids.split_last() {
                work.push(Work::Visit(last));
                for &child in rest.iter().rev() {
                    work.push(Work::CloseBranch);
                    work.push(Work::Visit(child));
                    work.push(Work::OpenBranch);
                }
            }
        }
    }

    Traversal {
        events,
        order,
        neighbor_order,
        parents,
    }
}

fn take_free_label(in_use: &mut Vec<bool>) -> u16 {
    let label = (1..in_use.len()).find(|&l| !in_use[l]).unwrap_or_else(|| {
        in_use.push(false);
        in_use.len() - 1
    });
    in_use[label] = true;
    label as u16
}
