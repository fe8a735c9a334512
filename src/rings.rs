//! Ring perception.
//!
//! Rings are chosen from simple cycles up to a size bound, shortest first,
//! accepting a cycle whenever it covers a bond no accepted ring covers yet,
//! until the cycle rank `E - V + C` is reached. When the bounded search
//! falls short (macrocycles, or cycles made only of already-covered bonds)
//! the set is completed from shortest-path cycles kept linearly independent
//! over GF(2). The result is a small ring set, not a guaranteed minimum
//! cycle basis on every bridged polycycle.

use std::collections::VecDeque;

use petgraph::graph::{EdgeIndex, NodeIndex};
use tracing::{debug, warn};

use crate::graph_ops::{bridges, cycle_rank, distance_matrix, simple_cycles};
use crate::mol::{Mol, Molecule};

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RingOptions {
    /// Largest cycle, in atoms, considered by the bounded search.
    pub max_ring_size: usize,
}

impl Default for RingOptions {
    fn default() -> Self {
        Self { max_ring_size: 12 }
    }
}

impl RingOptions {
    pub fn with_max_ring_size(mut self, size: usize) -> Self {
        self.max_ring_size = size;
        self
    }
}

/// How the rings of a fused system are joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FusionTopology {
    /// A single ring.
    Isolated,
    /// Rings joined only through single shared atoms.
    Spiro,
    /// Ortho-fused rings in a straight row, such as anthracene.
    Linear,
    /// Ortho-fused rings with a bend or branch, such as phenanthrene.
    Angular,
    /// Some atom is shared by three or more rings, such as pyrene.
    Peri,
    /// Two rings share more than one bond.
    Bridged,
}

/// Rings connected through shared atoms.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RingSystem {
    /// Indices into [`RingInfo::rings`].
    pub rings: Vec<usize>,
    /// Member atoms, ascending.
    pub atoms: Vec<NodeIndex>,
    pub topology: FusionTopology,
}

impl RingSystem {
    pub fn contains_atom(&self, atom: NodeIndex) -> bool {
        self.atoms.binary_search(&atom).is_ok()
    }
}

/// Rings of a molecule, each an ordered cycle of atoms.
///
/// Every ring starts at its lowest atom and continues toward the lower of
/// that atom's two ring neighbors. Rings are sorted by size, then by atoms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RingInfo {
    rings: Vec<Vec<NodeIndex>>,
    systems: Vec<RingSystem>,
}

impl RingInfo {
    pub fn perceive<A, B>(mol: &Mol<A, B>) -> Self {
        Self::perceive_with(mol, &RingOptions::default())
    }

    pub fn perceive_with<A, B>(mol: &Mol<A, B>, options: &RingOptions) -> Self {
        let target = cycle_rank(mol);
        if target == 0 {
            return Self::default();
        }

        let num_edges = mol.bond_count();
        let mut is_bridge = vec![false; num_edges];
        for edge in bridges(mol) {
            is_bridge[edge.index()] = true;
        }

        let mut candidates = simple_cycles(mol, options.max_ring_size, |e| !is_bridge[e.index()]);
        candidates.iter_mut().for_each(|c| *c = normalize_ring(c));
        candidates.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
        candidates.dedup();

        let mut covered = vec![false; num_edges];
        let mut rings: Vec<Vec<NodeIndex>> = Vec::with_capacity(target);
        for cycle in candidates {
            if rings.len() == target {
                break;
            }
            let edges = ring_edges(mol, &cycle);
            if edges.iter().any(|e| !covered[e.index()]) {
                for e in &edges {
                    covered[e.index()] = true;
                }
                rings.push(cycle);
            }
        }

        if rings.len() < target {
            warn!(
                found = rings.len(),
                expected = target,
                max_ring_size = options.max_ring_size,
                "bounded cycle search fell short; completing from shortest-path cycles"
            );
            complete_ring_set(mol, &mut rings, target);
        }

        rings.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
        let systems = ring_systems(&rings);
        debug!(rings = rings.len(), systems = systems.len(), "rings perceived");
        Self { rings, systems }
    }

    pub fn num_rings(&self) -> usize {
        self.rings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rings.is_empty()
    }

    pub fn rings(&self) -> &[Vec<NodeIndex>] {
        &self.rings
    }

    pub fn systems(&self) -> &[RingSystem] {
        &self.systems
    }

    pub fn is_ring_atom(&self, atom: NodeIndex) -> bool {
        self.rings.iter().any(|ring| ring.contains(&atom))
    }

    pub fn is_ring_bond(&self, a: NodeIndex, b: NodeIndex) -> bool {
        self.rings.iter().any(|ring| ring_has_bond(ring, a, b))
    }

    pub fn smallest_ring_size(&self, atom: NodeIndex) -> Option<usize> {
        self.rings
            .iter()
            .filter(|ring| ring.contains(&atom))
            .map(|ring| ring.len())
            .min()
    }

    pub fn atom_rings(&self, atom: NodeIndex) -> Vec<&Vec<NodeIndex>> {
        self.rings
            .iter()
            .filter(|ring| ring.contains(&atom))
            .collect()
    }

    /// Sizes of the rings containing `atom`, ascending.
    pub fn ring_sizes(&self, atom: NodeIndex) -> Vec<usize> {
        let mut sizes: Vec<usize> = self.atom_rings(atom).iter().map(|r| r.len()).collect();
        sizes.sort_unstable();
        sizes
    }

    pub fn atom_ring_count(&self, atom: NodeIndex) -> usize {
        self.rings.iter().filter(|ring| ring.contains(&atom)).count()
    }

    pub fn bond_ring_count(&self, a: NodeIndex, b: NodeIndex) -> usize {
        self.rings.iter().filter(|ring| ring_has_bond(ring, a, b)).count()
    }

    /// The system containing ring `ring`.
    pub fn system_of(&self, ring: usize) -> Option<&RingSystem> {
        self.systems.iter().find(|s| s.rings.contains(&ring))
    }

    pub fn expected_ring_count<A, B>(mol: &Mol<A, B>) -> usize {
        cycle_rank(mol)
    }
}

/// Perceives rings and sets the `in_ring` flags of atoms and bonds.
///
/// A bond is a ring bond exactly when it is not a bridge, so the flags are
/// exact regardless of the ring size bound.
pub fn perceive_rings(mol: &mut Molecule) -> RingInfo {
    perceive_rings_with(mol, &RingOptions::default())
}

pub fn perceive_rings_with(mol: &mut Molecule, options: &RingOptions) -> RingInfo {
    let info = RingInfo::perceive_with(mol, options);
    let mut is_bridge = vec![false; mol.bond_count()];
    for edge in bridges(mol) {
        is_bridge[edge.index()] = true;
    }
    let edges: Vec<EdgeIndex> = mol.bonds().collect();
    for edge in edges {
        mol.bond_mut(edge).in_ring = !is_bridge[edge.index()];
    }
    let atoms: Vec<NodeIndex> = mol.atoms().collect();
    for atom in atoms {
        let in_ring = mol.bonds_of(atom).any(|e| !is_bridge[e.index()]);
        mol.atom_mut(atom).in_ring = in_ring;
    }
    info
}

fn ring_has_bond(ring: &[NodeIndex], a: NodeIndex, b: NodeIndex) -> bool {
    let len = ring.len();
    (0..len).any(|i| {
        let j = (i + 1) % len;
        (ring[i] == a && ring[j] == b) || (ring[i] == b && ring[j] == a)
    })
}

pub(crate) fn ring_edges<A, B>(mol: &Mol<A, B>, ring: &[NodeIndex]) -> Vec<EdgeIndex> {
    let len = ring.len();
    (0..len)
        .filter_map(|i| mol.bond_between(ring[i], ring[(i + 1) % len]))
        .collect()
}

/// Adds shortest-path cycles independent of `rings` until `target` rings
/// are present.
fn complete_ring_set<A, B>(mol: &Mol<A, B>, rings: &mut Vec<Vec<NodeIndex>>, target: usize) {
    let num_edges = mol.bond_count();
    let mut basis: Vec<Vec<u64>> = Vec::with_capacity(target);
    for ring in rings.iter() {
        try_add_to_basis(&mut basis, ring_to_edge_bitvector(ring, num_edges, mol));
    }
    for candidate in horton_candidates(mol) {
        if rings.len() >= target {
            break;
        }
        let candidate = normalize_ring(&candidate);
        if rings.contains(&candidate) {
            continue;
        }
        let bv = ring_to_edge_bitvector(&candidate, num_edges, mol);
        if bv.iter().all(|&w| w == 0) {
            continue;
        }
        if try_add_to_basis(&mut basis, bv) {
            rings.push(candidate);
        }
    }
}

/// Cycles formed by an edge `(u, v)` and shortest paths from some atom `w`
/// to both ends.
fn horton_candidates<A, B>(mol: &Mol<A, B>) -> Vec<Vec<NodeIndex>> {
    let n = mol.atom_count();
    let dist = distance_matrix(mol);
    let pred = all_pairs_predecessors(mol, n, &dist);

    let mut candidates: Vec<Vec<NodeIndex>> = Vec::new();

    for edge in mol.bonds() {
        let Some((u, v)) = mol.bond_endpoints(edge) else {
            continue;
        };
        for w_idx in 0..n {
            let w = NodeIndex::new(w_idx);
            let du = dist[w_idx][u.index()];
            let dv = dist[w_idx][v.index()];
            if du == usize::MAX || dv == usize::MAX {
                continue;
            }
            if du + dv + 1 < 3 {
                continue;
            }
            let path_u = reconstruct_path(&pred, w, u);
            let path_v = reconstruct_path(&pred, w, v);
            if path_u.is_empty() || path_v.is_empty() || paths_share_internal_node(&path_u, &path_v) {
                continue;
            }
            let mut ring = path_u;
            for &node in path_v[1..].iter().rev() {
                ring.push(node);
            }
            candidates.push(ring);
        }
    }

    candidates.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    candidates.dedup();
    candidates
}

fn all_pairs_predecessors<A, B>(
    mol: &Mol<A, B>,
    n: usize,
    dist: &[Vec<usize>],
) -> Vec<Vec<Option<NodeIndex>>> {
    let mut pred = vec![vec![None; n]; n];
    for src_idx in 0..n {
        let src = NodeIndex::new(src_idx);
        let mut queue = VecDeque::new();
        queue.push_back(src);
        let mut visited = vec![false; n];
        visited[src_idx] = true;
        while let Some(cur) = queue.pop_front() {
            for nb in mol.sorted_neighbors(cur) {
                if !visited[nb.index()]
                    && dist[src_idx][nb.index()] == dist[src_idx][cur.index()] + 1
                {
                    visited[nb.index()] = true;
                    pred[src_idx][nb.index()] = Some(cur);
                    queue.push_back(nb);
                }
            }
        }
    }
    pred
}

fn reconstruct_path(
    pred: &[Vec<Option<NodeIndex>>],
    src: NodeIndex,
    dst: NodeIndex,
) -> Vec<NodeIndex> {
    let mut path = vec![dst];
    let mut cur = dst;
    while cur != src {
        match pred[src.index()][cur.index()] {
            Some(p) => {
                path.push(p);
                cur = p;
            }
            None => return vec![],
        }
    }
    path.reverse();
    path
}

fn paths_share_internal_node(path_u: &[NodeIndex], path_v: &[NodeIndex]) -> bool {
    if path_u.len() < 2 || path_v.len() < 2 {
        return false;
    }
    path_u[1..].iter().any(|node| path_v[1..].contains(node))
}

fn ring_to_edge_bitvector<A, B>(ring: &[NodeIndex], num_edges: usize, mol: &Mol<A, B>) -> Vec<u64> {
    let mut bv = vec![0u64; num_edges.div_ceil(64)];
    for edge in ring_edges(mol, ring) {
        let idx = edge.index();
        bv[idx / 64] |= 1u64 << (idx % 64);
    }
    bv
}

fn try_add_to_basis(basis: &mut Vec<Vec<u64>>, candidate: Vec<u64>) -> bool {
    let mut v = candidate;
    for row in basis.iter() {
        if let Some(p) = leading_bit(row) {
            if v[p / 64] & (1u64 << (p % 64)) != 0 {
                xor_into(&mut v, row);
            }
        }
    }
    if v.iter().all(|&w| w == 0) {
        return false;
    }
    basis.push(v);
    true
}

fn leading_bit(bv: &[u64]) -> Option<usize> {
    bv.iter()
        .enumerate()
        .find(|(_, &word)| word != 0)
        .map(|(i, word)| i * 64 + word.trailing_zeros() as usize)
}

fn xor_into(a: &mut [u64], b: &[u64]) {
    for (aw, bw) in a.iter_mut().zip(b.iter()) {
        *aw ^= *bw;
    }
}

/// Rotates a cycle to start at its lowest atom and picks the direction
/// whose second atom is lower.
pub(crate) fn normalize_ring(ring: &[NodeIndex]) -> Vec<NodeIndex> {
    let Some(min_pos) = ring
        .iter()
        .enumerate()
        .min_by_key(|&(_, idx)| idx)
        .map(|(i, _)| i)
    else {
        return Vec::new();
    };

    let len = ring.len();
    let mut normalized: Vec<NodeIndex> = (0..len).map(|i| ring[(min_pos + i) % len]).collect();
    if len > 2 && normalized[1] > normalized[len - 1] {
        normalized[1..].reverse();
    }
    normalized
}

/// Groups rings that share at least one atom.
fn ring_systems(rings: &[Vec<NodeIndex>]) -> Vec<RingSystem> {
    let n = rings.len();
    let mut parent: Vec<usize> = (0..n).collect();
    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }
    for i in 0..n {
        for j in (i + 1)..n {
            if rings[i].iter().any(|a| rings[j].contains(a)) {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    parent[rj.max(ri)] = ri.min(rj);
                }
            }
        }
    }

    let mut systems: Vec<RingSystem> = Vec::new();
    let mut root_of_system: Vec<usize> = Vec::new();
    for i in 0..n {
        let root = find(&mut parent, i);
        match root_of_system.iter().position(|&r| r == root) {
            Some(s) => systems[s].rings.push(i),
            None => {
                root_of_system.push(root);
                systems.push(RingSystem {
                    rings: vec![i],
                    atoms: Vec::new(),
                    topology: FusionTopology::Isolated,
                });
            }
        }
    }
    for system in &mut systems {
        let mut atoms: Vec<NodeIndex> = system
            .rings
            .iter()
            .flat_map(|&r| rings[r].iter().copied())
            .collect();
        atoms.sort_unstable();
        atoms.dedup();
        system.atoms = atoms;
        system.topology = classify_topology(rings, &system.rings);
    }
    systems
}

fn shared_atoms(a: &[NodeIndex], b: &[NodeIndex]) -> Vec<NodeIndex> {
    a.iter().copied().filter(|x| b.contains(x)).collect()
}

/// Classifies a ring system from the pairwise atom sharing of its rings.
fn classify_topology(rings: &[Vec<NodeIndex>], members: &[usize]) -> FusionTopology {
    if members.len() < 2 {
        return FusionTopology::Isolated;
    }

    let mut fused: Vec<Vec<(usize, Vec<NodeIndex>)>> = vec![Vec::new(); members.len()];
    for (i, &ri) in members.iter().enumerate() {
        for (j, &rj) in members.iter().enumerate().skip(i + 1) {
            let shared = shared_atoms(&rings[ri], &rings[rj]);
            if shared.len() > 2 {
                return FusionTopology::Bridged;
            }
            if shared.len() == 2 {
                fused[i].push((j, shared.clone()));
                fused[j].push((i, shared));
            }
        }
    }

    let peri = members.iter().any(|&ri| {
        rings[ri].iter().any(|atom| {
            members
                .iter()
                .filter(|&&rj| rings[rj].contains(atom))
                .count()
                >= 3
        })
    });
    if peri {
        return FusionTopology::Peri;
    }
    if fused.iter().all(|f| f.is_empty()) {
        return FusionTopology::Spiro;
    }

    for (i, neighbors) in fused.iter().enumerate() {
        match neighbors.as_slice() {
            [] | [_] => {}
            [(_, first), (_, second)] => {
                if !fusion_bonds_opposite(&rings[members[i]], first, second) {
                    return FusionTopology::Angular;
                }
            }
            _ => return FusionTopology::Angular,
        }
    }
    FusionTopology::Linear
}

/// Whether two fusion bonds sit as far apart as the ring allows.
fn fusion_bonds_opposite(ring: &[NodeIndex], first: &[NodeIndex], second: &[NodeIndex]) -> bool {
    let len = ring.len();
    let positions = |pair: &[NodeIndex]| -> Vec<usize> {
        pair.iter()
            .filter_map(|a| ring.iter().position(|r| r == a))
            .collect()
    };
    let (p, q) = (positions(first), positions(second));
    if p.len() != 2 || q.len() != 2 {
        return false;
    }
    // Walk clockwise from the first bond and count atoms strictly between
    // the two bonds on each side.
    let start = if (p[0] + 1) % len == p[1] { p[1] } else { p[0] };
    let mut gap = 0;
    let mut i = (start + 1) % len;
    while !q.contains(&i) {
        gap += 1;
        i = (i + 1) % len;
        if gap > len {
            return false;
        }
    }
    let other_gap = len.saturating_sub(4).saturating_sub(gap);
    gap.abs_diff(other_gap) <= 1
}
