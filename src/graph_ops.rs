use std::collections::VecDeque;

use petgraph::graph::{EdgeIndex, NodeIndex};

use crate::bond::BondStereo;
use crate::canonical::{canonical_ordering, CanonOptions};
use crate::mol::{permutation_parity, Mol, Molecule};

pub fn distance_matrix<A, B>(mol: &Mol<A, B>) -> Vec<Vec<usize>> {
    let n = mol.atom_count();
    let mut dist = vec![vec![usize::MAX; n]; n];
    for start in mol.atoms() {
        let si = start.index();
        dist[si][si] = 0;
        let mut queue = VecDeque::new();
        queue.push_back(start);
        while let Some(current) = queue.pop_front() {
            let d = dist[si][current.index()];
            for neighbor in mol.neighbors(current) {
                if dist[si][neighbor.index()] == usize::MAX {
                    dist[si][neighbor.index()] = d + 1;
                    queue.push_back(neighbor);
                }
            }
        }
    }
    dist
}

/// Breadth-first shortest path, inclusive of both endpoints.
///
/// Neighbors are expanded in ascending index order so the returned path is
/// deterministic when several shortest paths exist.
pub fn shortest_path<A, B>(
    mol: &Mol<A, B>,
    from: NodeIndex,
    to: NodeIndex,
) -> Option<Vec<NodeIndex>> {
    if from == to {
        return Some(vec![from]);
    }
    let n = mol.atom_count();
    let mut pred = vec![None; n];
    let mut visited = vec![false; n];
    visited[from.index()] = true;
    let mut queue = VecDeque::new();
    queue.push_back(from);
    while let Some(current) = queue.pop_front() {
        for neighbor in mol.sorted_neighbors(current) {
            if visited[neighbor.index()] {
                continue;
            }
            visited[neighbor.index()] = true;
            pred[neighbor.index()] = Some(current);
            if neighbor == to {
                let mut path = vec![to];
                let mut node = to;
                while let Some(p) = pred[node.index()] {
                    path.push(p);
                    node = p;
                }
                path.reverse();
                return Some(path);
            }
            queue.push_back(neighbor);
        }
    }
    None
}

/// Connected components, each sorted by atom index, in order of their
/// lowest atom.
pub fn connected_components<A, B>(mol: &Mol<A, B>) -> Vec<Vec<NodeIndex>> {
    let n = mol.atom_count();
    let mut visited = vec![false; n];
    let mut components = Vec::new();
    for node in mol.atoms() {
        if visited[node.index()] {
            continue;
        }
        let mut component = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if visited[current.index()] {
                continue;
            }
            visited[current.index()] = true;
            component.push(current);
            for neighbor in mol.neighbors(current) {
                if !visited[neighbor.index()] {
                    stack.push(neighbor);
                }
            }
        }
        component.sort();
        components.push(component);
    }
    components
}

pub fn num_components<A, B>(mol: &Mol<A, B>) -> usize {
    connected_components(mol).len()
}

/// Cycle rank `E - V + C`: the number of independent rings.
pub fn cycle_rank<A, B>(mol: &Mol<A, B>) -> usize {
    (mol.bond_count() + num_components(mol)).saturating_sub(mol.atom_count())
}

/// Splits a molecule into one molecule per connected component.
pub fn get_fragments<A: Clone, B: Clone>(mol: &Mol<A, B>) -> Vec<Mol<A, B>> {
    let components = connected_components(mol);
    let mut fragments = Vec::with_capacity(components.len());
    for component in &components {
        let mut frag = Mol::new();
        let mut index_map = vec![NodeIndex::new(0); mol.atom_count()];
        for &old_idx in component {
            index_map[old_idx.index()] = frag.add_atom(mol.atom(old_idx).clone());
        }
        for &old_idx in component {
            for edge in mol.bonds_of(old_idx) {
                if let Some((a, b)) = mol.bond_endpoints(edge) {
                    let other = if a == old_idx { b } else { a };
                    if old_idx < other {
                        frag.add_bond(
                            index_map[old_idx.index()],
                            index_map[other.index()],
                            mol.bond(edge).clone(),
                        );
                    }
                }
            }
        }
        fragments.push(frag);
    }
    fragments
}

struct LowlinkFrame {
    node: NodeIndex,
    parent_edge: Option<EdgeIndex>,
    neighbors: Vec<(EdgeIndex, NodeIndex)>,
    next: usize,
    children: usize,
}

struct Lowlink {
    bridges: Vec<EdgeIndex>,
    articulation_points: Vec<NodeIndex>,
}

fn lowlink<A, B>(mol: &Mol<A, B>) -> Lowlink {
    let n = mol.atom_count();
    let mut disc = vec![usize::MAX; n];
    let mut low = vec![usize::MAX; n];
    let mut is_cut = vec![false; n];
    let mut bridges = Vec::new();
    let mut timer = 0usize;

    let frame = |node: NodeIndex, parent_edge: Option<EdgeIndex>| LowlinkFrame {
        node,
        parent_edge,
        neighbors: mol
            .bonds_of(node)
            .filter_map(|e| mol.other_end(e, node).map(|w| (e, w)))
            .collect(),
        next: 0,
        children: 0,
    };

    for root in mol.atoms() {
        if disc[root.index()] != usize::MAX {
            continue;
        }
        disc[root.index()] = timer;
        low[root.index()] = timer;
        timer += 1;
        let mut stack = vec![frame(root, None)];

        while let Some(top) = stack.last_mut() {
            if top.next < top.neighbors.len() {
                let (edge, w) = top.neighbors[top.next];
                top.next += 1;
                if Some(edge) == top.parent_edge {
                    continue;
                }
                let v = top.node;
                if disc[w.index()] == usize::MAX {
                    disc[w.index()] = timer;
                    low[w.index()] = timer;
                    timer += 1;
                    stack.push(frame(w, Some(edge)));
                } else {
                    low[v.index()] = low[v.index()].min(disc[w.index()]);
                }
                continue;
            }

            let done = match stack.pop() {
                Some(f) => f,
                None => break,
            };
            let v = done.node;
            match stack.last_mut() {
                Some(parent) => {
                    let p = parent.node;
                    low[p.index()] = low[p.index()].min(low[v.index()]);
                    parent.children += 1;
                    if low[v.index()] > disc[p.index()] {
                        if let Some(e) = done.parent_edge {
                            bridges.push(e);
                        }
                    }
                    if parent.parent_edge.is_some() && low[v.index()] >= disc[p.index()] {
                        is_cut[p.index()] = true;
                    }
                }
                None => {
                    if done.children > 1 {
                        is_cut[v.index()] = true;
                    }
                }
            }
        }
    }

    bridges.sort();
    Lowlink {
        bridges,
        articulation_points: mol.atoms().filter(|a| is_cut[a.index()]).collect(),
    }
}

/// Bonds whose removal disconnects their component. Every other bond lies
/// on at least one cycle.
pub fn bridges<A, B>(mol: &Mol<A, B>) -> Vec<EdgeIndex> {
    lowlink(mol).bridges
}

/// Atoms whose removal disconnects their component.
pub fn articulation_points<A, B>(mol: &Mol<A, B>) -> Vec<NodeIndex> {
    lowlink(mol).articulation_points
}

/// Enumerates simple cycles of at most `max_len` atoms using only bonds
/// accepted by `usable`.
///
/// Each cycle is reported once, starting at its lowest atom and walking
/// toward the smaller of that atom's two cycle neighbors. The search keeps
/// an explicit stack of frames rather than recursing, so deep or wide
/// graphs cannot exhaust the call stack.
pub fn simple_cycles<A, B, F>(mol: &Mol<A, B>, max_len: usize, usable: F) -> Vec<Vec<NodeIndex>>
where
    F: Fn(EdgeIndex) -> bool,
{
    let n = mol.atom_count();
    let mut cycles = Vec::new();
    if max_len < 3 {
        return cycles;
    }

    let next_atoms = |node: NodeIndex, start: NodeIndex| -> Vec<NodeIndex> {
        let mut out: Vec<NodeIndex> = mol
            .bonds_of(node)
            .filter(|&e| usable(e))
            .filter_map(|e| mol.other_end(e, node))
            .filter(|&w| w >= start)
            .collect();
        out.sort();
        out
    };

    let mut on_path = vec![false; n];
    for start in mol.atoms() {
        let first = next_atoms(start, start);
        if first.len() < 2 {
            continue;
        }
        let mut path = vec![start];
        on_path[start.index()] = true;
        let mut stack: Vec<(Vec<NodeIndex>, usize)> = vec![(first, 0)];

        while let Some((candidates, next)) = stack.last_mut() {
            if *next >= candidates.len() {
                stack.pop();
                if let Some(left) = path.pop() {
                    on_path[left.index()] = false;
                }
                continue;
            }
            let w = candidates[*next];
            *next += 1;
            let current = path[path.len() - 1];
            if w == start {
                if path.len() >= 3 && path[1] < current {
                    cycles.push(path.clone());
                }
            } else if !on_path[w.index()] && path.len() < max_len {
                on_path[w.index()] = true;
                path.push(w);
                stack.push((next_atoms(w, start), 0));
            }
        }
    }
    cycles
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenumberError {
    #[error("new_order length {got} != atom count {expected}")]
    LengthMismatch { expected: usize, got: usize },
    #[error("new_order is not a valid permutation")]
    InvalidPermutation,
}

fn validate_permutation(new_order: &[usize], n: usize) -> Result<(), RenumberError> {
    if new_order.len() != n {
        return Err(RenumberError::LengthMismatch {
            expected: n,
            got: new_order.len(),
        });
    }
    let mut seen = vec![false; n];
    for &idx in new_order {
        if idx >= n || seen[idx] {
            return Err(RenumberError::InvalidPermutation);
        }
        seen[idx] = true;
    }
    Ok(())
}

/// Builds a copy of `mol` whose atom `i` is the old atom `new_order[i]`.
///
/// Bonds are re-added in their original order. Double-bond stereo
/// references are remapped and tetrahedral parities are recomputed against
/// the new reference order, so the spatial configuration is unchanged.
pub fn renumber_atoms(mol: &Molecule, new_order: &[usize]) -> Result<Molecule, RenumberError> {
    let n = mol.atom_count();
    validate_permutation(new_order, n)?;

    let mut new_mol = Molecule::new();
    for &old_idx in new_order {
        new_mol.add_atom(mol.atom(NodeIndex::new(old_idx)).clone());
    }

    let mut old_to_new = vec![NodeIndex::new(0); n];
    for (new_idx, &old_idx) in new_order.iter().enumerate() {
        old_to_new[old_idx] = NodeIndex::new(new_idx);
    }

    for edge in mol.bonds() {
        if let Some((a, b)) = mol.bond_endpoints(edge) {
            let mut bond = mol.bond(edge).clone();
            bond.stereo = match bond.stereo {
                BondStereo::None => BondStereo::None,
                BondStereo::Cis(x, y) => {
                    BondStereo::Cis(old_to_new[x.index()], old_to_new[y.index()])
                }
                BondStereo::Trans(x, y) => {
                    BondStereo::Trans(old_to_new[x.index()], old_to_new[y.index()])
                }
            };
            new_mol.add_bond(old_to_new[a.index()], old_to_new[b.index()], bond);
        }
    }

    for old in mol.atoms() {
        if !mol.atom(old).chirality.is_specified() {
            continue;
        }
        let new = old_to_new[old.index()];
        let mapped: Vec<Option<NodeIndex>> = mol
            .stereo_reference(old)
            .into_iter()
            .map(|r| r.map(|a| old_to_new[a.index()]))
            .collect();
        let reference = new_mol.stereo_reference(new);
        if !permutation_parity(&mapped, &reference) {
            let atom = new_mol.atom_mut(new);
            atom.chirality = atom.chirality.inverted();
        }
    }

    Ok(new_mol)
}

/// Renumbers atoms into canonical rank order.
pub fn renumber_atoms_canonical(mol: &Molecule) -> Molecule {
    let ordering = canonical_ordering(mol, &CanonOptions::default());
    let order: Vec<usize> = ordering.order.iter().map(|a| a.index()).collect();
    match renumber_atoms(mol, &order) {
        Ok(renumbered) => renumbered,
        Err(_) => mol.clone(),
    }
}
