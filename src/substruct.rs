//! Subgraph isomorphism search.
//!
//! The core search is generic over the atom and bond types of both graphs
//! and takes its atom and bond predicates as closures over node and edge
//! indices. Query atoms are placed in a connected order (each atom after
//! the first of its component is adjacent to an already placed one), so
//! candidates come from the neighbors of a mapped atom instead of the whole
//! target. Mappings are returned as `(query, target)` pairs sorted by query
//! index.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use petgraph::graph::{EdgeIndex, NodeIndex};
use tracing::{debug, warn};

use crate::mol::Mol;
use crate::traits::{HasAromaticity, HasAtomicNum, HasBondOrder};

pub type AtomMapping = Vec<(NodeIndex, NodeIndex)>;

/// Limits and filters for a substructure search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MatchOptions {
    /// Report one mapping per distinct set of target atoms.
    pub unique: bool,
    pub max_matches: Option<usize>,
    /// Upper bound on candidate assignments tried.
    pub max_steps: Option<u64>,
    pub timeout: Option<Duration>,
    /// Check `@`/`@@` on SMARTS query atoms against the target's stored
    /// parity. Molecule-as-query searches ignore it.
    pub use_chirality: bool,
}

impl MatchOptions {
    pub fn with_unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn with_max_matches(mut self, max: usize) -> Self {
        self.max_matches = Some(max);
        self
    }

    pub fn with_max_steps(mut self, steps: u64) -> Self {
        self.max_steps = Some(steps);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_chirality(mut self, use_chirality: bool) -> Self {
        self.use_chirality = use_chirality;
        self
    }
}

/// Why a search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SearchStatus {
    /// Every mapping was enumerated.
    Complete,
    /// `max_matches` mappings were found.
    MatchLimit,
    StepLimit,
    TimeLimit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MatchResult {
    pub matches: Vec<AtomMapping>,
    pub status: SearchStatus,
    /// Candidate assignments tried.
    pub steps: u64,
}

impl MatchResult {
    /// Whether the search stopped before enumerating every mapping.
    pub fn is_partial(&self) -> bool {
        self.status != SearchStatus::Complete
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

/// Finds all mappings of `query` into `target` accepted by `atom_match`
/// and `bond_match`.
///
/// `atom_match(q, t)` receives a query atom and a candidate target atom;
/// `bond_match(qe, te)` a query bond and the target bond between the
/// mapped endpoints. An empty query yields a single empty mapping.
pub fn find_matches_by<A1, B1, A2, B2, FA, FB>(
    target: &Mol<A1, B1>,
    query: &Mol<A2, B2>,
    atom_match: FA,
    bond_match: FB,
    options: &MatchOptions,
) -> MatchResult
where
    FA: Fn(NodeIndex, NodeIndex) -> bool,
    FB: Fn(EdgeIndex, EdgeIndex) -> bool,
{
    search(target, query, atom_match, bond_match, |_| true, options)
}

/// [`find_matches_by`] with a final filter on complete mappings. Rejected
/// mappings do not count toward `max_matches`.
pub(crate) fn search<A1, B1, A2, B2, FA, FB, FM>(
    target: &Mol<A1, B1>,
    query: &Mol<A2, B2>,
    atom_match: FA,
    bond_match: FB,
    accept: FM,
    options: &MatchOptions,
) -> MatchResult
where
    FA: Fn(NodeIndex, NodeIndex) -> bool,
    FB: Fn(EdgeIndex, EdgeIndex) -> bool,
    FM: Fn(&AtomMapping) -> bool,
{
    let mut state = SearchState {
        target,
        query,
        atom_match,
        bond_match,
        plan: expansion_order(query),
        assigned: vec![None; query.atom_count()],
        used: vec![false; target.atom_count()],
    };
    let result = state.run(&accept, options);
    match result.status {
        SearchStatus::StepLimit | SearchStatus::TimeLimit => warn!(
            status = ?result.status,
            steps = result.steps,
            matches = result.matches.len(),
            "substructure search stopped early"
        ),
        _ => debug!(
            query_atoms = query.atom_count(),
            target_atoms = target.atom_count(),
            matches = result.matches.len(),
            steps = result.steps,
            "substructure search finished"
        ),
    }
    result
}

/// Query atoms in placement order, each with the already placed neighbor
/// its candidates are drawn from (`None` for the first atom of a
/// component).
struct Plan {
    order: Vec<NodeIndex>,
    parents: Vec<Option<NodeIndex>>,
}

/// Starts each component at its highest-degree atom and then repeatedly
/// takes the unplaced atom with the most placed neighbors, breaking ties
/// by degree and then by lowest index.
fn expansion_order<A, B>(query: &Mol<A, B>) -> Plan {
    let n = query.atom_count();
    let mut position: Vec<Option<usize>> = vec![None; n];
    let mut links = vec![0usize; n];
    let mut order = Vec::with_capacity(n);
    let mut parents = Vec::with_capacity(n);

    while order.len() < n {
        let unplaced = query.atoms().filter(|a| position[a.index()].is_none());
        let next = unplaced
            .max_by_key(|&a| {
                (
                    links[a.index()],
                    query.degree(a),
                    std::cmp::Reverse(a.index()),
                )
            });
        let Some(next) = next else {
            break;
        };
        let parent = query
            .neighbors(next)
            .filter_map(|nb| position[nb.index()].map(|p| (p, nb)))
            .min()
            .map(|(_, nb)| nb);
        position[next.index()] = Some(order.len());
        order.push(next);
        parents.push(parent);
        for nb in query.neighbors(next) {
            links[nb.index()] += 1;
        }
    }
    Plan { order, parents }
}

struct Frame {
    candidates: Vec<NodeIndex>,
    next: usize,
    /// Target atom currently assigned at this depth.
    current: Option<NodeIndex>,
}

struct SearchState<'a, A1, B1, A2, B2, FA, FB> {
    target: &'a Mol<A1, B1>,
    query: &'a Mol<A2, B2>,
    atom_match: FA,
    bond_match: FB,
    plan: Plan,
    assigned: Vec<Option<NodeIndex>>,
    used: Vec<bool>,
}

impl<A1, B1, A2, B2, FA, FB> SearchState<'_, A1, B1, A2, B2, FA, FB>
where
    FA: Fn(NodeIndex, NodeIndex) -> bool,
    FB: Fn(EdgeIndex, EdgeIndex) -> bool,
{
    fn run(&mut self, accept: &impl Fn(&AtomMapping) -> bool, options: &MatchOptions) -> MatchResult {
        let depth_total = self.plan.order.len();
        if depth_total == 0 {
            return MatchResult {
                matches: vec![Vec::new()],
                status: SearchStatus::Complete,
                steps: 0,
            };
        }
        if depth_total > self.target.atom_count() || options.max_matches == Some(0) {
            let status = if options.max_matches == Some(0) {
                SearchStatus::MatchLimit
            } else {
                SearchStatus::Complete
            };
            return MatchResult {
                matches: Vec::new(),
                status,
                steps: 0,
            };
        }

        let started = Instant::now();
        let mut matches = Vec::new();
        let mut seen: HashSet<Vec<NodeIndex>> = HashSet::new();
        let mut steps: u64 = 0;
        let mut status = SearchStatus::Complete;
        let mut stack = vec![self.frame(0)];

        while !stack.is_empty() {
            let depth = stack.len() - 1;
            let Some(frame) = stack.last_mut() else { break };
            let q = self.plan.order[depth];
            if let Some(t) = frame.current.take() {
                self.used[t.index()] = false;
                self.assigned[q.index()] = None;
            }
            let Some(&t) = frame.candidates.get(frame.next) else {
                stack.pop();
                continue;
            };
            frame.next += 1;

            steps += 1;
            if options.max_steps.is_some_and(|max| steps > max) {
                status = SearchStatus::StepLimit;
                break;
            }
            if steps.is_multiple_of(256)
                && options.timeout.is_some_and(|limit| started.elapsed() >= limit)
            {
                status = SearchStatus::TimeLimit;
                break;
            }

            if !self.is_feasible(q, t) {
                continue;
            }
            frame.current = Some(t);
            self.used[t.index()] = true;
            self.assigned[q.index()] = Some(t);

            if depth + 1 < depth_total {
                let next = self.frame(depth + 1);
                stack.push(next);
                continue;
            }

            let mapping: AtomMapping = self
                .assigned
                .iter()
                .enumerate()
                .filter_map(|(i, t)| t.map(|t| (NodeIndex::new(i), t)))
                .collect();
            if !accept(&mapping) {
                continue;
            }
            if options.unique {
                let mut key: Vec<NodeIndex> = mapping.iter().map(|&(_, t)| t).collect();
                key.sort_unstable();
                if !seen.insert(key) {
                    continue;
                }
            }
            matches.push(mapping);
            if options.max_matches.is_some_and(|max| matches.len() >= max) {
                status = SearchStatus::MatchLimit;
                break;
            }
        }

        MatchResult {
            matches,
            status,
            steps,
        }
    }

    fn frame(&self, depth: usize) -> Frame {
        let candidates = match self.plan.parents[depth].and_then(|p| self.assigned[p.index()]) {
            Some(anchor) => {
                let mut nbs: Vec<NodeIndex> = self
                    .target
                    .neighbors(anchor)
                    .filter(|nb| !self.used[nb.index()])
                    .collect();
                nbs.sort_unstable();
                nbs
            }
            None => self.target.atoms().filter(|t| !self.used[t.index()]).collect(),
        };
        Frame {
            candidates,
            next: 0,
            current: None,
        }
    }

    fn is_feasible(&self, q: NodeIndex, t: NodeIndex) -> bool {
        if self.used[t.index()] || self.target.degree(t) < self.query.degree(q) {
            return false;
        }
        if !(self.atom_match)(q, t) {
            return false;
        }

        let mut unmapped = 0;
        for q_edge in self.query.bonds_of(q) {
            let Some(q_nb) = self.query.other_end(q_edge, q) else {
                continue;
            };
            match self.assigned[q_nb.index()] {
                Some(t_nb) => {
                    let Some(t_edge) = self.target.bond_between(t, t_nb) else {
                        return false;
                    };
                    if !(self.bond_match)(q_edge, t_edge) {
                        return false;
                    }
                }
                None => unmapped += 1,
            }
        }

        // every unmapped query neighbor still needs its own free target neighbor
        let free = self
            .target
            .neighbors(t)
            .filter(|nb| !self.used[nb.index()])
            .count();
        unmapped <= free
    }
}

fn default_atom_match<A: HasAtomicNum + HasAromaticity>(target: &A, query: &A) -> bool {
    if target.atomic_num() != query.atomic_num() {
        return false;
    }
    !(query.is_aromatic() && !target.is_aromatic())
}

fn default_bond_match<A: HasAromaticity, B: HasBondOrder>(
    target: &Mol<A, B>,
    query: &Mol<A, B>,
    q_edge: EdgeIndex,
    t_edge: EdgeIndex,
) -> bool {
    let both_aromatic = |mol: &Mol<A, B>, edge: EdgeIndex| {
        mol.bond_endpoints(edge)
            .is_some_and(|(a, b)| mol.atom(a).is_aromatic() && mol.atom(b).is_aromatic())
    };
    if both_aromatic(query, q_edge) && both_aromatic(target, t_edge) {
        return true;
    }
    target.bond(t_edge).bond_order() == query.bond(q_edge).bond_order()
}

/// Searches for `query` as a plain molecule: elements must agree, an
/// aromatic query atom needs an aromatic target atom, and bond orders must
/// agree unless both bonds join aromatic atoms.
pub fn find_substruct_matches<A, B>(target: &Mol<A, B>, query: &Mol<A, B>, options: &MatchOptions) -> MatchResult
where
    A: HasAtomicNum + HasAromaticity,
    B: HasBondOrder,
{
    find_matches_by(
        target,
        query,
        |q, t| default_atom_match(target.atom(t), query.atom(q)),
        |qe, te| default_bond_match(target, query, qe, te),
        options,
    )
}

pub fn has_substruct_match<A, B>(target: &Mol<A, B>, query: &Mol<A, B>) -> bool
where
    A: HasAtomicNum + HasAromaticity,
    B: HasBondOrder,
{
    get_substruct_match(target, query).is_some()
}

pub fn get_substruct_match<A, B>(target: &Mol<A, B>, query: &Mol<A, B>) -> Option<AtomMapping>
where
    A: HasAtomicNum + HasAromaticity,
    B: HasBondOrder,
{
    let options = MatchOptions::default().with_max_matches(1);
    find_substruct_matches(target, query, &options).matches.into_iter().next()
}

pub fn get_substruct_matches<A, B>(target: &Mol<A, B>, query: &Mol<A, B>) -> Vec<AtomMapping>
where
    A: HasAtomicNum + HasAromaticity,
    B: HasBondOrder,
{
    find_substruct_matches(target, query, &MatchOptions::default()).matches
}

/// All mappings under caller-supplied atom and bond predicates, given the
/// target item first.
pub fn get_substruct_matches_with<A1, B1, A2, B2>(
    target: &Mol<A1, B1>,
    query: &Mol<A2, B2>,
    atom_match: impl Fn(&A1, &A2) -> bool,
    bond_match: impl Fn(&B1, &B2) -> bool,
) -> Vec<AtomMapping> {
    find_matches_by(
        target,
        query,
        |q, t| atom_match(target.atom(t), query.atom(q)),
        |qe, te| bond_match(target.bond(te), query.bond(qe)),
        &MatchOptions::default(),
    )
    .matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smiles::from_smiles;
    use crate::{Atom, Bond, BondOrder, Molecule};

    fn mol(smiles: &str) -> Molecule {
        from_smiles(smiles).unwrap_or_else(|e| panic!("bad SMILES {smiles:?}: {e}"))
    }

    #[test]
    fn ethanol_contains_cc() {
        let target = mol("CCO");
        let query = mol("CC");
        assert!(has_substruct_match(&target, &query));
        let m = get_substruct_match(&target, &query).unwrap();
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn methane_does_not_contain_cc() {
        let target = mol("C");
        let query = mol("CC");
        assert!(!has_substruct_match(&target, &query));
        assert_eq!(get_substruct_match(&target, &query), None);
        assert!(get_substruct_matches(&target, &query).is_empty());
    }

    #[test]
    fn propane_cc_matches() {
        assert_eq!(get_substruct_matches(&mol("CCC"), &mol("CC")).len(), 4);
    }

    #[test]
    fn cyclohexane_cc_matches_cover_all_edges() {
        let target = mol("C1CCCCC1");
        let matches = get_substruct_matches(&target, &mol("CC"));
        assert_eq!(matches.len(), 12);
        for mapping in &matches {
            assert!(target.bond_between(mapping[0].1, mapping[1].1).is_some());
        }
    }

    #[test]
    fn benzene_automorphisms() {
        let target = mol("c1ccccc1");
        let matches = get_substruct_matches(&target, &mol("c1ccccc1"));
        assert_eq!(matches.len(), 12);
        for (i, a) in matches.iter().enumerate() {
            for b in matches.iter().skip(i + 1) {
                assert_ne!(a, b, "duplicate mapping found");
            }
        }
    }

    #[test]
    fn empty_query_matches_anything() {
        let target = mol("CCO");
        let all = get_substruct_matches(&target, &Molecule::new());
        assert_eq!(all, vec![Vec::new()]);
        assert!(has_substruct_match(&Molecule::new(), &Molecule::new()));
        assert!(!has_substruct_match(&Molecule::new(), &mol("C")));
    }

    #[test]
    fn single_atom_query() {
        let target = mol("CCO");
        let matches = get_substruct_matches(&target, &mol("O"));
        assert_eq!(matches.len(), 1);
        let (q, t) = matches[0][0];
        assert_eq!(q, NodeIndex::new(0));
        assert_eq!(target.atom(t).atomic_num, 8);
    }

    #[test]
    fn bond_orders_must_agree() {
        assert!(has_substruct_match(&mol("C=C"), &mol("C=C")));
        assert!(!has_substruct_match(&mol("CC"), &mol("C=C")));
        assert!(!has_substruct_match(&mol("C=C"), &mol("CC")));
        assert!(has_substruct_match(&mol("C#N"), &mol("C#N")));
        assert!(!has_substruct_match(&mol("CN"), &mol("C#N")));
    }

    #[test]
    fn aromatic_query_needs_aromatic_target() {
        assert!(!has_substruct_match(&mol("C1CCCCC1"), &mol("c1ccccc1")));
        assert!(has_substruct_match(&mol("c1ccc2ccccc2c1"), &mol("c1ccccc1")));
        // Kekulé input is perceived aromatic on parse
        assert!(has_substruct_match(&mol("C1=CC=CC=C1"), &mol("c1ccccc1")));
    }

    #[test]
    fn mappings_sorted_by_query_index() {
        let target = mol("OCC");
        let query = mol("CCO");
        let m = get_substruct_match(&target, &query).unwrap();
        let q: Vec<usize> = m.iter().map(|(q, _)| q.index()).collect();
        assert_eq!(q, vec![0, 1, 2]);
        for &(q, t) in &m {
            assert_eq!(query.atom(q).atomic_num, target.atom(t).atomic_num);
        }
    }

    #[test]
    fn custom_matchers_ignore_bond_order() {
        let matches = get_substruct_matches_with(
            &mol("C=C"),
            &mol("CC"),
            |t: &Atom, q: &Atom| t.atomic_num == q.atomic_num,
            |_t: &Bond, _q: &Bond| true,
        );
        assert_eq!(matches.len(), 2);

        let phenol = get_substruct_matches_with(
            &mol("c1ccc(O)cc1"),
            &mol("OC"),
            |t: &Atom, q: &Atom| t.atomic_num == q.atomic_num,
            |t: &Bond, _q: &Bond| t.order == BondOrder::Single,
        );
        assert_eq!(phenol.len(), 1);
    }

    #[test]
    fn disconnected_query_and_target() {
        let target = mol("[Na+].[Cl-]");
        let matches = get_substruct_matches(&target, &mol("[Na+]"));
        assert_eq!(matches.len(), 1);
        let both = get_substruct_matches(&mol("CC.O"), &mol("C.O"));
        assert_eq!(both.len(), 2);
    }

    #[test]
    fn unique_collapses_automorphisms() {
        let options = MatchOptions::default().with_unique(true);
        let result = find_substruct_matches(&mol("c1ccccc1"), &mol("c1ccccc1"), &options);
        assert_eq!(result.len(), 1);
        assert_eq!(result.status, SearchStatus::Complete);
        let propane = find_substruct_matches(&mol("CCC"), &mol("CC"), &options);
        assert_eq!(propane.len(), 2);
    }

    #[test]
    fn match_limit() {
        let options = MatchOptions::default().with_max_matches(3);
        let result = find_substruct_matches(&mol("C1CCCCC1"), &mol("CC"), &options);
        assert_eq!(result.len(), 3);
        assert_eq!(result.status, SearchStatus::MatchLimit);
        assert!(result.is_partial());
    }

    #[test]
    fn step_limit() {
        let options = MatchOptions::default().with_max_steps(5);
        let result = find_substruct_matches(&mol("CCCCCCCCCC"), &mol("CCCC"), &options);
        assert_eq!(result.status, SearchStatus::StepLimit);
        assert!(result.steps <= 6);
        for mapping in &result.matches {
            assert_eq!(mapping.len(), 4);
        }
    }

    #[test]
    fn time_limit() {
        let chain = "C".repeat(40);
        let options = MatchOptions::default().with_timeout(Duration::ZERO);
        let result = find_substruct_matches(&mol(&chain), &mol("CCCCCC"), &options);
        assert_eq!(result.status, SearchStatus::TimeLimit);
        assert!(result.is_partial());
    }

    #[test]
    fn complete_search_counts_steps() {
        let result = find_substruct_matches(&mol("CCO"), &mol("CO"), &MatchOptions::default());
        assert_eq!(result.status, SearchStatus::Complete);
        assert!(result.steps > 0);
        assert!(!result.is_partial());
    }

    #[test]
    fn backtracks_out_of_dead_ends() {
        // every C-C pair must be tried before the O is found
        let result = find_substruct_matches(&mol("CCCCO"), &mol("CCO"), &MatchOptions::default());
        assert_eq!(result.status, SearchStatus::Complete);
        assert_eq!(result.len(), 1);
        let mapping = &result.matches[0];
        assert_eq!(mapping[2], (NodeIndex::new(2), NodeIndex::new(4)));
        assert!(!has_substruct_match(&mol("CC(C)C"), &mol("CC(C)(C)C")));
    }

    #[test]
    fn expansion_order_is_connected() {
        let query = mol("CC(C)C(C)(C)CO");
        let plan = expansion_order(&query);
        assert_eq!(plan.order.len(), query.atom_count());
        assert_eq!(plan.order[0], NodeIndex::new(3));
        for (i, parent) in plan.parents.iter().enumerate().skip(1) {
            let parent = parent.expect("connected query");
            assert!(plan.order[..i].contains(&parent));
            assert!(query.bond_between(parent, plan.order[i]).is_some());
        }
    }
}
