//! SMARTS query compilation and matching.
//!
//! [`from_smarts`] compiles a pattern into a [`Pattern`] whose atoms and
//! bonds carry predicate trees. Matching runs the generic search from
//! [`crate::substruct`] with predicates evaluated against a per-target
//! [`MatchContext`]; recursive `$(...)` environments are resolved to sets
//! of anchor atoms before the outer search starts.

mod error;
mod parser;
pub mod query;
mod writer;

pub use error::SmartsError;
pub use query::{AtomExpr, BondExpr, MatchContext, Pattern, RecursiveQuery};
pub use writer::to_smarts;

use petgraph::graph::NodeIndex;
use tracing::debug;

use crate::mol::{permutation_parity, Molecule};
use crate::rings::RingInfo;
use crate::substruct::{self, AtomMapping, MatchOptions, MatchResult};

use query::stereo_reference;

/// Compiles a SMARTS string. Any syntax error rejects the whole pattern.
pub fn from_smarts(s: &str) -> Result<Pattern, SmartsError> {
    let pattern = parser::parse(s)?;
    debug!(
        atoms = pattern.atom_count(),
        bonds = pattern.bond_count(),
        "compiled SMARTS"
    );
    Ok(pattern)
}

/// Finds mappings of `query` into `target`, perceiving rings of the target
/// first.
///
/// The target's aromaticity flags are used as stored; molecules from
/// [`crate::from_smiles`] are already perceived.
pub fn find_smarts_matches(target: &Molecule, query: &Pattern, options: &MatchOptions) -> MatchResult {
    let rings = RingInfo::perceive(target);
    find_smarts_matches_with_rings(target, &rings, query, options)
}

/// [`find_smarts_matches`] with rings the caller already perceived.
pub fn find_smarts_matches_with_rings(
    target: &Molecule,
    rings: &RingInfo,
    query: &Pattern,
    options: &MatchOptions,
) -> MatchResult {
    let mut ctx = MatchContext::new(target, rings);
    resolve_recursive(&mut ctx, query);
    search_pattern(&ctx, query, options)
}

pub fn has_smarts_match(target: &Molecule, query: &Pattern) -> bool {
    get_smarts_match(target, query).is_some()
}

pub fn get_smarts_match(target: &Molecule, query: &Pattern) -> Option<AtomMapping> {
    let options = MatchOptions::default().with_max_matches(1);
    find_smarts_matches(target, query, &options).matches.into_iter().next()
}

pub fn get_smarts_matches(target: &Molecule, query: &Pattern) -> Vec<AtomMapping> {
    find_smarts_matches(target, query, &MatchOptions::default()).matches
}

fn search_pattern(ctx: &MatchContext, query: &Pattern, options: &MatchOptions) -> MatchResult {
    let centers: Vec<NodeIndex> = if options.use_chirality {
        query
            .atoms()
            .filter(|&q| query.atom(q).chirality().is_specified())
            .collect()
    } else {
        Vec::new()
    };
    substruct::search(
        ctx.mol,
        query,
        |q, t| query.atom(q).matches(ctx, t),
        |qe, te| query.bond(qe).matches(ctx, te),
        |mapping| centers.iter().all(|&q| chirality_holds(ctx.mol, query, mapping, q)),
        options,
    )
}

/// Computes the anchor set of every recursive environment reachable from
/// `pattern`, innermost first. Environments are keyed by id, so ids must be
/// unique across the outermost pattern.
fn resolve_recursive(ctx: &mut MatchContext, pattern: &Pattern) {
    for atom in pattern.atoms() {
        for query in pattern.atom(atom).recursive_queries() {
            if ctx.recursive.contains_key(&query.id) {
                continue;
            }
            resolve_recursive(ctx, &query.pattern);
            let anchors = anchors_of(ctx, &query.pattern);
            ctx.recursive.insert(query.id, anchors);
        }
    }
}

/// Target atoms that can host the first atom of `pattern` in some match.
fn anchors_of(ctx: &MatchContext, pattern: &Pattern) -> Vec<bool> {
    let mut anchors = vec![false; ctx.mol.atom_count()];
    let first = NodeIndex::new(0);
    if pattern.is_empty() {
        return anchors;
    }
    let options = MatchOptions::default().with_max_matches(1);
    for anchor in ctx.mol.atoms() {
        if !pattern.atom(first).matches(ctx, anchor) {
            continue;
        }
        let found = substruct::find_matches_by(
            ctx.mol,
            pattern,
            |q, t| (q != first || t == anchor) && pattern.atom(q).matches(ctx, t),
            |qe, te| pattern.bond(qe).matches(ctx, te),
            &options,
        );
        anchors[anchor.index()] = !found.is_empty();
    }
    anchors
}

/// Whether the target atom mapped from query atom `q` has the parity the
/// query asks for.
///
/// The query's reference order is translated through the mapping and
/// compared with the target's. A query center with three substituents
/// against a target with four has the unmentioned target substituent take
/// the leading place; a required hydrogen on the query stands for an
/// explicit hydrogen atom on the target. Centers with fewer than three
/// query substituents always pass.
fn chirality_holds(target: &Molecule, query: &Pattern, mapping: &AtomMapping, q: NodeIndex) -> bool {
    let lookup = |qn: NodeIndex| mapping.get(qn.index()).map(|&(_, t)| t);
    let Some(t) = lookup(q) else {
        return false;
    };
    let stored = target.atom(t).chirality;
    if !stored.is_specified() {
        return false;
    }
    let q_ref = stereo_reference(query, q);
    if q_ref.len() < 3 {
        return true;
    }

    let mut mapped: Vec<Option<NodeIndex>> = Vec::with_capacity(4);
    for entry in &q_ref {
        match entry {
            Some(qn) => match lookup(*qn) {
                Some(tn) => mapped.push(Some(tn)),
                None => return false,
            },
            None => mapped.push(None),
        }
    }
    let t_ref = target.stereo_reference(t);
    let missing: Vec<Option<NodeIndex>> = t_ref.iter().filter(|r| !mapped.contains(r)).copied().collect();

    if mapped.len() + 1 == t_ref.len() && missing.len() == 1 {
        mapped.insert(0, missing[0]);
    } else if mapped.len() == t_ref.len() && missing.len() == 1 {
        if let Some(slot) = mapped.iter().position(|r| !t_ref.contains(r)) {
            mapped[slot] = missing[0];
        }
    }
    if mapped.len() != t_ref.len() || t_ref.iter().any(|r| !mapped.contains(r)) {
        return false;
    }

    let wanted = query.atom(q).chirality();
    permutation_parity(&mapped, &t_ref) == (wanted == stored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::Chirality;
    use crate::smiles::from_smiles;
    use crate::substruct::SearchStatus;

    fn mol(smiles: &str) -> Molecule {
        from_smiles(smiles).unwrap_or_else(|e| panic!("bad SMILES {smiles:?}: {e}"))
    }

    fn smarts(s: &str) -> Pattern {
        from_smarts(s).unwrap_or_else(|e| panic!("bad SMARTS {s:?}: {e}"))
    }

    fn count(target: &str, query: &str) -> usize {
        get_smarts_matches(&mol(target), &smarts(query)).len()
    }

    fn unique_count(target: &str, query: &str) -> usize {
        let options = MatchOptions::default().with_unique(true);
        find_smarts_matches(&mol(target), &smarts(query), &options).len()
    }

    fn chiral(target: &str, query: &str) -> bool {
        let options = MatchOptions::default().with_chirality(true).with_max_matches(1);
        !find_smarts_matches(&mol(target), &smarts(query), &options).is_empty()
    }

    #[test]
    fn parse_atomic_num() {
        let q = smarts("[#6]");
        assert_eq!(q.atom_count(), 1);
        assert!(matches!(
            q.atom(NodeIndex::new(0)),
            AtomExpr::Element {
                atomic_num: 6,
                aromatic: None
            }
        ));
    }

    #[test]
    fn parse_wildcards() {
        assert!(matches!(smarts("*").atom(NodeIndex::new(0)), AtomExpr::True));
        assert!(matches!(smarts("[*]").atom(NodeIndex::new(0)), AtomExpr::True));
        assert!(matches!(smarts("a").atom(NodeIndex::new(0)), AtomExpr::Aromatic));
        assert!(matches!(smarts("A").atom(NodeIndex::new(0)), AtomExpr::Aliphatic));
    }

    #[test]
    fn parse_high_and_explicit() {
        let q = smarts("[c,n&H1]");
        let AtomExpr::Or(parts) = q.atom(NodeIndex::new(0)) else {
            panic!("expected Or");
        };
        assert_eq!(parts.len(), 2);
        let AtomExpr::And(inner) = &parts[1] else {
            panic!("expected And");
        };
        assert_eq!(inner[1], AtomExpr::TotalHCount(1));
    }

    #[test]
    fn parse_default_bond() {
        let q = smarts("CC");
        let edge = q.bonds().next().unwrap();
        assert_eq!(*q.bond(edge), BondExpr::SingleOrAromatic);
        let q = smarts("C~C");
        let edge = q.bonds().next().unwrap();
        assert_eq!(*q.bond(edge), BondExpr::True);
    }

    #[test]
    fn element_and_aromaticity() {
        assert_eq!(count("CC", "[#6]"), 2);
        assert_eq!(count("CCO", "[#6]"), 2);
        assert_eq!(count("c1ccncc1", "[#7]"), 1);
        assert_eq!(count("c1ccncc1", "n"), 1);
        assert_eq!(count("c1ccncc1", "N"), 0);
        assert_eq!(count("c1ccccc1", "[a]"), 6);
        assert_eq!(count("C1CCCCC1", "[a]"), 0);
        assert_eq!(count("C1CCCCC1", "[A]"), 6);
        assert_eq!(count("CCO", "*"), 3);
    }

    #[test]
    fn counting_primitives() {
        assert_eq!(count("CCC", "[D2]"), 1);
        assert_eq!(count("CCC", "[D1]"), 2);
        assert_eq!(count("C", "[v4]"), 1);
        assert_eq!(count("C", "[X4]"), 1);
        assert_eq!(count("CCO", "[H1]"), 1);
        assert_eq!(count("CCO", "[H3]"), 1);
        assert_eq!(count("CC=O", "[h]"), 2);
        assert_eq!(count("c1ccccc1", "[v4]"), 6);
        assert_eq!(count("c1cc[nH]c1", "[v3]"), 1);
    }

    #[test]
    fn ring_primitives() {
        assert_eq!(count("C1CCCCC1", "[R]"), 6);
        assert_eq!(count("CC1CCCCC1", "[R0]"), 1);
        assert_eq!(count("C1CCCCC1", "[r6]"), 6);
        assert_eq!(count("c1ccc2ccccc2c1", "[R2]"), 2);
        assert_eq!(count("c1ccc2ccccc2c1", "[x3]"), 2);
        assert_eq!(count("C1CC2CCCCC2C1", "[r5]"), 5);
        assert_eq!(count("CC1CCCCC1", "[C;R]"), 6);
    }

    #[test]
    fn charges_and_isotopes() {
        assert!(has_smarts_match(&mol("[Na+]"), &smarts("[+1]")));
        assert!(has_smarts_match(&mol("[Cl-]"), &smarts("[-1]")));
        assert!(has_smarts_match(&mol("[Na+]"), &smarts("[Na+]")));
        assert!(!has_smarts_match(&mol("[Na]"), &smarts("[Na+]")));
        assert!(has_smarts_match(&mol("[13CH4]"), &smarts("[13C]")));
        assert!(!has_smarts_match(&mol("C"), &smarts("[13C]")));
    }

    #[test]
    fn logical_operators() {
        assert_eq!(count("CN", "[C,N]"), 2);
        assert_eq!(count("CCO", "[!C]"), 1);
        assert_eq!(count("OCC=O", "[O;!H1]"), 1);
        assert_eq!(count("CC(N)C=O", "[C,N;!R;H2,H3]"), 2);
    }

    #[test]
    fn bond_primitives() {
        assert!(has_smarts_match(&mol("c1ccccc1"), &smarts("c:c")));
        assert!(has_smarts_match(&mol("c1ccccc1"), &smarts("cc")));
        assert!(!has_smarts_match(&mol("c1ccccc1"), &smarts("c-c")));
        assert!(has_smarts_match(&mol("CC"), &smarts("C-C")));
        assert!(has_smarts_match(&mol("CC"), &smarts("C~C")));
        assert!(has_smarts_match(&mol("C=C"), &smarts("C=C")));
        assert!(!has_smarts_match(&mol("CC"), &smarts("C=C")));
        assert!(has_smarts_match(&mol("C1CCCCC1"), &smarts("C@C")));
        assert!(!has_smarts_match(&mol("CCCC"), &smarts("C@C")));
        assert_eq!(unique_count("c1ccccc1-c1ccccc1", "c!@c"), 1);
        assert_eq!(unique_count("c1ccccc1-c1ccccc1", "c-,:c"), 13);
    }

    #[test]
    fn ring_closure_patterns() {
        assert!(has_smarts_match(&mol("C1CC1"), &smarts("C1CC1")));
        assert!(has_smarts_match(&mol("c1ccccc1"), &smarts("c1ccccc1")));
        assert!(!has_smarts_match(&mol("C1CCCC1"), &smarts("C1CCCCC1")));
        assert_eq!(unique_count("c1ccc2ccccc2c1", "c1ccccc1"), 2);
    }

    #[test]
    fn recursive_environments() {
        assert!(has_smarts_match(&mol("Oc1ccccc1"), &smarts("[$([OH])]")));
        assert_eq!(count("c1ccccc1", "[$(cc)]"), 6);
        // carbon attached to a carbonyl
        assert_eq!(count("CC(=O)CC", "[C;$(C[CX3]=O)]"), 2);
        // nested environments
        assert_eq!(count("NCC(=O)O", "[$(C[$(C=O)])]"), 1);
        assert_eq!(count("CCO", "[!$(C)]"), 1);
    }

    #[test]
    fn functional_groups() {
        let acid = smarts("[CX3](=O)[OX2H1]");
        assert!(has_smarts_match(&mol("CC(=O)O"), &acid));
        assert!(!has_smarts_match(&mol("CC(=O)OC"), &acid));
        let amide = smarts("[NX3][CX3](=[OX1])");
        assert!(has_smarts_match(&mol("CC(=O)N"), &amide));
        let phenol = smarts("[OX2H]c1ccccc1");
        assert!(has_smarts_match(&mol("Oc1ccccc1"), &phenol));
    }

    #[test]
    fn disconnected_query() {
        assert!(has_smarts_match(&mol("CC.O"), &smarts("C.O")));
        assert!(!has_smarts_match(&mol("CC"), &smarts("C.O")));
    }

    #[test]
    fn explicit_hydrogen_atoms() {
        assert!(!has_smarts_match(&mol("C"), &smarts("[H]")));
        assert!(has_smarts_match(&mol("[H]C([H])([H])[H]"), &smarts("[#1]")));
        assert_eq!(count("[H]OC", "[OH1]"), 1);
    }

    #[test]
    fn limits_are_reported() {
        let options = MatchOptions::default().with_max_matches(2);
        let result = find_smarts_matches(&mol("CCCC"), &smarts("C"), &options);
        assert_eq!(result.len(), 2);
        assert_eq!(result.status, SearchStatus::MatchLimit);
    }

    #[test]
    fn precomputed_rings() {
        let target = mol("C1CCCCC1CC");
        let rings = RingInfo::perceive(&target);
        let result =
            find_smarts_matches_with_rings(&target, &rings, &smarts("[R]"), &MatchOptions::default());
        assert_eq!(result.len(), 6);
    }

    #[test]
    fn errors_surface() {
        assert_eq!(from_smarts(""), Err(SmartsError::EmptyInput));
        assert!(matches!(from_smarts("["), Err(SmartsError::UnclosedBracket { pos: 0 })));
        assert!(matches!(from_smarts("C1CC"), Err(SmartsError::UnclosedRing { digit: 1, .. })));
        assert!(matches!(from_smarts("CC)"), Err(SmartsError::UnmatchedParen { .. })));
    }

    #[test]
    fn writer_basics() {
        assert_eq!(to_smarts(&smarts("*")), "*");
        assert_eq!(to_smarts(&smarts("C")), "C");
        assert_eq!(to_smarts(&smarts("c")), "c");
        assert_eq!(to_smarts(&smarts("C=C")), "C=C");
        assert_eq!(to_smarts(&smarts("C#C")), "C#C");
        assert_eq!(to_smarts(&smarts("C~C")), "C~C");
        assert_eq!(to_smarts(&smarts("CC")), "CC");
        assert_eq!(to_smarts(&smarts("c:c")), "c:c");
        assert_eq!(to_smarts(&smarts("[C@]")), "[C&@]");
        assert_eq!(to_smarts(&smarts("[C@@]")), "[C&@@]");
    }

    #[test]
    fn writer_ring_round_trip() {
        let written = to_smarts(&smarts("C1CC1"));
        assert!(written.contains('1'));
        let reparsed = smarts(&written);
        assert_eq!(reparsed.atom_count(), 3);
        assert_eq!(reparsed.bond_count(), 3);
    }

    // chirality

    #[test]
    fn chiral_query_matches_correct_enantiomer() {
        assert!(chiral("[C@](F)(Cl)Br", "[C@](F)(Cl)Br"));
        assert!(chiral("[C@@](F)(Cl)Br", "[C@@](F)(Cl)Br"));
        assert!(!chiral("[C@@](F)(Cl)Br", "[C@](F)(Cl)Br"));
    }

    #[test]
    fn chirality_ignored_by_default() {
        let target = mol("[C@@](F)(Cl)Br");
        assert!(has_smarts_match(&target, &smarts("[C@](F)(Cl)Br")));
    }

    #[test]
    fn achiral_queries_and_targets() {
        assert!(chiral("[C@](F)(Cl)Br", "[C](F)(Cl)Br"));
        assert!(chiral("C(F)(Cl)Br", "[C](F)(Cl)Br"));
        assert!(!chiral("C(F)(Cl)Br", "[C@](F)(Cl)Br"));
    }

    #[test]
    fn chiral_center_with_two_query_neighbors_passes() {
        assert!(chiral("[C@@H](F)Cl", "[C@]F"));
    }

    #[test]
    fn chiral_with_implicit_hydrogen() {
        assert!(chiral("[C@H](F)(Cl)Br", "[C@H](F)(Cl)Br"));
        assert!(!chiral("[C@@H](F)(Cl)Br", "[C@H](F)(Cl)Br"));
    }

    #[test]
    fn chirality_independent_of_writing_order() {
        // the same center written starting from different atoms
        assert!(chiral("F[C@](Cl)(Br)I", "Cl[C@@](F)(Br)I"));
        assert!(chiral("F[C@](Cl)(Br)I", "I[C@@](F)(Cl)Br"));
        assert!(!chiral("F[C@](Cl)(Br)I", "Cl[C@](F)(Br)I"));
    }

    #[test]
    fn three_substituent_query_on_four_substituent_target() {
        // the unmentioned substituent is viewed from
        assert!(chiral("F[C@](Cl)(Br)I", "[C@](Cl)(Br)I"));
        assert!(!chiral("F[C@](Cl)(Br)I", "[C@@](Cl)(Br)I"));
    }

    #[test]
    fn alanine_enantiomers() {
        let l_ala = "N[C@@H](C)C(=O)O";
        assert!(chiral(l_ala, "N[C@@H](C)C(=O)O"));
        assert!(!chiral(l_ala, "N[C@H](C)C(=O)O"));
        assert!(chiral(l_ala, "[NX3][C@@H]([CH3])C=O"));
        // two carbon neighbors: one of the mappings has the right parity
        assert!(chiral(l_ala, "N[C@H](C)C"));
        assert!(chiral(l_ala, "N[C@@H](C)C"));
    }

    #[test]
    fn chiral_match_counts() {
        let target = mol("[C@](F)(Cl)Br");
        let options = MatchOptions::default().with_chirality(true);
        assert_eq!(find_smarts_matches(&target, &smarts("[C@](F)(Cl)Br"), &options).len(), 1);
        assert_eq!(find_smarts_matches(&target, &smarts("[C@@](F)(Cl)Br"), &options).len(), 0);
        assert_eq!(target.atom(NodeIndex::new(0)).chirality, Chirality::Ccw);
    }
}
