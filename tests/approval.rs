use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Deserialize;

use molgraph::{Molecule, RingInfo};

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn parse(smiles: &str) -> Molecule {
    molgraph::from_smiles(smiles).unwrap_or_else(|e| panic!("failed to parse {smiles:?}: {e}"))
}

fn report(kind: &str, failures: &[String]) {
    if !failures.is_empty() {
        panic!("{} {kind} failures:\n{}", failures.len(), failures.join("\n"));
    }
}

// ---------------------------------------------------------------------------
// 1. Aromaticity
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct AromaticityEntry {
    smiles: String,
    num_aromatic_atoms: usize,
    num_atoms: usize,
}

#[test]
fn approval_aromaticity() {
    init_logging();
    let data: Vec<AromaticityEntry> =
        serde_json::from_str(include_str!("approval_data/aromaticity.json")).unwrap();

    let mut failures = Vec::new();
    for entry in &data {
        let mol = parse(&entry.smiles);

        if mol.atom_count() != entry.num_atoms {
            failures.push(format!(
                "[atom_count] {}: expected {}, got {}",
                entry.smiles,
                entry.num_atoms,
                mol.atom_count()
            ));
        }

        let count = mol.aromatic_atom_count();
        if count != entry.num_aromatic_atoms {
            failures.push(format!(
                "[aromatic] {}: expected {}, got {}",
                entry.smiles, entry.num_aromatic_atoms, count
            ));
        }

        // a second pass over perceived input must not change anything
        let mut again = mol.clone();
        molgraph::perceive(&mut again);
        if again != mol {
            failures.push(format!("[idempotent] {}: second perception changed the molecule", entry.smiles));
        }
    }

    report("aromaticity", &failures);
}

// ---------------------------------------------------------------------------
// 2. Ring finding
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct RingEntry {
    smiles: String,
    num_rings: usize,
    ring_sizes: Vec<usize>,
    num_ring_atoms: usize,
    num_ring_bonds: usize,
}

#[test]
fn approval_rings() {
    init_logging();
    let data: Vec<RingEntry> = serde_json::from_str(include_str!("approval_data/rings.json")).unwrap();

    let mut failures = Vec::new();
    for entry in &data {
        let mol = parse(&entry.smiles);
        let ri = RingInfo::perceive(&mol);

        if ri.num_rings() != entry.num_rings {
            failures.push(format!(
                "[num_rings] {}: expected {}, got {}",
                entry.smiles,
                entry.num_rings,
                ri.num_rings()
            ));
        }

        let mut got_sizes: Vec<usize> = ri.rings().iter().map(|r| r.len()).collect();
        got_sizes.sort();
        let mut expected_sizes = entry.ring_sizes.clone();
        expected_sizes.sort();
        if got_sizes != expected_sizes {
            failures.push(format!(
                "[ring_sizes] {}: expected {:?}, got {:?}",
                entry.smiles, expected_sizes, got_sizes
            ));
        }

        let ring_atoms: HashSet<usize> = ri
            .rings()
            .iter()
            .flat_map(|r| r.iter().map(|n| n.index()))
            .collect();
        if ring_atoms.len() != entry.num_ring_atoms {
            failures.push(format!(
                "[ring_atoms] {}: expected {}, got {}",
                entry.smiles,
                entry.num_ring_atoms,
                ring_atoms.len()
            ));
        }

        let ring_bonds: HashSet<(usize, usize)> = ri
            .rings()
            .iter()
            .flat_map(|r| {
                let len = r.len();
                (0..len).map(move |i| {
                    let a = r[i].index();
                    let b = r[(i + 1) % len].index();
                    (a.min(b), a.max(b))
                })
            })
            .collect();
        if ring_bonds.len() != entry.num_ring_bonds {
            failures.push(format!(
                "[ring_bonds] {}: expected {}, got {}",
                entry.smiles,
                entry.num_ring_bonds,
                ring_bonds.len()
            ));
        }

        let flagged = mol.atoms().filter(|&a| mol.atom(a).in_ring).count();
        if flagged != entry.num_ring_atoms {
            failures.push(format!(
                "[in_ring flags] {}: expected {}, got {}",
                entry.smiles, entry.num_ring_atoms, flagged
            ));
        }
    }

    report("ring", &failures);
}

// ---------------------------------------------------------------------------
// 3. SMARTS matching
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct SmartsEntry {
    smiles: String,
    smarts_matches: HashMap<String, usize>,
}

#[test]
fn approval_smarts() {
    init_logging();
    let data: Vec<SmartsEntry> = serde_json::from_str(include_str!("approval_data/smarts.json")).unwrap();
    let options = molgraph::MatchOptions::default().with_unique(true);

    let mut failures = Vec::new();
    for entry in &data {
        let mol = parse(&entry.smiles);

        for (smarts_str, &expected_count) in &entry.smarts_matches {
            let query = match molgraph::from_smarts(smarts_str) {
                Ok(q) => q,
                Err(e) => {
                    failures.push(format!("failed to parse SMARTS {smarts_str:?}: {e}"));
                    continue;
                }
            };

            let result = molgraph::find_smarts_matches(&mol, &query, &options);
            if result.len() != expected_count {
                failures.push(format!(
                    "[smarts] {} / {:?}: expected {}, got {}",
                    entry.smiles,
                    smarts_str,
                    expected_count,
                    result.len()
                ));
            }

            // written form must find the same atoms
            let rewritten = molgraph::to_smarts(&query);
            match molgraph::from_smarts(&rewritten) {
                Ok(reparsed) => {
                    let again = molgraph::find_smarts_matches(&mol, &reparsed, &options);
                    if atom_sets(&again.matches) != atom_sets(&result.matches) {
                        failures.push(format!(
                            "[rewrite] {} / {:?}: {:?} matches differently",
                            entry.smiles, smarts_str, rewritten
                        ));
                    }
                }
                Err(e) => failures.push(format!(
                    "[rewrite] {smarts_str:?} wrote {rewritten:?}, which fails to parse: {e}"
                )),
            }
        }
    }

    report("SMARTS match", &failures);
}

fn atom_sets(matches: &[molgraph::AtomMapping]) -> BTreeSet<Vec<usize>> {
    matches
        .iter()
        .map(|m| {
            let mut atoms: Vec<usize> = m.iter().map(|(_, t)| t.index()).collect();
            atoms.sort_unstable();
            atoms
        })
        .collect()
}

// ---------------------------------------------------------------------------
// 4. Canonical SMILES
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct CanonicalData {
    equivalent: Vec<Vec<String>>,
    distinct: Vec<Vec<String>>,
}

fn same_structure(a: &Molecule, b: &Molecule) -> bool {
    a.atom_count() == b.atom_count()
        && a.bond_count() == b.bond_count()
        && molgraph::has_substruct_match(a, b)
        && molgraph::has_substruct_match(b, a)
}

#[test]
fn approval_canonical_smiles() {
    init_logging();
    let data: CanonicalData =
        serde_json::from_str(include_str!("approval_data/canonical_smiles.json")).unwrap();

    let mut failures = Vec::new();
    for group in &data.equivalent {
        let canonical: Vec<String> = group
            .iter()
            .map(|s| molgraph::to_canonical_smiles(&parse(s)))
            .collect();
        if canonical.iter().any(|c| *c != canonical[0]) {
            failures.push(format!("[equivalent] {group:?} gave {canonical:?}"));
        }

        let mol = parse(&group[0]);
        match molgraph::from_smiles(&canonical[0]) {
            Ok(reparsed) => {
                if !same_structure(&mol, &reparsed) {
                    failures.push(format!(
                        "[round trip] structural mismatch for {:?}: wrote {:?}",
                        group[0], canonical[0]
                    ));
                }
                if molgraph::to_canonical_smiles(&reparsed) != canonical[0] {
                    failures.push(format!("[round trip] {:?} is not a fixed point", canonical[0]));
                }
            }
            Err(e) => failures.push(format!(
                "[round trip] failed to reparse {:?} (from {:?}): {e}",
                canonical[0], group[0]
            )),
        }
    }

    for group in &data.distinct {
        let canonical: HashSet<String> = group
            .iter()
            .map(|s| molgraph::to_canonical_smiles(&parse(s)))
            .collect();
        if canonical.len() != group.len() {
            failures.push(format!("[distinct] {group:?} collapsed to {canonical:?}"));
        }
    }

    report("canonical SMILES", &failures);
}

// ---------------------------------------------------------------------------
// 5. Substructure matching
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct SubstructMatchInfo {
    has_match: bool,
    num_unique: usize,
}

#[derive(Deserialize)]
struct SubstructEntry {
    smiles: String,
    queries: HashMap<String, SubstructMatchInfo>,
}

#[test]
fn approval_substruct() {
    init_logging();
    let data: Vec<SubstructEntry> =
        serde_json::from_str(include_str!("approval_data/substruct.json")).unwrap();
    let unique = molgraph::MatchOptions::default().with_unique(true);

    let mut failures = Vec::new();
    for entry in &data {
        let mol = parse(&entry.smiles);

        for (query_smiles, expected) in &entry.queries {
            let query = parse(query_smiles);

            let has = molgraph::has_substruct_match(&mol, &query);
            if has != expected.has_match {
                failures.push(format!(
                    "[has_match] {} / {}: expected {}, got {}",
                    entry.smiles, query_smiles, expected.has_match, has
                ));
            }

            let found = molgraph::find_substruct_matches(&mol, &query, &unique);
            if found.len() != expected.num_unique {
                failures.push(format!(
                    "[num_unique] {} / {}: expected {}, got {}",
                    entry.smiles,
                    query_smiles,
                    expected.num_unique,
                    found.len()
                ));
            }
        }
    }

    report("substruct", &failures);
}
