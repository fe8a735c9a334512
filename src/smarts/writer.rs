use petgraph::graph::NodeIndex;

use crate::atom::Chirality;
use crate::canonical::{traversal_from, Traversal, TraversalEvent};
use crate::element::Element;
use crate::mol::permutation_parity;

use super::query::{stereo_reference, AtomExpr, BondExpr, Pattern};

/// Writes a pattern back to SMARTS.
///
/// Atoms are visited depth-first from the lowest index, lower-indexed
/// neighbors first, so a freshly parsed pattern usually comes back in its
/// original order. Negated compound expressions are rewritten with De
/// Morgan's laws; an `Or` nested inside an `And` that is itself inside an
/// `Or` has no SMARTS spelling and is written flat.
pub fn to_smarts(pattern: &Pattern) -> String {
    let identity: Vec<usize> = (0..pattern.atom_count()).collect();
    let traversal = traversal_from(pattern, &identity, |component| component.iter().min().copied());
    let mut out = String::with_capacity(pattern.atom_count() * 3);

    for event in &traversal.events {
        match *event {
            TraversalEvent::Disconnect => out.push('.'),
            TraversalEvent::Atom { atom, via } => {
                if let Some(edge) = via {
                    write_bond(pattern.bond(edge), &mut out);
                }
                let chirality = written_chirality(pattern, &traversal, atom);
                write_atom(pattern.atom(atom), chirality, &mut out);
            }
            TraversalEvent::RingOpen { label, bond, .. } => {
                write_bond(pattern.bond(bond), &mut out);
                write_ring_label(label, &mut out);
            }
            TraversalEvent::RingClose { label, .. } => write_ring_label(label, &mut out),
            TraversalEvent::BranchOpen => out.push('('),
            TraversalEvent::BranchClose => out.push(')'),
        }
    }
    out
}

fn written_chirality(pattern: &Pattern, traversal: &Traversal, atom: NodeIndex) -> Chirality {
    let expr = pattern.atom(atom);
    let stored = expr.chirality();
    if !stored.is_specified() {
        return stored;
    }
    let mut written: Vec<Option<NodeIndex>> =
        traversal.neighbor_order[atom.index()].iter().copied().map(Some).collect();
    if expr.requires_one_hydrogen() {
        let has_parent = traversal.parents[atom.index()].is_some();
        written.insert(usize::from(has_parent), None);
    }
    if permutation_parity(&written, &stereo_reference(pattern, atom)) {
        stored
    } else {
        stored.inverted()
    }
}

fn write_ring_label(label: u16, out: &mut String) {
    if label <= 9 {
        out.push_str(&label.to_string());
    } else {
        out.push('%');
        out.push_str(&label.to_string());
    }
}

fn write_atom(expr: &AtomExpr, chirality: Chirality, out: &mut String) {
    if let Some(bare) = bare_symbol(expr) {
        out.push_str(&bare);
        return;
    }
    out.push('[');
    write_atom_expr(expr, chirality, out);
    out.push(']');
}

fn bare_symbol(expr: &AtomExpr) -> Option<String> {
    match *expr {
        AtomExpr::True => Some("*".into()),
        AtomExpr::Aromatic => Some("a".into()),
        AtomExpr::Aliphatic => Some("A".into()),
        AtomExpr::Element {
            atomic_num,
            aromatic: Some(aromatic),
        } => {
            let elem = Element::from_atomic_num(atomic_num).filter(|e| e.is_organic_subset())?;
            if !aromatic {
                return Some(elem.symbol().to_string());
            }
            let lower = elem.symbol().to_ascii_lowercase();
            Element::from_aromatic_symbol(&lower)
                .filter(|_| lower.len() == 1)
                .map(|_| lower)
        }
        _ => None,
    }
}

fn element_symbol(atomic_num: u8, aromatic: Option<bool>) -> String {
    match (Element::from_atomic_num(atomic_num), aromatic) {
        (Some(elem), Some(true)) => elem.symbol().to_ascii_lowercase(),
        (Some(elem), Some(false)) => elem.symbol().to_string(),
        _ => format!("#{atomic_num}"),
    }
}

fn negate_atom(expr: &AtomExpr) -> AtomExpr {
    match expr {
        AtomExpr::Not(inner) => (**inner).clone(),
        AtomExpr::And(parts) => AtomExpr::Or(parts.iter().map(negate_atom).collect()),
        AtomExpr::Or(parts) => AtomExpr::And(parts.iter().map(negate_atom).collect()),
        other => AtomExpr::Not(Box::new(other.clone())),
    }
}

fn write_atom_expr(expr: &AtomExpr, chirality: Chirality, out: &mut String) {
    match expr {
        AtomExpr::True => out.push('*'),
        AtomExpr::Element {
            atomic_num,
            aromatic,
        } => out.push_str(&element_symbol(*atomic_num, *aromatic)),
        AtomExpr::Aromatic => out.push('a'),
        AtomExpr::Aliphatic => out.push('A'),
        AtomExpr::Isotope(iso) => out.push_str(&iso.to_string()),
        AtomExpr::Degree(d) => out.push_str(&format!("D{d}")),
        AtomExpr::Connectivity(x) => out.push_str(&format!("X{x}")),
        AtomExpr::Valence(v) => out.push_str(&format!("v{v}")),
        AtomExpr::TotalHCount(h) => out.push_str(&format!("H{h}")),
        AtomExpr::ImplicitHCount(h) => out.push_str(&format!("h{h}")),
        AtomExpr::InRing => out.push('R'),
        AtomExpr::RingMembership(n) => out.push_str(&format!("R{n}")),
        AtomExpr::SmallestRingSize(r) => out.push_str(&format!("r{r}")),
        AtomExpr::RingBondCount(x) => out.push_str(&format!("x{x}")),
        AtomExpr::Charge(c) if *c < 0 => out.push_str(&format!("-{}", c.unsigned_abs())),
        AtomExpr::Charge(c) => out.push_str(&format!("+{c}")),
        AtomExpr::AtomMapClass(class) => out.push_str(&format!(":{class}")),
        AtomExpr::Chirality(_) => match chirality {
            Chirality::Ccw => out.push('@'),
            Chirality::Cw => out.push_str("@@"),
            Chirality::None => {}
        },
        AtomExpr::Recursive(query) => {
            out.push_str("$(");
            out.push_str(&to_smarts(&query.pattern));
            out.push(')');
        }
        AtomExpr::And(parts) => {
            let sep = if parts.iter().any(|p| matches!(p, AtomExpr::Or(_))) {
                ';'
            } else {
                '&'
            };
            for (i, part) in parts.iter().enumerate() {
                if i > 0 {
                    out.push(sep);
                }
                write_atom_expr(part, chirality, out);
            }
        }
        AtomExpr::Or(parts) => {
            for (i, part) in parts.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_atom_expr(part, chirality, out);
            }
        }
        AtomExpr::Not(inner) => match **inner {
            AtomExpr::And(_) | AtomExpr::Or(_) | AtomExpr::Not(_) => {
                write_atom_expr(&negate_atom(inner), chirality, out)
            }
            _ => {
                out.push('!');
                write_atom_expr(inner, chirality, out);
            }
        },
    }
}

fn negate_bond(expr: &BondExpr) -> BondExpr {
    match expr {
        BondExpr::Not(inner) => (**inner).clone(),
        BondExpr::And(parts) => BondExpr::Or(parts.iter().map(negate_bond).collect()),
        BondExpr::Or(parts) => BondExpr::And(parts.iter().map(negate_bond).collect()),
        BondExpr::SingleOrAromatic => BondExpr::And(vec![
            BondExpr::Not(Box::new(BondExpr::Single)),
            BondExpr::Not(Box::new(BondExpr::Aromatic)),
        ]),
        other => BondExpr::Not(Box::new(other.clone())),
    }
}

fn write_bond(expr: &BondExpr, out: &mut String) {
    if *expr != BondExpr::SingleOrAromatic {
        write_bond_expr(expr, out);
    }
}

fn write_bond_expr(expr: &BondExpr, out: &mut String) {
    match expr {
        BondExpr::True => out.push('~'),
        BondExpr::Single => out.push('-'),
        BondExpr::Double => out.push('='),
        BondExpr::Triple => out.push('#'),
        BondExpr::Aromatic => out.push(':'),
        BondExpr::Ring => out.push('@'),
        BondExpr::Up => out.push('/'),
        BondExpr::Down => out.push('\\'),
        BondExpr::SingleOrAromatic => out.push_str("-,:"),
        BondExpr::And(parts) => {
            let sep = if parts
                .iter()
                .any(|p| matches!(p, BondExpr::Or(_) | BondExpr::SingleOrAromatic))
            {
                ';'
            } else {
                '&'
            };
            for (i, part) in parts.iter().enumerate() {
                if i > 0 {
                    out.push(sep);
                }
                write_bond_expr(part, out);
            }
        }
        BondExpr::Or(parts) => {
            for (i, part) in parts.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_bond_expr(part, out);
            }
        }
        BondExpr::Not(inner) => match **inner {
            BondExpr::And(_) | BondExpr::Or(_) | BondExpr::Not(_) | BondExpr::SingleOrAromatic => {
                write_bond_expr(&negate_bond(inner), out)
            }
            _ => {
                out.push('!');
                write_bond_expr(inner, out);
            }
        },
    }
}
