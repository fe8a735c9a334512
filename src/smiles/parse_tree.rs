use crate::smiles::error::SmilesError;
use crate::smiles::tokenizer::{AtomToken, BondToken, ChiralityToken, Token};

#[derive(Debug, Clone)]
pub struct ParseAtom {
    pub atomic_num: u8,
    pub is_aromatic: bool,
    pub isotope: u16,
    pub chirality: ChiralityToken,
    pub hcount: Option<u8>,
    pub charge: i8,
    pub atom_class: u16,
    pub is_bracket: bool,
    pub pos: usize,
    /// Whether the atom was bonded to the atom written before it.
    pub has_preceding: bool,
    /// Neighbors in the order they are written: the preceding atom, ring
    /// closures, branches, then the following atom.
    pub neighbors: Vec<Neighbor>,
}

#[derive(Debug, Clone)]
pub struct Neighbor {
    pub bond: Option<BondToken>,
    pub atom_idx: usize,
}

#[derive(Debug, Clone)]
pub struct ParseTree {
    pub atoms: Vec<ParseAtom>,
}

#[derive(Debug, Clone, Copy)]
struct RingOpen {
    atom: usize,
    bond: Option<BondToken>,
    pos: usize,
    slot: usize,
}

/// Resolves branches and ring closures of one fragment into explicit
/// adjacency.
pub fn build_parse_tree(tokens: &[Token]) -> Result<ParseTree, SmilesError> {
    let mut atoms: Vec<ParseAtom> = Vec::new();
    // (atom to return to, position of '(') for each open branch
    let mut stack: Vec<(usize, usize)> = Vec::new();
    let mut current: Option<usize> = None;
    let mut pending_bond: Option<(BondToken, usize)> = None;
    let mut branch_empty = false;
    let mut ring_opens: Vec<Option<RingOpen>> = vec![None; 100];

    for token in tokens {
        match token {
            Token::Atom(atom_tok) => {
                let idx = atoms.len();
                atoms.push(parse_atom_from_token(atom_tok));
                branch_empty = false;

                if let Some(cur) = current {
                    let bond = pending_bond.take().map(|(b, _)| b);
                    atoms[cur].neighbors.push(Neighbor {
                        bond,
                        atom_idx: idx,
                    });
                    atoms[idx].neighbors.push(Neighbor {
                        bond,
                        atom_idx: cur,
                    });
                    atoms[idx].has_preceding = true;
                } else if let Some((_, pos)) = pending_bond {
                    return Err(SmilesError::DanglingBond { pos });
                }

                current = Some(idx);
            }
            Token::Bond { bond, pos } => {
                if let Some((_, prev)) = pending_bond {
                    return Err(SmilesError::DanglingBond { pos: prev });
                }
                pending_bond = Some((*bond, *pos));
            }
            Token::RingClosure { bond, digit, pos } => {
                let d = *digit as usize;
                let cur = current.ok_or(SmilesError::InvalidRingBond {
                    digit: *digit,
                    pos: *pos,
                })?;
                if let Some((_, prev)) = pending_bond {
                    return Err(SmilesError::DanglingBond { pos: prev });
                }

                if let Some(open) = ring_opens[d].take() {
                    let ring_bond = match (*bond, open.bond) {
                        (None, None) => None,
                        (Some(b), None) | (None, Some(b)) => Some(b),
                        (Some(b1), Some(b2)) if b1 == b2 => Some(b1),
                        // Directional marks are read relative to each end.
                        (Some(b1), Some(b2)) if b1.is_directional() && b2.is_directional() => {
                            Some(b2)
                        }
                        _ => {
                            return Err(SmilesError::RingBondConflict {
                                digit: *digit,
                                pos: *pos,
                            })
                        }
                    };
                    if open.atom == cur {
                        return Err(SmilesError::SelfBond { pos: *pos });
                    }
                    if atoms[cur].neighbors.iter().any(|n| n.atom_idx == open.atom) {
                        return Err(SmilesError::DuplicateBond { pos: *pos });
                    }

                    atoms[open.atom].neighbors[open.slot] = Neighbor {
                        bond: ring_bond,
                        atom_idx: cur,
                    };
                    atoms[cur].neighbors.push(Neighbor {
                        bond: ring_bond,
                        atom_idx: open.atom,
                    });
                } else {
                    // Reserve the neighbor slot now so neighbor order follows
                    // the text; the placeholder is overwritten on closure.
                    let slot = atoms[cur].neighbors.len();
                    atoms[cur].neighbors.push(Neighbor {
                        bond: *bond,
                        atom_idx: cur,
                    });
                    ring_opens[d] = Some(RingOpen {
                        atom: cur,
                        bond: *bond,
                        pos: *pos,
                        slot,
                    });
                }
            }
            Token::OpenParen(pos) => {
                let cur = current.ok_or(SmilesError::UnmatchedParen { pos: *pos })?;
                if let Some((_, prev)) = pending_bond {
                    return Err(SmilesError::DanglingBond { pos: prev });
                }
                stack.push((cur, *pos));
                branch_empty = true;
            }
            Token::CloseParen(pos) => {
                if let Some((_, prev)) = pending_bond {
                    return Err(SmilesError::DanglingBond { pos: prev });
                }
                if branch_empty {
                    return Err(SmilesError::UnexpectedChar { pos: *pos, ch: ')' });
                }
                let (atom, _) = stack.pop().ok_or(SmilesError::UnmatchedParen { pos: *pos })?;
                current = Some(atom);
            }
        }
    }

    if let Some((_, pos)) = pending_bond {
        return Err(SmilesError::DanglingBond { pos });
    }

    if let Some(&(_, pos)) = stack.last() {
        return Err(SmilesError::UnmatchedParen { pos });
    }

    if let Some((digit, open)) = ring_opens
        .iter()
        .enumerate()
        .filter_map(|(d, o)| o.map(|o| (d, o)))
        .min_by_key(|(_, o)| o.pos)
    {
        return Err(SmilesError::UnclosedRing {
            digit: digit as u16,
            pos: open.pos,
        });
    }

    Ok(ParseTree { atoms })
}

fn parse_atom_from_token(tok: &AtomToken) -> ParseAtom {
    ParseAtom {
        atomic_num: tok.atomic_num,
        is_aromatic: tok.is_aromatic,
        isotope: tok.isotope,
        chirality: tok.chirality,
        hcount: tok.hcount,
        charge: tok.charge,
        atom_class: tok.atom_class,
        is_bracket: tok.is_bracket,
        pos: tok.pos,
        has_preceding: false,
        neighbors: Vec::new(),
    }
}
