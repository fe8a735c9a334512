use std::collections::HashMap;

use petgraph::graph::NodeIndex;

use crate::atom::Chirality;
use crate::element::Element;
use crate::mol::permutation_parity;

use super::error::SmartsError;
use super::query::{stereo_reference, AtomExpr, BondExpr, Pattern, RecursiveQuery};

/// An opened ring-closure label waiting for its partner.
struct RingOpen {
    atom: NodeIndex,
    bond: Option<BondExpr>,
    /// Index in the atom's written neighbor list reserved for the partner.
    slot: usize,
    pos: usize,
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    /// Offset of `chars[0]` in the outermost input, so errors inside
    /// `$(...)` report absolute positions.
    offset: usize,
    bracket_start: usize,
    next_recursive_id: usize,
}

macro_rules! flatten {
    ($name:ident, $ty:ident, $variant:ident) => {
        fn $name(parts: Vec<$ty>) -> $ty {
            let mut flat = Vec::with_capacity(parts.len());
            for part in parts {
                match part {
                    $ty::$variant(inner) => flat.extend(inner),
                    other => flat.push(other),
                }
            }
            if flat.len() == 1 {
                flat.swap_remove(0)
            } else {
                $ty::$variant(flat)
            }
        }
    };
}

flatten!(atom_and, AtomExpr, And);
flatten!(atom_or, AtomExpr, Or);
flatten!(bond_and, BondExpr, And);
flatten!(bond_or, BondExpr, Or);

fn is_bond_start(ch: char) -> bool {
    matches!(ch, '-' | '=' | '#' | '~' | ':' | '/' | '\\' | '@' | '!')
}

impl Parser {
    fn new(chars: Vec<char>, offset: usize, next_recursive_id: usize) -> Self {
        Self {
            chars,
            pos: 0,
            offset,
            bracket_start: 0,
            next_recursive_id,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    /// Absolute position of the cursor.
    fn here(&self) -> usize {
        self.offset + self.pos
    }

    fn unexpected(&self) -> SmartsError {
        match self.peek() {
            Some(ch) => SmartsError::UnexpectedChar {
                pos: self.here(),
                ch,
            },
            None => SmartsError::MissingOperand { pos: self.here() },
        }
    }

    fn parse_number(&mut self) -> Result<Option<u32>, SmartsError> {
        let start = self.pos;
        let mut value: u32 = 0;
        while let Some(d) = self.peek().and_then(|c| c.to_digit(10)) {
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add(d))
                .ok_or(SmartsError::InvalidNumber {
                    pos: self.offset + start,
                })?;
            self.pos += 1;
        }
        Ok((self.pos > start).then_some(value))
    }

    /// A count primitive's argument, or `default` when none is written.
    fn count_or(&mut self, default: u8) -> Result<u8, SmartsError> {
        let pos = self.here();
        match self.parse_number()? {
            Some(n) => u8::try_from(n).map_err(|_| SmartsError::InvalidNumber { pos }),
            None => Ok(default),
        }
    }

    fn parse_smarts(&mut self) -> Result<Pattern, SmartsError> {
        let mut mol = Pattern::new();
        let mut written: Vec<Vec<Option<NodeIndex>>> = Vec::new();
        let mut has_preceding: Vec<bool> = Vec::new();
        let mut branches: Vec<(NodeIndex, usize)> = Vec::new();
        let mut current: Option<NodeIndex> = None;
        let mut pending: Option<(BondExpr, usize)> = None;
        let mut open_rings: HashMap<u16, RingOpen> = HashMap::new();

        while let Some(ch) = self.peek() {
            match ch {
                '(' => {
                    if let Some((_, pos)) = pending {
                        return Err(SmartsError::DanglingBond { pos });
                    }
                    let Some(cur) = current else {
                        return Err(self.unexpected());
                    };
                    branches.push((cur, self.here()));
                    self.pos += 1;
                    if self.peek() == Some(')') {
                        return Err(self.unexpected());
                    }
                }
                ')' => {
                    if let Some((_, pos)) = pending {
                        return Err(SmartsError::DanglingBond { pos });
                    }
                    let Some((atom, _)) = branches.pop() else {
                        return Err(SmartsError::UnmatchedParen { pos: self.here() });
                    };
                    current = Some(atom);
                    self.pos += 1;
                }
                '.' => {
                    if let Some((_, pos)) = pending {
                        return Err(SmartsError::DanglingBond { pos });
                    }
                    if current.is_none() || !branches.is_empty() {
                        return Err(self.unexpected());
                    }
                    current = None;
                    self.pos += 1;
                }
                '0'..='9' | '%' => {
                    let pos = self.here();
                    let digit = self.parse_ring_label()?;
                    let Some(cur) = current else {
                        return Err(SmartsError::InvalidRingBond { digit, pos });
                    };
                    let bond = pending.take().map(|(b, _)| b);
                    match open_rings.remove(&digit) {
                        Some(open) => {
                            if open.atom == cur || mol.bond_between(open.atom, cur).is_some() {
                                return Err(SmartsError::DuplicateBond { digit, pos });
                            }
                            let expr = match (open.bond, bond) {
                                (Some(a), Some(b)) if a != b => bond_and(vec![a, b]),
                                (a, b) => a.or(b).unwrap_or(BondExpr::SingleOrAromatic),
                            };
                            mol.add_bond(open.atom, cur, expr);
                            written[open.atom.index()][open.slot] = Some(cur);
                            written[cur.index()].push(Some(open.atom));
                        }
                        None => {
                            let slot = written[cur.index()].len();
                            written[cur.index()].push(None);
                            open_rings.insert(
                                digit,
                                RingOpen {
                                    atom: cur,
                                    bond,
                                    slot,
                                    pos,
                                },
                            );
                        }
                    }
                }
                c if is_bond_start(c) => {
                    if current.is_none() || pending.is_some() {
                        return Err(self.unexpected());
                    }
                    let pos = self.here();
                    pending = Some((self.parse_bond_expr()?, pos));
                }
                _ => {
                    let expr = if ch == '[' {
                        self.parse_bracket_atom()?
                    } else {
                        self.parse_bare_atom()?
                    };
                    let idx = mol.add_atom(expr);
                    written.push(Vec::new());
                    has_preceding.push(false);
                    if let Some(prev) = current {
                        let bond = pending.take().map_or(BondExpr::SingleOrAromatic, |(b, _)| b);
                        mol.add_bond(prev, idx, bond);
                        written[prev.index()].push(Some(idx));
                        written[idx.index()].push(Some(prev));
                        has_preceding[idx.index()] = true;
                    }
                    current = Some(idx);
                }
            }
        }

        if let Some((_, pos)) = pending {
            return Err(SmartsError::DanglingBond { pos });
        }
        if let Some(&(_, pos)) = branches.first() {
            return Err(SmartsError::UnmatchedParen { pos });
        }
        if let Some((&digit, open)) = open_rings.iter().min_by_key(|(_, open)| open.pos) {
            return Err(SmartsError::UnclosedRing {
                digit,
                pos: open.pos,
            });
        }
        if mol.is_empty() {
            return Err(SmartsError::MissingOperand { pos: self.here() });
        }

        normalize_chirality(&mut mol, &written, &has_preceding);
        Ok(mol)
    }

    fn parse_ring_label(&mut self) -> Result<u16, SmartsError> {
        let pos = self.here();
        if self.peek() == Some('%') {
            self.pos += 1;
            let tens = self.peek().and_then(|c| c.to_digit(10));
            let ones = self.peek_at(1).and_then(|c| c.to_digit(10));
            let (Some(tens), Some(ones)) = (tens, ones) else {
                return Err(SmartsError::UnexpectedChar { pos, ch: '%' });
            };
            self.pos += 2;
            return Ok((tens * 10 + ones) as u16);
        }
        let digit = self.peek().and_then(|c| c.to_digit(10)).ok_or(self.unexpected())?;
        self.pos += 1;
        Ok(digit as u16)
    }

    // Bond expressions share the atom operator precedence:
    // `;` < `,` < `&` (or adjacency) < `!`.

    fn parse_bond_expr(&mut self) -> Result<BondExpr, SmartsError> {
        let mut parts = vec![self.parse_bond_or()?];
        while self.peek() == Some(';') {
            self.pos += 1;
            parts.push(self.parse_bond_or()?);
        }
        Ok(bond_and(parts))
    }

    fn parse_bond_or(&mut self) -> Result<BondExpr, SmartsError> {
        let mut parts = vec![self.parse_bond_and()?];
        while self.peek() == Some(',') {
            self.pos += 1;
            parts.push(self.parse_bond_and()?);
        }
        Ok(bond_or(parts))
    }

    fn parse_bond_and(&mut self) -> Result<BondExpr, SmartsError> {
        let mut parts = vec![self.parse_bond_not()?];
        loop {
            match self.peek() {
                Some('&') => {
                    self.pos += 1;
                    parts.push(self.parse_bond_not()?);
                }
                Some(c) if is_bond_start(c) => parts.push(self.parse_bond_not()?),
                _ => break,
            }
        }
        Ok(bond_and(parts))
    }

    fn parse_bond_not(&mut self) -> Result<BondExpr, SmartsError> {
        if self.peek() == Some('!') {
            self.pos += 1;
            return Ok(BondExpr::Not(Box::new(self.parse_bond_not()?)));
        }
        let expr = match self.peek() {
            Some('-') => BondExpr::Single,
            Some('=') => BondExpr::Double,
            Some('#') => BondExpr::Triple,
            Some('~') => BondExpr::True,
            Some(':') => BondExpr::Aromatic,
            Some('/') => BondExpr::Up,
            Some('\\') => BondExpr::Down,
            Some('@') => BondExpr::Ring,
            _ => return Err(self.unexpected()),
        };
        self.pos += 1;
        Ok(expr)
    }

    /// Atoms outside brackets: the organic subset, its aromatic forms,
    /// `*`, `a` and `A`.
    fn parse_bare_atom(&mut self) -> Result<AtomExpr, SmartsError> {
        let Some(ch) = self.peek() else {
            return Err(self.unexpected());
        };
        match ch {
            '*' => {
                self.pos += 1;
                return Ok(AtomExpr::True);
            }
            'a' => {
                self.pos += 1;
                return Ok(AtomExpr::Aromatic);
            }
            'A' => {
                self.pos += 1;
                return Ok(AtomExpr::Aliphatic);
            }
            _ => {}
        }

        if let Some(next) = self.peek_at(1).filter(char::is_ascii_lowercase) {
            let two: String = [ch, next].iter().collect();
            if let Some(elem) = Element::from_symbol(&two).filter(|e| e.is_organic_subset()) {
                self.pos += 2;
                return Ok(element(elem, false));
            }
        }
        let one = ch.to_string();
        if let Some(elem) = Element::from_symbol(&one).filter(|e| e.is_organic_subset()) {
            self.pos += 1;
            return Ok(element(elem, false));
        }
        if let Some(elem) = Element::from_aromatic_symbol(&one) {
            self.pos += 1;
            return Ok(element(elem, true));
        }
        Err(self.unexpected())
    }

    fn parse_bracket_atom(&mut self) -> Result<AtomExpr, SmartsError> {
        let start = self.here();
        self.bracket_start = self.pos;
        self.pos += 1;
        if self.peek().is_none() {
            return Err(SmartsError::UnclosedBracket { pos: start });
        }
        if self.peek() == Some(']') {
            return Err(SmartsError::MissingOperand { pos: self.here() });
        }
        let expr = self.parse_semicolon_expr()?;
        match self.peek() {
            Some(']') => {
                self.pos += 1;
                Ok(expr)
            }
            None => Err(SmartsError::UnclosedBracket { pos: start }),
            Some(_) => Err(self.unexpected()),
        }
    }

    fn parse_semicolon_expr(&mut self) -> Result<AtomExpr, SmartsError> {
        let mut parts = vec![self.parse_comma_expr()?];
        while self.peek() == Some(';') {
            self.pos += 1;
            parts.push(self.parse_comma_expr()?);
        }
        Ok(atom_and(parts))
    }

    fn parse_comma_expr(&mut self) -> Result<AtomExpr, SmartsError> {
        let mut parts = vec![self.parse_high_and_expr()?];
        while self.peek() == Some(',') {
            self.pos += 1;
            parts.push(self.parse_high_and_expr()?);
        }
        Ok(atom_or(parts))
    }

    fn parse_high_and_expr(&mut self) -> Result<AtomExpr, SmartsError> {
        let mut parts = Vec::new();
        loop {
            match self.peek() {
                None | Some(']' | ',' | ';') => break,
                Some('&') => {
                    self.pos += 1;
                    if matches!(self.peek(), None | Some(']' | ',' | ';' | '&')) {
                        return Err(SmartsError::MissingOperand { pos: self.here() });
                    }
                }
                Some(_) => parts.push(self.parse_not_expr()?),
            }
        }
        if parts.is_empty() {
            return Err(SmartsError::MissingOperand { pos: self.here() });
        }
        Ok(atom_and(parts))
    }

    fn parse_not_expr(&mut self) -> Result<AtomExpr, SmartsError> {
        if self.peek() == Some('!') {
            self.pos += 1;
            return Ok(AtomExpr::Not(Box::new(self.parse_not_expr()?)));
        }
        self.parse_primitive()
    }

    fn parse_primitive(&mut self) -> Result<AtomExpr, SmartsError> {
        let Some(ch) = self.peek() else {
            return Err(self.unexpected());
        };
        let start = self.here();

        if ch.is_ascii_uppercase() {
            if let Some(next) = self.peek_at(1).filter(char::is_ascii_lowercase) {
                let two: String = [ch, next].iter().collect();
                if let Some(elem) = Element::from_symbol(&two) {
                    self.pos += 2;
                    return Ok(element(elem, false));
                }
            }
        }

        match ch {
            '*' => {
                self.pos += 1;
                Ok(AtomExpr::True)
            }
            'A' => {
                self.pos += 1;
                Ok(AtomExpr::Aliphatic)
            }
            'a' if self.peek_at(1) == Some('s') => self.parse_aromatic_element(),
            'a' => {
                self.pos += 1;
                Ok(AtomExpr::Aromatic)
            }
            '#' => {
                self.pos += 1;
                let num = self.parse_number()?;
                num.and_then(|n| u8::try_from(n).ok())
                    .and_then(Element::from_atomic_num)
                    .map(|elem| AtomExpr::Element {
                        atomic_num: elem.atomic_num(),
                        aromatic: None,
                    })
                    .ok_or(SmartsError::InvalidAtomicNum { pos: start })
            }
            'D' => {
                self.pos += 1;
                Ok(AtomExpr::Degree(self.count_or(1)?))
            }
            'X' => {
                self.pos += 1;
                Ok(AtomExpr::Connectivity(self.count_or(1)?))
            }
            'v' => {
                self.pos += 1;
                Ok(AtomExpr::Valence(self.count_or(1)?))
            }
            'H' if self.is_hydrogen_atom() => {
                self.pos += 1;
                Ok(element(Element::H, false))
            }
            'H' => {
                self.pos += 1;
                Ok(AtomExpr::TotalHCount(self.count_or(1)?))
            }
            'h' => {
                self.pos += 1;
                match self.parse_number()? {
                    Some(n) => u8::try_from(n)
                        .map(AtomExpr::ImplicitHCount)
                        .map_err(|_| SmartsError::InvalidNumber { pos: start + 1 }),
                    None => Ok(AtomExpr::Not(Box::new(AtomExpr::ImplicitHCount(0)))),
                }
            }
            'R' => {
                self.pos += 1;
                match self.parse_number()? {
                    Some(n) => u8::try_from(n)
                        .map(AtomExpr::RingMembership)
                        .map_err(|_| SmartsError::InvalidNumber { pos: start + 1 }),
                    None => Ok(AtomExpr::InRing),
                }
            }
            'r' => {
                self.pos += 1;
                match self.parse_number()? {
                    Some(0) => Ok(AtomExpr::RingMembership(0)),
                    Some(n) => u8::try_from(n)
                        .map(AtomExpr::SmallestRingSize)
                        .map_err(|_| SmartsError::InvalidNumber { pos: start + 1 }),
                    None => Ok(AtomExpr::InRing),
                }
            }
            'x' => {
                self.pos += 1;
                Ok(AtomExpr::RingBondCount(self.count_or(1)?))
            }
            '@' => {
                self.pos += 1;
                if self.peek() == Some('@') {
                    self.pos += 1;
                    Ok(AtomExpr::Chirality(Chirality::Cw))
                } else {
                    Ok(AtomExpr::Chirality(Chirality::Ccw))
                }
            }
            '+' | '-' => self.parse_charge(ch),
            ':' => {
                self.pos += 1;
                let num = self.parse_number()?.ok_or(SmartsError::MissingOperand { pos: self.here() })?;
                u16::try_from(num)
                    .map(AtomExpr::AtomMapClass)
                    .map_err(|_| SmartsError::InvalidNumber { pos: start })
            }
            '$' => self.parse_recursive(),
            '0'..='9' => {
                let num = self.parse_number()?.unwrap_or(0);
                u16::try_from(num)
                    .map(AtomExpr::Isotope)
                    .map_err(|_| SmartsError::InvalidNumber { pos: start })
            }
            c if c.is_ascii_lowercase() => self.parse_aromatic_element(),
            c if c.is_ascii_uppercase() => {
                let elem = Element::from_symbol(&c.to_string()).ok_or(self.unexpected())?;
                self.pos += 1;
                Ok(element(elem, false))
            }
            _ => Err(self.unexpected()),
        }
    }

    fn parse_aromatic_element(&mut self) -> Result<AtomExpr, SmartsError> {
        for len in [2, 1] {
            let Some(symbol) = self.chars.get(self.pos..self.pos + len) else {
                continue;
            };
            let symbol: String = symbol.iter().collect();
            if let Some(elem) = Element::from_aromatic_symbol(&symbol) {
                self.pos += len;
                return Ok(element(elem, true));
            }
        }
        Err(self.unexpected())
    }

    /// `+`, `++`, `+2`, and the negative forms.
    fn parse_charge(&mut self, sign: char) -> Result<AtomExpr, SmartsError> {
        let start = self.here();
        self.pos += 1;
        let magnitude = match self.parse_number()? {
            Some(n) => n,
            None => {
                let mut n = 1u32;
                while self.peek() == Some(sign) {
                    self.pos += 1;
                    n += 1;
                }
                n
            }
        };
        let magnitude = i8::try_from(magnitude).map_err(|_| SmartsError::InvalidNumber { pos: start })?;
        Ok(AtomExpr::Charge(if sign == '-' { -magnitude } else { magnitude }))
    }

    /// `H` names the hydrogen element when it opens the bracket (after an
    /// optional isotope) and is not followed by a count.
    fn is_hydrogen_atom(&self) -> bool {
        let before = &self.chars[self.bracket_start + 1..self.pos];
        before.iter().all(|c| c.is_ascii_digit() || *c == '&')
            && !self.peek_at(1).is_some_and(|c| c.is_ascii_digit())
    }

    fn parse_recursive(&mut self) -> Result<AtomExpr, SmartsError> {
        let start = self.here();
        self.pos += 1;
        if self.peek() != Some('(') {
            return Err(self.unexpected());
        }
        self.pos += 1;
        let inner_start = self.pos;
        let mut depth = 1usize;
        while depth > 0 {
            match self.peek() {
                Some('(') => depth += 1,
                Some(')') => depth -= 1,
                Some(_) => {}
                None => return Err(SmartsError::UnclosedRecursive { pos: start }),
            }
            self.pos += 1;
        }
        let inner_end = self.pos - 1;
        if inner_start == inner_end {
            return Err(SmartsError::MissingOperand {
                pos: self.offset + inner_start,
            });
        }

        let id = self.next_recursive_id;
        let mut inner = Parser::new(
            self.chars[inner_start..inner_end].to_vec(),
            self.offset + inner_start,
            id + 1,
        );
        let pattern = inner.parse_smarts()?;
        self.next_recursive_id = inner.next_recursive_id;
        Ok(AtomExpr::Recursive(RecursiveQuery { id, pattern }))
    }
}

fn element(elem: Element, aromatic: bool) -> AtomExpr {
    AtomExpr::Element {
        atomic_num: elem.atomic_num(),
        aromatic: Some(aromatic),
    }
}

/// Converts `@`/`@@` from written neighbor order to the pattern's reference
/// order. A required single hydrogen sits right after the preceding atom,
/// or first when there is none.
fn normalize_chirality(mol: &mut Pattern, written: &[Vec<Option<NodeIndex>>], has_preceding: &[bool]) {
    for (i, order) in written.iter().enumerate() {
        let idx = NodeIndex::new(i);
        let expr = mol.atom(idx);
        let chirality = expr.chirality();
        if !chirality.is_specified() {
            continue;
        }
        let mut order = order.clone();
        if expr.requires_one_hydrogen() {
            order.insert(usize::from(has_preceding[i]), None);
        }
        if !(3..=4).contains(&order.len()) {
            continue;
        }
        let reference = stereo_reference(mol, idx);
        if !permutation_parity(&order, &reference) {
            mol.atom_mut(idx).set_chirality(chirality.inverted());
        }
    }
}

/// Compiles a SMARTS string. Surrounding whitespace is ignored.
pub fn parse(input: &str) -> Result<Pattern, SmartsError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(SmartsError::EmptyInput);
    }
    let leading = input.len() - input.trim_start().len();
    let offset = input[..leading].chars().count();
    Parser::new(trimmed.chars().collect(), offset, 0).parse_smarts()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(i: usize) -> NodeIndex {
        NodeIndex::new(i)
    }

    #[test]
    fn bracket_precedence() {
        let p = parse("[C,N;H1]").unwrap();
        let AtomExpr::And(parts) = p.atom(n(0)) else {
            panic!("expected And, got {:?}", p.atom(n(0)));
        };
        assert!(matches!(&parts[0], AtomExpr::Or(or) if or.len() == 2));
        assert_eq!(parts[1], AtomExpr::TotalHCount(1));

        let p = parse("[C,N&H1]").unwrap();
        assert!(matches!(p.atom(n(0)), AtomExpr::Or(or) if matches!(&or[1], AtomExpr::And(_))));
    }

    #[test]
    fn implicit_and_flattens() {
        let p = parse("[CX4H2]").unwrap();
        assert_eq!(
            *p.atom(n(0)),
            AtomExpr::And(vec![
                element(Element::C, false),
                AtomExpr::Connectivity(4),
                AtomExpr::TotalHCount(2),
            ])
        );
    }

    #[test]
    fn hydrogen_element_versus_count() {
        assert_eq!(*parse("[H]").unwrap().atom(n(0)), element(Element::H, false));
        assert_eq!(
            *parse("[2H]").unwrap().atom(n(0)),
            AtomExpr::And(vec![AtomExpr::Isotope(2), element(Element::H, false)])
        );
        assert_eq!(
            *parse("[H+]").unwrap().atom(n(0)),
            AtomExpr::And(vec![element(Element::H, false), AtomExpr::Charge(1)])
        );
        assert_eq!(
            *parse("[CH]").unwrap().atom(n(0)),
            AtomExpr::And(vec![element(Element::C, false), AtomExpr::TotalHCount(1)])
        );
    }

    #[test]
    fn two_letter_elements_win() {
        assert_eq!(*parse("[Cl]").unwrap().atom(n(0)), element(Element::Cl, false));
        assert_eq!(*parse("[Ar]").unwrap().atom(n(0)), element(Element::Ar, false));
        assert_eq!(*parse("[se]").unwrap().atom(n(0)), element(Element::Se, true));
        assert_eq!(*parse("[as]").unwrap().atom(n(0)), element(Element::As, true));
        assert_eq!(*parse("Br").unwrap().atom(n(0)), element(Element::Br, false));
    }

    #[test]
    fn charges() {
        assert_eq!(*parse("[+]").unwrap().atom(n(0)), AtomExpr::Charge(1));
        assert_eq!(*parse("[++]").unwrap().atom(n(0)), AtomExpr::Charge(2));
        assert_eq!(*parse("[-2]").unwrap().atom(n(0)), AtomExpr::Charge(-2));
    }

    #[test]
    fn ring_primitives() {
        assert_eq!(*parse("[R]").unwrap().atom(n(0)), AtomExpr::InRing);
        assert_eq!(*parse("[R0]").unwrap().atom(n(0)), AtomExpr::RingMembership(0));
        assert_eq!(*parse("[r6]").unwrap().atom(n(0)), AtomExpr::SmallestRingSize(6));
        assert_eq!(*parse("[x2]").unwrap().atom(n(0)), AtomExpr::RingBondCount(2));
        assert_eq!(
            *parse("[h]").unwrap().atom(n(0)),
            AtomExpr::Not(Box::new(AtomExpr::ImplicitHCount(0)))
        );
    }

    #[test]
    fn bond_expressions() {
        let p = parse("C!@C").unwrap();
        let e = p.bonds().next().unwrap();
        assert_eq!(*p.bond(e), BondExpr::Not(Box::new(BondExpr::Ring)));

        let p = parse("C-,:C").unwrap();
        let e = p.bonds().next().unwrap();
        assert_eq!(*p.bond(e), BondExpr::Or(vec![BondExpr::Single, BondExpr::Aromatic]));

        let p = parse("C=;@C").unwrap();
        let e = p.bonds().next().unwrap();
        assert_eq!(*p.bond(e), BondExpr::And(vec![BondExpr::Double, BondExpr::Ring]));

        let p = parse("C-@C").unwrap();
        let e = p.bonds().next().unwrap();
        assert_eq!(*p.bond(e), BondExpr::And(vec![BondExpr::Single, BondExpr::Ring]));
    }

    #[test]
    fn ring_closures() {
        let p = parse("C1CCCCC1").unwrap();
        assert_eq!(p.bond_count(), 6);
        let p = parse("C%12CC%12").unwrap();
        assert_eq!(p.bond_count(), 3);
        let p = parse("C=1CC1").unwrap();
        let e = p.bond_between(n(0), n(2)).unwrap();
        assert_eq!(*p.bond(e), BondExpr::Double);
    }

    #[test]
    fn recursive_ids_are_unique() {
        let p = parse("[$(C[$(O)]),$(N)]C").unwrap();
        let ids: Vec<usize> = p
            .atom(n(0))
            .recursive_queries()
            .iter()
            .map(|q| q.id)
            .collect();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
        let AtomExpr::Or(parts) = p.atom(n(0)) else {
            panic!("expected Or");
        };
        let AtomExpr::Recursive(outer) = &parts[0] else {
            panic!("expected recursive");
        };
        let inner_ids: Vec<usize> = outer
            .pattern
            .atom(n(1))
            .recursive_queries()
            .iter()
            .map(|q| q.id)
            .collect();
        assert_eq!(inner_ids.len(), 1);
        assert!(!ids.contains(&inner_ids[0]));
    }

    #[test]
    fn chirality_normalized_to_reference_order() {
        // written order already ascending
        let a = parse("F[C@](Cl)(Br)I").unwrap();
        assert_eq!(a.atom(n(1)).chirality(), Chirality::Ccw);

        // the ring partner takes the slot where its label is written
        let ring = parse("[C@]1(F)(Cl)Br.I1").unwrap();
        assert_eq!(ring.atom(n(0)).chirality(), Chirality::Cw);

        let with_h = parse("F[C@H](Cl)Br").unwrap();
        assert_eq!(with_h.atom(n(1)).chirality(), Chirality::Cw);
    }

    #[test]
    fn errors() {
        assert_eq!(parse(""), Err(SmartsError::EmptyInput));
        assert_eq!(parse("   "), Err(SmartsError::EmptyInput));
        assert_eq!(parse("[C"), Err(SmartsError::UnclosedBracket { pos: 0 }));
        assert_eq!(parse("["), Err(SmartsError::UnclosedBracket { pos: 0 }));
        assert_eq!(parse("CC["), Err(SmartsError::UnclosedBracket { pos: 2 }));
        assert_eq!(parse("C1CC"), Err(SmartsError::UnclosedRing { digit: 1, pos: 1 }));
        assert_eq!(parse("C(C"), Err(SmartsError::UnmatchedParen { pos: 1 }));
        assert_eq!(parse("CC)"), Err(SmartsError::UnmatchedParen { pos: 2 }));
        assert_eq!(parse("[#999]"), Err(SmartsError::InvalidAtomicNum { pos: 1 }));
        assert_eq!(parse("[D999]"), Err(SmartsError::InvalidNumber { pos: 2 }));
        assert_eq!(parse("[$(CC]"), Err(SmartsError::UnclosedRecursive { pos: 1 }));
        assert_eq!(parse("CC="), Err(SmartsError::DanglingBond { pos: 2 }));
        assert_eq!(parse("1CC"), Err(SmartsError::InvalidRingBond { digit: 1, pos: 0 }));
        assert_eq!(parse("C11"), Err(SmartsError::DuplicateBond { digit: 1, pos: 2 }));
        assert_eq!(parse("C1C1"), Err(SmartsError::DuplicateBond { digit: 1, pos: 3 }));
        assert_eq!(parse("[C,]"), Err(SmartsError::MissingOperand { pos: 3 }));
        assert_eq!(parse("[]"), Err(SmartsError::MissingOperand { pos: 1 }));
        assert!(matches!(parse("C?"), Err(SmartsError::UnexpectedChar { pos: 1, ch: '?' })));
        assert_eq!(
            parse("C[$(C=)]"),
            Err(SmartsError::DanglingBond { pos: 5 })
        );
    }

    #[test]
    fn duplicate_ring_bond_rejected() {
        assert_eq!(parse("C1CC12"), Err(SmartsError::UnclosedRing { digit: 2, pos: 5 }));
        assert!(matches!(parse("C12CC12"), Err(SmartsError::DuplicateBond { digit: 2, .. })));
    }
}
