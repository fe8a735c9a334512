use crate::element::Element;
use crate::smiles::error::SmilesError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Atom(AtomToken),
    Bond { bond: BondToken, pos: usize },
    RingClosure {
        bond: Option<BondToken>,
        digit: u16,
        pos: usize,
    },
    OpenParen(usize),
    CloseParen(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtomToken {
    /// `0` for the wildcard `*`.
    pub atomic_num: u8,
    pub is_aromatic: bool,
    pub isotope: u16,
    pub chirality: ChiralityToken,
    pub hcount: Option<u8>,
    pub charge: i8,
    pub atom_class: u16,
    pub is_bracket: bool,
    pub pos: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChiralityToken {
    None,
    CounterClockwise,
    Clockwise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BondToken {
    Single,
    Double,
    Triple,
    Aromatic,
    Up,
    Down,
}

impl BondToken {
    pub fn is_directional(self) -> bool {
        matches!(self, BondToken::Up | BondToken::Down)
    }

    pub fn flipped(self) -> BondToken {
        match self {
            BondToken::Up => BondToken::Down,
            BondToken::Down => BondToken::Up,
            other => other,
        }
    }
}

/// Tokenizes a whole string as one fragment.
#[cfg(test)]
pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>, SmilesError> {
    let chars: Vec<char> = input.chars().collect();
    tokenize_fragment(&chars, 0, chars.len())
}

/// Tokenizes `chars[start..end]`, reporting positions relative to the start
/// of `chars`.
pub fn tokenize_fragment(
    chars: &[char],
    start: usize,
    end: usize,
) -> Result<Vec<Token>, SmilesError> {
    let chars = &chars[..end];
    let mut tokens = Vec::new();
    let mut i = start;

    while i < chars.len() {
        let next = chars.get(i + 1).copied();
        match chars[i] {
            ' ' | '\t' | '\r' | '\n' => {
                i += 1;
            }
            '[' => {
                let (tok, next) = parse_bracket_atom(chars, i)?;
                tokens.push(Token::Atom(tok));
                i = next;
            }
            'B' if next == Some('r') => {
                tokens.push(Token::Atom(bare_atom(Element::Br, false, i)));
                i += 2;
            }
            'C' if next == Some('l') => {
                tokens.push(Token::Atom(bare_atom(Element::Cl, false, i)));
                i += 2;
            }
            c @ ('B' | 'C' | 'N' | 'O' | 'P' | 'S' | 'F' | 'I') => {
                let element = Element::from_symbol(c.encode_utf8(&mut [0; 4]))
                    .ok_or(SmilesError::UnexpectedChar { pos: i, ch: c })?;
                tokens.push(Token::Atom(bare_atom(element, false, i)));
                i += 1;
            }
            c @ ('b' | 'c' | 'n' | 'o' | 'p' | 's') => {
                let element = Element::from_aromatic_symbol(c.encode_utf8(&mut [0; 4]))
                    .ok_or(SmilesError::UnexpectedChar { pos: i, ch: c })?;
                tokens.push(Token::Atom(bare_atom(element, true, i)));
                i += 1;
            }
            '*' => {
                let mut tok = bare_atom(Element::C, false, i);
                tok.atomic_num = 0;
                tokens.push(Token::Atom(tok));
                i += 1;
            }
            c @ ('-' | '=' | '#' | ':' | '/' | '\\') => {
                let bond = match c {
                    '-' => BondToken::Single,
                    '=' => BondToken::Double,
                    '#' => BondToken::Triple,
                    ':' => BondToken::Aromatic,
                    '/' => BondToken::Up,
                    _ => BondToken::Down,
                };
                tokens.push(Token::Bond { bond, pos: i });
                i += 1;
            }
            '(' => {
                tokens.push(Token::OpenParen(i));
                i += 1;
            }
            ')' => {
                tokens.push(Token::CloseParen(i));
                i += 1;
            }
            '%' => {
                let (digit, next) = parse_percent_ring(chars, i)?;
                let bond = try_consume_pending_bond(&mut tokens);
                tokens.push(Token::RingClosure { bond, digit, pos: i });
                i = next;
            }
            d @ '0'..='9' => {
                let bond = try_consume_pending_bond(&mut tokens);
                tokens.push(Token::RingClosure {
                    bond,
                    digit: (d as u16) - b'0' as u16,
                    pos: i,
                });
                i += 1;
            }
            ch => return Err(SmilesError::UnexpectedChar { pos: i, ch }),
        }
    }

    Ok(tokens)
}

fn bare_atom(element: Element, aromatic: bool, pos: usize) -> AtomToken {
    AtomToken {
        atomic_num: element.atomic_num(),
        is_aromatic: aromatic,
        isotope: 0,
        chirality: ChiralityToken::None,
        hcount: None,
        charge: 0,
        atom_class: 0,
        is_bracket: false,
        pos,
    }
}

/// A bond symbol directly before a ring-closure label belongs to the
/// closure, not to the next atom.
fn try_consume_pending_bond(tokens: &mut Vec<Token>) -> Option<BondToken> {
    if let Some(Token::Bond { bond, .. }) = tokens.last() {
        let bond = *bond;
        tokens.pop();
        return Some(bond);
    }
    None
}

fn parse_percent_ring(chars: &[char], start: usize) -> Result<(u16, usize), SmilesError> {
    let i = start + 1;
    if i + 1 >= chars.len() || !chars[i].is_ascii_digit() || !chars[i + 1].is_ascii_digit() {
        return Err(SmilesError::UnexpectedChar {
            pos: start,
            ch: '%',
        });
    }
    let d1 = (chars[i] as u16) - b'0' as u16;
    let d2 = (chars[i + 1] as u16) - b'0' as u16;
    Ok((d1 * 10 + d2, i + 2))
}

fn parse_bracket_atom(chars: &[char], start: usize) -> Result<(AtomToken, usize), SmilesError> {
    let mut i = start + 1;

    let isotope = parse_isotope(chars, &mut i)?;
    let (atomic_num, is_aromatic) = parse_bracket_element(chars, &mut i, start)?;
    let chirality = parse_chirality(chars, &mut i);
    let hcount = parse_hcount(chars, &mut i)?;
    let charge = parse_charge(chars, &mut i, start)?;
    let atom_class = parse_atom_class(chars, &mut i)?;

    if i >= chars.len() {
        return Err(SmilesError::UnclosedBracket { pos: start });
    }
    if chars[i] != ']' {
        return Err(SmilesError::UnexpectedChar { pos: i, ch: chars[i] });
    }
    i += 1;

    Ok((
        AtomToken {
            atomic_num,
            is_aromatic,
            isotope,
            chirality,
            hcount: Some(hcount.unwrap_or(0)),
            charge,
            atom_class,
            is_bracket: true,
            pos: start,
        },
        i,
    ))
}

fn parse_number<T>(chars: &[char], i: &mut usize, err: SmilesError) -> Result<Option<T>, SmilesError>
where
    T: TryFrom<u32>,
{
    let mut val: u32 = 0;
    let mut found = false;
    while *i < chars.len() && chars[*i].is_ascii_digit() {
        found = true;
        val = val
            .checked_mul(10)
            .and_then(|v| v.checked_add(chars[*i] as u32 - '0' as u32))
            .ok_or_else(|| err.clone())?;
        *i += 1;
    }
    if !found {
        return Ok(None);
    }
    T::try_from(val).map(Some).map_err(|_| err)
}

fn parse_isotope(chars: &[char], i: &mut usize) -> Result<u16, SmilesError> {
    let pos = *i;
    Ok(parse_number::<u16>(chars, i, SmilesError::InvalidIsotope { pos })?.unwrap_or(0))
}

fn parse_bracket_element(
    chars: &[char],
    i: &mut usize,
    bracket_start: usize,
) -> Result<(u8, bool), SmilesError> {
    if *i >= chars.len() {
        return Err(SmilesError::UnclosedBracket {
            pos: bracket_start,
        });
    }
    if chars[*i] == '*' {
        *i += 1;
        return Ok((0, false));
    }

    // Two-letter aromatic symbols before single letters, so `[se]` is
    // selenium rather than sulfur followed by junk.
    for len in [2, 1] {
        if *i + len <= chars.len() {
            let sym: String = chars[*i..*i + len].iter().collect();
            if let Some(e) = Element::from_aromatic_symbol(&sym) {
                *i += len;
                return Ok((e.atomic_num(), true));
            }
        }
    }

    if *i + 1 < chars.len() && chars[*i].is_ascii_uppercase() && chars[*i + 1].is_ascii_lowercase()
    {
        let sym: String = chars[*i..=*i + 1].iter().collect();
        if let Some(e) = Element::from_symbol(&sym) {
            *i += 2;
            return Ok((e.atomic_num(), false));
        }
    }

    if chars[*i].is_ascii_uppercase() {
        let sym: String = chars[*i..=*i].iter().collect();
        if let Some(e) = Element::from_symbol(&sym) {
            *i += 1;
            return Ok((e.atomic_num(), false));
        }
    }

    let text: String = chars[*i..]
        .iter()
        .take_while(|c| c.is_ascii_alphabetic())
        .take(2)
        .collect();
    Err(SmilesError::InvalidElement {
        pos: *i,
        text: if text.is_empty() {
            chars[*i].to_string()
        } else {
            text
        },
    })
}

/// `@`, `@@`, and the explicit `@TH1`/`@TH2` spellings of the same two
/// tetrahedral classes.
fn parse_chirality(chars: &[char], i: &mut usize) -> ChiralityToken {
    if *i >= chars.len() || chars[*i] != '@' {
        return ChiralityToken::None;
    }
    *i += 1;
    if *i < chars.len() && chars[*i] == '@' {
        *i += 1;
        return ChiralityToken::Clockwise;
    }
    if *i + 2 < chars.len() && chars[*i] == 'T' && chars[*i + 1] == 'H' {
        match chars[*i + 2] {
            '1' => {
                *i += 3;
                return ChiralityToken::CounterClockwise;
            }
            '2' => {
                *i += 3;
                return ChiralityToken::Clockwise;
            }
            _ => {}
        }
    }
    ChiralityToken::CounterClockwise
}

fn parse_hcount(chars: &[char], i: &mut usize) -> Result<Option<u8>, SmilesError> {
    if *i >= chars.len() || chars[*i] != 'H' {
        return Ok(None);
    }
    let pos = *i;
    *i += 1;
    let count = parse_number::<u8>(chars, i, SmilesError::InvalidHCount { pos })?;
    Ok(Some(count.unwrap_or(1)))
}

fn parse_charge(chars: &[char], i: &mut usize, bracket_start: usize) -> Result<i8, SmilesError> {
    if *i >= chars.len() {
        return Ok(0);
    }
    let sign: i8 = match chars[*i] {
        '+' => 1,
        '-' => -1,
        _ => return Ok(0),
    };
    let symbol = chars[*i];
    *i += 1;

    if *i < chars.len() && chars[*i] == symbol {
        let mut count: i8 = sign;
        while *i < chars.len() && chars[*i] == symbol {
            count = count
                .checked_add(sign)
                .ok_or(SmilesError::InvalidCharge { pos: bracket_start })?;
            *i += 1;
        }
        return Ok(count);
    }

    let magnitude = parse_number::<i8>(chars, i, SmilesError::InvalidCharge { pos: bracket_start })?;
    Ok(sign * magnitude.unwrap_or(1))
}

fn parse_atom_class(chars: &[char], i: &mut usize) -> Result<u16, SmilesError> {
    if *i >= chars.len() || chars[*i] != ':' {
        return Ok(0);
    }
    let pos = *i;
    *i += 1;
    parse_number::<u16>(chars, i, SmilesError::InvalidAtomClass { pos })?
        .ok_or(SmilesError::InvalidAtomClass { pos })
}
