/// Errors and warnings produced when reading a SMILES string.
///
/// Every variant except [`ValenceViolation`](SmilesError::ValenceViolation)
/// is a syntax error: the fragment it occurred in produces no molecule.
/// Positions are character offsets into the full input string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SmilesError {
    /// The input string was empty or contained only whitespace.
    #[error("empty SMILES string")]
    EmptyInput,
    /// An unexpected character was encountered.
    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { pos: usize, ch: char },
    /// An unrecognized element symbol was found inside brackets.
    #[error("invalid element '{text}' at position {pos}")]
    InvalidElement { pos: usize, text: String },
    /// A bracket atom `[` was opened but never closed with `]`.
    #[error("unclosed bracket atom starting at position {pos}")]
    UnclosedBracket { pos: usize },
    /// A ring-closure label was opened and never closed.
    #[error("unclosed ring {digit} opened at position {pos}")]
    UnclosedRing { digit: u16, pos: usize },
    /// A parenthesis was opened without a matching close, or vice versa.
    #[error("unmatched parenthesis at position {pos}")]
    UnmatchedParen { pos: usize },
    /// A charge specifier inside a bracket atom could not be parsed.
    #[error("invalid charge at position {pos}")]
    InvalidCharge { pos: usize },
    /// An isotope number overflowed.
    #[error("isotope overflow at position {pos}")]
    InvalidIsotope { pos: usize },
    /// A hydrogen count inside a bracket atom overflowed.
    #[error("invalid hydrogen count at position {pos}")]
    InvalidHCount { pos: usize },
    /// An atom class (`:n`) was missing its number or overflowed.
    #[error("invalid atom class at position {pos}")]
    InvalidAtomClass { pos: usize },
    /// A ring-closure label appeared before any atom.
    #[error("ring bond {digit} at position {pos} has no atom to attach to")]
    InvalidRingBond { digit: u16, pos: usize },
    /// The two ends of a ring closure specify different bond types.
    #[error("conflicting bond types on ring closure {digit} at position {pos}")]
    RingBondConflict { digit: u16, pos: usize },
    /// A ring closure would add a second bond between the same two atoms.
    #[error("duplicate bond at position {pos}")]
    DuplicateBond { pos: usize },
    /// A ring closure would bond an atom to itself.
    #[error("atom bonded to itself at position {pos}")]
    SelfBond { pos: usize },
    /// A bond symbol is not followed by an atom or ring-closure label.
    #[error("bond symbol at position {pos} is not followed by an atom")]
    DanglingBond { pos: usize },
    /// Warning: the atom's bonds, hydrogens and charge exceed every
    /// standard valence of its element. The molecule is still produced
    /// and the atom is flagged.
    #[error("atom {atom} at position {pos} has valence {valence}, above the allowed maximum {allowed}")]
    ValenceViolation {
        pos: usize,
        atom: usize,
        valence: u8,
        allowed: u8,
    },
}

impl SmilesError {
    /// Approximate character offset of the problem, when known.
    pub fn position(&self) -> Option<usize> {
        match self {
            Self::EmptyInput => None,
            Self::UnexpectedChar { pos, .. }
            | Self::InvalidElement { pos, .. }
            | Self::UnclosedBracket { pos }
            | Self::UnclosedRing { pos, .. }
            | Self::UnmatchedParen { pos }
            | Self::InvalidCharge { pos }
            | Self::InvalidIsotope { pos }
            | Self::InvalidHCount { pos }
            | Self::InvalidAtomClass { pos }
            | Self::InvalidRingBond { pos, .. }
            | Self::RingBondConflict { pos, .. }
            | Self::DuplicateBond { pos }
            | Self::SelfBond { pos }
            | Self::DanglingBond { pos }
            | Self::ValenceViolation { pos, .. } => Some(*pos),
        }
    }

    /// Warnings accompany a molecule; everything else replaces one.
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::ValenceViolation { .. })
    }
}
