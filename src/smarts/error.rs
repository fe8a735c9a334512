/// Errors produced when compiling a SMARTS pattern string.
///
/// Any error rejects the whole pattern. Positions are character offsets
/// into the full input, including text inside recursive `$(...)` groups.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SmartsError {
    /// The input string was empty.
    #[error("empty SMARTS string")]
    EmptyInput,
    /// An unexpected character was encountered.
    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { pos: usize, ch: char },
    /// A bracket atom `[` was opened but never closed with `]`.
    #[error("unclosed bracket starting at position {pos}")]
    UnclosedBracket { pos: usize },
    /// A ring-closure label was opened and never closed.
    #[error("unclosed ring {digit} opened at position {pos}")]
    UnclosedRing { digit: u16, pos: usize },
    /// A parenthesis was opened without a matching close, or vice versa.
    #[error("unmatched parenthesis at position {pos}")]
    UnmatchedParen { pos: usize },
    /// An `#n` atomic number was missing or out of range.
    #[error("invalid atomic number at position {pos}")]
    InvalidAtomicNum { pos: usize },
    /// A numeric primitive overflowed its range.
    #[error("number out of range at position {pos}")]
    InvalidNumber { pos: usize },
    /// A recursive SMARTS `$( ... )` was opened but never closed.
    #[error("unclosed recursive SMARTS at position {pos}")]
    UnclosedRecursive { pos: usize },
    /// A bond expression is not followed by an atom or ring-closure label.
    #[error("bond at position {pos} is not followed by an atom")]
    DanglingBond { pos: usize },
    /// A ring-closure label appeared before any atom.
    #[error("ring bond {digit} at position {pos} has no atom to attach to")]
    InvalidRingBond { digit: u16, pos: usize },
    /// A ring closure would bond an atom to itself or repeat a bond.
    #[error("ring closure {digit} at position {pos} repeats an existing bond")]
    DuplicateBond { digit: u16, pos: usize },
    /// A bracket or bond expression ended where an operand was expected.
    #[error("expected an expression at position {pos}")]
    MissingOperand { pos: usize },
}

impl SmartsError {
    /// Approximate character offset of the problem, when known.
    pub fn position(&self) -> Option<usize> {
        match self {
            Self::EmptyInput => None,
            Self::UnexpectedChar { pos, .. }
            | Self::UnclosedBracket { pos }
            | Self::UnclosedRing { pos, .. }
            | Self::UnmatchedParen { pos }
            | Self::InvalidAtomicNum { pos }
            | Self::InvalidNumber { pos }
            | Self::UnclosedRecursive { pos }
            | Self::DanglingBond { pos }
            | Self::InvalidRingBond { pos, .. }
            | Self::DuplicateBond { pos, .. }
            | Self::MissingOperand { pos } => Some(*pos),
        }
    }
}
