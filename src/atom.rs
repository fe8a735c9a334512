use crate::element::Element;

/// Tetrahedral parity of a stereocenter.
///
/// The parity is stored relative to the atom's *reference order*: the
/// implicit hydrogen first (when the atom carries exactly one), followed by
/// its explicit neighbors in ascending atom index. Looking from the first
/// reference neighbor, `Ccw` means the remaining three appear
/// counterclockwise. The SMILES reader converts from notation order and the
/// writer converts back, so the stored value survives reordering of the
/// input text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Chirality {
    /// Not a stereocenter, or unspecified.
    #[default]
    None,
    /// Counterclockwise (`@`).
    Ccw,
    /// Clockwise (`@@`).
    Cw,
}

impl Chirality {
    pub fn inverted(self) -> Self {
        match self {
            Chirality::None => Chirality::None,
            Chirality::Ccw => Chirality::Cw,
            Chirality::Cw => Chirality::Ccw,
        }
    }

    pub fn is_specified(self) -> bool {
        self != Chirality::None
    }
}

/// Default atom type for a molecular graph node.
///
/// `Atom` stores the properties read off the notation (element, charge,
/// isotope, hydrogens, stereo, class) plus the flags derived by ring and
/// aromaticity perception.
///
/// # Examples
///
/// ```
/// use molgraph::Atom;
///
/// let carbon = Atom {
///     atomic_num: 6,
///     hydrogen_count: 3,
///     ..Atom::default()
/// };
/// assert_eq!(carbon.symbol(), "C");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Atom {
    /// Atomic number (1 = H, 6 = C, 7 = N, …). `0` is the wildcard atom `*`.
    pub atomic_num: u8,
    /// Formal charge in elementary charge units.
    pub formal_charge: i8,
    /// Mass number. `0` means natural isotopic abundance.
    pub isotope: u16,
    /// Number of hydrogens attached but not present as graph nodes.
    ///
    /// Holds the bracket count for bracket atoms and the value implied by
    /// the default valence model for organic-subset shorthand.
    pub hydrogen_count: u8,
    /// Whether this atom belongs to an aromatic ring. Written lowercase in
    /// the input, or set by aromaticity perception.
    pub is_aromatic: bool,
    /// Whether this atom lies on at least one cycle. Set by ring perception.
    pub in_ring: bool,
    /// Tetrahedral parity relative to the reference order.
    pub chirality: Chirality,
    /// Atom class / map number (`[CH3:7]`). `0` means unset.
    pub atom_class: u16,
    /// Set when hydrogens, charge and bond orders are inconsistent with
    /// every standard valence of the element.
    pub invalid_valence: bool,
}

impl Atom {
    pub fn new(element: Element) -> Self {
        Self {
            atomic_num: element.atomic_num(),
            ..Self::default()
        }
    }

    pub fn element(&self) -> Option<Element> {
        Element::from_atomic_num(self.atomic_num)
    }

    pub fn symbol(&self) -> &'static str {
        self.element().map_or("*", Element::symbol)
    }

    pub fn is_carbon(&self) -> bool {
        self.atomic_num == 6
    }
}

impl crate::traits::HasAtomicNum for Atom {
    fn atomic_num(&self) -> u8 {
        self.atomic_num
    }
}

impl crate::traits::HasFormalCharge for Atom {
    fn formal_charge(&self) -> i8 {
        self.formal_charge
    }
}

impl crate::traits::HasIsotope for Atom {
    fn isotope(&self) -> u16 {
        self.isotope
    }
}

impl crate::traits::HasHydrogenCount for Atom {
    fn hydrogen_count(&self) -> u8 {
        self.hydrogen_count
    }
}

impl crate::traits::HasAromaticity for Atom {
    fn is_aromatic(&self) -> bool {
        self.is_aromatic
    }
}

impl crate::traits::HasChirality for Atom {
    fn chirality(&self) -> Chirality {
        self.chirality
    }
}

impl crate::traits::HasRingMembership for Atom {
    fn in_ring(&self) -> bool {
        self.in_ring
    }
}
