use petgraph::graph::NodeIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BondOrder {
    #[default]
    Single,
    Double,
    Triple,
    Aromatic,
}

impl BondOrder {
    /// Contribution to the valence sum. Aromatic bonds count as one; the
    /// extra half-bond is accounted for by the aromatic atom itself.
    pub fn valence_contribution(self) -> u8 {
        match self {
            BondOrder::Single | BondOrder::Aromatic => 1,
            BondOrder::Double => 2,
            BondOrder::Triple => 3,
        }
    }

    /// Small integer code mixed into canonical labels.
    pub fn code(self) -> u64 {
        match self {
            BondOrder::Single => 1,
            BondOrder::Double => 2,
            BondOrder::Triple => 3,
            BondOrder::Aromatic => 4,
        }
    }

    pub fn symbol(self) -> char {
        match self {
            BondOrder::Single => '-',
            BondOrder::Double => '=',
            BondOrder::Triple => '#',
            BondOrder::Aromatic => ':',
        }
    }
}

/// Double-bond configuration.
///
/// The two atoms name one reference substituent on each end of the bond;
/// `Cis` places them on the same side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BondStereo {
    #[default]
    None,
    Cis(NodeIndex, NodeIndex),
    Trans(NodeIndex, NodeIndex),
}

impl BondStereo {
    pub fn refs(self) -> Option<(NodeIndex, NodeIndex)> {
        match self {
            BondStereo::None => None,
            BondStereo::Cis(a, b) | BondStereo::Trans(a, b) => Some((a, b)),
        }
    }

    pub fn is_cis(self) -> bool {
        matches!(self, BondStereo::Cis(..))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bond {
    pub order: BondOrder,
    pub stereo: BondStereo,
    /// Set by ring perception.
    pub in_ring: bool,
}

impl Bond {
    pub fn new(order: BondOrder) -> Self {
        Self {
            order,
            ..Self::default()
        }
    }
}

impl crate::traits::HasBondOrder for Bond {
    fn bond_order(&self) -> BondOrder {
        self.order
    }
}

impl crate::traits::HasBondStereo for Bond {
    fn bond_stereo(&self) -> BondStereo {
        self.stereo
    }
}

impl crate::traits::HasRingMembership for Bond {
    fn in_ring(&self) -> bool {
        self.in_ring
    }
}
