use crate::aromaticity::{perceive_aromaticity_with, AromaticityOptions};
use crate::mol::Molecule;
use crate::rings::{perceive_rings_with, RingInfo, RingOptions};

/// Annotates ring membership and aromaticity in place and returns the rings.
pub fn perceive(mol: &mut Molecule) -> RingInfo {
    perceive_with(mol, &RingOptions::default(), &AromaticityOptions::default())
}

pub fn perceive_with(
    mol: &mut Molecule,
    ring_options: &RingOptions,
    aromaticity_options: &AromaticityOptions,
) -> RingInfo {
    let rings = perceive_rings_with(mol, ring_options);
    perceive_aromaticity_with(mol, &rings, aromaticity_options);
    rings
}
