pub mod aromaticity;
pub mod atom;
pub mod bond;
pub mod canonical;
pub mod element;
pub mod graph_ops;
pub mod mol;
mod perceive;
pub mod rings;
pub mod smarts;
pub mod smiles;
pub mod substruct;
pub mod traits;
pub mod valence;

pub use aromaticity::{
    find_aromatic, perceive_aromaticity, perceive_aromaticity_with, AromaticSet, AromaticityOptions,
};
pub use atom::{Atom, Chirality};
pub use bond::{Bond, BondOrder, BondStereo};
pub use canonical::{canonical_ordering, CanonOptions, CanonicalOrdering, RootPolicy};
pub use element::Element;
pub use mol::{Mol, Molecule};
pub use perceive::{perceive, perceive_with};
pub use rings::{perceive_rings, perceive_rings_with, FusionTopology, RingInfo, RingOptions, RingSystem};
pub use smarts::{
    find_smarts_matches, from_smarts, get_smarts_match, get_smarts_matches, has_smarts_match,
    to_smarts, AtomExpr, BondExpr, Pattern, SmartsError,
};
pub use smiles::{
    from_smiles, parse_smiles, parse_smiles_with, to_canonical_smiles, to_canonical_smiles_with,
    to_smiles, ParseOptions, SmilesError, SmilesParse,
};
pub use substruct::{
    find_substruct_matches, get_substruct_match, get_substruct_matches, has_substruct_match,
    AtomMapping, MatchOptions, MatchResult, SearchStatus,
};
pub use traits::{
    HasAromaticity, HasAtomicNum, HasBondOrder, HasBondStereo, HasChirality, HasFormalCharge,
    HasHydrogenCount, HasIsotope, HasRingMembership,
};
