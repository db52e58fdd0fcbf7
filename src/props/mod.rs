//! Cached thermodynamic properties of a [`crate::core::ChemicalSystem`]
//! (spec.md §3/§4.1, component C2), plus the aqueous-phase view `AqueousProps`
//! (spec.md §S1) built on top of it.

mod aqueous_props;
mod chemical_props;

pub use aqueous_props::{compute as compute_aqueous_props, AqueousProps};
pub use chemical_props::{
    ChemicalProps, ChemicalPropsPhase, FARADAY_CONSTANT, GAS_CONSTANT, STANDARD_PRESSURE_PA,
};
