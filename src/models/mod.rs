//! External-collaborator interfaces the equilibrium core consumes.
//!
//! Database parsers (PHREEQC, SUPCRT, ThermoFun), activity-coefficient
//! models (HKF, Pitzer, Debye-Huckel, Peng-Robinson, Setschenow, …) and
//! standard-state thermodynamic models (HKF, Maier-Kelley, Holland-Powell,
//! NASA, const-lgK, …) are out of scope for this crate (spec.md §1): it
//! only defines the traits they must implement, plus a handful of trivial,
//! dependency-free reference implementations good enough to exercise the
//! equilibrium core end to end.
//!
//! Every model is generic over the automatic-differentiation scalar type,
//! following the same split `feos-core` uses for `HelmholtzEnergy`: a
//! generic, non-object-safe trait (`StandardThermoModelDual<D>`,
//! `ActivityModelDual<D>`) carries the actual math, and a thin, object-safe
//! supertrait (`StandardThermoModel`, `ActivityModel`) is what
//! [`crate::core::Species`] and [`crate::core::Phase`] actually store behind
//! an `Rc<dyn _>`, implemented for the two concrete scalar types the
//! equilibrium core evaluates with: plain `f64` for ordinary property
//! queries, and `Dual64` for the one-seed-at-a-time forward-mode sweeps of
//! [`crate::equilibrium::setup::EquilibriumSetup`].

mod activity;
mod reaction_thermo;
mod standard_thermo;

pub use activity::{
    ActivityModel, ActivityModelDual, ActivityProps, ConstantActivityModel, IdealActivityModel,
    SideChannel,
};
pub use reaction_thermo::{
    ConstLgKModel, ReactionStandardThermoModel, ReactionStandardThermoModelDual,
    ReactionStandardThermoProps,
};
pub use standard_thermo::{
    ConstantStandardThermoModel, StandardThermoModel, StandardThermoModelDual, StandardThermoProps,
};
