//! Declarative chemical-equilibrium problem specification, oracle, solver,
//! predictor and smart (caching) solver (spec.md §4, components C3–C9).

pub mod conditions;
pub mod predictor;
pub mod restrictions;
pub mod setup;
pub mod smart;
pub mod solver;
pub mod specs;

pub use conditions::EquilibriumConditions;
pub use predictor::{EquilibriumPrediction, EquilibriumPredictor, EquilibriumReferenceState};
pub use restrictions::EquilibriumRestrictions;
pub use setup::{EquilibriumOptions, EquilibriumOracle, EquilibriumSetup, HessianMode};
pub use smart::{SmartEquilibriumOptions, SmartEquilibriumResult, SmartEquilibriumSolver};
pub use solver::{EquilibriumResult, EquilibriumSensitivity, EquilibriumSolver};
pub use specs::{
    ControlVariableP, ControlVariableQ, EquationConstraint, EquationConstraintKind,
    EquilibriumConservation, EquilibriumDims, EquilibriumSpecs, EquilibriumSpecsError,
    ReactivityConstraint,
};
