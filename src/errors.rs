use num_dual::linalg::LinAlgError;
use thiserror::Error;

use crate::equilibrium::specs::EquilibriumSpecsError;

/// Error type for specification mistakes, infeasible problems and
/// convergence problems arising anywhere in the equilibrium core.
#[derive(Error, Debug)]
pub enum ReaktoroError {
    #[error("`{0}` did not converge within the maximum number of iterations.")]
    NotConverged(String),
    #[error("`{0}` encountered illegal values during the iteration.")]
    IterationFailed(String),
    #[error("The species `{0}` is not registered in the chemical system.")]
    UnknownSpecies(String),
    #[error("The element `{0}` is not registered in the chemical system.")]
    UnknownElement(String),
    #[error("The phase `{0}` is not registered in the chemical system.")]
    UnknownPhase(String),
    #[error("The input `{0}` is not registered in this equilibrium specification.")]
    UnknownInput(String),
    #[error("The bounds imposed on the species amounts are inconsistent with the conservation constraints (infeasible problem).")]
    Infeasible,
    #[error(transparent)]
    Specs(#[from] EquilibriumSpecsError),
    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
    #[error(transparent)]
    LinAlg(#[from] LinAlgError),
    #[error(transparent)]
    Argmin(#[from] argmin::core::Error),
}

/// Convenience type for `Result<T, ReaktoroError>`.
pub type ReaktoroResult<T> = Result<T, ReaktoroError>;
