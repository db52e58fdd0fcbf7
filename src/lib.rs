//! A generalized chemical equilibrium core.
//!
//! The hard part of modeling chemically reactive systems is solving the
//! equilibrium state of a [`core::ChemicalSystem`] under an arbitrary,
//! user-declared set of constraints: the caller chooses which thermodynamic
//! quantities are known inputs and which are unknowns, optionally opens the
//! system to one or more titrant substances, and optionally restricts some
//! reactions to be inert. [`equilibrium::specs::EquilibriumSpecs`] assembles
//! the resulting optimization problem declaratively;
//! [`equilibrium::solver::EquilibriumSolver`] drives it to a stationary
//! point with an interior-point Newton method, returning sensitivity
//! derivatives of every output with respect to every input; and
//! [`equilibrium::smart::SmartEquilibriumSolver`] can predict new equilibria
//! from previously solved reference states via first-order Taylor
//! extrapolation instead of solving from scratch.
//!
//! Database parsers, activity and standard-state thermodynamic models,
//! reactive transport, reaction kinetics, serialization formats and
//! language bindings are collaborators this crate consumes through the
//! [`models`] traits; none of them live here.

pub mod core;
pub mod equilibrium;
pub mod errors;
pub mod models;
pub mod props;
pub mod utils;

pub use crate::errors::{ReaktoroError, ReaktoroResult};

/// Verbosity level for iterative solvers.
///
/// Mirrors the `log_iter!`/`log_result!` reporting style used throughout
/// the solver loops: `None` prints nothing, `Iter` prints a one-line
/// summary per iteration, `IterAll` additionally echoes intermediate
/// vectors (species amounts, multipliers) useful when debugging a
/// non-converging problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum Verbosity {
    None,
    Iter,
    IterAll,
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::None
    }
}

/// Print a one-line iteration summary if `$verbosity >= Verbosity::Iter`.
#[macro_export]
macro_rules! log_iter {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::Verbosity::Iter {
            println!($($arg)*);
        }
    };
}

/// Print a final result summary if `$verbosity >= Verbosity::Iter`.
#[macro_export]
macro_rules! log_result {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::Verbosity::Iter {
            println!($($arg)*);
        }
    };
}

/// Print extra per-iteration detail only at [`Verbosity::IterAll`].
#[macro_export]
macro_rules! log_iter_all {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::Verbosity::IterAll {
            println!($($arg)*);
        }
    };
}
