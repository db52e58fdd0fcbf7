//! First-order Taylor extrapolation from a previously solved equilibrium
//! state (spec.md §4.5, component C8): given sensitivities already computed
//! by [`crate::equilibrium::solver::EquilibriumSolver`], estimate a nearby
//! equilibrium without a full Newton solve. Used directly by
//! [`crate::equilibrium::smart::SmartEquilibriumSolver`] on a cache hit.

use argmin::prelude::{ArgminOp, Error as ArgminOpError, Executor};
use argmin::solver::brent::Brent;
use ndarray::Array1;

use crate::equilibrium::solver::{EquilibriumResult, EquilibriumSensitivity};
use crate::errors::{ReaktoroError, ReaktoroResult};

const DAMPING_TOL: f64 = 1e-10;
const DAMPING_MAX_ITER: u64 = 64;

/// A solved equilibrium state retained as an extrapolation basis: the
/// converged unknowns, the input values and conserved components they were
/// solved at, the chemical potentials at that point, and their sensitivities
/// (spec.md §4.5 "reference state").
#[derive(Debug, Clone)]
pub struct EquilibriumReferenceState {
    pub w0: Array1<f64>,
    pub c0: Array1<f64>,
    pub n0: Array1<f64>,
    pub p0: Array1<f64>,
    pub q0: Array1<f64>,
    pub u0: Array1<f64>,
    pub sensitivity: EquilibriumSensitivity,
}

impl EquilibriumReferenceState {
    pub fn new(w0: Array1<f64>, c0: Array1<f64>, u0: Array1<f64>, result: &EquilibriumResult) -> Self {
        Self {
            w0,
            c0,
            n0: result.n.clone(),
            p0: result.p.clone(),
            q0: result.q.clone(),
            u0,
            sensitivity: result.sensitivity.clone(),
        }
    }
}

/// A Taylor-extrapolated estimate and the damping factor applied to reach
/// it (spec.md §S3 "damped retry"): `alpha = 1` means the raw first-order
/// step was accepted as-is. `u` is the extrapolated chemical potential of
/// every species, the quantity [`crate::equilibrium::smart::SmartEquilibriumSolver`]'s
/// error test gates acceptance on (spec.md §4.5/§4.6).
#[derive(Debug, Clone)]
pub struct EquilibriumPrediction {
    pub n: Array1<f64>,
    pub p: Array1<f64>,
    pub q: Array1<f64>,
    pub u: Array1<f64>,
    pub alpha: f64,
}

/// Extrapolates species amounts and `p` controls from one
/// [`EquilibriumReferenceState`] to a nearby input vector `w`, damping the
/// step when the raw linear estimate would predict a negative species
/// amount (spec.md §4.5/§S3).
#[derive(Debug, Clone, Default)]
pub struct EquilibriumPredictor;

impl EquilibriumPredictor {
    pub fn new() -> Self {
        Self
    }

    /// Predict `(n, p, q, u)` at `(w, c)`, damping the step by a scalar
    /// `alpha in (0, 1]` if the full first-order step would drive any
    /// species amount negative. The damping factor is the root of the
    /// piecewise-linear "amount margin" function, found with `argmin`'s
    /// Brent solver rather than a closed form, since which species first
    /// hits its floor depends on which row of `dn/dw`/`dn/dc` dominates
    /// (spec.md §S3 resolves the "how much to damp" Open Question this way).
    ///
    /// Extrapolation follows both the input change `Δw = w - w0` and the
    /// component change `Δc = c - c0` (spec.md §4.5): a query that differs
    /// from the reference only in inlet composition, not in `T`/`P`/other
    /// declared inputs, still needs the `dn/dc`/`dp/dc` term to land near
    /// the true equilibrium.
    pub fn predict(
        &self,
        reference: &EquilibriumReferenceState,
        w: &Array1<f64>,
        c: &Array1<f64>,
        epsilon: f64,
    ) -> ReaktoroResult<EquilibriumPrediction> {
        let dw = w - &reference.w0;
        let dc = c - &reference.c0;
        let dn_full = reference.sensitivity.dndw.dot(&dw) + reference.sensitivity.dndc.dot(&dc);
        let dp_full = reference.sensitivity.dpdw.dot(&dw) + reference.sensitivity.dpdc.dot(&dc);
        let dq_full = reference.sensitivity.dqdw.dot(&dw) + reference.sensitivity.dqdc.dot(&dc);
        let du_full = reference.sensitivity.dudw.dot(&dw) + reference.sensitivity.dudc.dot(&dc);

        let margin = MarginOp {
            n0: reference.n0.clone(),
            dn: dn_full.clone(),
            epsilon,
        };

        let alpha = if margin.apply(&1.0).unwrap() >= 0.0 {
            1.0
        } else if margin.apply(&0.0).unwrap() < 0.0 {
            // The reference point itself is already infeasible under the
            // floor; nothing to extrapolate from.
            return Err(ReaktoroError::Infeasible);
        } else {
            let solver = Brent::new(0.0, 1.0, DAMPING_TOL);
            Executor::new(margin, solver, 0.5)
                .max_iters(DAMPING_MAX_ITER)
                .run()?
                .state
                .best_param
        };

        let n = &reference.n0 + &dn_full.mapv(|v| alpha * v);
        let p = &reference.p0 + &dp_full.mapv(|v| alpha * v);
        let q = &reference.q0 + &dq_full.mapv(|v| alpha * v);
        let u = &reference.u0 + &du_full.mapv(|v| alpha * v);
        Ok(EquilibriumPrediction { n, p, q, u, alpha })
    }
}

/// The smallest species-amount margin over `[0, epsilon]` at step `alpha`,
/// as a 1D root-finding problem for `argmin::solver::brent::Brent`: negative
/// where the step is infeasible, positive where it is not.
struct MarginOp {
    n0: Array1<f64>,
    dn: Array1<f64>,
    epsilon: f64,
}

impl ArgminOp for MarginOp {
    type Param = f64;
    type Output = f64;
    type Jacobian = ();
    type Hessian = ();
    type Float = f64;

    fn apply(&self, alpha: &Self::Param) -> Result<Self::Output, ArgminOpError> {
        let margin = self
            .n0
            .iter()
            .zip(self.dn.iter())
            .map(|(&n0i, &dni)| n0i + alpha * dni - self.epsilon)
            .fold(f64::INFINITY, f64::min);
        Ok(margin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn reference() -> EquilibriumReferenceState {
        let sensitivity = EquilibriumSensitivity {
            dndw: Array2::from_shape_vec((2, 1), vec![0.1, -0.2]).unwrap(),
            dpdw: Array2::zeros((0, 1)),
            dqdw: Array2::zeros((0, 1)),
            dydw: Array2::zeros((0, 1)),
            dndc: Array2::zeros((2, 0)),
            dpdc: Array2::zeros((0, 0)),
            dqdc: Array2::zeros((0, 0)),
            dydc: Array2::zeros((0, 0)),
            dudw: Array2::zeros((2, 1)),
            dudc: Array2::zeros((2, 0)),
        };
        EquilibriumReferenceState {
            w0: array![298.15],
            c0: Array1::zeros(0),
            n0: array![1.0, 0.05],
            p0: Array1::zeros(0),
            q0: Array1::zeros(0),
            u0: array![0.0, 0.0],
            sensitivity,
        }
    }

    #[test]
    fn small_step_uses_full_first_order_estimate() {
        let reference = reference();
        let predictor = EquilibriumPredictor::new();
        let w = array![298.35]; // dw = 0.2, n1 stays comfortably positive
        let c = Array1::zeros(0);
        let prediction = predictor.predict(&reference, &w, &c, 1e-12).unwrap();
        assert_eq!(prediction.alpha, 1.0);
        assert!((prediction.n[0] - (1.0 + 0.1 * 0.2)).abs() < 1e-9);
    }

    #[test]
    fn large_step_damps_to_stay_feasible() {
        let reference = reference();
        let predictor = EquilibriumPredictor::new();
        let w = array![400.0]; // dw = 101.85, dn_full[1] = -20.37, would go deeply negative
        let c = Array1::zeros(0);
        let prediction = predictor.predict(&reference, &w, &c, 1e-8).unwrap();
        assert!(prediction.alpha < 1.0);
        assert!(prediction.n[1] >= 1e-8 - 1e-9);
    }

    #[test]
    fn already_infeasible_reference_is_rejected() {
        let sensitivity = EquilibriumSensitivity {
            dndw: Array2::zeros((1, 1)),
            dpdw: Array2::zeros((0, 1)),
            dqdw: Array2::zeros((0, 1)),
            dydw: Array2::zeros((0, 1)),
            dndc: Array2::zeros((1, 0)),
            dpdc: Array2::zeros((0, 0)),
            dqdc: Array2::zeros((0, 0)),
            dydc: Array2::zeros((0, 0)),
            dudw: Array2::zeros((1, 1)),
            dudc: Array2::zeros((1, 0)),
        };
        let reference = EquilibriumReferenceState {
            w0: array![298.15],
            c0: Array1::zeros(0),
            n0: array![-1.0],
            p0: Array1::zeros(0),
            q0: Array1::zeros(0),
            u0: array![0.0],
            sensitivity,
        };
        let predictor = EquilibriumPredictor::new();
        let c = Array1::zeros(0);
        let result = predictor.predict(&reference, &array![298.15], &c, 1e-8);
        assert!(matches!(result, Err(ReaktoroError::Infeasible)));
    }
}
