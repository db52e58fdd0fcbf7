//! Interior-point Newton driver for the equilibrium oracle (spec.md §4.4,
//! component C7): solves `(n, q, p, y, z)` to a stationary point of the
//! Lagrangian and reports sensitivity derivatives of every unknown with
//! respect to every input `w`.

use std::rc::Rc;

use ndarray::{s, Array1, Array2};
use num_dual::linalg::LU;

use crate::core::ChemicalState;
use crate::equilibrium::conditions::EquilibriumConditions;
use crate::equilibrium::restrictions::EquilibriumRestrictions;
use crate::equilibrium::setup::EquilibriumSetup;
use crate::equilibrium::specs::EquilibriumSpecs;
use crate::errors::{ReaktoroError, ReaktoroResult};
use crate::{log_iter, log_iter_all, log_result};

/// Sensitivity derivatives of the solved unknowns with respect to the input
/// vector `w` and the conserved-component vector `c` (spec.md §4.4/§6: the
/// full `dn/dw, dp/dw, dq/dw, dn/dc, dp/dc, dq/dc, du/dw, du/dc` block the
/// predictor and smart solver consume), computed at no extra Newton solve by
/// reusing the converged KKT matrix factorization.
#[derive(Debug, Clone)]
pub struct EquilibriumSensitivity {
    /// `∂n/∂w`, `N x Nw`.
    pub dndw: Array2<f64>,
    /// `∂p/∂w`, `Np x Nw`.
    pub dpdw: Array2<f64>,
    /// `∂q/∂w`, `Nq x Nw`.
    pub dqdw: Array2<f64>,
    /// `∂y/∂w`, `Nc x Nw` (shadow prices of the conservation constraints).
    pub dydw: Array2<f64>,
    /// `∂n/∂c`, `N x Nc`.
    pub dndc: Array2<f64>,
    /// `∂p/∂c`, `Np x Nc`.
    pub dpdc: Array2<f64>,
    /// `∂q/∂c`, `Nq x Nc`.
    pub dqdc: Array2<f64>,
    /// `∂y/∂c`, `Nc x Nc`.
    pub dydc: Array2<f64>,
    /// `∂u/∂w`, `N x Nw`: chemical-potential sensitivity to the inputs.
    pub dudw: Array2<f64>,
    /// `∂u/∂c`, `N x Nc`: chemical-potential sensitivity to the conserved
    /// components.
    pub dudc: Array2<f64>,
}

/// Outcome of [`EquilibriumSolver::solve`]: the converged point plus
/// iteration count and sensitivities.
#[derive(Debug, Clone)]
pub struct EquilibriumResult {
    pub n: Array1<f64>,
    pub q: Array1<f64>,
    pub p: Array1<f64>,
    pub y: Array1<f64>,
    pub z: Array1<f64>,
    pub iterations: usize,
    pub sensitivity: EquilibriumSensitivity,
}

/// Solves the KKT stationarity system of the log-barrier-regularized
/// Gibbs-energy minimization problem [`EquilibriumSetup`] defines, via
/// full-Newton steps on the unknowns `x = (n, q)`, `p`, and multipliers
/// `(y, z)` for the linear conservation and nonlinear equation constraints
/// (spec.md §4.3/§4.4).
#[derive(Debug, Clone)]
pub struct EquilibriumSolver {
    setup: EquilibriumSetup,
}

impl EquilibriumSolver {
    pub fn new(specs: Rc<EquilibriumSpecs>, options: crate::equilibrium::setup::EquilibriumOptions) -> Self {
        Self {
            setup: EquilibriumSetup::new(specs, options),
        }
    }

    pub fn setup(&self) -> &EquilibriumSetup {
        &self.setup
    }

    /// Solve the equilibrium problem, warm-starting `n`/`p` from `state` and
    /// writing the converged species amounts back into it on success.
    pub fn solve(
        &self,
        state: &mut ChemicalState,
        conditions: &EquilibriumConditions,
        restrictions: &EquilibriumRestrictions,
    ) -> ReaktoroResult<EquilibriumResult> {
        let specs = self.setup.specs();
        let dims = specs.dims();
        let conservation = self.setup.conservation();
        let options = self.setup.options();

        let n0 = state.n().clone();
        let (lower, upper) = restrictions.resolve_bounds(&n0, options.epsilon);
        let mut n = n0.clone();
        for i in 0..n.len() {
            n[i] = n0[i].max(lower[i]).min(if upper[i].is_finite() { upper[i] } else { f64::INFINITY });
        }
        let mut q: Array1<f64> = Array1::zeros(dims.q);
        let mut p: Array1<f64> = Array1::from_elem(dims.p, 0.0);
        for i in 0..dims.p {
            let lo = conditions.p_lower()[i];
            let hi = conditions.p_upper()[i];
            p[i] = if lo.is_finite() && hi.is_finite() {
                0.5 * (lo + hi)
            } else if lo.is_finite() {
                lo
            } else if hi.is_finite() {
                hi
            } else {
                298.15 // a reasonable default seed for unknown T/P-like controls
            };
        }
        let w = conditions.w().clone();
        let b = self.conservation_rhs(&w, specs, &n0);

        let num_c = dims.c;
        let mut y: Array1<f64> = Array1::zeros(num_c);
        let mut z: Array1<f64> = Array1::zeros(0); // resized once Nv is known

        let mut primary_species: Vec<usize> = (0..dims.n).collect();
        let mut iterations = 0;
        let mut last_oracle = None;

        for iter in 1..=options.max_iterations {
            let oracle = self.setup.evaluate(&n, &p, &w, &primary_species);
            let num_v = oracle.v.len();
            if z.len() != num_v {
                z = Array1::zeros(num_v);
            }

            let w_x = stack_wn_wq(&conservation.w_n, &conservation.w_q);
            let r_c = w_x.dot(&stack_nq(&n, &q)) + conservation.w_p.dot(&p) - &b;
            let r_v = oracle.v.clone();

            let vx = stack_vn_vq(&oracle.dv_dn, dims.q);
            let g_x = stack_nq(&oracle.grad_n, &Array1::zeros(dims.q)) + w_x.t().dot(&y) + vx.t().dot(&z);
            let g_p = &oracle.grad_p + &conservation.w_p.t().dot(&y) + &oracle.dv_dp.t().dot(&z);

            let residual_norm = g_x.dot(&g_x).sqrt() + g_p.dot(&g_p).sqrt() + r_c.dot(&r_c).sqrt() + r_v.dot(&r_v).sqrt();
            log_iter!(
                options.verbosity,
                " iter {:4} | residual {:.6e} | species {}",
                iter,
                residual_norm,
                dims.n
            );
            log_iter_all!(options.verbosity, "   n = {:?}", n);

            if residual_norm < options.tolerance {
                iterations = iter;
                last_oracle = Some(oracle);
                break;
            }

            let h_xx = stack_hxx(&oracle.h_nn, dims.q);
            let h_xp_full = stack_rows(&oracle.h_np, dims.q);

            let (dx, dp, dy, dz) =
                newton_step(&h_xx, &h_xp_full, &h_xp_full.t().to_owned(), &Array2::zeros((dims.p, dims.p)), &w_x, &conservation.w_p, &vx, &oracle.dv_dp, &g_x, &g_p, &r_c, &r_v)?;

            let (dn, dq) = split_nq(&dx, dims.n);
            apply_bounded_step(&mut n, &dn, &lower, &upper, 0.99);
            q += &dq;
            p += &dp;
            y += &dy;
            z += &dz;

            primary_species = primary_species_from_amounts(&n, dims.n.min(dims.c));
            iterations = iter;
            last_oracle = Some(self.setup.evaluate(&n, &p, &w, &primary_species));
        }

        let oracle = last_oracle.ok_or_else(|| ReaktoroError::NotConverged("EquilibriumSolver".to_string()))?;
        if iterations == options.max_iterations {
            let final_residual = oracle.v.dot(&oracle.v).sqrt();
            if final_residual > options.tolerance {
                return Err(ReaktoroError::NotConverged("EquilibriumSolver".to_string()));
            }
        }

        state.set_n(n.clone());
        if let Some(idx) = specs.temperature_input_index() {
            state.set_temperature(w[idx]);
        } else if let Some(idx) = specs.temperature_p_index() {
            state.set_temperature(p[idx]);
        }
        if let Some(idx) = specs.pressure_input_index() {
            state.set_pressure(w[idx]);
        } else if let Some(idx) = specs.pressure_p_index() {
            state.set_pressure(p[idx]);
        }

        let sensitivity = self.sensitivity(&n, &p, &w, &y, &z, &primary_species)?;

        state.set_aux(crate::core::EquilibriumAux {
            w: w.clone(),
            c: b.clone(),
            p: p.clone(),
            q: q.clone(),
            y: y.clone(),
            z: z.clone(),
            primary_species: primary_species.clone(),
        });

        log_result!(options.verbosity, "EquilibriumSolver converged in {} iteration(s)\n", iterations);

        Ok(EquilibriumResult {
            n,
            q,
            p,
            y,
            z,
            iterations,
            sensitivity,
        })
    }

    fn conservation_rhs(&self, w: &Array1<f64>, specs: &EquilibriumSpecs, n0: &Array1<f64>) -> Array1<f64> {
        let _ = w;
        specs.initial_components(n0)
    }

    /// Sensitivity derivatives `dn/dw`, `dp/dw`, `dq/dw`, `dy/dw`, and the
    /// matching `d·/dc` block, via one linear solve per input/component
    /// column, reusing the converged oracle's Jacobians and a single KKT
    /// factorization (spec.md §4.4/§6). Assumes temperature/pressure are
    /// never declared both as a direct input and as an unknown control
    /// variable at once (the specs builder only ever takes one of
    /// `temperature()`/`unknown_temperature()`), so `∂²f/∂p∂w` is always
    /// zero and does not need to be tracked.
    ///
    /// The conservation residual `r_c = W_x x + W_p p - b` is linear in `b`
    /// with coefficient `-I`, so each `c`-column solve is a KKT solve
    /// against a unit right-hand side in the conservation-row block, no
    /// oracle re-evaluation needed. `du/dw` and `du/dc` then follow from the
    /// chain rule through `u`'s own partial derivatives (`h_nn`, `h_np`,
    /// `h_nw`, already expressed as `∂(u/RT)/∂·`).
    fn sensitivity(
        &self,
        n: &Array1<f64>,
        p: &Array1<f64>,
        w: &Array1<f64>,
        y: &Array1<f64>,
        z: &Array1<f64>,
        primary_species: &[usize],
    ) -> ReaktoroResult<EquilibriumSensitivity> {
        let dims = self.setup.specs().dims();
        let conservation = self.setup.conservation();
        let oracle = self.setup.evaluate(n, p, w, primary_species);

        let w_x = stack_wn_wq(&conservation.w_n, &conservation.w_q);
        let vx = stack_vn_vq(&oracle.dv_dn, dims.q);
        let h_xx = stack_hxx(&oracle.h_nn, dims.q);
        let h_xp_full = stack_rows(&oracle.h_np, dims.q);

        let num_x = dims.n + dims.q;
        let num_p = dims.p;
        let num_c = dims.c;
        let num_v = oracle.v.len();
        let dim = num_x + num_p + num_c + num_v;

        let kkt = assemble_kkt(&h_xx, &h_xp_full, &h_xp_full.t().to_owned(), &Array2::zeros((num_p, num_p)), &w_x, &conservation.w_p, &vx, &oracle.dv_dp);
        let lu = LU::new(kkt)?;

        let mut dndw = Array2::zeros((dims.n, dims.w));
        let mut dqdw = Array2::zeros((dims.q, dims.w));
        let mut dpdw = Array2::zeros((dims.p, dims.w));
        let mut dydw = Array2::zeros((num_c, dims.w));

        for (col, h_nw_col) in oracle.h_nw.columns().into_iter().enumerate() {
            let mut rhs = Array1::zeros(dim);
            rhs.slice_mut(s![0..dims.n]).assign(&h_nw_col.mapv(|v| -v));
            rhs.slice_mut(s![num_x + num_p + num_c..dim]).assign(&oracle.dv_dw.column(col).mapv(|v: f64| -v));
            let sol = lu.solve(&rhs);
            dndw.column_mut(col).assign(&sol.slice(s![0..dims.n]));
            dqdw.column_mut(col).assign(&sol.slice(s![dims.n..num_x]));
            dpdw.column_mut(col).assign(&sol.slice(s![num_x..num_x + num_p]));
            dydw.column_mut(col).assign(&sol.slice(s![num_x + num_p..num_x + num_p + num_c]));
        }

        let mut dndc = Array2::zeros((dims.n, num_c));
        let mut dqdc = Array2::zeros((dims.q, num_c));
        let mut dpdc = Array2::zeros((dims.p, num_c));
        let mut dydc = Array2::zeros((num_c, num_c));

        for col in 0..num_c {
            let mut rhs = Array1::zeros(dim);
            rhs[num_x + num_p + col] = 1.0;
            let sol = lu.solve(&rhs);
            dndc.column_mut(col).assign(&sol.slice(s![0..dims.n]));
            dqdc.column_mut(col).assign(&sol.slice(s![dims.n..num_x]));
            dpdc.column_mut(col).assign(&sol.slice(s![num_x..num_x + num_p]));
            dydc.column_mut(col).assign(&sol.slice(s![num_x + num_p..num_x + num_p + num_c]));
        }

        let rt = crate::props::GAS_CONSTANT * oracle.chemical.temperature();
        let dudw = (oracle.h_nn.dot(&dndw) + oracle.h_np.dot(&dpdw) + &oracle.h_nw).mapv(|v| v * rt);
        let dudc = (oracle.h_nn.dot(&dndc) + oracle.h_np.dot(&dpdc)).mapv(|v| v * rt);

        let _ = y;
        let _ = z;
        Ok(EquilibriumSensitivity {
            dndw,
            dpdw,
            dqdw,
            dydw,
            dndc,
            dpdc,
            dqdc,
            dydc,
            dudw,
            dudc,
        })
    }
}

fn stack_nq(n: &Array1<f64>, q: &Array1<f64>) -> Array1<f64> {
    let mut out = Array1::zeros(n.len() + q.len());
    out.slice_mut(s![0..n.len()]).assign(n);
    out.slice_mut(s![n.len()..]).assign(q);
    out
}

fn split_nq(x: &Array1<f64>, num_n: usize) -> (Array1<f64>, Array1<f64>) {
    (x.slice(s![0..num_n]).to_owned(), x.slice(s![num_n..]).to_owned())
}

fn stack_wn_wq(w_n: &Array2<f64>, w_q: &Array2<f64>) -> Array2<f64> {
    let (rows, n_cols) = w_n.dim();
    let q_cols = w_q.ncols();
    let mut out = Array2::zeros((rows, n_cols + q_cols));
    out.slice_mut(s![.., 0..n_cols]).assign(w_n);
    out.slice_mut(s![.., n_cols..]).assign(w_q);
    out
}

/// `[dv/dn | 0]`: the nonlinear constraint Jacobian never depends on `q`.
fn stack_vn_vq(dv_dn: &Array2<f64>, num_q: usize) -> Array2<f64> {
    let (rows, n_cols) = dv_dn.dim();
    let mut out = Array2::zeros((rows, n_cols + num_q));
    out.slice_mut(s![.., 0..n_cols]).assign(dv_dn);
    out
}

/// `H_xx`, `Nx x Nx` with zero rows/cols for `q` (the objective does not
/// depend on `q`).
fn stack_hxx(h_nn: &Array2<f64>, num_q: usize) -> Array2<f64> {
    let (rows, cols) = h_nn.dim();
    let mut out = Array2::zeros((rows + num_q, cols + num_q));
    out.slice_mut(s![0..rows, 0..cols]).assign(h_nn);
    out
}

/// `H_xp`, `Nx x Np` with zero rows for `q`.
fn stack_rows(h_np: &Array2<f64>, num_q: usize) -> Array2<f64> {
    let (rows, cols) = h_np.dim();
    let mut out = Array2::zeros((rows + num_q, cols));
    out.slice_mut(s![0..rows, ..]).assign(h_np);
    out
}

#[allow(clippy::too_many_arguments)]
fn assemble_kkt(
    h_xx: &Array2<f64>,
    h_xp: &Array2<f64>,
    h_px: &Array2<f64>,
    h_pp: &Array2<f64>,
    w_x: &Array2<f64>,
    w_p: &Array2<f64>,
    vx: &Array2<f64>,
    vp: &Array2<f64>,
) -> Array2<f64> {
    let num_x = h_xx.nrows();
    let num_p = h_pp.nrows();
    let num_c = w_x.nrows();
    let num_v = vx.nrows();
    let dim = num_x + num_p + num_c + num_v;
    let mut kkt = Array2::zeros((dim, dim));

    kkt.slice_mut(s![0..num_x, 0..num_x]).assign(h_xx);
    kkt.slice_mut(s![0..num_x, num_x..num_x + num_p]).assign(h_xp);
    kkt.slice_mut(s![0..num_x, num_x + num_p..num_x + num_p + num_c]).assign(&w_x.t());
    kkt.slice_mut(s![0..num_x, num_x + num_p + num_c..]).assign(&vx.t());

    kkt.slice_mut(s![num_x..num_x + num_p, 0..num_x]).assign(h_px);
    kkt.slice_mut(s![num_x..num_x + num_p, num_x..num_x + num_p]).assign(h_pp);
    kkt.slice_mut(s![num_x..num_x + num_p, num_x + num_p..num_x + num_p + num_c])
        .assign(&w_p.t());
    kkt.slice_mut(s![num_x..num_x + num_p, num_x + num_p + num_c..]).assign(&vp.t());

    kkt.slice_mut(s![num_x + num_p..num_x + num_p + num_c, 0..num_x]).assign(w_x);
    kkt.slice_mut(s![num_x + num_p..num_x + num_p + num_c, num_x..num_x + num_p]).assign(w_p);

    kkt.slice_mut(s![num_x + num_p + num_c.., 0..num_x]).assign(vx);
    kkt.slice_mut(s![num_x + num_p + num_c.., num_x..num_x + num_p]).assign(vp);

    kkt
}

#[allow(clippy::too_many_arguments)]
fn newton_step(
    h_xx: &Array2<f64>,
    h_xp: &Array2<f64>,
    h_px: &Array2<f64>,
    h_pp: &Array2<f64>,
    w_x: &Array2<f64>,
    w_p: &Array2<f64>,
    vx: &Array2<f64>,
    vp: &Array2<f64>,
    g_x: &Array1<f64>,
    g_p: &Array1<f64>,
    r_c: &Array1<f64>,
    r_v: &Array1<f64>,
) -> ReaktoroResult<(Array1<f64>, Array1<f64>, Array1<f64>, Array1<f64>)> {
    let num_x = g_x.len();
    let num_p = g_p.len();
    let num_c = r_c.len();
    let num_v = r_v.len();

    let kkt = assemble_kkt(h_xx, h_xp, h_px, h_pp, w_x, w_p, vx, vp);
    let mut rhs = Array1::zeros(num_x + num_p + num_c + num_v);
    rhs.slice_mut(s![0..num_x]).assign(&g_x.mapv(|v| -v));
    rhs.slice_mut(s![num_x..num_x + num_p]).assign(&g_p.mapv(|v| -v));
    rhs.slice_mut(s![num_x + num_p..num_x + num_p + num_c]).assign(&r_c.mapv(|v| -v));
    rhs.slice_mut(s![num_x + num_p + num_c..]).assign(&r_v.mapv(|v| -v));

    let lu = LU::new(kkt)?;
    let sol = lu.solve(&rhs);

    let dx = sol.slice(s![0..num_x]).to_owned();
    let dp = sol.slice(s![num_x..num_x + num_p]).to_owned();
    let dy = sol.slice(s![num_x + num_p..num_x + num_p + num_c]).to_owned();
    let dz = sol.slice(s![num_x + num_p + num_c..]).to_owned();
    Ok((dx, dp, dy, dz))
}

/// Apply a Newton step to `n`, scaled down (fraction-to-the-boundary rule,
/// spec.md §4.4) so every component stays strictly within `[lower, upper]`.
fn apply_bounded_step(n: &mut Array1<f64>, dn: &Array1<f64>, lower: &Array1<f64>, upper: &Array1<f64>, tau: f64) {
    let mut alpha = 1.0_f64;
    for i in 0..n.len() {
        if dn[i] < 0.0 {
            alpha = alpha.min(tau * (lower[i] - n[i]) / dn[i]);
        } else if dn[i] > 0.0 && upper[i].is_finite() {
            alpha = alpha.min(tau * (upper[i] - n[i]) / dn[i]);
        }
    }
    alpha = alpha.clamp(0.0, 1.0);
    for i in 0..n.len() {
        n[i] = (n[i] + alpha * dn[i]).max(lower[i]);
    }
}

/// Recompute which species are currently "primary" (basic, large amount)
/// for [`crate::equilibrium::setup::HessianMode::PartiallyExact`]: the
/// `count` species with the largest current amount (spec.md §4.3's
/// canonicalization-driven primary/secondary partition, approximated here
/// by amount ranking between full re-canonicalizations).
fn primary_species_from_amounts(n: &Array1<f64>, count: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n.len()).collect();
    indices.sort_by(|&a, &b| n[b].partial_cmp(&n[a]).unwrap_or(std::cmp::Ordering::Equal));
    indices.truncate(count);
    indices
}
