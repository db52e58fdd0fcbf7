//! The optimization-problem oracle (spec.md §4.3, component C6): given
//! `(n, p, w)` it returns the objective, its gradient and Hessian, the
//! nonlinear equation-constraint residual and its Jacobians, generic over
//! every Hessian-approximation mode spec.md names.

use std::rc::Rc;

use ndarray::{Array1, Array2};
use num_dual::{Dual64, DualNum};
use serde::{Deserialize, Serialize};

use crate::core::ChemicalSystem;
use crate::equilibrium::specs::{EquationConstraintKind, EquilibriumConservation, EquilibriumSpecs};
use crate::models::{ActivityModelDual, ReactionStandardThermoModelDual, StandardThermoModelDual};
use crate::props::{ChemicalProps, FARADAY_CONSTANT, GAS_CONSTANT, STANDARD_PRESSURE_PA};
use crate::Verbosity;

const LN10: f64 = std::f64::consts::LN_10;

/// The four Hessian-approximation modes of spec.md §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HessianMode {
    /// Seed every component of `(n, p)` through AD; most accurate, most
    /// expensive.
    Exact,
    /// Analytic diagonal-plus-rank-one Hessian of an ideal mixture's
    /// `∂u/∂n`, keeping the exact value and gradient.
    Approx,
    /// Only the diagonal of the ideal-mixture `∂u/∂n`.
    ApproxDiagonal,
    /// Exact AD columns for the current primary (basic) species, ideal
    /// elsewhere.
    PartiallyExact,
}

impl Default for HessianMode {
    fn default() -> Self {
        HessianMode::Approx
    }
}

/// Numeric knobs for [`EquilibriumSetup`] and [`crate::equilibrium::solver::EquilibriumSolver`]
/// (spec.md §4.3/§4.4), serde-round-trippable the way `feos-core`'s solver
/// option structs are.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquilibriumOptions {
    /// Floor applied to every species' lower bound and to the log-barrier
    /// strength (spec.md §4.3); default `1e-16`.
    pub epsilon: f64,
    /// Multiplies `epsilon` to get the log-barrier coefficient `tau`;
    /// default `1.0`.
    pub logarithm_barrier_factor: f64,
    pub hessian_mode: HessianMode,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub verbosity: Verbosity,
}

impl Default for EquilibriumOptions {
    fn default() -> Self {
        Self {
            epsilon: 1e-16,
            logarithm_barrier_factor: 1.0,
            hessian_mode: HessianMode::default(),
            max_iterations: 100,
            tolerance: 1e-10,
            verbosity: Verbosity::None,
        }
    }
}

/// Everything the interior-point driver needs at one `(n, p, w)` point:
/// objective, its gradient/Hessian blocks, the nonlinear constraint residual
/// and its Jacobians (spec.md §4.3's "Hxx, Hxp, Hxc = [Hxw | Hxb], Vpx, Vpp,
/// Vpc"). `Hxb`/`dv_db` are always zero (`b` enters only the linear
/// conservation equation, never the objective or `v`) and so are not
/// materialized as fields.
#[derive(Debug, Clone)]
pub struct EquilibriumOracle {
    pub chemical: ChemicalProps<f64>,
    /// `f(x, p, w) = G(n, p, w) / (R*T) + barrier(n)`.
    pub f: f64,
    /// `∂f/∂n` (length `N`; the `q` block is always zero, the objective does
    /// not depend on titrant amounts directly).
    pub grad_n: Array1<f64>,
    /// `∂f/∂p` (length `Np`; nonzero only at the unknown-temperature/
    /// unknown-pressure indices).
    pub grad_p: Array1<f64>,
    /// `∂²f/∂n∂n` (`N x N`).
    pub h_nn: Array2<f64>,
    /// `∂²f/∂n∂p` (`N x Np`).
    pub h_np: Array2<f64>,
    /// `∂²f/∂n∂w` (`N x Nw`), the `Hxw` half of `Hxc`.
    pub h_nw: Array2<f64>,
    /// `v(props, p, w)` (length `Nv`).
    pub v: Array1<f64>,
    /// `∂v/∂n` (`Nv x N`).
    pub dv_dn: Array2<f64>,
    /// `∂v/∂p` (`Nv x Np`).
    pub dv_dp: Array2<f64>,
    /// `∂v/∂w` (`Nv x Nw`): always `-1` at the column each constraint pins
    /// its input to, `0` elsewhere — analytic, not AD-derived.
    pub dv_dw: Array2<f64>,
}

/// The optimization-problem oracle built from an [`EquilibriumSpecs`]
/// (spec.md §4.3, component C6).
#[derive(Debug, Clone)]
pub struct EquilibriumSetup {
    system: Rc<ChemicalSystem>,
    specs: Rc<EquilibriumSpecs>,
    conservation: EquilibriumConservation,
    options: EquilibriumOptions,
    /// `true` for species belonging to a single-species ("pure") phase —
    /// the only species the log-barrier applies to (spec.md §4.3).
    pure_phase_species: Vec<bool>,
}

impl EquilibriumSetup {
    pub fn new(specs: Rc<EquilibriumSpecs>, options: EquilibriumOptions) -> Self {
        let system = Rc::clone(specs.system());
        let conservation = specs.conservation();
        let mut pure_phase_species = vec![false; system.num_species()];
        let mut offset = 0;
        for phase in system.phases() {
            if phase.is_pure() {
                pure_phase_species[offset] = true;
            }
            offset += phase.num_species();
        }
        Self {
            system,
            specs,
            conservation,
            options,
            pure_phase_species,
        }
    }

    pub fn system(&self) -> &Rc<ChemicalSystem> {
        &self.system
    }

    pub fn specs(&self) -> &Rc<EquilibriumSpecs> {
        &self.specs
    }

    pub fn conservation(&self) -> &EquilibriumConservation {
        &self.conservation
    }

    pub fn options(&self) -> &EquilibriumOptions {
        &self.options
    }

    fn tau(&self) -> f64 {
        self.options.epsilon * self.options.logarithm_barrier_factor
    }

    /// Resolve `(T, P)` from `w` (if declared as inputs) or `p` (if declared
    /// unknown), generic over the AD scalar type so the same logic drives
    /// both the plain-`f64` evaluation and every seeded sweep.
    fn temperature_and_pressure<D: DualNum<f64> + Copy>(&self, p: &Array1<D>, w: &Array1<D>) -> (D, D) {
        let t = match (self.specs.temperature_input_index(), self.specs.temperature_p_index()) {
            (Some(idx), _) => w[idx],
            (None, Some(idx)) => p[idx],
            (None, None) => D::from(298.15),
        };
        let pres = match (self.specs.pressure_input_index(), self.specs.pressure_p_index()) {
            (Some(idx), _) => w[idx],
            (None, Some(idx)) => p[idx],
            (None, None) => D::from(1e5),
        };
        (t, pres)
    }

    fn barrier<D: DualNum<f64> + Copy>(&self, n: &Array1<D>) -> D {
        let tau = D::from(self.tau());
        let epsilon = self.options.epsilon;
        let mut result = D::from(0.0);
        for (i, &is_pure) in self.pure_phase_species.iter().enumerate() {
            if is_pure {
                let ni = if n[i].re() > epsilon { n[i] } else { D::from(epsilon) };
                result -= tau * ni.ln();
            }
        }
        result
    }

    /// Evaluate `ChemicalProps` at `(n, p, w)`, generic over `D` — the one
    /// evaluation every derivative sweep below repeats with a single
    /// component seeded (spec.md §4.3 "Derivative sweep").
    fn chemical_props<D: DualNum<f64> + Copy>(&self, n: &Array1<D>, p: &Array1<D>, w: &Array1<D>) -> ChemicalProps<D>
    where
        dyn crate::models::StandardThermoModel: StandardThermoModelDual<D>,
        dyn crate::models::ReactionStandardThermoModel: ReactionStandardThermoModelDual<D>,
        dyn crate::models::ActivityModel: ActivityModelDual<D>,
    {
        let (t, pres) = self.temperature_and_pressure(p, w);
        ChemicalProps::update(&self.system, t, pres, n)
    }

    fn objective<D: DualNum<f64> + Copy>(&self, chemical: &ChemicalProps<D>, n: &Array1<D>) -> D
    where
        dyn crate::models::StandardThermoModel: StandardThermoModelDual<D>,
        dyn crate::models::ReactionStandardThermoModel: ReactionStandardThermoModelDual<D>,
        dyn crate::models::ActivityModel: ActivityModelDual<D>,
    {
        let rt = D::from(GAS_CONSTANT) * chemical.temperature();
        chemical.gibbs_energy() / rt + self.barrier(n)
    }

    /// Evaluate one row of `v(props, p, w)` (spec.md §4.2's method table).
    fn equation_value<D: DualNum<f64> + Copy>(
        &self,
        kind: EquationConstraintKind,
        chemical: &ChemicalProps<D>,
    ) -> D {
        use EquationConstraintKind::*;
        let t = chemical.temperature();
        match kind {
            Volume => chemical.volume(),
            InternalEnergy => chemical.internal_energy(),
            Enthalpy => chemical.enthalpy(),
            GibbsEnergy => chemical.gibbs_energy(),
            HelmholtzEnergy => chemical.helmholtz_energy(),
            Entropy => chemical.entropy(),
            Charge => chemical.charge(),
            ElementAmount(i) => chemical.element_amount(i),
            ElementAmountInPhase(e, ph) => chemical.element_amount_in_phase(e, ph),
            ElementMass(i) => chemical.element_mass(i),
            PhaseAmount(ph) => chemical.phase_amount(ph),
            PhaseMass(ph) => chemical.phase_mass(ph),
            PhaseVolume(ph) => chemical.phase_volume(ph),
            ChemicalPotential(sp) => chemical.chemical_potential(sp),
            LnActivity(sp) => chemical.ln_activity(sp),
            Fugacity(sp) => D::from(STANDARD_PRESSURE_PA) * chemical.ln_activity(sp).exp(),
            Ph(sp) => -chemical.ln_activity(sp) / D::from(LN10),
            PMg(sp) => -chemical.ln_activity(sp) / D::from(LN10),
            Pe(sp) => -chemical.ln_activity(sp) / D::from(LN10),
            Eh(sp) => {
                let pe = -chemical.ln_activity(sp) / D::from(LN10);
                D::from(LN10 * GAS_CONSTANT) * t / D::from(FARADAY_CONSTANT) * pe
            }
        }
    }

    /// `v(props, p, w)`: one row per declared equation constraint, in
    /// declaration order (spec.md §5 "Constraint residuals are assembled in
    /// declaration order").
    fn constraint_residual<D: DualNum<f64> + Copy>(&self, chemical: &ChemicalProps<D>, w: &Array1<D>) -> Array1<D> {
        self.specs
            .equations()
            .iter()
            .map(|eq| {
                let computed = self.equation_value(eq.kind(), chemical);
                let w_idx = self
                    .specs
                    .index_of_input(eq.id())
                    .expect("every equation constraint's id is registered as an input");
                computed - w[w_idx]
            })
            .collect()
    }

    fn dims(&self) -> (usize, usize, usize, usize) {
        let d = self.specs.dims();
        (d.n, d.p, d.w, self.specs.equations().len())
    }

    /// `∂u/∂n` of an ideal mixture, restricted to same-phase pairs
    /// (spec.md §4.3 `Approx`/`ApproxDiagonal`): `RT*(delta_ij/n_i -
    /// 1/sum_n)` within a phase, zero across phases.
    fn ideal_hessian_nn(&self, chemical: &ChemicalProps<f64>, diagonal_only: bool) -> Array2<f64> {
        let num_species = self.system.num_species();
        let mut h = Array2::zeros((num_species, num_species));
        let rt = GAS_CONSTANT * chemical.temperature();
        let mut offset = 0;
        for phase_props in chemical.phases() {
            let total = phase_props.amount().max(f64::MIN_POSITIVE);
            let m = phase_props.n.len();
            for local_i in 0..m {
                let ni = phase_props.n[local_i].max(self.options.epsilon);
                let diag = rt * (1.0 / ni - 1.0 / total);
                h[[offset + local_i, offset + local_i]] = diag;
                if !diagonal_only {
                    for local_j in 0..m {
                        if local_j != local_i {
                            h[[offset + local_i, offset + local_j]] = -rt / total;
                        }
                    }
                }
            }
            offset += m;
        }
        h
    }

    /// Exact `∂u/∂n` via one-seed-at-a-time forward-mode AD (spec.md §4.3
    /// "Derivative sweep"): seed `n_j`, reevaluate with the real activity
    /// model, read the tangent of `u` as column `j`.
    fn exact_hessian_nn(&self, n: &Array1<f64>, p: &Array1<f64>, w: &Array1<f64>) -> Array2<f64> {
        let num_species = n.len();
        let rt_ref = GAS_CONSTANT * self.temperature_and_pressure(p, w).0;
        let p_dual = p.mapv(Dual64::from);
        let w_dual = w.mapv(Dual64::from);
        let mut h = Array2::zeros((num_species, num_species));
        for j in 0..num_species {
            let mut n_dual = n.mapv(Dual64::from);
            n_dual[j] = n_dual[j].derive();
            let chemical = self.chemical_props(&n_dual, &p_dual, &w_dual);
            let u = chemical.u();
            for i in 0..num_species {
                h[[i, j]] = u[i].eps[0] / rt_ref;
            }
        }
        h
    }

    /// `∂²f/∂n∂n`, dispatching on [`HessianMode`].
    fn hessian_nn(
        &self,
        chemical: &ChemicalProps<f64>,
        n: &Array1<f64>,
        p: &Array1<f64>,
        w: &Array1<f64>,
        primary_species: &[usize],
    ) -> Array2<f64> {
        match self.options.hessian_mode {
            HessianMode::Exact => self.exact_hessian_nn(n, p, w),
            HessianMode::Approx => self.ideal_hessian_nn(chemical, false),
            HessianMode::ApproxDiagonal => self.ideal_hessian_nn(chemical, true),
            HessianMode::PartiallyExact => {
                let mut h = self.ideal_hessian_nn(chemical, false);
                if !primary_species.is_empty() {
                    let exact = self.exact_hessian_nn(n, p, w);
                    let num_species = n.len();
                    for &j in primary_species {
                        for i in 0..num_species {
                            h[[i, j]] = exact[[i, j]];
                            h[[j, i]] = exact[[i, j]];
                        }
                    }
                }
                h
            }
        }
    }

    /// `∂f/∂p` and `∂²f/∂n∂p`: nonzero only at the unknown-temperature/
    /// unknown-pressure `p` indices, obtained by seeding that one `p`
    /// component.
    fn p_derivatives(
        &self,
        n: &Array1<f64>,
        p: &Array1<f64>,
        w: &Array1<f64>,
    ) -> (Array1<f64>, Array2<f64>) {
        let num_species = n.len();
        let num_p = p.len();
        let mut grad_p = Array1::zeros(num_p);
        let mut h_np = Array2::zeros((num_species, num_p));

        let n_dual_base = n.mapv(Dual64::from);
        let w_dual = w.mapv(Dual64::from);
        for &maybe_idx in &[self.specs.temperature_p_index(), self.specs.pressure_p_index()] {
            if let Some(idx) = maybe_idx {
                let mut p_dual = p.mapv(Dual64::from);
                p_dual[idx] = p_dual[idx].derive();
                let chemical = self.chemical_props(&n_dual_base, &p_dual, &w_dual);
                let f = self.objective(&chemical, &n_dual_base);
                grad_p[idx] = f.eps[0];
                let rt_ref = GAS_CONSTANT * chemical.temperature().re();
                let u = chemical.u();
                for i in 0..num_species {
                    h_np[[i, idx]] = u[i].eps[0] / rt_ref;
                }
            }
        }
        (grad_p, h_np)
    }

    /// `∂²f/∂n∂w`: nonzero only at the temperature/pressure *input* columns
    /// (spec.md: the objective depends on `w` only through `T`/`P` when
    /// those are declared inputs rather than unknowns).
    fn nw_derivatives(&self, n: &Array1<f64>, p: &Array1<f64>, w: &Array1<f64>) -> Array2<f64> {
        let num_species = n.len();
        let num_w = w.len();
        let mut h_nw = Array2::zeros((num_species, num_w));
        let n_dual_base = n.mapv(Dual64::from);
        let p_dual = p.mapv(Dual64::from);
        for &maybe_idx in &[self.specs.temperature_input_index(), self.specs.pressure_input_index()] {
            if let Some(idx) = maybe_idx {
                let mut w_dual = w.mapv(Dual64::from);
                w_dual[idx] = w_dual[idx].derive();
                let chemical = self.chemical_props(&n_dual_base, &p_dual, &w_dual);
                let rt_ref = GAS_CONSTANT * chemical.temperature().re();
                let u = chemical.u();
                for i in 0..num_species {
                    h_nw[[i, idx]] = u[i].eps[0] / rt_ref;
                }
            }
        }
        h_nw
    }

    /// `∂v/∂n` and `∂v/∂p` via forward-mode column sweeps.
    fn constraint_jacobians(
        &self,
        n: &Array1<f64>,
        p: &Array1<f64>,
        w: &Array1<f64>,
    ) -> (Array2<f64>, Array2<f64>) {
        let (num_species, num_p, _num_w, num_v) = self.dims();
        let mut dv_dn = Array2::zeros((num_v, num_species));
        let mut dv_dp = Array2::zeros((num_v, num_p));

        let w_dual = w.mapv(Dual64::from);

        for j in 0..num_species {
            let mut n_dual = n.mapv(Dual64::from);
            n_dual[j] = n_dual[j].derive();
            let p_dual = p.mapv(Dual64::from);
            let chemical = self.chemical_props(&n_dual, &p_dual, &w_dual);
            let v = self.constraint_residual(&chemical, &w_dual);
            for row in 0..num_v {
                dv_dn[[row, j]] = v[row].eps[0];
            }
        }

        let n_dual = n.mapv(Dual64::from);
        for j in 0..num_p {
            let mut p_dual = p.mapv(Dual64::from);
            p_dual[j] = p_dual[j].derive();
            let chemical = self.chemical_props(&n_dual, &p_dual, &w_dual);
            let v = self.constraint_residual(&chemical, &w_dual);
            for row in 0..num_v {
                dv_dp[[row, j]] = v[row].eps[0];
            }
        }

        (dv_dn, dv_dp)
    }

    /// `∂v/∂w`: always `-1` at the column each equation constraint pins its
    /// input to, analytic (spec.md: `v = computed(n,p) - w_idx`).
    fn dv_dw(&self) -> Array2<f64> {
        let (_, _, num_w, num_v) = self.dims();
        let mut dv_dw = Array2::zeros((num_v, num_w));
        for (row, eq) in self.specs.equations().iter().enumerate() {
            let idx = self.specs.index_of_input(eq.id()).unwrap();
            dv_dw[[row, idx]] = -1.0;
        }
        dv_dw
    }

    /// Evaluate the full oracle at `(n, p, w)`. `primary_species` (global
    /// species indices) is only consulted by [`HessianMode::PartiallyExact`].
    pub fn evaluate(
        &self,
        n: &Array1<f64>,
        p: &Array1<f64>,
        w: &Array1<f64>,
        primary_species: &[usize],
    ) -> EquilibriumOracle {
        let chemical = self.chemical_props(n, p, w);
        let f = self.objective(&chemical, n);
        let rt = GAS_CONSTANT * chemical.temperature();
        let mut grad_n = chemical.u().mapv(|ui| ui / rt);
        let tau = self.tau();
        for (i, &is_pure) in self.pure_phase_species.iter().enumerate() {
            if is_pure {
                grad_n[i] -= tau / n[i].max(self.options.epsilon);
            }
        }

        let (grad_p, h_np_from_p) = self.p_derivatives(n, p, w);
        let h_nw = self.nw_derivatives(n, p, w);
        let mut h_nn = self.hessian_nn(&chemical, n, p, w, primary_species);
        for (i, &is_pure) in self.pure_phase_species.iter().enumerate() {
            if is_pure {
                let ni = n[i].max(self.options.epsilon);
                h_nn[[i, i]] += tau / (ni * ni);
            }
        }
        let v = self.constraint_residual(&chemical, w);
        let (dv_dn, dv_dp) = self.constraint_jacobians(n, p, w);
        let dv_dw = self.dv_dw();

        EquilibriumOracle {
            chemical,
            f,
            grad_n,
            grad_p,
            h_nn,
            h_np: h_np_from_p,
            h_nw,
            v,
            dv_dn,
            dv_dp,
            dv_dw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AggregateState, Phase, Species};
    use crate::models::{ConstantStandardThermoModel, IdealActivityModel};
    use approx::assert_relative_eq;
    use ndarray::array;
    use std::rc::Rc;

    fn system() -> Rc<ChemicalSystem> {
        let h2o = Species::new(
            "H2O(l)",
            "H2O",
            AggregateState::Liquid,
            Rc::new(ConstantStandardThermoModel::new(-237_180.0, -285_830.0, 1.8e-5, 75.3)),
        );
        let co2_aq = Species::new(
            "CO2(aq)",
            "CO2",
            AggregateState::Aqueous,
            Rc::new(ConstantStandardThermoModel::new(-385_970.0, -413_800.0, 3.3e-5, 267.0)),
        );
        let quartz = Species::new(
            "SiO2(s)",
            "SiO2",
            AggregateState::Solid,
            Rc::new(ConstantStandardThermoModel::new(-856_238.0, -910_700.0, 2.27e-5, 44.4)),
        );
        let aqueous = Phase::new(
            "Aqueous",
            AggregateState::Aqueous,
            vec![h2o, co2_aq],
            Rc::new(IdealActivityModel),
        );
        let solids = Phase::new("Solids", AggregateState::Solid, vec![quartz], Rc::new(IdealActivityModel));
        Rc::new(ChemicalSystem::new(vec![aqueous, solids]))
    }

    fn setup() -> (EquilibriumSetup, Rc<EquilibriumSpecs>) {
        let mut specs = EquilibriumSpecs::new(system());
        specs.temperature().unwrap().pressure().unwrap();
        let specs = Rc::new(specs);
        (EquilibriumSetup::new(Rc::clone(&specs), EquilibriumOptions::default()), specs)
    }

    #[test]
    fn pure_phase_mask_marks_single_species_phase_only() {
        let (setup, _) = setup();
        assert!(!setup.pure_phase_species[0]); // H2O(l) in the 2-species aqueous phase
        assert!(!setup.pure_phase_species[1]); // CO2(aq)
        assert!(setup.pure_phase_species[2]); // SiO2(s), the pure solid phase
    }

    #[test]
    fn objective_matches_gibbs_energy_over_rt_plus_barrier() {
        let (setup, _specs) = setup();
        let n = array![55.5, 0.001, 0.0];
        let p = array![];
        let w = array![298.15, 1e5];
        let oracle = setup.evaluate(&n, &p, &w, &[]);
        let rt = GAS_CONSTANT * 298.15;
        let expected_gibbs = oracle.chemical.gibbs_energy();
        assert_relative_eq!(oracle.f * rt, expected_gibbs + setup.tau() * -((1e-16_f64).ln()) * rt, epsilon = 1e-2);
    }

    #[test]
    fn hessian_nn_is_zero_across_phases() {
        let (setup, _specs) = setup();
        let n = array![55.5, 0.001, 0.2];
        let p = array![];
        let w = array![298.15, 1e5];
        let chemical = setup.chemical_props(&n, &p, &w);
        let h = setup.ideal_hessian_nn(&chemical, false);
        assert_eq!(h[[0, 2]], 0.0);
        assert_eq!(h[[2, 0]], 0.0);
    }

    #[test]
    fn dv_dw_is_negative_identity_at_targeted_columns() {
        let mut specs = EquilibriumSpecs::new(system());
        specs.temperature().unwrap().pressure().unwrap().volume().unwrap();
        let specs = Rc::new(specs);
        let setup = EquilibriumSetup::new(Rc::clone(&specs), EquilibriumOptions::default());
        let dv_dw = setup.dv_dw();
        let v_idx = specs.index_of_input("V").unwrap();
        assert_eq!(dv_dw[[0, v_idx]], -1.0);
    }
}
