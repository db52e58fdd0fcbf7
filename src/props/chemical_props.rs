use std::rc::Rc;

use ndarray::Array1;
use num_dual::DualNum;

use crate::core::{next_state_id, ChemicalSystem};
use crate::models::{
    ActivityModelDual, ReactionStandardThermoModelDual, SideChannel, StandardThermoModelDual,
};

/// Cached thermodynamic properties of a single phase at `(T, P, x)`
/// (spec.md §3/§4.1), generic over the automatic-differentiation scalar
/// type `D`.
///
/// Per-species fields are indexed the same way as [`crate::core::Phase::species`].
/// Excess (`*ex`) fields are phase-level, not per species: the activity
/// model returns one excess Gibbs/enthalpy/heat-capacity/volume for the
/// whole phase, consistent with spec.md §4.1 step 3.
#[derive(Debug, Clone)]
pub struct ChemicalPropsPhase<D> {
    pub n: Array1<D>,
    pub x: Array1<D>,
    pub g0: Array1<D>,
    pub h0: Array1<D>,
    pub v0: Array1<D>,
    pub vt0: Array1<D>,
    pub vp0: Array1<D>,
    pub cp0: Array1<D>,
    pub cv0: Array1<D>,
    pub ln_g: Array1<D>,
    pub ln_a: Array1<D>,
    pub u: Array1<D>,
    pub vex: D,
    pub vex_t: D,
    pub vex_p: D,
    pub gex: D,
    pub hex: D,
    pub cpex: D,
    pub cvex: D,
}

impl<D: DualNum<f64> + Copy> ChemicalPropsPhase<D> {
    /// Total amount of the phase, `Σ n_i` (mol).
    pub fn amount(&self) -> D {
        self.n.iter().fold(D::from(0.0), |acc, &ni| acc + ni)
    }

    /// Molar volume, `Σ x_i V0_i + Vex` (spec.md §4.1 step 5).
    pub fn molar_volume(&self) -> D {
        weighted_sum(&self.x, &self.v0) + self.vex
    }

    /// Molar standard Gibbs energy, `Σ x_i G0_i + Gex`.
    pub fn molar_gibbs_energy(&self) -> D {
        weighted_sum(&self.x, &self.g0) + self.gex
    }

    /// Molar standard enthalpy, `Σ x_i H0_i + Hex`.
    pub fn molar_enthalpy(&self) -> D {
        weighted_sum(&self.x, &self.h0) + self.hex
    }

    /// Molar heat capacity at constant pressure, `Σ x_i Cp0_i + Cpex`.
    pub fn molar_heat_capacity_cp(&self) -> D {
        weighted_sum(&self.x, &self.cp0) + self.cpex
    }

    /// Molar heat capacity at constant volume, `Σ x_i Cv0_i + Cvex`.
    pub fn molar_heat_capacity_cv(&self) -> D {
        weighted_sum(&self.x, &self.cv0) + self.cvex
    }

    pub fn volume(&self) -> D {
        self.molar_volume() * self.amount()
    }

    pub fn gibbs_energy(&self) -> D {
        self.molar_gibbs_energy() * self.amount()
    }

    pub fn enthalpy(&self) -> D {
        self.molar_enthalpy() * self.amount()
    }
}

fn weighted_sum<D: DualNum<f64> + Copy>(x: &Array1<D>, values: &Array1<D>) -> D {
    x.iter()
        .zip(values.iter())
        .fold(D::from(0.0), |acc, (&xi, &vi)| acc + xi * vi)
}

/// The universal gas constant, J/(mol·K).
pub const GAS_CONSTANT: f64 = 8.31446261815324;

/// Standard-state reference pressure for gas fugacity (spec.md §6: fugacity
/// inputs are bar-valued at the boundary; a species' activity in a gas
/// phase is defined relative to this reference).
pub const STANDARD_PRESSURE_PA: f64 = 1e5;

/// Faraday constant, C/mol, used by `Eh = ln(10)*R*T/F*pE` (spec.md §S1).
pub const FARADAY_CONSTANT: f64 = 96_485.33212;

/// Cached evaluation of every standard-state and phase-excess property of a
/// [`ChemicalSystem`] at given `(T, P, n)` (spec.md §3/§4.1, component C2).
///
/// Carries its own `stateid`, bumped every time [`ChemicalProps::update`] is
/// called, so that downstream memoizers (e.g.
/// [`crate::props::AqueousProps`]) can invalidate by cheap integer
/// comparison rather than content equality (spec.md §5).
#[derive(Debug, Clone)]
pub struct ChemicalProps<D> {
    system: Rc<ChemicalSystem>,
    t: D,
    p: D,
    phases: Vec<ChemicalPropsPhase<D>>,
    stateid: u64,
}

impl<D> ChemicalProps<D>
where
    D: DualNum<f64> + Copy,
    dyn crate::models::StandardThermoModel: StandardThermoModelDual<D>,
    dyn crate::models::ReactionStandardThermoModel: ReactionStandardThermoModelDual<D>,
    dyn crate::models::ActivityModel: ActivityModelDual<D>,
{
    /// Evaluate every property at `(T, P, n)`, following the fixed ordering
    /// of spec.md §4.1: standard thermo, mole fractions, activity model,
    /// chemical potentials, aggregates.
    pub fn update(system: &Rc<ChemicalSystem>, t: D, p: D, n: &Array1<D>) -> Self {
        assert_eq!(n.len(), system.num_species(), "species amount vector length mismatch");

        let mut phases = Vec::with_capacity(system.phases().len());
        for (phase_index, phase) in system.phases().iter().enumerate() {
            let range = system.phase_species_range(phase_index);
            let n_phase = n.slice(ndarray::s![range.clone()]).to_owned();
            let num_species = n_phase.len();

            let mut g0 = Array1::from_elem(num_species, D::from(0.0));
            let mut h0 = g0.clone();
            let mut v0 = g0.clone();
            let mut vt0 = g0.clone();
            let mut vp0 = g0.clone();
            let mut cp0 = g0.clone();
            let mut cv0 = g0.clone();
            for (i, species) in phase.species().iter().enumerate() {
                let props = species.standard_thermo(t, p);
                g0[i] = props.g0;
                h0[i] = props.h0;
                v0[i] = props.v0;
                vt0[i] = props.vt0;
                vp0[i] = props.vp0;
                cp0[i] = props.cp0;
                cv0[i] = props.cv0(t);
            }

            let total = n_phase.iter().fold(D::from(0.0), |acc, &ni| acc + ni);
            let x = if total > D::from(0.0) {
                n_phase.mapv(|ni| ni / total)
            } else {
                Array1::from_elem(num_species, D::from(1.0 / num_species as f64))
            };

            let mut side = SideChannel::new();
            let activity = phase.activity_model().activity(t, p, &x, &mut side);

            let r = D::from(GAS_CONSTANT);
            let u: Array1<D> = g0
                .iter()
                .zip(activity.ln_a.iter())
                .map(|(&g0i, &ln_ai)| g0i + r * t * ln_ai)
                .collect();

            phases.push(ChemicalPropsPhase {
                n: n_phase,
                x,
                g0,
                h0,
                v0,
                vt0,
                vp0,
                cp0,
                cv0,
                ln_g: activity.ln_g,
                ln_a: activity.ln_a,
                u,
                vex: activity.vex,
                vex_t: activity.vex_t,
                vex_p: activity.vex_p,
                gex: activity.gex,
                hex: activity.hex,
                cpex: activity.cpex,
                cvex: D::from(0.0),
            });
        }

        Self {
            system: Rc::clone(system),
            t,
            p,
            phases,
            stateid: next_state_id(),
        }
    }

    pub fn system(&self) -> &Rc<ChemicalSystem> {
        &self.system
    }

    pub fn temperature(&self) -> D {
        self.t
    }

    pub fn pressure(&self) -> D {
        self.p
    }

    pub fn phases(&self) -> &[ChemicalPropsPhase<D>] {
        &self.phases
    }

    pub fn stateid(&self) -> u64 {
        self.stateid
    }

    /// Species amounts across all phases, concatenated in system order.
    pub fn n(&self) -> Array1<D> {
        let mut all = Vec::with_capacity(self.system.num_species());
        for phase in &self.phases {
            all.extend(phase.n.iter().copied());
        }
        Array1::from(all)
    }

    /// Chemical potential of every species, concatenated in system order.
    pub fn u(&self) -> Array1<D> {
        let mut all = Vec::with_capacity(self.system.num_species());
        for phase in &self.phases {
            all.extend(phase.u.iter().copied());
        }
        Array1::from(all)
    }

    /// System-aggregate volume: sum of phase molar volume times phase amount.
    pub fn volume(&self) -> D {
        self.phases.iter().fold(D::from(0.0), |acc, phase| acc + phase.volume())
    }

    /// System-aggregate Gibbs energy.
    pub fn gibbs_energy(&self) -> D {
        self.phases
            .iter()
            .fold(D::from(0.0), |acc, phase| acc + phase.gibbs_energy())
    }

    /// System-aggregate enthalpy.
    pub fn enthalpy(&self) -> D {
        self.phases
            .iter()
            .fold(D::from(0.0), |acc, phase| acc + phase.enthalpy())
    }

    /// System-aggregate internal energy, `U = H - P*V`.
    pub fn internal_energy(&self) -> D {
        self.enthalpy() - self.p * self.volume()
    }

    /// System-aggregate entropy, `S = (H - G) / T`.
    pub fn entropy(&self) -> D {
        (self.enthalpy() - self.gibbs_energy()) / self.t
    }

    /// System-aggregate Helmholtz energy, `A = U - T*S`.
    pub fn helmholtz_energy(&self) -> D {
        self.internal_energy() - self.t * self.entropy()
    }

    /// Net electric charge, `Σ z_i n_i` (mol of electron-equivalents).
    pub fn charge(&self) -> D {
        let n = self.n();
        let w = self.system.formula_matrix();
        let charge_row = w.nrows() - 1;
        (0..n.len()).fold(D::from(0.0), |acc, i| acc + D::from(w[[charge_row, i]]) * n[i])
    }

    /// Total amount of `element` across the whole system (mol).
    pub fn element_amount(&self, element_index: usize) -> D {
        let n = self.n();
        let w = self.system.formula_matrix();
        (0..n.len()).fold(D::from(0.0), |acc, i| acc + D::from(w[[element_index, i]]) * n[i])
    }

    /// Total amount of `element` restricted to the species of `phase_index` (mol).
    pub fn element_amount_in_phase(&self, element_index: usize, phase_index: usize) -> D {
        let w = self.system.formula_matrix();
        let range = self.system.phase_species_range(phase_index);
        let phase = &self.phases[phase_index];
        range
            .enumerate()
            .fold(D::from(0.0), |acc, (local, global)| {
                acc + D::from(w[[element_index, global]]) * phase.n[local]
            })
    }

    /// Total mass of `element` across the whole system (kg), from its molar amount.
    pub fn element_mass(&self, element_index: usize) -> D {
        let molar_mass = self.system.elements()[element_index].molar_mass();
        self.element_amount(element_index) * D::from(molar_mass)
    }

    /// Total amount of species in `phase_index` (mol).
    pub fn phase_amount(&self, phase_index: usize) -> D {
        self.phases[phase_index].amount()
    }

    /// Total mass of species in `phase_index` (kg).
    pub fn phase_mass(&self, phase_index: usize) -> D {
        let phase = &self.phases[phase_index];
        let system_phase = &self.system.phases()[phase_index];
        phase
            .n
            .iter()
            .zip(system_phase.species())
            .fold(D::from(0.0), |acc, (&ni, species)| {
                let molar_mass = species.formula().molar_mass(|sym| {
                    crate::core::periodic_table_lookup(sym).map(|e| e.molar_mass())
                });
                acc + ni * D::from(molar_mass)
            })
    }

    /// Volume of `phase_index` (m³).
    pub fn phase_volume(&self, phase_index: usize) -> D {
        self.phases[phase_index].volume()
    }

    /// Natural log of the activity of a species, addressed by its global
    /// index (used by `lnActivity`/`fugacity`/`pH`/`pE`/`Eh`-style equation
    /// constraints, spec.md §4.2).
    pub fn ln_activity(&self, species_index: usize) -> D {
        let (phase_index, local_index) = self.system.locate_species(species_index);
        self.phases[phase_index].ln_a[local_index]
    }

    /// Chemical potential of a species, addressed by its global index.
    pub fn chemical_potential(&self, species_index: usize) -> D {
        let (phase_index, local_index) = self.system.locate_species(species_index);
        self.phases[phase_index].u[local_index]
    }
}
