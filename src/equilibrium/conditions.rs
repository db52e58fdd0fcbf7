//! Runtime values of the inputs an [`crate::equilibrium::specs::EquilibriumSpecs`]
//! declared, plus bounds on its *p* control variables (spec.md §4.2,
//! component C4).

use ndarray::Array1;

use crate::equilibrium::specs::EquilibriumSpecs;
use crate::errors::{ReaktoroError, ReaktoroResult};

const LN10: f64 = std::f64::consts::LN_10;
/// Conversion factor applied to fugacity inputs at the boundary (spec.md
/// §6: "Fugacity inputs are taken as bar and converted to Pa internally").
const BAR_TO_PA: f64 = 1e5;

/// Concrete values for every input declared by an [`EquilibriumSpecs`], and
/// lower/upper bounds for its *p* control variables (default
/// `(-inf, +inf)`, spec.md §4.3).
#[derive(Debug, Clone)]
pub struct EquilibriumConditions {
    w: Array1<f64>,
    w_set: Vec<bool>,
    p_lower: Array1<f64>,
    p_upper: Array1<f64>,
}

impl EquilibriumConditions {
    pub fn new(specs: &EquilibriumSpecs) -> Self {
        let dims = specs.dims();
        Self {
            w: Array1::zeros(dims.w),
            w_set: vec![false; dims.w],
            p_lower: Array1::from_elem(dims.p, f64::NEG_INFINITY),
            p_upper: Array1::from_elem(dims.p, f64::INFINITY),
        }
    }

    /// Set the value of the input declared under `name` (e.g. `"T"`,
    /// `"pH"`, `"elementAmount[Ca]"`) — the strongly-typed id a builder
    /// method on [`EquilibriumSpecs`] registered, per spec.md §9's "dynamic
    /// string-keyed specs map to a mapping from stable string id to slot
    /// index" design note.
    pub fn set(&mut self, specs: &EquilibriumSpecs, name: &str, value: f64) -> ReaktoroResult<&mut Self> {
        let idx = specs
            .index_of_input(name)
            .ok_or_else(|| ReaktoroError::UnknownInput(name.to_string()))?;
        self.w[idx] = value;
        self.w_set[idx] = true;
        Ok(self)
    }

    pub fn temperature(&mut self, specs: &EquilibriumSpecs, value_k: f64) -> ReaktoroResult<&mut Self> {
        self.set(specs, "T", value_k)
    }

    pub fn pressure(&mut self, specs: &EquilibriumSpecs, value_pa: f64) -> ReaktoroResult<&mut Self> {
        self.set(specs, "P", value_pa)
    }

    pub fn volume(&mut self, specs: &EquilibriumSpecs, value_m3: f64) -> ReaktoroResult<&mut Self> {
        self.set(specs, "V", value_m3)
    }

    pub fn internal_energy(&mut self, specs: &EquilibriumSpecs, value_j: f64) -> ReaktoroResult<&mut Self> {
        self.set(specs, "U", value_j)
    }

    pub fn enthalpy(&mut self, specs: &EquilibriumSpecs, value_j: f64) -> ReaktoroResult<&mut Self> {
        self.set(specs, "H", value_j)
    }

    pub fn gibbs_energy(&mut self, specs: &EquilibriumSpecs, value_j: f64) -> ReaktoroResult<&mut Self> {
        self.set(specs, "G", value_j)
    }

    pub fn helmholtz_energy(&mut self, specs: &EquilibriumSpecs, value_j: f64) -> ReaktoroResult<&mut Self> {
        self.set(specs, "A", value_j)
    }

    pub fn entropy(&mut self, specs: &EquilibriumSpecs, value_j_per_k: f64) -> ReaktoroResult<&mut Self> {
        self.set(specs, "S", value_j_per_k)
    }

    pub fn charge(&mut self, specs: &EquilibriumSpecs, value_mol: f64) -> ReaktoroResult<&mut Self> {
        self.set(specs, "charge", value_mol)
    }

    pub fn element_amount(&mut self, specs: &EquilibriumSpecs, symbol: &str, value_mol: f64) -> ReaktoroResult<&mut Self> {
        self.set(specs, &format!("elementAmount[{symbol}]"), value_mol)
    }

    pub fn element_mass(&mut self, specs: &EquilibriumSpecs, symbol: &str, value_kg: f64) -> ReaktoroResult<&mut Self> {
        self.set(specs, &format!("elementMass[{symbol}]"), value_kg)
    }

    pub fn phase_amount(&mut self, specs: &EquilibriumSpecs, phase: &str, value_mol: f64) -> ReaktoroResult<&mut Self> {
        self.set(specs, &format!("phaseAmount[{phase}]"), value_mol)
    }

    pub fn phase_mass(&mut self, specs: &EquilibriumSpecs, phase: &str, value_kg: f64) -> ReaktoroResult<&mut Self> {
        self.set(specs, &format!("phaseMass[{phase}]"), value_kg)
    }

    pub fn phase_volume(&mut self, specs: &EquilibriumSpecs, phase: &str, value_m3: f64) -> ReaktoroResult<&mut Self> {
        self.set(specs, &format!("phaseVolume[{phase}]"), value_m3)
    }

    pub fn chemical_potential(&mut self, specs: &EquilibriumSpecs, subst: &str, value_j_per_mol: f64) -> ReaktoroResult<&mut Self> {
        self.set(specs, &format!("u[{subst}]"), value_j_per_mol)
    }

    pub fn ln_activity(&mut self, specs: &EquilibriumSpecs, species: &str, value: f64) -> ReaktoroResult<&mut Self> {
        self.set(specs, &format!("ln(a[{species}])"), value)
    }

    pub fn activity(&mut self, specs: &EquilibriumSpecs, species: &str, value: f64) -> ReaktoroResult<&mut Self> {
        self.ln_activity(specs, species, value.ln())
    }

    /// `value_bar` is converted to Pa internally (spec.md §6).
    pub fn fugacity(&mut self, specs: &EquilibriumSpecs, gas: &str, value_bar: f64) -> ReaktoroResult<&mut Self> {
        self.set(specs, &format!("f[{gas}]"), value_bar * BAR_TO_PA)
    }

    pub fn ph(&mut self, specs: &EquilibriumSpecs, value: f64) -> ReaktoroResult<&mut Self> {
        self.set(specs, "pH", value)
    }

    pub fn p_mg(&mut self, specs: &EquilibriumSpecs, value: f64) -> ReaktoroResult<&mut Self> {
        self.set(specs, "pMg", value)
    }

    pub fn pe(&mut self, specs: &EquilibriumSpecs, value: f64) -> ReaktoroResult<&mut Self> {
        self.set(specs, "pE", value)
    }

    pub fn eh(&mut self, specs: &EquilibriumSpecs, value_v: f64) -> ReaktoroResult<&mut Self> {
        self.set(specs, "Eh", value_v)
    }

    /// log10 activity, converted to the natural-log input `ln_activity` uses.
    pub fn lg_activity(&mut self, specs: &EquilibriumSpecs, species: &str, value: f64) -> ReaktoroResult<&mut Self> {
        self.ln_activity(specs, species, value * LN10)
    }

    pub fn w(&self) -> &Array1<f64> {
        &self.w
    }

    pub fn is_set(&self, index: usize) -> bool {
        self.w_set[index]
    }

    pub fn set_lower_bound_p(&mut self, index: usize, value: f64) {
        self.p_lower[index] = value;
    }

    pub fn set_upper_bound_p(&mut self, index: usize, value: f64) {
        self.p_upper[index] = value;
    }

    pub fn set_lower_bound_temperature(&mut self, specs: &EquilibriumSpecs, value_k: f64) {
        if let Some(idx) = specs.temperature_p_index() {
            self.set_lower_bound_p(idx, value_k);
        }
    }

    pub fn set_upper_bound_temperature(&mut self, specs: &EquilibriumSpecs, value_k: f64) {
        if let Some(idx) = specs.temperature_p_index() {
            self.set_upper_bound_p(idx, value_k);
        }
    }

    pub fn set_lower_bound_pressure(&mut self, specs: &EquilibriumSpecs, value_pa: f64) {
        if let Some(idx) = specs.pressure_p_index() {
            self.set_lower_bound_p(idx, value_pa);
        }
    }

    pub fn set_upper_bound_pressure(&mut self, specs: &EquilibriumSpecs, value_pa: f64) {
        if let Some(idx) = specs.pressure_p_index() {
            self.set_upper_bound_p(idx, value_pa);
        }
    }

    pub fn p_lower(&self) -> &Array1<f64> {
        &self.p_lower
    }

    pub fn p_upper(&self) -> &Array1<f64> {
        &self.p_upper
    }
}
