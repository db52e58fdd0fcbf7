use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use ndarray::Array1;

use crate::core::system::ChemicalSystem;

static NEXT_STATE_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a fresh, process-wide monotonically increasing id.
///
/// Used both by [`ChemicalState`] (bumped on every mutation) and by
/// [`crate::props::ChemicalProps`], whose own `stateid` and the
/// `AqueousProps` thread-local memo (spec.md §5 "Shared caches") key off of
/// it: invalidation is a cheap integer comparison rather than a content
/// comparison.
pub fn next_state_id() -> u64 {
    NEXT_STATE_ID.fetch_add(1, Ordering::Relaxed)
}

/// The equilibrium-solve auxiliary block of a [`ChemicalState`] (spec.md
/// §3): everything the solver needs to warm-start a subsequent solve and to
/// report sensitivities, kept alongside the state rather than recomputed.
#[derive(Debug, Clone, Default)]
pub struct EquilibriumAux {
    /// Input values `w` used for the last solve.
    pub w: Array1<f64>,
    /// Conservative component amounts `c` at the start of the last solve.
    pub c: Array1<f64>,
    /// Values of the *p* control variables.
    pub p: Array1<f64>,
    /// Values of the *q* control variables.
    pub q: Array1<f64>,
    /// Lagrange multipliers for the linear conservation constraints.
    pub y: Array1<f64>,
    /// Lagrange multipliers for the nonlinear equation constraints.
    pub z: Array1<f64>,
    /// Indices (into the system's global species vector) of the current
    /// primary (basic) species.
    pub primary_species: Vec<usize>,
}

impl EquilibriumAux {
    pub fn is_empty(&self) -> bool {
        self.w.is_empty() && self.c.is_empty() && self.p.is_empty() && self.q.is_empty()
    }
}

/// The mutable state of a chemical system: temperature, pressure, species
/// amounts, and bookkeeping left behind by the last equilibrium solve
/// (spec.md §3).
///
/// `system` is a shared, immutable handle (`Rc`): cloning a [`ChemicalState`]
/// is cheap and does not duplicate the system, matching spec.md §9's
/// value-with-shared-implementation-handle idiom.
#[derive(Debug, Clone)]
pub struct ChemicalState {
    system: Rc<ChemicalSystem>,
    temperature: f64,
    pressure: f64,
    n: Array1<f64>,
    surface_areas: Array1<f64>,
    aux: EquilibriumAux,
    stateid: u64,
}

impl ChemicalState {
    /// A state at `298.15 K`, `1e5 Pa`, with every species amount at zero.
    pub fn new(system: Rc<ChemicalSystem>) -> Self {
        let n = Array1::zeros(system.num_species());
        let surface_areas = Array1::zeros(system.num_species());
        Self {
            system,
            temperature: 298.15,
            pressure: 1e5,
            n,
            surface_areas,
            aux: EquilibriumAux::default(),
            stateid: next_state_id(),
        }
    }

    pub fn system(&self) -> &Rc<ChemicalSystem> {
        &self.system
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn pressure(&self) -> f64 {
        self.pressure
    }

    pub fn n(&self) -> &Array1<f64> {
        &self.n
    }

    pub fn surface_areas(&self) -> &Array1<f64> {
        &self.surface_areas
    }

    pub fn aux(&self) -> &EquilibriumAux {
        &self.aux
    }

    pub fn stateid(&self) -> u64 {
        self.stateid
    }

    pub fn set_temperature(&mut self, t: f64) {
        self.temperature = t;
        self.bump();
    }

    pub fn set_pressure(&mut self, p: f64) {
        self.pressure = p;
        self.bump();
    }

    /// Set a single species' amount (mol) by global index.
    pub fn set_species_amount(&mut self, index: usize, amount: f64) {
        self.n[index] = amount;
        self.bump();
    }

    /// Set a species' amount by name.
    pub fn set_species_amount_by_name(&mut self, name: &str, amount: f64) -> bool {
        match self.system.index_of_species(name) {
            Some(index) => {
                self.set_species_amount(index, amount);
                true
            }
            None => false,
        }
    }

    /// Overwrite the whole amounts vector, e.g. after a solve.
    pub fn set_n(&mut self, n: Array1<f64>) {
        assert_eq!(n.len(), self.n.len());
        self.n = n;
        self.bump();
    }

    /// Overwrite the equilibrium auxiliary block, e.g. after a solve.
    pub fn set_aux(&mut self, aux: EquilibriumAux) {
        self.aux = aux;
        self.bump();
    }

    fn bump(&mut self) {
        self.stateid = next_state_id();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::species::AggregateState;
    use crate::models::ConstantStandardThermoModel;
    use crate::core::phase::Phase;
    use crate::core::species::Species;

    fn trivial_system() -> Rc<ChemicalSystem> {
        let h2o = Species::new(
            "H2O(l)",
            "H2O",
            AggregateState::Liquid,
            Rc::new(ConstantStandardThermoModel::new(-237_180.0, -285_830.0, 1.8e-5, 75.3)),
        );
        let aqueous = Phase::new(
            "Aqueous",
            AggregateState::Aqueous,
            vec![h2o],
            Rc::new(crate::models::IdealActivityModel),
        );
        Rc::new(ChemicalSystem::new(vec![aqueous]))
    }

    #[test]
    fn mutation_bumps_stateid() {
        let mut state = ChemicalState::new(trivial_system());
        let before = state.stateid();
        state.set_species_amount(0, 55.5);
        assert!(state.stateid() > before);
        assert_eq!(state.n()[0], 55.5);
    }

    #[test]
    fn lookup_by_name_reports_missing_species() {
        let mut state = ChemicalState::new(trivial_system());
        assert!(!state.set_species_amount_by_name("CO2(g)", 1.0));
        assert!(state.set_species_amount_by_name("H2O(l)", 2.0));
    }
}
