//! Per-species lower/upper amount bounds (spec.md §4.2, component C5):
//! `cannotDecrease[Below]`, `cannotIncrease[Above]`, `cannotReact`.

use ndarray::Array1;

use crate::core::ChemicalSystem;

/// Per-species amount-bound overrides layered on top of the default
/// `[epsilon, +inf)` box every species amount gets (spec.md §4.3 "Bounds").
///
/// Built against a [`ChemicalSystem`] so species names resolve to global
/// indices once, at restriction-declaration time, the same fail-fast
/// posture [`crate::equilibrium::specs::EquilibriumSpecs`] takes for its own
/// string-keyed declarations.
#[derive(Debug, Clone, Default)]
pub struct EquilibriumRestrictions {
    /// `Some(value)` overrides the default lower bound for that species.
    lower: Vec<Option<f64>>,
    /// `Some(value)` overrides the default (`+inf`) upper bound.
    upper: Vec<Option<f64>>,
}

impl EquilibriumRestrictions {
    pub fn new(system: &ChemicalSystem) -> Self {
        let n = system.num_species();
        Self {
            lower: vec![None; n],
            upper: vec![None; n],
        }
    }

    fn index_of(system: &ChemicalSystem, species: &str) -> usize {
        system
            .index_of_species(species)
            .unwrap_or_else(|| panic!("species `{species}` is not registered in the chemical system"))
    }

    /// The species' amount may not fall below its current value in the
    /// state the restriction is applied against — recorded by the caller at
    /// [`EquilibriumRestrictions::resolve_bounds`] time via `n0`.
    pub fn cannot_decrease(&mut self, system: &ChemicalSystem, species: &str) -> &mut Self {
        let i = Self::index_of(system, species);
        self.lower[i] = Some(f64::NAN); // sentinel: resolved against n0 at bound-assembly time
        self
    }

    pub fn cannot_decrease_below(&mut self, system: &ChemicalSystem, species: &str, value: f64) -> &mut Self {
        let i = Self::index_of(system, species);
        self.lower[i] = Some(value);
        self
    }

    pub fn cannot_increase(&mut self, system: &ChemicalSystem, species: &str) -> &mut Self {
        let i = Self::index_of(system, species);
        self.upper[i] = Some(f64::NAN);
        self
    }

    pub fn cannot_increase_above(&mut self, system: &ChemicalSystem, species: &str, value: f64) -> &mut Self {
        let i = Self::index_of(system, species);
        self.upper[i] = Some(value);
        self
    }

    /// The species' amount may not change at all: fixed at its value in the
    /// initial state (spec.md §4.3: "fixed at initial amount by
    /// `cannotReact`"). Distinct from
    /// [`crate::equilibrium::specs::EquilibriumSpecs::cannot_react`], which
    /// instead adds a *conservative* reactivity constraint — this is a
    /// bound, enforced directly on `n_i`, with no Lagrange multiplier of its
    /// own.
    pub fn cannot_react(&mut self, system: &ChemicalSystem, species: &str) -> &mut Self {
        let i = Self::index_of(system, species);
        self.lower[i] = Some(f64::NAN);
        self.upper[i] = Some(f64::NAN);
        self
    }

    /// Resolve every declared restriction against the initial amounts `n0`
    /// and the solver's default floor `epsilon`, producing the final
    /// `(lower, upper)` bound arrays `EquilibriumSetup` enforces.
    pub fn resolve_bounds(&self, n0: &Array1<f64>, epsilon: f64) -> (Array1<f64>, Array1<f64>) {
        let n = n0.len();
        let mut lower = Array1::from_elem(n, epsilon);
        let mut upper = Array1::from_elem(n, f64::INFINITY);
        for i in 0..n {
            if let Some(value) = self.lower[i] {
                lower[i] = if value.is_nan() { n0[i] } else { value };
            }
            if let Some(value) = self.upper[i] {
                upper[i] = if value.is_nan() { n0[i] } else { value };
            }
        }
        (lower, upper)
    }
}
