use std::rc::Rc;

use crate::core::species::{AggregateState, Species};
use crate::models::{ActivityModel, IdealActivityModel};

/// A phase: an ordered list of species sharing one activity model (spec.md
/// §3). Species within a phase are kept contiguous wherever the phase's
/// parent [`crate::core::ChemicalSystem`] lays out its global species
/// vector.
#[derive(Debug, Clone)]
pub struct Phase {
    name: String,
    aggregate_state: AggregateState,
    species: Vec<Species>,
    activity_model: Rc<dyn ActivityModel>,
    ideal_activity_model: Rc<dyn ActivityModel>,
}

impl Phase {
    /// Build a phase. `ideal_activity_model` defaults to
    /// [`IdealActivityModel`] when not overridden via
    /// [`Phase::with_ideal_activity_model`]; it backs the `Approx`/
    /// `ApproxDiagonal` Hessian modes of
    /// `crate::equilibrium::setup::EquilibriumSetup` (spec.md §4.3).
    pub fn new(
        name: impl Into<String>,
        aggregate_state: AggregateState,
        species: Vec<Species>,
        activity_model: Rc<dyn ActivityModel>,
    ) -> Self {
        assert!(!species.is_empty(), "a phase must contain at least one species");
        Self {
            name: name.into(),
            aggregate_state,
            species,
            activity_model,
            ideal_activity_model: Rc::new(IdealActivityModel),
        }
    }

    pub fn with_ideal_activity_model(mut self, model: Rc<dyn ActivityModel>) -> Self {
        self.ideal_activity_model = model;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn aggregate_state(&self) -> AggregateState {
        self.aggregate_state
    }

    pub fn species(&self) -> &[Species] {
        &self.species
    }

    pub fn num_species(&self) -> usize {
        self.species.len()
    }

    pub fn activity_model(&self) -> &Rc<dyn ActivityModel> {
        &self.activity_model
    }

    pub fn ideal_activity_model(&self) -> &Rc<dyn ActivityModel> {
        &self.ideal_activity_model
    }

    /// A phase with exactly one species whose activity is constant — spec.md
    /// §4.3 applies the pure-phase log-barrier only to such phases.
    pub fn is_pure(&self) -> bool {
        self.species.len() == 1
    }
}
