//! On-demand-learning equilibrium solver (spec.md §4.6, component C9): a
//! cache of previously solved reference states, partitioned by a
//! discretized `(T, P)` cell and, within each cell, by the primary-species
//! set active at that reference. A query that lands close enough to a
//! stored reference is served by [`crate::equilibrium::predictor::EquilibriumPredictor`]
//! instead of a full Newton solve; a miss falls through to
//! [`EquilibriumSolver`] and the new reference is learned.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::core::ChemicalState;
use crate::equilibrium::conditions::EquilibriumConditions;
use crate::equilibrium::predictor::{EquilibriumPrediction, EquilibriumPredictor, EquilibriumReferenceState};
use crate::equilibrium::restrictions::EquilibriumRestrictions;
use crate::equilibrium::setup::EquilibriumOptions;
use crate::equilibrium::solver::{EquilibriumResult, EquilibriumSolver};
use crate::equilibrium::specs::EquilibriumSpecs;
use crate::errors::ReaktoroResult;
use crate::props::ChemicalProps;
use crate::utils::{GridCellKey, PrimarySpeciesLabel};

/// Numeric knobs for [`SmartEquilibriumSolver`] (spec.md §4.6): grid
/// discretization, the error-test tolerances applied to predicted chemical
/// potentials, and the per-cluster cache size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmartEquilibriumOptions {
    pub temperature_step: f64,
    pub pressure_step: f64,
    pub reltol: f64,
    pub abstol: f64,
    /// Largest tolerated negative species amount, as a fraction of the
    /// total predicted amount, before a prediction is rejected as
    /// infeasible (spec.md §4.6 step 5).
    pub reltol_negative_amounts: f64,
    pub max_records_per_cluster: usize,
    pub solver_options: EquilibriumOptions,
}

impl Default for SmartEquilibriumOptions {
    fn default() -> Self {
        Self {
            temperature_step: 25.0,
            pressure_step: 1.0e5,
            reltol: 1e-3,
            abstol: 1e-8,
            reltol_negative_amounts: 1e-2,
            max_records_per_cluster: 64,
            solver_options: EquilibriumOptions::default(),
        }
    }
}

/// Outcome of one [`SmartEquilibriumSolver::solve`] call: whether the query
/// was served by prediction, and how many Newton iterations the fallback
/// solve took (`0` on a prediction hit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmartEquilibriumResult {
    pub accepted: bool,
    pub iterations: usize,
}

/// One learned reference state: the extrapolation basis, whose `u0` carries
/// the chemical potentials of every species at the reference point needed
/// for the error test (spec.md §4.6 step 4).
#[derive(Debug, Clone)]
struct Record {
    reference: EquilibriumReferenceState,
    priority: u64,
}

/// Reference states sharing the same primary-species set within one grid
/// cell.
#[derive(Debug, Default)]
struct Cluster {
    records: Vec<Record>,
    priority: u64,
}

/// One discretized `(T, P)` cell: its clusters, plus a record of which
/// other clusters a query starting in a given cluster has previously been
/// served from (spec.md §4.6 step 2 "connectivity priority").
#[derive(Debug, Default)]
struct GridBucket {
    clusters: HashMap<PrimarySpeciesLabel, Cluster>,
    connectivity: HashMap<(PrimarySpeciesLabel, PrimarySpeciesLabel), u64>,
}

/// Caching front-end over [`EquilibriumSolver`] (spec.md §4.6, component
/// C9). Holds its cache behind a [`RefCell`] the same way
/// [`crate::props::AqueousProps`] holds its thread-local memo: `solve`
/// mutates cached state without needing `&mut self`.
#[derive(Debug)]
pub struct SmartEquilibriumSolver {
    solver: EquilibriumSolver,
    predictor: EquilibriumPredictor,
    options: SmartEquilibriumOptions,
    cache: RefCell<HashMap<GridCellKey, GridBucket>>,
}

impl SmartEquilibriumSolver {
    pub fn new(specs: Rc<EquilibriumSpecs>, options: SmartEquilibriumOptions) -> Self {
        let solver = EquilibriumSolver::new(specs, options.solver_options);
        Self {
            solver,
            predictor: EquilibriumPredictor::new(),
            options,
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// The wrapped exact solver, e.g. to inspect its setup or force a full
    /// solve directly.
    pub fn solver(&self) -> &EquilibriumSolver {
        &self.solver
    }

    /// Number of reference states currently cached, across every cell and
    /// cluster.
    pub fn num_records(&self) -> usize {
        self.cache
            .borrow()
            .values()
            .flat_map(|cell| cell.clusters.values())
            .map(|cluster| cluster.records.len())
            .sum()
    }

    /// Attempt a prediction; on miss, fall through to a full Newton solve
    /// and learn the result (spec.md §4.6).
    pub fn solve(
        &self,
        state: &mut ChemicalState,
        conditions: &EquilibriumConditions,
        restrictions: &EquilibriumRestrictions,
    ) -> ReaktoroResult<SmartEquilibriumResult> {
        let w = conditions.w().clone();
        let b = self.solver.setup().specs().initial_components(state.n());
        let key = GridCellKey::new(
            state.temperature(),
            state.pressure(),
            self.options.temperature_step,
            self.options.pressure_step,
        );
        let label = PrimarySpeciesLabel::new(state.aux().primary_species.clone());

        if self.try_predict(key, &label, state, &w, &b) {
            return Ok(SmartEquilibriumResult {
                accepted: true,
                iterations: 0,
            });
        }

        let result = self.solver.solve(state, conditions, restrictions)?;
        let learned_label = PrimarySpeciesLabel::new(state.aux().primary_species.clone());
        self.learn(key, learned_label, &result, state, &w, &b);
        Ok(SmartEquilibriumResult {
            accepted: false,
            iterations: result.iterations,
        })
    }

    /// Resolve `(T, P)` from the declared inputs `w` or the solved control
    /// variables `p`, the same lookup [`EquilibriumSolver::solve`] uses to
    /// write a converged state's temperature/pressure back.
    fn resolve_tp(&self, w: &Array1<f64>, p: &Array1<f64>) -> (f64, f64) {
        let specs = self.solver.setup().specs();
        let t = specs
            .temperature_input_index()
            .map(|i| w[i])
            .or_else(|| specs.temperature_p_index().map(|i| p[i]))
            .unwrap_or(298.15);
        let pr = specs
            .pressure_input_index()
            .map(|i| w[i])
            .or_else(|| specs.pressure_p_index().map(|i| p[i]))
            .unwrap_or(1e5);
        (t, pr)
    }

    fn try_predict(
        &self,
        key: GridCellKey,
        label: &PrimarySpeciesLabel,
        state: &mut ChemicalState,
        w: &Array1<f64>,
        b: &Array1<f64>,
    ) -> bool {
        let mut cache = self.cache.borrow_mut();
        let cell = match cache.get_mut(&key) {
            Some(cell) => cell,
            None => return false,
        };

        let mut order: Vec<PrimarySpeciesLabel> = Vec::new();
        if cell.clusters.contains_key(label) {
            order.push(label.clone());
        }
        let mut others: Vec<PrimarySpeciesLabel> = cell.clusters.keys().cloned().filter(|l| l != label).collect();
        others.sort_by_key(|l| {
            std::cmp::Reverse(
                cell.connectivity
                    .get(&(label.clone(), l.clone()))
                    .copied()
                    .unwrap_or(0),
            )
        });
        order.extend(others);

        for cluster_label in &order {
            let cluster = cell.clusters.get_mut(cluster_label).unwrap();
            cluster.records.sort_by_key(|r| std::cmp::Reverse(r.priority));

            let mut found: Option<(usize, EquilibriumPrediction)> = None;
            for (idx, record) in cluster.records.iter().enumerate() {
                let epsilon = self.solver.setup().options().epsilon;
                let prediction = match self.predictor.predict(&record.reference, w, b, epsilon) {
                    Ok(prediction) => prediction,
                    Err(_) => continue,
                };
                if self.passes_error_test(record, &prediction, cluster_label) {
                    found = Some((idx, prediction));
                    break;
                }
            }

            if let Some((idx, prediction)) = found {
                cluster.records[idx].priority += 1;
                cluster.priority += 1;
                if label != cluster_label {
                    *cell
                        .connectivity
                        .entry((label.clone(), cluster_label.clone()))
                        .or_insert(0) += 1;
                }
                self.apply_prediction(state, w, b, &prediction, cluster_label);
                return true;
            }
        }
        false
    }

    /// The error test of spec.md §4.6 step 4/5: every primary species'
    /// chemical potential, extrapolated by the record's own predictor, must
    /// stay within `reltol`/`abstol` of its value at the reference, and the
    /// predicted amounts must not dip more than `reltol_negative_amounts *
    /// sum(n)` below zero.
    fn passes_error_test(&self, record: &Record, prediction: &EquilibriumPrediction, label: &PrimarySpeciesLabel) -> bool {
        for &i in label.species() {
            let u_new = prediction.u[i];
            let u_ref = record.reference.u0[i];
            let tol = self.options.reltol * u_ref.abs() + self.options.abstol;
            if (u_new - u_ref).abs() >= tol {
                return false;
            }
        }

        let total: f64 = prediction.n.sum();
        let min_n = prediction.n.iter().cloned().fold(f64::INFINITY, f64::min);
        min_n >= -self.options.reltol_negative_amounts * total
    }

    fn apply_prediction(
        &self,
        state: &mut ChemicalState,
        w: &Array1<f64>,
        b: &Array1<f64>,
        prediction: &EquilibriumPrediction,
        label: &PrimarySpeciesLabel,
    ) {
        let epsilon = self.solver.setup().options().epsilon;
        let n = prediction.n.mapv(|v| v.max(epsilon));
        let (t, p) = self.resolve_tp(w, &prediction.p);
        state.set_n(n);
        state.set_temperature(t);
        state.set_pressure(p);

        let dims = self.solver.setup().specs().dims();
        state.set_aux(crate::core::EquilibriumAux {
            w: w.clone(),
            c: b.clone(),
            p: prediction.p.clone(),
            q: prediction.q.clone(),
            y: Array1::zeros(dims.c),
            z: Array1::zeros(0),
            primary_species: label.species().to_vec(),
        });
    }

    fn learn(
        &self,
        key: GridCellKey,
        label: PrimarySpeciesLabel,
        result: &EquilibriumResult,
        state: &ChemicalState,
        w: &Array1<f64>,
        b: &Array1<f64>,
    ) {
        let system = self.solver.setup().system();
        let chemical = ChemicalProps::update(system, state.temperature(), state.pressure(), &result.n);
        let u0: Array1<f64> = (0..system.num_species()).map(|i| chemical.chemical_potential(i)).collect();
        let reference = EquilibriumReferenceState::new(w.clone(), b.clone(), u0, result);
        let record = Record { reference, priority: 0 };

        let mut cache = self.cache.borrow_mut();
        let cell = cache.entry(key).or_default();
        let cluster = cell.clusters.entry(label).or_default();
        cluster.records.push(record);
        cluster.priority += 1;

        if cluster.records.len() > self.options.max_records_per_cluster {
            if let Some((idx, _)) = cluster.records.iter().enumerate().min_by_key(|(_, r)| r.priority) {
                cluster.records.remove(idx);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AggregateState, ChemicalSystem, Phase, Species};
    use crate::models::{ConstantStandardThermoModel, IdealActivityModel};
    use ndarray::Array1;

    fn system() -> Rc<ChemicalSystem> {
        let h2o = Species::new(
            "H2O(l)",
            "H2O",
            AggregateState::Liquid,
            Rc::new(ConstantStandardThermoModel::new(-237_180.0, -285_830.0, 1.8e-5, 75.3)),
        );
        let h_plus = Species::new(
            "H+",
            "H+",
            AggregateState::Aqueous,
            Rc::new(ConstantStandardThermoModel::new(0.0, 0.0, 0.0, 0.0)),
        );
        let oh_minus = Species::new(
            "OH-",
            "OH-",
            AggregateState::Aqueous,
            Rc::new(ConstantStandardThermoModel::new(-157_290.0, -230_020.0, -4.2e-6, -148.1)),
        );
        let aqueous = Phase::new(
            "Aqueous",
            AggregateState::Aqueous,
            vec![h2o, h_plus, oh_minus],
            Rc::new(IdealActivityModel),
        );
        Rc::new(ChemicalSystem::new(vec![aqueous]))
    }

    fn specs_and_conditions(system: &Rc<ChemicalSystem>) -> (Rc<EquilibriumSpecs>, EquilibriumConditions) {
        let mut specs = EquilibriumSpecs::new(Rc::clone(system));
        specs.temperature().unwrap().pressure().unwrap();
        let specs = Rc::new(specs);

        let mut conditions = EquilibriumConditions::new(&specs);
        conditions.temperature(&specs, 298.15).unwrap();
        conditions.pressure(&specs, 1e5).unwrap();
        (specs, conditions)
    }

    #[test]
    fn repeated_query_is_served_by_prediction() {
        let system = system();
        let (specs, conditions) = specs_and_conditions(&system);
        let restrictions = EquilibriumRestrictions::new(&system);

        let mut state = ChemicalState::new(Rc::clone(&system));
        state.set_temperature(298.15);
        state.set_pressure(1e5);
        state.set_n(Array1::from(vec![55.5_f64, 1e-7, 1e-7]));

        let smart = SmartEquilibriumSolver::new(Rc::clone(&specs), SmartEquilibriumOptions::default());

        let first = smart.solve(&mut state, &conditions, &restrictions).unwrap();
        assert!(!first.accepted);
        assert_eq!(smart.num_records(), 1);

        let mut state2 = ChemicalState::new(Rc::clone(&system));
        state2.set_temperature(298.15);
        state2.set_pressure(1e5);
        state2.set_n(state.n().clone());

        let second = smart.solve(&mut state2, &conditions, &restrictions).unwrap();
        assert!(second.accepted);
        assert_eq!(second.iterations, 0);
        assert_eq!(smart.num_records(), 1);
    }

    #[test]
    fn distant_query_falls_back_to_exact_solve() {
        let system = system();
        let (specs, conditions) = specs_and_conditions(&system);
        let restrictions = EquilibriumRestrictions::new(&system);

        let mut state = ChemicalState::new(Rc::clone(&system));
        state.set_temperature(298.15);
        state.set_pressure(1e5);
        state.set_n(Array1::from(vec![55.5_f64, 1e-7, 1e-7]));

        let smart = SmartEquilibriumSolver::new(Rc::clone(&specs), SmartEquilibriumOptions::default());
        smart.solve(&mut state, &conditions, &restrictions).unwrap();

        let mut far_conditions = EquilibriumConditions::new(&specs);
        far_conditions.temperature(&specs, 373.15).unwrap();
        far_conditions.pressure(&specs, 1e5).unwrap();

        let mut state2 = ChemicalState::new(Rc::clone(&system));
        state2.set_temperature(373.15);
        state2.set_pressure(1e5);
        state2.set_n(Array1::from(vec![55.5_f64, 1e-7, 1e-7]));

        let result = smart.solve(&mut state2, &far_conditions, &restrictions).unwrap();
        assert!(!result.accepted);
        assert_eq!(smart.num_records(), 2);
    }
}
