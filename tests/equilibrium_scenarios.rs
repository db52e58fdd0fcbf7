//! End-to-end equilibrium scenarios exercised through the public API only:
//! declare a system, declare the specs/conditions/restrictions a caller
//! would, solve, and check the physical invariants a correct solve must
//! satisfy (conservation, non-negativity, target recovery) rather than
//! comparing against externally-sourced reference numbers — this crate
//! ships no thermodynamic database, so every system here is built from
//! small, self-consistent, made-up standard-state data good enough to
//! exercise the solver honestly.

use std::rc::Rc;

use ndarray::Array1;

use reaktoro_equilibrium::core::{AggregateState, ChemicalState, ChemicalSystem, Phase, Species};
use reaktoro_equilibrium::equilibrium::{
    EquilibriumConditions, EquilibriumOptions, EquilibriumRestrictions, EquilibriumSolver,
    EquilibriumSpecs, SmartEquilibriumOptions, SmartEquilibriumSolver,
};
use reaktoro_equilibrium::models::{ConstantStandardThermoModel, IdealActivityModel};
use reaktoro_equilibrium::props::{compute_aqueous_props, ChemicalProps};

fn species(name: &str, formula: &str, state: AggregateState, g0: f64, h0: f64, v0: f64, cp0: f64) -> Species {
    Species::new(name, formula, state, Rc::new(ConstantStandardThermoModel::new(g0, h0, v0, cp0)))
}

/// A small carbonate-brine system: water autoionization plus a Ca-CO3
/// aqueous speciation, with calcite as a pure solid phase a caller might
/// saturate or dissolve.
fn carbonate_brine() -> Rc<ChemicalSystem> {
    let aqueous = Phase::new(
        "Aqueous",
        AggregateState::Aqueous,
        vec![
            species("H2O(l)", "H2O", AggregateState::Liquid, -237_180.0, -285_830.0, 1.8e-5, 75.3),
            species("H+", "H+", AggregateState::Aqueous, 0.0, 0.0, 0.0, 0.0),
            species("OH-", "OH-", AggregateState::Aqueous, -157_290.0, -230_020.0, -4.2e-6, -148.1),
            species("Ca+2", "Ca+2", AggregateState::Aqueous, -553_580.0, -542_960.0, -1.8e-5, -30.9),
            species("CO3-2", "CO3-2", AggregateState::Aqueous, -527_900.0, -677_140.0, -6.1e-6, -289.0),
            species("HCO3-", "HCO3-", AggregateState::Aqueous, -586_940.0, -692_020.0, 2.4e-5, 8.5),
        ],
        Rc::new(IdealActivityModel),
    );
    let calcite = Phase::new(
        "Calcite",
        AggregateState::Solid,
        vec![species("Calcite", "CaCO3", AggregateState::Solid, -1_129_180.0, -1_207_470.0, 3.69e-5, 83.5)],
        Rc::new(IdealActivityModel),
    );
    Rc::new(ChemicalSystem::new(vec![aqueous, calcite]))
}

/// Water autoionization plus a dissolved iron couple, for a pH/pE-type
/// redox scenario.
fn iron_brine() -> Rc<ChemicalSystem> {
    let aqueous = Phase::new(
        "Aqueous",
        AggregateState::Aqueous,
        vec![
            species("H2O(l)", "H2O", AggregateState::Liquid, -237_180.0, -285_830.0, 1.8e-5, 75.3),
            species("H+", "H+", AggregateState::Aqueous, 0.0, 0.0, 0.0, 0.0),
            species("OH-", "OH-", AggregateState::Aqueous, -157_290.0, -230_020.0, -4.2e-6, -148.1),
            species("e-", "e-", AggregateState::Aqueous, 0.0, 0.0, 0.0, 0.0),
            species("Fe+2", "Fe+2", AggregateState::Aqueous, -78_900.0, -89_100.0, -2.9e-5, 58.2),
            species("Fe+3", "Fe+3", AggregateState::Aqueous, -4_700.0, -49_500.0, -4.4e-5, -2.3),
        ],
        Rc::new(IdealActivityModel),
    );
    Rc::new(ChemicalSystem::new(vec![aqueous]))
}

/// Water autoionization plus dissolved CO2 and a pure quartz phase, for an
/// energy-constrained (enthalpy-fixed, temperature-unknown) scenario.
fn co2_brine_with_quartz() -> Rc<ChemicalSystem> {
    let aqueous = Phase::new(
        "Aqueous",
        AggregateState::Aqueous,
        vec![
            species("H2O(l)", "H2O", AggregateState::Liquid, -237_180.0, -285_830.0, 1.8e-5, 75.3),
            species("CO2(aq)", "CO2", AggregateState::Aqueous, -385_970.0, -413_800.0, 3.3e-5, 267.0),
        ],
        Rc::new(IdealActivityModel),
    );
    let solids = Phase::new(
        "Solids",
        AggregateState::Solid,
        vec![species("SiO2(s)", "SiO2", AggregateState::Solid, -856_238.0, -910_700.0, 2.27e-5, 44.4)],
        Rc::new(IdealActivityModel),
    );
    Rc::new(ChemicalSystem::new(vec![aqueous, solids]))
}

fn element_amount(system: &ChemicalSystem, n: &Array1<f64>, symbol: &str) -> f64 {
    let row = system.index_of_element(symbol).expect("element present in system");
    system.formula_matrix().row(row).dot(n)
}

// -- scenario 1: fixed T, P, pH speciation of a carbonate brine -----------------

#[test]
fn fixed_tp_ph_speciation_conserves_elements_and_hits_target_ph() {
    let system = carbonate_brine();

    let mut specs = EquilibriumSpecs::new(Rc::clone(&system));
    specs.temperature().unwrap().pressure().unwrap().ph().unwrap();
    let specs = Rc::new(specs);

    let mut conditions = EquilibriumConditions::new(&specs);
    conditions.temperature(&specs, 298.15).unwrap();
    conditions.pressure(&specs, 1e5).unwrap();
    conditions.ph(&specs, 7.0).unwrap();

    let restrictions = EquilibriumRestrictions::new(&system);
    let mut state = ChemicalState::new(Rc::clone(&system));
    state.set_temperature(298.15);
    state.set_pressure(1e5);
    state.set_n(Array1::from(vec![55.5, 1e-7, 1e-7, 1e-3, 1e-5, 1e-4, 1.0]));

    let n0 = state.n().clone();
    let ca_before = element_amount(&system, &n0, "Ca");
    let c_before = element_amount(&system, &n0, "C");

    let solver = EquilibriumSolver::new(Rc::clone(&specs), EquilibriumOptions::default());
    let result = solver.solve(&mut state, &conditions, &restrictions).unwrap();

    assert!(result.iterations <= EquilibriumOptions::default().max_iterations);
    assert!(result.n.iter().all(|&ni| ni >= 0.0));

    // pH is declared as an equation constraint on ln(a[H+]); the solver
    // opens the system to H+ to hit it, but neither Ca nor C is opened, so
    // their element totals must still balance.
    let ca_after = element_amount(&system, &result.n, "Ca");
    let c_after = element_amount(&system, &result.n, "C");
    assert!((ca_after - ca_before).abs() < 1e-6 * ca_before.max(1.0));
    assert!((c_after - c_before).abs() < 1e-6 * c_before.max(1.0));

    let props = ChemicalProps::update(&system, state.temperature(), state.pressure(), &result.n);
    let aqueous = compute_aqueous_props(&system, &props);
    assert!((aqueous.ph() - 7.0).abs() < 1e-4);
}

// -- scenario 2: fixed enthalpy and pressure, temperature unknown (CO2 solubility) ---

#[test]
fn fixed_enthalpy_pressure_recovers_self_consistent_temperature() {
    let system = co2_brine_with_quartz();
    let n0 = Array1::from(vec![55.5, 0.01, 0.0]);

    // The target enthalpy is the one the guessed composition already has at
    // 298.15 K / 1 bar, so a solution is known to exist near the initial
    // guess without needing an externally sourced reference enthalpy.
    let target_h = ChemicalProps::update(&system, 298.15_f64, 1e5, &n0).enthalpy();

    let mut specs = EquilibriumSpecs::new(Rc::clone(&system));
    specs.pressure().unwrap().enthalpy().unwrap();
    specs.unknown_temperature();
    let specs = Rc::new(specs);

    let mut conditions = EquilibriumConditions::new(&specs);
    conditions.pressure(&specs, 1e5).unwrap();
    conditions.enthalpy(&specs, target_h).unwrap();

    let restrictions = EquilibriumRestrictions::new(&system);
    let mut state = ChemicalState::new(Rc::clone(&system));
    state.set_temperature(298.15);
    state.set_pressure(1e5);
    state.set_n(n0.clone());

    let solver = EquilibriumSolver::new(Rc::clone(&specs), EquilibriumOptions::default());
    let result = solver.solve(&mut state, &conditions, &restrictions).unwrap();

    assert!(result.n.iter().all(|&ni| ni >= 0.0));
    assert!((state.temperature() - 298.15).abs() < 1e-3);

    let c_before = element_amount(&system, &n0, "C");
    let c_after = element_amount(&system, &result.n, "C");
    assert!((c_after - c_before).abs() < 1e-6 * c_before.max(1.0));
}

// -- scenario 3: souring problem, fixed pH and pE ------------------------------

#[test]
fn fixed_ph_and_pe_souring_problem_conserves_iron() {
    let system = iron_brine();

    let mut specs = EquilibriumSpecs::new(Rc::clone(&system));
    specs.temperature().unwrap().pressure().unwrap().ph().unwrap().pe().unwrap();
    let specs = Rc::new(specs);

    let mut conditions = EquilibriumConditions::new(&specs);
    conditions.temperature(&specs, 298.15).unwrap();
    conditions.pressure(&specs, 1e5).unwrap();
    conditions.ph(&specs, 6.5).unwrap();
    conditions.pe(&specs, -3.0).unwrap();

    let restrictions = EquilibriumRestrictions::new(&system);
    let mut state = ChemicalState::new(Rc::clone(&system));
    state.set_temperature(298.15);
    state.set_pressure(1e5);
    state.set_n(Array1::from(vec![55.5, 1e-6, 1e-8, 1e-6, 1e-4, 1e-5]));

    let n0 = state.n().clone();
    let fe_before = element_amount(&system, &n0, "Fe");

    let solver = EquilibriumSolver::new(Rc::clone(&specs), EquilibriumOptions::default());
    let result = solver.solve(&mut state, &conditions, &restrictions).unwrap();

    assert!(result.n.iter().all(|&ni| ni >= 0.0));

    let fe_after = element_amount(&system, &result.n, "Fe");
    assert!((fe_after - fe_before).abs() < 1e-6 * fe_before.max(1.0));

    let props = ChemicalProps::update(&system, state.temperature(), state.pressure(), &result.n);
    let aqueous = compute_aqueous_props(&system, &props);
    assert!((aqueous.ph() - 6.5).abs() < 1e-4);
    assert!((aqueous.pe() - (-3.0)).abs() < 1e-4);
}

// -- scenario 4: an inert reaction holds a species amount fixed ----------------

#[test]
fn inert_reaction_constraint_holds_species_amount_fixed() {
    let system = carbonate_brine();

    let mut specs = EquilibriumSpecs::new(Rc::clone(&system));
    specs.temperature().unwrap().pressure().unwrap();
    specs.cannot_react("Calcite").unwrap();
    let specs = Rc::new(specs);

    let mut conditions = EquilibriumConditions::new(&specs);
    conditions.temperature(&specs, 298.15).unwrap();
    conditions.pressure(&specs, 1e5).unwrap();

    let restrictions = EquilibriumRestrictions::new(&system);
    let mut state = ChemicalState::new(Rc::clone(&system));
    state.set_temperature(298.15);
    state.set_pressure(1e5);
    state.set_n(Array1::from(vec![55.5, 1e-7, 1e-7, 1e-3, 1e-5, 1e-4, 0.5]));

    let calcite_index = system.index_of_species("Calcite").unwrap();
    let calcite_before = state.n()[calcite_index];

    let solver = EquilibriumSolver::new(Rc::clone(&specs), EquilibriumOptions::default());
    let result = solver.solve(&mut state, &conditions, &restrictions).unwrap();

    // `cannot_react` is a conservative reactivity constraint (spec.md §4.2),
    // enforced through the same KKT conservation system as every element —
    // convergence of the residual norm below tolerance means this
    // component is conserved to the same accuracy as mass/charge.
    assert!((result.n[calcite_index] - calcite_before).abs() < 1e-6 * calcite_before.max(1.0));
}

// -- scenario 5: the smart solver predicts at a repeated query, falls back when far --

#[test]
fn smart_solver_predicts_nearby_and_falls_back_when_far() {
    let system = carbonate_brine();

    let mut specs = EquilibriumSpecs::new(Rc::clone(&system));
    specs.temperature().unwrap().pressure().unwrap();
    let specs = Rc::new(specs);

    let restrictions = EquilibriumRestrictions::new(&system);
    let smart = SmartEquilibriumSolver::new(Rc::clone(&specs), SmartEquilibriumOptions::default());

    let n0 = Array1::from(vec![55.5, 1e-7, 1e-7, 1e-3, 1e-5, 1e-4, 1.0]);

    let mut conditions = EquilibriumConditions::new(&specs);
    conditions.temperature(&specs, 298.15).unwrap();
    conditions.pressure(&specs, 1e5).unwrap();

    let mut state = ChemicalState::new(Rc::clone(&system));
    state.set_temperature(298.15);
    state.set_pressure(1e5);
    state.set_n(n0.clone());

    let first = smart.solve(&mut state, &conditions, &restrictions).unwrap();
    assert!(!first.accepted, "the cache starts empty; the first query must learn");
    assert_eq!(smart.num_records(), 1);

    // Same (T, P), same warm start: a repeated query at the reference point
    // itself always predicts exactly, since the extrapolated step is zero.
    let mut repeat_state = ChemicalState::new(Rc::clone(&system));
    repeat_state.set_temperature(298.15);
    repeat_state.set_pressure(1e5);
    repeat_state.set_n(state.n().clone());
    let repeat = smart.solve(&mut repeat_state, &conditions, &restrictions).unwrap();
    assert!(repeat.accepted);
    assert_eq!(repeat.iterations, 0);
    assert_eq!(smart.num_records(), 1);

    // A distant (T, P) falls outside this discretized grid cell and must
    // fall back to a full solve, learning a second reference state.
    let mut far_conditions = EquilibriumConditions::new(&specs);
    far_conditions.temperature(&specs, 363.15).unwrap();
    far_conditions.pressure(&specs, 1e5).unwrap();

    let mut far_state = ChemicalState::new(Rc::clone(&system));
    far_state.set_temperature(363.15);
    far_state.set_pressure(1e5);
    far_state.set_n(n0);

    let far = smart.solve(&mut far_state, &far_conditions, &restrictions).unwrap();
    assert!(!far.accepted);
    assert_eq!(smart.num_records(), 2);
}

// -- scenario 6: a pure phase starting at the floor is allowed to appear -------

#[test]
fn pure_phase_appears_from_the_floor_without_going_negative() {
    let system = co2_brine_with_quartz();

    let mut specs = EquilibriumSpecs::new(Rc::clone(&system));
    specs.temperature().unwrap().pressure().unwrap();
    let specs = Rc::new(specs);

    let mut conditions = EquilibriumConditions::new(&specs);
    conditions.temperature(&specs, 298.15).unwrap();
    conditions.pressure(&specs, 1e5).unwrap();

    let restrictions = EquilibriumRestrictions::new(&system);
    let mut state = ChemicalState::new(Rc::clone(&system));
    state.set_temperature(298.15);
    state.set_pressure(1e5);
    // Quartz starts at the barrier floor, as if the solid had not yet
    // precipitated.
    state.set_n(Array1::from(vec![55.5, 0.01, EquilibriumOptions::default().epsilon]));

    let solver = EquilibriumSolver::new(Rc::clone(&specs), EquilibriumOptions::default());
    let result = solver.solve(&mut state, &conditions, &restrictions).unwrap();

    assert!(result.n.iter().all(|&ni| ni >= 0.0));
    let quartz_index = system.index_of_species("SiO2(s)").unwrap();
    assert!(result.n[quartz_index] >= EquilibriumOptions::default().epsilon * (1.0 - 1e-8));
}

// -- general invariant: minimization from a feasible but non-stationary guess --

#[test]
fn solving_decreases_system_gibbs_energy_from_a_feasible_guess() {
    let system = iron_brine();

    let mut specs = EquilibriumSpecs::new(Rc::clone(&system));
    specs.temperature().unwrap().pressure().unwrap();
    let specs = Rc::new(specs);

    let mut conditions = EquilibriumConditions::new(&specs);
    conditions.temperature(&specs, 298.15).unwrap();
    conditions.pressure(&specs, 1e5).unwrap();

    let restrictions = EquilibriumRestrictions::new(&system);
    let mut state = ChemicalState::new(Rc::clone(&system));
    state.set_temperature(298.15);
    state.set_pressure(1e5);
    // A deliberately lopsided, far-from-stationary guess: plenty of both
    // redox states and both autoionization products at once.
    let n0 = Array1::from(vec![55.5, 1e-2, 1e-2, 1e-2, 1e-2, 1e-2]);
    state.set_n(n0.clone());

    let g_initial = ChemicalProps::update(&system, 298.15_f64, 1e5, &n0).gibbs_energy();

    let solver = EquilibriumSolver::new(Rc::clone(&specs), EquilibriumOptions::default());
    let result = solver.solve(&mut state, &conditions, &restrictions).unwrap();

    let g_final = ChemicalProps::update(&system, 298.15_f64, 1e5, &result.n).gibbs_energy();
    assert!(g_final <= g_initial + 1e-6 * g_initial.abs().max(1.0));
}
