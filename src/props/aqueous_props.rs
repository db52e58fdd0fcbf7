use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::core::{AggregateState, ChemicalSystem};
use crate::props::chemical_props::{ChemicalProps, GAS_CONSTANT};

const LN10: f64 = std::f64::consts::LN_10;
const FARADAY_CONSTANT: f64 = 96_485.33212;

/// A read-only view over a converged [`ChemicalProps`] exposing the
/// aqueous-phase-specific quantities spec.md's GLOSSARY and test scenarios
/// 1/3 name directly: `pH`, `pE`, `Eh`, ionic strength, and the saturation
/// index of a non-aqueous species (spec.md §S1, grounded on
/// `Reaktoro/Utils/AqueousProps.cpp`).
///
/// Requires exactly one aqueous phase in the system, and that phase to
/// contain species named `"H2O(l)"`, `"H+"`, and (for `pE`/`Eh`) `"e-"`.
#[derive(Debug, Clone)]
pub struct AqueousProps {
    temperature: f64,
    pressure: f64,
    ln_a_h: f64,
    ln_a_e: Option<f64>,
    ionic_strength: f64,
    water_mass: f64,
}

impl AqueousProps {
    /// Build directly from a converged [`ChemicalProps<f64>`]. Prefer
    /// [`AqueousProps::compute`] for the memoized, shared-cache variant
    /// spec.md §5 describes.
    pub fn new(system: &Rc<ChemicalSystem>, props: &ChemicalProps<f64>) -> Self {
        let phase_index = system
            .phases()
            .iter()
            .position(|p| p.aggregate_state() == AggregateState::Aqueous)
            .expect("AqueousProps requires exactly one aqueous phase in the system");
        let phase = &system.phases()[phase_index];
        let phase_props = &props.phases()[phase_index];

        let i_h2o = phase
            .species()
            .iter()
            .position(|s| s.name() == "H2O(l)")
            .expect("aqueous phase must contain a species named \"H2O(l)\"");
        let i_h = phase
            .species()
            .iter()
            .position(|s| s.name() == "H+")
            .expect("aqueous phase must contain a species named \"H+\" to compute pH");
        let i_e = phase.species().iter().position(|s| s.name() == "e-");

        let water_mass = phase_props.n[i_h2o] * phase.species()[i_h2o].formula().molar_mass(|sym| {
            crate::core::periodic_table_lookup(sym).map(|e| e.molar_mass())
        });

        let mut ionic_strength = 0.0;
        for (i, species) in phase.species().iter().enumerate() {
            if i == i_h2o {
                continue;
            }
            let z = species.charge();
            if z == 0.0 || water_mass <= 0.0 {
                continue;
            }
            let molality = phase_props.n[i] / water_mass;
            ionic_strength += molality * z * z;
        }
        ionic_strength *= 0.5;

        Self {
            temperature: props.temperature(),
            pressure: props.pressure(),
            ln_a_h: phase_props.ln_a[i_h],
            ln_a_e: i_e.map(|idx| phase_props.ln_a[idx]),
            ionic_strength,
            water_mass,
        }
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn pressure(&self) -> f64 {
        self.pressure
    }

    /// `pH = -ln(a_H+) / ln(10)`.
    pub fn ph(&self) -> f64 {
        -self.ln_a_h / LN10
    }

    /// `pE = -ln(a_e-) / ln(10)`, the negative-log electron activity.
    pub fn pe(&self) -> f64 {
        -self.ln_a_e.expect("pE requires an \"e-\" species in the aqueous phase") / LN10
    }

    /// `Eh = ln(10) * R * T / F * pE` (the Nernst relation).
    pub fn eh(&self) -> f64 {
        LN10 * GAS_CONSTANT * self.temperature / FARADAY_CONSTANT * self.pe()
    }

    pub fn ionic_strength(&self) -> f64 {
        self.ionic_strength
    }

    pub fn water_mass(&self) -> f64 {
        self.water_mass
    }

    /// `log10(Omega)` for `species`, relative to the current aqueous phase
    /// composition (GLOSSARY "Saturation index").
    ///
    /// `species` must declare a [`crate::core::FormationReaction`] whose
    /// reactants are all present in the aqueous phase: `ln(Omega) = Σ coeff
    /// * ln(a_reactant) + dG0 / (R*T)`, where `dG0` is the reaction's
    /// standard Gibbs energy of formation (so that `K = exp(-dG0/RT)` and
    /// `Omega = Q/K`).
    pub fn saturation_index(
        &self,
        system: &Rc<ChemicalSystem>,
        props: &ChemicalProps<f64>,
        species_name: &str,
    ) -> f64 {
        let species = system
            .species()
            .find(|s| s.name() == species_name)
            .unwrap_or_else(|| panic!("species `{species_name}` not found in system"));
        let reaction = species
            .formation_reaction()
            .unwrap_or_else(|| panic!("species `{species_name}` has no formation reaction to compute a saturation index from"));

        let r = GAS_CONSTANT;
        let mut ln_q = 0.0;
        for (reactant, coeff) in reaction.reactants() {
            let (phase_index, species_index) = locate(system, reactant.name());
            let ln_a = props.phases()[phase_index].ln_a[species_index];
            ln_q += coeff * ln_a;
        }

        let d_g0 = {
            let t = props.temperature();
            let p = props.pressure();
            reaction_d_g0(reaction, t, p)
        };

        let ln_omega = ln_q + d_g0 / (r * props.temperature());
        ln_omega / LN10
    }
}

fn locate(system: &Rc<ChemicalSystem>, name: &str) -> (usize, usize) {
    for (phase_index, phase) in system.phases().iter().enumerate() {
        if let Some(species_index) = phase.species().iter().position(|s| s.name() == name) {
            return (phase_index, species_index);
        }
    }
    panic!("species `{name}` not found in system");
}

fn reaction_d_g0(reaction: &crate::core::FormationReaction, t: f64, p: f64) -> f64 {
    let mut g0_reactants = 0.0;
    for (reactant, coeff) in reaction.reactants() {
        g0_reactants += coeff * reactant.standard_thermo(t, p).g0;
    }
    let props = reaction.standard_thermo(t, p);
    props.g0 - g0_reactants
}

thread_local! {
    static CACHE: RefCell<HashMap<usize, (Rc<AqueousProps>, u64)>> = RefCell::new(HashMap::new());
}

/// Memoized, shared-cache variant of [`AqueousProps::new`] (spec.md §5
/// "Shared caches"): keyed by the system's pointer identity and the
/// props' `stateid`, so repeated queries against the same converged state
/// do not recompute the view.
pub fn compute(system: &Rc<ChemicalSystem>, props: &ChemicalProps<f64>) -> Rc<AqueousProps> {
    let key = Rc::as_ptr(system) as usize;
    CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();
        if let Some((cached, stateid)) = cache.get(&key) {
            if *stateid == props.stateid() {
                return Rc::clone(cached);
            }
        }
        let fresh = Rc::new(AqueousProps::new(system, props));
        cache.insert(key, (Rc::clone(&fresh), props.stateid()));
        fresh
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ChemicalState, Phase, Species};
    use crate::models::{ConstantStandardThermoModel, IdealActivityModel};
    use ndarray::Array1;

    fn ph_test_system() -> Rc<ChemicalSystem> {
        let h2o = Species::new(
            "H2O(l)",
            "H2O",
            AggregateState::Aqueous,
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
            Rc::new(ConstantStandardThermoModel::new(-157_300.0, -230_000.0, -4.2e-6, -148.0)),
        );
        let aqueous = Phase::new(
            "Aqueous",
            AggregateState::Aqueous,
            vec![h2o, h_plus, oh_minus],
            Rc::new(IdealActivityModel),
        );
        Rc::new(ChemicalSystem::new(vec![aqueous]))
    }

    #[test]
    fn ph_matches_negative_log_activity() {
        let system = ph_test_system();
        let state = ChemicalState::new(Rc::clone(&system));
        let n = Array1::from(vec![55.5_f64, 1e-7, 1e-7]);
        let props = ChemicalProps::<f64>::update(&system, state.temperature(), state.pressure(), &n);
        let aprops = AqueousProps::new(&system, &props);
        assert!((aprops.ph() - 7.0).abs() < 0.2);
    }

    #[test]
    fn compute_is_memoized_by_stateid() {
        let system = ph_test_system();
        let n = Array1::from(vec![55.5_f64, 1e-7, 1e-7]);
        let props = ChemicalProps::<f64>::update(&system, 298.15, 1e5, &n);
        let a = compute(&system, &props);
        let b = compute(&system, &props);
        assert!(Rc::ptr_eq(&a, &b));
    }
}
