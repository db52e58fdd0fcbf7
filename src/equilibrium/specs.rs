//! Declarative specification of an equilibrium problem (spec.md §4.2,
//! component C3): what is input, what is unknown, which titrants open the
//! system, and which constraints apply.

use std::rc::Rc;

use ndarray::{Array1, Array2};
use thiserror::Error;

use crate::core::{ChemicalFormula, ChemicalSystem};

/// Specification-time misuse: an id declared twice, or a reference to a
/// species/phase/element the system does not contain (spec.md §7
/// "Specification error" — fails fast at specs build time).
#[derive(Error, Debug)]
pub enum EquilibriumSpecsError {
    #[error("input `{0}` has already been declared in this specification")]
    DuplicateInput(String),
    #[error("a titrant for substance `{0}` has already been registered")]
    DuplicateTitrant(String),
    #[error("species `{0}` is not registered in the chemical system")]
    UnknownSpecies(String),
    #[error("phase `{0}` is not registered in the chemical system")]
    UnknownPhase(String),
    #[error("element `{0}` is not registered in the chemical system")]
    UnknownElement(String),
}

type SpecsResult<T> = Result<T, EquilibriumSpecsError>;

/// The physical quantity an [`EquationConstraint`] pins to its declared
/// input value `w_i` (spec.md §4.2's method table, collapsed into one tag
/// per constraint row so [`crate::equilibrium::setup::EquilibriumSetup`]
/// can evaluate every residual generically over the AD scalar type via
/// [`crate::props::ChemicalProps`]'s own generic accessors).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EquationConstraintKind {
    Volume,
    InternalEnergy,
    Enthalpy,
    GibbsEnergy,
    HelmholtzEnergy,
    Entropy,
    Charge,
    ElementAmount(usize),
    ElementAmountInPhase(usize, usize),
    ElementMass(usize),
    PhaseAmount(usize),
    PhaseMass(usize),
    PhaseVolume(usize),
    /// Chemical potential of species (global index), J/mol.
    ChemicalPotential(usize),
    /// Natural log of the activity of species (global index).
    LnActivity(usize),
    /// Fugacity of a gas species (global index), Pa (converted from the
    /// bar-valued user input at the specs/conditions boundary, spec.md §6).
    Fugacity(usize),
    /// `pH`, keyed by the index of the `"H+"` species.
    Ph(usize),
    /// `pMg`, keyed by the index of the `"Mg+2"` species.
    PMg(usize),
    /// `pE`, keyed by the index of the `"e-"` species.
    Pe(usize),
    /// `Eh` (volts), keyed by the index of the `"e-"` species.
    Eh(usize),
}

/// One row of the nonlinear equation-constraint system `v(props, p, w) = 0`
/// (spec.md §4.2).
#[derive(Debug, Clone)]
pub struct EquationConstraint {
    id: String,
    kind: EquationConstraintKind,
}

impl EquationConstraint {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> EquationConstraintKind {
        self.kind
    }
}

/// A *p* control variable: unknown temperature/pressure, or an explicit
/// titrant amount introduced by `openTo`/`addUnknownTitrantAmount` (spec.md
/// §4.2, GLOSSARY "Control variable p").
#[derive(Debug, Clone)]
pub struct ControlVariableP {
    name: String,
    formula: Option<ChemicalFormula>,
}

impl ControlVariableP {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `None` for unknown temperature/pressure (no elemental formula);
    /// `Some` for an explicit titrant.
    pub fn formula(&self) -> Option<&ChemicalFormula> {
        self.formula.as_ref()
    }
}

/// A *q* control variable: an implicit titrant amount introduced by a
/// chemical-potential-type constraint (spec.md §4.2, GLOSSARY "Control
/// variable q").
#[derive(Debug, Clone)]
pub struct ControlVariableQ {
    name: String,
    formula: ChemicalFormula,
}

impl ControlVariableQ {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn formula(&self) -> &ChemicalFormula {
        &self.formula
    }
}

/// A linear reactivity (inert-reaction) restriction: a combination of
/// species-amount changes that must stay zero (spec.md §4.2's `K_n`/`K_p`).
/// `K_p` is always a zero row here: an inert reaction is, by definition, not
/// driven by any titrant control variable.
#[derive(Debug, Clone)]
pub struct ReactivityConstraint {
    name: String,
    species_coeffs: Vec<(usize, f64)>,
}

impl ReactivityConstraint {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn species_coeffs(&self) -> &[(usize, f64)] {
        &self.species_coeffs
    }
}

/// Sizes of every vector/matrix the assembled equilibrium problem uses
/// (spec.md §4.2 "Indices... cached for fast lookup").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EquilibriumDims {
    /// Number of species (`x = (n, q)`'s `n` part).
    pub n: usize,
    /// Number of *p* control variables.
    pub p: usize,
    /// Number of *q* control variables.
    pub q: usize,
    /// Number of declared inputs (`w`).
    pub w: usize,
    /// Number of elements (not counting the charge row).
    pub e: usize,
    /// Number of reactivity constraints.
    pub r: usize,
    /// Number of conservative components, `e + 1 + r`.
    pub c: usize,
}

/// The assembled conservation system: `Aex = [W_n | W_q]`, `Aep = W_p`
/// (spec.md §4.3).
#[derive(Debug, Clone)]
pub struct EquilibriumConservation {
    pub w_n: Array2<f64>,
    pub w_q: Array2<f64>,
    pub w_p: Array2<f64>,
}

/// A builder that records, in call order, which quantities of an
/// equilibrium problem are inputs and which generate unknowns (spec.md
/// §4.2, component C3).
#[derive(Debug, Clone)]
pub struct EquilibriumSpecs {
    system: Rc<ChemicalSystem>,
    inputs: Vec<String>,
    equations: Vec<EquationConstraint>,
    p_controls: Vec<ControlVariableP>,
    q_controls: Vec<ControlVariableQ>,
    reactivity: Vec<ReactivityConstraint>,
    temperature_input_index: Option<usize>,
    pressure_input_index: Option<usize>,
    temperature_p_index: Option<usize>,
    pressure_p_index: Option<usize>,
}

impl EquilibriumSpecs {
    pub fn new(system: Rc<ChemicalSystem>) -> Self {
        Self {
            system,
            inputs: Vec::new(),
            equations: Vec::new(),
            p_controls: Vec::new(),
            q_controls: Vec::new(),
            reactivity: Vec::new(),
            temperature_input_index: None,
            pressure_input_index: None,
            temperature_p_index: None,
            pressure_p_index: None,
        }
    }

    pub fn system(&self) -> &Rc<ChemicalSystem> {
        &self.system
    }

    fn push_input(&mut self, name: impl Into<String>) -> SpecsResult<usize> {
        let name = name.into();
        if self.inputs.contains(&name) {
            return Err(EquilibriumSpecsError::DuplicateInput(name));
        }
        self.inputs.push(name);
        Ok(self.inputs.len() - 1)
    }

    fn species_index(&self, name: &str) -> SpecsResult<usize> {
        self.system
            .index_of_species(name)
            .ok_or_else(|| EquilibriumSpecsError::UnknownSpecies(name.to_string()))
    }

    fn phase_index(&self, name: &str) -> SpecsResult<usize> {
        self.system
            .index_of_phase(name)
            .ok_or_else(|| EquilibriumSpecsError::UnknownPhase(name.to_string()))
    }

    fn element_index(&self, symbol: &str) -> SpecsResult<usize> {
        self.system
            .index_of_element(symbol)
            .ok_or_else(|| EquilibriumSpecsError::UnknownElement(symbol.to_string()))
    }

    fn push_q_titrant(&mut self, name: impl Into<String>, formula: ChemicalFormula) -> SpecsResult<usize> {
        let name = name.into();
        if self.q_controls.iter().any(|q| q.name == name) {
            return Err(EquilibriumSpecsError::DuplicateTitrant(name));
        }
        self.q_controls.push(ControlVariableQ { name, formula });
        Ok(self.q_controls.len() - 1)
    }

    // -- temperature / pressure -------------------------------------------------

    pub fn temperature(&mut self) -> SpecsResult<&mut Self> {
        let idx = self.push_input("T")?;
        self.temperature_input_index = Some(idx);
        Ok(self)
    }

    pub fn pressure(&mut self) -> SpecsResult<&mut Self> {
        let idx = self.push_input("P")?;
        self.pressure_input_index = Some(idx);
        Ok(self)
    }

    pub fn unknown_temperature(&mut self) -> &mut Self {
        self.temperature_p_index = Some(self.p_controls.len());
        self.p_controls.push(ControlVariableP { name: "T".to_string(), formula: None });
        self
    }

    pub fn unknown_pressure(&mut self) -> &mut Self {
        self.pressure_p_index = Some(self.p_controls.len());
        self.p_controls.push(ControlVariableP { name: "P".to_string(), formula: None });
        self
    }

    pub fn temperature_input_index(&self) -> Option<usize> {
        self.temperature_input_index
    }

    pub fn pressure_input_index(&self) -> Option<usize> {
        self.pressure_input_index
    }

    pub fn temperature_p_index(&self) -> Option<usize> {
        self.temperature_p_index
    }

    pub fn pressure_p_index(&self) -> Option<usize> {
        self.pressure_p_index
    }

    // -- whole-system thermodynamic property inputs ------------------------------

    fn property_constraint(&mut self, name: &str, kind: EquationConstraintKind) -> SpecsResult<&mut Self> {
        self.push_input(name)?;
        self.equations.push(EquationConstraint { id: name.to_string(), kind });
        Ok(self)
    }

    pub fn volume(&mut self) -> SpecsResult<&mut Self> {
        self.property_constraint("V", EquationConstraintKind::Volume)
    }

    pub fn internal_energy(&mut self) -> SpecsResult<&mut Self> {
        self.property_constraint("U", EquationConstraintKind::InternalEnergy)
    }

    pub fn enthalpy(&mut self) -> SpecsResult<&mut Self> {
        self.property_constraint("H", EquationConstraintKind::Enthalpy)
    }

    pub fn gibbs_energy(&mut self) -> SpecsResult<&mut Self> {
        self.property_constraint("G", EquationConstraintKind::GibbsEnergy)
    }

    pub fn helmholtz_energy(&mut self) -> SpecsResult<&mut Self> {
        self.property_constraint("A", EquationConstraintKind::HelmholtzEnergy)
    }

    pub fn entropy(&mut self) -> SpecsResult<&mut Self> {
        self.property_constraint("S", EquationConstraintKind::Entropy)
    }

    pub fn charge(&mut self) -> SpecsResult<&mut Self> {
        self.property_constraint("charge", EquationConstraintKind::Charge)
    }

    // -- element/phase scoped inputs ----------------------------------------------

    pub fn element_amount(&mut self, symbol: &str) -> SpecsResult<&mut Self> {
        let idx = self.element_index(symbol)?;
        self.property_constraint(&format!("elementAmount[{symbol}]"), EquationConstraintKind::ElementAmount(idx))
    }

    pub fn element_amount_in_phase(&mut self, symbol: &str, phase: &str) -> SpecsResult<&mut Self> {
        let element_idx = self.element_index(symbol)?;
        let phase_idx = self.phase_index(phase)?;
        self.property_constraint(
            &format!("elementAmountInPhase[{symbol}][{phase}]"),
            EquationConstraintKind::ElementAmountInPhase(element_idx, phase_idx),
        )
    }

    pub fn element_mass(&mut self, symbol: &str) -> SpecsResult<&mut Self> {
        let idx = self.element_index(symbol)?;
        self.property_constraint(&format!("elementMass[{symbol}]"), EquationConstraintKind::ElementMass(idx))
    }

    pub fn phase_amount(&mut self, phase: &str) -> SpecsResult<&mut Self> {
        let idx = self.phase_index(phase)?;
        self.property_constraint(&format!("phaseAmount[{phase}]"), EquationConstraintKind::PhaseAmount(idx))
    }

    pub fn phase_mass(&mut self, phase: &str) -> SpecsResult<&mut Self> {
        let idx = self.phase_index(phase)?;
        self.property_constraint(&format!("phaseMass[{phase}]"), EquationConstraintKind::PhaseMass(idx))
    }

    pub fn phase_volume(&mut self, phase: &str) -> SpecsResult<&mut Self> {
        let idx = self.phase_index(phase)?;
        self.property_constraint(&format!("phaseVolume[{phase}]"), EquationConstraintKind::PhaseVolume(idx))
    }

    // -- chemical-potential-type constraints (q-controls + implicit titrants) ----

    pub fn chemical_potential(&mut self, subst: &str) -> SpecsResult<&mut Self> {
        let species_idx = self.species_index(subst)?;
        let formula = self.system.species().nth(species_idx).unwrap().formula().clone();
        self.push_q_titrant(subst, formula)?;
        self.property_constraint(&format!("u[{subst}]"), EquationConstraintKind::ChemicalPotential(species_idx))
    }

    pub fn ln_activity(&mut self, species: &str) -> SpecsResult<&mut Self> {
        let species_idx = self.species_index(species)?;
        let formula = self.system.species().nth(species_idx).unwrap().formula().clone();
        self.push_q_titrant(species, formula)?;
        self.property_constraint(&format!("ln(a[{species}])"), EquationConstraintKind::LnActivity(species_idx))
    }

    pub fn fugacity(&mut self, gas: &str) -> SpecsResult<&mut Self> {
        let species_idx = self.species_index(gas)?;
        let formula = self.system.species().nth(species_idx).unwrap().formula().clone();
        self.push_q_titrant(gas, formula)?;
        self.property_constraint(&format!("f[{gas}]"), EquationConstraintKind::Fugacity(species_idx))
    }

    pub fn ph(&mut self) -> SpecsResult<&mut Self> {
        let species_idx = self.species_index("H+")?;
        let formula = self.system.species().nth(species_idx).unwrap().formula().clone();
        self.push_q_titrant("H+", formula)?;
        self.property_constraint("pH", EquationConstraintKind::Ph(species_idx))
    }

    pub fn p_mg(&mut self) -> SpecsResult<&mut Self> {
        let species_idx = self.species_index("Mg+2")?;
        let formula = self.system.species().nth(species_idx).unwrap().formula().clone();
        self.push_q_titrant("Mg+2", formula)?;
        self.property_constraint("pMg", EquationConstraintKind::PMg(species_idx))
    }

    pub fn pe(&mut self) -> SpecsResult<&mut Self> {
        let species_idx = self.species_index("e-")?;
        let formula = self.system.species().nth(species_idx).unwrap().formula().clone();
        self.push_q_titrant("e-", formula)?;
        self.property_constraint("pE", EquationConstraintKind::Pe(species_idx))
    }

    pub fn eh(&mut self) -> SpecsResult<&mut Self> {
        let species_idx = self.species_index("e-")?;
        let formula = self.system.species().nth(species_idx).unwrap().formula().clone();
        self.push_q_titrant("e-", formula)?;
        self.property_constraint("Eh", EquationConstraintKind::Eh(species_idx))
    }

    // -- explicit titrants (open system) -------------------------------------------

    pub fn open_to(&mut self, subst: &str) -> &mut Self {
        self.p_controls.push(ControlVariableP {
            name: subst.to_string(),
            formula: Some(ChemicalFormula::new(subst)),
        });
        self
    }

    pub fn add_unknown_titrant_amount(&mut self, subst: &str) -> &mut Self {
        self.open_to(subst)
    }

    // -- reactivity (inert reaction) constraints ------------------------------------

    pub fn add_reactivity_constraint(
        &mut self,
        name: &str,
        species_coeffs: &[(&str, f64)],
    ) -> SpecsResult<&mut Self> {
        let mut resolved = Vec::with_capacity(species_coeffs.len());
        for (species, coeff) in species_coeffs {
            resolved.push((self.species_index(species)?, *coeff));
        }
        self.reactivity.push(ReactivityConstraint { name: name.to_string(), species_coeffs: resolved });
        Ok(self)
    }

    /// Mark a single species inert (shorthand for a reactivity constraint
    /// with a single unit coefficient).
    pub fn cannot_react(&mut self, species: &str) -> SpecsResult<&mut Self> {
        let idx = self.species_index(species)?;
        self.reactivity.push(ReactivityConstraint {
            name: format!("cannotReact[{species}]"),
            species_coeffs: vec![(idx, 1.0)],
        });
        Ok(self)
    }

    // -- accessors ------------------------------------------------------------------

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn equations(&self) -> &[EquationConstraint] {
        &self.equations
    }

    pub fn p_controls(&self) -> &[ControlVariableP] {
        &self.p_controls
    }

    pub fn q_controls(&self) -> &[ControlVariableQ] {
        &self.q_controls
    }

    pub fn reactivity_constraints(&self) -> &[ReactivityConstraint] {
        &self.reactivity
    }

    pub fn index_of_input(&self, name: &str) -> Option<usize> {
        self.inputs.iter().position(|i| i == name)
    }

    pub fn dims(&self) -> EquilibriumDims {
        let e = self.system.num_elements();
        let r = self.reactivity.len();
        EquilibriumDims {
            n: self.system.num_species(),
            p: self.p_controls.len(),
            q: self.q_controls.len(),
            w: self.inputs.len(),
            e,
            r,
            c: e + 1 + r,
        }
    }

    /// Assemble `W_n`, `W_q`, `W_p` (spec.md §4.2): the element+charge rows
    /// come straight from the system's formula matrix, extended with one
    /// zero-or-filled row per reactivity constraint (`K_n` rows; `K_p`,
    /// `K_q` rows are always zero, spec.md §4.2).
    pub fn conservation(&self) -> EquilibriumConservation {
        let dims = self.dims();
        let base = self.system.formula_matrix();

        let mut w_n = Array2::zeros((dims.c, dims.n));
        w_n.slice_mut(ndarray::s![0..dims.e + 1, ..]).assign(base);
        for (row, constraint) in self.reactivity.iter().enumerate() {
            for &(species_index, coeff) in constraint.species_coeffs() {
                w_n[[dims.e + 1 + row, species_index]] = coeff;
            }
        }

        let mut w_q = Array2::zeros((dims.c, dims.q));
        for (col, control) in self.q_controls.iter().enumerate() {
            for (row, element) in self.system.elements().iter().enumerate() {
                w_q[[row, col]] = control.formula().coefficient(element.symbol());
            }
            w_q[[dims.e, col]] = control.formula().charge();
        }

        let mut w_p = Array2::zeros((dims.c, dims.p));
        for (col, control) in self.p_controls.iter().enumerate() {
            if let Some(formula) = control.formula() {
                for (row, element) in self.system.elements().iter().enumerate() {
                    w_p[[row, col]] = formula.coefficient(element.symbol());
                }
                w_p[[dims.e, col]] = formula.charge();
            }
        }

        EquilibriumConservation { w_n, w_q, w_p }
    }

    /// Initial conservative-component vector `b = W_full · n0` (the
    /// reactivity rows being `K_n · n0`, spec.md §4.3).
    pub fn initial_components(&self, n0: &Array1<f64>) -> Array1<f64> {
        self.conservation().w_n.dot(n0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AggregateState, Phase, Species};
    use crate::models::{ConstantStandardThermoModel, IdealActivityModel};

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
        let co2_g = Species::new(
            "CO2(g)",
            "CO2",
            AggregateState::Gas,
            Rc::new(ConstantStandardThermoModel::new(-394_400.0, -393_500.0, 0.0, 37.1)),
        );
        let aqueous = Phase::new(
            "Aqueous",
            AggregateState::Aqueous,
            vec![h2o, h_plus],
            Rc::new(IdealActivityModel),
        );
        let gaseous = Phase::new("Gaseous", AggregateState::Gas, vec![co2_g], Rc::new(IdealActivityModel));
        Rc::new(ChemicalSystem::new(vec![aqueous, gaseous]))
    }

    #[test]
    fn temperature_and_pressure_register_as_inputs() {
        let mut specs = EquilibriumSpecs::new(system());
        specs.temperature().unwrap().pressure().unwrap();
        assert_eq!(specs.inputs(), &["T".to_string(), "P".to_string()]);
        assert_eq!(specs.temperature_input_index(), Some(0));
        assert_eq!(specs.pressure_input_index(), Some(1));
    }

    #[test]
    fn duplicate_input_is_rejected() {
        let mut specs = EquilibriumSpecs::new(system());
        specs.temperature().unwrap();
        assert!(matches!(specs.temperature(), Err(EquilibriumSpecsError::DuplicateInput(_))));
    }

    #[test]
    fn ph_registers_titrant_and_equation() {
        let mut specs = EquilibriumSpecs::new(system());
        specs.ph().unwrap();
        assert_eq!(specs.q_controls().len(), 1);
        assert_eq!(specs.q_controls()[0].name(), "H+");
        assert_eq!(specs.equations().len(), 1);
        assert!(matches!(specs.equations()[0].kind(), EquationConstraintKind::Ph(_)));
    }

    #[test]
    fn open_to_adds_p_control_without_equation() {
        let mut specs = EquilibriumSpecs::new(system());
        specs.temperature().unwrap().pressure().unwrap().open_to("CO2");
        assert_eq!(specs.p_controls().len(), 1);
        assert_eq!(specs.equations().len(), 0);
    }

    #[test]
    fn unknown_species_is_rejected() {
        let mut specs = EquilibriumSpecs::new(system());
        assert!(matches!(specs.ln_activity("Fe+3"), Err(EquilibriumSpecsError::UnknownSpecies(_))));
    }

    #[test]
    fn conservation_matrix_shapes_match_dims() {
        let mut specs = EquilibriumSpecs::new(system());
        specs.temperature().unwrap().pressure().unwrap().ph().unwrap().open_to("CO2");
        let dims = specs.dims();
        let cons = specs.conservation();
        assert_eq!(cons.w_n.dim(), (dims.c, dims.n));
        assert_eq!(cons.w_q.dim(), (dims.c, dims.q));
        assert_eq!(cons.w_p.dim(), (dims.c, dims.p));
    }

    #[test]
    fn reactivity_constraint_adds_row() {
        let mut specs = EquilibriumSpecs::new(system());
        specs.cannot_react("H2O(l)").unwrap();
        let dims = specs.dims();
        assert_eq!(dims.r, 1);
        let cons = specs.conservation();
        let h2o_idx = specs.system().index_of_species("H2O(l)").unwrap();
        assert_eq!(cons.w_n[[dims.e + 1, h2o_idx]], 1.0);
    }
}
