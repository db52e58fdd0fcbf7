use std::rc::Rc;

use num_dual::{Dual64, DualNum};
use serde::{Deserialize, Serialize};

use crate::core::formula::ChemicalFormula;
use crate::models::{
    ReactionStandardThermoModel, ReactionStandardThermoModelDual, StandardThermoModel,
    StandardThermoModelDual, StandardThermoProps,
};

/// The physical state of matter a [`Species`] or [`crate::core::Phase`]
/// belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateState {
    Gas,
    Liquid,
    Aqueous,
    Solid,
    IonExchange,
    Adsorbed,
}

/// A formation reaction: a dependent species' standard thermodynamic
/// properties derived from a set of reactant species plus a reaction
/// thermo model, rather than given directly (spec.md §3, supplemented by
/// §S4).
///
/// `product_volume` is the dependent species' own standard molar volume and
/// its temperature/pressure derivatives (`original_source`'s
/// `ReactionStandardThermoModelPressureCorrection` keeps volume out of the
/// reaction model proper and has the product species carry it directly).
#[derive(Clone)]
pub struct FormationReaction {
    reactants: Vec<(Species, f64)>,
    model: Rc<dyn ReactionStandardThermoModel>,
    product_v0: f64,
    product_vt0: f64,
    product_vp0: f64,
}

impl std::fmt::Debug for FormationReaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormationReaction")
            .field("reactants", &self.reactants.iter().map(|(s, c)| (s.name().to_string(), *c)).collect::<Vec<_>>())
            .field("product_v0", &self.product_v0)
            .finish()
    }
}

impl FormationReaction {
    pub fn new(
        reactants: Vec<(Species, f64)>,
        model: Rc<dyn ReactionStandardThermoModel>,
        product_v0: f64,
        product_vt0: f64,
        product_vp0: f64,
    ) -> Self {
        Self {
            reactants,
            model,
            product_v0,
            product_vt0,
            product_vp0,
        }
    }

    pub fn reactants(&self) -> &[(Species, f64)] {
        &self.reactants
    }

    /// Derive the dependent species' own standard thermo from the
    /// reactants' standard thermo plus the reaction's `{dG0, dH0, dCp0}`:
    /// `G0 = Σ coeff_j * G0_j + dG0` (and likewise for `H0`, `Cp0`); volume
    /// terms come directly from the product species, not the reaction.
    pub fn standard_thermo<D: DualNum<f64> + Copy>(&self, t: D, p: D) -> StandardThermoProps<D>
    where
        dyn StandardThermoModel: StandardThermoModelDual<D>,
        dyn ReactionStandardThermoModel: ReactionStandardThermoModelDual<D>,
    {
        let mut g0 = D::from(0.0);
        let mut h0 = D::from(0.0);
        let mut cp0 = D::from(0.0);
        for (reactant, coeff) in &self.reactants {
            let props = reactant.standard_thermo(t, p);
            g0 += props.g0 * D::from(*coeff);
            h0 += props.h0 * D::from(*coeff);
            cp0 += props.cp0 * D::from(*coeff);
        }
        let d = self.model.reaction_standard_thermo(t, p);
        StandardThermoProps {
            g0: g0 + d.d_g0,
            h0: h0 + d.d_h0,
            v0: D::from(self.product_v0),
            vt0: D::from(self.product_vt0),
            vp0: D::from(self.product_vp0),
            cp0: cp0 + d.d_cp0,
        }
    }
}

#[derive(Clone)]
enum ThermoSource {
    Direct(Rc<dyn StandardThermoModel>),
    Formation(Rc<FormationReaction>),
}

impl std::fmt::Debug for ThermoSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThermoSource::Direct(_) => write!(f, "ThermoSource::Direct"),
            ThermoSource::Formation(r) => write!(f, "ThermoSource::Formation({r:?})"),
        }
    }
}

/// A chemical species: name, formula, charge, aggregate state, and a way to
/// evaluate its standard thermodynamic properties at `(T, P)` (spec.md §3).
///
/// Cloning a [`Species`] is cheap: the thermo evaluator is shared via `Rc`,
/// matching the value-with-shared-implementation-handle idiom spec.md §9
/// calls out explicitly.
#[derive(Debug, Clone)]
pub struct Species {
    name: String,
    formula: ChemicalFormula,
    aggregate_state: AggregateState,
    thermo: ThermoSource,
}

impl Species {
    /// A species whose standard thermo is evaluated directly by `model`.
    pub fn new(
        name: impl Into<String>,
        formula: &str,
        aggregate_state: AggregateState,
        model: Rc<dyn StandardThermoModel>,
    ) -> Self {
        Self {
            name: name.into(),
            formula: ChemicalFormula::new(formula),
            aggregate_state,
            thermo: ThermoSource::Direct(model),
        }
    }

    /// A species whose standard thermo is derived from a formation reaction
    /// (spec.md §3, §S4).
    pub fn from_reaction(
        name: impl Into<String>,
        formula: &str,
        aggregate_state: AggregateState,
        reaction: FormationReaction,
    ) -> Self {
        Self {
            name: name.into(),
            formula: ChemicalFormula::new(formula),
            aggregate_state,
            thermo: ThermoSource::Formation(Rc::new(reaction)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn formula(&self) -> &ChemicalFormula {
        &self.formula
    }

    pub fn charge(&self) -> f64 {
        self.formula.charge()
    }

    pub fn aggregate_state(&self) -> AggregateState {
        self.aggregate_state
    }

    pub fn formation_reaction(&self) -> Option<&FormationReaction> {
        match &self.thermo {
            ThermoSource::Formation(r) => Some(r),
            ThermoSource::Direct(_) => None,
        }
    }

    /// Evaluate `{G0, H0, V0, VT0, VP0, Cp0}` at `(T, P)` (spec.md §4.1 step
    /// 1), dispatching to either the direct model or the formation
    /// reaction.
    pub fn standard_thermo<D: DualNum<f64> + Copy>(&self, t: D, p: D) -> StandardThermoProps<D>
    where
        dyn StandardThermoModel: StandardThermoModelDual<D>,
        dyn ReactionStandardThermoModel: ReactionStandardThermoModelDual<D>,
    {
        match &self.thermo {
            ThermoSource::Direct(model) => model.standard_thermo(t, p),
            ThermoSource::Formation(reaction) => reaction.standard_thermo(t, p),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConstantStandardThermoModel;
    use approx::assert_relative_eq;

    #[test]
    fn direct_species_evaluates_model() {
        let model = Rc::new(ConstantStandardThermoModel::new(-394_400.0, -393_500.0, 0.0, 37.1));
        let co2 = Species::new("CO2(g)", "CO2(g)", AggregateState::Gas, model);
        let props = co2.standard_thermo(298.15, 1e5);
        assert_relative_eq!(props.g0, -394_400.0);
        assert_eq!(co2.charge(), 0.0);
    }

    #[test]
    fn formation_reaction_sums_reactant_thermo() {
        let h2o_model = Rc::new(ConstantStandardThermoModel::new(-237_180.0, -285_830.0, 1.8e-5, 75.3));
        let h2o = Species::new("H2O(l)", "H2O", AggregateState::Liquid, h2o_model);

        let rxn_model: Rc<dyn ReactionStandardThermoModel> =
            Rc::new(crate::models::ConstLgKModel::new(0.0));
        let reaction = FormationReaction::new(vec![(h2o.clone(), 1.0)], rxn_model, 1.8e-5, 0.0, -1e-12);
        let oh = Species::from_reaction("OH-", "OH-", AggregateState::Aqueous, reaction);

        let props = oh.standard_thermo(298.15, 1e5);
        assert_relative_eq!(props.g0, -237_180.0);
        assert_eq!(oh.charge(), -1.0);
    }
}
