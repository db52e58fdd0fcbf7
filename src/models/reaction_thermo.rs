use num_dual::{Dual64, DualNum};
use serde::{Deserialize, Serialize};

/// Standard thermodynamic properties of a formation reaction at `(T, P)`
/// (spec.md §6, `FormationReaction`): the change, on reaction, of the
/// standard molar Gibbs energy, enthalpy, and heat capacity.
#[derive(Debug, Clone, Copy)]
pub struct ReactionStandardThermoProps<D> {
    pub d_g0: D,
    pub d_h0: D,
    pub d_cp0: D,
}

/// Generic half of the reaction-standard-thermo-model contract. A species
/// whose standard thermodynamic properties are defined via a formation
/// reaction (spec.md §6) consults a model of this shape for the reaction's
/// properties, then combines them with the product-side species' own
/// standard thermo to get its own `{G0, H0, Cp0}`.
pub trait ReactionStandardThermoModelDual<D: DualNum<f64> + Copy> {
    fn reaction_standard_thermo(&self, t: D, p: D) -> ReactionStandardThermoProps<D>;
}

/// Object-safe reaction-standard-thermo-model interface.
pub trait ReactionStandardThermoModel:
    ReactionStandardThermoModelDual<f64> + ReactionStandardThermoModelDual<Dual64> + std::fmt::Debug
{
}

impl<T> ReactionStandardThermoModel for T where
    T: ReactionStandardThermoModelDual<f64> + ReactionStandardThermoModelDual<Dual64> + std::fmt::Debug
{
}

/// Generate the `f64`/`Dual64` forwarding for a type implementing a single
/// generic `reaction_standard_thermo_generic` method.
#[macro_export]
macro_rules! impl_reaction_standard_thermo_model_dual {
    ($ty:ty) => {
        impl $crate::models::ReactionStandardThermoModelDual<f64> for $ty {
            fn reaction_standard_thermo(
                &self,
                t: f64,
                p: f64,
            ) -> $crate::models::ReactionStandardThermoProps<f64> {
                self.reaction_standard_thermo_generic(t, p)
            }
        }
        impl $crate::models::ReactionStandardThermoModelDual<num_dual::Dual64> for $ty {
            fn reaction_standard_thermo(
                &self,
                t: num_dual::Dual64,
                p: num_dual::Dual64,
            ) -> $crate::models::ReactionStandardThermoProps<num_dual::Dual64> {
                self.reaction_standard_thermo_generic(t, p)
            }
        }
    };
}

/// A reaction whose `lgK(T)` equilibrium constant is constant (temperature-
/// and pressure-independent), grounded on Reaktoro's
/// `ReactionThermoModelConstLgK`. `dH0` and `dCp0` are both taken to be zero,
/// consistent with a `lgK` that does not change with `T`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConstLgKModel {
    pub lg_k: f64,
}

impl ConstLgKModel {
    pub fn new(lg_k: f64) -> Self {
        Self { lg_k }
    }

    fn reaction_standard_thermo_generic<D: DualNum<f64> + Copy>(
        &self,
        t: D,
        p: D,
    ) -> ReactionStandardThermoProps<D> {
        let _ = p;
        const LN10: f64 = std::f64::consts::LN_10;
        const R: f64 = 8.31446261815324;
        let d_g0 = t * D::from(-LN10 * R * self.lg_k);
        ReactionStandardThermoProps {
            d_g0,
            d_h0: D::from(0.0),
            d_cp0: D::from(0.0),
        }
    }
}

crate::impl_reaction_standard_thermo_model_dual!(ConstLgKModel);
