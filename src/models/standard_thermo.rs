use num_dual::{Dual64, DualNum};
use serde::{Deserialize, Serialize};

/// Standard-state molar thermodynamic properties of a species at `(T, P)`.
///
/// All quantities are SI (spec.md §6): `G0`/`H0` in J/mol, `V0` in m³/mol,
/// `VT0` in m³/(mol·K), `VP0` in m³/(mol·Pa), `Cp0` in J/(mol·K).
#[derive(Debug, Clone, Copy)]
pub struct StandardThermoProps<D> {
    pub g0: D,
    pub h0: D,
    pub v0: D,
    pub vt0: D,
    pub vp0: D,
    pub cp0: D,
}

impl<D: DualNum<f64> + Copy> StandardThermoProps<D> {
    /// Standard molar isochoric heat capacity, `Cv0 = Cp0 + T*VT0^2/VP0`
    /// (spec.md §4.1 step 1). `VP0` must be strictly negative, as it is for
    /// any physically stable phase.
    pub fn cv0(&self, t: D) -> D {
        self.cp0 + t * self.vt0 * self.vt0 / self.vp0
    }
}

/// Generic (scalar-type-parameterized) half of the standard thermodynamic
/// model contract. Implement this once per model and use
/// [`impl_standard_thermo_model!`] to get the object-safe
/// [`StandardThermoModel`] wrapper for free.
pub trait StandardThermoModelDual<D: DualNum<f64> + Copy> {
    /// Evaluate `{G0, H0, V0, VT0, VP0, Cp0}` at `(T, P)`.
    fn standard_thermo(&self, t: D, p: D) -> StandardThermoProps<D>;
}

/// Object-safe standard-thermodynamic-model interface, implemented for the
/// two concrete scalar types the equilibrium core evaluates with.
pub trait StandardThermoModel:
    StandardThermoModelDual<f64> + StandardThermoModelDual<Dual64> + std::fmt::Debug
{
}

impl<T> StandardThermoModel for T where
    T: StandardThermoModelDual<f64> + StandardThermoModelDual<Dual64> + std::fmt::Debug
{
}

/// Generate the `f64`/`Dual64` forwarding needed to make a type satisfying
/// the generic [`StandardThermoModelDual<D>`] contract usable as a
/// `dyn StandardThermoModel` — mirrors `feos-core`'s
/// `impl_helmholtz_energy!` macro, which does the same forwarding for
/// `HelmholtzEnergyDual<D>`.
#[macro_export]
macro_rules! impl_standard_thermo_model_dual {
    ($ty:ty) => {
        impl $crate::models::StandardThermoModelDual<f64> for $ty {
            fn standard_thermo(&self, t: f64, p: f64) -> $crate::models::StandardThermoProps<f64> {
                self.standard_thermo_generic(t, p)
            }
        }
        impl $crate::models::StandardThermoModelDual<num_dual::Dual64> for $ty {
            fn standard_thermo(
                &self,
                t: num_dual::Dual64,
                p: num_dual::Dual64,
            ) -> $crate::models::StandardThermoProps<num_dual::Dual64> {
                self.standard_thermo_generic(t, p)
            }
        }
    };
}

/// A standard-thermo model whose properties do not depend on `(T, P)`.
///
/// This is the equilibrium-core analogue of Reaktoro's
/// `StandardThermoModelConstant`: most useful for synthetic test systems and
/// for pure, incompressible condensed phases over a narrow `(T, P)` range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConstantStandardThermoModel {
    pub g0: f64,
    pub h0: f64,
    pub v0: f64,
    pub cp0: f64,
}

impl ConstantStandardThermoModel {
    pub fn new(g0: f64, h0: f64, v0: f64, cp0: f64) -> Self {
        Self { g0, h0, v0, cp0 }
    }

    fn standard_thermo_generic<D: DualNum<f64> + Copy>(&self, t: D, p: D) -> StandardThermoProps<D> {
        let _ = (t, p);
        StandardThermoProps {
            g0: D::from(self.g0),
            h0: D::from(self.h0),
            v0: D::from(self.v0),
            vt0: D::from(0.0),
            vp0: D::from(-1e-30), // effectively incompressible; kept nonzero and negative so Cv0 stays finite
            cp0: D::from(self.cp0),
        }
    }
}

crate::impl_standard_thermo_model_dual!(ConstantStandardThermoModel);

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn constant_model_is_temperature_independent() {
        let model = ConstantStandardThermoModel::new(-100.0, -50.0, 1e-5, 40.0);
        let a = StandardThermoModelDual::<f64>::standard_thermo(&model, 298.15, 1e5);
        let b = StandardThermoModelDual::<f64>::standard_thermo(&model, 400.0, 2e5);
        assert_relative_eq!(a.g0, b.g0);
        assert_relative_eq!(a.cp0, 40.0);
    }
}
