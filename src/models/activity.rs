use indexmap::IndexMap;
use ndarray::Array1;
use num_dual::{Dual64, DualNum};
use std::any::Any;
use std::fmt;

/// The excess and logarithmic activity properties an [`ActivityModel`]
/// produces for a phase at given `(T, P, x)` (spec.md §4.1 step 3).
///
/// Energies are per mole of phase (J/mol), volumes per mole (m³/mol).
#[derive(Debug, Clone)]
pub struct ActivityProps<D> {
    pub vex: D,
    pub vex_t: D,
    pub vex_p: D,
    pub gex: D,
    pub hex: D,
    pub cpex: D,
    pub ln_g: Array1<D>,
    pub ln_a: Array1<D>,
}

impl<D: DualNum<f64> + Copy> ActivityProps<D> {
    /// An activity-props record with every excess property at zero and
    /// `ln_a = ln_g + ln(x)` for an ideal mixture (used by
    /// [`ConstantActivityModel`] and as the fallback payload of
    /// [`IdealActivityModel`]).
    pub fn ideal(x: &Array1<D>) -> Self {
        let n = x.len();
        let ln_g = Array1::from_elem(n, D::from(0.0));
        let ln_a = x.mapv(|xi| xi.ln());
        Self {
            vex: D::from(0.0),
            vex_t: D::from(0.0),
            vex_p: D::from(0.0),
            gex: D::from(0.0),
            hex: D::from(0.0),
            cpex: D::from(0.0),
            ln_g,
            ln_a,
        }
    }
}

/// An ordered, type-tagged side-channel that chained activity models use to
/// share precomputed state (spec.md §9 "Side-channel between chained
/// activity models"). Keys are model-defined string ids; a consumer that
/// expects a payload left by an earlier model in the chain must fail loudly
/// if it is missing rather than silently substituting a default.
pub struct SideChannel<D: 'static> {
    entries: IndexMap<&'static str, Box<dyn Any>>,
    _marker: std::marker::PhantomData<D>,
}

impl<D: 'static> Default for SideChannel<D> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<D: 'static> SideChannel<D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a payload under `key`, overwriting any previous value.
    pub fn put<T: 'static>(&mut self, key: &'static str, value: T) {
        self.entries.insert(key, Box::new(value));
    }

    /// Fetch a payload previously stored under `key`.
    pub fn get<T: 'static>(&self, key: &'static str) -> Option<&T> {
        self.entries.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    /// Fetch a payload previously stored under `key`, panicking with a
    /// descriptive message if absent — the "fail loudly if missing"
    /// behavior the side-channel contract requires of consumers.
    pub fn require<T: 'static>(&self, key: &'static str) -> &T {
        self.get(key).unwrap_or_else(|| {
            panic!("activity model side-channel is missing required entry `{key}`")
        })
    }

    pub fn contains(&self, key: &'static str) -> bool {
        self.entries.contains_key(key)
    }
}

/// Generic half of the activity-model contract (spec.md §6).
///
/// `side` is empty for the first model in a phase's chain and carries
/// forward whatever earlier models in the same chain chose to publish.
pub trait ActivityModelDual<D: DualNum<f64> + Copy> {
    fn activity(&self, t: D, p: D, x: &Array1<D>, side: &mut SideChannel<D>) -> ActivityProps<D>;
}

/// Object-safe activity-model interface, implemented for the two concrete
/// scalar types the equilibrium core evaluates with.
pub trait ActivityModel:
    ActivityModelDual<f64> + ActivityModelDual<Dual64> + fmt::Debug
{
}

impl<T> ActivityModel for T where T: ActivityModelDual<f64> + ActivityModelDual<Dual64> + fmt::Debug {}

/// Generate the `f64`/`Dual64` forwarding for a type implementing a single
/// generic `activity_generic` method, mirroring
/// [`crate::impl_standard_thermo_model_dual`].
#[macro_export]
macro_rules! impl_activity_model_dual {
    ($ty:ty) => {
        impl $crate::models::ActivityModelDual<f64> for $ty {
            fn activity(
                &self,
                t: f64,
                p: f64,
                x: &ndarray::Array1<f64>,
                side: &mut $crate::models::SideChannel<f64>,
            ) -> $crate::models::ActivityProps<f64> {
                self.activity_generic(t, p, x, side)
            }
        }
        impl $crate::models::ActivityModelDual<num_dual::Dual64> for $ty {
            fn activity(
                &self,
                t: num_dual::Dual64,
                p: num_dual::Dual64,
                x: &ndarray::Array1<num_dual::Dual64>,
                side: &mut $crate::models::SideChannel<num_dual::Dual64>,
            ) -> $crate::models::ActivityProps<num_dual::Dual64> {
                self.activity_generic(t, p, x, side)
            }
        }
    };
}

/// An ideal-mixture activity model: `ln_g = 0`, `ln_a = ln(x)`, no excess
/// properties. Used directly for ideal phases and as the reference model
/// the `Approx`/`ApproxDiagonal` Hessian modes of
/// [`crate::equilibrium::setup::EquilibriumSetup`] fall back to (spec.md
/// §4.3).
#[derive(Debug, Clone, Copy, Default)]
pub struct IdealActivityModel;

impl IdealActivityModel {
    fn activity_generic<D: DualNum<f64> + Copy>(
        &self,
        _t: D,
        _p: D,
        x: &Array1<D>,
        _side: &mut SideChannel<D>,
    ) -> ActivityProps<D> {
        ActivityProps::ideal(x)
    }
}

crate::impl_activity_model_dual!(IdealActivityModel);

/// A constant, composition-independent activity coefficient model, useful
/// for single-species ("pure") phases where `x_i == 1` identically and for
/// synthetic test systems.
pub type ConstantActivityModel = IdealActivityModel;
