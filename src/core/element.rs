use serde::{Deserialize, Serialize};

/// A chemical element (or named charge carrier such as `"Z"` used internally
/// for electric charge bookkeeping).
///
/// Symbols are unique within a [`crate::core::ChemicalSystem`]; molar masses
/// are always strictly positive (kg/mol).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    symbol: String,
    name: String,
    molar_mass: f64,
}

impl Element {
    /// Create a new element. `molar_mass` is in kg/mol and must be positive.
    pub fn new(symbol: impl Into<String>, name: impl Into<String>, molar_mass: f64) -> Self {
        assert!(
            molar_mass > 0.0,
            "element molar mass must be positive (got {molar_mass})"
        );
        Self {
            symbol: symbol.into(),
            name: name.into(),
            molar_mass,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Molar mass in kg/mol.
    pub fn molar_mass(&self) -> f64 {
        self.molar_mass
    }
}

/// A small built-in periodic table sufficient for building test systems and
/// trivial formulas without pulling in a database parser (out of scope,
/// see spec.md §1 Non-goals).
pub fn periodic_table_lookup(symbol: &str) -> Option<Element> {
    let (name, molar_mass_g_per_mol): (&str, f64) = match symbol {
        "H" => ("Hydrogen", 1.00794),
        "C" => ("Carbon", 12.0107),
        "O" => ("Oxygen", 15.9994),
        "Na" => ("Sodium", 22.98977),
        "Cl" => ("Chlorine", 35.453),
        "Ca" => ("Calcium", 40.078),
        "Mg" => ("Magnesium", 24.305),
        "S" => ("Sulfur", 32.065),
        "Si" => ("Silicon", 28.0855),
        "Fe" => ("Iron", 55.845),
        "K" => ("Potassium", 39.0983),
        "N" => ("Nitrogen", 14.0067),
        _ => return None,
    };
    Some(Element::new(symbol, name, molar_mass_g_per_mol * 1e-3))
}
