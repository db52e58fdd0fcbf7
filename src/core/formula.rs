//! Parsing of chemical formulas such as `"CaCO3"`, `"HCO3-"`, `"Ca+2"`, `"CO2(g)"`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The elemental composition and electric charge encoded in a chemical
/// formula string.
///
/// A formula is a sequence of `Symbol[Coefficient]` pairs (coefficients may
/// be non-integer, e.g. `"Fe0.5Mg0.5SiO3"`), optionally followed by a charge
/// suffix (`+`, `-`, `+2`, `-3`, `2+`, …) and/or a parenthesized aggregate
/// state tag which is ignored by the parser (`"CO2(g)"` parses the same as
/// `"CO2"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChemicalFormula {
    symbol: String,
    elements: IndexMap<String, f64>,
    charge: f64,
}

impl ChemicalFormula {
    /// Parse a chemical formula string.
    pub fn new(formula: &str) -> Self {
        let trimmed = strip_aggregate_state_tag(formula);
        let (body, charge) = split_charge_suffix(trimmed);
        let elements = parse_elements(body);
        Self {
            symbol: formula.to_string(),
            elements,
            charge,
        }
    }

    /// The original formula string, as given.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// The stoichiometric coefficient of `element` in this formula (zero if absent).
    pub fn coefficient(&self, element: &str) -> f64 {
        self.elements.get(element).copied().unwrap_or(0.0)
    }

    /// The element symbols appearing in this formula, in first-seen order.
    pub fn element_symbols(&self) -> impl Iterator<Item = &str> {
        self.elements.keys().map(String::as_str)
    }

    /// Iterate over `(element, coefficient)` pairs, in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.elements.iter().map(|(e, &c)| (e.as_str(), c))
    }

    /// The electric charge encoded in the formula (in units of elementary
    /// charge, signed).
    pub fn charge(&self) -> f64 {
        self.charge
    }

    /// Molar mass of this formula given a lookup of element molar masses
    /// (kg/mol). Elements missing from `molar_mass_of` contribute zero.
    pub fn molar_mass(&self, molar_mass_of: impl Fn(&str) -> Option<f64>) -> f64 {
        self.elements
            .iter()
            .map(|(e, &c)| c * molar_mass_of(e).unwrap_or(0.0))
            .sum()
    }
}

impl fmt::Display for ChemicalFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol)
    }
}

/// Drop a trailing parenthesized aggregate-state tag, e.g. `"CO2(g)" -> "CO2"`.
fn strip_aggregate_state_tag(formula: &str) -> &str {
    match formula.find('(') {
        Some(idx) if formula.ends_with(')') => &formula[..idx],
        _ => formula,
    }
}

/// Split off a trailing charge suffix and return `(body, charge)`.
///
/// Recognized suffixes: `+`, `-`, `+N`, `-N` for an integer `N`. A bare
/// trailing sign with no following digit (`"HCO3-"`, `"e-"`) is magnitude 1;
/// a digit immediately preceding the sign (as in `"HCO3"`'s `3`) belongs to
/// the element coefficient, never to the charge, so it is never consumed
/// here — only digits *after* the sign are part of the charge magnitude.
fn split_charge_suffix(formula: &str) -> (&str, f64) {
    let bytes = formula.as_bytes();
    if bytes.is_empty() {
        return (formula, 0.0);
    }

    let last = bytes[bytes.len() - 1];
    if last == b'+' || last == b'-' {
        let sign = if last == b'+' { 1.0 } else { -1.0 };
        let body_candidate = &formula[..formula.len() - 1];
        return (body_candidate, sign);
    }

    // Suffix form "+2"/"-2": digits after the sign are the charge magnitude.
    if let Some(sign_pos) = formula.rfind(|c| c == '+' || c == '-') {
        let (body, suffix) = formula.split_at(sign_pos);
        // Only treat as a charge suffix if everything after the sign is digits.
        let digits = &suffix[1..];
        if digits.is_empty() || digits.chars().all(|c| c.is_ascii_digit()) {
            let sign = if &suffix[..1] == "+" { 1.0 } else { -1.0 };
            let magnitude: f64 = if digits.is_empty() {
                1.0
            } else {
                digits.parse().unwrap_or(1.0)
            };
            return (body, sign * magnitude);
        }
    }

    (formula, 0.0)
}

/// Parse a run of `Symbol[Coefficient]` pairs, e.g. `"CaCO3" -> {Ca: 1, C: 1, O: 3}`.
fn parse_elements(body: &str) -> IndexMap<String, f64> {
    let mut elements = IndexMap::new();
    let chars: Vec<char> = body.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if !chars[i].is_ascii_uppercase() {
            // Skip stray separators such as '·' or whitespace in hydrate formulas.
            i += 1;
            continue;
        }
        let start = i;
        i += 1;
        while i < chars.len() && chars[i].is_ascii_lowercase() {
            i += 1;
        }
        let symbol: String = chars[start..i].iter().collect();

        let num_start = i;
        while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
            i += 1;
        }
        let coeff: f64 = if i > num_start {
            chars[num_start..i].iter().collect::<String>().parse().unwrap_or(1.0)
        } else {
            1.0
        };

        *elements.entry(symbol).or_insert(0.0) += coeff;
    }
    elements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_formula() {
        let f = ChemicalFormula::new("CaCO3");
        assert_eq!(f.coefficient("Ca"), 1.0);
        assert_eq!(f.coefficient("C"), 1.0);
        assert_eq!(f.coefficient("O"), 3.0);
        assert_eq!(f.charge(), 0.0);
    }

    #[test]
    fn parses_charged_formula() {
        let f = ChemicalFormula::new("Ca+2");
        assert_eq!(f.coefficient("Ca"), 1.0);
        assert_eq!(f.charge(), 2.0);

        let f = ChemicalFormula::new("HCO3-");
        assert_eq!(f.coefficient("H"), 1.0);
        assert_eq!(f.coefficient("C"), 1.0);
        assert_eq!(f.coefficient("O"), 3.0);
        assert_eq!(f.charge(), -1.0);

        let f = ChemicalFormula::new("SO4-2");
        assert_eq!(f.charge(), -2.0);

        let f = ChemicalFormula::new("e-");
        assert_eq!(f.charge(), -1.0);
        assert_eq!(f.elements.len(), 0);
    }

    #[test]
    fn strips_aggregate_state_tag() {
        let f = ChemicalFormula::new("CO2(g)");
        assert_eq!(f.coefficient("C"), 1.0);
        assert_eq!(f.coefficient("O"), 2.0);
    }

    #[test]
    fn non_integer_coefficients() {
        let f = ChemicalFormula::new("Fe0.5Mg0.5SiO3");
        assert_eq!(f.coefficient("Fe"), 0.5);
        assert_eq!(f.coefficient("Mg"), 0.5);
        assert_eq!(f.coefficient("Si"), 1.0);
        assert_eq!(f.coefficient("O"), 3.0);
    }
}
