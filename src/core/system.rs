use indexmap::IndexSet;
use ndarray::Array2;

use crate::core::element::{periodic_table_lookup, Element};
use crate::core::phase::Phase;
use crate::core::species::Species;

/// An immutable bundle of phases, their species, the derived element list,
/// and the formula matrix (spec.md §3).
///
/// `W` has `E + 1` rows (one per element, plus a final charge row) and `N`
/// columns (one per species, in system order). Species of a phase are
/// contiguous; phases are kept in the order they were given to
/// [`ChemicalSystem::new`].
#[derive(Debug, Clone)]
pub struct ChemicalSystem {
    phases: Vec<Phase>,
    elements: Vec<Element>,
    species_phase_offset: Vec<usize>,
    formula_matrix: Array2<f64>,
}

impl ChemicalSystem {
    /// Assemble a system from its phases. Elements are collected, in
    /// first-seen order across phases/species, from every species formula;
    /// elements present in the small built-in periodic table
    /// ([`periodic_table_lookup`]) get their molar mass from it, otherwise a
    /// placeholder element with zero molar mass is recorded (a real
    /// database would always resolve this — out of scope here, see
    /// spec.md §1 Non-goals).
    pub fn new(phases: Vec<Phase>) -> Self {
        assert!(!phases.is_empty(), "a chemical system must contain at least one phase");

        let mut element_symbols: IndexSet<String> = IndexSet::new();
        for phase in &phases {
            for species in phase.species() {
                for symbol in species.formula().element_symbols() {
                    element_symbols.insert(symbol.to_string());
                }
            }
        }
        let elements: Vec<Element> = element_symbols
            .iter()
            .map(|symbol| periodic_table_lookup(symbol).unwrap_or_else(|| Element::new(symbol, symbol, 1.0)))
            .collect();

        let num_species: usize = phases.iter().map(Phase::num_species).sum();
        let num_rows = elements.len() + 1;
        let mut formula_matrix = Array2::zeros((num_rows, num_species));

        let mut species_phase_offset = Vec::with_capacity(phases.len());
        let mut col = 0;
        for phase in &phases {
            species_phase_offset.push(col);
            for species in phase.species() {
                for (row, element) in elements.iter().enumerate() {
                    formula_matrix[[row, col]] = species.formula().coefficient(element.symbol());
                }
                formula_matrix[[num_rows - 1, col]] = species.charge();
                col += 1;
            }
        }

        Self {
            phases,
            elements,
            species_phase_offset,
            formula_matrix,
        }
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn num_species(&self) -> usize {
        self.formula_matrix.ncols()
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    /// The formula matrix `W`, `(E+1) x N`: rows 0..E are element
    /// stoichiometries, row E is species charge.
    pub fn formula_matrix(&self) -> &Array2<f64> {
        &self.formula_matrix
    }

    /// Global species index of a species named `name`, searched across all
    /// phases in system order.
    pub fn index_of_species(&self, name: &str) -> Option<usize> {
        self.species().position(|s| s.name() == name)
    }

    pub fn index_of_element(&self, symbol: &str) -> Option<usize> {
        self.elements.iter().position(|e| e.symbol() == symbol)
    }

    pub fn index_of_phase(&self, name: &str) -> Option<usize> {
        self.phases.iter().position(|p| p.name() == name)
    }

    /// Iterate over every species across every phase, in system order.
    pub fn species(&self) -> impl Iterator<Item = &Species> {
        self.phases.iter().flat_map(Phase::species)
    }

    /// The first global species index belonging to `phase_index`.
    pub fn phase_species_offset(&self, phase_index: usize) -> usize {
        self.species_phase_offset[phase_index]
    }

    /// The half-open range of global species indices belonging to
    /// `phase_index`.
    pub fn phase_species_range(&self, phase_index: usize) -> std::ops::Range<usize> {
        let start = self.species_phase_offset[phase_index];
        start..start + self.phases[phase_index].num_species()
    }

    /// Locate a global species index as `(phase_index, local_index)`, the
    /// inverse of [`ChemicalSystem::phase_species_range`].
    pub fn locate_species(&self, global_index: usize) -> (usize, usize) {
        for phase_index in 0..self.phases.len() {
            let range = self.phase_species_range(phase_index);
            if range.contains(&global_index) {
                return (phase_index, global_index - range.start);
            }
        }
        panic!("species index {global_index} out of range for this chemical system");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::species::AggregateState;
    use crate::models::ConstantStandardThermoModel;
    use std::rc::Rc;

    fn build_system() -> ChemicalSystem {
        let h2o = Species::new(
            "H2O(l)",
            "H2O",
            AggregateState::Liquid,
            Rc::new(ConstantStandardThermoModel::new(-237_180.0, -285_830.0, 1.8e-5, 75.3)),
        );
        let co2 = Species::new(
            "CO2(g)",
            "CO2",
            AggregateState::Gas,
            Rc::new(ConstantStandardThermoModel::new(-394_400.0, -393_500.0, 0.0, 37.1)),
        );
        let aqueous = Phase::new(
            "Aqueous",
            AggregateState::Aqueous,
            vec![h2o],
            Rc::new(crate::models::IdealActivityModel),
        );
        let gaseous = Phase::new(
            "Gaseous",
            AggregateState::Gas,
            vec![co2],
            Rc::new(crate::models::IdealActivityModel),
        );
        ChemicalSystem::new(vec![aqueous, gaseous])
    }

    #[test]
    fn formula_matrix_has_expected_shape() {
        let system = build_system();
        assert_eq!(system.num_species(), 2);
        assert_eq!(system.num_elements(), 3); // H, O, C
        assert_eq!(system.formula_matrix().nrows(), 4); // 3 elements + charge row
    }

    #[test]
    fn phase_ranges_are_contiguous() {
        let system = build_system();
        assert_eq!(system.phase_species_range(0), 0..1);
        assert_eq!(system.phase_species_range(1), 1..2);
    }

    #[test]
    fn species_lookup_by_name() {
        let system = build_system();
        assert_eq!(system.index_of_species("CO2(g)"), Some(1));
        assert_eq!(system.index_of_species("N2(g)"), None);
    }
}
