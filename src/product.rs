//! Element and species indexing, and the mutable product-side state that
//! the equilibrium solver iterates on.

use crate::errors::{Capacity, EqError, EqResult};
use crate::propellant_db::PropellantDB;
use crate::thermo_db::{Phase, Species, ThermoDB};
use ndarray::Array2;

const MAX_ELEMENTS: usize = 15;
const MAX_SPECIES: usize = 400;

/// Initial seed mole number (per gram) for every initially-included gas
/// species, and the corresponding total, per §4.2.
const SEED_N: f64 = 0.1;

/// Fixed-capacity product-side state: which elements and candidate species
/// are in play, their stoichiometry, and the current mole numbers.
///
/// Condensed candidates are kept in a single `Vec` with the active prefix
/// `[0..nc_active)` and inactive candidates past it; inclusion/removal
/// swaps a candidate across that boundary rather than reallocating.
#[derive(Debug, Clone, Default)]
pub struct Product {
    pub elements: Vec<String>,
    /// ThermoDB indexes of every candidate gas species.
    pub gas: Vec<usize>,
    /// ThermoDB indexes of every candidate condensed species; `[0..nc_active)`
    /// is the currently active set.
    pub condensed: Vec<usize>,
    pub nc_active: usize,
    /// `a_gas[[j, k]]`: stoichiometric coefficient of element `j` in gas
    /// species `k`.
    pub a_gas: Array2<f64>,
    pub n_gas: Vec<f64>,
    pub ln_n_gas: Vec<f64>,
    /// Mole number of every condensed candidate; zero for inactive ones.
    pub n_condensed: Vec<f64>,
    pub elements_listed: bool,
    pub species_listed: bool,
    pub is_equilibrium: bool,
}

impl Product {
    pub fn ng(&self) -> usize {
        self.gas.len()
    }

    pub fn nc(&self) -> usize {
        self.nc_active
    }

    pub fn ne(&self) -> usize {
        self.elements.len()
    }

    /// Stoichiometric coefficient of `element` in the given thermo species.
    pub fn stoich_of(&self, db: &ThermoDB, species_idx: usize, element: &str) -> f64 {
        db.get(species_idx)
            .elements
            .iter()
            .find(|(sym, _)| sym == element)
            .map(|(_, c)| *c)
            .unwrap_or(0.0)
    }

    /// Evict a condensed candidate (by position within the active prefix),
    /// swapping it to the tail of the active region and shrinking `nc_active`.
    pub fn remove_condensed_at(&mut self, pos: usize) {
        let last = self.nc_active - 1;
        self.condensed.swap(pos, last);
        self.n_condensed.swap(pos, last);
        self.n_condensed[last] = 0.0;
        self.nc_active -= 1;
    }

    /// Promote an inactive condensed candidate at absolute index `pos`
    /// (`pos >= nc_active`) into the active set.
    pub fn include_condensed_at(&mut self, pos: usize) {
        self.condensed.swap(pos, self.nc_active);
        self.n_condensed.swap(pos, self.nc_active);
        self.nc_active += 1;
    }
}

/// Scan the propellant formulation for every distinct element with a
/// nonzero coefficient, filling `product.elements`. §4.2.
pub fn list_elements(
    product: &mut Product,
    propellants: &PropellantDB,
    composition: &crate::composition::Composition,
) -> EqResult<()> {
    let elements = composition.distinct_elements(propellants);
    if elements.len() > MAX_ELEMENTS {
        return Err(EqError::CapacityExceeded(Capacity::Elements));
    }
    product.elements = elements;
    product.elements_listed = true;
    Ok(())
}

/// Scan the thermo database for every species whose formula is entirely
/// covered by `product.elements`, partitioned by phase. Seeds the initial
/// mole numbers per §4.2. Every condensed candidate starts inactive; the
/// equilibrium solver defers its first `include_condensed` pass per §4.4
/// step 1 (first pass forces `Nc = 0`).
pub fn list_products(product: &mut Product, thermo: &ThermoDB) -> EqResult<()> {
    let mut gas = Vec::new();
    let mut condensed = Vec::new();
    for (idx, species) in thermo.iter() {
        if !formula_is_covered(species, &product.elements) {
            continue;
        }
        match species.phase {
            Phase::Gas => gas.push(idx),
            Phase::Condensed => condensed.push(idx),
        }
    }
    if gas.len() > MAX_SPECIES || condensed.len() > MAX_SPECIES {
        return Err(EqError::CapacityExceeded(Capacity::Species));
    }

    let ne = product.elements.len();
    let ng = gas.len();
    let mut a_gas = Array2::zeros((ne, ng));
    for (k, &species_idx) in gas.iter().enumerate() {
        for (j, element) in product.elements.iter().enumerate() {
            a_gas[[j, k]] = product.stoich_of_by_name(thermo, species_idx, element);
        }
    }

    let n_each = if ng > 0 { SEED_N / ng as f64 } else { 0.0 };
    let n_gas = vec![n_each; ng];
    let ln_n_gas = n_gas.iter().map(|&n| n.ln()).collect();
    let nc = condensed.len();
    let n_condensed = vec![0.0; nc];

    product.gas = gas;
    product.condensed = condensed;
    product.nc_active = 0;
    product.a_gas = a_gas;
    product.n_gas = n_gas;
    product.ln_n_gas = ln_n_gas;
    product.n_condensed = n_condensed;
    product.species_listed = true;
    Ok(())
}

impl Product {
    fn stoich_of_by_name(&self, thermo: &ThermoDB, species_idx: usize, element: &str) -> f64 {
        self.stoich_of(thermo, species_idx, element)
    }
}

fn formula_is_covered(species: &Species, elements: &[String]) -> bool {
    species
        .elements
        .iter()
        .all(|(sym, coef)| *coef == 0.0 || elements.iter().any(|e| e == sym))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::Composition;
    use crate::propellant_db::{PropellantDB, Reactant};
    use crate::thermo_db::{Phase, ThermoData};

    fn propellants() -> PropellantDB {
        PropellantDB::new(vec![
            Reactant {
                name: "AL(cr)".into(),
                elements: vec![("AL".into(), 1.0)],
                heat_of_formation: 0.0,
                density: 2.7,
            },
            Reactant {
                name: "O2".into(),
                elements: vec![("O".into(), 2.0)],
                heat_of_formation: 0.0,
                density: 0.00143,
            },
        ])
    }

    fn thermo() -> ThermoDB {
        let make = |name: &str, phase: Phase, elements: Vec<(&str, f64)>| Species {
            name: name.into(),
            id: "test".into(),
            phase,
            elements: elements.into_iter().map(|(s, c)| (s.into(), c)).collect(),
            molecular_weight: 1.0,
            heat_of_formation: 0.0,
            data: ThermoData::SingleTemperature {
                enthalpy: 0.0,
                reference_temperature: 298.15,
            },
        };
        ThermoDB::new(vec![
            make("AL", Phase::Gas, vec![("AL", 1.0)]),
            make("ALO", Phase::Gas, vec![("AL", 1.0), ("O", 1.0)]),
            make("O2", Phase::Gas, vec![("O", 2.0)]),
            make("AL2O3(L)", Phase::Condensed, vec![("AL", 2.0), ("O", 3.0)]),
            make("H2O", Phase::Gas, vec![("H", 2.0), ("O", 1.0)]),
        ])
    }

    #[test]
    fn list_elements_collects_distinct_symbols() {
        let mut product = Product::default();
        let propellants = propellants();
        let mut comp = Composition::default();
        comp.push(0, 2.0);
        comp.push(1, 1.5);
        list_elements(&mut product, &propellants, &comp).unwrap();
        let mut elements = product.elements.clone();
        elements.sort();
        assert_eq!(elements, vec!["AL".to_string(), "O".to_string()]);
    }

    #[test]
    fn list_products_excludes_species_needing_missing_elements() {
        let mut product = Product::default();
        product.elements = vec!["AL".into(), "O".into()];
        let db = thermo();
        list_products(&mut product, &db).unwrap();
        assert_eq!(product.gas.len(), 3); // AL, ALO, O2 -- not H2O
        assert_eq!(product.condensed.len(), 1); // AL2O3(L)
        assert_eq!(product.nc_active, 0); // deferred on first pass
    }

    #[test]
    fn list_products_seeds_initial_moles() {
        let mut product = Product::default();
        product.elements = vec!["AL".into(), "O".into()];
        let db = thermo();
        list_products(&mut product, &db).unwrap();
        let ng = product.ng();
        for &n in &product.n_gas {
            assert!((n - SEED_N / ng as f64).abs() < 1e-15);
        }
        assert!(product.n_condensed.iter().all(|&n| n == 0.0));
    }
}
