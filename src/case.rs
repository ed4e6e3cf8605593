//! A single combustion case: propellant formulation, problem type, and the
//! mutable product-side state the solvers iterate on.

use std::rc::Rc;

use crate::composition::Composition;
use crate::iteration_info::IterationInfo;
use crate::product::Product;
use crate::propellant_db::PropellantDB;
use crate::thermo_db::ThermoDB;

/// Which quantities are held fixed while the equilibrium is solved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Problem {
    /// Fixed temperature (K) and pressure (atm).
    Tp { temperature: f64 },
    /// Fixed enthalpy (J/g of propellant) and pressure (atm).
    Hp { enthalpy: f64 },
    /// Fixed entropy (J/g/K of propellant) and pressure (atm).
    Sp { entropy: f64 },
}

/// Converged thermodynamic state of a [`Case`], populated once the
/// equilibrium and derivative solvers have run. §3 `EquilibriumProperties`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EquilibriumProperties {
    pub p: f64,
    pub t: f64,
    pub h: f64,
    pub u: f64,
    pub g: f64,
    pub s: f64,
    pub m: f64,
    pub dlnv_dlnp_t: f64,
    pub dlnv_dlnt_p: f64,
    pub cp: f64,
    pub cv: f64,
    pub gamma_s: f64,
    pub sound_speed: f64,
}

/// A combustion case: a propellant formulation, a pressure, a problem
/// type, and the product-side state built/mutated by the solvers.
pub struct Case {
    pub thermo: Rc<ThermoDB>,
    pub propellants: Rc<PropellantDB>,
    pub composition: Composition,
    pub pressure: f64,
    pub problem: Problem,
    pub product: Product,
    pub iter: IterationInfo,
    pub properties: Option<EquilibriumProperties>,
}

impl Case {
    pub fn new(
        thermo: Rc<ThermoDB>,
        propellants: Rc<PropellantDB>,
        composition: Composition,
        pressure: f64,
        problem: Problem,
    ) -> Self {
        Self {
            thermo,
            propellants,
            composition,
            pressure,
            problem,
            product: Product::default(),
            iter: IterationInfo::new(0, 0, 0.1),
            properties: None,
        }
    }

    /// Target moles of each element per gram of propellant, index-aligned
    /// with `product.elements` (valid once elements have been listed).
    pub fn element_targets(&self) -> Vec<f64> {
        self.product
            .elements
            .iter()
            .map(|e| {
                self.composition
                    .element_moles_per_gram(&self.propellants, e)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::propellant_db::{PropellantDB, Reactant};
    use crate::thermo_db::ThermoDB;

    #[test]
    fn element_targets_reads_through_composition() {
        let propellants = Rc::new(PropellantDB::new(vec![Reactant {
            name: "H2".into(),
            elements: vec![("H".into(), 2.0)],
            heat_of_formation: 0.0,
            density: 0.00009,
        }]));
        let thermo = Rc::new(ThermoDB::default());
        let mut composition = Composition::default();
        composition.push(0, 1.0);
        let mut case = Case::new(
            thermo,
            propellants,
            composition,
            1.0,
            Problem::Tp { temperature: 298.15 },
        );
        case.product.elements = vec!["H".into()];
        // M(H2) = 2 * 1.008 g/mol; 1 mol H2 carries 2 mol H per 2.016 g.
        assert_eq!(case.element_targets(), vec![2.0 / 2.016]);
    }
}
