//! A propellant formulation: a list of reactants and their mole quantities.

use crate::propellant_db::PropellantDB;

/// One (reactant, mole-quantity) term of a formulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositionTerm {
    pub reactant: usize,
    pub moles: f64,
}

/// A propellant formulation: a list of reactants and their mole quantities,
/// e.g. "2 mol AL + 1.5 mol O2". Total mass and the per-element balance
/// vector are derived from this and the shared [`PropellantDB`].
#[derive(Debug, Clone, Default)]
pub struct Composition {
    pub terms: Vec<CompositionTerm>,
}

impl Composition {
    pub fn new(terms: Vec<CompositionTerm>) -> Self {
        Self { terms }
    }

    pub fn push(&mut self, reactant: usize, moles: f64) {
        self.terms.push(CompositionTerm { reactant, moles });
    }

    /// Total mass, g, of the formulation: m = Σᵢ coefᵢ·Mᵢ.
    pub fn mass(&self, db: &PropellantDB) -> f64 {
        self.terms
            .iter()
            .map(|t| t.moles * molecular_weight(db, t.reactant))
            .sum()
    }

    /// Moles of `element` per gram of propellant: bⱼ = Σᵢ coefᵢ·aᵢⱼ / m.
    pub fn element_moles_per_gram(&self, db: &PropellantDB, element: &str) -> f64 {
        let m = self.mass(db);
        if m == 0.0 {
            return 0.0;
        }
        let total: f64 = self
            .terms
            .iter()
            .map(|t| {
                let reactant = db.get(t.reactant);
                let coef = reactant
                    .elements
                    .iter()
                    .find(|(sym, _)| sym == element)
                    .map(|(_, c)| *c)
                    .unwrap_or(0.0);
                t.moles * coef
            })
            .sum();
        total / m
    }

    /// Heat of formation of the reactant side, J per gram of propellant.
    /// Used as the HP problem's enthalpy target.
    pub fn enthalpy_per_gram(&self, db: &PropellantDB) -> f64 {
        let m = self.mass(db);
        if m == 0.0 {
            return 0.0;
        }
        let total: f64 = self
            .terms
            .iter()
            .map(|t| t.moles * db.get(t.reactant).heat_of_formation)
            .sum();
        total / m
    }

    /// Every distinct element symbol appearing with a nonzero coefficient in
    /// any reactant of this formulation.
    pub fn distinct_elements<'a>(&self, db: &'a PropellantDB) -> Vec<String> {
        let mut elements = Vec::new();
        for term in &self.terms {
            for (symbol, coef) in &db.get(term.reactant).elements {
                if *coef != 0.0 && !elements.contains(symbol) {
                    elements.push(symbol.clone());
                }
            }
        }
        elements
    }
}

/// Standard atomic weight, g/mol, of the element symbols this crate's
/// sample databases use. Unrecognized symbols contribute zero mass.
fn atomic_weight(symbol: &str) -> f64 {
    match symbol {
        "H" => 1.008,
        "D" => 2.014,
        "HE" => 4.002602,
        "LI" => 6.94,
        "BE" => 9.0121831,
        "B" => 10.81,
        "C" => 12.011,
        "N" => 14.007,
        "O" => 15.999,
        "F" => 18.998403163,
        "NA" => 22.98976928,
        "MG" => 24.305,
        "AL" => 26.9815385,
        "SI" => 28.085,
        "P" => 30.973761998,
        "S" => 32.06,
        "CL" => 35.45,
        "K" => 39.0983,
        "CA" => 40.078,
        "TI" => 47.867,
        "CR" => 51.9961,
        "MN" => 54.938044,
        "FE" => 55.845,
        "NI" => 58.6934,
        "CU" => 63.546,
        "ZN" => 65.38,
        "ZR" => 91.224,
        "BA" => 137.327,
        "W" => 183.84,
        "PB" => 207.2,
        _ => 0.0,
    }
}

/// Molecular weight, g/mol, of a reactant: Mᵢ = Σ coefᵢⱼ·atomic_weight(j).
fn molecular_weight(db: &PropellantDB, reactant: usize) -> f64 {
    db.get(reactant)
        .elements
        .iter()
        .map(|(symbol, coef)| coef * atomic_weight(symbol))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::propellant_db::{PropellantDB, Reactant};
    use approx::assert_relative_eq;

    fn sample_db() -> PropellantDB {
        PropellantDB::new(vec![
            Reactant {
                name: "AL(cr)".into(),
                elements: vec![("AL".into(), 1.0)],
                heat_of_formation: 0.0,
                density: 2.70,
            },
            Reactant {
                name: "O2".into(),
                elements: vec![("O".into(), 2.0)],
                heat_of_formation: 0.0,
                density: 0.00143,
            },
        ])
    }

    #[test]
    fn element_balance_sums_contributions() {
        let db = sample_db();
        let mut c = Composition::default();
        c.push(0, 2.0);
        c.push(1, 1.5);
        // M(AL) = 26.9815385 g/mol, M(O2) = 2*15.999 g/mol.
        let m = 2.0 * 26.9815385 + 1.5 * (2.0 * 15.999);
        assert_relative_eq!(c.element_moles_per_gram(&db, "AL"), 2.0 / m, epsilon = 1e-9);
        assert_relative_eq!(c.element_moles_per_gram(&db, "O"), 3.0 / m, epsilon = 1e-9);
        assert_relative_eq!(c.element_moles_per_gram(&db, "H"), 0.0);
    }

    #[test]
    fn distinct_elements_are_deduplicated() {
        let db = sample_db();
        let mut c = Composition::default();
        c.push(0, 1.0);
        c.push(1, 1.0);
        let mut elements = c.distinct_elements(&db);
        elements.sort();
        assert_eq!(elements, vec!["AL".to_string(), "O".to_string()]);
    }
}
