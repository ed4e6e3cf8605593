//! Thermodynamic derivatives at a converged equilibrium: (∂lnV/∂lnT)ₚ,
//! (∂lnV/∂lnP)ₜ, Cp, Cv, isentropic exponent, sound speed. §4.5.

use crate::case::Case;
use crate::errors::EqResult;
use crate::linear_solver::solve;
use crate::matrix_assembler::assemble_derivative;
use crate::thermo_db::GAS_CONSTANT;

/// Populates the derivative fields of `case.properties` (which must
/// already hold a converged equilibrium's P/T/H/S/M).
pub fn compute_derivatives(case: &mut Case) -> EqResult<()> {
    let t = case.properties.map(|p| p.t).unwrap_or(0.0);
    let p_atm = case.pressure;

    let t_system = assemble_derivative(&case.thermo, &case.product, t, p_atm, true);
    let t_solution = solve(&t_system.a, &t_system.b)?;
    let dlnv_dlnt_p = 1.0 + t_solution[t_solution.len() - 1];

    let p_system = assemble_derivative(&case.thermo, &case.product, t, p_atm, false);
    let p_solution = solve(&p_system.a, &p_system.b)?;
    let dlnv_dlnp_t = p_solution[p_solution.len() - 1] - 1.0;

    let n_total: f64 = case.product.n_gas.iter().sum();
    let cp_frozen: f64 = (0..case.product.ng())
        .map(|k| {
            let idx = case.product.gas[k];
            case.product.n_gas[k] * case.thermo.get(idx).cp0(t)
        })
        .sum();

    // Eq. of NASA RP-1311 §6.4: Cp/R for the reacting mixture adds the
    // response of composition to temperature, read off the T-derivative
    // solution's π and Δn components, weighted by species enthalpies.
    let e = case.product.ne();
    let nc = case.product.nc();
    let reacting_term: f64 = (0..e)
        .map(|j| {
            let coupling: f64 = (0..case.product.ng())
                .map(|k| {
                    let idx = case.product.gas[k];
                    case.product.a_gas[[j, k]] * case.product.n_gas[k] * case.thermo.get(idx).enthalpy0(t)
                })
                .sum();
            t_solution[j] * coupling
        })
        .sum::<f64>()
        + (0..nc)
            .map(|c| {
                let idx = case.product.condensed[c];
                t_solution[e + c] * case.thermo.get(idx).enthalpy0(t)
            })
            .sum::<f64>();

    let cp = (cp_frozen + reacting_term) * GAS_CONSTANT;
    let cv = cp + n_total * GAS_CONSTANT * dlnv_dlnt_p.powi(2) / dlnv_dlnp_t;
    let gamma_s = -(cp / cv) / dlnv_dlnp_t;
    let sound_speed = (1000.0 * n_total * GAS_CONSTANT * t * gamma_s).max(0.0).sqrt();

    if let Some(props) = case.properties.as_mut() {
        props.dlnv_dlnt_p = dlnv_dlnt_p;
        props.dlnv_dlnp_t = dlnv_dlnp_t;
        props.cp = cp;
        props.cv = cv;
        props.gamma_s = gamma_s;
        props.sound_speed = sound_speed;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::Problem;
    use crate::composition::Composition;
    use crate::equilibrium_solver::compute_equilibrium;
    use crate::options::EquilibriumOptions;
    use crate::propellant_db::{PropellantDB, Reactant};
    use crate::thermo_db::{Phase, Species, TemperatureInterval, ThermoData, ThermoDB};
    use std::rc::Rc;

    fn monatomic(name: &str, elements: Vec<(&str, f64)>, cp_const: f64) -> Species {
        Species {
            name: name.into(),
            id: "t".into(),
            phase: Phase::Gas,
            elements: elements.into_iter().map(|(s, c)| (s.into(), c)).collect(),
            molecular_weight: 1.0,
            heat_of_formation: 0.0,
            data: ThermoData::Polynomial(vec![TemperatureInterval {
                t_lo: 200.0,
                t_hi: 6000.0,
                a: [0.0, 0.0, cp_const, 0.0, 0.0, 0.0, 0.0],
                b: [0.0, 0.0],
            }]),
        }
    }

    #[test]
    fn cv_matches_cp_identity_for_gas_only_mixture() {
        let thermo = Rc::new(ThermoDB::new(vec![
            monatomic("H", vec![("H", 1.0)], 2.5),
            monatomic("H2", vec![("H", 2.0)], 3.5),
        ]));
        let propellants = Rc::new(PropellantDB::new(vec![Reactant {
            name: "H2".into(),
            elements: vec![("H".into(), 2.0)],
            heat_of_formation: 0.0,
            density: 0.00009,
        }]));
        let mut composition = Composition::default();
        composition.push(0, 1.0);
        let mut case = Case::new(thermo, propellants, composition, 1.0, Problem::Tp { temperature: 3000.0 });
        compute_equilibrium(&mut case, EquilibriumOptions::default()).unwrap();
        compute_derivatives(&mut case).unwrap();
        let props = case.properties.unwrap();
        let n_total: f64 = case.product.n_gas.iter().sum();
        let expected_cv = props.cp - n_total * GAS_CONSTANT * props.dlnv_dlnt_p.powi(2) / props.dlnv_dlnp_t;
        assert!((props.cv - expected_cv).abs() < 1e-6 * props.cv.abs().max(1.0));
        assert!(props.sound_speed >= 0.0);
    }
}
