//! End-to-end coverage of the frozen/shifting nozzle performance loops
//! on top of the same small synthetic H/H2 system used in
//! `tests/equilibrium.rs`. See SPEC_FULL.md §8, scenarios 3-6.

use gmb_core::composition::Composition;
use gmb_core::options::PerformanceOptions;
use gmb_core::performance::{compute_frozen, compute_shifting, ExitCondition};
use gmb_core::propellant_db::{PropellantDB, Reactant};
use gmb_core::thermo_db::{Phase, Species, TemperatureInterval, ThermoData, ThermoDB, GAS_CONSTANT};
use gmb_core::EqError;
use std::rc::Rc;

fn constant_cp_species(name: &str, elements: Vec<(&str, f64)>, cp_over_r: f64, heat_of_formation_298: f64) -> Species {
    let t_ref = 298.15;
    let b0 = heat_of_formation_298 / GAS_CONSTANT - cp_over_r * t_ref;
    Species {
        name: name.into(),
        id: "synthetic".into(),
        phase: Phase::Gas,
        elements: elements.into_iter().map(|(s, c)| (s.into(), c)).collect(),
        molecular_weight: 1.0,
        heat_of_formation: heat_of_formation_298,
        data: ThermoData::Polynomial(vec![TemperatureInterval {
            t_lo: 100.0,
            t_hi: 6000.0,
            a: [0.0, 0.0, cp_over_r, 0.0, 0.0, 0.0, 0.0],
            b: [b0, 0.0],
        }]),
    }
}

fn h_h2_thermo() -> Rc<ThermoDB> {
    Rc::new(ThermoDB::new(vec![
        constant_cp_species("H", vec![("H", 1.0)], 2.5, 218_000.0),
        constant_cp_species("H2", vec![("H", 2.0)], 3.5, 0.0),
    ]))
}

fn h2_propellants() -> Rc<PropellantDB> {
    Rc::new(PropellantDB::new(vec![Reactant {
        name: "H2".into(),
        elements: vec![("H".into(), 2.0)],
        heat_of_formation: -4000.0,
        density: 0.00009,
    }]))
}

fn h2_composition() -> Composition {
    let mut c = Composition::default();
    c.push(0, 1.0);
    c
}

#[test]
fn frozen_throat_converges_below_chamber_temperature() {
    let thermo = h_h2_thermo();
    let propellants = h2_propellants();
    let composition = h2_composition();

    let perf = compute_frozen(&thermo, &propellants, &composition, 68.0, None, PerformanceOptions::default())
        .expect("frozen performance should converge");

    assert!(perf.throat.converged);
    assert!(perf.throat.velocity > 0.0);
    assert!(perf.throat.temperature < perf.chamber_temperature);
    assert!(perf.throat.c_star > 0.0);
}

#[test]
fn frozen_supersonic_exit_expands_past_throat() {
    let thermo = h_h2_thermo();
    let propellants = h2_propellants();
    let composition = h2_composition();

    let perf = compute_frozen(
        &thermo,
        &propellants,
        &composition,
        68.0,
        Some(ExitCondition::SupersonicAreaRatio(4.0)),
        PerformanceOptions::default(),
    )
    .expect("frozen performance with exit should converge");

    let exit = perf.exit.expect("exit condition was requested");
    assert!(exit.converged);
    assert!(
        exit.velocity > perf.throat.velocity,
        "supersonic exit velocity {} should exceed throat velocity {}",
        exit.velocity,
        perf.throat.velocity
    );
    assert!(exit.pressure < perf.throat.pressure);
}

#[test]
fn frozen_rejects_subsonic_area_ratio_at_or_below_one() {
    let thermo = h_h2_thermo();
    let propellants = h2_propellants();
    let composition = h2_composition();

    let result = compute_frozen(
        &thermo,
        &propellants,
        &composition,
        68.0,
        Some(ExitCondition::SubsonicAreaRatio(0.9)),
        PerformanceOptions::default(),
    );
    assert!(matches!(result, Err(EqError::AreaRatioOutOfRange)));
}

#[test]
fn shifting_throat_converges_with_positive_impulse() {
    let thermo = h_h2_thermo();
    let propellants = h2_propellants();
    let composition = h2_composition();

    let perf = compute_shifting(&thermo, &propellants, &composition, 68.0, None, PerformanceOptions::default())
        .expect("shifting performance should converge");

    assert!(perf.throat.converged);
    assert!(perf.throat.velocity > 0.0);
    assert!(perf.throat.isp > 0.0);
}

#[test]
fn shifting_supersonic_exit_expands_past_throat() {
    let thermo = h_h2_thermo();
    let propellants = h2_propellants();
    let composition = h2_composition();

    let perf = compute_shifting(
        &thermo,
        &propellants,
        &composition,
        68.0,
        Some(ExitCondition::SupersonicAreaRatio(4.0)),
        PerformanceOptions::default(),
    )
    .expect("shifting performance with exit should converge");

    let exit = perf.exit.expect("exit condition was requested");
    assert!(exit.velocity > perf.throat.velocity);
}
