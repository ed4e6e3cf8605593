//! Nozzle performance: frozen and shifting throat/exit states, nested on
//! top of the chamber equilibrium. §4.6/4.7.

use crate::case::{Case, Problem};
use crate::composition::Composition;
use crate::equilibrium_solver::compute_equilibrium;
use crate::errors::{EqError, EqResult, Stage};
use crate::options::{EquilibriumOptions, PerformanceOptions};
use crate::product::Product;
use crate::propellant_db::PropellantDB;
use crate::thermo_db::{ThermoDB, BAR_PER_ATM, GAS_CONSTANT};
use std::rc::Rc;

const PC_PT_ITERATION_MAX: usize = 5;
const PC_PE_ITERATION_MAX: usize = 6;
const TEMP_ITERATION_MAX: usize = 8;
/// Relative Mach-number-squared tolerance at the throat (u ≈ a).
const THROAT_TOL: f64 = 4e-5;

/// What the exit state is matched to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExitCondition {
    /// Exit pressure directly specified (atm).
    Pressure(f64),
    /// Ae/At ≥ 1, nozzle operating supersonically.
    SupersonicAreaRatio(f64),
    /// Ae/At ≥ 1, nozzle operating subsonically.
    SubsonicAreaRatio(f64),
}

/// One downstream nozzle state (throat or exit): pressure, temperature,
/// flow speed, area ratio, and the impulse figures derived from it.
#[derive(Debug, Clone, Copy, Default)]
pub struct NozzleState {
    pub pressure: f64,
    pub temperature: f64,
    pub velocity: f64,
    pub area_ratio: f64,
    pub isp: f64,
    pub area_per_mdot: f64,
    pub c_star: f64,
    pub cf: f64,
    pub ivac: f64,
    pub converged: bool,
}

/// Chamber, throat and (optionally) exit performance for one case.
pub struct Performance {
    pub chamber_temperature: f64,
    pub throat: NozzleState,
    pub exit: Option<NozzleState>,
}

fn new_chamber_case(
    thermo: &Rc<ThermoDB>,
    propellants: &Rc<PropellantDB>,
    composition: &Composition,
    pc_atm: f64,
) -> Case {
    let enthalpy = composition.enthalpy_per_gram(propellants);
    Case::new(
        thermo.clone(),
        propellants.clone(),
        composition.clone(),
        pc_atm,
        Problem::Hp { enthalpy },
    )
}

/// Frozen-composition performance: the chamber equilibrium fixes mole
/// fractions; throat and exit only change temperature at fixed composition.
pub fn compute_frozen(
    thermo: &Rc<ThermoDB>,
    propellants: &Rc<PropellantDB>,
    composition: &Composition,
    pc_atm: f64,
    exit_condition: Option<ExitCondition>,
    options: PerformanceOptions,
) -> EqResult<Performance> {
    let mut chamber = new_chamber_case(thermo, propellants, composition, pc_atm);
    let mut eq_options = EquilibriumOptions::default();
    eq_options.verbosity = options.verbosity;
    compute_equilibrium(&mut chamber, eq_options).map_err(|_| EqError::NoEquilibrium)?;

    let props = chamber.properties.ok_or(EqError::NoEquilibrium)?;
    let n_total: f64 = chamber.product.n_gas.iter().sum();
    let gamma = props.gamma_s;

    let h_chamber_rt: f64 = (0..chamber.product.ng())
        .map(|k| {
            let idx = chamber.product.gas[k];
            chamber.product.n_gas[k] * thermo.get(idx).enthalpy0(props.t)
        })
        .sum();
    let s_target: f64 = props.s / GAS_CONSTANT;

    let pc_pt_guess = ((gamma + 1.0) / 2.0).powf(gamma / (gamma - 1.0));
    let throat = solve_frozen_station(
        thermo,
        &chamber.product,
        props.t,
        pc_atm,
        pc_pt_guess,
        PC_PT_ITERATION_MAX,
        n_total,
        gamma,
        h_chamber_rt,
        s_target,
        props.t,
        1.0,
        None,
    );

    let mut exit = None;
    if let Some(condition) = exit_condition {
        let (target_ar, guess) = match condition {
            ExitCondition::Pressure(pe) => (None, pc_atm / pe),
            ExitCondition::SupersonicAreaRatio(ar) => (Some(ar), supersonic_pressure_guess(ar, gamma)),
            ExitCondition::SubsonicAreaRatio(ar) => (Some(ar), subsonic_pressure_guess(ar, gamma)),
        };
        if let Some(ar) = target_ar {
            if ar <= 1.0 {
                return Err(EqError::AreaRatioOutOfRange);
            }
        }
        let e = solve_frozen_station(
            thermo,
            &chamber.product,
            props.t,
            pc_atm,
            guess,
            PC_PE_ITERATION_MAX,
            n_total,
            gamma,
            h_chamber_rt,
            s_target,
            props.t,
            target_ar.unwrap_or(f64::NAN),
            Some(throat.area_per_mdot),
        );
        exit = Some(e);
    }

    Ok(Performance {
        chamber_temperature: props.t,
        throat,
        exit,
    })
}

#[allow(clippy::too_many_arguments)]
fn solve_frozen_station(
    thermo: &ThermoDB,
    product: &Product,
    tc: f64,
    pc_atm: f64,
    mut pc_p_guess: f64,
    max_outer: usize,
    n_total: f64,
    gamma: f64,
    h_chamber_rt: f64,
    s_target: f64,
    t_guess_seed: f64,
    target_area_ratio: f64,
    reference_area_per_mdot: Option<f64>,
) -> NozzleState {
    let mut t = t_guess_seed;
    let mut converged = false;
    for _ in 0..max_outer {
        let p = pc_atm / pc_p_guess;
        t = solve_temperature_for_entropy(thermo, product, s_target, p, t);

        let h_rt: f64 = (0..product.ng())
            .map(|k| product.n_gas[k] * thermo.get(product.gas[k]).enthalpy0(t))
            .sum();
        let u_sq = (2000.0 * (h_chamber_rt * GAS_CONSTANT * tc - h_rt * GAS_CONSTANT * t)).max(0.0);
        let u = u_sq.sqrt();
        let a = (1000.0 * n_total * GAS_CONSTANT * t * gamma).max(0.0).sqrt();

        if target_area_ratio.is_nan() {
            // throat: match Mach 1.
            if ((u_sq - a * a).abs() / u_sq.max(1e-300)) <= THROAT_TOL {
                converged = true;
                let state = finalize_station(p, t, u, 1.0, n_total, pc_atm, reference_area_per_mdot);
                return state;
            }
            pc_p_guess /= 1.0 + (u_sq - a * a) / (1000.0 * (gamma + 1.0) * n_total * GAS_CONSTANT * t);
        } else {
            let current_ar = area_ratio_from_state(n_total, GAS_CONSTANT, t, u, p);
            let diff = current_ar.ln() - target_area_ratio.ln();
            if diff.abs() / target_area_ratio.ln().abs().max(1.0) <= THROAT_TOL {
                converged = true;
                let state = finalize_station(p, t, u, current_ar, n_total, pc_atm, reference_area_per_mdot);
                return state;
            }
            pc_p_guess *= (1.0 + gamma * u_sq / (u_sq - a * a) * (-diff)).max(0.1);
        }
    }
    let p = pc_atm / pc_p_guess;
    let h_rt: f64 = (0..product.ng())
        .map(|k| product.n_gas[k] * thermo.get(product.gas[k]).enthalpy0(t))
        .sum();
    let u = (2000.0 * (h_chamber_rt * GAS_CONSTANT * tc - h_rt * GAS_CONSTANT * t))
        .max(0.0)
        .sqrt();
    let ar = if target_area_ratio.is_nan() {
        1.0
    } else {
        area_ratio_from_state(n_total, GAS_CONSTANT, t, u, p)
    };
    let mut state = finalize_station(p, t, u, ar, n_total, pc_atm, reference_area_per_mdot);
    state.converged = converged;
    state
}

fn area_ratio_from_state(n_total: f64, r: f64, t: f64, u: f64, p: f64) -> f64 {
    // A/At = (ṁ/ρu); with ρ = (nRT)/(VP) this reduces to n_total·R·T/(p·u).
    if u <= 0.0 {
        return f64::INFINITY;
    }
    (n_total * r * t) / (p * u)
}

/// `reference_area_per_mdot` pins C*/Cf to the throat's A/ṁ (§ performance
/// report: "C* = Pc·A/ṁ_t, Cf = Isp / (Pc·A/ṁ_t)") when given; `None` for the
/// throat station itself, which uses its own just-computed ratio.
fn finalize_station(
    p: f64,
    t: f64,
    u: f64,
    area_ratio: f64,
    n_total: f64,
    pc_atm: f64,
    reference_area_per_mdot: Option<f64>,
) -> NozzleState {
    let area_per_mdot = if u > 0.0 {
        1000.0 * GAS_CONSTANT * t * n_total / (p * u)
    } else {
        f64::INFINITY
    };
    let c_star_area = reference_area_per_mdot.unwrap_or(area_per_mdot);
    let c_star = if u > 0.0 { pc_atm * c_star_area } else { 0.0 };
    let cf = if c_star > 0.0 { u / c_star } else { 0.0 };
    let ivac = u + p * area_per_mdot;
    NozzleState {
        pressure: p,
        temperature: t,
        velocity: u,
        area_ratio,
        isp: u,
        area_per_mdot,
        c_star,
        cf,
        ivac,
        converged: true,
    }
}

/// Newton solve for the temperature at which a frozen-composition gas
/// mixture's entropy matches `s_target` at pressure `p_atm`, bounded to
/// [`TEMP_ITERATION_MAX`] steps.
fn solve_temperature_for_entropy(
    thermo: &ThermoDB,
    product: &Product,
    s_target: f64,
    p_atm: f64,
    t_guess: f64,
) -> f64 {
    let n_total: f64 = product.n_gas.iter().sum();
    let mut t = t_guess.max(50.0);
    for _ in 0..TEMP_ITERATION_MAX {
        let mut s = 0.0;
        let mut cp_mix = 0.0;
        for k in 0..product.ng() {
            let idx = product.gas[k];
            let sp = thermo.get(idx);
            let nk = product.n_gas[k];
            if nk <= 0.0 {
                continue;
            }
            s += nk * (sp.entropy0(t) - (nk / n_total).ln() - (p_atm * BAR_PER_ATM).ln());
            cp_mix += nk * sp.cp0(t);
        }
        let residual = s_target - s;
        if cp_mix.abs() < 1e-300 {
            break;
        }
        let step = residual / cp_mix;
        t = (t + step).max(50.0);
        if residual.abs() < 1e-10 {
            break;
        }
    }
    t
}

fn supersonic_pressure_guess(area_ratio: f64, gamma: f64) -> f64 {
    let ln_ar = area_ratio.ln();
    let pc_pt = ((gamma + 1.0) / 2.0).powf(gamma / (gamma - 1.0));
    let log_pc_pe = if area_ratio < 2.0 {
        pc_pt.ln() + (3.294 * area_ratio.powi(2) + 1.535 * ln_ar).max(0.0).sqrt()
    } else {
        gamma + 1.4 * ln_ar
    };
    log_pc_pe.exp().max(1.0 + 1e-6)
}

fn subsonic_pressure_guess(area_ratio: f64, gamma: f64) -> f64 {
    // Subsonic branch: area ratio grows as pressure ratio approaches 1 from
    // above, mirrored from the supersonic fit.
    let ln_ar = area_ratio.ln();
    (1.0 + 0.5 * gamma * ln_ar).max(1.0 + 1e-6)
}

/// Shifting-composition performance: at each trial throat/exit pressure,
/// the equilibrium is re-solved under the `SP` problem type with the
/// chamber's entropy held fixed.
pub fn compute_shifting(
    thermo: &Rc<ThermoDB>,
    propellants: &Rc<PropellantDB>,
    composition: &Composition,
    pc_atm: f64,
    exit_condition: Option<ExitCondition>,
    options: PerformanceOptions,
) -> EqResult<Performance> {
    let mut chamber = new_chamber_case(thermo, propellants, composition, pc_atm);
    let mut eq_options = EquilibriumOptions::default();
    eq_options.verbosity = options.verbosity;
    compute_equilibrium(&mut chamber, eq_options).map_err(|_| EqError::NoEquilibrium)?;
    let props = chamber.properties.ok_or(EqError::NoEquilibrium)?;
    let s_target = props.s;
    let h_chamber_rt: f64 = (0..chamber.product.ng())
        .map(|k| {
            let idx = chamber.product.gas[k];
            chamber.product.n_gas[k] * thermo.get(idx).enthalpy0(props.t)
        })
        .sum();

    let throat = solve_shifting_station(
        thermo,
        propellants,
        composition,
        pc_atm,
        s_target,
        PC_PT_ITERATION_MAX,
        props.t,
        props.gamma_s,
        props.t,
        h_chamber_rt,
        f64::NAN,
        eq_options,
        Stage::Throat,
        None,
    )?;

    let mut exit = None;
    if let Some(condition) = exit_condition {
        let target_ar = match condition {
            ExitCondition::Pressure(_) => None,
            ExitCondition::SupersonicAreaRatio(ar) | ExitCondition::SubsonicAreaRatio(ar) => Some(ar),
        };
        if let Some(ar) = target_ar {
            if ar <= 1.0 {
                return Err(EqError::AreaRatioOutOfRange);
            }
        }
        let e = solve_shifting_station(
            thermo,
            propellants,
            composition,
            pc_atm,
            s_target,
            PC_PE_ITERATION_MAX,
            props.t,
            props.gamma_s,
            props.t,
            h_chamber_rt,
            target_ar.unwrap_or(f64::NAN),
            eq_options,
            Stage::Exit,
            Some(throat.area_per_mdot),
        )?;
        exit = Some(e);
    }

    Ok(Performance {
        chamber_temperature: props.t,
        throat,
        exit,
    })
}

#[allow(clippy::too_many_arguments)]
fn solve_shifting_station(
    thermo: &Rc<ThermoDB>,
    propellants: &Rc<PropellantDB>,
    composition: &Composition,
    pc_atm: f64,
    s_target: f64,
    max_outer: usize,
    tc: f64,
    gamma_guess: f64,
    t_guess_seed: f64,
    h_chamber_rt: f64,
    target_area_ratio: f64,
    eq_options: EquilibriumOptions,
    stage: Stage,
    reference_area_per_mdot: Option<f64>,
) -> EqResult<NozzleState> {
    let mut pc_p_guess = ((gamma_guess + 1.0) / 2.0).powf(gamma_guess / (gamma_guess - 1.0));
    if !target_area_ratio.is_nan() {
        pc_p_guess = supersonic_pressure_guess(target_area_ratio, gamma_guess);
    }
    let mut last: Option<(Case, f64)> = None;

    for _ in 0..max_outer {
        let p = pc_atm / pc_p_guess;
        let mut trial = Case::new(
            thermo.clone(),
            propellants.clone(),
            composition.clone(),
            p,
            Problem::Sp { entropy: s_target },
        );
        if compute_equilibrium(&mut trial, eq_options).is_err() {
            if let Some((case, _)) = last {
                return Ok(station_from_case(
                    &case,
                    h_chamber_rt,
                    tc,
                    target_area_ratio,
                    false,
                    reference_area_per_mdot,
                ));
            }
            return Err(EqError::NoConvergence { stage });
        }
        let props = trial.properties.expect("finalize always sets properties");
        let n_total: f64 = trial.product.n_gas.iter().sum();
        let h_rt: f64 = (0..trial.product.ng())
            .map(|k| trial.product.n_gas[k] * thermo.get(trial.product.gas[k]).enthalpy0(props.t))
            .sum();
        let u_sq = (2000.0 * (h_chamber_rt * GAS_CONSTANT * tc - h_rt * GAS_CONSTANT * props.t)).max(0.0);
        let u = u_sq.sqrt();
        let a = (1000.0 * n_total * GAS_CONSTANT * props.t * props.gamma_s).max(0.0).sqrt();

        if target_area_ratio.is_nan() {
            if ((u_sq - a * a).abs() / u_sq.max(1e-300)) <= THROAT_TOL {
                return Ok(station_from_case(
                    &trial,
                    h_chamber_rt,
                    tc,
                    1.0,
                    true,
                    reference_area_per_mdot,
                ));
            }
            pc_p_guess /= 1.0 + (u_sq - a * a) / (1000.0 * (props.gamma_s + 1.0) * n_total * GAS_CONSTANT * props.t);
        } else {
            let current_ar = area_ratio_from_state(n_total, GAS_CONSTANT, props.t, u, p);
            let diff = current_ar.ln() - target_area_ratio.ln();
            if diff.abs() / target_area_ratio.ln().abs().max(1.0) <= THROAT_TOL {
                return Ok(station_from_case(
                    &trial,
                    h_chamber_rt,
                    tc,
                    current_ar,
                    true,
                    reference_area_per_mdot,
                ));
            }
            pc_p_guess *= (1.0 + props.gamma_s * u_sq / (u_sq - a * a) * (-diff)).max(0.1);
        }
        last = Some((trial, p));
    }

    let (case, _) = last.expect("at least one iteration runs");
    Ok(station_from_case(
        &case,
        h_chamber_rt,
        tc,
        target_area_ratio,
        false,
        reference_area_per_mdot,
    ))
}

fn station_from_case(
    case: &Case,
    h_chamber_rt: f64,
    tc: f64,
    area_ratio_hint: f64,
    converged: bool,
    reference_area_per_mdot: Option<f64>,
) -> NozzleState {
    let props = case.properties.expect("finalize always sets properties");
    let n_total: f64 = case.product.n_gas.iter().sum();
    let h_rt: f64 = (0..case.product.ng())
        .map(|k| case.product.n_gas[k] * case.thermo.get(case.product.gas[k]).enthalpy0(props.t))
        .sum();
    let u = (2000.0 * (h_chamber_rt * GAS_CONSTANT * tc - h_rt * GAS_CONSTANT * props.t))
        .max(0.0)
        .sqrt();
    let area_ratio = if area_ratio_hint.is_nan() {
        1.0
    } else {
        area_ratio_hint
    };
    let mut state = finalize_station(
        props.p,
        props.t,
        u,
        area_ratio,
        n_total,
        case.pressure,
        reference_area_per_mdot,
    );
    state.converged = converged;
    state
}
