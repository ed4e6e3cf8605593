//! The outer Newton iteration: assemble, solve, damp, update, test
//! convergence, manage condensed species, repeat. §4.4.

use crate::case::{Case, EquilibriumProperties, Problem};
use crate::derivative_solver::compute_derivatives;
use crate::errors::{EqError, EqResult, Stage};
use crate::linear_solver::solve;
use crate::matrix_assembler::{assemble_equilibrium, ProblemKind};
use crate::options::EquilibriumOptions;
use crate::product::{list_elements, list_products, Product};
use crate::thermo_db::{Species, ThermoDB, BAR_PER_ATM, GAS_CONSTANT};
use crate::trace::{log_iter, log_result};

pub const CONC_TOL: f64 = 1e-8;
pub const LOG_CONC_TOL: f64 = -18.420681;
pub const CONV_TOL: f64 = 5e-6;
pub const ITERATION_MAX: usize = 100;
/// Initial guess temperature for HP/SP problems, K.
pub const INITIAL_ENERGY_TEMPERATURE: f64 = 3800.0;
/// ln(1e4): bounds the per-step change in a near-zero species' log
/// concentration (NASA RP-1311's damping constant).
const LOG_DAMPING_BOUND: f64 = 9.2103404;
/// Seed mole number a zeroed-out gas species is reinserted at during
/// singular-matrix recovery.
const GAS_REINSERTION_SEED: f64 = 1e-6;

fn problem_kind(problem: Problem) -> ProblemKind {
    match problem {
        Problem::Tp { .. } => ProblemKind::Tp,
        Problem::Hp { .. } => ProblemKind::Hp,
        Problem::Sp { .. } => ProblemKind::Sp,
    }
}

/// Solve for the equilibrium composition (and, for HP/SP, temperature) of
/// `case`, populating `case.product`, `case.iter` and `case.properties`.
pub fn compute_equilibrium(case: &mut Case, options: EquilibriumOptions) -> EqResult<()> {
    if !case.product.elements_listed {
        list_elements(&mut case.product, &case.propellants, &case.composition)?;
    }
    if !case.product.species_listed {
        list_products(&mut case.product, &case.thermo)?;
    }

    let (max_iter, tol, verbosity) = options.unwrap_or(ITERATION_MAX, CONV_TOL);
    let kind = problem_kind(case.problem);
    let mut t = match case.problem {
        Problem::Tp { temperature } => temperature,
        _ => INITIAL_ENERGY_TEMPERATURE,
    };

    let mut reinserted_gas = false;
    let element_target = case.element_targets();

    log_iter!(verbosity, " iter |   max |Δln n| |   Δln T    |     T      ");
    log_iter!(verbosity, "{:-<56}", "");

    'restart: loop {
        for iteration in 0..max_iter {
            let energy_target = match case.problem {
                Problem::Hp { enthalpy } => enthalpy / (GAS_CONSTANT * t),
                Problem::Sp { entropy } => entropy / GAS_CONSTANT,
                Problem::Tp { .. } => 0.0,
            };

            let system = assemble_equilibrium(
                &case.thermo,
                &case.product,
                &element_target,
                t,
                case.pressure,
                kind,
                energy_target,
            );

            let x = match solve(&system.a, &system.b) {
                Ok(x) => x,
                Err(_) => {
                    if remove_weakest_condensed(&mut case.product) {
                        continue 'restart;
                    }
                    if !reinserted_gas {
                        reinsert_zeroed_gas(&mut case.product);
                        reinserted_gas = true;
                        continue 'restart;
                    }
                    return Err(EqError::Singular { recovered: false });
                }
            };

            let e = case.product.ne();
            let nc = case.product.nc();
            let pis = &x.as_slice().unwrap()[0..e];
            let delta_n_condensed: Vec<f64> = x.iter().skip(e).take(nc).copied().collect();
            let delta_ln_n = x[e + nc];
            let delta_ln_t = if kind.has_temperature_unknown() {
                x[e + nc + 1]
            } else {
                0.0
            };

            let delta_ln_nj = gas_deltas(&case.thermo, &case.product, t, case.pressure, pis, delta_ln_n, delta_ln_t);

            let lambda = damping_factor(
                &case.product,
                &delta_ln_nj,
                case.iter.ln_n,
                delta_ln_n,
                delta_ln_t,
            );

            apply_update(
                &mut case.product,
                &mut t,
                &mut case.iter,
                &delta_ln_nj,
                &delta_n_condensed,
                delta_ln_n,
                delta_ln_t,
                lambda,
                kind.has_temperature_unknown(),
            );

            log_iter!(
                verbosity,
                " {:4} | {:12.6e} | {:10.6} | {:10.4}",
                iteration,
                delta_ln_nj.iter().fold(0.0_f64, |m, &d| m.max(d.abs())),
                delta_ln_t,
                t
            );

            if is_converged(&case.product, &case.iter, &delta_ln_nj, &delta_n_condensed, delta_ln_n, delta_ln_t, tol)
            {
                if manage_condensed(&case.thermo, &mut case.product, t, pis) {
                    continue 'restart;
                }
                log_result!(verbosity, "equilibrium converged in {} step(s)\n", iteration);
                finalize(case, t)?;
                return Ok(());
            }
        }
        return Err(EqError::NoConvergence {
            stage: Stage::Equilibrium,
        });
    }
}

#[allow(clippy::too_many_arguments)]
fn gas_deltas(
    thermo: &ThermoDB,
    product: &Product,
    t: f64,
    p_atm: f64,
    pis: &[f64],
    delta_ln_n: f64,
    delta_ln_t: f64,
) -> Vec<f64> {
    let n_total: f64 = product.n_gas.iter().sum();
    (0..product.ng())
        .map(|k| {
            let idx = product.gas[k];
            let sp = thermo.get(idx);
            let mu = sp.chemical_potential(t, product.n_gas[k], n_total, p_atm);
            let h = sp.enthalpy0(t);
            let pi_a: f64 = (0..product.ne()).map(|j| pis[j] * product.a_gas[[j, k]]).sum();
            -mu + pi_a + delta_ln_n + h * delta_ln_t
        })
        .collect()
}

/// §4.4.d damping: bounds the step so no species' log-concentration jumps
/// by more than `LOG_DAMPING_BOUND`, and temperature/total-mole steps stay
/// within a factor-of-0.4 of their Newton step.
fn damping_factor(
    product: &Product,
    delta_ln_nj: &[f64],
    ln_n: f64,
    delta_ln_n: f64,
    delta_ln_t: f64,
) -> f64 {
    let mut lambda1: f64 = delta_ln_t.abs().max(delta_ln_n.abs());
    let mut lambda2: f64 = 1.0;
    for (k, &d) in delta_ln_nj.iter().enumerate() {
        if d <= 0.0 {
            continue;
        }
        let log_conc = product.ln_n_gas[k] - ln_n;
        if log_conc <= LOG_CONC_TOL {
            let denom = d - delta_ln_n;
            if denom.abs() > 1e-300 {
                let bound = ((-product.ln_n_gas[k] + ln_n - LOG_DAMPING_BOUND) / denom).abs();
                lambda2 = lambda2.min(bound);
            }
        } else {
            lambda1 = lambda1.max(d);
        }
    }
    if lambda1 > 1e-300 {
        lambda1 = 2.0 / (5.0 * lambda1);
    } else {
        lambda1 = 1.0;
    }
    1.0_f64.min(lambda1).min(lambda2)
}

#[allow(clippy::too_many_arguments)]
fn apply_update(
    product: &mut Product,
    t: &mut f64,
    iter: &mut crate::iteration_info::IterationInfo,
    delta_ln_nj: &[f64],
    delta_n_condensed: &[f64],
    delta_ln_n: f64,
    delta_ln_t: f64,
    lambda: f64,
    has_t: bool,
) {
    for k in 0..product.ng() {
        product.ln_n_gas[k] += lambda * delta_ln_nj[k];
        if product.ln_n_gas[k] - (iter.ln_n + lambda * delta_ln_n) <= LOG_CONC_TOL {
            product.n_gas[k] = 0.0;
        } else {
            product.n_gas[k] = product.ln_n_gas[k].exp();
        }
    }
    for c in 0..product.nc() {
        product.n_condensed[c] = (product.n_condensed[c] + lambda * delta_n_condensed[c]).max(0.0);
    }
    if has_t {
        *t *= (lambda * delta_ln_t).exp();
    }
    iter.ln_n += lambda * delta_ln_n;
    iter.n = iter.ln_n.exp();
    iter.sum_n = product.n_gas.iter().sum::<f64>() + product.n_condensed.iter().sum::<f64>();
    iter.delta_ln_n = delta_ln_n;
    iter.delta_ln_t = delta_ln_t;
    iter.delta_ln_nj = delta_ln_nj.to_vec();
    iter.delta_n_condensed = delta_n_condensed.to_vec();
}

#[allow(clippy::too_many_arguments)]
fn is_converged(
    product: &Product,
    iter: &crate::iteration_info::IterationInfo,
    delta_ln_nj: &[f64],
    delta_n_condensed: &[f64],
    delta_ln_n: f64,
    delta_ln_t: f64,
    tol: f64,
) -> bool {
    let sum_n = iter.sum_n.max(1e-300);
    for k in 0..product.ng() {
        if product.n_gas[k] * delta_ln_nj[k].abs() / sum_n > tol {
            return false;
        }
    }
    for &d in delta_n_condensed {
        if d.abs() / sum_n > tol {
            return false;
        }
    }
    if iter.n * delta_ln_n.abs() / sum_n > tol {
        return false;
    }
    if delta_ln_t.abs() > 1e-4 {
        return false;
    }
    true
}

/// §4.4.g.i: evict active condensed species with non-positive mole number,
/// or whose current temperature falls outside their valid range.
fn remove_weakest_condensed(product: &mut Product) -> bool {
    if product.nc_active == 0 {
        return false;
    }
    let mut worst = 0;
    for i in 1..product.nc_active {
        if product.n_condensed[i] < product.n_condensed[worst] {
            worst = i;
        }
    }
    product.remove_condensed_at(worst);
    true
}

fn reinsert_zeroed_gas(product: &mut Product) {
    for k in 0..product.ng() {
        if product.n_gas[k] == 0.0 {
            product.n_gas[k] = GAS_REINSERTION_SEED;
            product.ln_n_gas[k] = GAS_REINSERTION_SEED.ln();
        }
    }
}

/// True iff `a` and `b` carry the same element symbols and stoichiometric
/// coefficients (any order) — used to recognize an alternate phase of the
/// same condensed formula, e.g. AL2O3(L) vs. AL2O3(a).
fn same_formula(a: &Species, b: &Species) -> bool {
    a.elements.len() == b.elements.len()
        && a.elements.iter().all(|(sym, coef)| {
            b.elements
                .iter()
                .any(|(sym2, coef2)| sym2 == sym && (coef2 - coef).abs() < 1e-9)
        })
}

/// Position within `product.condensed` (always `>= product.nc_active`, i.e.
/// an inactive candidate) of a species sharing `species_idx`'s formula whose
/// range admits `t`, if any.
fn find_alternate_phase(
    thermo: &ThermoDB,
    product: &Product,
    species_idx: usize,
    t: f64,
) -> Option<usize> {
    let target = thermo.get(species_idx);
    (product.nc_active..product.condensed.len()).find(|&pos| {
        let candidate_idx = product.condensed[pos];
        candidate_idx != species_idx
            && same_formula(target, thermo.get(candidate_idx))
            && thermo.get(candidate_idx).temperature_check(t)
    })
}

/// §4.4.g: remove non-positive active condensed species; for an active
/// condensed species that falls outside its valid temperature range,
/// substitute or add an alternate phase of the same formula if one admits
/// `t`, otherwise evict it outright. Then include the best inactive
/// candidate if its reduced Gibbs energy (G°ₖ − Σⱼ πⱼ·a_element_j(k)) is
/// negative. Returns whether the active set changed (caller must restart).
fn manage_condensed(thermo: &ThermoDB, product: &mut Product, t: f64, pis: &[f64]) -> bool {
    let mut changed = false;

    // Snapshot the species active at entry and process each by identity
    // (not position): substitution/addition can shuffle positions and grow
    // the active prefix, and a freshly-added alternate must not be
    // re-examined in this same pass — it has a placeholder zero mole
    // number until the next Newton iteration assigns it one.
    let active_species: Vec<usize> = product.condensed[0..product.nc_active].to_vec();
    for species_idx in active_species {
        let pos = match product.condensed[0..product.nc_active]
            .iter()
            .position(|&s| s == species_idx)
        {
            Some(pos) => pos,
            None => continue, // already evicted earlier in this pass
        };
        if product.n_condensed[pos] <= 0.0 {
            product.remove_condensed_at(pos);
            changed = true;
            continue;
        }
        if !thermo.get(species_idx).temperature_check(t) {
            match find_alternate_phase(thermo, product, species_idx, t) {
                Some(alt_pos) => {
                    let transition_t = thermo.get(species_idx).transition_temperature(t);
                    if (t - transition_t).abs() > 50.0 {
                        product.remove_condensed_at(pos);
                        product.include_condensed_at(alt_pos);
                    } else {
                        product.include_condensed_at(alt_pos);
                    }
                }
                None => {
                    product.remove_condensed_at(pos);
                }
            }
            changed = true;
        }
    }

    let mut best: Option<(usize, f64)> = None;
    for pos in product.nc_active..product.condensed.len() {
        let species_idx = product.condensed[pos];
        let sp = thermo.get(species_idx);
        if !sp.temperature_check(t) {
            continue;
        }
        let pi_a: f64 = (0..product.ne())
            .map(|j| pis[j] * product.stoich_of(thermo, species_idx, &product.elements[j]))
            .sum();
        let reduced_g = sp.gibbs0(t) - pi_a;
        if reduced_g < 0.0 && best.map_or(true, |(_, g)| reduced_g < g) {
            best = Some((pos, reduced_g));
        }
    }
    if let Some((pos, _)) = best {
        product.include_condensed_at(pos);
        changed = true;
    }

    changed
}

fn finalize(case: &mut Case, t: f64) -> EqResult<()> {
    case.product.is_equilibrium = true;
    let n_total: f64 = case.product.n_gas.iter().sum();
    let sum_n: f64 = n_total + case.product.n_condensed.iter().sum::<f64>();

    let mut h = 0.0;
    let mut s = 0.0;
    for k in 0..case.product.ng() {
        let idx = case.product.gas[k];
        let sp = case.thermo.get(idx);
        let nk = case.product.n_gas[k];
        h += nk * sp.enthalpy0(t);
        if nk > 0.0 {
            s += nk
                * (sp.entropy0(t) - (nk / n_total.max(1e-300)).ln()
                    - (case.pressure * BAR_PER_ATM).ln());
        }
    }
    for c in 0..case.product.nc() {
        let idx = case.product.condensed[c];
        let sp = case.thermo.get(idx);
        let nk = case.product.n_condensed[c];
        h += nk * sp.enthalpy0(t);
        s += nk * sp.entropy0(t);
    }
    let h_phys = h * GAS_CONSTANT * t;
    let s_phys = s * GAS_CONSTANT;
    let g_phys = h_phys - t * s_phys;
    let m = if sum_n > 0.0 { 1.0 / sum_n } else { 0.0 };

    case.properties = Some(EquilibriumProperties {
        p: case.pressure,
        t,
        h: h_phys,
        u: h_phys - GAS_CONSTANT * t * n_total,
        g: g_phys,
        s: s_phys,
        m,
        dlnv_dlnp_t: -1.0,
        dlnv_dlnt_p: 1.0,
        cp: 0.0,
        cv: 0.0,
        gamma_s: 0.0,
        sound_speed: 0.0,
    });
    compute_derivatives(case)
}
