//! Builds the reduced Gordon-McBride linear system shared by the
//! equilibrium solver and the derivative solver (§4.3).
//!
//! Unknowns are ordered `[π₀..π_{E-1}, Δn₀..Δn_{Nc-1}, Δln n, (Δln T)]`;
//! the common block (element/condensed/ln-n coupling) is identical across
//! TP, HP, SP and both derivative systems. Only the energy row/column
//! (equilibrium HP/SP) or the rightmost column (derivatives) differs.

use crate::product::Product;
use crate::thermo_db::ThermoDB;
use ndarray::{Array1, Array2};

/// Which constraint closes the system on top of the shared common block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemKind {
    /// Fixed temperature and pressure: no extra row/column.
    Tp,
    /// Fixed enthalpy and pressure: one extra row/column for Δln T.
    Hp,
    /// Fixed entropy and pressure: one extra row/column for Δln T.
    Sp,
}

impl ProblemKind {
    /// Number of rows/columns appended to the common block: 1 (ln n alone,
    /// TP) or 2 (ln n + Δln T, HP/SP).
    pub fn roff(self) -> usize {
        match self {
            ProblemKind::Tp => 1,
            ProblemKind::Hp | ProblemKind::Sp => 2,
        }
    }

    pub fn has_temperature_unknown(self) -> bool {
        matches!(self, ProblemKind::Hp | ProblemKind::Sp)
    }
}

/// A fully assembled linear system: `a * x = b`, with `x` ordered as
/// documented on the module.
pub struct AssembledSystem {
    pub a: Array2<f64>,
    pub b: Array1<f64>,
    pub e: usize,
    pub nc: usize,
}

impl AssembledSystem {
    pub fn size(&self) -> usize {
        self.e + self.nc + 1
    }

    pub fn lnn_row(&self) -> usize {
        self.e + self.nc
    }

    pub fn t_row(&self) -> usize {
        self.e + self.nc + 1
    }
}

/// Per-gas-species chemical potential, enthalpy, entropy and heat capacity
/// (all dimensionless, divided by R or RT), evaluated once per assembly.
struct GasThermo {
    mu: Vec<f64>,
    h: Vec<f64>,
    s: Vec<f64>,
    cp: Vec<f64>,
}

fn gas_thermo(thermo: &ThermoDB, product: &Product, t: f64, p_atm: f64) -> GasThermo {
    let n_total: f64 = product.n_gas.iter().sum();
    let mut mu = Vec::with_capacity(product.ng());
    let mut h = Vec::with_capacity(product.ng());
    let mut s = Vec::with_capacity(product.ng());
    let mut cp = Vec::with_capacity(product.ng());
    for (k, &idx) in product.gas.iter().enumerate() {
        let sp = thermo.get(idx);
        mu.push(sp.chemical_potential(t, product.n_gas[k], n_total, p_atm));
        h.push(sp.enthalpy0(t));
        s.push(sp.entropy0(t));
        cp.push(sp.cp0(t));
    }
    GasThermo { mu, h, s, cp }
}

/// Build the common block (size `e+nc+1`, §4.3) shared by every problem
/// type and both derivative systems: the upper-left E×E block, the
/// element↔condensed coupling, and the element↔ln-n column, mirrored
/// symmetrically.
fn common_block(thermo: &ThermoDB, product: &Product, e: usize, nc: usize) -> Array2<f64> {
    let size = e + nc + 1;
    let mut m = Array2::zeros((size, size));
    let lnn = e + nc;

    for j in 0..e {
        for jp in 0..e {
            let mut acc = 0.0;
            for k in 0..product.ng() {
                acc += product.a_gas[[j, k]] * product.a_gas[[jp, k]] * product.n_gas[k];
            }
            m[[j, jp]] = acc;
        }
        for c in 0..nc {
            let species_idx = product.condensed[c];
            let a_jc = product.stoich_of(thermo, species_idx, &product.elements[j]);
            m[[j, e + c]] = a_jc;
            m[[e + c, j]] = a_jc;
        }
        let elem_lnn: f64 = (0..product.ng())
            .map(|k| product.a_gas[[j, k]] * product.n_gas[k])
            .sum();
        m[[j, lnn]] = elem_lnn;
        m[[lnn, j]] = elem_lnn;
    }
    m[[lnn, lnn]] = product.n_gas.iter().sum();
    m
}

/// Assemble the equilibrium-solver system for one outer iteration.
///
/// `element_target`: bⱼ, target moles of each element per gram of
/// propellant (index-aligned with `product.elements`).
/// `energy_target`: H/RT (HP) or S/R (SP); ignored for TP.
#[allow(clippy::too_many_arguments)]
pub fn assemble_equilibrium(
    thermo: &ThermoDB,
    product: &Product,
    element_target: &[f64],
    t: f64,
    p_atm: f64,
    kind: ProblemKind,
    energy_target: f64,
) -> AssembledSystem {
    let e = product.ne();
    let nc = product.nc();
    let mut m = common_block(thermo, product, e, nc);
    let gas = gas_thermo(thermo, product, t, p_atm);
    let lnn = e + nc;

    let mut rhs = Array1::zeros(e + nc + 1);

    for j in 0..e {
        let current: f64 = (0..product.ng())
            .map(|k| product.a_gas[[j, k]] * product.n_gas[k])
            .sum::<f64>()
            + (0..nc)
                .map(|c| {
                    product.stoich_of(thermo, product.condensed[c], &product.elements[j])
                        * product.n_condensed[c]
                })
                .sum::<f64>();
        let mu_term: f64 = (0..product.ng())
            .map(|k| product.a_gas[[j, k]] * product.n_gas[k] * gas.mu[k])
            .sum();
        rhs[j] = element_target[j] - current + mu_term;
    }

    for c in 0..nc {
        let species_idx = product.condensed[c];
        let g = thermo.get(species_idx).gibbs0(t);
        rhs[e + c] = g;
    }

    let n_total: f64 = product.n_gas.iter().sum();
    let mu_lnn: f64 = product
        .n_gas
        .iter()
        .zip(gas.mu.iter())
        .map(|(&n, &mu)| n * mu)
        .sum();
    let sum_n_now: f64 = product.n_gas.iter().sum();
    rhs[lnn] = mu_lnn + n_total - sum_n_now;

    if kind.has_temperature_unknown() {
        let size = e + nc + 2;
        let mut m2 = Array2::zeros((size, size));
        for r in 0..=lnn {
            for col in 0..=lnn {
                m2[[r, col]] = m[[r, col]];
            }
        }
        let trow = e + nc + 1;
        for j in 0..e {
            let coupling: f64 = (0..product.ng())
                .map(|k| product.a_gas[[j, k]] * product.n_gas[k] * gas.h[k])
                .sum();
            m2[[j, trow]] = coupling;
            m2[[trow, j]] = coupling;
        }
        let lnn_coupling: f64 = product
            .n_gas
            .iter()
            .zip(gas.h.iter())
            .map(|(&n, &h)| n * h)
            .sum();
        m2[[lnn, trow]] = lnn_coupling;
        m2[[trow, lnn]] = lnn_coupling;

        let diag: f64 = product
            .n_gas
            .iter()
            .zip(gas.cp.iter().zip(gas.h.iter()))
            .map(|(&n, (&cp, &h))| n * (cp + h * h))
            .sum();
        m2[[trow, trow]] = diag;
        m = m2;

        let mut rhs2 = Array1::zeros(size);
        for i in 0..=lnn {
            rhs2[i] = rhs[i];
        }
        let current_value: f64 = match kind {
            ProblemKind::Hp => product
                .n_gas
                .iter()
                .zip(gas.h.iter())
                .map(|(&n, &h)| n * h)
                .sum(),
            ProblemKind::Sp => product
                .n_gas
                .iter()
                .zip(gas.s.iter())
                .map(|(&n, &s)| n * s)
                .sum(),
            ProblemKind::Tp => 0.0,
        };
        let condensed_value: f64 = (0..nc)
            .map(|c| {
                let sp = thermo.get(product.condensed[c]);
                let term = match kind {
                    ProblemKind::Hp => sp.enthalpy0(t),
                    ProblemKind::Sp => sp.entropy0(t),
                    ProblemKind::Tp => 0.0,
                };
                term * product.n_condensed[c]
            })
            .sum();
        rhs2[trow] = energy_target - current_value - condensed_value;
        return AssembledSystem {
            a: m,
            b: rhs2,
            e,
            nc,
        };
    }

    AssembledSystem {
        a: m,
        b: rhs,
        e,
        nc,
    }
}

/// Assemble a derivative system reusing the common block unchanged;
/// `with_respect_to_t` selects the T-derivative rightmost column
/// (species enthalpies), otherwise the P-derivative column (stoich sums).
/// §4.5.
pub fn assemble_derivative(
    thermo: &ThermoDB,
    product: &Product,
    t: f64,
    p_atm: f64,
    with_respect_to_t: bool,
) -> AssembledSystem {
    let e = product.ne();
    let nc = product.nc();
    let m = common_block(thermo, product, e, nc);
    let gas = gas_thermo(thermo, product, t, p_atm);
    let lnn = e + nc;
    let mut rhs = Array1::zeros(e + nc + 1);

    if with_respect_to_t {
        for j in 0..e {
            rhs[j] = -(0..product.ng())
                .map(|k| product.a_gas[[j, k]] * product.n_gas[k] * gas.h[k])
                .sum::<f64>();
        }
        for c in 0..nc {
            rhs[e + c] = -thermo.get(product.condensed[c]).enthalpy0(t);
        }
        rhs[lnn] = -product
            .n_gas
            .iter()
            .zip(gas.h.iter())
            .map(|(&n, &h)| n * h)
            .sum::<f64>();
    } else {
        for j in 0..e {
            rhs[j] = (0..product.ng())
                .map(|k| product.a_gas[[j, k]] * product.n_gas[k])
                .sum::<f64>();
        }
        for c in 0..nc {
            rhs[e + c] = 0.0;
        }
        rhs[lnn] = product.n_gas.iter().sum();
    }

    AssembledSystem { a: m, b: rhs, e, nc }
}

/// Sum of moles of element `j` contributed by active condensed species.
pub fn condensed_element_sum(thermo: &ThermoDB, product: &Product, j: usize) -> f64 {
    (0..product.nc())
        .map(|c| {
            product.stoich_of(thermo, product.condensed[c], &product.elements[j])
                * product.n_condensed[c]
        })
        .sum()
}
