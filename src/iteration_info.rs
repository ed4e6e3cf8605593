//! Per-iteration scalar and per-species state threaded through the outer
//! equilibrium loop (§3 `IterationInfo`).

/// Scalars and deltas carried across one outer-iteration step.
#[derive(Debug, Clone)]
pub struct IterationInfo {
    /// Moles of gas per gram of propellant, n = Σₖ n[GAS][k].
    pub n: f64,
    pub ln_n: f64,
    /// Total moles per gram including condensed species.
    pub sum_n: f64,
    pub delta_ln_n: f64,
    /// Only meaningful for HP/SP problems.
    pub delta_ln_t: f64,
    /// Per-gas-species Δln nⱼ from the most recent linear solve.
    pub delta_ln_nj: Vec<f64>,
    /// Per-condensed-species Δnₖ from the most recent linear solve.
    pub delta_n_condensed: Vec<f64>,
}

impl IterationInfo {
    pub fn new(ng: usize, nc: usize, n0: f64) -> Self {
        Self {
            n: n0,
            ln_n: n0.ln(),
            sum_n: n0,
            delta_ln_n: 0.0,
            delta_ln_t: 0.0,
            delta_ln_nj: vec![0.0; ng],
            delta_n_condensed: vec![0.0; nc],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_seeds_ln_n_from_n() {
        let info = IterationInfo::new(3, 1, 0.1);
        assert!((info.ln_n - 0.1_f64.ln()).abs() < 1e-15);
        assert_eq!(info.delta_ln_nj.len(), 3);
        assert_eq!(info.delta_n_condensed.len(), 1);
    }
}
