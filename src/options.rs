//! Per-call overrides of the solver constants from §4.4/§4.6, the way the
//! teacher's `SolverOptions` overrides `MAX_ITER_CRIT_POINT`/`TOL_CRIT_POINT`.

use crate::trace::Verbosity;

/// Overrides for [`crate::equilibrium_solver`]'s outer iteration.
#[derive(Debug, Clone, Copy, Default)]
pub struct EquilibriumOptions {
    pub max_iter: Option<usize>,
    pub tol: Option<f64>,
    pub verbosity: Verbosity,
}

impl EquilibriumOptions {
    pub fn unwrap_or(&self, max_iter: usize, tol: f64) -> (usize, f64, Verbosity) {
        (
            self.max_iter.unwrap_or(max_iter),
            self.tol.unwrap_or(tol),
            self.verbosity,
        )
    }
}

/// Overrides for [`crate::performance`]'s throat/exit loops.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerformanceOptions {
    pub throat_max_iter: Option<usize>,
    pub exit_max_iter: Option<usize>,
    pub verbosity: Verbosity,
}
