//! Opt-in iteration tracing, independent of any external logging crate.
//!
//! Mirrors the way the teacher's `critical_point_hkm` prints a one-line-per-
//! iteration trace gated on a verbosity level: no external logger, just a
//! `println!` gated on an enum that the caller passes in through
//! [`crate::options::EquilibriumOptions`].

/// Controls how much the solvers print while iterating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Print nothing.
    #[default]
    None,
    /// Print one line per outer iteration.
    Iter,
    /// Print only the final convergence line.
    Result,
}

impl Verbosity {
    pub fn prints_iter(self) -> bool {
        matches!(self, Verbosity::Iter)
    }

    pub fn prints_result(self) -> bool {
        matches!(self, Verbosity::Iter | Verbosity::Result)
    }
}

/// Print a line if `verbosity` requests per-iteration output.
macro_rules! log_iter {
    ($verbosity:expr, $($arg:tt)*) => {
        if $crate::trace::Verbosity::prints_iter($verbosity) {
            println!($($arg)*);
        }
    };
}

/// Print a line if `verbosity` requests at least the final result.
macro_rules! log_result {
    ($verbosity:expr, $($arg:tt)*) => {
        if $crate::trace::Verbosity::prints_result($verbosity) {
            println!($($arg)*);
        }
    };
}

pub(crate) use log_iter;
pub(crate) use log_result;
