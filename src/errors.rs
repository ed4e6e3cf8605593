use crate::linear_solver::SingularMatrix;
use crate::propellant_db::PropellantDbError;
use crate::thermo_db::ThermoDbError;
use thiserror::Error;

/// The stage of the solver pipeline a [`EqError::NoConvergence`] was raised from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Equilibrium,
    Throat,
    Exit,
    Temperature,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Equilibrium => "equilibrium",
            Stage::Throat => "throat",
            Stage::Exit => "exit",
            Stage::Temperature => "temperature",
        };
        write!(f, "{}", s)
    }
}

/// What kind of fixed capacity was exceeded while indexing a [`crate::case::Case`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    Elements,
    Species,
}

impl std::fmt::Display for Capacity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Capacity::Elements => "elements",
            Capacity::Species => "species",
        };
        write!(f, "{}", s)
    }
}

/// Error type for the equilibrium and performance solvers.
#[derive(Error, Debug)]
pub enum EqError {
    #[error("capacity exceeded: too many distinct {0}.")]
    CapacityExceeded(Capacity),
    #[error("singular matrix encountered (recovered = {recovered}).")]
    Singular { recovered: bool },
    #[error("`{stage}` did not converge within the maximum number of iterations.")]
    NoConvergence { stage: Stage },
    #[error("area ratio is out of range (must be > 1.0); no exit state computed.")]
    AreaRatioOutOfRange,
    #[error("performance solver aborted: chamber equilibrium did not converge.")]
    NoEquilibrium,
    #[error(transparent)]
    ThermoDb(#[from] ThermoDbError),
    #[error(transparent)]
    PropellantDb(#[from] PropellantDbError),
    #[error(transparent)]
    Singularity(#[from] SingularMatrix),
}

/// Convenience type for `Result<T, EqError>`.
pub type EqResult<T> = Result<T, EqError>;
