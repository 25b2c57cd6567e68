//! Error types for simulation operations.

use hy_results::ResultTable;
use thiserror::Error;

/// Errors encountered while integrating a model.
///
/// Numerical instability is not an error: it is recorded as a sticky flag on
/// the solver. Cancellation is not an error either.
///
/// A fatal error raised after the first row was recorded comes back as
/// [`SimError::Aborted`], which carries the rows written so far.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("Dimension mismatch: model has {expected} components, got {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Singular Jacobian at t={t} (stage size {h})")]
    SingularJacobian { t: f64, h: f64 },

    #[error("Tolerance unattainable at t={t}: stage size {h} below minimum")]
    ToleranceUnattainable { t: f64, h: f64 },

    #[error("Model evaluation failed: {message}")]
    Evaluation { message: String },

    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Core error: {0}")]
    Core(#[from] hy_core::CoreError),

    #[error("Results error: {0}")]
    Results(#[from] hy_results::ResultsError),

    #[error("Solve aborted after {} rows: {source}", .table.len())]
    Aborted {
        /// Rows recorded before the failure.
        table: Box<ResultTable>,
        source: Box<SimError>,
    },
}

pub type SimResult<T> = Result<T, SimError>;

impl SimError {
    pub fn evaluation(message: impl Into<String>) -> Self {
        SimError::Evaluation {
            message: message.into(),
        }
    }

    /// The error that stopped the run, looking through [`SimError::Aborted`].
    pub fn root(&self) -> &SimError {
        match self {
            SimError::Aborted { source, .. } => source.root(),
            other => other,
        }
    }

    /// Rows recorded before a fatal error, if any were.
    pub fn partial_table(&self) -> Option<&ResultTable> {
        match self {
            SimError::Aborted { table, .. } => Some(table.as_ref()),
            _ => None,
        }
    }

    /// Attach the current time to a linear-algebra failure.
    pub(crate) fn from_solver(e: hy_solver::SolverError, t: f64) -> Self {
        match e {
            hy_solver::SolverError::Singular { h, .. } => SimError::SingularJacobian { t, h },
            hy_solver::SolverError::DimensionMismatch {
                expected, found, ..
            } => SimError::DimensionMismatch { expected, found },
        }
    }
}
