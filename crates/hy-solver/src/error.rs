//! Error types for linear-algebra kernels.

use thiserror::Error;

/// Errors that can occur while building or solving stage systems.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("Singular stage matrix (n={n}, h={h})")]
    Singular { n: usize, h: f64 },

    #[error("Dimension mismatch: {what} (expected={expected}, found={found})")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
}

pub type SolverResult<T> = Result<T, SolverError>;
