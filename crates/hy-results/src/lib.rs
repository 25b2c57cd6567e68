//! hy-results: result tables, run cache and timeseries storage.

pub mod hash;
pub mod store;
pub mod table;
pub mod types;

pub use hash::compute_run_id;
pub use store::RunStore;
pub use table::{ResultRow, ResultTable};
pub use types::*;

pub type ResultsResult<T> = Result<T, ResultsError>;

#[derive(thiserror::Error, Debug)]
pub enum ResultsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Run not found: {run_id}")]
    RunNotFound { run_id: String },

    #[error("Invalid path: {message}")]
    InvalidPath { message: String },

    #[error("Row shape mismatch: {what} (expected={expected}, found={found})")]
    Shape {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Rows must be written in increasing time order (previous={previous}, time={time})")]
    NonMonotonic { previous: f64, time: f64 },
}
