//! Error type for the command line front-end.

use std::path::PathBuf;

/// Unified error for every command, wrapping the backend crates' errors.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Config error: {0}")]
    Project(String),

    #[error("Unknown model kind: {0}")]
    UnknownModel(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Simulation error: {0}")]
    Simulation(String),

    #[error("Results error: {0}")]
    Results(String),

    #[error("Failed to write output file: {path}")]
    OutputWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CliResult<T> = Result<T, CliError>;

impl From<hy_project::ProjectError> for CliError {
    fn from(err: hy_project::ProjectError) -> Self {
        CliError::Project(err.to_string())
    }
}

impl From<hy_sim::SimError> for CliError {
    fn from(err: hy_sim::SimError) -> Self {
        CliError::Simulation(err.to_string())
    }
}

impl From<hy_results::ResultsError> for CliError {
    fn from(err: hy_results::ResultsError) -> Self {
        CliError::Results(err.to_string())
    }
}
