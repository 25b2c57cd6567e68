//! Dense numerical kernels for implicit integration stages.
//!
//! This crate provides the linear-algebra building blocks used by the
//! Rosenbrock step engine: forward-difference Jacobians of a right-hand side,
//! the explicit time derivative, LU factorization of the stage matrix
//! `I/(γh) − J`, and the method coefficients.

pub mod error;
pub mod jacobian;
pub mod linear;
pub mod tableau;

pub use error::{SolverError, SolverResult};
pub use jacobian::{forward_difference_jacobian, forward_difference_time_derivative};
pub use linear::StageMatrix;
