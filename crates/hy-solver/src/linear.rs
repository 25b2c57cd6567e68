//! Stage matrix factorization for implicit stages.

use crate::error::{SolverError, SolverResult};
use hy_core::Real;
use nalgebra::{DMatrix, DVector, Dyn, LU};

/// LU factorization of the Rosenbrock stage matrix `A = I/(γh) − J`.
///
/// Factorized once per stage size and reused for every stage solve.
pub struct StageMatrix {
    lu: LU<Real, Dyn, Dyn>,
    n: usize,
    h: Real,
}

impl StageMatrix {
    /// Form `I/(γh) − J` and factorize it.
    pub fn factorize(jacobian: &DMatrix<Real>, gamma: Real, h: Real) -> SolverResult<Self> {
        let n = jacobian.nrows();
        if jacobian.ncols() != n {
            return Err(SolverError::DimensionMismatch {
                what: "jacobian must be square",
                expected: n,
                found: jacobian.ncols(),
            });
        }

        let mut a = -jacobian;
        let diag = 1.0 / (gamma * h);
        for i in 0..n {
            a[(i, i)] += diag;
        }

        let lu = a.lu();
        if !lu.is_invertible() {
            tracing::trace!(n, h, "stage matrix is singular");
            return Err(SolverError::Singular { n, h });
        }
        Ok(Self { lu, n, h })
    }

    /// Stage size this factorization was built for.
    pub fn step(&self) -> Real {
        self.h
    }

    pub fn dim(&self) -> usize {
        self.n
    }

    /// Solve `A x = b`, overwriting `b` with `x`.
    pub fn solve_in_place(&self, b: &mut DVector<Real>) -> SolverResult<()> {
        if b.len() != self.dim() {
            return Err(SolverError::DimensionMismatch {
                what: "stage right-hand side",
                expected: self.dim(),
                found: b.len(),
            });
        }
        if self.lu.solve_mut(b) {
            Ok(())
        } else {
            Err(SolverError::Singular {
                n: self.dim(),
                h: self.h,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solves_diagonal_system() {
        // J = diag(-1, -2), gamma*h = 0.5 => A = diag(3, 4)
        let jac = DMatrix::from_row_slice(2, 2, &[-1.0, 0.0, 0.0, -2.0]);
        let m = StageMatrix::factorize(&jac, 0.25, 2.0).unwrap();
        let mut b = DVector::from_vec(vec![6.0, 8.0]);
        m.solve_in_place(&mut b).unwrap();
        assert!((b[0] - 2.0).abs() < 1e-12);
        assert!((b[1] - 2.0).abs() < 1e-12);
        assert_eq!(m.step(), 2.0);
    }

    #[test]
    fn singular_matrix_is_reported() {
        // J = I/(γh) makes A exactly zero
        let jac = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 2.0]);
        let err = StageMatrix::factorize(&jac, 0.25, 2.0).err().unwrap();
        assert!(matches!(err, SolverError::Singular { n: 2, .. }));
    }

    #[test]
    fn non_square_jacobian_rejected() {
        let jac = DMatrix::zeros(2, 3);
        assert!(matches!(
            StageMatrix::factorize(&jac, 0.25, 1.0),
            Err(SolverError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn rhs_length_checked() {
        let jac = DMatrix::zeros(2, 2);
        let m = StageMatrix::factorize(&jac, 0.25, 1.0).unwrap();
        let mut b = DVector::zeros(3);
        assert!(m.solve_in_place(&mut b).is_err());
    }
}
