//! Finite difference Jacobian computation.

use hy_core::Real;
use nalgebra::{DMatrix, DVector};

/// Compute `∂f/∂y` using second-order forward differences.
///
/// For each column j, perturbs y[j] by `+δ` and `+2δ` and combines
/// `(-3 f(y) + 4 f(y+δ) - f(y+2δ)) / 2δ`, where `δ = epsilon * max(|y[j]|, 1)`.
/// `f0` must hold `f(t, y)`. Columns of non-finite components are left zero.
pub fn forward_difference_jacobian<F, E>(
    t: Real,
    y: &[Real],
    f0: &[Real],
    mut f: F,
    epsilon: Real,
) -> Result<DMatrix<Real>, E>
where
    F: FnMut(Real, &[Real], &mut [Real]) -> Result<(), E>,
{
    let n = y.len();
    let m = f0.len();

    let mut jac = DMatrix::zeros(m, n);
    let mut y_perturbed = y.to_vec();
    let mut f1 = vec![0.0; m];
    let mut f2 = vec![0.0; m];

    for j in 0..n {
        if !y[j].is_finite() {
            continue;
        }
        // Use the representable increment so the divisor matches the actual perturbation.
        let dx = (y[j] + epsilon * y[j].abs().max(1.0)) - y[j];

        y_perturbed[j] = y[j] + dx;
        f(t, &y_perturbed, &mut f1)?;
        y_perturbed[j] = y[j] + 2.0 * dx;
        f(t, &y_perturbed, &mut f2)?;
        y_perturbed[j] = y[j];

        for i in 0..m {
            jac[(i, j)] = (4.0 * f1[i] - 3.0 * f0[i] - f2[i]) / (2.0 * dx);
        }
    }

    Ok(jac)
}

/// Compute the explicit time derivative `∂f/∂t` with the same
/// second-order forward stencil as [`forward_difference_jacobian`].
pub fn forward_difference_time_derivative<F, E>(
    t: Real,
    y: &[Real],
    f0: &[Real],
    mut f: F,
    epsilon: Real,
) -> Result<DVector<Real>, E>
where
    F: FnMut(Real, &[Real], &mut [Real]) -> Result<(), E>,
{
    let m = f0.len();
    let dt = (t + epsilon * t.abs().max(1.0)) - t;

    let mut f1 = vec![0.0; m];
    let mut f2 = vec![0.0; m];
    f(t + dt, y, &mut f1)?;
    f(t + 2.0 * dt, y, &mut f2)?;

    Ok(DVector::from_fn(m, |i, _| {
        (4.0 * f1[i] - 3.0 * f0[i] - f2[i]) / (2.0 * dt)
    }))
}
