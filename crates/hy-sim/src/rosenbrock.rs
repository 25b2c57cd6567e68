// Reference:
//   W. H. Press et al., "Numerical Recipes" (3rd ed.), §17.5.1, StepperRoss
//   E. Hairer & G. Wanner, "Solving Ordinary Differential Equations II", §IV.7

//! Adaptive Rosenbrock engine.
//!
//! [`Rosenbrock::compute_change`] advances by an arbitrary macro-step using a
//! sequence of internal stages. After every accepted stage the event state
//! machine runs at the stage end; a firing or execution rolls the stage back
//! and retries with a tenth of the size until the stage is no larger than the
//! event precision. Models with fast processes get the same treatment when
//! relaxing the fast subsystem would move the state.

use crate::error::{SimError, SimResult};
use crate::events::EventStateMachine;
use crate::fast;
use crate::integrator::{LANDING_TOLERANCE, StepContext, StepMethod};
use crate::stats::StageRecord;
use hy_solver::tableau::*;
use hy_solver::{StageMatrix, forward_difference_jacobian, forward_difference_time_derivative};
use nalgebra::DVector;

const SAFETY: f64 = 0.9;
/// Smallest and largest stage size ratios between consecutive stages.
const FAC1: f64 = 1.0 / 6.0;
const FAC2: f64 = 5.0;
/// Shrink factor after a stage overflowed or produced NaN.
const OVERFLOW_SHRINK: f64 = 0.5;

/// Stage size ratio for a weighted error norm.
fn controller_factor(error: f64) -> f64 {
    if error == 0.0 {
        return FAC2;
    }
    (SAFETY * error.powf(-ERROR_EXPONENT)).clamp(FAC1, FAC2)
}

struct Trial {
    y_new: Vec<f64>,
    error: f64,
    overflow: bool,
}

/// Stiffly accurate 4(3) Rosenbrock method.
#[derive(Debug, Default)]
pub struct Rosenbrock {
    n: usize,
    /// Stage size carried over to the next macro-step.
    h_next: Option<f64>,
    f0: Vec<f64>,
    f_stage: Vec<f64>,
    y_stage: Vec<f64>,
}

impl Rosenbrock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage size the next call will start from, if any call happened yet.
    pub fn next_stage_size(&self) -> Option<f64> {
        self.h_next
    }

    fn ensure_dimension(&mut self, n: usize) {
        if self.n != n || self.f0.len() != n {
            self.n = n;
            self.h_next = None;
            self.f0 = vec![0.0; n];
            self.f_stage = vec![0.0; n];
            self.y_stage = vec![0.0; n];
        }
    }

    /// One Rosenbrock stage of size `h` from `(t, y)`.
    fn attempt(
        &mut self,
        ctx: &mut StepContext<'_>,
        t: f64,
        y: &[f64],
        h: f64,
        ignored: &[bool],
    ) -> SimResult<Trial> {
        let eps = ctx.config.jacobian_epsilon;
        ctx.evaluate_rhs(t, y, &mut self.f0)?;
        let jac = forward_difference_jacobian(
            t,
            y,
            &self.f0,
            |tt, yy, out| ctx.evaluate_rhs(tt, yy, out),
            eps,
        )?;
        let dfdt = forward_difference_time_derivative(
            t,
            y,
            &self.f0,
            |tt, yy, out| ctx.evaluate_rhs(tt, yy, out),
            eps,
        )?;
        ctx.stats.jacobian_evaluations += 1;

        let lu = StageMatrix::factorize(&jac, GAMMA, h).map_err(|e| SimError::from_solver(e, t))?;
        ctx.stats.factorizations += 1;
        let solve = |mut b: DVector<f64>| -> SimResult<DVector<f64>> {
            lu.solve_in_place(&mut b)
                .map_err(|e| SimError::from_solver(e, t))?;
            Ok(b)
        };

        let f0 = DVector::from_column_slice(&self.f0);
        let k1 = solve(&f0 + &dfdt * (h * D1))?;

        combine(y, &[(A21, &k1)], &mut self.y_stage);
        ctx.evaluate_rhs(t + C2 * h, &self.y_stage, &mut self.f_stage)?;
        let f = DVector::from_column_slice(&self.f_stage);
        let k2 = solve(&f + &dfdt * (h * D2) + &k1 * (C21 / h))?;

        combine(y, &[(A31, &k1), (A32, &k2)], &mut self.y_stage);
        ctx.evaluate_rhs(t + C3 * h, &self.y_stage, &mut self.f_stage)?;
        let f = DVector::from_column_slice(&self.f_stage);
        let k3 = solve(&f + &dfdt * (h * D3) + (&k1 * C31 + &k2 * C32) / h)?;

        combine(y, &[(A41, &k1), (A42, &k2), (A43, &k3)], &mut self.y_stage);
        ctx.evaluate_rhs(t + C4 * h, &self.y_stage, &mut self.f_stage)?;
        let f = DVector::from_column_slice(&self.f_stage);
        let k4 = solve(&f + &dfdt * (h * D4) + (&k1 * C41 + &k2 * C42 + &k3 * C43) / h)?;

        combine(
            y,
            &[(A51, &k1), (A52, &k2), (A53, &k3), (A54, &k4)],
            &mut self.y_stage,
        );
        ctx.evaluate_rhs(t + h, &self.y_stage, &mut self.f_stage)?;
        let f = DVector::from_column_slice(&self.f_stage);
        let k5 = solve(&f + (&k1 * C51 + &k2 * C52 + &k3 * C53 + &k4 * C54) / h)?;

        for i in 0..y.len() {
            self.y_stage[i] += k5[i];
        }
        ctx.evaluate_rhs(t + h, &self.y_stage, &mut self.f_stage)?;
        let f = DVector::from_column_slice(&self.f_stage);
        let y_err =
            solve(&f + (&k1 * C61 + &k2 * C62 + &k3 * C63 + &k4 * C64 + &k5 * C65) / h)?;

        let y_new: Vec<f64> = (0..y.len()).map(|i| self.y_stage[i] + y_err[i]).collect();
        let overflow = y_new
            .iter()
            .zip(ignored)
            .any(|(v, &skip)| !skip && !v.is_finite());
        let error = ctx
            .config
            .tolerances
            .weighted_rms_error(y_err.as_slice(), y, &y_new, ignored);

        Ok(Trial {
            y_new,
            error,
            overflow: overflow || !error.is_finite(),
        })
    }

    /// Explicit Euler step across a remainder too short for a stage.
    fn nudge(
        &mut self,
        ctx: &mut StepContext<'_>,
        t: f64,
        dt: f64,
        state: &mut [f64],
    ) -> SimResult<()> {
        ctx.evaluate_rhs(t, state, &mut self.f0)?;
        for (s, f) in state.iter_mut().zip(&self.f0) {
            *s += dt * f;
        }
        Ok(())
    }
}

/// `out = y + Σ a_j k_j`
fn combine(y: &[f64], terms: &[(f64, &DVector<f64>)], out: &mut [f64]) {
    out.copy_from_slice(y);
    for (a, k) in terms {
        for i in 0..out.len() {
            out[i] += a * k[i];
        }
    }
}

fn log_stage(ctx: &mut StepContext<'_>, t: f64, h: f64, error: f64, accepted: bool) {
    if let Some(log) = ctx.stage_log.as_deref_mut() {
        log.push(StageRecord {
            t,
            h,
            error,
            accepted,
        });
    }
}

impl StepMethod for Rosenbrock {
    fn name(&self) -> &'static str {
        "rosenbrock"
    }

    fn handles_events(&self) -> bool {
        true
    }

    fn compute_change(
        &mut self,
        ctx: &mut StepContext<'_>,
        y: &[f64],
        t: f64,
        h: f64,
        change: &mut [f64],
        steady_state: bool,
    ) -> SimResult<()> {
        let n = y.len();
        self.ensure_dimension(n);

        let h_min = ctx.config.h_min;
        let h_max = ctx.config.h_max;
        let precision = ctx.config.event_precision.max(h_min);
        let fast_threshold = ctx.config.fast_threshold;

        let t_end = t + h;
        let ignored: Vec<bool> = y.iter().map(|v| !v.is_finite()).collect();
        let mut state = y.to_vec();
        let mut x = t;
        let mut stage = self
            .h_next
            .unwrap_or(ctx.config.step_size)
            .clamp(h_min, h_max);
        let mut after_reject = false;

        while t_end - x > LANDING_TOLERANCE {
            let remaining = t_end - x;
            if remaining <= h_min {
                self.nudge(ctx, x, remaining, &mut state)?;
                break;
            }

            let hs = stage.min(remaining);
            let trial = self.attempt(ctx, x, &state, hs, &ignored)?;
            let passed = !trial.overflow && trial.error <= 1.0;
            log_stage(ctx, x, hs, trial.error, passed);

            if !passed {
                ctx.stats.rejected_stages += 1;
                let factor = if trial.overflow {
                    OVERFLOW_SHRINK
                } else {
                    controller_factor(trial.error)
                };
                let shrunk = hs * factor;
                if shrunk < h_min {
                    return Err(SimError::ToleranceUnattainable { t: x, h: shrunk });
                }
                tracing::trace!(t = x, h = hs, error = trial.error, "stage rejected");
                stage = shrunk;
                after_reject = true;
                continue;
            }

            let x_new = if t_end - (x + hs) <= LANDING_TOLERANCE {
                t_end
            } else {
                x + hs
            };
            let mut accepted = trial.y_new;

            let snapshot = ctx.events.as_deref().map(EventStateMachine::snapshot);
            let mut discontinuity = false;
            let mut executed = 0;
            if let (Some(events), Some(em)) = (ctx.events.as_deref_mut(), ctx.model.event_model())
            {
                let outcome = events.process(em, ctx.rules, x_new, &mut accepted)?;
                discontinuity = outcome.is_discontinuity();
                executed = outcome.executed;
            }

            let mut bisect = discontinuity && hs > precision;
            if !discontinuity && !steady_state && ctx.caps.fast_processes {
                let relaxed = fast::relax(ctx, &accepted, x_new)?;
                let moved = relaxed
                    .state
                    .iter()
                    .zip(&accepted)
                    .any(|(r, a)| (r - a).abs() > fast_threshold * (1.0 + a.abs()));
                if moved {
                    if hs > precision {
                        bisect = true;
                    } else {
                        accepted = relaxed.state;
                    }
                }
            }

            if bisect {
                if let (Some(snapshot), Some(events), Some(em)) = (
                    snapshot,
                    ctx.events.as_deref_mut(),
                    ctx.model.event_model(),
                ) {
                    events.restore(em, snapshot)?;
                }
                ctx.stats.bisections += 1;
                stage = (hs / 10.0).max(precision);
                tracing::trace!(t = x, h = hs, next = stage, "bisecting stage");
                continue;
            }

            ctx.stats.events_executed += executed as u64;
            ctx.stats.accepted_stages += 1;
            state = accepted;
            x = x_new;

            let mut next = hs * controller_factor(trial.error);
            if after_reject {
                next = next.min(hs);
            }
            stage = next.clamp(h_min, h_max);
            after_reject = false;
        }

        self.h_next = Some(stage);
        for i in 0..n {
            change[i] = state[i] - y[i];
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controller_is_bounded() {
        assert_eq!(controller_factor(0.0), FAC2);
        assert_eq!(controller_factor(1e-30), FAC2);
        assert_eq!(controller_factor(1e30), FAC1);
        let f = controller_factor(1.0);
        assert!((f - SAFETY).abs() < 1e-15);
    }

    #[test]
    fn rejection_never_grows_the_stage() {
        for error in [1.0 + 1e-12, 1.5, 10.0, 1e6] {
            assert!(controller_factor(error) < 1.0);
        }
    }

    #[test]
    fn combine_adds_scaled_stages() {
        let k1 = DVector::from_vec(vec![1.0, 2.0]);
        let k2 = DVector::from_vec(vec![-1.0, 0.5]);
        let mut out = [0.0; 2];
        combine(&[10.0, 20.0], &[(2.0, &k1), (4.0, &k2)], &mut out);
        assert_eq!(out, [8.0, 26.0]);
    }
}
