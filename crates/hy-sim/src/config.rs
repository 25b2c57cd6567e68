//! Solver configuration.

use crate::error::{SimError, SimResult};
use hy_core::{Tolerances, ensure_positive};

/// Step primitive used by the control loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Method {
    /// Explicit Euler, one right-hand-side call per step.
    ForwardEuler,
    /// Classical 4th-order Runge-Kutta, fixed step.
    Rk4,
    /// Adaptive L-stable Rosenbrock method with event bisection.
    #[default]
    Rosenbrock,
}

impl Method {
    pub fn name(self) -> &'static str {
        match self {
            Method::ForwardEuler => "forward_euler",
            Method::Rk4 => "rk4",
            Method::Rosenbrock => "rosenbrock",
        }
    }
}

/// Quasi-steady-state relaxation settings.
#[derive(Clone, Debug, PartialEq)]
pub struct FastProcessConfig {
    pub abs_tol: f64,
    pub rel_tol: f64,
    /// Relaxation gives up with a warning after this many steps.
    pub max_iterations: usize,
    /// Step growth per relaxation iteration.
    pub growth: f64,
    /// Largest relaxation step as a multiple of the base step size.
    pub max_step_multiple: f64,
}

impl Default for FastProcessConfig {
    fn default() -> Self {
        Self {
            abs_tol: 1e-6,
            rel_tol: 1e-6,
            max_iterations: 10_000,
            growth: 10.0,
            max_step_multiple: 1e6,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SolverConfig {
    /// Sub-step size of the control loop (and initial stage size guess).
    pub step_size: f64,
    pub tolerances: Tolerances,
    /// Clamp negative state components to zero after every step.
    pub nonnegative: bool,
    pub include_intermediates: bool,
    pub h_min: f64,
    pub h_max: f64,
    /// Stages are never bisected below this size when locating events.
    pub event_precision: f64,
    /// Relaxation moving the state by more than this triggers a bisection.
    pub fast_threshold: f64,
    /// Relative perturbation of the finite-difference Jacobian.
    pub jacobian_epsilon: f64,
    /// Seed of the simultaneous-event tie-break.
    pub event_seed: u64,
    /// Keep a [`StageRecord`](crate::StageRecord) per attempted stage.
    pub record_stages: bool,
    pub fast: FastProcessConfig,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            step_size: 0.01,
            tolerances: Tolerances::new(1e-10, 1e-6),
            nonnegative: false,
            include_intermediates: false,
            h_min: 1e-12,
            h_max: f64::INFINITY,
            event_precision: 1e-7,
            fast_threshold: 1e-3,
            jacobian_epsilon: 1e-6,
            event_seed: 0,
            record_stages: false,
            fast: FastProcessConfig::default(),
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> SimResult<()> {
        ensure_positive(self.step_size, "step_size")?;
        self.tolerances.validate()?;
        ensure_positive(self.h_min, "h_min")?;
        if !(self.h_max > 0.0) {
            return Err(SimError::InvalidArg {
                what: "h_max must be positive",
            });
        }
        if self.h_min > self.h_max {
            return Err(SimError::InvalidArg {
                what: "h_min exceeds h_max",
            });
        }
        ensure_positive(self.event_precision, "event_precision")?;
        ensure_positive(self.fast_threshold, "fast_threshold")?;
        ensure_positive(self.jacobian_epsilon, "jacobian_epsilon")?;
        ensure_positive(self.fast.growth, "fast.growth")?;
        ensure_positive(self.fast.max_step_multiple, "fast.max_step_multiple")?;
        if self.fast.max_iterations == 0 {
            return Err(SimError::InvalidArg {
                what: "fast.max_iterations must be positive",
            });
        }
        Tolerances::new(self.fast.abs_tol, self.fast.rel_tol).validate()?;
        Ok(())
    }
}
