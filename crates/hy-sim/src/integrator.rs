//! Step primitives.
//!
//! A [`StepMethod`] advances a state by a given amount of simulated time and
//! reports the net change. The fixed-step methods take one step of that size;
//! the Rosenbrock engine bridges it with adaptive internal stages.

use crate::config::{Method, SolverConfig};
use crate::delay::{self, History};
use crate::error::SimResult;
use crate::events::EventStateMachine;
use crate::model::{Capabilities, OdeModel};
use crate::rules::RuleSet;
use crate::solver::Solver;
use crate::stats::{SolverStats, StageRecord};

/// Steps never overshoot a target time by more than this.
pub const LANDING_TOLERANCE: f64 = 1e-14;

/// Everything a step primitive may touch besides its own scratch space.
pub struct StepContext<'a> {
    pub(crate) model: &'a mut dyn OdeModel,
    pub(crate) caps: Capabilities,
    pub(crate) config: &'a SolverConfig,
    pub(crate) method: Method,
    pub(crate) rules: &'a RuleSet,
    pub(crate) events: Option<&'a mut EventStateMachine>,
    /// Lazily created clone used for relaxation and delay look-back. Never
    /// shares buffers with the caller.
    pub(crate) aux: &'a mut Option<Box<Solver>>,
    pub(crate) history: Option<History<'a>>,
    pub(crate) stats: &'a mut SolverStats,
    pub(crate) stage_log: Option<&'a mut Vec<StageRecord>>,
}

impl StepContext<'_> {
    pub fn config(&self) -> &SolverConfig {
        self.config
    }

    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    /// Evaluate the full right-hand side at `(t, y)`: delayed values are
    /// resolved first, rate rules are applied after the model's derivatives.
    pub fn evaluate_rhs(&mut self, t: f64, y: &[f64], ydot: &mut [f64]) -> SimResult<()> {
        if self.caps.delays {
            delay::supply_delayed_values(self, t, y)?;
        }
        self.model.compute_derivatives(t, y, ydot)?;
        if self.rules.has_rate_rules() {
            if let Some(em) = self.model.event_model() {
                self.rules.apply_rate_rules(em, t, y, ydot)?;
            }
        }
        self.stats.rhs_evaluations += 1;
        Ok(())
    }
}

/// Trait for step primitives driven by the control loop.
pub trait StepMethod: Send {
    fn name(&self) -> &'static str;

    /// Whether the method runs the event state machine itself.
    fn handles_events(&self) -> bool {
        false
    }

    /// Advance `y` from `t` by exactly `h`, writing `y(t + h) - y(t)` to
    /// `change`. `steady_state` is set while relaxing a fast subsystem.
    fn compute_change(
        &mut self,
        ctx: &mut StepContext<'_>,
        y: &[f64],
        t: f64,
        h: f64,
        change: &mut [f64],
        steady_state: bool,
    ) -> SimResult<()>;
}

/// Forward Euler (explicit, 1st order).
/// Calls the right-hand side once per step.
#[derive(Clone, Debug, Default)]
pub struct ForwardEuler;

impl StepMethod for ForwardEuler {
    fn name(&self) -> &'static str {
        "forward_euler"
    }

    fn compute_change(
        &mut self,
        ctx: &mut StepContext<'_>,
        y: &[f64],
        t: f64,
        h: f64,
        change: &mut [f64],
        _steady_state: bool,
    ) -> SimResult<()> {
        ctx.evaluate_rhs(t, y, change)?;
        for c in change.iter_mut() {
            *c *= h;
        }
        Ok(())
    }
}

/// Classical RK4 (Runge-Kutta 4th order).
#[derive(Clone, Debug, Default)]
pub struct Rk4 {
    k1: Vec<f64>,
    k2: Vec<f64>,
    k3: Vec<f64>,
    k4: Vec<f64>,
    tmp: Vec<f64>,
}

impl Rk4 {
    fn ensure_dimension(&mut self, n: usize) {
        if self.k1.len() != n {
            for v in [
                &mut self.k1,
                &mut self.k2,
                &mut self.k3,
                &mut self.k4,
                &mut self.tmp,
            ] {
                *v = vec![0.0; n];
            }
        }
    }
}

impl StepMethod for Rk4 {
    fn name(&self) -> &'static str {
        "rk4"
    }

    fn compute_change(
        &mut self,
        ctx: &mut StepContext<'_>,
        y: &[f64],
        t: f64,
        h: f64,
        change: &mut [f64],
        _steady_state: bool,
    ) -> SimResult<()> {
        let n = y.len();
        self.ensure_dimension(n);

        ctx.evaluate_rhs(t, y, &mut self.k1)?;

        for i in 0..n {
            self.tmp[i] = y[i] + 0.5 * h * self.k1[i];
        }
        ctx.evaluate_rhs(t + 0.5 * h, &self.tmp, &mut self.k2)?;

        for i in 0..n {
            self.tmp[i] = y[i] + 0.5 * h * self.k2[i];
        }
        ctx.evaluate_rhs(t + 0.5 * h, &self.tmp, &mut self.k3)?;

        for i in 0..n {
            self.tmp[i] = y[i] + h * self.k3[i];
        }
        ctx.evaluate_rhs(t + h, &self.tmp, &mut self.k4)?;

        // dy = (h/6) * (k1 + 2*k2 + 2*k3 + k4)
        for i in 0..n {
            change[i] =
                h / 6.0 * (self.k1[i] + 2.0 * self.k2[i] + 2.0 * self.k3[i] + self.k4[i]);
        }
        Ok(())
    }
}
