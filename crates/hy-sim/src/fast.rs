//! Quasi-steady-state relaxation of fast subsystems.

use crate::delay::History;
use crate::error::SimResult;
use crate::integrator::StepContext;
use crate::model::{Capabilities, OdeModel};
use crate::rules::RuleSet;
use crate::solver::Solver;
use hy_core::Tolerances;

/// Result of relaxing a state toward its quasi-steady state.
#[derive(Debug, Clone, PartialEq)]
pub struct Relaxation {
    pub state: Vec<f64>,
    pub iterations: usize,
    /// False when the iteration cap was reached first.
    pub converged: bool,
}

/// Keeps the model in fast-process mode for as long as it lives.
struct FastMode<'m> {
    model: &'m mut dyn OdeModel,
}

impl<'m> FastMode<'m> {
    fn enter(model: &'m mut dyn OdeModel) -> Self {
        if let Some(fm) = model.fast_process_model() {
            fm.set_fast_process_computation(true);
        }
        Self { model }
    }
}

impl Drop for FastMode<'_> {
    fn drop(&mut self) {
        if let Some(fm) = self.model.fast_process_model() {
            fm.set_fast_process_computation(false);
        }
    }
}

/// Relax `y` on the context's auxiliary solver.
pub(crate) fn relax(ctx: &mut StepContext<'_>, y: &[f64], t: f64) -> SimResult<Relaxation> {
    ctx.stats.fast_relaxations += 1;
    let aux = ctx
        .aux
        .get_or_insert_with(|| Box::new(Solver::new(ctx.method, ctx.config.clone())));
    aux.relax_fast(&mut *ctx.model, ctx.caps, ctx.rules, ctx.history, y, t)
}

impl Solver {
    /// Repeat the step primitive from `(t, y)` with geometrically growing
    /// steps until the state stops moving.
    ///
    /// Converged when every finite component changes by at most
    /// `abs_tol + rel_tol * |y|` in one iteration. Hitting the iteration cap
    /// logs a warning and returns the last state.
    pub(crate) fn relax_fast(
        &mut self,
        model: &mut dyn OdeModel,
        caps: Capabilities,
        rules: &RuleSet,
        history: Option<History<'_>>,
        y: &[f64],
        t: f64,
    ) -> SimResult<Relaxation> {
        let fast = self.config().fast.clone();
        let tolerance = Tolerances::new(fast.abs_tol, fast.rel_tol);
        let base = self.config().step_size;
        let cap = base * fast.max_step_multiple;

        let mode = FastMode::enter(model);
        let ignored: Vec<bool> = y.iter().map(|v| !v.is_finite()).collect();
        let mut state = y.to_vec();
        let mut change = vec![0.0; y.len()];
        let mut h = base;

        for iteration in 1..=fast.max_iterations {
            {
                let (engine, mut ctx) = self.split(&mut *mode.model, caps, rules, None, history);
                engine.compute_change(&mut ctx, &state, t, h, &mut change, true)?;
            }
            let converged = change
                .iter()
                .zip(&state)
                .zip(&ignored)
                .all(|((d, s), &skip)| skip || tolerance.accepts(*d, *s));
            for (s, d) in state.iter_mut().zip(&change) {
                *s += d;
            }
            if converged {
                return Ok(Relaxation {
                    state,
                    iterations: iteration,
                    converged: true,
                });
            }
            h = (h * fast.growth).min(cap);
        }

        tracing::warn!(
            t,
            iterations = fast.max_iterations,
            "fast-process relaxation did not converge, using last state"
        );
        Ok(Relaxation {
            state,
            iterations: fast.max_iterations,
            converged: false,
        })
    }
}
