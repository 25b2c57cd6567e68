//! Delayed-value resolution.
//!
//! Past values come from the rows recorded so far. Look-backs before the
//! first row are answered by integrating the auxiliary solver forward from the
//! initial state, with the model's delays switched off.

use crate::error::SimResult;
use crate::integrator::StepContext;
use crate::solver::Solver;
use hy_results::ResultTable;

/// Recorded trajectory available to delay look-ups.
#[derive(Debug, Clone, Copy)]
pub struct History<'a> {
    pub table: &'a ResultTable,
    /// State at `start`, before any row was recorded.
    pub initial: &'a [f64],
    pub start: f64,
}

impl<'a> History<'a> {
    pub fn new(table: &'a ResultTable, initial: &'a [f64], start: f64) -> Self {
        Self {
            table,
            initial,
            start,
        }
    }
}

/// Collect the model's delayed queries for `(t, y)`, resolve them and hand
/// the values back before the derivatives are evaluated.
pub(crate) fn supply_delayed_values(
    ctx: &mut StepContext<'_>,
    t: f64,
    y: &[f64],
) -> SimResult<()> {
    let queries = match ctx.model.delay_model() {
        Some(dm) if dm.delays_included() => dm.delayed_queries(t, y)?,
        _ => return Ok(()),
    };
    if queries.is_empty() {
        return Ok(());
    }

    let mut values = Vec::with_capacity(queries.len());
    for query in &queries {
        values.push(resolve(ctx, query.time, query.component, t, y));
    }
    if let Some(dm) = ctx.model.delay_model() {
        dm.supply_delayed_values(&values);
    }
    Ok(())
}

/// Value of `component` at `time`, seen from the point `(t, y)` currently
/// being evaluated. Unresolvable values are NaN.
pub(crate) fn resolve(
    ctx: &mut StepContext<'_>,
    time: f64,
    component: usize,
    t: f64,
    y: &[f64],
) -> f64 {
    if component >= y.len() || !time.is_finite() {
        tracing::warn!(time, component, "delayed value query is out of range");
        return f64::NAN;
    }
    if time >= t {
        return y[component];
    }
    let Some(history) = ctx.history else {
        tracing::warn!(time, component, "no recorded history for delayed value");
        return f64::NAN;
    };

    if let Some(v) = history.table.value_at(time, component) {
        return finite_or_nan(v, time, component);
    }

    let first = history.table.first_time().unwrap_or(history.start);
    if time < first {
        return look_back(ctx, history, time, component);
    }

    // Between the last recorded row and the current point.
    let (t0, v0) = history
        .table
        .last_row()
        .map(|row| (row.time, row.values[component]))
        .unwrap_or((history.start, history.initial[component]));
    let w = (time - t0) / (t - t0);
    finite_or_nan(v0 + w * (y[component] - v0), time, component)
}

/// Integrate the auxiliary solver from the initial state for the look-back
/// duration `start - time`.
fn look_back(ctx: &mut StepContext<'_>, history: History<'_>, time: f64, component: usize) -> f64 {
    let duration = history.start - time;
    let previous = ctx.model.delay_model().map(|dm| {
        let included = dm.delays_included();
        dm.set_delays_included(false);
        included
    });

    let aux = ctx
        .aux
        .get_or_insert_with(|| Box::new(Solver::new(ctx.method, ctx.config.clone())));
    let result = aux.advance(
        &mut *ctx.model,
        ctx.caps,
        ctx.rules,
        history.initial,
        history.start,
        history.start + duration,
    );

    if let (Some(included), Some(dm)) = (previous, ctx.model.delay_model()) {
        dm.set_delays_included(included);
    }

    match result {
        Ok(state) => finite_or_nan(state[component], time, component),
        Err(e) => {
            tracing::warn!(time, component, error = %e, "delayed value look-back failed");
            f64::NAN
        }
    }
}

fn finite_or_nan(v: f64, time: f64, component: usize) -> f64 {
    if v.is_finite() {
        v
    } else {
        tracing::warn!(time, component, "delayed value is not finite");
        f64::NAN
    }
}
