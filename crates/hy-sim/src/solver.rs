//! Generic stepping control loop.
//!
//! [`Solver::solve`] advances a model through a list of reporting times,
//! delegating every sub-step to the configured [`StepMethod`] and recording
//! one row per reporting time.

use crate::config::{Method, SolverConfig};
use crate::delay::{self, History};
use crate::error::{SimError, SimResult};
use crate::events::EventStateMachine;
use crate::fast::{self, Relaxation};
use crate::integrator::{ForwardEuler, LANDING_TOLERANCE, Rk4, StepContext, StepMethod};
use crate::model::{Capabilities, OdeModel};
use crate::progress::{CancelToken, ProgressListener, SolveProgress};
use crate::rosenbrock::Rosenbrock;
use crate::rules::RuleSet;
use crate::stats::{SolverStats, StageRecord};
use hy_core::timing::Timer;
use hy_core::{Tolerances, ensure_positive};
use hy_results::{ResultRow, ResultTable};

fn engine_for(method: Method) -> Box<dyn StepMethod> {
    match method {
        Method::ForwardEuler => Box::new(ForwardEuler),
        Method::Rk4 => Box::new(Rk4::default()),
        Method::Rosenbrock => Box::new(Rosenbrock::new()),
    }
}

/// Capabilities and discrete machinery resolved from a model for one run.
struct Prepared {
    caps: Capabilities,
    rules: RuleSet,
    events: Option<EventStateMachine>,
}

fn prepare(model: &mut dyn OdeModel, seed: u64) -> SimResult<Prepared> {
    let caps = Capabilities::detect(model);
    let n = model.dimension();
    let mut rules = RuleSet::default();
    let mut events = None;
    if caps.events {
        if let Some(em) = model.event_model() {
            rules = RuleSet::from_model(em, n)?;
            events = Some(EventStateMachine::new(em, seed)?);
        }
    }
    Ok(Prepared {
        caps,
        rules,
        events,
    })
}

fn check_dimension(model: &dyn OdeModel, found: usize) -> SimResult<usize> {
    let expected = model.dimension();
    if expected != found {
        return Err(SimError::DimensionMismatch { expected, found });
    }
    Ok(expected)
}

fn validate_times(times: &[f64]) -> SimResult<()> {
    if times.is_empty() {
        return Err(SimError::InvalidArg {
            what: "at least one reporting time is required",
        });
    }
    if times.iter().any(|t| !t.is_finite()) {
        return Err(SimError::InvalidArg {
            what: "reporting times must be finite",
        });
    }
    if times.windows(2).any(|w| w[1] <= w[0]) {
        return Err(SimError::InvalidArg {
            what: "reporting times must be strictly increasing",
        });
    }
    Ok(())
}

/// Replace NaN that appeared in a previously finite component by zero and
/// clamp negatives when requested. Returns whether a new NaN was seen.
pub(crate) fn apply_safeguards(
    previous: &[f64],
    proposed: &mut [f64],
    nonnegative: bool,
) -> bool {
    let mut new_nan = false;
    for (p, v) in previous.iter().zip(proposed.iter_mut()) {
        if v.is_nan() && p.is_finite() {
            new_nan = true;
            *v = 0.0;
        }
        if nonnegative && *v < 0.0 {
            *v = 0.0;
        }
    }
    new_nan
}

fn record_row(
    model: &mut dyn OdeModel,
    table: &mut ResultTable,
    t: f64,
    y: &[f64],
) -> SimResult<()> {
    let mut intermediates = vec![0.0; table.intermediate_columns().len()];
    if !intermediates.is_empty() {
        model.compute_intermediates(t, y, &mut intermediates)?;
    }
    table.push_row(ResultRow {
        time: t,
        values: y.to_vec(),
        intermediates,
    })?;
    Ok(())
}

/// Per-point initial-condition overrides taken from an external table.
struct Schedule<'s> {
    table: &'s ResultTable,
    /// `(schedule column, state component)` pairs matched by identifier.
    columns: Vec<(usize, usize)>,
}

impl<'s> Schedule<'s> {
    fn new(table: &'s ResultTable, identifiers: &[String]) -> Self {
        let columns = table
            .columns()
            .iter()
            .enumerate()
            .filter_map(|(col, name)| {
                identifiers
                    .iter()
                    .position(|id| id == name)
                    .map(|comp| (col, comp))
            })
            .collect();
        Self { table, columns }
    }

    /// Finite scheduled values overwrite the state; NaN leaves it untouched.
    fn apply(&self, row: usize, y: &mut [f64]) {
        let Some(row) = self.table.row(row) else {
            return;
        };
        for &(col, comp) in &self.columns {
            let v = row.values[col];
            if v.is_finite() {
                y[comp] = v;
            }
        }
    }
}

/// Hybrid ODE solver instance.
///
/// Owns its step engine scratch space and a lazily created auxiliary clone
/// used for fast-process relaxation and delay look-back. One instance must
/// not be driven from two threads at once; independent instances are fully
/// independent.
pub struct Solver {
    method: Method,
    config: SolverConfig,
    engine: Box<dyn StepMethod>,
    unstable: bool,
    stats: SolverStats,
    stage_log: Vec<StageRecord>,
    aux: Option<Box<Solver>>,
    listeners: Vec<ProgressListener>,
    cancel: CancelToken,
}

impl Default for Solver {
    fn default() -> Self {
        Self::new(Method::default(), SolverConfig::default())
    }
}

impl Solver {
    pub fn new(method: Method, config: SolverConfig) -> Self {
        Self {
            method,
            config,
            engine: engine_for(method),
            unstable: false,
            stats: SolverStats::default(),
            stage_log: Vec::new(),
            aux: None,
            listeners: Vec::new(),
            cancel: CancelToken::new(),
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: SolverConfig) -> SimResult<()> {
        config.validate()?;
        self.config = config;
        self.sync_aux();
        Ok(())
    }

    pub fn step_size(&self) -> f64 {
        self.config.step_size
    }

    pub fn set_step_size(&mut self, step_size: f64) -> SimResult<()> {
        self.config.step_size = ensure_positive(step_size, "step_size")?;
        self.sync_aux();
        Ok(())
    }

    pub fn tolerances(&self) -> Tolerances {
        self.config.tolerances
    }

    pub fn set_tolerances(&mut self, tolerances: Tolerances) -> SimResult<()> {
        tolerances.validate()?;
        self.config.tolerances = tolerances;
        self.sync_aux();
        Ok(())
    }

    pub fn is_nonnegative(&self) -> bool {
        self.config.nonnegative
    }

    pub fn set_nonnegative(&mut self, nonnegative: bool) {
        self.config.nonnegative = nonnegative;
        self.sync_aux();
    }

    pub fn include_intermediates(&self) -> bool {
        self.config.include_intermediates
    }

    pub fn set_include_intermediates(&mut self, include: bool) {
        self.config.include_intermediates = include;
    }

    /// Set once a NaN appeared in a previously finite component. Never
    /// cleared for the lifetime of the instance.
    pub fn is_unstable(&self) -> bool {
        self.unstable
    }

    pub fn stats(&self) -> SolverStats {
        self.stats
    }

    /// Stages attempted by the adaptive engine during the latest run, when
    /// `record_stages` is set.
    pub fn stage_log(&self) -> &[StageRecord] {
        &self.stage_log
    }

    /// Register a callback fired once per reporting point.
    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: FnMut(&SolveProgress<'_>) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn sync_aux(&mut self) {
        let config = self.config.clone();
        if let Some(aux) = self.aux.as_mut() {
            aux.config = config;
            aux.sync_aux();
        }
    }

    /// Integrate `model` from `initial` through `times`, one row per time.
    pub fn solve(
        &mut self,
        model: &mut dyn OdeModel,
        initial: &[f64],
        times: &[f64],
    ) -> SimResult<ResultTable> {
        self.run(model, initial, times, None)
    }

    /// Integrate over `points` evenly spaced times from `start` to `end`.
    pub fn solve_grid(
        &mut self,
        model: &mut dyn OdeModel,
        initial: &[f64],
        start: f64,
        end: f64,
        points: usize,
    ) -> SimResult<ResultTable> {
        if points < 2 {
            return Err(SimError::InvalidArg {
                what: "a grid needs at least two points",
            });
        }
        if !(end > start) {
            return Err(SimError::InvalidArg {
                what: "grid end must exceed start",
            });
        }
        let dt = (end - start) / (points - 1) as f64;
        let times: Vec<f64> = (0..points)
            .map(|i| {
                if i == points - 1 {
                    end
                } else {
                    start + i as f64 * dt
                }
            })
            .collect();
        self.run(model, initial, &times, None)
    }

    /// Integrate over the schedule's times, overwriting state components with
    /// the schedule's finite values (matched by column name) at every point.
    pub fn solve_with_schedule(
        &mut self,
        model: &mut dyn OdeModel,
        initial: &[f64],
        schedule: &ResultTable,
    ) -> SimResult<ResultTable> {
        let identifiers = model.identifiers();
        let overrides = Schedule::new(schedule, &identifiers);
        tracing::debug!(
            matched = overrides.columns.len(),
            columns = schedule.columns().len(),
            "schedule columns matched to state"
        );
        let times = schedule.times();
        self.run(model, initial, &times, Some(&overrides))
    }

    fn run(
        &mut self,
        model: &mut dyn OdeModel,
        initial: &[f64],
        times: &[f64],
        schedule: Option<&Schedule<'_>>,
    ) -> SimResult<ResultTable> {
        self.config.validate()?;
        validate_times(times)?;
        let n = check_dimension(model, initial.len())?;
        let columns = model.identifiers();
        if columns.len() != n {
            return Err(SimError::InvalidArg {
                what: "model identifiers must match its dimension",
            });
        }

        let Prepared {
            caps,
            rules,
            mut events,
        } = prepare(model, self.config.event_seed)?;
        let intermediate_columns = if self.config.include_intermediates {
            model.intermediate_identifiers()
        } else {
            Vec::new()
        };
        let mut table = ResultTable::with_intermediates(columns, intermediate_columns);

        self.stats = SolverStats::default();
        self.stage_log.clear();
        let timer = Timer::start("solve");
        tracing::debug!(
            method = self.engine.name(),
            dimension = n,
            points = times.len(),
            events = caps.events,
            fast = caps.fast_processes,
            delays = caps.delays,
            "starting solve"
        );

        let mut y = initial.to_vec();
        if let Some(schedule) = schedule {
            schedule.apply(0, &mut y);
        }
        if let (Some(events), Some(em)) = (events.as_mut(), model.event_model()) {
            events.initialize(em, &rules, times[0], &mut y)?;
        }
        let origin = y.clone();
        record_row(model, &mut table, times[0], &y)?;
        self.notify(times[0], times[0], &table);

        let outcome = self.record_intervals(
            model,
            caps,
            &rules,
            events.as_mut(),
            schedule,
            times,
            &origin,
            &mut y,
            &mut table,
        );

        let label = timer.label();
        if let Some(seconds) = timer.stop() {
            tracing::debug!(seconds, label, "timing");
        }
        tracing::debug!(
            rows = table.len(),
            unstable = self.unstable,
            accepted = self.stats.accepted_stages,
            rejected = self.stats.rejected_stages,
            bisections = self.stats.bisections,
            events = self.stats.events_executed,
            "solve finished"
        );
        match outcome {
            Ok(()) => Ok(table),
            Err(source) => {
                tracing::warn!(rows = table.len(), error = %source, "solve aborted");
                Err(SimError::Aborted {
                    table: Box::new(table),
                    source: Box::new(source),
                })
            }
        }
    }

    /// Advance through `times[1..]`, recording one row per reporting time.
    /// Rows written before an error stay in `table`.
    #[allow(clippy::too_many_arguments)]
    fn record_intervals(
        &mut self,
        model: &mut dyn OdeModel,
        caps: Capabilities,
        rules: &RuleSet,
        mut events: Option<&mut EventStateMachine>,
        schedule: Option<&Schedule<'_>>,
        times: &[f64],
        origin: &[f64],
        y: &mut Vec<f64>,
        table: &mut ResultTable,
    ) -> SimResult<()> {
        for i in 1..times.len() {
            if self.cancel.is_cancelled() {
                tracing::info!(t = times[i - 1], rows = table.len(), "solve cancelled");
                break;
            }
            let (t0, t1) = (times[i - 1], times[i]);
            let history = History::new(&*table, origin, times[0]);
            self.integrate_interval(
                model,
                caps,
                rules,
                events.as_deref_mut(),
                Some(history),
                y,
                t0,
                t1,
            )?;

            if caps.fast_processes {
                let relaxed = {
                    let (_, mut ctx) = self.split(model, caps, rules, None, Some(history));
                    fast::relax(&mut ctx, y, t1)?
                };
                let mut state = relaxed.state;
                self.guard(y, &mut state, t1);
                *y = state;
            }
            if let Some(schedule) = schedule {
                schedule.apply(i, y);
            }

            record_row(model, table, t1, y)?;
            self.notify(t0, t1, table);
        }
        Ok(())
    }

    fn notify(&mut self, previous_time: f64, time: f64, table: &ResultTable) {
        if self.listeners.is_empty() {
            return;
        }
        let Some(row) = table.last_row() else {
            return;
        };
        let progress = SolveProgress {
            previous_time,
            time,
            row_index: table.len() - 1,
            values: &row.values,
        };
        for listener in &mut self.listeners {
            listener(&progress);
        }
    }

    /// Apply the post-step safeguards and latch the instability flag.
    fn guard(&mut self, previous: &[f64], proposed: &mut [f64], t: f64) {
        if apply_safeguards(previous, proposed, self.config.nonnegative) {
            if !self.unstable {
                tracing::warn!(t, "NaN in a previously finite component, solver marked unstable");
            }
            self.unstable = true;
        }
    }

    /// Step engine plus a context over this instance's working state.
    pub(crate) fn split<'a>(
        &'a mut self,
        model: &'a mut dyn OdeModel,
        caps: Capabilities,
        rules: &'a RuleSet,
        events: Option<&'a mut EventStateMachine>,
        history: Option<History<'a>>,
    ) -> (&'a mut Box<dyn StepMethod>, StepContext<'a>) {
        let Solver {
            method,
            config,
            engine,
            stats,
            stage_log,
            aux,
            ..
        } = self;
        let stage_log = if config.record_stages {
            Some(stage_log)
        } else {
            None
        };
        let ctx = StepContext {
            model,
            caps,
            config,
            method: *method,
            rules,
            events,
            aux,
            history,
            stats,
            stage_log,
        };
        (engine, ctx)
    }

    /// Advance `y` from `t0` to `t1` in sub-steps of the configured size,
    /// landing exactly on `t1`.
    #[allow(clippy::too_many_arguments)]
    fn integrate_interval(
        &mut self,
        model: &mut dyn OdeModel,
        caps: Capabilities,
        rules: &RuleSet,
        mut events: Option<&mut EventStateMachine>,
        history: Option<History<'_>>,
        y: &mut Vec<f64>,
        t0: f64,
        t1: f64,
    ) -> SimResult<()> {
        let n = y.len();
        let h = self.config.step_size;
        let no_derivatives = caps.events
            && model
                .event_model()
                .map(|em| em.has_no_derivatives())
                .unwrap_or(false);
        let loop_runs_events = no_derivatives || !self.engine.handles_events();

        let mut change = vec![0.0; n];
        let mut proposed = vec![0.0; n];
        let mut t = t0;
        let mut k = 1usize;
        while t1 - t > LANDING_TOLERANCE {
            // t0 + k*h rather than accumulating h
            let mut next = t0 + k as f64 * h;
            if next > t1 || t1 - next <= LANDING_TOLERANCE {
                next = t1;
            }

            if no_derivatives {
                change.fill(0.0);
            } else {
                let (engine, mut ctx) =
                    self.split(model, caps, rules, events.as_deref_mut(), history);
                engine.compute_change(&mut ctx, y, t, next - t, &mut change, false)?;
            }
            for i in 0..n {
                proposed[i] = y[i] + change[i];
            }
            self.guard(y, &mut proposed, next);

            if loop_runs_events {
                if let (Some(events), Some(em)) = (events.as_deref_mut(), model.event_model()) {
                    let outcome = events.process(em, rules, next, &mut proposed)?;
                    self.stats.events_executed += outcome.executed as u64;
                }
            }

            std::mem::swap(y, &mut proposed);
            t = next;
            k += 1;
        }
        Ok(())
    }

    /// Integrate without events or recording, as the auxiliary clone does for
    /// delay look-back.
    pub(crate) fn advance(
        &mut self,
        model: &mut dyn OdeModel,
        caps: Capabilities,
        rules: &RuleSet,
        y0: &[f64],
        t0: f64,
        t1: f64,
    ) -> SimResult<Vec<f64>> {
        let mut y = y0.to_vec();
        self.integrate_interval(model, caps, rules, None, None, &mut y, t0, t1)?;
        Ok(y)
    }

    /// Run the step primitive once from `(t, y)` over `h`, without events.
    ///
    /// With `steady_state` set the adaptive engine skips its fast-process
    /// check, as it does while relaxing a fast subsystem.
    pub fn compute_change(
        &mut self,
        model: &mut dyn OdeModel,
        y: &[f64],
        t: f64,
        h: f64,
        change: &mut [f64],
        steady_state: bool,
    ) -> SimResult<()> {
        self.config.validate()?;
        check_dimension(model, y.len())?;
        check_dimension(model, change.len())?;
        let Prepared { caps, rules, .. } = prepare(model, self.config.event_seed)?;
        let (engine, mut ctx) = self.split(model, caps, &rules, None, None);
        engine.compute_change(&mut ctx, y, t, h, change, steady_state)
    }

    /// Relax `y` to the quasi-steady state of the model's fast subsystem.
    pub fn compute_steady_state(
        &mut self,
        model: &mut dyn OdeModel,
        y: &[f64],
        t: f64,
    ) -> SimResult<Relaxation> {
        self.config.validate()?;
        check_dimension(model, y.len())?;
        let Prepared { caps, rules, .. } = prepare(model, self.config.event_seed)?;
        self.stats.fast_relaxations += 1;
        self.relax_fast(model, caps, &rules, None, y, t)
    }

    /// Value of `component` at `time` given a recorded history and the point
    /// `(t, y)` currently reached. NaN when it cannot be resolved.
    #[allow(clippy::too_many_arguments)]
    pub fn resolve_delayed_value(
        &mut self,
        model: &mut dyn OdeModel,
        history: History<'_>,
        time: f64,
        component: usize,
        t: f64,
        y: &[f64],
    ) -> SimResult<f64> {
        check_dimension(model, y.len())?;
        check_dimension(model, history.initial.len())?;
        let Prepared { caps, rules, .. } = prepare(model, self.config.event_seed)?;
        let (_, mut ctx) = self.split(model, caps, &rules, None, Some(history));
        Ok(delay::resolve(&mut ctx, time, component, t, y))
    }
}
