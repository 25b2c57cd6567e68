//! Event state machine.
//!
//! Each event is a plain record indexed by its [`EventId`] slot. An event goes
//! `Idle → Fired → (queued) → Executing → Idle`; the trigger must turn false
//! again before the event can fire a second time.

use crate::error::{SimError, SimResult};
use crate::model::{AssignmentTarget, EventDefinition, EventModel};
use crate::rules::RuleSet;
use hy_core::EventId;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, VecDeque};

/// Upper bound on executions at a single instant.
pub const MAX_EVENT_CASCADE: usize = 10_000;

const EXECUTION_SLACK: f64 = 1e-14;

/// One outstanding firing of an event.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingExecution {
    pub time: f64,
    /// Assignment values captured at trigger time, if the event asks for them.
    pub values: Option<Vec<f64>>,
}

#[derive(Debug, Clone)]
pub struct EventRecord {
    pub fired: bool,
    pub last_fired: Option<f64>,
    pub last_recovered: Option<f64>,
    pub last_executed: Option<f64>,
    pub priority: f64,
    definition: EventDefinition,
    pending: VecDeque<PendingExecution>,
}

impl EventRecord {
    fn new(definition: EventDefinition) -> Self {
        Self {
            fired: false,
            last_fired: None,
            last_recovered: None,
            last_executed: None,
            priority: f64::NEG_INFINITY,
            definition,
            pending: VecDeque::new(),
        }
    }

    pub fn definition(&self) -> &EventDefinition {
        &self.definition
    }

    pub fn pending(&self) -> impl Iterator<Item = &PendingExecution> {
        self.pending.iter()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// What happened during one [`EventStateMachine::process`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventOutcome {
    pub fired: usize,
    pub executed: usize,
    pub aborted: usize,
    pub rules_changed: bool,
}

impl EventOutcome {
    /// Firings and executions are discontinuities; rule updates are not.
    pub fn is_discontinuity(&self) -> bool {
        self.fired > 0 || self.executed > 0
    }

    pub fn changed(&self) -> bool {
        self.is_discontinuity() || self.aborted > 0 || self.rules_changed
    }
}

#[derive(Debug, Clone)]
pub struct EventStateMachine {
    records: Vec<EventRecord>,
    stoichiometry: BTreeMap<usize, f64>,
    rng: ChaCha8Rng,
}

impl EventStateMachine {
    pub fn new(model: &dyn EventModel, seed: u64) -> SimResult<Self> {
        let mut records = Vec::with_capacity(model.event_count());
        let mut stoichiometry = BTreeMap::new();
        for i in 0..model.event_count() {
            let id = EventId::from_usize(i);
            let definition = model.event_definition(id);
            for target in &definition.targets {
                if let AssignmentTarget::Stoichiometry(s) = *target {
                    let value = model.stoichiometry(s).ok_or_else(|| {
                        SimError::evaluation(format!("event {id} targets unknown stoichiometry {s}"))
                    })?;
                    stoichiometry.insert(s, value);
                }
            }
            records.push(EventRecord::new(definition));
        }
        Ok(Self {
            records,
            stoichiometry,
            rng: ChaCha8Rng::seed_from_u64(seed),
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    pub fn record(&self, event: EventId) -> Option<&EventRecord> {
        self.records.get(event.slot())
    }

    /// Current values of every stoichiometry an event can assign.
    pub fn stoichiometry(&self) -> &BTreeMap<usize, f64> {
        &self.stoichiometry
    }

    pub fn has_pending(&self) -> bool {
        self.records.iter().any(|r| !r.pending.is_empty())
    }

    /// Prepare for a run starting at `t0`.
    ///
    /// Assignment rules are applied, and every event whose trigger already
    /// holds is marked fired without executing, so it only fires after its
    /// trigger has been false once.
    pub fn initialize(
        &mut self,
        model: &mut dyn EventModel,
        rules: &RuleSet,
        t0: f64,
        y: &mut [f64],
    ) -> SimResult<bool> {
        let changed = rules.apply_assignments(model, t0, y)?;
        for (i, record) in self.records.iter_mut().enumerate() {
            let id = EventId::from_usize(i);
            record.fired = model.evaluate_trigger(id, t0, y)?;
            record.priority = model
                .evaluate_priority(id, t0, y)?
                .unwrap_or(f64::NEG_INFINITY);
            record.pending.clear();
        }
        Ok(changed)
    }

    pub fn snapshot(&self) -> Self {
        self.clone()
    }

    /// Return to a previous snapshot, pushing reverted stoichiometry back to
    /// the model.
    pub fn restore(&mut self, model: &mut dyn EventModel, snapshot: Self) -> SimResult<()> {
        for (&target, &value) in &snapshot.stoichiometry {
            if self.stoichiometry.get(&target) != Some(&value) {
                model.set_stoichiometry(target, value)?;
            }
        }
        *self = snapshot;
        Ok(())
    }

    /// Fire, abort and execute events at instant `t`, applying assignments to
    /// `y`.
    ///
    /// Eligible events execute one at a time, highest priority first; ties
    /// are broken at random. Triggers are re-evaluated after every execution
    /// so cascades settle at the same instant.
    pub fn process(
        &mut self,
        model: &mut dyn EventModel,
        rules: &RuleSet,
        t: f64,
        y: &mut [f64],
    ) -> SimResult<EventOutcome> {
        let mut outcome = EventOutcome {
            rules_changed: rules.apply_assignments(model, t, y)?,
            ..Default::default()
        };

        for _ in 0..MAX_EVENT_CASCADE {
            self.update_triggers(model, t, y, &mut outcome)?;
            let Some(index) = self.select_next(model, t, y)? else {
                return Ok(outcome);
            };
            self.execute(model, index, t, y)?;
            outcome.executed += 1;
            outcome.rules_changed |= rules.apply_assignments(model, t, y)?;
        }
        Err(SimError::evaluation(format!(
            "event cascade did not settle at t={t}"
        )))
    }

    fn update_triggers(
        &mut self,
        model: &mut dyn EventModel,
        t: f64,
        y: &[f64],
        outcome: &mut EventOutcome,
    ) -> SimResult<()> {
        for (i, record) in self.records.iter_mut().enumerate() {
            let id = EventId::from_usize(i);
            let triggered = model.evaluate_trigger(id, t, y)?;

            if triggered && !record.fired {
                record.fired = true;
                record.last_fired = Some(t);
                let delay = match model.evaluate_delay(id, t, y)? {
                    Some(d) if d.is_finite() && d >= 0.0 => d,
                    Some(d) => {
                        return Err(SimError::evaluation(format!(
                            "event {id} has invalid delay {d}"
                        )));
                    }
                    None => 0.0,
                };
                let values = if record.definition.use_values_from_trigger_time {
                    let mut values = Vec::new();
                    model.evaluate_assignments(id, t, y, &mut values)?;
                    check_assignment_len(id, &record.definition, &values)?;
                    Some(values)
                } else {
                    None
                };
                record.pending.push_back(PendingExecution {
                    time: t + delay,
                    values,
                });
                outcome.fired += 1;
                tracing::trace!(event = %id, t, delay, "event fired");
            } else if !triggered && record.fired {
                record.fired = false;
                record.last_recovered = Some(t);
                if !record.definition.persistent && !record.pending.is_empty() {
                    outcome.aborted += record.pending.len();
                    record.pending.clear();
                    tracing::trace!(event = %id, t, "pending execution aborted");
                }
            }
        }
        Ok(())
    }

    fn select_next(
        &mut self,
        model: &mut dyn EventModel,
        t: f64,
        y: &[f64],
    ) -> SimResult<Option<usize>> {
        let mut eligible = Vec::new();
        for (i, record) in self.records.iter_mut().enumerate() {
            let due = record
                .pending
                .front()
                .map(|p| p.time <= t + EXECUTION_SLACK)
                .unwrap_or(false);
            if !due {
                continue;
            }
            let id = EventId::from_usize(i);
            let priority = model
                .evaluate_priority(id, t, y)?
                .unwrap_or(f64::NEG_INFINITY);
            if priority.is_nan() {
                return Err(SimError::evaluation(format!("event {id} has NaN priority")));
            }
            record.priority = priority;
            eligible.push(i);
        }
        if eligible.is_empty() {
            return Ok(None);
        }

        let top = eligible
            .iter()
            .map(|&i| self.records[i].priority)
            .fold(f64::NEG_INFINITY, f64::max);
        let candidates: Vec<usize> = eligible
            .into_iter()
            .filter(|&i| self.records[i].priority == top)
            .collect();
        let pick = if candidates.len() == 1 {
            candidates[0]
        } else {
            candidates[self.rng.gen_range(0..candidates.len())]
        };
        Ok(Some(pick))
    }

    fn execute(
        &mut self,
        model: &mut dyn EventModel,
        index: usize,
        t: f64,
        y: &mut [f64],
    ) -> SimResult<()> {
        let id = EventId::from_usize(index);
        let record = &mut self.records[index];
        let Some(pending) = record.pending.pop_front() else {
            return Ok(());
        };
        let values = match pending.values {
            Some(values) => values,
            None => {
                let mut values = Vec::new();
                model.evaluate_assignments(id, t, y, &mut values)?;
                check_assignment_len(id, &record.definition, &values)?;
                values
            }
        };

        for (target, value) in record.definition.targets.iter().zip(values) {
            match *target {
                AssignmentTarget::State(i) => {
                    let slot = y.get_mut(i).ok_or_else(|| {
                        SimError::evaluation(format!("event {id} assigns unknown component {i}"))
                    })?;
                    *slot = value;
                }
                AssignmentTarget::Stoichiometry(s) => {
                    self.stoichiometry.insert(s, value);
                    model.set_stoichiometry(s, value)?;
                }
            }
        }
        record.last_executed = Some(t);
        tracing::debug!(event = %id, t, "event executed");
        Ok(())
    }
}

fn check_assignment_len(id: EventId, definition: &EventDefinition, values: &[f64]) -> SimResult<()> {
    if values.len() != definition.targets.len() {
        return Err(SimError::evaluation(format!(
            "event {id} produced {} assignment values for {} targets",
            values.len(),
            definition.targets.len()
        )));
    }
    Ok(())
}
