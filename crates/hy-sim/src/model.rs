//! Right-hand-side contract for hybrid ODE models.
//!
//! A model always provides derivatives. Events and rules, fast-process
//! marking, and delay support are optional capabilities exposed through
//! accessor methods; the solver resolves them once per run into a
//! [`Capabilities`] descriptor.

use crate::error::{SimError, SimResult};
use hy_core::{EventId, RuleId};

/// Continuous part of a model: `dy/dt = f(t, y)`.
pub trait OdeModel {
    /// Number of state components. Fixed for the lifetime of a run.
    fn dimension(&self) -> usize;

    /// One identifier per state component.
    fn identifiers(&self) -> Vec<String>;

    /// Compute `ydot = f(t, y)`.
    fn compute_derivatives(&mut self, t: f64, y: &[f64], ydot: &mut [f64]) -> SimResult<()>;

    /// Identifiers of auxiliary outputs recorded alongside the state.
    fn intermediate_identifiers(&self) -> Vec<String> {
        Vec::new()
    }

    fn compute_intermediates(&mut self, _t: f64, _y: &[f64], _out: &mut [f64]) -> SimResult<()> {
        Ok(())
    }

    fn event_model(&mut self) -> Option<&mut dyn EventModel> {
        None
    }

    fn fast_process_model(&mut self) -> Option<&mut dyn FastProcessModel> {
        None
    }

    fn delay_model(&mut self) -> Option<&mut dyn DelayModel> {
        None
    }
}

/// Where an event assignment writes its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentTarget {
    /// A state component.
    State(usize),
    /// A stoichiometric coefficient held outside the state vector.
    Stoichiometry(usize),
}

/// Static description of one event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDefinition {
    /// Persistent events execute even if their trigger turns false first.
    pub persistent: bool,
    /// Evaluate assignments when the trigger fires instead of at execution.
    pub use_values_from_trigger_time: bool,
    /// One target per assignment, in the order of
    /// [`EventModel::evaluate_assignments`].
    pub targets: Vec<AssignmentTarget>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RuleDefinition {
    /// `y[target]` is recomputed from the rest of the state.
    Assignment { target: usize },
    /// `dy[target]/dt` is given by the rule. Components listed in `scaled`
    /// are expressed relative to `y[target]` and are rescaled as it changes.
    Rate { target: usize, scaled: Vec<usize> },
}

/// Discrete part of a model: events and algebraic/rate rules.
pub trait EventModel {
    fn event_count(&self) -> usize;

    fn event_definition(&self, event: EventId) -> EventDefinition;

    fn evaluate_trigger(&mut self, event: EventId, t: f64, y: &[f64]) -> SimResult<bool>;

    /// `None` means no priority, ordered below every numeric priority.
    fn evaluate_priority(&mut self, _event: EventId, _t: f64, _y: &[f64]) -> SimResult<Option<f64>> {
        Ok(None)
    }

    /// `None` means the event executes at the instant it fires.
    fn evaluate_delay(&mut self, _event: EventId, _t: f64, _y: &[f64]) -> SimResult<Option<f64>> {
        Ok(None)
    }

    /// Evaluate the event's assignment values, one per target.
    fn evaluate_assignments(
        &mut self,
        event: EventId,
        t: f64,
        y: &[f64],
        out: &mut Vec<f64>,
    ) -> SimResult<()>;

    fn stoichiometry(&self, _target: usize) -> Option<f64> {
        None
    }

    fn set_stoichiometry(&mut self, _target: usize, _value: f64) -> SimResult<()> {
        Err(SimError::evaluation("model has no stoichiometry targets"))
    }

    fn rule_count(&self) -> usize {
        0
    }

    fn rule_definition(&self, _rule: RuleId) -> Option<RuleDefinition> {
        None
    }

    fn evaluate_rule(&mut self, _rule: RuleId, _t: f64, _y: &[f64]) -> SimResult<f64> {
        Err(SimError::evaluation("model has no rules"))
    }

    /// True when the model is driven by events and rules only.
    fn has_no_derivatives(&self) -> bool {
        false
    }
}

/// Models with a fast subsystem resolved at quasi-steady state.
pub trait FastProcessModel {
    fn contains_fast_processes(&self) -> bool;

    /// While set, derivatives cover the fast subsystem only.
    fn set_fast_process_computation(&mut self, enabled: bool);
}

/// A past value needed by the right-hand side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayQuery {
    pub time: f64,
    pub component: usize,
}

/// Delay differential equation support.
///
/// Before each derivative evaluation the solver collects the model's
/// [`DelayQuery`]s for `(t, y)`, resolves them, and hands the values back
/// through [`DelayModel::supply_delayed_values`] in query order.
pub trait DelayModel {
    fn set_delays_included(&mut self, included: bool);

    fn delays_included(&self) -> bool;

    fn delayed_queries(&mut self, t: f64, y: &[f64]) -> SimResult<Vec<DelayQuery>>;

    fn supply_delayed_values(&mut self, values: &[f64]);
}

/// Optional capabilities of a model, resolved once per run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub events: bool,
    pub fast_processes: bool,
    pub delays: bool,
    pub intermediates: bool,
}

impl Capabilities {
    pub fn detect(model: &mut dyn OdeModel) -> Self {
        let events = model
            .event_model()
            .map(|em| em.event_count() + em.rule_count() > 0)
            .unwrap_or(false);
        let fast_processes = model
            .fast_process_model()
            .map(|fm| fm.contains_fast_processes())
            .unwrap_or(false);
        let delays = model.delay_model().is_some();
        let intermediates = !model.intermediate_identifiers().is_empty();
        Self {
            events,
            fast_processes,
            delays,
            intermediates,
        }
    }
}
