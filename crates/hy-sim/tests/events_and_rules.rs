//! Integration test: events and rules driven through full solves.
//!
//! Covers:
//! - priority ordering of simultaneous events
//! - event location by stage bisection
//! - assignment rules holding at every recorded row
//! - delayed execution through the control loop
//! - event-only models without derivatives
//! - trigger failures aborting a solve

use hy_core::{EventId, RuleId};
use hy_sim::{
    AssignmentTarget, EventDefinition, EventModel, Method, OdeModel, RuleDefinition, SimError,
    SimResult, Solver, SolverConfig,
};

/// Two events firing together at `t >= 0.5`, each writing its own value into
/// `y[0]`.
struct Simultaneous {
    priorities: [f64; 2],
    values: [f64; 2],
    order: Vec<usize>,
}

impl OdeModel for Simultaneous {
    fn dimension(&self) -> usize {
        1
    }
    fn identifiers(&self) -> Vec<String> {
        vec!["x".to_string()]
    }
    fn compute_derivatives(&mut self, _t: f64, _y: &[f64], ydot: &mut [f64]) -> SimResult<()> {
        ydot[0] = 0.0;
        Ok(())
    }
    fn event_model(&mut self) -> Option<&mut dyn EventModel> {
        Some(self)
    }
}

impl EventModel for Simultaneous {
    fn event_count(&self) -> usize {
        2
    }
    fn event_definition(&self, _event: EventId) -> EventDefinition {
        EventDefinition {
            persistent: true,
            use_values_from_trigger_time: false,
            targets: vec![AssignmentTarget::State(0)],
        }
    }
    fn evaluate_trigger(&mut self, _event: EventId, t: f64, _y: &[f64]) -> SimResult<bool> {
        Ok(t >= 0.5)
    }
    fn evaluate_priority(&mut self, event: EventId, _t: f64, _y: &[f64]) -> SimResult<Option<f64>> {
        Ok(Some(self.priorities[event.slot()]))
    }
    fn evaluate_assignments(
        &mut self,
        event: EventId,
        _t: f64,
        _y: &[f64],
        out: &mut Vec<f64>,
    ) -> SimResult<()> {
        self.order.push(event.slot());
        out.clear();
        out.push(self.values[event.slot()]);
        Ok(())
    }
}

/// `dx/dt = 1`, reset to zero whenever `x` reaches the threshold.
struct Sawtooth {
    threshold: f64,
    delay: Option<f64>,
}

impl OdeModel for Sawtooth {
    fn dimension(&self) -> usize {
        1
    }
    fn identifiers(&self) -> Vec<String> {
        vec!["x".to_string()]
    }
    fn compute_derivatives(&mut self, _t: f64, _y: &[f64], ydot: &mut [f64]) -> SimResult<()> {
        ydot[0] = 1.0;
        Ok(())
    }
    fn event_model(&mut self) -> Option<&mut dyn EventModel> {
        Some(self)
    }
}

impl EventModel for Sawtooth {
    fn event_count(&self) -> usize {
        1
    }
    fn event_definition(&self, _event: EventId) -> EventDefinition {
        EventDefinition {
            persistent: true,
            use_values_from_trigger_time: false,
            targets: vec![AssignmentTarget::State(0)],
        }
    }
    fn evaluate_trigger(&mut self, _event: EventId, _t: f64, y: &[f64]) -> SimResult<bool> {
        Ok(y[0] >= self.threshold)
    }
    fn evaluate_delay(&mut self, _event: EventId, _t: f64, _y: &[f64]) -> SimResult<Option<f64>> {
        Ok(self.delay)
    }
    fn evaluate_assignments(
        &mut self,
        _event: EventId,
        _t: f64,
        _y: &[f64],
        out: &mut Vec<f64>,
    ) -> SimResult<()> {
        out.clear();
        out.push(0.0);
        Ok(())
    }
}

/// `x` grows linearly and `doubled` follows the assignment rule `2 x`.
struct Doubling;

impl OdeModel for Doubling {
    fn dimension(&self) -> usize {
        2
    }
    fn identifiers(&self) -> Vec<String> {
        vec!["x".to_string(), "doubled".to_string()]
    }
    fn compute_derivatives(&mut self, _t: f64, _y: &[f64], ydot: &mut [f64]) -> SimResult<()> {
        ydot[0] = 1.0;
        ydot[1] = 0.0;
        Ok(())
    }
    fn event_model(&mut self) -> Option<&mut dyn EventModel> {
        Some(self)
    }
}

impl EventModel for Doubling {
    fn event_count(&self) -> usize {
        0
    }
    fn event_definition(&self, _event: EventId) -> EventDefinition {
        EventDefinition {
            persistent: false,
            use_values_from_trigger_time: false,
            targets: Vec::new(),
        }
    }
    fn evaluate_trigger(&mut self, _event: EventId, _t: f64, _y: &[f64]) -> SimResult<bool> {
        Ok(false)
    }
    fn evaluate_assignments(
        &mut self,
        _event: EventId,
        _t: f64,
        _y: &[f64],
        _out: &mut Vec<f64>,
    ) -> SimResult<()> {
        Ok(())
    }
    fn rule_count(&self) -> usize {
        1
    }
    fn rule_definition(&self, _rule: RuleId) -> Option<RuleDefinition> {
        Some(RuleDefinition::Assignment { target: 1 })
    }
    fn evaluate_rule(&mut self, _rule: RuleId, _t: f64, y: &[f64]) -> SimResult<f64> {
        Ok(2.0 * y[0])
    }
}

/// No continuous dynamics; a switch flips at `t >= 0.5`.
struct Switch {
    derivative_calls: usize,
}

impl OdeModel for Switch {
    fn dimension(&self) -> usize {
        1
    }
    fn identifiers(&self) -> Vec<String> {
        vec!["on".to_string()]
    }
    fn compute_derivatives(&mut self, _t: f64, _y: &[f64], ydot: &mut [f64]) -> SimResult<()> {
        self.derivative_calls += 1;
        ydot[0] = 0.0;
        Ok(())
    }
    fn event_model(&mut self) -> Option<&mut dyn EventModel> {
        Some(self)
    }
}

impl EventModel for Switch {
    fn event_count(&self) -> usize {
        1
    }
    fn event_definition(&self, _event: EventId) -> EventDefinition {
        EventDefinition {
            persistent: true,
            use_values_from_trigger_time: false,
            targets: vec![AssignmentTarget::State(0)],
        }
    }
    fn evaluate_trigger(&mut self, _event: EventId, t: f64, _y: &[f64]) -> SimResult<bool> {
        Ok(t >= 0.5)
    }
    fn evaluate_assignments(
        &mut self,
        _event: EventId,
        _t: f64,
        _y: &[f64],
        out: &mut Vec<f64>,
    ) -> SimResult<()> {
        out.clear();
        out.push(1.0);
        Ok(())
    }
    fn has_no_derivatives(&self) -> bool {
        true
    }
}

/// `dy/dt = 1` with a trigger that cannot be evaluated after `t = 0.5`.
struct BrokenTrigger;

impl OdeModel for BrokenTrigger {
    fn dimension(&self) -> usize {
        1
    }
    fn identifiers(&self) -> Vec<String> {
        vec!["x".to_string()]
    }
    fn compute_derivatives(&mut self, _t: f64, _y: &[f64], ydot: &mut [f64]) -> SimResult<()> {
        ydot[0] = 1.0;
        Ok(())
    }
    fn event_model(&mut self) -> Option<&mut dyn EventModel> {
        Some(self)
    }
}

impl EventModel for BrokenTrigger {
    fn event_count(&self) -> usize {
        1
    }
    fn event_definition(&self, _event: EventId) -> EventDefinition {
        EventDefinition {
            persistent: true,
            use_values_from_trigger_time: false,
            targets: vec![AssignmentTarget::State(0)],
        }
    }
    fn evaluate_trigger(&mut self, _event: EventId, t: f64, _y: &[f64]) -> SimResult<bool> {
        if t > 0.5 {
            return Err(SimError::evaluation("unknown symbol in trigger"));
        }
        Ok(false)
    }
    fn evaluate_assignments(
        &mut self,
        _event: EventId,
        _t: f64,
        _y: &[f64],
        out: &mut Vec<f64>,
    ) -> SimResult<()> {
        out.clear();
        out.push(0.0);
        Ok(())
    }
}

#[test]
fn higher_priority_event_executes_first_within_a_solve() {
    let mut model = Simultaneous {
        priorities: [5.0, 10.0],
        values: [5.0, 10.0],
        order: Vec::new(),
    };
    let mut solver = Solver::default();
    let table = solver.solve(&mut model, &[0.0], &[0.0, 0.4, 1.0]).unwrap();

    assert_eq!(table.rows()[1].values[0], 0.0);
    // Priority 10 runs first, so the priority 5 assignment is the one left standing.
    assert_eq!(table.rows()[2].values[0], 5.0);
    // Bisection may discard earlier attempts; every attempt ran in the same order.
    assert!(!model.order.is_empty());
    assert!(model.order.chunks(2).all(|pair| pair == [1, 0]), "{:?}", model.order);
    assert_eq!(solver.stats().events_executed, 2);
}

#[test]
fn bisection_locates_threshold_crossings() {
    let mut model = Sawtooth {
        threshold: 0.3,
        delay: None,
    };
    let mut solver = Solver::default();
    let table = solver.solve(&mut model, &[0.0], &[0.0, 1.0]).unwrap();

    // Resets at 0.3, 0.6 and 0.9 leave 0.1 of growth.
    let x = table.last_row().unwrap().values[0];
    assert!((x - 0.1).abs() < 1e-5, "x(1) = {x}");
    let stats = solver.stats();
    assert_eq!(stats.events_executed, 3);
    assert!(stats.bisections > 0);
}

#[test]
fn delayed_reset_runs_through_the_control_loop() {
    let mut model = Sawtooth {
        threshold: 0.3,
        delay: Some(0.2),
    };
    let mut solver = Solver::new(Method::ForwardEuler, SolverConfig::default());
    let table = solver.solve(&mut model, &[0.0], &[0.0, 0.45, 0.55]).unwrap();

    // Fired near 0.3, still pending at 0.45, executed near 0.5.
    assert!((table.rows()[1].values[0] - 0.45).abs() < 1e-9);
    let x = table.rows()[2].values[0];
    assert!(x < 0.1, "x(0.55) = {x}");
    assert_eq!(solver.stats().events_executed, 1);
}

#[test]
fn assignment_rule_holds_at_every_row() {
    let mut solver = Solver::default();
    let table = solver
        .solve_grid(&mut Doubling, &[0.25, 0.0], 0.0, 2.0, 9)
        .unwrap();
    for row in table.rows() {
        assert!(
            (row.values[1] - 2.0 * row.values[0]).abs() < 1e-9,
            "t={} row={:?}",
            row.time,
            row.values
        );
    }
    assert_eq!(table.rows()[0].values[1], 0.5);
}

#[test]
fn event_only_model_skips_derivatives() {
    let mut model = Switch {
        derivative_calls: 0,
    };
    let mut solver = Solver::default();
    let table = solver.solve(&mut model, &[0.0], &[0.0, 0.4, 1.0]).unwrap();

    assert_eq!(table.rows()[1].values[0], 0.0);
    assert_eq!(table.rows()[2].values[0], 1.0);
    assert_eq!(model.derivative_calls, 0);
    assert_eq!(solver.stats().rhs_evaluations, 0);
}

#[test]
fn failing_trigger_aborts_and_keeps_earlier_rows() {
    for method in [Method::Rosenbrock, Method::ForwardEuler] {
        let mut solver = Solver::new(method, SolverConfig::default());
        let err = solver
            .solve(&mut BrokenTrigger, &[0.0], &[0.0, 0.2, 0.4, 1.0])
            .unwrap_err();

        match err.root() {
            SimError::Evaluation { message } => {
                assert!(message.contains("trigger"), "{message}")
            }
            other => panic!("{method:?}: unexpected error {other}"),
        }
        let rows = err.partial_table().expect("rows before the failure");
        assert_eq!(rows.times(), vec![0.0, 0.2, 0.4]);
        assert!((rows.rows()[2].values[0] - 0.4).abs() < 1e-9);
    }
}
