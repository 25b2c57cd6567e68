//! Integration test: fast-process relaxation and delayed values.

use hy_results::ResultTable;
use hy_sim::{
    DelayModel, DelayQuery, FastProcessModel, History, Method, OdeModel, SimResult, Solver,
    SolverConfig,
};

/// `dy/dt = -100 y`, flagged as a fast process.
struct StiffRelaxation {
    fast_mode: bool,
    saw_fast_mode: bool,
}

impl StiffRelaxation {
    fn new() -> Self {
        Self {
            fast_mode: false,
            saw_fast_mode: false,
        }
    }
}

impl OdeModel for StiffRelaxation {
    fn dimension(&self) -> usize {
        1
    }
    fn identifiers(&self) -> Vec<String> {
        vec!["y".to_string()]
    }
    fn compute_derivatives(&mut self, _t: f64, y: &[f64], ydot: &mut [f64]) -> SimResult<()> {
        self.saw_fast_mode |= self.fast_mode;
        ydot[0] = -100.0 * y[0];
        Ok(())
    }
    fn fast_process_model(&mut self) -> Option<&mut dyn FastProcessModel> {
        Some(self)
    }
}

impl FastProcessModel for StiffRelaxation {
    fn contains_fast_processes(&self) -> bool {
        true
    }
    fn set_fast_process_computation(&mut self, enabled: bool) {
        self.fast_mode = enabled;
    }
}

/// `dy/dt = 1`, no delays.
struct Ramp;

impl OdeModel for Ramp {
    fn dimension(&self) -> usize {
        1
    }
    fn identifiers(&self) -> Vec<String> {
        vec!["y".to_string()]
    }
    fn compute_derivatives(&mut self, _t: f64, _y: &[f64], ydot: &mut [f64]) -> SimResult<()> {
        ydot[0] = 1.0;
        Ok(())
    }
}

/// Hutchinson's delayed logistic equation, `dy/dt = r y (1 - y(t - tau) / K)`.
struct DelayedLogistic {
    r: f64,
    capacity: f64,
    tau: f64,
    included: bool,
    lagged: Option<f64>,
    supplied: usize,
}

impl DelayedLogistic {
    fn new() -> Self {
        Self {
            r: 1.0,
            capacity: 10.0,
            tau: 1.0,
            included: true,
            lagged: None,
            supplied: 0,
        }
    }
}

impl OdeModel for DelayedLogistic {
    fn dimension(&self) -> usize {
        1
    }
    fn identifiers(&self) -> Vec<String> {
        vec!["population".to_string()]
    }
    fn compute_derivatives(&mut self, _t: f64, y: &[f64], ydot: &mut [f64]) -> SimResult<()> {
        let lagged = if self.included {
            self.lagged.take().unwrap_or(y[0])
        } else {
            y[0]
        };
        ydot[0] = self.r * y[0] * (1.0 - lagged / self.capacity);
        Ok(())
    }
    fn delay_model(&mut self) -> Option<&mut dyn DelayModel> {
        Some(self)
    }
}

impl DelayModel for DelayedLogistic {
    fn set_delays_included(&mut self, included: bool) {
        self.included = included;
    }
    fn delays_included(&self) -> bool {
        self.included
    }
    fn delayed_queries(&mut self, t: f64, _y: &[f64]) -> SimResult<Vec<DelayQuery>> {
        Ok(vec![DelayQuery {
            time: t - self.tau,
            component: 0,
        }])
    }
    fn supply_delayed_values(&mut self, values: &[f64]) {
        self.supplied += 1;
        self.lagged = values.first().copied();
    }
}

#[test]
fn steady_state_of_fast_decay_is_zero() {
    let mut model = StiffRelaxation::new();
    let mut solver = Solver::default();
    let relaxed = solver.compute_steady_state(&mut model, &[1.0], 0.0).unwrap();

    assert!(relaxed.converged);
    assert!(relaxed.iterations <= 10, "iterations = {}", relaxed.iterations);
    assert!(relaxed.state[0].abs() <= 1e-6, "state = {}", relaxed.state[0]);
    assert!(model.saw_fast_mode);
    assert!(!model.fast_mode);
}

#[test]
fn relaxation_cap_returns_last_state() {
    let mut model = StiffRelaxation::new();
    let mut config = SolverConfig::default();
    config.fast.max_iterations = 1;
    let mut solver = Solver::new(Method::Rosenbrock, config);
    let relaxed = solver.compute_steady_state(&mut model, &[1.0], 0.0).unwrap();

    assert!(!relaxed.converged);
    assert_eq!(relaxed.iterations, 1);
    assert!(relaxed.state[0] < 1.0 && relaxed.state[0] > 0.0);
    assert!(!model.fast_mode);
}

#[test]
fn fast_process_is_held_at_quasi_steady_state() {
    let mut model = StiffRelaxation::new();
    let mut solver = Solver::default();
    let table = solver.solve(&mut model, &[1.0], &[0.0, 0.5, 1.0]).unwrap();

    assert_eq!(table.rows()[0].values[0], 1.0);
    for row in &table.rows()[1..] {
        assert!(row.values[0].abs() < 1e-6, "t={} y={}", row.time, row.values[0]);
    }
    assert!(solver.stats().fast_relaxations > 0);
    assert!(!model.fast_mode);
}

#[test]
fn steady_state_flag_skips_the_fast_process_check() {
    let mut model = StiffRelaxation::new();
    let mut solver = Solver::default();
    let mut change = [0.0];
    solver
        .compute_change(&mut model, &[1.0], 0.0, 0.1, &mut change, true)
        .unwrap();
    assert_eq!(solver.stats().fast_relaxations, 0);
    assert!((change[0] - ((-10.0f64).exp() - 1.0)).abs() < 1e-5, "{}", change[0]);

    let mut model = StiffRelaxation::new();
    let mut solver = Solver::default();
    solver
        .compute_change(&mut model, &[1.0], 0.0, 0.1, &mut change, false)
        .unwrap();
    assert!(solver.stats().fast_relaxations > 0);
    assert!(change[0].is_finite());
}

#[test]
fn delayed_values_reproduce_the_recorded_grid() {
    let mut model = StiffRelaxation::new();
    let mut table = ResultTable::new(vec!["y".to_string()]);
    table.push(0.0, &[0.0]).unwrap();
    table.push(1.0, &[10.0]).unwrap();
    table.push(2.0, &[30.0]).unwrap();
    let initial = [0.0];
    let history = History::new(&table, &initial, 0.0);
    let current = [40.0];

    let mut solver = Solver::default();
    let mut at = |time: f64| {
        solver
            .resolve_delayed_value(&mut model, history, time, 0, 2.5, &current)
            .unwrap()
    };

    assert_eq!(at(0.0), 0.0);
    assert_eq!(at(1.0), 10.0);
    assert_eq!(at(2.0), 30.0);
    assert_eq!(at(1.5), 20.0);
    // Between the last row and the point currently being evaluated.
    assert_eq!(at(2.25), 35.0);
    // At or after the current time the current state is returned.
    assert_eq!(at(2.5), 40.0);
    assert!(at(f64::NAN).is_nan());
}

#[test]
fn delayed_values_match_a_solved_trajectory() {
    let mut ramp = Ramp;
    let mut solver = Solver::default();
    let table = solver.solve_grid(&mut ramp, &[0.0], 0.0, 1.0, 11).unwrap();
    let initial = [0.0];
    let history = History::new(&table, &initial, 0.0);

    for row in table.rows() {
        let v = solver
            .resolve_delayed_value(&mut ramp, history, row.time, 0, 2.0, &[2.0])
            .unwrap();
        assert_eq!(v, row.values[0]);
    }
    let mid = solver
        .resolve_delayed_value(&mut ramp, history, 0.35, 0, 2.0, &[2.0])
        .unwrap();
    assert!((mid - 0.35).abs() < 1e-9);
}

#[test]
fn look_back_before_history_integrates_from_the_initial_state() {
    let mut ramp = Ramp;
    let table = ResultTable::new(vec!["y".to_string()]);
    let initial = [2.0];
    let history = History::new(&table, &initial, 0.0);

    let mut solver = Solver::default();
    let v = solver
        .resolve_delayed_value(&mut ramp, history, -0.5, 0, 0.0, &[2.0])
        .unwrap();
    assert!((v - 2.5).abs() < 1e-9, "look-back = {v}");
}

#[test]
fn delayed_logistic_stays_finite_and_grows() {
    let mut model = DelayedLogistic::new();
    let config = SolverConfig {
        step_size: 0.05,
        ..SolverConfig::default()
    };
    let mut solver = Solver::new(Method::Rosenbrock, config);
    let table = solver.solve_grid(&mut model, &[1.0], 0.0, 5.0, 11).unwrap();

    assert!(table.rows().iter().all(|r| r.values[0].is_finite() && r.values[0] > 0.0));
    assert!(table.last_row().unwrap().values[0] > 1.0);
    assert!(model.supplied > 0);
    assert!(model.delays_included());
    assert!(!solver.is_unstable());
}
