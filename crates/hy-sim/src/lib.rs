//! Hybrid continuous/discrete ODE simulation.
//!
//! Provides:
//! - Right-hand-side contract with optional event, fast-process and delay
//!   capabilities
//! - Event/rule state machine with priorities, delays and persistence
//! - Generic stepping control loop with NaN and nonnegativity safeguards
//! - Adaptive Rosenbrock engine with event bisection
//! - Quasi-steady-state relaxation of fast subsystems
//! - Delayed-value resolution from recorded history
//! - Fixed-step Euler and RK4 methods, batch solving

pub mod batch;
pub mod config;
pub mod delay;
pub mod error;
pub mod events;
pub mod fast;
pub mod integrator;
pub mod model;
pub mod progress;
pub mod rosenbrock;
pub mod rules;
pub mod solver;
pub mod stats;

pub use batch::{BatchJob, solve_batch};
pub use config::{FastProcessConfig, Method, SolverConfig};
pub use delay::History;
pub use error::{SimError, SimResult};
pub use events::{EventOutcome, EventRecord, EventStateMachine, PendingExecution};
pub use fast::Relaxation;
pub use integrator::{ForwardEuler, LANDING_TOLERANCE, Rk4, StepContext, StepMethod};
pub use model::{
    AssignmentTarget, Capabilities, DelayModel, DelayQuery, EventDefinition, EventModel,
    FastProcessModel, OdeModel, RuleDefinition,
};
pub use progress::{CancelToken, SolveProgress};
pub use rosenbrock::Rosenbrock;
pub use rules::RuleSet;
pub use solver::Solver;
pub use stats::{SolverStats, StageRecord};
