//! Counters collected while solving.

/// Work done by one solver instance during its latest run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SolverStats {
    pub rhs_evaluations: u64,
    pub jacobian_evaluations: u64,
    pub factorizations: u64,
    pub accepted_stages: u64,
    pub rejected_stages: u64,
    pub bisections: u64,
    pub fast_relaxations: u64,
    pub events_executed: u64,
}

/// One attempted stage of the adaptive engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageRecord {
    pub t: f64,
    pub h: f64,
    pub error: f64,
    /// Whether the stage passed the local error test.
    pub accepted: bool,
}
