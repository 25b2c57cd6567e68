//! Independent runs on a thread pool.

use crate::config::{Method, SolverConfig};
use crate::error::SimResult;
use crate::model::OdeModel;
use crate::solver::Solver;
use hy_results::ResultTable;
use rayon::prelude::*;

/// One model run in a batch.
pub struct BatchJob<M> {
    pub model: M,
    pub initial: Vec<f64>,
    pub times: Vec<f64>,
}

/// Solve every job in parallel, each on its own solver instance.
///
/// Results are returned in job order.
pub fn solve_batch<M>(
    method: Method,
    config: &SolverConfig,
    jobs: &mut [BatchJob<M>],
) -> Vec<SimResult<ResultTable>>
where
    M: OdeModel + Send,
{
    jobs.par_iter_mut()
        .map(|job| {
            let mut solver = Solver::new(method, config.clone());
            solver.solve(&mut job.model, &job.initial, &job.times)
        })
        .collect()
}
