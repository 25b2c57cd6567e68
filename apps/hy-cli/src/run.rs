//! Run orchestration: config compilation, caching and persistence.

use crate::error::CliResult;
use crate::models;
use hy_project::{MethodDef, RunConfig, SolverDef, TimeDef};
use hy_results::{ResultTable, RunManifest, RunStore, RunType, compute_run_id};
use hy_sim::{Method, SolveProgress, Solver, SolverConfig, SolverStats};
use std::time::Instant;

pub const SOLVER_VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn method(def: MethodDef) -> Method {
    match def {
        MethodDef::ForwardEuler => Method::ForwardEuler,
        MethodDef::Rk4 => Method::Rk4,
        MethodDef::Rosenbrock => Method::Rosenbrock,
    }
}

/// Compile the serialized solver settings, keeping library defaults for
/// anything the file leaves out.
pub fn solver_config(def: &SolverDef) -> SolverConfig {
    let defaults = SolverConfig::default();
    SolverConfig {
        step_size: def.step_size,
        tolerances: hy_core::Tolerances::new(def.abs_tol, def.rel_tol),
        nonnegative: def.nonnegative,
        include_intermediates: def.include_intermediates,
        h_min: def.h_min.unwrap_or(defaults.h_min),
        h_max: def.h_max.unwrap_or(defaults.h_max),
        event_precision: def.event_precision.unwrap_or(defaults.event_precision),
        fast_threshold: def.fast_threshold.unwrap_or(defaults.fast_threshold),
        event_seed: def.event_seed,
        ..defaults
    }
}

pub struct RunRequest<'a> {
    pub config: &'a RunConfig,
    pub store: &'a RunStore,
    pub use_cache: bool,
    /// Stored run whose rows re-initialize the state at every reporting point.
    pub schedule_run: Option<&'a str>,
}

pub struct RunResponse {
    pub run_id: String,
    pub manifest: RunManifest,
    pub table: ResultTable,
    pub loaded_from_cache: bool,
    /// `None` for cached runs.
    pub stats: Option<SolverStats>,
    pub solve_time_s: f64,
}

/// Load the run from the store when cached, otherwise solve and save it.
pub fn ensure_run<F>(request: &RunRequest<'_>, progress: Option<F>) -> CliResult<RunResponse>
where
    F: FnMut(&SolveProgress<'_>) + Send + 'static,
{
    let config = request.config;
    let version = match request.schedule_run {
        Some(schedule) => format!("{SOLVER_VERSION}+schedule:{schedule}"),
        None => SOLVER_VERSION.to_string(),
    };
    let run_id = compute_run_id(config, &version);

    if request.use_cache && request.store.has_run(&run_id) {
        tracing::info!(run_id = %run_id, "loading cached run");
        let manifest = request.store.load_manifest(&run_id)?;
        let table = request.store.load_table(&run_id)?;
        return Ok(RunResponse {
            run_id,
            manifest,
            table,
            loaded_from_cache: true,
            stats: None,
            solve_time_s: 0.0,
        });
    }

    let mut built = models::build(&config.model)?;
    let mut solver = Solver::new(method(config.solver.method), solver_config(&config.solver));
    if let Some(listener) = progress {
        solver.subscribe(listener);
    }

    let started = Instant::now();
    let (table, run_type) = match request.schedule_run {
        Some(schedule_id) => {
            let schedule = request.store.load_table(schedule_id)?;
            let table = solver.solve_with_schedule(&mut *built.model, &built.initial, &schedule)?;
            let run_type = RunType::Schedule {
                points: schedule.len(),
            };
            (table, run_type)
        }
        None => {
            let times = config.time.to_points();
            let table = solver.solve(&mut *built.model, &built.initial, &times)?;
            (table, grid_run_type(&config.time, &times))
        }
    };
    let solve_time_s = started.elapsed().as_secs_f64();

    let manifest = RunManifest {
        run_id: run_id.clone(),
        name: config.name.clone(),
        model_kind: config.model.kind.clone(),
        timestamp: RunManifest::now_timestamp(),
        method: solver.method().name().to_string(),
        run_type,
        columns: table.columns().to_vec(),
        intermediate_columns: table.intermediate_columns().to_vec(),
        unstable: solver.is_unstable(),
        solver_version: SOLVER_VERSION.to_string(),
    };
    request.store.save_run(&manifest, &table)?;
    tracing::info!(run_id = %run_id, rows = table.len(), "run saved");

    Ok(RunResponse {
        run_id,
        manifest,
        table,
        loaded_from_cache: false,
        stats: Some(solver.stats()),
        solve_time_s,
    })
}

fn grid_run_type(time: &TimeDef, times: &[f64]) -> RunType {
    match time {
        TimeDef::Uniform { start, end, points } => RunType::Grid {
            t_start: *start,
            t_end: *end,
            points: *points,
        },
        TimeDef::Points { .. } => RunType::Grid {
            t_start: times.first().copied().unwrap_or(0.0),
            t_end: times.last().copied().unwrap_or(0.0),
            points: times.len(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hy_project::ModelDef;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_store(tag: &str) -> (RunStore, PathBuf) {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("hy_cli_{tag}_{nanos}"));
        (RunStore::new(dir.clone()).unwrap(), dir)
    }

    fn decay_config() -> RunConfig {
        RunConfig {
            version: 1,
            name: "decay".to_string(),
            model: ModelDef {
                kind: "decay".to_string(),
                parameters: Default::default(),
                initial: Default::default(),
            },
            solver: SolverDef::default(),
            time: TimeDef::Uniform {
                start: 0.0,
                end: 1.0,
                points: 5,
            },
        }
    }

    type NoProgress = fn(&SolveProgress<'_>);

    #[test]
    fn solver_def_maps_onto_config() {
        let mut def = SolverDef::default();
        def.h_max = Some(0.5);
        def.nonnegative = true;
        let cfg = solver_config(&def);
        assert_eq!(cfg.h_max, 0.5);
        assert_eq!(cfg.h_min, SolverConfig::default().h_min);
        assert!(cfg.nonnegative);
        assert_eq!(cfg.tolerances.rel, def.rel_tol);
        cfg.validate().unwrap();
    }

    #[test]
    fn second_run_comes_from_cache() {
        let (store, dir) = temp_store("cache");
        let config = decay_config();
        let request = RunRequest {
            config: &config,
            store: &store,
            use_cache: true,
            schedule_run: None,
        };

        let first = ensure_run(&request, None::<NoProgress>).unwrap();
        assert!(!first.loaded_from_cache);
        assert_eq!(first.table.len(), 5);
        assert_eq!(first.manifest.method, "rosenbrock");

        let second = ensure_run(&request, None::<NoProgress>).unwrap();
        assert!(second.loaded_from_cache);
        assert_eq!(second.run_id, first.run_id);
        assert_eq!(second.table, first.table);

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn schedule_run_reuses_stored_rows() {
        let (store, dir) = temp_store("schedule");
        let config = decay_config();
        let base = ensure_run(
            &RunRequest {
                config: &config,
                store: &store,
                use_cache: false,
                schedule_run: None,
            },
            None::<NoProgress>,
        )
        .unwrap();

        let scheduled = ensure_run(
            &RunRequest {
                config: &config,
                store: &store,
                use_cache: false,
                schedule_run: Some(&base.run_id),
            },
            None::<NoProgress>,
        )
        .unwrap();

        assert_ne!(scheduled.run_id, base.run_id);
        assert!(matches!(
            scheduled.manifest.run_type,
            RunType::Schedule { points: 5 }
        ));
        // Every row is overwritten by the stored trajectory.
        assert_eq!(scheduled.table.times(), base.table.times());
        for (a, b) in scheduled.table.rows().iter().zip(base.table.rows()) {
            assert_eq!(a.values, b.values);
        }

        std::fs::remove_dir_all(dir).ok();
    }
}
