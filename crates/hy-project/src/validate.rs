//! Run configuration validation logic.

use crate::schema::{RunConfig, SolverDef, TimeDef};

pub const LATEST_VERSION: u32 = 1;

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("Missing value: {field}")]
    Missing { field: String },

    #[error("Invalid value: {field} = {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unsupported version: {version}")]
    UnsupportedVersion { version: u32 },
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

pub fn validate_config(config: &RunConfig) -> Result<(), ValidationError> {
    if config.version == 0 || config.version > LATEST_VERSION {
        return Err(ValidationError::UnsupportedVersion {
            version: config.version,
        });
    }
    if config.name.trim().is_empty() {
        return Err(ValidationError::Missing {
            field: "name".to_string(),
        });
    }
    if config.model.kind.trim().is_empty() {
        return Err(ValidationError::Missing {
            field: "model.kind".to_string(),
        });
    }
    for (key, value) in config
        .model
        .parameters
        .iter()
        .chain(config.model.initial.iter())
    {
        if !value.is_finite() {
            return Err(invalid(&format!("model.{key}"), value, "must be finite"));
        }
    }

    validate_solver(&config.solver)?;
    validate_time(&config.time)?;
    Ok(())
}

fn validate_solver(solver: &SolverDef) -> Result<(), ValidationError> {
    if !(solver.step_size.is_finite() && solver.step_size > 0.0) {
        return Err(invalid(
            "solver.step_size",
            solver.step_size,
            "must be positive and finite",
        ));
    }
    for (field, value) in [
        ("solver.abs_tol", solver.abs_tol),
        ("solver.rel_tol", solver.rel_tol),
    ] {
        if !(value.is_finite() && value >= 0.0) {
            return Err(invalid(field, value, "must be non-negative and finite"));
        }
    }
    for (field, value) in [
        ("solver.h_min", solver.h_min),
        ("solver.event_precision", solver.event_precision),
        ("solver.fast_threshold", solver.fast_threshold),
    ] {
        if let Some(v) = value {
            if !(v.is_finite() && v > 0.0) {
                return Err(invalid(field, v, "must be positive and finite"));
            }
        }
    }
    if let Some(h_max) = solver.h_max {
        if !(h_max > 0.0) {
            return Err(invalid("solver.h_max", h_max, "must be positive"));
        }
        if let Some(h_min) = solver.h_min {
            if h_min > h_max {
                return Err(invalid("solver.h_min", h_min, "exceeds h_max"));
            }
        }
    }
    Ok(())
}

fn validate_time(time: &TimeDef) -> Result<(), ValidationError> {
    match time {
        TimeDef::Uniform { start, end, points } => {
            if !start.is_finite() || !end.is_finite() {
                return Err(invalid("time", format!("{start}..{end}"), "must be finite"));
            }
            if end <= start {
                return Err(invalid("time.end", end, "must exceed start"));
            }
            if *points < 2 {
                return Err(invalid("time.points", points, "need at least two points"));
            }
        }
        TimeDef::Points { times } => {
            if times.is_empty() {
                return Err(ValidationError::Missing {
                    field: "time.times".to_string(),
                });
            }
            if times.iter().any(|t| !t.is_finite()) {
                return Err(invalid("time.times", format!("{times:?}"), "must be finite"));
            }
            if times.windows(2).any(|w| w[1] <= w[0]) {
                return Err(invalid(
                    "time.times",
                    format!("{times:?}"),
                    "must be strictly increasing",
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ModelDef;

    fn base() -> RunConfig {
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
                points: 11,
            },
        }
    }

    #[test]
    fn accepts_defaults() {
        validate_config(&base()).unwrap();
    }

    #[test]
    fn rejects_future_version() {
        let mut cfg = base();
        cfg.version = LATEST_VERSION + 1;
        assert!(matches!(
            validate_config(&cfg),
            Err(ValidationError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn rejects_non_positive_step() {
        let mut cfg = base();
        cfg.solver.step_size = 0.0;
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn rejects_unsorted_points() {
        let mut cfg = base();
        cfg.time = TimeDef::Points {
            times: vec![0.0, 2.0, 1.0],
        };
        let err = validate_config(&cfg).unwrap_err();
        assert!(format!("{err}").contains("strictly increasing"));
    }

    #[test]
    fn rejects_inverted_step_limits() {
        let mut cfg = base();
        cfg.solver.h_min = Some(1.0);
        cfg.solver.h_max = Some(0.1);
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn rejects_nan_parameter() {
        let mut cfg = base();
        cfg.model.parameters.insert("k".to_string(), f64::NAN);
        assert!(validate_config(&cfg).is_err());
    }
}
