//! Run configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunConfig {
    pub version: u32,
    pub name: String,
    pub model: ModelDef,
    #[serde(default)]
    pub solver: SolverDef,
    pub time: TimeDef,
}

/// Which built-in model to run, with parameter and initial-value overrides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelDef {
    pub kind: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub initial: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MethodDef {
    ForwardEuler,
    Rk4,
    #[default]
    Rosenbrock,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SolverDef {
    #[serde(default)]
    pub method: MethodDef,
    #[serde(default = "default_step_size")]
    pub step_size: f64,
    #[serde(default = "default_abs_tol")]
    pub abs_tol: f64,
    #[serde(default = "default_rel_tol")]
    pub rel_tol: f64,
    #[serde(default)]
    pub nonnegative: bool,
    #[serde(default)]
    pub include_intermediates: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_precision: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fast_threshold: Option<f64>,
    #[serde(default)]
    pub event_seed: u64,
}

impl Default for SolverDef {
    fn default() -> Self {
        Self {
            method: MethodDef::default(),
            step_size: default_step_size(),
            abs_tol: default_abs_tol(),
            rel_tol: default_rel_tol(),
            nonnegative: false,
            include_intermediates: false,
            h_min: None,
            h_max: None,
            event_precision: None,
            fast_threshold: None,
            event_seed: 0,
        }
    }
}

fn default_step_size() -> f64 {
    0.01
}

fn default_abs_tol() -> f64 {
    1e-10
}

fn default_rel_tol() -> f64 {
    1e-6
}

/// Reporting time points.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum TimeDef {
    /// `points` evenly spaced reporting times from `start` to `end` inclusive.
    Uniform { start: f64, end: f64, points: usize },
    /// Explicit, strictly increasing reporting times.
    Points { times: Vec<f64> },
}

impl TimeDef {
    pub fn to_points(&self) -> Vec<f64> {
        match self {
            TimeDef::Uniform { start, end, points } => {
                let n = (*points).max(2);
                let dt = (end - start) / (n - 1) as f64;
                (0..n)
                    .map(|i| if i == n - 1 { *end } else { start + i as f64 * dt })
                    .collect()
            }
            TimeDef::Points { times } => times.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_grid_hits_both_ends() {
        let t = TimeDef::Uniform {
            start: 0.0,
            end: 1.0,
            points: 11,
        }
        .to_points();
        assert_eq!(t.len(), 11);
        assert_eq!(t[0], 0.0);
        assert_eq!(t[10], 1.0);
        assert!((t[3] - 0.3).abs() < 1e-15);
    }

    #[test]
    fn solver_defaults_fill_missing_fields() {
        let solver: SolverDef = serde_yaml::from_str("method: rk4\nstep_size: 0.5\n").unwrap();
        assert_eq!(solver.method, MethodDef::Rk4);
        assert_eq!(solver.step_size, 0.5);
        assert_eq!(solver.abs_tol, 1e-10);
        assert!(!solver.nonnegative);
        assert!(solver.h_min.is_none());
    }
}
