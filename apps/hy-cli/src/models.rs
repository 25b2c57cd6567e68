//! Built-in demonstration models.
//!
//! Every model takes named parameters with defaults and named initial values;
//! a run configuration may override either by name.

use crate::error::{CliError, CliResult};
use hy_core::{EventId, RuleId};
use hy_project::ModelDef;
use hy_sim::{
    AssignmentTarget, DelayModel, DelayQuery, EventDefinition, EventModel, FastProcessModel,
    OdeModel, RuleDefinition, SimResult,
};
use std::collections::BTreeMap;

pub struct ModelInfo {
    pub kind: &'static str,
    pub description: &'static str,
    pub parameters: &'static [(&'static str, f64)],
}

const DECAY_PARAMS: [(&str, f64); 1] = [("k", 1.0)];
const ROBERTSON_PARAMS: [(&str, f64); 3] = [("k1", 0.04), ("k2", 3e7), ("k3", 1e4)];
const DOSING_PARAMS: [(&str, f64); 4] = [
    ("dose", 1.0),
    ("interval", 4.0),
    ("k_el", 0.3),
    ("volume", 1.0),
];
const EQUILIBRIUM_PARAMS: [(&str, f64); 3] = [("kf", 100.0), ("kb", 50.0), ("k", 0.5)];
const LOGISTIC_PARAMS: [(&str, f64); 3] = [("r", 1.0), ("capacity", 10.0), ("tau", 1.0)];

pub const MODELS: &[ModelInfo] = &[
    ModelInfo {
        kind: "decay",
        description: "first-order decay x' = -k x",
        parameters: &DECAY_PARAMS,
    },
    ModelInfo {
        kind: "robertson",
        description: "Robertson stiff chemical kinetics",
        parameters: &ROBERTSON_PARAMS,
    },
    ModelInfo {
        kind: "dosing",
        description: "repeated dosing with priority events and a concentration rule",
        parameters: &DOSING_PARAMS,
    },
    ModelInfo {
        kind: "fast_equilibrium",
        description: "fast A <-> B equilibrium draining slowly into C",
        parameters: &EQUILIBRIUM_PARAMS,
    },
    ModelInfo {
        kind: "delayed_logistic",
        description: "Hutchinson delayed logistic growth",
        parameters: &LOGISTIC_PARAMS,
    },
];

/// A model ready to run, with its resolved initial state.
pub struct BuiltModel {
    pub model: Box<dyn OdeModel>,
    pub initial: Vec<f64>,
}

pub fn build(def: &ModelDef) -> CliResult<BuiltModel> {
    let kind = def.kind.as_str();
    let (model, defaults): (Box<dyn OdeModel>, Vec<f64>) = match kind {
        "decay" => {
            let [k] = parameters(kind, &def.parameters, DECAY_PARAMS)?;
            (Box::new(Decay { k }), vec![1.0])
        }
        "robertson" => {
            let [k1, k2, k3] = parameters(kind, &def.parameters, ROBERTSON_PARAMS)?;
            (Box::new(Robertson { k1, k2, k3 }), vec![1.0, 0.0, 0.0])
        }
        "dosing" => {
            let [dose, interval, k_el, volume] = parameters(kind, &def.parameters, DOSING_PARAMS)?;
            if !(interval > 0.0 && volume > 0.0) {
                return Err(CliError::InvalidInput(
                    "dosing interval and volume must be positive".to_string(),
                ));
            }
            let model = Dosing {
                dose,
                interval,
                k_el,
                volume,
            };
            (Box::new(model), vec![0.0, dose, dose, dose / volume])
        }
        "fast_equilibrium" => {
            let [kf, kb, k] = parameters(kind, &def.parameters, EQUILIBRIUM_PARAMS)?;
            let model = FastEquilibrium {
                kf,
                kb,
                k,
                fast_only: false,
            };
            (Box::new(model), vec![1.0, 0.0, 0.0])
        }
        "delayed_logistic" => {
            let [r, capacity, tau] = parameters(kind, &def.parameters, LOGISTIC_PARAMS)?;
            if !(tau > 0.0 && capacity > 0.0) {
                return Err(CliError::InvalidInput(
                    "delay and capacity must be positive".to_string(),
                ));
            }
            let model = DelayedLogistic {
                r,
                capacity,
                tau,
                included: true,
                lagged: None,
            };
            (Box::new(model), vec![1.0])
        }
        other => return Err(CliError::UnknownModel(other.to_string())),
    };

    let initial = initial_state(kind, &model.identifiers(), defaults, &def.initial)?;
    Ok(BuiltModel { model, initial })
}

fn parameters<const N: usize>(
    kind: &str,
    overrides: &BTreeMap<String, f64>,
    defaults: [(&'static str, f64); N],
) -> CliResult<[f64; N]> {
    if let Some(key) = overrides
        .keys()
        .find(|key| !defaults.iter().any(|(name, _)| key.as_str() == *name))
    {
        return Err(CliError::InvalidInput(format!(
            "model '{kind}' has no parameter '{key}'"
        )));
    }
    Ok(defaults.map(|(name, value)| overrides.get(name).copied().unwrap_or(value)))
}

fn initial_state(
    kind: &str,
    identifiers: &[String],
    mut y: Vec<f64>,
    overrides: &BTreeMap<String, f64>,
) -> CliResult<Vec<f64>> {
    for (key, value) in overrides {
        let index = identifiers.iter().position(|id| id == key).ok_or_else(|| {
            CliError::InvalidInput(format!("model '{kind}' has no state '{key}'"))
        })?;
        y[index] = *value;
    }
    Ok(y)
}

struct Decay {
    k: f64,
}

impl OdeModel for Decay {
    fn dimension(&self) -> usize {
        1
    }

    fn identifiers(&self) -> Vec<String> {
        vec!["x".to_string()]
    }

    fn compute_derivatives(&mut self, _t: f64, y: &[f64], ydot: &mut [f64]) -> SimResult<()> {
        ydot[0] = -self.k * y[0];
        Ok(())
    }

    fn intermediate_identifiers(&self) -> Vec<String> {
        vec!["elimination_rate".to_string()]
    }

    fn compute_intermediates(&mut self, _t: f64, y: &[f64], out: &mut [f64]) -> SimResult<()> {
        out[0] = self.k * y[0];
        Ok(())
    }
}

struct Robertson {
    k1: f64,
    k2: f64,
    k3: f64,
}

impl OdeModel for Robertson {
    fn dimension(&self) -> usize {
        3
    }

    fn identifiers(&self) -> Vec<String> {
        vec!["y1".to_string(), "y2".to_string(), "y3".to_string()]
    }

    fn compute_derivatives(&mut self, _t: f64, y: &[f64], ydot: &mut [f64]) -> SimResult<()> {
        let r1 = self.k1 * y[0];
        let r2 = self.k3 * y[1] * y[2];
        let r3 = self.k2 * y[1] * y[1];
        ydot[0] = -r1 + r2;
        ydot[1] = r1 - r2 - r3;
        ydot[2] = r3;
        Ok(())
    }
}

/// One-compartment dosing.
///
/// A clock component drives two simultaneous events every `interval`: the
/// dose (priority 2) adds `dose` to the amount and resets the clock, then the
/// peak record (priority 1) copies the post-dose amount. The concentration
/// follows the amount through an assignment rule.
struct Dosing {
    dose: f64,
    interval: f64,
    k_el: f64,
    volume: f64,
}

const CLOCK: usize = 0;
const AMOUNT: usize = 1;
const PEAK: usize = 2;
const CONCENTRATION: usize = 3;

const DOSE_EVENT: usize = 0;

impl OdeModel for Dosing {
    fn dimension(&self) -> usize {
        4
    }

    fn identifiers(&self) -> Vec<String> {
        ["clock", "amount", "last_peak", "concentration"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn compute_derivatives(&mut self, _t: f64, y: &[f64], ydot: &mut [f64]) -> SimResult<()> {
        ydot[CLOCK] = 1.0;
        ydot[AMOUNT] = -self.k_el * y[AMOUNT];
        ydot[PEAK] = 0.0;
        ydot[CONCENTRATION] = 0.0;
        Ok(())
    }

    fn event_model(&mut self) -> Option<&mut dyn EventModel> {
        Some(self)
    }
}

impl EventModel for Dosing {
    fn event_count(&self) -> usize {
        2
    }

    fn event_definition(&self, event: EventId) -> EventDefinition {
        let targets = if event.slot() == DOSE_EVENT {
            vec![AssignmentTarget::State(AMOUNT), AssignmentTarget::State(CLOCK)]
        } else {
            vec![AssignmentTarget::State(PEAK)]
        };
        // Persistent: the dose resets the clock before the peak record runs.
        EventDefinition {
            persistent: true,
            use_values_from_trigger_time: false,
            targets,
        }
    }

    fn evaluate_trigger(&mut self, _event: EventId, _t: f64, y: &[f64]) -> SimResult<bool> {
        Ok(y[CLOCK] >= self.interval)
    }

    fn evaluate_priority(&mut self, event: EventId, _t: f64, _y: &[f64]) -> SimResult<Option<f64>> {
        Ok(Some(if event.slot() == DOSE_EVENT { 2.0 } else { 1.0 }))
    }

    fn evaluate_assignments(
        &mut self,
        event: EventId,
        _t: f64,
        y: &[f64],
        out: &mut Vec<f64>,
    ) -> SimResult<()> {
        out.clear();
        if event.slot() == DOSE_EVENT {
            out.extend([y[AMOUNT] + self.dose, 0.0]);
        } else {
            out.push(y[AMOUNT]);
        }
        Ok(())
    }

    fn rule_count(&self) -> usize {
        1
    }

    fn rule_definition(&self, _rule: RuleId) -> Option<RuleDefinition> {
        Some(RuleDefinition::Assignment {
            target: CONCENTRATION,
        })
    }

    fn evaluate_rule(&mut self, _rule: RuleId, _t: f64, y: &[f64]) -> SimResult<f64> {
        Ok(y[AMOUNT] / self.volume)
    }
}

/// `A <-> B` at rates `kf`/`kb` (fast), `B -> C` at rate `k` (slow).
struct FastEquilibrium {
    kf: f64,
    kb: f64,
    k: f64,
    fast_only: bool,
}

impl OdeModel for FastEquilibrium {
    fn dimension(&self) -> usize {
        3
    }

    fn identifiers(&self) -> Vec<String> {
        vec!["a".to_string(), "b".to_string(), "c".to_string()]
    }

    fn compute_derivatives(&mut self, _t: f64, y: &[f64], ydot: &mut [f64]) -> SimResult<()> {
        let exchange = self.kf * y[0] - self.kb * y[1];
        let drain = if self.fast_only { 0.0 } else { self.k * y[1] };
        ydot[0] = -exchange;
        ydot[1] = exchange - drain;
        ydot[2] = drain;
        Ok(())
    }

    fn fast_process_model(&mut self) -> Option<&mut dyn FastProcessModel> {
        Some(self)
    }
}

impl FastProcessModel for FastEquilibrium {
    fn contains_fast_processes(&self) -> bool {
        true
    }

    fn set_fast_process_computation(&mut self, enabled: bool) {
        self.fast_only = enabled;
    }
}

/// `N' = r N (1 - N(t - tau) / K)`
struct DelayedLogistic {
    r: f64,
    capacity: f64,
    tau: f64,
    included: bool,
    lagged: Option<f64>,
}

impl OdeModel for DelayedLogistic {
    fn dimension(&self) -> usize {
        1
    }

    fn identifiers(&self) -> Vec<String> {
        vec!["population".to_string()]
    }

    fn compute_derivatives(&mut self, _t: f64, y: &[f64], ydot: &mut [f64]) -> SimResult<()> {
        let lagged = match self.lagged.take() {
            Some(v) if self.included && v.is_finite() => v,
            _ => y[0],
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
        self.lagged = values.first().copied();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hy_sim::{Solver, SolverConfig};

    fn def(kind: &str) -> ModelDef {
        ModelDef {
            kind: kind.to_string(),
            parameters: BTreeMap::new(),
            initial: BTreeMap::new(),
        }
    }

    #[test]
    fn every_listed_model_builds() {
        for info in MODELS {
            let built = build(&def(info.kind)).unwrap();
            assert_eq!(built.initial.len(), built.model.dimension());
            assert_eq!(built.model.identifiers().len(), built.model.dimension());
        }
    }

    #[test]
    fn demo_configs_load_and_build() {
        let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos");
        let mut seen = 0;
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            let config = hy_project::load_config(&path).unwrap();
            build(&config.model).unwrap();
            seen += 1;
        }
        assert_eq!(seen, MODELS.len());
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert!(matches!(
            build(&def("lorenz")),
            Err(CliError::UnknownModel(_))
        ));

        let mut d = def("decay");
        d.parameters.insert("rate".to_string(), 2.0);
        assert!(matches!(build(&d), Err(CliError::InvalidInput(_))));

        let mut d = def("decay");
        d.initial.insert("y".to_string(), 2.0);
        assert!(matches!(build(&d), Err(CliError::InvalidInput(_))));
    }

    #[test]
    fn overrides_apply_by_name() {
        let mut d = def("robertson");
        d.initial.insert("y3".to_string(), 0.5);
        d.parameters.insert("k1".to_string(), 0.1);
        let built = build(&d).unwrap();
        assert_eq!(built.initial, vec![1.0, 0.0, 0.5]);
    }

    #[test]
    fn dosing_records_post_dose_peak() {
        let mut built = build(&def("dosing")).unwrap();
        let mut solver = Solver::default();
        let table = solver
            .solve(&mut *built.model, &built.initial, &[0.0, 3.0, 5.0])
            .unwrap();

        let before = &table.rows()[1].values;
        assert!((before[PEAK] - 1.0).abs() < 1e-12);

        // Dose at t = 4 lands on top of what is left of the first one.
        let after = &table.rows()[2].values;
        let expected_peak = 1.0 + (-0.3f64 * 4.0).exp();
        assert!((after[PEAK] - expected_peak).abs() < 1e-4, "peak = {}", after[PEAK]);
        assert!((after[CLOCK] - 1.0).abs() < 1e-4);
        for row in table.rows() {
            assert!((row.values[CONCENTRATION] - row.values[AMOUNT]).abs() < 1e-9);
        }
    }

    #[test]
    fn fast_equilibrium_is_held_at_its_ratio() {
        let mut built = build(&def("fast_equilibrium")).unwrap();
        let mut solver = Solver::new(hy_sim::Method::Rosenbrock, SolverConfig::default());
        let table = solver
            .solve(&mut *built.model, &built.initial, &[0.0, 0.5, 1.0])
            .unwrap();

        for row in &table.rows()[1..] {
            let v = &row.values;
            assert!((v[1] / v[0] - 2.0).abs() < 1e-3, "a={} b={}", v[0], v[1]);
            assert!((v.iter().sum::<f64>() - 1.0).abs() < 1e-6);
        }
    }
}
