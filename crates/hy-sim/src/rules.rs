//! Assignment and rate rules.

use crate::error::{SimError, SimResult};
use crate::model::{EventModel, RuleDefinition};
use hy_core::RuleId;

/// Rule table resolved from a model once per run.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    assignments: Vec<(RuleId, usize)>,
    rates: Vec<(RuleId, usize, Vec<usize>)>,
}

impl RuleSet {
    pub fn from_model(model: &dyn EventModel, dimension: usize) -> SimResult<Self> {
        let mut rules = RuleSet::default();
        for i in 0..model.rule_count() {
            let id = RuleId::from_usize(i);
            let definition = model
                .rule_definition(id)
                .ok_or_else(|| SimError::evaluation(format!("rule {id} has no definition")))?;
            match definition {
                RuleDefinition::Assignment { target } => {
                    check_target(target, dimension)?;
                    rules.assignments.push((id, target));
                }
                RuleDefinition::Rate { target, scaled } => {
                    check_target(target, dimension)?;
                    for &c in &scaled {
                        check_target(c, dimension)?;
                    }
                    rules.rates.push((id, target, scaled));
                }
            }
        }
        Ok(rules)
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty() && self.rates.is_empty()
    }

    pub fn has_rate_rules(&self) -> bool {
        !self.rates.is_empty()
    }

    /// Recompute every assignment-rule target in place.
    ///
    /// Returns whether any component changed value.
    pub fn apply_assignments(
        &self,
        model: &mut dyn EventModel,
        t: f64,
        y: &mut [f64],
    ) -> SimResult<bool> {
        let mut changed = false;
        for &(id, target) in &self.assignments {
            let value = model.evaluate_rule(id, t, y)?;
            let old = y[target];
            if value != old && !(value.is_nan() && old.is_nan()) {
                y[target] = value;
                changed = true;
            }
        }
        Ok(changed)
    }

    /// Overwrite rate-rule targets in `ydot` and rescale dependent components.
    ///
    /// A component `c` expressed relative to a scaling quantity `v` picks up
    /// `-c/v * dv/dt`.
    pub fn apply_rate_rules(
        &self,
        model: &mut dyn EventModel,
        t: f64,
        y: &[f64],
        ydot: &mut [f64],
    ) -> SimResult<()> {
        for (id, target, scaled) in &self.rates {
            let rate = model.evaluate_rule(*id, t, y)?;
            ydot[*target] = rate;
            let scale = y[*target];
            if scale == 0.0 {
                continue;
            }
            for &c in scaled {
                ydot[c] -= y[c] / scale * rate;
            }
        }
        Ok(())
    }
}

fn check_target(target: usize, dimension: usize) -> SimResult<()> {
    if target >= dimension {
        return Err(SimError::evaluation(format!(
            "rule target {target} outside state of dimension {dimension}"
        )));
    }
    Ok(())
}
