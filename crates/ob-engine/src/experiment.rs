//! Engine-side experiment state: search space, objectives, constraints and
//! the engine's own trial table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use ob_types::{
    EngineError, EngineResult, Objective, ParameterValue, Parameterization, TrialIndex,
};

use crate::constraints::{OutcomeConstraint, ParameterConstraint};

/// Numeric kind of a range parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    Float,
    Int,
}

/// Bounded range parameter as registered with the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeParameterSpec {
    pub name: String,
    pub kind: ParameterKind,
    pub bounds: [f64; 2],
    pub is_fidelity: bool,
    pub target_value: Option<f64>,
}

impl RangeParameterSpec {
    pub fn lower(&self) -> f64 {
        self.bounds[0]
    }

    pub fn upper(&self) -> f64 {
        self.bounds[1]
    }

    /// Cast a raw coordinate to this parameter's kind.
    pub fn cast(&self, value: f64) -> ParameterValue {
        match self.kind {
            ParameterKind::Float => ParameterValue::Float(value),
            ParameterKind::Int => ParameterValue::Int(value.round() as i64),
        }
    }

    /// Map `u` in `[0, 1)` onto the parameter range.
    pub fn scale(&self, u: f64) -> ParameterValue {
        let (low, high) = (self.lower(), self.upper());
        match self.kind {
            ParameterKind::Float => ParameterValue::Float(low + u * (high - low)),
            ParameterKind::Int => {
                // Each integer gets an equal share of the unit interval.
                let span = (high.floor() - low.ceil() + 1.0).max(1.0);
                let v = low.ceil() + (u * span).floor().min(span - 1.0);
                ParameterValue::Int(v as i64)
            }
        }
    }

    pub fn contains(&self, value: &ParameterValue) -> bool {
        let v = value.as_f64();
        v >= self.lower() && v <= self.upper()
    }

    fn validate(&self) -> EngineResult<()> {
        if !(self.lower() < self.upper()) {
            return Err(EngineError::InvalidExperiment {
                message: format!(
                    "parameter '{}' has empty range [{}, {}]",
                    self.name,
                    self.lower(),
                    self.upper()
                ),
            });
        }
        if self.kind == ParameterKind::Int && self.lower().ceil() > self.upper().floor() {
            return Err(EngineError::InvalidExperiment {
                message: format!(
                    "int parameter '{}' has no integer in [{}, {}]",
                    self.name,
                    self.lower(),
                    self.upper()
                ),
            });
        }
        Ok(())
    }
}

/// Parameter name -> pinned value used during generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixedFeatures(BTreeMap<String, f64>);

impl FixedFeatures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl FromIterator<(String, f64)> for FixedFeatures {
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub parameters: Vec<RangeParameterSpec>,
    pub constraints: Vec<ParameterConstraint>,
}

impl SearchSpace {
    pub fn get(&self, name: &str) -> Option<&RangeParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Replace the spec with the same name.
    pub fn update_parameter(&mut self, spec: RangeParameterSpec) -> EngineResult<()> {
        spec.validate()?;
        let slot = self
            .parameters
            .iter_mut()
            .find(|p| p.name == spec.name)
            .ok_or_else(|| EngineError::UnknownName {
                what: "parameter".to_string(),
                name: spec.name.clone(),
            })?;
        *slot = spec;
        Ok(())
    }

    pub fn contains(&self, point: &Parameterization) -> bool {
        self.parameters
            .iter()
            .all(|p| point.get(&p.name).is_some_and(|v| p.contains(v)))
    }

    pub fn satisfies_constraints(&self, point: &Parameterization) -> bool {
        self.constraints.iter().all(|c| c.is_satisfied(point))
    }
}

/// A single metric observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub mean: f64,
    pub sem: Option<f64>,
}

impl Observation {
    pub fn new(mean: f64, sem: Option<f64>) -> Self {
        Self { mean, sem }
    }
}

/// Metric name -> observation, as submitted on completion.
pub type RawData = BTreeMap<String, Observation>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineTrialStatus {
    Running,
    Completed,
    Abandoned,
    Failed,
}

impl EngineTrialStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, EngineTrialStatus::Running)
    }
}

impl fmt::Display for EngineTrialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngineTrialStatus::Running => "running",
            EngineTrialStatus::Completed => "completed",
            EngineTrialStatus::Abandoned => "abandoned",
            EngineTrialStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Where an engine trial's parameters came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialSource {
    Generated { step: usize },
    Attached,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineTrial {
    pub index: TrialIndex,
    pub parameters: Parameterization,
    pub status: EngineTrialStatus,
    pub source: TrialSource,
    pub data: Option<RawData>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl EngineTrial {
    fn transition(
        &mut self,
        to: EngineTrialStatus,
        action: &str,
        force: bool,
    ) -> EngineResult<()> {
        if self.status.is_terminal() && !force {
            return Err(EngineError::InvalidTrialState {
                index: self.index,
                status: self.status.to_string(),
                action: action.to_string(),
            });
        }
        self.status = to;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn complete(&mut self, data: RawData) -> EngineResult<()> {
        self.transition(EngineTrialStatus::Completed, "complete", false)?;
        self.data = Some(data);
        Ok(())
    }

    /// Exclude from model fitting. `force` also applies to finished trials.
    pub fn mark_abandoned(&mut self, force: bool) -> EngineResult<()> {
        self.transition(EngineTrialStatus::Abandoned, "abandon", force)
    }

    pub fn mark_failed(&mut self, force: bool) -> EngineResult<()> {
        self.transition(EngineTrialStatus::Failed, "fail", force)
    }
}

/// A completed point with the observed means of every objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedPoint {
    pub trial_index: TrialIndex,
    pub parameters: Parameterization,
    pub objectives: BTreeMap<String, f64>,
}

/// Everything needed to register an experiment with an engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSpec {
    pub parameters: Vec<RangeParameterSpec>,
    pub objectives: Vec<Objective>,
    pub parameter_constraints: Vec<String>,
    pub outcome_constraints: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub search_space: SearchSpace,
    pub objectives: Vec<Objective>,
    pub outcome_constraints: Vec<OutcomeConstraint>,
    trials: BTreeMap<TrialIndex, EngineTrial>,
}

impl Experiment {
    pub fn from_spec(spec: ExperimentSpec) -> EngineResult<Self> {
        if spec.parameters.is_empty() {
            return Err(EngineError::InvalidExperiment {
                message: "at least one parameter is required".to_string(),
            });
        }
        if spec.objectives.is_empty() {
            return Err(EngineError::InvalidExperiment {
                message: "at least one objective is required".to_string(),
            });
        }
        let mut seen = HashSet::new();
        for p in &spec.parameters {
            p.validate()?;
            if !seen.insert(p.name.as_str()) {
                return Err(EngineError::InvalidExperiment {
                    message: format!("duplicate parameter '{}'", p.name),
                });
            }
        }
        let mut objective_names = HashSet::new();
        for o in &spec.objectives {
            if !objective_names.insert(o.name.as_str()) {
                return Err(EngineError::InvalidExperiment {
                    message: format!("duplicate objective '{}'", o.name),
                });
            }
        }

        let constraints = spec
            .parameter_constraints
            .iter()
            .map(|s| ParameterConstraint::parse(s))
            .collect::<EngineResult<Vec<_>>>()?;
        for c in &constraints {
            if let Some(unknown) = c.names().find(|n| !seen.contains(n)) {
                return Err(EngineError::UnknownName {
                    what: format!("parameter in constraint '{}'", c.expression),
                    name: unknown.to_string(),
                });
            }
        }

        let outcome_constraints = spec
            .outcome_constraints
            .iter()
            .map(|s| OutcomeConstraint::parse(s))
            .collect::<EngineResult<Vec<_>>>()?;
        if let Some(oc) = outcome_constraints
            .iter()
            .find(|oc| objective_names.contains(oc.metric.as_str()))
        {
            return Err(EngineError::InvalidExperiment {
                message: format!("outcome constraint '{}' targets an objective", oc.expression),
            });
        }

        Ok(Self {
            search_space: SearchSpace {
                parameters: spec.parameters,
                constraints,
            },
            objectives: spec.objectives,
            outcome_constraints,
            trials: BTreeMap::new(),
        })
    }

    pub fn add_trial(&mut self, parameters: Parameterization, source: TrialSource) -> TrialIndex {
        let index = self.trials.len();
        self.trials.insert(
            index,
            EngineTrial {
                index,
                parameters,
                status: EngineTrialStatus::Running,
                source,
                data: None,
                created_at: Utc::now(),
                finished_at: None,
            },
        );
        index
    }

    pub fn trial(&self, index: TrialIndex) -> EngineResult<&EngineTrial> {
        self.trials
            .get(&index)
            .ok_or(EngineError::TrialNotFound { index })
    }

    pub fn trial_mut(&mut self, index: TrialIndex) -> EngineResult<&mut EngineTrial> {
        self.trials
            .get_mut(&index)
            .ok_or(EngineError::TrialNotFound { index })
    }

    pub fn trials(&self) -> impl Iterator<Item = &EngineTrial> {
        self.trials.values()
    }

    pub fn num_trials(&self) -> usize {
        self.trials.len()
    }

    /// Completed trials whose data covers every objective, as observed points.
    pub fn observed_points(&self) -> Vec<ObservedPoint> {
        self.trials
            .values()
            .filter(|t| t.status == EngineTrialStatus::Completed)
            .filter_map(|t| {
                let data = t.data.as_ref()?;
                let objectives = self
                    .objectives
                    .iter()
                    .map(|o| data.get(&o.name).map(|obs| (o.name.clone(), obs.mean)))
                    .collect::<Option<BTreeMap<_, _>>>()?;
                Some(ObservedPoint {
                    trial_index: t.index,
                    parameters: t.parameters.clone(),
                    objectives,
                })
            })
            .collect()
    }

    /// Whether a completed trial satisfies every outcome constraint.
    /// Missing constraint data counts as infeasible.
    pub fn is_feasible(&self, index: TrialIndex) -> bool {
        let Some(data) = self.trials.get(&index).and_then(|t| t.data.as_ref()) else {
            return false;
        };
        self.outcome_constraints.iter().all(|oc| {
            data.get(&oc.metric)
                .is_some_and(|obs| oc.is_satisfied(obs.mean))
        })
    }
}
