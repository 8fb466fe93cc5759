//! Trial records exchanged with the outer trial-execution loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::errors::{ObResult, TrialError};
use crate::parameter::ParameterValue;

/// Identifier the engine assigns to its own trials.
pub type TrialIndex = usize;

/// Name -> value assignment for a single point.
pub type Parameterization = BTreeMap<String, ParameterValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TrialStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TrialStatus::Completed | TrialStatus::Failed)
    }
}

/// Measured value of an objective or analyzed parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub parameter: String,
    pub value: f64,
    /// Standard error of the measurement, if known.
    pub sem: Option<f64>,
}

impl Evaluation {
    pub fn new(parameter: impl Into<String>, value: f64) -> Self {
        Self {
            parameter: parameter.into(),
            value,
            sem: None,
        }
    }

    pub fn with_sem(mut self, sem: f64) -> Self {
        self.sem = Some(sem);
        self
    }
}

/// A single evaluation request and, once evaluated, its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub id: Uuid,
    pub index: usize,
    /// Varying parameter names, in declaration order.
    pub parameter_names: Vec<String>,
    /// Values aligned with `parameter_names`; empty until filled.
    pub parameter_values: Vec<ParameterValue>,
    pub status: TrialStatus,
    /// Index of the matching engine trial, set by ask or attach.
    pub engine_trial_id: Option<TrialIndex>,
    pub objective_evaluations: Vec<Evaluation>,
    pub parameter_evaluations: Vec<Evaluation>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Trial {
    pub fn new(index: usize, parameter_names: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            index,
            parameter_names,
            parameter_values: Vec::new(),
            status: TrialStatus::Pending,
            engine_trial_id: None,
            objective_evaluations: Vec::new(),
            parameter_evaluations: Vec::new(),
            created_at: Utc::now(),
            finished_at: None,
            error: None,
        }
    }

    /// Build a trial whose parameter values were chosen outside the generator.
    pub fn with_values(
        index: usize,
        parameter_names: Vec<String>,
        parameter_values: Vec<ParameterValue>,
    ) -> ObResult<Self> {
        if parameter_names.len() != parameter_values.len() {
            return Err(TrialError::LengthMismatch {
                index,
                names: parameter_names.len(),
                values: parameter_values.len(),
            }
            .into());
        }
        let mut trial = Self::new(index, parameter_names);
        trial.parameter_values = parameter_values;
        Ok(trial)
    }

    pub fn mark_running(&mut self) {
        self.status = TrialStatus::Running;
    }

    pub fn complete(
        &mut self,
        objective_evaluations: Vec<Evaluation>,
        parameter_evaluations: Vec<Evaluation>,
    ) -> ObResult<()> {
        self.ensure_open()?;
        self.status = TrialStatus::Completed;
        self.finished_at = Some(Utc::now());
        self.objective_evaluations = objective_evaluations;
        self.parameter_evaluations = parameter_evaluations;
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> ObResult<()> {
        self.ensure_open()?;
        self.status = TrialStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error.into());
        Ok(())
    }

    fn ensure_open(&self) -> ObResult<()> {
        if self.status.is_terminal() {
            return Err(TrialError::AlreadyFinished {
                index: self.index,
                status: format!("{:?}", self.status).to_lowercase(),
            }
            .into());
        }
        Ok(())
    }

    pub fn completed(&self) -> bool {
        self.status == TrialStatus::Completed
    }

    pub fn failed(&self) -> bool {
        self.status == TrialStatus::Failed
    }

    /// Name -> value map of the parameter values.
    pub fn parameterization(&self) -> Parameterization {
        self.parameter_names
            .iter()
            .cloned()
            .zip(self.parameter_values.iter().copied())
            .collect()
    }

    pub fn value_of(&self, name: &str) -> Option<ParameterValue> {
        self.parameter_names
            .iter()
            .position(|n| n == name)
            .and_then(|i| self.parameter_values.get(i).copied())
    }

    pub fn objective_value(&self, name: &str) -> Option<f64> {
        self.objective_evaluations
            .iter()
            .find(|ev| ev.parameter == name)
            .map(|ev| ev.value)
    }
}
