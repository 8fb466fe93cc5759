//! Generation plan: the ordered phases an engine walks through when
//! proposing new points.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use ob_types::{EngineError, EngineResult};

use crate::model::IncumbentModel;

/// Which proposal mechanism a generation step uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelKind {
    /// Scrambled Sobol sequence.
    Sobol,
    /// Surrogate fitted on completed trials.
    Surrogate,
}

impl ModelKind {
    pub fn is_quasi_random(&self) -> bool {
        matches!(self, ModelKind::Sobol)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Precision {
    Single,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Device {
    Cpu,
    Cuda(u32),
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(id) => write!(f, "cuda:{id}"),
        }
    }
}

/// Hyperparameters handed to model-based steps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelOptions {
    pub precision: Precision,
    pub device: Device,
    /// Fit on observations that fall outside the current parameter bounds.
    pub fit_out_of_design: bool,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            precision: Precision::Double,
            device: Device::Cpu,
            fit_out_of_design: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    pub kind: ModelKind,
    pub options: ModelOptions,
    /// Runtime-only; never serialized.
    #[serde(skip)]
    pub fitted_model: Option<Arc<IncumbentModel>>,
}

impl ModelSpec {
    pub fn new(kind: ModelKind, options: ModelOptions) -> Self {
        Self {
            kind,
            options,
            fitted_model: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CriterionKind {
    /// Step ends once it has generated `threshold` trials.
    TrialCount,
    /// Step cannot end before `threshold` of its trials completed.
    MinTrialsObserved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionCriterion {
    pub kind: CriterionKind,
    pub threshold: usize,
}

/// One phase of the generation plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationStep {
    pub model_spec: ModelSpec,
    /// Trials this step should generate; `None` means unlimited.
    pub num_trials: Option<usize>,
    pub transition_criteria: Vec<TransitionCriterion>,
    pub trials_generated: usize,
    pub trials_observed: usize,
}

impl GenerationStep {
    pub fn new(kind: ModelKind, num_trials: Option<usize>, options: ModelOptions) -> Self {
        let transition_criteria = num_trials
            .map(|n| {
                vec![TransitionCriterion {
                    kind: CriterionKind::TrialCount,
                    threshold: n,
                }]
            })
            .unwrap_or_default();
        Self {
            model_spec: ModelSpec::new(kind, options),
            num_trials,
            transition_criteria,
            trials_generated: 0,
            trials_observed: 0,
        }
    }

    pub fn with_min_trials_observed(mut self, threshold: usize) -> Self {
        self.transition_criteria.retain(|c| c.kind != CriterionKind::MinTrialsObserved);
        self.transition_criteria.push(TransitionCriterion {
            kind: CriterionKind::MinTrialsObserved,
            threshold,
        });
        self
    }

    pub fn model(&self) -> ModelKind {
        self.model_spec.kind
    }

    pub fn is_quasi_random(&self) -> bool {
        self.model_spec.kind.is_quasi_random()
    }

    pub fn criterion(&self, kind: CriterionKind) -> Option<&TransitionCriterion> {
        self.transition_criteria.iter().find(|c| c.kind == kind)
    }

    pub fn criterion_mut(&mut self, kind: CriterionKind) -> Option<&mut TransitionCriterion> {
        self.transition_criteria.iter_mut().find(|c| c.kind == kind)
    }

    /// Trials left before the trial-count criterion is met.
    pub fn remaining_trials(&self) -> Option<usize> {
        self.num_trials
            .map(|n| n.saturating_sub(self.trials_generated))
    }

    /// Whether every transition criterion of this step is satisfied.
    pub fn is_complete(&self) -> bool {
        if self.transition_criteria.is_empty() {
            return false;
        }
        self.transition_criteria.iter().all(|c| match c.kind {
            CriterionKind::TrialCount => self.trials_generated >= c.threshold,
            CriterionKind::MinTrialsObserved => self.trials_observed >= c.threshold,
        })
    }

    /// Whether the trial budget of this step is used up, irrespective of
    /// observation requirements.
    pub fn is_exhausted(&self) -> bool {
        self.criterion(CriterionKind::TrialCount)
            .is_some_and(|c| self.trials_generated >= c.threshold)
    }
}

/// Ordered sequence of generation steps plus the cursor into it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationStrategy {
    pub name: String,
    steps: Vec<GenerationStep>,
    current: usize,
    /// Most recently fitted model. Runtime-only.
    #[serde(skip)]
    model: Option<Arc<IncumbentModel>>,
}

impl GenerationStrategy {
    pub fn new(name: impl Into<String>, steps: Vec<GenerationStep>) -> EngineResult<Self> {
        if steps.is_empty() {
            return Err(EngineError::InvalidExperiment {
                message: "generation strategy needs at least one step".to_string(),
            });
        }
        if let Some(pos) = steps[..steps.len() - 1]
            .iter()
            .position(|s| s.num_trials.is_none())
        {
            return Err(EngineError::InvalidExperiment {
                message: format!("only the last generation step may be unlimited (step {pos} is)"),
            });
        }
        let mut strategy = Self {
            name: name.into(),
            steps,
            current: 0,
            model: None,
        };
        // Skip steps that start out with nothing to do (e.g. zero Sobol trials).
        strategy.maybe_move_to_next_step();
        Ok(strategy)
    }

    /// Sobol for `n_init` trials, then an unlimited surrogate step.
    pub fn sobol_then_surrogate(n_init: usize, options: ModelOptions) -> Self {
        let steps = vec![
            GenerationStep::new(ModelKind::Sobol, Some(n_init), options),
            GenerationStep::new(ModelKind::Surrogate, None, options),
        ];
        Self {
            name: "Sobol+Surrogate".to_string(),
            steps,
            current: 0,
            model: None,
        }
        .started()
    }

    fn started(mut self) -> Self {
        self.maybe_move_to_next_step();
        self
    }

    pub fn steps(&self) -> &[GenerationStep] {
        &self.steps
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_step(&self) -> &GenerationStep {
        &self.steps[self.current]
    }

    pub fn current_step_mut(&mut self) -> &mut GenerationStep {
        &mut self.steps[self.current]
    }

    pub fn step_mut(&mut self, index: usize) -> Option<&mut GenerationStep> {
        self.steps.get_mut(index)
    }

    /// Advance past every completed step except the last one.
    /// Returns `true` if the cursor moved.
    pub fn maybe_move_to_next_step(&mut self) -> bool {
        let start = self.current;
        while self.current + 1 < self.steps.len() && self.steps[self.current].is_complete() {
            self.current += 1;
        }
        self.current != start
    }

    pub fn model(&self) -> Option<&Arc<IncumbentModel>> {
        self.model.as_ref()
    }

    pub fn set_fitted_model(&mut self, model: IncumbentModel) {
        let model = Arc::new(model);
        self.steps[self.current].model_spec.fitted_model = Some(Arc::clone(&model));
        self.model = Some(model);
    }

    /// Drop the fitted model from the current step and the cached reference.
    /// Step cursor and counters are untouched.
    pub fn clear_fitted_model(&mut self) {
        self.steps[self.current].model_spec.fitted_model = None;
        self.model = None;
    }
}
