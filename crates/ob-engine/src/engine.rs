// Engine contract consumed by the generator.
// Implementations own the experiment, the engine trial table and the
// generation plan; callers mutate them only through these operations.

use std::path::Path;

use ob_types::{EngineError, EngineResult, Parameterization, TrialIndex};

use crate::experiment::{
    EngineTrial, ExperimentSpec, FixedFeatures, ObservedPoint, RangeParameterSpec, RawData,
};
use crate::generation::GenerationStrategy;

/// Optional features an engine may offer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineCapabilities {
    /// `next_trial_with_fixed_features` is implemented.
    pub fixed_features: bool,
}

/// Bayesian-optimization engine as seen by the ask/tell bridge.
pub trait OptimizationEngine: Send {
    /// Static description of optional features. Read once by callers.
    fn capabilities(&self) -> EngineCapabilities;

    /// Register search space, objectives and constraints. Called once.
    fn create_experiment(&mut self, spec: ExperimentSpec) -> EngineResult<()>;

    /// Generate the next point and register it as a running trial.
    fn next_trial(&mut self) -> EngineResult<(Parameterization, TrialIndex)>;

    /// Like [`next_trial`](Self::next_trial) but with some parameters pinned.
    fn next_trial_with_fixed_features(
        &mut self,
        _fixed_features: &FixedFeatures,
    ) -> EngineResult<(Parameterization, TrialIndex)> {
        Err(EngineError::CapabilityMismatch {
            capability: "fixed-feature generation".to_string(),
        })
    }

    /// Register a point that was not generated by this engine.
    fn attach_trial(&mut self, parameters: Parameterization) -> EngineResult<TrialIndex>;

    fn trial(&self, index: TrialIndex) -> EngineResult<&EngineTrial>;

    fn complete_trial(&mut self, index: TrialIndex, data: RawData) -> EngineResult<()>;

    /// Exclude a trial from fitting without treating it as an error.
    fn abandon_trial(&mut self, index: TrialIndex, force: bool) -> EngineResult<()>;

    fn fail_trial(&mut self, index: TrialIndex, force: bool) -> EngineResult<()>;

    fn fit_model(&mut self) -> EngineResult<()>;

    /// Best observed point for a single-objective experiment.
    fn best_parameters(&self) -> EngineResult<Option<ObservedPoint>>;

    /// Non-dominated points, ordered by trial index.
    fn pareto_optimal_parameters(&self) -> EngineResult<Vec<ObservedPoint>>;

    /// Metric names that appear in registered outcome constraints.
    fn outcome_constraint_metrics(&self) -> Vec<String>;

    fn generation_strategy(&self) -> &GenerationStrategy;

    fn generation_strategy_mut(&mut self) -> &mut GenerationStrategy;

    /// Replace one parameter of the live search space.
    fn update_parameter(&mut self, spec: RangeParameterSpec) -> EngineResult<()>;

    /// Release the fitted model ahead of a transfer to another process.
    fn strip_fitted_model(&mut self) {
        self.generation_strategy_mut().clear_fitted_model();
    }

    /// Take over the state of a newer copy of this engine, in place.
    fn merge_from(&mut self, newer: Self)
    where
        Self: Sized;

    fn save_to_file(&self, path: &Path) -> EngineResult<()>;
}
