//! Shared fixtures for the generator tests.

use std::collections::BTreeSet;
use std::path::Path;

use ob_engine::{
    EngineCapabilities, EngineTrial, ExperimentSpec, FixedFeatures, GenerationStrategy, LocalEngine,
    ModelOptions, ObservedPoint, OptimizationEngine, RangeParameterSpec, RawData,
};
use ob_types::{
    AnalyzedParameter, Dtype, EngineError, EngineResult, Objective, Parameterization, TrialIndex,
    VaryingParameter,
};

use crate::config::GeneratorConfig;
use crate::generator::Generator;

/// `x0` float in [0, 1], `x1` int in [1, 8], `x2` float fixed at 0.5.
pub fn varying() -> Vec<VaryingParameter> {
    let mut x2 = VaryingParameter::new("x2", -1.0, 1.0).unwrap();
    x2.fix_value(0.5).unwrap();
    vec![
        VaryingParameter::new("x0", 0.0, 1.0).unwrap(),
        VaryingParameter::new("x1", 1.0, 8.0)
            .unwrap()
            .with_dtype(Dtype::Int64),
        x2,
    ]
}

/// Engine without fixed-feature generation.
#[derive(Debug, Clone)]
pub struct PlainEngine(pub LocalEngine);

impl OptimizationEngine for PlainEngine {
    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities::default()
    }

    fn create_experiment(&mut self, spec: ExperimentSpec) -> EngineResult<()> {
        self.0.create_experiment(spec)
    }

    fn next_trial(&mut self) -> EngineResult<(Parameterization, TrialIndex)> {
        self.0.next_trial()
    }

    fn attach_trial(&mut self, parameters: Parameterization) -> EngineResult<TrialIndex> {
        self.0.attach_trial(parameters)
    }

    fn trial(&self, index: TrialIndex) -> EngineResult<&EngineTrial> {
        self.0.trial(index)
    }

    fn complete_trial(&mut self, index: TrialIndex, data: RawData) -> EngineResult<()> {
        self.0.complete_trial(index, data)
    }

    fn abandon_trial(&mut self, index: TrialIndex, force: bool) -> EngineResult<()> {
        self.0.abandon_trial(index, force)
    }

    fn fail_trial(&mut self, index: TrialIndex, force: bool) -> EngineResult<()> {
        self.0.fail_trial(index, force)
    }

    fn fit_model(&mut self) -> EngineResult<()> {
        self.0.fit_model()
    }

    fn best_parameters(&self) -> EngineResult<Option<ObservedPoint>> {
        self.0.best_parameters()
    }

    fn pareto_optimal_parameters(&self) -> EngineResult<Vec<ObservedPoint>> {
        self.0.pareto_optimal_parameters()
    }

    fn outcome_constraint_metrics(&self) -> Vec<String> {
        self.0.outcome_constraint_metrics()
    }

    fn generation_strategy(&self) -> &GenerationStrategy {
        self.0.generation_strategy()
    }

    fn generation_strategy_mut(&mut self) -> &mut GenerationStrategy {
        self.0.generation_strategy_mut()
    }

    fn update_parameter(&mut self, spec: RangeParameterSpec) -> EngineResult<()> {
        self.0.update_parameter(spec)
    }

    fn merge_from(&mut self, newer: Self) {
        self.0.merge_from(newer.0)
    }

    fn save_to_file(&self, path: &Path) -> EngineResult<()> {
        self.0.save_to_file(path)
    }
}

pub fn plain_engine_generator() -> Generator<PlainEngine> {
    let engine = PlainEngine(LocalEngine::with_seed(
        GenerationStrategy::sobol_then_surrogate(2, ModelOptions::default()),
        1,
    ));
    Generator::with_engine(
        GeneratorConfig::new().with_save_model(false),
        varying(),
        vec![Objective::minimize("f")],
        vec![AnalyzedParameter::new("c")],
        engine,
    )
    .unwrap()
}

/// Engine whose lookups fail for trials attached to it. Completion and
/// abandonment still reach the wrapped engine.
#[derive(Debug, Clone)]
pub struct DetachedEngine {
    pub inner: LocalEngine,
    attached: BTreeSet<TrialIndex>,
}

impl OptimizationEngine for DetachedEngine {
    fn capabilities(&self) -> EngineCapabilities {
        self.inner.capabilities()
    }

    fn create_experiment(&mut self, spec: ExperimentSpec) -> EngineResult<()> {
        self.inner.create_experiment(spec)
    }

    fn next_trial(&mut self) -> EngineResult<(Parameterization, TrialIndex)> {
        self.inner.next_trial()
    }

    fn next_trial_with_fixed_features(
        &mut self,
        fixed_features: &FixedFeatures,
    ) -> EngineResult<(Parameterization, TrialIndex)> {
        self.inner.next_trial_with_fixed_features(fixed_features)
    }

    fn attach_trial(&mut self, parameters: Parameterization) -> EngineResult<TrialIndex> {
        let index = self.inner.attach_trial(parameters)?;
        self.attached.insert(index);
        Ok(index)
    }

    fn trial(&self, index: TrialIndex) -> EngineResult<&EngineTrial> {
        if self.attached.contains(&index) {
            return Err(EngineError::TrialNotFound { index });
        }
        self.inner.trial(index)
    }

    fn complete_trial(&mut self, index: TrialIndex, data: RawData) -> EngineResult<()> {
        self.inner.complete_trial(index, data)
    }

    fn abandon_trial(&mut self, index: TrialIndex, force: bool) -> EngineResult<()> {
        self.inner.abandon_trial(index, force)
    }

    fn fail_trial(&mut self, index: TrialIndex, force: bool) -> EngineResult<()> {
        self.inner.fail_trial(index, force)
    }

    fn fit_model(&mut self) -> EngineResult<()> {
        self.inner.fit_model()
    }

    fn best_parameters(&self) -> EngineResult<Option<ObservedPoint>> {
        self.inner.best_parameters()
    }

    fn pareto_optimal_parameters(&self) -> EngineResult<Vec<ObservedPoint>> {
        self.inner.pareto_optimal_parameters()
    }

    fn outcome_constraint_metrics(&self) -> Vec<String> {
        self.inner.outcome_constraint_metrics()
    }

    fn generation_strategy(&self) -> &GenerationStrategy {
        self.inner.generation_strategy()
    }

    fn generation_strategy_mut(&mut self) -> &mut GenerationStrategy {
        self.inner.generation_strategy_mut()
    }

    fn update_parameter(&mut self, spec: RangeParameterSpec) -> EngineResult<()> {
        self.inner.update_parameter(spec)
    }

    fn merge_from(&mut self, newer: Self) {
        self.inner.merge_from(newer.inner);
        self.attached = newer.attached;
    }

    fn save_to_file(&self, path: &Path) -> EngineResult<()> {
        self.inner.save_to_file(path)
    }
}

/// Generator with `n_init = 3` over a [`DetachedEngine`].
pub fn detached_engine_generator(config: GeneratorConfig) -> Generator<DetachedEngine> {
    let engine = DetachedEngine {
        inner: LocalEngine::with_seed(
            GenerationStrategy::sobol_then_surrogate(3, ModelOptions::default()),
            2,
        ),
        attached: BTreeSet::new(),
    };
    Generator::with_engine(
        config,
        varying(),
        vec![Objective::minimize("f")],
        vec![],
        engine,
    )
    .unwrap()
}

/// Route `tracing` output to the test harness. Honors `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
