//! Ask/tell bridge between trial records and an optimization engine.

use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use ob_engine::{
    EngineCapabilities, FixedFeatures, GenerationStrategy, LocalEngine, Observation,
    OptimizationEngine, ParameterKind, RawData,
};
use ob_types::{
    config_error, validation_error, AnalyzedParameter, EngineError, ObError, Objective, ObResult,
    ParameterValue, Parameterization, Trial, TrialError, TrialIndex, VaryingParameter,
};

use crate::config::GeneratorConfig;
use crate::init_budget;
use crate::search_space::{self, TranslatedSpace};
use crate::selector;

/// Shared handle to the engine owned by a generator.
pub type EngineHandle<E> = Arc<Mutex<E>>;

/// Fills trial requests from an optimization engine and feeds evaluated
/// trials back into it.
///
/// Calls on one generator are expected to be serialized by the caller; the
/// engine lock is only held for the duration of a single call.
pub struct Generator<E: OptimizationEngine = LocalEngine> {
    pub(crate) config: GeneratorConfig,
    pub(crate) varying_parameters: Vec<VaryingParameter>,
    pub(crate) objectives: Vec<Objective>,
    pub(crate) analyzed_parameters: Vec<AnalyzedParameter>,
    pub(crate) fixed_features: FixedFeatures,
    pub(crate) capabilities: EngineCapabilities,
    pub(crate) engine: EngineHandle<E>,
    pub(crate) n_evaluated: usize,
    pub(crate) n_evaluated_last_saved: usize,
    pub(crate) next_trial_index: usize,
}

impl Generator<LocalEngine> {
    /// Generator over an in-process engine with the default Sobol then
    /// surrogate plan.
    pub fn new(
        config: GeneratorConfig,
        varying_parameters: Vec<VaryingParameter>,
        objectives: Vec<Objective>,
        analyzed_parameters: Vec<AnalyzedParameter>,
    ) -> ObResult<Self> {
        config.validate()?;
        let strategy = GenerationStrategy::sobol_then_surrogate(config.n_init, config.model_options());
        Self::with_strategy(config, varying_parameters, objectives, analyzed_parameters, strategy)
    }

    /// Generator over an in-process engine following `strategy`.
    pub fn with_strategy(
        config: GeneratorConfig,
        varying_parameters: Vec<VaryingParameter>,
        objectives: Vec<Objective>,
        analyzed_parameters: Vec<AnalyzedParameter>,
        strategy: GenerationStrategy,
    ) -> ObResult<Self> {
        let engine = match config.seed {
            Some(seed) => LocalEngine::with_seed(strategy, seed),
            None => LocalEngine::new(strategy),
        };
        Self::with_engine(config, varying_parameters, objectives, analyzed_parameters, engine)
    }
}

impl<E: OptimizationEngine> Generator<E> {
    /// Register the experiment on `engine` and wrap it. The engine must not
    /// have an experiment yet.
    pub fn with_engine(
        config: GeneratorConfig,
        varying_parameters: Vec<VaryingParameter>,
        objectives: Vec<Objective>,
        analyzed_parameters: Vec<AnalyzedParameter>,
        mut engine: E,
    ) -> ObResult<Self> {
        config.validate()?;
        let TranslatedSpace {
            parameters,
            fixed_features,
        } = search_space::translate(&varying_parameters)?;

        engine
            .create_experiment(ob_engine::ExperimentSpec {
                parameters,
                objectives: objectives.clone(),
                parameter_constraints: config.parameter_constraints.clone(),
                outcome_constraints: config.outcome_constraints.clone(),
            })
            .map_err(|e| config_error!("failed to create experiment: {e}"))?;

        let capabilities = engine.capabilities();
        info!(
            "Created generator with {} varying parameters, {} objectives on {} (fixed features: {})",
            varying_parameters.len(),
            objectives.len(),
            config.device(),
            capabilities.fixed_features
        );

        Ok(Self {
            config,
            varying_parameters,
            objectives,
            analyzed_parameters,
            fixed_features,
            capabilities,
            engine: Arc::new(Mutex::new(engine)),
            n_evaluated: 0,
            n_evaluated_last_saved: 0,
            next_trial_index: 0,
        })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn varying_parameters(&self) -> &[VaryingParameter] {
        &self.varying_parameters
    }

    pub fn objectives(&self) -> &[Objective] {
        &self.objectives
    }

    pub fn analyzed_parameters(&self) -> &[AnalyzedParameter] {
        &self.analyzed_parameters
    }

    pub fn fixed_features(&self) -> &FixedFeatures {
        &self.fixed_features
    }

    /// Another handle to the same engine. Stays valid across [`update`].
    ///
    /// [`update`]: Generator::update
    pub fn engine(&self) -> EngineHandle<E> {
        Arc::clone(&self.engine)
    }

    pub fn n_evaluated(&self) -> usize {
        self.n_evaluated
    }

    pub fn compute_device(&self) -> String {
        self.config.device().to_string()
    }

    pub fn dedicated_resources(&self) -> bool {
        self.config.dedicated_resources
    }

    pub fn remaining_init_trials(&self) -> usize {
        init_budget::remaining(self.engine.lock().generation_strategy())
    }

    fn parameter_names(&self) -> Vec<String> {
        self.varying_parameters.iter().map(|p| p.name.clone()).collect()
    }

    /// Create `n` new trials and fill them.
    pub fn ask(&mut self, n: usize) -> ObResult<Vec<Trial>> {
        let names = self.parameter_names();
        let mut trials: Vec<Trial> = (0..n)
            .map(|i| Trial::new(self.next_trial_index + i, names.clone()))
            .collect();
        self.fill_trials(&mut trials)?;
        self.next_trial_index += n;
        Ok(trials)
    }

    /// Assign parameter values and an engine trial id to every trial.
    ///
    /// Stops at the first failure; trials before it keep their assignment,
    /// the failing trial and the ones after it are left untouched. An engine
    /// trial whose point misses a parameter is abandoned.
    pub fn fill_trials(&mut self, trials: &mut [Trial]) -> ObResult<()> {
        let names = self.parameter_names();
        let mut engine = self.engine.lock();
        for trial in trials.iter_mut() {
            let (point, engine_trial_id) = if self.capabilities.fixed_features {
                engine.next_trial_with_fixed_features(&self.fixed_features)?
            } else {
                engine.next_trial()?
            };
            let values = self
                .varying_parameters
                .iter()
                .map(|p| {
                    point.get(&p.name).copied().ok_or_else(|| {
                        ObError::from(EngineError::MissingParameterValue {
                            name: p.name.clone(),
                        })
                    })
                })
                .collect::<ObResult<Vec<ParameterValue>>>();
            let values = match values {
                Ok(values) => values,
                Err(e) => {
                    warn!("Abandoning engine trial {}: {}", engine_trial_id, e);
                    if let Err(abandon) = engine.abandon_trial(engine_trial_id, false) {
                        warn!("Could not abandon engine trial {}: {}", engine_trial_id, abandon);
                    }
                    return Err(e);
                }
            };

            trial.parameter_names = names.clone();
            trial.parameter_values = values;
            trial.engine_trial_id = Some(engine_trial_id);
            debug!("Trial {} assigned engine trial {}", trial.index, engine_trial_id);
        }
        Ok(())
    }

    /// Feed evaluated trials back into the engine. Trials without an engine
    /// trial id are attached first.
    ///
    /// Stops at the first trial that fails. Evaluations recorded up to and
    /// including that trial are counted and may trigger a model snapshot
    /// before the error is returned.
    pub fn tell(&mut self, trials: &mut [Trial]) -> ObResult<()> {
        let handle = Arc::clone(&self.engine);
        let mut told = Ok(());
        {
            let mut engine = handle.lock();
            let metrics = engine.outcome_constraint_metrics();
            for trial in trials.iter_mut() {
                let (recorded, result) = self.tell_one(&mut *engine, &metrics, trial);
                if recorded {
                    self.n_evaluated += 1;
                }
                if result.is_err() {
                    told = result;
                    break;
                }
            }
        }
        let saved = self.maybe_save_model();
        told.and(saved)
    }

    /// Feed trials evaluated outside this generator.
    pub fn incorporate_history(&mut self, trials: &mut [Trial]) -> ObResult<()> {
        info!("Incorporating {} external trials", trials.len());
        self.next_trial_index = trials
            .iter()
            .map(|t| t.index + 1)
            .fold(self.next_trial_index, usize::max);
        self.tell(trials)
    }

    /// Whether an evaluation reached the engine, and the first error met.
    fn tell_one(
        &self,
        engine: &mut E,
        metrics: &[String],
        trial: &mut Trial,
    ) -> (bool, ObResult<()>) {
        let resolved = match trial.engine_trial_id {
            Some(id) => engine.trial(id).map(|t| t.index).map_err(ObError::from),
            None => self.attach(engine, trial),
        };
        if let Err(e) = &resolved {
            warn!("Could not resolve engine trial for trial {}: {}", trial.index, e);
        }

        // Reported even when resolution failed, with whatever id is known.
        let reported = match resolved.as_ref().ok().copied().or(trial.engine_trial_id) {
            Some(id) => self.report(engine, metrics, trial, id),
            None => Ok(false),
        };
        let recorded = matches!(reported, Ok(true));
        (recorded, resolved.and(reported).map(|_| ()))
    }

    fn attach(&self, engine: &mut E, trial: &mut Trial) -> ObResult<TrialIndex> {
        let id = engine.attach_trial(self.engine_parameterization(trial))?;
        trial.engine_trial_id = Some(id);
        let index = engine.trial(id)?.index;
        debug!("Attached trial {} as engine trial {}", trial.index, index);

        if !trial.failed() && !self.config.enforce_n_init {
            init_budget::consume_attached(engine.generation_strategy_mut());
        }
        Ok(index)
    }

    /// Trial values keyed by name, integers rounded for int parameters.
    fn engine_parameterization(&self, trial: &Trial) -> Parameterization {
        let mut point = trial.parameterization();
        for param in &self.varying_parameters {
            let Ok(ParameterKind::Int) = search_space::parameter_kind(param) else {
                continue;
            };
            if let Some(value) = point.get_mut(&param.name) {
                *value = ParameterValue::Int(value.as_f64().round() as i64);
            }
        }
        point
    }

    fn report(
        &self,
        engine: &mut E,
        metrics: &[String],
        trial: &Trial,
        id: TrialIndex,
    ) -> ObResult<bool> {
        if trial.completed() {
            let data = self.outcome_data(metrics, trial)?;
            engine.complete_trial(id, data)?;
            debug!("Completed engine trial {}", id);
        } else if trial.failed() {
            self.mark_failed(engine, id, false)?;
        } else {
            return Ok(false);
        }
        Ok(true)
    }

    /// Objective evaluations plus analyzed parameters used by outcome
    /// constraints.
    fn outcome_data(&self, metrics: &[String], trial: &Trial) -> ObResult<RawData> {
        let mut data = RawData::new();
        for objective in &self.objectives {
            let ev = trial
                .objective_evaluations
                .iter()
                .find(|ev| ev.parameter == objective.name)
                .ok_or_else(|| {
                    validation_error!(
                        "trial {} has no evaluation for objective {}",
                        trial.index,
                        objective.name
                    )
                })?;
            data.insert(ev.parameter.clone(), Observation::new(ev.value, ev.sem));
        }
        for ev in &trial.parameter_evaluations {
            if metrics.contains(&ev.parameter) {
                data.insert(ev.parameter.clone(), Observation::new(ev.value, ev.sem));
            }
        }
        Ok(data)
    }

    fn mark_failed(&self, engine: &mut E, id: TrialIndex, force: bool) -> ObResult<()> {
        if self.config.abandon_failed_trials {
            engine.abandon_trial(id, force)?;
            debug!("Abandoned engine trial {}", id);
        } else {
            engine.fail_trial(id, force)?;
            debug!("Marked engine trial {} as failed", id);
        }
        Ok(())
    }

    /// Exclude a trial from fitting, whatever state its engine trial is in.
    pub fn mark_trial_as_failed(&mut self, trial: &Trial) -> ObResult<()> {
        let id = trial
            .engine_trial_id
            .ok_or(TrialError::NotRegistered { index: trial.index })?;
        let mut engine = self.engine.lock();
        self.mark_failed(&mut *engine, id, true)
    }

    /// Replace the parameter with the same name and push it to the engine.
    pub fn update_parameter(&mut self, parameter: VaryingParameter) -> ObResult<()> {
        let spec = search_space::range_spec(&parameter)?;
        let slot = self
            .varying_parameters
            .iter()
            .position(|p| p.name == parameter.name)
            .ok_or_else(|| config_error!("unknown varying parameter '{}'", parameter.name))?;

        let mut updated = self.varying_parameters.clone();
        updated[slot] = parameter;
        let fixed_features = search_space::fixed_features(&updated)?;

        self.engine.lock().update_parameter(spec)?;
        self.varying_parameters = updated;
        self.fixed_features = fixed_features;
        Ok(())
    }

    /// Parameter values of the best point found so far for `objective`.
    pub fn best_values(&self, objective: &str) -> ObResult<Option<Parameterization>> {
        let engine = self.engine.lock();
        selector::best_values(&*engine, &self.objectives, objective)
    }

    fn model_path(&self, n_evaluated: usize) -> PathBuf {
        self.config
            .model_history_dir
            .join(format!("engine_at_eval_{n_evaluated}.json"))
    }

    fn maybe_save_model(&mut self) -> ObResult<()> {
        if !self.config.save_model
            || self.n_evaluated - self.n_evaluated_last_saved < self.config.model_save_period
        {
            return Ok(());
        }
        std::fs::create_dir_all(&self.config.model_history_dir)?;
        let path = self.model_path(self.n_evaluated);
        self.engine.lock().save_to_file(&path)?;
        self.n_evaluated_last_saved = self.n_evaluated;
        info!("Saved engine state to {}", path.display());
        Ok(())
    }
}
