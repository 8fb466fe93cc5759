//! In-process engine: Sobol exploration followed by an incumbent surrogate.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sobol_burley::sample;
use std::path::Path;
use tracing::{debug, info, warn};
use uuid::Uuid;

use ob_types::{EngineError, EngineResult, Parameterization, TrialIndex};

use crate::engine::{EngineCapabilities, OptimizationEngine};
use crate::experiment::{
    EngineTrial, EngineTrialStatus, Experiment, ExperimentSpec, FixedFeatures, ObservedPoint,
    RangeParameterSpec, RawData, SearchSpace, TrialSource,
};
use crate::generation::{GenerationStrategy, ModelKind};
use crate::model::IncumbentModel;
use crate::pareto::pareto_front_indices;

/// Draws attempted per trial before giving up on parameter constraints.
const MAX_DRAWS: usize = 64;
/// Dimensions supported by one scrambled Sobol sequence.
const SOBOL_DIMENSIONS: u32 = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalEngine {
    client_id: Uuid,
    seed: u64,
    generation_strategy: GenerationStrategy,
    experiment: Option<Experiment>,
    sobol_index: u32,
    /// Completed-trial count the current fit was computed from.
    #[serde(skip)]
    fitted_on: Option<usize>,
}

impl LocalEngine {
    pub fn new(generation_strategy: GenerationStrategy) -> Self {
        Self::with_seed(generation_strategy, rand::random())
    }

    pub fn with_seed(generation_strategy: GenerationStrategy, seed: u64) -> Self {
        Self {
            client_id: Uuid::new_v4(),
            seed,
            generation_strategy,
            experiment: None,
            sobol_index: 0,
            fitted_on: None,
        }
    }

    /// Stable identity of this engine client, kept across merges.
    pub fn client_id(&self) -> Uuid {
        self.client_id
    }

    pub fn experiment(&self) -> EngineResult<&Experiment> {
        self.experiment.as_ref().ok_or(EngineError::NoExperiment)
    }

    fn experiment_mut(&mut self) -> EngineResult<&mut Experiment> {
        self.experiment.as_mut().ok_or(EngineError::NoExperiment)
    }

    pub fn load_from_file(path: &Path) -> EngineResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| EngineError::Persistence {
            message: format!("reading {}: {e}", path.display()),
        })?;
        serde_json::from_str(&json).map_err(|e| EngineError::Persistence {
            message: format!("decoding {}: {e}", path.display()),
        })
    }

    fn completed_count(&self) -> usize {
        self.experiment
            .as_ref()
            .map(|e| {
                e.trials()
                    .filter(|t| t.status == EngineTrialStatus::Completed)
                    .count()
            })
            .unwrap_or(0)
    }

    fn sobol_point(&mut self, space: &SearchSpace, fixed: Option<&FixedFeatures>) -> Parameterization {
        let index = self.sobol_index;
        self.sobol_index = self.sobol_index.wrapping_add(1);
        let mut point = Parameterization::new();
        for (d, param) in space.parameters.iter().enumerate() {
            if let Some(v) = fixed.and_then(|f| f.get(&param.name)) {
                point.insert(param.name.clone(), param.cast(v));
                continue;
            }
            let d = d as u32;
            let seed = (self.seed as u32).wrapping_add(d / SOBOL_DIMENSIONS);
            let u = f64::from(sample(index, d % SOBOL_DIMENSIONS, seed));
            point.insert(param.name.clone(), param.scale(u));
        }
        point
    }

    fn ensure_fitted(&mut self) -> EngineResult<()> {
        let completed = self.completed_count();
        if self.generation_strategy.model().is_none() || self.fitted_on != Some(completed) {
            self.fit_model()?;
        }
        Ok(())
    }

    fn generate(
        &mut self,
        fixed: Option<&FixedFeatures>,
    ) -> EngineResult<(Parameterization, TrialIndex)> {
        let step_index = self.generation_strategy.current_index();
        let step = self.generation_strategy.current_step();
        if step.is_exhausted() {
            return Err(EngineError::GenerationExhausted { step: step_index });
        }
        let kind = step.model();
        let space = self.experiment()?.search_space.clone();

        if kind == ModelKind::Surrogate {
            self.ensure_fitted()?;
        }
        let model = self.generation_strategy.model().cloned();
        let n_trials = self.experiment()?.num_trials() as u64;
        let mut rng = ChaCha8Rng::seed_from_u64(
            self.seed ^ n_trials.wrapping_mul(0x9E37_79B9_7F4A_7C15),
        );

        let mut accepted = None;
        for _ in 0..MAX_DRAWS {
            let point = match (kind, &model) {
                (ModelKind::Surrogate, Some(model)) => model.propose(&mut rng, &space, fixed),
                _ => self.sobol_point(&space, fixed),
            };
            if space.satisfies_constraints(&point) {
                accepted = Some(point);
                break;
            }
        }
        let point = accepted.ok_or(EngineError::ConstraintsUnsatisfiable {
            attempts: MAX_DRAWS,
        })?;

        let index = self
            .experiment_mut()?
            .add_trial(point.clone(), TrialSource::Generated { step: step_index });
        self.generation_strategy.current_step_mut().trials_generated += 1;
        if self.generation_strategy.maybe_move_to_next_step() {
            info!(
                "Generation strategy moved to step {} ({:?})",
                self.generation_strategy.current_index(),
                self.generation_strategy.current_step().model()
            );
        }
        debug!("Generated trial {} with {:?} from step {}", index, kind, step_index);
        Ok((point, index))
    }
}

impl OptimizationEngine for LocalEngine {
    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            fixed_features: true,
        }
    }

    fn create_experiment(&mut self, spec: ExperimentSpec) -> EngineResult<()> {
        if self.experiment.is_some() {
            return Err(EngineError::ExperimentExists);
        }
        let experiment = Experiment::from_spec(spec)?;
        info!(
            "Created experiment with {} parameters, {} objectives and {} outcome constraints",
            experiment.search_space.parameters.len(),
            experiment.objectives.len(),
            experiment.outcome_constraints.len()
        );
        self.experiment = Some(experiment);
        Ok(())
    }

    fn next_trial(&mut self) -> EngineResult<(Parameterization, TrialIndex)> {
        self.generate(None)
    }

    fn next_trial_with_fixed_features(
        &mut self,
        fixed_features: &FixedFeatures,
    ) -> EngineResult<(Parameterization, TrialIndex)> {
        let space = &self.experiment()?.search_space;
        if let Some((name, _)) = fixed_features.iter().find(|(n, _)| space.get(n).is_none()) {
            return Err(EngineError::UnknownName {
                what: "fixed feature".to_string(),
                name: name.to_string(),
            });
        }
        self.generate(Some(fixed_features))
    }

    fn attach_trial(&mut self, parameters: Parameterization) -> EngineResult<TrialIndex> {
        let experiment = self.experiment_mut()?;
        let space = &experiment.search_space;
        if let Some(missing) = space
            .parameters
            .iter()
            .find(|p| !parameters.contains_key(&p.name))
        {
            return Err(EngineError::MissingParameterValue {
                name: missing.name.clone(),
            });
        }
        if let Some(unknown) = parameters.keys().find(|n| space.get(n).is_none()) {
            return Err(EngineError::UnknownName {
                what: "parameter".to_string(),
                name: unknown.clone(),
            });
        }
        if !space.contains(&parameters) {
            debug!("Attached point lies outside the current search space");
        }
        let index = experiment.add_trial(parameters, TrialSource::Attached);
        debug!("Attached trial {}", index);
        Ok(index)
    }

    fn trial(&self, index: TrialIndex) -> EngineResult<&EngineTrial> {
        self.experiment()?.trial(index)
    }

    fn complete_trial(&mut self, index: TrialIndex, data: RawData) -> EngineResult<()> {
        let experiment = self.experiment_mut()?;
        if let Some(missing) = experiment
            .objectives
            .iter()
            .find(|o| !data.contains_key(&o.name))
        {
            warn!("Trial {} completed without data for objective {}", index, missing.name);
        }
        let trial = experiment.trial_mut(index)?;
        trial.complete(data)?;
        let source = trial.source;
        if let TrialSource::Generated { step } = source {
            if let Some(step) = self.generation_strategy.step_mut(step) {
                step.trials_observed += 1;
            }
            self.generation_strategy.maybe_move_to_next_step();
        }
        Ok(())
    }

    fn abandon_trial(&mut self, index: TrialIndex, force: bool) -> EngineResult<()> {
        self.experiment_mut()?.trial_mut(index)?.mark_abandoned(force)
    }

    fn fail_trial(&mut self, index: TrialIndex, force: bool) -> EngineResult<()> {
        self.experiment_mut()?.trial_mut(index)?.mark_failed(force)
    }

    fn fit_model(&mut self) -> EngineResult<()> {
        let options = self.generation_strategy.current_step().model_spec.options;
        let completed = self.completed_count();
        match IncumbentModel::fit(self.experiment()?, &options) {
            Some(model) => {
                debug!(
                    "Fitted surrogate on {} observations ({} incumbents)",
                    model.n_observations(),
                    model.incumbents().len()
                );
                self.generation_strategy.set_fitted_model(model);
            }
            None => debug!("No completed trials available to fit a model"),
        }
        self.fitted_on = Some(completed);
        Ok(())
    }

    fn best_parameters(&self) -> EngineResult<Option<ObservedPoint>> {
        let experiment = self.experiment()?;
        let [objective] = experiment.objectives.as_slice() else {
            return Err(EngineError::InvalidExperiment {
                message: "best parameters are only defined for a single objective".to_string(),
            });
        };
        let mut best: Option<ObservedPoint> = None;
        for point in experiment.observed_points() {
            if !experiment.is_feasible(point.trial_index) {
                continue;
            }
            let value = point.objectives[&objective.name];
            let improves = match &best {
                None => true,
                Some(b) => {
                    let current = b.objectives[&objective.name];
                    if objective.minimize {
                        value < current
                    } else {
                        value > current
                    }
                }
            };
            if improves {
                best = Some(point);
            }
        }
        Ok(best)
    }

    fn pareto_optimal_parameters(&self) -> EngineResult<Vec<ObservedPoint>> {
        let experiment = self.experiment()?;
        let points: Vec<ObservedPoint> = experiment
            .observed_points()
            .into_iter()
            .filter(|p| experiment.is_feasible(p.trial_index))
            .collect();
        let minimize: Vec<bool> = experiment.objectives.iter().map(|o| o.minimize).collect();
        let values: Vec<Vec<f64>> = points
            .iter()
            .map(|p| {
                experiment
                    .objectives
                    .iter()
                    .map(|o| p.objectives[&o.name])
                    .collect()
            })
            .collect();
        let front = pareto_front_indices(&values, &minimize);
        let mut points: Vec<Option<ObservedPoint>> = points.into_iter().map(Some).collect();
        Ok(front.into_iter().filter_map(|i| points[i].take()).collect())
    }

    fn outcome_constraint_metrics(&self) -> Vec<String> {
        self.experiment
            .as_ref()
            .map(|e| e.outcome_constraints.iter().map(|oc| oc.metric.clone()).collect())
            .unwrap_or_default()
    }

    fn generation_strategy(&self) -> &GenerationStrategy {
        &self.generation_strategy
    }

    fn generation_strategy_mut(&mut self) -> &mut GenerationStrategy {
        &mut self.generation_strategy
    }

    fn update_parameter(&mut self, spec: RangeParameterSpec) -> EngineResult<()> {
        let name = spec.name.clone();
        self.experiment_mut()?.search_space.update_parameter(spec)?;
        // The incumbents may now lie outside the design.
        self.fitted_on = None;
        info!("Updated search space parameter {}", name);
        Ok(())
    }

    fn strip_fitted_model(&mut self) {
        self.generation_strategy.clear_fitted_model();
        self.fitted_on = None;
    }

    fn merge_from(&mut self, newer: Self) {
        let LocalEngine {
            client_id: _,
            seed,
            generation_strategy,
            experiment,
            sobol_index,
            fitted_on: _,
        } = newer;
        self.seed = seed;
        self.generation_strategy = generation_strategy;
        self.experiment = experiment;
        self.sobol_index = sobol_index;
        self.fitted_on = None;
    }

    fn save_to_file(&self, path: &Path) -> EngineResult<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| EngineError::Persistence {
            message: format!("encoding engine state: {e}"),
        })?;
        std::fs::write(path, json).map_err(|e| EngineError::Persistence {
            message: format!("writing {}: {e}", path.display()),
        })
    }
}
