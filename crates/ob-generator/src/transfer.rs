//! Moving a generator between processes.
//!
//! The owning process strips the fitted model, ships a [`GeneratorSnapshot`]
//! to a worker and later merges the worker's snapshot back with
//! [`Generator::update`]. The original engine handle survives the merge.

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use ob_engine::OptimizationEngine;
use ob_types::{AnalyzedParameter, Objective, ObResult, VaryingParameter};

use crate::config::GeneratorConfig;
use crate::generator::Generator;
use crate::search_space;

/// Serializable state of a generator and its engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorSnapshot<E> {
    pub config: GeneratorConfig,
    pub varying_parameters: Vec<VaryingParameter>,
    pub objectives: Vec<Objective>,
    pub analyzed_parameters: Vec<AnalyzedParameter>,
    pub n_evaluated: usize,
    pub n_evaluated_last_saved: usize,
    pub next_trial_index: usize,
    pub engine: E,
}

impl<E: Serialize + DeserializeOwned> GeneratorSnapshot<E> {
    pub fn save(&self, path: &Path) -> ObResult<()> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> ObResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

impl<E: OptimizationEngine> Generator<E> {
    /// Drop the fitted model so the engine can be serialized. The generation
    /// plan keeps its step index and counters.
    pub fn prepare_to_send(&mut self) {
        self.engine.lock().strip_fitted_model();
        debug!("Fitted model released ahead of transfer");
    }

    pub fn snapshot(&self) -> GeneratorSnapshot<E>
    where
        E: Clone,
    {
        GeneratorSnapshot {
            config: self.config.clone(),
            varying_parameters: self.varying_parameters.clone(),
            objectives: self.objectives.clone(),
            analyzed_parameters: self.analyzed_parameters.clone(),
            n_evaluated: self.n_evaluated,
            n_evaluated_last_saved: self.n_evaluated_last_saved,
            next_trial_index: self.next_trial_index,
            engine: self.engine.lock().clone(),
        }
    }

    /// Rebuild a generator from a snapshot. The engine already holds its
    /// experiment, so nothing is registered again.
    pub fn from_snapshot(snapshot: GeneratorSnapshot<E>) -> ObResult<Self> {
        let fixed_features = search_space::fixed_features(&snapshot.varying_parameters)?;
        let capabilities = snapshot.engine.capabilities();
        Ok(Self {
            config: snapshot.config,
            varying_parameters: snapshot.varying_parameters,
            objectives: snapshot.objectives,
            analyzed_parameters: snapshot.analyzed_parameters,
            fixed_features,
            capabilities,
            engine: Arc::new(Mutex::new(snapshot.engine)),
            n_evaluated: snapshot.n_evaluated,
            n_evaluated_last_saved: snapshot.n_evaluated_last_saved,
            next_trial_index: snapshot.next_trial_index,
        })
    }

    /// Take over the state of a newer snapshot. The engine is updated in
    /// place; handles obtained from [`engine`](Generator::engine) stay valid.
    pub fn update(&mut self, newer: GeneratorSnapshot<E>) -> ObResult<()> {
        let fixed_features = search_space::fixed_features(&newer.varying_parameters)?;
        self.engine.lock().merge_from(newer.engine);
        self.config = newer.config;
        self.varying_parameters = newer.varying_parameters;
        self.objectives = newer.objectives;
        self.analyzed_parameters = newer.analyzed_parameters;
        self.fixed_features = fixed_features;
        self.n_evaluated = newer.n_evaluated;
        self.n_evaluated_last_saved = newer.n_evaluated_last_saved;
        self.next_trial_index = newer.next_trial_index;
        info!("Generator updated from newer snapshot ({} evaluations)", self.n_evaluated);
        Ok(())
    }
}
