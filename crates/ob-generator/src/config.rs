//! Generator configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use ob_engine::{Device, ModelOptions, Precision};
use ob_types::{config_error, ObResult};

/// Settings for a [`Generator`](crate::Generator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Quasi-random trials before model-based generation starts.
    pub n_init: usize,

    /// Keep the full `n_init` budget even when external data is attached.
    pub enforce_n_init: bool,

    /// Failed trials are marked abandoned (excluded from fitting) rather
    /// than failed.
    pub abandon_failed_trials: bool,

    /// Fit the surrogate on observations outside the current bounds.
    pub fit_out_of_design: bool,

    pub use_cuda: bool,
    pub gpu_id: u32,

    /// Ask the host for a dedicated worker (e.g. the GPU) for this generator.
    pub dedicated_resources: bool,

    pub save_model: bool,
    /// Evaluations between two model snapshots.
    pub model_save_period: usize,
    pub model_history_dir: PathBuf,

    /// Linear inequalities over parameter names, e.g. `"x3 >= x4"`.
    pub parameter_constraints: Vec<String>,
    /// Bounds on analyzed metrics, e.g. `"m1 <= 3"`.
    pub outcome_constraints: Vec<String>,

    /// Engine seed; `None` lets the engine pick one.
    pub seed: Option<u64>,
}

impl GeneratorConfig {
    pub fn new() -> Self {
        Self {
            n_init: 4,
            enforce_n_init: false,
            abandon_failed_trials: true,
            fit_out_of_design: false,
            use_cuda: false,
            gpu_id: 0,
            dedicated_resources: false,
            save_model: true,
            model_save_period: 5,
            model_history_dir: PathBuf::from("model_history"),
            parameter_constraints: Vec::new(),
            outcome_constraints: Vec::new(),
            seed: None,
        }
    }

    pub fn with_n_init(mut self, n: usize) -> Self {
        self.n_init = n;
        self
    }

    pub fn with_enforce_n_init(mut self, enforce: bool) -> Self {
        self.enforce_n_init = enforce;
        self
    }

    pub fn with_abandon_failed_trials(mut self, abandon: bool) -> Self {
        self.abandon_failed_trials = abandon;
        self
    }

    pub fn with_fit_out_of_design(mut self, fit: bool) -> Self {
        self.fit_out_of_design = fit;
        self
    }

    pub fn with_cuda(mut self, gpu_id: u32) -> Self {
        self.use_cuda = true;
        self.gpu_id = gpu_id;
        self
    }

    pub fn with_dedicated_resources(mut self, dedicated: bool) -> Self {
        self.dedicated_resources = dedicated;
        self
    }

    pub fn with_save_model(mut self, save: bool) -> Self {
        self.save_model = save;
        self
    }

    pub fn with_model_save_period(mut self, period: usize) -> Self {
        self.model_save_period = period;
        self
    }

    pub fn with_model_history_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.model_history_dir = dir.into();
        self
    }

    pub fn with_parameter_constraints(mut self, constraints: Vec<String>) -> Self {
        self.parameter_constraints = constraints;
        self
    }

    pub fn with_outcome_constraints(mut self, constraints: Vec<String>) -> Self {
        self.outcome_constraints = constraints;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> ObResult<()> {
        if self.model_save_period == 0 {
            return Err(config_error!("model_save_period must be at least 1"));
        }
        // Sobol indices are 32-bit.
        if u32::try_from(self.n_init).is_err() {
            return Err(config_error!("n_init {} is too large", self.n_init));
        }
        Ok(())
    }

    pub fn device(&self) -> Device {
        if self.use_cuda {
            Device::Cuda(self.gpu_id)
        } else {
            Device::Cpu
        }
    }

    /// Options handed to model-based generation steps.
    pub fn model_options(&self) -> ModelOptions {
        ModelOptions {
            precision: Precision::Double,
            device: self.device(),
            fit_out_of_design: self.fit_out_of_design,
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self::new()
    }
}
