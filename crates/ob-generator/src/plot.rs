//! Plot requests for an external renderer.
//!
//! The generator does not draw anything itself. Each request fits the model
//! and describes what to show, with defaults resolved against the
//! generator's parameters and objectives.

use serde::{Deserialize, Serialize};
use tracing::info;

use ob_engine::OptimizationEngine;
use ob_types::{config_error, ObResult, Parameterization};

use crate::generator::Generator;

/// 1D slice of the surrogate along one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceRequest {
    pub parameter: String,
    pub objective: String,
    /// Values of the other parameters. `None` slices through the middle of
    /// each range.
    pub slice_values: Option<Parameterization>,
}

/// 2D slice of the surrogate over two parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContourRequest {
    pub param_x: String,
    pub param_y: String,
    pub objective: String,
    pub slice_values: Option<Parameterization>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidationRequest {
    pub objectives: Vec<String>,
    pub n_observations: usize,
}

/// Importance of each input parameter for predicting the outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportanceRequest {
    pub parameters: Vec<String>,
    pub objectives: Vec<String>,
}

impl<E: OptimizationEngine> Generator<E> {
    pub fn slice_request(
        &self,
        parameter: Option<&str>,
        objective: Option<&str>,
        slice_values: Option<Parameterization>,
    ) -> ObResult<SliceRequest> {
        let parameter = self.plot_parameter(parameter, 0)?;
        let objective = self.plot_objective(objective)?;
        self.engine.lock().fit_model()?;
        let slice_values = self.slice_values(&objective, slice_values)?;
        Ok(SliceRequest {
            parameter,
            objective,
            slice_values,
        })
    }

    pub fn contour_request(
        &self,
        param_x: Option<&str>,
        param_y: Option<&str>,
        objective: Option<&str>,
        slice_values: Option<Parameterization>,
    ) -> ObResult<ContourRequest> {
        if self.varying_parameters.len() < 2 {
            return Err(config_error!(
                "cannot plot contour with fewer than 2 varying parameters"
            ));
        }
        let param_x = self.plot_parameter(param_x, 0)?;
        let param_y = self.plot_parameter(param_y, 1)?;
        let objective = self.plot_objective(objective)?;
        self.engine.lock().fit_model()?;
        let slice_values = self.slice_values(&objective, slice_values)?;
        Ok(ContourRequest {
            param_x,
            param_y,
            objective,
            slice_values,
        })
    }

    pub fn cross_validation_request(&self) -> ObResult<CrossValidationRequest> {
        let mut engine = self.engine.lock();
        engine.fit_model()?;
        let n_observations = engine
            .generation_strategy()
            .model()
            .map(|m| m.n_observations())
            .unwrap_or(0);
        Ok(CrossValidationRequest {
            objectives: self.objectives.iter().map(|o| o.name.clone()).collect(),
            n_observations,
        })
    }

    pub fn feature_importance_request(&self) -> ObResult<FeatureImportanceRequest> {
        self.engine.lock().fit_model()?;
        Ok(FeatureImportanceRequest {
            parameters: self
                .varying_parameters
                .iter()
                .filter(|p| !p.is_fixed)
                .map(|p| p.name.clone())
                .collect(),
            objectives: self.objectives.iter().map(|o| o.name.clone()).collect(),
        })
    }

    fn plot_parameter(&self, name: Option<&str>, default: usize) -> ObResult<String> {
        match name {
            Some(name) if self.varying_parameters.iter().any(|p| p.name == name) => {
                Ok(name.to_string())
            }
            Some(name) => Err(config_error!("unknown varying parameter '{name}'")),
            None => self
                .varying_parameters
                .get(default)
                .map(|p| p.name.clone())
                .ok_or_else(|| config_error!("no varying parameter at position {default}")),
        }
    }

    fn plot_objective(&self, name: Option<&str>) -> ObResult<String> {
        match name {
            Some(name) if self.objectives.iter().any(|o| o.name == name) => Ok(name.to_string()),
            Some(name) => Err(config_error!("unknown objective '{name}'")),
            None => self
                .objectives
                .first()
                .map(|o| o.name.clone())
                .ok_or_else(|| config_error!("no objectives defined")),
        }
    }

    fn slice_values(
        &self,
        objective: &str,
        given: Option<Parameterization>,
    ) -> ObResult<Option<Parameterization>> {
        if given.is_some() {
            return Ok(given);
        }
        let best = self.best_values(objective)?;
        if best.is_none() {
            info!("Could not determine best parameters; slicing along the middle of each range");
        }
        Ok(best)
    }
}
