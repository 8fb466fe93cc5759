//! # ob-generator
//!
//! Pluggable generator over a Bayesian-optimization engine.
//!
//! Translates varying parameters into an engine search space, fills trial
//! requests (ask), feeds evaluated and externally supplied trials back to the
//! engine (tell), keeps the quasi-random initialization budget consistent,
//! selects best values and moves generator state between processes.

mod config;
mod generator;
mod init_budget;
mod plot;
mod search_space;
mod selector;
mod transfer;

#[cfg(test)]
mod test_support;

pub use config::GeneratorConfig;
pub use generator::{EngineHandle, Generator};
pub use init_budget::{consume_attached, remaining as remaining_init_trials};
pub use plot::{ContourRequest, CrossValidationRequest, FeatureImportanceRequest, SliceRequest};
pub use search_space::{fixed_features, parameter_kind, range_spec, translate, TranslatedSpace};
pub use selector::{best_values, select_extremal};
pub use transfer::GeneratorSnapshot;
