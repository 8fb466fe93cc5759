// Optibridge optimization engine
// Experiment bookkeeping, generation plans and an in-process engine that
// walks a Sobol phase into an incumbent-surrogate phase.

pub mod constraints;
pub mod engine;
pub mod experiment;
pub mod generation;
pub mod local;
pub mod model;
pub mod pareto;

pub use constraints::{ComparisonOp, OutcomeConstraint, ParameterConstraint};
pub use engine::{EngineCapabilities, OptimizationEngine};
pub use experiment::{
    EngineTrial, EngineTrialStatus, Experiment, ExperimentSpec, FixedFeatures, Observation,
    ObservedPoint, ParameterKind, RangeParameterSpec, RawData, SearchSpace, TrialSource,
};
pub use generation::{
    CriterionKind, Device, GenerationStep, GenerationStrategy, ModelKind, ModelOptions, ModelSpec,
    Precision, TransitionCriterion,
};
pub use local::LocalEngine;
pub use model::IncumbentModel;
