use thiserror::Error;

use crate::trial::TrialIndex;

/// Main error type for the Optibridge system
#[derive(Error, Debug)]
pub enum ObError {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Trial error: {0}")]
    Trial(#[from] TrialError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl ObError {
    /// Whether this error is a configuration problem (fatal, never retried).
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            ObError::Config(_)
                | ObError::Engine(EngineError::ConstraintParse { .. })
                | ObError::Engine(EngineError::UnknownName { .. })
                | ObError::Engine(EngineError::InvalidExperiment { .. })
        )
    }
}

/// Errors raised by an optimization engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Engine trial not found: {index}")]
    TrialNotFound { index: TrialIndex },

    #[error("Engine does not support {capability}")]
    CapabilityMismatch { capability: String },

    #[error("Cannot {action} engine trial {index}: trial is {status}")]
    InvalidTrialState {
        index: TrialIndex,
        status: String,
        action: String,
    },

    #[error("No experiment has been created on this engine")]
    NoExperiment,

    #[error("Experiment already created")]
    ExperimentExists,

    #[error("Invalid experiment: {message}")]
    InvalidExperiment { message: String },

    #[error("Unknown {what}: {name}")]
    UnknownName { what: String, name: String },

    #[error("Invalid constraint '{expression}': {message}")]
    ConstraintParse { expression: String, message: String },

    #[error("Engine point is missing a value for parameter {name}")]
    MissingParameterValue { name: String },

    #[error("No point satisfying the parameter constraints found after {attempts} draws")]
    ConstraintsUnsatisfiable { attempts: usize },

    #[error("Generation strategy exhausted: step {step} allows no more trials")]
    GenerationExhausted { step: usize },

    #[error("Engine persistence failed: {message}")]
    Persistence { message: String },
}

/// Trial record errors
#[derive(Error, Debug)]
pub enum TrialError {
    #[error("Trial {index} has {values} values for {names} parameters")]
    LengthMismatch {
        index: usize,
        names: usize,
        values: usize,
    },

    #[error("Trial {index} is already {status}")]
    AlreadyFinished { index: usize, status: String },

    #[error("Trial {index} has no engine trial id")]
    NotRegistered { index: usize },
}

/// Result type alias for Optibridge operations
pub type ObResult<T> = Result<T, ObError>;

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::ObError::Validation(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::ObError::Config(format!($($arg)*))
    };
}
