use thiserror::Error;

/// Main error type for distribution search runs
#[derive(Error, Debug)]
pub enum DsError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors detected before a run starts
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Population size must be positive")]
    EmptyPopulation,

    #[error("Window width must be positive")]
    EmptyWindow,

    #[error("Population size {population} is smaller than window width {window}")]
    PopulationSmallerThanWindow { population: usize, window: usize },

    #[error("Generation budget must be positive")]
    NoGenerations,

    #[error("Parameter space has no slots")]
    EmptySpace,

    #[error("Distribution has {distribution} slots but parameter space has {space}")]
    LengthMismatch { distribution: usize, space: usize },

    #[error("Invalid group {group}: {message}")]
    InvalidGroup { group: String, message: String },

    #[error("Dataset not found: {path}")]
    DatasetNotFound { path: String },

    #[error("Invalid dataset: {message}")]
    InvalidDataset { message: String },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Errors raised while evaluating a candidate
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("Candidate {index} has {actual} parameters, evaluator expects {expected}")]
    WrongArity {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Evaluator panicked on candidate {index}: {message}")]
    Panicked { index: usize, message: String },

    #[error("Evaluator failed: {message}")]
    Failed { message: String },

    #[error("Worker pool could not be built: {message}")]
    Pool { message: String },

    #[error("No candidate produced a finite loss in {generations} generations")]
    NoFiniteLoss { generations: usize },
}

/// Errors raised while persisting or reloading a model
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model encoding failed: {0}")]
    Encode(String),

    #[error("Model decoding failed: {0}")]
    Decode(String),

    #[error("Model has {values} values but its space declares {space}")]
    Inconsistent { values: usize, space: usize },

    #[error("Group not found: {name}")]
    GroupNotFound { name: String },
}

/// Result type alias for distribution search operations
pub type DsResult<T> = Result<T, DsError>;

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::errors::DsError::Config($crate::errors::ConfigError::Invalid {
            message: format!($($arg)*),
        })
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::errors::DsError::Internal(format!($($arg)*))
    };
}
