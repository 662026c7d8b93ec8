//! Error types surfaced by the factory, the training loop, and state restore.

use thiserror::Error;

/// An option was set to a value outside its valid range.
///
/// Setters never fail; validation happens once when the factory builds.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("eta must be in [{minimum}, 1], got {value}")]
    InvalidEta { value: f64, minimum: f64 },

    #[error("maximum number of trees must be in [1, {maximum}], got {value}")]
    InvalidMaximumNumberTrees { value: usize, maximum: usize },

    #[error("{field} must be non-negative and finite, got {value}")]
    NegativePenalty { field: &'static str, value: f64 },

    #[error("{field} must be positive and finite, got {value}")]
    NonPositive { field: &'static str, value: f64 },

    #[error("feature bag fraction must be in (0, 1], got {0}")]
    InvalidFeatureBagFraction(f64),

    #[error("minimum frequency to one-hot encode must be in (0, 1], got {0}")]
    InvalidOneHotFrequency(f64),

    #[error("number of folds must be at least 2, got {0}")]
    InvalidNumberFolds(usize),

    #[error("rows per feature must be at least 1")]
    InvalidRowsPerFeature,

    #[error("bayesian optimisation needs at least one restart")]
    InvalidRestarts,
}

/// The frame cannot support the requested training.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    #[error("dependent variable column {column} out of range for frame with {n_columns} columns")]
    DependentVariableOutOfRange { column: usize, n_columns: usize },

    #[error("dependent variable column {column} is invalid: {reason}")]
    InvalidDependentVariable { column: usize, reason: String },

    #[error("no rows have a value for the dependent variable")]
    NoEligibleRows,

    #[error("no usable features remain after feature selection")]
    NoUsableFeatures,

    #[error(
        "{eligible_rows} eligible rows cannot provide {required_train_rows} training rows per fold \
         for any fold count in [2, {number_folds}]"
    )]
    InsufficientRows {
        eligible_rows: usize,
        required_train_rows: usize,
        number_folds: usize,
    },

    #[error("column length {got} does not match frame row count {expected}")]
    ColumnLengthMismatch { expected: usize, got: usize },

    #[error("restored state does not match the frame: {0}")]
    IncompatibleRestoredState(String),
}

/// The tree-construction collaborator could not produce a forest.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrainError {
    #[error("training row mask selects no rows")]
    EmptyTrainingSet,

    #[error("no features available for training")]
    NoFeatures,

    #[error("loss evaluated to a non-finite value ({0})")]
    NonFiniteLoss(f64),

    #[error("row mask length {mask} does not match frame row count {frame}")]
    MaskLengthMismatch { mask: usize, frame: usize },

    #[error("model has not been trained")]
    NotTrained,

    #[error("model reads column {required} but the frame has {available} columns; predict on the encoded frame")]
    MissingFeatureColumns { required: usize, available: usize },
}

/// Failure to rebuild a factory from persisted training state.
///
/// Restore failures are fatal: no partially restored factory is returned.
#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("malformed training state: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("I/O error reading training state: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported training state version {found} (expected {expected})")]
    UnsupportedVersion { found: u64, expected: u64 },

    #[error("training state references unexpected loss function {0:?}")]
    UnexpectedLoss(String),

    #[error("inconsistent training state: {0}")]
    Inconsistent(String),
}

/// Failure of [`BoostedTreeFactory::build_for`](crate::BoostedTreeFactory::build_for).
///
/// A failed build may already have appended encoding columns to the frame;
/// those columns must not be relied upon.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("data error: {0}")]
    Data(#[from] DataError),

    #[error("training error: {0}")]
    Train(#[from] TrainError),
}
