//! boosters-tune: hyperparameter search for regularized gradient boosted trees.
//!
//! Given a frame and a dependent variable, the crate prepares everything a
//! boosted tree needs and then chooses its hyperparameters from the data.
//!
//! # Key Types
//!
//! - [`BoostedTreeFactory`] - Fluent configuration, frame preparation and restore
//! - [`BoostedTree`] - Optimisation rounds, the final forest and prediction
//! - [`FactoryConfig`] - Options, each either fixed or estimated from data
//! - [`TrainingState`] - Versioned snapshot for resuming a search
//! - [`DataFrame`] / [`ColumnFrame`] - Column-oriented input data
//!
//! # Building
//!
//! 1. Missing values, feature selection and one-hot encoding
//! 2. Cross-validation folds
//! 3. Initial hyperparameters and regularisation line searches
//! 4. Bayesian optimisation over the remaining dimensions
//! 5. Final forest on all eligible rows
//!
//! Steps 1 to 3 run in [`BoostedTreeFactory::build_for`], steps 4 and 5 in
//! [`BoostedTree::train`].

pub mod data;
pub mod error;
pub mod factory;
pub mod features;
pub mod mask;
pub mod memory;
pub mod model;
pub mod persist;
pub mod training;
pub mod tuning;
pub mod utils;

// =============================================================================
// Convenience Re-exports
// =============================================================================

pub use factory::{BoostedTreeFactory, FactoryConfig};
pub use model::BoostedTree;
pub use persist::{TrainingState, STATE_VERSION};

pub use error::{BuildError, ConfigError, DataError, RestoreError, TrainError};

pub use data::{ColumnFrame, ColumnKind, ColumnMeta, DataFrame};
pub use training::{Loss, TrainingObserver, Verbosity};

// Shared utilities
pub use utils::{run_with_threads, Parallelism};
