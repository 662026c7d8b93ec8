//! Forest training: the tree-construction collaborator and its monitoring.
//!
//! - [`TreeTrainer`]: interface the orchestrator drives, with [`ForestTrainer`]
//!   as the exact greedy reference implementation
//! - [`Tree`], [`Forest`]: structure-of-arrays model representation
//! - [`Loss`]: squared error and binomial logistic
//! - [`TrainingObserver`], [`TrainingProgress`]: progress, memory and state
//!   reporting
//! - [`TrainingLogger`], [`Verbosity`]: structured logging

mod logger;
mod loss;
mod observer;
mod progress;
mod trainer;
mod tree;

pub use logger::{TrainingLogger, Verbosity};
pub use loss::Loss;
pub use observer::{CallbackObserver, NoopObserver, PersistFn, TrainingObserver};
pub use progress::TrainingProgress;
pub use trainer::{
    ForestModel, ForestTrainer, TrainRequest, TrainedForest, TrainingContext, TreeTrainer,
};
pub use tree::{Forest, NodeId, SplitCondition, SplitRule, Tree, TreeValidationError, NODE_BYTES};
