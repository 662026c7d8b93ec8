//! Building boosted trees with data-driven hyperparameters.
//!
//! [`BoostedTreeFactory`] collects configuration through fluent setters,
//! then [`build_for`](BoostedTreeFactory::build_for) prepares a frame:
//!
//! 1. missing-value masks and the eligible rows (dependent variable present)
//! 2. feature selection and one-hot encoding of frequent categories, which
//!    appends columns to the frame
//! 3. feature types and the feature sampling distribution
//! 4. cross-validation folds
//! 5. initial hyperparameters, regularisation line searches and the search
//!    space, or the restored equivalents
//!
//! The returned [`BoostedTree`] runs the optimisation rounds and trains the
//! final forest.
//!
//! # Example
//!
//! ```
//! use boosters_tune::data::{ColumnFrame, ColumnMeta};
//! use boosters_tune::training::Loss;
//! use boosters_tune::BoostedTreeFactory;
//!
//! let n = 400;
//! let x: Vec<f32> = (0..n).map(|i| (i % 40) as f32).collect();
//! let y: Vec<f32> = x.iter().map(|&v| if v < 20.0 { 1.0 } else { 5.0 }).collect();
//! let mut frame = ColumnFrame::from_columns([
//!     (ColumnMeta::numeric("x"), x),
//!     (ColumnMeta::numeric("y"), y),
//! ])
//! .unwrap();
//!
//! let mut factory = BoostedTreeFactory::construct_from_parameters(1, Loss::SquaredError);
//! factory
//!     .depth_penalty_multiplier(0.0)
//!     .tree_size_penalty_multiplier(0.0)
//!     .leaf_weight_penalty_multiplier(0.0)
//!     .maximum_number_trees(10)
//!     .maximum_optimisation_rounds_per_hyperparameter(0);
//! let mut tree = factory.build_for(&mut frame, 1).unwrap();
//! tree.train(&frame).unwrap();
//! let predictions = tree.predict(&frame).unwrap();
//! assert!((predictions[0] - 1.0).abs() < 0.5);
//! ```

mod config;

pub use config::{FactoryConfig, FactoryConfigBuilder};

use std::io;
use std::mem::size_of;
use std::sync::Arc;

use serde_json::Value;

use crate::data::DataFrame;
use crate::error::{BuildError, DataError, RestoreError};
use crate::features::{
    determine_feature_data_types, select_features_and_encode_categories, FeatureSampleDistribution,
};
use crate::mask::{cross_validation_row_masks, MissingFeatureMasks, RowMask};
use crate::memory::{estimate_memory_usage, MemoryEstimate, MemoryMonitor};
use crate::model::{BoostedTree, LINE_SEARCH_STREAM};
use crate::persist::TrainingState;
use crate::training::{
    CallbackObserver, ForestTrainer, Loss, PersistFn, TrainingContext, TrainingLogger,
    TrainingObserver, TrainingProgress, TreeTrainer, Verbosity,
};
use crate::tuning::{
    initialize_hyperparameters, initialize_unset_regularization_hyperparameters, line_search_work,
    number_free_hyperparameters, number_hyperparameter_tuning_rounds, BayesianOptimiser, Tunable,
};
use crate::utils::{derive_seed, run_with_threads, Parallelism};

/// Where a build starts from.
#[derive(Debug, Clone)]
enum InitialState {
    Fresh,
    Restored(Box<TrainingState>),
}

/// Configures and builds [`BoostedTree`]s.
///
/// Not meant for concurrent use; setters and builds run on the caller's
/// thread, and builds use their own worker pool.
pub struct BoostedTreeFactory {
    config: FactoryConfig,
    loss: Loss,
    initial_state: InitialState,
    callbacks: CallbackObserver,
    observer: Option<Arc<dyn TrainingObserver>>,
    extra_columns: Option<usize>,
}

impl BoostedTreeFactory {
    /// A fresh factory with default configuration.
    pub fn construct_from_parameters(number_threads: usize, loss: Loss) -> Self {
        Self {
            config: FactoryConfig {
                number_threads,
                ..FactoryConfig::default()
            },
            loss,
            initial_state: InitialState::Fresh,
            callbacks: CallbackObserver::default(),
            observer: None,
            extra_columns: None,
        }
    }

    /// A factory that resumes from a persisted training state.
    ///
    /// The configuration and loss come from the state; the next build
    /// continues optimisation where the state left off.
    pub fn construct_from_str(state: &str) -> Result<Self, RestoreError> {
        Self::from_state(TrainingState::from_json(state)?)
    }

    /// As [`construct_from_str`](Self::construct_from_str), reading from any source.
    pub fn construct_from_reader(reader: impl io::Read) -> Result<Self, RestoreError> {
        Self::from_state(TrainingState::from_reader(reader)?)
    }

    fn from_state(state: TrainingState) -> Result<Self, RestoreError> {
        Ok(Self {
            config: state.config.clone(),
            loss: state.loss,
            initial_state: InitialState::Restored(Box::new(state)),
            callbacks: CallbackObserver::default(),
            observer: None,
            extra_columns: None,
        })
    }

    #[inline]
    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    #[inline]
    pub fn loss(&self) -> Loss {
        self.loss
    }

    #[inline]
    pub fn is_restored(&self) -> bool {
        matches!(self.initial_state, InitialState::Restored(_))
    }

    // =========================================================================
    // Fluent setters
    // =========================================================================

    pub fn number_threads(&mut self, number_threads: usize) -> &mut Self {
        self.config.number_threads = number_threads;
        self
    }

    pub fn depth_penalty_multiplier(&mut self, value: f64) -> &mut Self {
        self.config.depth_penalty_multiplier = Tunable::Fixed(value);
        self
    }

    pub fn tree_size_penalty_multiplier(&mut self, value: f64) -> &mut Self {
        self.config.tree_size_penalty_multiplier = Tunable::Fixed(value);
        self
    }

    pub fn leaf_weight_penalty_multiplier(&mut self, value: f64) -> &mut Self {
        self.config.leaf_weight_penalty_multiplier = Tunable::Fixed(value);
        self
    }

    pub fn soft_tree_depth_limit(&mut self, value: f64) -> &mut Self {
        self.config.soft_tree_depth_limit = Tunable::Fixed(value);
        self
    }

    pub fn soft_tree_depth_tolerance(&mut self, value: f64) -> &mut Self {
        self.config.soft_tree_depth_tolerance = Tunable::Fixed(value);
        self
    }

    pub fn max_tree_depth_tolerance(&mut self, value: f64) -> &mut Self {
        self.config.max_tree_depth_tolerance = Tunable::Fixed(value);
        self
    }

    /// Learning rate. Values below [`MINIMUM_ETA`](crate::tuning::MINIMUM_ETA)
    /// fail the build.
    pub fn eta(&mut self, value: f64) -> &mut Self {
        self.config.eta = Tunable::Fixed(value);
        self
    }

    pub fn maximum_number_trees(&mut self, value: usize) -> &mut Self {
        self.config.maximum_number_trees = Tunable::Fixed(value);
        self
    }

    pub fn feature_bag_fraction(&mut self, value: f64) -> &mut Self {
        self.config.feature_bag_fraction = Tunable::Fixed(value);
        self
    }

    pub fn rows_per_feature(&mut self, value: usize) -> &mut Self {
        self.config.rows_per_feature = value;
        self
    }

    pub fn number_folds(&mut self, value: usize) -> &mut Self {
        self.config.number_folds = value;
        self
    }

    pub fn minimum_frequency_to_one_hot_encode(&mut self, value: f64) -> &mut Self {
        self.config.minimum_frequency_to_one_hot_encode = value;
        self
    }

    pub fn maximum_optimisation_rounds_per_hyperparameter(&mut self, value: usize) -> &mut Self {
        self.config.maximum_optimisation_rounds_per_hyperparameter = value;
        self
    }

    pub fn bayesian_optimisation_restarts(&mut self, value: usize) -> &mut Self {
        self.config.bayesian_optimisation_restarts = value;
        self
    }

    pub fn optimisation_patience(&mut self, value: usize) -> &mut Self {
        self.config.optimisation_patience = Some(value);
        self
    }

    pub fn seed(&mut self, value: u64) -> &mut Self {
        self.config.seed = value;
        self
    }

    pub fn verbosity(&mut self, value: Verbosity) -> &mut Self {
        self.config.verbosity = value;
        self
    }

    /// Receives the fraction of work completed, never decreasing.
    pub fn progress_callback(&mut self, f: impl Fn(f64) + Send + Sync + 'static) -> &mut Self {
        self.callbacks = std::mem::take(&mut self.callbacks).on_progress(f);
        self
    }

    /// Receives signed changes in bytes held.
    pub fn memory_usage_callback(&mut self, f: impl Fn(i64) + Send + Sync + 'static) -> &mut Self {
        self.callbacks = std::mem::take(&mut self.callbacks).on_memory_usage(f);
        self
    }

    /// Receives a persist function after every optimisation round.
    pub fn training_state_callback(&mut self, f: impl Fn(PersistFn) + Send + Sync + 'static) -> &mut Self {
        self.callbacks = std::mem::take(&mut self.callbacks).on_training_state(f);
        self
    }

    /// Report to `observer` instead of the callbacks.
    pub fn observer(&mut self, observer: Arc<dyn TrainingObserver>) -> &mut Self {
        self.observer = Some(observer);
        self
    }

    fn observer_handle(&self) -> Arc<dyn TrainingObserver> {
        match &self.observer {
            Some(observer) => Arc::clone(observer),
            None => Arc::new(self.callbacks.clone()),
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Peak bytes a build and training run on an `n_rows × n_columns` frame
    /// may hold, by component.
    ///
    /// Every column but the dependent variable is assumed categorical, each
    /// one-hot encoding the most categories the frequency threshold allows.
    pub fn memory_estimate(&self, n_rows: usize, n_columns: usize) -> MemoryEstimate {
        let extra_columns = n_columns.saturating_sub(1) * self.maximum_extra_columns_per_feature();
        estimate_memory_usage(&self.config, n_rows, n_columns, extra_columns)
    }

    /// Upper bound on the bytes a build and training run may hold.
    ///
    /// Depends only on the configuration and the frame shape, so it can be
    /// asked before committing to a build.
    pub fn estimate_memory_usage(&self, n_rows: usize, n_columns: usize) -> usize {
        self.memory_estimate(n_rows, n_columns).total()
    }

    /// Columns the build appends to the frame.
    ///
    /// Exact after a successful build. Before it, the bound for a single
    /// categorical column, `floor(1 / minimum_frequency_to_one_hot_encode)`;
    /// a frame with `k` categorical features may append up to `k` times that.
    pub fn number_extra_columns_for_train(&self) -> usize {
        self.extra_columns.unwrap_or_else(|| self.maximum_extra_columns_per_feature())
    }

    fn maximum_extra_columns_per_feature(&self) -> usize {
        let frequency = self.config.minimum_frequency_to_one_hot_encode;
        if frequency > 0.0 && frequency.is_finite() {
            (1.0 / frequency).floor() as usize
        } else {
            0
        }
    }

    // =========================================================================
    // Build
    // =========================================================================

    /// Prepare `frame` for training with the reference [`ForestTrainer`].
    ///
    /// Appends one-hot columns to `frame`. On error the frame may already
    /// hold some of them.
    pub fn build_for<F: DataFrame>(
        &mut self,
        frame: &mut F,
        dependent_variable: usize,
    ) -> Result<BoostedTree<ForestTrainer>, BuildError> {
        let trainer = ForestTrainer::new(self.loss);
        self.build_with(frame, dependent_variable, trainer)
    }

    /// As [`build_for`](Self::build_for), training with `trainer`.
    pub fn build_with<F: DataFrame, T: TreeTrainer>(
        &mut self,
        frame: &mut F,
        dependent_variable: usize,
        trainer: T,
    ) -> Result<BoostedTree<T>, BuildError> {
        self.config.validate()?;
        if let InitialState::Restored(state) = &self.initial_state {
            check_restored_config(&self.config, &state.config)?;
        }
        let n_threads = self.config.number_threads;
        run_with_threads(n_threads, |parallelism| {
            self.build_in_pool(frame, dependent_variable, trainer, parallelism)
        })
    }

    fn build_in_pool<F: DataFrame, T: TreeTrainer>(
        &mut self,
        frame: &mut F,
        dependent_variable: usize,
        trainer: T,
        parallelism: Parallelism,
    ) -> Result<BoostedTree<T>, BuildError> {
        let config = self.config.clone();
        let logger = TrainingLogger::new(config.verbosity);
        let observer = self.observer_handle();
        let loss = trainer.loss();

        logger.stage("dependent variable");
        if dependent_variable >= frame.n_columns() {
            return Err(DataError::DependentVariableOutOfRange {
                column: dependent_variable,
                n_columns: frame.n_columns(),
            }
            .into());
        }
        if frame.column_meta(dependent_variable).kind.is_categorical() {
            return Err(DataError::InvalidDependentVariable {
                column: dependent_variable,
                reason: "categorical columns cannot be regressed on".into(),
            }
            .into());
        }

        logger.stage("missing feature masks");
        let mut missing = MissingFeatureMasks::compute(&*frame, parallelism);
        let eligible = missing.eligible_rows(dependent_variable);
        let n_eligible = eligible.count();
        if n_eligible == 0 {
            return Err(DataError::NoEligibleRows.into());
        }
        if let Some(target) = first_invalid_target(&*frame, dependent_variable, &eligible, loss, parallelism) {
            return Err(DataError::InvalidDependentVariable {
                column: dependent_variable,
                reason: format!("{target} is not a valid {} target", loss.name()),
            }
            .into());
        }

        logger.stage("feature selection");
        let encoding = select_features_and_encode_categories(
            frame,
            dependent_variable,
            &eligible,
            &mut missing,
            config.minimum_frequency_to_one_hot_encode,
            parallelism,
        )?;
        self.extra_columns = Some(encoding.number_extra_columns());
        let frame: &F = frame;

        logger.stage("feature data types");
        let feature_types = determine_feature_data_types(frame, &encoding, &eligible, parallelism);
        logger.stage("feature sample distribution");
        let sample_distribution =
            FeatureSampleDistribution::initialize(&encoding).ok_or(DataError::NoUsableFeatures)?;
        let n_features = encoding.n_features();

        logger.stage("cross-validation masks");
        let folds = cross_validation_row_masks(
            &eligible,
            config.number_folds,
            config.rows_per_feature,
            n_features,
            config.seed,
        )?;
        if folds.n_folds() < config.number_folds {
            logger.folds_reduced(config.number_folds, folds.n_folds());
        }

        let context = TrainingContext {
            dependent_variable,
            feature_columns: encoding.feature_columns(),
            feature_types,
            sample_distribution,
        };

        let memory = MemoryMonitor::new(Arc::clone(&observer));
        memory.add(
            missing.memory_usage()
                + eligible.memory_usage()
                + folds.memory_usage()
                + context.memory_usage()
                + encoding.number_extra_columns() * frame.n_rows() * size_of::<f32>(),
        );

        let number_rounds = number_hyperparameter_tuning_rounds(
            config.maximum_optimisation_rounds_per_hyperparameter,
            number_free_hyperparameters(&config),
        );

        let (base, optimiser, progress) = match &self.initial_state {
            InitialState::Fresh => {
                let (mut base, mut space) =
                    initialize_hyperparameters(&config, n_features, folds.train(0).count());
                let trees = base.maximum_number_trees;
                let total = line_search_work(config.unset_regularizers().len(), trees)
                    + ((number_rounds * folds.n_folds() + 1) * trees) as u64;
                let progress = TrainingProgress::initialize(total, Arc::clone(&observer));

                for dimension in space.dimensions() {
                    let interval = dimension.interval;
                    logger.search_interval(
                        dimension.hyperparameter.name(),
                        interval.lower,
                        interval.centre,
                        interval.upper,
                    );
                }
                logger.stage("regularization line search");
                initialize_unset_regularization_hyperparameters(
                    frame,
                    &context,
                    &trainer,
                    &folds,
                    &config,
                    &mut base,
                    &mut space,
                    &progress,
                    &logger,
                    derive_seed(config.seed, LINE_SEARCH_STREAM),
                )?;

                let optimiser =
                    BayesianOptimiser::new(space, config.bayesian_optimisation_restarts, config.seed);
                (base, optimiser, progress)
            }
            InitialState::Restored(state) => {
                check_restored_state(state, loss, n_features, n_eligible)?;
                let trees = state.hyperparameters.maximum_number_trees;
                let remaining_rounds = number_rounds.saturating_sub(state.rounds_completed);
                let remaining = ((remaining_rounds * folds.n_folds() + 1) * trees) as u64;
                let progress = TrainingProgress::resume(
                    state.progress_units_completed,
                    state.progress_units_completed + remaining,
                    Arc::clone(&observer),
                );
                let optimiser = BayesianOptimiser::restore(
                    state.search_space.clone(),
                    state.observations.clone(),
                    config.bayesian_optimisation_restarts,
                    config.seed,
                );
                (state.hyperparameters, optimiser, progress)
            }
        };
        memory.add(optimiser.observations().len() * (optimiser.space().len() + 1) * size_of::<f64>());

        Ok(BoostedTree {
            config,
            trainer,
            context,
            folds,
            eligible_rows: eligible,
            base,
            optimiser,
            number_rounds,
            progress,
            memory,
            observer,
            logger,
            model: None,
        })
    }
}

impl std::fmt::Debug for BoostedTreeFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoostedTreeFactory")
            .field("config", &self.config)
            .field("loss", &self.loss)
            .field("restored", &self.is_restored())
            .field("callbacks", &self.callbacks)
            .field("custom_observer", &self.observer.is_some())
            .finish()
    }
}

/// First eligible target value the loss rejects.
fn first_invalid_target<F: DataFrame>(
    frame: &F,
    dependent_variable: usize,
    eligible: &RowMask,
    loss: Loss,
    parallelism: Parallelism,
) -> Option<f64> {
    frame
        .read_rows(
            eligible,
            parallelism,
            || None,
            |invalid: &mut Option<f64>, row| {
                if invalid.is_none() {
                    let target = row.value(dependent_variable) as f64;
                    if !loss.is_valid_target(target) {
                        *invalid = Some(target);
                    }
                }
            },
        )
        .into_iter()
        .flatten()
        .next()
}

/// Options that may differ from the saved state without changing results.
const RESUMABLE_OPTIONS: [&str; 2] = ["number_threads", "verbosity"];

/// Reject a resume whose configuration was changed after restoring.
fn check_restored_config(current: &FactoryConfig, saved: &FactoryConfig) -> Result<(), DataError> {
    let changed = changed_options(current, saved);
    if changed.is_empty() {
        Ok(())
    } else {
        Err(DataError::IncompatibleRestoredState(format!(
            "options changed since the state was saved: {}",
            changed.join(", ")
        )))
    }
}

/// Names of the options whose values differ, ignoring [`RESUMABLE_OPTIONS`].
fn changed_options(current: &FactoryConfig, saved: &FactoryConfig) -> Vec<String> {
    match (serde_json::to_value(current), serde_json::to_value(saved)) {
        (Ok(Value::Object(current)), Ok(Value::Object(saved))) => current
            .iter()
            .filter(|(name, value)| {
                !RESUMABLE_OPTIONS.contains(&name.as_str()) && saved.get(name.as_str()) != Some(*value)
            })
            .map(|(name, _)| name.clone())
            .collect(),
        _ => {
            let mut current = current.clone();
            current.number_threads = saved.number_threads;
            current.verbosity = saved.verbosity;
            if current == *saved {
                Vec::new()
            } else {
                vec!["configuration".to_string()]
            }
        }
    }
}

fn check_restored_state(
    state: &TrainingState,
    loss: Loss,
    n_features: usize,
    n_eligible_rows: usize,
) -> Result<(), DataError> {
    if state.loss != loss {
        return Err(DataError::IncompatibleRestoredState(format!(
            "state was trained with {} but the trainer uses {}",
            state.loss.name(),
            loss.name()
        )));
    }
    if state.n_features != n_features {
        return Err(DataError::IncompatibleRestoredState(format!(
            "state has {} features, frame has {n_features}",
            state.n_features
        )));
    }
    if state.n_eligible_rows != n_eligible_rows {
        return Err(DataError::IncompatibleRestoredState(format!(
            "state has {} eligible rows, frame has {n_eligible_rows}",
            state.n_eligible_rows
        )));
    }
    Ok(())
}
