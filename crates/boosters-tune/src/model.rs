//! The build result: hyperparameter optimisation and the final forest.

use std::io;
use std::mem::size_of;
use std::sync::Arc;

use crate::data::DataFrame;
use crate::error::TrainError;
use crate::factory::FactoryConfig;
use crate::mask::{CrossValidationMasks, RowMask};
use crate::memory::MemoryMonitor;
use crate::persist::{TrainingState, STATE_VERSION};
use crate::training::{
    ForestModel, Loss, TrainRequest, TrainingContext, TrainingLogger, TrainingObserver,
    TrainingProgress, TreeTrainer,
};
use crate::tuning::{BayesianOptimiser, Hyperparameters, SearchSpace};
use crate::utils::{derive_seed, derive_seed2, run_with_threads, Parallelism};

/// Seed stream of the regularisation line searches.
pub(crate) const LINE_SEARCH_STREAM: u64 = 0x15E4;
/// Seed stream of the fold forests, indexed by round then fold.
const ROUND_STREAM: u64 = 0x40D;
const FINAL_FOREST_STREAM: u64 = 0xF1A1;

/// Everything a build prepared, ready to optimise and train.
///
/// Created by [`BoostedTreeFactory::build_for`](crate::BoostedTreeFactory::build_for).
/// Call [`train`](Self::train) to run the remaining optimisation rounds and
/// fit the final forest on all eligible rows.
pub struct BoostedTree<T: TreeTrainer> {
    pub(crate) config: FactoryConfig,
    pub(crate) trainer: T,
    pub(crate) context: TrainingContext,
    pub(crate) folds: CrossValidationMasks,
    pub(crate) eligible_rows: RowMask,
    /// Values the search space is applied to.
    pub(crate) base: Hyperparameters,
    pub(crate) optimiser: BayesianOptimiser,
    pub(crate) number_rounds: usize,
    pub(crate) progress: TrainingProgress,
    pub(crate) memory: MemoryMonitor,
    pub(crate) observer: Arc<dyn TrainingObserver>,
    pub(crate) logger: TrainingLogger,
    pub(crate) model: Option<T::Model>,
}

impl<T: TreeTrainer> BoostedTree<T> {
    #[inline]
    pub fn loss(&self) -> Loss {
        self.trainer.loss()
    }

    #[inline]
    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    #[inline]
    pub fn context(&self) -> &TrainingContext {
        &self.context
    }

    /// Frame columns the forest reads, including appended one-hot columns.
    #[inline]
    pub fn feature_columns(&self) -> &[usize] {
        &self.context.feature_columns
    }

    #[inline]
    pub fn number_folds(&self) -> usize {
        self.folds.n_folds()
    }

    #[inline]
    pub fn eligible_rows(&self) -> &RowMask {
        &self.eligible_rows
    }

    #[inline]
    pub fn search_space(&self) -> &SearchSpace {
        self.optimiser.space()
    }

    /// Optimisation round budget.
    #[inline]
    pub fn number_rounds(&self) -> usize {
        self.number_rounds
    }

    #[inline]
    pub fn rounds_completed(&self) -> usize {
        self.optimiser.observations().len()
    }

    #[inline]
    pub fn progress(&self) -> &TrainingProgress {
        &self.progress
    }

    /// Hyperparameters with the lowest cross-validated loss so far, or the
    /// initial ones before the first round.
    pub fn hyperparameters(&self) -> Hyperparameters {
        self.optimiser.best_hyperparameters(&self.base)
    }

    /// Mean test loss of the best round, if any round ran.
    pub fn best_loss(&self) -> Option<f64> {
        self.optimiser.best().map(|(_, observation)| observation.loss)
    }

    /// The final forest, once [`train`](Self::train) has finished.
    #[inline]
    pub fn model(&self) -> Option<&T::Model> {
        self.model.as_ref()
    }

    /// Run the remaining optimisation rounds, then train the final forest on
    /// all eligible rows with the best hyperparameters.
    ///
    /// `frame` must be the frame passed to the build, including the columns
    /// the build appended.
    pub fn train<F: DataFrame>(&mut self, frame: &F) -> Result<(), TrainError> {
        let n_threads = self.config.number_threads;
        run_with_threads(n_threads, |parallelism| self.train_with(frame, parallelism))
    }

    fn train_with<F: DataFrame>(&mut self, frame: &F, parallelism: Parallelism) -> Result<(), TrainError> {
        self.logger.start_optimisation(
            self.number_rounds,
            self.rounds_completed(),
            self.optimiser.space().len(),
        );

        while self.rounds_completed() < self.number_rounds {
            if let Some(patience) = self.config.optimisation_patience {
                if let Some((best_round, _)) = self.optimiser.best() {
                    if self.optimiser.rounds_since_improvement() >= patience {
                        self.logger.early_stopping(self.rounds_completed(), best_round);
                        let skipped = (self.number_rounds - self.rounds_completed()) as u64;
                        self.progress.add(skipped * self.round_work());
                        break;
                    }
                }
            }
            self.run_round(frame, parallelism)?;
        }

        self.train_final_forest(frame)
    }

    /// Trees one optimisation round trains.
    fn round_work(&self) -> u64 {
        (self.folds.n_folds() * self.base.maximum_number_trees) as u64
    }

    /// Evaluate the next proposed point on every fold and record the mean
    /// test loss.
    fn run_round<F: DataFrame>(&mut self, frame: &F, parallelism: Parallelism) -> Result<f64, TrainError> {
        let round = self.rounds_completed();
        let point = self.optimiser.propose(round);
        let hyperparameters = self.optimiser.space().apply(&self.base, &point);
        let round_seed = derive_seed2(self.config.seed, ROUND_STREAM, round as u64);

        let trainer = &self.trainer;
        let context = &self.context;
        let folds = &self.folds;
        let progress = &self.progress;
        let losses = parallelism.maybe_par_map(0..folds.n_folds(), |fold| {
            trainer
                .train_forest(
                    frame,
                    context,
                    TrainRequest {
                        train_rows: folds.train(fold),
                        test_rows: folds.test(fold),
                        hyperparameters: &hyperparameters,
                        seed: derive_seed(round_seed, fold as u64),
                        progress,
                    },
                )
                .map(|trained| trained.test_loss)
        });
        let losses = losses.into_iter().collect::<Result<Vec<f64>, TrainError>>()?;
        let loss = losses.iter().sum::<f64>() / losses.len() as f64;

        self.memory.add((point.len() + 1) * size_of::<f64>());
        self.optimiser.observe(point, loss);
        let best = self.best_loss().unwrap_or(loss);
        self.logger.round(round, loss, best);
        self.observer
            .record_training_state(self.training_state().into_persist_fn());
        Ok(loss)
    }

    fn train_final_forest<F: DataFrame>(&mut self, frame: &F) -> Result<(), TrainError> {
        let hyperparameters = self.hyperparameters();
        let no_test_rows = RowMask::new(self.eligible_rows.len());
        let trained = self.trainer.train_forest(
            frame,
            &self.context,
            TrainRequest {
                train_rows: &self.eligible_rows,
                test_rows: &no_test_rows,
                hyperparameters: &hyperparameters,
                seed: derive_seed(self.config.seed, FINAL_FOREST_STREAM),
                progress: &self.progress,
            },
        )?;
        self.logger
            .final_forest(trained.n_trees, self.eligible_rows.count());

        if let Some(previous) = self.model.take() {
            self.memory.release(previous.memory_usage());
        }
        self.memory.add(trained.model.memory_usage());
        self.model = Some(trained.model);
        Ok(())
    }

    /// Link-scale predictions for every row of `frame`.
    ///
    /// `frame` must hold the one-hot columns the build appended.
    pub fn predict_raw<F: DataFrame>(&self, frame: &F) -> Result<Vec<f64>, TrainError> {
        let model = self.model.as_ref().ok_or(TrainError::NotTrained)?;
        if let Some(required) = self.context.max_feature_column() {
            if required >= frame.n_columns() {
                return Err(TrainError::MissingFeatureColumns {
                    required,
                    available: frame.n_columns(),
                });
            }
        }
        Ok((0..frame.n_rows()).map(|row| model.predict_row(frame, row)).collect())
    }

    /// Predictions for every row of `frame` on the target's scale.
    pub fn predict<F: DataFrame>(&self, frame: &F) -> Result<Vec<f64>, TrainError> {
        let loss = self.loss();
        let mut predictions = self.predict_raw(frame)?;
        for prediction in &mut predictions {
            *prediction = loss.transform(*prediction);
        }
        Ok(predictions)
    }

    /// Snapshot of the optimisation state.
    pub fn training_state(&self) -> TrainingState {
        TrainingState {
            version: STATE_VERSION,
            loss: self.loss(),
            config: self.config.clone(),
            hyperparameters: self.base,
            search_space: self.optimiser.space().clone(),
            observations: self.optimiser.observations().to_vec(),
            best_round: self.optimiser.best().map(|(round, _)| round),
            rounds_completed: self.rounds_completed(),
            progress_units_completed: self.progress.completed(),
            n_features: self.context.n_features(),
            n_eligible_rows: self.eligible_rows.count(),
        }
    }

    /// Write the current optimisation state.
    pub fn persist(&self, writer: &mut dyn io::Write) -> io::Result<()> {
        self.training_state().to_writer(writer)
    }
}

impl<T: TreeTrainer> std::fmt::Debug for BoostedTree<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoostedTree")
            .field("loss", &self.loss())
            .field("n_features", &self.context.n_features())
            .field("number_folds", &self.folds.n_folds())
            .field("rounds_completed", &self.rounds_completed())
            .field("number_rounds", &self.number_rounds)
            .field("trained", &self.model.is_some())
            .finish()
    }
}
