//! Initial hyperparameter values and their search intervals.

#![allow(clippy::too_many_arguments)]

use crate::data::DataFrame;
use crate::error::TrainError;
use crate::factory::FactoryConfig;
use crate::mask::CrossValidationMasks;
use crate::training::{TrainingContext, TrainingLogger, TrainingProgress, TreeTrainer};

use super::line_search::{
    estimate_tree_gain_and_curvature, test_loss_line_search, LineSearchRange,
    MAX_LINE_SEARCH_ITERATIONS,
};
use super::{Hyperparameter, Hyperparameters, SearchInterval, SearchSpace};
use super::{MAXIMUM_NUMBER_TREES, MINIMUM_ETA};

/// Upper bound on optimisation rounds, whatever the number of free
/// hyperparameters.
pub const MAXIMUM_NUMBER_OPTIMISATION_ROUNDS: usize = 100;

const DEFAULT_SOFT_TREE_DEPTH_TOLERANCE: f64 = 0.1;
const DEFAULT_MAX_TREE_DEPTH_TOLERANCE: f64 = 0.5;

/// Search interval for a regulariser whose line search had nothing to scale by.
fn default_regularizer_interval() -> SearchInterval {
    SearchInterval::new(1e-4f64.ln(), 1e-2f64.ln(), 0.0)
}

/// Offsets of the returned interval around the line-search minimiser.
fn regularizer_offsets(hyperparameter: Hyperparameter) -> (f64, f64) {
    match hyperparameter {
        Hyperparameter::DepthPenaltyMultiplier => (-8f64.ln(), 2f64.ln()),
        _ => (-8f64.ln(), 4f64.ln()),
    }
}

/// Initial learning rate for `n_features` features.
pub fn initial_eta(n_features: usize) -> f64 {
    let log_features = (n_features.max(1) as f64).ln();
    (0.3 / log_features.max(1.0)).max(0.1).max(MINIMUM_ETA)
}

/// Trees needed to converge at learning rate `eta`.
pub fn initial_maximum_number_trees(eta: f64) -> usize {
    ((2.0 / (eta * eta) + 0.5).floor() as usize).clamp(1, MAXIMUM_NUMBER_TREES)
}

/// Free hyperparameters: unset regularisers plus every unset searched value.
pub fn number_free_hyperparameters(config: &FactoryConfig) -> usize {
    [
        Hyperparameter::DepthPenaltyMultiplier,
        Hyperparameter::TreeSizePenaltyMultiplier,
        Hyperparameter::LeafWeightPenaltyMultiplier,
        Hyperparameter::SoftTreeDepthLimit,
        Hyperparameter::SoftTreeDepthTolerance,
        Hyperparameter::Eta,
        Hyperparameter::FeatureBagFraction,
    ]
    .into_iter()
    .filter(|&h| !config.is_fixed(h))
    .count()
}

/// Optimisation round budget.
pub fn number_hyperparameter_tuning_rounds(rounds_per_hyperparameter: usize, free_hyperparameters: usize) -> usize {
    rounds_per_hyperparameter
        .saturating_mul(free_hyperparameters)
        .min(MAXIMUM_NUMBER_OPTIMISATION_ROUNDS)
}

/// Trees the regularisation line searches train: one for the gain estimate,
/// then [`MAX_LINE_SEARCH_ITERATIONS`] forests per unset regulariser.
pub fn line_search_work(unset_regularizers: usize, maximum_number_trees: usize) -> u64 {
    if unset_regularizers == 0 {
        return 0;
    }
    1 + (unset_regularizers * MAX_LINE_SEARCH_ITERATIONS * maximum_number_trees) as u64
}

/// Fill every non-regularisation hyperparameter and the search intervals of
/// the unset ones.
///
/// Fixed values are taken as given. Regularisers start at their fixed value
/// or zero; [`initialize_unset_regularization_hyperparameters`] refines the
/// unset ones.
pub fn initialize_hyperparameters(
    config: &FactoryConfig,
    n_features: usize,
    n_train_rows: usize,
) -> (Hyperparameters, SearchSpace) {
    let n = n_features.max(1) as f64;
    let rows = n_train_rows.max(1) as f64;

    let eta = config.eta.or_estimate(|| initial_eta(n_features));
    let soft_tree_depth_limit = config
        .soft_tree_depth_limit
        .or_estimate(|| (rows.ln() / 4f64.ln()).max(2.0));
    let soft_tree_depth_tolerance = config
        .soft_tree_depth_tolerance
        .or_estimate(|| DEFAULT_SOFT_TREE_DEPTH_TOLERANCE);
    let feature_bag_fraction = config.feature_bag_fraction.or_estimate(|| {
        (rows / (n * config.rows_per_feature.max(1) as f64))
            .min(0.5)
            .max(1.0 / n)
    });

    let hyperparameters = Hyperparameters {
        depth_penalty_multiplier: config.depth_penalty_multiplier.fixed().unwrap_or(0.0),
        tree_size_penalty_multiplier: config.tree_size_penalty_multiplier.fixed().unwrap_or(0.0),
        leaf_weight_penalty_multiplier: config.leaf_weight_penalty_multiplier.fixed().unwrap_or(0.0),
        soft_tree_depth_limit,
        soft_tree_depth_tolerance,
        max_tree_depth_tolerance: config
            .max_tree_depth_tolerance
            .or_estimate(|| DEFAULT_MAX_TREE_DEPTH_TOLERANCE),
        eta,
        maximum_number_trees: config
            .maximum_number_trees
            .or_estimate(|| initial_maximum_number_trees(eta)),
        feature_bag_fraction,
    };

    let mut space = SearchSpace::default();
    if !config.is_fixed(Hyperparameter::SoftTreeDepthLimit) {
        let limit = soft_tree_depth_limit;
        space.push(
            Hyperparameter::SoftTreeDepthLimit,
            SearchInterval::new((0.5 * limit).max(1.0), limit, 2.0 * limit),
        );
    }
    if !config.is_fixed(Hyperparameter::SoftTreeDepthTolerance) {
        let tolerance = soft_tree_depth_tolerance;
        space.push(
            Hyperparameter::SoftTreeDepthTolerance,
            SearchInterval::new(0.01, tolerance, tolerance.max(0.5)),
        );
    }
    if !config.is_fixed(Hyperparameter::Eta) {
        space.push(
            Hyperparameter::Eta,
            SearchInterval::new(
                (eta / 3.0).max(MINIMUM_ETA).ln(),
                eta.ln(),
                (3.0 * eta).min(1.0).ln(),
            ),
        );
    }
    if !config.is_fixed(Hyperparameter::FeatureBagFraction) {
        let fraction = feature_bag_fraction;
        space.push(
            Hyperparameter::FeatureBagFraction,
            SearchInterval::new((0.5 * fraction).max(1.0 / n), fraction, (1.5 * fraction).min(1.0)),
        );
    }
    (hyperparameters, space)
}

/// Line-search every unset regulariser on the first fold and add its
/// interval to `space`.
///
/// Runs in order depth, tree size, leaf weight; each search starts from the
/// centres the earlier ones chose. A search that does not converge falls
/// back to its probed range; a regulariser with nothing to scale by (no
/// split found) falls back to a fixed default. Progress advances by exactly
/// [`line_search_work`] either way.
pub fn initialize_unset_regularization_hyperparameters<F: DataFrame, T: TreeTrainer>(
    frame: &F,
    context: &TrainingContext,
    trainer: &T,
    folds: &CrossValidationMasks,
    config: &FactoryConfig,
    hyperparameters: &mut Hyperparameters,
    space: &mut SearchSpace,
    progress: &TrainingProgress,
    logger: &TrainingLogger,
    seed: u64,
) -> Result<(), TrainError> {
    let unset = config.unset_regularizers();
    if unset.is_empty() {
        return Ok(());
    }

    let estimate = estimate_tree_gain_and_curvature(
        frame,
        context,
        trainer,
        folds.train(0),
        hyperparameters,
        progress,
        seed,
    )?;
    tracing::debug!(
        gain_per_split = estimate.gain_per_split,
        curvature_per_split = estimate.curvature_per_split,
        n_splits = estimate.n_splits,
        "estimated tree gain and curvature"
    );

    let forest_work = (MAX_LINE_SEARCH_ITERATIONS * hyperparameters.maximum_number_trees) as u64;
    for hyperparameter in unset {
        let scale = match hyperparameter {
            Hyperparameter::LeafWeightPenaltyMultiplier => estimate.curvature_per_split,
            _ => estimate.gain_per_split,
        };

        let interval = if scale > 0.0 && scale.is_finite() {
            let (left, right) = regularizer_offsets(hyperparameter);
            let range = LineSearchRange::below(scale, left, right);
            let searched = test_loss_line_search(
                frame,
                context,
                trainer,
                folds.train(0),
                folds.test(0),
                hyperparameters,
                |h, x| hyperparameter.set(h, x),
                range,
                progress,
                seed,
            )?;
            searched.unwrap_or_else(|| {
                logger.line_search_fallback(hyperparameter.name(), "no interior test loss minimum");
                range.fallback()
            })
        } else {
            progress.add(forest_work);
            logger.line_search_fallback(hyperparameter.name(), "no split to scale by");
            default_regularizer_interval()
        };

        hyperparameter.set(hyperparameters, interval.centre);
        logger.search_interval(hyperparameter.name(), interval.lower, interval.centre, interval.upper);
        space.push(hyperparameter, interval);
    }
    Ok(())
}
