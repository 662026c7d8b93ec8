//! Factory configuration.
//!
//! Every option has a default, so a configuration can be built with only
//! the values the caller cares about:
//!
//! ```
//! use boosters_tune::factory::FactoryConfig;
//! use boosters_tune::tuning::Tunable;
//!
//! let config = FactoryConfig::builder()
//!     .eta(Tunable::Fixed(0.05))
//!     .number_folds(5)
//!     .build()
//!     .unwrap();
//! assert_eq!(config.number_folds, 5);
//! assert!(!config.depth_penalty_multiplier.is_fixed());
//! ```

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::training::Verbosity;
use crate::tuning::{Hyperparameter, Tunable, MAXIMUM_NUMBER_TREES, MINIMUM_ETA};

/// Options for building a boosted tree.
///
/// Hyperparameters left as [`Tunable::ToEstimate`] are initialised from the
/// data and then searched; fixed ones are used as given.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(derive(Clone, Debug), finish_fn(vis = "", name = __build_internal))]
pub struct FactoryConfig {
    // === Resources ===
    /// Worker threads. `0` uses all cores, `1` runs sequentially.
    #[builder(default = 1)]
    pub number_threads: usize,

    // === Regularisation ===
    #[builder(default)]
    pub depth_penalty_multiplier: Tunable<f64>,
    #[builder(default)]
    pub tree_size_penalty_multiplier: Tunable<f64>,
    #[builder(default)]
    pub leaf_weight_penalty_multiplier: Tunable<f64>,
    #[builder(default)]
    pub soft_tree_depth_limit: Tunable<f64>,
    #[builder(default)]
    pub soft_tree_depth_tolerance: Tunable<f64>,
    /// Never searched; only the initial value is estimated.
    #[builder(default)]
    pub max_tree_depth_tolerance: Tunable<f64>,

    // === Boosting ===
    /// Learning rate, at least [`MINIMUM_ETA`].
    #[builder(default)]
    pub eta: Tunable<f64>,
    /// Never searched; estimated from the initial `eta` when unset.
    #[builder(default)]
    pub maximum_number_trees: Tunable<usize>,
    #[builder(default)]
    pub feature_bag_fraction: Tunable<f64>,

    // === Data ===
    /// Training rows wanted per feature when choosing folds and bag sizes.
    #[builder(default = 50)]
    pub rows_per_feature: usize,
    #[builder(default = 4)]
    pub number_folds: usize,
    /// Categories at or above this frequency among eligible rows get their
    /// own indicator column.
    #[builder(default = 0.05)]
    pub minimum_frequency_to_one_hot_encode: f64,

    // === Optimisation ===
    #[builder(default = 3)]
    pub maximum_optimisation_rounds_per_hyperparameter: usize,
    #[builder(default = 10)]
    pub bayesian_optimisation_restarts: usize,
    /// Stop optimising after this many rounds without improvement.
    pub optimisation_patience: Option<usize>,

    // === Reproducibility ===
    #[builder(default = 42)]
    pub seed: u64,

    // === Logging ===
    #[builder(default)]
    pub verbosity: Verbosity,
}

impl<S: factory_config_builder::IsComplete> FactoryConfigBuilder<S> {
    /// Build and validate the configuration.
    pub fn build(self) -> Result<FactoryConfig, ConfigError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self::builder().__build_internal()
    }
}

impl FactoryConfig {
    /// The option that controls `hyperparameter`.
    pub fn tunable(&self, hyperparameter: Hyperparameter) -> Tunable<f64> {
        match hyperparameter {
            Hyperparameter::DepthPenaltyMultiplier => self.depth_penalty_multiplier,
            Hyperparameter::TreeSizePenaltyMultiplier => self.tree_size_penalty_multiplier,
            Hyperparameter::LeafWeightPenaltyMultiplier => self.leaf_weight_penalty_multiplier,
            Hyperparameter::SoftTreeDepthLimit => self.soft_tree_depth_limit,
            Hyperparameter::SoftTreeDepthTolerance => self.soft_tree_depth_tolerance,
            Hyperparameter::Eta => self.eta,
            Hyperparameter::FeatureBagFraction => self.feature_bag_fraction,
        }
    }

    #[inline]
    pub fn is_fixed(&self, hyperparameter: Hyperparameter) -> bool {
        self.tunable(hyperparameter).is_fixed()
    }

    /// Regularisers left for the line search, in search order.
    pub fn unset_regularizers(&self) -> Vec<Hyperparameter> {
        Hyperparameter::REGULARIZERS
            .into_iter()
            .filter(|&h| !self.is_fixed(h))
            .collect()
    }

    /// Check every fixed value against its admissible range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(eta) = self.eta.fixed() {
            if !(MINIMUM_ETA..=1.0).contains(&eta) {
                return Err(ConfigError::InvalidEta {
                    value: eta,
                    minimum: MINIMUM_ETA,
                });
            }
        }
        if let Some(trees) = self.maximum_number_trees.fixed() {
            if !(1..=MAXIMUM_NUMBER_TREES).contains(&trees) {
                return Err(ConfigError::InvalidMaximumNumberTrees {
                    value: trees,
                    maximum: MAXIMUM_NUMBER_TREES,
                });
            }
        }

        let non_negative = [
            ("depth_penalty_multiplier", self.depth_penalty_multiplier),
            ("tree_size_penalty_multiplier", self.tree_size_penalty_multiplier),
            ("leaf_weight_penalty_multiplier", self.leaf_weight_penalty_multiplier),
            ("max_tree_depth_tolerance", self.max_tree_depth_tolerance),
        ];
        for (field, tunable) in non_negative {
            if let Some(value) = tunable.fixed() {
                if !(value >= 0.0 && value.is_finite()) {
                    return Err(ConfigError::NegativePenalty { field, value });
                }
            }
        }

        let positive = [
            ("soft_tree_depth_limit", self.soft_tree_depth_limit),
            ("soft_tree_depth_tolerance", self.soft_tree_depth_tolerance),
        ];
        for (field, tunable) in positive {
            if let Some(value) = tunable.fixed() {
                if !(value > 0.0 && value.is_finite()) {
                    return Err(ConfigError::NonPositive { field, value });
                }
            }
        }

        if let Some(fraction) = self.feature_bag_fraction.fixed() {
            if !(fraction > 0.0 && fraction <= 1.0) {
                return Err(ConfigError::InvalidFeatureBagFraction(fraction));
            }
        }
        let frequency = self.minimum_frequency_to_one_hot_encode;
        if !(frequency > 0.0 && frequency <= 1.0) {
            return Err(ConfigError::InvalidOneHotFrequency(frequency));
        }
        if self.number_folds < 2 {
            return Err(ConfigError::InvalidNumberFolds(self.number_folds));
        }
        if self.rows_per_feature == 0 {
            return Err(ConfigError::InvalidRowsPerFeature);
        }
        if self.bayesian_optimisation_restarts == 0 {
            return Err(ConfigError::InvalidRestarts);
        }
        Ok(())
    }
}
