//! Hyperparameter values, tunable options, and search dimensions.

use serde::{Deserialize, Serialize};

/// Lower bound on the learning rate.
pub const MINIMUM_ETA: f64 = 1e-3;

/// Upper bound on the number of trees: `floor(2 / MINIMUM_ETA + 0.5)`.
pub const MAXIMUM_NUMBER_TREES: usize = 2000;

// =============================================================================
// Tunable
// =============================================================================

/// A hyperparameter option: fixed by the caller, or left for the build to
/// estimate and search.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tunable<T> {
    Fixed(T),
    #[default]
    ToEstimate,
}

impl<T: Copy> Tunable<T> {
    #[inline]
    pub fn fixed(&self) -> Option<T> {
        match self {
            Tunable::Fixed(value) => Some(*value),
            Tunable::ToEstimate => None,
        }
    }

    #[inline]
    pub fn is_fixed(&self) -> bool {
        matches!(self, Tunable::Fixed(_))
    }

    /// The fixed value, or `estimate()` when unset.
    #[inline]
    pub fn or_estimate(&self, estimate: impl FnOnce() -> T) -> T {
        self.fixed().unwrap_or_else(estimate)
    }
}

// =============================================================================
// Hyperparameters
// =============================================================================

/// A complete set of values the tree trainer runs with.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    /// `α`: scales the penalty on splitting deep nodes.
    pub depth_penalty_multiplier: f64,
    /// `γ`: constant penalty per split.
    pub tree_size_penalty_multiplier: f64,
    /// `λ`: L2 penalty on leaf weights.
    pub leaf_weight_penalty_multiplier: f64,
    pub soft_tree_depth_limit: f64,
    pub soft_tree_depth_tolerance: f64,
    /// Hard depth limit is `soft_tree_depth_limit * (1 + max_tree_depth_tolerance)`.
    pub max_tree_depth_tolerance: f64,
    pub eta: f64,
    pub maximum_number_trees: usize,
    pub feature_bag_fraction: f64,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            depth_penalty_multiplier: 0.0,
            tree_size_penalty_multiplier: 0.0,
            leaf_weight_penalty_multiplier: 0.0,
            soft_tree_depth_limit: 6.0,
            soft_tree_depth_tolerance: 0.1,
            max_tree_depth_tolerance: 0.5,
            eta: 0.1,
            maximum_number_trees: 100,
            feature_bag_fraction: 0.5,
        }
    }
}

impl Hyperparameters {
    /// No node is split at this depth or deeper.
    pub fn hard_depth_limit(&self) -> usize {
        ((self.soft_tree_depth_limit * (1.0 + self.max_tree_depth_tolerance)).ceil() as usize).max(1)
    }

    /// Penalty charged for splitting a node at `depth`.
    ///
    /// Grows exponentially once `depth` passes the soft limit, at a rate set
    /// by the soft tolerance.
    pub fn depth_penalty(&self, depth: usize) -> f64 {
        if self.depth_penalty_multiplier == 0.0 {
            return 0.0;
        }
        let limit = self.soft_tree_depth_limit.max(f64::MIN_POSITIVE);
        let tolerance = self.soft_tree_depth_tolerance.max(f64::MIN_POSITIVE);
        self.depth_penalty_multiplier * ((depth as f64 / limit - 1.0) / tolerance).exp()
    }
}

// =============================================================================
// Hyperparameter
// =============================================================================

/// A searchable dimension of [`Hyperparameters`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hyperparameter {
    DepthPenaltyMultiplier,
    TreeSizePenaltyMultiplier,
    LeafWeightPenaltyMultiplier,
    SoftTreeDepthLimit,
    SoftTreeDepthTolerance,
    Eta,
    FeatureBagFraction,
}

impl Hyperparameter {
    /// Regularisation multipliers, in line-search order.
    pub const REGULARIZERS: [Hyperparameter; 3] = [
        Hyperparameter::DepthPenaltyMultiplier,
        Hyperparameter::TreeSizePenaltyMultiplier,
        Hyperparameter::LeafWeightPenaltyMultiplier,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Hyperparameter::DepthPenaltyMultiplier => "depth_penalty_multiplier",
            Hyperparameter::TreeSizePenaltyMultiplier => "tree_size_penalty_multiplier",
            Hyperparameter::LeafWeightPenaltyMultiplier => "leaf_weight_penalty_multiplier",
            Hyperparameter::SoftTreeDepthLimit => "soft_tree_depth_limit",
            Hyperparameter::SoftTreeDepthTolerance => "soft_tree_depth_tolerance",
            Hyperparameter::Eta => "eta",
            Hyperparameter::FeatureBagFraction => "feature_bag_fraction",
        }
    }

    /// Whether search coordinates are the natural log of the value.
    pub fn is_log_scale(self) -> bool {
        matches!(
            self,
            Hyperparameter::DepthPenaltyMultiplier
                | Hyperparameter::TreeSizePenaltyMultiplier
                | Hyperparameter::LeafWeightPenaltyMultiplier
                | Hyperparameter::Eta
        )
    }

    pub fn is_regularizer(self) -> bool {
        Self::REGULARIZERS.contains(&self)
    }

    /// Current value in search coordinates.
    pub fn get(self, hyperparameters: &Hyperparameters) -> f64 {
        let mut copy = *hyperparameters;
        let value = *self.field(&mut copy);
        if self.is_log_scale() {
            value.ln()
        } else {
            value
        }
    }

    /// Set from a value in search coordinates.
    pub fn set(self, hyperparameters: &mut Hyperparameters, coordinate: f64) {
        *self.field(hyperparameters) = if self.is_log_scale() {
            coordinate.exp()
        } else {
            coordinate
        };
    }

    fn field(self, hyperparameters: &mut Hyperparameters) -> &mut f64 {
        match self {
            Hyperparameter::DepthPenaltyMultiplier => &mut hyperparameters.depth_penalty_multiplier,
            Hyperparameter::TreeSizePenaltyMultiplier => &mut hyperparameters.tree_size_penalty_multiplier,
            Hyperparameter::LeafWeightPenaltyMultiplier => {
                &mut hyperparameters.leaf_weight_penalty_multiplier
            }
            Hyperparameter::SoftTreeDepthLimit => &mut hyperparameters.soft_tree_depth_limit,
            Hyperparameter::SoftTreeDepthTolerance => &mut hyperparameters.soft_tree_depth_tolerance,
            Hyperparameter::Eta => &mut hyperparameters.eta,
            Hyperparameter::FeatureBagFraction => &mut hyperparameters.feature_bag_fraction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn maximum_trees_matches_minimum_eta() {
        assert_eq!(MAXIMUM_NUMBER_TREES, (2.0 / MINIMUM_ETA + 0.5).floor() as usize);
    }

    #[test]
    fn tunable_defaults_to_estimate() {
        let tunable: Tunable<f64> = Tunable::default();
        assert!(!tunable.is_fixed());
        assert_eq!(tunable.or_estimate(|| 2.0), 2.0);
        assert_eq!(Tunable::Fixed(1.5).or_estimate(|| 2.0), 1.5);
    }

    #[test]
    fn log_scale_round_trip() {
        let mut hyperparameters = Hyperparameters::default();
        Hyperparameter::Eta.set(&mut hyperparameters, 0.2f64.ln());
        assert_abs_diff_eq!(hyperparameters.eta, 0.2, epsilon = 1e-15);
        assert_abs_diff_eq!(Hyperparameter::Eta.get(&hyperparameters), 0.2f64.ln(), epsilon = 1e-15);

        Hyperparameter::SoftTreeDepthLimit.set(&mut hyperparameters, 4.0);
        assert_eq!(hyperparameters.soft_tree_depth_limit, 4.0);
        assert_eq!(Hyperparameter::SoftTreeDepthLimit.get(&hyperparameters), 4.0);
    }

    #[test]
    fn depth_penalty_grows_past_soft_limit() {
        let hyperparameters = Hyperparameters {
            depth_penalty_multiplier: 1.0,
            soft_tree_depth_limit: 4.0,
            soft_tree_depth_tolerance: 0.5,
            ..Default::default()
        };
        assert_abs_diff_eq!(hyperparameters.depth_penalty(4), 1.0);
        assert!(hyperparameters.depth_penalty(2) < hyperparameters.depth_penalty(4));
        assert!(hyperparameters.depth_penalty(6) > 2.0);
        assert_eq!(hyperparameters.hard_depth_limit(), 6);
    }
}
