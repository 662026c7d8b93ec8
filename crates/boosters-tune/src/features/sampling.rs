//! Weighted feature bagging.

use rand::Rng;

use crate::utils::weighted_sample_without_replacement;

use super::FeatureEncoding;

/// Weight every usable feature receives regardless of its correlation.
pub const FEATURE_WEIGHT_FLOOR: f64 = 0.1;

/// Sampling weights over the selected features.
///
/// A feature's weight is [`FEATURE_WEIGHT_FLOOR`] plus its absolute
/// correlation with the dependent variable. Features without variance get
/// weight zero and are never sampled.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureSampleDistribution {
    weights: Vec<f64>,
    n_usable: usize,
}

impl FeatureSampleDistribution {
    /// Build the distribution, or `None` when no feature is usable.
    pub fn initialize(encoding: &FeatureEncoding) -> Option<Self> {
        let weights: Vec<f64> = encoding
            .features()
            .iter()
            .map(|feature| {
                if feature.variance > 0.0 {
                    FEATURE_WEIGHT_FLOOR + feature.correlation.abs()
                } else {
                    0.0
                }
            })
            .collect();
        let n_usable = weights.iter().filter(|&&w| w > 0.0).count();
        (n_usable > 0).then_some(Self { weights, n_usable })
    }

    /// Equal weights over `n_features` features, or `None` when there are none.
    pub fn uniform(n_features: usize) -> Option<Self> {
        (n_features > 0).then(|| Self {
            weights: vec![1.0; n_features],
            n_usable: n_features,
        })
    }

    /// Weight per feature, in encoding order.
    #[inline]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    #[inline]
    pub fn n_usable(&self) -> usize {
        self.n_usable
    }

    /// Number of features a bag of `fraction` holds; at least one.
    pub fn bag_size(&self, fraction: f64) -> usize {
        ((fraction * self.n_usable as f64).ceil() as usize).clamp(1, self.n_usable)
    }

    /// Draw a feature bag. Returns sorted feature indices.
    pub fn sample(&self, fraction: f64, rng: &mut impl Rng) -> Vec<usize> {
        weighted_sample_without_replacement(&self.weights, self.bag_size(fraction), rng)
    }
}
