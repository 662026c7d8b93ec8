//! Loss functions the reference trainer boosts.

use serde::{Deserialize, Serialize};

/// Smallest probability used when evaluating log loss.
const PROBABILITY_EPSILON: f64 = 1e-12;

/// Training loss.
///
/// Part of the persisted training state: a payload naming any other loss is
/// rejected on restore.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Loss {
    /// Squared error for regression.
    ///
    /// - Loss: `0.5 * (pred - target)²`
    /// - Gradient: `pred - target`
    /// - Curvature: `1`
    #[default]
    SquaredError,

    /// Binary cross entropy on the logit scale, targets in {0, 1}.
    ///
    /// - Loss: `-t·ln(p) - (1 - t)·ln(1 - p)` with `p = sigmoid(pred)`
    /// - Gradient: `p - target`
    /// - Curvature: `p·(1 - p)`
    BinomialLogistic,
}

impl Loss {
    /// Names accepted in a persisted payload.
    pub const NAMES: [&'static str; 2] = ["squared_error", "binomial_logistic"];

    pub fn name(&self) -> &'static str {
        match self {
            Loss::SquaredError => "squared_error",
            Loss::BinomialLogistic => "binomial_logistic",
        }
    }

    #[inline]
    pub fn value(&self, prediction: f64, target: f64) -> f64 {
        match self {
            Loss::SquaredError => 0.5 * (prediction - target) * (prediction - target),
            Loss::BinomialLogistic => {
                let p = sigmoid(prediction).clamp(PROBABILITY_EPSILON, 1.0 - PROBABILITY_EPSILON);
                -(target * p.ln() + (1.0 - target) * (1.0 - p).ln())
            }
        }
    }

    #[inline]
    pub fn gradient(&self, prediction: f64, target: f64) -> f64 {
        match self {
            Loss::SquaredError => prediction - target,
            Loss::BinomialLogistic => sigmoid(prediction) - target,
        }
    }

    #[inline]
    pub fn curvature(&self, prediction: f64, _target: f64) -> f64 {
        match self {
            Loss::SquaredError => 1.0,
            Loss::BinomialLogistic => {
                let p = sigmoid(prediction);
                (p * (1.0 - p)).max(PROBABILITY_EPSILON)
            }
        }
    }

    /// Constant prediction minimising the loss over `targets`.
    pub fn base_score(&self, targets: &[f64]) -> f64 {
        if targets.is_empty() {
            return 0.0;
        }
        let mean = targets.iter().sum::<f64>() / targets.len() as f64;
        match self {
            Loss::SquaredError => mean,
            Loss::BinomialLogistic => {
                let p = mean.clamp(PROBABILITY_EPSILON, 1.0 - PROBABILITY_EPSILON);
                (p / (1.0 - p)).ln()
            }
        }
    }

    /// Whether `target` is a valid label for this loss.
    pub fn is_valid_target(&self, target: f64) -> bool {
        match self {
            Loss::SquaredError => target.is_finite(),
            Loss::BinomialLogistic => target == 0.0 || target == 1.0,
        }
    }

    /// Map a raw prediction to the target scale.
    pub fn transform(&self, prediction: f64) -> f64 {
        match self {
            Loss::SquaredError => prediction,
            Loss::BinomialLogistic => sigmoid(prediction),
        }
    }
}

#[inline]
fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
