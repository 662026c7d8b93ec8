//! Search intervals and their mapping to the unit cube.

use serde::{Deserialize, Serialize};

use super::{Hyperparameter, Hyperparameters};

/// A closed interval in search coordinates with a preferred interior point.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchInterval {
    pub lower: f64,
    pub centre: f64,
    pub upper: f64,
}

impl SearchInterval {
    /// Orders the bounds and clamps `centre` into them.
    pub fn new(lower: f64, centre: f64, upper: f64) -> Self {
        let (lower, upper) = if lower <= upper { (lower, upper) } else { (upper, lower) };
        Self {
            lower,
            centre: centre.clamp(lower, upper),
            upper,
        }
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    #[inline]
    pub fn from_unit(&self, unit: f64) -> f64 {
        self.lower + unit.clamp(0.0, 1.0) * self.width()
    }

    /// Position of `value` in `[0, 1]`; degenerate intervals map to `0.5`.
    pub fn to_unit(&self, value: f64) -> f64 {
        if self.width() > 0.0 {
            ((value - self.lower) / self.width()).clamp(0.0, 1.0)
        } else {
            0.5
        }
    }

    pub fn is_finite(&self) -> bool {
        self.lower.is_finite() && self.centre.is_finite() && self.upper.is_finite()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchDimension {
    pub hyperparameter: Hyperparameter,
    pub interval: SearchInterval,
}

/// The hyperparameters left free for Bayesian optimisation.
///
/// The optimiser works on `[0, 1]^d`; each coordinate maps linearly onto its
/// dimension's interval, which is itself in log space for log-scale
/// hyperparameters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    dimensions: Vec<SearchDimension>,
}

impl SearchSpace {
    /// Add a dimension, replacing any earlier interval for the same hyperparameter.
    pub fn push(&mut self, hyperparameter: Hyperparameter, interval: SearchInterval) {
        match self.dimensions.iter_mut().find(|d| d.hyperparameter == hyperparameter) {
            Some(dimension) => dimension.interval = interval,
            None => self.dimensions.push(SearchDimension {
                hyperparameter,
                interval,
            }),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.dimensions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    #[inline]
    pub fn dimensions(&self) -> &[SearchDimension] {
        &self.dimensions
    }

    pub fn interval(&self, hyperparameter: Hyperparameter) -> Option<&SearchInterval> {
        self.dimensions
            .iter()
            .find(|d| d.hyperparameter == hyperparameter)
            .map(|d| &d.interval)
    }

    /// Unit-cube coordinates of every interval's centre.
    pub fn centre_unit(&self) -> Vec<f64> {
        self.dimensions
            .iter()
            .map(|d| d.interval.to_unit(d.interval.centre))
            .collect()
    }

    /// `base` with every searched hyperparameter set from `unit`.
    pub fn apply(&self, base: &Hyperparameters, unit: &[f64]) -> Hyperparameters {
        debug_assert_eq!(unit.len(), self.len());
        let mut hyperparameters = *base;
        for (dimension, &u) in self.dimensions.iter().zip(unit) {
            dimension
                .hyperparameter
                .set(&mut hyperparameters, dimension.interval.from_unit(u));
        }
        hyperparameters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn interval_orders_bounds() {
        let interval = SearchInterval::new(3.0, 5.0, 1.0);
        assert_eq!(interval, SearchInterval { lower: 1.0, centre: 3.0, upper: 3.0 });
        assert_eq!(SearchInterval::new(2.0, 2.0, 2.0).to_unit(2.0), 0.5);
    }

    #[test]
    fn apply_maps_unit_cube() {
        let mut space = SearchSpace::default();
        space.push(Hyperparameter::Eta, SearchInterval::new(0.01f64.ln(), 0.1f64.ln(), 1.0f64.ln()));
        space.push(Hyperparameter::SoftTreeDepthLimit, SearchInterval::new(2.0, 4.0, 8.0));
        assert_eq!(space.len(), 2);

        let centre = space.centre_unit();
        assert_abs_diff_eq!(centre[0], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(centre[1], 1.0 / 3.0, epsilon = 1e-12);

        let hyperparameters = space.apply(&Hyperparameters::default(), &centre);
        assert_abs_diff_eq!(hyperparameters.eta, 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(hyperparameters.soft_tree_depth_limit, 4.0, epsilon = 1e-12);

        let upper = space.apply(&Hyperparameters::default(), &[1.0, 0.0]);
        assert_abs_diff_eq!(upper.eta, 1.0, epsilon = 1e-12);
        assert_eq!(upper.soft_tree_depth_limit, 2.0);
    }

    #[test]
    fn push_replaces_existing_dimension() {
        let mut space = SearchSpace::default();
        space.push(Hyperparameter::Eta, SearchInterval::new(0.0, 0.5, 1.0));
        space.push(Hyperparameter::Eta, SearchInterval::new(1.0, 1.5, 2.0));
        assert_eq!(space.len(), 1);
        assert_eq!(space.interval(Hyperparameter::Eta).map(|i| i.centre), Some(1.5));
    }
}
