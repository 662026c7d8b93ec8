//! Sequential Bayesian optimisation of the cross-validated test loss.

use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::utils::{derive_seed2, seeded_rng};

use super::gaussian_process::{expected_improvement, GaussianProcess};
use super::{Hyperparameters, SearchSpace};

/// Length scales tried when fitting the surrogate, in unit-cube distance.
pub const LENGTH_SCALE_GRID: [f64; 6] = [0.05, 0.1, 0.2, 0.4, 0.8, 1.6];

/// Observation noise on normalised losses.
pub const SURROGATE_NOISE: f64 = 1e-3;

const PROPOSAL_STREAM: u64 = 0xB0;
const PATTERN_SEARCH_INITIAL_STEP: f64 = 0.25;
const PATTERN_SEARCH_MINIMUM_STEP: f64 = 1e-3;
const PATTERN_SEARCH_MAX_ITERATIONS: usize = 200;

/// A probed point in unit-cube coordinates and its mean test loss.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub point: Vec<f64>,
    pub loss: f64,
}

/// Proposes points of a [`SearchSpace`] to evaluate next.
///
/// Round 0 probes the centre of every interval and rounds `1..=d` sample
/// uniformly, where `d` is the dimension. Later rounds fit a Gaussian
/// process to all observations and maximise expected improvement from
/// `restarts` random starting points. Each round draws from its own seeded
/// stream, so a restored optimiser proposes exactly what the original would
/// have.
#[derive(Clone, Debug)]
pub struct BayesianOptimiser {
    space: SearchSpace,
    observations: Vec<Observation>,
    restarts: usize,
    seed: u64,
}

impl BayesianOptimiser {
    pub fn new(space: SearchSpace, restarts: usize, seed: u64) -> Self {
        Self::restore(space, Vec::new(), restarts, seed)
    }

    /// Continue from earlier observations.
    pub fn restore(space: SearchSpace, observations: Vec<Observation>, restarts: usize, seed: u64) -> Self {
        Self {
            space,
            observations,
            restarts: restarts.max(1),
            seed,
        }
    }

    #[inline]
    pub fn space(&self) -> &SearchSpace {
        &self.space
    }

    #[inline]
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// Next point to evaluate in round `round`.
    pub fn propose(&self, round: usize) -> Vec<f64> {
        let dimensions = self.space.len();
        if dimensions == 0 {
            return Vec::new();
        }
        let mut rng = seeded_rng(derive_seed2(self.seed, PROPOSAL_STREAM, round as u64));
        if round == 0 {
            return self.space.centre_unit();
        }
        if round <= dimensions || self.observations.len() <= dimensions {
            return random_point(dimensions, &mut rng);
        }

        let Some(gp) = self.fit_surrogate() else {
            return random_point(dimensions, &mut rng);
        };
        let best_loss = self
            .observations
            .iter()
            .map(|o| o.loss)
            .fold(f64::INFINITY, f64::min);

        let mut best: Option<(Vec<f64>, f64)> = None;
        for _ in 0..self.restarts {
            let start = random_point(dimensions, &mut rng);
            let (point, value) = pattern_search(&gp, start, best_loss);
            if best.as_ref().map_or(true, |(_, v)| value > *v) {
                best = Some((point, value));
            }
        }
        best.map_or_else(|| self.space.centre_unit(), |(point, _)| point)
    }

    fn fit_surrogate(&self) -> Option<GaussianProcess> {
        let n = self.observations.len();
        let dimensions = self.space.len();
        let x = Array2::from_shape_fn((n, dimensions), |(i, j)| self.observations[i].point[j]);
        let y: Array1<f64> = self.observations.iter().map(|o| o.loss).collect();
        GaussianProcess::fit_best_length_scale(&x, &y, &LENGTH_SCALE_GRID, SURROGATE_NOISE)
    }

    pub fn observe(&mut self, point: Vec<f64>, loss: f64) {
        self.observations.push(Observation { point, loss });
    }

    /// Round index and observation with the lowest loss; earliest wins ties.
    pub fn best(&self) -> Option<(usize, &Observation)> {
        self.observations
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, &Observation)>, (i, o)| match best {
                Some((_, b)) if b.loss <= o.loss => best,
                _ => Some((i, o)),
            })
    }

    /// Rounds observed after the best one.
    pub fn rounds_since_improvement(&self) -> usize {
        self.best()
            .map_or(0, |(round, _)| self.observations.len() - 1 - round)
    }

    /// `base` with the best observed point applied, or `base` before any round.
    pub fn best_hyperparameters(&self, base: &Hyperparameters) -> Hyperparameters {
        match self.best() {
            Some((_, observation)) => self.space.apply(base, &observation.point),
            None => *base,
        }
    }
}

fn random_point(dimensions: usize, rng: &mut impl Rng) -> Vec<f64> {
    (0..dimensions).map(|_| rng.gen::<f64>()).collect()
}

/// Compass search on the expected improvement, within the unit cube.
fn pattern_search(gp: &GaussianProcess, start: Vec<f64>, best_loss: f64) -> (Vec<f64>, f64) {
    let acquisition = |point: &[f64]| {
        let (mean, variance) = gp.predict(ArrayView1::from(point));
        expected_improvement(mean, variance, best_loss)
    };

    let mut point = start;
    let mut value = acquisition(&point);
    let mut step = PATTERN_SEARCH_INITIAL_STEP;
    for _ in 0..PATTERN_SEARCH_MAX_ITERATIONS {
        if step < PATTERN_SEARCH_MINIMUM_STEP {
            break;
        }
        let mut improved = false;
        for dimension in 0..point.len() {
            for direction in [1.0, -1.0] {
                let mut candidate = point.clone();
                candidate[dimension] = (candidate[dimension] + direction * step).clamp(0.0, 1.0);
                let candidate_value = acquisition(&candidate);
                if candidate_value > value {
                    point = candidate;
                    value = candidate_value;
                    improved = true;
                }
            }
        }
        if !improved {
            step *= 0.5;
        }
    }
    (point, value)
}
