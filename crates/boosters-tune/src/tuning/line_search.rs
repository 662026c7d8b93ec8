//! Line searches that bracket each regularisation multiplier.

#![allow(clippy::too_many_arguments)]

use crate::data::DataFrame;
use crate::error::TrainError;
use crate::mask::RowMask;
use crate::training::{TrainRequest, TrainingContext, TrainingProgress, TreeTrainer};

use super::{Hyperparameters, SearchInterval};

/// Test-loss probes per line search.
pub const MAX_LINE_SEARCH_ITERATIONS: usize = 8;

/// Ratio between the largest and smallest probed multiplier.
pub const LINE_SEARCH_RANGE: f64 = 100.0;

/// Gain and curvature per split of a single unregularised tree.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TreeGainAndCurvature {
    pub gain_per_split: f64,
    pub curvature_per_split: f64,
    pub n_splits: usize,
}

/// Train one tree on `train_rows` and read back its mean split statistics.
///
/// The values scale the regularisation multipliers: a tree-size penalty
/// above the typical split gain stops all splits, as does a leaf-weight
/// penalty far above the typical curvature. Both are zero when the tree
/// finds no split.
pub fn estimate_tree_gain_and_curvature<F: DataFrame, T: TreeTrainer>(
    frame: &F,
    context: &TrainingContext,
    trainer: &T,
    train_rows: &RowMask,
    hyperparameters: &Hyperparameters,
    progress: &TrainingProgress,
    seed: u64,
) -> Result<TreeGainAndCurvature, TrainError> {
    let probe = Hyperparameters {
        maximum_number_trees: 1,
        ..*hyperparameters
    };
    let no_test_rows = RowMask::new(train_rows.len());
    let trained = trainer.train_forest(
        frame,
        context,
        TrainRequest {
            train_rows,
            test_rows: &no_test_rows,
            hyperparameters: &probe,
            seed,
            progress,
        },
    )?;

    if trained.n_splits == 0 {
        return Ok(TreeGainAndCurvature::default());
    }
    let n = trained.n_splits as f64;
    Ok(TreeGainAndCurvature {
        gain_per_split: trained.split_gain / n,
        curvature_per_split: trained.split_curvature / n,
        n_splits: trained.n_splits,
    })
}

/// Probe range and returned-interval offsets for one line search, in log
/// space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineSearchRange {
    pub log_min: f64,
    pub log_max: f64,
    pub left_offset: f64,
    pub right_offset: f64,
}

impl LineSearchRange {
    /// Probe `[max / LINE_SEARCH_RANGE, max]`.
    pub fn below(max: f64, left_offset: f64, right_offset: f64) -> Self {
        let log_max = max.ln();
        Self {
            log_min: log_max - LINE_SEARCH_RANGE.ln(),
            log_max,
            left_offset,
            right_offset,
        }
    }

    /// The whole probed range, used when the search does not converge.
    pub fn fallback(&self) -> SearchInterval {
        SearchInterval::new(self.log_min, 0.5 * (self.log_min + self.log_max), self.log_max)
    }

    /// Probe coordinates from the largest multiplier down.
    pub fn probes(&self) -> impl Iterator<Item = f64> + '_ {
        let step = (self.log_max - self.log_min) / (MAX_LINE_SEARCH_ITERATIONS - 1) as f64;
        (0..MAX_LINE_SEARCH_ITERATIONS).map(move |i| self.log_max - i as f64 * step)
    }
}

/// Bracket the multiplier that minimises test loss.
///
/// Trains one forest per probe, from strong to weak regularisation, fits a
/// quadratic in log space to the test losses and takes its minimiser. The
/// result is centred there with the range's offsets on either side. Returns
/// `None` when the fitted curve has no interior minimum.
pub fn test_loss_line_search<F, T, S>(
    frame: &F,
    context: &TrainingContext,
    trainer: &T,
    train_rows: &RowMask,
    test_rows: &RowMask,
    hyperparameters: &Hyperparameters,
    apply: S,
    range: LineSearchRange,
    progress: &TrainingProgress,
    seed: u64,
) -> Result<Option<SearchInterval>, TrainError>
where
    F: DataFrame,
    T: TreeTrainer,
    S: Fn(&mut Hyperparameters, f64),
{
    let mut samples = Vec::with_capacity(MAX_LINE_SEARCH_ITERATIONS);
    for x in range.probes() {
        let mut probe = *hyperparameters;
        apply(&mut probe, x);
        // Same seed for every probe so only the multiplier differs.
        let trained = trainer.train_forest(
            frame,
            context,
            TrainRequest {
                train_rows,
                test_rows,
                hyperparameters: &probe,
                seed,
                progress,
            },
        )?;
        samples.push((x, trained.test_loss));
    }

    let Some([_, b, c]) = fit_quadratic(&samples) else {
        return Ok(None);
    };
    if !(c > 0.0) {
        return Ok(None);
    }
    let minimiser = -b / (2.0 * c);
    if !minimiser.is_finite() || minimiser < range.log_min || minimiser > range.log_max {
        return Ok(None);
    }
    Ok(Some(SearchInterval::new(
        minimiser + range.left_offset,
        minimiser,
        minimiser + range.right_offset,
    )))
}

/// Least-squares `y = a + b·x + c·x²`. `None` if the normal equations are singular.
pub fn fit_quadratic(samples: &[(f64, f64)]) -> Option<[f64; 3]> {
    if samples.len() < 3 {
        return None;
    }
    // Centre x for conditioning, then shift the coefficients back.
    let shift = samples.iter().map(|&(x, _)| x).sum::<f64>() / samples.len() as f64;
    let mut normal = [[0.0; 4]; 3];
    for &(x, y) in samples {
        let t = x - shift;
        let powers = [1.0, t, t * t];
        for i in 0..3 {
            for j in 0..3 {
                normal[i][j] += powers[i] * powers[j];
            }
            normal[i][3] += powers[i] * y;
        }
    }

    for col in 0..3 {
        let pivot = (col..3).max_by(|&a, &b| normal[a][col].abs().total_cmp(&normal[b][col].abs()))?;
        if normal[pivot][col].abs() < 1e-12 {
            return None;
        }
        normal.swap(col, pivot);
        for row in 0..3 {
            if row != col {
                let factor = normal[row][col] / normal[col][col];
                for k in col..4 {
                    normal[row][k] -= factor * normal[col][k];
                }
            }
        }
    }
    let a = normal[0][3] / normal[0][0];
    let b = normal[1][3] / normal[1][1];
    let c = normal[2][3] / normal[2][2];

    let coefficients = [a - b * shift + c * shift * shift, b - 2.0 * c * shift, c];
    coefficients.iter().all(|v| v.is_finite()).then_some(coefficients)
}
