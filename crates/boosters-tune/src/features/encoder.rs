//! Feature selection and one-hot encoding.
//!
//! One scan over the eligible rows gathers per-column moments, correlation
//! with the dependent variable, and category counts. Columns are then kept,
//! dropped, or replaced by one-hot indicators, and the indicator columns are
//! appended to the frame on the calling thread.

use std::collections::BTreeMap;

use crate::data::{ColumnKind, ColumnMeta, DataFrame};
use crate::error::DataError;
use crate::mask::{MissingFeatureMasks, RowMask};
use crate::utils::Parallelism;

/// Absolute correlation with the dependent variable at or above which a
/// column is considered a relabelling of it.
const COLLINEARITY_THRESHOLD: f64 = 1.0 - 1e-10;

// =============================================================================
// Encoding table
// =============================================================================

/// Where an encoded feature's values come from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeatureSource {
    /// A numeric input column used as is.
    Numeric { column: usize },
    /// A categorical input column used as is, without frequent categories.
    Categorical { column: usize },
    /// Indicator for `category` of the categorical column `source`.
    OneHot { source: usize, category: u32 },
}

impl FeatureSource {
    #[inline]
    pub fn is_one_hot(&self) -> bool {
        matches!(self, FeatureSource::OneHot { .. })
    }
}

/// One regressor the trainer may split on.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodedFeature {
    /// Frame column holding the feature's values.
    pub column: usize,
    pub name: String,
    pub source: FeatureSource,
    /// Pearson correlation with the dependent variable over eligible rows.
    pub correlation: f64,
    /// Variance over eligible rows with a value.
    pub variance: f64,
}

/// Why an input column was not selected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    AllMissing,
    Constant,
    CollinearWithTarget,
    /// Categorical with no frequent category and fewer than two categories.
    RareCategories,
    /// Categorical column replaced by its one-hot indicators.
    OneHotEncoded,
}

/// Result of feature selection.
///
/// Immutable once built; the frame has already received the indicator
/// columns it describes.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureEncoding {
    dependent_variable: usize,
    minimum_frequency: f64,
    n_input_columns: usize,
    features: Vec<EncodedFeature>,
    dropped: Vec<(usize, DropReason)>,
}

impl FeatureEncoding {
    #[inline]
    pub fn dependent_variable(&self) -> usize {
        self.dependent_variable
    }

    /// One-hot threshold the table was built with.
    #[inline]
    pub fn minimum_frequency(&self) -> f64 {
        self.minimum_frequency
    }

    /// Frame column count before encoding.
    #[inline]
    pub fn n_input_columns(&self) -> usize {
        self.n_input_columns
    }

    #[inline]
    pub fn features(&self) -> &[EncodedFeature] {
        &self.features
    }

    #[inline]
    pub fn n_features(&self) -> usize {
        self.features.len()
    }

    /// Frame columns of the selected features, in feature order.
    pub fn feature_columns(&self) -> Vec<usize> {
        self.features.iter().map(|f| f.column).collect()
    }

    pub fn dropped(&self) -> &[(usize, DropReason)] {
        &self.dropped
    }

    /// Number of columns appended to the frame.
    pub fn number_extra_columns(&self) -> usize {
        self.features.iter().filter(|f| f.source.is_one_hot()).count()
    }
}

// =============================================================================
// Column statistics
// =============================================================================

#[derive(Clone, Copy, Debug, Default)]
struct CategoryStats {
    count: usize,
    sum_y: f64,
}

#[derive(Clone, Debug, Default)]
struct ColumnStats {
    n_present: usize,
    sum_x: f64,
    sum_xx: f64,
    sum_xy: f64,
    sum_y: f64,
    sum_yy: f64,
    categories: BTreeMap<u32, CategoryStats>,
}

impl ColumnStats {
    fn observe(&mut self, x: f64, y: f64, kind: ColumnKind) {
        self.n_present += 1;
        self.sum_x += x;
        self.sum_xx += x * x;
        self.sum_xy += x * y;
        self.sum_y += y;
        self.sum_yy += y * y;
        if kind.is_categorical() && x >= 0.0 {
            let category = self.categories.entry(x as u32).or_default();
            category.count += 1;
            category.sum_y += y;
        }
    }

    fn merge(mut self, other: ColumnStats) -> ColumnStats {
        self.n_present += other.n_present;
        self.sum_x += other.sum_x;
        self.sum_xx += other.sum_xx;
        self.sum_xy += other.sum_xy;
        self.sum_y += other.sum_y;
        self.sum_yy += other.sum_yy;
        for (code, stats) in other.categories {
            let category = self.categories.entry(code).or_default();
            category.count += stats.count;
            category.sum_y += stats.sum_y;
        }
        self
    }

    fn variance(&self) -> f64 {
        let n = self.n_present as f64;
        let mean = self.sum_x / n;
        (self.sum_xx / n - mean * mean).max(0.0)
    }

    fn target_variance(&self) -> f64 {
        let n = self.n_present as f64;
        let mean = self.sum_y / n;
        (self.sum_yy / n - mean * mean).max(0.0)
    }

    fn is_constant(&self) -> bool {
        let mean = self.sum_x / self.n_present as f64;
        self.variance() <= f64::EPSILON * (1.0 + mean * mean)
    }

    fn correlation(&self) -> f64 {
        let n = self.n_present as f64;
        let covariance = self.sum_xy / n - (self.sum_x / n) * (self.sum_y / n);
        pearson(covariance, self.variance(), self.target_variance())
    }

    /// Variance and correlation of the indicator for `category`.
    fn indicator_moments(&self, category: &CategoryStats) -> (f64, f64) {
        let n = self.n_present as f64;
        let p = category.count as f64 / n;
        let variance = p * (1.0 - p);
        let covariance = category.sum_y / n - p * (self.sum_y / n);
        (variance, pearson(covariance, variance, self.target_variance()))
    }
}

fn pearson(covariance: f64, variance_x: f64, variance_y: f64) -> f64 {
    let denominator = (variance_x * variance_y).sqrt();
    if denominator > 0.0 {
        (covariance / denominator).clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

// =============================================================================
// Selection
// =============================================================================

/// Choose the regressors for `dependent_variable` and one-hot encode frequent
/// categories.
///
/// A category is frequent when its share of the eligible rows is at least
/// `minimum_frequency`. Frequent categories each get an indicator column
/// named `"{column}={category}"`, appended to `frame`, and the source column
/// is no longer a feature. Rare categories are dropped. A categorical column
/// without frequent categories stays as an identity feature when it has at
/// least two categories. Numeric columns are dropped when they are all
/// missing, constant, or perfectly correlated with the dependent variable.
///
/// Missing masks are registered for every appended column.
pub fn select_features_and_encode_categories<F: DataFrame>(
    frame: &mut F,
    dependent_variable: usize,
    eligible: &RowMask,
    missing: &mut MissingFeatureMasks,
    minimum_frequency: f64,
    parallelism: Parallelism,
) -> Result<FeatureEncoding, DataError> {
    let n_input_columns = frame.n_columns();
    let n_eligible = eligible.count();
    let kinds: Vec<ColumnKind> = (0..n_input_columns)
        .map(|column| frame.column_meta(column).kind)
        .collect();

    let stats = frame
        .read_rows(
            eligible,
            parallelism,
            || vec![ColumnStats::default(); n_input_columns],
            |stats, row| {
                let y = row.value(dependent_variable) as f64;
                for (column, column_stats) in stats.iter_mut().enumerate() {
                    if column == dependent_variable {
                        continue;
                    }
                    let x = row.value(column);
                    if !x.is_nan() {
                        column_stats.observe(x as f64, y, kinds[column]);
                    }
                }
            },
        )
        .into_iter()
        .reduce(|acc, chunk| acc.into_iter().zip(chunk).map(|(a, b)| a.merge(b)).collect())
        .unwrap_or_else(|| vec![ColumnStats::default(); n_input_columns]);

    let mut features = Vec::new();
    let mut dropped = Vec::new();
    let mut indicators = Vec::new();

    for (column, column_stats) in stats.iter().enumerate() {
        if column == dependent_variable {
            continue;
        }
        if column_stats.n_present == 0 {
            dropped.push((column, DropReason::AllMissing));
            continue;
        }
        let name = frame.column_meta(column).name.clone();

        match kinds[column] {
            ColumnKind::Numeric => {
                let correlation = column_stats.correlation();
                if column_stats.is_constant() {
                    dropped.push((column, DropReason::Constant));
                } else if correlation.abs() >= COLLINEARITY_THRESHOLD {
                    dropped.push((column, DropReason::CollinearWithTarget));
                } else {
                    features.push(EncodedFeature {
                        column,
                        name,
                        source: FeatureSource::Numeric { column },
                        correlation,
                        variance: column_stats.variance(),
                    });
                }
            }
            ColumnKind::Categorical => {
                let frequent: Vec<(u32, CategoryStats)> = column_stats
                    .categories
                    .iter()
                    .filter(|(_, c)| c.count as f64 / n_eligible as f64 >= minimum_frequency)
                    .map(|(&code, &c)| (code, c))
                    .collect();

                if !frequent.is_empty() {
                    dropped.push((column, DropReason::OneHotEncoded));
                    for (category, category_stats) in frequent {
                        let (variance, correlation) = column_stats.indicator_moments(&category_stats);
                        indicators.push((column, category, format!("{name}={category}"), variance, correlation));
                    }
                } else if column_stats.categories.len() >= 2 {
                    features.push(EncodedFeature {
                        column,
                        name,
                        source: FeatureSource::Categorical { column },
                        correlation: 0.0,
                        variance: column_stats.variance(),
                    });
                } else {
                    dropped.push((column, DropReason::RareCategories));
                }
            }
        }
    }

    for (source, category, name, variance, correlation) in indicators {
        let values = one_hot_values(frame, source, category);
        let column = frame.push_column(ColumnMeta::numeric(name.clone()), values)?;
        missing.push(missing.mask(source).clone());
        features.push(EncodedFeature {
            column,
            name,
            source: FeatureSource::OneHot { source, category },
            correlation,
            variance,
        });
    }

    tracing::debug!(
        n_input_columns,
        n_features = features.len(),
        n_dropped = dropped.len(),
        n_appended = frame.n_columns() - n_input_columns,
        "selected features"
    );

    Ok(FeatureEncoding {
        dependent_variable,
        minimum_frequency,
        n_input_columns,
        features,
        dropped,
    })
}

fn one_hot_values<F: DataFrame>(frame: &F, source: usize, category: u32) -> Vec<f32> {
    (0..frame.n_rows())
        .map(|row| {
            let value = frame.value(row, source);
            if value.is_nan() {
                f32::NAN
            } else if value >= 0.0 && value as u32 == category {
                1.0
            } else {
                0.0
            }
        })
        .collect()
}
