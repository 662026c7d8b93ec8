//! Semantic type of each encoded feature.

use crate::data::DataFrame;
use crate::mask::RowMask;
use crate::utils::Parallelism;

use super::{FeatureEncoding, FeatureSource};

/// Distinct values are counted up to this cap.
const DISTINCT_CAP: usize = 3;

/// How split search should treat a feature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeatureKind {
    Continuous,
    Categorical,
    /// Values are 0 or 1.
    OneHotIndicator,
}

/// Value range and semantic type of an encoded feature.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FeatureDataType {
    pub kind: FeatureKind,
    /// Every present value is integral.
    pub is_integer: bool,
    pub min: f32,
    pub max: f32,
    /// Distinct present values, saturating at a small cap.
    pub n_distinct: usize,
}

#[derive(Clone, Debug)]
struct RangeStats {
    min: f32,
    max: f32,
    is_integer: bool,
    distinct: Vec<f32>,
}

impl Default for RangeStats {
    fn default() -> Self {
        Self {
            min: f32::INFINITY,
            max: f32::NEG_INFINITY,
            is_integer: true,
            distinct: Vec::new(),
        }
    }
}

impl RangeStats {
    fn observe(&mut self, value: f32) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.is_integer &= value.fract() == 0.0;
        if self.distinct.len() < DISTINCT_CAP && !self.distinct.contains(&value) {
            self.distinct.push(value);
        }
    }

    fn merge(mut self, other: RangeStats) -> RangeStats {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.is_integer &= other.is_integer;
        for value in other.distinct {
            if self.distinct.len() < DISTINCT_CAP && !self.distinct.contains(&value) {
                self.distinct.push(value);
            }
        }
        self
    }
}

/// Classify every encoded feature from its post-encoding values.
///
/// Must run after [`select_features_and_encode_categories`](super::select_features_and_encode_categories)
/// since it reads the appended indicator columns. A numeric column whose
/// eligible values are all 0 or 1 is treated as an indicator.
pub fn determine_feature_data_types<F: DataFrame>(
    frame: &F,
    encoding: &FeatureEncoding,
    eligible: &RowMask,
    parallelism: Parallelism,
) -> Vec<FeatureDataType> {
    let columns = encoding.feature_columns();
    let ranges = frame
        .read_rows(
            eligible,
            parallelism,
            || vec![RangeStats::default(); columns.len()],
            |ranges, row| {
                for (range, &column) in ranges.iter_mut().zip(&columns) {
                    let value = row.value(column);
                    if !value.is_nan() {
                        range.observe(value);
                    }
                }
            },
        )
        .into_iter()
        .reduce(|acc, chunk| acc.into_iter().zip(chunk).map(|(a, b)| a.merge(b)).collect())
        .unwrap_or_else(|| vec![RangeStats::default(); columns.len()]);

    encoding
        .features()
        .iter()
        .zip(ranges)
        .map(|(feature, range)| {
            let binary = range.is_integer && range.min >= 0.0 && range.max <= 1.0;
            let kind = match feature.source {
                FeatureSource::OneHot { .. } => FeatureKind::OneHotIndicator,
                FeatureSource::Categorical { .. } => FeatureKind::Categorical,
                FeatureSource::Numeric { .. } if binary && range.distinct.len() <= 2 => {
                    FeatureKind::OneHotIndicator
                }
                FeatureSource::Numeric { .. } => FeatureKind::Continuous,
            };
            FeatureDataType {
                kind,
                is_integer: range.is_integer,
                min: range.min,
                max: range.max,
                n_distinct: range.distinct.len(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ColumnFrame, ColumnMeta};
    use crate::features::select_features_and_encode_categories;
    use crate::mask::MissingFeatureMasks;

    #[test]
    fn classifies_encoded_columns() {
        let n = 60;
        let mut frame = ColumnFrame::from_columns([
            (ColumnMeta::numeric("target"), (0..n).map(|i| (i % 5) as f32).collect()),
            (ColumnMeta::numeric("height"), (0..n).map(|i| i as f32 * 0.5).collect()),
            (ColumnMeta::numeric("flag"), (0..n).map(|i| (i % 2) as f32).collect()),
            (ColumnMeta::categorical("grade"), (0..n).map(|i| (i % 3) as f32).collect()),
        ])
        .unwrap();

        let mut missing = MissingFeatureMasks::compute(&frame, Parallelism::Sequential);
        let eligible = missing.eligible_rows(0);
        let encoding = select_features_and_encode_categories(
            &mut frame,
            0,
            &eligible,
            &mut missing,
            0.2,
            Parallelism::Sequential,
        )
        .unwrap();
        let types = determine_feature_data_types(&frame, &encoding, &eligible, Parallelism::Parallel);

        let kinds: Vec<FeatureKind> = types.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                FeatureKind::Continuous,
                FeatureKind::OneHotIndicator,
                FeatureKind::OneHotIndicator,
                FeatureKind::OneHotIndicator,
                FeatureKind::OneHotIndicator,
            ]
        );
        assert!(!types[0].is_integer);
        assert_eq!(types[0].max, 29.5);
        assert_eq!(types[0].n_distinct, DISTINCT_CAP);
        assert_eq!(types[1].n_distinct, 2);
    }
}
