//! K-fold train/test masks.

use crate::error::DataError;
use crate::utils::{derive_seed, seeded_rng, shuffle};

use super::RowMask;

/// Smallest number of rows any test fold may hold.
pub const MINIMUM_ROWS_PER_TEST_FOLD: usize = 10;

/// Stream index used to derive the fold-assignment seed.
const FOLD_ASSIGNMENT_STREAM: u64 = 0xF01D;

/// Train/test mask pairs, one per fold.
///
/// Within a fold the masks are disjoint and together cover every eligible
/// row; across folds each eligible row is in exactly one test mask.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrossValidationMasks {
    train: Vec<RowMask>,
    test: Vec<RowMask>,
}

impl CrossValidationMasks {
    #[inline]
    pub fn n_folds(&self) -> usize {
        self.test.len()
    }

    #[inline]
    pub fn train(&self, fold: usize) -> &RowMask {
        &self.train[fold]
    }

    #[inline]
    pub fn test(&self, fold: usize) -> &RowMask {
        &self.test[fold]
    }

    /// `(train, test)` pairs in fold order.
    pub fn iter(&self) -> impl Iterator<Item = (&RowMask, &RowMask)> {
        self.train.iter().zip(&self.test)
    }

    /// Heap bytes held by all masks.
    pub fn memory_usage(&self) -> usize {
        self.train
            .iter()
            .chain(&self.test)
            .map(RowMask::memory_usage)
            .sum()
    }
}

/// Largest fold count in `[2, requested_folds]` whose smallest train mask
/// holds `rows_per_feature * n_features` rows and whose smallest test mask
/// holds [`MINIMUM_ROWS_PER_TEST_FOLD`] rows.
pub fn feasible_number_folds(
    n_eligible: usize,
    requested_folds: usize,
    rows_per_feature: usize,
    n_features: usize,
) -> Option<usize> {
    let required_train = rows_per_feature.saturating_mul(n_features);
    (2..=requested_folds).rev().find(|&k| {
        let smallest_test = n_eligible / k;
        let smallest_train = n_eligible - n_eligible.div_ceil(k);
        smallest_train >= required_train && smallest_test >= MINIMUM_ROWS_PER_TEST_FOLD
    })
}

/// Partition the rows of `eligible` into k folds.
///
/// Rows are shuffled with a generator derived from `seed` and dealt round
/// robin, so fold sizes differ by at most one and the assignment depends only
/// on `seed` and the eligible set. When `requested_folds` is infeasible the
/// count is reduced one at a time towards 2.
///
/// # Errors
///
/// [`DataError::InsufficientRows`] when no fold count in `[2, requested_folds]`
/// is feasible.
pub fn cross_validation_row_masks(
    eligible: &RowMask,
    requested_folds: usize,
    rows_per_feature: usize,
    n_features: usize,
    seed: u64,
) -> Result<CrossValidationMasks, DataError> {
    let n_eligible = eligible.count();
    let n_folds = feasible_number_folds(n_eligible, requested_folds, rows_per_feature, n_features)
        .ok_or(DataError::InsufficientRows {
            eligible_rows: n_eligible,
            required_train_rows: rows_per_feature.saturating_mul(n_features),
            number_folds: requested_folds,
        })?;

    let mut rows: Vec<usize> = eligible.iter_ones().collect();
    shuffle(&mut rows, &mut seeded_rng(derive_seed(seed, FOLD_ASSIGNMENT_STREAM)));

    let mut test = vec![RowMask::new(eligible.len()); n_folds];
    for (position, row) in rows.into_iter().enumerate() {
        test[position % n_folds].set(row, true);
    }
    let train = test.iter().map(|fold| eligible.and_not(fold)).collect();

    Ok(CrossValidationMasks { train, test })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(10_000, 5, 50, 2, Some(5))]
    #[case(100, 5, 50, 2, None)]
    #[case(150, 5, 50, 2, Some(5))]
    #[case(25, 5, 1, 1, Some(2))]
    #[case(40, 10, 1, 1, Some(4))]
    #[case(1_000, 1, 1, 1, None)]
    fn fold_reduction(
        #[case] n_eligible: usize,
        #[case] requested: usize,
        #[case] rows_per_feature: usize,
        #[case] n_features: usize,
        #[case] expected: Option<usize>,
    ) {
        assert_eq!(
            feasible_number_folds(n_eligible, requested, rows_per_feature, n_features),
            expected
        );
    }

    #[test]
    fn infeasible_is_data_error() {
        let eligible = RowMask::full(30);
        let err = cross_validation_row_masks(&eligible, 4, 50, 2, 0).unwrap_err();
        assert!(matches!(err, DataError::InsufficientRows { eligible_rows: 30, .. }));
    }

    #[test]
    fn assignment_is_reproducible() {
        let eligible = RowMask::full(500);
        let a = cross_validation_row_masks(&eligible, 4, 10, 3, 7).unwrap();
        let b = cross_validation_row_masks(&eligible, 4, 10, 3, 7).unwrap();
        let c = cross_validation_row_masks(&eligible, 4, 10, 3, 8).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    proptest! {
        #[test]
        fn folds_partition_eligible_rows(
            n_rows in 40usize..600,
            holes in prop::collection::vec(0usize..600, 0..40),
            requested in 2usize..8,
            seed in any::<u64>(),
        ) {
            let eligible = RowMask::from_indices(n_rows, 0..n_rows)
                .and_not(&RowMask::from_indices(n_rows, holes));
            let Ok(folds) = cross_validation_row_masks(&eligible, requested, 1, 1, seed) else {
                return Ok(());
            };
            prop_assert!(folds.n_folds() >= 2 && folds.n_folds() <= requested);

            let mut covered = RowMask::new(n_rows);
            for (train, test) in folds.iter() {
                prop_assert!(train.is_disjoint(test));
                prop_assert_eq!(train.or(test), eligible.clone());
                prop_assert!(covered.is_disjoint(test));
                covered = covered.or(test);
            }
            prop_assert_eq!(covered, eligible);
        }
    }
}
