//! Row masks: missing-value masks per column and cross-validation folds.
//!
//! Masks are built once and then shared read-only across worker threads.

mod folds;
mod missing;
mod row_mask;

pub use folds::{
    cross_validation_row_masks, feasible_number_folds, CrossValidationMasks,
    MINIMUM_ROWS_PER_TEST_FOLD,
};
pub use missing::MissingFeatureMasks;
pub use row_mask::{Ones, RowMask};
