//! Memory estimation and reporting.

use std::mem::size_of;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::factory::FactoryConfig;
use crate::features::FeatureDataType;
use crate::training::{NodeId, TrainingObserver, NODE_BYTES};
use crate::tuning::{
    initial_eta, initial_maximum_number_trees, number_free_hyperparameters,
    number_hyperparameter_tuning_rounds,
};

/// Upper bound on nodes per tree as a multiple of `sqrt(rows)`.
const NODES_PER_SQRT_ROW: f64 = 10.0;

/// Allowance per feature for names and bookkeeping.
const FEATURE_NAME_BYTES: usize = 64;

#[inline]
fn mask_bytes(n_rows: usize) -> usize {
    n_rows.div_ceil(64) * size_of::<u64>()
}

/// Peak bytes a build and training run may hold, by component.
///
/// Every component is non-decreasing in both the row and the column count.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryEstimate {
    /// One-hot columns appended to the frame.
    pub extra_columns: usize,
    pub missing_masks: usize,
    pub fold_masks: usize,
    /// Encoding, type and sampling tables.
    pub feature_tables: usize,
    /// Per-fold gradients, predictions and split buffers.
    pub training_buffers: usize,
    /// One forest per fold plus the final one.
    pub forests: usize,
    /// Surrogate kernel matrix and observations.
    pub optimiser: usize,
}

impl MemoryEstimate {
    pub fn total(&self) -> usize {
        self.extra_columns
            + self.missing_masks
            + self.fold_masks
            + self.feature_tables
            + self.training_buffers
            + self.forests
            + self.optimiser
    }
}

/// Estimate memory for a frame of `n_rows × n_columns`, the dependent
/// variable included, given up to `extra_columns` one-hot columns.
pub fn estimate_memory_usage(
    config: &FactoryConfig,
    n_rows: usize,
    n_columns: usize,
    extra_columns: usize,
) -> MemoryEstimate {
    let n_features = n_columns.saturating_sub(1) + extra_columns;
    let folds = config.number_folds.max(2);

    let maximum_trees = config
        .maximum_number_trees
        .or_estimate(|| initial_maximum_number_trees(initial_eta(n_features)));
    let nodes_per_tree = ((n_rows as f64).sqrt() * NODES_PER_SQRT_ROW).ceil() as usize;
    let nodes_per_tree = nodes_per_tree.min(2 * n_rows + 1);

    // Gradient, curvature, prediction, row index, leaf id, partition scratch
    // and one (value, gradient, curvature) triple per row for split search.
    let per_row = 3 * size_of::<f64>()
        + 2 * size_of::<usize>()
        + size_of::<NodeId>()
        + size_of::<f32>()
        + 2 * size_of::<f64>();
    let parallel_folds = folds + 1;

    let rounds = number_hyperparameter_tuning_rounds(
        config.maximum_optimisation_rounds_per_hyperparameter,
        number_free_hyperparameters(config),
    );
    let dimensions = number_free_hyperparameters(config);

    MemoryEstimate {
        extra_columns: extra_columns * n_rows * size_of::<f32>(),
        missing_masks: (n_columns + extra_columns) * mask_bytes(n_rows),
        fold_masks: (2 * folds + 1) * mask_bytes(n_rows),
        feature_tables: n_features
            * (size_of::<FeatureDataType>() + size_of::<f64>() + size_of::<usize>() + FEATURE_NAME_BYTES),
        training_buffers: parallel_folds * n_rows * per_row,
        forests: parallel_folds * maximum_trees * nodes_per_tree * NODE_BYTES,
        optimiser: rounds * rounds * size_of::<f64>() * 2 + rounds * (dimensions + 1) * size_of::<f64>(),
    }
}

/// Reports memory deltas to an observer and releases them on drop.
pub struct MemoryMonitor {
    observer: Arc<dyn TrainingObserver>,
    reported: AtomicI64,
}

impl MemoryMonitor {
    pub fn new(observer: Arc<dyn TrainingObserver>) -> Self {
        Self {
            observer,
            reported: AtomicI64::new(0),
        }
    }

    /// Report `bytes` newly held.
    pub fn add(&self, bytes: usize) {
        let delta = i64::try_from(bytes).unwrap_or(i64::MAX);
        if delta != 0 {
            self.reported.fetch_add(delta, Ordering::Relaxed);
            self.observer.record_memory_usage(delta);
        }
    }

    /// Report `bytes` no longer held.
    pub fn release(&self, bytes: usize) {
        let delta = i64::try_from(bytes).unwrap_or(i64::MAX);
        if delta != 0 {
            self.reported.fetch_sub(delta, Ordering::Relaxed);
            self.observer.record_memory_usage(-delta);
        }
    }

    /// Net bytes currently reported.
    pub fn reported(&self) -> i64 {
        self.reported.load(Ordering::Relaxed)
    }
}

impl Drop for MemoryMonitor {
    fn drop(&mut self) {
        let held = *self.reported.get_mut();
        if held != 0 {
            self.observer.record_memory_usage(-held);
        }
    }
}

impl std::fmt::Debug for MemoryMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryMonitor")
            .field("reported", &self.reported())
            .finish()
    }
}
