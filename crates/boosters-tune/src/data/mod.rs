//! Data frame abstraction consumed by the orchestrator.
//!
//! The orchestrator never assumes a physical layout. It needs row and column
//! counts, cell access, an in-place column append, and a masked scan that
//! visits rows in parallel chunks. [`ColumnFrame`] is the in-memory
//! implementation used by tests and small workloads.
//!
//! # Ordering barrier
//!
//! [`DataFrame::push_column`] takes `&mut self` while every scan takes `&self`,
//! so a column append can never overlap a scan.

mod column_frame;

pub use column_frame::ColumnFrame;

use crate::error::DataError;
use crate::mask::RowMask;
use crate::utils::Parallelism;

/// Number of rows visited by one scan task.
pub const ROW_CHUNK_SIZE: usize = 4096;

// =============================================================================
// Column schema
// =============================================================================

/// How the values of a column are interpreted.
///
/// Values are always stored as `f32`. Categorical columns hold non-negative
/// integral category codes. Missing values are `f32::NAN` for both kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ColumnKind {
    #[default]
    Numeric,
    Categorical,
}

impl ColumnKind {
    #[inline]
    pub fn is_categorical(self) -> bool {
        matches!(self, ColumnKind::Categorical)
    }
}

/// Metadata for a single frame column.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ColumnMeta {
    pub name: String,
    pub kind: ColumnKind,
}

impl ColumnMeta {
    pub fn numeric(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Numeric,
        }
    }

    pub fn categorical(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Categorical,
        }
    }
}

// =============================================================================
// DataFrame
// =============================================================================

/// A column-oriented table the orchestrator can scan and extend.
pub trait DataFrame: Send + Sync {
    /// Number of rows.
    fn n_rows(&self) -> usize;

    /// Number of columns, including any appended by encoding.
    fn n_columns(&self) -> usize;

    /// Schema of `column`.
    fn column_meta(&self, column: usize) -> &ColumnMeta;

    /// Value at (`row`, `column`). `NaN` means missing.
    fn value(&self, row: usize, column: usize) -> f32;

    /// Append a column in place, returning its index.
    ///
    /// # Errors
    ///
    /// Fails when `values.len()` differs from the row count.
    fn push_column(&mut self, meta: ColumnMeta, values: Vec<f32>) -> Result<usize, DataError>;

    /// Visit every row selected by `mask`.
    ///
    /// Rows are split into chunks of [`ROW_CHUNK_SIZE`]. Each chunk gets a
    /// fresh state from `init` and the per-chunk states are returned in chunk
    /// order, so reducing them left to right gives the same answer for any
    /// thread count.
    fn read_rows<S, I, V>(&self, mask: &RowMask, parallelism: Parallelism, init: I, visit: V) -> Vec<S>
    where
        Self: Sized,
        S: Send,
        I: Fn() -> S + Sync + Send,
        V: Fn(&mut S, RowRef<'_, Self>) + Sync + Send,
    {
        let n_rows = self.n_rows().min(mask.len());
        let n_chunks = n_rows.div_ceil(ROW_CHUNK_SIZE);
        parallelism.maybe_par_map(0..n_chunks, |chunk| {
            let start = chunk * ROW_CHUNK_SIZE;
            let end = (start + ROW_CHUNK_SIZE).min(n_rows);
            let mut state = init();
            for index in mask.iter_ones_in(start..end) {
                visit(&mut state, RowRef { frame: self, index });
            }
            state
        })
    }
}

/// A row handed to a scan visitor.
pub struct RowRef<'a, F: ?Sized> {
    frame: &'a F,
    index: usize,
}

impl<F: ?Sized> Clone for RowRef<'_, F> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<F: ?Sized> Copy for RowRef<'_, F> {}

impl<'a, F: DataFrame + ?Sized> RowRef<'a, F> {
    /// Row index within the frame.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn value(&self, column: usize) -> f32 {
        self.frame.value(self.index, column)
    }

    #[inline]
    pub fn is_missing(&self, column: usize) -> bool {
        self.value(column).is_nan()
    }
}
