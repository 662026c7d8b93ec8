//! In-memory feature-major frame.

use super::{ColumnMeta, DataFrame};
use crate::error::DataError;

/// Feature-major in-memory frame: one contiguous `Vec<f32>` per column.
///
/// # Example
///
/// ```
/// use boosters_tune::data::{ColumnFrame, ColumnMeta, DataFrame};
///
/// let frame = ColumnFrame::new(3)
///     .with_column(ColumnMeta::numeric("age"), vec![31.0, f32::NAN, 58.0])
///     .unwrap()
///     .with_column(ColumnMeta::categorical("colour"), vec![0.0, 1.0, 0.0])
///     .unwrap();
/// assert_eq!(frame.n_columns(), 2);
/// assert!(frame.value(1, 0).is_nan());
/// ```
#[derive(Clone, Debug, Default)]
pub struct ColumnFrame {
    n_rows: usize,
    meta: Vec<ColumnMeta>,
    columns: Vec<Vec<f32>>,
}

impl ColumnFrame {
    /// Create a frame with `n_rows` rows and no columns.
    pub fn new(n_rows: usize) -> Self {
        Self {
            n_rows,
            meta: Vec::new(),
            columns: Vec::new(),
        }
    }

    /// Build a frame from `(meta, values)` pairs.
    ///
    /// The row count is taken from the first column; an empty iterator gives
    /// an empty frame.
    pub fn from_columns(
        columns: impl IntoIterator<Item = (ColumnMeta, Vec<f32>)>,
    ) -> Result<Self, DataError> {
        let mut columns = columns.into_iter().peekable();
        let n_rows = columns.peek().map_or(0, |(_, values)| values.len());
        let mut frame = Self::new(n_rows);
        for (meta, values) in columns {
            frame.push_column(meta, values)?;
        }
        Ok(frame)
    }

    /// Append a column, consuming and returning the frame.
    pub fn with_column(mut self, meta: ColumnMeta, values: Vec<f32>) -> Result<Self, DataError> {
        self.push_column(meta, values)?;
        Ok(self)
    }

    /// Values of `column`.
    #[inline]
    pub fn column(&self, column: usize) -> &[f32] {
        &self.columns[column]
    }

    /// Index of the first column named `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.meta.iter().position(|meta| meta.name == name)
    }

    /// Bytes held by column storage.
    pub fn memory_usage(&self) -> usize {
        self.columns
            .iter()
            .map(|c| c.capacity() * std::mem::size_of::<f32>())
            .sum()
    }
}

impl DataFrame for ColumnFrame {
    #[inline]
    fn n_rows(&self) -> usize {
        self.n_rows
    }

    #[inline]
    fn n_columns(&self) -> usize {
        self.columns.len()
    }

    #[inline]
    fn column_meta(&self, column: usize) -> &ColumnMeta {
        &self.meta[column]
    }

    #[inline]
    fn value(&self, row: usize, column: usize) -> f32 {
        self.columns[column][row]
    }

    fn push_column(&mut self, meta: ColumnMeta, values: Vec<f32>) -> Result<usize, DataError> {
        if values.len() != self.n_rows {
            return Err(DataError::ColumnLengthMismatch {
                expected: self.n_rows,
                got: values.len(),
            });
        }
        self.meta.push(meta);
        self.columns.push(values);
        Ok(self.columns.len() - 1)
    }
}
