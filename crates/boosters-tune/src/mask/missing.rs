//! Per-column missing-value masks.

use crate::data::DataFrame;
use crate::utils::Parallelism;

use super::row_mask::WORD_BITS;
use super::RowMask;

/// One mask per frame column; a set bit marks a missing value.
///
/// Built by a single scan and never modified afterwards, except to register
/// masks for columns appended by encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MissingFeatureMasks {
    masks: Vec<RowMask>,
}

impl MissingFeatureMasks {
    /// Scan `frame` once and record every missing cell.
    ///
    /// Each scan chunk fills word-aligned bitsets covering only its own rows;
    /// the chunks are then ORed into the column masks in chunk order.
    pub fn compute<F: DataFrame>(frame: &F, parallelism: Parallelism) -> Self {
        let n_rows = frame.n_rows();
        let n_columns = frame.n_columns();
        let chunks = frame.read_rows(
            &RowMask::full(n_rows),
            parallelism,
            || ChunkBits::new(n_columns),
            |chunk: &mut ChunkBits, row| {
                let index = row.index();
                let first_word = *chunk.first_word.get_or_insert(index / WORD_BITS);
                let offset = index / WORD_BITS - first_word;
                let bit = 1u64 << (index % WORD_BITS);
                for (column, words) in chunk.columns.iter_mut().enumerate() {
                    if row.is_missing(column) {
                        if words.len() <= offset {
                            words.resize(offset + 1, 0);
                        }
                        words[offset] |= bit;
                    }
                }
            },
        );

        let mut masks = vec![RowMask::new(n_rows); n_columns];
        for chunk in chunks {
            let Some(first_word) = chunk.first_word else {
                continue;
            };
            for (mask, words) in masks.iter_mut().zip(&chunk.columns) {
                mask.or_words_at(first_word, words);
            }
        }
        Self { masks }
    }

    /// Number of columns covered.
    #[inline]
    pub fn n_columns(&self) -> usize {
        self.masks.len()
    }

    /// Missing-value mask of `column`.
    #[inline]
    pub fn mask(&self, column: usize) -> &RowMask {
        &self.masks[column]
    }

    /// Register the mask of a newly appended column.
    pub fn push(&mut self, mask: RowMask) {
        self.masks.push(mask);
    }

    /// Rows whose value in `dependent_variable` is present.
    pub fn eligible_rows(&self, dependent_variable: usize) -> RowMask {
        self.masks[dependent_variable].complement()
    }

    /// Heap bytes held by all masks.
    pub fn memory_usage(&self) -> usize {
        self.masks.iter().map(RowMask::memory_usage).sum()
    }
}

/// Missing bits of one scan chunk, one bitset per column.
///
/// Word 0 of every bitset is frame word `first_word`. Bitsets only grow as
/// far as their last missing cell.
struct ChunkBits {
    first_word: Option<usize>,
    columns: Vec<Vec<u64>>,
}

impl ChunkBits {
    fn new(n_columns: usize) -> Self {
        Self {
            first_word: None,
            columns: vec![Vec::new(); n_columns],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ColumnFrame, ColumnMeta, ROW_CHUNK_SIZE};

    #[test]
    fn marks_nan_cells() {
        let frame = ColumnFrame::new(5)
            .with_column(ColumnMeta::numeric("x"), vec![1.0, f32::NAN, 3.0, f32::NAN, 5.0])
            .unwrap()
            .with_column(ColumnMeta::numeric("y"), vec![f32::NAN, 2.0, 3.0, 4.0, 5.0])
            .unwrap();

        for parallelism in [Parallelism::Sequential, Parallelism::Parallel] {
            let masks = MissingFeatureMasks::compute(&frame, parallelism);
            assert_eq!(masks.n_columns(), 2);
            assert_eq!(masks.mask(0).iter_ones().collect::<Vec<_>>(), vec![1, 3]);
            assert_eq!(masks.mask(1).iter_ones().collect::<Vec<_>>(), vec![0]);
            assert_eq!(
                masks.eligible_rows(1).iter_ones().collect::<Vec<_>>(),
                vec![1, 2, 3, 4]
            );
        }
    }

    #[test]
    fn masks_span_several_scan_chunks() {
        let n = 2 * ROW_CHUNK_SIZE + 100;
        let sparse = [
            0,
            63,
            ROW_CHUNK_SIZE - 1,
            ROW_CHUNK_SIZE,
            ROW_CHUNK_SIZE + 64,
            2 * ROW_CHUNK_SIZE + 5,
            n - 1,
        ];
        let mut x = vec![1.0f32; n];
        for &row in &sparse {
            x[row] = f32::NAN;
        }
        let dense: Vec<f32> = (0..n)
            .map(|row| if row % 3 == 0 { f32::NAN } else { row as f32 })
            .collect();
        let frame = ColumnFrame::new(n)
            .with_column(ColumnMeta::numeric("x"), x)
            .unwrap()
            .with_column(ColumnMeta::numeric("dense"), dense)
            .unwrap()
            .with_column(ColumnMeta::numeric("full"), vec![2.0; n])
            .unwrap();

        let expected_dense = RowMask::from_indices(n, (0..n).step_by(3));
        for parallelism in [Parallelism::Sequential, Parallelism::Parallel] {
            let masks = MissingFeatureMasks::compute(&frame, parallelism);
            assert_eq!(masks.mask(0), &RowMask::from_indices(n, sparse));
            assert_eq!(masks.mask(1), &expected_dense);
            assert_eq!(masks.mask(2).count(), 0);
            assert_eq!(masks.mask(0).len(), n);
        }
    }
}
