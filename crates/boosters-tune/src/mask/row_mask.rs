//! Packed bit-vector row selection.

use std::ops::Range;

use serde::{Deserialize, Serialize};

pub(crate) const WORD_BITS: usize = u64::BITS as usize;

/// A bit per frame row; a set bit selects the row.
///
/// Bits past `len` in the last word are always clear, so word-wise
/// operations and [`count`](Self::count) never see stray rows.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RowMask {
    words: Vec<u64>,
    len: usize,
}

impl RowMask {
    /// A mask over `len` rows with nothing selected.
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(WORD_BITS)],
            len,
        }
    }

    /// A mask over `len` rows with every row selected.
    pub fn full(len: usize) -> Self {
        let mut mask = Self {
            words: vec![u64::MAX; len.div_ceil(WORD_BITS)],
            len,
        };
        mask.clear_tail();
        mask
    }

    /// A mask selecting `indices`. Indices `>= len` are ignored.
    pub fn from_indices(len: usize, indices: impl IntoIterator<Item = usize>) -> Self {
        let mut mask = Self::new(len);
        for index in indices {
            if index < len {
                mask.set(index, true);
            }
        }
        mask
    }

    /// Number of rows the mask spans.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn set(&mut self, index: usize, value: bool) {
        debug_assert!(index < self.len);
        let bit = 1u64 << (index % WORD_BITS);
        let word = &mut self.words[index / WORD_BITS];
        if value {
            *word |= bit;
        } else {
            *word &= !bit;
        }
    }

    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        index < self.len && self.words[index / WORD_BITS] & (1u64 << (index % WORD_BITS)) != 0
    }

    /// Number of selected rows.
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Selected row indices in increasing order.
    pub fn iter_ones(&self) -> Ones<'_> {
        self.iter_ones_in(0..self.len)
    }

    /// Selected row indices within `range`, in increasing order.
    pub fn iter_ones_in(&self, range: Range<usize>) -> Ones<'_> {
        let end = range.end.min(self.len);
        let start = range.start;
        if start >= end {
            return Ones {
                words: &[],
                word_index: 0,
                current: 0,
                end: 0,
            };
        }
        let word_index = start / WORD_BITS;
        Ones {
            words: &self.words,
            word_index,
            current: self.words[word_index] & (u64::MAX << (start % WORD_BITS)),
            end,
        }
    }

    /// Rows selected by both masks.
    pub fn and(&self, other: &RowMask) -> RowMask {
        self.zip_with(other, |a, b| a & b)
    }

    /// Rows selected by either mask.
    pub fn or(&self, other: &RowMask) -> RowMask {
        self.zip_with(other, |a, b| a | b)
    }

    /// Rows selected by `self` but not by `other`.
    pub fn and_not(&self, other: &RowMask) -> RowMask {
        self.zip_with(other, |a, b| a & !b)
    }

    /// Rows not selected by `self`.
    pub fn complement(&self) -> RowMask {
        let mut mask = Self {
            words: self.words.iter().map(|w| !w).collect(),
            len: self.len,
        };
        mask.clear_tail();
        mask
    }

    /// `true` when no row is selected by both masks.
    pub fn is_disjoint(&self, other: &RowMask) -> bool {
        self.words.iter().zip(&other.words).all(|(a, b)| a & b == 0)
    }

    /// Heap bytes held by the mask.
    pub fn memory_usage(&self) -> usize {
        self.words.capacity() * std::mem::size_of::<u64>()
    }

    /// OR `words` into the mask starting at word `first_word`.
    ///
    /// Words past the end of the mask are ignored.
    pub(crate) fn or_words_at(&mut self, first_word: usize, words: &[u64]) {
        let end = (first_word + words.len()).min(self.words.len());
        if first_word >= end {
            return;
        }
        for (target, &word) in self.words[first_word..end].iter_mut().zip(words) {
            *target |= word;
        }
        self.clear_tail();
    }

    fn zip_with(&self, other: &RowMask, op: impl Fn(u64, u64) -> u64) -> RowMask {
        debug_assert_eq!(self.len, other.len, "row masks span different row counts");
        let len = self.len.min(other.len);
        let mut mask = Self {
            words: self
                .words
                .iter()
                .zip(&other.words)
                .map(|(&a, &b)| op(a, b))
                .collect(),
            len,
        };
        mask.clear_tail();
        mask
    }

    fn clear_tail(&mut self) {
        let tail = self.len % WORD_BITS;
        if tail != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u64 << tail) - 1;
            }
        }
    }
}

/// Iterator over the selected rows of a [`RowMask`].
pub struct Ones<'a> {
    words: &'a [u64],
    word_index: usize,
    current: u64,
    end: usize,
}

impl Iterator for Ones<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        loop {
            if self.current != 0 {
                let bit = self.current.trailing_zeros() as usize;
                self.current &= self.current - 1;
                let index = self.word_index * WORD_BITS + bit;
                if index >= self.end {
                    self.current = 0;
                    self.words = &[];
                    return None;
                }
                return Some(index);
            }
            self.word_index += 1;
            if self.word_index >= self.words.len() || self.word_index * WORD_BITS >= self.end {
                self.words = &[];
                return None;
            }
            self.current = self.words[self.word_index];
        }
    }
}
