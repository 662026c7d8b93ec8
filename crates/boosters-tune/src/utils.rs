//! Common utilities used across the crate.
//!
//! This module provides the parallelism flag threaded through scans and fold
//! evaluation, thread pool setup, and the seeded sampling helpers shared by
//! feature bagging and fold assignment.

use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;

// =============================================================================
// Parallelism Configuration
// =============================================================================

/// Whether parallel execution is allowed.
///
/// This is a simple flag passed through the orchestration stages. When
/// `Parallel`, components may use `rayon` parallel iterators; when
/// `Sequential`, they must iterate on the calling thread.
///
/// The actual thread pool is set up once per entry point via
/// [`run_with_threads`]. Components don't manage thread pools.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parallelism {
    Sequential,
    Parallel,
}

impl Parallelism {
    /// Create from thread count semantics.
    ///
    /// - 0 = auto (parallel if rayon pool has multiple threads, sequential otherwise)
    /// - 1 = sequential
    /// - >1 = parallel
    #[inline]
    pub fn from_threads(n_threads: usize) -> Self {
        if n_threads == 1 || (n_threads == 0 && rayon::current_num_threads() == 1) {
            Parallelism::Sequential
        } else {
            Parallelism::Parallel
        }
    }

    /// Returns `true` if parallel execution is allowed.
    #[inline]
    pub fn is_parallel(self) -> bool {
        matches!(self, Parallelism::Parallel)
    }

    /// Map over `iter`, preserving input order in the output.
    #[inline]
    pub fn maybe_par_map<T, B, I, F>(self, iter: I, f: F) -> Vec<B>
    where
        T: Send,
        B: Send,
        I: IntoIterator<Item = T> + IntoParallelIterator<Item = T>,
        F: Fn(T) -> B + Sync + Send,
    {
        if self.is_parallel() {
            iter.into_par_iter().map(f).collect()
        } else {
            iter.into_iter().map(f).collect()
        }
    }
}

// =============================================================================
// Thread Pool Setup
// =============================================================================

/// Run a closure with the appropriate thread pool.
///
/// Thread count semantics:
/// - `0` = auto (use all available cores)
/// - `1` = sequential (no thread pool)
/// - `n > 1` = use exactly `n` threads
///
/// If the pool cannot be created the closure runs sequentially.
#[inline]
pub fn run_with_threads<T: Send>(n_threads: usize, f: impl FnOnce(Parallelism) -> T + Send) -> T {
    match Parallelism::from_threads(n_threads) {
        Parallelism::Sequential => f(Parallelism::Sequential),
        Parallelism::Parallel => {
            match rayon::ThreadPoolBuilder::new().num_threads(n_threads).build() {
                Ok(pool) => pool.install(|| f(Parallelism::Parallel)),
                Err(error) => {
                    tracing::warn!(%error, n_threads, "failed to create thread pool, running sequentially");
                    f(Parallelism::Sequential)
                }
            }
        }
    }
}

// =============================================================================
// Seeded Sampling
// =============================================================================

/// Golden-ratio increment used to derive independent stream seeds.
const SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// Second mixing constant for two-level seed derivation.
const SEED_STRIDE_INNER: u64 = 0x517C_C1B7_2722_0A95;

/// Derive the seed of stream `index` from a base seed.
///
/// Streams are addressed by position (round, fold, tree), never by wall clock,
/// so any computation can be replayed from its coordinates alone.
#[inline]
pub fn derive_seed(seed: u64, index: u64) -> u64 {
    seed.wrapping_add(index.wrapping_add(1).wrapping_mul(SEED_STRIDE))
}

/// Derive the seed of stream `(outer, inner)` from a base seed.
#[inline]
pub fn derive_seed2(seed: u64, outer: u64, inner: u64) -> u64 {
    derive_seed(seed, outer).wrapping_add(inner.wrapping_add(1).wrapping_mul(SEED_STRIDE_INNER))
}

/// Create the random number generator for a derived stream.
#[inline]
pub fn seeded_rng(seed: u64) -> Xoshiro256PlusPlus {
    Xoshiro256PlusPlus::seed_from_u64(seed)
}

/// Shuffle `items` in place with a partial Fisher-Yates pass over all items.
pub fn shuffle<T>(items: &mut [T], rng: &mut impl Rng) {
    let n = items.len();
    for i in 0..n.saturating_sub(1) {
        let j = rng.gen_range(i..n);
        items.swap(i, j);
    }
}

/// Sample `k` distinct indices from `0..weights.len()` with probability
/// proportional to `weights` (Efraimidis-Spirakis keys).
///
/// Zero weights are never selected. Returns sorted indices for cache-friendly
/// access; fewer than `k` are returned if fewer than `k` weights are positive.
pub fn weighted_sample_without_replacement(
    weights: &[f64],
    k: usize,
    rng: &mut impl Rng,
) -> Vec<usize> {
    let mut keyed: Vec<(f64, usize)> = weights
        .iter()
        .enumerate()
        .filter(|&(_, &w)| w > 0.0)
        .map(|(i, &w)| {
            let u: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
            (u.ln() / w, i)
        })
        .collect();

    // Largest keys win: ln(u) / w is the log of u^(1/w).
    keyed.sort_unstable_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
    keyed.truncate(k);

    let mut sampled: Vec<usize> = keyed.into_iter().map(|(_, i)| i).collect();
    sampled.sort_unstable();
    sampled
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parallelism_from_threads() {
        assert!(Parallelism::from_threads(0).is_parallel() || rayon::current_num_threads() == 1);
        assert!(!Parallelism::from_threads(1).is_parallel());
        assert!(Parallelism::from_threads(2).is_parallel());
    }

    #[test]
    fn test_run_with_threads_sequential() {
        let result = run_with_threads(1, |p| (p, 42));
        assert_eq!(result, (Parallelism::Sequential, 42));
    }

    #[test]
    fn test_run_with_threads_explicit() {
        let result = run_with_threads(2, |_| rayon::current_num_threads());
        assert_eq!(result, 2);
    }

    #[test]
    fn test_maybe_par_map_preserves_order() {
        let result: Vec<_> = Parallelism::Sequential.maybe_par_map(0..5usize, |i| i * 2);
        assert_eq!(result, vec![0, 2, 4, 6, 8]);

        let result: Vec<_> = Parallelism::Parallel.maybe_par_map(0..5usize, |i| i * 2);
        assert_eq!(result, vec![0, 2, 4, 6, 8]);
    }

    #[test]
    fn test_derived_seeds_differ() {
        assert_ne!(derive_seed(42, 0), derive_seed(42, 1));
        assert_ne!(derive_seed2(42, 0, 1), derive_seed2(42, 1, 0));
        assert_eq!(derive_seed2(7, 3, 4), derive_seed2(7, 3, 4));
    }

    #[test]
    fn test_shuffle_is_permutation() {
        let mut items: Vec<usize> = (0..100).collect();
        shuffle(&mut items, &mut seeded_rng(1));
        let mut sorted = items.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..100).collect::<Vec<_>>());
        assert_ne!(items, sorted);
    }

    #[test]
    fn test_weighted_sample_skips_zero_weights() {
        let weights = [0.0, 1.0, 0.0, 2.0, 3.0];
        let mut rng = seeded_rng(5);
        for _ in 0..20 {
            let sampled = weighted_sample_without_replacement(&weights, 2, &mut rng);
            assert_eq!(sampled.len(), 2);
            assert!(sampled.iter().all(|&i| weights[i] > 0.0));
            assert!(sampled.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_weighted_sample_truncates_to_positive() {
        let weights = [0.0, 1.0, 0.0];
        let sampled = weighted_sample_without_replacement(&weights, 3, &mut seeded_rng(0));
        assert_eq!(sampled, vec![1]);
    }
}
