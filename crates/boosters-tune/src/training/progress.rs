//! Training progress accounting.

use std::sync::{Arc, Mutex, PoisonError};

use super::TrainingObserver;

#[derive(Debug, Default)]
struct ProgressState {
    completed: u64,
    last_reported: Option<f64>,
}

/// Counts units of work (one unit = one trained tree) against a fixed total
/// and forwards the completed fraction to an observer.
///
/// Shared by reference between fold workers. Reports are made under a lock
/// so the observer sees a non-decreasing sequence in `[0, 1]`.
pub struct TrainingProgress {
    total: u64,
    state: Mutex<ProgressState>,
    observer: Arc<dyn TrainingObserver>,
}

impl TrainingProgress {
    /// Start a fresh count towards `total` units and report 0.
    pub fn initialize(total: u64, observer: Arc<dyn TrainingObserver>) -> Self {
        Self::resume(0, total, observer)
    }

    /// Resume a count with `completed` units already done and report the
    /// restored fraction.
    pub fn resume(completed: u64, total: u64, observer: Arc<dyn TrainingObserver>) -> Self {
        let total = total.max(completed).max(1);
        let progress = Self {
            total,
            state: Mutex::new(ProgressState {
                completed,
                last_reported: None,
            }),
            observer,
        };
        progress.add(0);
        progress
    }

    /// A counter that reports nowhere.
    pub fn detached(total: u64) -> Self {
        Self::initialize(total, Arc::new(super::NoopObserver))
    }

    /// Record `units` more units of completed work.
    pub fn add(&self, units: u64) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.completed = state.completed.saturating_add(units).min(self.total);
        let fraction = (state.completed as f64 / self.total as f64).clamp(0.0, 1.0);
        if state.last_reported.map_or(true, |last| fraction > last) {
            state.last_reported = Some(fraction);
            self.observer.record_progress(fraction);
        }
    }

    pub fn completed(&self) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .completed
    }

    #[inline]
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn fraction(&self) -> f64 {
        self.completed() as f64 / self.total as f64
    }
}

impl std::fmt::Debug for TrainingProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainingProgress")
            .field("total", &self.total)
            .field("completed", &self.completed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::CallbackObserver;
    use crate::utils::Parallelism;

    fn recording() -> (Arc<Mutex<Vec<f64>>>, Arc<dyn TrainingObserver>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let observer = CallbackObserver::default().on_progress(move |p| sink.lock().unwrap().push(p));
        (seen, Arc::new(observer))
    }

    #[test]
    fn reports_are_monotone_and_clamped() {
        let (seen, observer) = recording();
        let progress = TrainingProgress::initialize(4, observer);
        progress.add(1);
        progress.add(0);
        progress.add(2);
        progress.add(10);
        assert_eq!(progress.completed(), 4);
        assert_eq!(*seen.lock().unwrap(), vec![0.0, 0.25, 0.75, 1.0]);
    }

    #[test]
    fn resume_starts_from_restored_units() {
        let (seen, observer) = recording();
        let progress = TrainingProgress::resume(5, 10, observer);
        progress.add(5);
        assert_eq!(*seen.lock().unwrap(), vec![0.5, 1.0]);
    }

    #[test]
    fn concurrent_adds_are_counted() {
        let (seen, observer) = recording();
        let progress = TrainingProgress::initialize(1_000, observer);
        Parallelism::Parallel.maybe_par_map(0..1_000usize, |_| progress.add(1));
        assert_eq!(progress.completed(), 1_000);
        let seen = seen.lock().unwrap();
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(seen.last().copied(), Some(1.0));
    }
}
