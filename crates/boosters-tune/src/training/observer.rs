//! Progress, memory and training-state reporting hooks.

use std::fmt;
use std::io;
use std::sync::Arc;

/// Writes a snapshot of training state to any sink.
///
/// The caller decides whether and where to run it; running it twice writes
/// the same bytes twice.
pub type PersistFn = Box<dyn Fn(&mut dyn io::Write) -> io::Result<()> + Send + Sync>;

/// Receives reports while a model is built and trained.
///
/// Every method defaults to doing nothing. Calls may come from worker
/// threads, but calls to one method are never concurrent.
pub trait TrainingObserver: Send + Sync {
    /// Fraction of the expected work completed, in `[0, 1]`, never decreasing.
    fn record_progress(&self, _fraction: f64) {}

    /// Signed change in bytes held by the orchestrator.
    fn record_memory_usage(&self, _delta: i64) {}

    /// A persistable snapshot, offered after every optimisation round.
    fn record_training_state(&self, _persist: PersistFn) {}
}

/// Observer that ignores every report.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl TrainingObserver for NoopObserver {}

type ProgressFn = Arc<dyn Fn(f64) + Send + Sync>;
type MemoryFn = Arc<dyn Fn(i64) + Send + Sync>;
type StateFn = Arc<dyn Fn(PersistFn) + Send + Sync>;

/// Observer backed by optional closures; unset hooks do nothing.
///
/// # Example
///
/// ```
/// use std::sync::atomic::{AtomicI64, Ordering};
/// use std::sync::Arc;
/// use boosters_tune::training::{CallbackObserver, TrainingObserver};
///
/// let held = Arc::new(AtomicI64::new(0));
/// let sink = Arc::clone(&held);
/// let observer = CallbackObserver::default()
///     .on_memory_usage(move |delta| { sink.fetch_add(delta, Ordering::Relaxed); });
/// observer.record_memory_usage(64);
/// assert_eq!(held.load(Ordering::Relaxed), 64);
/// ```
#[derive(Clone, Default)]
pub struct CallbackObserver {
    progress: Option<ProgressFn>,
    memory: Option<MemoryFn>,
    state: Option<StateFn>,
}

impl CallbackObserver {
    pub fn on_progress(mut self, f: impl Fn(f64) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(f));
        self
    }

    pub fn on_memory_usage(mut self, f: impl Fn(i64) + Send + Sync + 'static) -> Self {
        self.memory = Some(Arc::new(f));
        self
    }

    pub fn on_training_state(mut self, f: impl Fn(PersistFn) + Send + Sync + 'static) -> Self {
        self.state = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for CallbackObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackObserver")
            .field("progress", &self.progress.is_some())
            .field("memory", &self.memory.is_some())
            .field("state", &self.state.is_some())
            .finish()
    }
}

impl TrainingObserver for CallbackObserver {
    fn record_progress(&self, fraction: f64) {
        if let Some(f) = &self.progress {
            f(fraction);
        }
    }

    fn record_memory_usage(&self, delta: i64) {
        if let Some(f) = &self.memory {
            f(delta);
        }
    }

    fn record_training_state(&self, persist: PersistFn) {
        if let Some(f) = &self.state {
            f(persist);
        }
    }
}
