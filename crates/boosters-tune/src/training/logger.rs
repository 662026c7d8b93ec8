//! Verbosity-gated structured logging for builds and optimisation rounds.

use serde::{Deserialize, Serialize};

/// How much the orchestrator logs.
///
/// Levels are ordered: each one includes everything the previous one logs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    Silent,
    /// Fallbacks and degraded behaviour.
    #[default]
    Warning,
    /// Search intervals and optimisation rounds.
    Info,
    /// Every build stage.
    Debug,
}

/// Emits `tracing` events for the stages of a build and the optimisation
/// loop, filtered by [`Verbosity`].
///
/// The crate never installs a subscriber; the embedding application decides
/// where events go.
#[derive(Clone, Copy, Debug)]
pub struct TrainingLogger {
    verbosity: Verbosity,
}

impl TrainingLogger {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    #[inline]
    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    #[inline]
    pub fn enabled(&self, level: Verbosity) -> bool {
        level != Verbosity::Silent && self.verbosity >= level
    }

    /// A build stage started.
    pub fn stage(&self, stage: &'static str) {
        if self.enabled(Verbosity::Debug) {
            tracing::debug!(stage, "build stage");
        }
    }

    /// A line search produced a search interval.
    pub fn search_interval(&self, hyperparameter: &str, lower: f64, centre: f64, upper: f64) {
        if self.enabled(Verbosity::Info) {
            tracing::info!(hyperparameter, lower, centre, upper, "search interval");
        }
    }

    /// A line search missed and the interval fell back to a default.
    pub fn line_search_fallback(&self, hyperparameter: &str, reason: &'static str) {
        if self.enabled(Verbosity::Warning) {
            tracing::warn!(hyperparameter, reason, "line search did not converge, using fallback interval");
        }
    }

    /// The fold count had to be reduced.
    pub fn folds_reduced(&self, requested: usize, used: usize) {
        if self.enabled(Verbosity::Warning) {
            tracing::warn!(requested, used, "reduced number of cross-validation folds");
        }
    }

    pub fn start_optimisation(&self, rounds: usize, completed: usize, dimensions: usize) {
        if self.enabled(Verbosity::Info) {
            tracing::info!(rounds, completed, dimensions, "hyperparameter optimisation");
        }
    }

    /// An optimisation round finished.
    pub fn round(&self, round: usize, test_loss: f64, best_loss: f64) {
        if self.enabled(Verbosity::Info) {
            tracing::info!(round, test_loss, best_loss, "optimisation round");
        }
    }

    pub fn early_stopping(&self, round: usize, best_round: usize) {
        if self.enabled(Verbosity::Info) {
            tracing::info!(round, best_round, "no improvement within patience, stopping optimisation");
        }
    }

    pub fn final_forest(&self, n_trees: usize, n_rows: usize) {
        if self.enabled(Verbosity::Info) {
            tracing::info!(n_trees, n_rows, "trained final forest");
        }
    }
}
