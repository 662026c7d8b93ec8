//! Versioned training-state snapshots.
//!
//! A snapshot is a JSON document:
//!
//! ```text
//! {
//!   "version": 1,
//!   "loss": { "type": "squared_error" },
//!   "config": { ... },
//!   "hyperparameters": { ... },
//!   "search_space": { "dimensions": [ ... ] },
//!   "observations": [ { "point": [ ... ], "loss": 0.25 }, ... ],
//!   ...
//! }
//! ```
//!
//! The version and loss are checked before the rest is decoded, so an
//! incompatible payload fails with a specific [`RestoreError`] rather than a
//! generic parse error.

use std::io;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RestoreError;
use crate::factory::FactoryConfig;
use crate::training::{Loss, PersistFn};
use crate::tuning::{Hyperparameters, Observation, SearchSpace};

/// Version written by this crate and the only one it reads.
pub const STATE_VERSION: u64 = 1;

/// Everything needed to resume hyperparameter optimisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingState {
    pub version: u64,
    pub loss: Loss,
    pub config: FactoryConfig,
    /// Values the search space is applied to: initial values with the
    /// regularisers at their line-search centres.
    pub hyperparameters: Hyperparameters,
    pub search_space: SearchSpace,
    /// One per completed round, in round order.
    pub observations: Vec<Observation>,
    pub best_round: Option<usize>,
    pub rounds_completed: usize,
    pub progress_units_completed: u64,
    /// Used to reject restoring against a different frame.
    pub n_features: usize,
    pub n_eligible_rows: usize,
}

impl TrainingState {
    /// Read and validate a snapshot.
    pub fn from_reader(reader: impl io::Read) -> Result<Self, RestoreError> {
        let value: Value = serde_json::from_reader(reader).map_err(|e| {
            if e.is_io() {
                RestoreError::Io(e.into())
            } else {
                RestoreError::Malformed(e)
            }
        })?;
        Self::from_value(value)
    }

    pub fn from_json(json: &str) -> Result<Self, RestoreError> {
        Self::from_value(serde_json::from_str(json)?)
    }

    fn from_value(value: Value) -> Result<Self, RestoreError> {
        let version = value
            .get("version")
            .and_then(Value::as_u64)
            .ok_or_else(|| RestoreError::Inconsistent("missing version".into()))?;
        if version != STATE_VERSION {
            return Err(RestoreError::UnsupportedVersion {
                found: version,
                expected: STATE_VERSION,
            });
        }

        let loss = value
            .get("loss")
            .and_then(|loss| loss.get("type"))
            .and_then(Value::as_str)
            .ok_or_else(|| RestoreError::Inconsistent("missing loss".into()))?;
        if !Loss::NAMES.contains(&loss) {
            return Err(RestoreError::UnexpectedLoss(loss.to_string()));
        }

        let state: TrainingState = serde_json::from_value(value)?;
        state.validate()?;
        Ok(state)
    }

    /// Check the invariants a well-formed snapshot satisfies.
    pub fn validate(&self) -> Result<(), RestoreError> {
        let inconsistent = |message: String| Err(RestoreError::Inconsistent(message));

        if let Err(e) = self.config.validate() {
            return inconsistent(format!("invalid configuration: {e}"));
        }
        if self.rounds_completed != self.observations.len() {
            return inconsistent(format!(
                "{} rounds completed but {} observations",
                self.rounds_completed,
                self.observations.len()
            ));
        }
        let dimensions = self.search_space.len();
        for (round, observation) in self.observations.iter().enumerate() {
            if observation.point.len() != dimensions {
                return inconsistent(format!(
                    "observation {round} has {} coordinates, search space has {dimensions}",
                    observation.point.len()
                ));
            }
            if !observation.point.iter().all(|x| (0.0..=1.0).contains(x)) || !observation.loss.is_finite() {
                return inconsistent(format!("observation {round} is out of range"));
            }
        }
        if let Some(dimension) = self.search_space.dimensions().iter().find(|d| !d.interval.is_finite()) {
            return inconsistent(format!(
                "search interval for {} is not finite",
                dimension.hyperparameter.name()
            ));
        }
        let best = self
            .observations
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, f64)>, (i, o)| match best {
                Some((_, loss)) if loss <= o.loss => best,
                _ => Some((i, o.loss)),
            })
            .map(|(i, _)| i);
        if best != self.best_round {
            return inconsistent(format!(
                "best round {:?} does not match observations (expected {best:?})",
                self.best_round
            ));
        }
        if self.n_features == 0 || self.n_eligible_rows == 0 {
            return inconsistent("state records an empty training set".into());
        }
        Ok(())
    }

    pub fn to_writer(&self, writer: &mut dyn io::Write) -> io::Result<()> {
        serde_json::to_writer(writer, self).map_err(io::Error::from)
    }

    pub fn to_json(&self) -> String {
        // Plain data with string keys; serialisation cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// A [`PersistFn`] that writes this snapshot.
    pub fn into_persist_fn(self) -> PersistFn {
        Box::new(move |writer: &mut dyn io::Write| self.to_writer(writer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuning::{Hyperparameter, SearchInterval};

    fn state() -> TrainingState {
        let mut search_space = SearchSpace::default();
        search_space.push(Hyperparameter::Eta, SearchInterval::new(-3.0, -2.0, -1.0));
        TrainingState {
            version: STATE_VERSION,
            loss: Loss::BinomialLogistic,
            config: FactoryConfig::default(),
            hyperparameters: Hyperparameters::default(),
            search_space,
            observations: vec![
                Observation { point: vec![0.5], loss: 0.6931471805599453 },
                Observation { point: vec![0.123456789012345], loss: 0.1 + 0.2 },
            ],
            best_round: Some(1),
            rounds_completed: 2,
            progress_units_completed: 1234,
            n_features: 3,
            n_eligible_rows: 500,
        }
    }

    #[test]
    fn round_trip_is_exact() {
        let original = state();
        let mut bytes: Vec<u8> = Vec::new();
        let persist = original.clone().into_persist_fn();
        persist(&mut bytes as &mut dyn io::Write).unwrap();
        let restored = TrainingState::from_reader(bytes.as_slice()).unwrap();
        assert_eq!(restored, original);
        assert_eq!(restored.observations[1].loss.to_bits(), (0.1f64 + 0.2).to_bits());
    }

    #[test]
    fn rejects_other_version() {
        let json = state().to_json().replacen("\"version\":1", "\"version\":2", 1);
        assert!(matches!(
            TrainingState::from_json(&json),
            Err(RestoreError::UnsupportedVersion { found: 2, expected: 1 })
        ));
    }

    #[test]
    fn rejects_unknown_loss() {
        let json = state().to_json().replacen("binomial_logistic", "pseudo_huber", 1);
        match TrainingState::from_json(&json) {
            Err(RestoreError::UnexpectedLoss(name)) => assert_eq!(name, "pseudo_huber"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_and_truncated() {
        assert!(matches!(TrainingState::from_json(""), Err(RestoreError::Malformed(_))));
        assert!(matches!(TrainingState::from_json("{\"version\":"), Err(RestoreError::Malformed(_))));
        let json = state().to_json();
        assert!(TrainingState::from_json(&json[..json.len() / 2]).is_err());
        assert!(matches!(
            TrainingState::from_json("{\"loss\":{\"type\":\"squared_error\"}}"),
            Err(RestoreError::Inconsistent(_))
        ));
    }

    #[test]
    fn rejects_inconsistent_best_round() {
        let mut broken = state();
        broken.best_round = Some(0);
        assert!(matches!(
            TrainingState::from_json(&broken.to_json()),
            Err(RestoreError::Inconsistent(_))
        ));

        let mut broken = state();
        broken.rounds_completed = 5;
        assert!(matches!(broken.validate(), Err(RestoreError::Inconsistent(_))));
    }
}
