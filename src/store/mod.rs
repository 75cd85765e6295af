mod error;
pub mod model;
mod persistence;

use chrono::{DateTime, Duration, Utc};
use std::path::{Path, PathBuf};

use crate::classifier::Classifier;

pub use error::StoreError;
pub use model::{
    EpochCounterState, EpochSummary, StatusCounts, StoredUnit, UnitKey, UnitRecord, UnitStatus,
    UpsertOutcome,
};

use model::EpochTable;
use persistence::{LoadSource, StoreDocument};

pub const DEFAULT_STALENESS_SECS: u64 = 3_600;

/// epoch -> group -> actor -> unit, plus the epoch counter's metadata slot.
///
/// Every mutation is followed by a full rewrite of the durable file. A failed
/// write is logged and the in-memory tree stays authoritative; the next
/// successful write reconciles the file.
#[derive(Debug)]
pub struct StateStore {
    path: Option<PathBuf>,
    epochs: EpochTable,
    epoch_state: EpochCounterState,
}

impl StateStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            epochs: EpochTable::new(),
            epoch_state: EpochCounterState::default(),
        }
    }

    /// Opens the durable file at `path`, applying the staleness policy. Never
    /// fails: unreadable or stale files are set aside and an empty store is
    /// returned instead.
    pub fn open(path: &Path, staleness: Duration, now: DateTime<Utc>) -> Self {
        let outcome = persistence::load_or_start_fresh(path, staleness, now);
        let epoch_state = outcome.document.resume_epoch_state();

        match &outcome.source {
            LoadSource::Restored => tracing::info!(
                store_path = %path.display(),
                epochs = outcome.document.epochs.len(),
                units = outcome.document.unit_count(),
                current_epoch = epoch_state.current_epoch,
                "Restored unit store"
            ),
            LoadSource::Missing | LoadSource::StaleDiscarded => tracing::info!(
                store_path = %path.display(),
                "Starting empty unit store"
            ),
            LoadSource::StaleArchived(archived_to) => tracing::info!(
                store_path = %path.display(),
                archived_to = %archived_to.display(),
                "Starting empty unit store after archiving stale data"
            ),
            LoadSource::UnreadableArchived(archived_to) => tracing::warn!(
                store_path = %path.display(),
                archived_to = ?archived_to,
                "Starting empty unit store after an unreadable store file"
            ),
        }

        Self {
            path: Some(path.to_path_buf()),
            epochs: outcome.document.epochs,
            epoch_state,
        }
    }

    pub fn epoch_state(&self) -> EpochCounterState {
        self.epoch_state
    }

    pub fn current_epoch(&self) -> u64 {
        self.epoch_state.current_epoch
    }

    pub fn set_epoch_state(&mut self, epoch_state: EpochCounterState) {
        self.epoch_state = epoch_state;
        self.persist_or_warn();
    }

    /// Creates the record for a new key, or moves an existing one from active
    /// to destroyed. Status never regresses; anything else is a no-op.
    pub fn upsert(
        &mut self,
        key: UnitKey<'_>,
        status: UnitStatus,
        now: DateTime<Utc>,
    ) -> UpsertOutcome {
        let units = self
            .epochs
            .entry(key.epoch)
            .or_default()
            .entry(key.group.to_string())
            .or_default()
            .entry(key.actor.to_string())
            .or_default();

        let outcome = match units.get_mut(key.unit) {
            None => {
                units.insert(
                    key.unit.to_string(),
                    StoredUnit {
                        status,
                        first_seen_at: now,
                        destroyed_at: (status == UnitStatus::Destroyed).then_some(now),
                    },
                );
                UpsertOutcome::Created
            }
            Some(stored)
                if stored.status == UnitStatus::Active && status == UnitStatus::Destroyed =>
            {
                stored.status = UnitStatus::Destroyed;
                stored.destroyed_at = Some(now);
                UpsertOutcome::Transitioned
            }
            Some(_) => UpsertOutcome::Unchanged,
        };

        if outcome.changed_store() {
            self.persist_or_warn();
        }

        outcome
    }

    #[cfg(test)]
    pub(crate) fn get(&self, key: UnitKey<'_>) -> Option<&StoredUnit> {
        self.epochs
            .get(&key.epoch)?
            .get(key.group)?
            .get(key.actor)?
            .get(key.unit)
    }

    pub fn query(&self, epoch: Option<u64>, classifier: &Classifier) -> Vec<UnitRecord> {
        let epoch = epoch.unwrap_or(self.epoch_state.current_epoch);
        let Some(groups) = self.epochs.get(&epoch) else {
            return Vec::new();
        };

        let mut records = Vec::new();
        for (group, actors) in groups {
            for (actor, units) in actors {
                for (unit, stored) in units {
                    records.push(UnitRecord {
                        epoch,
                        group: group.clone(),
                        actor: actor.clone(),
                        unit: unit.clone(),
                        status: stored.status,
                        classification: classifier.classify(unit).to_string(),
                        first_seen_at: stored.first_seen_at,
                        destroyed_at: stored.destroyed_at,
                    });
                }
            }
        }

        records
    }

    pub fn list_epochs(&self) -> Vec<u64> {
        self.epochs
            .iter()
            .filter(|(_, groups)| {
                groups
                    .values()
                    .flat_map(|actors| actors.values())
                    .any(|units| !units.is_empty())
            })
            .map(|(epoch, _)| *epoch)
            .collect()
    }

    pub fn summary(&self, epoch: Option<u64>, classifier: &Classifier) -> EpochSummary {
        let epoch = epoch.unwrap_or(self.epoch_state.current_epoch);
        let mut summary = EpochSummary {
            epoch,
            ..EpochSummary::default()
        };

        for record in self.query(Some(epoch), classifier) {
            summary.totals.count(record.status);
            summary
                .by_classification
                .entry(record.classification)
                .or_default()
                .count(record.status);
            summary
                .by_group
                .entry(record.group)
                .or_default()
                .count(record.status);
        }

        summary
    }

    pub fn persist(&self) -> Result<(), StoreError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };

        let document = StoreDocument {
            metadata: Some(self.epoch_state),
            epochs: self.epochs.clone(),
        };
        persistence::write_document(path, &document)
    }

    fn persist_or_warn(&self) {
        if let Err(error) = self.persist() {
            tracing::warn!(
                store_path = ?self.path,
                store_error = %error,
                "Failed to persist unit store; keeping in-memory state"
            );
        }
    }
}
