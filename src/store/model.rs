use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnitStatus {
    Active,
    Destroyed,
}

impl UnitStatus {
    pub fn from_destroyed(is_destroyed: bool) -> Self {
        if is_destroyed {
            UnitStatus::Destroyed
        } else {
            UnitStatus::Active
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UnitStatus::Active => "active",
            UnitStatus::Destroyed => "destroyed",
        }
    }
}

/// Identity of one unit within one match. Immutable once a record exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitKey<'a> {
    pub epoch: u64,
    pub group: &'a str,
    pub actor: &'a str,
    pub unit: &'a str,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredUnit {
    pub status: UnitStatus,
    pub first_seen_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destroyed_at: Option<DateTime<Utc>>,
}

pub type UnitTable = BTreeMap<String, StoredUnit>;
pub type ActorTable = BTreeMap<String, UnitTable>;
pub type GroupTable = BTreeMap<String, ActorTable>;
pub type EpochTable = BTreeMap<u64, GroupTable>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitRecord {
    pub epoch: u64,
    pub group: String,
    pub actor: String,
    pub unit: String,
    pub status: UnitStatus,
    pub classification: String,
    pub first_seen_at: DateTime<Utc>,
    pub destroyed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochCounterState {
    pub current_epoch: u64,
    #[serde(default)]
    pub last_advance_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Transitioned,
    Unchanged,
}

impl UpsertOutcome {
    pub fn is_created(self) -> bool {
        matches!(self, UpsertOutcome::Created)
    }

    pub fn changed_store(self) -> bool {
        !matches!(self, UpsertOutcome::Unchanged)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub active: u64,
    pub destroyed: u64,
}

impl StatusCounts {
    pub(crate) fn count(&mut self, status: UnitStatus) {
        match status {
            UnitStatus::Active => self.active += 1,
            UnitStatus::Destroyed => self.destroyed += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.active + self.destroyed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochSummary {
    pub epoch: u64,
    pub totals: StatusCounts,
    pub by_classification: BTreeMap<String, StatusCounts>,
    pub by_group: BTreeMap<String, StatusCounts>,
}
