use chrono::{DateTime, Duration, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::error::StoreError;
use super::model::{EpochCounterState, EpochTable, GroupTable};

pub(crate) const RESERVED_METADATA_KEY: &str = "_meta";

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct StoreDocument {
    pub(crate) metadata: Option<EpochCounterState>,
    pub(crate) epochs: EpochTable,
}

impl StoreDocument {
    pub(crate) fn unit_count(&self) -> usize {
        self.epochs
            .values()
            .flat_map(|groups| groups.values())
            .flat_map(|actors| actors.values())
            .map(|units| units.len())
            .sum()
    }

    /// Counter state to resume with: the stored metadata when it is usable,
    /// otherwise the highest epoch present, otherwise zero.
    pub(crate) fn resume_epoch_state(&self) -> EpochCounterState {
        if let Some(metadata) = self.metadata {
            return metadata;
        }

        EpochCounterState {
            current_epoch: self.epochs.keys().next_back().copied().unwrap_or(0),
            last_advance_time: None,
        }
    }
}

impl Serialize for StoreDocument {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let metadata_entries = usize::from(self.metadata.is_some());
        let mut map = serializer.serialize_map(Some(self.epochs.len() + metadata_entries))?;
        if let Some(metadata) = &self.metadata {
            map.serialize_entry(RESERVED_METADATA_KEY, metadata)?;
        }
        for (epoch, groups) in &self.epochs {
            map.serialize_entry(&epoch.to_string(), groups)?;
        }
        map.end()
    }
}

pub(crate) fn is_epoch_key(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|byte| byte.is_ascii_digit())
}

/// Parses the durable document. Keys that are neither the metadata slot nor
/// pure digits are ignored; a malformed metadata slot or epoch subtree is
/// dropped with a warning instead of failing the whole load.
pub(crate) fn decode_document(raw_json: &str) -> Result<StoreDocument, StoreError> {
    let top_level = match serde_json::from_str::<Value>(raw_json)? {
        Value::Object(entries) => entries,
        other => {
            return Err(StoreError::Corrupt(format!(
                "expected a top-level object, found {}",
                json_kind(&other)
            )));
        }
    };

    let mut document = StoreDocument::default();
    for (key, value) in top_level {
        if key == RESERVED_METADATA_KEY {
            match serde_json::from_value::<EpochCounterState>(value) {
                Ok(metadata) => document.metadata = Some(metadata),
                Err(error) => {
                    tracing::warn!(
                        metadata_error = %error,
                        "Ignoring malformed epoch metadata; inferring epoch from stored data"
                    );
                }
            }
            continue;
        }

        if !is_epoch_key(&key) {
            continue;
        }

        let Ok(epoch) = key.parse::<u64>() else {
            tracing::warn!(epoch_key = %key, "Ignoring out-of-range epoch key");
            continue;
        };

        match serde_json::from_value::<GroupTable>(value) {
            Ok(groups) => {
                document.epochs.insert(epoch, groups);
            }
            Err(error) => {
                tracing::warn!(
                    epoch,
                    epoch_error = %error,
                    "Ignoring malformed epoch entry in store document"
                );
            }
        }
    }

    Ok(document)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

pub(crate) fn encode_document(document: &StoreDocument) -> Result<String, StoreError> {
    Ok(serde_json::to_string_pretty(document)?)
}

#[cfg(test)]
pub(crate) fn empty_document_json() -> String {
    Value::Object(serde_json::Map::new()).to_string()
}

pub(crate) fn write_document(path: &Path, document: &StoreDocument) -> Result<(), StoreError> {
    if let Some(parent_directory) = path.parent() {
        if !parent_directory.as_os_str().is_empty() {
            std::fs::create_dir_all(parent_directory)?;
        }
    }

    let serialized = encode_document(document)?;
    let temp_path = temporary_path(path);
    std::fs::write(&temp_path, serialized)?;

    if let Err(error) = std::fs::rename(&temp_path, path) {
        if let Err(cleanup_error) = std::fs::remove_file(&temp_path) {
            tracing::debug!(
                temp_path = %temp_path.display(),
                cleanup_error = %cleanup_error,
                "Failed to remove temporary store file"
            );
        }
        return Err(StoreError::Io(error));
    }

    Ok(())
}

fn temporary_path(path: &Path) -> PathBuf {
    let Some(file_name) = path.file_name().and_then(|value| value.to_str()) else {
        return path.with_extension("json.tmp");
    };

    path.with_file_name(format!("{file_name}.tmp"))
}

pub(crate) fn archive_path(path: &Path, now: DateTime<Utc>) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|value| value.to_string_lossy().to_string())
        .unwrap_or_else(|| "store".to_string());
    let timestamp = now.format("%Y%m%d_%H%M%S");

    path.with_file_name(format!("{stem}.{timestamp}.json"))
}

pub(crate) fn archive_file(path: &Path, now: DateTime<Utc>) -> Result<PathBuf, StoreError> {
    let destination = archive_path(path, now);
    std::fs::copy(path, &destination)?;
    std::fs::remove_file(path)?;
    Ok(destination)
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum LoadSource {
    Missing,
    Restored,
    StaleArchived(PathBuf),
    StaleDiscarded,
    UnreadableArchived(Option<PathBuf>),
}

#[derive(Debug)]
pub(crate) struct LoadOutcome {
    pub(crate) document: StoreDocument,
    pub(crate) source: LoadSource,
}

impl LoadOutcome {
    fn fresh(source: LoadSource) -> Self {
        Self {
            document: StoreDocument::default(),
            source,
        }
    }
}

/// Startup policy: a file younger than `staleness` is resumed; an older one is
/// archived (or deleted when it holds no units) and a fresh store begins. A
/// file that cannot be read or parsed is archived, never overwritten.
pub(crate) fn load_or_start_fresh(
    path: &Path,
    staleness: Duration,
    now: DateTime<Utc>,
) -> LoadOutcome {
    let raw_json = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(error) if error.kind() == ErrorKind::NotFound => {
            return LoadOutcome::fresh(LoadSource::Missing);
        }
        Err(error) => {
            tracing::warn!(
                store_path = %path.display(),
                store_error = %error,
                "Failed to read store file; starting an empty store"
            );
            return LoadOutcome::fresh(LoadSource::UnreadableArchived(archive_or_warn(path, now)));
        }
    };

    let decoded = if raw_json.trim().is_empty() {
        Ok(StoreDocument::default())
    } else {
        decode_document(&raw_json)
    };

    if is_stale(path, staleness, now) {
        let holds_units = decoded
            .as_ref()
            .map(|document| document.unit_count() > 0)
            .unwrap_or(true);

        if !holds_units {
            if let Err(error) = std::fs::remove_file(path) {
                tracing::warn!(
                    store_path = %path.display(),
                    store_error = %error,
                    "Failed to discard empty stale store file"
                );
            }
            return LoadOutcome::fresh(LoadSource::StaleDiscarded);
        }

        return match archive_file(path, now) {
            Ok(archived_to) => {
                tracing::info!(
                    store_path = %path.display(),
                    archived_to = %archived_to.display(),
                    "Archived stale store file"
                );
                LoadOutcome::fresh(LoadSource::StaleArchived(archived_to))
            }
            Err(error) => {
                tracing::warn!(
                    store_path = %path.display(),
                    store_error = %error,
                    "Failed to archive stale store file"
                );
                LoadOutcome::fresh(LoadSource::UnreadableArchived(None))
            }
        };
    }

    match decoded {
        Ok(document) => LoadOutcome {
            document,
            source: LoadSource::Restored,
        },
        Err(error) => {
            tracing::warn!(
                store_path = %path.display(),
                store_error = %error,
                "Store file is corrupt; archiving it and starting an empty store"
            );
            LoadOutcome::fresh(LoadSource::UnreadableArchived(archive_or_warn(path, now)))
        }
    }
}

fn archive_or_warn(path: &Path, now: DateTime<Utc>) -> Option<PathBuf> {
    match archive_file(path, now) {
        Ok(archived_to) => Some(archived_to),
        Err(error) => {
            tracing::warn!(
                store_path = %path.display(),
                store_error = %error,
                "Failed to archive unreadable store file"
            );
            None
        }
    }
}

fn is_stale(path: &Path, staleness: Duration, now: DateTime<Utc>) -> bool {
    let modified_at = std::fs::metadata(path).and_then(|metadata| metadata.modified());
    match modified_at {
        Ok(modified_at) => now - DateTime::<Utc>::from(modified_at) >= staleness,
        Err(error) => {
            tracing::debug!(
                store_path = %path.display(),
                store_error = %error,
                "Store file modification time unavailable; treating it as fresh"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        archive_path, decode_document, empty_document_json, encode_document, is_epoch_key,
        load_or_start_fresh, write_document, LoadSource, StoreDocument,
    };
    use crate::store::model::{EpochCounterState, StoredUnit, UnitStatus};
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::BTreeMap;
    use std::path::Path;

    fn sample_document() -> StoreDocument {
        let first_seen_at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let mut units = BTreeMap::new();
        units.insert(
            "T-90M".to_string(),
            StoredUnit {
                status: UnitStatus::Destroyed,
                first_seen_at,
                destroyed_at: Some(first_seen_at + Duration::seconds(30)),
            },
        );
        let mut actors = BTreeMap::new();
        actors.insert("Player1".to_string(), units);
        let mut groups = BTreeMap::new();
        groups.insert("ALFA".to_string(), actors);
        let mut epochs = BTreeMap::new();
        epochs.insert(4, groups);

        StoreDocument {
            metadata: Some(EpochCounterState {
                current_epoch: 4,
                last_advance_time: Some(first_seen_at),
            }),
            epochs,
        }
    }

    #[test]
    fn recognises_only_digit_keys_as_epochs() {
        assert!(is_epoch_key("0"));
        assert!(is_epoch_key("42"));
        assert!(!is_epoch_key(""));
        assert!(!is_epoch_key("_meta"));
        assert!(!is_epoch_key("-1"));
        assert!(!is_epoch_key("4a"));
    }

    #[test]
    fn encodes_nested_layout_with_reserved_metadata_key() {
        let encoded = encode_document(&sample_document()).expect("Expected encode to succeed");
        let value: serde_json::Value =
            serde_json::from_str(&encoded).expect("Expected encoded document to be JSON");

        assert_eq!(value["_meta"]["currentEpoch"], 4);
        assert_eq!(value["4"]["ALFA"]["Player1"]["T-90M"]["status"], "destroyed");
        assert!(value["4"]["ALFA"]["Player1"]["T-90M"]["firstSeenAt"].is_string());
        assert!(value["4"]["ALFA"]["Player1"]["T-90M"]["destroyedAt"].is_string());
    }

    #[test]
    fn decode_skips_foreign_keys_and_keeps_epochs() {
        let encoded = encode_document(&sample_document()).expect("Expected encode to succeed");
        let mut value: serde_json::Value =
            serde_json::from_str(&encoded).expect("Expected encoded document to be JSON");
        value["notes"] = serde_json::json!({"anything": true});
        value["7"] = serde_json::json!("not a group table");

        let decoded =
            decode_document(&value.to_string()).expect("Expected decode to tolerate extras");

        assert_eq!(decoded, sample_document());
    }

    #[test]
    fn malformed_metadata_falls_back_to_highest_epoch() {
        let mut value: serde_json::Value = serde_json::from_str(
            &encode_document(&sample_document()).expect("Expected encode to succeed"),
        )
        .expect("Expected encoded document to be JSON");
        value["_meta"] = serde_json::json!({"currentEpoch": "four"});

        let decoded = decode_document(&value.to_string()).expect("Expected decode to succeed");

        assert_eq!(decoded.metadata, None);
        assert_eq!(decoded.resume_epoch_state().current_epoch, 4);
        assert_eq!(
            decode_document(&empty_document_json())
                .expect("Expected empty object to decode")
                .resume_epoch_state(),
            EpochCounterState::default()
        );
    }

    #[test]
    fn rejects_non_object_documents() {
        assert!(decode_document("[1, 2]").is_err());
        assert!(decode_document("{not json").is_err());
    }

    #[test]
    fn archive_path_is_timestamped_sibling() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 9, 5, 7).unwrap();

        assert_eq!(
            archive_path(Path::new("data/unitwatch_state.json"), now),
            Path::new("data/unitwatch_state.20250301_090507.json")
        );
    }

    #[test]
    fn missing_file_starts_fresh() {
        let directory = tempfile::tempdir().expect("Failed to create temporary directory");
        let outcome = load_or_start_fresh(
            &directory.path().join("state.json"),
            Duration::hours(1),
            Utc::now(),
        );

        assert_eq!(outcome.source, LoadSource::Missing);
        assert_eq!(outcome.document, StoreDocument::default());
    }

    #[test]
    fn fresh_file_is_restored() {
        let directory = tempfile::tempdir().expect("Failed to create temporary directory");
        let path = directory.path().join("state.json");
        write_document(&path, &sample_document()).expect("Expected write to succeed");

        let outcome = load_or_start_fresh(&path, Duration::hours(1), Utc::now());

        assert_eq!(outcome.source, LoadSource::Restored);
        assert_eq!(outcome.document, sample_document());
        assert!(!directory.path().join("state.json.tmp").exists());
    }

    #[test]
    fn stale_file_with_units_is_archived() {
        let directory = tempfile::tempdir().expect("Failed to create temporary directory");
        let path = directory.path().join("state.json");
        write_document(&path, &sample_document()).expect("Expected write to succeed");

        let now = Utc::now() + Duration::seconds(5);
        let outcome = load_or_start_fresh(&path, Duration::zero(), now);

        let LoadSource::StaleArchived(archived_to) = outcome.source else {
            panic!("Expected stale store to be archived, got {:?}", outcome.source);
        };
        assert!(archived_to.exists());
        assert!(!path.exists());
        assert_eq!(outcome.document, StoreDocument::default());
    }

    #[test]
    fn stale_empty_file_is_discarded() {
        let directory = tempfile::tempdir().expect("Failed to create temporary directory");
        let path = directory.path().join("state.json");
        std::fs::write(&path, r#"{"_meta": {"currentEpoch": 2}}"#)
            .expect("Failed to write empty store file");

        let now = Utc::now() + Duration::seconds(5);
        let outcome = load_or_start_fresh(&path, Duration::zero(), now);

        assert_eq!(outcome.source, LoadSource::StaleDiscarded);
        assert!(!path.exists());
        let remaining_files = std::fs::read_dir(directory.path())
            .expect("Failed to list temporary directory")
            .count();
        assert_eq!(remaining_files, 0);
    }

    #[test]
    fn corrupt_fresh_file_is_archived_not_overwritten() {
        let directory = tempfile::tempdir().expect("Failed to create temporary directory");
        let path = directory.path().join("state.json");
        std::fs::write(&path, "{\"4\": {\"ALFA\"").expect("Failed to write corrupt store file");

        let outcome = load_or_start_fresh(&path, Duration::hours(1), Utc::now());

        let LoadSource::UnreadableArchived(Some(archived_to)) = outcome.source else {
            panic!("Expected corrupt store to be archived, got {:?}", outcome.source);
        };
        assert_eq!(
            std::fs::read_to_string(&archived_to).expect("Failed to read archived store"),
            "{\"4\": {\"ALFA\""
        );
        assert!(!path.exists());
    }
}
