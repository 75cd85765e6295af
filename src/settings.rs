use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::classifier::DEFAULT_CATEGORY;
use crate::dedupe::{DEFAULT_DEDUPE_MAX_ENTRIES, DEFAULT_DEDUPE_WINDOW_MS};
use crate::epoch::DEFAULT_EPOCH_COOLDOWN_SECS;
use crate::line_parser::{DEFAULT_DESTROYED_MARKER, DEFAULT_TRIGGER_PHRASE};
use crate::notifier::DEFAULT_NOTIFICATION_CAPACITY;
use crate::store::DEFAULT_STALENESS_SECS;

pub const CONFIG_PATH_ENV: &str = "UNITWATCH_CONFIG";
pub const DEFAULT_STORE_FILE: &str = "unitwatch_state.json";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct TrackerSettings {
    pub log_path: Option<PathBuf>,
    pub store_path: PathBuf,
    pub dictionary_path: Option<PathBuf>,
    pub destroyed_marker: String,
    pub trigger_phrase: String,
    pub default_category: String,
    pub epoch_cooldown_secs: u64,
    pub dedupe_window_ms: u64,
    pub dedupe_max_entries: usize,
    pub store_staleness_secs: u64,
    pub notification_capacity: usize,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            log_path: None,
            store_path: PathBuf::from(DEFAULT_STORE_FILE),
            dictionary_path: None,
            destroyed_marker: DEFAULT_DESTROYED_MARKER.to_string(),
            trigger_phrase: DEFAULT_TRIGGER_PHRASE.to_string(),
            default_category: DEFAULT_CATEGORY.to_string(),
            epoch_cooldown_secs: DEFAULT_EPOCH_COOLDOWN_SECS,
            dedupe_window_ms: DEFAULT_DEDUPE_WINDOW_MS,
            dedupe_max_entries: DEFAULT_DEDUPE_MAX_ENTRIES,
            store_staleness_secs: DEFAULT_STALENESS_SECS,
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
        }
    }
}

impl TrackerSettings {
    pub fn epoch_cooldown(&self) -> chrono::Duration {
        seconds_duration(self.epoch_cooldown_secs)
    }

    pub fn dedupe_window(&self) -> chrono::Duration {
        let milliseconds = i64::try_from(self.dedupe_window_ms).unwrap_or(i64::MAX);
        chrono::Duration::try_milliseconds(milliseconds).unwrap_or(chrono::Duration::MAX)
    }

    pub fn store_staleness(&self) -> chrono::Duration {
        seconds_duration(self.store_staleness_secs)
    }

    pub fn from_json_str(raw_json: &str) -> Result<Self, String> {
        serde_json::from_str::<Self>(raw_json)
            .map_err(|error| format!("Failed to parse tracker settings: {error}"))
    }

    pub fn load(path: &Path) -> Result<Self, String> {
        let raw_json = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                tracing::info!(
                    config_path = %path.display(),
                    "Settings file not found; using defaults"
                );
                return Ok(Self::default());
            }
            Err(error) => {
                return Err(format!(
                    "Failed to read tracker settings '{}': {error}",
                    path.display()
                ));
            }
        };

        Self::from_json_str(&raw_json).map_err(|error| format!("{error} ('{}')", path.display()))
    }
}

/// Settings path from the first CLI argument, then the environment, then the
/// working directory default.
pub fn resolve_config_path(cli_argument: Option<String>) -> PathBuf {
    cli_argument
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| std::env::var(CONFIG_PATH_ENV).ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("unitwatch.json"))
}

fn seconds_duration(seconds: u64) -> chrono::Duration {
    i64::try_from(seconds)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}
