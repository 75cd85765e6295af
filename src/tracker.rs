use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

use crate::classifier::{ClassificationDictionary, Classifier};
use crate::clock::Clock;
use crate::dedupe::Deduplicator;
use crate::line_parser::LineGrammar;
use crate::notifier::{Notification, Notifier};
use crate::pipeline::{IngestReport, Pipeline};
use crate::settings::TrackerSettings;
use crate::store::{EpochSummary, StateStore, UnitRecord};

/// Shared handle over one pipeline. Snapshots are processed one at a time;
/// queries see the state between snapshots, never half of one.
#[derive(Clone)]
pub struct Tracker {
    pipeline: Arc<Mutex<Pipeline>>,
    notifier: Notifier,
}

impl Tracker {
    pub fn new(pipeline: Pipeline) -> Self {
        let notifier = pipeline.notifier().clone();
        Self {
            pipeline: Arc::new(Mutex::new(pipeline)),
            notifier,
        }
    }

    pub fn from_settings(settings: &TrackerSettings, clock: Arc<dyn Clock>) -> Result<Self, String> {
        let dictionary = match settings.dictionary_path.as_deref() {
            Some(path) => ClassificationDictionary::load(path)?,
            None => ClassificationDictionary::new(),
        };
        tracing::info!(
            categories = dictionary.category_names().count(),
            units = dictionary.unit_count(),
            "Classification dictionary ready"
        );

        let classifier = Classifier::with_default_category(dictionary, &settings.default_category);
        let store = StateStore::open(&settings.store_path, settings.store_staleness(), clock.now());
        let pipeline = Pipeline::new(store, classifier, clock)
            .with_grammar(LineGrammar::new(
                &settings.destroyed_marker,
                &settings.trigger_phrase,
            ))
            .with_deduplicator(Deduplicator::new(
                settings.dedupe_window(),
                settings.dedupe_max_entries,
            ))
            .with_epoch_cooldown(settings.epoch_cooldown())
            .with_notifier(Notifier::new(settings.notification_capacity));

        Ok(Self::new(pipeline))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Pipeline>, String> {
        self.pipeline.lock().map_err(|error| error.to_string())
    }

    pub fn ingest_snapshot(&self, text: &str) -> Result<IngestReport, String> {
        Ok(self.lock()?.ingest_snapshot(text))
    }

    pub fn prime(&self, text: &str) -> Result<(), String> {
        self.lock()?.prime(text);
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }

    pub fn current_epoch(&self) -> Result<u64, String> {
        Ok(self.lock()?.current_epoch())
    }

    pub fn records(&self, epoch: Option<u64>) -> Result<Vec<UnitRecord>, String> {
        Ok(self.lock()?.records(epoch))
    }

    pub fn list_epochs(&self) -> Result<Vec<u64>, String> {
        Ok(self.lock()?.list_epochs())
    }

    pub fn summary(&self, epoch: Option<u64>) -> Result<EpochSummary, String> {
        Ok(self.lock()?.summary(epoch))
    }
}
