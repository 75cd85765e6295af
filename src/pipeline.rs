use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use crate::classifier::Classifier;
use crate::clock::Clock;
use crate::dedupe::{
    dedupe_key, Deduplicator, DEFAULT_DEDUPE_MAX_ENTRIES, DEFAULT_DEDUPE_WINDOW_MS,
};
use crate::epoch::{EpochAdvance, EpochCounter, DEFAULT_EPOCH_COOLDOWN_SECS};
use crate::line_parser::{LineGrammar, UnitSighting};
use crate::notifier::{Notification, Notifier};
use crate::snapshot_diff::appended_lines;
use crate::store::{EpochSummary, StateStore, UnitKey, UnitRecord, UnitStatus, UpsertOutcome};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub new_lines: usize,
    pub unit_events: usize,
    pub suppressed_events: usize,
    pub created_units: usize,
    pub destroyed_transitions: usize,
    pub epoch_advances: usize,
    pub cooldown_rejections: usize,
}

/// Turns snapshots of the live text feed into store mutations and
/// notifications. Not thread-safe by itself; `Tracker` serialises access.
pub struct Pipeline {
    grammar: LineGrammar,
    classifier: Classifier,
    deduplicator: Deduplicator,
    epoch_counter: EpochCounter,
    store: StateStore,
    notifier: Notifier,
    clock: Arc<dyn Clock>,
    previous_text: String,
}

impl Pipeline {
    pub fn new(store: StateStore, classifier: Classifier, clock: Arc<dyn Clock>) -> Self {
        let epoch_counter = EpochCounter::restore(
            store.epoch_state(),
            Duration::seconds(DEFAULT_EPOCH_COOLDOWN_SECS as i64),
        );

        Self {
            grammar: LineGrammar::default(),
            classifier,
            deduplicator: Deduplicator::new(
                Duration::milliseconds(DEFAULT_DEDUPE_WINDOW_MS as i64),
                DEFAULT_DEDUPE_MAX_ENTRIES,
            ),
            epoch_counter,
            store,
            notifier: Notifier::default(),
            clock,
            previous_text: String::new(),
        }
    }

    pub fn with_grammar(mut self, grammar: LineGrammar) -> Self {
        self.grammar = grammar;
        self
    }

    pub fn with_deduplicator(mut self, deduplicator: Deduplicator) -> Self {
        self.deduplicator = deduplicator;
        self
    }

    pub fn with_epoch_cooldown(mut self, cooldown: Duration) -> Self {
        self.epoch_counter = EpochCounter::restore(self.epoch_counter.state(), cooldown);
        self
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn prime(&mut self, text: &str) {
        self.previous_text = text.to_string();
    }

    pub fn ingest_snapshot(&mut self, text: &str) -> IngestReport {
        let mut report = IngestReport::default();
        let new_lines = appended_lines(&self.previous_text, text);
        report.new_lines = new_lines.len();

        for line in new_lines {
            self.process_line(line, &mut report);
        }

        self.previous_text = text.to_string();
        report
    }

    fn process_line(&mut self, line: &str, report: &mut IngestReport) {
        let now = self.clock.now();

        if self.grammar.contains_trigger(line) {
            self.advance_epoch(now, report);
        }

        if let Some(sighting) = self.grammar.parse_line(line) {
            self.record_sighting(sighting, now, report);
        }
    }

    fn advance_epoch(&mut self, now: DateTime<Utc>, report: &mut IngestReport) {
        let advance = self.epoch_counter.request_advance(&mut self.store, now);
        match advance {
            EpochAdvance::Advanced { epoch } => {
                report.epoch_advances += 1;
                tracing::info!(epoch, "Game advanced");
            }
            EpochAdvance::Cooldown { remaining_seconds } => {
                report.cooldown_rejections += 1;
                tracing::info!(remaining_seconds, "Game advance ignored during cooldown");
            }
        }

        self.notifier.publish(Notification::from(advance));
    }

    fn record_sighting(
        &mut self,
        sighting: UnitSighting,
        now: DateTime<Utc>,
        report: &mut IngestReport,
    ) {
        report.unit_events += 1;

        let epoch = self.epoch_counter.current_epoch();
        let status = UnitStatus::from_destroyed(sighting.is_destroyed);
        let key = dedupe_key(
            epoch,
            &sighting.group,
            &sighting.actor,
            &sighting.unit,
            status.as_str(),
        );
        let suppressed = self.deduplicator.should_suppress(&key, now);

        let outcome = self.store.upsert(
            UnitKey {
                epoch,
                group: &sighting.group,
                actor: &sighting.actor,
                unit: &sighting.unit,
            },
            status,
            now,
        );
        match outcome {
            UpsertOutcome::Created => report.created_units += 1,
            UpsertOutcome::Transitioned => report.destroyed_transitions += 1,
            UpsertOutcome::Unchanged => {}
        }

        if suppressed {
            report.suppressed_events += 1;
            tracing::debug!(
                epoch,
                group = %sighting.group,
                actor = %sighting.actor,
                unit = %sighting.unit,
                status = status.as_str(),
                "Repeated unit event refreshed"
            );
        } else {
            tracing::info!(
                epoch,
                group = %sighting.group,
                actor = %sighting.actor,
                unit = %sighting.unit,
                status = status.as_str(),
                classification = self.classifier.classify(&sighting.unit),
                created = outcome.is_created(),
                "Unit event"
            );
        }

        self.notifier.publish(Notification::Event {
            verbose: !suppressed,
            epoch,
            group: sighting.group,
            actor: sighting.actor,
            unit: sighting.unit,
            status,
        });
    }

    pub fn current_epoch(&self) -> u64 {
        self.epoch_counter.current_epoch()
    }

    pub fn records(&self, epoch: Option<u64>) -> Vec<UnitRecord> {
        self.store.query(epoch, &self.classifier)
    }

    pub fn list_epochs(&self) -> Vec<u64> {
        self.store.list_epochs()
    }

    pub fn summary(&self, epoch: Option<u64>) -> EpochSummary {
        self.store.summary(epoch, &self.classifier)
    }
}
