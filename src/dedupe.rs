use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

pub const DEFAULT_DEDUPE_WINDOW_MS: u64 = 3_000;
pub const DEFAULT_DEDUPE_MAX_ENTRIES: usize = 512;

pub fn dedupe_key(epoch: u64, group: &str, actor: &str, unit: &str, status: &str) -> String {
    format!("{epoch}|{group}|{actor}|{unit}|{status}")
}

#[derive(Debug)]
pub struct Deduplicator {
    window: Duration,
    max_entries: usize,
    last_seen: HashMap<String, DateTime<Utc>>,
    last_sweep: Option<DateTime<Utc>>,
}

impl Deduplicator {
    pub fn new(window: Duration, max_entries: usize) -> Self {
        Self {
            window,
            max_entries: max_entries.max(1),
            last_seen: HashMap::new(),
            last_sweep: None,
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.last_seen.len()
    }

    /// Returns true when `key` was already seen inside the window. Either way
    /// the key's timestamp is refreshed to `now`.
    pub fn should_suppress(&mut self, key: &str, now: DateTime<Utc>) -> bool {
        self.sweep_expired(now);

        if let Some(seen_at) = self.last_seen.get_mut(key) {
            let within_window = now >= *seen_at && now - *seen_at < self.window;
            *seen_at = now;
            return within_window;
        }

        self.last_seen.insert(key.to_string(), now);
        self.enforce_capacity();
        false
    }

    fn sweep_expired(&mut self, now: DateTime<Utc>) {
        let sweep_due = self
            .last_sweep
            .map(|last_sweep| now - last_sweep >= self.window)
            .unwrap_or(true);
        if !sweep_due {
            return;
        }

        let window = self.window;
        self.last_seen.retain(|_, seen_at| now - *seen_at < window);
        self.last_sweep = Some(now);
    }

    fn enforce_capacity(&mut self) {
        while self.last_seen.len() > self.max_entries {
            let Some(oldest_key) = self
                .last_seen
                .iter()
                .min_by_key(|(_, seen_at)| **seen_at)
                .map(|(key, _)| key.clone())
            else {
                return;
            };
            self.last_seen.remove(&oldest_key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{dedupe_key, Deduplicator};
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn builds_pipe_separated_key() {
        assert_eq!(
            dedupe_key(3, "ALFA", "Player1", "T-90M", "destroyed"),
            "3|ALFA|Player1|T-90M|destroyed"
        );
    }

    #[test]
    fn suppresses_repeat_inside_window_only() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let mut deduplicator = Deduplicator::new(Duration::seconds(3), 16);

        assert!(!deduplicator.should_suppress("a", start));
        assert!(deduplicator.should_suppress("a", start + Duration::milliseconds(500)));
        assert!(!deduplicator.should_suppress("b", start + Duration::milliseconds(600)));
        assert!(!deduplicator.should_suppress("a", start + Duration::seconds(10)));
    }

    #[test]
    fn repeated_delivery_keeps_extending_the_window() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let mut deduplicator = Deduplicator::new(Duration::seconds(3), 16);

        assert!(!deduplicator.should_suppress("a", start));
        assert!(deduplicator.should_suppress("a", start + Duration::seconds(2)));
        assert!(deduplicator.should_suppress("a", start + Duration::seconds(4)));
    }

    #[test]
    fn expired_entries_are_evicted() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let mut deduplicator = Deduplicator::new(Duration::seconds(3), 16);

        deduplicator.should_suppress("a", start);
        deduplicator.should_suppress("b", start + Duration::seconds(1));
        deduplicator.should_suppress("c", start + Duration::seconds(5));

        assert_eq!(deduplicator.len(), 1);
    }

    #[test]
    fn count_ceiling_drops_oldest_keys() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let mut deduplicator = Deduplicator::new(Duration::seconds(60), 2);

        deduplicator.should_suppress("first", start);
        deduplicator.should_suppress("second", start + Duration::milliseconds(10));
        deduplicator.should_suppress("third", start + Duration::milliseconds(20));

        assert_eq!(deduplicator.len(), 2);
        assert!(!deduplicator.should_suppress("first", start + Duration::milliseconds(30)));
    }
}
