use chrono::{DateTime, Duration, Utc};

use crate::store::{EpochCounterState, StateStore};

pub const DEFAULT_EPOCH_COOLDOWN_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochAdvance {
    Advanced { epoch: u64 },
    Cooldown { remaining_seconds: u64 },
}

/// Game counter. An advance is honoured only once `cooldown` has passed since
/// the previous one; earlier requests leave the state untouched.
#[derive(Debug, Clone)]
pub struct EpochCounter {
    state: EpochCounterState,
    cooldown: Duration,
}

impl EpochCounter {
    pub fn new(cooldown: Duration) -> Self {
        Self::restore(EpochCounterState::default(), cooldown)
    }

    pub fn restore(state: EpochCounterState, cooldown: Duration) -> Self {
        Self { state, cooldown }
    }

    pub fn state(&self) -> EpochCounterState {
        self.state
    }

    pub fn current_epoch(&self) -> u64 {
        self.state.current_epoch
    }

    pub fn request_advance(
        &mut self,
        store: &mut StateStore,
        now: DateTime<Utc>,
    ) -> EpochAdvance {
        let advance = self.advance(now);
        if matches!(advance, EpochAdvance::Advanced { .. }) {
            store.set_epoch_state(self.state);
        }
        advance
    }

    fn advance(&mut self, now: DateTime<Utc>) -> EpochAdvance {
        if let Some(remaining) = self.cooldown_remaining(now) {
            return EpochAdvance::Cooldown {
                remaining_seconds: whole_seconds_rounded_up(remaining),
            };
        }

        self.state.current_epoch = self.state.current_epoch.saturating_add(1);
        self.state.last_advance_time = Some(now);
        EpochAdvance::Advanced {
            epoch: self.state.current_epoch,
        }
    }

    fn cooldown_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        let last_advance_time = self.state.last_advance_time?;
        let elapsed = now - last_advance_time;
        if elapsed >= self.cooldown {
            return None;
        }

        let remaining = self.cooldown - elapsed.max(Duration::zero());
        Some(remaining)
    }
}

fn whole_seconds_rounded_up(duration: Duration) -> u64 {
    let milliseconds = duration.num_milliseconds().max(0) as u64;
    milliseconds.div_ceil(1_000).max(1)
}

#[cfg(test)]
mod tests {
    use super::{EpochAdvance, EpochCounter};
    use crate::store::{EpochCounterState, StateStore};
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn first_request_advances_from_zero() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let mut store = StateStore::in_memory();
        let mut counter = EpochCounter::new(Duration::seconds(10));

        assert_eq!(
            counter.request_advance(&mut store, now),
            EpochAdvance::Advanced { epoch: 1 }
        );
        assert_eq!(store.current_epoch(), 1);
        assert_eq!(store.epoch_state().last_advance_time, Some(now));
    }

    #[test]
    fn requests_inside_cooldown_advance_once() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let mut store = StateStore::in_memory();
        let mut counter = EpochCounter::new(Duration::seconds(10));

        assert_eq!(
            counter.request_advance(&mut store, now),
            EpochAdvance::Advanced { epoch: 1 }
        );
        assert_eq!(
            counter.request_advance(&mut store, now + Duration::milliseconds(3_500)),
            EpochAdvance::Cooldown {
                remaining_seconds: 7
            }
        );
        assert_eq!(counter.current_epoch(), 1);
        assert_eq!(store.epoch_state().last_advance_time, Some(now));

        assert_eq!(
            counter.request_advance(&mut store, now + Duration::seconds(10)),
            EpochAdvance::Advanced { epoch: 2 }
        );
        assert_eq!(store.current_epoch(), 2);
    }

    #[test]
    fn restored_state_keeps_its_cooldown() {
        let last_advance_time = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let mut store = StateStore::in_memory();
        let mut counter = EpochCounter::restore(
            EpochCounterState {
                current_epoch: 6,
                last_advance_time: Some(last_advance_time),
            },
            Duration::seconds(10),
        );

        assert_eq!(
            counter.request_advance(&mut store, last_advance_time + Duration::seconds(9)),
            EpochAdvance::Cooldown {
                remaining_seconds: 1
            }
        );
        assert_eq!(
            counter.request_advance(&mut store, last_advance_time + Duration::seconds(30)),
            EpochAdvance::Advanced { epoch: 7 }
        );
    }

    #[test]
    fn clock_going_backwards_reports_full_cooldown() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let mut store = StateStore::in_memory();
        let mut counter = EpochCounter::new(Duration::seconds(10));
        counter.request_advance(&mut store, now);

        assert_eq!(
            counter.request_advance(&mut store, now - Duration::seconds(5)),
            EpochAdvance::Cooldown {
                remaining_seconds: 10
            }
        );
    }
}
