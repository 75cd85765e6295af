//! Push side of the tracker: fan-out of state changes to subscribers.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::epoch::EpochAdvance;
use crate::store::UnitStatus;

pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Notification {
    /// A parsed unit line. `verbose` is false for a repeat inside the dedupe
    /// window, which only asks consumers to refresh.
    Event {
        verbose: bool,
        epoch: u64,
        group: String,
        actor: String,
        unit: String,
        status: UnitStatus,
    },
    EpochAdvanced {
        epoch: u64,
    },
    EpochCooldown {
        #[serde(rename = "remainingSeconds")]
        remaining_seconds: u64,
    },
}

impl From<EpochAdvance> for Notification {
    fn from(advance: EpochAdvance) -> Self {
        match advance {
            EpochAdvance::Advanced { epoch } => Notification::EpochAdvanced { epoch },
            EpochAdvance::Cooldown { remaining_seconds } => {
                Notification::EpochCooldown { remaining_seconds }
            }
        }
    }
}

/// Each subscriber reads from a bounded ring. Publishing never waits: a
/// subscriber that falls more than `capacity` messages behind loses the
/// oldest ones and sees `RecvError::Lagged` on its next receive.
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    pub fn publish(&self, notification: Notification) {
        if self.sender.send(notification).is_err() {
            tracing::trace!("No notification subscribers connected");
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_NOTIFICATION_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::{Notification, Notifier};
    use crate::epoch::EpochAdvance;
    use crate::store::UnitStatus;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    #[test]
    fn serializes_with_type_tag() {
        let event = Notification::Event {
            verbose: true,
            epoch: 2,
            group: "ALFA".to_string(),
            actor: "Player1".to_string(),
            unit: "T-90M".to_string(),
            status: UnitStatus::Destroyed,
        };

        assert_eq!(
            serde_json::to_value(&event).expect("Expected event to serialize"),
            serde_json::json!({
                "type": "event",
                "verbose": true,
                "epoch": 2,
                "group": "ALFA",
                "actor": "Player1",
                "unit": "T-90M",
                "status": "destroyed"
            })
        );
        assert_eq!(
            serde_json::to_value(Notification::from(EpochAdvance::Cooldown {
                remaining_seconds: 4
            }))
            .expect("Expected cooldown to serialize"),
            serde_json::json!({"type": "epochCooldown", "remainingSeconds": 4})
        );
        assert_eq!(
            serde_json::to_value(Notification::from(EpochAdvance::Advanced { epoch: 3 }))
                .expect("Expected advance to serialize"),
            serde_json::json!({"type": "epochAdvanced", "epoch": 3})
        );
    }

    #[test]
    fn publishing_without_subscribers_is_harmless() {
        let notifier = Notifier::new(4);

        notifier.publish(Notification::EpochAdvanced { epoch: 1 });

        let mut late = notifier.subscribe();
        assert!(matches!(late.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn every_subscriber_receives_each_notification() {
        let notifier = Notifier::new(8);
        let mut first = notifier.subscribe();
        let mut second = notifier.subscribe();

        notifier.publish(Notification::EpochAdvanced { epoch: 1 });

        assert_eq!(
            first.recv().await.expect("Expected first subscriber to receive"),
            Notification::EpochAdvanced { epoch: 1 }
        );
        assert_eq!(
            second.recv().await.expect("Expected second subscriber to receive"),
            Notification::EpochAdvanced { epoch: 1 }
        );
    }

    #[tokio::test]
    async fn slow_subscriber_loses_oldest_without_blocking_publisher() {
        let notifier = Notifier::new(2);
        let mut slow = notifier.subscribe();

        for epoch in 1..=5 {
            notifier.publish(Notification::EpochAdvanced { epoch });
        }

        assert!(matches!(slow.recv().await, Err(RecvError::Lagged(3))));
        assert_eq!(
            slow.recv().await.expect("Expected newest notifications to remain"),
            Notification::EpochAdvanced { epoch: 4 }
        );
        assert_eq!(
            slow.recv().await.expect("Expected newest notifications to remain"),
            Notification::EpochAdvanced { epoch: 5 }
        );
        assert!(matches!(slow.try_recv(), Err(TryRecvError::Empty)));
    }
}
