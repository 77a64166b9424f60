//! Sync notifications.
//!
//! Events are fire-and-forget: they go out on a broadcast channel and a
//! subscriber that lags behind loses the oldest ones. Unsubscribe by dropping
//! the receiver.

use crate::operation::{OperationId, OperationKind};
use crate::{RecordId, TableName};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// What started a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncTrigger {
    /// Connectivity came back
    Reconnect,
    /// The user asked to sync now
    Manual,
    /// The periodic timer fired
    Periodic,
    /// The user asked to reload everything from the remote
    Reload,
    /// A write was queued behind others while online
    Queued,
}

/// Notifications published by the sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SyncEvent {
    /// A drain or refresh started
    SyncStarted { trigger: SyncTrigger },
    /// A drain or refresh finished
    SyncCompleted { successful: usize, failed: usize },
    /// A write reached the remote directly
    SavedToRemote {
        table: TableName,
        operation: OperationKind,
        id: RecordId,
    },
    /// The remote call failed; the write is queued
    SavedPending {
        table: TableName,
        operation: OperationKind,
    },
    /// Offline; the write is queued without trying the remote
    SavedOffline {
        table: TableName,
        operation: OperationKind,
    },
    /// The remote refused a write; it is held until discarded or retried
    OperationRejected {
        op_id: OperationId,
        table: TableName,
        operation: OperationKind,
        id: RecordId,
        reason: String,
    },
    /// A write kept failing and is no longer retried automatically
    RetryLimitReached {
        op_id: OperationId,
        table: TableName,
        operation: OperationKind,
        id: RecordId,
        attempts: u32,
    },
    /// The effective connectivity changed
    ConnectivityChanged { online: bool },
}

/// In-process broadcast of [`SyncEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Publish to whoever is listening. Nobody listening is fine.
    pub fn publish(&self, event: SyncEvent) {
        tracing::trace!(?event, "sync event");
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_to_every_subscriber() {
        let bus = EventBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(SyncEvent::SyncCompleted {
            successful: 1,
            failed: 0,
        });

        for rx in [&mut a, &mut b] {
            assert_eq!(
                rx.recv().await.unwrap(),
                SyncEvent::SyncCompleted {
                    successful: 1,
                    failed: 0
                }
            );
        }
    }

    #[test]
    fn publish_without_subscribers() {
        let bus = EventBus::default();
        bus.publish(SyncEvent::ConnectivityChanged { online: false });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn dropping_receiver_unsubscribes() {
        let bus = EventBus::default();
        let rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(rx);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn wire_names() {
        let event = SyncEvent::SavedToRemote {
            table: "subscribers".into(),
            operation: OperationKind::Update,
            id: "m1".into(),
        };
        let text = serde_json::to_string(&event).unwrap();
        assert_eq!(
            text,
            r#"{"type":"saved-to-remote","table":"subscribers","operation":"update","id":"m1"}"#
        );

        let text = serde_json::to_string(&SyncEvent::SyncStarted {
            trigger: SyncTrigger::Reconnect,
        })
        .unwrap();
        assert_eq!(text, r#"{"type":"sync-started","trigger":"reconnect"}"#);
    }
}
