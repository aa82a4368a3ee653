//! Sync event types and EventBus
//!
//! The orchestrator reports progress here; the HTTP shell and tests
//! subscribe. Emission never blocks and never fails the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Sync progress events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    /// Worker accepted a trigger and began a pass
    PassStarted {
        pass: u64,
        timestamp: DateTime<Utc>,
    },

    /// A provider's menu was fetched and its association replaced
    ProviderCrawled {
        provider_id: String,
        beverage_count: usize,
        discovered: usize,
    },

    /// A provider's crawl failed; prior association left untouched
    ProviderFailed {
        provider_id: String,
        error: String,
    },

    /// A beverage went through the metadata sources
    BeverageEnriched {
        display_name: String,
        persisted: bool,
    },

    /// Pass finished (possibly early, on a fatal error)
    PassCompleted {
        pass: u64,
        error_count: usize,
        fatal: bool,
        timestamp: DateTime<Utc>,
    },

    /// Garbage collector removed stale unreferenced beverages
    GarbageCollected {
        removed: u64,
    },
}

/// Broadcast bus for [`SyncEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_emitted_event() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();

        bus.emit_lossy(SyncEvent::GarbageCollected { removed: 3 });

        assert_eq!(
            rx.recv().await.unwrap(),
            SyncEvent::GarbageCollected { removed: 3 }
        );
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
        bus.emit_lossy(SyncEvent::GarbageCollected { removed: 0 });
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_value(SyncEvent::ProviderFailed {
            provider_id: "frisco".to_string(),
            error: "timeout".to_string(),
        })
        .unwrap();
        assert_eq!(json["type"], "ProviderFailed");
        assert_eq!(json["provider_id"], "frisco");
    }
}
