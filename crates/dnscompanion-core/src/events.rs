//! Event bus (§4.9).
//!
//! Typed in-process publish/subscribe, constructible and injectable (not a hidden
//! module-level singleton). One misbehaving subscriber must not block others — each
//! subscriber gets its own bounded channel, and a full subscriber queue only drops and
//! warns for that subscriber rather than blocking the publisher.

use crate::model::{Container, DnsRecord};
use crate::reconciler::Stats;
use std::sync::RwLock;
use tokio::sync::mpsc;

/// All event variants observers may subscribe to.
#[derive(Debug, Clone)]
pub enum ReconcileEvent {
    RouterSnapshot(std::collections::HashSet<String>),
    ContainerStarted(Container),
    ContainerStopped(String),
    DesiredRecordsUpdated(usize),
    RecordCreated(DnsRecord),
    RecordUpdated(DnsRecord),
    RecordDeleted { provider_id: String, external_id: String },
    Completed(Stats),
    Error { hostname: String, message: String },
    SystemStarted,
    SystemShutdown,
}

const SUBSCRIBER_CAPACITY: usize = 256;

/// In-process publish/subscribe hub. One instance per process, built explicitly by the
/// `Scheduler` and passed to every component that needs to emit or observe events.
pub struct EventBus {
    subscribers: RwLock<Vec<mpsc::Sender<ReconcileEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Registers a new subscriber and returns its receiver.
    pub fn subscribe(&self) -> mpsc::Receiver<ReconcileEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        self.subscribers.write().expect("event bus lock poisoned").push(tx);
        rx
    }

    /// Publish to every subscriber. A subscriber whose queue is full is warned about and
    /// skipped — it never blocks delivery to the others.
    pub fn publish(&self, event: ReconcileEvent) {
        let subscribers = self.subscribers.read().expect("event bus lock poisoned");
        for sub in subscribers.iter() {
            if let Err(mpsc::error::TrySendError::Full(_)) = sub.try_send(event.clone()) {
                tracing::warn!("event subscriber backpressured; dropping event for this subscriber");
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn published_events_reach_all_subscribers() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(ReconcileEvent::SystemStarted);

        assert!(matches!(rx1.recv().await, Some(ReconcileEvent::SystemStarted)));
        assert!(matches!(rx2.recv().await, Some(ReconcileEvent::SystemStarted)));
    }

    #[tokio::test]
    async fn a_full_subscriber_does_not_block_others() {
        let bus = EventBus::new();
        let _rx1 = bus.subscribe(); // never drained
        let mut rx2 = bus.subscribe();

        for _ in 0..(SUBSCRIBER_CAPACITY + 10) {
            bus.publish(ReconcileEvent::SystemStarted);
        }

        assert!(matches!(rx2.recv().await, Some(ReconcileEvent::SystemStarted)));
    }
}
