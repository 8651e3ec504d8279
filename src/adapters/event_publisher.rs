//! Event Publisher Adapters
//!
//! `LoggingEventPublisher` turns cluster events into structured log lines
//! for the controller daemon. `InMemoryEventCollector` keeps them for
//! inspection in tests.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::domain::events::ClusterEvent;
use crate::domain::ports::EventPublisher;
use crate::error::Result;

/// Writes each cluster event as one structured tracing record.
///
/// Node loss, rejected nodes, failed writes and lost stripes are logged at
/// warn. Node recovery and parity reconstruction are logged at info. File
/// lifecycle events are logged at debug.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventPublisher;

impl LoggingEventPublisher {
    /// Create a new logging event publisher.
    pub fn new() -> Self {
        Self
    }

    fn log(&self, event: &ClusterEvent) {
        match event {
            ClusterEvent::NodeLost { node_id, reason, .. } => {
                warn!(node = %node_id, reason = %reason, "Node lost");
            }
            ClusterEvent::NodeConfigMismatch { node_id, reason, .. } => {
                warn!(node = %node_id, reason = %reason, "Node rejected: configuration mismatch");
            }
            ClusterEvent::NodeRecovered { node_id, .. } => {
                info!(node = %node_id, "Node recovered");
            }
            ClusterEvent::FileStored {
                file_id,
                file_name,
                stripes,
                nodes,
                degraded,
                ..
            } => {
                debug!(
                    file = %file_id,
                    name = %file_name,
                    stripes,
                    nodes,
                    degraded,
                    "File stored"
                );
            }
            ClusterEvent::FileDeleted { file_id, .. } => {
                debug!(file = %file_id, "File deleted");
            }
            ClusterEvent::BlockWriteFailed {
                file_id,
                block_id,
                node_id,
                reason,
                ..
            } => {
                warn!(
                    file = %file_id,
                    block = %block_id,
                    node = %node_id,
                    reason = %reason,
                    "Block write failed"
                );
            }
            ClusterEvent::BlockRecovered {
                file_id,
                stripe_index,
                block_id,
                node_id,
                healed,
                ..
            } => {
                info!(
                    file = %file_id,
                    stripe = stripe_index,
                    block = %block_id,
                    node = %node_id,
                    healed,
                    "Block reconstructed from parity"
                );
            }
            ClusterEvent::StripeUnrecoverable {
                file_id,
                stripe_index,
                missing_positions,
                ..
            } => {
                warn!(
                    file = %file_id,
                    stripe = stripe_index,
                    missing = ?missing_positions,
                    "Stripe unrecoverable, data omitted"
                );
            }
        }
    }
}

#[async_trait]
impl EventPublisher for LoggingEventPublisher {
    async fn publish(&self, event: ClusterEvent) -> Result<()> {
        self.log(&event);
        Ok(())
    }

    async fn publish_all(&self, events: Vec<ClusterEvent>) -> Result<()> {
        events.iter().for_each(|event| self.log(event));
        Ok(())
    }
}

/// Keeps published cluster events in arrival order.
#[derive(Debug, Default)]
pub struct InMemoryEventCollector {
    events: parking_lot::RwLock<Vec<ClusterEvent>>,
}

impl InMemoryEventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// All collected events.
    pub fn events(&self) -> Vec<ClusterEvent> {
        self.events.read().clone()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Events of one kind, e.g. `"NodeLost"`.
    pub fn events_of_type(&self, event_type: &str) -> Vec<ClusterEvent> {
        self.filtered(|e| e.event_type() == event_type)
    }

    /// Events naming the given node.
    pub fn events_for_node(&self, node_id: &str) -> Vec<ClusterEvent> {
        self.filtered(|e| e.node_id() == Some(node_id))
    }

    /// Events naming the given file.
    pub fn events_for_file(&self, file_id: &str) -> Vec<ClusterEvent> {
        self.filtered(|e| e.file_id() == Some(file_id))
    }

    fn filtered(&self, keep: impl Fn(&ClusterEvent) -> bool) -> Vec<ClusterEvent> {
        self.events.read().iter().filter(|e| keep(*e)).cloned().collect()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventCollector {
    async fn publish(&self, event: ClusterEvent) -> Result<()> {
        self.events.write().push(event);
        Ok(())
    }

    async fn publish_all(&self, events: Vec<ClusterEvent>) -> Result<()> {
        self.events.write().extend(events);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn every_kind() -> Vec<ClusterEvent> {
        vec![
            ClusterEvent::node_lost("http://node-a:8001", "connection refused"),
            ClusterEvent::node_config_mismatch("http://node-b:8001", "block size 2048, expected 4096"),
            ClusterEvent::node_recovered("http://node-a:8001"),
            ClusterEvent::file_stored("f1", "a.txt", 2, 4, false),
            ClusterEvent::block_write_failed("f1", "f1_stripe0_d1", "http://node-c:8001", "timeout"),
            ClusterEvent::block_recovered("f1", 0, "f1_stripe0_d1", "http://node-c:8001", true),
            ClusterEvent::stripe_unrecoverable("f1", 1, vec![0, 2]),
            ClusterEvent::file_deleted("f1"),
        ]
    }

    #[tokio::test]
    async fn test_logging_publisher_accepts_every_event() {
        let publisher = LoggingEventPublisher::new();

        for event in every_kind() {
            publisher.publish(event).await.unwrap();
        }
        publisher.publish_all(every_kind()).await.unwrap();
    }

    #[tokio::test]
    async fn test_collector_keeps_arrival_order() {
        let collector = InMemoryEventCollector::new();
        assert!(collector.is_empty());

        collector.publish_all(every_kind()).await.unwrap();

        let kinds: Vec<_> = collector.events().iter().map(|e| e.event_type()).collect();
        assert_eq!(kinds.first(), Some(&"NodeLost"));
        assert_eq!(kinds.last(), Some(&"FileDeleted"));
        assert_eq!(collector.len(), 8);
    }

    #[tokio::test]
    async fn test_collector_filters_by_node_and_file() {
        let collector = InMemoryEventCollector::new();
        collector.publish_all(every_kind()).await.unwrap();

        assert_eq!(collector.events_of_type("NodeLost").len(), 1);
        assert_eq!(collector.events_for_node("http://node-a:8001").len(), 2);
        assert_eq!(collector.events_for_node("http://node-c:8001").len(), 2);
        assert_eq!(collector.events_for_file("f1").len(), 5);
        assert!(collector.events_for_file("f2").is_empty());
    }
}
