//! Cluster Events
//!
//! Immutable records of significant occurrences in the cluster: node health
//! transitions, file lifecycle, block recovery and data loss.
//!
//! # Example
//!
//! ```ignore
//! let event = ClusterEvent::node_lost("http://10.0.0.5:8001", "connection refused");
//! event_publisher.publish(event).await?;
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cluster event representing a significant occurrence in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClusterEvent {
    // =========================================================================
    // Node Events
    // =========================================================================
    /// A node stopped answering probes or failed validation.
    NodeLost {
        node_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A node that had been marked inactive answers again.
    NodeRecovered {
        node_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A node answered but reports a block size or capacity that differs
    /// from the cluster reference.
    NodeConfigMismatch {
        node_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    // =========================================================================
    // File Events
    // =========================================================================
    /// A file was striped across the cluster.
    FileStored {
        file_id: String,
        file_name: String,
        stripes: usize,
        nodes: usize,
        degraded: bool,
        timestamp: DateTime<Utc>,
    },

    /// A file and its blocks were deleted.
    FileDeleted {
        file_id: String,
        timestamp: DateTime<Utc>,
    },

    // =========================================================================
    // Block Events
    // =========================================================================
    /// A block could not be written to its node.
    BlockWriteFailed {
        file_id: String,
        block_id: String,
        node_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A missing block was recovered from parity.
    BlockRecovered {
        file_id: String,
        stripe_index: u64,
        block_id: String,
        node_id: String,
        healed: bool,
        timestamp: DateTime<Utc>,
    },

    /// A stripe lost more than one block and its data was omitted.
    StripeUnrecoverable {
        file_id: String,
        stripe_index: u64,
        missing_positions: Vec<usize>,
        timestamp: DateTime<Utc>,
    },
}

impl ClusterEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ClusterEvent::NodeLost { timestamp, .. } => *timestamp,
            ClusterEvent::NodeRecovered { timestamp, .. } => *timestamp,
            ClusterEvent::NodeConfigMismatch { timestamp, .. } => *timestamp,
            ClusterEvent::FileStored { timestamp, .. } => *timestamp,
            ClusterEvent::FileDeleted { timestamp, .. } => *timestamp,
            ClusterEvent::BlockWriteFailed { timestamp, .. } => *timestamp,
            ClusterEvent::BlockRecovered { timestamp, .. } => *timestamp,
            ClusterEvent::StripeUnrecoverable { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            ClusterEvent::NodeLost { .. } => "NodeLost",
            ClusterEvent::NodeRecovered { .. } => "NodeRecovered",
            ClusterEvent::NodeConfigMismatch { .. } => "NodeConfigMismatch",
            ClusterEvent::FileStored { .. } => "FileStored",
            ClusterEvent::FileDeleted { .. } => "FileDeleted",
            ClusterEvent::BlockWriteFailed { .. } => "BlockWriteFailed",
            ClusterEvent::BlockRecovered { .. } => "BlockRecovered",
            ClusterEvent::StripeUnrecoverable { .. } => "StripeUnrecoverable",
        }
    }

    /// Get the file ID if applicable.
    pub fn file_id(&self) -> Option<&str> {
        match self {
            ClusterEvent::FileStored { file_id, .. } => Some(file_id),
            ClusterEvent::FileDeleted { file_id, .. } => Some(file_id),
            ClusterEvent::BlockWriteFailed { file_id, .. } => Some(file_id),
            ClusterEvent::BlockRecovered { file_id, .. } => Some(file_id),
            ClusterEvent::StripeUnrecoverable { file_id, .. } => Some(file_id),
            _ => None,
        }
    }

    /// Get the node ID if applicable.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            ClusterEvent::NodeLost { node_id, .. } => Some(node_id),
            ClusterEvent::NodeRecovered { node_id, .. } => Some(node_id),
            ClusterEvent::NodeConfigMismatch { node_id, .. } => Some(node_id),
            ClusterEvent::BlockWriteFailed { node_id, .. } => Some(node_id),
            ClusterEvent::BlockRecovered { node_id, .. } => Some(node_id),
            _ => None,
        }
    }

    // =========================================================================
    // Constructors
    // =========================================================================

    /// Create a NodeLost event.
    pub fn node_lost(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        ClusterEvent::NodeLost {
            node_id: node_id.into(),
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a NodeRecovered event.
    pub fn node_recovered(node_id: impl Into<String>) -> Self {
        ClusterEvent::NodeRecovered {
            node_id: node_id.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a NodeConfigMismatch event.
    pub fn node_config_mismatch(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        ClusterEvent::NodeConfigMismatch {
            node_id: node_id.into(),
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a FileStored event.
    pub fn file_stored(
        file_id: impl Into<String>,
        file_name: impl Into<String>,
        stripes: usize,
        nodes: usize,
        degraded: bool,
    ) -> Self {
        ClusterEvent::FileStored {
            file_id: file_id.into(),
            file_name: file_name.into(),
            stripes,
            nodes,
            degraded,
            timestamp: Utc::now(),
        }
    }

    /// Create a FileDeleted event.
    pub fn file_deleted(file_id: impl Into<String>) -> Self {
        ClusterEvent::FileDeleted {
            file_id: file_id.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a BlockWriteFailed event.
    pub fn block_write_failed(
        file_id: impl Into<String>,
        block_id: impl Into<String>,
        node_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ClusterEvent::BlockWriteFailed {
            file_id: file_id.into(),
            block_id: block_id.into(),
            node_id: node_id.into(),
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a BlockRecovered event.
    pub fn block_recovered(
        file_id: impl Into<String>,
        stripe_index: u64,
        block_id: impl Into<String>,
        node_id: impl Into<String>,
        healed: bool,
    ) -> Self {
        ClusterEvent::BlockRecovered {
            file_id: file_id.into(),
            stripe_index,
            block_id: block_id.into(),
            node_id: node_id.into(),
            healed,
            timestamp: Utc::now(),
        }
    }

    /// Create a StripeUnrecoverable event.
    pub fn stripe_unrecoverable(
        file_id: impl Into<String>,
        stripe_index: u64,
        missing_positions: Vec<usize>,
    ) -> Self {
        ClusterEvent::StripeUnrecoverable {
            file_id: file_id.into(),
            stripe_index,
            missing_positions,
            timestamp: Utc::now(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_and_ids() {
        let event = ClusterEvent::block_recovered("file-1", 3, "file-1_stripe3_d0", "n1", true);

        assert_eq!(event.event_type(), "BlockRecovered");
        assert_eq!(event.file_id(), Some("file-1"));
        assert_eq!(event.node_id(), Some("n1"));

        let lost = ClusterEvent::node_lost("n2", "timeout");
        assert_eq!(lost.file_id(), None);
        assert_eq!(lost.node_id(), Some("n2"));
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = ClusterEvent::stripe_unrecoverable("file-1", 0, vec![1, 2]);
        let json = serde_json::to_string(&event).unwrap();

        assert!(json.contains("\"type\":\"StripeUnrecoverable\""));

        let back: ClusterEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_type(), "StripeUnrecoverable");
        assert_eq!(back.timestamp(), event.timestamp());
    }
}
