//! Domain Ports (Port/Adapter Pattern)
//!
//! Core abstractions the striping engine depends on. Infrastructure adapters
//! implement these traits to provide concrete node access and event sinks.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Domain Layer                            │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                    │    │
//! │  │        NodeTransport        │     EventPublisher     │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                  Adapters (Impls)                    │    │
//! │  │ HttpNodeTransport │ MemoryCluster │ LoggingPublisher │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::events::ClusterEvent;
use crate::error::Result;

// =============================================================================
// Value Objects
// =============================================================================

/// Node identifier (value object).
///
/// For HTTP nodes this is the base URL of the node, e.g. `http://10.0.0.5:8001`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Static description of a configured node: its identity plus the block size
/// and capacity it is expected to report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub id: NodeId,
    pub block_size: u64,
    pub capacity_bytes: u64,
}

impl NodeDescriptor {
    pub fn new(id: impl Into<NodeId>, block_size: u64, capacity_bytes: u64) -> Self {
        Self {
            id: id.into(),
            block_size,
            capacity_bytes,
        }
    }
}

/// Status a node reports about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeReport {
    #[serde(default = "default_active")]
    pub active: bool,
    pub block_size: u64,
    pub capacity_bytes: u64,
    #[serde(default)]
    pub used_bytes: u64,
    #[serde(default, alias = "blockCount")]
    pub stored_block_count: u64,
}

fn default_active() -> bool {
    true
}

/// Kind of block as reported by a node's inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StoredBlockKind {
    Data,
    Parity,
    #[serde(other)]
    Unknown,
}

/// One entry of a node's detailed block inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredBlockInfo {
    pub block_id: String,
    #[serde(rename = "type")]
    pub kind: StoredBlockKind,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

// =============================================================================
// Node Transport Port
// =============================================================================

/// Port for block storage on remote disk nodes.
///
/// One transport serves every node; calls are addressed by [`NodeId`].
/// Implementations must bound every call with a timeout so that an
/// unresponsive node can never block a caller indefinitely.
#[async_trait]
pub trait NodeTransport: Send + Sync {
    /// Store `payload` under `block_id`, overwriting any previous content.
    async fn store(&self, node: &NodeId, block_id: &str, payload: Bytes) -> Result<()>;

    /// Fetch a block. Returns `Error::NotFound` if the node does not have it.
    async fn fetch(&self, node: &NodeId, block_id: &str) -> Result<Bytes>;

    /// Delete a block. Returns `Error::NotFound` if the node does not have it.
    async fn delete(&self, node: &NodeId, block_id: &str) -> Result<()>;

    /// Report block size, capacity and usage.
    async fn status(&self, node: &NodeId) -> Result<NodeReport>;

    /// List every block the node holds.
    async fn detailed_status(&self, node: &NodeId) -> Result<Vec<StoredBlockInfo>>;
}

// =============================================================================
// Event Publisher Port
// =============================================================================

/// Port for publishing cluster events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a cluster event.
    async fn publish(&self, event: ClusterEvent) -> Result<()>;

    /// Publish multiple events.
    async fn publish_all(&self, events: Vec<ClusterEvent>) -> Result<()>;
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id() {
        let id = NodeId::new("http://localhost:8001");
        assert_eq!(id.as_str(), "http://localhost:8001");
        assert_eq!(id.to_string(), "http://localhost:8001");
        assert_eq!(NodeId::from("a"), NodeId::from("a".to_string()));
    }

    #[test]
    fn test_node_report_wire_format() {
        let json = r#"{"active":true,"blockSize":4096,"capacityBytes":1048576,"usedBytes":8192,"blockCount":2}"#;
        let report: NodeReport = serde_json::from_str(json).unwrap();

        assert!(report.active);
        assert_eq!(report.block_size, 4096);
        assert_eq!(report.capacity_bytes, 1048576);
        assert_eq!(report.used_bytes, 8192);
        assert_eq!(report.stored_block_count, 2);
    }

    #[test]
    fn test_node_report_defaults() {
        let json = r#"{"blockSize":2,"capacityBytes":64}"#;
        let report: NodeReport = serde_json::from_str(json).unwrap();

        assert!(report.active);
        assert_eq!(report.used_bytes, 0);
        assert_eq!(report.stored_block_count, 0);
    }

    #[test]
    fn test_stored_block_info_wire_format() {
        let json = r#"[{"blockId":"f_stripe0_p","type":"PARITY","size":4096,"lastModified":"2024-05-01T10:00:00Z"},
                       {"blockId":"f_stripe0_d0","type":"weird","size":4096,"lastModified":"2024-05-01T10:00:00Z"}]"#;
        let blocks: Vec<StoredBlockInfo> = serde_json::from_str(json).unwrap();

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].kind, StoredBlockKind::Parity);
        assert_eq!(blocks[1].kind, StoredBlockKind::Unknown);
    }
}
