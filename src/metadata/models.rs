//! Metadata Models
//!
//! Records owned by the metadata registry: stored file layouts and node
//! health.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::ports::NodeId;
use crate::raid::stripe::Stripe;

// =============================================================================
// Stored File
// =============================================================================

/// Layout of a distributed file.
///
/// Stripes hold detached blocks: ids, types, lengths and checksums plus the
/// node of every position, but no payloads.
#[derive(Debug, Clone)]
pub struct StoredFile {
    /// UUID v4 assigned at upload
    pub file_id: String,

    /// Name supplied by the uploader
    pub file_name: String,

    /// Cluster block size at upload time
    pub block_size: usize,

    /// Upload time
    pub created_at: DateTime<Utc>,

    /// Stored with fewer nodes than the canonical stripe width
    pub degraded: bool,

    /// Blocks whose store failed after retries
    pub failed_writes: Vec<String>,

    /// Stripes in index order
    pub stripes: Vec<Stripe>,
}

impl StoredFile {
    pub fn new(file_id: impl Into<String>, file_name: impl Into<String>, block_size: usize) -> Self {
        Self {
            file_id: file_id.into(),
            file_name: file_name.into(),
            block_size,
            created_at: Utc::now(),
            degraded: false,
            failed_writes: Vec::new(),
            stripes: Vec::new(),
        }
    }

    /// Number of blocks over all stripes.
    pub fn block_count(&self) -> usize {
        self.stripes.iter().map(Stripe::total_blocks).sum()
    }

    /// Bytes of data (padding included) the file reconstructs to.
    pub fn data_len(&self) -> usize {
        self.stripes
            .iter()
            .map(|s| s.data_block_count() * self.block_size)
            .sum()
    }

    /// Whether any stripe places a block on `node`.
    pub fn uses_node(&self, node: &NodeId) -> bool {
        self.stripes.iter().any(|s| s.nodes().contains(node))
    }

    pub fn summary(&self) -> FileSummary {
        FileSummary {
            file_id: self.file_id.clone(),
            file_name: self.file_name.clone(),
        }
    }
}

/// Entry of a file listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSummary {
    pub file_id: String,
    pub file_name: String,
}

// =============================================================================
// Node Status
// =============================================================================

/// Last known health of a node, maintained by the node monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    pub node_id: NodeId,
    pub active: bool,
    pub last_response_time: DateTime<Utc>,
    pub stored_block_count: u64,
}

impl NodeStatus {
    pub fn new(node_id: NodeId, active: bool) -> Self {
        Self {
            node_id,
            active,
            last_response_time: Utc::now(),
            stored_block_count: 0,
        }
    }
}
