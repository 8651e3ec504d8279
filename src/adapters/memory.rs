//! In-Memory Cluster Adapter
//!
//! Implements the `NodeTransport` port with every node held in process
//! memory. Used by tests and local runs; supports fault injection (node
//! outages, misreported configuration, write failures, corrupted blocks).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::domain::ports::{
    NodeDescriptor, NodeId, NodeReport, NodeTransport, StoredBlockInfo, StoredBlockKind,
};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
struct StoredEntry {
    payload: Bytes,
    modified: DateTime<Utc>,
}

#[derive(Debug)]
struct MemoryNode {
    block_size: u64,
    capacity_bytes: u64,
    reports_active: bool,
    down: bool,
    /// Remaining store calls that fail
    failing_writes: usize,
    blocks: HashMap<String, StoredEntry>,
}

impl MemoryNode {
    fn used_bytes(&self) -> u64 {
        self.blocks.values().map(|e| e.payload.len() as u64).sum()
    }
}

/// In-process cluster of storage nodes.
#[derive(Debug, Default)]
pub struct MemoryCluster {
    nodes: DashMap<NodeId, MemoryNode>,
    store_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cluster holding one empty node per descriptor.
    pub fn with_nodes(descriptors: &[NodeDescriptor]) -> Self {
        let cluster = Self::new();
        for descriptor in descriptors {
            cluster.add_node(descriptor);
        }
        cluster
    }

    pub fn add_node(&self, descriptor: &NodeDescriptor) {
        self.nodes.insert(
            descriptor.id.clone(),
            MemoryNode {
                block_size: descriptor.block_size,
                capacity_bytes: descriptor.capacity_bytes,
                reports_active: true,
                down: false,
                failing_writes: 0,
                blocks: HashMap::new(),
            },
        );
    }

    // =========================================================================
    // Fault Injection
    // =========================================================================

    /// Take a node offline or bring it back. Blocks survive the outage.
    pub fn set_down(&self, node: &NodeId, down: bool) {
        if let Some(mut n) = self.nodes.get_mut(node) {
            n.down = down;
        }
    }

    /// Change the block size a node reports.
    pub fn set_reported_block_size(&self, node: &NodeId, block_size: u64) {
        if let Some(mut n) = self.nodes.get_mut(node) {
            n.block_size = block_size;
        }
    }

    /// Change the capacity a node reports and enforces.
    pub fn set_reported_capacity(&self, node: &NodeId, capacity_bytes: u64) {
        if let Some(mut n) = self.nodes.get_mut(node) {
            n.capacity_bytes = capacity_bytes;
        }
    }

    /// Change the `active` flag a node reports about itself.
    pub fn set_reported_active(&self, node: &NodeId, active: bool) {
        if let Some(mut n) = self.nodes.get_mut(node) {
            n.reports_active = active;
        }
    }

    /// Fail the next `count` store calls on a node.
    pub fn fail_writes(&self, node: &NodeId, count: usize) {
        if let Some(mut n) = self.nodes.get_mut(node) {
            n.failing_writes = count;
        }
    }

    /// Flip the first byte of a stored block. Returns false if absent or
    /// empty.
    pub fn corrupt_block(&self, node: &NodeId, block_id: &str) -> bool {
        let Some(mut n) = self.nodes.get_mut(node) else {
            return false;
        };
        match n.blocks.get_mut(block_id) {
            Some(entry) if !entry.payload.is_empty() => {
                let mut bytes = entry.payload.to_vec();
                bytes[0] ^= 0xFF;
                entry.payload = Bytes::from(bytes);
                true
            }
            _ => false,
        }
    }

    /// Drop a block as if its file had been lost on disk.
    pub fn remove_block(&self, node: &NodeId, block_id: &str) -> bool {
        self.nodes
            .get_mut(node)
            .map(|mut n| n.blocks.remove(block_id).is_some())
            .unwrap_or(false)
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn block(&self, node: &NodeId, block_id: &str) -> Option<Bytes> {
        self.nodes
            .get(node)
            .and_then(|n| n.blocks.get(block_id).map(|e| e.payload.clone()))
    }

    pub fn block_count(&self, node: &NodeId) -> usize {
        self.nodes.get(node).map(|n| n.blocks.len()).unwrap_or(0)
    }

    pub fn total_blocks(&self) -> usize {
        self.nodes.iter().map(|n| n.blocks.len()).sum()
    }

    /// Store calls received, successful or not.
    pub fn store_calls(&self) -> usize {
        self.store_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// Reach a node that is up, or fail the way a network call would.
    fn with_node<T>(&self, node: &NodeId, f: impl FnOnce(&mut MemoryNode) -> Result<T>) -> Result<T> {
        let mut n = self
            .nodes
            .get_mut(node)
            .ok_or_else(|| Error::node_io(node, "unknown node"))?;
        if n.down {
            return Err(Error::node_io(node, "connection refused"));
        }
        f(n.value_mut())
    }
}

fn kind_of(block_id: &str) -> StoredBlockKind {
    if block_id.ends_with("_p") {
        StoredBlockKind::Parity
    } else if block_id.contains("_d") {
        StoredBlockKind::Data
    } else {
        StoredBlockKind::Unknown
    }
}

#[async_trait]
impl NodeTransport for MemoryCluster {
    async fn store(&self, node: &NodeId, block_id: &str, payload: Bytes) -> Result<()> {
        self.store_calls.fetch_add(1, Ordering::SeqCst);
        self.with_node(node, |n| {
            if n.failing_writes > 0 {
                n.failing_writes -= 1;
                return Err(Error::node_io(node, "write failed"));
            }

            let replaced = n.blocks.get(block_id).map(|e| e.payload.len() as u64).unwrap_or(0);
            if n.used_bytes() - replaced + payload.len() as u64 > n.capacity_bytes {
                return Err(Error::node_io(node, "insufficient capacity"));
            }

            n.blocks.insert(
                block_id.to_string(),
                StoredEntry {
                    payload,
                    modified: Utc::now(),
                },
            );
            Ok(())
        })
    }

    async fn fetch(&self, node: &NodeId, block_id: &str) -> Result<Bytes> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.with_node(node, |n| {
            n.blocks
                .get(block_id)
                .map(|e| e.payload.clone())
                .ok_or_else(|| Error::NotFound(format!("block {} on {}", block_id, node)))
        })
    }

    async fn delete(&self, node: &NodeId, block_id: &str) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.with_node(node, |n| {
            n.blocks
                .remove(block_id)
                .map(|_| ())
                .ok_or_else(|| Error::NotFound(format!("block {} on {}", block_id, node)))
        })
    }

    async fn status(&self, node: &NodeId) -> Result<NodeReport> {
        self.with_node(node, |n| {
            Ok(NodeReport {
                active: n.reports_active,
                block_size: n.block_size,
                capacity_bytes: n.capacity_bytes,
                used_bytes: n.used_bytes(),
                stored_block_count: n.blocks.len() as u64,
            })
        })
    }

    async fn detailed_status(&self, node: &NodeId) -> Result<Vec<StoredBlockInfo>> {
        self.with_node(node, |n| {
            let mut blocks: Vec<StoredBlockInfo> = n
                .blocks
                .iter()
                .map(|(id, entry)| StoredBlockInfo {
                    block_id: id.clone(),
                    kind: kind_of(id),
                    size: entry.payload.len() as u64,
                    last_modified: entry.modified,
                })
                .collect();
            blocks.sort_by(|a, b| a.block_id.cmp(&b.block_id));
            Ok(blocks)
        })
    }
}
