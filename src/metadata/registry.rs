//! Metadata Registry
//!
//! In-memory registry of stored files and node health. Every operation is a
//! single map access: atomic per key, no I/O, never held across an await.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;

use super::models::{FileSummary, NodeStatus, StoredFile};
use crate::domain::ports::NodeId;

/// Registry of file layouts and node statuses.
///
/// Shared by the distributor, the node monitor and the controller through an
/// `Arc`; there is no global instance.
#[derive(Debug, Default)]
pub struct MetadataRegistry {
    files: DashMap<String, Arc<StoredFile>>,
    nodes: DashMap<NodeId, NodeStatus>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Files
    // =========================================================================

    /// Insert or overwrite a file layout.
    pub fn save_stored_file(&self, file: StoredFile) {
        debug!(file_id = %file.file_id, stripes = file.stripes.len(), "Saving file layout");
        self.files.insert(file.file_id.clone(), Arc::new(file));
    }

    pub fn get_stored_file(&self, file_id: &str) -> Option<Arc<StoredFile>> {
        self.files.get(file_id).map(|f| Arc::clone(f.value()))
    }

    /// Remove a file layout. Removing an unknown id is a no-op.
    pub fn remove_file(&self, file_id: &str) -> Option<Arc<StoredFile>> {
        self.files.remove(file_id).map(|(_, file)| file)
    }

    /// Files whose name contains `name_filter` (case-insensitive), oldest
    /// first.
    pub fn list_stored_files(&self, name_filter: Option<&str>) -> Vec<Arc<StoredFile>> {
        let needle = name_filter
            .filter(|f| !f.is_empty())
            .map(str::to_lowercase);

        let mut files: Vec<Arc<StoredFile>> = self
            .files
            .iter()
            .filter(|entry| match &needle {
                Some(needle) => entry.value().file_name.to_lowercase().contains(needle),
                None => true,
            })
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        files.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.file_id.cmp(&b.file_id))
        });
        files
    }

    pub fn list_file_summaries(&self, name_filter: Option<&str>) -> Vec<FileSummary> {
        self.list_stored_files(name_filter)
            .iter()
            .map(|f| f.summary())
            .collect()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    // =========================================================================
    // Nodes
    // =========================================================================

    /// Record a probe outcome for a node, creating its status on first sight.
    ///
    /// Returns the previous `active` value, or `None` for a node seen for the
    /// first time.
    pub fn update_node_status(&self, node_id: &NodeId, active: bool) -> Option<bool> {
        let mut previous = None;
        self.nodes
            .entry(node_id.clone())
            .and_modify(|status| {
                previous = Some(status.active);
                status.active = active;
                status.last_response_time = Utc::now();
            })
            .or_insert_with(|| NodeStatus::new(node_id.clone(), active));
        previous
    }

    /// Set the block count a node reported. Unknown nodes are ignored.
    pub fn set_stored_block_count(&self, node_id: &NodeId, count: u64) {
        if let Some(mut status) = self.nodes.get_mut(node_id) {
            status.stored_block_count = count;
        }
    }

    pub fn node_status(&self, node_id: &NodeId) -> Option<NodeStatus> {
        self.nodes.get(node_id).map(|s| s.value().clone())
    }

    /// All node statuses ordered by node id.
    pub fn list_node_statuses(&self) -> Vec<NodeStatus> {
        let mut statuses: Vec<NodeStatus> =
            self.nodes.iter().map(|e| e.value().clone()).collect();
        statuses.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        statuses
    }
}
