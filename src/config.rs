//! Cluster Configuration
//!
//! Typed configuration for the controller: the storage nodes and the
//! settings of the monitor, the distributor and the HTTP transport.

use std::collections::HashSet;
use std::time::Duration;

use crate::adapters::HttpNodeConfig;
use crate::domain::ports::{NodeDescriptor, NodeId};
use crate::error::{Error, Result};
use crate::monitor::NodeMonitorConfig;
use crate::raid::distributor::DistributorConfig;
use crate::raid::stripe::MIN_STRIPE_WIDTH;

/// Complete controller configuration
#[derive(Debug, Clone, Default)]
pub struct ClusterConfig {
    /// Storage nodes in stripe order. The first one is the cluster reference.
    pub nodes: Vec<NodeDescriptor>,

    pub monitor: NodeMonitorConfig,

    pub distributor: DistributorConfig,

    pub http: HttpNodeConfig,
}

impl ClusterConfig {
    /// Configuration for nodes that all share one block size and capacity.
    pub fn uniform<I, S>(endpoints: I, block_size: u64, capacity_bytes: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            nodes: endpoints
                .into_iter()
                .map(|e| NodeDescriptor::new(NodeId::new(e), block_size, capacity_bytes))
                .collect(),
            ..Default::default()
        }
    }

    /// Check the configuration before anything is started.
    pub fn validate(&self) -> Result<()> {
        let first = self
            .nodes
            .first()
            .ok_or_else(|| Error::Config("at least one storage node is required".to_string()))?;

        if first.block_size == 0 {
            return Err(Error::Config("block size must be positive".to_string()));
        }
        if first.capacity_bytes < first.block_size {
            return Err(Error::Config(format!(
                "node capacity {} is smaller than the block size {}",
                first.capacity_bytes, first.block_size
            )));
        }

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if node.id.as_str().trim().is_empty() {
                return Err(Error::Config("node id must not be empty".to_string()));
            }
            if !seen.insert(&node.id) {
                return Err(Error::Config(format!("node {} is configured twice", node.id)));
            }
            if node.block_size != first.block_size || node.capacity_bytes != first.capacity_bytes {
                return Err(Error::Config(format!(
                    "node {} is configured with block size {} and capacity {}, expected {} and {}",
                    node.id,
                    node.block_size,
                    node.capacity_bytes,
                    first.block_size,
                    first.capacity_bytes
                )));
            }
        }

        if self.monitor.poll_interval.is_zero() {
            return Err(Error::Config("poll interval must be positive".to_string()));
        }
        if self.monitor.probe_timeout.is_zero() {
            return Err(Error::Config("probe timeout must be positive".to_string()));
        }
        if self.http.request_timeout.is_zero() {
            return Err(Error::Config("request timeout must be positive".to_string()));
        }
        if self.distributor.canonical_width < MIN_STRIPE_WIDTH {
            return Err(Error::Config(format!(
                "canonical stripe width must be at least {}",
                MIN_STRIPE_WIDTH
            )));
        }

        Ok(())
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.monitor.poll_interval = interval;
        self
    }
}
