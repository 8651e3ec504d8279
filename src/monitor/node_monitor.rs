//! Node Monitor
//!
//! Polls every configured node on a fixed interval and publishes the set of
//! nodes that are reachable and share the cluster's block size and capacity.
//!
//! ```text
//!   tick ──▶ probe all nodes (concurrently, bounded) ──▶ registry updates
//!                                                   └──▶ snapshot swap
//!                                                   └──▶ events / recovery channel
//! ```
//!
//! Cycles never overlap: a cycle that overruns the interval delays the next
//! tick. Consumers of [`NodeMonitor::available_nodes`] always see the result
//! of the last completed cycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::RwLock;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::domain::events::ClusterEvent;
use crate::domain::ports::{EventPublisher, NodeDescriptor, NodeId, NodeReport, NodeTransport};
use crate::error::{Error, Result};
use crate::metadata::MetadataRegistry;
use crate::metrics;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the node monitor
#[derive(Debug, Clone)]
pub struct NodeMonitorConfig {
    /// Time between the start of two polling cycles
    pub poll_interval: Duration,

    /// Upper bound for a single status probe
    pub probe_timeout: Duration,
}

impl Default for NodeMonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(2),
        }
    }
}

/// Block size and capacity every participating node must report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterReference {
    pub block_size: u64,
    pub capacity_bytes: u64,
}

impl ClusterReference {
    /// Reference taken from the first configured node.
    pub fn from_first(nodes: &[NodeDescriptor]) -> Result<Self> {
        let first = nodes
            .first()
            .ok_or_else(|| Error::Config("no storage nodes configured".to_string()))?;
        Ok(Self {
            block_size: first.block_size,
            capacity_bytes: first.capacity_bytes,
        })
    }

    /// Check a node's report against the reference.
    pub fn validate(&self, node: &NodeId, report: &NodeReport) -> Result<()> {
        if report.block_size != self.block_size {
            return Err(Error::ConfigMismatch {
                node: node.to_string(),
                reason: format!(
                    "block size {} differs from cluster block size {}",
                    report.block_size, self.block_size
                ),
            });
        }
        if report.capacity_bytes != self.capacity_bytes {
            return Err(Error::ConfigMismatch {
                node: node.to_string(),
                reason: format!(
                    "capacity {} differs from cluster capacity {}",
                    report.capacity_bytes, self.capacity_bytes
                ),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Cycle Results
// =============================================================================

/// Outcome of one polling cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Nodes in the published snapshot, in configured order
    pub available: Vec<NodeId>,

    /// Nodes that became unavailable in this cycle
    pub lost: Vec<NodeId>,

    /// Previously inactive nodes that are available again
    pub recovered: Vec<NodeId>,
}

#[derive(Debug)]
enum ProbeOutcome {
    Available { stored_block_count: u64 },
    Unreachable(String),
    Inactive,
    Mismatch(String),
}

impl ProbeOutcome {
    fn is_available(&self) -> bool {
        matches!(self, ProbeOutcome::Available { .. })
    }
}

// =============================================================================
// Node Monitor
// =============================================================================

/// Periodic health checker and owner of the available-node snapshot.
pub struct NodeMonitor {
    config: NodeMonitorConfig,
    reference: ClusterReference,
    nodes: Vec<NodeId>,
    transport: Arc<dyn NodeTransport>,
    registry: Arc<MetadataRegistry>,
    publisher: Arc<dyn EventPublisher>,

    /// Last completed cycle's good set, replaced whole
    snapshot: RwLock<Arc<Vec<NodeId>>>,

    /// Held for the duration of a cycle
    cycle_lock: Mutex<()>,

    recovery_tx: Option<mpsc::Sender<NodeId>>,
    shutdown: AtomicBool,
    shutdown_notify: Notify,
}

impl NodeMonitor {
    /// Create a monitor for `nodes`. The first descriptor is the cluster
    /// reference. The snapshot is empty until the first cycle completes.
    pub fn new(
        config: NodeMonitorConfig,
        nodes: &[NodeDescriptor],
        transport: Arc<dyn NodeTransport>,
        registry: Arc<MetadataRegistry>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Result<Self> {
        let reference = ClusterReference::from_first(nodes)?;

        Ok(Self {
            config,
            reference,
            nodes: nodes.iter().map(|d| d.id.clone()).collect(),
            transport,
            registry,
            publisher,
            snapshot: RwLock::new(Arc::new(Vec::new())),
            cycle_lock: Mutex::new(()),
            recovery_tx: None,
            shutdown: AtomicBool::new(false),
            shutdown_notify: Notify::new(),
        })
    }

    /// Send nodes that come back after an outage on `tx`.
    pub fn with_recovery_channel(mut self, tx: mpsc::Sender<NodeId>) -> Self {
        self.recovery_tx = Some(tx);
        self
    }

    pub fn reference(&self) -> ClusterReference {
        self.reference
    }

    /// Configured nodes in configuration order.
    pub fn configured_nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Current available-node snapshot.
    pub fn available_nodes(&self) -> Arc<Vec<NodeId>> {
        Arc::clone(&self.snapshot.read())
    }

    /// Run polling cycles until [`shutdown`](Self::shutdown) is called.
    #[instrument(skip(self))]
    pub async fn run(self: Arc<Self>) {
        info!(
            nodes = self.nodes.len(),
            block_size = self.reference.block_size,
            capacity = self.reference.capacity_bytes,
            "Starting node monitor with {:?}",
            self.config
        );

        let mut tick = interval(self.config.poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            tokio::select! {
                _ = tick.tick() => {
                    self.run_cycle().await;
                }
                _ = self.shutdown_notify.notified() => {}
            }
        }

        info!("Node monitor shutting down");
    }

    /// Signal shutdown
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.shutdown_notify.notify_waiters();
    }

    /// Probe every node once, update the registry and swap the snapshot.
    ///
    /// Concurrent callers are serialized; probe failures never escape.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> CycleReport {
        let _cycle = self.cycle_lock.lock().await;

        let outcomes = join_all(self.nodes.iter().map(|node| self.probe(node))).await;

        let mut report = CycleReport::default();
        let mut events = Vec::new();

        for (node, outcome) in self.nodes.iter().zip(outcomes) {
            let previous = self.registry.update_node_status(node, outcome.is_available());

            match outcome {
                ProbeOutcome::Available { stored_block_count } => {
                    self.registry.set_stored_block_count(node, stored_block_count);
                    report.available.push(node.clone());

                    if previous == Some(false) {
                        info!(node = %node, "Node recovered");
                        report.recovered.push(node.clone());
                        events.push(ClusterEvent::node_recovered(node.as_str()));
                    }
                }
                ProbeOutcome::Unreachable(reason) => {
                    metrics::PROBE_FAILURES.with_label_values(&["unreachable"]).inc();
                    if previous != Some(false) {
                        warn!(node = %node, reason = %reason, "Node unreachable");
                        report.lost.push(node.clone());
                        events.push(ClusterEvent::node_lost(node.as_str(), reason));
                    }
                }
                ProbeOutcome::Inactive => {
                    metrics::PROBE_FAILURES.with_label_values(&["inactive"]).inc();
                    if previous != Some(false) {
                        warn!(node = %node, "Node reports itself inactive");
                        report.lost.push(node.clone());
                        events.push(ClusterEvent::node_lost(node.as_str(), "node reports inactive"));
                    }
                }
                ProbeOutcome::Mismatch(reason) => {
                    metrics::PROBE_FAILURES.with_label_values(&["config_mismatch"]).inc();
                    if previous != Some(false) {
                        warn!(node = %node, reason = %reason, "Node configuration mismatch");
                        report.lost.push(node.clone());
                        events.push(ClusterEvent::node_config_mismatch(node.as_str(), reason));
                    }
                }
            }
        }

        *self.snapshot.write() = Arc::new(report.available.clone());
        metrics::AVAILABLE_NODES.set(report.available.len() as i64);

        debug!(
            available = report.available.len(),
            configured = self.nodes.len(),
            "Monitor cycle complete"
        );

        if !events.is_empty() {
            if let Err(e) = self.publisher.publish_all(events).await {
                warn!("Failed to publish node events: {}", e);
            }
        }

        if let Some(tx) = &self.recovery_tx {
            for node in &report.recovered {
                if let Err(e) = tx.try_send(node.clone()) {
                    warn!(node = %node, "Failed to queue node rebuild: {}", e);
                }
            }
        }

        report
    }

    async fn probe(&self, node: &NodeId) -> ProbeOutcome {
        let status = tokio::time::timeout(self.config.probe_timeout, self.transport.status(node));

        match status.await {
            Err(_) => ProbeOutcome::Unreachable(format!(
                "probe timed out after {:?}",
                self.config.probe_timeout
            )),
            Ok(Err(e)) => ProbeOutcome::Unreachable(e.to_string()),
            Ok(Ok(report)) if !report.active => ProbeOutcome::Inactive,
            Ok(Ok(report)) => match self.reference.validate(node, &report) {
                Ok(()) => ProbeOutcome::Available {
                    stored_block_count: report.stored_block_count,
                },
                Err(Error::ConfigMismatch { reason, .. }) => ProbeOutcome::Mismatch(reason),
                Err(e) => ProbeOutcome::Mismatch(e.to_string()),
            },
        }
    }
}

impl std::fmt::Debug for NodeMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeMonitor")
            .field("config", &self.config)
            .field("reference", &self.reference)
            .field("nodes", &self.nodes)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryEventCollector, MemoryCluster};
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use bytes::Bytes;
    use crate::domain::ports::StoredBlockInfo;

    fn descriptors(n: usize) -> Vec<NodeDescriptor> {
        (0..n)
            .map(|i| NodeDescriptor::new(format!("node{}", i), 4096, 1 << 20))
            .collect()
    }

    struct Fixture {
        cluster: Arc<MemoryCluster>,
        registry: Arc<MetadataRegistry>,
        events: Arc<InMemoryEventCollector>,
        monitor: NodeMonitor,
        nodes: Vec<NodeId>,
    }

    fn fixture(n: usize) -> Fixture {
        let descriptors = descriptors(n);
        let cluster = Arc::new(MemoryCluster::with_nodes(&descriptors));
        let registry = Arc::new(MetadataRegistry::new());
        let events = Arc::new(InMemoryEventCollector::new());
        let monitor = NodeMonitor::new(
            NodeMonitorConfig::default(),
            &descriptors,
            cluster.clone(),
            registry.clone(),
            events.clone(),
        )
        .unwrap();

        Fixture {
            cluster,
            registry,
            events,
            monitor,
            nodes: descriptors.into_iter().map(|d| d.id).collect(),
        }
    }

    #[test]
    fn test_reference_from_first_node() {
        let mut nodes = descriptors(2);
        nodes[1].block_size = 512;

        let reference = ClusterReference::from_first(&nodes).unwrap();
        assert_eq!(reference.block_size, 4096);
        assert_matches!(ClusterReference::from_first(&[]), Err(Error::Config(_)));
    }

    #[tokio::test]
    async fn test_snapshot_empty_before_first_cycle() {
        let f = fixture(3);
        assert!(f.monitor.available_nodes().is_empty());

        let report = f.monitor.run_cycle().await;

        assert_eq!(report.available, f.nodes);
        assert_eq!(*f.monitor.available_nodes(), f.nodes);
        assert!(report.lost.is_empty());
        assert_eq!(f.registry.list_node_statuses().len(), 3);
    }

    #[tokio::test]
    async fn test_block_size_mismatch_is_excluded() {
        let f = fixture(4);
        f.cluster.set_reported_block_size(&f.nodes[2], 2048);

        let report = f.monitor.run_cycle().await;

        assert_eq!(report.available, vec![f.nodes[0].clone(), f.nodes[1].clone(), f.nodes[3].clone()]);
        assert!(!f.registry.node_status(&f.nodes[2]).unwrap().active);
        assert_eq!(f.events.events_of_type("NodeConfigMismatch").len(), 1);
    }

    #[tokio::test]
    async fn test_capacity_mismatch_is_excluded() {
        let f = fixture(3);
        f.cluster.set_reported_capacity(&f.nodes[2], 2 << 20);

        let report = f.monitor.run_cycle().await;

        assert_eq!(report.available, vec![f.nodes[0].clone(), f.nodes[1].clone()]);
        assert!(!f.registry.node_status(&f.nodes[2]).unwrap().active);
        let mismatches = f.events.events_of_type("NodeConfigMismatch");
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].node_id(), Some(f.nodes[2].as_str()));
    }

    #[tokio::test]
    async fn test_inactive_and_down_nodes_are_excluded() {
        let f = fixture(4);
        f.cluster.set_down(&f.nodes[0], true);
        f.cluster.set_reported_active(&f.nodes[3], false);

        let report = f.monitor.run_cycle().await;

        assert_eq!(report.available, vec![f.nodes[1].clone(), f.nodes[2].clone()]);
        assert_eq!(report.lost.len(), 2);
        assert_eq!(f.events.events_of_type("NodeLost").len(), 2);
    }

    #[tokio::test]
    async fn test_transitions_are_reported_once() {
        let f = fixture(2);
        f.monitor.run_cycle().await;

        f.cluster.set_down(&f.nodes[1], true);
        let report = f.monitor.run_cycle().await;
        assert_eq!(report.lost, vec![f.nodes[1].clone()]);

        // Still down: no new transition
        let report = f.monitor.run_cycle().await;
        assert!(report.lost.is_empty());
        assert_eq!(f.events.events_of_type("NodeLost").len(), 1);

        f.cluster.set_down(&f.nodes[1], false);
        let report = f.monitor.run_cycle().await;
        assert_eq!(report.recovered, vec![f.nodes[1].clone()]);
        assert_eq!(f.events.events_of_type("NodeRecovered").len(), 1);
    }

    #[tokio::test]
    async fn test_block_count_is_recorded() {
        let f = fixture(2);
        f.cluster
            .store(&f.nodes[0], "f_stripe0_p", Bytes::from_static(b"xy"))
            .await
            .unwrap();

        f.monitor.run_cycle().await;

        assert_eq!(f.registry.node_status(&f.nodes[0]).unwrap().stored_block_count, 1);
        assert_eq!(f.registry.node_status(&f.nodes[1]).unwrap().stored_block_count, 0);
    }

    #[tokio::test]
    async fn test_recovered_nodes_are_queued() {
        let f = fixture(2);
        let (tx, mut rx) = mpsc::channel(4);
        let monitor = f.monitor.with_recovery_channel(tx);

        f.cluster.set_down(&f.nodes[0], true);
        monitor.run_cycle().await;
        f.cluster.set_down(&f.nodes[0], false);
        monitor.run_cycle().await;

        assert_eq!(rx.try_recv().unwrap(), f.nodes[0]);
        assert!(rx.try_recv().is_err());
    }

    /// Transport whose status call never answers.
    struct Unresponsive;

    #[async_trait]
    impl NodeTransport for Unresponsive {
        async fn store(&self, _: &NodeId, _: &str, _: Bytes) -> Result<()> {
            Ok(())
        }
        async fn fetch(&self, _: &NodeId, _: &str) -> Result<Bytes> {
            Ok(Bytes::new())
        }
        async fn delete(&self, _: &NodeId, _: &str) -> Result<()> {
            Ok(())
        }
        async fn status(&self, _: &NodeId) -> Result<NodeReport> {
            std::future::pending().await
        }
        async fn detailed_status(&self, _: &NodeId) -> Result<Vec<StoredBlockInfo>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_probe_timeout_marks_node_unavailable() {
        let descriptors = descriptors(2);
        let config = NodeMonitorConfig {
            poll_interval: Duration::from_millis(50),
            probe_timeout: Duration::from_millis(20),
        };
        let monitor = NodeMonitor::new(
            config,
            &descriptors,
            Arc::new(Unresponsive),
            Arc::new(MetadataRegistry::new()),
            Arc::new(InMemoryEventCollector::new()),
        )
        .unwrap();

        let report = monitor.run_cycle().await;

        assert!(report.available.is_empty());
        assert_eq!(report.lost.len(), 2);
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let f = fixture(2);
        let monitor = Arc::new(NodeMonitor {
            config: NodeMonitorConfig {
                poll_interval: Duration::from_millis(10),
                probe_timeout: Duration::from_millis(100),
            },
            ..f.monitor
        });

        let handle = tokio::spawn(Arc::clone(&monitor).run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(monitor.available_nodes().len(), 2);

        monitor.shutdown();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
