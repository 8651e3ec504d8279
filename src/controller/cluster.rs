//! Cluster Controller
//!
//! Front door of the parity store: file upload, download, delete and
//! listing, node status, plus the background tasks that keep the node
//! snapshot fresh and rebuild nodes that come back after an outage.

use std::sync::Arc;

use bytes::Bytes;
use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::io::AsyncRead;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use crate::config::ClusterConfig;
use crate::domain::ports::{EventPublisher, NodeId, NodeTransport, StoredBlockInfo};
use crate::error::Result;
use crate::metadata::{FileSummary, MetadataRegistry, NodeStatus};
use crate::monitor::{CycleReport, NodeMonitor};
use crate::raid::distributor::{FileDistributor, Reconstruction};

/// Block inventory of one node.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInventory {
    pub node_id: NodeId,
    /// False when the node could not be queried
    pub reachable: bool,
    pub blocks: Vec<StoredBlockInfo>,
}

/// Handles of the controller's background tasks.
#[derive(Debug)]
pub struct BackgroundTasks {
    pub monitor: JoinHandle<()>,
    pub rebuild: Option<JoinHandle<()>>,
}

impl BackgroundTasks {
    /// Wait for every task to finish.
    pub async fn join(self) {
        if let Err(e) = self.monitor.await {
            error!("Node monitor task failed: {}", e);
        }
        if let Some(rebuild) = self.rebuild {
            if let Err(e) = rebuild.await {
                error!("Rebuild worker task failed: {}", e);
            }
        }
    }
}

/// Coordinates the registry, the node monitor and the distributor.
pub struct ClusterController {
    registry: Arc<MetadataRegistry>,
    monitor: Arc<NodeMonitor>,
    distributor: Arc<FileDistributor>,
    transport: Arc<dyn NodeTransport>,
    rebuild_rx: Mutex<Option<mpsc::Receiver<NodeId>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl ClusterController {
    /// Validate `config` and wire up the controller.
    pub fn new(
        config: ClusterConfig,
        transport: Arc<dyn NodeTransport>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let registry = Arc::new(MetadataRegistry::new());
        let (rebuild_tx, rebuild_rx) = mpsc::channel(config.nodes.len() * 2);

        let monitor = Arc::new(
            NodeMonitor::new(
                config.monitor.clone(),
                &config.nodes,
                transport.clone(),
                registry.clone(),
                publisher.clone(),
            )?
            .with_recovery_channel(rebuild_tx),
        );

        let distributor = Arc::new(FileDistributor::new(
            config.distributor.clone(),
            registry.clone(),
            monitor.clone(),
            transport.clone(),
            publisher,
        )?);

        let (shutdown_tx, _) = watch::channel(false);

        Ok(Arc::new(Self {
            registry,
            monitor,
            distributor,
            transport,
            rebuild_rx: Mutex::new(Some(rebuild_rx)),
            shutdown_tx,
        }))
    }

    pub fn registry(&self) -> &Arc<MetadataRegistry> {
        &self.registry
    }

    pub fn monitor(&self) -> &Arc<NodeMonitor> {
        &self.monitor
    }

    pub fn distributor(&self) -> &Arc<FileDistributor> {
        &self.distributor
    }

    /// Run one monitor cycle now.
    pub async fn refresh_nodes(&self) -> CycleReport {
        self.monitor.run_cycle().await
    }

    /// Whether enough nodes are available to accept uploads.
    pub fn is_ready(&self) -> bool {
        self.monitor.available_nodes().len() >= crate::raid::stripe::MIN_STRIPE_WIDTH
    }

    // =========================================================================
    // Files
    // =========================================================================

    pub async fn upload_file<R>(&self, name: &str, reader: R) -> Result<String>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.distributor.distribute(name, reader).await
    }

    /// File contents, padding included. Stripes that lost more than one
    /// block are left out.
    pub async fn download_file(&self, file_id: &str) -> Result<Bytes> {
        Ok(self.read_file(file_id).await?.data)
    }

    /// Like [`download_file`](Self::download_file) but with the recovered
    /// and lost stripe lists.
    pub async fn read_file(&self, file_id: &str) -> Result<Reconstruction> {
        self.distributor.reconstruct(file_id).await
    }

    pub async fn delete_file(&self, file_id: &str) -> Result<()> {
        self.distributor.delete(file_id).await
    }

    pub fn list_files(&self, name_filter: Option<&str>) -> Vec<FileSummary> {
        self.registry.list_file_summaries(name_filter)
    }

    // =========================================================================
    // Nodes
    // =========================================================================

    pub fn node_status(&self) -> Vec<NodeStatus> {
        self.registry.list_node_statuses()
    }

    /// Query every configured node for its block inventory.
    #[instrument(skip(self))]
    pub async fn detailed_cluster_status(&self) -> Vec<NodeInventory> {
        let nodes = self.monitor.configured_nodes();
        let inventories = join_all(nodes.iter().map(|node| self.transport.detailed_status(node))).await;

        nodes
            .iter()
            .zip(inventories)
            .map(|(node, inventory)| match inventory {
                Ok(blocks) => NodeInventory {
                    node_id: node.clone(),
                    reachable: true,
                    blocks,
                },
                Err(e) => {
                    warn!(node = %node, "Inventory query failed: {}", e);
                    NodeInventory {
                        node_id: node.clone(),
                        reachable: false,
                        blocks: Vec::new(),
                    }
                }
            })
            .collect()
    }

    // =========================================================================
    // Background Tasks
    // =========================================================================

    /// Spawn the monitor loop and, on the first call, the rebuild worker.
    pub fn spawn_background(self: &Arc<Self>) -> BackgroundTasks {
        let monitor = tokio::spawn(Arc::clone(&self.monitor).run());

        let rebuild = self.rebuild_rx.lock().take().map(|rx| {
            let distributor = Arc::clone(&self.distributor);
            let shutdown = self.shutdown_tx.subscribe();
            tokio::spawn(run_rebuild_worker(distributor, rx, shutdown))
        });

        BackgroundTasks { monitor, rebuild }
    }

    /// Stop the background tasks.
    pub fn shutdown(&self) {
        info!("Shutting down cluster controller");
        self.monitor.shutdown();
        self.shutdown_tx.send_replace(true);
    }
}

impl std::fmt::Debug for ClusterController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterController")
            .field("monitor", &self.monitor)
            .field("distributor", &self.distributor)
            .finish()
    }
}

/// Rebuild every node the monitor reports as recovered.
async fn run_rebuild_worker(
    distributor: Arc<FileDistributor>,
    mut nodes: mpsc::Receiver<NodeId>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Starting node rebuild worker");

    loop {
        tokio::select! {
            node = nodes.recv() => match node {
                Some(node) => {
                    let report = distributor.rebuild_node(&node).await;
                    if report.blocks_failed > 0 || report.stripes_skipped > 0 {
                        warn!(node = %node, ?report, "Node rebuild incomplete");
                    }
                }
                None => break,
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("Node rebuild worker shutting down");
}

// =============================================================================
// Tests
// =============================================================================
