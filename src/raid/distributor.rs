//! File Distributor
//!
//! Splits files into RAID5 stripes across the available nodes and puts them
//! back together, recovering at most one missing block per stripe.
//!
//! # Write path
//!
//! ```text
//!   reader ──▶ N-1 chunks (zero padded) ──▶ parity ──▶ N concurrent stores
//!                                                     └──▶ layout (detached)
//! ```
//!
//! # Read path
//!
//! ```text
//!   layout ──▶ N concurrent fetches (from the stripe's own nodes)
//!          ──▶ checksum check ──▶ 0 missing: emit data
//!                                 1 missing: XOR survivors, heal, emit data
//!                                 2+ missing: omit stripe
//! ```

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::future::join_all;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::events::ClusterEvent;
use crate::domain::ports::{EventPublisher, NodeId, NodeTransport};
use crate::error::{Error, Result};
use crate::metadata::{MetadataRegistry, StoredFile};
use crate::metrics;
use crate::monitor::NodeMonitor;
use crate::raid::block::Block;
use crate::raid::stripe::{Stripe, MIN_STRIPE_WIDTH};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the file distributor
#[derive(Debug, Clone)]
pub struct DistributorConfig {
    /// Full RAID5 width; fewer available nodes means degraded mode
    pub canonical_width: usize,

    /// Write recovered blocks back to their node during reads
    pub self_heal: bool,

    /// Extra attempts for a failed block store
    pub write_retries: u32,
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self {
            canonical_width: 4,
            self_heal: true,
            write_retries: 1,
        }
    }
}

// =============================================================================
// Results
// =============================================================================

/// Result of reconstructing a file
#[derive(Debug, Clone)]
pub struct Reconstruction {
    /// Data blocks of every readable stripe, in order, padding included
    pub data: Bytes,

    /// Stripes that were read with one block recovered from parity
    pub recovered_stripes: Vec<u64>,

    /// Stripes omitted because more than one block was missing
    pub lost_stripes: Vec<u64>,
}

impl Reconstruction {
    /// Whether every stripe contributed its data.
    pub fn is_complete(&self) -> bool {
        self.lost_stripes.is_empty()
    }
}

/// Result of rebuilding the blocks of one node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildReport {
    /// Files with at least one stripe on the node
    pub files_scanned: usize,

    /// Blocks the node is expected to hold
    pub blocks_checked: usize,

    /// Missing or corrupt blocks recovered and stored back
    pub blocks_rebuilt: usize,

    /// Recovered blocks the node refused
    pub blocks_failed: usize,

    /// Stripes that could not be recovered because another block was missing
    pub stripes_skipped: usize,
}

// =============================================================================
// Stripe Reader
// =============================================================================

/// Reads stripe-sized runs of block-sized chunks from a stream.
struct StripeReader<R> {
    reader: R,
    block_size: usize,
    eof: bool,
}

impl<R: AsyncRead + Unpin> StripeReader<R> {
    fn new(reader: R, block_size: usize) -> Self {
        Self {
            reader,
            block_size,
            eof: false,
        }
    }

    /// Next `count` chunks, each zero padded to the block size. Chunks past
    /// the end of the stream are all zeros. `None` once the stream is
    /// exhausted.
    async fn next_stripe(&mut self, count: usize) -> Result<Option<Vec<Bytes>>> {
        let mut chunks = Vec::with_capacity(count);

        for _ in 0..count {
            let mut buf = vec![0u8; self.block_size];
            let filled = if self.eof { 0 } else { self.fill(&mut buf).await? };

            if filled == 0 && chunks.is_empty() {
                return Ok(None);
            }
            chunks.push(Bytes::from(buf));
        }

        Ok(Some(chunks))
    }

    async fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.reader.read(&mut buf[filled..]).await?;
            if n == 0 {
                self.eof = true;
                break;
            }
            filled += n;
        }
        Ok(filled)
    }
}

// =============================================================================
// File Distributor
// =============================================================================

/// Distributes and reconstructs files.
pub struct FileDistributor {
    config: DistributorConfig,
    block_size: usize,
    registry: Arc<MetadataRegistry>,
    monitor: Arc<NodeMonitor>,
    transport: Arc<dyn NodeTransport>,
    publisher: Arc<dyn EventPublisher>,
}

impl FileDistributor {
    /// Create a distributor. The block size is the monitor's cluster
    /// reference block size.
    pub fn new(
        config: DistributorConfig,
        registry: Arc<MetadataRegistry>,
        monitor: Arc<NodeMonitor>,
        transport: Arc<dyn NodeTransport>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Result<Self> {
        let block_size = usize::try_from(monitor.reference().block_size)
            .map_err(|_| Error::Config("block size does not fit in memory".to_string()))?;
        if block_size == 0 {
            return Err(Error::Config("block size must be positive".to_string()));
        }
        if config.canonical_width < MIN_STRIPE_WIDTH {
            return Err(Error::Config(format!(
                "canonical stripe width must be at least {}",
                MIN_STRIPE_WIDTH
            )));
        }

        Ok(Self {
            config,
            block_size,
            registry,
            monitor,
            transport,
            publisher,
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    // =========================================================================
    // Distribute
    // =========================================================================

    /// Stripe `reader` across the currently available nodes.
    ///
    /// Fails with `InsufficientNodes` before reading or writing anything if
    /// fewer than two nodes are available. A block that cannot be stored
    /// after retries is recorded in the file's `failed_writes`; the upload
    /// still succeeds. A read error aborts the upload and removes the blocks
    /// stored so far.
    #[instrument(skip(self, reader))]
    pub async fn distribute<R>(&self, file_name: &str, reader: R) -> Result<String>
    where
        R: AsyncRead + Unpin + Send,
    {
        let nodes = self.monitor.available_nodes();
        let width = nodes.len();
        if width < MIN_STRIPE_WIDTH {
            return Err(Error::InsufficientNodes {
                available: width,
                required: MIN_STRIPE_WIDTH,
            });
        }

        let degraded = width < self.config.canonical_width;
        if degraded {
            warn!(
                nodes = width,
                canonical = self.config.canonical_width,
                "Distributing in degraded mode"
            );
        }

        let file_id = Uuid::new_v4().to_string();
        let mut file = StoredFile::new(&file_id, file_name, self.block_size);
        file.degraded = degraded;

        let mut input = StripeReader::new(reader, self.block_size);
        let mut stored: Vec<(NodeId, String)> = Vec::new();
        let mut failure_events = Vec::new();
        let mut stripe_index = 0u64;

        loop {
            let chunks = match input.next_stripe(width - 1).await {
                Ok(Some(chunks)) => chunks,
                Ok(None) => break,
                Err(e) => {
                    error!(file_id = %file_id, "Reading upload failed: {}", e);
                    self.remove_blocks(&stored).await;
                    return Err(e);
                }
            };

            let stripe = Stripe::assemble(&file_id, stripe_index, nodes.to_vec(), chunks)?;

            for (position, outcome) in self.write_stripe(&stripe).await {
                let (node, block_id) = match (stripe.node(position), stripe.block(position)) {
                    (Some(node), Some(block)) => (node.clone(), block.block_id().to_string()),
                    _ => continue,
                };
                match outcome {
                    Ok(()) => stored.push((node, block_id)),
                    Err(e) => {
                        warn!(node = %node, block = %block_id, "Block write failed: {}", e);
                        metrics::BLOCK_WRITES_FAILED.inc();
                        failure_events.push(ClusterEvent::block_write_failed(
                            &file_id,
                            &block_id,
                            node.as_str(),
                            e.to_string(),
                        ));
                        file.failed_writes.push(block_id);
                    }
                }
            }

            debug!(stripe = stripe_index, parity = stripe.parity_position(), "Stripe written");
            metrics::STRIPES_WRITTEN.inc();
            file.stripes.push(stripe.detached());
            stripe_index += 1;
        }

        let stripes = file.stripes.len();
        let failed = file.failed_writes.len();
        self.registry.save_stored_file(file);
        metrics::FILES_STORED.inc();

        info!(
            file_id = %file_id,
            stripes,
            nodes = width,
            degraded,
            failed_writes = failed,
            "File distributed"
        );

        failure_events.push(ClusterEvent::file_stored(
            &file_id, file_name, stripes, width, degraded,
        ));
        self.publish(failure_events).await;

        Ok(file_id)
    }

    /// Store every block of a stripe concurrently.
    async fn write_stripe(&self, stripe: &Stripe) -> Vec<(usize, Result<()>)> {
        join_all(stripe.slots().map(|(position, node, block)| async move {
            let outcome = match block {
                Some(block) => self.store_with_retry(node, block).await,
                None => Err(Error::Internal(format!(
                    "stripe {} has no block at position {}",
                    stripe.stripe_id(),
                    position
                ))),
            };
            (position, outcome)
        }))
        .await
    }

    async fn store_with_retry(&self, node: &NodeId, block: &Block) -> Result<()> {
        let payload = block.payload().cloned().ok_or_else(|| {
            Error::Internal(format!("block {} has no payload to store", block.block_id()))
        })?;

        let mut attempt = 0;
        loop {
            match self.transport.store(node, block.block_id(), payload.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.config.write_retries => {
                    attempt += 1;
                    debug!(node = %node, block = %block.block_id(), attempt, "Retrying store: {}", e);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Best-effort removal of stored blocks.
    async fn remove_blocks(&self, blocks: &[(NodeId, String)]) -> usize {
        let outcomes = join_all(
            blocks
                .iter()
                .map(|(node, block_id)| self.transport.delete(node, block_id)),
        )
        .await;

        let mut removed = 0;
        for ((node, block_id), outcome) in blocks.iter().zip(outcomes) {
            match outcome {
                Ok(()) => removed += 1,
                Err(e) if e.is_not_found() => {
                    debug!(node = %node, block = %block_id, "Block already gone")
                }
                Err(e) => warn!(node = %node, block = %block_id, "Block delete failed: {}", e),
            }
        }
        removed
    }

    // =========================================================================
    // Reconstruct
    // =========================================================================

    /// Rebuild a file from its blocks.
    ///
    /// Every stripe is read from the nodes recorded in it, whatever the
    /// current snapshot. Stripes missing more than one block are omitted and
    /// reported in `lost_stripes`.
    #[instrument(skip(self))]
    pub async fn reconstruct(&self, file_id: &str) -> Result<Reconstruction> {
        let file = self
            .registry
            .get_stored_file(file_id)
            .ok_or_else(|| Error::NotFound(format!("file {}", file_id)))?;

        let mut data = BytesMut::with_capacity(file.data_len());
        let mut recovered_stripes = Vec::new();
        let mut lost_stripes = Vec::new();
        let mut events = Vec::new();

        for stripe in &file.stripes {
            let mut payloads = self.fetch_stripe(stripe, None).await;
            let missing: Vec<usize> = payloads
                .iter()
                .enumerate()
                .filter(|(_, p)| p.is_none())
                .map(|(position, _)| position)
                .collect();

            match missing.as_slice() {
                [] => {}
                [position] => match stripe.recover_block(*position, &payloads) {
                    Ok(mut block) => {
                        let healed = self.heal(stripe, *position, &block).await;
                        metrics::BLOCKS_RECOVERED.with_label_values(&["read"]).inc();
                        info!(
                            stripe = stripe.stripe_index(),
                            block = %block.block_id(),
                            healed,
                            "Recovered block from parity"
                        );
                        events.push(ClusterEvent::block_recovered(
                            file_id,
                            stripe.stripe_index(),
                            block.block_id(),
                            stripe.node(*position).map(NodeId::as_str).unwrap_or_default(),
                            healed,
                        ));
                        payloads[*position] = block.detach();
                        recovered_stripes.push(stripe.stripe_index());
                    }
                    Err(e) => {
                        error!(stripe = stripe.stripe_index(), "Recovery failed: {}", e);
                        self.record_lost(stripe, missing.clone(), &mut events);
                        lost_stripes.push(stripe.stripe_index());
                        continue;
                    }
                },
                _ => {
                    self.record_lost(stripe, missing.clone(), &mut events);
                    lost_stripes.push(stripe.stripe_index());
                    continue;
                }
            }

            for (position, payload) in payloads.iter().enumerate() {
                if position == stripe.parity_position() {
                    continue;
                }
                if let Some(payload) = payload {
                    data.extend_from_slice(payload);
                }
            }
        }

        self.publish(events).await;

        Ok(Reconstruction {
            data: data.freeze(),
            recovered_stripes,
            lost_stripes,
        })
    }

    fn record_lost(&self, stripe: &Stripe, missing: Vec<usize>, events: &mut Vec<ClusterEvent>) {
        warn!(
            stripe = stripe.stripe_index(),
            missing = ?missing,
            "Stripe unrecoverable, omitting its data"
        );
        metrics::STRIPES_LOST.inc();
        events.push(ClusterEvent::stripe_unrecoverable(
            stripe.file_id(),
            stripe.stripe_index(),
            missing,
        ));
    }

    /// Push a recovered block back to its node if self-healing is enabled.
    async fn heal(&self, stripe: &Stripe, position: usize, block: &Block) -> bool {
        if !self.config.self_heal {
            return false;
        }
        let Some(node) = stripe.node(position) else {
            return false;
        };

        match self.store_with_retry(node, block).await {
            Ok(()) => true,
            Err(e) => {
                debug!(node = %node, block = %block.block_id(), "Self-heal failed: {}", e);
                false
            }
        }
    }

    /// Fetch every position of a stripe concurrently, skipping `skip`.
    ///
    /// A failed fetch or a checksum mismatch leaves the position `None`.
    async fn fetch_stripe(&self, stripe: &Stripe, skip: Option<usize>) -> Vec<Option<Bytes>> {
        join_all(stripe.slots().map(|(position, node, block)| async move {
            match block {
                Some(block) if Some(position) != skip => self.fetch_verified(node, block).await,
                _ => None,
            }
        }))
        .await
    }

    async fn fetch_verified(&self, node: &NodeId, expected: &Block) -> Option<Bytes> {
        match self.transport.fetch(node, expected.block_id()).await {
            Ok(payload) => {
                let mut block = expected.detached();
                block.attach(payload);
                if block.verify_integrity() {
                    block.detach()
                } else {
                    warn!(node = %node, block = %expected.block_id(), "Checksum mismatch");
                    metrics::CORRUPT_BLOCKS.inc();
                    None
                }
            }
            Err(e) => {
                debug!(node = %node, block = %expected.block_id(), "Fetch failed: {}", e);
                None
            }
        }
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Remove a file and delete its blocks from every node.
    ///
    /// Node-level failures are logged; the file is gone from the registry
    /// either way.
    #[instrument(skip(self))]
    pub async fn delete(&self, file_id: &str) -> Result<()> {
        let file = self
            .registry
            .remove_file(file_id)
            .ok_or_else(|| Error::NotFound(format!("file {}", file_id)))?;

        let mut removed = 0;
        for stripe in &file.stripes {
            let blocks: Vec<(NodeId, String)> = stripe
                .slots()
                .filter_map(|(_, node, block)| {
                    block.map(|b| (node.clone(), b.block_id().to_string()))
                })
                .collect();
            removed += self.remove_blocks(&blocks).await;
        }

        info!(blocks = file.block_count(), removed, "File deleted");
        self.publish(vec![ClusterEvent::file_deleted(file_id)]).await;
        Ok(())
    }

    // =========================================================================
    // Node Rebuild
    // =========================================================================

    /// Restore every block `node` should hold that is missing or corrupt.
    #[instrument(skip(self), fields(node = %node))]
    pub async fn rebuild_node(&self, node: &NodeId) -> RebuildReport {
        let mut report = RebuildReport::default();
        let mut events = Vec::new();

        for file in self.registry.list_stored_files(None) {
            if !file.uses_node(node) {
                continue;
            }
            report.files_scanned += 1;

            for stripe in &file.stripes {
                let Some(position) = stripe.nodes().iter().position(|n| n == node) else {
                    continue;
                };
                let Some(expected) = stripe.block(position) else {
                    continue;
                };
                report.blocks_checked += 1;

                if self.fetch_verified(node, expected).await.is_some() {
                    continue;
                }

                let payloads = self.fetch_stripe(stripe, Some(position)).await;
                let block = match stripe.recover_block(position, &payloads) {
                    Ok(block) => block,
                    Err(e) => {
                        warn!(stripe = %stripe.stripe_id(), "Cannot rebuild block: {}", e);
                        report.stripes_skipped += 1;
                        continue;
                    }
                };

                match self.store_with_retry(node, &block).await {
                    Ok(()) => {
                        report.blocks_rebuilt += 1;
                        metrics::BLOCKS_RECOVERED.with_label_values(&["rebuild"]).inc();
                        events.push(ClusterEvent::block_recovered(
                            &file.file_id,
                            stripe.stripe_index(),
                            block.block_id(),
                            node.as_str(),
                            true,
                        ));
                    }
                    Err(e) => {
                        warn!(block = %block.block_id(), "Storing rebuilt block failed: {}", e);
                        report.blocks_failed += 1;
                    }
                }
            }
        }

        info!(
            files = report.files_scanned,
            checked = report.blocks_checked,
            rebuilt = report.blocks_rebuilt,
            failed = report.blocks_failed,
            skipped = report.stripes_skipped,
            "Node rebuild complete"
        );
        self.publish(events).await;
        report
    }

    async fn publish(&self, events: Vec<ClusterEvent>) {
        if events.is_empty() {
            return;
        }
        if let Err(e) = self.publisher.publish_all(events).await {
            warn!("Failed to publish cluster events: {}", e);
        }
    }
}

impl std::fmt::Debug for FileDistributor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileDistributor")
            .field("config", &self.config)
            .field("block_size", &self.block_size)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
