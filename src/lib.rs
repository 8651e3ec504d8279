//! ParityStore - RAID5-Style Striped Block Storage
//!
//! Splits files into fixed-size blocks and stripes them across networked disk
//! nodes with one XOR parity block per stripe. Any single lost block in a
//! stripe is recovered from the survivors; a node monitor keeps the set of
//! nodes that are fit to receive new stripes.
//!
//! # Architecture
//!
//! ```text
//! Node Monitor (Eyes) → Cluster Controller (Brain) → File Distributor (Hands)
//! ```
//!
//! # Features
//!
//! - Rotating parity (RAID5) with degraded mode below the canonical width
//! - Degraded reads with optional self-healing of recovered blocks
//! - BLAKE3 block checksums
//! - Rebuild of nodes returning from an outage
//! - Prometheus metrics
//!
//! # Modules
//!
//! - [`adapters`] - Infrastructure adapters implementing domain ports
//! - [`config`] - Controller configuration
//! - [`controller`] - Cluster controller and background tasks
//! - [`domain`] - Domain layer with ports and events (DDD)
//! - [`error`] - Error types
//! - [`metadata`] - File layouts and node status registry
//! - [`metrics`] - Prometheus metrics
//! - [`monitor`] - Node health monitoring
//! - [`raid`] - Blocks, stripes, parity and the file distributor

pub mod adapters;
pub mod config;
pub mod controller;
pub mod domain;
pub mod error;
pub mod metadata;
pub mod metrics;
pub mod monitor;
pub mod raid;

// Re-export commonly used types
pub use config::ClusterConfig;
pub use controller::{ClusterController, NodeInventory};
pub use domain::{ClusterEvent, NodeDescriptor, NodeId, NodeTransport};
pub use error::{Error, Result};
pub use metadata::{FileSummary, MetadataRegistry, NodeStatus, StoredFile};
pub use monitor::{NodeMonitor, NodeMonitorConfig};
pub use raid::{DistributorConfig, FileDistributor, Reconstruction};
