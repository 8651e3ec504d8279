//! Node Monitoring
//!
//! Failure detection for the storage nodes and publication of the
//! available-node snapshot consumed by the distributor.

pub mod node_monitor;

pub use node_monitor::{ClusterReference, CycleReport, NodeMonitor, NodeMonitorConfig};
