//! Controller module
//!
//! Wires the node monitor, the metadata registry and the file distributor
//! into one cluster controller and runs their background tasks.

mod cluster;

pub use cluster::{BackgroundTasks, ClusterController, NodeInventory};
