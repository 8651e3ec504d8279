//! Domain Layer
//!
//! Value objects, ports and events shared by the striping engine, the node
//! monitor and the adapters.
//!
//! - **Ports** (`ports.rs`) - Trait abstractions for node access and event sinks
//! - **Events** (`events.rs`) - Cluster events for audit and decoupling
//!
//! # Usage
//!
//! ```ignore
//! use paritystore::domain::ports::{NodeId, NodeTransport};
//!
//! async fn probe<T: NodeTransport>(transport: &T, node: &NodeId) -> Result<bool> {
//!     let report = transport.status(node).await?;
//!     Ok(report.active)
//! }
//! ```

pub mod events;
pub mod ports;

pub use events::ClusterEvent;
pub use ports::{
    EventPublisher, NodeDescriptor, NodeId, NodeReport, NodeTransport, StoredBlockInfo,
    StoredBlockKind,
};
