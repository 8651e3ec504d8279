//! Metadata
//!
//! The registry owns every [`StoredFile`] and [`NodeStatus`]; the distributor
//! and the node monitor only read and write through it.

pub mod models;
pub mod registry;

pub use models::{FileSummary, NodeStatus, StoredFile};
pub use registry::MetadataRegistry;
