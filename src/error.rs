//! Error types for the parity store

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the parity store
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// Malformed input (block id, parity input, stripe position)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Not enough healthy nodes to build a stripe
    #[error("Insufficient nodes: have {available}, need at least {required}")]
    InsufficientNodes { available: usize, required: usize },

    /// Unknown file or missing block
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transient network or storage failure talking to a node
    #[error("I/O failure on node {node}: {reason}")]
    NodeIo { node: String, reason: String },

    /// Node reports a block size or capacity that differs from the cluster reference
    #[error("Configuration mismatch on node {node}: {reason}")]
    ConfigMismatch { node: String, reason: String },

    /// I/O error (input streams)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client could not be built or a request could not be formed
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build a node I/O failure
    pub fn node_io(node: impl std::fmt::Display, reason: impl std::fmt::Display) -> Self {
        Error::NodeIo {
            node: node.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error means the requested item does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
