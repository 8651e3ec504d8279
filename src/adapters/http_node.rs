//! HTTP Node Transport
//!
//! Implements the `NodeTransport` port against disk nodes speaking the block
//! HTTP API. A node's id is its base URL.
//!
//! ```text
//!   POST   {base}/storeBlock?blockId=ID     body = raw block
//!   GET    {base}/getBlock?blockId=ID       200 raw block | 404
//!   DELETE {base}/deleteBlock?blockId=ID    200 | 404
//!   GET    {base}/nodeStatus                JSON NodeReport
//!   GET    {base}/detailedNodeStatus        JSON [StoredBlockInfo]
//! ```

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, instrument};

use crate::domain::ports::{NodeId, NodeReport, NodeTransport, StoredBlockInfo};
use crate::error::{Error, Result};

/// Configuration for the HTTP transport
#[derive(Debug, Clone)]
pub struct HttpNodeConfig {
    /// Timeout for a whole request, body included
    pub request_timeout: Duration,

    /// Timeout for establishing a connection
    pub connect_timeout: Duration,
}

impl Default for HttpNodeConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(2),
        }
    }
}

/// reqwest-backed client for disk nodes.
#[derive(Debug, Clone)]
pub struct HttpNodeTransport {
    client: Client,
}

impl HttpNodeTransport {
    /// Create a new transport
    pub fn new(config: HttpNodeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self { client })
    }

    fn url(node: &NodeId, path: &str) -> String {
        format!("{}/{}", node.as_str().trim_end_matches('/'), path)
    }

    fn block_url(node: &NodeId, path: &str, block_id: &str) -> String {
        format!(
            "{}?blockId={}",
            Self::url(node, path),
            urlencoding::encode(block_id)
        )
    }

    /// Map a response status to the domain error for `what` on `node`.
    fn check(node: &NodeId, what: &str, response: Response) -> Result<Response> {
        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(Error::NotFound(format!("{} on {}", what, node))),
            status => Err(Error::node_io(node, format!("{} failed with status {}", what, status))),
        }
    }
}

#[async_trait]
impl NodeTransport for HttpNodeTransport {
    #[instrument(skip(self, payload), fields(node = %node, len = payload.len()))]
    async fn store(&self, node: &NodeId, block_id: &str, payload: Bytes) -> Result<()> {
        let response = self
            .client
            .post(Self::block_url(node, "storeBlock", block_id))
            .header("Content-Type", "application/octet-stream")
            .body(payload)
            .send()
            .await
            .map_err(|e| Error::node_io(node, e))?;

        Self::check(node, &format!("store {}", block_id), response)?;
        debug!("Stored block {}", block_id);
        Ok(())
    }

    #[instrument(skip(self), fields(node = %node))]
    async fn fetch(&self, node: &NodeId, block_id: &str) -> Result<Bytes> {
        let response = self
            .client
            .get(Self::block_url(node, "getBlock", block_id))
            .send()
            .await
            .map_err(|e| Error::node_io(node, e))?;

        Self::check(node, &format!("block {}", block_id), response)?
            .bytes()
            .await
            .map_err(|e| Error::node_io(node, e))
    }

    #[instrument(skip(self), fields(node = %node))]
    async fn delete(&self, node: &NodeId, block_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(Self::block_url(node, "deleteBlock", block_id))
            .send()
            .await
            .map_err(|e| Error::node_io(node, e))?;

        Self::check(node, &format!("block {}", block_id), response)?;
        Ok(())
    }

    async fn status(&self, node: &NodeId) -> Result<NodeReport> {
        let response = self
            .client
            .get(Self::url(node, "nodeStatus"))
            .send()
            .await
            .map_err(|e| Error::node_io(node, e))?;

        Self::check(node, "status", response)?
            .json()
            .await
            .map_err(|e| Error::node_io(node, format!("invalid status response: {}", e)))
    }

    async fn detailed_status(&self, node: &NodeId) -> Result<Vec<StoredBlockInfo>> {
        let response = self
            .client
            .get(Self::url(node, "detailedNodeStatus"))
            .send()
            .await
            .map_err(|e| Error::node_io(node, e))?;

        Self::check(node, "detailed status", response)?
            .json()
            .await
            .map_err(|e| Error::node_io(node, format!("invalid inventory response: {}", e)))
    }
}
