//! Metrics
//!
//! Prometheus counters and gauges for the striping engine and the node
//! monitor, registered on the default registry the first time they are
//! touched and served by the binary on `/metrics`.

use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, Encoder, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};

use crate::error::{Error, Result};

// Registration only fails on a duplicate or malformed metric name, both of
// which are fixed at compile time below.

pub static FILES_STORED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("paritystore_files_stored_total", "Files distributed")
        .expect("metric can be registered")
});

pub static STRIPES_WRITTEN: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("paritystore_stripes_written_total", "Stripes distributed")
        .expect("metric can be registered")
});

pub static BLOCK_WRITES_FAILED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "paritystore_block_writes_failed_total",
        "Block stores that failed after retries"
    )
    .expect("metric can be registered")
});

/// Labelled by `path`: `read` (recovered while reconstructing) or `rebuild`.
pub static BLOCKS_RECOVERED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "paritystore_blocks_recovered_total",
        "Blocks recovered from parity",
        &["path"]
    )
    .expect("metric can be registered")
});

pub static STRIPES_LOST: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "paritystore_stripes_lost_total",
        "Stripes omitted from a download because more than one block was missing"
    )
    .expect("metric can be registered")
});

pub static CORRUPT_BLOCKS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "paritystore_corrupt_blocks_total",
        "Fetched blocks whose checksum did not match"
    )
    .expect("metric can be registered")
});

/// Labelled by `reason`: `unreachable`, `inactive` or `config_mismatch`.
pub static PROBE_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "paritystore_probe_failures_total",
        "Node probes that marked a node unavailable",
        &["reason"]
    )
    .expect("metric can be registered")
});

pub static AVAILABLE_NODES: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "paritystore_available_nodes",
        "Nodes in the current available-node snapshot"
    )
    .expect("metric can be registered")
});

/// Encode every registered metric in the Prometheus text format.
pub fn gather_text() -> Result<(String, Vec<u8>)> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|e| Error::Internal(format!("Failed to encode metrics: {}", e)))?;
    Ok((encoder.format_type().to_string(), buffer))
}
