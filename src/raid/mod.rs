//! RAID5 Striping Module
//!
//! Block and stripe model, XOR parity and the file distributor.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           RAID5 Striping                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                          │
//! │  ┌──────────────┐    ┌──────────────┐    ┌───────────────────────────┐  │
//! │  │    Block     │    │    Stripe    │    │      XOR Parity           │  │
//! │  │  (checksum)  │───▶│  (rotating   │◀───│   (write + recovery)      │  │
//! │  │              │    │   parity)    │    │                           │  │
//! │  └──────────────┘    └──────────────┘    └───────────────────────────┘  │
//! │                             │                                            │
//! │                   ┌─────────┴─────────┐                                  │
//! │                   │  File Distributor │◀── available-node snapshot       │
//! │                   │ distribute/read/  │──▶ NodeTransport                 │
//! │                   │ delete/rebuild    │──▶ MetadataRegistry              │
//! │                   └───────────────────┘                                  │
//! │                                                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - **Block** (`block.rs`): one data or parity unit with its BLAKE3 checksum.
//!   Blocks can be detached from their payload so layouts stay small.
//!
//! - **Stripe** (`stripe.rs`): one parity group of N blocks, one per node:
//!   - Parity at position `stripe_index mod N`
//!   - Node of every position recorded at write time
//!   - Single-slot recovery from the survivors
//!
//! - **Parity** (`parity.rs`): XOR over equal-length buffers.
//!
//! - **Distributor** (`distributor.rs`): streams a file into stripes, pushes
//!   blocks to their nodes, and reconstructs files while tolerating one lost
//!   block per stripe.
//!
//! # Usage
//!
//! ```rust,ignore
//! use paritystore::raid::{FileDistributor, DistributorConfig};
//!
//! let distributor = FileDistributor::new(
//!     DistributorConfig::default(),
//!     registry,
//!     monitor,
//!     transport,
//!     publisher,
//! )?;
//!
//! let file_id = distributor.distribute("report.pdf", file).await?;
//! let read = distributor.reconstruct(&file_id).await?;
//! assert!(read.lost_stripes.is_empty());
//! ```

pub mod block;
pub mod distributor;
pub mod parity;
pub mod stripe;

#[cfg(test)]
mod proptest;

pub use block::{Block, BlockType};
pub use distributor::{DistributorConfig, FileDistributor, RebuildReport, Reconstruction};
pub use parity::xor_parity;
pub use stripe::Stripe;
