//! Stripes
//!
//! A stripe is one RAID5 parity group: N block slots, one per participating
//! node, with the parity slot rotating by stripe index so parity load is
//! spread over every node.
//!
//! ```text
//!   N = 4          node0   node1   node2   node3
//!   stripe 0        P       D0      D1      D2
//!   stripe 1        D0      P       D1      D2
//!   stripe 2        D0      D1      P       D2
//!   stripe 3        D0      D1      D2      P
//!   stripe 4        P       D0      D1      D2
//! ```
//!
//! The node of every position is recorded in the stripe itself, so a file can
//! still be read after nodes join or leave the cluster.

use bytes::Bytes;

use crate::domain::ports::NodeId;
use crate::error::{Error, Result};
use crate::raid::block::{Block, BlockType};
use crate::raid::parity::xor_parity;

/// Smallest stripe: one data block plus its parity.
pub const MIN_STRIPE_WIDTH: usize = 2;

/// Position of the parity slot for a stripe index and width.
pub fn parity_position(stripe_index: u64, width: usize) -> usize {
    (stripe_index % width as u64) as usize
}

/// One parity group of a stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stripe {
    stripe_id: String,
    file_id: String,
    stripe_index: u64,
    parity_position: usize,
    nodes: Vec<NodeId>,
    slots: Vec<Option<Block>>,
}

impl Stripe {
    /// Create an empty stripe over `nodes` (in position order).
    pub fn new(file_id: impl Into<String>, stripe_index: u64, nodes: Vec<NodeId>) -> Result<Self> {
        if nodes.len() < MIN_STRIPE_WIDTH {
            return Err(Error::InvalidArgument(format!(
                "stripe needs at least {} nodes, got {}",
                MIN_STRIPE_WIDTH,
                nodes.len()
            )));
        }

        let file_id = file_id.into();
        let width = nodes.len();
        Ok(Self {
            stripe_id: format!("{}_stripe{}", file_id, stripe_index),
            file_id,
            stripe_index,
            parity_position: parity_position(stripe_index, width),
            slots: vec![None; width],
            nodes,
        })
    }

    /// Build a complete stripe from `N - 1` equal-length data buffers.
    ///
    /// Parity is computed over the buffers and placed at the rotating parity
    /// position; data fills the remaining positions in node order.
    pub fn assemble(
        file_id: impl Into<String>,
        stripe_index: u64,
        nodes: Vec<NodeId>,
        data: Vec<Bytes>,
    ) -> Result<Self> {
        let mut stripe = Self::new(file_id, stripe_index, nodes)?;
        if data.len() != stripe.data_block_count() {
            return Err(Error::InvalidArgument(format!(
                "stripe {} needs {} data blocks, got {}",
                stripe.stripe_id,
                stripe.data_block_count(),
                data.len()
            )));
        }

        let parity = xor_parity(&data)?;
        let mut data = data.into_iter();

        for position in 0..stripe.total_blocks() {
            let block_id = stripe.block_id_at(position);
            let block = if position == stripe.parity_position {
                Block::new(block_id, BlockType::Parity, parity.clone())?
            } else {
                let payload = data
                    .next()
                    .ok_or_else(|| Error::Internal("data blocks exhausted".to_string()))?;
                Block::new(block_id, BlockType::Data, payload)?
            };
            stripe.set_block(position, block)?;
        }

        Ok(stripe)
    }

    pub fn stripe_id(&self) -> &str {
        &self.stripe_id
    }

    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    pub fn stripe_index(&self) -> u64 {
        self.stripe_index
    }

    /// N, the number of nodes the stripe spans.
    pub fn total_blocks(&self) -> usize {
        self.slots.len()
    }

    /// N - 1
    pub fn data_block_count(&self) -> usize {
        self.slots.len() - 1
    }

    pub fn parity_position(&self) -> usize {
        self.parity_position
    }

    /// Nodes in position order, as assigned at distribution time.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn node(&self, position: usize) -> Option<&NodeId> {
        self.nodes.get(position)
    }

    /// Block type expected at a position.
    pub fn block_type_at(&self, position: usize) -> BlockType {
        if position == self.parity_position {
            BlockType::Parity
        } else {
            BlockType::Data
        }
    }

    /// Ordinal of a data position among the data positions (0-based).
    pub fn data_ordinal(&self, position: usize) -> Option<usize> {
        if position >= self.total_blocks() || position == self.parity_position {
            None
        } else if position < self.parity_position {
            Some(position)
        } else {
            Some(position - 1)
        }
    }

    /// Block id for a position: `{stripe_id}_p` or `{stripe_id}_d{k}`.
    pub fn block_id_at(&self, position: usize) -> String {
        match self.data_ordinal(position) {
            Some(k) => format!("{}_d{}", self.stripe_id, k),
            None => format!("{}_p", self.stripe_id),
        }
    }

    /// Place a block in an empty position. The block type must match the
    /// position.
    pub fn set_block(&mut self, position: usize, block: Block) -> Result<()> {
        self.check_slot(position, &block)?;
        if let Some(current) = &self.slots[position] {
            return Err(Error::InvalidArgument(format!(
                "position {} of stripe {} already holds {}",
                position,
                self.stripe_id,
                current.block_id()
            )));
        }
        self.slots[position] = Some(block);
        Ok(())
    }

    /// Replace the block of a complete stripe, e.g. with a recovered copy.
    /// The replacement must carry the same block id.
    pub fn replace_block(&mut self, position: usize, block: Block) -> Result<()> {
        self.check_slot(position, &block)?;
        match &self.slots[position] {
            Some(current) if current.block_id() == block.block_id() => {
                self.slots[position] = Some(block);
                Ok(())
            }
            Some(current) => Err(Error::InvalidArgument(format!(
                "cannot replace {} with {}",
                current.block_id(),
                block.block_id()
            ))),
            None => Err(Error::InvalidArgument(format!(
                "position {} of stripe {} is empty",
                position, self.stripe_id
            ))),
        }
    }

    fn check_slot(&self, position: usize, block: &Block) -> Result<()> {
        if position >= self.total_blocks() {
            return Err(Error::InvalidArgument(format!(
                "position {} out of range for stripe {} of width {}",
                position,
                self.stripe_id,
                self.total_blocks()
            )));
        }

        let expected = self.block_type_at(position);
        if block.block_type() != expected {
            return Err(Error::InvalidArgument(format!(
                "position {} of stripe {} holds {} blocks, got {}",
                position,
                self.stripe_id,
                expected,
                block.block_type()
            )));
        }
        Ok(())
    }

    pub fn block(&self, position: usize) -> Option<&Block> {
        self.slots.get(position).and_then(|s| s.as_ref())
    }

    /// Slots in position order with the node each one lives on.
    pub fn slots(&self) -> impl Iterator<Item = (usize, &NodeId, Option<&Block>)> {
        self.slots
            .iter()
            .zip(&self.nodes)
            .enumerate()
            .map(|(position, (slot, node))| (position, node, slot.as_ref()))
    }

    /// A stripe is complete once every slot holds a block.
    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    pub fn parity_block(&self) -> Option<&Block> {
        self.block(self.parity_position)
    }

    /// Data blocks in node order.
    pub fn data_blocks(&self) -> Vec<&Block> {
        self.slots()
            .filter(|(position, _, _)| *position != self.parity_position)
            .filter_map(|(_, _, block)| block)
            .collect()
    }

    /// Check that the parity slot equals the XOR of the data slots.
    ///
    /// Requires a complete stripe with attached payloads.
    pub fn verify_parity(&self) -> Result<bool> {
        if !self.is_complete() {
            return Ok(false);
        }

        let data = self
            .data_blocks()
            .into_iter()
            .map(|b| payload_of(b))
            .collect::<Result<Vec<_>>>()?;
        let stored = match self.parity_block() {
            Some(block) => payload_of(block)?,
            None => return Ok(false),
        };

        Ok(xor_parity(&data)? == stored.as_ref())
    }

    /// Recover the block at `missing` from the payloads of every other slot.
    ///
    /// `payloads` is indexed by position; the entry at `missing` is ignored
    /// and every other entry must be present. The recovered block keeps the
    /// id and type of the slot. If the stripe records a checksum for the slot,
    /// the recovered payload must match it.
    pub fn recover_block(&self, missing: usize, payloads: &[Option<Bytes>]) -> Result<Block> {
        if missing >= self.total_blocks() || payloads.len() != self.total_blocks() {
            return Err(Error::InvalidArgument(format!(
                "cannot recover position {} of stripe {} from {} payloads",
                missing,
                self.stripe_id,
                payloads.len()
            )));
        }

        let survivors = payloads
            .iter()
            .enumerate()
            .filter(|(position, _)| *position != missing)
            .map(|(position, payload)| {
                payload.clone().ok_or_else(|| {
                    Error::InvalidArgument(format!(
                        "stripe {} is missing position {} besides {}",
                        self.stripe_id, position, missing
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let recovered = xor_parity(&survivors)?;
        let block = Block::new(
            self.block_id_at(missing),
            self.block_type_at(missing),
            recovered,
        )?;

        if let Some(expected) = self.block(missing) {
            if expected.checksum() != block.checksum() {
                return Err(Error::Internal(format!(
                    "recovered {} does not match its recorded checksum",
                    block.block_id()
                )));
            }
        }

        Ok(block)
    }

    /// Copy of this stripe with every payload released.
    pub fn detached(&self) -> Self {
        Self {
            slots: self
                .slots
                .iter()
                .map(|slot| slot.as_ref().map(Block::detached))
                .collect(),
            ..self.clone()
        }
    }
}

fn payload_of(block: &Block) -> Result<&Bytes> {
    block.payload().ok_or_else(|| {
        Error::InvalidArgument(format!("block {} has no payload attached", block.block_id()))
    })
}
