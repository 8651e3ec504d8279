//! Blocks
//!
//! A block is one stored unit: a fixed-size run of file data or the parity
//! of the data blocks in its stripe.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Kind of content a block holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockType {
    /// Data from the original file
    Data,
    /// XOR of the data blocks in the same stripe
    Parity,
}

impl std::fmt::Display for BlockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockType::Data => write!(f, "DATA"),
            BlockType::Parity => write!(f, "PARITY"),
        }
    }
}

/// Checksum of a payload: lowercase hex BLAKE3 digest.
pub fn checksum(payload: &[u8]) -> String {
    blake3::hash(payload).to_hex().to_string()
}

/// Validate a block id. Ids travel as query parameters and file names on the
/// nodes, so only `[A-Za-z0-9_-]` is accepted.
pub fn validate_block_id(block_id: &str) -> Result<()> {
    if block_id.is_empty() {
        return Err(Error::InvalidArgument("block id is empty".to_string()));
    }
    if let Some(c) = block_id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(Error::InvalidArgument(format!(
            "block id {:?} contains invalid character {:?}",
            block_id, c
        )));
    }
    Ok(())
}

/// A data or parity block.
///
/// The payload may be detached once the block has been written to its node;
/// the length and checksum are kept so a later fetch can be verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    block_id: String,
    block_type: BlockType,
    len: usize,
    checksum: String,
    payload: Option<Bytes>,
    corrupted: bool,
}

impl Block {
    /// Create a block, computing its checksum.
    pub fn new(
        block_id: impl Into<String>,
        block_type: BlockType,
        payload: impl Into<Bytes>,
    ) -> Result<Self> {
        let block_id = block_id.into();
        validate_block_id(&block_id)?;

        let payload = payload.into();
        Ok(Self {
            block_id,
            block_type,
            len: payload.len(),
            checksum: checksum(&payload),
            payload: Some(payload),
            corrupted: false,
        })
    }

    pub fn block_id(&self) -> &str {
        &self.block_id
    }

    pub fn block_type(&self) -> BlockType {
        self.block_type
    }

    pub fn is_parity(&self) -> bool {
        self.block_type == BlockType::Parity
    }

    /// Payload length in bytes (kept when detached).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Checksum recorded when the payload was last set.
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// Payload, if attached.
    pub fn payload(&self) -> Option<&Bytes> {
        self.payload.as_ref()
    }

    /// Result of the last `verify_integrity` call.
    pub fn is_corrupted(&self) -> bool {
        self.corrupted
    }

    /// Replace the payload and recompute the checksum.
    ///
    /// The new payload must have exactly the block's length.
    pub fn update_payload(&mut self, payload: impl Into<Bytes>) -> Result<()> {
        let payload = payload.into();
        if payload.len() != self.len {
            return Err(Error::InvalidArgument(format!(
                "payload of {} bytes does not fit block {} of {} bytes",
                payload.len(),
                self.block_id,
                self.len
            )));
        }
        self.checksum = checksum(&payload);
        self.payload = Some(payload);
        self.corrupted = false;
        Ok(())
    }

    /// Release the payload, keeping length and checksum.
    pub fn detach(&mut self) -> Option<Bytes> {
        self.payload.take()
    }

    /// Copy of this block without its payload.
    pub fn detached(&self) -> Self {
        Self {
            payload: None,
            ..self.clone()
        }
    }

    /// Attach bytes fetched from a node without touching the recorded
    /// checksum. Call `verify_integrity` afterwards.
    pub fn attach(&mut self, payload: Bytes) {
        self.payload = Some(payload);
    }

    /// Compare the recorded checksum against the attached payload.
    ///
    /// A detached block cannot be verified and is reported corrupted.
    pub fn verify_integrity(&mut self) -> bool {
        let intact = match &self.payload {
            Some(payload) => payload.len() == self.len && checksum(payload) == self.checksum,
            None => false,
        };
        self.corrupted = !intact;
        intact
    }
}

impl std::fmt::Display for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Block{{id={}, type={}, len={}, corrupted={}}}",
            self.block_id, self.block_type, self.len, self.corrupted
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_checksum_is_function_of_payload() {
        let a = Block::new("a", BlockType::Data, vec![1u8, 2, 3]).unwrap();
        let b = Block::new("b", BlockType::Parity, vec![1u8, 2, 3]).unwrap();
        let c = Block::new("c", BlockType::Data, vec![1u8, 2, 4]).unwrap();

        assert_eq!(a.checksum(), b.checksum());
        assert_ne!(a.checksum(), c.checksum());
        assert_eq!(a.checksum().len(), 64);
    }

    #[test]
    fn test_block_id_validation() {
        assert!(validate_block_id("3f2a-b1_stripe0_d1").is_ok());
        assert_matches!(validate_block_id(""), Err(Error::InvalidArgument(_)));
        assert_matches!(validate_block_id("../etc/passwd"), Err(Error::InvalidArgument(_)));
        assert_matches!(
            Block::new("a b", BlockType::Data, vec![0u8]),
            Err(Error::InvalidArgument(_))
        );
    }

    #[test]
    fn test_verify_integrity_detects_tampering() {
        let mut block = Block::new("blk", BlockType::Data, vec![7u8; 16]).unwrap();
        assert!(block.verify_integrity());
        assert!(!block.is_corrupted());

        let mut tampered = vec![7u8; 16];
        tampered[3] = 0;
        block.attach(Bytes::from(tampered));

        assert!(!block.verify_integrity());
        assert!(block.is_corrupted());
    }

    #[test]
    fn test_update_payload_recomputes_checksum() {
        let mut block = Block::new("blk", BlockType::Data, vec![0u8; 4]).unwrap();
        let before = block.checksum().to_string();

        block.update_payload(vec![1u8, 2, 3, 4]).unwrap();

        assert_ne!(block.checksum(), before);
        assert!(block.verify_integrity());
    }

    #[test]
    fn test_update_payload_requires_block_length() {
        let mut block = Block::new("blk", BlockType::Data, vec![7u8; 4096]).unwrap();
        let checksum = block.checksum().to_string();

        assert_matches!(
            block.update_payload(vec![1u8; 10]),
            Err(Error::InvalidArgument(_))
        );
        assert_matches!(
            block.update_payload(vec![1u8; 4097]),
            Err(Error::InvalidArgument(_))
        );

        assert_eq!(block.len(), 4096);
        assert_eq!(block.checksum(), checksum);
        assert!(block.verify_integrity());
    }

    #[test]
    fn test_detach_keeps_layout() {
        let mut block = Block::new("blk", BlockType::Parity, vec![9u8; 8]).unwrap();
        let checksum = block.checksum().to_string();

        let payload = block.detach().unwrap();
        assert!(block.payload().is_none());
        assert_eq!(block.len(), 8);
        assert_eq!(block.checksum(), checksum);
        assert!(!block.verify_integrity());

        block.attach(payload);
        assert!(block.verify_integrity());
    }

    #[test]
    fn test_display() {
        let block = Block::new("blk", BlockType::Parity, vec![0u8; 2]).unwrap();
        assert_eq!(
            block.to_string(),
            "Block{id=blk, type=PARITY, len=2, corrupted=false}"
        );
    }
}
