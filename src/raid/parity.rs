//! XOR Parity
//!
//! Single-parity computation shared by the write path (parity of the data
//! blocks) and the read path (recovery of one missing slot from the
//! survivors, whether that slot held data or parity).

use crate::error::{Error, Result};

/// XOR equal-length buffers together.
///
/// Returns a buffer of the common length where byte `i` is the XOR of byte
/// `i` of every input. Fails with `InvalidArgument` on an empty input or on
/// buffers of differing length.
pub fn xor_parity<B: AsRef<[u8]>>(blocks: &[B]) -> Result<Vec<u8>> {
    let first = blocks.first().ok_or_else(|| {
        Error::InvalidArgument("parity needs at least one block".to_string())
    })?;

    let len = first.as_ref().len();
    let mut parity = vec![0u8; len];

    for (i, block) in blocks.iter().enumerate() {
        let block = block.as_ref();
        if block.len() != len {
            return Err(Error::InvalidArgument(format!(
                "block {} has length {}, expected {}",
                i,
                block.len(),
                len
            )));
        }
        for (p, b) in parity.iter_mut().zip(block) {
            *p ^= *b;
        }
    }

    Ok(parity)
}
