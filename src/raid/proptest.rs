//! Property-Based Tests for RAID5 Striping
//!
//! Uses proptest to verify parity and stripe recovery across stripe widths,
//! block sizes and loss patterns.
//!
//! # Test Properties
//!
//! 1. **Parity Algebra**: singleton identity, order independence
//! 2. **Rotation**: exactly one parity slot, at `index mod N`
//! 3. **Single-Loss Tolerance**: any one slot is recovered bit-identical
//! 4. **No Fabrication**: two missing slots are never "recovered"
//! 5. **Roundtrip**: distribute then reconstruct yields the input plus zero padding

#![cfg(test)]

use std::sync::Arc;

use bytes::Bytes;
use proptest::prelude::*;

use super::block::BlockType;
use super::distributor::{DistributorConfig, FileDistributor};
use super::parity::xor_parity;
use super::stripe::{parity_position, Stripe};
use crate::adapters::{InMemoryEventCollector, MemoryCluster};
use crate::domain::ports::{NodeDescriptor, NodeId};
use crate::metadata::MetadataRegistry;
use crate::monitor::{NodeMonitor, NodeMonitorConfig};

// =============================================================================
// Property Strategies
// =============================================================================

/// Stripe width N and block size.
fn layout_strategy() -> impl Strategy<Value = (usize, usize)> {
    (2usize..=8, 1usize..=64)
}

/// N - 1 equal-length data blocks for a layout.
fn stripe_strategy() -> impl Strategy<Value = (usize, Vec<Vec<u8>>)> {
    layout_strategy().prop_flat_map(|(width, block_size)| {
        (
            Just(width),
            prop::collection::vec(
                prop::collection::vec(any::<u8>(), block_size),
                width - 1,
            ),
        )
    })
}

fn nodes(width: usize) -> Vec<NodeId> {
    (0..width).map(|i| NodeId::new(format!("node{}", i))).collect()
}

fn payloads(stripe: &Stripe) -> Vec<Option<Bytes>> {
    (0..stripe.total_blocks())
        .map(|p| stripe.block(p).and_then(|b| b.payload().cloned()))
        .collect()
}

// =============================================================================
// Parity Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: the parity of a single block is the block itself.
    #[test]
    fn prop_singleton_parity_is_identity(block in prop::collection::vec(any::<u8>(), 0..256)) {
        prop_assert_eq!(xor_parity(&[&block])?, block);
    }

    /// Property: reordering the data blocks does not change the parity.
    #[test]
    fn prop_parity_is_order_independent(
        (_, blocks) in stripe_strategy(),
        seed in any::<u64>(),
    ) {
        let mut shuffled = blocks.clone();
        let len = shuffled.len();
        for i in 0..len {
            let j = (seed as usize).wrapping_add(i * 7) % len;
            shuffled.swap(i, j);
        }

        prop_assert_eq!(xor_parity(&blocks)?, xor_parity(&shuffled)?);
    }

    /// Property: XOR of all data blocks and the parity is all zeros.
    #[test]
    fn prop_parity_cancels((_, blocks) in stripe_strategy()) {
        let mut all = blocks.clone();
        all.push(xor_parity(&blocks)?);

        prop_assert!(xor_parity(&all)?.iter().all(|b| *b == 0));
    }
}

// =============================================================================
// Stripe Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: exactly one parity slot, at `stripe_index mod N`.
    #[test]
    fn prop_single_rotating_parity_slot(
        (width, blocks) in stripe_strategy(),
        stripe_index in 0u64..1000,
    ) {
        let data = blocks.into_iter().map(Bytes::from).collect();
        let stripe = Stripe::assemble("f", stripe_index, nodes(width), data)?;

        prop_assert_eq!(stripe.parity_position(), parity_position(stripe_index, width));
        prop_assert_eq!(stripe.parity_position(), (stripe_index % width as u64) as usize);

        let parity_slots: Vec<usize> = stripe
            .slots()
            .filter(|(_, _, b)| b.map(|b| b.block_type() == BlockType::Parity).unwrap_or(false))
            .map(|(p, _, _)| p)
            .collect();
        prop_assert_eq!(parity_slots, vec![stripe.parity_position()]);
        prop_assert!(stripe.verify_parity()?);
    }

    /// Property: any single missing slot is recovered bit-identical.
    #[test]
    fn prop_single_loss_is_recovered(
        (width, blocks) in stripe_strategy(),
        stripe_index in 0u64..100,
        lost in any::<prop::sample::Index>(),
    ) {
        let data = blocks.into_iter().map(Bytes::from).collect();
        let stripe = Stripe::assemble("f", stripe_index, nodes(width), data)?;
        let lost = lost.index(width);

        let original = payloads(&stripe);
        let mut damaged = original.clone();
        damaged[lost] = None;

        let recovered = stripe.detached().recover_block(lost, &damaged)?;
        prop_assert_eq!(recovered.payload(), original[lost].as_ref());
        prop_assert_eq!(recovered.block_type(), stripe.block_type_at(lost));
    }

    /// Property: with two slots missing nothing is recovered.
    #[test]
    fn prop_double_loss_is_not_recovered(
        (width, blocks) in stripe_strategy(),
        a in any::<prop::sample::Index>(),
        b in any::<prop::sample::Index>(),
    ) {
        let (a, b) = (a.index(width), b.index(width));
        prop_assume!(a != b);

        let data = blocks.into_iter().map(Bytes::from).collect();
        let stripe = Stripe::assemble("f", 0, nodes(width), data)?;

        let mut damaged = payloads(&stripe);
        damaged[a] = None;
        damaged[b] = None;

        prop_assert!(stripe.recover_block(a, &damaged).is_err());
        prop_assert!(stripe.recover_block(b, &damaged).is_err());
    }
}

// =============================================================================
// Distributor Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: distribute then reconstruct returns the input followed by
    /// zero padding up to a whole number of stripes.
    #[test]
    fn prop_distribute_roundtrip(
        (width, block_size) in layout_strategy(),
        data in prop::collection::vec(any::<u8>(), 0..2000),
    ) {
        let descriptors: Vec<NodeDescriptor> = (0..width)
            .map(|i| NodeDescriptor::new(format!("node{}", i), block_size as u64, 1 << 24))
            .collect();
        let cluster = Arc::new(MemoryCluster::with_nodes(&descriptors));
        let registry = Arc::new(MetadataRegistry::new());
        let events = Arc::new(InMemoryEventCollector::new());

        let output = tokio_test::block_on(async {
            let monitor = Arc::new(NodeMonitor::new(
                NodeMonitorConfig::default(),
                &descriptors,
                cluster.clone(),
                registry.clone(),
                events.clone(),
            )?);
            monitor.run_cycle().await;

            let distributor = FileDistributor::new(
                DistributorConfig::default(),
                registry.clone(),
                monitor,
                cluster.clone(),
                events.clone(),
            )?;
            let file_id = distributor.distribute("prop", data.as_slice()).await?;
            distributor.reconstruct(&file_id).await
        })?;

        let stripe_bytes = (width - 1) * block_size;
        let expected_len = data.len().div_ceil(stripe_bytes) * stripe_bytes;

        prop_assert_eq!(output.data.len(), expected_len);
        prop_assert_eq!(&output.data[..data.len()], data.as_slice());
        prop_assert!(output.data[data.len()..].iter().all(|b| *b == 0));
        prop_assert!(output.lost_stripes.is_empty());
    }
}
