//! ParityStore Integration Tests
//!
//! End-to-end scenarios through the cluster controller on an in-memory
//! cluster:
//! - Upload, download and delete across a full-width cluster
//! - Degraded mode and node loss between upload and download
//! - Rebuild of a node returning from an outage

use std::sync::Arc;
use std::time::Duration;

use paritystore::adapters::{InMemoryEventCollector, MemoryCluster};
use paritystore::config::ClusterConfig;
use paritystore::controller::ClusterController;
use paritystore::domain::NodeId;
use paritystore::error::Error;

struct TestCluster {
    controller: Arc<ClusterController>,
    cluster: Arc<MemoryCluster>,
    events: Arc<InMemoryEventCollector>,
    nodes: Vec<NodeId>,
}

fn cluster(n: usize, block_size: u64) -> TestCluster {
    let config = ClusterConfig::uniform(
        (0..n).map(|i| format!("http://disk{}:8001", i)),
        block_size,
        1 << 20,
    )
    .with_poll_interval(Duration::from_millis(20));

    let nodes = config.nodes.iter().map(|d| d.id.clone()).collect();
    let cluster = Arc::new(MemoryCluster::with_nodes(&config.nodes));
    let events = Arc::new(InMemoryEventCollector::new());
    let controller = ClusterController::new(config, cluster.clone(), events.clone()).unwrap();

    TestCluster {
        controller,
        cluster,
        events,
        nodes,
    }
}

fn sample(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 199) as u8 ^ 0x5A).collect()
}

// =============================================================================
// Storage Round Trips
// =============================================================================

mod storage_tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip_across_many_stripes() {
        let t = cluster(4, 512);
        t.controller.refresh_nodes().await;
        let input = sample(20_000);

        let file_id = t.controller.upload_file("archive.tar", input.as_slice()).await.unwrap();
        let data = t.controller.download_file(&file_id).await.unwrap();

        // 3 data blocks of 512 bytes per stripe: 14 stripes, 21,504 bytes
        let file = t.controller.registry().get_stored_file(&file_id).unwrap();
        assert_eq!(file.stripes.len(), 14);
        assert_eq!(data.len(), 14 * 3 * 512);
        assert_eq!(&data[..20_000], input.as_slice());
        assert!(data[20_000..].iter().all(|b| *b == 0));

        // Each node holds exactly one block per stripe
        for node in &t.nodes {
            assert_eq!(t.cluster.block_count(node), 14);
        }
    }

    #[tokio::test]
    async fn test_parity_rotates_over_nodes() {
        let t = cluster(4, 16);
        t.controller.refresh_nodes().await;

        let file_id = t.controller.upload_file("rot", sample(16 * 3 * 8).as_slice()).await.unwrap();
        let file = t.controller.registry().get_stored_file(&file_id).unwrap();

        for stripe in &file.stripes {
            let position = (stripe.stripe_index() % 4) as usize;
            assert_eq!(stripe.parity_position(), position);
            let parity_id = format!("{}_p", stripe.stripe_id());
            assert!(t.cluster.block(&t.nodes[position], &parity_id).is_some());
        }
    }

    #[tokio::test]
    async fn test_delete_removes_every_block() {
        let t = cluster(3, 64);
        t.controller.refresh_nodes().await;

        let keep = t.controller.upload_file("keep", sample(500).as_slice()).await.unwrap();
        let drop = t.controller.upload_file("drop", sample(700).as_slice()).await.unwrap();
        let kept_blocks = t
            .controller
            .registry()
            .get_stored_file(&keep)
            .unwrap()
            .block_count();

        t.controller.delete_file(&drop).await.unwrap();

        assert_eq!(t.cluster.total_blocks(), kept_blocks);
        assert_eq!(t.controller.list_files(None).len(), 1);
        assert_eq!(&t.controller.download_file(&keep).await.unwrap()[..500], sample(500).as_slice());
        assert!(matches!(
            t.controller.download_file(&drop).await,
            Err(Error::NotFound(_))
        ));
    }
}

// =============================================================================
// Failure Handling
// =============================================================================

mod failure_tests {
    use super::*;

    #[tokio::test]
    async fn test_download_survives_any_single_node_loss() {
        let t = cluster(4, 32);
        t.controller.refresh_nodes().await;
        let input = sample(1000);
        let file_id = t.controller.upload_file("f", input.as_slice()).await.unwrap();

        for node in &t.nodes {
            t.cluster.set_down(node, true);
            let read = t.controller.read_file(&file_id).await.unwrap();
            assert!(read.is_complete());
            assert_eq!(&read.data[..1000], input.as_slice());
            t.cluster.set_down(node, false);
        }
    }

    #[tokio::test]
    async fn test_two_lost_nodes_drop_stripes_without_fabricating() {
        let t = cluster(4, 8);
        t.controller.refresh_nodes().await;
        let input = sample(24 * 4);
        let file_id = t.controller.upload_file("f", input.as_slice()).await.unwrap();

        t.cluster.set_down(&t.nodes[1], true);
        t.cluster.set_down(&t.nodes[3], true);
        let read = t.controller.read_file(&file_id).await.unwrap();

        assert_eq!(read.lost_stripes, vec![0, 1, 2, 3]);
        assert!(read.data.is_empty());
        assert_eq!(t.events.events_of_type("StripeUnrecoverable").len(), 4);
    }

    #[tokio::test]
    async fn test_degraded_upload_reads_back_after_node_returns() {
        let t = cluster(4, 16);
        t.cluster.set_down(&t.nodes[1], true);
        t.controller.refresh_nodes().await;

        let input = sample(100);
        let file_id = t.controller.upload_file("degraded", input.as_slice()).await.unwrap();
        let file = t.controller.registry().get_stored_file(&file_id).unwrap();
        assert!(file.degraded);
        assert_eq!(file.stripes[0].total_blocks(), 3);
        assert!(!file.uses_node(&t.nodes[1]));

        // The returning node changes the snapshot, not the stored layout
        t.cluster.set_down(&t.nodes[1], false);
        let report = t.controller.refresh_nodes().await;
        assert_eq!(report.recovered, vec![t.nodes[1].clone()]);

        let data = t.controller.download_file(&file_id).await.unwrap();
        assert_eq!(&data[..100], input.as_slice());
    }

    #[tokio::test]
    async fn test_misconfigured_node_is_left_out() {
        let t = cluster(4, 16);
        t.cluster.set_reported_block_size(&t.nodes[3], 32);
        t.controller.refresh_nodes().await;

        let file_id = t.controller.upload_file("m", sample(64).as_slice()).await.unwrap();

        assert_eq!(t.cluster.block_count(&t.nodes[3]), 0);
        assert_eq!(t.events.events_of_type("NodeConfigMismatch").len(), 1);
        let file = t.controller.registry().get_stored_file(&file_id).unwrap();
        assert!(file.degraded);
    }

    #[tokio::test]
    async fn test_single_available_node_rejects_upload() {
        let t = cluster(3, 16);
        t.cluster.set_down(&t.nodes[0], true);
        t.cluster.set_down(&t.nodes[2], true);
        t.controller.refresh_nodes().await;

        let result = t.controller.upload_file("x", &b"payload"[..]).await;

        assert!(matches!(
            result,
            Err(Error::InsufficientNodes {
                available: 1,
                required: 2
            })
        ));
        assert_eq!(t.cluster.store_calls(), 0);
        assert!(t.controller.list_files(None).is_empty());
    }
}

// =============================================================================
// Background Rebuild
// =============================================================================

mod rebuild_tests {
    use super::*;

    #[tokio::test]
    async fn test_returning_node_is_refilled() {
        let t = cluster(4, 8);
        t.controller.refresh_nodes().await;
        let input = sample(200);
        let file_id = t.controller.upload_file("big", input.as_slice()).await.unwrap();
        let expected = t.cluster.block_count(&t.nodes[0]);

        let tasks = t.controller.spawn_background();

        // node0 fails and comes back empty
        t.cluster.set_down(&t.nodes[0], true);
        let file = t.controller.registry().get_stored_file(&file_id).unwrap();
        for stripe in &file.stripes {
            t.cluster
                .remove_block(&t.nodes[0], stripe.block(0).unwrap().block_id());
        }
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(t.controller.monitor().available_nodes().len(), 3);
        t.cluster.set_down(&t.nodes[0], false);

        let mut refilled = false;
        for _ in 0..200 {
            if t.cluster.block_count(&t.nodes[0]) == expected {
                refilled = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(refilled);

        // Every block is back in place: no recovery needed on read
        let read = t.controller.read_file(&file_id).await.unwrap();
        assert!(read.recovered_stripes.is_empty());
        assert_eq!(&read.data[..200], input.as_slice());

        t.controller.shutdown();
        tokio::time::timeout(Duration::from_secs(1), tasks.join())
            .await
            .unwrap();
    }
}
