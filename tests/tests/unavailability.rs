//! Integration test: unresponsive-peer accounting and eviction over real
//! TCP (spec.md S7, property 8).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use kad_id::Id;
use kad_node::{DhtNode, NodeConfig};
use kad_table::Peer;
use tokio::sync::broadcast;

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().expect("valid socket address")
}

/// A peer address nothing is listening on, so every call against it
/// fails fast (connection refused) rather than waiting out the timeout.
fn dead_peer() -> Peer {
    Peer::new(Id::random(), "127.0.0.1", 1)
}

#[tokio::test]
async fn test_s7_dead_peer_evicted_after_r_failures() {
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut config = NodeConfig::default();
    config.call_timeout = Duration::from_millis(200);

    let node = DhtNode::bind(Id::random(), loopback(), None, config)
        .await
        .expect("bind");
    let node = Arc::new(node);
    let rx = shutdown_tx.subscribe();
    let spawned = node.clone();
    tokio::spawn(async move { spawned.serve(rx).await });

    let dead = dead_peer();
    node.table().lock().await.update(dead.clone());

    // R - 1 failures: the peer is marked unavailable but stays in the
    // table.
    for _ in 0..(kad_table::R - 1) {
        node.iterative_find(Id::random()).await;
    }
    {
        let table = node.table().lock().await;
        assert_eq!(table.unavailability_count(&dead.id), kad_table::R - 1);
        assert_eq!(table.len(), 1);
    }

    // The R-th failure trips the threshold and evicts the peer.
    node.iterative_find(Id::random()).await;
    {
        let table = node.table().lock().await;
        assert_eq!(table.unavailability_count(&dead.id), 0);
        assert_eq!(table.len(), 0, "peer evicted after R consecutive failures");
    }

    let _ = shutdown_tx.send(());
}
