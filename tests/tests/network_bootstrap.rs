//! Integration test: network formation and DHT bootstrap over real TCP
//! sockets.
//!
//! Exercises the complete lifecycle end to end, against ephemeral-port
//! `TcpTransport`s rather than an in-process stub:
//! 1. Bind a chain of nodes, each with an empty routing table but a
//!    bootstrap contact pointing at the previous node.
//! 2. Each node bootstraps (self-lookup through its contact).
//! 3. The last node in the chain runs `iterative_find` against the
//!    first and finds it, per spec.md S5.
//! 4. A fresh, never-bootstrapped node's routing table stays empty
//!    (property 1/2).

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

/// Bind `n` chained nodes (node `i` bootstraps from node `i - 1`) and
/// spawn their serve loops. Returns the nodes plus a shutdown sender the
/// caller must fire once done.
async fn spin_up_chain(n: usize) -> (Vec<Arc<DhtNode<kad_net::TcpTransport>>>, broadcast::Sender<()>) {
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut nodes = Vec::new();

    for _ in 0..n {
        let bootstrap = nodes.last().map(|prev: &Arc<DhtNode<kad_net::TcpTransport>>| {
            prev.self_peer().clone()
        });
        let node = DhtNode::bind(Id::random(), loopback(), bootstrap, NodeConfig::default())
            .await
            .expect("bind");
        let node = Arc::new(node);
        let rx = shutdown_tx.subscribe();
        let spawned = node.clone();
        tokio::spawn(async move { spawned.serve(rx).await });
        nodes.push(node);
    }

    (nodes, shutdown_tx)
}

fn closest_peer(nodes: &[Peer], id: Id) -> Option<&Peer> {
    nodes.iter().find(|p| p.id == id)
}

#[tokio::test]
async fn test_s5_lookup_converges_over_real_tcp() {
    let (nodes, shutdown_tx) = spin_up_chain(3).await;
    let a_id = nodes[0].self_peer().id;
    let b_id = nodes[1].self_peer().id;

    for node in &nodes {
        node.bootstrap().await;
    }

    let found = nodes[2].iterative_find(a_id).await;
    assert!(
        closest_peer(&found, a_id).is_some(),
        "chain tail should discover the chain head"
    );
    assert!(
        closest_peer(&found, b_id).is_some(),
        "chain tail should discover its direct bootstrap contact"
    );

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn test_fresh_node_table_starts_empty_property_1_2() {
    let (nodes, shutdown_tx) = spin_up_chain(1).await;
    let found = nodes[0].iterative_find(Id::random()).await;
    assert!(found.is_empty(), "an unbootstrapped node knows no peers");
    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn test_bootstrap_peer_never_learns_itself() {
    let (nodes, shutdown_tx) = spin_up_chain(2).await;
    nodes[1].bootstrap().await;

    let self_id = nodes[1].self_peer().id;
    let found = nodes[1].iterative_find(self_id).await;
    assert!(
        closest_peer(&found, self_id).is_none(),
        "a lookup never returns the querying node itself"
    );

    tokio::time::sleep(Duration::from_millis(10)).await;
    let _ = shutdown_tx.send(());
}
