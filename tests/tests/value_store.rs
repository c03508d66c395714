//! Integration test: STORE_VALUE/GET_VALUE across a meshed set of real
//! TCP peers (spec.md S6).

use std::net::SocketAddr;
use std::sync::Arc;

use kad_id::Id;
use kad_node::{DhtNode, NodeConfig};
use tokio::sync::broadcast;

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().expect("valid socket address")
}

#[tokio::test]
async fn test_s6_put_get_across_meshed_tcp_peers() {
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut nodes = Vec::new();

    for _ in 0..5 {
        let node = DhtNode::bind(Id::random(), loopback(), None, NodeConfig::default())
            .await
            .expect("bind");
        let node = Arc::new(node);
        let rx = shutdown_tx.subscribe();
        let spawned = node.clone();
        tokio::spawn(async move { spawned.serve(rx).await });
        nodes.push(node);
    }

    // Give every node full knowledge of every other node directly,
    // exercising the real STORE_VALUE/GET_VALUE wire path without
    // depending on how far a bootstrap chain happens to converge.
    for a in &nodes {
        for b in &nodes {
            if a.self_peer().id != b.self_peer().id {
                a.table().lock().await.update(b.self_peer().clone());
            }
        }
    }

    nodes[0].put("foo", "bar").await.expect("put succeeds");
    let got = nodes[4].get("foo").await;
    assert_eq!(got, Some("bar".to_string()));

    let miss = nodes[3].get("never-stored-key").await;
    assert_eq!(miss, None);

    let _ = shutdown_tx.send(());
}
