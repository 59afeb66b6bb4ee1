//! # Join Integration Tests
//!
//! Nodes run in-process over a [`MemoryNetwork`] with the tokio scheduler,
//! so every timer, NAT detection round and join wait is real.
//!
//! 1. A first node starts public and joined
//! 2. A second node classifies itself against the first and joins through it
//! 3. A third node discovers the second through find-nodes
//! 4. Stopping a node removes it from its peers' tables

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use kad_routing::{
    KadNode, MemoryNetwork, MemoryTransport, NatType, NodeConfig, NodeDependencies, NodeId,
    RoutingConfig, TokioScheduler, Transport,
};
use tokio::runtime::Handle;
use tokio::time::{sleep, timeout};

fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

fn id(first: u8) -> NodeId {
    let mut bytes = [0u8; 32];
    bytes[0] = first;
    bytes[31] = 1;
    NodeId::new(bytes)
}

async fn start_node(
    network: &Arc<MemoryNetwork>,
    port: u16,
    node_id: NodeId,
    bootstrap: Option<SocketAddr>,
) -> KadNode {
    let transport: Arc<dyn Transport> =
        MemoryTransport::bind(network, addr(port)).expect("bind memory endpoint");
    let scheduler = Arc::new(TokioScheduler::new(Handle::current()));

    let mut config = NodeConfig::new(addr(port));
    config.node_id = Some(node_id);
    match bootstrap {
        Some(endpoint) => config.public_endpoints = vec![endpoint],
        None => config.first_node = true,
    }

    KadNode::start(
        config,
        RoutingConfig::for_testing(),
        NodeDependencies::new(transport, scheduler),
    )
    .await
    .expect("node starts")
}

/// Poll `check` until it holds or the deadline passes.
async fn eventually(what: &str, check: impl Fn() -> bool) {
    let polled = timeout(Duration::from_secs(5), async {
        while !check() {
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(polled.is_ok(), "timed out waiting for {what}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_second_node_joins_through_first() {
    let network = MemoryNetwork::new();
    let a = start_node(&network, 9001, id(0x10), None).await;
    assert!(a.routing().is_joined());
    assert_eq!(a.routing().local_node().nat_type(), NatType::Public);

    let b = start_node(&network, 9002, id(0x90), Some(addr(9001))).await;
    assert_eq!(b.routing().local_node().nat_type(), NatType::Public);
    assert!(!b.routing().is_joined());

    timeout(Duration::from_secs(5), b.join())
        .await
        .expect("join finishes")
        .expect("join succeeds");

    assert!(b.routing().is_joined());
    assert_eq!(b.routing().bootstrap_id(), Some(a.id()));
    assert_eq!(b.routing().local_node().public_addr(), Some(addr(9002)));

    eventually("both tables hold the peer", || {
        a.routing().has_node(&b.id()) && b.routing().has_node(&a.id())
    })
    .await;
    assert_eq!(a.routing().nodes_size(), 1);
    assert_eq!(b.routing().nodes_size(), 1);

    b.stop();
    eventually("first node drops the quitting peer", || {
        a.routing().nodes_size() == 0
    })
    .await;
    a.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_right_after_join_stays_dropped() {
    let network = MemoryNetwork::new();
    let a = start_node(&network, 9401, id(0x10), None).await;

    for round in 0..5u16 {
        let b = start_node(&network, 9410 + round, id(0x90 + round as u8), Some(addr(9401))).await;
        b.join().await.expect("join succeeds");
        b.stop();

        eventually("first node drops the quitting peer", || {
            !a.routing().has_node(&b.id())
        })
        .await;
        // a late find-nodes request must not bring it back
        sleep(Duration::from_millis(300)).await;
        assert!(
            !a.routing().has_node(&b.id()),
            "round {round}: stopped peer was re-added"
        );
    }
    a.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_third_node_discovers_second() {
    let network = MemoryNetwork::new();
    let a = start_node(&network, 9101, id(0x10), None).await;
    let b = start_node(&network, 9102, id(0x90), Some(addr(9101))).await;
    b.join().await.expect("second node joins");

    let c = start_node(&network, 9103, id(0xd0), Some(addr(9101))).await;
    c.join().await.expect("third node joins");

    eventually("every node knows the other two", || {
        [&a, &b, &c]
            .iter()
            .all(|node| node.routing().nodes_size() == 2)
    })
    .await;
    assert!(c.routing().has_node(&b.id()));
    assert!(b.routing().has_node(&c.id()));

    c.stop();
    b.stop();
    a.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_join_without_reachable_bootstrap_keeps_waiting() {
    let network = MemoryNetwork::new();
    let lonely = start_node(&network, 9201, id(0x40), Some(addr(9299))).await;

    // nat detection has nobody to ask
    assert_eq!(lonely.routing().local_node().nat_type(), NatType::Unknown);
    let joined = timeout(Duration::from_millis(800), lonely.join()).await;
    assert!(joined.is_err(), "join must not finish without a bootstrap");
    assert!(!lonely.routing().is_joined());

    lonely.stop();
}
