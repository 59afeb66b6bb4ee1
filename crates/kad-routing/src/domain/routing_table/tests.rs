//! Tests for the node table and join backoff.

use super::*;
use crate::domain::{
    bucket_index, closer_to_target, AddNodeOutcome, FailReason, NatType, NodeId, NodeRecord,
};
use proptest::prelude::*;
use std::net::SocketAddr;
use std::time::Duration;

fn make_node_id(val: u8) -> NodeId {
    let mut bytes = [0u8; 32];
    bytes[0] = val;
    NodeId::new(bytes)
}

fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([10, 0, 0, 1], port))
}

fn make_record(id: NodeId, port: u16) -> NodeRecord {
    NodeRecord::new(id)
        .with_public_addr(addr(port))
        .with_local_addr(addr(port))
        .with_nat_type(NatType::Public)
        .with_xid(id.to_vec())
}

fn make_table() -> NodeTable {
    NodeTable::new(NodeId::zero(), 42, K, ROUTING_MAX_NODES_SIZE)
}

/// Ids that all land in bucket 256 relative to the zero id.
fn far_id(i: u8) -> NodeId {
    let mut bytes = [0u8; 32];
    bytes[0] = 0x80;
    bytes[31] = i;
    NodeId::new(bytes)
}

// =============================================================================
// Admission
// =============================================================================

#[test]
fn test_add_assigns_bucket_index() {
    let mut table = make_table();
    let id = make_node_id(0x40);

    assert_eq!(table.add(make_record(id, 9000)), Ok(AddNodeOutcome::Success));

    let node = table.get(&id).expect("admitted");
    assert_eq!(node.bucket_index, 255);
    assert_eq!(table.bucket(255).map(KBucket::len), Some(1));
}

#[test]
fn test_self_is_rejected() {
    let mut table = make_table();
    let record = make_record(NodeId::zero(), 9000);

    assert_eq!(table.add(record), Err(FailReason::SelfNode));
    assert!(table.is_empty());
}

#[test]
fn test_unknown_nat_is_rejected() {
    let mut table = make_table();
    let record = make_record(make_node_id(1), 9000).with_nat_type(NatType::Unknown);

    assert_eq!(table.add(record), Err(FailReason::UnknownNatType));
}

#[test]
fn test_missing_or_zero_endpoint_is_rejected() {
    let mut table = make_table();
    let no_addr = NodeRecord::new(make_node_id(1)).with_nat_type(NatType::Public);
    let zero_port = make_record(make_node_id(2), 0);

    assert_eq!(table.add(no_addr), Err(FailReason::InvalidRecord));
    assert_eq!(table.add(zero_port), Err(FailReason::InvalidRecord));
}

#[test]
fn test_duplicate_returns_already_exists() {
    let mut table = make_table();
    let id = make_node_id(7);
    table.add(make_record(id, 9000)).expect("first add");

    let outcome = table.add(make_record(id, 9001));

    assert_eq!(outcome, Ok(AddNodeOutcome::AlreadyExists));
    assert_eq!(table.len(), 1);
    assert_eq!(table.get(&id).and_then(|n| n.public_addr), Some(addr(9000)));
}

#[test]
fn test_full_bucket_rejects_next_candidate() {
    let mut table = make_table();
    for i in 0..K as u8 {
        assert_eq!(table.add(make_record(far_id(i), 9000 + i as u16)), Ok(AddNodeOutcome::Success));
    }

    let extra = make_record(far_id(200), 9500);
    assert!(!table.can_add(&extra));
    assert_eq!(table.add(extra), Err(FailReason::BucketFull(256)));
    assert_eq!(table.len(), K);
}

#[test]
fn test_drop_frees_bucket_slot() {
    let mut table = make_table();
    for i in 0..K as u8 {
        table.add(make_record(far_id(i), 9000 + i as u16)).expect("add");
    }

    assert!(table.remove(&far_id(0)).is_some());

    assert!(table.can_add(&make_record(far_id(200), 9500)));
}

#[test]
fn test_remove_absent_is_noop() {
    let mut table = make_table();
    assert!(table.remove(&make_node_id(9)).is_none());
    assert_eq!(table.hash_index_len(), 1);
}

#[test]
fn test_table_capacity_is_enforced() {
    let mut table = NodeTable::new(NodeId::zero(), 0, K, 2);
    table.add(make_record(make_node_id(0x80), 9000)).expect("add");
    table.add(make_record(make_node_id(0x40), 9001)).expect("add");

    assert_eq!(
        table.add(make_record(make_node_id(0x20), 9002)),
        Err(FailReason::TableFull)
    );
}

proptest! {
    #[test]
    fn prop_bucket_never_exceeds_k(ids in proptest::collection::vec(any::<[u8; 32]>(), 1..200)) {
        let mut table = make_table();
        for (i, bytes) in ids.iter().enumerate() {
            let id = NodeId::new(*bytes);
            let bucket = bucket_index(table.local_id(), &id);
            let before = table.bucket(bucket).map(KBucket::len).unwrap_or(0);
            let result = table.add(make_record(id, 1000 + i as u16));
            if before >= K && id != NodeId::zero() && !table.contains(&id) {
                prop_assert_eq!(result, Err(FailReason::BucketFull(bucket)));
            }
            for index in 0..NUM_BUCKETS as u32 {
                prop_assert!(table.bucket(index).map(KBucket::len).unwrap_or(0) <= K);
            }
        }
    }

    #[test]
    fn prop_self_never_admitted(port in 1u16..=u16::MAX, nat in 1u8..4) {
        let mut table = make_table();
        let record = make_record(NodeId::zero(), port).with_nat_type(NatType::from_u8(nat));
        prop_assert!(table.add(record).is_err());
        prop_assert!(table.is_empty());
    }

    #[test]
    fn prop_add_then_remove_restores_sizes(bytes in any::<[u8; 32]>()) {
        let mut table = make_table();
        table.add(make_record(make_node_id(0x11), 9000)).expect("seed");
        let id = NodeId::new(bytes);
        prop_assume!(id != NodeId::zero() && id != make_node_id(0x11));
        let (len, hash_len) = (table.len(), table.hash_index_len());

        table.add(make_record(id, 9001)).expect("add");
        table.remove(&id);

        prop_assert_eq!(table.len(), len);
        prop_assert_eq!(table.hash_index_len(), hash_len);
    }
}

// =============================================================================
// Queries
// =============================================================================

#[test]
fn test_closest_is_ordered_and_deterministic() {
    let mut table = make_table();
    for (i, b) in [0x91u8, 0x12, 0x55, 0x03, 0xC0, 0x21].iter().enumerate() {
        table.add(make_record(make_node_id(*b), 9000 + i as u16)).expect("add");
    }
    let target = make_node_id(0x10);

    let first = table.closest(&target, 4);
    let second = table.closest(&target, 4);

    assert_eq!(first.len(), 4);
    for pair in first.windows(2) {
        assert!(closer_to_target(&pair[0].node_id, &pair[1].node_id, &target));
    }
    let ids: Vec<NodeId> = first.iter().map(|n| n.node_id).collect();
    let again: Vec<NodeId> = second.iter().map(|n| n.node_id).collect();
    assert_eq!(ids, again);
}

#[test]
fn test_range_queries_follow_hash_order() {
    let mut table = NodeTable::new(NodeId::zero(), 500, K, ROUTING_MAX_NODES_SIZE);
    let mut low = make_record(make_node_id(1), 9001);
    low.hash64 = 100;
    let mut high = make_record(make_node_id(2), 9002);
    high.hash64 = 900;
    table.add(low).expect("add");
    table.add(high).expect("add");

    let all = table.range_by_hash(u64::MIN, u64::MAX);
    assert_eq!(all.iter().map(|n| n.hash64).collect::<Vec<_>>(), vec![100, 900]);
    assert_eq!(table.range_by_hash(0, 499).len(), 1);
    assert_eq!(table.self_index(), 1);
    // Index 1 is the local node.
    assert_eq!(table.range_by_index(1, 2).iter().map(|n| n.hash64).collect::<Vec<_>>(), vec![900]);
}

#[test]
fn test_range_by_index_accepts_open_end() {
    let mut table = NodeTable::new(NodeId::zero(), 500, K, ROUTING_MAX_NODES_SIZE);
    let mut low = make_record(make_node_id(1), 9001);
    low.hash64 = 100;
    let mut high = make_record(make_node_id(2), 9002);
    high.hash64 = 900;
    table.add(low).expect("add");
    table.add(high).expect("add");

    assert_eq!(table.range_by_index(0, usize::MAX).len(), 2);
    assert_eq!(table.range_by_index(usize::MAX, usize::MAX).len(), 0);
}

#[test]
fn test_random_node_from_empty_table_is_none() {
    assert!(make_table().random_node().is_none());
}

// =============================================================================
// Join backoff
// =============================================================================

#[test]
fn test_join_backoff_doubles_after_retry_times_and_caps() {
    let mut backoff = JoinBackoff::new(Duration::from_secs(4), Duration::from_secs(128), 5);
    let mut waits = vec![backoff.current_wait().as_secs()];
    for _ in 0..12 {
        waits.push(backoff.on_round_failed().as_secs());
    }

    assert_eq!(waits, vec![4, 4, 4, 4, 4, 4, 8, 16, 32, 64, 128, 128, 128]);
    assert!(waits.windows(2).all(|w| w[0] <= w[1]));
}
