//! Tests for the routing table service

use super::*;
use crate::domain::{
    AddNodeOutcome, BloomFilter, LocalNodeInfo, NatType, NodeId, NodeRecord, RoutingConfig,
};
use crate::error::KadError;
use crate::ports::{
    MessagePolicy, OfflineCallback, PacketHandler, RelayDecision, RoutingEvent, TimeSource,
    Transport, TransportError,
};
use crate::protocol::{
    decode_message, decode_payload, encode_payload, BootstrapJoinRequest, BootstrapJoinResponse,
    FindClosestNodesRequest, FindClosestNodesResponse, Handshake, HandshakeKind, Heartbeat,
    JoinStatus, MessageType, NodeQuit, Priority, RoutingMessage, WireNode,
};
use crate::service::heartbeat::HeartbeatMonitor;
use crate::test_utils::{FixedTimeSource, ManualScheduler, RecordingTransport};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

const LOCAL_PORT: u16 = 9000;

fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

fn id(prefix: u8, suffix: u8) -> NodeId {
    let mut bytes = [0u8; 32];
    bytes[0] = prefix;
    bytes[31] = suffix;
    NodeId::new(bytes)
}

fn peer(prefix: u8, suffix: u8, port: u16) -> NodeRecord {
    NodeRecord::new(id(prefix, suffix))
        .with_public_addr(addr(port))
        .with_local_addr(addr(port))
        .with_nat_type(NatType::Public)
}

#[derive(Default)]
struct RecordingPolicy {
    events: Mutex<Vec<RoutingEvent>>,
    swallow_relays: bool,
}

impl MessagePolicy for RecordingPolicy {
    fn on_report(&self, event: &RoutingEvent) {
        self.events.lock().push(event.clone());
    }

    fn on_custom_relay(&self, _message: &RoutingMessage) -> RelayDecision {
        if self.swallow_relays {
            RelayDecision::Handled
        } else {
            RelayDecision::Continue
        }
    }
}

struct Fixture {
    scheduler: ManualScheduler,
    transport: Arc<RecordingTransport>,
    time: Arc<FixedTimeSource>,
    monitor: Arc<HeartbeatMonitor>,
    policy: Arc<RecordingPolicy>,
    table: Arc<RoutingTable>,
}

fn fixture_with(first_node: bool, policy: RecordingPolicy) -> Fixture {
    let scheduler = ManualScheduler::new();
    let transport = Arc::new(RecordingTransport::new(addr(LOCAL_PORT)));
    let time = Arc::new(FixedTimeSource::new(1_000_000));
    let monitor = Arc::new(HeartbeatMonitor::new());
    let policy = Arc::new(policy);
    let local = LocalNodeInfo::new(NodeId::zero(), addr(LOCAL_PORT))
        .with_first_node(first_node)
        .with_nat_type(NatType::Public);
    let table = RoutingTableBuilder::new(RoutingConfig::for_testing(), Arc::new(local))
        .transport(transport.clone())
        .scheduler(Arc::new(scheduler.clone()))
        .time_source(time.clone())
        .heartbeat_monitor(monitor.clone())
        .policy(policy.clone())
        .build()
        .expect("build");
    Fixture {
        scheduler,
        transport,
        time,
        monitor,
        policy,
        table,
    }
}

fn fixture(first_node: bool) -> Fixture {
    fixture_with(first_node, RecordingPolicy::default())
}

fn message_from<T: serde::Serialize>(
    kind: MessageType,
    src: NodeId,
    des: Option<NodeId>,
    payload: &T,
) -> RoutingMessage {
    let mut message = RoutingMessage::new(kind, 42);
    message.src_node_id = src.to_vec();
    if let Some(des) = des {
        message.des_node_id = des.to_vec();
    }
    message.data = encode_payload(payload).expect("encode");
    message
}

// =============================================================================
// Construction
// =============================================================================

#[test]
fn test_build_requires_transport() {
    let local = LocalNodeInfo::new(NodeId::zero(), addr(LOCAL_PORT));
    let result = RoutingTableBuilder::new(RoutingConfig::for_testing(), Arc::new(local))
        .scheduler(Arc::new(ManualScheduler::new()))
        .build();
    assert!(matches!(result, Err(KadError::NotInitialized("transport"))));
}

#[test]
fn test_build_requires_scheduler() {
    let local = LocalNodeInfo::new(NodeId::zero(), addr(LOCAL_PORT));
    let result = RoutingTableBuilder::new(RoutingConfig::for_testing(), Arc::new(local))
        .transport(Arc::new(RecordingTransport::new(addr(LOCAL_PORT))))
        .build();
    assert!(matches!(result, Err(KadError::NotInitialized("scheduler"))));
}

// =============================================================================
// Membership
// =============================================================================

#[test]
fn test_add_and_drop_keep_snapshot_in_step() {
    let f = fixture(true);
    let node = peer(0x80, 1, 9101);

    assert_eq!(f.table.add_node(node.clone()).unwrap(), AddNodeOutcome::Success);
    assert_eq!(f.table.add_node(node).unwrap(), AddNodeOutcome::AlreadyExists);
    assert!(f.table.has_node(&id(0x80, 1)));
    assert_eq!(f.table.nodes().len(), 1);
    assert_eq!(f.table.probe().snapshot_len(), 1);

    assert!(f.table.drop_node(&id(0x80, 1)).is_some());
    assert!(f.table.drop_node(&id(0x80, 1)).is_none());
    assert_eq!(f.table.nodes_size(), 0);
    assert_eq!(f.table.probe().snapshot_len(), 0);
    assert_eq!(
        *f.policy.events.lock(),
        vec![
            RoutingEvent::NodeAdded(id(0x80, 1)),
            RoutingEvent::NodeDropped(id(0x80, 1))
        ]
    );
}

#[test]
fn test_full_bucket_refuses_and_keeps_residents() {
    let f = fixture(true);
    for n in 1..=3 {
        f.table.add_node(peer(0x80, n, 9100 + n as u16)).unwrap();
    }
    let bucket = id(0x80, 1);
    let index = crate::domain::bucket_index(&NodeId::zero(), &bucket);

    let refused = f.table.add_node(peer(0x80, 4, 9104));
    assert!(matches!(refused, Err(KadError::Failed(_))));
    assert!(!f.table.can_add_node(&peer(0x80, 5, 9105)));
    assert_eq!(f.table.probe().bucket_len(index), 3);
    for n in 1..=3 {
        assert!(f.table.has_node(&id(0x80, n)));
    }
}

#[test]
fn test_unknown_nat_and_self_are_refused() {
    let f = fixture(true);
    let unknown = NodeRecord::new(id(0x40, 1)).with_public_addr(addr(9200));
    assert!(f.table.add_node(unknown).is_err());

    let itself = NodeRecord::new(NodeId::zero())
        .with_public_addr(addr(9201))
        .with_nat_type(NatType::Public);
    assert!(f.table.add_node(itself).is_err());
    assert_eq!(f.table.nodes_size(), 0);
}

#[test]
fn test_closest_nodes_are_ordered_by_distance() {
    let f = fixture(true);
    f.table.add_node(peer(0x80, 1, 9101)).unwrap();
    f.table.add_node(peer(0x10, 1, 9102)).unwrap();
    f.table.add_node(peer(0x01, 1, 9103)).unwrap();

    let closest = f.table.get_closest_nodes(&NodeId::zero(), 2);
    let ids: Vec<NodeId> = closest.iter().map(|n| n.node_id).collect();
    assert_eq!(ids, vec![id(0x01, 1), id(0x10, 1)]);
    assert!(f.table.get_closest_nodes(&NodeId::zero(), 0).is_empty());
}

#[test]
fn test_closest_to_target() {
    let f = fixture(true);
    assert!(matches!(
        f.table.closest_to_target(&NodeId::zero()),
        Err(KadError::InvalidNode(_))
    ));
    assert!(f.table.closest_to_target(&id(0x80, 9)).unwrap());

    f.table.add_node(peer(0x80, 1, 9101)).unwrap();
    assert!(!f.table.closest_to_target(&id(0x80, 9)).unwrap());
    assert!(f.table.closest_to_target(&id(0x01, 9)).unwrap());
    assert!(f.table.is_destination(&id(0x01, 9), true));
    assert!(!f.table.is_destination(&id(0x01, 9), false));
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn test_first_node_is_joined_after_init() {
    let f = fixture(true);
    f.table.init().unwrap();

    assert!(f.table.is_joined());
    assert_eq!(f.table.bootstrap_id(), Some(NodeId::zero()));
    let names = f.scheduler.timer_names();
    assert!(names.contains(&"routing_heartbeat"));
    assert!(names.contains(&"find_neighbours"));
    assert!(names.contains(&"node_detection"));
    assert!(!names.contains(&"routing_rejoin"));
    assert!(matches!(
        block_on(f.table.multi_join(&[addr(9999)])),
        Err(KadError::AlreadyJoined)
    ));
}

#[test]
fn test_non_first_node_starts_rejoin_timer() {
    let f = fixture(false);
    f.table.init().unwrap();
    assert!(!f.table.is_joined());
    assert!(f.scheduler.timer_names().contains(&"routing_rejoin"));
    assert_eq!(f.table.probe().timers_len(), 3);
}

#[test]
fn test_uninit_tells_neighbours_and_stops_timers() {
    let f = fixture(true);
    f.table.init().unwrap();
    f.table.add_node(peer(0x80, 1, 9101)).unwrap();
    f.table.add_node(peer(0x10, 1, 9102)).unwrap();
    f.transport.take_sent();

    f.table.uninit();

    let quits = f.transport.messages_of(MessageType::NodeQuit);
    let mut targets: Vec<SocketAddr> = quits.iter().map(|(_, to)| *to).collect();
    targets.sort();
    assert_eq!(targets, vec![addr(9101), addr(9102)]);
    assert!(f.scheduler.timer_names().is_empty());
    assert!(f.table.probe().is_destroyed());
    assert!(f.table.init().is_err());
}

#[test]
fn test_stopped_table_sends_nothing_but_quit() {
    let f = fixture(false);
    f.table.init().unwrap();
    f.table
        .handle_message(&join_response(id(0x80, 1), addr(5555), JoinStatus::Success), addr(9400));
    f.transport.take_sent();

    f.table.uninit();
    assert_eq!(f.transport.sent().len(), 1);
    assert_eq!(f.transport.messages_of(MessageType::NodeQuit).len(), 1);
    f.transport.take_sent();

    assert_eq!(f.table.find_closest_nodes(0, 8, &[]), 0);
    assert_eq!(f.table.find_closest_nodes(1, 8, &[]), 0);
    assert!(matches!(
        f.table.send_find_closest_nodes(&id(0x80, 1), 8, &[]),
        Err(KadError::ShuttingDown)
    ));
    let message = f.table.new_message(MessageType::Ack, None);
    assert!(matches!(
        f.table.send_to(&message, addr(9400)),
        Err(KadError::ShuttingDown)
    ));
    assert!(f.transport.sent().is_empty());
}

/// Records whether the join waiter was already woken when each find-nodes
/// request left.
struct JoinOrderTransport {
    inner: RecordingTransport,
    joined: Mutex<Option<tokio::sync::watch::Receiver<bool>>>,
    woken_at_find: Mutex<Vec<bool>>,
}

impl Transport for JoinOrderTransport {
    fn send_data(&self, data: &[u8], to: SocketAddr, priority: Priority) -> Result<(), TransportError> {
        let message = decode_message(data).expect("decode");
        if message.kind() == Some(MessageType::FindNodesRequest) {
            let woken = self
                .joined
                .lock()
                .as_ref()
                .map(|joined| *joined.borrow())
                .unwrap_or(false);
            self.woken_at_find.lock().push(woken);
        }
        self.inner.send_data(data, to, priority)
    }

    fn send_ping(&self, data: &[u8], to: SocketAddr) -> Result<(), TransportError> {
        self.inner.send_ping(data, to)
    }

    fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr()
    }

    fn register_receiver(&self, handler: Arc<dyn PacketHandler>) {
        self.inner.register_receiver(handler);
    }

    fn unregister_receiver(&self) {
        self.inner.unregister_receiver();
    }

    fn set_offline_callback(&self, callback: OfflineCallback) {
        self.inner.set_offline_callback(callback);
    }
}

#[test]
fn test_join_waiter_wakes_after_find_nodes_round() {
    let scheduler = ManualScheduler::new();
    let transport = Arc::new(JoinOrderTransport {
        inner: RecordingTransport::new(addr(LOCAL_PORT)),
        joined: Mutex::new(None),
        woken_at_find: Mutex::new(Vec::new()),
    });
    let local = LocalNodeInfo::new(NodeId::zero(), addr(LOCAL_PORT)).with_nat_type(NatType::Public);
    let table = RoutingTableBuilder::new(RoutingConfig::for_testing(), Arc::new(local))
        .transport(transport.clone())
        .scheduler(Arc::new(scheduler))
        .build()
        .expect("build");
    *transport.joined.lock() = Some(table.joined_tx.subscribe());

    table.handle_message(&join_response(id(0x80, 1), addr(5555), JoinStatus::Success), addr(9400));

    assert_eq!(*transport.woken_at_find.lock(), vec![false]);
    assert!(*table.joined_tx.subscribe().borrow());
    table.uninit();
}

#[test]
fn test_rejected_bootstrap_node_is_kept_for_rejoin() {
    let f = fixture(false);
    // k = 3 in the test config; fill the bucket the responder lands in
    for suffix in 2..5 {
        f.table.add_node(peer(0x80, suffix, 9100 + suffix as u16)).unwrap();
    }
    let bootstrap = id(0x80, 1);

    f.table
        .handle_message(&join_response(bootstrap, addr(5555), JoinStatus::Success), addr(9400));

    assert!(!f.table.has_node(&bootstrap));
    assert!(f.table.probe().is_bootstrap_node(&bootstrap));
    assert!(f.table.rejoin_endpoints().contains(&addr(9400)));
}

// =============================================================================
// Bootstrap join
// =============================================================================

#[test]
fn test_bootstrap_request_is_answered_and_requester_added() {
    let f = fixture(true);
    f.table.init().unwrap();
    let joiner = id(0x80, 7);
    let request = BootstrapJoinRequest {
        local_addr: addr(9300),
        nat_type: NatType::ConeNormal,
        xid: vec![7],
        xip: Some(vec![1, 2]),
    };
    let message = message_from(MessageType::BootstrapJoinRequest, joiner, None, &request);

    assert!(f.table.handle_message(&message, addr(9301)));

    let replies = f.transport.messages_of(MessageType::BootstrapJoinResponse);
    assert_eq!(replies.len(), 1);
    let (reply, to) = &replies[0];
    assert_eq!(*to, addr(9301));
    assert_eq!(reply.id, 42);
    assert_eq!(reply.des_id(), Some(joiner));
    let response: BootstrapJoinResponse = decode_payload(&reply.data).unwrap();
    assert_eq!(response.public_addr, addr(9301));
    assert_eq!(response.bootstrap_id, NodeId::zero().to_vec());
    assert_eq!(response.status, JoinStatus::Success);
    assert_eq!(response.dxip, None);

    let node = f.table.get_node(&joiner).expect("requester admitted");
    assert_eq!(node.public_addr, Some(addr(9301)));
    assert_eq!(node.local_addr, Some(addr(9300)));
}

#[test]
fn test_client_requester_gets_dynamic_xip_and_is_not_added() {
    let f = fixture(true);
    let request = BootstrapJoinRequest {
        local_addr: addr(9300),
        nat_type: NatType::ConeNormal,
        xid: vec![7],
        xip: None,
    };
    let mut message = message_from(MessageType::BootstrapJoinRequest, id(0x80, 7), None, &request);
    message.client_msg = true;

    f.table.handle_message(&message, addr(9301));

    let replies = f.transport.messages_of(MessageType::BootstrapJoinResponse);
    let response: BootstrapJoinResponse = decode_payload(&replies[0].0.data).unwrap();
    assert!(response.dxip.is_some());
    assert!(replies[0].0.client_msg);
    assert_eq!(f.table.dynamic_xips().client_count(), 1);
    assert_eq!(f.table.nodes_size(), 0);
}

fn join_response(bootstrap: NodeId, public_addr: SocketAddr, status: JoinStatus) -> RoutingMessage {
    let response = BootstrapJoinResponse {
        public_addr,
        xid: vec![1],
        xip: vec![],
        bootstrap_id: bootstrap.to_vec(),
        nat_type: NatType::Public,
        status,
        dxip: None,
    };
    message_from(
        MessageType::BootstrapJoinResponse,
        bootstrap,
        Some(NodeId::zero()),
        &response,
    )
}

#[test]
fn test_join_response_joins_and_finds_nodes() {
    let f = fixture(false);
    f.table.init().unwrap();
    let bootstrap = id(0x80, 1);

    f.table
        .handle_message(&join_response(bootstrap, addr(5555), JoinStatus::Success), addr(9400));

    assert!(f.table.is_joined());
    assert_eq!(f.table.bootstrap_id(), Some(bootstrap));
    assert_eq!(f.table.bootstrap_addr(), Some(addr(9400)));
    assert_eq!(f.table.local_node().public_addr(), Some(addr(5555)));
    assert!(f.table.has_node(&bootstrap));
    assert!(f.table.probe().is_bootstrap_node(&bootstrap));
    assert!(f.table.probe().after_join());

    let finds = f.transport.messages_of(MessageType::FindNodesRequest);
    assert_eq!(finds.len(), 1);
    assert_eq!(finds[0].1, addr(9400));
    let request: FindClosestNodesRequest = decode_payload(&finds[0].0.data).unwrap();
    assert_eq!(request.target_id, NodeId::zero().to_vec());
    assert!(request.src_nodeinfo.is_some());
    assert!(f
        .policy
        .events
        .lock()
        .contains(&RoutingEvent::Joined { bootstrap }));
}

#[test]
fn test_second_join_response_does_not_rebind() {
    let f = fixture(false);
    f.table
        .handle_message(&join_response(id(0x80, 1), addr(5555), JoinStatus::Success), addr(9400));
    f.table
        .handle_message(&join_response(id(0x10, 1), addr(5555), JoinStatus::Success), addr(9401));

    assert_eq!(f.table.bootstrap_id(), Some(id(0x80, 1)));
    assert!(f.table.has_node(&id(0x10, 1)));
}

#[test]
fn test_forbidden_join_response_is_ignored() {
    let f = fixture(false);
    f.table
        .handle_message(&join_response(id(0x80, 1), addr(5555), JoinStatus::Forbidden), addr(9400));
    assert!(!f.table.is_joined());
    assert_eq!(f.table.nodes_size(), 0);
}

#[test]
fn test_join_response_for_another_node_is_ignored() {
    let f = fixture(false);
    let mut message = join_response(id(0x80, 1), addr(5555), JoinStatus::Success);
    message.des_node_id = id(0x33, 3).to_vec();
    f.table.handle_message(&message, addr(9400));
    assert!(!f.table.is_joined());
}

#[tokio::test]
async fn test_multi_join_completes_when_admitted() {
    let f = fixture(false);
    let table = Arc::clone(&f.table);
    let join = tokio::spawn(async move { table.multi_join(&[addr(9400)]).await });

    while f
        .transport
        .messages_of(MessageType::BootstrapJoinRequest)
        .is_empty()
    {
        tokio::task::yield_now().await;
    }
    let (request, to) = f.transport.messages_of(MessageType::BootstrapJoinRequest)[0].clone();
    assert_eq!(to, addr(9400));
    let body: BootstrapJoinRequest = decode_payload(&request.data).unwrap();
    assert_eq!(body.local_addr, addr(LOCAL_PORT));

    f.table
        .handle_message(&join_response(id(0x80, 1), addr(5555), JoinStatus::Success), addr(9400));

    let result = tokio::time::timeout(Duration::from_secs(5), join)
        .await
        .expect("join finished")
        .expect("task");
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_multi_join_without_endpoints_fails() {
    let f = fixture(false);
    assert!(matches!(
        f.table.multi_join(&[]).await,
        Err(KadError::NoBootstrapEndpoints)
    ));
}

#[test]
fn test_rejoin_after_losing_every_neighbour() {
    let f = fixture(false);
    f.table.init().unwrap();
    f.table
        .handle_message(&join_response(id(0x80, 1), addr(5555), JoinStatus::Success), addr(9400));
    f.table.rejoin_check();
    assert_eq!(f.scheduler.spawned_count(), 0);

    f.table.drop_node(&id(0x80, 1));
    f.scheduler.fire("routing_rejoin");

    assert!(!f.table.is_joined());
    assert!(f.table.probe().is_joining());
    assert!(f.table.probe().has_rejoin_task());
    assert_eq!(f.scheduler.spawned_count(), 1);
    assert!(f.policy.events.lock().contains(&RoutingEvent::Unjoined));

    f.scheduler.fire("routing_rejoin");
    assert_eq!(f.scheduler.spawned_count(), 1);
}

// =============================================================================
// Find nodes
// =============================================================================

#[test]
fn test_find_nodes_request_skips_known_and_target() {
    let f = fixture(true);
    f.table.add_node(peer(0x80, 1, 9101)).unwrap();
    f.table.add_node(peer(0x10, 1, 9102)).unwrap();
    f.table.add_node(peer(0x01, 1, 9103)).unwrap();

    let requester = id(0x40, 1);
    let mut bloom = BloomFilter::for_find_nodes();
    bloom.insert(id(0x10, 1).as_bytes());
    let request = FindClosestNodesRequest {
        count: 8,
        target_id: id(0x01, 1).to_vec(),
        bloomfilter: bloom.to_bytes(),
        src_nodeinfo: Some(WireNode::from_record(&peer(0x40, 1, 9500))),
    };
    let message = message_from(
        MessageType::FindNodesRequest,
        requester,
        Some(NodeId::zero()),
        &request,
    );

    f.table.handle_message(&message, addr(9500));

    let replies = f.transport.messages_of(MessageType::FindNodesResponse);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].1, addr(9500));
    assert_eq!(replies[0].0.des_id(), Some(requester));
    let response: FindClosestNodesResponse = decode_payload(&replies[0].0.data).unwrap();
    let ids: Vec<Vec<u8>> = response.nodes.iter().map(|n| n.id.clone()).collect();
    assert_eq!(ids[0], NodeId::zero().to_vec());
    assert_eq!(response.nodes[0].local_addr, None);
    assert!(ids.contains(&id(0x80, 1).to_vec()));
    assert!(!ids.contains(&id(0x10, 1).to_vec()));
    assert!(!ids.contains(&id(0x01, 1).to_vec()));
    assert!(f.table.has_node(&requester));
}

#[test]
fn test_find_nodes_request_for_another_node_is_ignored() {
    let f = fixture(true);
    let request = FindClosestNodesRequest {
        count: 8,
        target_id: id(0x01, 1).to_vec(),
        bloomfilter: Vec::new(),
        src_nodeinfo: None,
    };
    let message = message_from(
        MessageType::FindNodesRequest,
        id(0x40, 1),
        Some(id(0x41, 1)),
        &request,
    );
    f.table.handle_message(&message, addr(9500));
    assert!(f.transport.sent().is_empty());
}

#[test]
fn test_find_nodes_response_admits_public_and_probes_natted() {
    let f = fixture(false);
    f.table.local_node().set_nat_type(NatType::ConeNormal);
    f.table.local_node().set_public_addr(addr(5555));

    let public = peer(0x80, 1, 9101);
    let natted = NodeRecord::new(id(0x10, 1))
        .with_public_addr(addr(9102))
        .with_local_addr(addr(9202))
        .with_nat_type(NatType::ConeNormal);
    let response = FindClosestNodesResponse {
        nodes: vec![WireNode::from_record(&public), WireNode::from_record(&natted)],
    };
    let relay = id(0x40, 1);
    let message = message_from(
        MessageType::FindNodesResponse,
        relay,
        Some(NodeId::zero()),
        &response,
    );

    f.table.handle_message(&message, addr(9500));

    assert!(f.table.has_node(&id(0x80, 1)));
    assert!(!f.table.has_node(&id(0x10, 1)));
    assert_eq!(f.table.probe().detection_pending(), 1);
    let connects = f.transport.messages_of(MessageType::ConnectRequest);
    assert_eq!(connects.len(), 1);
    assert_eq!(connects[0].1, addr(9500));
    assert_eq!(connects[0].0.des_id(), Some(id(0x10, 1)));
}

#[test]
fn test_find_nodes_response_skips_double_cone_abnormal() {
    let f = fixture(false);
    f.table.local_node().set_nat_type(NatType::ConeAbnormal);
    f.table.local_node().set_public_addr(addr(5555));
    let abnormal = NodeRecord::new(id(0x10, 1))
        .with_public_addr(addr(9102))
        .with_nat_type(NatType::ConeAbnormal);
    let response = FindClosestNodesResponse {
        nodes: vec![WireNode::from_record(&abnormal)],
    };
    let message = message_from(
        MessageType::FindNodesResponse,
        id(0x40, 1),
        Some(NodeId::zero()),
        &response,
    );

    f.table.handle_message(&message, addr(9500));
    assert_eq!(f.table.probe().detection_pending(), 0);
    assert!(f.transport.sent().is_empty());
}

#[test]
fn test_alpha_query_uses_everyone_in_a_small_table() {
    let f = fixture(true);
    f.table.add_node(peer(0x80, 1, 9101)).unwrap();
    f.table.add_node(peer(0x10, 1, 9102)).unwrap();
    assert_eq!(f.table.closest_alpha_nodes().len(), 2);

    f.table.add_node(peer(0x01, 1, 9103)).unwrap();
    f.table.add_node(peer(0x02, 1, 9104)).unwrap();
    f.table.add_node(peer(0x04, 1, 9105)).unwrap();
    let query = f.table.closest_alpha_nodes();
    assert_eq!(query.len(), 3);
    assert_eq!(query[0].node_id, id(0x01, 1));
    assert_eq!(query[1].node_id, id(0x02, 1));
    assert_eq!(f.table.find_closest_nodes(1, 16, &[]), 3);
}

// =============================================================================
// Handshake
// =============================================================================

fn handshake(kind: HandshakeKind, public: SocketAddr) -> Handshake {
    Handshake {
        kind,
        local_addr: addr(9600),
        public_addr: Some(public),
        nat_type: NatType::ConeNormal,
        xid: vec![3],
        xip: vec![],
    }
}

#[test]
fn test_handshake_request_is_answered() {
    let f = fixture(true);
    let message = message_from(
        MessageType::Handshake,
        id(0x80, 1),
        Some(NodeId::zero()),
        &handshake(HandshakeKind::Request, addr(9601)),
    );

    f.table.handle_message(&message, addr(9601));

    let replies = f.transport.messages_of(MessageType::Handshake);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].1, addr(9601));
    assert_eq!(replies[0].0.des_id(), Some(id(0x80, 1)));
    let body: Handshake = decode_payload(&replies[0].0.data).unwrap();
    assert_eq!(body.kind, HandshakeKind::Response);
    assert_eq!(f.table.probe().detection_pending(), 1);
}

#[test]
fn test_handshake_response_admits_and_joins() {
    let f = fixture(false);
    f.table
        .detection()
        .add_detection_node(NodeRecord::new(id(0x80, 1)).with_public_addr(addr(9601)));
    let message = message_from(
        MessageType::Handshake,
        id(0x80, 1),
        Some(NodeId::zero()),
        &handshake(HandshakeKind::Response, addr(9601)),
    );

    f.table.handle_message(&message, addr(9601));

    assert_eq!(f.table.probe().detection_pending(), 0);
    assert!(f.table.has_node(&id(0x80, 1)));
    assert!(f.table.is_joined());
    assert_eq!(f.table.bootstrap_id(), Some(id(0x80, 1)));
}

#[test]
fn test_detection_probe_goes_over_ping() {
    let f = fixture(true);
    f.table.init().unwrap();
    f.table.detection().add_detection_node(
        NodeRecord::new(id(0x80, 1))
            .with_public_addr(addr(9601))
            .with_nat_type(NatType::ConeNormal),
    );

    f.scheduler.fire("node_detection");

    let pings: Vec<_> = f.transport.sent().into_iter().filter(|p| p.ping).collect();
    assert_eq!(pings.len(), 1);
    assert_eq!(pings[0].to, addr(9601));
}

// =============================================================================
// Heartbeat
// =============================================================================

#[test]
fn test_heartbeat_request_is_answered_and_reported() {
    let f = fixture(true);
    let seen: Arc<Mutex<Option<BTreeMap<String, String>>>> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);
    f.table
        .register_heartbeat_info_callback(Arc::new(move |info: &BTreeMap<String, String>| {
            *sink.lock() = Some(info.clone());
        }));
    let node = peer(0x80, 1, 9101);
    f.table.add_node(node).unwrap();
    let stored = f.table.get_node(&id(0x80, 1)).unwrap();
    stored.heartbeat(f.time.now(), 1);
    assert_eq!(stored.heartbeat_count(), 1);

    let mut extinfo = BTreeMap::new();
    extinfo.insert("load".to_string(), "3".to_string());
    let mut message = message_from(
        MessageType::HeartbeatRequest,
        id(0x80, 1),
        Some(NodeId::zero()),
        &Heartbeat { extinfo },
    );
    message.push_hop(&id(0x55, 5));

    f.table.handle_message(&message, addr(9101));

    let replies = f.transport.messages_of(MessageType::HeartbeatResponse);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].1, addr(9101));
    assert_eq!(replies[0].0.des_id(), Some(id(0x80, 1)));
    assert_eq!(replies[0].0.src_id(), Some(NodeId::zero()));
    assert!(replies[0].0.hop_nodes.is_empty());
    assert_eq!(stored.heartbeat_count(), 0);
    assert_eq!(
        seen.lock().as_ref().and_then(|m| m.get("load").cloned()),
        Some("3".to_string())
    );
}

#[test]
fn test_silent_node_is_dropped_after_max_misses() {
    let f = fixture(true);
    f.table.add_heartbeat_info("role", "edge");
    f.table.add_node(peer(0x80, 1, 9101)).unwrap();
    let max = f.table.config().heartbeat_max_count;

    for _ in 0..max {
        f.time.advance(Duration::from_secs(10));
        f.table.heartbeat_proc();
    }
    assert!(f.table.has_node(&id(0x80, 1)));
    let beats = f.transport.messages_of(MessageType::HeartbeatRequest);
    assert_eq!(beats.len(), max as usize);
    let body: Heartbeat = decode_payload(&beats[0].0.data).unwrap();
    assert_eq!(body.extinfo.get("role").map(String::as_str), Some("edge"));

    f.time.advance(Duration::from_secs(10));
    f.table.heartbeat_proc();
    assert!(!f.table.has_node(&id(0x80, 1)));
}

#[test]
fn test_heartbeat_waits_for_deadline() {
    let f = fixture(true);
    f.table.add_node(peer(0x80, 1, 9101)).unwrap();
    f.table.heartbeat_proc();
    assert!(f.transport.sent().is_empty());

    f.time.advance(f.table.config().heartbeat_first_timeout);
    f.table.heartbeat_proc();
    assert_eq!(f.transport.messages_of(MessageType::HeartbeatRequest).len(), 1);
}

#[test]
fn test_offline_report_drops_nodes_behind_endpoint() {
    let f = fixture(true);
    f.table.init().unwrap();
    f.table.add_node(peer(0x80, 1, 9101)).unwrap();
    f.table.add_node(peer(0x10, 1, 9102)).unwrap();

    f.monitor.on_heartbeat_failed(addr(9101));

    assert!(!f.table.has_node(&id(0x80, 1)));
    assert!(f.table.has_node(&id(0x10, 1)));
}

#[test]
fn test_node_quit_drops_sender() {
    let f = fixture(true);
    f.table.add_node(peer(0x80, 1, 9101)).unwrap();
    let message = message_from(MessageType::NodeQuit, id(0x80, 1), Some(NodeId::zero()), &NodeQuit);
    f.table.handle_message(&message, addr(9101));
    assert!(!f.table.has_node(&id(0x80, 1)));
}

// =============================================================================
// Relay
// =============================================================================

#[test]
fn test_relay_records_hop_and_forwards() {
    let f = fixture(true);
    f.table.add_node(peer(0x80, 1, 9101)).unwrap();
    let mut message = RoutingMessage::new(MessageType::ConnectRequest, 1);
    message.src_node_id = id(0x44, 4).to_vec();
    message.des_node_id = id(0x80, 2).to_vec();

    f.table.send_to_closest_node(message, true);

    let sent = f.transport.messages_of(MessageType::ConnectRequest);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, addr(9101));
    assert_eq!(sent[0].0.hop_num, 1);
    assert!(sent[0].0.has_hop(&NodeId::zero()));
}

#[test]
fn test_relay_stops_at_hop_limit_and_loops() {
    let f = fixture(true);
    f.table.add_node(peer(0x80, 1, 9101)).unwrap();

    let mut exhausted = RoutingMessage::new(MessageType::ConnectRequest, 1);
    exhausted.des_node_id = id(0x80, 2).to_vec();
    exhausted.hop_num = f.table.config().hop_to_live;
    f.table.send_to_closest_node(exhausted, true);

    let mut looping = RoutingMessage::new(MessageType::ConnectRequest, 2);
    looping.des_node_id = id(0x80, 2).to_vec();
    looping.push_hop(&NodeId::zero());
    f.table.send_to_closest_node(looping, true);

    let mut to_self = RoutingMessage::new(MessageType::ConnectRequest, 3);
    to_self.des_node_id = NodeId::zero().to_vec();
    f.table.send_to_closest_node(to_self, true);

    assert!(f.transport.sent().is_empty());
}

#[test]
fn test_policy_can_take_over_relay() {
    let f = fixture_with(
        true,
        RecordingPolicy {
            swallow_relays: true,
            ..RecordingPolicy::default()
        },
    );
    f.table.add_node(peer(0x80, 1, 9101)).unwrap();
    let mut message = RoutingMessage::new(MessageType::ConnectRequest, 1);
    message.des_node_id = id(0x80, 2).to_vec();
    f.table.send_to_closest_node(message, true);
    assert!(f.transport.sent().is_empty());
}

#[test]
fn test_unjoined_node_does_not_relay() {
    let f = fixture(false);
    f.table.add_node(peer(0x80, 1, 9101)).unwrap();
    let mut message = RoutingMessage::new(MessageType::ConnectRequest, 1);
    message.des_node_id = id(0x80, 2).to_vec();
    f.table.send_to_closest_node(message, true);
    assert!(f.transport.sent().is_empty());
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("runtime")
        .block_on(future)
}
