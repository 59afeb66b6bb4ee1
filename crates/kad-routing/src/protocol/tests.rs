//! Tests for the wire protocol.

use super::*;
use crate::domain::{NatType, NodeId, NodeRecord};
use std::net::SocketAddr;

fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

#[test]
fn test_unknown_message_type_is_none() {
    assert_eq!(MessageType::from_u32(5), Some(MessageType::FindNodesRequest));
    assert_eq!(MessageType::from_u32(28), Some(MessageType::NodeQuit));
    assert_eq!(MessageType::from_u32(15), None);
}

#[test]
fn test_nat_types_route_to_detector() {
    assert!(MessageType::NatDetectFinish.is_nat());
    assert!(!MessageType::Handshake.is_nat());
    assert!(MessageType::HeartbeatResponse.is_response());
    assert!(!MessageType::HeartbeatRequest.is_response());
}

#[test]
fn test_envelope_with_payload_decodes() {
    let request = BootstrapJoinRequest {
        local_addr: addr(9000),
        nat_type: NatType::Public,
        xid: vec![1, 2, 3],
        xip: None,
    };
    let mut message = RoutingMessage::new(MessageType::BootstrapJoinRequest, 77);
    message.src_node_id = NodeId::random().to_vec();
    message.push_hop(&NodeId::zero());
    message.data = encode_payload(&request).expect("encode payload");

    let bytes = encode_message(&message).expect("encode");
    let decoded = decode_message(&bytes).expect("decode");

    assert_eq!(decoded, message);
    assert!(decoded.has_hop(&NodeId::zero()));
    let payload: BootstrapJoinRequest = decode_payload(&decoded.data).expect("payload");
    assert_eq!(payload, request);
}

#[test]
fn test_garbage_is_rejected() {
    assert!(matches!(decode_message(&[]), Err(CodecError::Empty)));
    assert!(decode_message(&[0xFF; 7]).is_err());
    assert!(decode_payload::<NatDetectResponse>(&[1]).is_err());
}

#[test]
fn test_oversized_length_prefix_is_rejected() {
    // A vec length far beyond the size limit must not be allocated.
    let mut bytes = vec![0u8; 8];
    bytes.extend_from_slice(&u64::MAX.to_le_bytes());
    assert!(decode_message(&bytes).is_err());
}

#[test]
fn test_wire_node_keeps_record_fields() {
    let record = NodeRecord::new(NodeId::random())
        .with_public_addr(addr(1))
        .with_local_addr(addr(2))
        .with_nat_type(NatType::ConeNormal)
        .with_xid(vec![4, 5]);

    let wire = WireNode::from_record(&record);
    let back = wire.to_record().expect("valid id");

    assert_eq!(back.node_id, record.node_id);
    assert_eq!(back.public_addr, Some(addr(1)));
    assert_eq!(back.local_addr, Some(addr(2)));
    assert_eq!(back.hash64, record.hash64);
}

#[test]
fn test_wire_node_with_short_id_is_rejected() {
    let wire = WireNode {
        id: vec![1, 2, 3],
        public_addr: None,
        local_addr: None,
        nat_type: NatType::Public,
        service_type: 0,
        xip: Vec::new(),
        xid: Vec::new(),
    };
    assert!(wire.to_record().is_none());
}
