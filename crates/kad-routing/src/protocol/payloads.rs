//! Typed payloads carried in `RoutingMessage::data`.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::domain::{NatType, NodeId, NodeRecord, ServiceType};

/// Node entry of a find-nodes response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireNode {
    pub id: Vec<u8>,
    pub public_addr: Option<SocketAddr>,
    pub local_addr: Option<SocketAddr>,
    pub nat_type: NatType,
    pub service_type: ServiceType,
    pub xip: Vec<u8>,
    pub xid: Vec<u8>,
}

impl WireNode {
    pub fn from_record(node: &NodeRecord) -> Self {
        Self {
            id: node.node_id.to_vec(),
            public_addr: node.public_addr,
            local_addr: node.local_addr,
            nat_type: node.nat_type,
            service_type: node.service_type,
            xip: node.xip.clone(),
            xid: node.xid.clone(),
        }
    }

    /// Decode into a record; `None` for a malformed id.
    pub fn to_record(&self) -> Option<NodeRecord> {
        let node_id = NodeId::from_slice(&self.id)?;
        let mut record = NodeRecord::new(node_id)
            .with_nat_type(self.nat_type)
            .with_service_type(self.service_type)
            .with_xid(self.xid.clone())
            .with_xip(self.xip.clone());
        record.public_addr = self.public_addr;
        record.local_addr = self.local_addr;
        Some(record)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapJoinRequest {
    pub local_addr: SocketAddr,
    pub nat_type: NatType,
    pub xid: Vec<u8>,
    /// Absent for client-mode nodes.
    pub xip: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinStatus {
    Success,
    Forbidden,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapJoinResponse {
    /// Requester endpoint as observed by the bootstrap node.
    pub public_addr: SocketAddr,
    pub xid: Vec<u8>,
    pub xip: Vec<u8>,
    pub bootstrap_id: Vec<u8>,
    pub nat_type: NatType,
    pub status: JoinStatus,
    /// Dynamic xip dispatched to a client-mode requester.
    pub dxip: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindClosestNodesRequest {
    pub count: u32,
    pub target_id: Vec<u8>,
    /// Raw bloom filter of ids the requester already knows.
    pub bloomfilter: Vec<u8>,
    pub src_nodeinfo: Option<WireNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FindClosestNodesResponse {
    pub nodes: Vec<WireNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectRequest {
    pub local_addr: SocketAddr,
    pub public_addr: Option<SocketAddr>,
    pub nat_type: NatType,
    pub relay_routing_id: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandshakeKind {
    Request,
    Response,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    pub kind: HandshakeKind,
    pub local_addr: SocketAddr,
    pub public_addr: Option<SocketAddr>,
    pub nat_type: NatType,
    pub xid: Vec<u8>,
    pub xip: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Heartbeat {
    pub extinfo: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeQuit;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NatDetectRequest {
    pub local_addr: SocketAddr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NatDetectResponse {
    pub nat_type: NatType,
    pub detect_port: u16,
}

/// Body of the two NAT handshake message types.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NatDetectHandshake;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NatDetectFinish;
