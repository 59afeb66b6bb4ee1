//! The routing envelope.

use serde::{Deserialize, Serialize};

use super::message_type::MessageType;
use crate::domain::{NodeId, ServiceType};

/// Transport priority class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Priority {
    #[default]
    Routine,
    Flash,
    Critical,
}

/// Envelope common to every routing and NAT message.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoutingMessage {
    pub message_type: u32,
    /// Correlates a response with its request.
    pub id: u32,
    pub src_node_id: Vec<u8>,
    /// Empty when the destination id is not known yet (bootstrap).
    pub des_node_id: Vec<u8>,
    pub src_service_type: ServiceType,
    pub des_service_type: ServiceType,
    pub hop_num: u32,
    pub priority: Priority,
    /// Ids of nodes that relayed this message, for loop prevention.
    pub hop_nodes: Vec<Vec<u8>>,
    pub xid: Vec<u8>,
    pub is_root: bool,
    /// Sent by a client-mode node.
    pub client_msg: bool,
    /// Encoded payload.
    pub data: Vec<u8>,
}

impl RoutingMessage {
    pub fn new(kind: MessageType, id: u32) -> Self {
        Self {
            message_type: kind.as_u32(),
            id,
            ..Self::default()
        }
    }

    pub fn kind(&self) -> Option<MessageType> {
        MessageType::from_u32(self.message_type)
    }

    pub fn src_id(&self) -> Option<NodeId> {
        NodeId::from_slice(&self.src_node_id)
    }

    pub fn des_id(&self) -> Option<NodeId> {
        NodeId::from_slice(&self.des_node_id)
    }

    /// Record `node_id` as a relay hop.
    pub fn push_hop(&mut self, node_id: &NodeId) {
        self.hop_nodes.push(node_id.to_vec());
    }

    pub fn has_hop(&self, node_id: &NodeId) -> bool {
        self.hop_nodes.iter().any(|hop| node_id.matches(hop))
    }
}
