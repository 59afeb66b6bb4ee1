//! Inbound routing message handlers.
//!
//! Every handler is synchronous and best effort: malformed payloads and
//! failed sends are logged and the message is dropped.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::core::RoutingTable;
use crate::domain::{
    BloomFilter, ClientNode, NatType, NodeId, NodeRecord, ServiceType, FIND_NODES_BLOOM_HASHES,
};
use crate::error::{KadError, Result};
use crate::protocol::{
    decode_payload, encode_message, encode_payload, BootstrapJoinRequest, BootstrapJoinResponse,
    ConnectRequest, FindClosestNodesRequest, FindClosestNodesResponse, Handshake, HandshakeKind,
    Heartbeat, JoinStatus, MessageType, RoutingMessage, WireNode,
};

fn decode<T: serde::de::DeserializeOwned>(message: &RoutingMessage) -> Option<T> {
    match decode_payload(&message.data) {
        Ok(payload) => Some(payload),
        Err(e) => {
            debug!(kind = message.message_type, error = %e, "[kad] malformed payload");
            None
        }
    }
}

fn both_cone_abnormal(a: NatType, b: NatType) -> bool {
    a == NatType::ConeAbnormal && b == NatType::ConeAbnormal
}

impl RoutingTable {
    /// Dispatch one routing message. Returns `false` for types this table
    /// does not handle.
    pub fn handle_message(&self, message: &RoutingMessage, from: SocketAddr) -> bool {
        if self.is_destroyed() {
            return true;
        }
        let Some(kind) = message.kind() else {
            return false;
        };
        match kind {
            MessageType::ConnectRequest => self.handle_connect_request(message, from),
            MessageType::Handshake => self.handle_handshake(message, from),
            MessageType::BootstrapJoinRequest => self.handle_bootstrap_join_request(message, from),
            MessageType::BootstrapJoinResponse => {
                self.handle_bootstrap_join_response(message, from)
            }
            MessageType::FindNodesRequest => self.handle_find_nodes_request(message, from),
            MessageType::FindNodesResponse => self.handle_find_nodes_response(message, from),
            MessageType::HeartbeatRequest => self.handle_heartbeat_request(message, from),
            MessageType::HeartbeatResponse => self.handle_heartbeat_response(message, from),
            MessageType::NodeQuit => self.handle_node_quit(message, from),
            MessageType::ConnectResponse | MessageType::Ack => {}
            _ => return false,
        }
        true
    }

    // =========================================================================
    // Bootstrap join
    // =========================================================================

    pub fn handle_bootstrap_join_request(&self, message: &RoutingMessage, from: SocketAddr) {
        let Some(src_id) = message.src_id() else {
            return;
        };
        let Some(request) = decode::<BootstrapJoinRequest>(message) else {
            return;
        };
        debug!(node = %src_id.short_hex(), %from, "[kad] bootstrap join request");

        let mut record = NodeRecord::new(src_id)
            .with_public_addr(from)
            .with_local_addr(request.local_addr)
            .with_nat_type(request.nat_type)
            .with_service_type(message.src_service_type)
            .with_xid(request.xid)
            .with_xip(request.xip.unwrap_or_default());
        record.is_client = message.client_msg;

        if let Err(e) = self.send_bootstrap_join_response(message, from) {
            debug!(%from, error = %e, "[kad] bootstrap join response failed");
            return;
        }
        if message.client_msg {
            return;
        }
        if let Err(e) = self.add_node(record) {
            debug!(node = %src_id.short_hex(), error = %e, "[kad] bootstrap requester not added");
        }
    }

    fn send_bootstrap_join_response(&self, request: &RoutingMessage, from: SocketAddr) -> Result<()> {
        let mut message = self.new_message(MessageType::BootstrapJoinResponse, None);
        message.des_node_id = request.src_node_id.clone();
        message.src_service_type = request.des_service_type;
        message.des_service_type = request.src_service_type;
        message.id = request.id;
        message.client_msg = request.client_msg;

        let dxip = if request.client_msg {
            let dxip = self.dxip.dispatch_dynamic_xip(&self.local.xip());
            self.dxip.add_client_node(
                dxip.clone(),
                ClientNode {
                    node_id: request.src_node_id.clone(),
                    public_addr: from,
                },
            );
            Some(dxip)
        } else {
            None
        };
        let response = BootstrapJoinResponse {
            public_addr: from,
            xid: self.local.xid().to_vec(),
            xip: self.local.xip(),
            bootstrap_id: self.local.id().to_vec(),
            nat_type: self.local.nat_type(),
            status: JoinStatus::Success,
            dxip,
        };
        message.data = encode_payload(&response)?;
        self.send_to(&message, from)
    }

    pub fn handle_bootstrap_join_response(&self, message: &RoutingMessage, from: SocketAddr) {
        if !self.addressed_here(message) {
            return;
        }
        let Some(src_id) = message.src_id() else {
            return;
        };
        let Some(response) = decode::<BootstrapJoinResponse>(message) else {
            return;
        };
        if response.status == JoinStatus::Forbidden {
            warn!(%from, "[kad] bootstrap node refused the join");
            return;
        }

        let record = NodeRecord::new(src_id)
            .with_public_addr(from)
            .with_local_addr(from)
            .with_nat_type(response.nat_type)
            .with_service_type(message.src_service_type)
            .with_xid(response.xid)
            .with_xip(response.xip);
        self.local.set_public_addr(response.public_addr);
        if self.local.is_client_mode() {
            if let Some(dxip) = response.dxip {
                self.local.add_dxip(src_id, dxip);
            }
        }

        {
            let mut bootstrap_nodes = self.bootstrap_nodes.lock();
            if !bootstrap_nodes.iter().any(|n| n.node_id == src_id) {
                bootstrap_nodes.push(Arc::new(record.clone()));
            }
        }
        if let Err(e) = self.add_node(record) {
            warn!(node = %src_id.short_hex(), error = %e, "[kad] bootstrap node not added");
            return;
        }

        let bootstrap_id = NodeId::from_slice(&response.bootstrap_id).unwrap_or(src_id);
        if !self.mark_joined(bootstrap_id, from) {
            return;
        }
        info!(
            bootstrap = %bootstrap_id.short_hex(),
            public = %response.public_addr,
            "[kad] admitted by bootstrap node"
        );
        // multi_join returns only once the first find-nodes round is out
        self.find_closest_nodes(1, self.config.max_nodes(), &[]);
        self.wake_join_waiters();
    }

    // =========================================================================
    // Find nodes
    // =========================================================================

    pub fn handle_find_nodes_request(&self, message: &RoutingMessage, from: SocketAddr) {
        if message.des_id() != Some(self.local.id()) {
            return;
        }
        let Some(src_id) = message.src_id() else {
            return;
        };
        let Some(request) = decode::<FindClosestNodesRequest>(message) else {
            return;
        };

        if let Some(record) = request.src_nodeinfo.as_ref().and_then(WireNode::to_record) {
            if record.nat_type == NatType::Public && self.can_add_node(&record) {
                if let Err(e) = self.add_node(record) {
                    debug!(node = %src_id.short_hex(), error = %e, "[kad] requester not added");
                }
            }
        }

        let Some(target) = NodeId::from_slice(&request.target_id) else {
            debug!("[kad] find nodes request with malformed target");
            return;
        };
        let bloom = BloomFilter::from_bytes(&request.bloomfilter, FIND_NODES_BLOOM_HASHES)
            .unwrap_or_else(BloomFilter::for_find_nodes);
        let count = request.count as usize;
        let local_id = self.local.id();

        let mut nodes = Vec::new();
        let reachable = self.local.is_first_node() || self.local.public_addr().is_some();
        if reachable && !bloom.contains(local_id.as_bytes()) {
            nodes.push(WireNode {
                local_addr: None,
                ..self.local_wire_node()
            });
        }
        for node in self.get_closest_nodes(&target, count + 1) {
            if nodes.len() >= self.config.closest_nodes_num {
                break;
            }
            if node.node_id == target || bloom.contains(node.node_id.as_bytes()) {
                continue;
            }
            nodes.push(WireNode::from_record(&node));
        }
        if nodes.is_empty() {
            return;
        }

        let mut response = self.new_message(MessageType::FindNodesResponse, Some(&src_id));
        response.id = message.id;
        response.des_service_type = message.src_service_type;
        let sent = nodes.len();
        match encode_payload(&FindClosestNodesResponse { nodes }) {
            Ok(data) => response.data = data,
            Err(e) => {
                debug!(error = %e, "[kad] find nodes response encode failed");
                return;
            }
        }
        match self.send_to(&response, from) {
            Ok(()) => debug!(to = %src_id.short_hex(), nodes = sent, "[kad] find nodes response"),
            Err(e) => debug!(%from, error = %e, "[kad] find nodes response failed"),
        }
    }

    pub fn handle_find_nodes_response(&self, message: &RoutingMessage, from: SocketAddr) {
        if message.des_id() != Some(self.local.id()) {
            return;
        }
        let Some(relay_id) = message.src_id() else {
            return;
        };
        let Some(response) = decode::<FindClosestNodesResponse>(message) else {
            return;
        };

        let local_id = self.local.id();
        let local_public = self.local.public_addr();
        let local_nat = self.local.nat_type();
        for wire in &response.nodes {
            let Some(mut record) = wire.to_record() else {
                continue;
            };
            record.service_type = message.src_service_type;
            if record.node_id == local_id || !self.can_add_node(&record) {
                continue;
            }

            if local_public.is_some() && record.public_addr == local_public {
                record.set_xid(self.local.xid().to_vec());
                if let Err(e) = self.add_node(record) {
                    debug!(error = %e, "[kad] virtual node not added");
                }
                continue;
            }
            if both_cone_abnormal(record.nat_type, local_nat) {
                continue;
            }
            if record.nat_type == NatType::Public || local_nat == NatType::Public {
                if let Err(e) = self.add_node(record) {
                    debug!(error = %e, "[kad] discovered node not added");
                }
                continue;
            }

            let node_id = record.node_id;
            let service_type = record.service_type;
            self.detection.add_detection_node(record);
            if let Err(e) = self.send_connect_request(&node_id, service_type, &relay_id, from) {
                debug!(node = %node_id.short_hex(), error = %e, "[kad] connect request failed");
            }
        }
    }

    // =========================================================================
    // Connect and handshake
    // =========================================================================

    /// Ask `node_id` (behind a NAT) to punch toward us, relayed by the node
    /// at `via`.
    pub fn send_connect_request(
        &self,
        node_id: &NodeId,
        service_type: ServiceType,
        relay_id: &NodeId,
        via: SocketAddr,
    ) -> Result<()> {
        let Some(public_addr) = self.local.public_addr() else {
            return Err(KadError::InvalidNode(
                "local public endpoint not known yet".into(),
            ));
        };
        let mut message = self.new_message(MessageType::ConnectRequest, Some(node_id));
        message.des_service_type = service_type;
        let request = ConnectRequest {
            local_addr: self.local.local_addr(),
            public_addr: Some(public_addr),
            nat_type: self.local.nat_type(),
            relay_routing_id: Some(relay_id.to_vec()),
        };
        message.data = encode_payload(&request)?;
        self.send_to(&message, via)
    }

    pub fn handle_connect_request(&self, message: &RoutingMessage, _from: SocketAddr) {
        let Some(des_id) = message.des_id() else {
            return;
        };
        if !self.is_destination(&des_id, false) {
            self.send_to_closest_node(message.clone(), true);
            return;
        }
        let Some(src_id) = message.src_id() else {
            return;
        };
        let Some(request) = decode::<ConnectRequest>(message) else {
            return;
        };
        let Some(public_addr) = request.public_addr else {
            debug!(node = %src_id.short_hex(), "[kad] connect request without public endpoint");
            return;
        };
        if both_cone_abnormal(request.nat_type, self.local.nat_type()) {
            return;
        }
        let record = NodeRecord::new(src_id)
            .with_public_addr(public_addr)
            .with_local_addr(request.local_addr)
            .with_nat_type(request.nat_type)
            .with_service_type(message.src_service_type);
        if self.detection.add_detection_node(record) {
            debug!(node = %src_id.short_hex(), "[kad] probing connect requester");
        }
    }

    /// Probe `node` with a handshake request over the ping channel.
    pub fn send_handshake_request(&self, node: &NodeRecord) -> Result<()> {
        let to = node.public_addr.ok_or_else(|| {
            KadError::InvalidNode(format!(
                "{} has no public endpoint",
                node.node_id.short_hex()
            ))
        })?;
        let mut message = self.new_message(MessageType::Handshake, Some(&node.node_id));
        message.des_service_type = node.service_type;
        message.data = encode_payload(&self.local_handshake(HandshakeKind::Request))?;
        let bytes = encode_message(&message)?;
        self.transport.send_ping(&bytes, to)?;
        Ok(())
    }

    fn local_handshake(&self, kind: HandshakeKind) -> Handshake {
        Handshake {
            kind,
            local_addr: self.local.local_addr(),
            public_addr: self.local.public_addr(),
            nat_type: self.local.nat_type(),
            xid: self.local.xid().to_vec(),
            xip: self.local.xip(),
        }
    }

    pub fn handle_handshake(&self, message: &RoutingMessage, from: SocketAddr) {
        if !self.addressed_here(message) {
            return;
        }
        let Some(src_id) = message.src_id() else {
            return;
        };
        let Some(handshake) = decode::<Handshake>(message) else {
            return;
        };
        let public_addr = handshake.public_addr.unwrap_or(from);
        let mut record = NodeRecord::new(src_id)
            .with_public_addr(public_addr)
            .with_local_addr(handshake.local_addr)
            .with_nat_type(handshake.nat_type)
            .with_service_type(message.src_service_type)
            .with_xid(handshake.xid)
            .with_xip(handshake.xip);
        record.is_client = message.client_msg;

        match handshake.kind {
            HandshakeKind::Response => {
                let responses = self.detection.record_response(src_id);
                if self.detection.remove_detection(&public_addr) {
                    debug!(node = %src_id.short_hex(), responses, "[kad] detection answered");
                }
                if from == handshake.local_addr && public_addr.ip() != handshake.local_addr.ip() {
                    record.same_vlan = true;
                }
                if !message.client_msg {
                    if let Err(e) = self.add_node(record) {
                        debug!(node = %src_id.short_hex(), error = %e, "[kad] handshake peer not added");
                    }
                }
                if !self.is_joined() {
                    self.set_join(src_id, public_addr);
                }
            }
            HandshakeKind::Request => {
                if self.can_add_node(&record) {
                    self.detection.add_detection_node(record);
                }
                let mut response = self.new_message(MessageType::Handshake, Some(&src_id));
                response.src_node_id = message.des_node_id.clone();
                response.des_service_type = message.src_service_type;
                response.id = message.id;
                let sent = encode_payload(&self.local_handshake(HandshakeKind::Response))
                    .map_err(KadError::from)
                    .and_then(|data| {
                        response.data = data;
                        self.send_to(&response, from)
                    });
                if let Err(e) = sent {
                    debug!(%from, error = %e, "[kad] handshake response failed");
                }
            }
        }
    }

    // =========================================================================
    // Heartbeat and quit
    // =========================================================================

    pub fn handle_heartbeat_request(&self, message: &RoutingMessage, from: SocketAddr) {
        if !self.addressed_here(message) {
            return;
        }
        let Some(src_id) = message.src_id() else {
            return;
        };
        if let Some(heartbeat) = decode::<Heartbeat>(message) {
            let callback = self.heartbeat_callback.lock().clone();
            if let Some(callback) = callback {
                callback(&heartbeat.extinfo);
            }
        }
        self.reset_node_heartbeat(&src_id);

        let mut response = message.clone();
        response.hop_nodes.clear();
        response.hop_num = 0;
        response.message_type = MessageType::HeartbeatResponse.as_u32();
        response.src_node_id = message.des_node_id.clone();
        response.des_node_id = message.src_node_id.clone();
        response.src_service_type = message.des_service_type;
        response.des_service_type = message.src_service_type;
        response.data.clear();
        if let Err(e) = self.send_to(&response, from) {
            debug!(%from, error = %e, "[kad] heartbeat response failed");
        }
    }

    pub fn handle_heartbeat_response(&self, message: &RoutingMessage, _from: SocketAddr) {
        if let Some(src_id) = message.src_id() {
            self.reset_node_heartbeat(&src_id);
        }
    }

    pub fn handle_node_quit(&self, message: &RoutingMessage, from: SocketAddr) {
        if !self.addressed_here(message) {
            return;
        }
        let Some(src_id) = message.src_id() else {
            return;
        };
        if self.drop_node(&src_id).is_some() {
            info!(node = %src_id.short_hex(), %from, "[kad] neighbour quit");
        }
    }
}
