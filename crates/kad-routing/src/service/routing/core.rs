//! Routing table state, membership and sending.

use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::domain::{
    closer_to_target, AddNodeOutcome, DynamicXipManager, LocalNodeInfo, NodeId, NodeRecord,
    NodeRef, NodeTable, RoutingConfig, ROOT_SERVICE_TYPE,
};
use crate::error::{KadError, Result};
use crate::ports::{
    MessagePolicy, RelayDecision, RoutingEvent, Scheduler, TimeSource, TimerHandle, Transport,
};
use crate::protocol::{encode_message, MessageType, Priority, RoutingMessage, WireNode};
use crate::service::bootstrap_cache::BootstrapCacheHelper;
use crate::service::callbacks::CallbackManager;
use crate::service::heartbeat::HeartbeatMonitor;
use crate::service::node_detection::NodeDetectionManager;

/// Receives the extinfo map of every heartbeat request addressed to us.
pub type HeartbeatInfoCallback = Arc<dyn Fn(&BTreeMap<String, String>) + Send + Sync>;

#[derive(Debug, Default)]
pub(super) struct JoinState {
    pub(super) joined: bool,
    /// Set by the first successful join; rejoin checks only run after it.
    pub(super) after_join: bool,
    pub(super) bootstrap_id: Option<NodeId>,
    pub(super) bootstrap_addr: Option<SocketAddr>,
}

/// Routing table of one local identity in one service partition.
///
/// Constructed through [`RoutingTableBuilder`](super::RoutingTableBuilder);
/// every collaborator is injected there.
pub struct RoutingTable {
    pub(super) config: RoutingConfig,
    pub(super) local: Arc<LocalNodeInfo>,
    pub(super) transport: Arc<dyn Transport>,
    pub(super) scheduler: Arc<dyn Scheduler>,
    pub(super) time: Arc<dyn TimeSource>,
    pub(super) callbacks: Arc<CallbackManager>,
    pub(super) heartbeat_monitor: Arc<HeartbeatMonitor>,
    pub(super) policy: Arc<dyn MessagePolicy>,
    pub(super) table: RwLock<NodeTable>,
    /// Copy of the member list, replaced under the table write lock.
    pub(super) snapshot: RwLock<Arc<Vec<NodeRef>>>,
    pub(super) join_state: Mutex<JoinState>,
    pub(super) joined_tx: watch::Sender<bool>,
    pub(super) joining: AtomicBool,
    pub(super) bootstrap_nodes: Mutex<Vec<NodeRef>>,
    pub(super) detection: Arc<NodeDetectionManager>,
    pub(super) dxip: DynamicXipManager,
    pub(super) cache_helper: Arc<BootstrapCacheHelper>,
    pub(super) heartbeat_info: Mutex<BTreeMap<String, String>>,
    pub(super) heartbeat_callback: Mutex<Option<HeartbeatInfoCallback>>,
    pub(super) timers: Mutex<Vec<TimerHandle>>,
    pub(super) rejoin_task: Mutex<Option<TimerHandle>>,
    pub(super) inited: AtomicBool,
    pub(super) destroyed: AtomicBool,
    pub(super) weak_self: Weak<RoutingTable>,
}

impl RoutingTable {
    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn local_node(&self) -> &Arc<LocalNodeInfo> {
        &self.local
    }

    pub fn local_id(&self) -> NodeId {
        self.local.id()
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn callbacks(&self) -> &Arc<CallbackManager> {
        &self.callbacks
    }

    pub fn cache_helper(&self) -> &Arc<BootstrapCacheHelper> {
        &self.cache_helper
    }

    pub fn detection(&self) -> &Arc<NodeDetectionManager> {
        &self.detection
    }

    pub fn dynamic_xips(&self) -> &DynamicXipManager {
        &self.dxip
    }

    pub(super) fn monitor_name(&self) -> String {
        format!("routing_table_{}", self.local.id())
    }

    pub(super) fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Membership
    // =========================================================================

    /// Read-only snapshot of the members. May trail the table by one change.
    pub fn nodes(&self) -> Arc<Vec<NodeRef>> {
        Arc::clone(&self.snapshot.read())
    }

    pub fn nodes_size(&self) -> usize {
        self.table.read().len()
    }

    pub fn get_node(&self, node_id: &NodeId) -> Option<NodeRef> {
        self.table.read().get(node_id)
    }

    pub fn has_node(&self, node_id: &NodeId) -> bool {
        self.table.read().contains(node_id)
    }

    pub fn get_random_node(&self) -> Option<NodeRef> {
        self.table.read().random_node()
    }

    /// Members whose hash lies in `[min, max]`, in hash order.
    pub fn get_range_nodes_by_hash(&self, min: u64, max: u64) -> Vec<NodeRef> {
        self.table.read().range_by_hash(min, max)
    }

    /// Members at positions `[start, end]` of the hash order. Positions
    /// count the local node.
    pub fn get_range_nodes_by_index(&self, start: usize, end: usize) -> Vec<NodeRef> {
        self.table.read().range_by_index(start, end)
    }

    /// Position of the local node in the hash order.
    pub fn get_self_index(&self) -> usize {
        self.table.read().self_index()
    }

    /// Dry run of [`RoutingTable::add_node`].
    pub fn can_add_node(&self, record: &NodeRecord) -> bool {
        self.table.read().can_add(record)
    }

    /// Admit a record.
    ///
    /// A full bucket refuses the record; resident members are never
    /// replaced.
    pub fn add_node(&self, record: NodeRecord) -> Result<AddNodeOutcome> {
        record.reset_heartbeat(
            self.time.now(),
            self.config.heartbeat_first_timeout.as_millis() as u64,
        );
        let node_id = record.node_id;
        let outcome = {
            let mut table = self.table.write();
            let outcome = table.add(record).map_err(|reason| {
                debug!(node = %node_id.short_hex(), %reason, "[kad] node refused");
                KadError::from(reason)
            })?;
            if outcome == AddNodeOutcome::Success {
                *self.snapshot.write() = Arc::new(table.nodes().to_vec());
            }
            outcome
        };
        if outcome == AddNodeOutcome::Success {
            debug!(node = %node_id.short_hex(), size = self.nodes_size(), "[kad] node added");
            self.policy.on_report(&RoutingEvent::NodeAdded(node_id));
        }
        Ok(outcome)
    }

    /// Remove a member and release the dynamic xip it handed us. Absent ids
    /// are a no-op.
    pub fn drop_node(&self, node_id: &NodeId) -> Option<NodeRef> {
        let removed = {
            let mut table = self.table.write();
            let removed = table.remove(node_id)?;
            *self.snapshot.write() = Arc::new(table.nodes().to_vec());
            removed
        };
        self.local.drop_dxip(node_id);
        self.detection.forget(node_id);
        debug!(node = %node_id.short_hex(), size = self.nodes_size(), "[kad] node dropped");
        self.policy.on_report(&RoutingEvent::NodeDropped(*node_id));
        Some(removed)
    }

    // =========================================================================
    // Closeness
    // =========================================================================

    /// Up to `count` members, closest to `target` first.
    pub fn get_closest_nodes(&self, target: &NodeId, count: usize) -> Vec<NodeRef> {
        if count == 0 {
            return Vec::new();
        }
        self.table.read().closest(target, count)
    }

    /// Closest member not in `exclude`.
    pub fn get_closest_node(
        &self,
        target: &NodeId,
        exclude_self: bool,
        exclude: &HashSet<NodeId>,
    ) -> Option<NodeRef> {
        let local_id = self.local.id();
        self.get_closest_nodes(target, self.config.max_nodes())
            .into_iter()
            .find(|node| {
                !(exclude_self && node.node_id == local_id) && !exclude.contains(&node.node_id)
            })
    }

    /// Whether no known member is closer to `target` than this node.
    pub fn closest_to_target(&self, target: &NodeId) -> Result<bool> {
        let local_id = self.local.id();
        if *target == local_id {
            return Err(KadError::InvalidNode("target is the local node".into()));
        }
        match self.get_closest_node(target, true, &HashSet::new()) {
            Some(closest) => Ok(closer_to_target(&local_id, &closest.node_id, target)),
            None => Ok(true),
        }
    }

    /// Whether a message for `node_id` terminates here.
    ///
    /// With `check_closest`, a node that is the closest known to the id
    /// also counts as the destination.
    pub fn is_destination(&self, node_id: &NodeId, check_closest: bool) -> bool {
        if *node_id == self.local.id() {
            return true;
        }
        if !check_closest {
            return false;
        }
        self.closest_to_target(node_id).unwrap_or(false)
    }

    pub(super) fn addressed_here(&self, message: &RoutingMessage) -> bool {
        message
            .des_id()
            .map(|id| self.is_destination(&id, false))
            .unwrap_or(false)
    }

    // =========================================================================
    // Sending
    // =========================================================================

    /// Envelope from the local node with a fresh message id.
    pub fn new_message(&self, kind: MessageType, des: Option<&NodeId>) -> RoutingMessage {
        let mut message = RoutingMessage::new(kind, self.callbacks.message_id());
        message.src_node_id = self.local.id().to_vec();
        if let Some(des) = des {
            message.des_node_id = des.to_vec();
        }
        message.src_service_type = self.local.service_type();
        message.des_service_type = self.local.service_type();
        message.priority = Priority::Flash;
        message.xid = self.local.xid().to_vec();
        message.is_root = self.local.service_type() == ROOT_SERVICE_TYPE;
        message.client_msg = self.local.is_client_mode();
        message
    }

    /// Send to a member, over its local endpoint when on the same VLAN.
    pub fn send_data(&self, message: &RoutingMessage, node: &NodeRecord) -> Result<()> {
        let addr = node.send_addr().ok_or_else(|| {
            KadError::InvalidNode(format!("{} has no endpoint", node.node_id.short_hex()))
        })?;
        self.send_to(message, addr)
    }

    /// Send to `addr`. Refused once the table is shutting down.
    pub fn send_to(&self, message: &RoutingMessage, addr: SocketAddr) -> Result<()> {
        if self.is_destroyed() {
            return Err(KadError::ShuttingDown);
        }
        self.transmit(message, addr)
    }

    pub(super) fn transmit(&self, message: &RoutingMessage, addr: SocketAddr) -> Result<()> {
        let bytes = encode_message(message)?;
        self.transport.send_data(&bytes, addr, message.priority)?;
        Ok(())
    }

    /// Forward one hop toward `des_node_id`. Best effort: a message with no
    /// eligible next hop is dropped.
    pub fn send_to_closest_node(&self, mut message: RoutingMessage, add_hop: bool) {
        let local_id = self.local.id();
        if message.des_id() == Some(local_id) {
            warn!("[kad] refusing to relay a message addressed to this node");
            return;
        }
        if !self.local.is_first_node() && !self.is_joined() {
            return;
        }
        if add_hop {
            message.push_hop(&local_id);
        }
        self.recursive_send(message);
    }

    fn recursive_send(&self, mut message: RoutingMessage) {
        if message.hop_num >= self.config.hop_to_live {
            warn!(hops = message.hop_num, "[kad] hop limit reached, dropping message");
            return;
        }
        if self.policy.on_custom_relay(&message) == RelayDecision::Handled {
            return;
        }
        let mut exclude = HashSet::new();
        for hop in &message.hop_nodes {
            let Some(id) = NodeId::from_slice(hop) else {
                continue;
            };
            if !exclude.insert(id) {
                debug!("[kad] relay loop detected, dropping message");
                return;
            }
        }
        let Some(target) = message.des_id() else {
            debug!("[kad] relayed message has no destination");
            return;
        };

        let local_id = self.local.id();
        let local_public = self.local.public_addr();
        let next = self
            .get_closest_nodes(&target, self.config.max_nodes())
            .into_iter()
            .find(|node| {
                node.node_id != local_id
                    && node.public_addr != local_public
                    && !exclude.contains(&node.node_id)
            });
        let Some(next) = next else {
            warn!(target = %target.short_hex(), "[kad] no next hop, dropping message");
            return;
        };
        message.hop_num += 1;
        if let Err(e) = self.send_data(&message, &next) {
            debug!(next = %next.node_id.short_hex(), error = %e, "[kad] relay send failed");
        }
    }

    /// This node as a find-nodes entry.
    pub fn local_wire_node(&self) -> WireNode {
        let public_addr = if self.local.is_first_node() {
            Some(self.local.local_addr())
        } else {
            self.local.public_addr()
        };
        WireNode {
            id: self.local.id().to_vec(),
            public_addr,
            local_addr: Some(self.local.local_addr()),
            nat_type: self.local.nat_type(),
            service_type: self.local.service_type(),
            xip: self.local.xip(),
            xid: self.local.xid().to_vec(),
        }
    }
}
