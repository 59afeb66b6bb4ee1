//! Lifecycle, periodic timers, liveness and neighbour discovery.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use super::core::{HeartbeatInfoCallback, RoutingTable};
use crate::domain::{BloomFilter, NatType, NodeId, NodeRecord, NodeRef};
use crate::error::{KadError, Result};
use crate::ports::TimerHandle;
use crate::protocol::{
    encode_payload, FindClosestNodesRequest, Heartbeat, MessageType, NodeQuit,
};
use crate::service::bootstrap_cache::PublicNodesProvider;

impl RoutingTable {
    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start the periodic timers, the detection manager and the bootstrap
    /// cache helper, and register for transport offline events.
    ///
    /// A first node has nobody to bootstrap against and counts as joined
    /// from here on.
    pub fn init(self: &Arc<Self>) -> Result<()> {
        if self.is_destroyed() {
            return Err(KadError::ShuttingDown);
        }
        if self.inited.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut timers = vec![self.repeating(
            "routing_heartbeat",
            self.config.heartbeat_period,
            Self::heartbeat_proc,
        )];
        if !self.local.is_first_node() {
            timers.push(self.repeating("routing_rejoin", self.config.rejoin_period, Self::rejoin_check));
        }
        timers.push(self.repeating(
            "find_neighbours",
            self.config.find_neighbours_period,
            Self::find_neighbours,
        ));
        *self.timers.lock() = timers;

        self.detection
            .start(self.scheduler.as_ref(), self.config.detection_period);

        let weak = Arc::downgrade(self);
        let public_nodes: PublicNodesProvider = Arc::new(move || {
            weak.upgrade()
                .map(|table| table.public_endpoints())
                .unwrap_or_default()
        });
        self.cache_helper
            .start(self.scheduler.as_ref(), public_nodes, None);

        let weak = Arc::downgrade(self);
        self.heartbeat_monitor.register(
            self.monitor_name(),
            Arc::new(move |addr| {
                if let Some(table) = weak.upgrade() {
                    table.on_heartbeat_failed(addr);
                }
            }),
        );

        if self.local.is_first_node() {
            self.set_join(self.local.id(), self.local.local_addr());
        }
        info!(
            node = %self.local.id().short_hex(),
            first_node = self.local.is_first_node(),
            service_type = self.local.service_type(),
            "[kad] routing table started"
        );
        Ok(())
    }

    /// Stop every background task, then tell neighbours we are leaving.
    pub fn uninit(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        let timers = std::mem::take(&mut *self.timers.lock());
        for timer in timers {
            timer.join();
        }
        if let Some(task) = self.rejoin_task.lock().take() {
            task.join();
        }
        self.detection.join();
        self.tell_neighbors_drop_all();

        self.cache_helper.stop();
        self.heartbeat_monitor.unregister(&self.monitor_name());
        info!(node = %self.local.id().short_hex(), "[kad] routing table stopped");
    }

    fn repeating(
        self: &Arc<Self>,
        name: &'static str,
        period: Duration,
        task: fn(&RoutingTable),
    ) -> TimerHandle {
        let weak = Arc::downgrade(self);
        self.scheduler.start_repeating(
            name,
            period,
            Arc::new(move || {
                if let Some(table) = weak.upgrade() {
                    task(&table);
                }
            }),
        )
    }

    /// Public endpoints of the public members.
    pub fn public_endpoints(&self) -> Vec<SocketAddr> {
        self.nodes()
            .iter()
            .filter(|node| node.nat_type == NatType::Public)
            .filter_map(|node| node.public_addr)
            .collect()
    }

    // =========================================================================
    // Heartbeat
    // =========================================================================

    /// Heartbeat every neighbour whose deadline passed; drop the ones that
    /// missed too many rounds.
    pub fn heartbeat_proc(&self) {
        if self.is_destroyed() {
            return;
        }
        let now = self.time.now();
        let retry_ms = self.config.heartbeat_second_timeout.as_millis() as u64;
        let local_public = self.local.public_addr();
        let neighbours = self.get_closest_nodes(&self.local.id(), self.config.max_nodes());

        let mut sent = 0usize;
        for node in &neighbours {
            if node.public_addr == local_public {
                continue;
            }
            if node.is_timeout(self.config.heartbeat_max_count) {
                warn!(
                    node = %node.node_id.short_hex(),
                    misses = node.heartbeat_count(),
                    "[kad] node missed too many heartbeats, dropping"
                );
                self.drop_node(&node.node_id);
                continue;
            }
            if !node.heartbeat_due(now) {
                continue;
            }
            match self.send_heartbeat(node) {
                Ok(()) => {
                    node.heartbeat(now, retry_ms);
                    sent += 1;
                }
                Err(e) => debug!(node = %node.node_id.short_hex(), error = %e, "[kad] heartbeat send failed"),
            }
        }
        debug!(size = neighbours.len(), sent, "[kad] heartbeat round");
    }

    pub fn send_heartbeat(&self, node: &NodeRecord) -> Result<()> {
        let mut message = self.new_message(MessageType::HeartbeatRequest, Some(&node.node_id));
        message.des_service_type = node.service_type;
        let heartbeat = Heartbeat {
            extinfo: self.heartbeat_info.lock().clone(),
        };
        message.data = encode_payload(&heartbeat)?;
        self.send_data(&message, node)
    }

    /// Any sign of life from `node_id` resets its missed-heartbeat count.
    pub fn reset_node_heartbeat(&self, node_id: &NodeId) -> bool {
        match self.get_node(node_id) {
            Some(node) => {
                node.reset_heartbeat(
                    self.time.now(),
                    self.config.heartbeat_first_timeout.as_millis() as u64,
                );
                true
            }
            None => false,
        }
    }

    /// Attach `key = value` to every heartbeat we send. Returns the number
    /// of entries.
    pub fn add_heartbeat_info(&self, key: impl Into<String>, value: impl Into<String>) -> usize {
        let mut info = self.heartbeat_info.lock();
        info.insert(key.into(), value.into());
        info.len()
    }

    pub fn clear_heartbeat_info(&self) {
        self.heartbeat_info.lock().clear();
    }

    pub fn register_heartbeat_info_callback(&self, callback: HeartbeatInfoCallback) {
        *self.heartbeat_callback.lock() = Some(callback);
    }

    pub fn unregister_heartbeat_info_callback(&self) {
        *self.heartbeat_callback.lock() = None;
    }

    /// The transport gave up on `addr`: drop every member behind it.
    pub fn on_heartbeat_failed(&self, addr: SocketAddr) -> usize {
        let failed: Vec<NodeId> = self
            .nodes()
            .iter()
            .filter(|node| node.public_addr == Some(addr))
            .map(|node| node.node_id)
            .collect();
        for node_id in &failed {
            warn!(node = %node_id.short_hex(), %addr, "[kad] peer offline, dropping");
            self.drop_node(node_id);
        }
        failed.len()
    }

    // =========================================================================
    // Neighbour discovery
    // =========================================================================

    /// Periodic find-nodes round toward our own id.
    pub fn find_neighbours(&self) {
        if self.is_destroyed() {
            return;
        }
        let max_nodes = self.config.max_nodes();
        let known = self.get_closest_nodes(&self.local.id(), max_nodes);
        debug!(size = known.len(), "[kad] finding neighbours");
        self.find_closest_nodes(1, max_nodes, &known);
    }

    /// Ask for up to `count` nodes close to us.
    ///
    /// The first round (`attempts == 0`) asks the bootstrap node; later
    /// rounds ask the alpha closest members plus random ones. Ids in `known`
    /// travel in the request's bloom filter. Returns the requests sent.
    pub fn find_closest_nodes(&self, attempts: u32, count: usize, known: &[NodeRef]) -> usize {
        if self.is_destroyed() {
            return 0;
        }
        if !self.local.is_first_node() && !self.is_joined() && self.nodes_size() == 0 {
            debug!("[kad] not joined, skipping find nodes");
            return 0;
        }
        if attempts == 0 {
            let Some(bootstrap) = self.bootstrap_id() else {
                return 0;
            };
            return match self.send_find_closest_nodes(&bootstrap, count, known) {
                Ok(()) => 1,
                Err(e) => {
                    debug!(error = %e, "[kad] find nodes to bootstrap failed");
                    0
                }
            };
        }

        let mut sent = 0;
        for node in self.closest_alpha_nodes() {
            match self.send_find_closest_nodes(&node.node_id, count, known) {
                Ok(()) => sent += 1,
                Err(e) => debug!(node = %node.node_id.short_hex(), error = %e, "[kad] find nodes failed"),
            }
        }
        sent
    }

    /// The alpha closest members plus `alpha_random` others picked at
    /// random; every member when the table is that small.
    pub fn closest_alpha_nodes(&self) -> Vec<NodeRef> {
        let alpha = self.config.alpha;
        let nodes = self.get_closest_nodes(&self.local.id(), self.config.max_nodes());
        if nodes.len() <= alpha + self.config.alpha_random {
            return nodes;
        }
        let mut query = nodes[..alpha].to_vec();
        let mut rest = nodes[alpha..].to_vec();
        rest.shuffle(&mut rand::thread_rng());
        query.extend(rest.into_iter().take(self.config.alpha_random));
        query
    }

    pub fn send_find_closest_nodes(
        &self,
        node_id: &NodeId,
        count: usize,
        known: &[NodeRef],
    ) -> Result<()> {
        if self.is_destroyed() {
            return Err(KadError::ShuttingDown);
        }
        let node = self.get_node(node_id).ok_or(KadError::NotFound(*node_id))?;
        let mut bloom = BloomFilter::for_find_nodes();
        for known_node in known {
            bloom.insert(known_node.node_id.as_bytes());
        }
        let request = FindClosestNodesRequest {
            count: u32::try_from(count).unwrap_or(u32::MAX),
            target_id: self.local.id().to_vec(),
            bloomfilter: bloom.to_bytes(),
            src_nodeinfo: Some(self.local_wire_node()),
        };
        let mut message = self.new_message(MessageType::FindNodesRequest, Some(node_id));
        message.data = encode_payload(&request)?;
        self.send_data(&message, &node)
    }

    // =========================================================================
    // Leaving
    // =========================================================================

    /// Ask `node` to drop us. Client nodes are never in peers' tables.
    ///
    /// Also sent while shutting down, after every timer has stopped.
    pub fn send_drop_node(&self, node: &NodeRecord) -> Result<()> {
        if self.local.is_client_mode() {
            return Ok(());
        }
        let addr = node.send_addr().ok_or_else(|| {
            KadError::InvalidNode(format!("{} has no endpoint", node.node_id.short_hex()))
        })?;
        let mut message = self.new_message(MessageType::NodeQuit, Some(&node.node_id));
        message.des_service_type = node.service_type;
        message.data = encode_payload(&NodeQuit)?;
        self.transmit(&message, addr)
    }

    fn tell_neighbors_drop_all(&self) {
        let nodes = self.nodes();
        for node in nodes.iter() {
            if let Err(e) = self.send_drop_node(node) {
                debug!(node = %node.node_id.short_hex(), error = %e, "[kad] node quit send failed");
            }
        }
    }
}
