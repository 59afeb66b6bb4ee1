//! Join lifecycle: `Unjoined -> Joining -> Joined`, and rejoin when the
//! table empties.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;

use tracing::{debug, error, info, warn};

use super::core::RoutingTable;
use crate::domain::{JoinBackoff, NodeId, NodeRef};
use crate::error::{KadError, Result};
use crate::ports::RoutingEvent;
use crate::protocol::{encode_payload, BootstrapJoinRequest, MessageType};

/// Tables this small may consist only of virtual nodes of this node.
const VIRTUAL_ONLY_CHECK_SIZE: usize = 5;

impl RoutingTable {
    pub fn is_joined(&self) -> bool {
        self.join_state.lock().joined
    }

    /// Mark the node joined through `bootstrap_id` and wake `multi_join`.
    /// The first join wins; later calls return `false` and change nothing.
    pub fn set_join(&self, bootstrap_id: NodeId, bootstrap_addr: SocketAddr) -> bool {
        if !self.mark_joined(bootstrap_id, bootstrap_addr) {
            return false;
        }
        self.wake_join_waiters();
        true
    }

    /// Join state change without waking `multi_join`.
    pub(super) fn mark_joined(&self, bootstrap_id: NodeId, bootstrap_addr: SocketAddr) -> bool {
        {
            let mut state = self.join_state.lock();
            if state.joined {
                debug!(bootstrap = %bootstrap_id.short_hex(), "[kad] already joined, ignoring");
                return false;
            }
            state.joined = true;
            state.after_join = true;
            state.bootstrap_id = Some(bootstrap_id);
            state.bootstrap_addr = Some(bootstrap_addr);
        }
        info!(bootstrap = %bootstrap_id.short_hex(), %bootstrap_addr, "[kad] joined");
        self.policy.on_report(&RoutingEvent::Joined {
            bootstrap: bootstrap_id,
        });
        true
    }

    pub(super) fn wake_join_waiters(&self) {
        self.joined_tx.send_replace(true);
    }

    pub fn set_unjoin(&self) {
        let was_joined = {
            let mut state = self.join_state.lock();
            std::mem::replace(&mut state.joined, false)
        };
        self.joined_tx.send_replace(false);
        if was_joined {
            info!("[kad] lost every neighbour, unjoined");
            self.policy.on_report(&RoutingEvent::Unjoined);
        }
    }

    pub fn bootstrap_id(&self) -> Option<NodeId> {
        self.join_state.lock().bootstrap_id
    }

    pub fn bootstrap_addr(&self) -> Option<SocketAddr> {
        self.join_state.lock().bootstrap_addr
    }

    /// Nodes that answered one of our bootstrap requests.
    pub fn bootstrap_nodes(&self) -> Vec<NodeRef> {
        self.bootstrap_nodes.lock().clone()
    }

    /// Bootstrap against every endpoint until one of them admits us.
    ///
    /// Each round waits for a response with the [`JoinBackoff`] schedule.
    /// The loop never gives up on its own; it ends when the node joins or
    /// the table is shut down.
    pub async fn multi_join(&self, endpoints: &[SocketAddr]) -> Result<()> {
        if self.is_joined() {
            return Err(KadError::AlreadyJoined);
        }
        if endpoints.is_empty() {
            return Err(KadError::NoBootstrapEndpoints);
        }
        info!(endpoints = endpoints.len(), "[kad] joining");

        let mut joined = self.joined_tx.subscribe();
        let mut backoff = JoinBackoff::new(
            self.config.join_initial_wait,
            self.config.join_max_wait,
            self.config.join_retry_times,
        );
        loop {
            if self.is_destroyed() {
                return Err(KadError::ShuttingDown);
            }
            for endpoint in endpoints {
                if let Err(e) = self.send_bootstrap_request(*endpoint) {
                    debug!(%endpoint, error = %e, "[kad] bootstrap request failed");
                }
            }

            let wait = backoff.current_wait();
            let admitted = matches!(
                tokio::time::timeout(wait, joined.wait_for(|joined| *joined)).await,
                Ok(Ok(_))
            );
            if admitted {
                info!(bootstrap = ?self.bootstrap_addr(), "[kad] join succeeded");
                return Ok(());
            }
            let next = backoff.on_round_failed();
            info!(
                round = backoff.failed_rounds(),
                next_wait_secs = next.as_secs(),
                size = self.nodes_size(),
                "[kad] join round timed out"
            );
        }
    }

    /// Send one bootstrap join request to `endpoint`.
    pub fn send_bootstrap_request(&self, endpoint: SocketAddr) -> Result<()> {
        let mut message = self.new_message(MessageType::BootstrapJoinRequest, None);
        let request = BootstrapJoinRequest {
            local_addr: self.local.local_addr(),
            nat_type: self.local.nat_type(),
            xid: self.local.xid().to_vec(),
            xip: (!self.local.is_client_mode()).then(|| self.local.xip()),
        };
        message.data = encode_payload(&request)?;
        self.send_to(&message, endpoint)
    }

    /// Periodic check: unjoin when only this node's own virtual nodes (or
    /// nothing) remain, then join again in the background.
    pub fn rejoin_check(&self) {
        if self.is_destroyed() || self.local.is_first_node() {
            return;
        }
        if !self.join_state.lock().after_join {
            return;
        }

        if self.only_virtual_nodes_left() {
            self.set_unjoin();
        }
        if self.is_joined() {
            return;
        }
        if self.joining.swap(true, Ordering::SeqCst) {
            return;
        }

        let endpoints = self.rejoin_endpoints();
        let Some(table) = self.weak_self.upgrade() else {
            self.joining.store(false, Ordering::SeqCst);
            return;
        };
        info!(endpoints = endpoints.len(), "[kad] no neighbours left, rejoining");
        let task = self.scheduler.spawn(
            "rejoin",
            Box::pin(async move {
                match table.multi_join(&endpoints).await {
                    Ok(()) => info!("[kad] rejoin succeeded"),
                    Err(e) => error!(error = %e, "[kad] rejoin failed"),
                }
                table.joining.store(false, Ordering::SeqCst);
            }),
        );
        *self.rejoin_task.lock() = Some(task);
    }

    fn only_virtual_nodes_left(&self) -> bool {
        let nodes = self.nodes();
        if nodes.is_empty() {
            return true;
        }
        if nodes.len() > VIRTUAL_ONLY_CHECK_SIZE {
            return false;
        }
        let public = self.local.public_addr();
        let local = Some(self.local.local_addr());
        nodes
            .iter()
            .all(|node| node.public_addr == public && node.local_addr == local)
    }

    /// Cached public endpoints plus every bootstrap node that answered us.
    pub(super) fn rejoin_endpoints(&self) -> Vec<SocketAddr> {
        let mut endpoints: BTreeSet<SocketAddr> =
            self.cache_helper.public_endpoints().into_iter().collect();
        for node in self.bootstrap_nodes.lock().iter() {
            if let Some(addr) = node.public_addr {
                endpoints.insert(addr);
            }
        }
        if endpoints.is_empty() {
            warn!("[kad] no endpoints to rejoin through");
        }
        endpoints.into_iter().collect()
    }
}
