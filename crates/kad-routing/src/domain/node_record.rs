//! Remote node records.
//!
//! A [`NodeRecord`] is shared by reference between the node table, the
//! read snapshot and in-flight handlers. Identity fields are immutable once
//! the record is admitted; liveness state is atomic so the heartbeat loop can
//! update it without taking the table lock.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use super::entities::{NatType, NodeId, ServiceType, Timestamp, ROOT_SERVICE_TYPE};
use super::services::hash64;

/// Shared handle to an admitted record.
pub type NodeRef = Arc<NodeRecord>;

#[derive(Debug, Default)]
struct Liveness {
    heartbeat_count: AtomicU32,
    next_deadline_ms: AtomicU64,
}

impl Clone for Liveness {
    fn clone(&self) -> Self {
        Self {
            heartbeat_count: AtomicU32::new(self.heartbeat_count.load(Ordering::Relaxed)),
            next_deadline_ms: AtomicU64::new(self.next_deadline_ms.load(Ordering::Relaxed)),
        }
    }
}

/// Everything known about a remote node.
#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub node_id: NodeId,
    /// Bucket the record occupies; assigned by the table on admission.
    pub bucket_index: u32,
    pub public_addr: Option<SocketAddr>,
    pub local_addr: Option<SocketAddr>,
    pub nat_type: NatType,
    pub service_type: ServiceType,
    pub xid: Vec<u8>,
    pub xip: Vec<u8>,
    /// Digest of `xid`, the key of the hash index.
    pub hash64: u64,
    pub is_client: bool,
    /// Reached over the LAN; datagrams go to `local_addr`.
    pub same_vlan: bool,
    liveness: Liveness,
}

impl NodeRecord {
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            bucket_index: 0,
            public_addr: None,
            local_addr: None,
            nat_type: NatType::Unknown,
            service_type: ROOT_SERVICE_TYPE,
            xid: Vec::new(),
            xip: Vec::new(),
            hash64: hash64(&[]),
            is_client: false,
            same_vlan: false,
            liveness: Liveness::default(),
        }
    }

    #[must_use]
    pub fn with_public_addr(mut self, addr: SocketAddr) -> Self {
        self.public_addr = Some(addr);
        self
    }

    #[must_use]
    pub fn with_local_addr(mut self, addr: SocketAddr) -> Self {
        self.local_addr = Some(addr);
        self
    }

    #[must_use]
    pub fn with_nat_type(mut self, nat_type: NatType) -> Self {
        self.nat_type = nat_type;
        self
    }

    #[must_use]
    pub fn with_service_type(mut self, service_type: ServiceType) -> Self {
        self.service_type = service_type;
        self
    }

    /// Set the xid and recompute `hash64` from it.
    #[must_use]
    pub fn with_xid(mut self, xid: Vec<u8>) -> Self {
        self.set_xid(xid);
        self
    }

    #[must_use]
    pub fn with_xip(mut self, xip: Vec<u8>) -> Self {
        self.xip = xip;
        self
    }

    pub fn set_xid(&mut self, xid: Vec<u8>) {
        self.hash64 = hash64(&xid);
        self.xid = xid;
    }

    /// Public endpoint equals the declared local endpoint.
    pub fn is_public_node(&self) -> bool {
        self.public_addr.is_some() && self.public_addr == self.local_addr
    }

    /// Has a usable public endpoint.
    pub fn is_valid(&self) -> bool {
        self.public_addr
            .map(|addr| addr.port() != 0 && !addr.ip().is_unspecified())
            .unwrap_or(false)
    }

    /// Endpoint datagrams for this node are sent to.
    pub fn send_addr(&self) -> Option<SocketAddr> {
        if self.same_vlan {
            self.local_addr.or(self.public_addr)
        } else {
            self.public_addr
        }
    }

    /// Record an unanswered heartbeat round and push the deadline out by
    /// `retry_ms`.
    pub fn heartbeat(&self, now: Timestamp, retry_ms: u64) {
        self.liveness.heartbeat_count.fetch_add(1, Ordering::Relaxed);
        self.liveness
            .next_deadline_ms
            .store(now.add_millis(retry_ms).as_millis(), Ordering::Relaxed);
    }

    /// Any message from the node resets its liveness.
    pub fn reset_heartbeat(&self, now: Timestamp, first_timeout_ms: u64) {
        self.liveness.heartbeat_count.store(0, Ordering::Relaxed);
        self.liveness
            .next_deadline_ms
            .store(now.add_millis(first_timeout_ms).as_millis(), Ordering::Relaxed);
    }

    pub fn heartbeat_count(&self) -> u32 {
        self.liveness.heartbeat_count.load(Ordering::Relaxed)
    }

    pub fn next_heartbeat_deadline(&self) -> Timestamp {
        Timestamp::from_millis(self.liveness.next_deadline_ms.load(Ordering::Relaxed))
    }

    /// The heartbeat deadline has passed.
    pub fn heartbeat_due(&self, now: Timestamp) -> bool {
        now >= self.next_heartbeat_deadline()
    }

    pub fn is_timeout(&self, max_count: u32) -> bool {
        self.heartbeat_count() >= max_count
    }
}
