//! The local node's identity and mutable addressing state.

use std::collections::HashMap;
use std::net::SocketAddr;

use parking_lot::{Mutex, RwLock};

use super::entities::{NatType, NodeId, ServiceType, ROOT_SERVICE_TYPE};
use super::services::hash64;

/// Dynamic xips handed to this node by bootstrap peers, keyed both ways.
#[derive(Debug, Default)]
struct DynamicXips {
    by_node: HashMap<NodeId, Vec<u8>>,
    by_xip: HashMap<Vec<u8>, NodeId>,
}

/// Identity of the local node.
///
/// Fixed fields are set at construction; the public address, NAT type and
/// xip are learned later and may be read from any thread.
#[derive(Debug)]
pub struct LocalNodeInfo {
    node_id: NodeId,
    local_addr: SocketAddr,
    first_node: bool,
    client_mode: bool,
    service_type: ServiceType,
    zone_id: Option<u32>,
    country: Option<String>,
    xid: Vec<u8>,
    hash64: u64,
    public_addr: RwLock<Option<SocketAddr>>,
    nat_type: RwLock<NatType>,
    xip: RwLock<Vec<u8>>,
    dxips: Mutex<DynamicXips>,
}

impl LocalNodeInfo {
    pub fn new(node_id: NodeId, local_addr: SocketAddr) -> Self {
        Self {
            node_id,
            local_addr,
            first_node: false,
            client_mode: false,
            service_type: ROOT_SERVICE_TYPE,
            zone_id: None,
            country: None,
            xid: node_id.to_vec(),
            hash64: hash64(node_id.as_bytes()),
            public_addr: RwLock::new(None),
            nat_type: RwLock::new(NatType::Unknown),
            xip: RwLock::new(Vec::new()),
            dxips: Mutex::new(DynamicXips::default()),
        }
    }

    /// A first node is its own public endpoint.
    #[must_use]
    pub fn with_first_node(mut self, first_node: bool) -> Self {
        self.first_node = first_node;
        if first_node {
            *self.public_addr.get_mut() = Some(self.local_addr);
        }
        self
    }

    #[must_use]
    pub fn with_client_mode(mut self, client_mode: bool) -> Self {
        self.client_mode = client_mode;
        self
    }

    #[must_use]
    pub fn with_service_type(mut self, service_type: ServiceType) -> Self {
        self.service_type = service_type;
        self
    }

    #[must_use]
    pub fn with_zone(mut self, zone_id: Option<u32>, country: Option<String>) -> Self {
        self.zone_id = zone_id;
        self.country = country;
        self
    }

    #[must_use]
    pub fn with_xid(mut self, xid: Vec<u8>) -> Self {
        self.hash64 = hash64(&xid);
        self.xid = xid;
        self
    }

    #[must_use]
    pub fn with_xip(mut self, xip: Vec<u8>) -> Self {
        *self.xip.get_mut() = xip;
        self
    }

    #[must_use]
    pub fn with_nat_type(mut self, nat_type: NatType) -> Self {
        *self.nat_type.get_mut() = nat_type;
        self
    }

    pub fn id(&self) -> NodeId {
        self.node_id
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_first_node(&self) -> bool {
        self.first_node
    }

    pub fn is_client_mode(&self) -> bool {
        self.client_mode
    }

    pub fn service_type(&self) -> ServiceType {
        self.service_type
    }

    pub fn zone_id(&self) -> Option<u32> {
        self.zone_id
    }

    pub fn country(&self) -> Option<&str> {
        self.country.as_deref()
    }

    pub fn xid(&self) -> &[u8] {
        &self.xid
    }

    pub fn hash64(&self) -> u64 {
        self.hash64
    }

    pub fn public_addr(&self) -> Option<SocketAddr> {
        *self.public_addr.read()
    }

    pub fn set_public_addr(&self, addr: SocketAddr) {
        *self.public_addr.write() = Some(addr);
    }

    pub fn nat_type(&self) -> NatType {
        *self.nat_type.read()
    }

    pub fn set_nat_type(&self, nat_type: NatType) {
        *self.nat_type.write() = nat_type;
    }

    /// Routable xip. Client nodes use the first dynamic xip they were given.
    pub fn xip(&self) -> Vec<u8> {
        if self.client_mode {
            let dxips = self.dxips.lock();
            if let Some(xip) = dxips.by_node.values().next() {
                return xip.clone();
            }
        }
        self.xip.read().clone()
    }

    pub fn set_xip(&self, xip: Vec<u8>) {
        *self.xip.write() = xip;
    }

    /// Local endpoint equals the learned public endpoint.
    pub fn is_public_node(&self) -> bool {
        self.public_addr() == Some(self.local_addr)
    }

    /// Remember the dynamic xip `node_id` dispatched to us.
    pub fn add_dxip(&self, node_id: NodeId, dxip: Vec<u8>) {
        let mut dxips = self.dxips.lock();
        if let Some(old) = dxips.by_node.insert(node_id, dxip.clone()) {
            dxips.by_xip.remove(&old);
        }
        dxips.by_xip.insert(dxip, node_id);
    }

    /// Forget the dynamic xip obtained from `node_id`.
    pub fn drop_dxip(&self, node_id: &NodeId) -> bool {
        let mut dxips = self.dxips.lock();
        match dxips.by_node.remove(node_id) {
            Some(xip) => {
                dxips.by_xip.remove(&xip);
                true
            }
            None => false,
        }
    }

    pub fn has_dynamic_xip(&self, dxip: &[u8]) -> bool {
        self.dxips.lock().by_xip.contains_key(dxip)
    }

    pub fn dxip_count(&self) -> usize {
        self.dxips.lock().by_node.len()
    }
}
