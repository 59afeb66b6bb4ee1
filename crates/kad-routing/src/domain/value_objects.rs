//! Value objects shared across layers.

use std::net::SocketAddr;

use super::entities::{NodeId, ServiceType, ROOT_SERVICE_TYPE};

/// Identity and addressing of the local node, as loaded from the `[node]`
/// configuration section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Fixed node id; a random one is generated when absent.
    pub node_id: Option<NodeId>,
    /// This node seeds the network and never bootstraps against others.
    pub first_node: bool,
    /// Declared local endpoint.
    pub local_addr: SocketAddr,
    /// Well-known bootstrap endpoints.
    pub public_endpoints: Vec<SocketAddr>,
    /// Optional zone tag.
    pub zone_id: Option<u32>,
    /// Optional country tag.
    pub country: Option<String>,
    /// Client nodes are not admitted into peers' tables and get a dynamic xip.
    pub client_mode: bool,
    /// Network partition of this routing table.
    pub service_type: ServiceType,
}

impl NodeConfig {
    /// Config for a node listening on `local_addr` with no bootstrap peers.
    pub fn new(local_addr: SocketAddr) -> Self {
        Self {
            node_id: None,
            first_node: false,
            local_addr,
            public_endpoints: Vec::new(),
            zone_id: None,
            country: None,
            client_mode: false,
            service_type: ROOT_SERVICE_TYPE,
        }
    }
}

/// `ip:port` key used for endpoint-keyed maps and persisted caches.
pub fn endpoint_key(addr: &SocketAddr) -> String {
    format!("{}:{}", addr.ip(), addr.port())
}

/// Parse a comma separated `ip:port` list, skipping malformed entries.
pub fn parse_endpoint_list(list: &str) -> Vec<SocketAddr> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect()
}
