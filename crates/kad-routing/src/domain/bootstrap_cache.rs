//! Endpoint sets behind the bootstrap cache helper.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::SocketAddr;

use super::entities::ServiceType;
use super::value_objects::endpoint_key;

/// Default capacity of one service cache.
pub const SERVICE_CACHE_CAPACITY: usize = 8;

/// Oldest entries evicted when a service cache overflows.
pub const SERVICE_CACHE_EVICT: usize = 4;

/// Known public endpoints, deduplicated by `ip:port`, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublicEndpoints {
    endpoints: Vec<SocketAddr>,
}

impl PublicEndpoints {
    /// Replace the set, dropping repeated endpoints.
    pub fn replace<I: IntoIterator<Item = SocketAddr>>(&mut self, endpoints: I) {
        let mut seen = HashSet::new();
        self.endpoints = endpoints
            .into_iter()
            .filter(|addr| seen.insert(endpoint_key(addr)))
            .collect();
    }

    pub fn as_slice(&self) -> &[SocketAddr] {
        &self.endpoints
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Serialized form kept in the persistent store.
    pub fn to_keys(&self) -> Vec<String> {
        self.endpoints.iter().map(endpoint_key).collect()
    }

    /// Parse keys written by [`PublicEndpoints::to_keys`]; bad entries are skipped.
    pub fn from_keys(keys: &[String]) -> Self {
        let mut endpoints = Self::default();
        endpoints.replace(keys.iter().filter_map(|key| key.parse().ok()));
        endpoints
    }
}

/// Rolling per-service caches of public nodes kept by root nodes.
#[derive(Debug, Clone)]
pub struct ServiceNodeCache {
    capacity: usize,
    evict: usize,
    caches: HashMap<ServiceType, VecDeque<SocketAddr>>,
}

impl Default for ServiceNodeCache {
    fn default() -> Self {
        Self::new(SERVICE_CACHE_CAPACITY, SERVICE_CACHE_EVICT)
    }
}

impl ServiceNodeCache {
    pub fn new(capacity: usize, evict: usize) -> Self {
        Self {
            capacity,
            evict,
            caches: HashMap::new(),
        }
    }

    /// Append endpoints; on overflow the oldest `evict` entries go.
    pub fn push<I: IntoIterator<Item = SocketAddr>>(&mut self, service_type: ServiceType, nodes: I) {
        let cache = self.caches.entry(service_type).or_default();
        for addr in nodes {
            if !cache.contains(&addr) {
                cache.push_back(addr);
            }
        }
        if cache.len() > self.capacity {
            let evict = self.evict.min(cache.len());
            cache.drain(..evict);
        }
    }

    pub fn get(&self, service_type: ServiceType) -> Vec<SocketAddr> {
        self.caches
            .get(&service_type)
            .map(|cache| cache.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, service_type: ServiceType) -> usize {
        self.caches.get(&service_type).map(VecDeque::len).unwrap_or(0)
    }
}
