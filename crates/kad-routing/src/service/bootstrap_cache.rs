//! # Bootstrap Cache Helper
//!
//! Keeps the set of known public endpoints of this partition and writes it
//! through to the persistent cache so a restarted node has bootstrap
//! candidates beyond its configured ones. Root nodes also keep small
//! rolling caches of public nodes of other service types.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use rand::seq::IteratorRandom;
use tracing::{debug, info, warn};

use crate::domain::{PublicEndpoints, ServiceNodeCache, ServiceType, ROOT_SERVICE_TYPE};
use crate::ports::{PersistentCache, Scheduler, TimerHandle};

/// Namespace of the persisted endpoint lists.
pub const BOOTSTRAP_CACHE_NAMESPACE: &str = "bootstrap_cache";

pub const DUMP_PERIOD: Duration = Duration::from_secs(60);
pub const SERVICE_REFRESH_PERIOD: Duration = Duration::from_secs(3);

/// Public endpoints currently known to the routing table.
pub type PublicNodesProvider = Arc<dyn Fn() -> Vec<SocketAddr> + Send + Sync>;

/// Public endpoints of another service type.
pub type ServiceNodesProvider = Arc<dyn Fn(ServiceType) -> Vec<SocketAddr> + Send + Sync>;

#[derive(Default)]
struct Providers {
    public_nodes: Option<PublicNodesProvider>,
    service_nodes: Option<ServiceNodesProvider>,
}

pub struct BootstrapCacheHelper {
    service_type: ServiceType,
    store: Arc<dyn PersistentCache>,
    public_endpoints: Mutex<PublicEndpoints>,
    service_types: Mutex<BTreeSet<ServiceType>>,
    service_nodes: Mutex<ServiceNodeCache>,
    providers: Mutex<Providers>,
    timers: Mutex<Vec<TimerHandle>>,
}

impl BootstrapCacheHelper {
    pub fn new(service_type: ServiceType, store: Arc<dyn PersistentCache>) -> Self {
        Self {
            service_type,
            store,
            public_endpoints: Mutex::new(PublicEndpoints::default()),
            service_types: Mutex::new(BTreeSet::new()),
            service_nodes: Mutex::new(ServiceNodeCache::default()),
            providers: Mutex::new(Providers::default()),
            timers: Mutex::new(Vec::new()),
        }
    }

    /// Load the persisted endpoints and start the periodic dump. Root nodes
    /// given a service provider also start the service cache refresh.
    pub fn start(
        self: &Arc<Self>,
        scheduler: &dyn Scheduler,
        public_nodes: PublicNodesProvider,
        service_nodes: Option<ServiceNodesProvider>,
    ) {
        let mut timers = self.timers.lock();
        if !timers.is_empty() {
            return;
        }
        let refresh_services = self.service_type == ROOT_SERVICE_TYPE && service_nodes.is_some();
        {
            let mut providers = self.providers.lock();
            providers.public_nodes = Some(public_nodes);
            providers.service_nodes = service_nodes;
        }
        self.load_bootstrap_cache();

        let weak: Weak<Self> = Arc::downgrade(self);
        timers.push(scheduler.start_repeating(
            "bootstrap_cache_dump",
            DUMP_PERIOD,
            Arc::new(move || {
                if let Some(helper) = weak.upgrade() {
                    helper.dump_public_endpoints();
                }
            }),
        ));
        if refresh_services {
            let weak: Weak<Self> = Arc::downgrade(self);
            timers.push(scheduler.start_repeating(
                "service_nodes_refresh",
                SERVICE_REFRESH_PERIOD,
                Arc::new(move || {
                    if let Some(helper) = weak.upgrade() {
                        helper.repeat_cache_service_public_nodes();
                    }
                }),
            ));
        }
        info!(service_type = self.service_type, "[kad] bootstrap cache helper started");
    }

    pub fn stop(&self) {
        for timer in self.timers.lock().drain(..) {
            timer.join();
        }
    }

    pub fn public_endpoints(&self) -> Vec<SocketAddr> {
        self.public_endpoints.lock().as_slice().to_vec()
    }

    /// Refresh from the routing table and persist a non-empty result.
    pub fn dump_public_endpoints(&self) {
        let Some(provider) = self.providers.lock().public_nodes.clone() else {
            return;
        };
        let nodes = provider();
        if nodes.is_empty() {
            return;
        }
        let keys = {
            let mut endpoints = self.public_endpoints.lock();
            endpoints.replace(nodes);
            endpoints.to_keys()
        };
        let value = match serde_json::to_vec(&keys) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "[kad] failed to serialize bootstrap cache");
                return;
            }
        };
        match self
            .store
            .map_set(BOOTSTRAP_CACHE_NAMESPACE, &self.service_type.to_string(), value)
        {
            Ok(()) => debug!(endpoints = keys.len(), "[kad] bootstrap cache dumped"),
            Err(e) => warn!(error = %e, "[kad] failed to persist bootstrap cache"),
        }
    }

    /// Seed the endpoint set from the persistent cache.
    pub fn load_bootstrap_cache(&self) -> usize {
        let key = self.service_type.to_string();
        let bytes = match self.store.map_get(BOOTSTRAP_CACHE_NAMESPACE, &key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return 0,
            Err(e) => {
                warn!(error = %e, "[kad] failed to read bootstrap cache");
                return 0;
            }
        };
        let keys: Vec<String> = match serde_json::from_slice(&bytes) {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "[kad] discarding malformed bootstrap cache");
                return 0;
            }
        };
        let loaded = PublicEndpoints::from_keys(&keys);
        let count = loaded.as_slice().len();
        *self.public_endpoints.lock() = loaded;
        info!(endpoints = count, "[kad] bootstrap cache loaded");
        count
    }

    /// Track `service_type` in the periodic service refresh.
    pub fn set_cache_service_type(&self, service_type: ServiceType) {
        self.service_types.lock().insert(service_type);
    }

    /// Refresh one randomly chosen tracked service type.
    pub fn repeat_cache_service_public_nodes(&self) {
        let chosen = self
            .service_types
            .lock()
            .iter()
            .copied()
            .choose(&mut rand::thread_rng());
        if let Some(service_type) = chosen {
            self.cache_service_public_nodes(service_type);
        }
    }

    /// Pull public nodes of `service_type` into its rolling cache.
    pub fn cache_service_public_nodes(&self, service_type: ServiceType) -> usize {
        let Some(provider) = self.providers.lock().service_nodes.clone() else {
            return 0;
        };
        let nodes = provider(service_type);
        let mut cache = self.service_nodes.lock();
        cache.push(service_type, nodes);
        cache.len(service_type)
    }

    /// Cached public nodes of `service_type`, querying the provider once when
    /// the cache is empty.
    pub fn get_cache_service_public_nodes(&self, service_type: ServiceType) -> Vec<SocketAddr> {
        let cached = self.service_nodes.lock().get(service_type);
        if !cached.is_empty() {
            return cached;
        }
        self.cache_service_public_nodes(service_type);
        self.service_nodes.lock().get(service_type)
    }
}
