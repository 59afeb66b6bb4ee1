//! Construction of a [`RoutingTable`] with its collaborators.

use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;

use super::core::{JoinState, RoutingTable};
use crate::adapters::cache::NoOpCacheStore;
use crate::adapters::time::SystemTimeSource;
use crate::domain::{
    DetectionConfig, DynamicXipManager, LocalNodeInfo, NodeTable, RoutingConfig,
};
use crate::error::{KadError, Result};
use crate::ports::{
    DefaultMessagePolicy, MessagePolicy, PersistentCache, Scheduler, TimeSource, Transport,
};
use crate::service::bootstrap_cache::BootstrapCacheHelper;
use crate::service::callbacks::CallbackManager;
use crate::service::heartbeat::HeartbeatMonitor;
use crate::service::node_detection::NodeDetectionManager;

/// Builder for [`RoutingTable`].
///
/// Transport and scheduler are required. Everything else defaults: system
/// clock, a fresh callback manager and heartbeat monitor, the default
/// message policy and a no-op cache store.
///
/// # Example
///
/// ```rust,ignore
/// let table = RoutingTableBuilder::new(RoutingConfig::default(), local)
///     .transport(transport)
///     .scheduler(scheduler)
///     .build()?;
/// table.init()?;
/// ```
pub struct RoutingTableBuilder {
    config: RoutingConfig,
    local: Arc<LocalNodeInfo>,
    transport: Option<Arc<dyn Transport>>,
    scheduler: Option<Arc<dyn Scheduler>>,
    time: Option<Arc<dyn TimeSource>>,
    callbacks: Option<Arc<CallbackManager>>,
    heartbeat_monitor: Option<Arc<HeartbeatMonitor>>,
    policy: Option<Arc<dyn MessagePolicy>>,
    cache: Option<Arc<dyn PersistentCache>>,
}

impl RoutingTableBuilder {
    pub fn new(config: RoutingConfig, local: Arc<LocalNodeInfo>) -> Self {
        Self {
            config,
            local,
            transport: None,
            scheduler: None,
            time: None,
            callbacks: None,
            heartbeat_monitor: None,
            policy: None,
            cache: None,
        }
    }

    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    #[must_use]
    pub fn time_source(mut self, time: Arc<dyn TimeSource>) -> Self {
        self.time = Some(time);
        self
    }

    #[must_use]
    pub fn callbacks(mut self, callbacks: Arc<CallbackManager>) -> Self {
        self.callbacks = Some(callbacks);
        self
    }

    #[must_use]
    pub fn heartbeat_monitor(mut self, monitor: Arc<HeartbeatMonitor>) -> Self {
        self.heartbeat_monitor = Some(monitor);
        self
    }

    #[must_use]
    pub fn policy(mut self, policy: Arc<dyn MessagePolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    #[must_use]
    pub fn cache_store(mut self, cache: Arc<dyn PersistentCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Assemble the table. Fails when the transport or scheduler is missing.
    pub fn build(self) -> Result<Arc<RoutingTable>> {
        let transport = self.transport.ok_or(KadError::NotInitialized("transport"))?;
        let scheduler = self.scheduler.ok_or(KadError::NotInitialized("scheduler"))?;
        let time = self
            .time
            .unwrap_or_else(|| Arc::new(SystemTimeSource::new()));
        let callbacks = self
            .callbacks
            .unwrap_or_else(|| Arc::new(CallbackManager::new()));
        let heartbeat_monitor = self
            .heartbeat_monitor
            .unwrap_or_else(|| Arc::new(HeartbeatMonitor::new()));
        let policy = self
            .policy
            .unwrap_or_else(|| Arc::new(DefaultMessagePolicy));
        let cache = self.cache.unwrap_or_else(|| Arc::new(NoOpCacheStore));

        let config = self.config;
        let local = self.local;
        let detection_config = DetectionConfig {
            max_probes: config.detection_times,
            detected_threshold: config.detected_threshold,
            cone_abnormal_delay: config.cone_abnormal_delay_count,
        };
        let table = NodeTable::new(local.id(), local.hash64(), config.k, config.max_nodes());
        let cache_helper = Arc::new(BootstrapCacheHelper::new(local.service_type(), cache));
        let (joined_tx, _) = watch::channel(false);

        Ok(Arc::new_cyclic(|weak| RoutingTable {
            detection: Arc::new(NodeDetectionManager::new(weak.clone(), detection_config)),
            weak_self: weak.clone(),
            config,
            local,
            transport,
            scheduler,
            time,
            callbacks,
            heartbeat_monitor,
            policy,
            table: RwLock::new(table),
            snapshot: RwLock::new(Arc::new(Vec::new())),
            join_state: Mutex::new(JoinState::default()),
            joined_tx,
            joining: AtomicBool::new(false),
            bootstrap_nodes: Mutex::new(Vec::new()),
            dxip: DynamicXipManager::new(),
            cache_helper,
            heartbeat_info: Mutex::new(BTreeMap::new()),
            heartbeat_callback: Mutex::new(None),
            timers: Mutex::new(Vec::new()),
            rejoin_task: Mutex::new(None),
            inited: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
        }))
    }
}
