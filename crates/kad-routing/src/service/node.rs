//! # Kad Node
//!
//! Composition root of one routing identity. Wires the injected transport,
//! scheduler, clock, cache store and policy into a callback manager,
//! heartbeat monitor, NAT detector, routing table and message dispatcher.
//!
//! ## Startup order
//!
//! 1. callback sweep and heartbeat monitor
//! 2. routing table build and dispatcher registration
//! 3. NAT classification against the configured endpoints
//! 4. routing table timers
//!
//! Joining is a separate step, see [`KadNode::join`].

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};

use tracing::{info, warn};

use crate::domain::{LocalNodeInfo, NatType, NodeConfig, NodeId, RoutingConfig};
use crate::error::Result;
use crate::ports::{
    DefaultMessagePolicy, MessagePolicy, PersistentCache, Scheduler, TimeSource, Transport,
};
use crate::service::callbacks::CallbackManager;
use crate::service::dispatcher::MessageDispatcher;
use crate::service::heartbeat::HeartbeatMonitor;
use crate::service::nat::{NatConfig, NatDetector};
use crate::service::routing::{RoutingTable, RoutingTableBuilder};

/// Collaborators a [`KadNode`] runs on.
pub struct NodeDependencies {
    pub transport: Arc<dyn Transport>,
    /// Second socket for NAT detection; the main transport when absent.
    pub nat_transport: Option<Arc<dyn Transport>>,
    pub scheduler: Arc<dyn Scheduler>,
    pub time: Option<Arc<dyn TimeSource>>,
    pub cache: Option<Arc<dyn PersistentCache>>,
    pub policy: Option<Arc<dyn MessagePolicy>>,
    pub nat_config: NatConfig,
}

impl NodeDependencies {
    pub fn new(transport: Arc<dyn Transport>, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            transport,
            nat_transport: None,
            scheduler,
            time: None,
            cache: None,
            policy: None,
            nat_config: NatConfig::default(),
        }
    }

    #[must_use]
    pub fn with_nat_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.nat_transport = Some(transport);
        self
    }

    #[must_use]
    pub fn with_time_source(mut self, time: Arc<dyn TimeSource>) -> Self {
        self.time = Some(time);
        self
    }

    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn PersistentCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn MessagePolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    #[must_use]
    pub fn with_nat_config(mut self, config: NatConfig) -> Self {
        self.nat_config = config;
        self
    }
}

/// A running routing node.
pub struct KadNode {
    config: NodeConfig,
    routing: Arc<RoutingTable>,
    nat: Arc<NatDetector>,
    callbacks: Arc<CallbackManager>,
    monitor: Arc<HeartbeatMonitor>,
    transport: Arc<dyn Transport>,
    nat_transport: Option<Arc<dyn Transport>>,
}

impl KadNode {
    /// Build and start a node. Does not join; call [`KadNode::join`].
    pub async fn start(
        config: NodeConfig,
        routing_config: RoutingConfig,
        deps: NodeDependencies,
    ) -> Result<Self> {
        let node_id = config.node_id.unwrap_or_else(NodeId::random);

        let callbacks = Arc::new(CallbackManager::new());
        callbacks.start(deps.scheduler.as_ref());

        let monitor = Arc::new(HeartbeatMonitor::new());
        let weak_monitor: Weak<HeartbeatMonitor> = Arc::downgrade(&monitor);
        deps.transport.set_offline_callback(Arc::new(move |addr| {
            if let Some(monitor) = weak_monitor.upgrade() {
                monitor.on_heartbeat_failed(addr);
            }
        }));

        let nat = NatDetector::new(
            deps.nat_config,
            Arc::clone(&deps.scheduler),
            Arc::clone(&callbacks),
        );

        let local = Arc::new(
            LocalNodeInfo::new(node_id, deps.transport.local_addr())
                .with_first_node(config.first_node)
                .with_client_mode(config.client_mode)
                .with_service_type(config.service_type)
                .with_zone(config.zone_id, config.country.clone()),
        );

        let mut builder = RoutingTableBuilder::new(routing_config, Arc::clone(&local))
            .transport(Arc::clone(&deps.transport))
            .scheduler(Arc::clone(&deps.scheduler))
            .callbacks(Arc::clone(&callbacks))
            .heartbeat_monitor(Arc::clone(&monitor));
        if let Some(time) = deps.time {
            builder = builder.time_source(time);
        }
        if let Some(cache) = deps.cache {
            builder = builder.cache_store(cache);
        }
        let policy = deps.policy.unwrap_or_else(|| Arc::new(DefaultMessagePolicy));
        let routing = builder.policy(Arc::clone(&policy)).build()?;

        let dispatcher = Arc::new(MessageDispatcher::new(
            Arc::clone(&routing),
            Arc::clone(&nat),
            Arc::clone(&callbacks),
            policy,
        ));
        deps.transport.register_receiver(dispatcher.clone());
        if let Some(nat_transport) = &deps.nat_transport {
            nat_transport.register_receiver(dispatcher);
        }

        let nat_transport = deps
            .nat_transport
            .clone()
            .unwrap_or_else(|| Arc::clone(&deps.transport));
        let classified = nat
            .start(
                config.first_node,
                &config.public_endpoints,
                Arc::clone(&deps.transport),
                nat_transport,
            )
            .await;
        if !classified {
            warn!("[kad] nat detection did not finish, continuing as unknown");
        }
        local.set_nat_type(nat.local_nat_type());

        routing.init()?;
        info!(
            node = %node_id.short_hex(),
            addr = %local.local_addr(),
            nat_type = ?local.nat_type(),
            "[kad] node started"
        );

        Ok(Self {
            config,
            routing,
            nat,
            callbacks,
            monitor,
            transport: deps.transport,
            nat_transport: deps.nat_transport,
        })
    }

    /// Join through the configured and cached bootstrap endpoints. A first
    /// node is joined from the start.
    pub async fn join(&self) -> Result<()> {
        if self.config.first_node {
            return Ok(());
        }
        let local = self.routing.local_node();
        if local.nat_type() == NatType::Unknown {
            local.set_nat_type(self.nat.local_nat_type());
        }
        let endpoints: BTreeSet<SocketAddr> = self
            .config
            .public_endpoints
            .iter()
            .copied()
            .chain(self.routing.cache_helper().public_endpoints())
            .collect();
        let endpoints: Vec<SocketAddr> = endpoints.into_iter().collect();
        self.routing.multi_join(&endpoints).await
    }

    /// Leave the network and stop every background task.
    pub fn stop(&self) {
        self.routing.uninit();
        self.nat.stop();
        self.callbacks.stop();
        self.transport.unregister_receiver();
        if let Some(nat_transport) = &self.nat_transport {
            nat_transport.unregister_receiver();
        }
        info!(node = %self.routing.local_id().short_hex(), "[kad] node stopped");
    }

    pub fn id(&self) -> NodeId {
        self.routing.local_id()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn routing(&self) -> &Arc<RoutingTable> {
        &self.routing
    }

    pub fn nat(&self) -> &Arc<NatDetector> {
        &self.nat
    }

    pub fn callbacks(&self) -> &Arc<CallbackManager> {
        &self.callbacks
    }

    pub fn heartbeat_monitor(&self) -> &Arc<HeartbeatMonitor> {
        &self.monitor
    }
}
