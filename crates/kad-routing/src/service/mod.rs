//! # Routing Services
//!
//! Stateful components built on the domain layer and driven through the
//! ports: the routing table and its detection manager, NAT detection,
//! request callbacks, the bootstrap endpoint cache, the offline-event
//! monitor, the inbound dispatcher and the [`KadNode`] composition root.

pub mod bootstrap_cache;
pub mod callbacks;
pub mod dispatcher;
pub mod heartbeat;
pub mod nat;
pub mod node;
pub mod node_detection;
pub mod routing;

pub use bootstrap_cache::BootstrapCacheHelper;
pub use callbacks::{CallbackManager, CallbackOutcome, ResponseCallback};
pub use dispatcher::MessageDispatcher;
pub use heartbeat::HeartbeatMonitor;
pub use nat::{NatConfig, NatDetector, NatHandshakeManager};
pub use node::{KadNode, NodeDependencies};
pub use node_detection::NodeDetectionManager;
pub use routing::{HeartbeatInfoCallback, RoutingTable, RoutingTableBuilder};
#[cfg(any(test, feature = "test-utils"))]
pub use routing::RoutingTableProbe;
