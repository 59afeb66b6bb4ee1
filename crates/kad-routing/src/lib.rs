//! # Kademlia Routing Layer
//!
//! XOR-distance routing tables for an overlay network: k-bucket membership,
//! the bootstrap join and find-nodes protocols, heartbeat liveness, relayed
//! delivery toward a destination id, and NAT classification of the local
//! endpoint.
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture with:
//! - **Domain Layer:** node ids, bucket indexing, node records and the bounded node table
//! - **Ports Layer:** transport, scheduler, clock, config, cache and policy traits
//! - **Protocol Layer:** message envelope, payloads and the bincode codec
//! - **Service Layer:** routing table, NAT detection, callbacks and the [`KadNode`] root
//! - **Adapters Layer:** tokio scheduler, in-memory/UDP transports, config providers
//!
//! Feature flags:
//!
//! - `network` - UDP transport, TOML config loading and the `kad-node` binary
//! - `test-utils` - controllable clock, manual scheduler, recording transport
//!
//! ## Example
//!
//! ```rust
//! use kad_routing::{AddNodeOutcome, NatType, NodeId, NodeRecord, NodeTable, RoutingConfig};
//! use std::net::SocketAddr;
//!
//! let config = RoutingConfig::default();
//! let mut table = NodeTable::new(NodeId::zero(), 0, config.k, config.max_nodes());
//!
//! let mut id = [0u8; 32];
//! id[0] = 0x80;
//! let node = NodeRecord::new(NodeId::new(id))
//!     .with_public_addr(SocketAddr::from(([10, 0, 0, 1], 9000)))
//!     .with_nat_type(NatType::Public);
//!
//! assert_eq!(table.add(node), Ok(AddNodeOutcome::Success));
//! assert_eq!(table.len(), 1);
//! ```

// =============================================================================
// CORE MODULES
// =============================================================================

pub mod domain;
pub mod error;
pub mod ports;
pub mod protocol;
pub mod service;

/// Concrete port implementations.
/// `UdpTransport` and `TomlConfigProvider` require feature: `network`
pub mod adapters;

/// Test utilities (FixedTimeSource, ManualScheduler, RecordingTransport)
/// Requires feature: `test-utils`
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// =============================================================================
// CORE RE-EXPORTS
// =============================================================================

// Domain entities
pub use domain::{
    AddNodeOutcome, FailReason, LocalNodeInfo, NatType, NodeConfig, NodeId, NodeRecord,
    NodeTable, RoutingConfig, ServiceType, Timestamp, K, ROOT_SERVICE_TYPE,
};

// Domain services
pub use domain::{bucket_index, closer_to_target, hash64, xor_distance};

// Errors
pub use error::{KadError, Result};

// Port traits
pub use ports::{
    ConfigProvider, MessagePolicy, PacketHandler, PersistentCache, RoutingEvent, Scheduler,
    TimeSource, TimerHandle, Transport, TransportError,
};

// Wire protocol
pub use protocol::{MessageType, Priority, RoutingMessage};

// Services
pub use service::{
    CallbackManager, HeartbeatMonitor, KadNode, NatConfig, NatDetector, NodeDependencies,
    RoutingTable, RoutingTableBuilder,
};

// Adapters
pub use adapters::{
    ConfigError, InMemoryCacheStore, MemoryNetwork, MemoryTransport, NoOpCacheStore,
    NoOpTransport, StaticConfigProvider, SystemTimeSource, TokioScheduler,
};

#[cfg(feature = "network")]
pub use adapters::{TomlConfigProvider, UdpTransport};

// =============================================================================
// TEST UTILITIES (Requires `test-utils` feature)
// =============================================================================

#[cfg(any(test, feature = "test-utils"))]
pub use test_utils::{FixedTimeSource, ManualScheduler, RecordingTransport};
