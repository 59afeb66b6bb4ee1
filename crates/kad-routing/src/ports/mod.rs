//! # Ports Layer - Hexagonal Architecture Boundaries
//!
//! ## Architecture
//!
//! - **Driving Ports (Inbound):** the packet entry point transports call into
//! - **Driven Ports (Outbound):** transport, scheduler, clock, configuration
//!   and persistent cache the host supplies
//! - **Policy:** hooks a deployment plugs into the routing table

pub mod inbound;
pub mod outbound;
pub mod policy;

pub use inbound::PacketHandler;
pub use outbound::{
    BoxFuture, CacheError, ConfigProvider, OfflineCallback, PersistentCache, Scheduler,
    TimeSource, TimerHandle, Transport, TransportError,
};
pub use policy::{DefaultMessagePolicy, MessagePolicy, RelayDecision, RoutingEvent};
