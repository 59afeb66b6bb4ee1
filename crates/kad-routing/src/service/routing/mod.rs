//! # Routing Table Service
//!
//! The live routing table of one local identity: bounded k-bucket
//! membership, closest-node queries, the bootstrap join and find-nodes
//! protocols, relaying toward the closest known node, and the periodic
//! heartbeat, rejoin and find-neighbours timers.
//!
//! Handlers run synchronously on whichever task delivered the message.
//! Membership changes go through [`RoutingTable::add_node`] and
//! [`RoutingTable::drop_node`] only.

mod builder;
mod core;
mod handlers;
mod join;
mod maintenance;
#[cfg(any(test, feature = "test-utils"))]
mod probe;

pub use self::core::{HeartbeatInfoCallback, RoutingTable};
pub use builder::RoutingTableBuilder;
#[cfg(any(test, feature = "test-utils"))]
pub use probe::RoutingTableProbe;

#[cfg(test)]
mod tests;
