//! Routing Table Implementation
//!
//! Pure data structure behind the service-level routing table: the bounded
//! node set, its id and hash indexes, and per-bucket admission.

mod bucket;
mod config;
mod join;
mod table;

pub use bucket::KBucket;
pub use config::{RoutingConfig, K, NUM_BUCKETS, ROUTING_MAX_NODES_SIZE};
pub use join::JoinBackoff;
pub use table::{Admission, NodeTable};

#[cfg(test)]
mod tests;
