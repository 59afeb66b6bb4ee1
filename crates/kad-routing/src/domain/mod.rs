//! Domain Layer - Pure business logic with no I/O
//!
//! This module contains the core Kademlia DHT logic including:
//! - Node identifiers, XOR bucket indexing and closeness ordering
//! - Node records with liveness state
//! - The bounded node table with k-bucket admission
//! - Join backoff, detection probing and NAT handshake schedules
//! - Bootstrap endpoint caches and dynamic xip allocation

pub mod bloom;
pub mod bootstrap_cache;
pub mod detection;
pub mod dynamic_xip;
pub mod entities;
pub mod errors;
pub mod local_node;
pub mod nat;
pub mod node_record;
pub mod routing_table;
pub mod services;
pub mod value_objects;

pub use bloom::*;
pub use bootstrap_cache::*;
pub use detection::*;
pub use dynamic_xip::*;
pub use entities::*;
pub use errors::*;
pub use local_node::*;
pub use nat::*;
pub use node_record::*;
pub use routing_table::*;
pub use services::*;
pub use value_objects::*;
