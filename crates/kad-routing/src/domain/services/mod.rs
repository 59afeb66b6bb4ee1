//! Domain Services - Pure functions for Kademlia operations
//!
//! All functions in this module are pure (no I/O, no state mutation)
//! and deterministic (same inputs → same outputs).

mod distance;
mod hashing;
mod sorting;

pub use distance::{bucket_index, closer_to_target, xor_distance};
pub use hashing::hash64;
pub use sorting::{closest_n, sort_by_closeness};
