//! # NAT Detection
//!
//! One-shot classification of this node's NAT type against the bootstrap
//! endpoints, plus the handshake bursts both sides send during it.

mod detector;
mod handshake;

pub use detector::{NatConfig, NatDetector};
pub use handshake::{NatHandshakeManager, HANDSHAKE_DURATION, HANDSHAKE_PERIOD};
