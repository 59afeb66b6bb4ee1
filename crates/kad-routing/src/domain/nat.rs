//! NAT classification helpers and the handshake burst schedule.

use std::collections::HashMap;
use std::net::SocketAddr;

use super::entities::NatType;

/// Classify a detect request: the peer is public when the local endpoint it
/// declared is the endpoint the packet arrived from.
pub fn classify_detect_request(declared_local: SocketAddr, observed: SocketAddr) -> NatType {
    if declared_local == observed {
        NatType::Public
    } else {
        NatType::Unknown
    }
}

#[derive(Debug, Clone)]
struct BurstEntry<T> {
    target: T,
    delay_ticks: u32,
    remaining: u32,
}

/// Per-peer handshake bursts keyed by the peer's endpoint.
///
/// Each entry waits `delay_ticks` ticks and then fires on each of the next
/// `detect_ticks` ticks. Adding a key that exists replaces the old burst.
#[derive(Debug, Clone)]
pub struct HandshakeSchedule<T> {
    detect_ticks: u32,
    entries: HashMap<SocketAddr, BurstEntry<T>>,
}

impl<T: Clone> HandshakeSchedule<T> {
    pub fn new(detect_ticks: u32) -> Self {
        Self {
            detect_ticks,
            entries: HashMap::new(),
        }
    }

    pub fn add(&mut self, key: SocketAddr, target: T, delay_ticks: u32) {
        self.entries.insert(
            key,
            BurstEntry {
                target,
                delay_ticks,
                remaining: self.detect_ticks,
            },
        );
    }

    pub fn remove(&mut self, key: &SocketAddr) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn contains(&self, key: &SocketAddr) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Advance one tick and return the targets to handshake now.
    pub fn tick(&mut self) -> Vec<T> {
        let mut due = Vec::new();
        self.entries.retain(|_, entry| {
            if entry.delay_ticks > 0 {
                entry.delay_ticks -= 1;
                return true;
            }
            if entry.remaining == 0 {
                return false;
            }
            entry.remaining -= 1;
            due.push(entry.target.clone());
            entry.remaining > 0
        });
        due
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
