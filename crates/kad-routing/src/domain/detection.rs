//! Probe bookkeeping for NAT'd candidates awaiting reachability checks.

use std::collections::HashMap;
use std::net::SocketAddr;

use super::entities::{NatType, NodeId};
use super::node_record::NodeRecord;

/// Queue size above which every tick logs a warning.
pub const DETECTION_QUEUE_WARN_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionConfig {
    /// Probes sent before the candidate is given up.
    pub max_probes: u32,
    /// Responses that mark a node detected.
    pub detected_threshold: u32,
    /// Ticks skipped before the first probe to a ConeAbnormal candidate.
    pub cone_abnormal_delay: u32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            max_probes: 4,
            detected_threshold: 3,
            cone_abnormal_delay: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DetectionEntry {
    pub node: NodeRecord,
    pub detection_count: u32,
    pub delay_count: u32,
    /// Handshake responses seen while queued.
    pub response_count: u32,
}

/// Pending candidates keyed by public endpoint.
///
/// Response tallies live on the entries and go away with them.
#[derive(Debug, Default)]
pub struct DetectionQueue {
    config: DetectionConfig,
    entries: HashMap<SocketAddr, DetectionEntry>,
}

impl DetectionQueue {
    pub fn new(config: DetectionConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.entries.contains_key(addr)
    }

    /// Queue a candidate. Fails for a duplicate endpoint or a record
    /// without a public endpoint.
    pub fn add(&mut self, node: NodeRecord) -> bool {
        let Some(addr) = node.public_addr else {
            return false;
        };
        if self.entries.contains_key(&addr) {
            return false;
        }
        let delay_count = if node.nat_type == NatType::ConeAbnormal {
            self.config.cone_abnormal_delay
        } else {
            0
        };
        self.entries.insert(
            addr,
            DetectionEntry {
                node,
                detection_count: 0,
                delay_count,
                response_count: 0,
            },
        );
        true
    }

    pub fn remove(&mut self, addr: &SocketAddr) -> Option<DetectionEntry> {
        self.entries.remove(addr)
    }

    /// Advance one detection period.
    ///
    /// Returns the candidates to probe now. Entries that already used all
    /// their probes are dropped.
    pub fn tick(&mut self) -> Vec<NodeRecord> {
        let max_probes = self.config.max_probes;
        let mut probes = Vec::new();
        self.entries.retain(|_, entry| {
            if entry.delay_count > 0 {
                entry.delay_count -= 1;
                return true;
            }
            if entry.detection_count >= max_probes {
                return false;
            }
            entry.detection_count += 1;
            probes.push(entry.node.clone());
            true
        });
        probes
    }

    /// Count a handshake response from `node_id`; returns the new tally.
    /// Responses from ids that are not queued are not counted.
    pub fn record_response(&mut self, node_id: NodeId) -> u32 {
        match self
            .entries
            .values_mut()
            .find(|entry| entry.node.node_id == node_id)
        {
            Some(entry) => {
                entry.response_count += 1;
                entry.response_count
            }
            None => 0,
        }
    }

    pub fn is_detected(&self, node_id: &NodeId) -> bool {
        self.entries.values().any(|entry| {
            entry.node.node_id == *node_id
                && entry.response_count >= self.config.detected_threshold
        })
    }

    /// Drop every pending entry for `node_id`.
    pub fn forget(&mut self, node_id: &NodeId) {
        self.entries.retain(|_, entry| entry.node.node_id != *node_id);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
