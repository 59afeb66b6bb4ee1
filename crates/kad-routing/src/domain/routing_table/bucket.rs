//! K-Bucket implementation for Kademlia routing.

use crate::domain::NodeId;

/// Members of one XOR-distance bucket.
///
/// A full bucket rejects new candidates outright. Members leave only through
/// heartbeat timeout or an explicit drop.
#[derive(Debug, Clone, Default)]
pub struct KBucket {
    pub(crate) members: Vec<NodeId>,
}

impl KBucket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_full(&self, k: usize) -> bool {
        self.members.len() >= k
    }

    pub fn members(&self) -> &[NodeId] {
        &self.members
    }

    /// Add a member (assumes not full and not present).
    pub(crate) fn add(&mut self, node_id: NodeId) {
        self.members.push(node_id);
    }

    pub(crate) fn remove(&mut self, node_id: &NodeId) -> bool {
        match self.members.iter().position(|id| id == node_id) {
            Some(pos) => {
                self.members.remove(pos);
                true
            }
            None => false,
        }
    }

    pub(crate) fn contains(&self, node_id: &NodeId) -> bool {
        self.members.contains(node_id)
    }
}
