//! Bounded node set with id and hash indexes.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use rand::seq::SliceRandom;

use crate::domain::{
    bucket_index, closest_n, AddNodeOutcome, FailReason, NodeId, NodeRecord, NodeRef, NatType,
};

use super::bucket::KBucket;
use super::config::NUM_BUCKETS;

/// Resident nodes of one routing table.
///
/// `nodes`, `by_id`, `by_hash` and the buckets are mutated together by
/// [`NodeTable::add`] and [`NodeTable::remove`] only. The hash index also
/// carries the local node so range and index queries see the whole keyspace
/// this node knows about.
#[derive(Debug)]
pub struct NodeTable {
    local_id: NodeId,
    local_hash64: u64,
    k: usize,
    max_nodes: usize,
    nodes: Vec<NodeRef>,
    by_id: HashMap<NodeId, NodeRef>,
    by_hash: BTreeSet<(u64, NodeId)>,
    buckets: Vec<KBucket>,
}

impl NodeTable {
    pub fn new(local_id: NodeId, local_hash64: u64, k: usize, max_nodes: usize) -> Self {
        let mut by_hash = BTreeSet::new();
        by_hash.insert((local_hash64, local_id));
        Self {
            local_id,
            local_hash64,
            k,
            max_nodes,
            nodes: Vec::new(),
            by_id: HashMap::new(),
            by_hash,
            buckets: (0..NUM_BUCKETS).map(|_| KBucket::new()).collect(),
        }
    }

    pub fn local_id(&self) -> &NodeId {
        &self.local_id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Entries of the hash index, the local node included.
    pub fn hash_index_len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn nodes(&self) -> &[NodeRef] {
        &self.nodes
    }

    pub fn get(&self, node_id: &NodeId) -> Option<NodeRef> {
        self.by_id.get(node_id).cloned()
    }

    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.by_id.contains_key(node_id)
    }

    pub fn bucket(&self, index: u32) -> Option<&KBucket> {
        self.buckets.get(index as usize)
    }

    /// Run the admission checks without mutating anything.
    ///
    /// Order: NAT type, self id, endpoint validity, duplicate, capacity,
    /// bucket fill.
    pub fn check(&self, record: &NodeRecord) -> Result<Admission, FailReason> {
        if record.nat_type == NatType::Unknown {
            return Err(FailReason::UnknownNatType);
        }
        if record.node_id == self.local_id {
            return Err(FailReason::SelfNode);
        }
        if !record.is_valid() {
            return Err(FailReason::InvalidRecord);
        }
        if self.by_id.contains_key(&record.node_id) {
            return Ok(Admission::Duplicate);
        }
        if self.nodes.len() >= self.max_nodes {
            return Err(FailReason::TableFull);
        }
        let index = bucket_index(&self.local_id, &record.node_id);
        if self.buckets[index as usize].is_full(self.k) {
            return Err(FailReason::BucketFull(index));
        }
        Ok(Admission::Accept(index))
    }

    /// True only if `add` would insert the record.
    pub fn can_add(&self, record: &NodeRecord) -> bool {
        matches!(self.check(record), Ok(Admission::Accept(_)))
    }

    /// Admit a record, assigning its bucket index.
    pub fn add(&mut self, mut record: NodeRecord) -> Result<AddNodeOutcome, FailReason> {
        let index = match self.check(&record)? {
            Admission::Duplicate => return Ok(AddNodeOutcome::AlreadyExists),
            Admission::Accept(index) => index,
        };
        record.bucket_index = index;
        let node = Arc::new(record);
        self.buckets[index as usize].add(node.node_id);
        self.by_hash.insert((node.hash64, node.node_id));
        self.by_id.insert(node.node_id, Arc::clone(&node));
        self.nodes.push(node);
        Ok(AddNodeOutcome::Success)
    }

    /// Remove a node from every index. Absent ids are a no-op.
    pub fn remove(&mut self, node_id: &NodeId) -> Option<NodeRef> {
        let node = self.by_id.remove(node_id)?;
        self.nodes.retain(|n| n.node_id != *node_id);
        self.by_hash.remove(&(node.hash64, node.node_id));
        if let Some(bucket) = self.buckets.get_mut(node.bucket_index as usize) {
            bucket.remove(node_id);
        }
        Some(node)
    }

    /// Up to `count` nodes closest to `target`.
    pub fn closest(&self, target: &NodeId, count: usize) -> Vec<NodeRef> {
        closest_n(&self.nodes, target, count)
    }

    /// Nodes whose hash lies in `[min, max]`, ordered by hash.
    pub fn range_by_hash(&self, min: u64, max: u64) -> Vec<NodeRef> {
        if min > max {
            return Vec::new();
        }
        if min == u64::MIN && max == u64::MAX {
            return self.hash_ordered().collect();
        }
        self.by_hash
            .range((min, NodeId::zero())..=(max, NodeId::new([0xFF; 32])))
            .filter_map(|(_, id)| self.by_id.get(id).cloned())
            .collect()
    }

    /// Nodes at positions `[start, end]` of the hash ordering.
    ///
    /// Positions count the local node, which is never returned.
    pub fn range_by_index(&self, start: usize, end: usize) -> Vec<NodeRef> {
        if start > end {
            return Vec::new();
        }
        self.by_hash
            .iter()
            .skip(start)
            .take(end.saturating_sub(start).saturating_add(1))
            .filter_map(|(_, id)| self.by_id.get(id).cloned())
            .collect()
    }

    /// Position of the local node in the hash ordering.
    pub fn self_index(&self) -> usize {
        self.by_hash
            .range(..(self.local_hash64, self.local_id))
            .count()
    }

    pub fn random_node(&self) -> Option<NodeRef> {
        self.nodes.choose(&mut rand::thread_rng()).cloned()
    }

    fn hash_ordered(&self) -> impl Iterator<Item = NodeRef> + '_ {
        self.by_hash
            .iter()
            .filter_map(|(_, id)| self.by_id.get(id).cloned())
    }
}

/// Result of the admission dry run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Would be inserted into this bucket.
    Accept(u32),
    /// Already resident.
    Duplicate,
}
