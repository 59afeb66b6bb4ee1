//! Node sorting and selection.

use super::distance::xor_distance;
use crate::domain::{NodeId, NodeRef};

/// Sort records by XOR distance to `target`, closest first.
pub fn sort_by_closeness(nodes: &mut [NodeRef], target: &NodeId) {
    nodes.sort_by_cached_key(|node| xor_distance(&node.node_id, target));
}

/// Up to `count` records closest to `target`.
pub fn closest_n(nodes: &[NodeRef], target: &NodeId, count: usize) -> Vec<NodeRef> {
    let mut sorted = nodes.to_vec();
    sort_by_closeness(&mut sorted, target);
    sorted.truncate(count);
    sorted
}
