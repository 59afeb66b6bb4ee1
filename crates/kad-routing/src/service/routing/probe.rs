//! Read-only view of table internals for tests.

use super::core::RoutingTable;
use crate::domain::NodeId;

/// Borrowed view of a [`RoutingTable`]'s internal state.
pub struct RoutingTableProbe<'a> {
    table: &'a RoutingTable,
}

impl RoutingTable {
    pub fn probe(&self) -> RoutingTableProbe<'_> {
        RoutingTableProbe { table: self }
    }
}

impl RoutingTableProbe<'_> {
    /// Members in the bucket at `index`.
    pub fn bucket_len(&self, index: u32) -> usize {
        self.table
            .table
            .read()
            .bucket(index)
            .map_or(0, |bucket| bucket.len())
    }

    pub fn hash_index_len(&self) -> usize {
        self.table.table.read().hash_index_len()
    }

    /// Length of the published snapshot.
    pub fn snapshot_len(&self) -> usize {
        self.table.snapshot.read().len()
    }

    pub fn detection_pending(&self) -> usize {
        self.table.detection.pending_count()
    }

    pub fn timers_len(&self) -> usize {
        self.table.timers.lock().len()
    }

    pub fn has_rejoin_task(&self) -> bool {
        self.table.rejoin_task.lock().is_some()
    }

    pub fn is_joining(&self) -> bool {
        self.table
            .joining
            .load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn after_join(&self) -> bool {
        self.table.join_state.lock().after_join
    }

    pub fn is_bootstrap_node(&self, node_id: &NodeId) -> bool {
        self.table
            .bootstrap_nodes
            .lock()
            .iter()
            .any(|node| node.node_id == *node_id)
    }

    pub fn heartbeat_info_len(&self) -> usize {
        self.table.heartbeat_info.lock().len()
    }

    pub fn is_destroyed(&self) -> bool {
        self.table.is_destroyed()
    }
}
