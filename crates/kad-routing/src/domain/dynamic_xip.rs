//! Dynamic xip allocation for client nodes joining through this node.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

/// Length of an xip address.
pub const XIP_SIZE: usize = 16;

/// Byte marking an xip as dynamically dispatched.
const DYNAMIC_MARKER_OFFSET: usize = 12;
const DYNAMIC_MARKER: u8 = 0xD0;

/// A client that was handed a dynamic xip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientNode {
    pub node_id: Vec<u8>,
    pub public_addr: SocketAddr,
}

#[derive(Debug, Default)]
pub struct DynamicXipManager {
    next_id: AtomicU32,
    clients: Mutex<HashMap<Vec<u8>, ClientNode>>,
}

impl DynamicXipManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a fresh xip from `local_xip`.
    ///
    /// The low three bytes carry a per-process counter, so up to 2^24
    /// allocations are distinct.
    pub fn dispatch_dynamic_xip(&self, local_xip: &[u8]) -> Vec<u8> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        let mut xip = local_xip.to_vec();
        xip.resize(XIP_SIZE, 0);
        xip[DYNAMIC_MARKER_OFFSET] = DYNAMIC_MARKER;
        xip[DYNAMIC_MARKER_OFFSET + 1..].copy_from_slice(&id.to_be_bytes()[1..]);
        xip
    }

    pub fn add_client_node(&self, dxip: Vec<u8>, client: ClientNode) {
        self.clients.lock().insert(dxip, client);
    }

    pub fn remove_client_node(&self, dxip: &[u8]) -> Option<ClientNode> {
        self.clients.lock().remove(dxip)
    }

    pub fn find_client_node(&self, dxip: &[u8]) -> Option<ClientNode> {
        self.clients.lock().get(dxip).cloned()
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }
}
