//! # Node Detection
//!
//! Probes NAT'd candidates with handshake requests before they can be
//! admitted. Admission itself happens when the candidate's handshake
//! response reaches the routing table; this manager only sends probes and
//! expires candidates that never answered.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::domain::{
    DetectionConfig, DetectionQueue, NodeId, NodeRecord, DETECTION_QUEUE_WARN_SIZE,
};
use crate::ports::{Scheduler, TimerHandle};
use crate::service::routing::RoutingTable;

pub struct NodeDetectionManager {
    /// Back-reference to the owning table, used for sending only.
    routing: Weak<RoutingTable>,
    queue: Mutex<DetectionQueue>,
    timer: Mutex<Option<TimerHandle>>,
    destroyed: AtomicBool,
}

impl NodeDetectionManager {
    pub fn new(routing: Weak<RoutingTable>, config: DetectionConfig) -> Self {
        Self {
            routing,
            queue: Mutex::new(DetectionQueue::new(config)),
            timer: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Start probing every `period`.
    pub fn start(self: &Arc<Self>, scheduler: &dyn Scheduler, period: Duration) {
        let mut timer = self.timer.lock();
        if timer.is_some() {
            return;
        }
        let weak: Weak<Self> = Arc::downgrade(self);
        *timer = Some(scheduler.start_repeating(
            "node_detection",
            period,
            Arc::new(move || {
                if let Some(manager) = weak.upgrade() {
                    manager.do_detection();
                }
            }),
        ));
    }

    /// Stop the timer and forget every candidate. Later adds are ignored.
    pub fn join(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
        if let Some(timer) = self.timer.lock().take() {
            timer.join();
        }
        self.queue.lock().clear();
    }

    /// Queue a candidate for probing. Returns `false` if its endpoint is
    /// already queued.
    pub fn add_detection_node(&self, node: NodeRecord) -> bool {
        if self.destroyed.load(Ordering::SeqCst) {
            return false;
        }
        let id = node.node_id;
        let added = self.queue.lock().add(node);
        if added {
            debug!(node = %id.short_hex(), "[kad] detection queued");
        }
        added
    }

    pub fn remove_detection(&self, addr: &SocketAddr) -> bool {
        self.queue.lock().remove(addr).is_some()
    }

    /// Count a handshake response from a queued `node_id`; 0 otherwise.
    pub fn record_response(&self, node_id: NodeId) -> u32 {
        self.queue.lock().record_response(node_id)
    }

    /// Enough handshake responses were seen from `node_id`.
    pub fn detected(&self, node_id: &NodeId) -> bool {
        self.queue.lock().is_detected(node_id)
    }

    pub fn forget(&self, node_id: &NodeId) {
        self.queue.lock().forget(node_id);
    }

    pub fn pending_count(&self) -> usize {
        self.queue.lock().len()
    }

    /// One detection period: probe every due candidate.
    pub fn do_detection(&self) -> usize {
        if self.destroyed.load(Ordering::SeqCst) {
            return 0;
        }
        let probes = {
            let mut queue = self.queue.lock();
            if queue.len() > DETECTION_QUEUE_WARN_SIZE {
                warn!(pending = queue.len(), "[kad] detection queue is large");
            }
            queue.tick()
        };
        let Some(routing) = self.routing.upgrade() else {
            return 0;
        };
        let mut sent = 0;
        for node in &probes {
            match routing.send_handshake_request(node) {
                Ok(()) => sent += 1,
                Err(e) => debug!(node = %node.node_id.short_hex(), error = %e, "[kad] handshake probe failed"),
            }
        }
        sent
    }
}
