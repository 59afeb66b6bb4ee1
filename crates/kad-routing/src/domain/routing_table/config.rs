//! Routing table constants and configuration.

use std::time::Duration;

use crate::domain::NODE_ID_BITS;

/// Bucket capacity.
pub const K: usize = 8;

/// One bucket per distance bit plus the unused self slot at index 0.
pub const NUM_BUCKETS: usize = NODE_ID_BITS + 1;

/// Total capacity of a routing table.
pub const ROUTING_MAX_NODES_SIZE: usize = NODE_ID_BITS * K;

/// Tunables of the `[routing]` configuration section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingConfig {
    /// Bucket size (default: 8)
    pub k: usize,
    /// Closest nodes queried per find-nodes round (default: 2)
    pub alpha: usize,
    /// Random nodes added to each find-nodes round (default: 1)
    pub alpha_random: usize,
    /// Upper bound of nodes returned in a find-nodes response (default: 16)
    pub closest_nodes_num: usize,
    /// Relayed messages are dropped at this hop count (default: 20)
    pub hop_to_live: u32,
    pub heartbeat_period: Duration,
    pub rejoin_period: Duration,
    pub find_neighbours_period: Duration,
    pub join_initial_wait: Duration,
    pub join_max_wait: Duration,
    /// Failed rounds before the join wait starts doubling (default: 5)
    pub join_retry_times: u32,
    pub detection_period: Duration,
    /// Probes sent to a candidate before it is given up (default: 4)
    pub detection_times: u32,
    /// Handshake responses that mark a candidate detected (default: 3)
    pub detected_threshold: u32,
    /// Ticks skipped before probing a ConeAbnormal candidate (default: 3)
    pub cone_abnormal_delay_count: u32,
    pub heartbeat_first_timeout: Duration,
    pub heartbeat_second_timeout: Duration,
    /// Missed heartbeats before a node is dropped (default: 12)
    pub heartbeat_max_count: u32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            k: K,
            alpha: 2,
            alpha_random: 1,
            closest_nodes_num: 16,
            hop_to_live: 20,
            heartbeat_period: Duration::from_millis(1000),
            rejoin_period: Duration::from_millis(3000),
            find_neighbours_period: Duration::from_millis(3000),
            join_initial_wait: Duration::from_secs(4),
            join_max_wait: Duration::from_secs(128),
            join_retry_times: 5,
            detection_period: Duration::from_millis(600),
            detection_times: 4,
            detected_threshold: 3,
            cone_abnormal_delay_count: 3,
            heartbeat_first_timeout: Duration::from_secs(8),
            heartbeat_second_timeout: Duration::from_secs(2),
            heartbeat_max_count: 12,
        }
    }
}

impl RoutingConfig {
    /// Create a config suitable for testing (small buckets, short timers)
    pub fn for_testing() -> Self {
        Self {
            k: 3,
            heartbeat_period: Duration::from_millis(100),
            rejoin_period: Duration::from_millis(200),
            find_neighbours_period: Duration::from_millis(200),
            join_initial_wait: Duration::from_millis(500),
            join_max_wait: Duration::from_secs(4),
            detection_period: Duration::from_millis(50),
            ..Self::default()
        }
    }

    /// Total node capacity implied by `k`.
    pub fn max_nodes(&self) -> usize {
        NODE_ID_BITS * self.k
    }
}
