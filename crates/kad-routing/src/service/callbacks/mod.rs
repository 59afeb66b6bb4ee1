//! # Callback Manager
//!
//! Correlates outgoing request ids with pending response callbacks.
//!
//! An entry expects `n` replies. Each matching response invokes the callback
//! once and decrements the count; the entry is removed at zero. Timing out an
//! entry invokes the callback once per reply still outstanding.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::debug;

use crate::ports::{Scheduler, TimerHandle};
use crate::protocol::RoutingMessage;

/// Period of the timeout sweep.
pub const TIMEOUT_CHECK_PERIOD: Duration = Duration::from_secs(1);

/// What a pending callback is invoked with.
#[derive(Debug)]
pub enum CallbackOutcome<'a> {
    Response {
        message: &'a RoutingMessage,
        from: SocketAddr,
    },
    Timeout,
}

pub type ResponseCallback = Arc<dyn Fn(CallbackOutcome<'_>) + Send + Sync>;

struct PendingCallback {
    callback: ResponseCallback,
    remaining_replies: u32,
    remaining_secs: u32,
}

pub struct CallbackManager {
    next_id: AtomicU32,
    pending: Mutex<HashMap<u32, PendingCallback>>,
    timer: Mutex<Option<TimerHandle>>,
}

impl Default for CallbackManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CallbackManager {
    /// Message ids start at the wall-clock second count.
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);
        Self::with_seed(seed)
    }

    pub fn with_seed(seed: u32) -> Self {
        Self {
            next_id: AtomicU32::new(seed),
            pending: Mutex::new(HashMap::new()),
            timer: Mutex::new(None),
        }
    }

    /// Start the periodic timeout sweep.
    pub fn start(self: &Arc<Self>, scheduler: &dyn Scheduler) {
        let mut timer = self.timer.lock();
        if timer.is_some() {
            return;
        }
        let weak: Weak<Self> = Arc::downgrade(self);
        *timer = Some(scheduler.start_repeating(
            "callback_timeout_check",
            TIMEOUT_CHECK_PERIOD,
            Arc::new(move || {
                if let Some(manager) = weak.upgrade() {
                    manager.timeout_check();
                }
            }),
        ));
    }

    /// Stop the sweep. Pending entries are left untouched.
    pub fn stop(&self) {
        if let Some(timer) = self.timer.lock().take() {
            timer.join();
        }
    }

    /// Next request id.
    pub fn message_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// Register a callback expecting `expected_replies` responses within
    /// `timeout_secs` sweeps. Replaces any entry with the same id.
    pub fn add(&self, id: u32, timeout_secs: u32, callback: ResponseCallback, expected_replies: u32) {
        self.pending.lock().insert(
            id,
            PendingCallback {
                callback,
                remaining_replies: expected_replies.max(1),
                remaining_secs: timeout_secs.max(1),
            },
        );
    }

    /// Deliver a response. Returns `false` if nothing was pending for `id`.
    pub fn callback(&self, id: u32, message: &RoutingMessage, from: SocketAddr) -> bool {
        let callback = {
            let mut pending = self.pending.lock();
            let Some(entry) = pending.get_mut(&id) else {
                return false;
            };
            let callback = Arc::clone(&entry.callback);
            entry.remaining_replies -= 1;
            if entry.remaining_replies == 0 {
                pending.remove(&id);
            }
            callback
        };
        callback(CallbackOutcome::Response { message, from });
        true
    }

    /// Remove an entry; unless `suppress`, report a timeout for every reply
    /// still outstanding.
    pub fn cancel(&self, id: u32, suppress: bool) -> bool {
        let Some(entry) = self.pending.lock().remove(&id) else {
            return false;
        };
        if !suppress {
            for _ in 0..entry.remaining_replies {
                (entry.callback)(CallbackOutcome::Timeout);
            }
        }
        true
    }

    /// Time an entry out immediately.
    pub fn timeout(&self, id: u32) -> bool {
        self.cancel(id, false)
    }

    /// Age every entry by one sweep and time out the expired ones.
    pub fn timeout_check(&self) -> usize {
        let expired: Vec<PendingCallback> = {
            let mut pending = self.pending.lock();
            let ids: Vec<u32> = pending
                .iter_mut()
                .filter_map(|(id, entry)| {
                    entry.remaining_secs = entry.remaining_secs.saturating_sub(1);
                    (entry.remaining_secs == 0).then_some(*id)
                })
                .collect();
            ids.iter().filter_map(|id| pending.remove(id)).collect()
        };
        for entry in &expired {
            for _ in 0..entry.remaining_replies {
                (entry.callback)(CallbackOutcome::Timeout);
            }
        }
        if !expired.is_empty() {
            debug!(expired = expired.len(), "[kad] callbacks timed out");
        }
        expired.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}
