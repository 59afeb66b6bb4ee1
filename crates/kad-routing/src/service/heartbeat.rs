//! # Heartbeat Monitor
//!
//! Registry of offline callbacks. Transports report peers they consider
//! dead; every registered component is told about them.

use std::net::SocketAddr;

use parking_lot::Mutex;
use tracing::debug;

use crate::ports::OfflineCallback;

#[derive(Default)]
pub struct HeartbeatMonitor {
    callbacks: Mutex<Vec<(String, OfflineCallback)>>,
}

impl HeartbeatMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` under `name`, replacing an earlier registration.
    pub fn register(&self, name: impl Into<String>, callback: OfflineCallback) {
        let name = name.into();
        let mut callbacks = self.callbacks.lock();
        callbacks.retain(|(existing, _)| *existing != name);
        callbacks.push((name, callback));
    }

    pub fn unregister(&self, name: &str) -> bool {
        let mut callbacks = self.callbacks.lock();
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| existing != name);
        callbacks.len() != before
    }

    /// Fan an offline event out to every registered callback.
    pub fn on_heartbeat_failed(&self, addr: SocketAddr) {
        let callbacks: Vec<OfflineCallback> = self
            .callbacks
            .lock()
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        debug!(%addr, listeners = callbacks.len(), "[kad] heartbeat failed");
        for callback in callbacks {
            callback(addr);
        }
    }

    pub fn len(&self) -> usize {
        self.callbacks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.lock().is_empty()
    }
}
