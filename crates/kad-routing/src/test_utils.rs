//! Test utilities for the routing layer.
//!
//! Controllable clock, a scheduler whose tasks run only when a test fires
//! them, and a transport that records what it sends.
//! Enable with the `test-utils` feature flag.
//!
//! # Example
//!
//! ```rust
//! use kad_routing::test_utils::FixedTimeSource;
//! use kad_routing::TimeSource;
//! use std::time::Duration;
//!
//! let time = FixedTimeSource::new(1000);
//! time.advance(Duration::from_secs(2));
//! assert_eq!(time.now().as_millis(), 3000);
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::domain::Timestamp;
use crate::ports::{
    BoxFuture, OfflineCallback, PacketHandler, Scheduler, TimeSource, TimerHandle, Transport,
    TransportError,
};
use crate::protocol::{decode_message, MessageType, Priority, RoutingMessage};

/// A time source that only moves when told to.
#[derive(Debug, Default)]
pub struct FixedTimeSource {
    millis: AtomicU64,
}

impl FixedTimeSource {
    /// Create a time source at `millis` since the epoch.
    pub fn new(millis: u64) -> Self {
        Self {
            millis: AtomicU64::new(millis),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl TimeSource for FixedTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.millis.load(Ordering::SeqCst))
    }
}

type RepeatingTask = Arc<dyn Fn() + Send + Sync>;
type DelayedTask = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct ManualState {
    next_key: u64,
    repeating: HashMap<u64, (&'static str, RepeatingTask)>,
    delayed: HashMap<u64, (&'static str, DelayedTask)>,
    spawned: Vec<(&'static str, BoxFuture)>,
}

/// Scheduler that never runs anything on its own.
///
/// Repeating and delayed tasks run when a test calls [`ManualScheduler::fire`]
/// or [`ManualScheduler::fire_delayed`]; spawned futures are parked until
/// [`ManualScheduler::run_spawned`].
#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Arc<Mutex<ManualState>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every repeating task registered under `name`. Returns how many ran.
    pub fn fire(&self, name: &str) -> usize {
        let tasks: Vec<RepeatingTask> = self
            .state
            .lock()
            .repeating
            .values()
            .filter(|(task_name, _)| *task_name == name)
            .map(|(_, task)| Arc::clone(task))
            .collect();
        for task in &tasks {
            task();
        }
        tasks.len()
    }

    /// Run and consume every delayed task registered under `name`.
    pub fn fire_delayed(&self, name: &str) -> usize {
        let tasks: Vec<DelayedTask> = {
            let mut state = self.state.lock();
            let keys: Vec<u64> = state
                .delayed
                .iter()
                .filter(|(_, (task_name, _))| *task_name == name)
                .map(|(key, _)| *key)
                .collect();
            keys.iter()
                .filter_map(|key| state.delayed.remove(key))
                .map(|(_, task)| task)
                .collect()
        };
        let count = tasks.len();
        for task in tasks {
            task();
        }
        count
    }

    /// Names of the active repeating tasks.
    pub fn timer_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> =
            self.state.lock().repeating.values().map(|(name, _)| *name).collect();
        names.sort_unstable();
        names
    }

    pub fn spawned_count(&self) -> usize {
        self.state.lock().spawned.len()
    }

    /// Hand the parked futures to the current tokio runtime.
    pub fn run_spawned(&self) -> usize {
        let spawned = std::mem::take(&mut self.state.lock().spawned);
        let count = spawned.len();
        for (_, future) in spawned {
            tokio::spawn(future);
        }
        count
    }

    fn next_key(&self) -> u64 {
        let mut state = self.state.lock();
        state.next_key += 1;
        state.next_key
    }
}

impl Scheduler for ManualScheduler {
    fn start_repeating(
        &self,
        name: &'static str,
        _period: Duration,
        task: Arc<dyn Fn() + Send + Sync>,
    ) -> TimerHandle {
        let key = self.next_key();
        self.state.lock().repeating.insert(key, (name, task));
        let state = Arc::clone(&self.state);
        TimerHandle::new(name, move || {
            state.lock().repeating.remove(&key);
        })
    }

    fn call_after(
        &self,
        name: &'static str,
        _delay: Duration,
        task: Box<dyn FnOnce() + Send>,
    ) -> TimerHandle {
        let key = self.next_key();
        self.state.lock().delayed.insert(key, (name, task));
        let state = Arc::clone(&self.state);
        TimerHandle::new(name, move || {
            state.lock().delayed.remove(&key);
        })
    }

    fn spawn(&self, name: &'static str, future: BoxFuture) -> TimerHandle {
        self.state.lock().spawned.push((name, future));
        TimerHandle::detached(name)
    }
}

/// A datagram captured by [`RecordingTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPacket {
    pub data: Vec<u8>,
    pub to: SocketAddr,
    /// Sent through `send_ping` rather than `send_data`.
    pub ping: bool,
}

/// Transport that records outgoing datagrams and lets tests inject inbound
/// ones.
pub struct RecordingTransport {
    addr: SocketAddr,
    sent: Mutex<Vec<SentPacket>>,
    receiver: Mutex<Option<Arc<dyn PacketHandler>>>,
    offline: Mutex<Option<OfflineCallback>>,
    fail_sends: AtomicBool,
}

impl RecordingTransport {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            sent: Mutex::new(Vec::new()),
            receiver: Mutex::new(None),
            offline: Mutex::new(None),
            fail_sends: AtomicBool::new(false),
        }
    }

    /// Make every later send fail with `Unreachable`.
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentPacket> {
        self.sent.lock().clone()
    }

    pub fn take_sent(&self) -> Vec<SentPacket> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Decoded envelopes of every recorded datagram.
    pub fn sent_messages(&self) -> Vec<(RoutingMessage, SocketAddr)> {
        self.sent
            .lock()
            .iter()
            .filter_map(|p| decode_message(&p.data).ok().map(|m| (m, p.to)))
            .collect()
    }

    /// Decoded envelopes of one message type.
    pub fn messages_of(&self, kind: MessageType) -> Vec<(RoutingMessage, SocketAddr)> {
        self.sent_messages()
            .into_iter()
            .filter(|(m, _)| m.kind() == Some(kind))
            .collect()
    }

    /// Deliver a datagram to the registered receiver.
    pub fn deliver(&self, data: &[u8], from: SocketAddr) -> bool {
        let receiver = self.receiver.lock().clone();
        match receiver {
            Some(handler) => {
                handler.handle_packet(data, from);
                true
            }
            None => false,
        }
    }

    /// Report `addr` offline through the installed callback.
    pub fn trigger_offline(&self, addr: SocketAddr) {
        let callback = self.offline.lock().clone();
        if let Some(callback) = callback {
            callback(addr);
        }
    }

    fn record(&self, data: &[u8], to: SocketAddr, ping: bool) -> Result<(), TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Unreachable(to));
        }
        self.sent.lock().push(SentPacket {
            data: data.to_vec(),
            to,
            ping,
        });
        Ok(())
    }
}

impl Transport for RecordingTransport {
    fn send_data(&self, data: &[u8], to: SocketAddr, _priority: Priority) -> Result<(), TransportError> {
        self.record(data, to, false)
    }

    fn send_ping(&self, data: &[u8], to: SocketAddr) -> Result<(), TransportError> {
        self.record(data, to, true)
    }

    fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    fn register_receiver(&self, handler: Arc<dyn PacketHandler>) {
        *self.receiver.lock() = Some(handler);
    }

    fn unregister_receiver(&self) {
        *self.receiver.lock() = None;
    }

    fn set_offline_callback(&self, callback: OfflineCallback) {
        *self.offline.lock() = Some(callback);
    }
}
