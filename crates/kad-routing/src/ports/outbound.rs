//! # Driven Ports (Outbound SPI)
//!
//! These are the interfaces the routing layer **requires** from its host.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use super::inbound::PacketHandler;
use crate::domain::{NodeConfig, RoutingConfig, Timestamp};
use crate::protocol::Priority;

/// Invoked with the endpoint of a peer the transport considers offline.
pub type OfflineCallback = Arc<dyn Fn(SocketAddr) + Send + Sync>;

/// Errors from network operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Nothing listens on the target endpoint.
    #[error("endpoint {0} is unreachable")]
    Unreachable(SocketAddr),
    /// Message exceeds maximum allowed size
    #[error("message of {0} bytes exceeds maximum size")]
    MessageTooLarge(usize),
    /// The transport was shut down.
    #[error("transport is closed")]
    Closed,
    #[error("io error: {0}")]
    Io(String),
}

/// Abstract interface for datagram I/O.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; handlers on several worker
/// threads send concurrently.
pub trait Transport: Send + Sync {
    /// Send an encoded message with a priority class.
    fn send_data(&self, data: &[u8], to: SocketAddr, priority: Priority)
        -> Result<(), TransportError>;

    /// Fire-and-forget datagram used for handshakes and probes.
    fn send_ping(&self, data: &[u8], to: SocketAddr) -> Result<(), TransportError>;

    /// Endpoint this transport is bound to.
    fn local_addr(&self) -> SocketAddr;

    /// Install the receiver for inbound datagrams. Replaces any earlier one.
    fn register_receiver(&self, handler: Arc<dyn PacketHandler>);

    /// Drop the receiver; later datagrams are discarded.
    fn unregister_receiver(&self);

    /// Install the callback for peers the transport declares offline.
    fn set_offline_callback(&self, callback: OfflineCallback);
}

/// Boxed future accepted by [`Scheduler::spawn`].
pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Handle of a scheduled task.
///
/// Dropping the handle or calling [`TimerHandle::join`] stops the task.
pub struct TimerHandle {
    name: &'static str,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl TimerHandle {
    pub fn new(name: &'static str, cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            name,
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Handle for a task that cannot be stopped.
    pub fn detached(name: &'static str) -> Self {
        Self { name, cancel: None }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stop the task. No further runs start after this returns.
    pub fn join(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle")
            .field("name", &self.name)
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Periodic and delayed task execution.
pub trait Scheduler: Send + Sync {
    /// Run `task` every `period`, first after one period.
    fn start_repeating(
        &self,
        name: &'static str,
        period: Duration,
        task: Arc<dyn Fn() + Send + Sync>,
    ) -> TimerHandle;

    /// Run `task` once after `delay`.
    fn call_after(
        &self,
        name: &'static str,
        delay: Duration,
        task: Box<dyn FnOnce() + Send>,
    ) -> TimerHandle;

    /// Run a background future.
    fn spawn(&self, name: &'static str, future: BoxFuture) -> TimerHandle;
}

/// Abstract interface for time-related operations.
///
/// Enables deterministic testing by injecting controllable time sources.
pub trait TimeSource: Send + Sync {
    /// Get the current timestamp.
    fn now(&self) -> Timestamp;
}

/// Abstract interface for configuration loading.
pub trait ConfigProvider: Send + Sync {
    /// Identity and addressing of the local node (`[node]` section).
    fn node_config(&self) -> NodeConfig;

    /// Routing tunables (`[routing]` section).
    fn routing_config(&self) -> RoutingConfig;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache value is malformed: {0}")]
    Malformed(String),
}

/// Namespaced key-value store used for the bootstrap endpoint cache.
pub trait PersistentCache: Send + Sync {
    fn map_get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    fn map_set(&self, namespace: &str, key: &str, value: Vec<u8>) -> Result<(), CacheError>;
}
