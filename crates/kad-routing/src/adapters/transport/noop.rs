use std::net::SocketAddr;
use std::sync::Arc;

use crate::ports::{OfflineCallback, PacketHandler, Transport, TransportError};
use crate::protocol::Priority;

/// Transport that never delivers anything.
///
/// Every send succeeds without leaving the process. Useful for driving a
/// routing table in isolation.
#[derive(Debug, Clone, Copy)]
pub struct NoOpTransport {
    local_addr: SocketAddr,
}

impl NoOpTransport {
    #[must_use]
    pub fn new(local_addr: SocketAddr) -> Self {
        Self { local_addr }
    }
}

impl Transport for NoOpTransport {
    fn send_data(
        &self,
        _data: &[u8],
        _to: SocketAddr,
        _priority: Priority,
    ) -> Result<(), TransportError> {
        Ok(())
    }

    fn send_ping(&self, _data: &[u8], _to: SocketAddr) -> Result<(), TransportError> {
        Ok(())
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn register_receiver(&self, _handler: Arc<dyn PacketHandler>) {}

    fn unregister_receiver(&self) {}

    fn set_offline_callback(&self, _callback: OfflineCallback) {}
}
