//! Datagram transports behind the [`Transport`](crate::ports::Transport) port.
//!
//! - [`MemoryTransport`]: in-process hub, used by integration tests
//! - [`NoOpTransport`]: accepts and discards every send
//! - `UdpTransport`: tokio UDP socket (requires `network` feature)

mod memory;
mod noop;
#[cfg(feature = "network")]
mod udp;

pub use memory::{MemoryNetwork, MemoryTransport};
pub use noop::NoOpTransport;
#[cfg(feature = "network")]
pub use udp::UdpTransport;

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::ports::PacketHandler;

/// Receiver slot shared between a transport and its delivery task.
#[derive(Clone, Default)]
struct ReceiverSlot(Arc<RwLock<Option<Arc<dyn PacketHandler>>>>);

impl ReceiverSlot {
    fn set(&self, handler: Arc<dyn PacketHandler>) {
        *self.0.write() = Some(handler);
    }

    fn clear(&self) {
        self.0.write().take();
    }

    /// Hand a datagram to the receiver. Returns false when none is installed.
    fn deliver(&self, data: &[u8], from: SocketAddr) -> bool {
        // clone out so the handler runs without the slot lock held
        let handler = self.0.read().clone();
        match handler {
            Some(handler) => {
                handler.handle_packet(data, from);
                true
            }
            None => false,
        }
    }
}
