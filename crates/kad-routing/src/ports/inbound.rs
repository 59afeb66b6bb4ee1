//! # Driving Ports (Inbound API)
//!
//! The entry point a transport delivers received datagrams to.

use std::net::SocketAddr;

/// Receives raw datagrams from a transport.
///
/// Called from the transport's delivery task; implementations must not
/// block.
pub trait PacketHandler: Send + Sync {
    /// Handle one datagram that arrived from `from`.
    fn handle_packet(&self, data: &[u8], from: SocketAddr);
}
