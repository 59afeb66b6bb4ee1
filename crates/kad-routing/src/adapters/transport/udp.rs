use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::ReceiverSlot;
use crate::ports::{OfflineCallback, PacketHandler, Transport, TransportError};
use crate::protocol::Priority;

/// Largest payload a single UDP datagram carries.
const MAX_DATAGRAM: usize = 65_507;

/// UDP transport on a tokio socket.
///
/// Sends use `try_send_to` and never block a handler; a full socket buffer
/// surfaces as [`TransportError::Io`]. Received datagrams are delivered
/// from one receive task. Priority classes are accepted but not
/// distinguished on the wire.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    receiver: ReceiverSlot,
    offline: RwLock<Option<OfflineCallback>>,
    recv_task: Mutex<Option<JoinHandle<()>>>,
}

impl UdpTransport {
    /// Bind a socket on `addr` and start receiving.
    ///
    /// # Errors
    ///
    /// [`TransportError::Io`] if the socket cannot be bound.
    pub async fn bind(addr: SocketAddr) -> Result<Arc<Self>, TransportError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;
        let local_addr = socket
            .local_addr()
            .map_err(|e| TransportError::Io(e.to_string()))?;
        let socket = Arc::new(socket);

        let receiver = ReceiverSlot::default();
        let task = tokio::spawn(Self::recv_loop(Arc::clone(&socket), receiver.clone()));
        info!(%local_addr, "[kad] udp transport bound");

        Ok(Arc::new(Self {
            socket,
            local_addr,
            receiver,
            offline: RwLock::new(None),
            recv_task: Mutex::new(Some(task)),
        }))
    }

    async fn recv_loop(socket: Arc<UdpSocket>, receiver: ReceiverSlot) {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            match socket.recv_from(&mut buf).await {
                Ok((len, from)) => {
                    receiver.deliver(&buf[..len], from);
                }
                // ICMP port unreachable surfaces here on some platforms
                Err(e) if e.kind() == ErrorKind::ConnectionReset => {
                    debug!(error = %e, "[kad] udp connection reset");
                }
                Err(e) => {
                    warn!(error = %e, "[kad] udp receive failed, stopping");
                    break;
                }
            }
        }
    }

    /// Stop the receive task.
    pub fn close(&self) {
        if let Some(task) = self.recv_task.lock().take() {
            task.abort();
        }
    }

    fn send(&self, data: &[u8], to: SocketAddr) -> Result<(), TransportError> {
        if data.len() > MAX_DATAGRAM {
            return Err(TransportError::MessageTooLarge(data.len()));
        }
        match self.socket.try_send_to(data, to) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
                let callback = self.offline.read().clone();
                if let Some(callback) = callback {
                    callback(to);
                }
                Err(TransportError::Unreachable(to))
            }
            Err(e) => Err(TransportError::Io(e.to_string())),
        }
    }
}

impl Transport for UdpTransport {
    fn send_data(
        &self,
        data: &[u8],
        to: SocketAddr,
        _priority: Priority,
    ) -> Result<(), TransportError> {
        self.send(data, to)
    }

    fn send_ping(&self, data: &[u8], to: SocketAddr) -> Result<(), TransportError> {
        self.send(data, to)
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn register_receiver(&self, handler: Arc<dyn PacketHandler>) {
        self.receiver.set(handler);
    }

    fn unregister_receiver(&self) {
        self.receiver.clear();
    }

    fn set_offline_callback(&self, callback: OfflineCallback) {
        *self.offline.write() = Some(callback);
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.close();
    }
}
