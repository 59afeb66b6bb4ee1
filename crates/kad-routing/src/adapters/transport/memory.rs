use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::ReceiverSlot;
use crate::ports::{OfflineCallback, PacketHandler, Transport, TransportError};
use crate::protocol::Priority;

type Datagram = (Vec<u8>, SocketAddr);

/// In-process datagram hub.
///
/// Each bound [`MemoryTransport`] owns an unbounded queue drained by its
/// own delivery task, so a handler that sends while handling never
/// re-enters another handler on the same stack.
#[derive(Default)]
pub struct MemoryNetwork {
    endpoints: Mutex<HashMap<SocketAddr, mpsc::UnboundedSender<Datagram>>>,
}

impl MemoryNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Endpoints currently bound.
    pub fn len(&self) -> usize {
        self.endpoints.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.lock().is_empty()
    }

    fn route(&self, data: &[u8], from: SocketAddr, to: SocketAddr) -> Result<(), TransportError> {
        let endpoints = self.endpoints.lock();
        let sender = endpoints
            .get(&to)
            .ok_or(TransportError::Unreachable(to))?;
        sender
            .send((data.to_vec(), from))
            .map_err(|_| TransportError::Unreachable(to))
    }

    fn unbind(&self, addr: SocketAddr) {
        self.endpoints.lock().remove(&addr);
    }
}

/// Endpoint on a [`MemoryNetwork`].
pub struct MemoryTransport {
    network: Arc<MemoryNetwork>,
    local_addr: SocketAddr,
    receiver: ReceiverSlot,
    offline: RwLock<Option<OfflineCallback>>,
}

impl MemoryTransport {
    /// Bind `addr` on `network` and start its delivery task.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// [`TransportError::Io`] when `addr` is already bound.
    pub fn bind(network: &Arc<MemoryNetwork>, addr: SocketAddr) -> Result<Arc<Self>, TransportError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Datagram>();
        {
            let mut endpoints = network.endpoints.lock();
            if endpoints.contains_key(&addr) {
                return Err(TransportError::Io(format!("{addr} already bound")));
            }
            endpoints.insert(addr, tx);
        }

        let receiver = ReceiverSlot::default();
        let slot = receiver.clone();
        tokio::spawn(async move {
            while let Some((data, from)) = rx.recv().await {
                if !slot.deliver(&data, from) {
                    trace!(%addr, %from, "[kad] no receiver, datagram dropped");
                }
            }
        });

        Ok(Arc::new(Self {
            network: Arc::clone(network),
            local_addr: addr,
            receiver,
            offline: RwLock::new(None),
        }))
    }

    /// Release the endpoint. Later sends to it are unreachable.
    pub fn close(&self) {
        self.network.unbind(self.local_addr);
    }

    fn send(&self, data: &[u8], to: SocketAddr) -> Result<(), TransportError> {
        let result = self.network.route(data, self.local_addr, to);
        if let Err(TransportError::Unreachable(peer)) = &result {
            debug!(from = %self.local_addr, to = %peer, "[kad] memory endpoint unreachable");
            let callback = self.offline.read().clone();
            if let Some(callback) = callback {
                callback(*peer);
            }
        }
        result
    }
}

impl Transport for MemoryTransport {
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

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.close();
    }
}
