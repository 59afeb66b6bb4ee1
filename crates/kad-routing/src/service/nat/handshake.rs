//! Handshake bursts toward peers under NAT classification.

use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::domain::HandshakeSchedule;
use crate::ports::{Scheduler, TimerHandle, Transport};
use crate::protocol::{encode_payload, encode_message, MessageType, NatDetectHandshake, RoutingMessage};

/// Tick of the burst schedule.
pub const HANDSHAKE_PERIOD: Duration = Duration::from_millis(50);

/// How long a burst keeps sending.
pub const HANDSHAKE_DURATION: Duration = Duration::from_millis(2000);

#[derive(Clone)]
struct HandshakeTarget {
    transport: Arc<dyn Transport>,
    detect_addr: SocketAddr,
    kind: MessageType,
}

/// Sends a handshake of a given type to each registered peer every tick.
pub struct NatHandshakeManager {
    schedule: Mutex<HandshakeSchedule<HandshakeTarget>>,
    timer: Mutex<Option<TimerHandle>>,
}

impl Default for NatHandshakeManager {
    fn default() -> Self {
        Self::new()
    }
}

impl NatHandshakeManager {
    pub fn new() -> Self {
        let detect_ticks = (HANDSHAKE_DURATION.as_millis() / HANDSHAKE_PERIOD.as_millis()) as u32;
        Self {
            schedule: Mutex::new(HandshakeSchedule::new(detect_ticks)),
            timer: Mutex::new(None),
        }
    }

    pub fn start(self: &Arc<Self>, scheduler: &dyn Scheduler) {
        let mut timer = self.timer.lock();
        if timer.is_some() {
            return;
        }
        let weak: Weak<Self> = Arc::downgrade(self);
        *timer = Some(scheduler.start_repeating(
            "nat_handshake",
            HANDSHAKE_PERIOD,
            Arc::new(move || {
                if let Some(manager) = weak.upgrade() {
                    manager.do_handshake();
                }
            }),
        ));
    }

    pub fn stop(&self) {
        if let Some(timer) = self.timer.lock().take() {
            timer.join();
        }
        self.schedule.lock().clear();
    }

    /// Start a burst of `kind` handshakes to `detect_addr`, keyed by `peer`.
    pub fn add_detection(
        &self,
        peer: SocketAddr,
        transport: Arc<dyn Transport>,
        detect_addr: SocketAddr,
        kind: MessageType,
        delay: Duration,
    ) {
        let delay_ticks = (delay.as_millis() / HANDSHAKE_PERIOD.as_millis()) as u32;
        debug!(%peer, %detect_addr, ?kind, delay_ticks, "[kad] nat handshake scheduled");
        self.schedule.lock().add(
            peer,
            HandshakeTarget {
                transport,
                detect_addr,
                kind,
            },
            delay_ticks,
        );
    }

    pub fn remove_detection(&self, peer: &SocketAddr) -> bool {
        self.schedule.lock().remove(peer)
    }

    pub fn has_detection(&self, peer: &SocketAddr) -> bool {
        self.schedule.lock().contains(peer)
    }

    /// One tick of every active burst.
    pub fn do_handshake(&self) {
        let due = self.schedule.lock().tick();
        for target in due {
            let mut message = RoutingMessage::new(target.kind, 0);
            let bytes = encode_payload(&NatDetectHandshake)
                .and_then(|data| {
                    message.data = data;
                    encode_message(&message)
                });
            let bytes = match bytes {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(error = %e, "[kad] failed to encode nat handshake");
                    continue;
                }
            };
            if let Err(e) = target.transport.send_ping(&bytes, target.detect_addr) {
                debug!(to = %target.detect_addr, error = %e, "[kad] nat handshake send failed");
            }
        }
    }
}
