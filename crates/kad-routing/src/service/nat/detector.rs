//! NAT classification state machine and its message worker.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::handshake::NatHandshakeManager;
use crate::domain::{classify_detect_request, NatType};
use crate::error::KadError;
use crate::ports::{Scheduler, TimerHandle, Transport};
use crate::protocol::{
    decode_payload, encode_message, encode_payload, MessageType, NatDetectFinish,
    NatDetectRequest, NatDetectResponse, RoutingMessage,
};
use crate::service::callbacks::CallbackManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NatConfig {
    /// How long `multi_nat_detect` waits for a classification.
    pub detect_wait: Duration,
    /// Pending messages before new ones are shed.
    pub queue_capacity: usize,
    /// Delay before the node starts handshaking the bootstrap.
    pub boot_handshake_delay: Duration,
    /// Silence after which the node settles on ConeAbnormal.
    pub abnormal_timeout: Duration,
}

impl Default for NatConfig {
    fn default() -> Self {
        Self {
            detect_wait: Duration::from_secs(3),
            queue_capacity: 1000,
            boot_handshake_delay: Duration::from_millis(500),
            abnormal_timeout: Duration::from_millis(1500),
        }
    }
}

impl NatConfig {
    pub fn for_testing() -> Self {
        Self {
            detect_wait: Duration::from_millis(500),
            queue_capacity: 2,
            ..Self::default()
        }
    }
}

type QueuedMessage = (RoutingMessage, SocketAddr);

#[derive(Default)]
struct NatState {
    transport: Option<Arc<dyn Transport>>,
    nat_transport: Option<Arc<dyn Transport>>,
    sender: Option<mpsc::Sender<QueuedMessage>>,
    worker: Option<TimerHandle>,
    timers: Vec<TimerHandle>,
}

/// Classifies the local NAT type once per process.
///
/// NAT messages are queued by the dispatcher and handled on a dedicated
/// worker task. The first classification wins and wakes every waiter.
pub struct NatDetector {
    config: NatConfig,
    scheduler: Arc<dyn Scheduler>,
    callbacks: Arc<CallbackManager>,
    handshakes: Arc<NatHandshakeManager>,
    nat_type: watch::Sender<NatType>,
    state: Mutex<NatState>,
    dropped: AtomicU64,
}

impl NatDetector {
    pub fn new(
        config: NatConfig,
        scheduler: Arc<dyn Scheduler>,
        callbacks: Arc<CallbackManager>,
    ) -> Arc<Self> {
        let (nat_type, _) = watch::channel(NatType::Unknown);
        Arc::new(Self {
            config,
            scheduler,
            callbacks,
            handshakes: Arc::new(NatHandshakeManager::new()),
            nat_type,
            state: Mutex::new(NatState::default()),
            dropped: AtomicU64::new(0),
        })
    }

    /// Start the worker and classify.
    ///
    /// A first node is public by definition. Otherwise detection runs
    /// against `boot_endpoints`; a `false` result is a soft failure and the
    /// node carries on with an unknown NAT type.
    pub async fn start(
        self: &Arc<Self>,
        first_node: bool,
        boot_endpoints: &[SocketAddr],
        transport: Arc<dyn Transport>,
        nat_transport: Arc<dyn Transport>,
    ) -> bool {
        self.attach(transport, nat_transport);
        if first_node {
            self.set_nat_type(NatType::Public);
            return true;
        }
        self.multi_nat_detect(boot_endpoints).await
    }

    /// Install transports and spawn the worker without classifying.
    pub fn attach(self: &Arc<Self>, transport: Arc<dyn Transport>, nat_transport: Arc<dyn Transport>) {
        let mut state = self.state.lock();
        state.transport = Some(transport);
        state.nat_transport = Some(nat_transport);
        if state.sender.is_some() {
            return;
        }
        let (sender, mut receiver) = mpsc::channel::<QueuedMessage>(self.config.queue_capacity.max(1));
        let weak: Weak<Self> = Arc::downgrade(self);
        state.sender = Some(sender);
        state.worker = Some(self.scheduler.spawn(
            "nat_worker",
            Box::pin(async move {
                while let Some((message, from)) = receiver.recv().await {
                    let Some(detector) = weak.upgrade() else {
                        break;
                    };
                    detector.handle_message(&message, from);
                }
                debug!("[kad] nat worker stopped");
            }),
        ));
        drop(state);
        self.handshakes.start(self.scheduler.as_ref());
    }

    /// Close the queue and stop every timer.
    pub fn stop(&self) {
        let (worker, timers) = {
            let mut state = self.state.lock();
            state.sender = None;
            (state.worker.take(), std::mem::take(&mut state.timers))
        };
        for timer in timers {
            timer.join();
        }
        if let Some(worker) = worker {
            worker.join();
        }
        self.handshakes.stop();
    }

    pub fn local_nat_type(&self) -> NatType {
        *self.nat_type.borrow()
    }

    /// Messages shed because the queue was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn handshakes(&self) -> &Arc<NatHandshakeManager> {
        &self.handshakes
    }

    /// Set the classification if none is set yet. Returns whether it changed.
    pub fn set_nat_type(&self, nat_type: NatType) -> bool {
        let changed = self.nat_type.send_if_modified(|current| {
            if *current == NatType::Unknown && nat_type != NatType::Unknown {
                *current = nat_type;
                true
            } else {
                false
            }
        });
        if changed {
            info!(?nat_type, "[kad] local nat type classified");
        }
        changed
    }

    /// Queue a NAT message for the worker. The newest message is shed when
    /// the queue is full.
    pub fn push_message(&self, message: RoutingMessage, from: SocketAddr) {
        let Some(sender) = self.state.lock().sender.clone() else {
            debug!("[kad] nat detector stopped, dropping message");
            return;
        };
        match sender.try_send((message, from)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(%from, "[kad] nat queue full, dropping message");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("[kad] nat queue closed, dropping message");
            }
        }
    }

    /// Ask every endpoint to classify us and wait for the first answer.
    pub async fn multi_nat_detect(&self, endpoints: &[SocketAddr]) -> bool {
        if self.local_nat_type() != NatType::Unknown {
            return true;
        }
        if endpoints.is_empty() {
            warn!("[kad] no bootstrap endpoints for nat detection");
            return false;
        }
        let Some(nat_transport) = self.state.lock().nat_transport.clone() else {
            warn!("[kad] nat detector has no transport");
            return false;
        };
        let mut receiver = self.nat_type.subscribe();
        for endpoint in endpoints {
            if let Err(e) = self.send_detect_request(nat_transport.as_ref(), *endpoint) {
                debug!(%endpoint, error = %e, "[kad] nat detect request failed");
            }
        }

        let classified = matches!(
            tokio::time::timeout(
                self.config.detect_wait,
                receiver.wait_for(|nat_type| *nat_type != NatType::Unknown),
            )
            .await,
            Ok(Ok(_))
        );
        if !classified {
            warn!("[kad] nat detection timed out");
            return false;
        }
        for endpoint in endpoints {
            self.send_simple(nat_transport.as_ref(), MessageType::NatDetectFinish, &NatDetectFinish, 0, *endpoint);
            self.handshakes.remove_detection(endpoint);
        }
        true
    }

    fn send_detect_request(&self, transport: &dyn Transport, to: SocketAddr) -> Result<(), KadError> {
        let payload = NatDetectRequest {
            local_addr: transport.local_addr(),
        };
        let mut message = RoutingMessage::new(MessageType::NatDetectRequest, self.callbacks.message_id());
        message.data = encode_payload(&payload)?;
        transport.send_ping(&encode_message(&message)?, to)?;
        Ok(())
    }

    fn send_simple<T: serde::Serialize>(
        &self,
        transport: &dyn Transport,
        kind: MessageType,
        payload: &T,
        id: u32,
        to: SocketAddr,
    ) {
        let mut message = RoutingMessage::new(kind, id);
        let sent = encode_payload(payload)
            .and_then(|data| {
                message.data = data;
                encode_message(&message)
            })
            .map_err(KadError::from)
            .and_then(|bytes| transport.send_ping(&bytes, to).map_err(KadError::from));
        if let Err(e) = sent {
            debug!(%to, ?kind, error = %e, "[kad] nat message send failed");
        }
    }

    /// Worker entry point.
    pub fn handle_message(self: &Arc<Self>, message: &RoutingMessage, from: SocketAddr) {
        match message.kind() {
            Some(MessageType::NatDetectRequest) => self.handle_detect_request(message, from),
            Some(MessageType::NatDetectResponse) => self.handle_detect_response(message, from),
            Some(MessageType::NatDetectHandshake2Node) => {
                self.set_nat_type(NatType::ConeNormal);
            }
            Some(MessageType::NatDetectHandshake2Boot) => {
                debug!(%from, "[kad] handshake from detecting node");
            }
            Some(MessageType::NatDetectFinish) => {
                self.handshakes.remove_detection(&from);
            }
            other => debug!(?other, "[kad] not a nat message"),
        }
    }

    fn transports(&self) -> Option<(Arc<dyn Transport>, Arc<dyn Transport>)> {
        let state = self.state.lock();
        Some((state.transport.clone()?, state.nat_transport.clone()?))
    }

    /// Bootstrap side: tell the requester what we observed, then try to
    /// reach it through its NAT.
    fn handle_detect_request(&self, message: &RoutingMessage, from: SocketAddr) {
        let request: NatDetectRequest = match decode_payload(&message.data) {
            Ok(request) => request,
            Err(e) => {
                debug!(%from, error = %e, "[kad] malformed nat detect request");
                return;
            }
        };
        let Some((transport, nat_transport)) = self.transports() else {
            return;
        };
        let nat_type = classify_detect_request(request.local_addr, from);
        let response = NatDetectResponse {
            nat_type,
            detect_port: nat_transport.local_addr().port(),
        };
        self.send_simple(
            transport.as_ref(),
            MessageType::NatDetectResponse,
            &response,
            message.id,
            from,
        );
        if nat_type == NatType::Public {
            return;
        }
        self.handshakes.add_detection(
            from,
            nat_transport,
            from,
            MessageType::NatDetectHandshake2Node,
            Duration::ZERO,
        );
    }

    /// Node side: public is final; otherwise handshake the bootstrap's
    /// detect port and fall back to ConeAbnormal if nothing comes in.
    fn handle_detect_response(self: &Arc<Self>, message: &RoutingMessage, from: SocketAddr) {
        let response: NatDetectResponse = match decode_payload(&message.data) {
            Ok(response) => response,
            Err(e) => {
                debug!(%from, error = %e, "[kad] malformed nat detect response");
                return;
            }
        };
        if response.nat_type == NatType::Public {
            self.set_nat_type(NatType::Public);
            return;
        }
        let Some((_, nat_transport)) = self.transports() else {
            return;
        };
        self.handshakes.add_detection(
            from,
            nat_transport,
            SocketAddr::new(from.ip(), response.detect_port),
            MessageType::NatDetectHandshake2Boot,
            self.config.boot_handshake_delay,
        );
        let weak: Weak<Self> = Arc::downgrade(self);
        let timer = self.scheduler.call_after(
            "nat_abnormal_timeout",
            self.config.abnormal_timeout,
            Box::new(move || {
                if let Some(detector) = weak.upgrade() {
                    detector.set_nat_type(NatType::ConeAbnormal);
                }
            }),
        );
        self.state.lock().timers.push(timer);
    }
}
