//! # Message Dispatcher
//!
//! Entry point for every inbound datagram. Decodes the envelope and hands
//! it to the component that owns its message type:
//!
//! - NAT detection types go to the [`NatDetector`] queue
//! - routing types go to the [`RoutingTable`] handlers
//! - responses additionally resolve pending callbacks
//! - anything else is offered to the [`MessagePolicy`]

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::ports::{MessagePolicy, PacketHandler};
use crate::protocol::{decode_message, MessageType};
use crate::service::callbacks::CallbackManager;
use crate::service::nat::NatDetector;
use crate::service::routing::RoutingTable;

pub struct MessageDispatcher {
    routing: Arc<RoutingTable>,
    nat: Arc<NatDetector>,
    callbacks: Arc<CallbackManager>,
    policy: Arc<dyn MessagePolicy>,
}

impl MessageDispatcher {
    pub fn new(
        routing: Arc<RoutingTable>,
        nat: Arc<NatDetector>,
        callbacks: Arc<CallbackManager>,
        policy: Arc<dyn MessagePolicy>,
    ) -> Self {
        Self {
            routing,
            nat,
            callbacks,
            policy,
        }
    }
}

impl PacketHandler for MessageDispatcher {
    fn handle_packet(&self, data: &[u8], from: SocketAddr) {
        let message = match decode_message(data) {
            Ok(message) => message,
            Err(e) => {
                debug!(%from, error = %e, "[kad] dropping undecodable datagram");
                return;
            }
        };

        let Some(kind) = message.kind() else {
            if !self.policy.on_unhandled(&message, from) {
                debug!(%from, kind = message.message_type, "[kad] unhandled message type");
            }
            return;
        };
        trace!(?kind, %from, id = message.id, "[kad] received");

        if kind == MessageType::Ack {
            return;
        }
        if kind.is_nat() {
            self.nat.push_message(message, from);
            return;
        }
        self.routing.handle_message(&message, from);
        if kind.is_response() {
            self.callbacks.callback(message.id, &message, from);
        }
    }
}
