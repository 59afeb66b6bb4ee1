//! Deployment hooks for the routing table.

use std::net::SocketAddr;

use crate::domain::NodeId;
use crate::protocol::RoutingMessage;

/// Membership and join changes reported to the policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingEvent {
    NodeAdded(NodeId),
    NodeDropped(NodeId),
    Joined { bootstrap: NodeId },
    Unjoined,
}

/// Outcome of [`MessagePolicy::on_custom_relay`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayDecision {
    /// Relay toward the closest known node.
    Continue,
    /// The policy delivered or discarded the message itself.
    Handled,
}

/// Pluggable behavior of a routing table deployment.
///
/// Every hook has a no-op default.
pub trait MessagePolicy: Send + Sync {
    fn on_report(&self, _event: &RoutingEvent) {}

    /// Inspect a message before it is relayed.
    fn on_custom_relay(&self, _message: &RoutingMessage) -> RelayDecision {
        RelayDecision::Continue
    }

    /// A message whose type no component handles. Return `true` if consumed.
    fn on_unhandled(&self, _message: &RoutingMessage, _from: SocketAddr) -> bool {
        false
    }
}

/// Policy with the default hooks.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultMessagePolicy;

impl MessagePolicy for DefaultMessagePolicy {}
