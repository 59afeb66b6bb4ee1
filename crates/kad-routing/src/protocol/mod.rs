//! # Wire Protocol
//!
//! Envelope, typed payloads and the bincode codec shared by every node.
//! Each datagram carries exactly one [`RoutingMessage`]; its `data` field
//! holds the encoded payload named by `message_type`.

mod codec;
mod message;
mod message_type;
mod payloads;

pub use codec::{
    decode_message, decode_payload, encode_message, encode_payload, CodecError, MAX_MESSAGE_SIZE,
};
pub use message::{Priority, RoutingMessage};
pub use message_type::MessageType;
pub use payloads::{
    BootstrapJoinRequest, BootstrapJoinResponse, ConnectRequest, FindClosestNodesRequest,
    FindClosestNodesResponse, Handshake, HandshakeKind, Heartbeat, JoinStatus, NatDetectFinish,
    NatDetectHandshake, NatDetectRequest, NatDetectResponse, NodeQuit, WireNode,
};

#[cfg(test)]
mod tests;
