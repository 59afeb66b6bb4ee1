//! Message type numbering.

/// Discriminant carried in `RoutingMessage::message_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageType {
    ConnectRequest = 0,
    ConnectResponse = 1,
    Handshake = 2,
    BootstrapJoinRequest = 3,
    BootstrapJoinResponse = 4,
    FindNodesRequest = 5,
    FindNodesResponse = 6,
    Ack = 7,
    HeartbeatRequest = 8,
    HeartbeatResponse = 9,
    NatDetectRequest = 23,
    NatDetectResponse = 24,
    NatDetectHandshake2Node = 25,
    NatDetectHandshake2Boot = 26,
    NatDetectFinish = 27,
    NodeQuit = 28,
}

impl MessageType {
    pub fn from_u32(value: u32) -> Option<Self> {
        let kind = match value {
            0 => Self::ConnectRequest,
            1 => Self::ConnectResponse,
            2 => Self::Handshake,
            3 => Self::BootstrapJoinRequest,
            4 => Self::BootstrapJoinResponse,
            5 => Self::FindNodesRequest,
            6 => Self::FindNodesResponse,
            7 => Self::Ack,
            8 => Self::HeartbeatRequest,
            9 => Self::HeartbeatResponse,
            23 => Self::NatDetectRequest,
            24 => Self::NatDetectResponse,
            25 => Self::NatDetectHandshake2Node,
            26 => Self::NatDetectHandshake2Boot,
            27 => Self::NatDetectFinish,
            28 => Self::NodeQuit,
            _ => return None,
        };
        Some(kind)
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Handled by the NAT detector's worker rather than the routing table.
    pub fn is_nat(self) -> bool {
        matches!(
            self,
            Self::NatDetectRequest
                | Self::NatDetectResponse
                | Self::NatDetectHandshake2Node
                | Self::NatDetectHandshake2Boot
                | Self::NatDetectFinish
        )
    }

    /// Replies that may resolve a pending callback.
    pub fn is_response(self) -> bool {
        matches!(
            self,
            Self::ConnectResponse
                | Self::BootstrapJoinResponse
                | Self::FindNodesResponse
                | Self::HeartbeatResponse
                | Self::NatDetectResponse
        )
    }
}
