//! Error types for routing table services.

use thiserror::Error;

use crate::domain::{FailReason, NodeId};
use crate::ports::TransportError;
use crate::protocol::CodecError;

#[derive(Debug, Error)]
pub enum KadError {
    /// Generic operation failure, e.g. a refused admission.
    #[error("operation failed: {0}")]
    Failed(#[from] FailReason),
    #[error("node {0} not found")]
    NotFound(NodeId),
    #[error("timed out waiting for response")]
    Timeout,
    #[error("invalid node: {0}")]
    InvalidNode(String),
    /// A required collaborator was not supplied.
    #[error("missing {0}")]
    NotInitialized(&'static str),
    #[error("already joined")]
    AlreadyJoined,
    #[error("no bootstrap endpoints")]
    NoBootstrapEndpoints,
    #[error("shutting down")]
    ShuttingDown,
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

pub type Result<T> = std::result::Result<T, KadError>;
