//! Bincode codec for envelopes and payloads.

use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use super::message::RoutingMessage;

/// Largest datagram accepted or produced.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode: {0}")]
    Encode(String),
    #[error("failed to decode: {0}")]
    Decode(String),
    #[error("message is empty")]
    Empty,
}

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(MAX_MESSAGE_SIZE as u64)
}

pub fn encode_message(message: &RoutingMessage) -> Result<Vec<u8>, CodecError> {
    options()
        .serialize(message)
        .map_err(|e| CodecError::Encode(e.to_string()))
}

pub fn decode_message(bytes: &[u8]) -> Result<RoutingMessage, CodecError> {
    if bytes.is_empty() {
        return Err(CodecError::Empty);
    }
    options()
        .deserialize(bytes)
        .map_err(|e| CodecError::Decode(e.to_string()))
}

pub fn encode_payload<T: Serialize>(payload: &T) -> Result<Vec<u8>, CodecError> {
    options()
        .serialize(payload)
        .map_err(|e| CodecError::Encode(e.to_string()))
}

pub fn decode_payload<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    options()
        .deserialize(bytes)
        .map_err(|e| CodecError::Decode(e.to_string()))
}
