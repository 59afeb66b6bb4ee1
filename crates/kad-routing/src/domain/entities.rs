//! Core Domain Entities
//!
//! Node identifiers, NAT classification and the millisecond timestamp used
//! for liveness deadlines.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Length in bytes of a node identifier.
pub const NODE_ID_SIZE: usize = 32;

/// Number of bits in a node identifier. Also the farthest bucket index.
pub const NODE_ID_BITS: usize = NODE_ID_SIZE * 8;

/// Partition tag carried by every routing table and message.
pub type ServiceType = u64;

/// Service type of the root (network-wide) routing table.
pub const ROOT_SERVICE_TYPE: ServiceType = 0;

/// 256-bit node identifier, the key of the XOR distance space.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub [u8; NODE_ID_SIZE]);

impl NodeId {
    /// Create a NodeId from a raw 32-byte array.
    pub fn new(bytes: [u8; NODE_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse a NodeId from a wire byte string.
    ///
    /// Returns `None` unless the slice is exactly [`NODE_ID_SIZE`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; NODE_ID_SIZE] = bytes.try_into().ok()?;
        Some(Self(array))
    }

    /// Generate a uniformly random identifier.
    pub fn random() -> Self {
        Self(rand::random())
    }

    /// All-zero identifier.
    pub fn zero() -> Self {
        Self([0u8; NODE_ID_SIZE])
    }

    /// Get the underlying bytes for XOR distance calculation.
    pub fn as_bytes(&self) -> &[u8; NODE_ID_SIZE] {
        &self.0
    }

    /// Owned wire representation.
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// First four bytes in hex, for log lines.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// True if `bytes` is the wire form of this id.
    pub fn matches(&self, bytes: &[u8]) -> bool {
        self.0.as_slice() == bytes
    }
}

impl AsRef<[u8]> for NodeId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.short_hex())
    }
}

/// Reachability class of a node behind network address translation.
///
/// A node whose class is still `Unknown` is never admitted into a routing
/// table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum NatType {
    /// Not classified yet.
    #[default]
    Unknown = 0,
    /// Declared local address equals the address observed by peers.
    Public = 1,
    /// Accepts unsolicited inbound packets once an outbound packet was sent.
    ConeNormal = 2,
    /// Restrictive NAT; needs an extra grace period before probing.
    ConeAbnormal = 3,
}

impl NatType {
    /// Decode from the wire discriminant.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Public,
            2 => Self::ConeNormal,
            3 => Self::ConeAbnormal,
            _ => Self::Unknown,
        }
    }

    /// Wire discriminant.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create a timestamp from milliseconds.
    pub fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Create a timestamp from whole seconds.
    pub fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1000))
    }

    /// Milliseconds since the epoch.
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Whole seconds since the epoch.
    pub fn as_secs(&self) -> u64 {
        self.0 / 1000
    }

    /// Add milliseconds (saturating).
    pub fn add_millis(&self, millis: u64) -> Self {
        Self(self.0.saturating_add(millis))
    }

    /// Add seconds (saturating).
    pub fn add_secs(&self, secs: u64) -> Self {
        self.add_millis(secs.saturating_mul(1000))
    }
}
