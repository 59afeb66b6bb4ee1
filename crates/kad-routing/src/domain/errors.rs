//! Domain Errors
//!
//! Admission outcomes for the node table. `AlreadyExists` is a benign
//! outcome, not an error path; every other refusal is a [`FailReason`].

use thiserror::Error;

/// Non-failing result of an admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddNodeOutcome {
    /// The record was inserted.
    Success,
    /// A record with the same id is already resident; nothing changed.
    AlreadyExists,
}

/// Why a record was refused by the node table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FailReason {
    /// The record carries the local node id.
    #[error("record is the local node")]
    SelfNode,
    /// NAT type has not been classified.
    #[error("nat type is unknown")]
    UnknownNatType,
    /// No usable public endpoint (missing, unspecified ip or port 0).
    #[error("record has no usable public endpoint")]
    InvalidRecord,
    /// Target k-bucket already holds K members.
    #[error("bucket {0} is full")]
    BucketFull(u32),
    /// Total capacity reached.
    #[error("routing table is at capacity")]
    TableFull,
}
