//! Requester/authority wire protocol.
//!
//! Messages are transport-agnostic and use bincode serialization. A key
//! request carries a serialized proof plus its ordered public inputs; the
//! response is either this authority's key share or an explicit rejection
//! with a machine-readable code. No partial shares are ever sent.

use crypto::Gid;
use serde::{Deserialize, Serialize};
use zk::CircuitKind;

/// Protocol message types exchanged between a requester and one authority.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum AccessMessage {
    /// Request a key share, carrying the proof to be verified
    KeyRequest(KeyRequest),

    /// Key share released after successful verification
    KeyResponse(KeyResponse),

    /// Explicit rejection; terminal for the request
    Reject(Reject),

    /// Ping for keepalive
    Ping(u64),

    /// Pong response
    Pong(u64),
}

impl AccessMessage {
    /// Serialize message to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize message from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }

    /// Get message type name for logging
    pub fn message_type(&self) -> &'static str {
        match self {
            AccessMessage::KeyRequest(_) => "KeyRequest",
            AccessMessage::KeyResponse(_) => "KeyResponse",
            AccessMessage::Reject(_) => "Reject",
            AccessMessage::Ping(_) => "Ping",
            AccessMessage::Pong(_) => "Pong",
        }
    }
}

/// A proof-carrying key request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyRequest {
    /// Requester's global identifier
    pub requester_gid: Gid,
    /// Process instance the requested key belongs to
    pub process_instance_id: u64,
    /// Which predicate circuit the proof was generated for
    pub circuit_kind: CircuitKind,
    /// Compressed Groth16 proof bytes
    pub proof: Vec<u8>,
    /// Public inputs, fixed-size field encodings in declared order
    pub public_inputs: Vec<[u8; 32]>,
}

/// Key share released after the proof verified.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyResponse {
    /// Server-side request identifier
    pub request_id: u64,
    /// This authority's key-share contribution
    pub key_share: Vec<u8>,
}

/// Why a request was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectCode {
    /// Request could not be decoded or carried malformed fields
    MalformedRequest,
    /// The proof names a different authority than the one asked
    AuthorityMismatch,
    /// Cryptographic verification returned false
    ProofRejected,
    /// The request waited too long for its proof
    Expired,
    /// Authority-side fault (key artifacts, internal error)
    Internal,
}

/// Explicit rejection of a key request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Reject {
    /// Server-side request identifier (0 if the request never opened)
    pub request_id: u64,
    /// Machine-readable rejection code
    pub code: RejectCode,
    /// Human-readable reason
    pub reason: String,
}
