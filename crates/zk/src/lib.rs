//! Zero-knowledge attribute attestation
//!
//! This crate implements the proof-carrying core of the attribute
//! verification layer:
//! - An algebraic commitment scheme binding a secret attribute tuple
//!   to a public field element
//! - Three Groth16 predicate circuits (attribute validity, conjunctive
//!   policy, process-step compliance)
//! - Proof generation and verification over BN254
//!
//! ## Architecture
//!
//! ```text
//! zk/
//!  ├─ commitment.rs   # MiMC sponge, AttributeRecord, ProcessStep
//!  ├─ circuit.rs      # R1CS predicates (attribute / policy / process)
//!  ├─ keys.rs         # Trusted setup artifacts, KeyStore
//!  └─ proof.rs        # Attestation: Groth16 prove/verify + wire codecs
//! ```
//!
//! ## Proof lifecycle
//!
//! ```text
//! AttributeRecord ──commit()──> Commitment (published on ledger)
//!        │
//!        └──prove_attribute()──> Attestation { proof, public inputs }
//!                                      │
//!                                      └──verify()──> accept / reject
//! ```
//!
//! The native commitment function and its in-circuit gadget are generated
//! from one set of round constants; a proof generated against a commitment
//! computed natively verifies iff the two computations agree exactly.

pub mod circuit;
pub mod commitment;
pub mod keys;
pub mod proof;

pub use circuit::{AttributeCircuit, PolicyCircuit, PolicyShape, PolicySlot, ProcessCircuit};
pub use commitment::{encode_attr_value, AttributeRecord, Commitment, ProcessStep};
pub use keys::{CircuitKeys, KeyStore};
pub use proof::Attestation;

use serde::{Deserialize, Serialize};

/// The closed set of predicate circuits.
///
/// Every proving/verification dispatch goes through this enum, so adding a
/// variant forces every match site to handle it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitKind {
    /// Single certified attribute: commitment opening, non-expiry,
    /// expected authority and type.
    Attribute,
    /// Conjunction of two attributes with per-slot authority/type fixed
    /// at compile time.
    Policy,
    /// Strictly sequential process-step transition.
    Process,
}

impl CircuitKind {
    /// Stable name used for key artifact files and logging.
    pub fn name(&self) -> &'static str {
        match self {
            CircuitKind::Attribute => "attribute",
            CircuitKind::Policy => "policy",
            CircuitKind::Process => "process",
        }
    }

    /// Number of public inputs the circuit declares, in order.
    pub fn public_input_len(&self) -> usize {
        match self {
            CircuitKind::Attribute => 4,
            CircuitKind::Policy => 4,
            CircuitKind::Process => 4,
        }
    }

    /// Byte tag embedded in serialized key artifacts.
    pub(crate) fn tag(&self) -> u8 {
        match self {
            CircuitKind::Attribute => 1,
            CircuitKind::Policy => 2,
            CircuitKind::Process => 3,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(CircuitKind::Attribute),
            2 => Some(CircuitKind::Policy),
            3 => Some(CircuitKind::Process),
            _ => None,
        }
    }
}

impl std::fmt::Display for CircuitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Error kinds surfaced by the proving and verification subsystems.
///
/// Verification returning `false` is a value, not an error: tampered proofs
/// and mismatched public inputs reject, they never raise.
#[derive(Debug, thiserror::Error)]
pub enum ZkError {
    /// Malformed attribute values; rejected before witness construction,
    /// never silently clamped.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The supplied inputs cannot satisfy the circuit's constraints
    /// (expired attribute, wrong authority, bad commitment). Distinct from
    /// proving-system internal failures.
    #[error("witness does not satisfy circuit constraints: {0}")]
    WitnessUnsatisfiable(String),

    /// A key artifact does not correspond to the circuit the caller named.
    /// Fatal and non-retryable; indicates a deployment/versioning bug.
    #[error("key artifact mismatch: expected {expected} circuit, found {found}")]
    KeyArtifactMismatch {
        expected: CircuitKind,
        found: CircuitKind,
    },

    /// No key artifacts loaded for the named circuit.
    #[error("no key artifacts loaded for {0} circuit")]
    MissingKeys(CircuitKind),

    /// Internal proving-system failure (constraint synthesis, setup).
    #[error("proving system failure: {0}")]
    Proving(String),

    /// Encoding/decoding of proofs, keys, or field elements failed.
    #[error("serialization failure: {0}")]
    Serialization(String),

    /// Reading or writing key artifact files failed.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

pub type ZkResult<T> = Result<T, ZkError>;
