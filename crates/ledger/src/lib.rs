//! Ledger and storage oracles
//!
//! Two append-only facilities back the attribute layer:
//! - a commitment registry keyed by (holder, authority, attribute type),
//!   where re-certification appends a new version and history is never
//!   rewritten
//! - an on-chain verifier that checks attestations against the published
//!   verification keys and records a `ProofVerified` event per acceptance,
//!   with strict revert semantics on rejection
//!
//! A content-addressed blob store rounds out the storage side for
//! off-ledger payloads (encrypted records, key artifacts).

pub mod registry;
pub mod store;
pub mod verifier;

// Re-export main types
pub use registry::CommitmentRegistry;
pub use store::{ContentAddress, ContentStore};
pub use verifier::{OnChainVerifier, ProofVerified};

use zk::ZkError;

/// Ledger-side failures.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The attestation did not verify; nothing was recorded.
    #[error("proof rejected: {0}")]
    Rejected(String),

    /// No commitment registered under the requested key.
    #[error("no commitment registered for this holder/authority/type")]
    UnknownCommitment,

    /// Underlying proving-system failure (bad key artifacts, codecs).
    #[error(transparent)]
    Zk(#[from] ZkError),
}

pub type LedgerResult<T> = Result<T, LedgerError>;
