//! Authority-side key release protocol
//!
//! An authority holds one half of the trust relationship: it verifies
//! zero-knowledge attestations against its loaded key artifacts and, on
//! acceptance, releases its key-share contribution for the named process
//! instance. Every request runs its own five-phase state machine:
//!
//! ```text
//! Idle ──open──> AwaitingProof ──proof──> Verifying ──┬──> KeyReleased
//!                     │                               └──> Rejected
//!                     └──timeout──────────────────────────> Rejected
//! ```
//!
//! Requests never share state; a request that names the wrong authority is
//! rejected before any cryptographic work. A fault in the key artifacts
//! halts the whole authority until an operator intervenes.

pub mod manager;
pub mod state;

// Re-export main types
pub use manager::{Authority, AuthorityEvent, ProofOutcome};
pub use state::{AuthorityConfig, RequestContext, RequestId, RequestPhase};

use zk::ZkError;

/// Authority-side failures. Protocol-level rejections (bad proof, wrong
/// authority, timeout) are outcomes, not errors; these are the cases where
/// the caller itself did something wrong or the authority cannot serve.
#[derive(Debug, thiserror::Error)]
pub enum AuthorityError {
    /// No request session with this id.
    #[error("unknown request {0}")]
    UnknownRequest(RequestId),

    /// The request is not in a phase that accepts a proof.
    #[error("request {id} is {phase}, not awaiting a proof")]
    NotAwaitingProof { id: RequestId, phase: RequestPhase },

    /// The authority hit a key-artifact fault and refuses all requests.
    #[error("authority halted after key artifact fault")]
    Halted,

    /// Open-request limit reached.
    #[error("too many open requests")]
    TooManyRequests,

    /// Proving-system failure (key artifacts, codecs).
    #[error(transparent)]
    Zk(#[from] ZkError),
}

pub type AuthorityResult<T> = Result<T, AuthorityError>;
