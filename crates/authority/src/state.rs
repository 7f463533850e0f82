//! Per-request protocol state

use crypto::Gid;
use std::time::{Duration, Instant};
use zk::CircuitKind;

/// Authority-local request session identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Phase of one key-release request. Each request owns its phase; there is
/// no state shared between concurrent requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestPhase {
    /// Session created, proof window not yet opened
    Idle,
    /// Waiting for the requester's proof, with a deadline
    AwaitingProof,
    /// Cryptographic verification in progress
    Verifying,
    /// Terminal: proof accepted, key share released
    KeyReleased,
    /// Terminal: rejected or timed out
    Rejected,
}

impl RequestPhase {
    /// Terminal phases admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestPhase::KeyReleased | RequestPhase::Rejected)
    }
}

impl std::fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RequestPhase::Idle => "idle",
            RequestPhase::AwaitingProof => "awaiting-proof",
            RequestPhase::Verifying => "verifying",
            RequestPhase::KeyReleased => "key-released",
            RequestPhase::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// One requester's key-release session.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub id: RequestId,
    pub requester: Gid,
    pub process_instance_id: u64,
    pub kind: CircuitKind,
    pub phase: RequestPhase,
    /// Proof must arrive before this instant
    pub deadline: Instant,
}

impl RequestContext {
    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// A non-terminal request past its deadline is reclaimable.
    pub fn is_expired(&self, now: Instant) -> bool {
        !self.is_terminal() && now > self.deadline
    }
}

/// Static authority configuration.
#[derive(Clone, Copy, Debug)]
pub struct AuthorityConfig {
    /// The authority identifier proofs must name
    pub authority_id: u32,
    /// How long a request may wait for its proof
    pub proof_wait: Duration,
    /// Concurrent non-terminal request cap
    pub max_open_requests: usize,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            authority_id: 1,
            proof_wait: Duration::from_secs(30),
            max_open_requests: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto::Identity;

    #[test]
    fn test_terminal_phases() {
        assert!(RequestPhase::KeyReleased.is_terminal());
        assert!(RequestPhase::Rejected.is_terminal());
        assert!(!RequestPhase::AwaitingProof.is_terminal());
        assert!(!RequestPhase::Verifying.is_terminal());
    }

    #[test]
    fn test_expiry_requires_non_terminal() {
        let now = Instant::now();
        let mut ctx = RequestContext {
            id: RequestId(1),
            requester: Identity::generate().gid(),
            process_instance_id: 1,
            kind: zk::CircuitKind::Attribute,
            phase: RequestPhase::AwaitingProof,
            deadline: now,
        };

        let later = now + Duration::from_secs(1);
        assert!(ctx.is_expired(later));

        // A released request never expires
        ctx.phase = RequestPhase::KeyReleased;
        assert!(!ctx.is_expired(later));
    }
}
