//! Request session management and key release

use ark_bn254::Fr;
use crypto::{derive_key_share, Identity, KeyShare};
use protocol::{AccessMessage, KeyRequest, KeyResponse, Reject, RejectCode};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use zk::{Attestation, CircuitKind, KeyStore, ZkError};

use crate::state::{AuthorityConfig, RequestContext, RequestId, RequestPhase};
use crate::{AuthorityError, AuthorityResult};

/// Events emitted as requests move through the state machine.
#[derive(Clone, Debug)]
pub enum AuthorityEvent {
    /// A request session opened and is awaiting its proof
    RequestOpened {
        id: RequestId,
        requester: crypto::Gid,
    },
    /// A proof verified and the key share went out
    KeyReleased {
        id: RequestId,
        requester: crypto::Gid,
    },
    /// A request reached the rejected phase
    RequestRejected { id: RequestId, code: RejectCode },
    /// A silent request was reclaimed after its deadline
    RequestExpired { id: RequestId },
    /// The authority halted on a key-artifact fault
    Halted { reason: String },
}

/// What a submitted proof led to. Rejection is an outcome of the protocol,
/// not an error: the state machine worked exactly as designed.
#[derive(Clone, Debug)]
pub enum ProofOutcome {
    /// Proof accepted; the key share is released to the requester
    Released(KeyShare),
    /// Proof refused; the request is terminally rejected
    Rejected(RejectCode),
}

/// One authority's request sessions and key-release policy.
pub struct Authority {
    config: AuthorityConfig,
    identity: Identity,
    keys: Arc<KeyStore>,
    requests: HashMap<RequestId, RequestContext>,
    next_id: u64,
    /// How many requests ever entered the verifying phase
    verifying_entries: u64,
    halted: bool,
    events: mpsc::UnboundedSender<AuthorityEvent>,
}

impl Authority {
    /// Create an authority and the receiving end of its event stream.
    pub fn new(
        config: AuthorityConfig,
        identity: Identity,
        keys: Arc<KeyStore>,
    ) -> (Self, mpsc::UnboundedReceiver<AuthorityEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let authority = Self {
            config,
            identity,
            keys,
            requests: HashMap::new(),
            next_id: 1,
            verifying_entries: 0,
            halted: false,
            events,
        };
        (authority, rx)
    }

    /// Open a request session: Idle straight into AwaitingProof with a
    /// bounded proof window.
    pub fn open_request(
        &mut self,
        requester: crypto::Gid,
        process_instance_id: u64,
        kind: CircuitKind,
    ) -> AuthorityResult<RequestId> {
        if self.halted {
            return Err(AuthorityError::Halted);
        }
        let open = self.requests.values().filter(|r| !r.is_terminal()).count();
        if open >= self.config.max_open_requests {
            return Err(AuthorityError::TooManyRequests);
        }

        let id = RequestId(self.next_id);
        self.next_id += 1;
        self.requests.insert(
            id,
            RequestContext {
                id,
                requester,
                process_instance_id,
                kind,
                phase: RequestPhase::AwaitingProof,
                deadline: Instant::now() + self.config.proof_wait,
            },
        );

        debug!(request = %id, requester = %requester, circuit = %kind, "request opened");
        self.emit(AuthorityEvent::RequestOpened { id, requester });

        Ok(id)
    }

    /// Feed a proof to an awaiting request and drive it to a terminal
    /// phase.
    ///
    /// The authority-identity check runs before any cryptographic work: a
    /// proof naming someone else's authority never enters Verifying.
    pub fn submit_proof(
        &mut self,
        id: RequestId,
        attestation: &Attestation,
    ) -> AuthorityResult<ProofOutcome> {
        if self.halted {
            return Err(AuthorityError::Halted);
        }
        let (phase, kind, expired) = {
            let ctx = self
                .requests
                .get(&id)
                .ok_or(AuthorityError::UnknownRequest(id))?;
            (ctx.phase, ctx.kind, ctx.is_expired(Instant::now()))
        };
        if phase != RequestPhase::AwaitingProof {
            return Err(AuthorityError::NotAwaitingProof { id, phase });
        }
        if expired {
            return Ok(self.reject(id, RejectCode::Expired, "proof window elapsed"));
        }
        if attestation.kind != kind {
            return Ok(self.reject(
                id,
                RejectCode::MalformedRequest,
                "proof is for a different circuit than the request named",
            ));
        }

        let keys = match self.keys.get(attestation.kind) {
            Ok(keys) => keys,
            Err(e) => return Err(self.halt(e)),
        };

        if !self.names_this_authority(attestation, &keys) {
            // Cheap identity check, no pairing work spent on it
            return Ok(self.reject(
                id,
                RejectCode::AuthorityMismatch,
                "proof does not name this authority",
            ));
        }

        self.set_phase(id, RequestPhase::Verifying);
        self.verifying_entries += 1;

        let accepted = match attestation.verify(&keys) {
            Ok(accepted) => accepted,
            Err(e @ ZkError::KeyArtifactMismatch { .. }) => return Err(self.halt(e)),
            Err(e) => return Err(e.into()),
        };

        if !accepted {
            return Ok(self.reject(id, RejectCode::ProofRejected, "verification failed"));
        }

        let (requester, process_instance_id) = {
            let ctx = &self.requests[&id];
            (ctx.requester, ctx.process_instance_id)
        };
        let share = derive_key_share(self.identity.seed(), &requester, process_instance_id);
        self.set_phase(id, RequestPhase::KeyReleased);

        info!(request = %id, requester = %requester, "proof accepted, key share released");
        self.emit(AuthorityEvent::KeyReleased { id, requester });

        Ok(ProofOutcome::Released(share))
    }

    /// One-shot wire entry: a key request carries its proof, so the session
    /// opens and resolves in a single exchange.
    pub fn handle_message(&mut self, message: AccessMessage) -> AccessMessage {
        match message {
            AccessMessage::KeyRequest(req) => self.handle_key_request(req),
            AccessMessage::Ping(n) => AccessMessage::Pong(n),
            other => {
                warn!(message = other.message_type(), "unexpected message");
                AccessMessage::Reject(Reject {
                    request_id: 0,
                    code: RejectCode::MalformedRequest,
                    reason: format!("unexpected {} message", other.message_type()),
                })
            }
        }
    }

    fn handle_key_request(&mut self, req: KeyRequest) -> AccessMessage {
        let id = match self.open_request(req.requester_gid, req.process_instance_id, req.circuit_kind)
        {
            Ok(id) => id,
            Err(e) => return reject_for_error(0, &e),
        };

        let attestation =
            match Attestation::from_wire(req.circuit_kind, &req.proof, &req.public_inputs) {
                Ok(attestation) => attestation,
                Err(e) => {
                    let outcome =
                        self.reject(id, RejectCode::MalformedRequest, &format!("bad proof: {e}"));
                    return outcome_to_message(id, outcome);
                }
            };

        match self.submit_proof(id, &attestation) {
            Ok(outcome) => outcome_to_message(id, outcome),
            Err(e) => reject_for_error(id.0, &e),
        }
    }

    /// Reclaim every non-terminal request past its deadline. Returns how
    /// many were expired.
    pub fn expire_requests(&mut self, now: Instant) -> usize {
        let expired: Vec<RequestId> = self
            .requests
            .values()
            .filter(|r| r.is_expired(now))
            .map(|r| r.id)
            .collect();

        for id in &expired {
            self.set_phase(*id, RequestPhase::Rejected);
            debug!(request = %id, "request expired");
            self.emit(AuthorityEvent::RequestExpired { id: *id });
        }
        expired.len()
    }

    pub fn request_phase(&self, id: RequestId) -> Option<RequestPhase> {
        self.requests.get(&id).map(|r| r.phase)
    }

    /// Lifetime count of requests that entered the verifying phase.
    pub fn verifying_entries(&self) -> u64 {
        self.verifying_entries
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn config(&self) -> &AuthorityConfig {
        &self.config
    }

    /// Does the proof bind to this authority's identity? Checked from the
    /// public inputs (attribute) or the compiled policy shape; process
    /// proofs carry no authority binding.
    fn names_this_authority(&self, attestation: &Attestation, keys: &zk::CircuitKeys) -> bool {
        match attestation.kind {
            CircuitKind::Attribute => {
                // Full field-element comparison; truncating to the low
                // limb would let authority_id + k*2^64 slip through
                attestation.public_input(2) == Some(Fr::from(self.config.authority_id))
            }
            CircuitKind::Policy => keys
                .shape()
                .is_some_and(|shape| shape.involves_authority(self.config.authority_id)),
            CircuitKind::Process => true,
        }
    }

    fn reject(&mut self, id: RequestId, code: RejectCode, reason: &str) -> ProofOutcome {
        warn!(request = %id, ?code, reason, "request rejected");
        self.set_phase(id, RequestPhase::Rejected);
        self.emit(AuthorityEvent::RequestRejected { id, code });
        ProofOutcome::Rejected(code)
    }

    fn halt(&mut self, cause: ZkError) -> AuthorityError {
        error!(%cause, "key artifact fault, halting authority");
        self.halted = true;
        self.emit(AuthorityEvent::Halted {
            reason: cause.to_string(),
        });
        cause.into()
    }

    fn set_phase(&mut self, id: RequestId, phase: RequestPhase) {
        if let Some(ctx) = self.requests.get_mut(&id) {
            ctx.phase = phase;
        }
    }

    fn emit(&self, event: AuthorityEvent) {
        // A dropped receiver only means nobody is listening
        let _ = self.events.send(event);
    }
}

fn outcome_to_message(id: RequestId, outcome: ProofOutcome) -> AccessMessage {
    match outcome {
        ProofOutcome::Released(share) => AccessMessage::KeyResponse(KeyResponse {
            request_id: id.0,
            key_share: share.to_vec(),
        }),
        ProofOutcome::Rejected(code) => AccessMessage::Reject(Reject {
            request_id: id.0,
            code,
            reason: format!("{code:?}"),
        }),
    }
}

fn reject_for_error(request_id: u64, error: &AuthorityError) -> AccessMessage {
    let code = match error {
        AuthorityError::UnknownRequest(_) | AuthorityError::NotAwaitingProof { .. } => {
            RejectCode::MalformedRequest
        }
        AuthorityError::TooManyRequests => RejectCode::Internal,
        AuthorityError::Halted | AuthorityError::Zk(_) => RejectCode::Internal,
    };
    AccessMessage::Reject(Reject {
        request_id,
        code,
        reason: error.to_string(),
    })
}
