//! On-chain attestation verification
//!
//! The verifier holds the published verification keys and an append-only
//! event log. Acceptance appends exactly one `ProofVerified` event;
//! rejection leaves the log untouched. There is no partial outcome: a
//! rejected call behaves as if it never happened.
//!
//! Only attribute attestations are anchored here. Policy and process
//! attestations are verified off-chain by the authority that gates on them;
//! their public inputs carry no (authority, type) pair to index an event by.

use ark_ff::PrimeField;
use crypto::Gid;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use zk::{Attestation, CircuitKind, Commitment, KeyStore};

use crate::{LedgerError, LedgerResult};

/// Public record of one accepted attribute attestation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProofVerified {
    /// Who presented the proof
    pub prover: Gid,
    /// Certifying authority named in the public inputs
    pub authority_id: u32,
    /// Attribute type named in the public inputs
    pub attr_type: u32,
    /// The commitment the proof opened
    pub commitment: Commitment,
}

/// Stateless verification over shared key artifacts plus an event log.
#[derive(Clone)]
pub struct OnChainVerifier {
    keys: Arc<KeyStore>,
    events: Arc<RwLock<Vec<ProofVerified>>>,
}

impl OnChainVerifier {
    pub fn new(keys: Arc<KeyStore>) -> Self {
        Self {
            keys,
            events: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Verify an attribute attestation and record its acceptance.
    ///
    /// Rejection returns an error and changes nothing.
    pub async fn verify_on_chain(
        &self,
        prover: Gid,
        attestation: &Attestation,
    ) -> LedgerResult<ProofVerified> {
        if attestation.kind != CircuitKind::Attribute {
            return Err(LedgerError::Rejected(format!(
                "only attribute attestations are anchored, got {}",
                attestation.kind
            )));
        }

        let keys = self.keys.get(CircuitKind::Attribute)?;
        if !attestation.verify(&keys)? {
            warn!(prover = %prover, "attestation rejected");
            return Err(LedgerError::Rejected(
                "attribute attestation failed verification".into(),
            ));
        }

        // Input order: (commitment, current_date, authority_id, attr_type)
        let commitment = attestation
            .public_input(0)
            .map(Commitment)
            .ok_or_else(|| LedgerError::Rejected("missing commitment input".into()))?;
        let authority_id = attestation
            .public_input(2)
            .and_then(fr_to_u32)
            .ok_or_else(|| LedgerError::Rejected("authority input out of range".into()))?;
        let attr_type = attestation
            .public_input(3)
            .and_then(fr_to_u32)
            .ok_or_else(|| LedgerError::Rejected("attribute type input out of range".into()))?;

        let event = ProofVerified {
            prover,
            authority_id,
            attr_type,
            commitment,
        };
        self.events.write().await.push(event);

        info!(
            prover = %prover,
            authority_id,
            attr_type,
            commitment = %commitment,
            "attestation accepted"
        );

        Ok(event)
    }

    /// Snapshot of the event log, oldest first.
    pub async fn events(&self) -> Vec<ProofVerified> {
        self.events.read().await.clone()
    }

    pub async fn event_count(&self) -> usize {
        self.events.read().await.len()
    }
}

/// Decode a field element that is supposed to hold a u32 identifier.
///
/// Truncation would let a prover-chosen oversized input masquerade as a
/// small id in the event log, so anything past u32 range is refused.
fn fr_to_u32(f: ark_bn254::Fr) -> Option<u32> {
    let limbs = f.into_bigint().0;
    if limbs[1..].iter().any(|l| *l != 0) {
        return None;
    }
    u32::try_from(limbs[0]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ff::One;
    use crypto::Identity;
    use rand::thread_rng;
    use zk::{AttributeRecord, CircuitKeys, ProcessStep};

    const TODAY: u64 = 2026_08_29;

    fn record() -> AttributeRecord {
        AttributeRecord {
            secret: 0xdead_beef,
            value: 7,
            authority_id: 3,
            attr_type: 2,
            expiry: 2027_01_01,
        }
    }

    fn verifier_with_attribute_keys() -> (OnChainVerifier, Arc<CircuitKeys>) {
        let mut rng = thread_rng();
        let mut store = KeyStore::new();
        store.insert(CircuitKeys::setup_attribute(&mut rng).unwrap());
        let store = Arc::new(store);
        let keys = store.get(CircuitKind::Attribute).unwrap();
        (OnChainVerifier::new(store), keys)
    }

    #[tokio::test]
    async fn test_accept_records_event() {
        let (verifier, keys) = verifier_with_attribute_keys();
        let mut rng = thread_rng();
        let prover = Identity::generate().gid();
        let record = record();

        let attestation =
            Attestation::prove_attribute(&keys, &record, TODAY, 3, 2, &mut rng).unwrap();
        let event = verifier.verify_on_chain(prover, &attestation).await.unwrap();

        assert_eq!(event.prover, prover);
        assert_eq!(event.authority_id, 3);
        assert_eq!(event.attr_type, 2);
        assert_eq!(event.commitment, record.commit().unwrap());
        assert_eq!(verifier.events().await, vec![event]);
    }

    #[tokio::test]
    async fn test_reject_leaves_log_untouched() {
        let (verifier, keys) = verifier_with_attribute_keys();
        let mut rng = thread_rng();
        let prover = Identity::generate().gid();

        let mut attestation =
            Attestation::prove_attribute(&keys, &record(), TODAY, 3, 2, &mut rng).unwrap();
        attestation.public_inputs[0] += ark_bn254::Fr::one();

        let result = verifier.verify_on_chain(prover, &attestation).await;
        assert!(matches!(result, Err(LedgerError::Rejected(_))));
        assert_eq!(verifier.event_count().await, 0);
    }

    #[test]
    fn test_identifier_decoding_is_range_checked() {
        use ark_bn254::Fr;

        assert_eq!(fr_to_u32(Fr::from(0u64)), Some(0));
        assert_eq!(fr_to_u32(Fr::from(u32::MAX)), Some(u32::MAX));
        // Past u32 range, including values whose low 32 bits look valid
        assert_eq!(fr_to_u32(Fr::from(u64::from(u32::MAX) + 1)), None);
        assert_eq!(fr_to_u32(Fr::from(1u128 << 64)), None);
        assert_eq!(fr_to_u32(Fr::from(3u128) + Fr::from(1u128 << 64)), None);
    }

    #[tokio::test]
    async fn test_non_attribute_attestation_refused() {
        let (verifier, _) = verifier_with_attribute_keys();
        let mut rng = thread_rng();
        let process_keys = CircuitKeys::setup_process(&mut rng).unwrap();
        let step = ProcessStep {
            step_secret: 1,
            step_details: 2,
        };

        let attestation =
            Attestation::prove_process(&process_keys, &step, 9, 1, 0, &mut rng).unwrap();
        let result = verifier
            .verify_on_chain(Identity::generate().gid(), &attestation)
            .await;

        assert!(matches!(result, Err(LedgerError::Rejected(_))));
        assert_eq!(verifier.event_count().await, 0);
    }
}
