//! Groth16 Proof Generation and Verification
//!
//! An [`Attestation`] bundles a succinct proof with the ordered public
//! inputs it commits to. Proof bytes are randomized by the prover's
//! blinding, but the verifier's decision for a valid witness is always
//! "accept": reproducibility is semantic, not byte-level.
//!
//! Proving surfaces `WitnessUnsatisfiable` when the inputs cannot satisfy
//! the circuit (expired attribute, wrong authority, bad commitment) so
//! callers can tell "your attribute does not qualify" apart from "the
//! proving system failed". Verification is pure rejection: any tampered
//! proof, mismatched public input, or wrong-circuit key yields `false`,
//! never a crash.

use ark_bn254::{Bn254, Fr};
use ark_groth16::{Groth16, Proof};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystem};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::SNARK;
use ark_std::rand::{CryptoRng, Rng};
use std::io::Cursor;
use tracing::debug;

use crate::circuit::{AttributeCircuit, PolicyCircuit, ProcessCircuit};
use crate::commitment::{check_date, AttributeRecord, ProcessStep};
use crate::keys::CircuitKeys;
use crate::{CircuitKind, ZkError, ZkResult};

/// A proof of one predicate plus its ordered public inputs.
#[derive(Clone, Debug)]
pub struct Attestation {
    pub kind: CircuitKind,
    pub proof: Proof<Bn254>,
    /// Public inputs in the circuit's declared order. Reordering breaks
    /// verification even when the values are correct.
    pub public_inputs: Vec<Fr>,
}

impl Attestation {
    /// Prove possession of a certified attribute.
    pub fn prove_attribute<R: Rng + CryptoRng>(
        keys: &CircuitKeys,
        record: &AttributeRecord,
        current_date: u64,
        expected_authority_id: u32,
        expected_attr_type: u32,
        rng: &mut R,
    ) -> ZkResult<Self> {
        expect_kind(keys, CircuitKind::Attribute)?;
        record.validate()?;
        check_date("current_date", current_date)?;

        let commitment = record.commit()?;
        let circuit = AttributeCircuit::new(
            *record,
            commitment.0,
            current_date,
            expected_authority_id,
            expected_attr_type,
        );
        let public_inputs = circuit.public_inputs()?;

        Self::prove_checked(keys, circuit, public_inputs, rng)
    }

    /// Prove simultaneous possession of the two attributes a compiled
    /// policy shape demands.
    pub fn prove_policy<R: Rng + CryptoRng>(
        keys: &CircuitKeys,
        records: [AttributeRecord; 2],
        current_date: u64,
        rng: &mut R,
    ) -> ZkResult<Self> {
        expect_kind(keys, CircuitKind::Policy)?;
        let shape = *keys.shape().ok_or_else(|| {
            ZkError::Proving("policy key bundle carries no compiled shape".into())
        })?;
        for record in &records {
            record.validate()?;
        }
        check_date("current_date", current_date)?;

        let commitments = [records[0].commit()?.0, records[1].commit()?.0];
        let circuit = PolicyCircuit::new(shape, records, commitments, current_date);
        let public_inputs = circuit.public_inputs()?;

        Self::prove_checked(keys, circuit, public_inputs, rng)
    }

    /// Prove a strictly sequential process-step transition.
    pub fn prove_process<R: Rng + CryptoRng>(
        keys: &CircuitKeys,
        step: &ProcessStep,
        process_id: u64,
        claimed_current_step: u64,
        expected_previous_step: u64,
        rng: &mut R,
    ) -> ZkResult<Self> {
        expect_kind(keys, CircuitKind::Process)?;

        let commitment = step.commit();
        let circuit = ProcessCircuit::new(
            commitment.0,
            process_id,
            claimed_current_step,
            expected_previous_step,
            step.step_secret,
            step.step_details,
        );
        let public_inputs = circuit.public_inputs()?;

        Self::prove_checked(keys, circuit, public_inputs, rng)
    }

    /// Check satisfiability first, then run the Groth16 prover.
    ///
    /// The satisfiability pre-check is what turns "expired attribute" into
    /// `WitnessUnsatisfiable` instead of a garbage proof that fails later.
    fn prove_checked<R, C>(
        keys: &CircuitKeys,
        circuit: C,
        public_inputs: Vec<Fr>,
        rng: &mut R,
    ) -> ZkResult<Self>
    where
        R: Rng + CryptoRng,
        C: ConstraintSynthesizer<Fr> + Clone,
    {
        let cs = ConstraintSystem::<Fr>::new_ref();
        circuit
            .clone()
            .generate_constraints(cs.clone())
            .map_err(|e| ZkError::Proving(format!("constraint synthesis failed: {e}")))?;
        let satisfied = cs
            .is_satisfied()
            .map_err(|e| ZkError::Proving(format!("satisfiability check failed: {e}")))?;
        if !satisfied {
            let which = cs
                .which_is_unsatisfied()
                .ok()
                .flatten()
                .unwrap_or_else(|| "unnamed constraint".into());
            return Err(ZkError::WitnessUnsatisfiable(which));
        }

        let proof = Groth16::<Bn254>::prove(&keys.proving_key, circuit, rng)
            .map_err(|e| ZkError::Proving(format!("proof generation failed: {e:?}")))?;

        debug!(circuit = %keys.kind(), inputs = public_inputs.len(), "proof generated");

        Ok(Self {
            kind: keys.kind(),
            proof,
            public_inputs,
        })
    }

    /// Off-chain verification.
    ///
    /// `Ok(false)` for any tampered proof, wrong public input, or key from
    /// a different setup run; errors are reserved for naming the wrong
    /// circuit outright.
    pub fn verify(&self, keys: &CircuitKeys) -> ZkResult<bool> {
        if keys.kind() != self.kind {
            return Err(ZkError::KeyArtifactMismatch {
                expected: self.kind,
                found: keys.kind(),
            });
        }
        if self.public_inputs.len() != self.kind.public_input_len() {
            return Ok(false);
        }
        // Adversarial input rejects, it never crashes
        Ok(
            Groth16::<Bn254>::verify_with_processed_vk(
                &keys.prepared_vk,
                &self.public_inputs,
                &self.proof,
            )
            .unwrap_or(false),
        )
    }

    /// One public input by position, if present.
    pub fn public_input(&self, idx: usize) -> Option<Fr> {
        self.public_inputs.get(idx).copied()
    }

    // ============================================
    // Wire codecs
    // ============================================

    /// Compressed proof bytes (the `{a, b, c}` triple).
    pub fn proof_bytes(&self) -> ZkResult<Vec<u8>> {
        let mut bytes = Vec::new();
        self.proof
            .serialize_compressed(&mut bytes)
            .map_err(|e| ZkError::Serialization(format!("proof: {e}")))?;
        Ok(bytes)
    }

    /// Public inputs as fixed-size field element encodings, in order.
    pub fn public_input_bytes(&self) -> ZkResult<Vec<[u8; 32]>> {
        self.public_inputs.iter().map(fr_to_bytes).collect()
    }

    /// Rebuild an attestation from its wire parts.
    pub fn from_wire(kind: CircuitKind, proof: &[u8], public_inputs: &[[u8; 32]]) -> ZkResult<Self> {
        let proof = Proof::deserialize_compressed(proof)
            .map_err(|e| ZkError::Serialization(format!("proof: {e}")))?;
        let public_inputs = public_inputs
            .iter()
            .map(|b| fr_from_bytes(b))
            .collect::<ZkResult<Vec<_>>>()?;
        Ok(Self {
            kind,
            proof,
            public_inputs,
        })
    }

    /// Serialize the whole attestation (kind tag, proof, input count,
    /// inputs).
    pub fn to_bytes(&self) -> ZkResult<Vec<u8>> {
        let mut bytes = vec![self.kind.tag()];
        self.proof
            .serialize_compressed(&mut bytes)
            .map_err(|e| ZkError::Serialization(format!("proof: {e}")))?;
        bytes.extend_from_slice(&(self.public_inputs.len() as u32).to_le_bytes());
        for input in &self.public_inputs {
            input
                .serialize_compressed(&mut bytes)
                .map_err(|e| ZkError::Serialization(format!("public input: {e}")))?;
        }
        Ok(bytes)
    }

    /// Deserialize an attestation produced by [`Attestation::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> ZkResult<Self> {
        if bytes.is_empty() {
            return Err(ZkError::Serialization("empty attestation".into()));
        }
        let kind = CircuitKind::from_tag(bytes[0])
            .ok_or_else(|| ZkError::Serialization(format!("unknown circuit tag {}", bytes[0])))?;

        let mut cursor = Cursor::new(&bytes[1..]);
        let proof = Proof::deserialize_compressed(&mut cursor)
            .map_err(|e| ZkError::Serialization(format!("proof: {e}")))?;

        let pos = cursor.position() as usize;
        let rest = &bytes[1 + pos..];
        if rest.len() < 4 {
            return Err(ZkError::Serialization("truncated public inputs".into()));
        }
        let count = u32::from_le_bytes(rest[..4].try_into().expect("checked length")) as usize;

        let mut cursor = Cursor::new(&rest[4..]);
        let mut public_inputs = Vec::with_capacity(count);
        for _ in 0..count {
            let input = Fr::deserialize_compressed(&mut cursor)
                .map_err(|e| ZkError::Serialization(format!("public input: {e}")))?;
            public_inputs.push(input);
        }

        Ok(Self {
            kind,
            proof,
            public_inputs,
        })
    }
}

fn fr_to_bytes(f: &Fr) -> ZkResult<[u8; 32]> {
    let mut bytes = Vec::with_capacity(32);
    f.serialize_compressed(&mut bytes)
        .map_err(|e| ZkError::Serialization(format!("field element: {e}")))?;
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(out)
}

fn fr_from_bytes(bytes: &[u8; 32]) -> ZkResult<Fr> {
    Fr::deserialize_compressed(&bytes[..])
        .map_err(|e| ZkError::Serialization(format!("field element: {e}")))
}

fn expect_kind(keys: &CircuitKeys, expected: CircuitKind) -> ZkResult<()> {
    if keys.kind() == expected {
        Ok(())
    } else {
        Err(ZkError::KeyArtifactMismatch {
            expected,
            found: keys.kind(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{PolicyShape, PolicySlot};
    use ark_ff::One;
    use rand::thread_rng;

    fn certified_record(authority_id: u32, attr_type: u32) -> AttributeRecord {
        AttributeRecord {
            secret: 0x1234_5678_9abc_def0,
            value: 42,
            authority_id,
            attr_type,
            expiry: 2027_08_29, // one year out from "today"
        }
    }

    const TODAY: u64 = 2026_08_29;

    fn demo_shape() -> PolicyShape {
        PolicyShape {
            policy_id: 1,
            slots: [
                PolicySlot {
                    authority_id: 1,
                    attr_type: 1,
                },
                PolicySlot {
                    authority_id: 2,
                    attr_type: 2,
                },
            ],
        }
    }

    #[test]
    fn test_prove_and_verify_attribute() {
        let mut rng = thread_rng();
        let keys = CircuitKeys::setup_attribute(&mut rng).unwrap();
        let record = certified_record(1, 1);

        let attestation =
            Attestation::prove_attribute(&keys, &record, TODAY, 1, 1, &mut rng).unwrap();
        assert!(attestation.verify(&keys).unwrap());
    }

    #[test]
    fn test_expiry_boundary() {
        let mut rng = thread_rng();
        let keys = CircuitKeys::setup_attribute(&mut rng).unwrap();
        let record = certified_record(1, 1);

        // current_date == expiry: strict comparison rejects at witness time
        let result =
            Attestation::prove_attribute(&keys, &record, record.expiry, 1, 1, &mut rng);
        assert!(matches!(result, Err(ZkError::WitnessUnsatisfiable(_))));

        // current_date == expiry - 1: accepted
        let attestation =
            Attestation::prove_attribute(&keys, &record, record.expiry - 1, 1, 1, &mut rng)
                .unwrap();
        assert!(attestation.verify(&keys).unwrap());
    }

    #[test]
    fn test_wrong_authority_is_unsatisfiable() {
        let mut rng = thread_rng();
        let keys = CircuitKeys::setup_attribute(&mut rng).unwrap();
        let record = certified_record(2, 1);

        // Attribute issued by authority 2, proof demanded for authority 1
        let result = Attestation::prove_attribute(&keys, &record, TODAY, 1, 1, &mut rng);
        assert!(matches!(result, Err(ZkError::WitnessUnsatisfiable(_))));
    }

    #[test]
    fn test_tampered_proof_rejected() {
        let mut rng = thread_rng();
        let keys = CircuitKeys::setup_attribute(&mut rng).unwrap();
        let record = certified_record(1, 1);

        let attestation =
            Attestation::prove_attribute(&keys, &record, TODAY, 1, 1, &mut rng).unwrap();

        // Negating `a` flips exactly the sign bit of its compressed
        // encoding; the point stays on the curve but the pairing breaks
        let mut tampered = attestation.clone();
        tampered.proof.a = -tampered.proof.a;
        assert!(!tampered.verify(&keys).unwrap());
    }

    #[test]
    fn test_tampered_public_input_rejected() {
        let mut rng = thread_rng();
        let keys = CircuitKeys::setup_attribute(&mut rng).unwrap();
        let record = certified_record(1, 1);

        let attestation =
            Attestation::prove_attribute(&keys, &record, TODAY, 1, 1, &mut rng).unwrap();

        // Incrementing the commitment by one must reject
        let mut tampered = attestation.clone();
        tampered.public_inputs[0] += Fr::one();
        assert!(!tampered.verify(&keys).unwrap());
    }

    #[test]
    fn test_wrong_circuit_key_is_artifact_mismatch() {
        let mut rng = thread_rng();
        let attr_keys = CircuitKeys::setup_attribute(&mut rng).unwrap();
        let process_keys = CircuitKeys::setup_process(&mut rng).unwrap();
        let record = certified_record(1, 1);

        let attestation =
            Attestation::prove_attribute(&attr_keys, &record, TODAY, 1, 1, &mut rng).unwrap();

        assert!(matches!(
            attestation.verify(&process_keys),
            Err(ZkError::KeyArtifactMismatch { .. })
        ));
    }

    #[test]
    fn test_keys_from_different_setup_run_reject() {
        let mut rng = thread_rng();
        let keys_a = CircuitKeys::setup_attribute(&mut rng).unwrap();
        let keys_b = CircuitKeys::setup_attribute(&mut rng).unwrap();
        let record = certified_record(1, 1);

        let attestation =
            Attestation::prove_attribute(&keys_a, &record, TODAY, 1, 1, &mut rng).unwrap();

        // Same circuit, different ceremony: reject, not crash
        assert!(!attestation.verify(&keys_b).unwrap());
    }

    #[test]
    fn test_policy_conjunction() {
        let mut rng = thread_rng();
        let keys = CircuitKeys::setup_policy(demo_shape(), &mut rng).unwrap();
        let r1 = certified_record(1, 1);
        let r2 = certified_record(2, 2);

        let attestation =
            Attestation::prove_policy(&keys, [r1, r2], TODAY, &mut rng).unwrap();
        assert!(attestation.verify(&keys).unwrap());

        // Slot 2 from the wrong authority: the whole conjunction fails
        let bad = certified_record(3, 2);
        let result = Attestation::prove_policy(&keys, [r1, bad], TODAY, &mut rng);
        assert!(matches!(result, Err(ZkError::WitnessUnsatisfiable(_))));
    }

    #[test]
    fn test_process_step_skip_fails_witness() {
        let mut rng = thread_rng();
        let keys = CircuitKeys::setup_process(&mut rng).unwrap();
        let step = ProcessStep {
            step_secret: 5,
            step_details: 800,
        };

        // expected_previous + 1: fine
        let attestation =
            Attestation::prove_process(&keys, &step, 77, 3, 2, &mut rng).unwrap();
        assert!(attestation.verify(&keys).unwrap());

        // expected_previous + 2: witness generation itself fails
        let result = Attestation::prove_process(&keys, &step, 77, 4, 2, &mut rng);
        assert!(matches!(result, Err(ZkError::WitnessUnsatisfiable(_))));
    }

    #[test]
    fn test_attestation_roundtrips() {
        let mut rng = thread_rng();
        let keys = CircuitKeys::setup_attribute(&mut rng).unwrap();
        let record = certified_record(1, 1);

        let attestation =
            Attestation::prove_attribute(&keys, &record, TODAY, 1, 1, &mut rng).unwrap();

        // Whole-attestation bytes
        let bytes = attestation.to_bytes().unwrap();
        let recovered = Attestation::from_bytes(&bytes).unwrap();
        assert!(recovered.verify(&keys).unwrap());

        // Split wire parts
        let proof = attestation.proof_bytes().unwrap();
        let inputs = attestation.public_input_bytes().unwrap();
        let recovered = Attestation::from_wire(attestation.kind, &proof, &inputs).unwrap();
        assert!(recovered.verify(&keys).unwrap());
    }
}
