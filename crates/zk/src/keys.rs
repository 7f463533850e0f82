//! Trusted Setup Artifacts
//!
//! Each circuit variant is compiled once into a proving key and a
//! verification key. The two artifacts are versioned together: a serialized
//! bundle carries a magic, a format version, and the circuit kind tag, and
//! deserialization refuses a bundle whose tag does not match the circuit
//! the caller named. Mixing artifacts from different setup runs is a
//! deployment bug, not a runtime condition to retry.

use ark_bn254::Bn254;
use ark_groth16::{prepare_verifying_key, Groth16, PreparedVerifyingKey, ProvingKey, VerifyingKey};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::SNARK;
use ark_std::rand::{CryptoRng, Rng};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::circuit::{AttributeCircuit, PolicyCircuit, PolicyShape, PolicySlot, ProcessCircuit};
use crate::{CircuitKind, ZkError, ZkResult};

const KEY_BUNDLE_MAGIC: &[u8; 4] = b"ZKAK";
const KEY_BUNDLE_VERSION: u8 = 1;

/// Proving and verification keys for one circuit variant.
pub struct CircuitKeys {
    kind: CircuitKind,
    /// Policy circuits carry the shape their constraints were compiled for.
    shape: Option<PolicyShape>,
    pub proving_key: ProvingKey<Bn254>,
    pub verifying_key: VerifyingKey<Bn254>,
    pub prepared_vk: PreparedVerifyingKey<Bn254>,
}

impl CircuitKeys {
    /// Trusted setup for the attribute circuit.
    pub fn setup_attribute<R: Rng + CryptoRng>(rng: &mut R) -> ZkResult<Self> {
        let circuit = AttributeCircuit::empty();
        Self::finish_setup(CircuitKind::Attribute, None, circuit, rng)
    }

    /// Trusted setup for a policy circuit with the given compiled shape.
    pub fn setup_policy<R: Rng + CryptoRng>(shape: PolicyShape, rng: &mut R) -> ZkResult<Self> {
        let circuit = PolicyCircuit::empty(shape);
        Self::finish_setup(CircuitKind::Policy, Some(shape), circuit, rng)
    }

    /// Trusted setup for the process circuit.
    pub fn setup_process<R: Rng + CryptoRng>(rng: &mut R) -> ZkResult<Self> {
        let circuit = ProcessCircuit::empty();
        Self::finish_setup(CircuitKind::Process, None, circuit, rng)
    }

    fn finish_setup<R, C>(
        kind: CircuitKind,
        shape: Option<PolicyShape>,
        circuit: C,
        rng: &mut R,
    ) -> ZkResult<Self>
    where
        R: Rng + CryptoRng,
        C: ark_relations::r1cs::ConstraintSynthesizer<ark_bn254::Fr>,
    {
        let (proving_key, verifying_key) = Groth16::<Bn254>::circuit_specific_setup(circuit, rng)
            .map_err(|e| ZkError::Proving(format!("{kind} setup failed: {e:?}")))?;
        let prepared_vk = prepare_verifying_key(&verifying_key);

        info!(circuit = %kind, "trusted setup complete");

        Ok(Self {
            kind,
            shape,
            proving_key,
            verifying_key,
            prepared_vk,
        })
    }

    pub fn kind(&self) -> CircuitKind {
        self.kind
    }

    /// The compiled policy shape, for policy keys.
    pub fn shape(&self) -> Option<&PolicyShape> {
        self.shape.as_ref()
    }

    /// Serialize the key bundle (magic, version, kind tag, optional shape,
    /// proving key, verification key).
    pub fn to_bytes(&self) -> ZkResult<Vec<u8>> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(KEY_BUNDLE_MAGIC);
        bytes.push(KEY_BUNDLE_VERSION);
        bytes.push(self.kind.tag());

        match self.shape {
            Some(shape) => {
                bytes.push(1);
                bytes.extend_from_slice(&shape.policy_id.to_le_bytes());
                for slot in shape.slots {
                    bytes.extend_from_slice(&slot.authority_id.to_le_bytes());
                    bytes.extend_from_slice(&slot.attr_type.to_le_bytes());
                }
            }
            None => bytes.push(0),
        }

        self.proving_key
            .serialize_compressed(&mut bytes)
            .map_err(|e| ZkError::Serialization(format!("proving key: {e}")))?;
        self.verifying_key
            .serialize_compressed(&mut bytes)
            .map_err(|e| ZkError::Serialization(format!("verification key: {e}")))?;

        Ok(bytes)
    }

    /// Deserialize a key bundle, checking it matches the expected circuit.
    pub fn from_bytes(expected: CircuitKind, bytes: &[u8]) -> ZkResult<Self> {
        if bytes.len() < 7 || &bytes[..4] != KEY_BUNDLE_MAGIC {
            return Err(ZkError::Serialization("not a key bundle".into()));
        }
        if bytes[4] != KEY_BUNDLE_VERSION {
            return Err(ZkError::Serialization(format!(
                "unsupported key bundle version {}",
                bytes[4]
            )));
        }
        let found = CircuitKind::from_tag(bytes[5])
            .ok_or_else(|| ZkError::Serialization(format!("unknown circuit tag {}", bytes[5])))?;
        if found != expected {
            return Err(ZkError::KeyArtifactMismatch { expected, found });
        }

        let mut cursor = Cursor::new(&bytes[6..]);
        let shape = match read_u8(&mut cursor)? {
            0 => None,
            1 => {
                let policy_id = u64::from_le_bytes(read_array(&mut cursor)?);
                let mut slots = [PolicySlot {
                    authority_id: 0,
                    attr_type: 0,
                }; 2];
                for slot in &mut slots {
                    slot.authority_id = u32::from_le_bytes(read_array(&mut cursor)?);
                    slot.attr_type = u32::from_le_bytes(read_array(&mut cursor)?);
                }
                Some(PolicyShape { policy_id, slots })
            }
            other => {
                return Err(ZkError::Serialization(format!(
                    "bad shape marker {other}"
                )))
            }
        };

        let proving_key = ProvingKey::deserialize_compressed(&mut cursor)
            .map_err(|e| ZkError::Serialization(format!("proving key: {e}")))?;
        let verifying_key = VerifyingKey::deserialize_compressed(&mut cursor)
            .map_err(|e| ZkError::Serialization(format!("verification key: {e}")))?;
        let prepared_vk = prepare_verifying_key(&verifying_key);

        Ok(Self {
            kind: expected,
            shape,
            proving_key,
            verifying_key,
            prepared_vk,
        })
    }

    /// Write the bundle to `<dir>/<kind>.keys`.
    pub fn save(&self, dir: &Path) -> ZkResult<()> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.keys", self.kind.name()));
        std::fs::write(&path, self.to_bytes()?)?;
        info!(circuit = %self.kind, path = %path.display(), "key bundle written");
        Ok(())
    }

    /// Load the bundle for one circuit from `<dir>/<kind>.keys`.
    pub fn load(dir: &Path, kind: CircuitKind) -> ZkResult<Self> {
        let path = dir.join(format!("{}.keys", kind.name()));
        let bytes = std::fs::read(&path)?;
        Self::from_bytes(kind, &bytes)
    }
}

fn read_u8(cursor: &mut Cursor<&[u8]>) -> ZkResult<u8> {
    let buf: [u8; 1] = read_array(cursor)?;
    Ok(buf[0])
}

fn read_array<const N: usize>(cursor: &mut Cursor<&[u8]>) -> ZkResult<[u8; N]> {
    use std::io::Read;
    let mut buf = [0u8; N];
    cursor
        .read_exact(&mut buf)
        .map_err(|_| ZkError::Serialization("truncated key bundle".into()))?;
    Ok(buf)
}

/// Immutable map of key artifacts, one per circuit variant.
///
/// Loaded once per process lifetime; shared read-only across all proof
/// and verification work.
#[derive(Default)]
pub struct KeyStore {
    keys: HashMap<CircuitKind, Arc<CircuitKeys>>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, keys: CircuitKeys) {
        self.keys.insert(keys.kind(), Arc::new(keys));
    }

    /// Keys for the named circuit, or `MissingKeys`.
    pub fn get(&self, kind: CircuitKind) -> ZkResult<Arc<CircuitKeys>> {
        self.keys
            .get(&kind)
            .cloned()
            .ok_or(ZkError::MissingKeys(kind))
    }

    pub fn contains(&self, kind: CircuitKind) -> bool {
        self.keys.contains_key(&kind)
    }

    /// Load whichever bundles are present in `dir`.
    pub fn load_dir(dir: &Path) -> ZkResult<Self> {
        let mut store = Self::new();
        for kind in [
            CircuitKind::Attribute,
            CircuitKind::Policy,
            CircuitKind::Process,
        ] {
            let path = dir.join(format!("{}.keys", kind.name()));
            if path.exists() {
                store.insert(CircuitKeys::load(dir, kind)?);
            }
        }
        Ok(store)
    }
}
