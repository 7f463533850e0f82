//! Attribute Commitment Scheme
//!
//! Commitments bind a secret attribute tuple to a single public field
//! element:
//!
//! ```text
//! C = H(secret, value, authority_id, attr_type, expiry)
//! ```
//!
//! `H` is a MiMC sponge over the BN254 scalar field with an x^5 S-box and
//! a Miyaguchi–Preneel feed-forward. The construction is field-native so
//! it can be evaluated both here and inside an R1CS circuit with identical
//! results; both evaluations consume the same round constants
//! (see [`round_constants`]).
//!
//! Properties:
//! - Deterministic: recomputing from the same tuple reproduces the value
//! - Binding: opening to a different tuple requires breaking MiMC
//! - No randomness: hiding comes from the 64-bit `secret` in the tuple

use ark_bn254::Fr;
use ark_ff::{Field, PrimeField, Zero};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

use crate::{ZkError, ZkResult};

/// Number of MiMC rounds. 110 rounds of x^5 over a 254-bit field leaves a
/// comfortable margin over the algebraic-attack bound ceil(254 / log2(5)).
pub const MIMC_ROUNDS: usize = 110;

const CONSTANTS_TAG: &[u8] = b"zkattr-mimc-bn254-v1";

static ROUND_CONSTANTS: OnceLock<Vec<Fr>> = OnceLock::new();

/// The MiMC round constants, derived once from a fixed domain tag.
///
/// This is the single source of truth shared by the native hash and the
/// circuit gadget. Deriving both from one table is what guarantees the
/// bit-for-bit equivalence the proof system depends on.
pub fn round_constants() -> &'static [Fr] {
    ROUND_CONSTANTS.get_or_init(|| {
        (0..MIMC_ROUNDS as u64)
            .map(|i| {
                let mut hasher = Sha256::new();
                hasher.update(CONSTANTS_TAG);
                hasher.update(i.to_le_bytes());
                let digest = hasher.finalize();
                Fr::from_le_bytes_mod_order(&digest)
            })
            .collect()
    })
}

/// One application of the MiMC permutation: x <- (x + c_i)^5 per round.
fn mimc_permute(mut x: Fr) -> Fr {
    for c in round_constants() {
        let t = x + c;
        let t2 = t.square();
        let t4 = t2.square();
        x = t4 * t;
    }
    x
}

/// Sponge-style absorb over field elements with feed-forward.
///
/// The circuit gadget in [`crate::circuit`] mirrors this loop exactly.
pub fn hash_fields(inputs: &[Fr]) -> Fr {
    let mut h = Fr::zero();
    for m in inputs {
        let t = h + m;
        h = mimc_permute(t) + t;
    }
    h
}

/// Encode a short textual attribute value as an integer.
///
/// Takes the first 8 bytes little-endian base-256, matching the encoding
/// certifiers use when the attribute value is a role name rather than a
/// number.
pub fn encode_attr_value(value: &str) -> u64 {
    let mut buf = [0u8; 8];
    for (i, b) in value.bytes().take(8).enumerate() {
        buf[i] = b;
    }
    u64::from_le_bytes(buf)
}

/// Check that a value is a plausible 8-digit YYYYMMDD date.
fn is_valid_date(d: u64) -> bool {
    let year = d / 10_000;
    let month = (d / 100) % 100;
    let day = d % 100;
    (1970..=9999).contains(&year) && (1..=12).contains(&month) && (1..=31).contains(&day)
}

/// Validate a date field, rejecting anything that is not YYYYMMDD.
pub(crate) fn check_date(name: &str, d: u64) -> ZkResult<()> {
    if is_valid_date(d) {
        Ok(())
    } else {
        Err(ZkError::InvalidInput(format!(
            "{name} must be an 8-digit YYYYMMDD date, got {d}"
        )))
    }
}

/// A certified attribute held privately by the requester.
///
/// Created by the certifying authority at issuance; never transmitted in
/// plaintext during a proof exchange. Only the derived [`Commitment`]
/// leaves the requester's trust boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeRecord {
    /// Blinding secret chosen at issuance.
    pub secret: u64,
    /// Attribute value (numeric, or a role name via [`encode_attr_value`]).
    pub value: u64,
    /// Issuing authority identifier.
    pub authority_id: u32,
    /// Attribute type identifier.
    pub attr_type: u32,
    /// Expiry date as YYYYMMDD.
    pub expiry: u64,
}

impl AttributeRecord {
    /// Validate field ranges before the record is used anywhere.
    pub fn validate(&self) -> ZkResult<()> {
        check_date("expiry", self.expiry)
    }

    /// Derive the public commitment for this record.
    ///
    /// Pure function: same tuple in, same commitment out.
    pub fn commit(&self) -> ZkResult<Commitment> {
        self.validate()?;
        Ok(Commitment(hash_fields(&[
            Fr::from(self.secret),
            Fr::from(self.value),
            Fr::from(self.authority_id),
            Fr::from(self.attr_type),
            Fr::from(self.expiry),
        ])))
    }
}

/// A private process-step record, committed with the two-input variant of
/// the commitment function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStep {
    /// Blinding secret for this step.
    pub step_secret: u64,
    /// Opaque step payload (hash or encoded details).
    pub step_details: u64,
}

impl ProcessStep {
    /// Two-input commitment: `commit2(step_details, step_secret)`.
    pub fn commit(&self) -> Commitment {
        Commitment(hash_fields(&[
            Fr::from(self.step_details),
            Fr::from(self.step_secret),
        ]))
    }
}

/// Public commitment value: one BN254 scalar field element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Commitment(pub Fr);

impl Commitment {
    /// Compressed little-endian encoding (32 bytes).
    pub fn to_bytes(&self) -> [u8; 32] {
        let mut bytes = Vec::with_capacity(32);
        self.0
            .serialize_compressed(&mut bytes)
            .expect("field element serialization is infallible");
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        out
    }

    /// Decode from the compressed encoding.
    pub fn from_bytes(bytes: &[u8]) -> ZkResult<Self> {
        let fe = Fr::deserialize_compressed(bytes)
            .map_err(|e| ZkError::Serialization(format!("bad commitment encoding: {e}")))?;
        Ok(Self(fe))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn from_hex(s: &str) -> ZkResult<Self> {
        let bytes =
            hex::decode(s).map_err(|e| ZkError::Serialization(format!("bad hex: {e}")))?;
        Self::from_bytes(&bytes)
    }
}

impl std::fmt::Display for Commitment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // First 8 hex chars are enough to eyeball in logs
        write!(f, "{}", &self.to_hex()[..8])
    }
}

impl Serialize for Commitment {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_bytes(&self.to_bytes())
    }
}

impl<'de> Deserialize<'de> for Commitment {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes = <[u8; 32]>::deserialize(deserializer)?;
        Commitment::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}
