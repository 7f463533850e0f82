//! Identity module for Ed25519-based participant identity.
//!
//! Requesters and authorities are both identified by a GID derived
//! deterministically from an Ed25519 public key:
//!
//! GID = SHA256("zkattr-gid-v1" || ed25519_pubkey)
//!
//! The signing key authenticates protocol messages; the GID is the stable
//! public handle commitments are certified under.

use anyhow::{Context, Result};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

const GID_TAG: &[u8] = b"zkattr-gid-v1";

/// Global identifier of a requester or authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Gid([u8; 32]);

impl Gid {
    /// Derive a GID from an Ed25519 public key.
    pub fn from_ed25519_pubkey(pubkey: &VerifyingKey) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(GID_TAG);
        hasher.update(pubkey.as_bytes());
        let hash = hasher.finalize();
        Gid(hash.into())
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Gid(bytes)
    }

    /// Encode as hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 chars)
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Decode from hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).context("invalid hex")?;
        if bytes.len() != 32 {
            anyhow::bail!("GID must be 32 bytes");
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Gid(arr))
    }

    /// Encode as base58 string
    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }

    /// Decode from base58 string
    pub fn from_base58(s: &str) -> Result<Self> {
        let bytes = bs58::decode(s).into_vec().context("invalid base58")?;
        if bytes.len() != 32 {
            anyhow::bail!("GID must be 32 bytes");
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Gid(arr))
    }
}

impl std::fmt::Display for Gid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

/// Participant identity: a seed-deterministic Ed25519 keypair plus the
/// GID derived from it.
#[derive(Clone)]
pub struct Identity {
    /// Master seed (32 bytes)
    seed: [u8; 32],
    /// Ed25519 signing key
    signing_key: SigningKey,
    /// Ed25519 verifying key (public)
    verifying_key: VerifyingKey,
    /// GID derived from the public key
    gid: Gid,
}

impl Identity {
    /// Generate a new random identity
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        Self::from_seed(seed)
    }

    /// Derive identity from a master seed
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        let verifying_key = signing_key.verifying_key();
        let gid = Gid::from_ed25519_pubkey(&verifying_key);

        Identity {
            seed,
            signing_key,
            verifying_key,
            gid,
        }
    }

    /// Get the seed (for backup/export and key-share derivation)
    pub fn seed(&self) -> &[u8; 32] {
        &self.seed
    }

    /// Get GID
    pub fn gid(&self) -> Gid {
        self.gid
    }

    /// Get the Ed25519 public key
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    /// Sign a message with Ed25519
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }
}

/// Verify an Ed25519 signature
pub fn verify_signature(
    public_key: &VerifyingKey,
    message: &[u8],
    signature: &Signature,
) -> Result<()> {
    public_key
        .verify(message, signature)
        .context("signature verification failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_derivation() {
        let seed = [42u8; 32];
        let identity1 = Identity::from_seed(seed);
        let identity2 = Identity::from_seed(seed);

        // Same seed should produce same identity
        assert_eq!(identity1.gid(), identity2.gid());
        assert_eq!(
            identity1.verifying_key().as_bytes(),
            identity2.verifying_key().as_bytes()
        );
    }

    #[test]
    fn test_distinct_identities() {
        let a = Identity::generate();
        let b = Identity::generate();
        assert_ne!(a.gid(), b.gid());
    }

    #[test]
    fn test_signature_verification() {
        let identity = Identity::generate();
        let message = b"key request";

        let signature = identity.sign(message);
        assert!(verify_signature(identity.verifying_key(), message, &signature).is_ok());

        // Wrong message should fail
        assert!(verify_signature(identity.verifying_key(), b"wrong", &signature).is_err());
    }

    #[test]
    fn test_gid_encoding() {
        let identity = Identity::generate();
        let gid = identity.gid();

        // Test hex round-trip
        let hex = gid.to_hex();
        let decoded_hex = Gid::from_hex(&hex).unwrap();
        assert_eq!(gid, decoded_hex);

        // Test base58 round-trip
        let b58 = gid.to_base58();
        let decoded_b58 = Gid::from_base58(&b58).unwrap();
        assert_eq!(gid, decoded_b58);
    }
}
