//! Key-share derivation.
//!
//! After a proof is accepted, an authority contributes its share of the
//! requester's decryption key. The share is derived deterministically from
//! the authority's master seed, the requester's GID, and the process
//! instance, so re-serving the same accepted request yields the same
//! share and nothing is stored per requester.
//!
//! Domain separation: "zkattr-keyshare-v1"

use hkdf::Hkdf;
use sha2::Sha256;

use crate::identity::Gid;

const KEYSHARE_TAG: &[u8] = b"zkattr-keyshare-v1";

/// One authority's contribution to a requester's key.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct KeyShare([u8; 32]);

impl KeyShare {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

// No Debug derive: shares should not end up in logs by accident.
impl std::fmt::Debug for KeyShare {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyShare({}..)", hex::encode(&self.0[..4]))
    }
}

/// Derive this authority's key share for a requester within one process
/// instance, via HKDF-SHA256 over the authority's master seed.
pub fn derive_key_share(
    authority_seed: &[u8; 32],
    requester: &Gid,
    process_instance_id: u64,
) -> KeyShare {
    let hk = Hkdf::<Sha256>::new(None, authority_seed);
    let mut info = Vec::with_capacity(KEYSHARE_TAG.len() + 40);
    info.extend_from_slice(KEYSHARE_TAG);
    info.extend_from_slice(requester.as_bytes());
    info.extend_from_slice(&process_instance_id.to_le_bytes());

    let mut okm = [0u8; 32];
    hk.expand(&info, &mut okm)
        .expect("HKDF expand should never fail with valid output length");
    KeyShare(okm)
}
