//! Content-addressed blob storage
//!
//! Payloads that are too large or too sensitive for the ledger itself
//! (encrypted attribute records, key artifacts) are stored off-ledger and
//! referenced by the SHA-256 of their content. Storing the same bytes twice
//! yields the same address.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// SHA-256 content address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContentAddress([u8; 32]);

impl ContentAddress {
    /// Address of the given bytes.
    pub fn of(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let mut addr = [0u8; 32];
        addr.copy_from_slice(&digest);
        Self(addr)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // First 8 hex chars, enough to eyeball in logs
        write!(f, "{}", &self.to_hex()[..8])
    }
}

/// Shared in-memory content-addressed store.
#[derive(Clone, Default)]
pub struct ContentStore {
    blobs: Arc<RwLock<HashMap<ContentAddress, Vec<u8>>>>,
}

impl ContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store bytes, returning their content address. Idempotent.
    pub async fn put(&self, bytes: Vec<u8>) -> ContentAddress {
        let addr = ContentAddress::of(&bytes);
        self.blobs.write().await.insert(addr, bytes);
        addr
    }

    /// Retrieve bytes by address.
    pub async fn get(&self, addr: &ContentAddress) -> Option<Vec<u8>> {
        self.blobs.read().await.get(addr).cloned()
    }

    pub async fn contains(&self, addr: &ContentAddress) -> bool {
        self.blobs.read().await.contains_key(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = ContentStore::new();
        let addr = store.put(b"attribute record ciphertext".to_vec()).await;

        assert_eq!(
            store.get(&addr).await.as_deref(),
            Some(b"attribute record ciphertext".as_slice())
        );
        assert!(store.contains(&addr).await);
    }

    #[tokio::test]
    async fn test_addresses_are_content_derived() {
        let store = ContentStore::new();
        let a = store.put(vec![1, 2, 3]).await;
        let b = store.put(vec![1, 2, 3]).await;
        let c = store.put(vec![4, 5, 6]).await;

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, ContentAddress::of(&[1, 2, 3]));
    }

    #[tokio::test]
    async fn test_get_unknown_address() {
        let store = ContentStore::new();
        assert_eq!(store.get(&ContentAddress::of(b"missing")).await, None);
    }
}
