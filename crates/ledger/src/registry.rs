//! Append-only commitment registry
//!
//! The registry is the public anchor for certified attributes: one entry per
//! (holder, certifying authority, attribute type), each entry a growing
//! version history. Certifying the same attribute again appends a new
//! commitment; nothing is ever overwritten or deleted, so any commitment a
//! proof was generated against remains resolvable.

use crypto::Gid;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use zk::Commitment;

type RegistryKey = (Gid, u32, u32);

/// Shared append-only map of published attribute commitments.
#[derive(Clone, Default)]
pub struct CommitmentRegistry {
    entries: Arc<RwLock<HashMap<RegistryKey, Vec<Commitment>>>>,
}

impl CommitmentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a commitment for (holder, authority, type). Returns the new
    /// version number, starting at 1.
    pub async fn store_commitment(
        &self,
        holder: Gid,
        authority_id: u32,
        attr_type: u32,
        commitment: Commitment,
    ) -> u64 {
        let mut entries = self.entries.write().await;
        let history = entries
            .entry((holder, authority_id, attr_type))
            .or_default();
        history.push(commitment);
        let version = history.len() as u64;

        info!(
            holder = %holder,
            authority_id,
            attr_type,
            version,
            commitment = %commitment,
            "commitment registered"
        );

        version
    }

    /// Latest commitment for (holder, authority, type), if any.
    pub async fn get_commitment(
        &self,
        holder: &Gid,
        authority_id: u32,
        attr_type: u32,
    ) -> Option<Commitment> {
        let entries = self.entries.read().await;
        entries
            .get(&(*holder, authority_id, attr_type))
            .and_then(|history| history.last().copied())
    }

    /// Full version history for (holder, authority, type), oldest first.
    pub async fn history(
        &self,
        holder: &Gid,
        authority_id: u32,
        attr_type: u32,
    ) -> Vec<Commitment> {
        let entries = self.entries.read().await;
        entries
            .get(&(*holder, authority_id, attr_type))
            .cloned()
            .unwrap_or_default()
    }

    /// Number of registered (holder, authority, type) entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto::Identity;
    use zk::AttributeRecord;

    fn record(secret: u64) -> AttributeRecord {
        AttributeRecord {
            secret,
            value: 42,
            authority_id: 1,
            attr_type: 1,
            expiry: 2027_08_29,
        }
    }

    #[tokio::test]
    async fn test_store_and_get_latest() {
        let registry = CommitmentRegistry::new();
        let holder = Identity::generate().gid();
        let c = record(11).commit().unwrap();

        let version = registry.store_commitment(holder, 1, 1, c).await;
        assert_eq!(version, 1);
        assert_eq!(registry.get_commitment(&holder, 1, 1).await, Some(c));

        // Different attribute type is a different entry
        assert_eq!(registry.get_commitment(&holder, 1, 2).await, None);
    }

    #[tokio::test]
    async fn test_recertification_appends() {
        let registry = CommitmentRegistry::new();
        let holder = Identity::generate().gid();
        let first = record(11).commit().unwrap();
        let second = record(22).commit().unwrap();

        registry.store_commitment(holder, 1, 1, first).await;
        let version = registry.store_commitment(holder, 1, 1, second).await;

        assert_eq!(version, 2);
        // Latest wins for resolution, but the old version is still there
        assert_eq!(registry.get_commitment(&holder, 1, 1).await, Some(second));
        assert_eq!(registry.history(&holder, 1, 1).await, vec![first, second]);
        assert_eq!(registry.len().await, 1);
    }
}
