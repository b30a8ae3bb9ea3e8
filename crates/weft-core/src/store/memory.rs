//! In-memory block storage backend.

use std::collections::HashMap;
use std::sync::RwLock;

use bytes::Bytes;
use tracing::trace;

use super::{BlockStore, StoreError, address_of};

/// In-memory block store backed by a `RwLock<HashMap>`.
///
/// Useful for tests and for replicas that share one process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blocks: RwLock<HashMap<String, Bytes>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl BlockStore for MemoryStore {
    async fn put(&self, data: Bytes) -> Result<String, StoreError> {
        let address = address_of(&data);
        let mut map = self.blocks.write().map_err(|_| StoreError::LockPoisoned)?;
        trace!(%address, size = data.len(), "storing block in memory");
        map.entry(address.clone()).or_insert(data);
        Ok(address)
    }

    async fn get(&self, address: &str) -> Result<Option<Bytes>, StoreError> {
        let map = self.blocks.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(map.get(address).cloned())
    }

    async fn contains(&self, address: &str) -> Result<bool, StoreError> {
        let map = self.blocks.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(map.contains_key(address))
    }

    async fn len(&self) -> Result<usize, StoreError> {
        let map = self.blocks.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(map.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get() {
        let store = MemoryStore::new();
        let address = store.put(Bytes::from_static(b"block")).await.expect("put");
        let data = store.get(&address).await.expect("get").expect("present");
        assert_eq!(&data[..], b"block");
        assert!(store.contains(&address).await.expect("contains"));
    }

    #[tokio::test]
    async fn duplicate_put_is_deduplicated() {
        let store = MemoryStore::new();
        let a = store.put(Bytes::from_static(b"same")).await.expect("put");
        let b = store.put(Bytes::from_static(b"same")).await.expect("put");
        assert_eq!(a, b);
        assert_eq!(store.len().await.expect("len"), 1);
    }

    #[tokio::test]
    async fn missing_block_is_none() {
        let store = MemoryStore::new();
        let missing = address_of(b"never written");
        assert!(store.get(&missing).await.expect("get").is_none());
    }
}
