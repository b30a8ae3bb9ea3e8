//! A [`BlockStore`] wrapper that adds read latency.
//!
//! `SlowStore` sleeps before every read, and can stall reads of specific
//! addresses far longer than any sensible deadline. Tests use it to drive
//! the fetch timeout path without a real network.
//!
//! ```ignore
//! let slow = SlowStore::new(inner)
//!     .read_latency(Duration::from_millis(5))
//!     .stall(missing_hash, Duration::from_secs(30));
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use super::{BlockStore, StoreError};

/// A [`BlockStore`] wrapper that injects latency before reads.
pub struct SlowStore {
    inner: Arc<dyn BlockStore>,
    read_latency: Duration,
    stalls: HashMap<String, Duration>,
}

impl SlowStore {
    /// Wrap an existing store with zero latency (pass-through) by default.
    pub fn new(inner: Arc<dyn BlockStore>) -> Self {
        Self {
            inner,
            read_latency: Duration::ZERO,
            stalls: HashMap::new(),
        }
    }

    /// Set the latency applied to every read.
    #[must_use]
    pub const fn read_latency(mut self, latency: Duration) -> Self {
        self.read_latency = latency;
        self
    }

    /// Delay reads of one address by `duration` instead of the base latency.
    #[must_use]
    pub fn stall(mut self, address: impl Into<String>, duration: Duration) -> Self {
        self.stalls.insert(address.into(), duration);
        self
    }

    async fn delay_for(&self, address: &str) {
        let wait = self
            .stalls
            .get(address)
            .copied()
            .unwrap_or(self.read_latency);
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }
}

#[async_trait::async_trait]
impl BlockStore for SlowStore {
    async fn put(&self, data: Bytes) -> Result<String, StoreError> {
        self.inner.put(data).await
    }

    async fn get(&self, address: &str) -> Result<Option<Bytes>, StoreError> {
        self.delay_for(address).await;
        self.inner.get(address).await
    }

    async fn contains(&self, address: &str) -> Result<bool, StoreError> {
        self.inner.contains(address).await
    }

    async fn len(&self) -> Result<usize, StoreError> {
        self.inner.len().await
    }
}
