use serde_json::Value;

use crate::entry::Entry;
use crate::error::LogError;

/// Grow-only set of entries.
///
/// The capability set a log offers as a CRDT. Merge is a set union, so it
/// satisfies the semilattice properties:
/// - Commutative: a ∪ b = b ∪ a
/// - Associative: (a ∪ b) ∪ c = a ∪ (b ∪ c)
/// - Idempotent: a ∪ a = a
#[async_trait::async_trait]
pub trait GSet: Send + Sync {
    /// Add a new element built from `data`.
    async fn append(&mut self, data: Value) -> Result<Entry, LogError>;

    /// Union another replica into this one.
    async fn merge(&mut self, other: &Self) -> Result<(), LogError>;

    fn get(&self, hash: &str) -> Option<&Entry>;

    fn has(&self, hash: &str) -> bool;

    /// Elements in their materialized order.
    fn values(&self) -> Vec<&Entry>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
