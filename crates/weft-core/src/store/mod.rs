//! Content-addressed block storage.
//!
//! The log never owns its blocks: entries and manifests are written through a
//! [`BlockStore`] and addressed by the BLAKE3 hash of their bytes. Any number
//! of logs may share one store since blocks are immutable.
//!
//! # Sub-modules
//!
//! - [`canonical`]: canonical JSON encoding used for every block.
//! - [`dag`]: JSON node read/write with link-field validation.
//! - [`memory`]: in-memory [`BlockStore`] for tests and embedding.
//! - [`slow`]: latency-injecting wrapper used to exercise fetch deadlines.

pub mod canonical;
pub mod dag;
pub mod memory;
pub mod slow;

use bytes::Bytes;

pub use memory::MemoryStore;
pub use slow::SlowStore;

/// Prefix carried by every block address.
pub const ADDRESS_PREFIX: &str = "blake3:";

/// Errors that can occur during block storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested block was not found.
    #[error("block not found: {0}")]
    NotFound(String),

    /// The store's internal lock was poisoned by a panicking writer.
    #[error("block store lock poisoned")]
    LockPoisoned,

    /// Block bytes are not a valid JSON node.
    #[error("malformed block {address}: {reason}")]
    Malformed {
        /// Address of the block.
        address: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A field declared as a link does not hold addresses.
    #[error("link field `{field}` must hold block addresses")]
    InvalidLink {
        /// Name of the offending field.
        field: String,
    },
}

/// Trait for storing and retrieving immutable, content-addressed blocks.
///
/// All implementations must be `Send + Sync` for use across async tasks.
#[async_trait::async_trait]
pub trait BlockStore: Send + Sync {
    /// Store a block and return its address.
    async fn put(&self, data: Bytes) -> Result<String, StoreError>;

    /// Retrieve a block by address. Returns `None` if not found.
    async fn get(&self, address: &str) -> Result<Option<Bytes>, StoreError>;

    /// Check whether a block exists.
    async fn contains(&self, address: &str) -> Result<bool, StoreError>;

    /// Number of stored blocks.
    async fn len(&self) -> Result<usize, StoreError>;
}

/// Compute the content address of a block.
///
/// Returns the hash in `blake3:<hex>` format.
#[must_use]
pub fn address_of(data: &[u8]) -> String {
    let hash = blake3::hash(data);
    format!("{ADDRESS_PREFIX}{hash}")
}

/// Returns `true` if `value` looks like a block address.
#[must_use]
pub fn is_address(value: &str) -> bool {
    value
        .strip_prefix(ADDRESS_PREFIX)
        .is_some_and(|hex| hex.len() == 64 && hex.bytes().all(|b| b.is_ascii_hexdigit()))
}
