//! Immutable, signed, content-addressed log entries.
//!
//! An [`Entry`] is a node of the Merkle DAG. Its address (`hash`) is the
//! BLAKE3 hash of its canonical block, which covers the payload, the clock,
//! the parent links (`next`), the skip links (`refs`) and the author's
//! signature. Changing any of those changes the address, and therefore the
//! address of every descendant.
//!
//! # Block layout
//!
//! The stored block is the wire form minus `hash` (an address cannot be part
//! of the bytes it addresses). The signature covers a smaller record: `id`,
//! `payload`, `next`, `refs`, `v` and `clock`, with `hash` set to null.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{trace, warn};

use crate::clock::LamportClock;
use crate::error::LogError;
use crate::identity::{Identity, IdentityProvider};
use crate::store::canonical::canonical_bytes;
use crate::store::dag::{ENTRY_LINKS, read_node, write_node};
use crate::store::{BlockStore, StoreError, address_of};

/// Entry format version written by this crate.
pub const ENTRY_VERSION: u32 = 2;

/// A node of the log DAG, in wire form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Content address of the entry block.
    pub hash: String,
    /// Id of the log this entry belongs to.
    pub id: String,
    /// Opaque application data.
    pub payload: Value,
    /// Addresses of the immediate causal predecessors (the heads at append time).
    pub next: Vec<String>,
    /// Skip links to ancestors at power-of-two distances.
    #[serde(default)]
    pub refs: Vec<String>,
    /// Format version.
    pub v: u32,
    /// Clock at creation time.
    pub clock: LamportClock,
    /// Public key of the author.
    pub key: String,
    /// Full author identity.
    pub identity: Identity,
    /// Signature over the signed fields.
    pub sig: String,
}

/// The stored block: every wire field except `hash`.
#[derive(Serialize, Deserialize)]
struct EntryBlock {
    id: String,
    payload: Value,
    next: Vec<String>,
    #[serde(default)]
    refs: Vec<String>,
    v: u32,
    clock: LamportClock,
    key: String,
    identity: Identity,
    sig: String,
}

impl Entry {
    /// Create, sign and store a new entry.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Identity`] if the identity cannot sign and
    /// [`LogError::Store`] if the block cannot be written.
    pub async fn create(
        store: &dyn BlockStore,
        identity: &dyn IdentityProvider,
        log_id: &str,
        payload: Value,
        next: Vec<String>,
        clock: LamportClock,
        refs: Vec<String>,
    ) -> Result<Self, LogError> {
        let signed = signing_bytes(log_id, &payload, &next, &refs, ENTRY_VERSION, &clock);
        let sig = identity.sign(&signed).await?;
        let author = identity.identity().clone();

        let mut entry = Self {
            hash: String::new(),
            id: log_id.to_owned(),
            payload,
            next,
            refs,
            v: ENTRY_VERSION,
            clock,
            key: author.public_key.clone(),
            identity: author,
            sig,
        };
        entry.hash = Self::to_multihash(store, &entry).await?;
        trace!(hash = %entry.hash, time = entry.clock.time, "created entry");
        Ok(entry)
    }

    /// Write the entry block and return its address.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Store`] if the write fails.
    pub async fn to_multihash(store: &dyn BlockStore, entry: &Self) -> Result<String, LogError> {
        let block = serde_json::to_value(entry.to_block())?;
        Ok(write_node(store, &block, ENTRY_LINKS).await?)
    }

    /// Read an entry block by address.
    ///
    /// The block is re-encoded and its address recomputed, so a store that
    /// hands back the wrong bytes is caught here.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Store`] if the block is missing, malformed or does
    /// not hash to `hash`.
    pub async fn from_multihash(store: &dyn BlockStore, hash: &str) -> Result<Self, LogError> {
        let value = read_node(store, hash, ENTRY_LINKS).await?;
        if address_of(&canonical_bytes(&value)) != hash {
            return Err(StoreError::Malformed {
                address: hash.to_owned(),
                reason: "content does not match address".into(),
            }
            .into());
        }
        let block: EntryBlock =
            serde_json::from_value(value).map_err(|e| StoreError::Malformed {
                address: hash.to_owned(),
                reason: e.to_string(),
            })?;
        Ok(Self::from_block(hash.to_owned(), block))
    }

    /// Verify the entry's signature against its claimed key.
    ///
    /// The claimed key must be the embedded identity's key. Fails closed: a
    /// provider error counts as an invalid signature.
    pub async fn verify(provider: &dyn IdentityProvider, entry: &Self) -> bool {
        if entry.key != entry.identity.public_key {
            warn!(hash = %entry.hash, "entry key does not match its identity");
            return false;
        }
        let data = signing_bytes(
            &entry.id,
            &entry.payload,
            &entry.next,
            &entry.refs,
            entry.v,
            &entry.clock,
        );
        match provider.verify(&entry.sig, &entry.key, &data).await {
            Ok(valid) => valid,
            Err(e) => {
                warn!(hash = %entry.hash, error = %e, "signature verification errored");
                false
            }
        }
    }

    /// Returns `true` if `child` lists `parent` among its `next` links.
    #[must_use]
    pub fn is_parent(parent: &Self, child: &Self) -> bool {
        child.next.iter().any(|h| *h == parent.hash)
    }

    /// Follow the chain of children of `entry` within `values`.
    ///
    /// Starting from `entry`, repeatedly picks the first entry in `values`
    /// that has the current one as parent. The chain is returned oldest
    /// first.
    #[must_use]
    pub fn find_children<'a>(entry: &Self, values: &'a [Self]) -> Vec<&'a Self> {
        let mut chain: Vec<&Self> = Vec::new();
        let mut prev = entry;
        while let Some(child) = values
            .iter()
            .find(|e| Self::is_parent(prev, e) && !chain.iter().any(|c| c.hash == e.hash))
        {
            chain.push(child);
            prev = child;
        }
        chain.sort_by(|a, b| a.clock.time.cmp(&b.clock.time));
        chain
    }

    /// Order two entries by their clocks.
    #[must_use]
    pub fn compare(a: &Self, b: &Self) -> Ordering {
        LamportClock::compare(&a.clock, &b.clock)
    }

    fn to_block(&self) -> EntryBlock {
        EntryBlock {
            id: self.id.clone(),
            payload: self.payload.clone(),
            next: self.next.clone(),
            refs: self.refs.clone(),
            v: self.v,
            clock: self.clock.clone(),
            key: self.key.clone(),
            identity: self.identity.clone(),
            sig: self.sig.clone(),
        }
    }

    fn from_block(hash: String, block: EntryBlock) -> Self {
        Self {
            hash,
            id: block.id,
            payload: block.payload,
            next: block.next,
            refs: block.refs,
            v: block.v,
            clock: block.clock,
            key: block.key,
            identity: block.identity,
            sig: block.sig,
        }
    }
}

fn signing_bytes(
    id: &str,
    payload: &Value,
    next: &[String],
    refs: &[String],
    v: u32,
    clock: &LamportClock,
) -> Vec<u8> {
    canonical_bytes(&json!({
        "hash": null,
        "id": id,
        "payload": payload,
        "next": next,
        "refs": refs,
        "v": v,
        "clock": clock,
    }))
}
