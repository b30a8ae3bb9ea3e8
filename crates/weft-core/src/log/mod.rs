//! The replicated log.
//!
//! [`Log`] is a grow-only set of [`Entry`] values with a deterministic
//! order. Each replica holds its own `Log`, appends locally, and reconciles
//! with others through [`Log::join`]. Because the order of entries depends
//! only on their clocks and hashes, replicas that have seen the same entries
//! materialize the same [`Log::values`] sequence.
//!
//! # State
//!
//! - `entry_index`: every entry the replica holds for this log.
//! - `heads_index`: entries no other held entry points to via `next`.
//! - `nexts_index`: parent hash to child hash, used to recompute heads after
//!   a join without rescanning the whole log.
//!
//! # Sub-modules
//!
//! - [`traverse`]: priority-ordered traversal, heads and tails.
//! - [`iter`]: bounded range iteration.
//! - [`render`]: JSON views, snapshots and the text tree.

pub mod iter;
pub mod render;
pub mod traverse;

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use futures::{TryStreamExt, stream};
use serde_json::Value;
use tracing::instrument;

use crate::access::{AccessController, AllowAll};
use crate::clock::LamportClock;
use crate::entry::Entry;
use crate::entry_index::EntryIndex;
use crate::error::LogError;
use crate::gset::GSet;
use crate::identity::IdentityProvider;
use crate::sorting::{NoZeroes, SortFn, last_write_wins};
use crate::store::BlockStore;

pub use iter::{Bound, IteratorOptions, LogIter};
pub use render::{JsonLog, Snapshot};
pub use traverse::{find_heads, find_tail_hashes, find_tails};

/// Default number of entries verified in parallel during a join.
pub const DEFAULT_JOIN_CONCURRENCY: usize = 16;

/// Construction options for [`Log::new`].
#[derive(Clone, Default)]
pub struct LogOptions {
    /// Log id. A millisecond timestamp is used when absent.
    pub log_id: Option<String>,
    /// Write policy. Defaults to [`AllowAll`].
    pub access: Option<Arc<dyn AccessController>>,
    /// Entries the log starts with. Duplicates collapse by hash.
    pub entries: Vec<Entry>,
    /// Explicit heads. Must be a subset of `entries`. Computed when absent.
    pub heads: Option<Vec<Entry>>,
    /// Starting clock. Only its time is used.
    pub clock: Option<LamportClock>,
    /// Comparator. Defaults to [`last_write_wins`].
    pub sort_fn: Option<SortFn>,
    /// Join verification concurrency. Defaults to [`DEFAULT_JOIN_CONCURRENCY`].
    pub concurrency: Option<usize>,
}

impl LogOptions {
    /// Options with only a log id set.
    #[must_use]
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            log_id: Some(id.into()),
            ..Self::default()
        }
    }
}

/// A CRDT append-only log over a content-addressed DAG.
#[derive(Clone)]
pub struct Log {
    store: Arc<dyn BlockStore>,
    identity: Arc<dyn IdentityProvider>,
    access: Arc<dyn AccessController>,
    id: String,
    entry_index: EntryIndex,
    heads_index: HashMap<String, Entry>,
    nexts_index: HashMap<String, String>,
    clock: LamportClock,
    sort: NoZeroes,
    join_concurrency: usize,
}

impl Log {
    /// Create a log, optionally seeded with entries.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Configuration`] for a zero join concurrency and
    /// [`LogError::Validation`] if an explicit head is not among the entries.
    pub fn new(
        store: Arc<dyn BlockStore>,
        identity: Arc<dyn IdentityProvider>,
        options: LogOptions,
    ) -> Result<Self, LogError> {
        let join_concurrency = options.concurrency.unwrap_or(DEFAULT_JOIN_CONCURRENCY);
        if join_concurrency == 0 {
            return Err(LogError::Configuration(
                "join concurrency must be at least 1".into(),
            ));
        }

        let entry_index = EntryIndex::new(options.entries);
        let heads: Vec<Entry> = match options.heads {
            Some(heads) => {
                if let Some(stray) = heads.iter().find(|h| !entry_index.contains(&h.hash)) {
                    return Err(LogError::Validation(format!(
                        "head {} is not among the log's entries",
                        stray.hash
                    )));
                }
                heads
            }
            None => find_heads(entry_index.values()).into_iter().cloned().collect(),
        };

        let nexts_index = build_nexts_index(entry_index.values());
        let heads_index: HashMap<String, Entry> =
            heads.into_iter().map(|e| (e.hash.clone(), e)).collect();

        let start = options.clock.map_or(0, |c| c.time);
        let time = start.max(max_time(heads_index.values()));
        let clock = LamportClock::new(identity.identity().public_key.clone(), time);

        let id = options
            .log_id
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis().to_string());

        Ok(Self {
            store,
            identity,
            access: options.access.unwrap_or_else(|| Arc::new(AllowAll)),
            id,
            entry_index,
            heads_index,
            nexts_index,
            clock,
            sort: NoZeroes::new(options.sort_fn.unwrap_or(last_write_wins)),
            join_concurrency,
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub const fn clock(&self) -> &LamportClock {
        &self.clock
    }

    /// Number of entries held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entry_index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entry_index.is_empty()
    }

    #[must_use]
    pub fn get(&self, hash: &str) -> Option<&Entry> {
        self.entry_index.get(hash)
    }

    #[must_use]
    pub fn has(&self, hash: &str) -> bool {
        self.entry_index.contains(hash)
    }

    /// The block store entries are written to.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn BlockStore> {
        &self.store
    }

    /// The identity appends are signed with.
    #[must_use]
    pub fn identity(&self) -> &Arc<dyn IdentityProvider> {
        &self.identity
    }

    /// The comparator, wrapped so it is strict.
    #[must_use]
    pub const fn sort(&self) -> NoZeroes {
        self.sort
    }

    /// Switch the signing identity.
    ///
    /// The clock takes the new public key as its id and keeps the latest
    /// time seen.
    pub fn set_identity(&mut self, identity: Arc<dyn IdentityProvider>) {
        let time = self.clock.time.max(max_time(self.heads_index.values()));
        self.clock = LamportClock::new(identity.identity().public_key.clone(), time);
        self.identity = identity;
    }

    /// Append a payload as a new entry on top of the current heads.
    ///
    /// `pointer_count` bounds how far back the skip links (`refs`) reach.
    /// The append is atomic: if signing, storage or the access check fails,
    /// the log is unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::AccessDenied`] if the access controller rejects
    /// the entry, or any error from signing and storage.
    pub async fn append(&mut self, data: Value, pointer_count: usize) -> Result<Entry, LogError> {
        let heads = self.heads();
        let time = self.clock.time.max(max_time(heads.iter().copied())) + 1;
        let clock = LamportClock::new(self.clock.id.clone(), time);

        let all = self.traverse(&heads, Some(pointer_count.max(heads.len())), None);
        let mut references: Vec<&str> = Vec::new();
        let max_distance = pointer_count.min(all.len());
        let mut distance = 1;
        while distance <= max_distance {
            let hash = all[(distance - 1).min(all.len() - 1)].hash.as_str();
            if !references.contains(&hash) {
                references.push(hash);
            }
            distance *= 2;
        }
        // Always reach the oldest ancestor when history is shorter than asked.
        if all.len() < pointer_count {
            if let Some(last) = all.last() {
                if !references.contains(&last.hash.as_str()) {
                    references.push(&last.hash);
                }
            }
        }

        let mut nexts: Vec<String> = Vec::with_capacity(heads.len());
        for head in heads.iter().rev() {
            if !nexts.contains(&head.hash) {
                nexts.push(head.hash.clone());
            }
        }
        let refs: Vec<String> = references
            .into_iter()
            .filter(|r| !nexts.iter().any(|n| n == r))
            .map(str::to_owned)
            .collect();

        let entry = Entry::create(
            self.store.as_ref(),
            self.identity.as_ref(),
            &self.id,
            data,
            nexts.clone(),
            clock.clone(),
            refs,
        )
        .await?;

        if !self.access.can_append(&entry, self.identity.as_ref()).await {
            return Err(LogError::AccessDenied {
                identity: self.identity.identity().id.clone(),
            });
        }

        self.clock = clock;
        for next in nexts {
            self.nexts_index.insert(next, entry.hash.clone());
        }
        self.entry_index.set(entry.hash.clone(), entry.clone());
        self.heads_index = HashMap::from([(entry.hash.clone(), entry.clone())]);

        tracing::debug!(
            log_id = %self.id,
            hash = %entry.hash,
            time = entry.clock.time,
            refs = entry.refs.len(),
            "appended entry"
        );
        Ok(entry)
    }

    /// Merge another replica of the same log into this one.
    ///
    /// Logs with a different id are ignored. Every entry this replica has not
    /// seen is checked against the access controller and its signature is
    /// verified before anything is merged; one bad entry rejects the whole
    /// join and leaves the log unchanged. With `max_size`, only the latest
    /// `max_size` entries are kept afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::AccessDenied`] or [`LogError::Signature`] naming
    /// the first entry that failed verification.
    #[instrument(skip(self, other), fields(log_id = %self.id))]
    pub async fn join(&mut self, other: &Self, max_size: Option<usize>) -> Result<(), LogError> {
        if self.id != other.id {
            let skipped = LogError::IdMismatch {
                expected: self.id.clone(),
                actual: other.id.clone(),
            };
            tracing::debug!(code = %skipped.code(), "{skipped}, skipping join");
            return Ok(());
        }

        let new_items: Vec<Entry> = Self::difference(other, self)
            .into_iter()
            .cloned()
            .collect();

        let access = self.access.as_ref();
        let identity = self.identity.as_ref();
        stream::iter(new_items.iter().map(Ok::<_, LogError>))
            .try_for_each_concurrent(self.join_concurrency, |entry| async move {
                if !access.can_append(entry, identity).await {
                    return Err(LogError::AccessDenied {
                        identity: entry.identity.id.clone(),
                    });
                }
                if !Entry::verify(identity, entry).await {
                    return Err(LogError::Signature {
                        hash: entry.hash.clone(),
                        sig: entry.sig.clone(),
                        key: entry.identity.public_key.clone(),
                    });
                }
                Ok(())
            })
            .await?;

        let merged = new_items.len();
        let referenced: HashSet<String> = new_items
            .iter()
            .flat_map(|e| e.next.iter().cloned())
            .collect();
        for entry in &new_items {
            for next in &entry.next {
                self.nexts_index.insert(next.clone(), entry.hash.clone());
            }
        }
        self.entry_index
            .add(new_items.into_iter().map(|e| (e.hash.clone(), e)));

        let mut candidates = self.heads_index.clone();
        candidates.extend(
            other
                .heads_index
                .iter()
                .map(|(hash, entry)| (hash.clone(), entry.clone())),
        );
        let heads: HashMap<String, Entry> = find_heads(candidates.values())
            .into_iter()
            .filter(|e| !referenced.contains(&e.hash) && !self.nexts_index.contains_key(&e.hash))
            .map(|e| (e.hash.clone(), e.clone()))
            .collect();
        self.heads_index = heads;

        if let Some(size) = max_size {
            self.truncate(size);
        }

        let time = max_time(self.heads_index.values());
        self.clock.time = self.clock.time.max(time);

        tracing::debug!(
            merged,
            length = self.len(),
            heads = self.heads_index.len(),
            "joined log"
        );
        Ok(())
    }

    /// Keep only the latest `size` entries.
    fn truncate(&mut self, size: usize) {
        let values: Vec<Entry> = self.values().into_iter().cloned().collect();
        let keep = &values[values.len().saturating_sub(size)..];

        self.heads_index = find_heads(keep)
            .into_iter()
            .map(|e| (e.hash.clone(), e.clone()))
            .collect();
        self.nexts_index = build_nexts_index(keep);
        self.entry_index = EntryIndex::new(keep.iter().cloned());
    }

    /// Entries reachable from `a`'s heads through `next` links that `b` does
    /// not hold, restricted to `b`'s log id.
    #[must_use]
    pub fn difference<'a>(a: &'a Self, b: &Self) -> Vec<&'a Entry> {
        let mut queue: VecDeque<&str> = a
            .heads_index
            .keys()
            .map(String::as_str)
            .filter(|h| !b.has(h))
            .collect();
        let mut visited: HashSet<&str> = queue.iter().copied().collect();
        let mut found = Vec::new();

        while let Some(hash) = queue.pop_front() {
            let Some(entry) = a.get(hash) else {
                continue;
            };
            if entry.id != b.id {
                continue;
            }
            found.push(entry);
            for next in &entry.next {
                if !b.has(next) && visited.insert(next.as_str()) {
                    queue.push_back(next.as_str());
                }
            }
        }
        found
    }
}

fn build_nexts_index<'a>(entries: impl IntoIterator<Item = &'a Entry>) -> HashMap<String, String> {
    let mut index = HashMap::new();
    for entry in entries {
        for next in &entry.next {
            index.insert(next.clone(), entry.hash.clone());
        }
    }
    index
}

fn max_time<'a>(entries: impl IntoIterator<Item = &'a Entry>) -> u64 {
    entries.into_iter().map(|e| e.clock.time).max().unwrap_or(0)
}

impl fmt::Debug for Log {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Log")
            .field("id", &self.id)
            .field("clock", &self.clock)
            .field("length", &self.len())
            .field("heads", &self.heads_index.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl GSet for Log {
    async fn append(&mut self, data: Value) -> Result<Entry, LogError> {
        Self::append(self, data, 1).await
    }

    async fn merge(&mut self, other: &Self) -> Result<(), LogError> {
        self.join(other, None).await
    }

    fn get(&self, hash: &str) -> Option<&Entry> {
        Self::get(self, hash)
    }

    fn has(&self, hash: &str) -> bool {
        Self::has(self, hash)
    }

    fn values(&self) -> Vec<&Entry> {
        Self::values(self)
    }

    fn len(&self) -> usize {
        Self::len(self)
    }
}
