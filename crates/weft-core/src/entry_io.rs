//! Fetching entry graphs from the block store.
//!
//! [`fetch_all`] walks the DAG backwards from a set of hashes, loading
//! entries in waves of at most `concurrency` parallel reads. With a `length`
//! bound the walk favours causally recent entries: once enough entries are
//! held, branches that can only yield older entries are not followed, and
//! skip links (`refs`) are used to jump past history that cannot make the
//! cut.
//!
//! A read that exceeds the per-entry `timeout`, or whose block is absent,
//! abandons that branch with a warning. The fetch itself still succeeds
//! with whatever was reachable.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, TryStreamExt, stream};
use tracing::{instrument, trace, warn};

use crate::entry::Entry;
use crate::error::LogError;
use crate::sorting::{NoZeroes, last_write_wins};
use crate::store::{BlockStore, StoreError};

/// Default number of parallel reads per wave.
pub const DEFAULT_FETCH_CONCURRENCY: usize = 32;

/// Called with `(hash, entry, entries kept so far)` for every kept entry.
pub type ProgressFn = Arc<dyn Fn(&str, &Entry, usize) + Send + Sync>;

/// Options for [`fetch_all`] and [`fetch_parallel`].
#[derive(Clone)]
pub struct FetchOptions {
    /// Maximum entries to return. Unbounded when absent.
    pub length: Option<usize>,
    /// Entries already held. They are neither fetched nor walked past.
    pub exclude: Vec<Entry>,
    /// Deadline for each single read.
    pub timeout: Option<Duration>,
    /// Parallel reads per wave.
    pub concurrency: usize,
    /// Artificial pause after each read.
    pub delay: Option<Duration>,
    pub progress: Option<ProgressFn>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            length: None,
            exclude: Vec::new(),
            timeout: None,
            concurrency: DEFAULT_FETCH_CONCURRENCY,
            delay: None,
            progress: None,
        }
    }
}

impl fmt::Debug for FetchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchOptions")
            .field("length", &self.length)
            .field("exclude", &self.exclude.len())
            .field("timeout", &self.timeout)
            .field("concurrency", &self.concurrency)
            .field("delay", &self.delay)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// Per-call fetch state.
struct Walk {
    length: Option<usize>,
    result: Vec<Entry>,
    /// Kept or excluded hashes; never fetched again.
    cache: HashSet<String>,
    /// Hashes that have ever been queued.
    queued: HashSet<String>,
    /// Pending hashes by priority bucket, lowest bucket first.
    queue: BTreeMap<u64, VecDeque<String>>,
    max_clock: u64,
    min_clock: u64,
}

impl Walk {
    fn new(hashes: &[String], options: &FetchOptions) -> Self {
        let mut walk = Self {
            length: options.length,
            result: Vec::new(),
            cache: options.exclude.iter().map(|e| e.hash.clone()).collect(),
            queued: HashSet::new(),
            queue: BTreeMap::new(),
            max_clock: 0,
            min_clock: 0,
        };
        for hash in hashes {
            walk.enqueue(hash, 0);
        }
        walk
    }

    fn has_more(&self) -> bool {
        self.queue.values().any(|bucket| !bucket.is_empty())
    }

    fn enqueue(&mut self, hash: &str, bucket: u64) {
        if self.queued.insert(hash.to_owned()) {
            self.queue
                .entry(bucket)
                .or_default()
                .push_back(hash.to_owned());
        }
    }

    /// Take up to `limit` hashes, lowest bucket first, skipping cached ones.
    fn next_wave(&mut self, limit: usize) -> Vec<String> {
        let mut wave = Vec::with_capacity(limit);
        while wave.len() < limit {
            let Some(mut bucket) = self.queue.first_entry() else {
                break;
            };
            let popped = bucket.get_mut().pop_front();
            match popped {
                Some(hash) => {
                    if !self.cache.contains(&hash) {
                        wave.push(hash);
                    }
                }
                None => {
                    bucket.remove();
                }
            }
        }
        wave
    }

    fn bucket(&self, time: u64, index: usize) -> u64 {
        let index = index as u64;
        let age = self.max_clock - time.min(self.max_clock);
        age.saturating_add(index.saturating_add(1).saturating_mul(index))
    }

    fn add(&mut self, hash: &str, entry: Entry, progress: Option<&ProgressFn>) {
        let time = entry.clock.time;
        self.max_clock = self.max_clock.max(time);
        self.min_clock = match self.result.last() {
            Some(last) => last.clock.time.min(self.min_clock),
            None => self.max_clock,
        };

        let full = self.length.is_some_and(|n| self.result.len() >= n);
        let keep = !full || time >= self.min_clock;

        let next = entry.next.clone();
        let refs = entry.refs.clone();
        let entry_hash = entry.hash.clone();

        if keep {
            self.cache.insert(hash.to_owned());
            self.result.push(entry);
            if let (Some(progress), Some(kept)) = (progress, self.result.last()) {
                progress(hash, kept, self.result.len());
            }
            trace!(hash, time, kept = self.result.len(), "fetched entry");
        }

        match self.length {
            None => {
                for (i, h) in next.iter().enumerate() {
                    self.enqueue(h, i as u64);
                }
                for (i, h) in refs.iter().enumerate() {
                    self.enqueue(h, i as u64);
                }
            }
            Some(length) => {
                let needed = self.result.len() < length
                    || time > self.min_clock
                    || (time == self.min_clock && !self.cache.contains(&entry_hash));
                if needed {
                    let bucket = self.bucket(time, 0);
                    for h in &next {
                        self.enqueue(h, bucket);
                    }
                }
                if self.result.len() + refs.len() <= length {
                    for (i, h) in refs.iter().enumerate() {
                        let bucket = self.bucket(time, i);
                        self.enqueue(h, bucket);
                    }
                }
            }
        }
    }

    /// Bounded walks may overshoot; keep the latest `length` entries.
    fn finish(mut self) -> Vec<Entry> {
        if let Some(length) = self.length {
            if self.result.len() > length {
                let sort = NoZeroes::new(last_write_wins);
                self.result.sort_by(|a, b| sort.compare(a, b));
                self.result.drain(..self.result.len() - length);
            }
        }
        self.result
    }
}

/// Fetch the entries reachable from `hashes`.
///
/// # Errors
///
/// Returns an error if the store fails in a way other than a missing block,
/// or if a block is not a valid entry. Timeouts and missing blocks only
/// end their branch.
#[instrument(skip_all, fields(roots = hashes.len(), length = ?options.length))]
pub async fn fetch_all(
    store: &dyn BlockStore,
    hashes: &[String],
    options: &FetchOptions,
) -> Result<Vec<Entry>, LogError> {
    let concurrency = options.concurrency.max(1);
    let timeout = options.timeout.filter(|t| !t.is_zero());
    let delay = options.delay.filter(|d| !d.is_zero());
    let mut walk = Walk::new(hashes, options);
    let mut waves = 0usize;

    while walk.has_more() {
        let wave = walk.next_wave(concurrency);
        if wave.is_empty() {
            continue;
        }
        waves += 1;

        let mut loads = stream::iter(wave)
            .map(move |hash| async move {
                let loaded = load(store, &hash, timeout, delay).await;
                (hash, loaded)
            })
            .buffer_unordered(concurrency);

        while let Some((hash, loaded)) = loads.next().await {
            if let Some(entry) = loaded? {
                walk.add(&hash, entry, options.progress.as_ref());
            }
        }
    }

    let entries = walk.finish();
    tracing::debug!(waves, fetched = entries.len(), "fetch complete");
    Ok(entries)
}

/// Run [`fetch_all`] once per hash and concatenate the results.
///
/// # Errors
///
/// Returns the first error from any of the fetches.
pub async fn fetch_parallel(
    store: &dyn BlockStore,
    hashes: &[String],
    options: &FetchOptions,
) -> Result<Vec<Entry>, LogError> {
    let results: Vec<Vec<Entry>> = stream::iter(hashes)
        .map(|hash| fetch_all(store, std::slice::from_ref(hash), options))
        .buffered(options.concurrency.max(1))
        .try_collect()
        .await?;
    Ok(results.into_iter().flatten().collect())
}

async fn load(
    store: &dyn BlockStore,
    hash: &str,
    timeout: Option<Duration>,
    delay: Option<Duration>,
) -> Result<Option<Entry>, LogError> {
    let read = Entry::from_multihash(store, hash);
    let loaded = match timeout {
        Some(limit) => {
            if let Ok(loaded) = tokio::time::timeout(limit, read).await {
                loaded
            } else {
                let err = LogError::StorageTimeout {
                    hash: hash.to_owned(),
                    timeout_ms: limit.as_millis(),
                };
                warn!(
                    code = %err.code(),
                    hint = err.hint().unwrap_or_default(),
                    "{}: {err}",
                    err.code().message()
                );
                return Ok(None);
            }
        }
        None => read.await,
    };

    match loaded {
        Ok(entry) => {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok(Some(entry))
        }
        Err(LogError::Store(StoreError::NotFound(_))) => {
            warn!(hash, "entry block missing, skipping branch");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
