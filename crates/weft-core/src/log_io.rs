//! Assembling logs from stored blocks.
//!
//! A log can be rebuilt from four kinds of root: a manifest address (the
//! block written by [`to_multihash`]), one or more entry hashes, a
//! [`JsonLog`], or entries already in memory. Each loader fetches the graph
//! through [`crate::entry_io`], orders it, cuts it to the requested length
//! and returns a [`LogData`] that [`Log::new`] consumes. The `Log::from_*`
//! constructors do both steps.

use std::sync::Arc;

use crate::access::AccessController;
use crate::entry::Entry;
use crate::entry_io::{FetchOptions, fetch_all, fetch_parallel};
use crate::error::LogError;
use crate::identity::IdentityProvider;
use crate::log::{JsonLog, Log, LogOptions, find_heads};
use crate::sorting::{NoZeroes, SortFn, last_write_wins};
use crate::store::dag::{MANIFEST_LINKS, read_node, write_node};
use crate::store::{BlockStore, StoreError};

/// Everything [`Log::new`] needs besides the store and identity.
#[derive(Debug, Clone, Default)]
pub struct LogData {
    pub log_id: Option<String>,
    pub entries: Vec<Entry>,
    pub heads: Option<Vec<Entry>>,
}

/// Options for the `Log::from_*` constructors.
#[derive(Clone, Default)]
pub struct LoadOptions {
    /// Id for loaders whose root does not carry one.
    pub log_id: Option<String>,
    pub access: Option<Arc<dyn AccessController>>,
    pub sort_fn: Option<SortFn>,
    pub fetch: FetchOptions,
}

/// Write the log's manifest (`{id, heads}`) and return its address.
///
/// # Errors
///
/// Returns [`LogError::EmptyLog`] for a log without entries, or any store
/// error.
pub async fn to_multihash(store: &dyn BlockStore, log: &Log) -> Result<String, LogError> {
    if log.is_empty() {
        return Err(LogError::EmptyLog);
    }
    let manifest = serde_json::to_value(log.to_json())?;
    Ok(write_node(store, &manifest, MANIFEST_LINKS).await?)
}

/// Load a log from its manifest address.
///
/// # Errors
///
/// Returns [`LogError::NotALog`] if the block lacks `id` or `heads`, or any
/// fetch error.
pub async fn from_multihash(
    store: &dyn BlockStore,
    hash: &str,
    sort_fn: Option<SortFn>,
    fetch: &FetchOptions,
) -> Result<LogData, LogError> {
    let manifest = read_node(store, hash, MANIFEST_LINKS)
        .await
        .map_err(|e| match e {
            StoreError::Malformed { .. } => LogError::NotALog(hash.to_owned()),
            other => other.into(),
        })?;
    let manifest: JsonLog =
        serde_json::from_value(manifest).map_err(|_| LogError::NotALog(hash.to_owned()))?;

    let all = fetch_all(store, &manifest.heads, fetch).await?;
    let entries = latest(all, fetch.length, sort_fn);
    let heads = find_heads(&entries).into_iter().cloned().collect();

    tracing::debug!(log_id = %manifest.id, entries = entries.len(), "loaded log manifest");
    Ok(LogData {
        log_id: Some(manifest.id),
        entries,
        heads: Some(heads),
    })
}

/// Load the history behind one or more entry hashes.
///
/// A bounded load returns at least one entry.
///
/// # Errors
///
/// Returns any fetch error.
pub async fn from_entry_hash(
    store: &dyn BlockStore,
    hashes: &[String],
    sort_fn: Option<SortFn>,
    fetch: &FetchOptions,
) -> Result<LogData, LogError> {
    let fetch = FetchOptions {
        length: fetch.length.map(|n| n.max(1)),
        ..fetch.clone()
    };
    let all = fetch_parallel(store, hashes, &fetch).await?;
    Ok(LogData {
        log_id: None,
        entries: latest(all, fetch.length, sort_fn),
        heads: None,
    })
}

/// Load a log from its JSON description.
///
/// # Errors
///
/// Returns any fetch error.
pub async fn from_json(
    store: &dyn BlockStore,
    json: &JsonLog,
    sort_fn: Option<SortFn>,
    fetch: &FetchOptions,
) -> Result<LogData, LogError> {
    let all = fetch_parallel(store, &json.heads, fetch).await?;
    Ok(LogData {
        log_id: Some(json.id.clone()),
        entries: latest(all, fetch.length, sort_fn),
        heads: None,
    })
}

/// Load the history behind entries already in memory.
///
/// The source entries always survive the length cut: any the cut would drop
/// replace the oldest entries kept.
///
/// # Errors
///
/// Returns any fetch error.
pub async fn from_entry(
    store: &dyn BlockStore,
    sources: &[Entry],
    fetch: &FetchOptions,
) -> Result<LogData, LogError> {
    let length = fetch.length.map(|n| n.max(sources.len()));
    let hashes: Vec<String> = sources.iter().map(|e| e.hash.clone()).collect();
    let fetch = FetchOptions {
        length,
        ..fetch.clone()
    };
    let all = fetch_parallel(store, &hashes, &fetch).await?;

    let combined = sources
        .iter()
        .cloned()
        .chain(all)
        .chain(fetch.exclude.iter().cloned());
    let mut uniques = dedup(combined);
    uniques.sort_by(by_clock);

    let sliced = match length {
        Some(n) => uniques.split_off(uniques.len().saturating_sub(n)),
        None => uniques,
    };
    let missing: Vec<Entry> = dedup(
        sources
            .iter()
            .filter(|s| !sliced.iter().any(|e| e.hash == s.hash))
            .cloned(),
    );
    let skip = missing.len().min(sliced.len());
    let mut entries = missing;
    entries.extend(sliced.into_iter().skip(skip));

    Ok(LogData {
        log_id: entries.last().map(|e| e.id.clone()),
        entries,
        heads: None,
    })
}

/// Sort and keep the latest `length` entries.
fn latest(entries: Vec<Entry>, length: Option<usize>, sort_fn: Option<SortFn>) -> Vec<Entry> {
    let sort = NoZeroes::new(sort_fn.unwrap_or(last_write_wins));
    let mut entries = dedup(entries);
    entries.sort_by(|a, b| sort.compare(a, b));
    match length {
        Some(n) => entries.split_off(entries.len().saturating_sub(n)),
        None => entries,
    }
}

fn by_clock(a: &Entry, b: &Entry) -> std::cmp::Ordering {
    Entry::compare(a, b).then_with(|| a.hash.cmp(&b.hash))
}

fn dedup(entries: impl IntoIterator<Item = Entry>) -> Vec<Entry> {
    let mut seen = std::collections::HashSet::new();
    entries
        .into_iter()
        .filter(|e| seen.insert(e.hash.clone()))
        .collect()
}

impl Log {
    /// Write this log's manifest. See [`to_multihash`].
    ///
    /// # Errors
    ///
    /// Returns [`LogError::EmptyLog`] for a log without entries.
    pub async fn to_multihash(&self) -> Result<String, LogError> {
        to_multihash(self.store().as_ref(), self).await
    }

    /// Load a log from its manifest address.
    ///
    /// # Errors
    ///
    /// See [`from_multihash`].
    pub async fn from_multihash(
        store: Arc<dyn BlockStore>,
        identity: Arc<dyn IdentityProvider>,
        hash: &str,
        options: LoadOptions,
    ) -> Result<Self, LogError> {
        let data = from_multihash(store.as_ref(), hash, options.sort_fn, &options.fetch).await?;
        Self::assemble(store, identity, data, options)
    }

    /// Load a log from the history behind entry hashes.
    ///
    /// # Errors
    ///
    /// See [`from_entry_hash`].
    pub async fn from_entry_hash(
        store: Arc<dyn BlockStore>,
        identity: Arc<dyn IdentityProvider>,
        hashes: &[String],
        options: LoadOptions,
    ) -> Result<Self, LogError> {
        let data = from_entry_hash(store.as_ref(), hashes, options.sort_fn, &options.fetch).await?;
        Self::assemble(store, identity, data, options)
    }

    /// Load a log from its JSON description.
    ///
    /// # Errors
    ///
    /// See [`from_json`].
    pub async fn from_json(
        store: Arc<dyn BlockStore>,
        identity: Arc<dyn IdentityProvider>,
        json: &JsonLog,
        options: LoadOptions,
    ) -> Result<Self, LogError> {
        let data = from_json(store.as_ref(), json, options.sort_fn, &options.fetch).await?;
        Self::assemble(store, identity, data, options)
    }

    /// Load a log from the history behind in-memory entries.
    ///
    /// # Errors
    ///
    /// See [`from_entry`].
    pub async fn from_entry(
        store: Arc<dyn BlockStore>,
        identity: Arc<dyn IdentityProvider>,
        sources: &[Entry],
        options: LoadOptions,
    ) -> Result<Self, LogError> {
        let data = from_entry(store.as_ref(), sources, &options.fetch).await?;
        Self::assemble(store, identity, data, options)
    }

    fn assemble(
        store: Arc<dyn BlockStore>,
        identity: Arc<dyn IdentityProvider>,
        data: LogData,
        options: LoadOptions,
    ) -> Result<Self, LogError> {
        Self::new(
            store,
            identity,
            LogOptions {
                log_id: data.log_id.or(options.log_id),
                access: options.access,
                entries: data.entries,
                heads: data.heads,
                sort_fn: options.sort_fn,
                ..LogOptions::default()
            },
        )
    }
}
