use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use weft_core::config::WeftConfig;
use weft_core::sorting::SortFn;
use weft_core::{
    BlockStore, Ed25519Identity, Entry, FetchOptions, LoadOptions, Log, LogError, LogOptions,
};

/// Stable index of a replica within a run.
pub type ReplicaId = usize;

/// Observable state of a replica at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaState {
    pub id: ReplicaId,
    /// Entry hashes in log order.
    pub values: Vec<String>,
    pub heads: Vec<String>,
    pub clock_time: u64,
    pub len: usize,
}

/// One writer: a log with its own seeded identity over the shared store.
#[derive(Debug, Clone)]
pub struct SimulatedReplica {
    id: ReplicaId,
    log: Log,
    fetch: FetchOptions,
    sort_fn: SortFn,
    appended: u64,
    published: u64,
}

impl SimulatedReplica {
    /// # Errors
    ///
    /// Returns an error if the log cannot be constructed.
    pub fn new(
        id: ReplicaId,
        seed: u64,
        store: Arc<dyn BlockStore>,
        log_id: &str,
        config: &WeftConfig,
    ) -> Result<Self, LogError> {
        let identity = Arc::new(Ed25519Identity::from_seed(
            format!("replica-{id}"),
            identity_seed(seed, id),
        ));
        let sort_fn = config.sort_fn();
        let options = LogOptions {
            sort_fn: Some(sort_fn),
            concurrency: Some(config.join.concurrency),
            ..LogOptions::with_id(log_id)
        };
        let log = Log::new(store, identity, options)?;
        Ok(Self {
            id,
            log,
            fetch: config.fetch_options(),
            sort_fn,
            appended: 0,
            published: 0,
        })
    }

    #[must_use]
    pub const fn id(&self) -> ReplicaId {
        self.id
    }

    #[must_use]
    pub const fn log(&self) -> &Log {
        &self.log
    }

    /// Append this replica's next payload.
    ///
    /// # Errors
    ///
    /// Returns any append error.
    pub async fn append(&mut self, pointer_count: usize) -> Result<Entry, LogError> {
        let payload = json!({ "replica": self.id, "seq": self.appended });
        let entry = self.log.append(payload, pointer_count).await?;
        self.appended += 1;
        Ok(entry)
    }

    /// Write the manifest peers will fetch from.
    ///
    /// # Errors
    ///
    /// Returns any store error.
    pub async fn publish(&mut self) -> Result<(String, u64), LogError> {
        let manifest = self.log.to_multihash().await?;
        let seq = self.published;
        self.published += 1;
        Ok((manifest, seq))
    }

    /// Load a peer's manifest, skipping entries already held, and join it.
    ///
    /// Returns how many entries were new.
    ///
    /// # Errors
    ///
    /// Returns any load or join error.
    pub async fn receive(&mut self, manifest: &str) -> Result<usize, LogError> {
        let options = LoadOptions {
            sort_fn: Some(self.sort_fn),
            fetch: FetchOptions {
                exclude: self.log.values().into_iter().cloned().collect(),
                ..self.fetch.clone()
            },
            ..LoadOptions::default()
        };
        let delta = Log::from_multihash(
            Arc::clone(self.log.store()),
            Arc::clone(self.log.identity()),
            manifest,
            options,
        )
        .await?;
        self.join(&delta).await
    }

    /// Join another log directly, returning how many entries were new.
    ///
    /// # Errors
    ///
    /// Returns any join error.
    pub async fn join(&mut self, other: &Log) -> Result<usize, LogError> {
        let before = self.log.len();
        self.log.join(other, None).await?;
        Ok(self.log.len() - before)
    }

    #[must_use]
    pub fn snapshot(&self) -> ReplicaState {
        ReplicaState {
            id: self.id,
            values: self.log.values().iter().map(|e| e.hash.clone()).collect(),
            heads: self.log.heads().iter().map(|e| e.hash.clone()).collect(),
            clock_time: self.log.clock().time,
            len: self.log.len(),
        }
    }
}

fn identity_seed(seed: u64, id: ReplicaId) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&seed.to_le_bytes());
    bytes[8..16].copy_from_slice(&u64::try_from(id).unwrap_or(u64::MAX).to_le_bytes());
    bytes[16] = 0x5E;
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::MemoryStore;

    fn pair() -> (SimulatedReplica, SimulatedReplica) {
        let store: Arc<dyn BlockStore> = Arc::new(MemoryStore::new());
        (
            SimulatedReplica::new(0, 11, Arc::clone(&store), "sim", &WeftConfig::default())
                .expect("replica"),
            SimulatedReplica::new(1, 11, store, "sim", &WeftConfig::default()).expect("replica"),
        )
    }

    #[test]
    fn identities_differ_per_replica() {
        assert_ne!(identity_seed(1, 0), identity_seed(1, 1));
        assert_ne!(identity_seed(1, 0), identity_seed(2, 0));
    }

    #[tokio::test]
    async fn receive_merges_only_new_entries() {
        let (mut a, mut b) = pair();
        a.append(1).await.expect("append");
        a.append(1).await.expect("append");
        let (manifest, seq) = a.publish().await.expect("publish");
        assert_eq!(seq, 0);

        assert_eq!(b.receive(&manifest).await.expect("receive"), 2);
        assert_eq!(b.receive(&manifest).await.expect("receive again"), 0);
        assert_eq!(b.snapshot().values, a.snapshot().values);
    }

    #[tokio::test]
    async fn configured_replicas_exchange_manifests() {
        let mut config = WeftConfig::default();
        config.log.sort = weft_core::sorting::ENTRY_HASH.into();
        config.fetch.concurrency = 1;
        config.join.concurrency = 1;

        let store: Arc<dyn BlockStore> = Arc::new(MemoryStore::new());
        let mut a = SimulatedReplica::new(0, 3, Arc::clone(&store), "sim", &config).expect("replica");
        let mut b = SimulatedReplica::new(1, 3, store, "sim", &config).expect("replica");
        for _ in 0..3 {
            a.append(2).await.expect("append");
            b.append(2).await.expect("append");
        }
        let (manifest, _) = a.publish().await.expect("publish");
        assert_eq!(b.receive(&manifest).await.expect("receive"), 3);
        let (manifest, _) = b.publish().await.expect("publish");
        assert_eq!(a.receive(&manifest).await.expect("receive"), 3);
        assert_eq!(a.snapshot().values, b.snapshot().values);
    }

    #[tokio::test]
    async fn snapshot_reports_log_state() {
        let (mut a, _) = pair();
        let entry = a.append(2).await.expect("append");
        let state = a.snapshot();
        assert_eq!(state.id, 0);
        assert_eq!(state.len, 1);
        assert_eq!(state.heads, vec![entry.hash]);
        assert_eq!(state.clock_time, 1);
    }
}
