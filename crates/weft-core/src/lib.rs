//! weft-core library.
//!
//! A conflict-free replicated append-only log built over a content-addressed
//! Merkle DAG. Replicas append signed entries locally and reconcile by
//! joining each other's DAGs; replicas that have seen the same entries
//! materialize the same ordered sequence.
//!
//! ```ignore
//! let store: Arc<dyn BlockStore> = Arc::new(MemoryStore::new());
//! let identity = Arc::new(Ed25519Identity::from_seed("alice", seed));
//! let mut log = Log::new(store, identity, LogOptions::with_id("chat"))?;
//! log.append(json!("hello"), 1).await?;
//! let manifest = log.to_multihash().await?;
//! ```
//!
//! # Conventions
//!
//! - **Errors**: library functions return [`error::LogError`]; `anyhow` is
//!   used only for config file loading.
//! - **Logging**: `tracing` macros (`warn!`, `debug!`, `trace!`).

pub mod access;
pub mod clock;
pub mod config;
pub mod entry;
pub mod entry_index;
pub mod entry_io;
pub mod error;
pub mod gset;
pub mod identity;
pub mod log;
pub mod log_io;
pub mod sorting;
pub mod store;

pub use access::{AccessController, AllowAll, WriteList};
pub use clock::LamportClock;
pub use entry::Entry;
pub use entry_io::FetchOptions;
pub use error::{ErrorCode, LogError};
pub use gset::GSet;
pub use identity::{Ed25519Identity, Identity, IdentityProvider};
pub use log::{Log, LogOptions};
pub use log_io::LoadOptions;
pub use store::{BlockStore, MemoryStore};
