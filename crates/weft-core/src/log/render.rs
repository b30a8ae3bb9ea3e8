//! Serialized and textual views of a log.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entry::Entry;
use crate::error::LogError;
use crate::identity::IdentityProvider;
use crate::store::BlockStore;

use super::{Log, LogOptions};

/// Compact log description: the id and head addresses, latest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonLog {
    pub id: String,
    pub heads: Vec<String>,
}

/// Full log description carrying every entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub heads: Vec<Entry>,
    pub values: Vec<Entry>,
}

impl Log {
    #[must_use]
    pub fn to_json(&self) -> JsonLog {
        JsonLog {
            id: self.id.clone(),
            heads: self.heads().into_iter().map(|e| e.hash.clone()).collect(),
        }
    }

    #[must_use]
    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            id: self.id.clone(),
            heads: self.heads().into_iter().cloned().collect(),
            values: self.values().into_iter().cloned().collect(),
        }
    }

    /// JSON bytes of [`Log::to_json`].
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Serialization`] if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, LogError> {
        Ok(serde_json::to_vec(&self.to_json())?)
    }

    /// Rebuild a log from a full snapshot without touching the store.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Validation`] if the snapshot's heads are not among
    /// its values.
    pub fn from_snapshot(
        store: Arc<dyn BlockStore>,
        identity: Arc<dyn IdentityProvider>,
        snapshot: Snapshot,
        options: LogOptions,
    ) -> Result<Self, LogError> {
        Self::new(
            store,
            identity,
            LogOptions {
                log_id: Some(snapshot.id),
                entries: snapshot.values,
                heads: Some(snapshot.heads),
                ..options
            },
        )
    }

    /// Render the log newest first, one line per entry.
    ///
    /// Each line is indented by the length of the entry's chain of children
    /// and prefixed with `└─` when it has any.
    ///
    /// ```text
    /// two
    /// └─one
    /// ```
    pub fn render(&self, payload: impl Fn(&Value) -> String) -> String {
        let values: Vec<Entry> = self.values().into_iter().cloned().collect();
        values
            .iter()
            .rev()
            .map(|entry| {
                let depth = Entry::find_children(entry, &values).len();
                let mut line = "  ".repeat(depth.saturating_sub(1));
                if depth > 0 {
                    line.push_str("└─");
                }
                line.push_str(&payload(&entry.payload));
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for Log {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.render(|payload| {
            payload
                .as_str()
                .map_or_else(|| payload.to_string(), str::to_owned)
        });
        f.write_str(&text)
    }
}
