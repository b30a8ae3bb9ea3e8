//! Write-access policy.
//!
//! Every entry is checked against an [`AccessController`] before it becomes
//! part of a log, both when appended locally and when received through a
//! join. The controller sees the full entry, so a policy may look at the
//! author's key or the payload itself. An entry's `identity.id` is chosen by
//! its writer and is not covered by the signature, so it is never a basis
//! for granting access.

use std::collections::HashSet;

use crate::entry::Entry;
use crate::identity::{Identity, IdentityProvider};

/// Wildcard that grants write access to every identity.
pub const ANY_WRITER: &str = "*";

/// Decides whether an entry may be written to a log.
#[async_trait::async_trait]
pub trait AccessController: Send + Sync {
    /// Return `true` if `entry` may be added to the log.
    async fn can_append(&self, entry: &Entry, identity_provider: &dyn IdentityProvider) -> bool;
}

/// Accepts every entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait::async_trait]
impl AccessController for AllowAll {
    async fn can_append(&self, _entry: &Entry, _identity_provider: &dyn IdentityProvider) -> bool {
        true
    }
}

/// Accepts entries signed by a public key on a fixed list.
///
/// ```ignore
/// let mut access = WriteList::new([bob_public_key.as_str()]);
/// access.grant_identity(alice.identity());
/// ```
#[derive(Debug, Clone, Default)]
pub struct WriteList {
    writers: HashSet<String>,
}

impl WriteList {
    /// Create a list from hex public keys. `"*"` allows anyone.
    pub fn new<I, S>(writers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            writers: writers.into_iter().map(Into::into).collect(),
        }
    }

    /// Add one public key to the list.
    pub fn grant(&mut self, writer: impl Into<String>) {
        self.writers.insert(writer.into());
    }

    /// Add the public key of `identity`.
    pub fn grant_identity(&mut self, identity: &Identity) {
        self.grant(identity.public_key.clone());
    }

    fn allows(&self, entry: &Entry) -> bool {
        self.writers.contains(ANY_WRITER)
            || (entry.key == entry.identity.public_key && self.writers.contains(&entry.key))
    }
}

#[async_trait::async_trait]
impl AccessController for WriteList {
    async fn can_append(&self, entry: &Entry, _identity_provider: &dyn IdentityProvider) -> bool {
        self.allows(entry)
    }
}
