//! Lamport clock carried by every entry.
//!
//! A clock is a `(replica id, logical time)` pair. Clocks order entries
//! causally: an entry's time is always greater than the time of every head
//! it was appended on top of. Concurrent entries that reach the same time are
//! ordered by replica id, so every observer agrees on the order.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Logical clock of a log replica.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LamportClock {
    /// Replica id, the public key of the writing identity.
    pub id: String,
    /// Logical time, starting at 0 for an empty log.
    pub time: u64,
}

impl LamportClock {
    /// Create a clock at the given time.
    #[must_use]
    pub fn new(id: impl Into<String>, time: u64) -> Self {
        Self {
            id: id.into(),
            time,
        }
    }

    /// Advance the clock by one tick and return the new value.
    pub fn tick(&mut self) -> Self {
        self.time += 1;
        self.clone()
    }

    /// Adopt the later of the two times, keeping this clock's id.
    pub fn merge(&mut self, other: &Self) -> &mut Self {
        self.time = self.time.max(other.time);
        self
    }

    /// Compare by time, then by id lexicographically.
    #[must_use]
    pub fn compare(a: &Self, b: &Self) -> Ordering {
        a.time.cmp(&b.time).then_with(|| a.id.cmp(&b.id))
    }
}

impl PartialOrd for LamportClock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LamportClock {
    fn cmp(&self, other: &Self) -> Ordering {
        Self::compare(self, other)
    }
}
