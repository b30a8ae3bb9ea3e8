//! Total-order comparators over entries.
//!
//! Replicas must agree on the order of entries they both hold, no matter how
//! the entries arrived. Every comparator here is a pure function of the two
//! entries' clocks and hashes, so any replica holding both entries reaches
//! the same answer.
//!
//! Comparators are built from a primary rule plus a *resolver* that decides
//! ties. [`NoZeroes`] is the last line: when a comparator still reports
//! [`Ordering::Equal`] for two distinct entries it falls back to hash order,
//! making the result a strict total order.

use std::cmp::Ordering;
use std::fmt;

use crate::clock::LamportClock;
use crate::entry::Entry;

/// A comparator or tie resolver over entries.
pub type SortFn = fn(&Entry, &Entry) -> Ordering;

/// Config name of [`last_write_wins`].
pub const LAST_WRITE_WINS: &str = "last-write-wins";

/// Config name of [`sort_by_entry_hash`].
pub const ENTRY_HASH: &str = "entry-hash";

/// Compare clocks; on a tie, defer to `resolve`.
#[must_use]
pub fn sort_by_clocks(a: &Entry, b: &Entry, resolve: SortFn) -> Ordering {
    match LamportClock::compare(&a.clock, &b.clock) {
        Ordering::Equal => resolve(a, b),
        diff => diff,
    }
}

/// Compare clock ids; on a tie, defer to `resolve`.
#[must_use]
pub fn sort_by_clock_id(a: &Entry, b: &Entry, resolve: SortFn) -> Ordering {
    match a.clock.id.cmp(&b.clock.id) {
        Ordering::Equal => resolve(a, b),
        diff => diff,
    }
}

/// Resolver with no preference.
#[must_use]
pub const fn first(_a: &Entry, _b: &Entry) -> Ordering {
    Ordering::Equal
}

/// Default order: later clock wins, ties broken by hash.
#[must_use]
pub fn last_write_wins(a: &Entry, b: &Entry) -> Ordering {
    sort_by_clocks(a, b, by_hash)
}

/// Clock order with ties broken by hash in descending order.
#[must_use]
pub fn sort_by_entry_hash(a: &Entry, b: &Entry) -> Ordering {
    sort_by_clocks(a, b, |a, b| b.hash.cmp(&a.hash))
}

/// Look up a comparator by its config name.
#[must_use]
pub fn by_name(name: &str) -> Option<SortFn> {
    match name {
        LAST_WRITE_WINS => Some(last_write_wins),
        ENTRY_HASH => Some(sort_by_entry_hash),
        _ => None,
    }
}

fn by_hash(a: &Entry, b: &Entry) -> Ordering {
    a.hash.cmp(&b.hash)
}

/// Wraps a comparator so it never reports two distinct entries as equal.
#[derive(Clone, Copy)]
pub struct NoZeroes(SortFn);

impl NoZeroes {
    /// Wrap `sort_fn`.
    #[must_use]
    pub const fn new(sort_fn: SortFn) -> Self {
        Self(sort_fn)
    }

    /// The wrapped comparator.
    #[must_use]
    pub const fn inner(&self) -> SortFn {
        self.0
    }

    /// Compare with the wrapped comparator, falling back to hash order.
    #[must_use]
    pub fn compare(&self, a: &Entry, b: &Entry) -> Ordering {
        match (self.0)(a, b) {
            Ordering::Equal => by_hash(a, b),
            ord => ord,
        }
    }
}

impl Default for NoZeroes {
    fn default() -> Self {
        Self(last_write_wins)
    }
}

impl fmt::Debug for NoZeroes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NoZeroes").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::entry::ENTRY_VERSION;
    use crate::identity::Identity;

    fn entry(hash: &str, clock_id: &str, time: u64) -> Entry {
        Entry {
            hash: hash.into(),
            id: "log".into(),
            payload: Value::Null,
            next: vec![],
            refs: vec![],
            v: ENTRY_VERSION,
            clock: LamportClock::new(clock_id, time),
            key: clock_id.into(),
            identity: Identity {
                id: clock_id.into(),
                public_key: clock_id.into(),
                kind: "test".into(),
            },
            sig: String::new(),
        }
    }

    #[test]
    fn later_time_wins() {
        let a = entry("h1", "z", 1);
        let b = entry("h2", "a", 2);
        assert_eq!(last_write_wins(&a, &b), Ordering::Less);
        assert_eq!(last_write_wins(&b, &a), Ordering::Greater);
    }

    #[test]
    fn concurrent_ties_break_on_clock_id() {
        let a = entry("h9", "a", 3);
        let b = entry("h1", "b", 3);
        assert_eq!(last_write_wins(&a, &b), Ordering::Less);
    }

    #[test]
    fn identical_clocks_break_on_hash() {
        let a = entry("h1", "a", 3);
        let b = entry("h2", "a", 3);
        assert_eq!(last_write_wins(&a, &b), Ordering::Less);
        assert_eq!(sort_by_entry_hash(&a, &b), Ordering::Greater);
    }

    #[test]
    fn clock_id_order_with_resolver() {
        let a = entry("h1", "a", 9);
        let b = entry("h2", "b", 1);
        assert_eq!(sort_by_clock_id(&a, &b, first), Ordering::Less);
        let c = entry("h3", "a", 1);
        assert_eq!(sort_by_clock_id(&a, &c, first), Ordering::Equal);
    }

    #[test]
    fn no_zeroes_is_strict() {
        let cmp = NoZeroes::new(|a, b| sort_by_clocks(a, b, first));
        let a = entry("h1", "a", 3);
        let b = entry("h2", "a", 3);
        assert_eq!(cmp.compare(&a, &b), Ordering::Less);
        assert_eq!(cmp.compare(&b, &a), Ordering::Greater);
    }

    #[test]
    fn names_resolve() {
        assert!(by_name(LAST_WRITE_WINS).is_some());
        assert!(by_name(ENTRY_HASH).is_some());
        assert!(by_name("random").is_none());
    }
}
