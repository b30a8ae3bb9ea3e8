//! Ordered traversal and frontier queries.
//!
//! [`Log::traverse`] walks the DAG backwards from a set of roots. The next
//! entry visited is always the greatest pending one under the log's
//! comparator, not the one discovered first, so the visiting order depends
//! only on which entries are present and never on how the graph was built.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use crate::entry::Entry;
use crate::sorting::NoZeroes;

use super::Log;

/// A pending entry ranked by the log's comparator.
struct Ranked<'a> {
    entry: &'a Entry,
    sort: NoZeroes,
}

impl PartialEq for Ranked<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked<'_> {}

impl PartialOrd for Ranked<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort.compare(self.entry, other.entry)
    }
}

impl Log {
    /// Walk backwards from `roots`, greatest entry first.
    ///
    /// Stops after `amount` entries, when `end_hash` has been visited, or
    /// when every reachable entry has been visited. Parents are resolved
    /// through this log's index; parents it does not hold end that branch.
    #[must_use]
    pub fn traverse<'a>(
        &'a self,
        roots: &[&'a Entry],
        amount: Option<usize>,
        end_hash: Option<&str>,
    ) -> Vec<&'a Entry> {
        let mut pending = BinaryHeap::with_capacity(roots.len());
        let mut visited: HashSet<&str> = HashSet::with_capacity(roots.len());
        for &root in roots {
            if visited.insert(root.hash.as_str()) {
                pending.push(Ranked {
                    entry: root,
                    sort: self.sort,
                });
            }
        }

        let mut result = Vec::new();
        while amount.is_none_or(|n| result.len() < n) {
            let Some(Ranked { entry, .. }) = pending.pop() else {
                break;
            };
            result.push(entry);
            if end_hash == Some(entry.hash.as_str()) {
                break;
            }

            for next in &entry.next {
                if let Some(parent) = self.get(next) {
                    if visited.insert(parent.hash.as_str()) {
                        pending.push(Ranked {
                            entry: parent,
                            sort: self.sort,
                        });
                    }
                }
            }
        }
        tracing::trace!(roots = roots.len(), visited = result.len(), "traversed log");
        result
    }

    /// All entries, oldest first.
    #[must_use]
    pub fn values(&self) -> Vec<&Entry> {
        let mut values = self.traverse(&self.heads(), None, None);
        values.reverse();
        values
    }

    /// Current heads, greatest first.
    #[must_use]
    pub fn heads(&self) -> Vec<&Entry> {
        let mut heads: Vec<&Entry> = self.heads_index.values().collect();
        heads.sort_by(|a, b| self.sort.compare(b, a));
        heads
    }

    /// Entries whose parents are not all held, plus roots.
    #[must_use]
    pub fn tails(&self) -> Vec<&Entry> {
        find_tails(self.values())
    }

    /// Parent hashes referenced by held entries but not held.
    #[must_use]
    pub fn tail_hashes(&self) -> Vec<String> {
        find_tail_hashes(self.values())
    }
}

/// Entries not referenced by another entry's `next`, by clock id descending.
pub fn find_heads<'a>(entries: impl IntoIterator<Item = &'a Entry>) -> Vec<&'a Entry> {
    let entries: Vec<&Entry> = entries.into_iter().collect();
    let referenced: HashSet<&str> = entries
        .iter()
        .flat_map(|e| e.next.iter().map(String::as_str))
        .collect();

    let mut heads: Vec<&Entry> = entries
        .into_iter()
        .filter(|e| !referenced.contains(e.hash.as_str()))
        .collect();
    heads.sort_by(|a, b| b.clock.id.cmp(&a.clock.id).then_with(|| a.hash.cmp(&b.hash)));
    heads.dedup_by(|a, b| a.hash == b.hash);
    heads
}

/// Entries with a `next` outside the set, plus entries with no `next`.
///
/// Sorted by clock.
pub fn find_tails<'a>(entries: impl IntoIterator<Item = &'a Entry>) -> Vec<&'a Entry> {
    let entries: Vec<&Entry> = entries.into_iter().collect();
    let held: HashSet<&str> = entries.iter().map(|e| e.hash.as_str()).collect();

    let mut seen = HashSet::new();
    let mut tails: Vec<&Entry> = entries
        .into_iter()
        .filter(|e| e.next.is_empty() || e.next.iter().any(|n| !held.contains(n.as_str())))
        .filter(|e| seen.insert(e.hash.as_str()))
        .collect();
    tails.sort_by(|a, b| Entry::compare(a, b));
    tails
}

/// Hashes referenced by `next` that are missing from the set.
///
/// Later entries' missing parents come first.
pub fn find_tail_hashes<'a>(entries: impl IntoIterator<Item = &'a Entry>) -> Vec<String> {
    let entries: Vec<&Entry> = entries.into_iter().collect();
    let held: HashSet<&str> = entries.iter().map(|e| e.hash.as_str()).collect();

    let mut hashes: Vec<String> = Vec::new();
    for entry in entries.iter().rev() {
        for next in &entry.next {
            if !held.contains(next.as_str()) && !hashes.contains(next) {
                hashes.push(next.clone());
            }
        }
    }
    hashes
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{Value, json};

    use super::*;
    use crate::clock::LamportClock;
    use crate::identity::{Ed25519Identity, Identity};
    use crate::log::LogOptions;
    use crate::store::MemoryStore;

    fn entry(hash: &str, clock_id: &str, time: u64, next: &[&str]) -> Entry {
        Entry {
            hash: hash.into(),
            id: "log".into(),
            payload: Value::from(hash),
            next: next.iter().map(|s| (*s).to_owned()).collect(),
            refs: vec![],
            v: 2,
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

    fn hashes(entries: &[&Entry]) -> Vec<String> {
        entries.iter().map(|e| e.hash.clone()).collect()
    }

    /// Two branches off one root:
    ///
    /// ```text
    /// a1 <- a2 <- a3
    ///   \
    ///    b2 <- b3
    /// ```
    fn forked() -> Vec<Entry> {
        vec![
            entry("a1", "A", 1, &[]),
            entry("a2", "A", 2, &["a1"]),
            entry("a3", "A", 3, &["a2"]),
            entry("b2", "B", 2, &["a1"]),
            entry("b3", "B", 3, &["b2"]),
        ]
    }

    fn log_of(entries: Vec<Entry>) -> Log {
        let options = LogOptions {
            log_id: Some("log".into()),
            entries,
            ..LogOptions::default()
        };
        Log::new(
            Arc::new(MemoryStore::new()),
            Arc::new(Ed25519Identity::from_seed("t", [4; 32])),
            options,
        )
        .expect("log")
    }

    #[test]
    fn traverse_interleaves_by_clock() {
        let log = log_of(forked());
        let order = hashes(&log.traverse(&log.heads(), None, None));
        assert_eq!(order, vec!["b3", "a3", "b2", "a2", "a1"]);
    }

    #[test]
    fn traverse_is_independent_of_insertion_order() {
        let mut reversed = forked();
        reversed.reverse();
        let a = log_of(forked());
        let b = log_of(reversed);
        assert_eq!(hashes(&a.values()), hashes(&b.values()));
    }

    #[test]
    fn traverse_honors_amount_and_end_hash() {
        let log = log_of(forked());
        let heads = log.heads();
        assert_eq!(hashes(&log.traverse(&heads, Some(2), None)), vec!["b3", "a3"]);
        assert!(log.traverse(&heads, Some(0), None).is_empty());
        assert_eq!(
            hashes(&log.traverse(&heads, None, Some("b2"))),
            vec!["b3", "a3", "b2"]
        );
    }

    #[test]
    fn shared_root_visited_once() {
        let log = log_of(forked());
        let values = log.values();
        assert_eq!(values.len(), 5);
        assert_eq!(values[0].hash, "a1");
    }

    #[test]
    fn heads_sorted_greatest_first() {
        let log = log_of(forked());
        assert_eq!(hashes(&log.heads()), vec!["b3", "a3"]);
    }

    #[test]
    fn find_heads_orders_by_clock_id_descending() {
        let entries = forked();
        let heads = find_heads(&entries);
        assert_eq!(hashes(&heads), vec!["b3", "a3"]);
    }

    #[test]
    fn tails_of_partial_log() {
        let entries = forked();
        let partial: Vec<&Entry> = entries.iter().filter(|e| e.hash != "a1").collect();
        let tails = find_tails(partial.iter().copied());
        assert_eq!(hashes(&tails), vec!["a2", "b2"]);
        assert_eq!(find_tail_hashes(partial), vec!["a1".to_owned()]);
    }

    #[test]
    fn tails_of_full_log_is_root() {
        let log = log_of(forked());
        assert_eq!(hashes(&log.tails()), vec!["a1"]);
        assert!(log.tail_hashes().is_empty());
    }

    #[test]
    fn missing_parents_end_branch() {
        let log = log_of(vec![entry("x2", "A", 2, &["x1"]), entry("x3", "A", 3, &["x2"])]);
        assert_eq!(hashes(&log.values()), vec!["x2", "x3"]);
        assert_eq!(log.tail_hashes(), vec!["x1".to_owned()]);
        assert_eq!(log.get("x2").map(|e| e.payload.clone()), Some(json!("x2")));
    }
}
