//! Range iteration over a log.
//!
//! Bounds are applied independently. The upper bound (`lte` or `lt`) picks
//! where the walk starts, the lower bound (`gte` or `gt`) picks where it
//! stops. Entries are yielded in traversal order, newest first.

use crate::entry::Entry;
use crate::error::LogError;

use super::Log;

/// An upper iteration bound: one entry hash, or a set of entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bound {
    Hash(String),
    Entries(Vec<Entry>),
}

impl From<&str> for Bound {
    fn from(hash: &str) -> Self {
        Self::Hash(hash.to_owned())
    }
}

impl From<String> for Bound {
    fn from(hash: String) -> Self {
        Self::Hash(hash)
    }
}

impl From<Vec<Entry>> for Bound {
    fn from(entries: Vec<Entry>) -> Self {
        Self::Entries(entries)
    }
}

/// Options for [`Log::iterator`].
///
/// When both inclusive and exclusive forms of a bound are set, the
/// inclusive one wins.
#[derive(Debug, Clone, Default)]
pub struct IteratorOptions {
    /// Stop before this entry.
    pub gt: Option<String>,
    /// Stop at this entry.
    pub gte: Option<String>,
    /// Start below this bound.
    pub lt: Option<Bound>,
    /// Start at this bound.
    pub lte: Option<Bound>,
    /// Window size. Counted from the lower bound when one is set, from the
    /// start of the walk otherwise.
    pub amount: Option<usize>,
}

/// One-shot iterator over a log range.
#[derive(Debug)]
pub struct LogIter<'a> {
    inner: std::vec::IntoIter<&'a Entry>,
}

impl<'a> Iterator for LogIter<'a> {
    type Item = &'a Entry;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for LogIter<'_> {}

impl Log {
    /// Iterate over the entries between the given bounds.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::InvalidBound`] if a bound names an entry this log
    /// does not hold.
    pub fn iterator(&self, options: &IteratorOptions) -> Result<LogIter<'_>, LogError> {
        if options.amount == Some(0) {
            return Ok(LogIter {
                inner: Vec::new().into_iter(),
            });
        }

        let start = match (&options.lte, &options.lt) {
            (Some(lte), _) => self.resolve_upper(lte, true)?,
            (None, Some(lt)) => self.resolve_upper(lt, false)?,
            (None, None) => self.heads(),
        };

        let (end_hash, exclusive) = match (&options.gte, &options.gt) {
            (Some(gte), _) => (Some(self.resolve_lower(gte)?), false),
            (None, Some(gt)) => (Some(self.resolve_lower(gt)?), true),
            (None, None) => (None, false),
        };

        let count = if end_hash.is_some() { None } else { options.amount };
        let mut entries = self.traverse(&start, count, end_hash);

        // An unreachable lower bound leaves the walk untrimmed.
        if exclusive && entries.last().map(|e| e.hash.as_str()) == end_hash {
            entries.pop();
        }
        if end_hash.is_some() {
            if let Some(amount) = options.amount {
                let skip = entries.len().saturating_sub(amount);
                entries.drain(..skip);
            }
        }

        Ok(LogIter {
            inner: entries.into_iter(),
        })
    }

    fn resolve_upper(&self, bound: &Bound, inclusive: bool) -> Result<Vec<&Entry>, LogError> {
        let anchors: Vec<&Entry> = match bound {
            Bound::Hash(hash) => vec![self.known(hash)?],
            Bound::Entries(entries) => entries
                .iter()
                .map(|e| self.known(&e.hash))
                .collect::<Result<_, _>>()?,
        };
        if inclusive {
            return Ok(anchors);
        }
        Ok(anchors
            .iter()
            .flat_map(|e| e.next.iter().filter_map(|n| self.get(n)))
            .collect())
    }

    fn resolve_lower(&self, hash: &str) -> Result<&str, LogError> {
        Ok(self.known(hash)?.hash.as_str())
    }

    fn known(&self, hash: &str) -> Result<&Entry, LogError> {
        self.get(hash)
            .ok_or_else(|| LogError::InvalidBound(hash.to_owned()))
    }
}
