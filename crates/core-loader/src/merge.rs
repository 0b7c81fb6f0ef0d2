//! Order-preserving, identity-keyed merge of incoming pages.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::Ordering;

use ahash::AHashSet;
use core_events::DUPLICATES_DROPPED;

/// A record with a stable identity used for de-duplication.
pub trait Keyed {
    type Key: Eq + Hash + Clone + Debug + Send + Sync;

    fn key(&self) -> Self::Key;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeReport {
    pub fetched: usize,
    pub appended: usize,
    pub duplicates: usize,
}

/// Append every incoming item whose key is not in `seen`, in order. The first
/// occurrence wins, so duplicates inside `incoming` itself are dropped too.
pub fn merge_unique<T: Keyed>(
    items: &mut Vec<T>,
    seen: &mut AHashSet<T::Key>,
    incoming: impl IntoIterator<Item = T>,
) -> MergeReport {
    let mut report = MergeReport::default();
    for item in incoming {
        report.fetched += 1;
        if seen.insert(item.key()) {
            items.push(item);
            report.appended += 1;
        } else {
            report.duplicates += 1;
        }
    }
    if report.duplicates > 0 {
        DUPLICATES_DROPPED.fetch_add(report.duplicates as u64, Ordering::Relaxed);
    }
    report
}
