//! Oldest-first, size-accumulating eviction.
//!
//! Walks the entries from oldest to newest keeping a running total. Whenever
//! the total goes over budget, the oldest retained entries are dropped until
//! the total fits again, but never the entry just added. The newest entry is
//! therefore always kept, even when it alone is larger than the budget.

use crate::models::MediaEntry;

/// Byte ceiling for one retention scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionBudget(pub u64);

impl RetentionBudget {
    #[must_use]
    pub const fn bytes(self) -> u64 {
        self.0
    }
}

/// Evictions for plain media entries, weighted by their own size.
#[must_use]
pub fn select_evictions(entries: &[MediaEntry], budget: RetentionBudget) -> Vec<&MediaEntry> {
    select_evictions_by(entries, budget, |e| (e.timestamp(), e.size))
}

/// `key` yields `(timestamp, weight)`. Equal timestamps keep input order.
/// Returns the evicted items oldest-first.
pub fn select_evictions_by<T, F>(items: &[T], budget: RetentionBudget, key: F) -> Vec<&T>
where
    F: Fn(&T) -> (i64, u64),
{
    let mut ordered: Vec<(i64, u64, &T)> = items
        .iter()
        .map(|item| {
            let (timestamp, weight) = key(item);
            (timestamp, weight, item)
        })
        .collect();
    ordered.sort_by_key(|(timestamp, _, _)| *timestamp);

    let limit = budget.bytes();
    let mut total: u64 = 0;
    let mut evict_upto = 0;

    for (index, (_, weight, _)) in ordered.iter().enumerate() {
        total = total.saturating_add(*weight);
        // entries before `index` are older; `index` itself always stays
        while total > limit && evict_upto < index {
            total -= ordered[evict_upto].1;
            evict_upto += 1;
        }
    }

    ordered[..evict_upto]
        .iter()
        .map(|(_, _, item)| *item)
        .collect()
}
