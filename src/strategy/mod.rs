//! Eviction strategy: the record type an admit call stamps on every touch,
//! and the ranking used to pick victims.

mod mixed_lfu_lru;

pub use mixed_lfu_lru::MixedLfuLruStrategy;

use crate::record::UsageRecord;

/// An eviction strategy: owns the logical clock and ranks victims.
/// Implemented once per strategy type rather than passed around as a
/// generic closure at every call site.
pub trait Strategy: Send + Sync {
    /// Sets the strategy's logical clock. Called once per batch, before any
    /// shard task starts, so every touch in the batch observes the same
    /// time value. Single-writer; safe to call concurrently with readers.
    fn update_time(&self, time: u32);

    /// Stamps a usage record on a touch (admit-hit, admit-miss, or explicit
    /// refresh). `prev` is `None` on first admission.
    fn touch(&self, prev: Option<UsageRecord>) -> UsageRecord;

    /// Returns the `k` global IDs whose records rank lowest under this
    /// strategy's eviction ordering (coldest first). `items` need not be
    /// materialized into a `Vec` by the caller; a bounded partial selection
    /// over the iterator is sufficient and is what every implementation
    /// does.
    fn rank_for_eviction(
        &self,
        items: impl Iterator<Item = (u64, UsageRecord)>,
        k: usize,
    ) -> Vec<u64>;
}
