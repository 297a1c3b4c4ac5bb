//! Single-shard map contract shared by the naive (open) and bucketed
//! (cacheline) layouts.

mod bucketed;
mod naive;

pub use bucketed::BucketedMap;
pub use naive::NaiveMap;

use crate::record::UsageRecord;

/// Collapses the `filter`/`update`/`fetch` callback set into one structured
/// value instead of passing each as its own parameter. Every call site in
/// this crate uses the same fixed set of callbacks, so a generic
/// higher-order-parameter `Transform` is not justified; a `dyn Fn` admit
/// context is.
pub struct AdmitContext<'a> {
    /// Returns whether this map should process a given global ID. Identity
    /// (`|_| true`) for single-shard use; `|g| g % t == shard_index` when
    /// dispatched by the sharded composite.
    pub filter: &'a dyn Fn(u64) -> bool,
    /// Stamps a usage record on every touch (hit or miss).
    pub touch: &'a dyn Fn(Option<UsageRecord>) -> UsageRecord,
    /// Notified with `(global_id, slot)` for every newly-admitted ID.
    pub on_fetch: &'a dyn Fn(u64, u32),
}

impl<'a> AdmitContext<'a> {
    /// An admit context with no sharding: every ID is processed.
    ///
    /// There is no separate slot-remapping callback here: every
    /// `ShardMap::new` already takes the shard's slot offset directly
    /// (`naive.rs`/`bucketed.rs` add it when reporting a slot), so a
    /// remapping callback would always be the identity function in this
    /// crate — folded away rather than carried as a no-op.
    pub fn direct(
        touch: &'a dyn Fn(Option<UsageRecord>) -> UsageRecord,
        on_fetch: &'a dyn Fn(u64, u32),
    ) -> Self {
        Self {
            filter: &|_| true,
            touch,
            on_fetch,
        }
    }
}

/// Contract shared by [`NaiveMap`] and [`BucketedMap`].
pub trait ShardMap {
    /// Creates a shard with `capacity` slots, reporting slots offset by
    /// `slot_offset` (the sharded composite's `b_i`).
    fn new(capacity: u32, slot_offset: u32) -> Self
    where
        Self: Sized;

    /// Processes `globals[i]` into `slots_out[i]` for every index passing
    /// `ctx.filter`, stopping early if the underlying bitmap fills up.
    /// Returns the count of successfully processed entries.
    fn transform(&mut self, globals: &[u64], slots_out: &mut [u64], ctx: &AdmitContext) -> usize;

    /// Removes each present global ID and frees its slot.
    fn evict(&mut self, globals: &[u64]);

    /// Enumerates every live `(global_id, slot, record)` triple, in
    /// unspecified order. Slots are already offset by `slot_offset`.
    fn iterate(&self) -> Vec<(u64, u32, UsageRecord)>;

    fn len(&self) -> usize;

    fn capacity(&self) -> u32;

    fn slot_offset(&self) -> u32;
}
