//! Batch façade: the single entry point a host model runtime calls to turn
//! raw global IDs into cache slots.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{Result, TransformerError};
use crate::record::UsageRecord;
use crate::sharded::Toucher;
use crate::strategy::{MixedLfuLruStrategy, Strategy};
use crate::variant::IdTransformerVariant;

#[derive(Debug)]
pub struct TransformOutcome {
    pub ok: bool,
    pub ids_to_fetch: Vec<(u64, u32)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictedEntry {
    pub global_id: u64,
    pub slot: u32,
}

pub struct IDTransformer {
    strategy: Arc<MixedLfuLruStrategy>,
    variant: IdTransformerVariant,
}

impl IDTransformer {
    pub fn new(num_embeddings: u32, config: &Config) -> Result<Self> {
        let strategy = Arc::new(config.strategy());
        let variant = config.build_transformer(num_embeddings)?;
        Ok(Self { strategy, variant })
    }

    fn toucher(&self) -> Toucher {
        let strategy = Arc::clone(&self.strategy);
        Arc::new(move |prev: Option<UsageRecord>| strategy.touch(prev))
    }

    pub fn len(&self) -> usize {
        self.variant.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variant.is_empty()
    }

    pub fn capacity(&self) -> u32 {
        self.variant.capacity()
    }

    /// `globals`/`slots_out` are parallel lists of equal-length batches.
    /// Every batch is processed through the same logical time, set once
    /// before any batch runs.
    pub fn transform(
        &mut self,
        globals: &[Vec<u64>],
        slots_out: &mut [Vec<u64>],
        logical_time: i64,
    ) -> Result<TransformOutcome> {
        if logical_time < 0 {
            return Err(TransformerError::PreconditionViolated(format!(
                "logical_time must be non-negative, got {logical_time}"
            )));
        }
        if globals.len() != slots_out.len() {
            return Err(TransformerError::PreconditionViolated(format!(
                "global batch count ({}) does not match slot-output batch count ({})",
                globals.len(),
                slots_out.len()
            )));
        }
        for (i, (g, s)) in globals.iter().zip(slots_out.iter()).enumerate() {
            if g.len() != s.len() {
                return Err(TransformerError::PreconditionViolated(format!(
                    "batch {i} has {} global ids but {} slot outputs",
                    g.len(),
                    s.len()
                )));
            }
        }

        self.strategy.update_time(logical_time as u32);
        let touch = self.toucher();

        let mut total_processed = 0;
        let mut total_numel = 0;
        let mut ids_to_fetch = Vec::new();

        for (batch_globals, batch_slots) in globals.iter().zip(slots_out.iter_mut()) {
            total_numel += batch_globals.len();
            let (processed, fetches) = self
                .variant
                .transform(batch_globals, batch_slots, Arc::clone(&touch));
            total_processed += processed;
            ids_to_fetch.extend(fetches);
        }

        Ok(TransformOutcome {
            ok: total_processed == total_numel,
            ids_to_fetch,
        })
    }

    /// Picks the `k` coldest global IDs under the configured strategy,
    /// evicts them, and reports `(global_id, slot)` pairs with the slot as
    /// observed *before* eviction.
    ///
    /// `k` is a `usize` rather than a signed count, so a negative count is
    /// ruled out by the type system rather than checked for at runtime.
    pub fn evict(&mut self, k: usize) -> Vec<EvictedEntry> {
        let live = self.variant.iterate();
        let victims = self
            .strategy
            .rank_for_eviction(live.iter().map(|&(g, _, r)| (g, r)), k);

        let slot_of: HashMap<u64, u32> = live.into_iter().map(|(g, s, _)| (g, s)).collect();
        let entries: Vec<EvictedEntry> = victims
            .iter()
            .filter_map(|&g| slot_of.get(&g).map(|&slot| EvictedEntry { global_id: g, slot }))
            .collect();

        self.variant.evict(&victims);
        entries
    }
}
