//! Runtime-selected transformer backend.
//!
//! Picking naive-vs-cacheline and single-vs-sharded at compile time would
//! need template-style metaprogramming Rust doesn't have; a tagged enum
//! over the four `{naive, cacheline} x {direct, sharded}` combinations,
//! matched in every method, is the idiomatic replacement for a closed set
//! of known layout shapes.

use std::cell::RefCell;
use std::convert::TryFrom;

use crate::error::TransformerError;
use crate::map::{AdmitContext, BucketedMap, NaiveMap, ShardMap};
use crate::record::UsageRecord;
use crate::sharded::{ShardedComposite, Toucher};

/// The single-shard layout named by `id_transformer.underlying` in config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Underlying {
    Naive,
    Cacheline,
}

impl TryFrom<&str> for Underlying {
    type Error = TransformerError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "naive" => Ok(Underlying::Naive),
            "cacheline" => Ok(Underlying::Cacheline),
            other => Err(TransformerError::ConfigInvalid(format!(
                "unknown id_transformer.underlying {other:?}, expected \"naive\" or \"cacheline\""
            ))),
        }
    }
}

pub enum IdTransformerVariant {
    Naive(NaiveMap),
    NaiveSharded(ShardedComposite<NaiveMap>),
    Bucketed(BucketedMap),
    BucketedSharded(ShardedComposite<BucketedMap>),
}

impl IdTransformerVariant {
    pub fn new(underlying: Underlying, num_embeddings: u32, num_threads: usize) -> Self {
        match (underlying, num_threads) {
            (Underlying::Naive, 1) => IdTransformerVariant::Naive(NaiveMap::new(num_embeddings, 0)),
            (Underlying::Naive, t) => {
                IdTransformerVariant::NaiveSharded(ShardedComposite::new(num_embeddings, t))
            }
            (Underlying::Cacheline, 1) => {
                IdTransformerVariant::Bucketed(BucketedMap::new(num_embeddings, 0))
            }
            (Underlying::Cacheline, t) => {
                IdTransformerVariant::BucketedSharded(ShardedComposite::new(num_embeddings, t))
            }
        }
    }

    pub fn transform(
        &mut self,
        globals: &[u64],
        slots_out: &mut [u64],
        touch: Toucher,
    ) -> (usize, Vec<(u64, u32)>) {
        match self {
            IdTransformerVariant::Naive(m) => direct_transform(m, globals, slots_out, touch),
            IdTransformerVariant::Bucketed(m) => direct_transform(m, globals, slots_out, touch),
            IdTransformerVariant::NaiveSharded(c) => c.transform(globals, slots_out, touch),
            IdTransformerVariant::BucketedSharded(c) => c.transform(globals, slots_out, touch),
        }
    }

    pub fn evict(&mut self, globals: &[u64]) {
        match self {
            IdTransformerVariant::Naive(m) => m.evict(globals),
            IdTransformerVariant::Bucketed(m) => m.evict(globals),
            IdTransformerVariant::NaiveSharded(c) => c.evict(globals),
            IdTransformerVariant::BucketedSharded(c) => c.evict(globals),
        }
    }

    pub fn iterate(&self) -> Vec<(u64, u32, UsageRecord)> {
        match self {
            IdTransformerVariant::Naive(m) => m.iterate(),
            IdTransformerVariant::Bucketed(m) => m.iterate(),
            IdTransformerVariant::NaiveSharded(c) => c.iterate(),
            IdTransformerVariant::BucketedSharded(c) => c.iterate(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            IdTransformerVariant::Naive(m) => m.len(),
            IdTransformerVariant::Bucketed(m) => m.len(),
            IdTransformerVariant::NaiveSharded(c) => c.len(),
            IdTransformerVariant::BucketedSharded(c) => c.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> u32 {
        match self {
            IdTransformerVariant::Naive(m) => m.capacity(),
            IdTransformerVariant::Bucketed(m) => m.capacity(),
            IdTransformerVariant::NaiveSharded(c) => c.capacity(),
            IdTransformerVariant::BucketedSharded(c) => c.capacity(),
        }
    }
}

/// Runs one [`ShardMap::transform`] call through the same `Toucher` contract
/// the sharded composite uses, so both paths look identical to the façade.
fn direct_transform<M: ShardMap>(
    m: &mut M,
    globals: &[u64],
    slots_out: &mut [u64],
    touch: Toucher,
) -> (usize, Vec<(u64, u32)>) {
    let fetches = RefCell::new(Vec::new());
    let touch_fn = |prev: Option<UsageRecord>| (*touch)(prev);
    let on_fetch = |g: u64, s: u32| fetches.borrow_mut().push((g, s));
    let ctx = AdmitContext::direct(&touch_fn, &on_fetch);
    let processed = m.transform(globals, slots_out, &ctx);
    (processed, fetches.into_inner())
}
