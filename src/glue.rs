//! Parameter-server fetch/evict glue.
//!
//! Given a `(global_id, slot)` list from the core, pulls or pushes
//! embedding rows through a [`BackingStore`], pipelined in bounded chunks,
//! with an explicit per-batch completion notification rather than an
//! implicit one.
//!
//! The accelerator-resident embedding tensor itself is out of scope here;
//! this module treats each `(column, optimizer_state)` cell of a row as one
//! opaque byte buffer rather than modeling a real tensor layout.

use std::sync::Arc;

use crate::backing_store::BackingStore;
use crate::error::TransformerError;

fn key(prefix: &str, table: u32, global_id: u64, column: usize, optimizer_state: usize) -> String {
    format!("{prefix}_table_{table}_gid_{global_id}_cid_{column}_osid_{optimizer_state}")
}

/// A fetched row: `payload[column][optimizer_state]`, where
/// `optimizer_state == 0` is the weight itself and `1..=num_optimizer_states`
/// are optimizer moment buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedRow {
    pub global_id: u64,
    pub slot: u32,
    pub payload: Vec<Vec<Vec<u8>>>,
}

#[derive(Debug, Clone)]
pub struct GlueConfig {
    pub prefix: String,
    pub table: u32,
    pub num_columns: usize,
    pub num_optimizer_states: usize,
    pub base_chunk_size: usize,
    pub reinit: bool,
    pub w_min: f32,
    pub w_max: f32,
}

impl GlueConfig {
    /// Base chunk size divided by the per-id key fan-out, capping how many
    /// keys a single pipelined batch issues per task.
    pub fn chunk_size(&self) -> usize {
        let fan_out = self.num_columns.max(1) * self.num_optimizer_states.max(1);
        (self.base_chunk_size / fan_out).max(1)
    }
}

pub struct ParamServerGlue<S> {
    store: Arc<S>,
    cfg: GlueConfig,
}

// Derived `Clone` would require `S: Clone`, which the store type itself
// has no reason to implement — only the `Arc` handle is ever cloned.
impl<S> Clone for ParamServerGlue<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            cfg: self.cfg.clone(),
        }
    }
}

impl<S: BackingStore + Send + Sync + 'static> ParamServerGlue<S> {
    pub fn new(store: Arc<S>, cfg: GlueConfig) -> Self {
        Self { store, cfg }
    }

    /// Pulls every `(global_id, slot)`'s row, pipelined in chunks of
    /// [`GlueConfig::chunk_size`], blocking the caller on an explicit
    /// notification signaled once the last chunk's replies are in.
    pub async fn fetch(&self, ids: &[(u64, u32)]) -> Result<Vec<FetchedRow>, TransformerError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let worker = self.clone();
        let ids = ids.to_vec();

        tokio::spawn(async move {
            let result = worker.pipelined_fetch(&ids).await;
            let _ = tx.send(result);
        });

        rx.await.map_err(|_| {
            TransformerError::BackingStoreUnavailable("fetch completion notification was dropped".to_string())
        })?
    }

    async fn pipelined_fetch(&self, ids: &[(u64, u32)]) -> Result<Vec<FetchedRow>, TransformerError> {
        let chunk_size = self.cfg.chunk_size();
        let mut rows = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(chunk_size) {
            let futs = chunk.iter().map(|&(global_id, slot)| self.fetch_one(global_id, slot));
            let chunk_rows = futures::future::try_join_all(futs).await?;
            rows.extend(chunk_rows);
        }
        Ok(rows)
    }

    async fn fetch_one(&self, global_id: u64, slot: u32) -> Result<FetchedRow, TransformerError> {
        let columns = self.cfg.num_columns.max(1);
        let mut payload = Vec::with_capacity(columns);
        for c in 0..columns {
            let mut states = Vec::with_capacity(self.cfg.num_optimizer_states + 1);
            for o in 0..=self.cfg.num_optimizer_states {
                let k = key(&self.cfg.prefix, self.cfg.table, global_id, c, o);
                let bytes = self.store.get(&k).await?;
                let bytes = match bytes {
                    Some(b) => b,
                    None if o == 0 && self.cfg.reinit => reinit_weight(self.cfg.w_min, self.cfg.w_max),
                    None => 0f32.to_le_bytes().to_vec(),
                };
                states.push(bytes);
            }
            payload.push(states);
        }
        Ok(FetchedRow { global_id, slot, payload })
    }

    /// Serializes each row's tensor cells into one contiguous buffer with a
    /// per-entry offset table, then issues pipelined writes, one key per
    /// table entry, chunked the same way as `fetch`.
    pub async fn evict(&self, rows: &[(u64, Vec<Vec<Vec<u8>>>)]) -> Result<(), TransformerError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let worker = self.clone();
        let rows = rows.to_vec();

        tokio::spawn(async move {
            let result = worker.pipelined_evict(&rows).await;
            let _ = tx.send(result);
        });

        rx.await.map_err(|_| {
            TransformerError::BackingStoreUnavailable("evict completion notification was dropped".to_string())
        })?
    }

    async fn pipelined_evict(&self, rows: &[(u64, Vec<Vec<Vec<u8>>>)]) -> Result<(), TransformerError> {
        let chunk_size = self.cfg.chunk_size();
        for chunk in rows.chunks(chunk_size) {
            let futs = chunk.iter().map(|(global_id, payload)| self.evict_one(*global_id, payload));
            futures::future::try_join_all(futs).await?;
        }
        Ok(())
    }

    async fn evict_one(&self, global_id: u64, payload: &[Vec<Vec<u8>>]) -> Result<(), TransformerError> {
        let (buf, offsets) = pack(payload);
        for (column, optimizer_state, offset, len) in offsets {
            let bytes = buf[offset..offset + len].to_vec();
            let k = key(&self.cfg.prefix, self.cfg.table, global_id, column, optimizer_state);
            self.store.put(k, bytes).await?;
        }
        Ok(())
    }
}

fn reinit_weight(w_min: f32, w_max: f32) -> Vec<u8> {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let (lo, hi) = if w_min <= w_max { (w_min, w_max) } else { (w_max, w_min) };
    let w: f32 = if lo < hi { rng.gen_range(lo..hi) } else { lo };
    w.to_le_bytes().to_vec()
}

/// Packs `payload[column][optimizer_state]` into one contiguous buffer and
/// records each cell's `(column, optimizer_state, offset, len)`.
fn pack(payload: &[Vec<Vec<u8>>]) -> (Vec<u8>, Vec<(usize, usize, usize, usize)>) {
    let mut buf = Vec::new();
    let mut offsets = Vec::new();
    for (c, states) in payload.iter().enumerate() {
        for (o, bytes) in states.iter().enumerate() {
            offsets.push((c, o, buf.len(), bytes.len()));
            buf.extend_from_slice(bytes);
        }
    }
    (buf, offsets)
}
