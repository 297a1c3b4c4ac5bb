//! Naive (open) single-shard map: a flat hash map from global ID to
//! `(slot, record)`, backed by a [`Bitmap`] for slot allocation.

use std::collections::HashMap;

use super::{AdmitContext, ShardMap};
use crate::bitmap::Bitmap;
use crate::record::UsageRecord;

struct Cell {
    slot: u32,
    record: UsageRecord,
}

pub struct NaiveMap {
    bitmap: Bitmap,
    table: HashMap<u64, Cell>,
    slot_offset: u32,
}

impl ShardMap for NaiveMap {
    fn new(capacity: u32, slot_offset: u32) -> Self {
        Self {
            bitmap: Bitmap::new(capacity),
            table: HashMap::new(),
            slot_offset,
        }
    }

    fn transform(&mut self, globals: &[u64], slots_out: &mut [u64], ctx: &AdmitContext) -> usize {
        debug_assert_eq!(globals.len(), slots_out.len());
        let mut processed = 0;

        for i in 0..globals.len() {
            let global_id = globals[i];
            if !(ctx.filter)(global_id) {
                continue;
            }

            if let Some(cell) = self.table.get_mut(&global_id) {
                let reported = cell.slot + self.slot_offset;
                cell.record = (ctx.touch)(Some(cell.record));
                slots_out[i] = reported as u64;
                processed += 1;
                continue;
            }

            if self.bitmap.full() {
                break;
            }

            let slot = self.bitmap.next_free();
            let reported = slot + self.slot_offset;
            let record = (ctx.touch)(None);
            self.table.insert(global_id, Cell { slot, record });
            (ctx.on_fetch)(global_id, reported);
            slots_out[i] = reported as u64;
            processed += 1;
        }

        processed
    }

    fn evict(&mut self, globals: &[u64]) {
        for &global_id in globals {
            if let Some(cell) = self.table.remove(&global_id) {
                self.bitmap.free(cell.slot);
            }
        }
    }

    fn iterate(&self) -> Vec<(u64, u32, UsageRecord)> {
        self.table
            .iter()
            .map(|(&global_id, cell)| (global_id, cell.slot + self.slot_offset, cell.record))
            .collect()
    }

    fn len(&self) -> usize {
        self.table.len()
    }

    fn capacity(&self) -> u32 {
        self.bitmap.capacity()
    }

    fn slot_offset(&self) -> u32 {
        self.slot_offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::UsageRecord;

    fn noop_touch(prev: Option<UsageRecord>) -> UsageRecord {
        prev.unwrap_or_else(|| UsageRecord::new(5, 0))
    }

    fn ctx<'a>(touch: &'a dyn Fn(Option<UsageRecord>) -> UsageRecord, fetch: &'a dyn Fn(u64, u32)) -> AdmitContext<'a> {
        AdmitContext::direct(touch, fetch)
    }

    #[test]
    fn s1_basic_admit_and_reuse() {
        let mut m = NaiveMap::new(16, 3);
        let globals = [100u64, 101, 100, 102, 101];
        let mut slots = vec![0u64; 5];
        let c = ctx(&noop_touch, &|_, _| {});
        let processed = m.transform(&globals, &mut slots, &c);
        assert_eq!(processed, 5);
        assert_eq!(slots, vec![3, 4, 3, 5, 4]);
    }

    #[test]
    fn s2_filter_skips_positions() {
        let mut m = NaiveMap::new(16, 3);
        let globals = [100u64, 101, 100, 102, 101];
        let mut slots = vec![99u64; 5]; // sentinel for "unwritten"
        let filter = |g: u64| g % 2 == 0;
        let c = AdmitContext {
            filter: &filter,
            touch: &noop_touch,
            on_fetch: &|_, _| {},
        };
        let processed = m.transform(&globals, &mut slots, &c);
        assert_eq!(processed, 3);
        assert_eq!(slots, vec![3, 99, 3, 4, 99]);
    }

    #[test]
    fn s3_full_stops_and_reports_partial() {
        let mut m = NaiveMap::new(4, 3);
        let globals = [100u64, 101, 102, 103, 104];
        let mut slots = vec![0u64; 5];
        let c = ctx(&noop_touch, &|_, _| {});
        let processed = m.transform(&globals, &mut slots, &c);
        assert_eq!(processed, 4);
        assert_eq!(&slots[0..4], &[3, 4, 5, 6]);
    }

    #[test]
    fn s4_evict_then_readmit_compacts() {
        let mut m = NaiveMap::new(4, 3);
        let globals = [100u64, 101, 102, 103, 104];
        let mut slots = vec![0u64; 5];
        let c = ctx(&noop_touch, &|_, _| {});
        m.transform(&globals, &mut slots, &c);

        m.evict(&[100, 102]);

        let globals2 = [101u64, 102, 103, 104];
        let mut slots2 = vec![0u64; 4];
        let processed = m.transform(&globals2, &mut slots2, &c);
        assert_eq!(processed, 4);
        assert_eq!(slots2, vec![4, 3, 6, 5]);
    }

    #[test]
    fn transform_is_idempotent_on_steady_state() {
        let mut m = NaiveMap::new(16, 0);
        let globals = [1u64, 2, 3];
        let mut slots_a = vec![0u64; 3];
        let c = ctx(&noop_touch, &|_, _| {});
        m.transform(&globals, &mut slots_a, &c);

        let mut slots_b = vec![0u64; 3];
        m.transform(&globals, &mut slots_b, &c);
        assert_eq!(slots_a, slots_b);
    }

    #[test]
    fn iterate_yields_every_live_entry_once() {
        let mut m = NaiveMap::new(16, 0);
        let globals = [1u64, 2, 3, 2];
        let mut slots = vec![0u64; 4];
        let c = ctx(&noop_touch, &|_, _| {});
        m.transform(&globals, &mut slots, &c);

        let mut ids: Vec<u64> = m.iterate().into_iter().map(|(g, _, _)| g).collect();
        ids.sort();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
