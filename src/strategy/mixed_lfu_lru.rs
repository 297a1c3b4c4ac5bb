//! Mixed LFU/LRU eviction strategy.
//!
//! Evicts infrequently-used entries first, then falls back to least-recent
//! usage to break ties. Frequency is tracked as a power of two: a
//! `freq_power` of `p` means "touched roughly `2^p` times". Promoting `p` by
//! one is realized probabilistically with probability `2^-p`, checked by
//! drawing `p` bits from a [`RandomBitsGenerator`] and testing they are all
//! zero — this approximates logarithmic counting in O(1) amortized time
//! instead of keeping an exact counter.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use super::Strategy;
use crate::record::{UsageRecord, MAX_FREQ_POWER};
use crate::random_bits::RandomBitsGenerator;

const DEFAULT_MIN_FREQ_POWER: u8 = 5;
const TIME_BITS: u32 = 27;
const TIME_MASK: u32 = (1 << TIME_BITS) - 1;

/// Mixed LFU/LRU strategy. `time` is an owned atomic cell with a single
/// writer (the façade, once per batch) and many readers (the shard tasks
/// stamping records).
pub struct MixedLfuLruStrategy {
    min_freq_power: u8,
    time: AtomicU32,
    // The random-bit generator is inherently stateful/sequential per touch;
    // a strategy is shared read-mostly across shard tasks, so its one
    // mutable piece of state is guarded rather than duplicated per shard.
    generator: Mutex<RandomBitsGenerator>,
}

impl MixedLfuLruStrategy {
    pub fn new(min_used_freq_power: u16) -> Self {
        Self {
            min_freq_power: min_used_freq_power.min(MAX_FREQ_POWER as u16) as u8,
            time: AtomicU32::new(0),
            generator: Mutex::new(RandomBitsGenerator::new()),
        }
    }
}

impl Default for MixedLfuLruStrategy {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_FREQ_POWER as u16)
    }
}

impl Strategy for MixedLfuLruStrategy {
    fn update_time(&self, time: u32) {
        self.time.store(time & TIME_MASK, Ordering::Relaxed);
    }

    fn touch(&self, prev: Option<UsageRecord>) -> UsageRecord {
        let time = self.time.load(Ordering::Relaxed);
        let p = prev.map(|r| r.freq_power()).unwrap_or(self.min_freq_power);

        let promoted = if p >= MAX_FREQ_POWER {
            false
        } else {
            let mut gen = self.generator.lock().unwrap();
            gen.is_next_n_bits_all_zero(p as u16)
        };

        let new_power = if promoted { p + 1 } else { p };
        UsageRecord::new(new_power, time)
    }

    fn rank_for_eviction(
        &self,
        items: impl Iterator<Item = (u64, UsageRecord)>,
        k: usize,
    ) -> Vec<u64> {
        if k == 0 {
            return Vec::new();
        }

        // Bounded partial selection: keep the k coldest seen so far, in
        // ascending (freq_power, time) order, stable on insertion order for
        // ties.
        let mut coldest: Vec<(u8, u32, u64)> = Vec::with_capacity(k);
        for (global_id, record) in items {
            let (freq_power, time) = record.eviction_key();
            let entry = (freq_power, time, global_id);
            if coldest.len() < k {
                coldest.push(entry);
                if coldest.len() == k {
                    coldest.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
                }
                continue;
            }
            let worst = coldest[k - 1];
            if (entry.0, entry.1) < (worst.0, worst.1) {
                coldest[k - 1] = entry;
                coldest.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
            }
        }
        if coldest.len() < k {
            coldest.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        }
        coldest.into_iter().map(|(_, _, id)| id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_starts_at_min_freq_power() {
        let s = MixedLfuLruStrategy::new(5);
        s.update_time(10);
        let r = s.touch(None);
        assert_eq!(r.freq_power(), 5);
        assert_eq!(r.time(), 10);
    }

    #[test]
    fn freq_power_is_monotone_non_decreasing() {
        let s = MixedLfuLruStrategy::new(0);
        s.update_time(1);
        let mut prev = s.touch(None);
        for _ in 0..2000 {
            let next = s.touch(Some(prev));
            assert!(next.freq_power() >= prev.freq_power());
            prev = next;
        }
    }

    #[test]
    fn freq_power_never_exceeds_max() {
        let s = MixedLfuLruStrategy::new(31);
        s.update_time(0);
        let mut r = s.touch(None);
        for _ in 0..100 {
            r = s.touch(Some(r));
            assert_eq!(r.freq_power(), MAX_FREQ_POWER);
        }
    }

    #[test]
    fn update_time_truncates_to_27_bits() {
        let s = MixedLfuLruStrategy::default();
        s.update_time(u32::MAX);
        let r = s.touch(None);
        assert_eq!(r.time(), TIME_MASK);
    }

    #[test]
    fn ranks_coldest_first_by_freq_then_time() {
        let s = MixedLfuLruStrategy::default();
        let items = vec![
            (1u64, UsageRecord::new(5, 100)),
            (2u64, UsageRecord::new(1, 50)),
            (3u64, UsageRecord::new(1, 10)),
            (4u64, UsageRecord::new(3, 0)),
        ];
        let victims = s.rank_for_eviction(items.into_iter(), 2);
        assert_eq!(victims, vec![3, 2]);
    }

    #[test]
    fn rank_zero_returns_empty() {
        let s = MixedLfuLruStrategy::default();
        let items = vec![(1u64, UsageRecord::new(1, 1))];
        assert!(s.rank_for_eviction(items.into_iter(), 0).is_empty());
    }
}
