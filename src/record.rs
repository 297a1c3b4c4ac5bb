//! The per-entry usage record consumed by the eviction strategy.
//!
//! Packs a 5-bit frequency power and a 27-bit logical time into a single
//! `u32`, mirroring the original `Record { freq_power_:5, time_:27 }`
//! bitfield (`mixed_lfu_lru_strategy.h`). Rust has no portable bitfield
//! syntax, so the packing is done explicitly with shifts and masks.

const TIME_BITS: u32 = 27;
const TIME_MASK: u32 = (1 << TIME_BITS) - 1;
pub const MAX_FREQ_POWER: u8 = 31;

/// A packed `{freq_power: 5 bits, time: 27 bits}` usage record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageRecord(u32);

impl UsageRecord {
    pub fn new(freq_power: u8, time: u32) -> Self {
        debug_assert!(freq_power <= MAX_FREQ_POWER);
        Self(((freq_power as u32) << TIME_BITS) | (time & TIME_MASK))
    }

    pub fn freq_power(self) -> u8 {
        (self.0 >> TIME_BITS) as u8
    }

    pub fn time(self) -> u32 {
        self.0 & TIME_MASK
    }

    /// Raw packed representation, for storage in a map/bucket slot.
    pub fn into_raw(self) -> u32 {
        self.0
    }

    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Ordering used for eviction ranking: coldest frequency first, then
    /// oldest time to break ties.
    pub fn eviction_key(self) -> (u8, u32) {
        (self.freq_power(), self.time())
    }
}
