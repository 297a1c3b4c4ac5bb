//! Random-bit stream used to approximate logarithmic frequency counting.
//!
//! Maintains a buffer of uniformly random 64-bit words and a
//! `(word_index, bit_index)` cursor. `is_next_n_bits_all_zero` advances the
//! cursor by `n` bits and reports whether every one of them was zero,
//! refilling synchronously from a seeded PRNG when the buffer runs out.
//! There is no background refill thread: a synchronous refill keeps
//! behavior deterministic under test without the complexity of a
//! background scanner task.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

const WORDS_PER_REFILL: usize = 8;
const BITS_PER_WORD: u32 = 64;

/// Per-strategy random-bit stream. Not shared across strategies.
pub struct RandomBitsGenerator {
    rng: StdRng,
    buffer: Vec<u64>,
    word_idx: usize,
    bit_idx: u32,
}

impl RandomBitsGenerator {
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    pub fn from_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(mut rng: StdRng) -> Self {
        let buffer = Self::fill(&mut rng);
        Self {
            rng,
            buffer,
            word_idx: 0,
            bit_idx: 0,
        }
    }

    fn fill(rng: &mut StdRng) -> Vec<u64> {
        (0..WORDS_PER_REFILL).map(|_| rng.next_u64()).collect()
    }

    /// Advances the cursor by `n_bits` and returns whether every advanced
    /// bit was zero. `n_bits` is expected to be small (`<= 31`, since it is
    /// driven by a 5-bit frequency power).
    pub fn is_next_n_bits_all_zero(&mut self, mut n_bits: u16) -> bool {
        let mut all_zero = true;
        while n_bits > 0 {
            if self.word_idx >= self.buffer.len() {
                self.buffer = Self::fill(&mut self.rng);
                self.word_idx = 0;
                self.bit_idx = 0;
            }

            let word = self.buffer[self.word_idx];
            let remaining_in_word = BITS_PER_WORD - self.bit_idx;
            let take = remaining_in_word.min(n_bits as u32);

            let mask = if take == BITS_PER_WORD {
                u64::MAX
            } else {
                ((1u64 << take) - 1) << self.bit_idx
            };
            if word & mask != 0 {
                all_zero = false;
            }

            self.bit_idx += take;
            if self.bit_idx >= BITS_PER_WORD {
                self.bit_idx = 0;
                self.word_idx += 1;
            }
            n_bits -= take as u16;
        }
        all_zero
    }

}

impl Default for RandomBitsGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_bits_requested_is_vacuously_true() {
        let mut g = RandomBitsGenerator::from_seed(1);
        assert!(g.is_next_n_bits_all_zero(0));
    }

    #[test]
    fn refills_synchronously_past_buffer_end() {
        let mut g = RandomBitsGenerator::from_seed(42);
        // Drain well past one buffer's worth of bits (8 words * 64 bits).
        for _ in 0..20 {
            g.is_next_n_bits_all_zero(31);
        }
        // Must not panic and must still produce a bool.
        let _ = g.is_next_n_bits_all_zero(5);
    }

    #[test]
    fn deterministic_given_a_fixed_seed() {
        let mut a = RandomBitsGenerator::from_seed(7);
        let mut b = RandomBitsGenerator::from_seed(7);
        for _ in 0..50 {
            assert_eq!(a.is_next_n_bits_all_zero(3), b.is_next_n_bits_all_zero(3));
        }
    }
}
