//! Stress test generator
//!
//! While enabled, every target request is redirected to a pseudo-random
//! index of the segment. The sequence is reproducible from its seed.

use core::ops::RangeInclusive;

/// Seed used when zero is requested; xorshift never leaves zero
const FALLBACK_SEED: u64 = 0x9E37_79B9_7F4A_7C15;

/// Xorshift64 index generator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StressGenerator {
    state: u64,
    enabled: bool,
}

impl Default for StressGenerator {
    fn default() -> Self {
        Self {
            state: FALLBACK_SEED,
            enabled: false,
        }
    }
}

impl StressGenerator {
    /// Enable or disable, reseeding on enable
    pub fn set(&mut self, enabled: bool, seed: u64) {
        self.enabled = enabled;
        if enabled {
            self.state = if seed == 0 { FALLBACK_SEED } else { seed };
        }
    }

    /// Whether stress testing is on
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Next index within `range`
    pub fn next_idx(&mut self, range: RangeInclusive<usize>) -> usize {
        let (start, end) = (*range.start(), *range.end());
        if end <= start {
            return start;
        }
        let span = (end - start + 1) as u64;
        start + (self.next_u64() % span) as usize
    }
}
