//! Bloom filter used as the admission doorkeeper.
//!
//! The doorkeeper absorbs the first sighting of every key so that one-hit
//! wonders never reach the count-min counters. It is cleared wholesale each
//! time the sketch ages, which keeps its false-positive rate bounded.
//!
//! ## Sizing
//!
//! ```text
//!   bits   m = ceil(-n * ln(p) / ln(2)^2)   rounded up to a power of two
//!   probes k = ceil(ln(2) * m / n)          clamped to [1, 16]
//! ```
//!
//! Probe positions use double hashing over the two 32-bit halves of the
//! remixed key hash, so no extra hashing of the user key is needed.

use crate::ds::mix64;

/// Fixed-size bloom filter over pre-hashed `u64` keys.
#[derive(Debug, Clone)]
pub struct Doorkeeper {
    bits: Vec<u64>,
    mask: u64,
    probes: u32,
}

impl Doorkeeper {
    /// Creates a filter sized for `entries` keys at the given false-positive
    /// rate.
    pub fn new(entries: usize, false_positive_rate: f64) -> Self {
        let n = entries.max(1) as f64;
        let p = false_positive_rate.clamp(f64::MIN_POSITIVE, 0.5);
        let ln2 = std::f64::consts::LN_2;
        let raw_bits = (-n * p.ln() / (ln2 * ln2)).ceil() as u64;
        let num_bits = raw_bits.max(64).next_power_of_two();
        let probes = ((ln2 * num_bits as f64 / n).ceil() as u32).clamp(1, 16);
        Self {
            bits: vec![0; (num_bits / 64) as usize],
            mask: num_bits - 1,
            probes,
        }
    }

    /// Number of bits backing the filter.
    pub fn num_bits(&self) -> u64 {
        self.mask + 1
    }

    /// Number of probe positions per key.
    pub fn probes(&self) -> u32 {
        self.probes
    }

    #[inline]
    fn positions(&self, hash: u64) -> impl Iterator<Item = u64> + '_ {
        let hash = mix64(hash);
        let lo = hash as u32 as u64;
        let hi = (hash >> 32) | 1;
        (0..self.probes as u64).map(move |i| lo.wrapping_add(i.wrapping_mul(hi)) & self.mask)
    }

    #[inline]
    fn bit(&self, pos: u64) -> bool {
        self.bits[(pos >> 6) as usize] & (1u64 << (pos & 63)) != 0
    }

    /// Returns `true` if the key may have been added.
    pub fn has(&self, hash: u64) -> bool {
        self.positions(hash).all(|pos| self.bit(pos))
    }

    /// Sets the key's bits. Returns `true` if at least one bit was newly set,
    /// i.e. the key was definitely not present before.
    pub fn add_if_not_has(&mut self, hash: u64) -> bool {
        let mut added = false;
        let mask = self.mask;
        let probes = self.probes as u64;
        let hash = mix64(hash);
        let lo = hash as u32 as u64;
        let hi = (hash >> 32) | 1;
        for i in 0..probes {
            let pos = lo.wrapping_add(i.wrapping_mul(hi)) & mask;
            let word = &mut self.bits[(pos >> 6) as usize];
            let bit = 1u64 << (pos & 63);
            if *word & bit == 0 {
                *word |= bit;
                added = true;
            }
        }
        added
    }

    /// Clears every bit.
    pub fn clear(&mut self) {
        self.bits.iter_mut().for_each(|word| *word = 0);
    }
}
