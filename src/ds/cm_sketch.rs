//! Count-min sketch with 4-bit saturating counters.
//!
//! ## Architecture
//!
//! ```text
//!   hash ──┬── mix(hash ^ seed[0]) & mask ──► row 0  [n n n n n n ...]  (two counters per byte)
//!          ├── mix(hash ^ seed[1]) & mask ──► row 1  [n n n n n n ...]
//!          ├── mix(hash ^ seed[2]) & mask ──► row 2  [n n n n n n ...]
//!          └── mix(hash ^ seed[3]) & mask ──► row 3  [n n n n n n ...]
//!
//!   estimate = min(row0[i0], row1[i1], row2[i2], row3[i3])
//! ```
//!
//! Counters live in nibbles and saturate at 15. `reset` halves every counter
//! in place with a single shift-and-mask per byte; the mask keeps bits from
//! bleeding across the nibble boundary.
//!
//! Row seeds are drawn from a caller-supplied RNG so two sketches built from
//! the same seed behave identically.

use rand::Rng;

use crate::ds::mix64;

/// Number of independent rows.
pub const CM_DEPTH: usize = 4;

/// Largest value a single counter can hold.
pub const MAX_COUNT: u8 = 15;

const RESET_MASK: u8 = 0x77;

#[derive(Debug, Clone)]
struct CmRow(Vec<u8>);

impl CmRow {
    fn new(num_counters: usize) -> Self {
        Self(vec![0; num_counters / 2])
    }

    #[inline]
    fn get(&self, n: usize) -> u8 {
        (self.0[n / 2] >> ((n & 1) * 4)) & 0x0f
    }

    #[inline]
    fn increment(&mut self, n: usize) {
        let i = n / 2;
        let shift = (n & 1) * 4;
        let value = (self.0[i] >> shift) & 0x0f;
        if value < MAX_COUNT {
            self.0[i] += 1 << shift;
        }
    }

    fn reset(&mut self) {
        for byte in self.0.iter_mut() {
            *byte = (*byte >> 1) & RESET_MASK;
        }
    }

    fn clear(&mut self) {
        self.0.iter_mut().for_each(|byte| *byte = 0);
    }
}

/// Approximate frequency counter over pre-hashed `u64` keys.
#[derive(Debug, Clone)]
pub struct CountMinSketch {
    rows: [CmRow; CM_DEPTH],
    seeds: [u64; CM_DEPTH],
    mask: u64,
}

impl CountMinSketch {
    /// Creates a sketch with `num_counters` counters per row, rounded up to
    /// the next power of two (minimum 2).
    pub fn new<R: Rng + ?Sized>(num_counters: usize, rng: &mut R) -> Self {
        let num_counters = num_counters.max(2).next_power_of_two();
        let seeds = std::array::from_fn(|_| rng.gen::<u64>());
        Self {
            rows: std::array::from_fn(|_| CmRow::new(num_counters)),
            seeds,
            mask: (num_counters - 1) as u64,
        }
    }

    /// Counters per row.
    pub fn width(&self) -> usize {
        self.mask as usize + 1
    }

    #[inline]
    fn index(&self, hash: u64, row: usize) -> usize {
        (mix64(hash ^ self.seeds[row]) & self.mask) as usize
    }

    /// Bumps the key's counter in every row.
    pub fn increment(&mut self, hash: u64) {
        for row in 0..CM_DEPTH {
            let idx = self.index(hash, row);
            self.rows[row].increment(idx);
        }
    }

    /// Returns the minimum counter across rows.
    pub fn estimate(&self, hash: u64) -> i64 {
        (0..CM_DEPTH)
            .map(|row| self.rows[row].get(self.index(hash, row)))
            .min()
            .unwrap_or(0) as i64
    }

    /// Halves every counter.
    pub fn reset(&mut self) {
        self.rows.iter_mut().for_each(CmRow::reset);
    }

    /// Zeroes every counter.
    pub fn clear(&mut self) {
        self.rows.iter_mut().for_each(CmRow::clear);
    }
}
