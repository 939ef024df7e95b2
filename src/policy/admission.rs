//! TinyLFU admission estimator.
//!
//! ## Architecture
//!
//! ```text
//!   increment(h)
//!        │
//!        ▼
//!   ┌──────────────┐  first sighting   ┌───────────────────────┐
//!   │ Doorkeeper   │ ────────────────► │ set bits, no counting │
//!   │ (bloom)      │                   └───────────────────────┘
//!   └──────┬───────┘
//!          │ seen before
//!          ▼
//!   ┌──────────────┐
//!   │ CountMin     │  4 rows × 4-bit counters, saturate at 15
//!   │ sketch       │
//!   └──────────────┘
//!
//!   every `reset_at` increments: counters >>= 1, doorkeeper cleared
//!
//!   estimate(h) = min(rows) + (doorkeeper.has(h) ? 1 : 0)
//! ```
//!
//! The doorkeeper bonus is deliberately not matched by a counter decrement:
//! a key seen once recently ranks above a key never seen at all.

use rand::Rng;

use crate::ds::{CountMinSketch, Doorkeeper};

const DOORKEEPER_FALSE_POSITIVE_RATE: f64 = 0.01;

/// Frequency sketch combining a count-min sketch and a doorkeeper.
#[derive(Debug, Clone)]
pub struct FrequencySketch {
    freq: CountMinSketch,
    door: Doorkeeper,
    incrs: u64,
    reset_at: u64,
}

impl FrequencySketch {
    /// Creates a sketch sized for `num_counters` distinct keys. Row salts are
    /// drawn from `rng`.
    pub fn new<R: Rng + ?Sized>(num_counters: usize, rng: &mut R) -> Self {
        let num_counters = num_counters.max(1);
        Self {
            freq: CountMinSketch::new(num_counters, rng),
            door: Doorkeeper::new(num_counters, DOORKEEPER_FALSE_POSITIVE_RATE),
            incrs: 0,
            reset_at: num_counters as u64,
        }
    }

    /// Records a batch of accesses.
    pub fn push(&mut self, keys: &[u64]) {
        for key in keys {
            self.increment(*key);
        }
    }

    /// Records one access.
    pub fn increment(&mut self, key: u64) {
        if !self.door.add_if_not_has(key) {
            self.freq.increment(key);
        }
        self.incrs += 1;
        if self.incrs >= self.reset_at {
            self.reset();
        }
    }

    /// Estimated access count for `key`.
    pub fn estimate(&self, key: u64) -> i64 {
        let mut hits = self.freq.estimate(key);
        if self.door.has(key) {
            hits += 1;
        }
        hits
    }

    /// Ages the sketch: halves counters and clears the doorkeeper.
    pub fn reset(&mut self) {
        self.incrs = 0;
        self.door.clear();
        self.freq.reset();
    }

    /// Forgets everything.
    pub fn clear(&mut self) {
        self.incrs = 0;
        self.door.clear();
        self.freq.clear();
    }

    /// Increments recorded since the last reset.
    pub fn increments(&self) -> u64 {
        self.incrs
    }
}
