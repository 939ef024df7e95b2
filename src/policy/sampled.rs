//! Cost bookkeeping for admitted keys.
//!
//! `SampledLfu` only knows *which* keys are admitted and what they cost. It
//! does not rank them; ranking is the admission sketch's job. Eviction draws a
//! small sample of tracked keys straight out of the cost map and lets the
//! caller pick the least valuable one.
//!
//! Tracked keys are also kept in a dense vector so a sample can be drawn by
//! random position in constant time. Each round draws fresh positions, so
//! no fixed subset of keys is ever the only pool of candidates.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;

use crate::metrics::{MetricType, Metrics};

/// Maximum number of eviction candidates considered per round.
pub const SAMPLE_SIZE: usize = 5;

/// Random draws attempted per fill before falling back to a linear walk.
const SAMPLE_DRAWS: usize = SAMPLE_SIZE * 2;

/// A tracked key and its cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyPair {
    pub key: u64,
    pub cost: i64,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    cost: i64,
    pos: usize,
}

#[derive(Debug)]
pub struct SampledLfu {
    slots: FxHashMap<u64, Slot>,
    keys: Vec<u64>,
    max_cost: i64,
    used: i64,
    rng: StdRng,
    metrics: Option<Arc<Metrics>>,
}

impl SampledLfu {
    pub fn new<R: Rng + ?Sized>(max_cost: i64, rng: &mut R, metrics: Option<Arc<Metrics>>) -> Self {
        Self {
            slots: FxHashMap::default(),
            keys: Vec::new(),
            max_cost,
            used: 0,
            rng: StdRng::seed_from_u64(rng.gen()),
            metrics,
        }
    }

    pub fn max_cost(&self) -> i64 {
        self.max_cost
    }

    pub fn update_max_cost(&mut self, max_cost: i64) {
        self.max_cost = max_cost;
    }

    pub fn used(&self) -> i64 {
        self.used
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Room left after hypothetically adding `cost`. Negative means an
    /// eviction is needed. Saturates instead of overflowing.
    #[inline]
    pub fn room_left(&self, cost: i64) -> i64 {
        self.max_cost.saturating_sub(self.used.saturating_add(cost))
    }

    /// Tops `sample` up to [`SAMPLE_SIZE`] distinct keys drawn at random,
    /// skipping `exclude`.
    pub fn fill_sample(&mut self, sample: &mut Vec<PolicyPair>, exclude: Option<u64>) {
        let len = self.keys.len();
        if sample.len() >= SAMPLE_SIZE || len == 0 {
            return;
        }
        for _ in 0..SAMPLE_DRAWS {
            let pos = self.rng.gen_range(0..len);
            self.push_candidate(sample, pos, exclude);
            if sample.len() >= SAMPLE_SIZE {
                return;
            }
        }
        // Small or mostly-sampled maps: walk every position once.
        let start = self.rng.gen_range(0..len);
        for step in 0..len {
            self.push_candidate(sample, (start + step) % len, exclude);
            if sample.len() >= SAMPLE_SIZE {
                return;
            }
        }
    }

    fn push_candidate(&self, sample: &mut Vec<PolicyPair>, pos: usize, exclude: Option<u64>) {
        let key = self.keys[pos];
        if Some(key) == exclude || sample.iter().any(|pair| pair.key == key) {
            return;
        }
        if let Some(slot) = self.slots.get(&key) {
            sample.push(PolicyPair {
                key,
                cost: slot.cost,
            });
        }
    }

    pub fn add(&mut self, key: u64, cost: i64) {
        if self.slots.contains_key(&key) {
            self.update_if_has(key, cost);
            return;
        }
        self.slots.insert(
            key,
            Slot {
                cost,
                pos: self.keys.len(),
            },
        );
        self.keys.push(key);
        self.used = self.used.saturating_add(cost);
        if let Some(metrics) = &self.metrics {
            metrics.add_signed(MetricType::CostAdd, key, cost);
        }
    }

    /// Removes `key`, returning its cost if it was tracked.
    pub fn del(&mut self, key: u64) -> Option<i64> {
        let slot = self.slots.remove(&key)?;
        self.keys.swap_remove(slot.pos);
        if let Some(&moved) = self.keys.get(slot.pos) {
            if let Some(moved_slot) = self.slots.get_mut(&moved) {
                moved_slot.pos = slot.pos;
            }
        }
        self.used = self.used.saturating_sub(slot.cost);
        Some(slot.cost)
    }

    /// Re-costs `key` if tracked. Returns `false` when the key is unknown.
    pub fn update_if_has(&mut self, key: u64, cost: i64) -> bool {
        let Some(slot) = self.slots.get_mut(&key) else {
            return false;
        };
        let delta = cost.saturating_sub(slot.cost);
        slot.cost = cost;
        self.used = self.used.saturating_add(delta);
        if let Some(metrics) = &self.metrics {
            metrics.add(MetricType::KeyUpdate, key, 1);
            metrics.add_signed(MetricType::CostAdd, key, delta);
        }
        true
    }

    pub fn cost(&self, key: u64) -> Option<i64> {
        self.slots.get(&key).map(|slot| slot.cost)
    }

    pub fn has(&self, key: u64) -> bool {
        self.slots.contains_key(&key)
    }

    pub fn keys(&self) -> impl Iterator<Item = u64> + '_ {
        self.keys.iter().copied()
    }

    pub fn clear(&mut self) {
        self.used = 0;
        self.slots.clear();
        self.keys.clear();
    }
}
