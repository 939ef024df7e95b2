//! Striped atomic counters shared by the cache facade and the policy.
//!
//! Each metric type owns a row of cache-line padded `AtomicU64` stripes. An
//! update picks its stripe from the key hash, so concurrent readers bumping
//! hit/miss counters for different keys rarely touch the same cache line.
//! Reading a metric sums its row.
//!
//! Cost counters may be decremented (a cost update can shrink an entry); this
//! is done with wrapping arithmetic on the stripe, and the row sum is wrapped
//! as well, so the total stays exact.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam::utils::CachePadded;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::metrics::histogram::LifeHistogram;
use crate::metrics::snapshot::MetricsSnapshot;
use crate::metrics::traits::{MetricsReset, MetricsSnapshotProvider};

const STRIPES: usize = 16;

/// Kinds of events the cache counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricType {
    Hit,
    Miss,
    KeyAdd,
    KeyUpdate,
    KeyEvict,
    CostAdd,
    CostEvict,
    DropSets,
    RejectSets,
    DropGets,
    KeepGets,
}

impl MetricType {
    const COUNT: usize = 11;

    const fn index(self) -> usize {
        self as usize
    }
}

/// Live cache metrics.
#[derive(Debug)]
pub struct Metrics {
    rows: Vec<[CachePadded<AtomicU64>; STRIPES]>,
    life: Mutex<LifeHistogram>,
    admitted_at: Mutex<FxHashMap<u64, Instant>>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            rows: (0..MetricType::COUNT)
                .map(|_| std::array::from_fn(|_| CachePadded::new(AtomicU64::new(0))))
                .collect(),
            life: Mutex::new(LifeHistogram::new()),
            admitted_at: Mutex::new(FxHashMap::default()),
        }
    }

    /// Adds `delta` to the stripe chosen by `hash`.
    #[inline]
    pub fn add(&self, kind: MetricType, hash: u64, delta: u64) {
        let stripe = (hash % STRIPES as u64) as usize;
        self.rows[kind.index()][stripe].fetch_add(delta, Ordering::Relaxed);
    }

    /// Adds a signed delta; negative values subtract.
    #[inline]
    pub fn add_signed(&self, kind: MetricType, hash: u64, delta: i64) {
        self.add(kind, hash, delta as u64);
    }

    /// Current total for `kind`.
    pub fn get(&self, kind: MetricType) -> u64 {
        self.rows[kind.index()]
            .iter()
            .fold(0u64, |acc, cell| acc.wrapping_add(cell.load(Ordering::Relaxed)))
    }

    /// Remembers when `key` was admitted so its eviction age can be measured.
    pub fn track_admission(&self, key: u64) {
        self.admitted_at.lock().insert(key, Instant::now());
    }

    /// Records the age of an evicted key in the life-expectancy histogram.
    pub fn track_eviction(&self, key: u64) {
        let Some(admitted) = self.admitted_at.lock().remove(&key) else {
            return;
        };
        self.life.lock().update(admitted.elapsed().as_secs());
    }

    /// Forgets a key's admission time without recording an age.
    pub fn forget(&self, key: u64) {
        self.admitted_at.lock().remove(&key);
    }

    /// `hits / (hits + misses)`, or `0.0` before the first read.
    pub fn ratio(&self) -> f64 {
        let hits = self.get(MetricType::Hit);
        let misses = self.get(MetricType::Miss);
        if hits == 0 && misses == 0 {
            0.0
        } else {
            hits as f64 / (hits + misses) as f64
        }
    }

    /// Zeroes every counter and the histogram.
    pub fn clear(&self) {
        for row in &self.rows {
            for cell in row.iter() {
                cell.store(0, Ordering::Relaxed);
            }
        }
        self.life.lock().clear();
        self.admitted_at.lock().clear();
    }
}

impl MetricsSnapshotProvider<MetricsSnapshot> for Metrics {
    fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            hits: self.get(MetricType::Hit),
            misses: self.get(MetricType::Miss),
            keys_added: self.get(MetricType::KeyAdd),
            keys_updated: self.get(MetricType::KeyUpdate),
            keys_evicted: self.get(MetricType::KeyEvict),
            cost_added: self.get(MetricType::CostAdd),
            cost_evicted: self.get(MetricType::CostEvict),
            sets_dropped: self.get(MetricType::DropSets),
            sets_rejected: self.get(MetricType::RejectSets),
            gets_dropped: self.get(MetricType::DropGets),
            gets_kept: self.get(MetricType::KeepGets),
            life_expectancy: self.life.lock().snapshot(),
        }
    }
}

impl MetricsReset for Metrics {
    fn reset_metrics(&self) {
        self.clear();
    }
}
