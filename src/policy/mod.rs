//! Admission and eviction policy.
//!
//! ## Architecture
//!
//! ```text
//!   ┌─────────────────────────────────────────────────────────────────────┐
//!   │                         EvictionPolicy                              │
//!   │                                                                     │
//!   │   evict: Mutex<SampledLfu>        admit: Arc<Mutex<FrequencySketch>>│
//!   │   ┌─────────────────────────┐     ┌───────────────────────────────┐ │
//!   │   │ key → cost, used, max   │     │ count-min + doorkeeper        │ │
//!   │   └─────────────────────────┘     └──────────────▲────────────────┘ │
//!   │              ▲                                   │                  │
//!   │              │ add/update/del                    │ push(batch)      │
//!   │         coordinator                        drainer thread           │
//!   │                                                  ▲                  │
//!   │                                   bounded(3) channel of batches     │
//!   │                                                  ▲                  │
//!   │                                   AccessBatcher (try_send, lossy)   │
//!   └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Admission Flow
//!
//! ```text
//!   add(key, cost)
//!     ├── cost > max_cost                  → Rejected
//!     ├── key tracked                      → Updated (cost delta only)
//!     ├── room >= 0                        → Admitted
//!     └── loop while room < 0:
//!           sample ≤5 tracked keys, find min estimate
//!           ├── estimate(key) < min         → Rejected (victims so far)
//!           └── evict min, recompute room
//!         → Admitted (with victims)
//! ```
//!
//! Lock order is `evict` then `admit`. The drainer thread only ever takes
//! `admit`, so read-frequency updates never wait on admission decisions.

pub mod admission;
pub mod sampled;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use crossbeam::channel::{self, Receiver, Sender, TrySendError, select};
use parking_lot::Mutex;
use rand::Rng;

use crate::ds::BatchConsumer;
use crate::error::InvariantError;
use crate::metrics::{MetricType, Metrics};

pub use admission::FrequencySketch;
pub use sampled::{PolicyPair, SAMPLE_SIZE, SampledLfu};

/// Capacity of the access-batch channel feeding the drainer thread.
const ITEMS_CHANNEL_SIZE: usize = 3;

/// A key removed from the policy to make room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Victim {
    pub key: u64,
    pub cost: i64,
}

/// What [`EvictionPolicy::add`] decided for the incoming key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// New key, now tracked.
    Admitted,
    /// Key was already tracked; only its cost changed.
    Updated,
    /// Key is not tracked.
    Rejected,
}

/// Verdict plus any keys evicted while deciding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub verdict: Verdict,
    pub victims: Vec<Victim>,
}

impl Admission {
    fn new(verdict: Verdict, victims: Vec<Victim>) -> Self {
        Self { verdict, victims }
    }

    pub fn is_admitted(&self) -> bool {
        self.verdict == Verdict::Admitted
    }
}

/// TinyLFU admission with sampled-LFU eviction.
#[derive(Debug)]
pub struct EvictionPolicy {
    evict: Mutex<SampledLfu>,
    admit: Arc<Mutex<FrequencySketch>>,
    items_tx: Sender<Vec<u64>>,
    stop_tx: Sender<()>,
    drainer: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
    metrics: Option<Arc<Metrics>>,
}

impl EvictionPolicy {
    /// Creates the policy and starts its drainer thread.
    pub fn new<R: Rng + ?Sized>(
        num_counters: usize,
        max_cost: i64,
        rng: &mut R,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        let admit = Arc::new(Mutex::new(FrequencySketch::new(num_counters, rng)));
        let (items_tx, items_rx) = channel::bounded(ITEMS_CHANNEL_SIZE);
        let (stop_tx, stop_rx) = channel::bounded(1);
        let drainer = {
            let admit = Arc::clone(&admit);
            std::thread::Builder::new()
                .name("sketchcache-policy".into())
                .spawn(move || drain_items(admit, items_rx, stop_rx))
                .ok()
        };
        if drainer.is_none() {
            tracing::warn!("failed to spawn policy drainer; access frequencies will not be tracked");
        }
        Self {
            evict: Mutex::new(SampledLfu::new(max_cost, rng, metrics.clone())),
            admit,
            items_tx,
            stop_tx,
            drainer: Mutex::new(drainer),
            closed: AtomicBool::new(false),
            metrics,
        }
    }

    /// Decides whether `key` may enter the cache, evicting as needed.
    pub fn add(&self, key: u64, cost: i64) -> Admission {
        let mut evict = self.evict.lock();

        // Cannot fit even in an empty cache.
        if cost > evict.max_cost() {
            return Admission::new(Verdict::Rejected, Vec::new());
        }

        if evict.update_if_has(key, cost) {
            let victims = if evict.room_left(0) < 0 {
                let admit = self.admit.lock();
                shrink_to_fit(&mut evict, &admit, key)
            } else {
                Vec::new()
            };
            return Admission::new(Verdict::Updated, victims);
        }

        let mut room = evict.room_left(cost);
        if room >= 0 {
            evict.add(key, cost);
            return Admission::new(Verdict::Admitted, Vec::new());
        }

        let admit = self.admit.lock();
        let inc_hits = admit.estimate(key);
        let mut sample = Vec::with_capacity(SAMPLE_SIZE);
        let mut victims = Vec::new();

        while room < 0 {
            evict.fill_sample(&mut sample, None);
            let Some((min_idx, min_hits)) = least_valuable(&admit, &sample) else {
                break;
            };
            if inc_hits < min_hits {
                if let Some(metrics) = &self.metrics {
                    metrics.add(MetricType::RejectSets, key, 1);
                }
                return Admission::new(Verdict::Rejected, victims);
            }
            let pair = sample.swap_remove(min_idx);
            evict.del(pair.key);
            victims.push(Victim {
                key: pair.key,
                cost: pair.cost,
            });
            room = evict.room_left(cost);
        }

        if room < 0 {
            return Admission::new(Verdict::Rejected, victims);
        }
        evict.add(key, cost);
        Admission::new(Verdict::Admitted, victims)
    }

    /// Re-costs an already tracked key. Returns keys evicted to keep the
    /// total within `max_cost`; the key itself is evicted if it alone no
    /// longer fits.
    pub fn update(&self, key: u64, cost: i64) -> Vec<Victim> {
        let mut evict = self.evict.lock();
        if !evict.has(key) {
            return Vec::new();
        }
        if cost > evict.max_cost() {
            return evict
                .del(key)
                .map(|cost| vec![Victim { key, cost }])
                .unwrap_or_default();
        }
        evict.update_if_has(key, cost);
        if evict.room_left(0) >= 0 {
            return Vec::new();
        }
        let admit = self.admit.lock();
        shrink_to_fit(&mut evict, &admit, key)
    }

    /// Stops tracking `key`. Returns its cost if it was tracked.
    pub fn del(&self, key: u64) -> Option<i64> {
        self.evict.lock().del(key)
    }

    pub fn has(&self, key: u64) -> bool {
        self.evict.lock().has(key)
    }

    pub fn cost(&self, key: u64) -> Option<i64> {
        self.evict.lock().cost(key)
    }

    /// Remaining room (may be negative right after `update_max_cost` shrinks
    /// the budget).
    pub fn cap(&self) -> i64 {
        self.evict.lock().room_left(0)
    }

    pub fn used(&self) -> i64 {
        self.evict.lock().used()
    }

    pub fn len(&self) -> usize {
        self.evict.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.evict.lock().is_empty()
    }

    pub fn max_cost(&self) -> i64 {
        self.evict.lock().max_cost()
    }

    /// Changes the budget. Shrinking takes effect on the next admission.
    pub fn update_max_cost(&self, max_cost: i64) {
        self.evict.lock().update_max_cost(max_cost);
    }

    /// Current frequency estimate for `key`.
    pub fn estimate(&self, key: u64) -> i64 {
        self.admit.lock().estimate(key)
    }

    /// Tracked keys, in unspecified order.
    pub fn keys(&self) -> Vec<u64> {
        self.evict.lock().keys().collect()
    }

    /// Forgets every key and every frequency.
    pub fn clear(&self) {
        let mut evict = self.evict.lock();
        let mut admit = self.admit.lock();
        evict.clear();
        admit.clear();
    }

    /// Stops the drainer thread. Later batches are refused.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.drainer.lock().take() {
            let _ = handle.join();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Verifies that `used` equals the sum of tracked costs.
    ///
    /// `used` may exceed `max_cost` right after the budget shrinks, so that
    /// is not checked here.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        let evict = self.evict.lock();
        let sum: i64 = evict.keys().filter_map(|key| evict.cost(key)).sum();
        if sum != evict.used() {
            return Err(InvariantError::new(format!(
                "used cost {} does not match tracked total {sum}",
                evict.used()
            )));
        }
        Ok(())
    }
}

impl BatchConsumer for EvictionPolicy {
    fn push(&self, keys: Vec<u64>) -> Result<(), Vec<u64>> {
        if keys.is_empty() || self.is_closed() {
            return Err(keys);
        }
        let first = keys[0];
        let len = keys.len() as u64;
        match self.items_tx.try_send(keys) {
            Ok(()) => {
                if let Some(metrics) = &self.metrics {
                    metrics.add(MetricType::KeepGets, first, len);
                }
                Ok(())
            },
            Err(TrySendError::Full(keys)) | Err(TrySendError::Disconnected(keys)) => {
                if let Some(metrics) = &self.metrics {
                    metrics.add(MetricType::DropGets, first, len);
                }
                Err(keys)
            },
        }
    }
}

impl Drop for EvictionPolicy {
    fn drop(&mut self) {
        self.close();
    }
}

fn drain_items(admit: Arc<Mutex<FrequencySketch>>, items: Receiver<Vec<u64>>, stop: Receiver<()>) {
    loop {
        select! {
            recv(items) -> batch => match batch {
                Ok(keys) => admit.lock().push(&keys),
                Err(_) => return,
            },
            recv(stop) -> _ => return,
        }
    }
}

/// Index and estimate of the lowest-ranked sample entry; first minimum wins.
fn least_valuable(admit: &FrequencySketch, sample: &[PolicyPair]) -> Option<(usize, i64)> {
    let mut best: Option<(usize, i64)> = None;
    for (idx, pair) in sample.iter().enumerate() {
        let hits = admit.estimate(pair.key);
        match best {
            Some((_, min_hits)) if hits >= min_hits => {},
            _ => best = Some((idx, hits)),
        }
    }
    best
}

/// Evicts sampled keys other than `protect` until `used <= max_cost`.
fn shrink_to_fit(evict: &mut SampledLfu, admit: &FrequencySketch, protect: u64) -> Vec<Victim> {
    let mut victims = Vec::new();
    let mut sample = Vec::with_capacity(SAMPLE_SIZE);
    while evict.room_left(0) < 0 {
        evict.fill_sample(&mut sample, Some(protect));
        let Some((min_idx, _)) = least_valuable(admit, &sample) else {
            break;
        };
        let pair = sample.swap_remove(min_idx);
        evict.del(pair.key);
        victims.push(Victim {
            key: pair.key,
            cost: pair.cost,
        });
    }
    victims
}
