//! Concurrent cost-bounded cache.
//!
//! ## Architecture
//!
//! ```text
//!   caller threads                                   coordinator thread
//!   ──────────────                                   ──────────────────
//!   get ─► AccessBatcher ──(lossy)──► policy drainer
//!     └──► ShardedStore::get
//!
//!   set ─► ShardedStore::update ─┐
//!                                ├─► bounded set channel ─► select! {
//!   del ─► ShardedStore::del ────┘     (try_send; del and       set msg  → policy + store
//!                                       wait block)              tick     → TTL sweep
//!                                                                stop     → exit
//!                                                              }
//! ```
//!
//! Writes are applied asynchronously and in enqueue order. A `set` that
//! returned `true` may still be rejected by the admission policy; call
//! [`Cache::wait`] to block until everything enqueued so far is applied.
//!
//! ## Example Usage
//!
//! ```
//! use sketchcache::CacheBuilder;
//!
//! let cache = CacheBuilder::<str, String>::new(1_000, 100)
//!     .ignore_internal_cost(true)
//!     .build()
//!     .unwrap();
//!
//! assert!(cache.set("greeting", "hello".to_string(), 1));
//! cache.wait();
//! assert_eq!(cache.get("greeting").as_deref().map(String::as_str), Some("hello"));
//!
//! cache.del("greeting");
//! assert!(cache.get("greeting").is_none());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::channel::{
    self, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError, select,
};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::ds::AccessBatcher;
use crate::error::{ConfigError, InvariantError};
use crate::hash::KeyHasher;
use crate::metrics::{MetricType, Metrics, MetricsSnapshot, MetricsSnapshotProvider};
use crate::policy::{EvictionPolicy, Verdict, Victim};
use crate::store::{Item, ShardedStore, UpdateOutcome, UpdatePredicate};

/// Per-entry bookkeeping overhead charged on top of the caller's cost unless
/// internal cost is ignored.
pub const ITEM_SIZE: i64 = std::mem::size_of::<Item<()>>() as i64;

/// Computes the cost of a value whose `set` passed a cost of zero.
pub type CostFn<V> = Arc<dyn Fn(&V) -> i64 + Send + Sync>;
/// Receives an entry leaving the cache by eviction or rejection.
pub type ItemCallback<V> = Arc<dyn Fn(&Item<V>) + Send + Sync>;
/// Receives every value that leaves the cache for any reason.
pub type ExitCallback<V> = Arc<dyn Fn(&V) + Send + Sync>;

/// How often a delete or wait marker retries a full channel while checking
/// for close.
const BLOCKING_SEND_RETRY: Duration = Duration::from_millis(100);

enum Message<V> {
    New(Item<V>),
    Update(Item<V>),
    Delete { key: u64, conflict: u64 },
    Wait(Sender<()>),
}

/// Everything [`Cache::from_parts`] needs; assembled by the builder.
pub(crate) struct CacheParts<K: ?Sized, V> {
    pub key_hasher: Box<dyn KeyHasher<K>>,
    pub policy: EvictionPolicy,
    pub should_update: UpdatePredicate<V>,
    pub metrics: Option<Arc<Metrics>>,
    pub callbacks: Callbacks<V>,
    pub ignore_internal_cost: bool,
    pub buffer_items: usize,
    pub set_buffer_size: usize,
    pub ttl_tick: Duration,
}

pub(crate) struct Callbacks<V> {
    pub cost: Option<CostFn<V>>,
    pub on_evict: Option<ItemCallback<V>>,
    pub on_reject: Option<ItemCallback<V>>,
    pub on_exit: Option<ExitCallback<V>>,
}

impl<V> Default for Callbacks<V> {
    fn default() -> Self {
        Self {
            cost: None,
            on_evict: None,
            on_reject: None,
            on_exit: None,
        }
    }
}

impl<V> Callbacks<V> {
    fn exit(&self, value: &V) {
        if let Some(on_exit) = &self.on_exit {
            on_exit(value);
        }
    }

    fn evict(&self, item: &Item<V>) {
        if let Some(on_evict) = &self.on_evict {
            on_evict(item);
        }
        self.exit(&item.value);
    }

    fn reject(&self, item: &Item<V>) {
        if let Some(on_reject) = &self.on_reject {
            on_reject(item);
        }
        self.exit(&item.value);
    }
}

/// State shared between caller threads and the coordinator.
struct Shared<V> {
    policy: Arc<EvictionPolicy>,
    store: ShardedStore<V>,
    metrics: Option<Arc<Metrics>>,
    callbacks: Callbacks<V>,
    ignore_internal_cost: bool,
}

impl<V> Shared<V> {
    #[inline]
    fn record(&self, kind: MetricType, key: u64, delta: u64) {
        if let Some(metrics) = &self.metrics {
            metrics.add(kind, key, delta);
        }
    }

    fn cost_of(&self, item: &Item<V>) -> i64 {
        let mut cost = item.cost;
        if cost == 0 {
            if let Some(cost_fn) = &self.callbacks.cost {
                cost = cost_fn(&item.value);
            }
        }
        if !self.ignore_internal_cost {
            cost = cost.saturating_add(ITEM_SIZE);
        }
        cost
    }

    fn process(&self, message: Message<V>) {
        match message {
            Message::New(item) => self.admit(item),
            // A delete marker queued ahead of this update already removed
            // the key; the update is the newest write, so admit it afresh.
            Message::Update(item) if !self.policy.has(item.key) => self.admit(item),
            Message::Update(mut item) => {
                item.cost = self.cost_of(&item);
                for victim in self.policy.update(item.key, item.cost) {
                    self.evict(victim);
                }
            },
            Message::Delete { key, conflict } => match self.store.del(key, conflict) {
                Some((_, value)) => {
                    self.policy.del(key);
                    self.forget(key);
                    self.callbacks.exit(&value);
                },
                // Already gone from the store; make the policy agree.
                None if !self.store.contains(key) => {
                    self.policy.del(key);
                    self.forget(key);
                },
                None => {},
            },
            Message::Wait(done) => {
                let _ = done.send(());
            },
        }
    }

    fn admit(&self, mut item: Item<V>) {
        item.cost = self.cost_of(&item);
        let previous_cost = self.policy.cost(item.key);
        let mut admission = self.policy.add(item.key, item.cost);
        match admission.verdict {
            Verdict::Admitted => {
                if self.store.set(&item) {
                    self.record(MetricType::KeyAdd, item.key, 1);
                    if let Some(metrics) = &self.metrics {
                        metrics.track_admission(item.key);
                    }
                } else {
                    // A colliding key owns the slot; keep the policy in step.
                    self.policy.del(item.key);
                    self.callbacks.reject(&item);
                }
            },
            Verdict::Updated => {
                if !self.store.set(&item) {
                    // The stored entry was kept; charge its old cost again.
                    if let Some(cost) = previous_cost {
                        admission.victims.extend(self.policy.update(item.key, cost));
                    }
                    self.callbacks.reject(&item);
                }
            },
            Verdict::Rejected => {
                trace!(key = item.key, cost = item.cost, "set rejected by admission policy");
                self.callbacks.reject(&item);
            },
        }
        for victim in admission.victims {
            self.evict(victim);
        }
    }

    fn evict(&self, victim: Victim) {
        let Some((conflict, value)) = self.store.del(victim.key, 0) else {
            return;
        };
        self.finish_eviction(Item {
            key: victim.key,
            conflict,
            value,
            cost: victim.cost,
            expiration: None,
        });
    }

    fn finish_eviction(&self, item: Item<V>) {
        trace!(key = item.key, cost = item.cost, "evicted");
        if let Some(metrics) = &self.metrics {
            metrics.add(MetricType::KeyEvict, item.key, 1);
            metrics.add_signed(MetricType::CostEvict, item.key, item.cost);
            metrics.track_eviction(item.key);
        }
        self.callbacks.evict(&item);
    }

    fn forget(&self, key: u64) {
        if let Some(metrics) = &self.metrics {
            metrics.forget(key);
        }
    }

    fn sweep_expired(&self) {
        let evicted = self
            .store
            .cleanup(&self.policy, |item| self.finish_eviction(item));
        if evicted > 0 {
            debug!(evicted, "ttl sweep");
        }
    }
}

struct Coordinator {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl Coordinator {
    fn spawn<V: Send + Sync + 'static>(
        shared: Arc<Shared<V>>,
        messages: Receiver<Message<V>>,
        tick: Duration,
    ) -> std::io::Result<Self> {
        let (stop, stop_rx) = channel::bounded(1);
        let handle = std::thread::Builder::new()
            .name("sketchcache-coordinator".into())
            .spawn(move || {
                debug!("coordinator started");
                let ticker = channel::tick(tick);
                loop {
                    select! {
                        recv(messages) -> message => match message {
                            Ok(message) => shared.process(message),
                            Err(_) => break,
                        },
                        recv(ticker) -> _ => shared.sweep_expired(),
                        recv(stop_rx) -> _ => break,
                    }
                }
                debug!("coordinator stopped");
            })?;
        Ok(Self { stop, handle })
    }

    /// Signals the thread and waits for it to finish its current message.
    fn stop(self) {
        let _ = self.stop.send(());
        let _ = self.handle.join();
    }
}

/// Concurrent cache bounded by total cost, with TinyLFU admission and
/// sampled-LFU eviction.
///
/// Keys are hashed on the way in and never stored, which is why every method
/// takes `&K` and `K` may be unsized (`Cache<str, _>`).
///
/// Built with [`CacheBuilder`](crate::builder::CacheBuilder). Dropping the
/// cache closes it.
pub struct Cache<K: ?Sized, V> {
    shared: Arc<Shared<V>>,
    key_hasher: Box<dyn KeyHasher<K>>,
    batcher: AccessBatcher<Arc<EvictionPolicy>>,
    set_tx: Sender<Message<V>>,
    set_rx: Receiver<Message<V>>,
    coordinator: Mutex<Option<Coordinator>>,
    ttl_tick: Duration,
    closed: AtomicBool,
}

impl<K: ?Sized, V> std::fmt::Debug for Cache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("len", &self.shared.store.len())
            .field("max_cost", &self.shared.policy.max_cost())
            .field("used_cost", &self.shared.policy.used())
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}

impl<K: ?Sized, V: Send + Sync + 'static> Cache<K, V> {
    pub(crate) fn from_parts(parts: CacheParts<K, V>) -> Result<Self, ConfigError> {
        let policy = Arc::new(parts.policy);
        let shared = Arc::new(Shared {
            policy: Arc::clone(&policy),
            store: ShardedStore::new(parts.should_update),
            metrics: parts.metrics,
            callbacks: parts.callbacks,
            ignore_internal_cost: parts.ignore_internal_cost,
        });
        let (set_tx, set_rx) = channel::bounded(parts.set_buffer_size);
        let coordinator = Coordinator::spawn(Arc::clone(&shared), set_rx.clone(), parts.ttl_tick)
            .map_err(|err| ConfigError::new(format!("failed to start coordinator: {err}")))?;
        Ok(Self {
            shared,
            key_hasher: parts.key_hasher,
            batcher: AccessBatcher::with_default_stripes(policy, parts.buffer_items),
            set_tx,
            set_rx,
            coordinator: Mutex::new(Some(coordinator)),
            ttl_tick: parts.ttl_tick,
            closed: AtomicBool::new(false),
        })
    }

    /// Returns the value for `key` if it is present and unexpired.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        if self.is_closed() {
            return None;
        }
        let (key_hash, conflict) = self.key_hasher.hash_key(key);
        self.batcher.push(key_hash);
        let value = self.shared.store.get(key_hash, conflict);
        let kind = if value.is_some() {
            MetricType::Hit
        } else {
            MetricType::Miss
        };
        self.shared.record(kind, key_hash, 1);
        value
    }

    /// Enqueues `value` under `key` with no expiration.
    ///
    /// A `cost` of zero defers to the configured cost function. Returns
    /// `false` when the write was dropped (closed cache, full buffer, or an
    /// update refused by the update predicate). `true` does not guarantee
    /// admission.
    pub fn set(&self, key: &K, value: V, cost: i64) -> bool {
        self.set_with_ttl(key, value, cost, Duration::ZERO)
    }

    /// Like [`set`](Self::set), expiring the entry after `ttl`. A zero `ttl`
    /// means the entry never expires.
    pub fn set_with_ttl(&self, key: &K, value: V, cost: i64, ttl: Duration) -> bool {
        if self.is_closed() {
            return false;
        }
        let expiration = if ttl.is_zero() {
            None
        } else {
            Instant::now().checked_add(ttl)
        };
        let (key_hash, conflict) = self.key_hasher.hash_key(key);
        let item = Item {
            key: key_hash,
            conflict,
            value: Arc::new(value),
            cost,
            expiration,
        };

        let message = match self.shared.store.update(&item) {
            UpdateOutcome::Updated(previous) => {
                self.shared.callbacks.exit(&previous);
                Message::Update(item)
            },
            UpdateOutcome::Skipped(_) => return false,
            UpdateOutcome::Missing => Message::New(item),
        };

        match self.set_tx.try_send(message) {
            Ok(()) => true,
            // The store already holds the new value; only the cost update is lost.
            Err(TrySendError::Full(Message::Update(_))) => true,
            Err(_) => {
                self.shared.record(MetricType::DropSets, key_hash, 1);
                false
            },
        }
    }

    /// Like [`set_with_ttl`](Self::set_with_ttl) with a TTL in whole seconds.
    /// Negative TTLs are refused; zero means no expiration.
    pub fn set_with_ttl_secs(&self, key: &K, value: V, cost: i64, ttl_secs: i64) -> bool {
        let Ok(secs) = u64::try_from(ttl_secs) else {
            return false;
        };
        self.set_with_ttl(key, value, cost, Duration::from_secs(secs))
    }

    /// Remaining time to live for `key`.
    ///
    /// `None` if the key is absent or already expired, `Some(Duration::ZERO)`
    /// if it never expires.
    pub fn get_ttl(&self, key: &K) -> Option<Duration> {
        if self.is_closed() {
            return None;
        }
        let (key_hash, conflict) = self.key_hasher.hash_key(key);
        let now = Instant::now();
        self.shared.store.get_at(key_hash, conflict, now)?;
        match self.shared.store.expiration(key_hash) {
            None => Some(Duration::ZERO),
            Some(deadline) => deadline.checked_duration_since(now).filter(|d| !d.is_zero()),
        }
    }

    /// Removes `key` immediately and enqueues a marker so that writes for
    /// `key` still in flight are undone in order.
    ///
    /// Blocks while the write buffer is full.
    pub fn del(&self, key: &K) {
        if self.is_closed() {
            return;
        }
        let (key_hash, conflict) = self.key_hasher.hash_key(key);
        if let Some((_, previous)) = self.shared.store.del(key_hash, conflict) {
            self.shared.callbacks.exit(&previous);
        }
        self.send_blocking(Message::Delete {
            key: key_hash,
            conflict,
        });
    }

    /// Blocks until every write enqueued before this call has been applied.
    pub fn wait(&self) {
        if self.is_closed() {
            return;
        }
        self.await_sentinel();
    }

    /// Enqueues a `Wait` sentinel and blocks until it is signaled or the
    /// cache closes.
    fn await_sentinel(&self) {
        let (done_tx, done_rx) = channel::bounded(1);
        if !self.send_blocking(Message::Wait(done_tx)) {
            return;
        }
        loop {
            match done_rx.recv_timeout(BLOCKING_SEND_RETRY) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                // A close racing this call leaves the sentinel undrained.
                Err(RecvTimeoutError::Timeout) if self.is_closed() => return,
                Err(RecvTimeoutError::Timeout) => {},
            }
        }
    }

    fn send_blocking(&self, mut message: Message<V>) -> bool {
        match self.set_tx.try_send(message) {
            Ok(()) => return true,
            Err(TrySendError::Disconnected(_)) => return false,
            Err(TrySendError::Full(returned)) => {
                warn!("set buffer full, blocking until the coordinator catches up");
                message = returned;
            },
        }
        loop {
            match self.set_tx.send_timeout(message, BLOCKING_SEND_RETRY) {
                Ok(()) => return true,
                Err(SendTimeoutError::Disconnected(_)) => return false,
                Err(SendTimeoutError::Timeout(returned)) => {
                    if self.is_closed() {
                        return false;
                    }
                    message = returned;
                },
            }
        }
    }

    /// Drops every entry and resets metrics.
    ///
    /// Pending `New` writes are reported to `on_evict`; pending updates and
    /// deletes are discarded; pending [`wait`](Self::wait) calls return.
    pub fn clear(&self) {
        if self.is_closed() {
            return;
        }
        self.reset(true);
        debug!("cache cleared");
    }

    fn reset(&self, restart: bool) {
        let mut coordinator = self.coordinator.lock();
        if let Some(running) = coordinator.take() {
            running.stop();
        }

        let shared = &self.shared;
        while let Ok(message) = self.set_rx.try_recv() {
            match message {
                Message::New(mut item) => {
                    item.cost = shared.cost_of(&item);
                    shared.callbacks.evict(&item);
                },
                Message::Wait(done) => {
                    let _ = done.send(());
                },
                Message::Update(_) | Message::Delete { .. } => {},
            }
        }

        shared.store.clear(|mut item| {
            item.cost = shared.policy.cost(item.key).unwrap_or_default();
            shared.callbacks.evict(&item);
        });
        shared.policy.clear();
        if let Some(metrics) = &shared.metrics {
            metrics.clear();
        }

        if restart {
            match Coordinator::spawn(Arc::clone(shared), self.set_rx.clone(), self.ttl_tick) {
                Ok(running) => *coordinator = Some(running),
                Err(err) => warn!(%err, "failed to restart coordinator"),
            }
        }
    }

    /// Clears the cache and stops its background threads. Every later call
    /// is a no-op. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.reset(false);
        self.shared.policy.close();
        debug!("cache closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Current cost budget.
    pub fn max_cost(&self) -> i64 {
        self.shared.policy.max_cost()
    }

    /// Changes the cost budget. Shrinking evicts lazily on later admissions.
    pub fn update_max_cost(&self, max_cost: i64) {
        if self.is_closed() {
            return;
        }
        self.shared.policy.update_max_cost(max_cost);
    }

    /// Total cost of admitted entries.
    pub fn used_cost(&self) -> i64 {
        self.shared.policy.used()
    }

    /// Live metrics, if enabled.
    pub fn metrics(&self) -> Option<&Metrics> {
        self.shared.metrics.as_deref()
    }

    /// Number of stored entries, expired-but-unswept ones included.
    pub fn len(&self) -> usize {
        self.shared.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.store.is_empty()
    }

    /// Checks cost accounting and that the policy and the store track the
    /// same keys. Only meaningful after [`wait`](Self::wait) with no
    /// concurrent writers.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        self.shared.policy.check_invariants()?;
        let mut tracked = self.shared.policy.keys();
        let mut stored = self.shared.store.keys();
        tracked.sort_unstable();
        stored.sort_unstable();
        if tracked != stored {
            return Err(InvariantError::new(format!(
                "policy tracks {} keys but store holds {}",
                tracked.len(),
                stored.len()
            )));
        }
        Ok(())
    }
}

impl<K: ?Sized, V: Send + Sync + 'static> MetricsSnapshotProvider<Option<MetricsSnapshot>>
    for Cache<K, V>
{
    fn snapshot(&self) -> Option<MetricsSnapshot> {
        self.metrics().map(Metrics::snapshot)
    }
}

impl<K: ?Sized, V> Drop for Cache<K, V> {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(running) = self.coordinator.get_mut().take() {
            running.stop();
        }
        self.shared.policy.close();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::builder::CacheBuilder;

    fn cache(max_cost: i64) -> Cache<u64, u64> {
        CacheBuilder::new(1_000, max_cost)
            .ignore_internal_cost(true)
            .metrics(true)
            .seed(7)
            .build()
            .unwrap()
    }

    #[test]
    fn sentinel_left_in_a_closed_cache_does_not_block() {
        let c = Arc::new(cache(10));
        c.close();
        let (done_tx, done_rx) = channel::bounded(1);
        let waiter = Arc::clone(&c);
        std::thread::spawn(move || {
            // Bypasses the closed check the way a racing close would.
            waiter.await_sentinel();
            let _ = done_tx.send(());
        });
        assert!(done_rx.recv_timeout(Duration::from_secs(2)).is_ok());
    }

    #[test]
    fn debug_reports_budget_and_state() {
        let c = cache(10);
        c.set(&1, 1, 3);
        c.wait();
        let text = format!("{c:?}");
        assert!(text.contains("used_cost: 3"));
        assert!(text.contains("closed: false"));
        c.close();
        assert!(format!("{c:?}").contains("closed: true"));
    }

    #[test]
    fn set_then_get() {
        let c = cache(100);
        assert!(c.set(&1, 10, 1));
        c.wait();
        assert_eq!(c.get(&1).as_deref(), Some(&10));
        assert!(c.get(&2).is_none());
        let snap = c.metrics().unwrap().snapshot();
        assert_eq!(snap.hits, 1);
        assert_eq!(snap.misses, 1);
        assert_eq!(snap.keys_added, 1);
        assert_eq!(snap.cost_added, 1);
    }

    #[test]
    fn update_replaces_value_and_cost() {
        let c = cache(100);
        c.set(&1, 10, 1);
        c.wait();
        assert!(c.set(&1, 11, 5));
        // The store is updated synchronously.
        assert_eq!(c.get(&1).as_deref(), Some(&11));
        c.wait();
        assert_eq!(c.used_cost(), 5);
        c.check_invariants().unwrap();
    }

    #[test]
    fn internal_cost_is_charged_by_default() {
        let c: Cache<u64, u64> = CacheBuilder::new(1_000, 1_000).build().unwrap();
        c.set(&1, 1, 1);
        c.wait();
        assert_eq!(c.used_cost(), 1 + ITEM_SIZE);
    }

    #[test]
    fn zero_cost_uses_cost_function() {
        let c: Cache<u64, String> = CacheBuilder::new(1_000, 100)
            .ignore_internal_cost(true)
            .cost(|v: &String| v.len() as i64)
            .build()
            .unwrap();
        c.set(&1, "abcd".into(), 0);
        c.set(&2, "xyz".into(), 9);
        c.wait();
        assert_eq!(c.used_cost(), 4 + 9);
    }

    #[test]
    fn oversized_items_are_rejected() {
        let rejected = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&rejected);
        let c: Cache<u64, u64> = CacheBuilder::new(1_000, 10)
            .ignore_internal_cost(true)
            .on_reject(move |_: &Item<u64>| {
                counter.fetch_add(1, Ordering::Relaxed);
            })
            .build()
            .unwrap();
        assert!(c.set(&1, 1, 11));
        c.wait();
        assert!(c.get(&1).is_none());
        assert_eq!(rejected.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn negative_ttl_is_refused() {
        let c = cache(100);
        assert!(!c.set_with_ttl_secs(&1, 1, 1, -1));
        assert!(c.set_with_ttl_secs(&2, 2, 1, 0));
        c.wait();
        assert_eq!(c.get_ttl(&2), Some(Duration::ZERO));
        assert_eq!(c.get_ttl(&1), None);
    }

    #[test]
    fn get_ttl_reports_remaining_time() {
        let c = cache(100);
        c.set_with_ttl(&1, 1, 1, Duration::from_secs(60));
        c.wait();
        let ttl = c.get_ttl(&1).unwrap();
        assert!(ttl > Duration::from_secs(55) && ttl <= Duration::from_secs(60));
    }

    #[test]
    fn update_predicate_refusal_drops_the_set() {
        let c: Cache<u64, u64> = CacheBuilder::new(1_000, 100)
            .ignore_internal_cost(true)
            .should_update(|new: &u64, old: &u64| new > old)
            .build()
            .unwrap();
        c.set(&1, 5, 1);
        c.wait();
        assert!(!c.set(&1, 4, 1));
        assert!(c.set(&1, 6, 1));
        c.wait();
        assert_eq!(c.get(&1).as_deref(), Some(&6));
    }

    #[test]
    fn clear_resets_entries_and_metrics() {
        let evicted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&evicted);
        let c: Cache<u64, u64> = CacheBuilder::new(1_000, 100)
            .ignore_internal_cost(true)
            .metrics(true)
            .on_evict(move |_: &Item<u64>| {
                counter.fetch_add(1, Ordering::Relaxed);
            })
            .build()
            .unwrap();
        for key in 0..5 {
            c.set(&key, key, 1);
        }
        c.wait();
        c.get(&0);
        c.clear();
        assert!(c.is_empty());
        assert_eq!(c.used_cost(), 0);
        assert_eq!(evicted.load(Ordering::Relaxed), 5);
        assert_eq!(c.metrics().unwrap().get(MetricType::Hit), 0);

        // Still usable afterwards.
        c.set(&9, 9, 1);
        c.wait();
        assert_eq!(c.get(&9).as_deref(), Some(&9));
    }

    #[test]
    fn closed_cache_is_inert() {
        let c = cache(100);
        c.set(&1, 1, 1);
        c.wait();
        c.close();
        assert!(c.is_closed());
        assert!(!c.set(&2, 2, 1));
        assert!(c.get(&1).is_none());
        assert!(c.get_ttl(&1).is_none());
        c.del(&1);
        c.wait();
        c.clear();
        c.update_max_cost(5);
        assert_eq!(c.max_cost(), 100);
        c.close();
    }

    #[test]
    fn on_exit_sees_replaced_and_deleted_values() {
        let exits = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&exits);
        let c: Cache<u64, u64> = CacheBuilder::new(1_000, 100)
            .ignore_internal_cost(true)
            .on_exit(move |v: &u64| sink.lock().push(*v))
            .build()
            .unwrap();
        c.set(&1, 10, 1);
        c.wait();
        c.set(&1, 11, 1);
        c.del(&1);
        c.wait();
        assert_eq!(*exits.lock(), vec![10, 11]);
    }

    #[test]
    fn snapshot_provider_respects_metrics_flag() {
        let with = cache(10);
        assert!(with.snapshot().is_some());
        let without: Cache<u64, u64> = CacheBuilder::new(100, 10).build().unwrap();
        assert!(without.snapshot().is_none());
        assert!(without.metrics().is_none());
    }
}
