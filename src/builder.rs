//! Cache construction and configuration.
//!
//! `CacheBuilder` collects sizing knobs and injectable collaborators, checks
//! them, and starts the cache's background threads.
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//!
//! use sketchcache::builder::CacheBuilder;
//!
//! let cache = CacheBuilder::<u64, String>::new(10_000, 1 << 20)
//!     .cost(|v: &String| v.len() as i64)
//!     .ttl_tick_interval(Duration::from_millis(500))
//!     .metrics(true)
//!     .build()
//!     .unwrap();
//!
//! cache.set(&1, "hello".to_string(), 0);
//! cache.wait();
//! assert!(cache.get(&1).is_some());
//! ```
//!
//! ## Defaults
//!
//! | Setting              | Default                 |
//! |----------------------|-------------------------|
//! | `buffer_items`       | [`DEFAULT_BUFFER_ITEMS`] |
//! | `set_buffer_size`    | [`DEFAULT_SET_BUFFER`]   |
//! | `ttl_tick_interval`  | [`DEFAULT_TTL_TICK`]     |
//! | `metrics`            | off                     |
//! | `ignore_internal_cost` | off                   |
//! | key hasher           | [`DefaultKeyHasher`]     |

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::cache::{Cache, CacheParts, Callbacks};
use crate::error::ConfigError;
use crate::hash::{DefaultKeyHasher, KeyHasher};
use crate::metrics::Metrics;
use crate::policy::EvictionPolicy;
use crate::store::{Item, UpdatePredicate};

/// Keys per access-batch stripe.
pub const DEFAULT_BUFFER_ITEMS: usize = 64;
/// Capacity of the write channel feeding the coordinator.
pub const DEFAULT_SET_BUFFER: usize = 32 * 1024;
/// Interval between expiration sweeps.
pub const DEFAULT_TTL_TICK: Duration = Duration::from_secs(1);

/// Builder for [`Cache`].
pub struct CacheBuilder<K: ?Sized, V> {
    num_counters: usize,
    max_cost: i64,
    buffer_items: usize,
    set_buffer_size: usize,
    ttl_tick_interval: Duration,
    metrics: bool,
    ignore_internal_cost: bool,
    seed: Option<u64>,
    key_hasher: Box<dyn KeyHasher<K>>,
    callbacks: Callbacks<V>,
    should_update: Option<UpdatePredicate<V>>,
}

impl<K: ?Sized, V> std::fmt::Debug for CacheBuilder<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheBuilder")
            .field("num_counters", &self.num_counters)
            .field("max_cost", &self.max_cost)
            .field("buffer_items", &self.buffer_items)
            .field("set_buffer_size", &self.set_buffer_size)
            .field("ttl_tick_interval", &self.ttl_tick_interval)
            .field("metrics", &self.metrics)
            .field("ignore_internal_cost", &self.ignore_internal_cost)
            .field("seed", &self.seed)
            .finish_non_exhaustive()
    }
}

impl<K: Hash + ?Sized, V> CacheBuilder<K, V> {
    /// Starts a builder using [`DefaultKeyHasher`].
    ///
    /// `num_counters` sizes the admission sketch (roughly 10x the expected
    /// number of live entries works well); `max_cost` bounds the total cost
    /// of admitted entries.
    pub fn new(num_counters: usize, max_cost: i64) -> Self {
        Self::with_key_hasher(num_counters, max_cost, DefaultKeyHasher)
    }
}

impl<K: ?Sized, V> CacheBuilder<K, V> {
    /// Starts a builder for keys that are not `Hash`, or that need a custom
    /// hashing scheme.
    pub fn with_key_hasher(
        num_counters: usize,
        max_cost: i64,
        key_hasher: impl KeyHasher<K> + 'static,
    ) -> Self {
        Self {
            num_counters,
            max_cost,
            buffer_items: DEFAULT_BUFFER_ITEMS,
            set_buffer_size: DEFAULT_SET_BUFFER,
            ttl_tick_interval: DEFAULT_TTL_TICK,
            metrics: false,
            ignore_internal_cost: false,
            seed: None,
            key_hasher: Box::new(key_hasher),
            callbacks: Callbacks::default(),
            should_update: None,
        }
    }

    /// Replaces the key hasher. Closures `Fn(&K) -> (u64, u64)` qualify.
    pub fn key_hasher(mut self, key_hasher: impl KeyHasher<K> + 'static) -> Self {
        self.key_hasher = Box::new(key_hasher);
        self
    }

    /// Keys per access-batch stripe.
    pub fn buffer_items(mut self, buffer_items: usize) -> Self {
        self.buffer_items = buffer_items;
        self
    }

    /// Capacity of the write channel.
    pub fn set_buffer_size(mut self, set_buffer_size: usize) -> Self {
        self.set_buffer_size = set_buffer_size;
        self
    }

    /// Interval between expiration sweeps. Zero selects
    /// [`DEFAULT_TTL_TICK`].
    pub fn ttl_tick_interval(mut self, interval: Duration) -> Self {
        self.ttl_tick_interval = interval;
        self
    }

    pub fn metrics(mut self, enabled: bool) -> Self {
        self.metrics = enabled;
        self
    }

    /// Stops charging the per-entry overhead on top of caller costs.
    pub fn ignore_internal_cost(mut self, ignore: bool) -> Self {
        self.ignore_internal_cost = ignore;
        self
    }

    /// Seeds the sketch's row salts for reproducible admission decisions.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Cost of values set with a cost of zero. Evaluated on the coordinator,
    /// so only for writes that made it through the buffer.
    pub fn cost(mut self, cost: impl Fn(&V) -> i64 + Send + Sync + 'static) -> Self {
        self.callbacks.cost = Some(Arc::new(cost));
        self
    }

    /// Predicate `(new, old)` deciding whether an existing value may be
    /// replaced.
    pub fn should_update(
        mut self,
        should_update: impl Fn(&V, &V) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.should_update = Some(Arc::new(should_update));
        self
    }

    /// Called for every evicted or expired entry, and for pending writes
    /// dropped by [`Cache::clear`].
    pub fn on_evict(mut self, on_evict: impl Fn(&Item<V>) + Send + Sync + 'static) -> Self {
        self.callbacks.on_evict = Some(Arc::new(on_evict));
        self
    }

    /// Called for every write the admission policy turns away.
    pub fn on_reject(mut self, on_reject: impl Fn(&Item<V>) + Send + Sync + 'static) -> Self {
        self.callbacks.on_reject = Some(Arc::new(on_reject));
        self
    }

    /// Called for every value leaving the cache: evicted, rejected, replaced
    /// or deleted.
    pub fn on_exit(mut self, on_exit: impl Fn(&V) + Send + Sync + 'static) -> Self {
        self.callbacks.on_exit = Some(Arc::new(on_exit));
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.num_counters == 0 {
            return Err(ConfigError::new("num_counters must be greater than zero"));
        }
        if self.num_counters.checked_next_power_of_two().is_none() {
            return Err(ConfigError::new(format!(
                "num_counters {} cannot be rounded up to a power of two",
                self.num_counters
            )));
        }
        if self.max_cost <= 0 {
            return Err(ConfigError::new(format!(
                "max_cost must be greater than zero, got {}",
                self.max_cost
            )));
        }
        if self.buffer_items == 0 {
            return Err(ConfigError::new("buffer_items must be greater than zero"));
        }
        if self.set_buffer_size == 0 {
            return Err(ConfigError::new("set_buffer_size must be greater than zero"));
        }
        Ok(())
    }
}

impl<K: ?Sized, V: Send + Sync + 'static> CacheBuilder<K, V> {
    /// Validates the configuration and starts the cache.
    pub fn build(self) -> Result<Cache<K, V>, ConfigError> {
        self.validate()?;
        let num_counters = self
            .num_counters
            .checked_next_power_of_two()
            .ok_or_else(|| ConfigError::new("num_counters is too large"))?;

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let metrics = self.metrics.then(|| Arc::new(Metrics::new()));
        let policy = EvictionPolicy::new(
            num_counters,
            self.max_cost,
            &mut rng,
            metrics.clone(),
        );
        let should_update: UpdatePredicate<V> = match self.should_update {
            Some(predicate) => predicate,
            None => Arc::new(|_: &V, _: &V| true),
        };
        let ttl_tick = if self.ttl_tick_interval.is_zero() {
            DEFAULT_TTL_TICK
        } else {
            self.ttl_tick_interval
        };

        Cache::from_parts(CacheParts {
            key_hasher: self.key_hasher,
            policy,
            should_update,
            metrics,
            callbacks: self.callbacks,
            ignore_internal_cost: self.ignore_internal_cost,
            buffer_items: self.buffer_items,
            set_buffer_size: self.set_buffer_size,
            ttl_tick,
        })
    }
}
