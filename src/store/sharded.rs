//! 256-way sharded map from key hash to value.
//!
//! ## Architecture
//!
//! ```text
//!   key hash ──► ShardSelector (key % 256) ──► RwLock<FxHashMap<u64, StoreEntry>>
//!                                                    │
//!                                 entries with a deadline are mirrored into
//!                                                    ▼
//!                                             ExpirationIndex
//! ```
//!
//! ## Conflict hashes
//! Keys are never stored; a second, independent hash (the *conflict* hash)
//! guards against two keys sharing a primary hash. Reads, updates and deletes
//! carrying a non-zero conflict that does not match the stored one behave as
//! if the key were absent. A zero conflict matches anything; the policy uses
//! that to evict victims it only knows by primary hash.
//!
//! ## Expiry
//! Reads treat an entry whose deadline is not after "now" as absent, whether
//! or not the background sweep has reached it yet.
//!
//! ## Thread Safety
//! Per-shard `parking_lot::RwLock`. Lock order is shard, then expiration
//! index; the index is never held while a shard lock is taken.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::ds::ShardSelector;
use crate::policy::EvictionPolicy;
use crate::store::Item;
use crate::store::expiration::ExpirationIndex;

/// Decides whether `new` may replace `old` for an existing key.
pub type UpdatePredicate<V> = Arc<dyn Fn(&V, &V) -> bool + Send + Sync>;

/// Result of [`ShardedStore::update`].
#[derive(Debug)]
pub enum UpdateOutcome<V> {
    /// Value replaced; carries the previous value.
    Updated(Arc<V>),
    /// The update predicate refused; carries the value still stored.
    Skipped(Arc<V>),
    /// No entry for this key and conflict.
    Missing,
}

#[derive(Debug)]
struct StoreEntry<V> {
    conflict: u64,
    value: Arc<V>,
    expiration: Option<Instant>,
}

type Shard<V> = RwLock<FxHashMap<u64, StoreEntry<V>>>;

pub struct ShardedStore<V> {
    shards: Vec<Shard<V>>,
    selector: ShardSelector,
    expiry: ExpirationIndex,
    should_update: UpdatePredicate<V>,
}

impl<V> std::fmt::Debug for ShardedStore<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardedStore")
            .field("shards", &self.shards.len())
            .field("len", &self.len())
            .field("expiry", &self.expiry)
            .finish()
    }
}

impl<V: 'static> Default for ShardedStore<V> {
    fn default() -> Self {
        Self::new(Arc::new(|_: &V, _: &V| true))
    }
}

#[inline]
fn conflict_matches(stored: u64, given: u64) -> bool {
    given == 0 || stored == given
}

impl<V> ShardedStore<V> {
    pub fn new(should_update: UpdatePredicate<V>) -> Self {
        Self::with_expiration_index(should_update, ExpirationIndex::new())
    }

    /// Creates a store around a caller-built index (e.g. with a fixed epoch).
    pub fn with_expiration_index(should_update: UpdatePredicate<V>, expiry: ExpirationIndex) -> Self {
        let selector = ShardSelector::default();
        let shards = (0..selector.shard_count())
            .map(|_| RwLock::new(FxHashMap::default()))
            .collect();
        Self {
            shards,
            selector,
            expiry,
            should_update,
        }
    }

    #[inline]
    fn shard(&self, key: u64) -> &Shard<V> {
        &self.shards[self.selector.shard_for_hash(key)]
    }

    pub fn expiration_index(&self) -> &ExpirationIndex {
        &self.expiry
    }

    /// Live value for `key`, if present, matching and unexpired.
    pub fn get(&self, key: u64, conflict: u64) -> Option<Arc<V>> {
        self.get_at(key, conflict, Instant::now())
    }

    /// [`get`](Self::get) evaluated as of `now`.
    pub fn get_at(&self, key: u64, conflict: u64, now: Instant) -> Option<Arc<V>> {
        let shard = self.shard(key).read();
        let entry = shard.get(&key)?;
        if !conflict_matches(entry.conflict, conflict) {
            return None;
        }
        match entry.expiration {
            Some(deadline) if deadline <= now => None,
            _ => Some(Arc::clone(&entry.value)),
        }
    }

    /// Deadline of `key`, or `None` if absent or never expiring.
    pub fn expiration(&self, key: u64) -> Option<Instant> {
        self.shard(key).read().get(&key).and_then(|e| e.expiration)
    }

    /// Whether an entry exists for `key` regardless of conflict or deadline.
    pub fn contains(&self, key: u64) -> bool {
        self.shard(key).read().contains_key(&key)
    }

    /// Inserts or overwrites. An existing entry with a different conflict, or
    /// one the update predicate refuses to replace, is left untouched and
    /// `false` is returned.
    pub fn set(&self, item: &Item<V>) -> bool {
        let mut shard = self.shard(item.key).write();
        if let Some(entry) = shard.get_mut(&item.key) {
            if !conflict_matches(entry.conflict, item.conflict) {
                return false;
            }
            if !(self.should_update)(&item.value, &entry.value) {
                return false;
            }
            if entry.expiration != item.expiration {
                self.expiry
                    .update(item.key, entry.conflict, entry.expiration, item.expiration);
            }
            entry.value = Arc::clone(&item.value);
            entry.expiration = item.expiration;
            return true;
        }
        if let Some(deadline) = item.expiration {
            self.expiry.add(item.key, item.conflict, deadline);
        }
        shard.insert(
            item.key,
            StoreEntry {
                conflict: item.conflict,
                value: Arc::clone(&item.value),
                expiration: item.expiration,
            },
        );
        true
    }

    /// Replaces the value of an existing entry only.
    pub fn update(&self, item: &Item<V>) -> UpdateOutcome<V> {
        let mut shard = self.shard(item.key).write();
        let Some(entry) = shard.get_mut(&item.key) else {
            return UpdateOutcome::Missing;
        };
        if !conflict_matches(entry.conflict, item.conflict) {
            return UpdateOutcome::Missing;
        }
        if !(self.should_update)(&item.value, &entry.value) {
            return UpdateOutcome::Skipped(Arc::clone(&entry.value));
        }
        if entry.expiration != item.expiration {
            self.expiry
                .update(item.key, entry.conflict, entry.expiration, item.expiration);
        }
        entry.expiration = item.expiration;
        let old = std::mem::replace(&mut entry.value, Arc::clone(&item.value));
        UpdateOutcome::Updated(old)
    }

    /// Removes `key`, returning its conflict hash and value.
    pub fn del(&self, key: u64, conflict: u64) -> Option<(u64, Arc<V>)> {
        let mut shard = self.shard(key).write();
        if !conflict_matches(shard.get(&key)?.conflict, conflict) {
            return None;
        }
        let entry = shard.remove(&key)?;
        if let Some(deadline) = entry.expiration {
            self.expiry.del(key, deadline);
        }
        Some((entry.conflict, entry.value))
    }

    /// Evicts entries whose deadline passed by `now` from both the store and
    /// `policy`. `on_evict` receives each removed entry with the cost the
    /// policy had on record. Returns the number of entries evicted.
    pub fn cleanup_at<F>(&self, now: Instant, policy: &EvictionPolicy, mut on_evict: F) -> usize
    where
        F: FnMut(Item<V>),
    {
        let mut evicted = 0;
        for (key, conflict) in self.expiry.drain_due(now) {
            match self.expiration(key) {
                Some(deadline) if deadline <= now => {},
                // Re-set with a later deadline or removed since indexing.
                _ => continue,
            }
            let Some((conflict, value)) = self.del(key, conflict) else {
                continue;
            };
            let cost = policy.del(key).unwrap_or_default();
            on_evict(Item {
                key,
                conflict,
                value,
                cost,
                expiration: None,
            });
            evicted += 1;
        }
        evicted
    }

    /// [`cleanup_at`](Self::cleanup_at) as of now.
    pub fn cleanup<F>(&self, policy: &EvictionPolicy, on_evict: F) -> usize
    where
        F: FnMut(Item<V>),
    {
        self.cleanup_at(Instant::now(), policy, on_evict)
    }

    /// Empties every shard and the expiration index. `on_evict` sees each
    /// removed entry with a zero cost.
    pub fn clear<F>(&self, mut on_evict: F)
    where
        F: FnMut(Item<V>),
    {
        for shard in &self.shards {
            let drained: Vec<_> = shard.write().drain().collect();
            for (key, entry) in drained {
                on_evict(Item {
                    key,
                    conflict: entry.conflict,
                    value: entry.value,
                    cost: 0,
                    expiration: entry.expiration,
                });
            }
        }
        self.expiry.clear();
    }

    /// Stored keys across all shards, in shard order.
    pub fn keys(&self) -> Vec<u64> {
        let mut keys = Vec::with_capacity(self.len());
        for shard in &self.shards {
            keys.extend(shard.read().keys().copied());
        }
        keys
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.read().is_empty())
    }
}
