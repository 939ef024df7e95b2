//! Shard selection for pre-hashed keys.
//!
//! Keys reach the store already reduced to a `u64` by the cache's
//! [`KeyHasher`](crate::hash::KeyHasher), so picking a shard is a plain
//! modulo. Keeping the mapping in one place lets the store and its tests agree
//! on which shard owns a key.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                        Shard Selection Flow                         │
//! │                                                                     │
//! │   key hash (u64)                                                    │
//! │       │                                                             │
//! │       ▼                                                             │
//! │   ShardSelector { shards: 256 }  ──►  hash % 256                    │
//! │       │                                                             │
//! │       ▼                                                             │
//! │   ┌─────────┬─────────┬─────────┬─────────┬─────┬───────────┐       │
//! │   │ Shard 0 │ Shard 1 │ Shard 2 │ Shard 3 │ ... │ Shard 255 │       │
//! │   └─────────┴─────────┴─────────┴─────────┴─────┴───────────┘       │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```
//! use sketchcache::ds::ShardSelector;
//!
//! let selector = ShardSelector::new(256);
//! assert_eq!(selector.shard_for_hash(257), 1);
//! assert_eq!(selector.shard_for_hash(255), 255);
//! ```

/// Number of shards used by the cache's store.
pub const NUM_SHARDS: usize = 256;

/// Deterministic modulo shard selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardSelector {
    shards: usize,
}

impl ShardSelector {
    /// Creates a selector for `shards` shards, clamped to at least 1.
    pub fn new(shards: usize) -> Self {
        Self {
            shards: shards.max(1),
        }
    }

    /// Returns the number of shards.
    pub fn shard_count(&self) -> usize {
        self.shards
    }

    /// Maps a key hash to a shard index in `[0, shards)`.
    #[inline]
    pub fn shard_for_hash(&self, hash: u64) -> usize {
        (hash % self.shards as u64) as usize
    }
}

impl Default for ShardSelector {
    fn default() -> Self {
        Self::new(NUM_SHARDS)
    }
}
