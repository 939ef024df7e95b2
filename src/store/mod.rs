//! Sharded value storage and its expiration index.

pub mod expiration;
pub mod sharded;

use std::sync::Arc;
use std::time::Instant;

pub use expiration::{BUCKET_WIDTH, ExpirationIndex};
pub use sharded::{ShardedStore, UpdateOutcome, UpdatePredicate};

/// A hashed cache entry as it travels through the write path and callbacks.
///
/// `key` and `conflict` are the two hashes produced by the cache's
/// [`KeyHasher`](crate::hash::KeyHasher); the original key is never kept.
#[derive(Debug)]
pub struct Item<V> {
    pub key: u64,
    pub conflict: u64,
    pub value: Arc<V>,
    pub cost: i64,
    /// `None` means the entry never expires.
    pub expiration: Option<Instant>,
}

impl<V> Clone for Item<V> {
    fn clone(&self) -> Self {
        Self {
            key: self.key,
            conflict: self.conflict,
            value: Arc::clone(&self.value),
            cost: self.cost,
            expiration: self.expiration,
        }
    }
}
