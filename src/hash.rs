//! Key hashing strategies.
//!
//! The cache never stores user keys. Every key is reduced to a pair of
//! independent 64-bit hashes:
//!
//! - the **key hash** addresses the store shard, the policy's cost map and the
//!   admission sketch;
//! - the **conflict hash** is kept next to the stored value and checked on
//!   every read, update and delete so that two keys whose key hashes collide
//!   never observe each other's values.
//!
//! A conflict hash of `0` disables the check for that operation.
//!
//! ## Example Usage
//!
//! ```
//! use sketchcache::hash::{DefaultKeyHasher, KeyHasher};
//!
//! let hasher = DefaultKeyHasher;
//! let (key, conflict) = hasher.hash_key("user:42");
//! assert_eq!(hasher.hash_key("user:42"), (key, conflict));
//!
//! // Any closure with the right shape is a hasher too.
//! let identity = |k: &u64| (*k, 0u64);
//! assert_eq!(identity.hash_key(&7), (7, 0));
//! ```

use std::collections::hash_map::DefaultHasher;
use std::hash::{BuildHasher, Hash, Hasher};

use rustc_hash::FxBuildHasher;

/// Turns a user key into `(key_hash, conflict_hash)`.
pub trait KeyHasher<K: ?Sized>: Send + Sync {
    fn hash_key(&self, key: &K) -> (u64, u64);
}

impl<K: ?Sized, F> KeyHasher<K> for F
where
    F: Fn(&K) -> (u64, u64) + Send + Sync,
{
    #[inline]
    fn hash_key(&self, key: &K) -> (u64, u64) {
        self(key)
    }
}

/// Hasher for any `Hash` key.
///
/// The key hash comes from FxHash, the conflict hash from SipHash, so a
/// collision in one is independent of a collision in the other.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultKeyHasher;

impl<K: Hash + ?Sized> KeyHasher<K> for DefaultKeyHasher {
    fn hash_key(&self, key: &K) -> (u64, u64) {
        let primary = FxBuildHasher.hash_one(key);
        let mut sip = DefaultHasher::new();
        key.hash(&mut sip);
        (primary, sip.finish())
    }
}
