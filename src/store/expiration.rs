//! Time-bucketed index of expiring keys.
//!
//! ## Architecture
//!
//! ```text
//!   epoch                                                   now
//!     │◄── width ──►│◄── width ──►│◄── width ──►│◄── width ──►│
//!     │  bucket 1   │  bucket 2   │  bucket 3   │  bucket 4   │
//!
//!   expiration t lands in bucket floor((t - epoch) / width) + 1
//!   drain_due(now) drains every bucket <= floor((now - epoch) / width)
//! ```
//!
//! A bucket is only drained once its whole time window has passed, so every
//! key handed back by [`ExpirationIndex::drain_due`] was due at or before
//! `now`. Keys may linger for up to one bucket width past their deadline;
//! readers recheck the deadline themselves.
//!
//! The index stores `key → conflict` per bucket. It never decides whether an
//! entry is still expired (a key may have been re-set with a later deadline
//! since it was indexed); the owning store rechecks that before evicting.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

/// Width of one expiration bucket.
pub const BUCKET_WIDTH: Duration = Duration::from_secs(5);

type Bucket = FxHashMap<u64, u64>;

#[derive(Debug, Default)]
struct Buckets {
    by_bucket: BTreeMap<u64, Bucket>,
}

/// Thread-safe bucket index keyed by expiration time.
#[derive(Debug)]
pub struct ExpirationIndex {
    epoch: Instant,
    width_secs: u64,
    inner: Mutex<Buckets>,
}

impl Default for ExpirationIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpirationIndex {
    /// Creates an index with [`BUCKET_WIDTH`] buckets starting now.
    pub fn new() -> Self {
        Self::with_bucket_width(Instant::now(), BUCKET_WIDTH)
    }

    /// Creates an index whose bucket 0 starts at `epoch`. Widths under one
    /// second are rounded up to one second.
    pub fn with_bucket_width(epoch: Instant, width: Duration) -> Self {
        Self {
            epoch,
            width_secs: width.as_secs().max(1),
            inner: Mutex::new(Buckets::default()),
        }
    }

    pub fn epoch(&self) -> Instant {
        self.epoch
    }

    fn window(&self, t: Instant) -> u64 {
        t.saturating_duration_since(self.epoch).as_secs() / self.width_secs
    }

    fn storage_bucket(&self, expiration: Instant) -> u64 {
        self.window(expiration) + 1
    }

    /// Indexes `key` under its expiration bucket.
    pub fn add(&self, key: u64, conflict: u64, expiration: Instant) {
        let bucket = self.storage_bucket(expiration);
        self.inner
            .lock()
            .by_bucket
            .entry(bucket)
            .or_default()
            .insert(key, conflict);
    }

    /// Moves `key` from the bucket of `old` to the bucket of `new`.
    pub fn update(&self, key: u64, conflict: u64, old: Option<Instant>, new: Option<Instant>) {
        let old_bucket = old.map(|t| self.storage_bucket(t));
        let new_bucket = new.map(|t| self.storage_bucket(t));
        let mut inner = self.inner.lock();
        if let Some(bucket) = old_bucket {
            remove_from(&mut inner.by_bucket, bucket, key);
        }
        if let Some(bucket) = new_bucket {
            inner.by_bucket.entry(bucket).or_default().insert(key, conflict);
        }
    }

    /// Drops `key` from the bucket of `expiration`.
    pub fn del(&self, key: u64, expiration: Instant) {
        let bucket = self.storage_bucket(expiration);
        remove_from(&mut self.inner.lock().by_bucket, bucket, key);
    }

    /// Removes and returns every `(key, conflict)` whose bucket window has
    /// fully elapsed at `now`.
    pub fn drain_due(&self, now: Instant) -> Vec<(u64, u64)> {
        let mark = self.window(now);
        let mut inner = self.inner.lock();
        if inner.by_bucket.first_key_value().map_or(true, |(first, _)| *first > mark) {
            return Vec::new();
        }
        let later = inner.by_bucket.split_off(&(mark + 1));
        let due = std::mem::replace(&mut inner.by_bucket, later);
        due.into_values().flat_map(|bucket| bucket.into_iter()).collect()
    }

    /// Number of indexed keys.
    pub fn len(&self) -> usize {
        self.inner.lock().by_bucket.values().map(|b| b.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.lock().by_bucket.clear();
    }
}

fn remove_from(buckets: &mut BTreeMap<u64, Bucket>, bucket: u64, key: u64) {
    if let Some(keys) = buckets.get_mut(&bucket) {
        keys.remove(&key);
        if keys.is_empty() {
            buckets.remove(&bucket);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn keys_drain_only_after_their_window() {
        let epoch = Instant::now();
        let index = ExpirationIndex::with_bucket_width(epoch, BUCKET_WIDTH);
        index.add(1, 11, epoch + secs(3));
        index.add(2, 22, epoch + secs(7));

        assert!(index.drain_due(epoch + secs(4)).is_empty());
        assert_eq!(index.drain_due(epoch + secs(5)), vec![(1, 11)]);
        assert!(index.drain_due(epoch + secs(9)).is_empty());
        assert_eq!(index.drain_due(epoch + secs(10)), vec![(2, 22)]);
        assert!(index.is_empty());
    }

    #[test]
    fn late_cleanup_drains_every_elapsed_bucket() {
        let epoch = Instant::now();
        let index = ExpirationIndex::with_bucket_width(epoch, BUCKET_WIDTH);
        for key in 0..10u64 {
            index.add(key, key, epoch + secs(key * 4));
        }
        let mut due = index.drain_due(epoch + secs(60));
        due.sort_unstable();
        assert_eq!(due.len(), 10);
        assert_eq!(due[0], (0, 0));
    }

    #[test]
    fn key_indexed_into_an_already_swept_window_still_drains() {
        let epoch = Instant::now();
        let index = ExpirationIndex::with_bucket_width(epoch, BUCKET_WIDTH);
        index.add(1, 1, epoch + secs(12));
        assert_eq!(index.drain_due(epoch + secs(20)), vec![(1, 1)]);

        // Deadline lies in a window the previous sweep already covered.
        index.add(2, 2, epoch + secs(3));
        assert_eq!(index.drain_due(epoch + secs(21)), vec![(2, 2)]);
        assert!(index.is_empty());
    }

    #[test]
    fn update_moves_between_buckets() {
        let epoch = Instant::now();
        let index = ExpirationIndex::with_bucket_width(epoch, BUCKET_WIDTH);
        index.add(1, 5, epoch + secs(2));
        index.update(1, 5, Some(epoch + secs(2)), Some(epoch + secs(22)));
        assert!(index.drain_due(epoch + secs(10)).is_empty());
        assert_eq!(index.drain_due(epoch + secs(25)), vec![(1, 5)]);

        index.add(2, 6, epoch + secs(30));
        index.update(2, 6, Some(epoch + secs(30)), None);
        assert!(index.is_empty());

        index.update(3, 7, None, Some(epoch + secs(31)));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn del_removes_key_and_empty_bucket() {
        let epoch = Instant::now();
        let index = ExpirationIndex::with_bucket_width(epoch, BUCKET_WIDTH);
        index.add(1, 1, epoch + secs(1));
        index.add(2, 2, epoch + secs(2));
        index.del(1, epoch + secs(1));
        assert_eq!(index.len(), 1);
        index.del(2, epoch + secs(2));
        assert!(index.is_empty());
        // Unknown keys are ignored.
        index.del(3, epoch + secs(3));
    }

    #[test]
    fn clear_forgets_everything() {
        let index = ExpirationIndex::new();
        index.add(1, 1, index.epoch() + secs(100));
        index.clear();
        assert!(index.is_empty());
        assert!(index.drain_due(index.epoch() + secs(1_000)).is_empty());
    }
}
