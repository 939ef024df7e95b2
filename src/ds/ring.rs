//! Striped access batcher for read-side frequency tracking.
//!
//! Every cache hit or miss must eventually bump the admission sketch, but
//! taking a lock per read would serialize all readers. Instead, reads append
//! the key hash to a *stripe* borrowed from a lock-free pool. When a stripe
//! fills up its contents are handed to a [`BatchConsumer`] in one go.
//!
//! ## Architecture
//!
//! ```text
//!   get(k) ─► pool.pop() ─► stripe.push(hash) ─► full? ──no──► pool.push(stripe)
//!                                                  │
//!                                                 yes
//!                                                  ▼
//!                                      consumer.push(batch)
//!                                        ├── Ok  → stripe gets a fresh Vec
//!                                        └── Err → batch dropped, Vec reused
//! ```
//!
//! The pool behaves like a free list: an empty pool yields a fresh stripe and
//! a full pool drops the returned one. Losing a partially filled stripe only
//! loses frequency signal, never correctness.

use std::sync::Arc;

use crossbeam::queue::ArrayQueue;

/// Receiver of full access batches.
pub trait BatchConsumer: Send + Sync {
    /// Accepts a batch, or hands it back when it cannot take it right now.
    fn push(&self, keys: Vec<u64>) -> Result<(), Vec<u64>>;
}

impl<T: BatchConsumer + ?Sized> BatchConsumer for Arc<T> {
    fn push(&self, keys: Vec<u64>) -> Result<(), Vec<u64>> {
        (**self).push(keys)
    }
}

#[derive(Debug)]
struct Stripe {
    data: Vec<u64>,
}

impl Stripe {
    fn new(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }
}

/// Pool of fixed-capacity stripes feeding a [`BatchConsumer`].
#[derive(Debug)]
pub struct AccessBatcher<C> {
    consumer: C,
    pool: ArrayQueue<Stripe>,
    capacity: usize,
}

impl<C: BatchConsumer> AccessBatcher<C> {
    /// Creates a batcher whose stripes flush after `capacity` keys.
    ///
    /// The pool holds up to `stripes` idle stripes (at least one).
    pub fn new(consumer: C, capacity: usize, stripes: usize) -> Self {
        Self {
            consumer,
            pool: ArrayQueue::new(stripes.max(1)),
            capacity: capacity.max(1),
        }
    }

    /// Creates a batcher sized for the machine's parallelism.
    pub fn with_default_stripes(consumer: C, capacity: usize) -> Self {
        let stripes = std::thread::available_parallelism()
            .map(|count| count.get())
            .unwrap_or(1)
            * 4;
        Self::new(consumer, capacity, stripes)
    }

    /// Keys per stripe before a flush.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records one key access.
    pub fn push(&self, hash: u64) {
        let mut stripe = self
            .pool
            .pop()
            .unwrap_or_else(|| Stripe::new(self.capacity));
        stripe.data.push(hash);
        if stripe.data.len() >= self.capacity {
            let batch = std::mem::take(&mut stripe.data);
            stripe.data = match self.consumer.push(batch) {
                Ok(()) => Vec::with_capacity(self.capacity),
                Err(mut rejected) => {
                    rejected.clear();
                    rejected
                },
            };
        }
        // A full pool means enough idle stripes exist already.
        let _ = self.pool.push(stripe);
    }
}
