//! sketchcache: a concurrent, cost-bounded in-process cache.
//!
//! Entries are admitted by a TinyLFU frequency sketch, evicted by sampled
//! LFU, and optionally expire after a TTL. Reads never block; writes are
//! buffered and applied in order by a background coordinator thread.
//!
//! ```
//! use sketchcache::prelude::*;
//!
//! let cache: Cache<u64, &str> = CacheBuilder::new(1_000, 10)
//!     .ignore_internal_cost(true)
//!     .build()
//!     .unwrap();
//!
//! cache.set(&1, "one", 1);
//! cache.wait();
//! assert_eq!(cache.get(&1).as_deref(), Some(&"one"));
//! ```
//!
//! ## Modules
//!
//! - [`cache`]: the [`Cache`] facade and its coordinator.
//! - [`builder`]: configuration and construction.
//! - [`policy`]: TinyLFU admission and sampled-LFU eviction.
//! - [`store`]: sharded value storage and the TTL index.
//! - [`ds`]: sketch, doorkeeper, access batcher and shard selection.
//! - [`metrics`]: counters, snapshots and Prometheus export.

pub mod builder;
pub mod cache;
pub mod ds;
pub mod error;
pub mod hash;
pub mod metrics;
pub mod policy;
pub mod prelude;
pub mod store;

pub use builder::CacheBuilder;
pub use cache::Cache;
pub use store::Item;
