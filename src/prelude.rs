pub use crate::builder::CacheBuilder;
pub use crate::cache::Cache;
pub use crate::error::{ConfigError, InvariantError};
pub use crate::hash::{DefaultKeyHasher, KeyHasher};
pub use crate::metrics::{MetricType, Metrics, MetricsSnapshot, MetricsSnapshotProvider};
pub use crate::store::Item;
