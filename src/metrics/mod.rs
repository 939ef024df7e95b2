//! Cache metrics: striped counters, an eviction-age histogram, snapshots and
//! exporters.

pub mod counters;
pub mod exporter;
pub mod histogram;
pub mod snapshot;
pub mod traits;

pub use counters::{MetricType, Metrics};
pub use exporter::PrometheusTextExporter;
pub use histogram::{HistogramSnapshot, LifeHistogram};
pub use snapshot::MetricsSnapshot;
pub use traits::{MetricsExporter, MetricsReset, MetricsSnapshotProvider};
