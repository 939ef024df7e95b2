//! # Metrics Traits
//!
//! Recording, snapshotting and export are kept apart:
//!
//! ```text
//!   ┌───────────────────────┐      ┌──────────────────────────────┐
//!   │ Metrics (recording)   │ ───► │ MetricsSnapshotProvider<S>   │
//!   │ striped atomics       │      │ (tests, dashboards)          │
//!   └───────────────────────┘      └──────────────┬───────────────┘
//!                                                 │ S
//!                                                 ▼
//!                                  ┌──────────────────────────────┐
//!                                  │ MetricsExporter<S>           │
//!                                  │ (production monitoring)      │
//!                                  └──────────────────────────────┘
//! ```

/// Snapshot provider for bench/testing.
pub trait MetricsSnapshotProvider<S> {
    fn snapshot(&self) -> S;
}

/// Reset metrics between tests or benchmark iterations.
pub trait MetricsReset {
    fn reset_metrics(&self);
}

/// Export/publish metrics to production monitoring backends.
pub trait MetricsExporter<S> {
    fn export(&self, snapshot: &S);
}
