use std::fmt;

use crate::metrics::histogram::HistogramSnapshot;

/// Point-in-time view of a cache's counters.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,

    pub keys_added: u64,
    pub keys_updated: u64,
    pub keys_evicted: u64,

    pub cost_added: u64,
    pub cost_evicted: u64,

    pub sets_dropped: u64,  // write channel was full
    pub sets_rejected: u64, // admission said no
    pub gets_dropped: u64,  // access batches lost to a full policy channel
    pub gets_kept: u64,

    // seconds between admission and eviction
    pub life_expectancy: HistogramSnapshot,
}

impl MetricsSnapshot {
    /// Hit ratio in `[0, 1]`.
    pub fn ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hit: {} miss: {} keys-added: {} keys-updated: {} keys-evicted: {} \
             cost-added: {} cost-evicted: {} sets-dropped: {} sets-rejected: {} \
             gets-dropped: {} gets-kept: {} gets-total: {} hit-ratio: {:.2}",
            self.hits,
            self.misses,
            self.keys_added,
            self.keys_updated,
            self.keys_evicted,
            self.cost_added,
            self.cost_evicted,
            self.sets_dropped,
            self.sets_rejected,
            self.gets_dropped,
            self.gets_kept,
            self.hits + self.misses,
            self.ratio()
        )
    }
}
