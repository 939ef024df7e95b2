//! Power-of-two bucketed histogram used for eviction ages.
//!
//! ```text
//!   bounds:  1  2  4  8  ...  65536   (seconds)
//!   bucket i counts values in [bounds[i-1], bounds[i]); the last bucket is
//!   open-ended.
//! ```

/// Number of power-of-two bounds (2^0 ..= 2^16).
const NUM_BOUNDS: usize = 17;

/// Mutable histogram; guarded by the owner's lock.
#[derive(Debug, Clone)]
pub struct LifeHistogram {
    bounds: Vec<u64>,
    counts: Vec<u64>,
    count: u64,
    sum: u64,
    min: u64,
    max: u64,
}

impl Default for LifeHistogram {
    fn default() -> Self {
        Self::new()
    }
}

impl LifeHistogram {
    pub fn new() -> Self {
        let bounds = (0..NUM_BOUNDS as u32).map(|exp| 1u64 << exp).collect();
        Self {
            bounds,
            counts: vec![0; NUM_BOUNDS + 1],
            count: 0,
            sum: 0,
            min: u64::MAX,
            max: 0,
        }
    }

    /// Records one observation.
    pub fn update(&mut self, value: u64) {
        let idx = self.bounds.partition_point(|bound| *bound <= value);
        self.counts[idx] += 1;
        self.count += 1;
        self.sum = self.sum.saturating_add(value);
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        HistogramSnapshot {
            bounds: self.bounds.clone(),
            counts: self.counts.clone(),
            count: self.count,
            sum: self.sum,
            min: if self.count == 0 { 0 } else { self.min },
            max: self.max,
        }
    }
}

/// Point-in-time copy of a [`LifeHistogram`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistogramSnapshot {
    pub bounds: Vec<u64>,
    pub counts: Vec<u64>,
    pub count: u64,
    pub sum: u64,
    pub min: u64,
    pub max: u64,
}

impl HistogramSnapshot {
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum as f64 / self.count as f64
        }
    }

    /// Upper bound of the bucket containing the `p`-th percentile
    /// (`p` in `[0, 1]`). The open-ended bucket reports `max`.
    pub fn percentile(&self, p: f64) -> u64 {
        if self.count == 0 {
            return 0;
        }
        let target = (p.clamp(0.0, 1.0) * self.count as f64).ceil().max(1.0) as u64;
        let mut seen = 0;
        for (idx, count) in self.counts.iter().enumerate() {
            seen += count;
            if seen >= target {
                return self.bounds.get(idx).copied().unwrap_or(self.max);
            }
        }
        self.max
    }
}
