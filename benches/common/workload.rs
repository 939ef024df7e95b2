//! Workload generators for hit-rate benchmarks.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sketchcache::Cache;

#[derive(Debug, Clone, Copy)]
pub enum Workload {
    /// Uniform random keys in `[0, universe)`.
    Uniform,
    /// Zipfian distribution - models real-world skewed access patterns.
    /// `theta` controls skew: 0.0 = uniform, 0.99 = highly skewed (YCSB default).
    Zipfian { theta: f64 },
    /// Zipfian reads interrupted every `period` accesses by a one-off scan of
    /// `len` cold keys.
    ZipfianWithScans { theta: f64, period: u64, len: u64 },
}

#[derive(Debug, Clone, Copy)]
pub struct WorkloadSpec {
    pub universe: u64,
    pub workload: Workload,
    pub seed: u64,
}

impl WorkloadSpec {
    pub fn generator(self) -> WorkloadGenerator {
        WorkloadGenerator::new(self.universe, self.workload, self.seed)
    }
}

#[derive(Debug, Clone)]
pub struct WorkloadGenerator {
    universe: u64,
    workload: Workload,
    rng: StdRng,
    zipfian: Option<ZipfianState>,
    issued: u64,
    scan_left: u64,
    scan_next: u64,
}

impl WorkloadGenerator {
    pub fn new(universe: u64, workload: Workload, seed: u64) -> Self {
        let universe = universe.max(1);
        let zipfian = match workload {
            Workload::Zipfian { theta } | Workload::ZipfianWithScans { theta, .. } => {
                Some(ZipfianState::new(universe, theta))
            },
            Workload::Uniform => None,
        };
        Self {
            universe,
            workload,
            rng: StdRng::seed_from_u64(seed),
            zipfian,
            issued: 0,
            scan_left: 0,
            scan_next: universe,
        }
    }

    pub fn next_key(&mut self) -> u64 {
        self.issued += 1;
        match self.workload {
            Workload::Uniform => self.rng.gen_range(0..self.universe),
            Workload::Zipfian { .. } => self.zipf(),
            Workload::ZipfianWithScans { period, len, .. } => {
                if self.scan_left == 0 && period > 0 && self.issued % period == 0 {
                    self.scan_left = len;
                }
                if self.scan_left > 0 {
                    self.scan_left -= 1;
                    self.scan_next += 1;
                    // Scan keys live above the Zipfian universe and never repeat.
                    return self.scan_next;
                }
                self.zipf()
            },
        }
    }

    fn zipf(&mut self) -> u64 {
        let u: f64 = self.rng.gen();
        match &self.zipfian {
            Some(zipf) => zipf.sample(u),
            None => (u * self.universe as f64) as u64,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HitRate {
    pub hits: u64,
    pub misses: u64,
}

impl HitRate {
    pub fn hit_rate(self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Run a hit-rate workload against a cache: lookup, and set with unit cost
/// on miss.
pub fn run_hit_rate(
    cache: &Cache<u64, u64>,
    generator: &mut WorkloadGenerator,
    operations: usize,
) -> HitRate {
    let mut hits = 0u64;
    let mut misses = 0u64;

    for _ in 0..operations {
        let key = generator.next_key();
        if cache.get(&key).is_some() {
            hits += 1;
        } else {
            misses += 1;
            cache.set(&key, key, 1);
        }
    }

    HitRate { hits, misses }
}

/// Zipfian distribution state for inverse CDF sampling.
///
/// Uses the algorithm from YCSB (Yahoo Cloud Serving Benchmark).
/// Pre-computes zeta values for efficient sampling.
#[derive(Debug, Clone)]
struct ZipfianState {
    n: u64,
    theta: f64,
    zeta_n: f64,
    alpha: f64,
    eta: f64,
}

impl ZipfianState {
    fn new(n: u64, theta: f64) -> Self {
        let theta = theta.clamp(0.0, 0.9999); // Avoid division issues at theta=1
        let zeta_2 = Self::zeta(2, theta);
        let zeta_n = Self::zeta(n, theta);
        let alpha = 1.0 / (1.0 - theta);
        let eta = (1.0 - (2.0 / n as f64).powf(1.0 - theta)) / (1.0 - zeta_2 / zeta_n);

        Self {
            n,
            theta,
            zeta_n,
            alpha,
            eta,
        }
    }

    /// Compute zeta(n, theta) = sum(1/i^theta for i in 1..=n)
    fn zeta(n: u64, theta: f64) -> f64 {
        (1..=n).map(|i| 1.0 / (i as f64).powf(theta)).sum()
    }

    /// Sample from Zipfian distribution given uniform random u in [0, 1).
    fn sample(&self, u: f64) -> u64 {
        let uz = u * self.zeta_n;

        if uz < 1.0 {
            return 0;
        }

        if uz < 1.0 + 0.5_f64.powf(self.theta) {
            return 1;
        }

        let spread = (self.n as f64) * (self.eta * u - self.eta + 1.0).powf(self.alpha);
        (spread as u64).min(self.n - 1)
    }
}
