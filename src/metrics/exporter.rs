use std::io::Write;

use parking_lot::Mutex;

use crate::metrics::snapshot::MetricsSnapshot;
use crate::metrics::traits::MetricsExporter;

/// Prometheus text exporter for cache metrics snapshots.
///
/// This exporter writes in the Prometheus text exposition format so it can be
/// scraped by Prometheus or forwarded to an OpenTelemetry collector.
#[derive(Debug)]
pub struct PrometheusTextExporter<W: Write + Send> {
    prefix: String,
    writer: Mutex<W>,
}

impl<W: Write + Send> PrometheusTextExporter<W> {
    pub fn new(prefix: impl Into<String>, writer: W) -> Self {
        Self {
            prefix: prefix.into(),
            writer: Mutex::new(writer),
        }
    }

    /// Consumes the exporter and returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn write_sample(&self, kind: &str, name: &str, value: impl std::fmt::Display) {
        let mut writer = self.writer.lock();
        let _ = writeln!(writer, "# TYPE {} {}", name, kind);
        let _ = writeln!(writer, "{} {}", name, value);
    }

    fn write_counter(&self, name: &str, value: u64) {
        self.write_sample("counter", name, value);
    }

    fn write_gauge(&self, name: &str, value: f64) {
        self.write_sample("gauge", name, value);
    }

    fn metric_name(&self, suffix: &str) -> String {
        if self.prefix.is_empty() {
            suffix.to_string()
        } else {
            format!("{}_{}", self.prefix, suffix)
        }
    }
}

impl<W: Write + Send> MetricsExporter<MetricsSnapshot> for PrometheusTextExporter<W> {
    fn export(&self, snapshot: &MetricsSnapshot) {
        let counters = [
            ("hits_total", snapshot.hits),
            ("misses_total", snapshot.misses),
            ("keys_added_total", snapshot.keys_added),
            ("keys_updated_total", snapshot.keys_updated),
            ("keys_evicted_total", snapshot.keys_evicted),
            ("cost_added_total", snapshot.cost_added),
            ("cost_evicted_total", snapshot.cost_evicted),
            ("sets_dropped_total", snapshot.sets_dropped),
            ("sets_rejected_total", snapshot.sets_rejected),
            ("gets_dropped_total", snapshot.gets_dropped),
            ("gets_kept_total", snapshot.gets_kept),
        ];
        for (suffix, value) in counters {
            self.write_counter(&self.metric_name(suffix), value);
        }
        self.write_gauge(&self.metric_name("hit_ratio"), snapshot.ratio());

        let life = &snapshot.life_expectancy;
        self.write_gauge(
            &self.metric_name("life_expectancy_seconds_mean"),
            life.mean(),
        );
        self.write_gauge(
            &self.metric_name("life_expectancy_seconds_p99"),
            life.percentile(0.99) as f64,
        );
    }
}
