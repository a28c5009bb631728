//! Input metrics
//!
//! Counters and histograms updated by a polling worker. Every method takes
//! `&self` so a single sink can be shared across workers.
//!
//! [`InputMetrics`] keeps its collectors in its own `prometheus::Registry`,
//! so several instances can live in one process (one per test, one per CLI
//! run) without name clashes in the global registry.

use crate::error::{Error, Result};
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use std::time::Duration;

/// Receiver of per-interval measurements
pub trait MetricsSink: Send + Sync {
    /// An interval finished, successfully or not
    fn interval_executed(&self, elapsed: Duration, pages: u64);
    /// An interval ended with an error
    fn interval_failed(&self);
    /// One page was fetched and processed
    fn page_executed(&self, elapsed: Duration);
    fn event_published(&self);
    fn event_publish_failed(&self);
}

/// Sink that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn interval_executed(&self, _: Duration, _: u64) {}
    fn interval_failed(&self) {}
    fn page_executed(&self, _: Duration) {}
    fn event_published(&self) {}
    fn event_publish_failed(&self) {}
}

/// Count and sum of the observations of one histogram
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HistogramSummary {
    pub count: u64,
    pub sum: f64,
}

impl HistogramSummary {
    fn of(histogram: &Histogram) -> Self {
        Self {
            count: histogram.get_sample_count(),
            sum: histogram.get_sample_sum(),
        }
    }

    /// Mean observation, zero when nothing was observed
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Point-in-time copy of [`InputMetrics`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub intervals_total: u64,
    pub intervals_errors_total: u64,
    pub pages_total: u64,
    pub events_published_total: u64,
    pub events_publish_failed_total: u64,
    /// Seconds
    pub interval_execution_time: HistogramSummary,
    /// Seconds
    pub page_execution_time: HistogramSummary,
    pub interval_pages: HistogramSummary,
}

/// Prometheus counters and histograms for polling inputs
pub struct InputMetrics {
    registry: Registry,
    intervals_total: IntCounter,
    intervals_errors_total: IntCounter,
    pages_total: IntCounter,
    events_published_total: IntCounter,
    events_publish_failed_total: IntCounter,
    interval_execution_time: Histogram,
    page_execution_time: Histogram,
    interval_pages: Histogram,
}

impl std::fmt::Debug for InputMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputMetrics")
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}

// Buckets: 1ms to 60s
const DURATION_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0,
];

// Buckets: 1 to 1000 pages
const PAGE_BUCKETS: &[f64] = &[1.0, 2.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0];

impl InputMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let intervals_total = counter(
            &registry,
            "httpjson_interval_total",
            "Total number of intervals executed",
        )?;
        let intervals_errors_total = counter(
            &registry,
            "httpjson_interval_errors_total",
            "Total number of interval errors",
        )?;
        let pages_total = counter(
            &registry,
            "httpjson_interval_pages_total",
            "Total number of pages fetched",
        )?;
        let events_published_total = counter(
            &registry,
            "httpjson_events_published_total",
            "Total number of events published",
        )?;
        let events_publish_failed_total = counter(
            &registry,
            "httpjson_events_publish_failed_total",
            "Total number of events that failed to publish",
        )?;

        let interval_execution_time = histogram(
            &registry,
            "httpjson_interval_execution_seconds",
            "Interval execution time",
            DURATION_BUCKETS,
        )?;
        let page_execution_time = histogram(
            &registry,
            "httpjson_interval_page_execution_seconds",
            "Per-page execution time",
            DURATION_BUCKETS,
        )?;
        let interval_pages = histogram(
            &registry,
            "httpjson_interval_pages",
            "Pages fetched per interval",
            PAGE_BUCKETS,
        )?;

        Ok(Self {
            registry,
            intervals_total,
            intervals_errors_total,
            pages_total,
            events_published_total,
            events_publish_failed_total,
            interval_execution_time,
            page_execution_time,
            interval_pages,
        })
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            intervals_total: self.intervals_total.get(),
            intervals_errors_total: self.intervals_errors_total.get(),
            pages_total: self.pages_total.get(),
            events_published_total: self.events_published_total.get(),
            events_publish_failed_total: self.events_publish_failed_total.get(),
            interval_execution_time: HistogramSummary::of(&self.interval_execution_time),
            page_execution_time: HistogramSummary::of(&self.page_execution_time),
            interval_pages: HistogramSummary::of(&self.interval_pages),
        }
    }

    /// Encode every collector in the Prometheus text format
    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        if encoder.encode(&families, &mut buffer).is_ok() {
            String::from_utf8(buffer).unwrap_or_default()
        } else {
            String::new()
        }
    }
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter> {
    let counter =
        IntCounter::new(name, help).map_err(|e| Error::metrics(format!("{name}: {e}")))?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| Error::metrics(format!("{name}: {e}")))?;
    Ok(counter)
}

fn histogram(registry: &Registry, name: &str, help: &str, buckets: &[f64]) -> Result<Histogram> {
    let opts = HistogramOpts::new(name, help).buckets(buckets.to_vec());
    let histogram =
        Histogram::with_opts(opts).map_err(|e| Error::metrics(format!("{name}: {e}")))?;
    registry
        .register(Box::new(histogram.clone()))
        .map_err(|e| Error::metrics(format!("{name}: {e}")))?;
    Ok(histogram)
}

impl MetricsSink for InputMetrics {
    fn interval_executed(&self, elapsed: Duration, pages: u64) {
        self.intervals_total.inc();
        self.interval_execution_time.observe(elapsed.as_secs_f64());
        self.interval_pages.observe(pages as f64);
    }

    fn interval_failed(&self) {
        self.intervals_errors_total.inc();
    }

    fn page_executed(&self, elapsed: Duration) {
        self.pages_total.inc();
        self.page_execution_time.observe(elapsed.as_secs_f64());
    }

    fn event_published(&self) {
        self.events_published_total.inc();
    }

    fn event_publish_failed(&self) {
        self.events_publish_failed_total.inc();
    }
}
