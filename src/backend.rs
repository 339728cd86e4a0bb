use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use tracing::debug;

use crate::collector::{
    QueryExecutor, Sample, QUANTILE_LABEL, RESOURCE_LABEL, SCOPE_LABEL, SUBRESOURCE_LABEL,
    VERB_LABEL,
};
use crate::error::QueryError;
use crate::metrics::{AggregateKey, LatencyDistribution};
use crate::query::{is_streaming_verb, Query, QueryKind, SlowCategory};

// ─── Configuration ───────────────────────────────────────────────

/// HdrHistogram range: 1 μs → 10 min, 3 significant figures
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 600_000_000;
const HIST_SIGFIG: u8 = 3;

/// Quantile labels carried by the per-minute latency recording rule.
const RECORDED_QUANTILES: [&str; 3] = ["0.5", "0.9", "0.99"];

// ─── Public types ────────────────────────────────────────────────

/// A single observed API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiCall {
    pub key: AggregateKey,
    pub latency: Duration,
}

/// Thread-safe stand-in for the monitoring backend.
///
/// Load generators call `record()`; a gather pass queries it through
/// `QueryExecutor`. Queries are answered from their `QueryKind`, and range
/// windows are not applied: the store holds one measurement's worth of calls.
pub struct InMemoryBackend {
    inner: Mutex<Inner>,
}

// ─── Internal state ──────────────────────────────────────────────

struct Inner {
    series: BTreeMap<AggregateKey, Series>,
    total_calls: u64,
    // Set by `fail_with`; every query errors while present
    failure: Option<String>,
}

/// One dimension's calls: an HdrHistogram of microsecond latencies plus
/// exact slow counters, indexed like `SlowCategory::ALL`. Slow counts never
/// come from the histogram, whose buckets straddle the category bounds.
struct Series {
    hist: Histogram<u64>,
    slow: [u64; SlowCategory::ALL.len()],
}

impl Series {
    fn new() -> Self {
        Self {
            hist: Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG)
                .expect("histogram creation"),
            slow: [0; SlowCategory::ALL.len()],
        }
    }
}

// ─── InMemoryBackend impl ────────────────────────────────────────

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
        }
    }

    pub fn record(&self, call: ApiCall) {
        self.inner.lock().record(call);
    }

    /// Wipe all data, including any injected failure.
    pub fn reset(&self) {
        *self.inner.lock() = Inner::new();
    }

    /// Make every following query fail with `message`.
    pub fn fail_with(&self, message: impl Into<String>) {
        self.inner.lock().failure = Some(message.into());
    }

    pub fn total_calls(&self) -> u64 {
        self.inner.lock().total_calls
    }

    /// Number of distinct dimensions observed.
    pub fn series_count(&self) -> usize {
        self.inner.lock().series.len()
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryExecutor for InMemoryBackend {
    fn query(&self, query: &Query, at: DateTime<Utc>) -> Result<Vec<Sample>, QueryError> {
        let inner = self.inner.lock();
        if let Some(message) = &inner.failure {
            return Err(QueryError::new(message.clone()));
        }

        let samples = match query.kind() {
            QueryKind::WindowedLatency => inner.windowed_latency(),
            QueryKind::SimpleLatency { quantile } => inner.latency_at(quantile),
            QueryKind::Count => inner.counts(),
            QueryKind::SlowCount(category) => inner.slow_counts(category),
        };
        debug!(%at, kind = ?query.kind(), samples = samples.len(), "in-memory query");
        Ok(samples)
    }
}

// ─── Inner impl ──────────────────────────────────────────────────

impl Inner {
    fn new() -> Self {
        Self {
            series: BTreeMap::new(),
            total_calls: 0,
            failure: None,
        }
    }

    fn record(&mut self, call: ApiCall) {
        let series = self.series.entry(call.key).or_insert_with(Series::new);

        for (slot, category) in series.slow.iter_mut().zip(SlowCategory::ALL) {
            if call.latency > category.bucket_bound() {
                *slot += 1;
            }
        }

        // Clamp to the histogram range
        let us = (call.latency.as_micros() as u64).clamp(HIST_LOW, HIST_HIGH);
        series.hist.saturating_record(us);
        self.total_calls += 1;
    }

    /// Series selected by the common latency/count filter.
    fn filtered(&self) -> impl Iterator<Item = (&AggregateKey, &Histogram<u64>)> {
        self.series
            .iter()
            .filter(|(k, _)| k.resource != "events" && !is_streaming_verb(&k.verb))
            .map(|(k, s)| (k, &s.hist))
    }

    fn windowed_latency(&self) -> Vec<Sample> {
        let mut out = Vec::new();
        for (key, hist) in self.filtered() {
            let dist = LatencyDistribution::from_histogram(hist);
            let values = [dist.perc50, dist.perc90, dist.perc99];
            for (label, value) in RECORDED_QUANTILES.into_iter().zip(values) {
                out.push(sample(key, value.as_secs_f64()).with_label(QUANTILE_LABEL, label));
            }
        }
        out
    }

    fn latency_at(&self, quantile: f64) -> Vec<Sample> {
        self.filtered()
            .map(|(key, hist)| {
                let us = hist.value_at_quantile(quantile);
                sample(key, Duration::from_micros(us).as_secs_f64())
            })
            .collect()
    }

    fn counts(&self) -> Vec<Sample> {
        self.filtered()
            .map(|(key, hist)| sample(key, hist.len() as f64))
            .collect()
    }

    /// Calls strictly slower than the category bound. Matching series with no
    /// slow calls still report a zero, as the real backend does.
    fn slow_counts(&self, category: SlowCategory) -> Vec<Sample> {
        let Some(slot) = SlowCategory::ALL.iter().position(|c| *c == category) else {
            return Vec::new();
        };
        self.series
            .iter()
            .filter(|(k, _)| category.matches(&k.verb, &k.scope))
            .map(|(key, series)| sample(key, series.slow[slot] as f64))
            .collect()
    }
}

fn sample(key: &AggregateKey, value: f64) -> Sample {
    Sample::new(value)
        .with_label(RESOURCE_LABEL, key.resource.as_str())
        .with_label(SUBRESOURCE_LABEL, key.subresource.as_str())
        .with_label(VERB_LABEL, key.verb.as_str())
        .with_label(SCOPE_LABEL, key.scope.as_str())
}
