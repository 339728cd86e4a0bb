use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use super::percentiles::LatencyDistribution;
use crate::collector::{
    Sample, SampleSets, QUANTILE_LABEL, RESOURCE_LABEL, SCOPE_LABEL, SUBRESOURCE_LABEL,
    VERB_LABEL,
};
use crate::error::{Result, SloError};

// ─── Public types ────────────────────────────────────────────────

/// Identity of one aggregate record.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct AggregateKey {
    pub resource: String,
    pub subresource: String,
    pub verb: String,
    pub scope: String,
}

impl AggregateKey {
    pub fn new(
        resource: impl Into<String>,
        subresource: impl Into<String>,
        verb: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            resource: resource.into(),
            subresource: subresource.into(),
            verb: verb.into(),
            scope: scope.into(),
        }
    }

    pub fn from_sample(sample: &Sample) -> Self {
        Self::new(
            sample.label(RESOURCE_LABEL),
            sample.label(SUBRESOURCE_LABEL),
            sample.label(VERB_LABEL),
            sample.label(SCOPE_LABEL),
        )
    }
}

/// Merged view of one API call dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregateRecord {
    pub key: AggregateKey,
    pub latency: LatencyDistribution,
    pub count: u64,
    pub slow_count: u64,
}

impl AggregateRecord {
    fn new(key: AggregateKey) -> Self {
        Self {
            key,
            ..Self::default()
        }
    }
}

impl fmt::Display for AggregateRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{Resource:{} Subresource:{} Verb:{} Scope:{} Latency:{{{}}} Count:{} SlowCount:{}}}",
            self.key.resource,
            self.key.subresource,
            self.key.verb,
            self.key.scope,
            self.latency,
            self.count,
            self.slow_count,
        )
    }
}

// ─── MetricsAggregator ───────────────────────────────────────────

/// Keyed mapping owned by a single gather pass.
///
/// Records are created on first reference and only ever upserted, so the
/// three sample sets can be folded in any order.
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    records: BTreeMap<AggregateKey, AggregateRecord>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold every sample set into a fresh aggregator.
    pub fn from_samples(sets: &SampleSets) -> Result<Self> {
        let mut m = Self::new();

        for sample in &sets.latency {
            m.add_latency_sample(sample)?;
        }
        for sample in &sets.count {
            m.set_count(AggregateKey::from_sample(sample), round_count(sample.value));
        }
        for sample in &sets.slow_count {
            m.set_slow_count(AggregateKey::from_sample(sample), round_count(sample.value));
        }

        Ok(m)
    }

    /// Sample value is seconds; the `quantile` label picks the percentile.
    pub fn add_latency_sample(&mut self, sample: &Sample) -> Result<()> {
        let label = sample.label(QUANTILE_LABEL);
        let quantile: f64 = label.parse().map_err(|_| SloError::MalformedSample {
            label: label.to_string(),
        })?;

        let key = AggregateKey::from_sample(sample);
        match Duration::try_from_secs_f64(sample.value) {
            Ok(latency) => self.set_latency(key, quantile, latency),
            Err(_) => {
                // NaN from an empty histogram, or a negative value: the key
                // still exists, the percentile stays unset.
                debug!(?key, value = sample.value, "latency sample not representable");
                self.entry(key);
            }
        }
        Ok(())
    }

    pub fn set_latency(&mut self, key: AggregateKey, quantile: f64, latency: Duration) {
        let record = self.entry(key);
        if !record.latency.set_quantile(quantile, latency) {
            debug!(key = ?record.key, quantile, "ignoring untracked quantile");
        }
    }

    /// A zero count is absence of data and never clears a recorded value.
    pub fn set_count(&mut self, key: AggregateKey, count: u64) {
        if count == 0 {
            return;
        }
        self.entry(key).count = count;
    }

    /// Same zero rule as `set_count`.
    pub fn set_slow_count(&mut self, key: AggregateKey, count: u64) {
        if count == 0 {
            return;
        }
        self.entry(key).slow_count = count;
    }

    pub fn get(&self, key: &AggregateKey) -> Option<&AggregateRecord> {
        self.records.get(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in key order.
    pub fn records(&self) -> impl Iterator<Item = &AggregateRecord> {
        self.records.values()
    }

    /// Records by descending 99th percentile. Equal percentiles keep key order.
    pub fn sorted(&self) -> Vec<&AggregateRecord> {
        let mut all: Vec<&AggregateRecord> = self.records.values().collect();
        all.sort_by(|a, b| b.latency.perc99.cmp(&a.latency.perc99));
        all
    }

    fn entry(&mut self, key: AggregateKey) -> &mut AggregateRecord {
        self.records
            .entry(key)
            .or_insert_with_key(|k| AggregateRecord::new(k.clone()))
    }
}

/// Nearest whole count. Negative and non-finite values count as zero.
fn round_count(value: f64) -> u64 {
    let rounded = value.round();
    if rounded.is_finite() && rounded > 0.0 {
        rounded as u64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_count_handles_backend_noise() {
        assert_eq!(round_count(2.49), 2);
        assert_eq!(round_count(2.5), 3);
        assert_eq!(round_count(0.4), 0);
        assert_eq!(round_count(-3.0), 0);
        assert_eq!(round_count(f64::NAN), 0);
    }

    #[test]
    fn nan_latency_still_creates_record() {
        let mut m = MetricsAggregator::new();
        let sample = Sample::new(f64::NAN)
            .with_label("resource", "pods")
            .with_label("verb", "GET")
            .with_label("quantile", "0.99");
        m.add_latency_sample(&sample).unwrap();

        let record = m.get(&AggregateKey::new("pods", "", "GET", "")).unwrap();
        assert!(!record.latency.has_data());
    }
}
