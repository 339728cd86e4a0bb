use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::metrics::percentiles::as_millis_f64;
use crate::metrics::AggregateRecord;
use crate::validator::{Objective, Validator};

/// Bumped whenever the shape of `PerfData` changes.
pub const CURRENT_API_CALL_METRICS_VERSION: &str = "v1";

/// Records printed regardless of outcome. Failing records are printed even
/// when ranked lower.
pub const TOP_TO_PRINT: usize = 5;

// ─── Wire format ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerfData {
    pub version: String,
    pub data_items: Vec<DataItem>,
}

/// One record: latency percentiles in `data`, identity and counts in `labels`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataItem {
    pub data: BTreeMap<String, f64>,
    pub unit: String,
    pub labels: BTreeMap<String, String>,
}

impl DataItem {
    pub fn from_record(record: &AggregateRecord) -> Self {
        let data = BTreeMap::from([
            ("Perc50".to_string(), as_millis_f64(record.latency.perc50)),
            ("Perc90".to_string(), as_millis_f64(record.latency.perc90)),
            ("Perc99".to_string(), as_millis_f64(record.latency.perc99)),
        ]);
        let labels = BTreeMap::from([
            ("Verb".to_string(), record.key.verb.clone()),
            ("Resource".to_string(), record.key.resource.clone()),
            ("Subresource".to_string(), record.key.subresource.clone()),
            ("Scope".to_string(), record.key.scope.clone()),
            ("Count".to_string(), record.count.to_string()),
            ("SlowCount".to_string(), record.slow_count.to_string()),
        ]);

        Self {
            data,
            unit: "ms".to_string(),
            labels,
        }
    }
}

impl PerfData {
    /// `ranked` order is preserved in the output.
    pub fn from_records<'a, I>(ranked: I) -> Self
    where
        I: IntoIterator<Item = &'a AggregateRecord>,
    {
        Self {
            version: CURRENT_API_CALL_METRICS_VERSION.to_string(),
            data_items: ranked.into_iter().map(DataItem::from_record).collect(),
        }
    }
}

/// Named report handed back to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub name: String,
    pub ext: String,
    pub content: String,
}

impl Summary {
    pub fn json(name: impl Into<String>, perf_data: &PerfData) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            ext: "json".to_string(),
            content: serde_json::to_string_pretty(perf_data)?,
        })
    }
}

// ─── Reporter ────────────────────────────────────────────────────

/// Outcome of walking the ranked records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Review {
    /// Failure descriptions in ranked order.
    pub violations: Vec<String>,
    /// Diagnostic lines that were logged.
    pub lines: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Reporter {
    identifier: String,
    top: usize,
}

impl Reporter {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            top: TOP_TO_PRINT,
        }
    }

    pub fn with_top(mut self, top: usize) -> Self {
        self.top = top;
        self
    }

    /// Validate every ranked record, logging the top N and every failure.
    pub fn review(&self, ranked: &[&AggregateRecord], validator: &Validator) -> Review {
        let mut review = Review::default();

        for (rank, record) in ranked.iter().enumerate() {
            let outcome = validator.validate(record);
            let failed = outcome.is_err();

            if rank < self.top || failed {
                let line = self.diagnostic_line(record, failed);
                if failed {
                    warn!("{line}");
                } else {
                    info!("{line}");
                }
                review.lines.push(line);
            }
            if let Err(violation) = outcome {
                review.violations.push(violation);
            }
        }

        review
    }

    fn diagnostic_line(&self, record: &AggregateRecord, failed: bool) -> String {
        let prefix = if failed { "WARNING " } else { "" };
        format!(
            "{}: {}Top latency metric: {}; threshold: {}",
            self.identifier,
            prefix,
            record,
            Objective::for_record(record),
        )
    }
}
