use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::collector::{QueryExecutor, SampleCollector};
use crate::config::{GatherOptions, MeasurementConfig, MEASUREMENT_NAME};
use crate::error::{ObjectiveViolation, Result};
use crate::metrics::MetricsAggregator;
use crate::query::QueryBuilder;
use crate::report::{PerfData, Reporter, Summary};
use crate::validator::Validator;

/// Result of a completed pass. `violation` is the only soft failure.
#[derive(Debug, Clone, PartialEq)]
pub struct GatherOutcome {
    pub summary: Summary,
    pub violation: Option<ObjectiveViolation>,
}

impl GatherOutcome {
    pub fn passed(&self) -> bool {
        self.violation.is_none()
    }
}

/// Gathers API call latency from the backend and checks it against the
/// per-call latency objectives.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiResponsivenessGatherer;

impl ApiResponsivenessGatherer {
    pub fn name(&self) -> &'static str {
        MEASUREMENT_NAME
    }

    /// Evaluates at the current instant.
    pub fn gather<E>(
        &self,
        executor: &E,
        start: DateTime<Utc>,
        config: &MeasurementConfig,
    ) -> Result<GatherOutcome>
    where
        E: QueryExecutor + ?Sized,
    {
        self.gather_at(executor, start, Utc::now(), config)
    }

    /// One full pass evaluated at `now`.
    pub fn gather_at<E>(
        &self,
        executor: &E,
        start: DateTime<Utc>,
        now: DateTime<Utc>,
        config: &MeasurementConfig,
    ) -> Result<GatherOutcome>
    where
        E: QueryExecutor + ?Sized,
    {
        let options = GatherOptions::from_config(config)?;
        let elapsed = elapsed_between(start, now);
        debug!(?options, elapsed_secs = elapsed.as_secs(), "gathering api call metrics");

        let plan = QueryBuilder::new(elapsed).plan(&options);
        let samples = SampleCollector::new(executor, now).collect(&plan)?;
        let metrics = MetricsAggregator::from_samples(&samples)?;

        let ranked = metrics.sorted();
        let validator = Validator::new(options.allowed_slow_calls);
        let review = Reporter::new(config.identifier.as_str()).review(&ranked, &validator);

        let summary = Summary::json(options.summary_name, &PerfData::from_records(ranked))?;

        let violation = ObjectiveViolation::from_violations(review.violations);
        if let Some(v) = &violation {
            warn!(failing = v.len(), "api call latency objective violated");
        }

        Ok(GatherOutcome { summary, violation })
    }
}

/// Zero when `start` is after `now`.
pub fn elapsed_between(start: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - start).to_std().unwrap_or(Duration::ZERO)
}
