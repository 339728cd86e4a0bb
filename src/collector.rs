use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{QueryError, Result, SloError};
use crate::query::{format_quantile, Query, QueryKind, QueryPlan};

pub const RESOURCE_LABEL: &str = "resource";
pub const SUBRESOURCE_LABEL: &str = "subresource";
pub const VERB_LABEL: &str = "verb";
pub const SCOPE_LABEL: &str = "scope";
pub const QUANTILE_LABEL: &str = "quantile";

/// One labeled scalar returned by the backend.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Sample {
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

impl Sample {
    pub fn new(value: f64) -> Self {
        Self {
            labels: BTreeMap::new(),
            value,
        }
    }

    pub fn with_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(name.into(), value.into());
        self
    }

    /// Missing labels read as the empty string.
    pub fn label(&self, name: &str) -> &str {
        self.labels.get(name).map(String::as_str).unwrap_or("")
    }
}

/// The monitoring backend, seen as a blocking query service.
pub trait QueryExecutor {
    fn query(&self, query: &Query, at: DateTime<Utc>) -> std::result::Result<Vec<Sample>, QueryError>;
}

impl<E: QueryExecutor + ?Sized> QueryExecutor for &E {
    fn query(&self, query: &Query, at: DateTime<Utc>) -> std::result::Result<Vec<Sample>, QueryError> {
        (**self).query(query, at)
    }
}

impl<E: QueryExecutor + ?Sized> QueryExecutor for Arc<E> {
    fn query(&self, query: &Query, at: DateTime<Utc>) -> std::result::Result<Vec<Sample>, QueryError> {
        (**self).query(query, at)
    }
}

/// Raw results of one pass, split by the query family that produced them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleSets {
    pub latency: Vec<Sample>,
    pub count: Vec<Sample>,
    pub slow_count: Vec<Sample>,
}

/// Runs a `QueryPlan` against an executor at a single evaluation instant.
pub struct SampleCollector<'a, E: ?Sized> {
    executor: &'a E,
    at: DateTime<Utc>,
}

impl<'a, E: QueryExecutor + ?Sized> SampleCollector<'a, E> {
    pub fn new(executor: &'a E, at: DateTime<Utc>) -> Self {
        Self { executor, at }
    }

    pub fn evaluation_time(&self) -> DateTime<Utc> {
        self.at
    }

    /// Issues every query in order. The first failure aborts the pass and
    /// nothing collected so far is returned.
    pub fn collect(&self, plan: &QueryPlan) -> Result<SampleSets> {
        let mut sets = SampleSets::default();

        for query in &plan.latency {
            sets.latency.extend(self.run(query)?);
        }
        sets.count = self.run(&plan.count)?;
        for query in &plan.slow_count {
            sets.slow_count.extend(self.run(query)?);
        }

        Ok(sets)
    }

    fn run(&self, query: &Query) -> Result<Vec<Sample>> {
        let mut samples = self
            .executor
            .query(query, self.at)
            .map_err(|source| SloError::Query {
                query: query.text().to_string(),
                source,
            })?;

        // The histogram_quantile form drops the quantile it was asked for.
        if let QueryKind::SimpleLatency { quantile } = query.kind() {
            let tag = format_quantile(quantile);
            for sample in &mut samples {
                sample.labels.insert(QUANTILE_LABEL.to_string(), tag.clone());
            }
        }

        debug!(
            kind = ?query.kind(),
            window_secs = query.window().as_secs(),
            samples = samples.len(),
            "query executed"
        );
        Ok(samples)
    }
}
