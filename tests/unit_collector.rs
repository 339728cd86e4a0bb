use std::cell::RefCell;

use api_responsiveness::{
    GatherOptions, Query, QueryBuilder, QueryError, QueryExecutor, QueryKind, Sample,
    SampleCollector, SloError,
};
use chrono::{DateTime, TimeZone, Utc};

/// Answers every query with one sample and records what it was asked.
#[derive(Default)]
struct RecordingExecutor {
    fail_on_call: Option<usize>,
    calls: RefCell<Vec<(QueryKind, DateTime<Utc>)>>,
}

impl QueryExecutor for RecordingExecutor {
    fn query(&self, query: &Query, at: DateTime<Utc>) -> Result<Vec<Sample>, QueryError> {
        let mut calls = self.calls.borrow_mut();
        calls.push((query.kind(), at));
        if self.fail_on_call == Some(calls.len()) {
            return Err(QueryError::new("backend unavailable"));
        }
        Ok(vec![Sample::new(1.0)
            .with_label("resource", "pods")
            .with_label("quantile", "bogus")])
    }
}

fn instant() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn options(simple: bool, allowed_slow_calls: i64) -> GatherOptions {
    GatherOptions {
        use_simple_latency_query: simple,
        allowed_slow_calls,
        ..GatherOptions::default()
    }
}

#[test]
fn test_simple_mode_tags_each_result_with_its_quantile() {
    let executor = RecordingExecutor::default();
    let plan = QueryBuilder::new(std::time::Duration::from_secs(600)).plan(&options(true, 0));

    let sets = SampleCollector::new(&executor, instant()).collect(&plan).unwrap();

    assert_eq!(executor.calls.borrow().len(), 4);
    let tags: Vec<_> = sets.latency.iter().map(|s| s.label("quantile")).collect();
    // Backend-provided quantile labels are overwritten
    assert_eq!(tags, vec!["0.50", "0.90", "0.99"]);
    assert_eq!(sets.count.len(), 1);
    assert!(sets.slow_count.is_empty());
}

#[test]
fn test_windowed_mode_keeps_backend_labels() {
    let executor = RecordingExecutor::default();
    let plan = QueryBuilder::new(std::time::Duration::from_secs(600)).plan(&options(false, 0));

    let sets = SampleCollector::new(&executor, instant()).collect(&plan).unwrap();
    assert_eq!(sets.latency.len(), 1);
    assert_eq!(sets.latency[0].label("quantile"), "bogus");
}

#[test]
fn test_all_queries_share_one_instant() {
    let executor = RecordingExecutor::default();
    let plan = QueryBuilder::new(std::time::Duration::from_secs(600)).plan(&options(true, 5));

    let sets = SampleCollector::new(&executor, instant()).collect(&plan).unwrap();

    let calls = executor.calls.borrow();
    assert_eq!(calls.len(), 7);
    assert!(calls.iter().all(|(_, at)| *at == instant()));
    assert_eq!(sets.slow_count.len(), 3);
}

#[test]
fn test_first_failure_aborts() {
    let executor = RecordingExecutor {
        fail_on_call: Some(2),
        ..RecordingExecutor::default()
    };
    let plan = QueryBuilder::new(std::time::Duration::from_secs(600)).plan(&options(true, 5));

    let err = SampleCollector::new(&executor, instant()).collect(&plan).unwrap_err();

    // No query after the failing one is issued
    assert_eq!(executor.calls.borrow().len(), 2);
    match err {
        SloError::Query { query, source } => {
            assert!(query.starts_with("histogram_quantile(0.90, "));
            assert_eq!(source.message(), "backend unavailable");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_missing_label_reads_empty() {
    let sample = Sample::new(0.0).with_label("verb", "GET");
    assert_eq!(sample.label("verb"), "GET");
    assert_eq!(sample.label("scope"), "");
}
