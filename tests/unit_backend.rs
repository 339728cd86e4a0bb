use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use api_responsiveness::load_generator::{self, synthesize, LoadProfile};
use api_responsiveness::{
    AggregateKey, ApiCall, InMemoryBackend, QueryBuilder, QueryExecutor, QueryKind, SlowCategory,
};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn call(resource: &str, verb: &str, scope: &str, ms: u64) -> ApiCall {
    ApiCall {
        key: AggregateKey::new(resource, "", verb, scope),
        latency: Duration::from_millis(ms),
    }
}

fn builder() -> QueryBuilder {
    QueryBuilder::new(Duration::from_secs(600))
}

#[test]
fn test_count_excludes_events_and_watch() {
    let backend = InMemoryBackend::new();
    backend.record(call("pods", "GET", "resource", 10));
    backend.record(call("pods", "GET", "resource", 20));
    backend.record(call("events", "POST", "resource", 5));
    backend.record(call("pods", "WATCH", "namespace", 5));

    let samples = backend.query(&builder().count_query(), Utc::now()).unwrap();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].label("resource"), "pods");
    assert_eq!(samples[0].value, 2.0);
    assert_eq!(backend.total_calls(), 4);
    assert_eq!(backend.series_count(), 3);
}

#[test]
fn test_windowed_latency_is_labeled() {
    let backend = InMemoryBackend::new();
    backend.record(call("pods", "GET", "resource", 100));

    let samples = backend
        .query(&builder().windowed_latency_query(), Utc::now())
        .unwrap();
    let quantiles: Vec<_> = samples.iter().map(|s| s.label("quantile")).collect();
    assert_eq!(quantiles, vec!["0.5", "0.9", "0.99"]);
    for s in &samples {
        assert!((s.value - 0.1).abs() < 0.001, "got {}", s.value);
    }
}

#[test]
fn test_simple_latency_is_unlabeled() {
    let backend = InMemoryBackend::new();
    backend.record(call("pods", "GET", "resource", 100));

    let query = builder().simple_latency_query(0.99);
    assert_eq!(query.kind(), QueryKind::SimpleLatency { quantile: 0.99 });
    let samples = backend.query(&query, Utc::now()).unwrap();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].label("quantile"), "");
}

#[test]
fn test_slow_count_per_category() {
    let backend = InMemoryBackend::new();
    backend.record(call("pods", "GET", "resource", 500));
    backend.record(call("pods", "GET", "resource", 2_000));
    backend.record(call("pods", "LIST", "namespace", 3_000));
    backend.record(call("pods", "LIST", "namespace", 6_000));
    backend.record(call("nodes", "LIST", "cluster", 40_000));

    let resource = backend
        .query(&builder().slow_count_query(SlowCategory::Resource), Utc::now())
        .unwrap();
    // The resource filter does not exclude LIST
    assert_eq!(resource.len(), 3);

    let namespace = backend
        .query(&builder().slow_count_query(SlowCategory::NamespaceList), Utc::now())
        .unwrap();
    assert_eq!(namespace.len(), 1);
    assert_eq!(namespace[0].value, 1.0);

    let cluster = backend
        .query(&builder().slow_count_query(SlowCategory::ClusterList), Utc::now())
        .unwrap();
    assert_eq!(cluster.len(), 1);
    assert_eq!(cluster[0].label("resource"), "nodes");
    assert_eq!(cluster[0].value, 1.0);
}

#[test]
fn test_slow_count_is_exact_just_above_bound() {
    let backend = InMemoryBackend::new();
    for _ in 0..3 {
        backend.record(ApiCall {
            key: AggregateKey::new("pods", "", "GET", "resource"),
            latency: Duration::from_micros(1_000_400),
        });
    }
    backend.record(call("pods", "GET", "resource", 1_000));

    let resource = backend
        .query(&builder().slow_count_query(SlowCategory::Resource), Utc::now())
        .unwrap();
    assert_eq!(resource.len(), 1);
    // Exactly 1s is not slow; 400µs above it is
    assert_eq!(resource[0].value, 3.0);
}

#[test]
fn test_injected_failure_and_reset() {
    let backend = InMemoryBackend::new();
    backend.record(call("pods", "GET", "resource", 10));
    backend.fail_with("connection refused");

    let err = backend.query(&builder().count_query(), Utc::now()).unwrap_err();
    assert_eq!(err.message(), "connection refused");

    backend.reset();
    assert_eq!(backend.total_calls(), 0);
    assert!(backend.query(&builder().count_query(), Utc::now()).unwrap().is_empty());
}

#[test]
fn test_synthesize_slow_calls_exceed_every_objective() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..50 {
        let c = synthesize(&mut rng, 100);
        assert!(c.latency > Duration::from_secs(30));
    }
}

#[tokio::test]
async fn test_load_generator_records_until_deadline() {
    let backend = Arc::new(InMemoryBackend::new());
    let running = Arc::new(AtomicBool::new(true));
    let profile = LoadProfile {
        concurrency: 2,
        duration: Duration::from_millis(50),
        slow_pct: 0,
    };

    load_generator::run(running.clone(), backend.clone(), profile).await;

    assert!(backend.total_calls() > 0);
    assert!(!running.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_load_generator_stops_when_flag_cleared() {
    let backend = Arc::new(InMemoryBackend::new());
    let running = Arc::new(AtomicBool::new(false));
    let profile = LoadProfile {
        concurrency: 2,
        duration: Duration::from_secs(60),
        slow_pct: 0,
    };

    // Returns well before the deadline
    tokio::time::timeout(
        Duration::from_secs(5),
        load_generator::run(running, backend.clone(), profile),
    )
    .await
    .expect("generator ignored the cleared flag");

    assert_eq!(backend.total_calls(), 0);
}
