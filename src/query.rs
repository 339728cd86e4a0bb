use std::fmt;
use std::time::Duration;

use crate::config::GatherOptions;

// ─── Query templates ─────────────────────────────────────────────

/// Applied to every latency and count query.
pub const FILTERS: &str = r#"resource!="events", verb!~"WATCH|WATCHLIST|PROXY|CONNECT""#;

/// Latency SLI is computed over 5m windows, so the first 5 minutes of a run
/// carry no complete window.
pub const LATENCY_WINDOW_LOOKBACK: Duration = Duration::from_secs(5 * 60);

/// Lower bound for the windowed latency query range.
pub const MIN_LATENCY_WINDOW: Duration = Duration::from_secs(60);

/// Quantiles requested one query at a time in simplified mode.
pub const SIMPLE_QUANTILES: [f64; 3] = [0.50, 0.90, 0.99];

// ─── Slow-call categories ────────────────────────────────────────

/// Coarse request categories, each with its own "slow" bucket bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlowCategory {
    /// Single-object reads and mutations, slow above 1s.
    Resource,
    /// Namespace-scoped LIST, slow above 5s.
    NamespaceList,
    /// Cluster-scoped LIST, slow above 30s.
    ClusterList,
}

impl SlowCategory {
    /// In the order the slow-count queries are issued.
    pub const ALL: [SlowCategory; 3] = [
        SlowCategory::Resource,
        SlowCategory::NamespaceList,
        SlowCategory::ClusterList,
    ];

    /// Label filter selecting histogram buckets strictly above the bound.
    pub fn filter(self) -> &'static str {
        match self {
            SlowCategory::Resource => r#"verb!~"WATCH|WATCHLIST|PROXY|CONNECT", le!~"0.\\d+|1""#,
            SlowCategory::NamespaceList => {
                r#"scope!="cluster", verb="LIST", le!~"[01234](.\\d+)?|5""#
            }
            SlowCategory::ClusterList => {
                r#"scope="cluster", verb="LIST", le!~"[12]?[0-9](.\\d+)?|30""#
            }
        }
    }

    /// Calls slower than this fall into the category's slow buckets.
    pub fn bucket_bound(self) -> Duration {
        match self {
            SlowCategory::Resource => Duration::from_secs(1),
            SlowCategory::NamespaceList => Duration::from_secs(5),
            SlowCategory::ClusterList => Duration::from_secs(30),
        }
    }

    /// Whether a (verb, scope) pair is selected by `filter()`.
    ///
    /// The resource filter only drops streaming verbs, so LIST calls match it
    /// as well as one of the LIST categories.
    pub fn matches(self, verb: &str, scope: &str) -> bool {
        match self {
            SlowCategory::Resource => !is_streaming_verb(verb),
            SlowCategory::NamespaceList => verb == "LIST" && scope != "cluster",
            SlowCategory::ClusterList => verb == "LIST" && scope == "cluster",
        }
    }
}

/// Verbs excluded by `FILTERS`.
pub fn is_streaming_verb(verb: &str) -> bool {
    matches!(verb, "WATCH" | "WATCHLIST" | "PROXY" | "CONNECT")
}

// ─── Query ───────────────────────────────────────────────────────

/// What a query asks for, independent of its textual form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QueryKind {
    /// 99th percentile over time of the per-minute latency recording rule.
    /// Results carry their own `quantile` label.
    WindowedLatency,
    /// One quantile straight from the duration histogram. Results are
    /// unlabeled and get tagged by the collector.
    SimpleLatency { quantile: f64 },
    Count,
    SlowCount(SlowCategory),
}

impl QueryKind {
    pub fn is_latency(&self) -> bool {
        matches!(self, QueryKind::WindowedLatency | QueryKind::SimpleLatency { .. })
    }
}

/// A built query: its text for the backend plus the structured description
/// it was rendered from.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    kind: QueryKind,
    window: Duration,
    text: String,
}

impl Query {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    /// Range the query aggregates over.
    pub fn window(&self) -> Duration {
        self.window
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Every query of one pass, grouped by the sample set its results feed.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub latency: Vec<Query>,
    pub count: Query,
    /// Empty unless a slow-call tolerance is configured.
    pub slow_count: Vec<Query>,
}

impl QueryPlan {
    /// Queries in issue order: latency, count, slow-count.
    pub fn iter(&self) -> impl Iterator<Item = &Query> {
        self.latency
            .iter()
            .chain(std::iter::once(&self.count))
            .chain(self.slow_count.iter())
    }

    pub fn len(&self) -> usize {
        self.latency.len() + 1 + self.slow_count.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─── QueryBuilder ────────────────────────────────────────────────

/// Renders backend queries for a measurement that has run for `elapsed`.
#[derive(Debug, Clone, Copy)]
pub struct QueryBuilder {
    elapsed: Duration,
}

impl QueryBuilder {
    pub fn new(elapsed: Duration) -> Self {
        Self { elapsed }
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Elapsed time minus the SLI lookback, floored at one minute.
    pub fn latency_window(&self) -> Duration {
        self.elapsed
            .saturating_sub(LATENCY_WINDOW_LOOKBACK)
            .max(MIN_LATENCY_WINDOW)
    }

    pub fn windowed_latency_query(&self) -> Query {
        let window = self.latency_window();
        Query {
            kind: QueryKind::WindowedLatency,
            window,
            text: format!(
                "quantile_over_time(0.99, apiserver:apiserver_request_latency_1m:histogram_quantile{{{}}}[{}])",
                FILTERS,
                prometheus_duration(window),
            ),
        }
    }

    pub fn simple_latency_query(&self, quantile: f64) -> Query {
        Query {
            kind: QueryKind::SimpleLatency { quantile },
            window: self.elapsed,
            text: format!(
                "histogram_quantile({}, sum(rate(apiserver_request_duration_seconds_bucket{{{}}}[{}])) by (resource,  subresource, verb, scope, le))",
                format_quantile(quantile),
                FILTERS,
                prometheus_duration(self.elapsed),
            ),
        }
    }

    pub fn simple_latency_queries(&self) -> Vec<Query> {
        SIMPLE_QUANTILES
            .iter()
            .map(|&q| self.simple_latency_query(q))
            .collect()
    }

    pub fn count_query(&self) -> Query {
        Query {
            kind: QueryKind::Count,
            window: self.elapsed,
            text: format!(
                "sum(increase(apiserver_request_duration_seconds_count{{{}}}[{}])) by (resource, subresource, scope, verb)",
                FILTERS,
                prometheus_duration(self.elapsed),
            ),
        }
    }

    pub fn slow_count_query(&self, category: SlowCategory) -> Query {
        Query {
            kind: QueryKind::SlowCount(category),
            window: self.elapsed,
            text: format!(
                "sum(rate(apiserver_request_duration_seconds_bucket{{{}}}[{}])) by (resource, subresource, scope, verb)",
                category.filter(),
                prometheus_duration(self.elapsed),
            ),
        }
    }

    pub fn slow_count_queries(&self) -> Vec<Query> {
        SlowCategory::ALL
            .iter()
            .map(|&c| self.slow_count_query(c))
            .collect()
    }

    /// All queries a pass with `options` issues.
    pub fn plan(&self, options: &GatherOptions) -> QueryPlan {
        let latency = if options.use_simple_latency_query {
            self.simple_latency_queries()
        } else {
            vec![self.windowed_latency_query()]
        };

        let slow_count = if options.allowed_slow_calls != 0 {
            self.slow_count_queries()
        } else {
            Vec::new()
        };

        QueryPlan {
            latency,
            count: self.count_query(),
            slow_count,
        }
    }
}

/// Backend range syntax: whole seconds, truncated.
pub fn prometheus_duration(d: Duration) -> String {
    format!("{}s", d.as_secs())
}

/// Two-decimal quantile, as used both in query text and sample tags.
pub fn format_quantile(quantile: f64) -> String {
    format!("{quantile:.2}")
}
