//! API call latency gathering and SLO validation.
//!
//! One pass builds backend queries for latency, request counts and slow
//! request counts, merges the returned samples per (resource, subresource,
//! verb, scope), checks each dimension against its latency objective and
//! renders a ranked JSON report.

pub mod backend;
pub mod collector;
pub mod config;
pub mod error;
pub mod gatherer;
pub mod load_generator;
pub mod metrics;
pub mod query;
pub mod report;
pub mod validator;

pub use backend::{ApiCall, InMemoryBackend};
pub use collector::{QueryExecutor, Sample, SampleCollector, SampleSets};
pub use config::{GatherOptions, MeasurementConfig};
pub use error::{ObjectiveViolation, QueryError, Result, SloError};
pub use gatherer::{ApiResponsivenessGatherer, GatherOutcome};
pub use metrics::{AggregateKey, AggregateRecord, LatencyDistribution, MetricsAggregator};
pub use query::{Query, QueryBuilder, QueryKind, QueryPlan, SlowCategory};
pub use report::{PerfData, Reporter, Summary};
pub use validator::{Objective, Validator};
