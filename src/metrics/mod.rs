pub mod aggregator;
pub mod percentiles;

pub use aggregator::{AggregateKey, AggregateRecord, MetricsAggregator};
pub use percentiles::LatencyDistribution;
