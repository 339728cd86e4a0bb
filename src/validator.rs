use std::fmt;
use std::time::Duration;

use crate::metrics::AggregateRecord;

/// Latency objective for a single API call dimension, per the upstream
/// API call latency SLO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Objective {
    /// Everything except LIST.
    Resource,
    /// LIST outside cluster scope.
    Namespace,
    /// Cluster-scoped LIST.
    Cluster,
}

impl Objective {
    /// First match wins: non-LIST, then cluster LIST, then any other LIST.
    pub fn for_call(verb: &str, scope: &str) -> Self {
        if verb != "LIST" {
            Objective::Resource
        } else if scope == "cluster" {
            Objective::Cluster
        } else {
            Objective::Namespace
        }
    }

    pub fn for_record(record: &AggregateRecord) -> Self {
        Self::for_call(&record.key.verb, &record.key.scope)
    }

    pub fn threshold(self) -> Duration {
        match self {
            Objective::Resource => Duration::from_secs(1),
            Objective::Namespace => Duration::from_secs(5),
            Objective::Cluster => Duration::from_secs(30),
        }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.threshold())
    }
}

/// Checks records against their objective, exempting dimensions with at
/// most `allowed_slow_calls` slow requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct Validator {
    allowed_slow_calls: i64,
}

impl Validator {
    /// Zero or negative disables the slow-call exemption.
    pub fn new(allowed_slow_calls: i64) -> Self {
        Self { allowed_slow_calls }
    }

    pub fn allowed_slow_calls(&self) -> i64 {
        self.allowed_slow_calls
    }

    /// Err carries the human-readable violation.
    pub fn validate(&self, record: &AggregateRecord) -> Result<(), String> {
        let objective = Objective::for_record(record);
        if record.latency.perc99 <= objective.threshold() {
            return Ok(());
        }
        if let Ok(allowed) = u64::try_from(self.allowed_slow_calls) {
            if allowed > 0 && record.slow_count <= allowed {
                return Ok(());
            }
        }
        Err(format!("got: {record}; expected perc99 <= {objective}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::AggregateKey;

    #[test]
    fn objective_display_is_duration() {
        assert_eq!(Objective::Resource.to_string(), "1s");
        assert_eq!(Objective::Cluster.to_string(), "30s");
    }

    #[test]
    fn threshold_is_inclusive() {
        let record = AggregateRecord {
            key: AggregateKey::new("pods", "", "GET", "resource"),
            latency: crate::metrics::LatencyDistribution {
                perc99: Duration::from_secs(1),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(Validator::new(0).validate(&record).is_ok());
    }
}
