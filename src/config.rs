use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SloError};

/// Name this measurement reports under unless `summaryName` overrides it.
pub const MEASUREMENT_NAME: &str = "APIResponsivenessPrometheus";

pub const USE_SIMPLE_LATENCY_QUERY: &str = "useSimpleLatencyQuery";
pub const ALLOWED_SLOW_CALLS: &str = "allowedSlowCalls";
pub const SUMMARY_NAME: &str = "summaryName";

/// Raw measurement configuration as handed over by the host.
///
/// `params` is an untyped JSON object; typed access goes through the
/// `get_*_or_default` helpers so a wrong type surfaces as `SloError::Config`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeasurementConfig {
    /// Prefix for diagnostic lines, e.g. the test step that owns this pass.
    #[serde(default)]
    pub identifier: String,

    #[serde(default)]
    pub params: Map<String, Value>,
}

impl MeasurementConfig {
    pub fn new(identifier: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            identifier: identifier.into(),
            params,
        }
    }

    /// Absent and `null` keys fall back to `default`.
    pub fn get_bool_or_default(&self, key: &str, default: bool) -> Result<bool> {
        match self.params.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(v) => v.as_bool().ok_or_else(|| invalid(key, "bool")),
        }
    }

    /// Negative values are accepted; callers decide what they mean.
    pub fn get_i64_or_default(&self, key: &str, default: i64) -> Result<i64> {
        match self.params.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(v) => v.as_i64().ok_or_else(|| invalid(key, "integer")),
        }
    }

    pub fn get_string_or_default(&self, key: &str, default: &str) -> Result<String> {
        match self.params.get(key) {
            None | Some(Value::Null) => Ok(default.to_string()),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(_) => Err(invalid(key, "string")),
        }
    }
}

fn invalid(key: &str, expected: &'static str) -> SloError {
    SloError::Config {
        key: key.to_string(),
        expected,
    }
}

/// Options for one gather pass, resolved before any query runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatherOptions {
    pub use_simple_latency_query: bool,
    /// Nonzero builds the slow-count queries; only a positive value
    /// exempts records.
    pub allowed_slow_calls: i64,
    pub summary_name: String,
}

impl Default for GatherOptions {
    fn default() -> Self {
        Self {
            use_simple_latency_query: false,
            allowed_slow_calls: 0,
            summary_name: MEASUREMENT_NAME.to_string(),
        }
    }
}

impl GatherOptions {
    pub fn from_config(config: &MeasurementConfig) -> Result<Self> {
        Ok(Self {
            use_simple_latency_query: config.get_bool_or_default(USE_SIMPLE_LATENCY_QUERY, false)?,
            allowed_slow_calls: config.get_i64_or_default(ALLOWED_SLOW_CALLS, 0)?,
            summary_name: config.get_string_or_default(SUMMARY_NAME, MEASUREMENT_NAME)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(params: Value) -> MeasurementConfig {
        match params {
            Value::Object(map) => MeasurementConfig::new("test", map),
            _ => panic!("params must be an object"),
        }
    }

    #[test]
    fn null_falls_back_to_default() {
        let c = config(json!({ "allowedSlowCalls": null }));
        assert_eq!(c.get_i64_or_default(ALLOWED_SLOW_CALLS, 7).unwrap(), 7);
    }

    #[test]
    fn fractional_integer_is_rejected() {
        let c = config(json!({ "allowedSlowCalls": 2.5 }));
        assert!(matches!(
            c.get_i64_or_default(ALLOWED_SLOW_CALLS, 0),
            Err(SloError::Config { .. })
        ));
    }
}
