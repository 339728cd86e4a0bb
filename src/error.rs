use thiserror::Error;

/// Opaque failure reported by a query collaborator.
///
/// The gatherer never inspects it beyond its message; every `QueryError`
/// aborts the pass.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct QueryError {
    message: String,
}

impl QueryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Fatal errors for one gather pass.
#[derive(Debug, Error)]
pub enum SloError {
    #[error("query {query:?} failed: {source}")]
    Query {
        query: String,
        #[source]
        source: QueryError,
    },

    #[error("malformed sample: cannot parse quantile label {label:?}")]
    MalformedSample { label: String },

    #[error("invalid config option {key:?}: expected {expected}")]
    Config { key: String, expected: &'static str },

    #[error("cannot render report: {0}")]
    Render(#[from] serde_json::Error),
}

/// Result type for gather operations
pub type Result<T> = std::result::Result<T, SloError>;

/// One or more records breached their latency objective.
///
/// Not an `SloError`: the report is still produced and the caller decides
/// whether this fails the run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("top latency metric: there should be no high-latency requests, but: [{}]", .violations.join(", "))]
pub struct ObjectiveViolation {
    pub violations: Vec<String>,
}

impl ObjectiveViolation {
    /// `None` when nothing failed.
    pub fn from_violations(violations: Vec<String>) -> Option<Self> {
        if violations.is_empty() {
            None
        } else {
            Some(Self { violations })
        }
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }
}
