//! Error types for the dashboard query pipeline.
//!
//! Each stage owns its error enum. [`QueryError`] aggregates them and
//! remembers which stage failed.

use std::time::Duration;

use thiserror::Error;

use crate::registry::ValueType;

/// Result alias used across the pipeline.
pub type QueryResult<T> = Result<T, QueryError>;

/// Pipeline stage at which a request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Access gate, before anything else ran.
    Access,
    /// Column resolution, filter compilation and aggregation planning.
    Validation,
    /// Backend execution.
    Execution,
    /// Shaping raw rows into typed rows.
    Formatting,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Access => "access",
            Stage::Validation => "validation",
            Stage::Execution => "execution",
            Stage::Formatting => "formatting",
        };
        f.write_str(name)
    }
}

/// Caller-fixable problems with a query descriptor.
///
/// Raised synchronously before any backend call. Never retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("malformed query descriptor: {0}")]
    Malformed(String),

    #[error("unknown table '{table}'")]
    UnknownTable { table: String },

    #[error("unknown column '{column}' in table '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("column '{column}' is {expected}, but the value is {found}")]
    TypeMismatch {
        column: String,
        expected: ValueType,
        found: String,
    },

    #[error("operator '{operator}' is not supported for {value_type} column '{column}'")]
    UnsupportedOperator {
        column: String,
        operator: String,
        value_type: ValueType,
    },

    #[error("invalid operand for '{operator}' on column '{column}': {reason}")]
    InvalidOperand {
        column: String,
        operator: String,
        reason: String,
    },

    #[error("column '{column}' cannot be aggregated with {aggregation}")]
    NotAggregatable { column: String, aggregation: String },

    #[error("GROUP BY mismatch on column '{column}': {reason}")]
    GroupByMismatch { column: String, reason: String },

    #[error("ORDER BY column '{column}' is not a selected output")]
    UnknownOrderColumn { column: String },

    #[error("output name '{name}' is selected more than once")]
    DuplicateOutput { name: String },

    #[error("invalid limit {limit}: must be a positive integer")]
    InvalidLimit { limit: i64 },

    #[error("select list is empty")]
    EmptySelect,
}

/// Failures while running a compiled plan against the backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("query exceeded the {timeout_ms} ms execution timeout")]
    ExecutionTimeout { timeout_ms: u64 },

    #[error("backend unavailable: {message}")]
    BackendUnavailable {
        message: String,
        retry_after: Duration,
    },

    #[error("backend returned {returned} rows, exceeding the hard cap of {cap}")]
    ResourceExhausted { returned: usize, cap: usize },

    #[error("query was cancelled")]
    Cancelled,

    #[error("backend query failed: {0}")]
    Backend(String),
}

/// Errors a [`crate::executor::QueryBackend`] reports for a single fetch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("backend timed out")]
    Timeout,

    #[error("{0}")]
    Failed(String),
}

/// A raw value contradicts the plan's declared output type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormattingError {
    #[error("row {row}, column '{column}': expected {expected}, got {found}")]
    ValueShape {
        row: usize,
        column: String,
        expected: ValueType,
        found: String,
    },

    #[error("row {row} has {found} values, expected {expected}")]
    Arity {
        row: usize,
        expected: usize,
        found: usize,
    },
}

/// Top-level error for a dashboard query.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("access denied: {reason}")]
    AccessDenied { reason: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Formatting(#[from] FormattingError),
}

impl QueryError {
    /// Stage at which the request failed.
    pub fn stage(&self) -> Stage {
        match self {
            QueryError::AccessDenied { .. } => Stage::Access,
            QueryError::Validation(_) => Stage::Validation,
            QueryError::Execution(_) => Stage::Execution,
            QueryError::Formatting(_) => Stage::Formatting,
        }
    }

    /// Whether a single caller retry is advisable.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            QueryError::Execution(ExecutionError::BackendUnavailable { .. })
        )
    }

    /// Backoff hint for retriable errors.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            QueryError::Execution(ExecutionError::BackendUnavailable { retry_after, .. }) => {
                Some(*retry_after)
            }
            _ => None,
        }
    }
}
