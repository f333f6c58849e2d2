//! Query execution with bounded resources.
//!
//! [`QueryExecutor`] renders a [`CompiledPlan`] to SQL, hands it to a
//! [`QueryBackend`], and enforces the timeout, the hard row cap and
//! cancellation around that single call. There is no retry loop here;
//! retriability is reported to the caller through [`crate::error::QueryError`].

pub mod memory;
pub mod worker_backend;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{BackendError, ExecutionError};
use crate::planner::CompiledPlan;
use crate::sql::Dialect;

pub use memory::MemoryBackend;
pub use worker_backend::WorkerBackend;

/// One backend row, positionally aligned with [`CompiledPlan::outputs`].
pub type RawRow = Vec<serde_json::Value>;

/// Everything a backend needs to answer one query.
#[derive(Debug, Clone, Copy)]
pub struct BackendRequest<'a> {
    pub plan: &'a CompiledPlan,
    pub sql: &'a str,
    pub dialect: Dialect,
}

/// A read-only, row-returning data store.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    async fn fetch(&self, request: BackendRequest<'_>) -> Result<Vec<RawRow>, BackendError>;
}

/// Resource bounds applied to every execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorOptions {
    pub timeout: Duration,
    /// Rows beyond this count fail the query regardless of its limit.
    pub hard_row_cap: usize,
    /// Hint attached to [`ExecutionError::BackendUnavailable`].
    pub retry_backoff: Duration,
    pub dialect: Dialect,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            hard_row_cap: 10_000,
            retry_backoff: Duration::from_millis(500),
            dialect: Dialect::default(),
        }
    }
}

/// Runs compiled plans against a backend.
#[derive(Clone)]
pub struct QueryExecutor {
    backend: Arc<dyn QueryBackend>,
    options: ExecutorOptions,
}

impl QueryExecutor {
    pub fn new(backend: Arc<dyn QueryBackend>) -> Self {
        Self {
            backend,
            options: ExecutorOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// Execute `plan`, returning rows in backend order.
    ///
    /// Cancelling `cancel` drops the in-flight backend future; nothing it
    /// produced is returned.
    pub async fn execute(
        &self,
        plan: &CompiledPlan,
        cancel: &CancellationToken,
    ) -> Result<Vec<RawRow>, ExecutionError> {
        if cancel.is_cancelled() {
            return Err(ExecutionError::Cancelled);
        }

        let dialect = self.options.dialect;
        let sql = plan.to_sql(dialect);
        debug!(%dialect, sql = %sql, "executing query");

        let request = BackendRequest {
            plan,
            sql: &sql,
            dialect,
        };
        let fetch = tokio::time::timeout(self.options.timeout, self.backend.fetch(request));

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("query cancelled");
                return Err(ExecutionError::Cancelled);
            }
            outcome = fetch => outcome,
        };

        let rows = match outcome {
            Ok(Ok(rows)) => rows,
            Ok(Err(err)) => return Err(self.fail(self.classify(err))),
            Err(_) => return Err(self.fail(self.timeout_error())),
        };

        if rows.len() > self.options.hard_row_cap {
            return Err(self.fail(ExecutionError::ResourceExhausted {
                returned: rows.len(),
                cap: self.options.hard_row_cap,
            }));
        }

        debug!(rows = rows.len(), "query executed");
        Ok(rows)
    }

    fn classify(&self, err: BackendError) -> ExecutionError {
        match err {
            BackendError::Unavailable(message) => ExecutionError::BackendUnavailable {
                message,
                retry_after: self.options.retry_backoff,
            },
            BackendError::Timeout => self.timeout_error(),
            BackendError::Failed(message) => ExecutionError::Backend(message),
        }
    }

    fn timeout_error(&self) -> ExecutionError {
        ExecutionError::ExecutionTimeout {
            timeout_ms: self.options.timeout.as_millis() as u64,
        }
    }

    fn fail(&self, err: ExecutionError) -> ExecutionError {
        warn!(error = %err, "query execution failed");
        err
    }
}
