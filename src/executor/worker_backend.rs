//! Production backend: runs rendered SQL through the database worker.

use async_trait::async_trait;

use crate::error::BackendError;
use crate::worker::{WorkerClient, WorkerError};

use super::{BackendRequest, QueryBackend, RawRow};

/// [`QueryBackend`] over a [`WorkerClient`].
pub struct WorkerBackend {
    client: WorkerClient,
    driver: String,
    connection_string: String,
    /// Passed to the worker as the statement timeout.
    statement_timeout_ms: Option<u64>,
    /// Passed to the worker so it can stop reading past the row cap.
    max_rows: Option<usize>,
}

impl WorkerBackend {
    pub fn new(client: WorkerClient, driver: &str, connection_string: &str) -> Self {
        Self {
            client,
            driver: driver.to_string(),
            connection_string: connection_string.to_string(),
            statement_timeout_ms: None,
            max_rows: None,
        }
    }

    pub fn with_statement_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.statement_timeout_ms = Some(timeout_ms);
        self
    }

    /// Ask the worker to read at most `max_rows` rows. One extra row is
    /// requested so that overflow stays detectable by the executor.
    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = Some(max_rows.saturating_add(1));
        self
    }
}

#[async_trait]
impl QueryBackend for WorkerBackend {
    async fn fetch(&self, request: BackendRequest<'_>) -> Result<Vec<RawRow>, BackendError> {
        let response = self
            .client
            .execute_query(
                &self.driver,
                &self.connection_string,
                request.sql,
                self.statement_timeout_ms,
                self.max_rows,
            )
            .await
            .map_err(backend_error)?;

        let expected = request.plan.outputs.len();
        if response.columns.len() != expected {
            return Err(BackendError::Failed(format!(
                "worker returned {} columns, expected {}",
                response.columns.len(),
                expected
            )));
        }
        Ok(response.rows)
    }
}

/// Map a worker failure onto the executor's taxonomy.
pub fn backend_error(err: WorkerError) -> BackendError {
    match err {
        WorkerError::Timeout(_) => BackendError::Timeout,
        err if err.is_unavailable() => BackendError::Unavailable(err.to_string()),
        err => BackendError::Failed(err.to_string()),
    }
}
