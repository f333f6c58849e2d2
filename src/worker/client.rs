//! Async client for communicating with the database worker process.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex as SyncMutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use super::error::{WorkerError, WorkerResult};
use super::protocol::{codes, ErrorInfo, RequestEnvelope, ResponseEnvelope};

/// Default timeout for requests (30 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

type PendingSenders = HashMap<String, oneshot::Sender<ResponseEnvelope>>;
type PendingMap = Arc<SyncMutex<PendingSenders>>;

/// Never held across an await.
fn lock_pending(pending: &PendingMap) -> MutexGuard<'_, PendingSenders> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes a request's pending entry however the waiting future ends,
/// including when the caller drops it mid-flight.
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    id: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock_pending(self.pending).remove(&self.id);
    }
}

/// Async client for the database worker.
///
/// The client spawns the worker as a child process and communicates via
/// NDJSON (newline-delimited JSON) over stdin/stdout. Each request has a
/// unique ID for correlation with responses, enabling concurrent requests.
///
/// # Example
///
/// ```ignore
/// use dashq::worker::WorkerClient;
///
/// let client = WorkerClient::spawn("./dashq-worker").await?;
/// let response = client
///     .execute_query("postgres", "postgres://localhost/app", "SELECT 1", None, None)
///     .await?;
/// ```
pub struct WorkerClient {
    stdin: Arc<Mutex<BufWriter<ChildStdin>>>,
    pending: PendingMap,
    /// Killed on drop.
    _child: Child,
    reader_task: tokio::task::JoinHandle<()>,
    timeout: Duration,
}

impl WorkerClient {
    /// Spawn a new worker process with the default timeout.
    pub async fn spawn<P: AsRef<Path>>(worker_path: P) -> WorkerResult<Self> {
        Self::spawn_with_args_and_timeout(worker_path, &[], DEFAULT_TIMEOUT).await
    }

    /// Spawn a worker with arguments and custom timeout.
    pub async fn spawn_with_args_and_timeout<P: AsRef<Path>>(
        worker_path: P,
        args: &[String],
        timeout: Duration,
    ) -> WorkerResult<Self> {
        let mut child = Command::new(worker_path.as_ref())
            .args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(WorkerError::SpawnFailed)?;

        let stdin = child.stdin.take().ok_or_else(|| not_captured("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| not_captured("stdout"))?;

        let stdin = Arc::new(Mutex::new(BufWriter::new(stdin)));
        let pending: PendingMap = Arc::new(SyncMutex::new(HashMap::new()));

        let reader_task = Self::spawn_reader_task(stdout, pending.clone());
        debug!(path = %worker_path.as_ref().display(), "spawned worker");

        Ok(Self {
            stdin,
            pending,
            _child: child,
            reader_task,
            timeout,
        })
    }

    /// Spawn the background task that reads responses from the worker.
    fn spawn_reader_task(stdout: ChildStdout, pending: PendingMap) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => break,
                    Ok(_) => match serde_json::from_str::<ResponseEnvelope>(&line) {
                        Ok(resp) => {
                            let waiter = lock_pending(&pending).remove(&resp.id);
                            if let Some(tx) = waiter {
                                let _ = tx.send(resp);
                            }
                        }
                        Err(e) => warn!(error = %e, "worker: failed to parse response"),
                    },
                    Err(e) => {
                        warn!(error = %e, "worker: read error");
                        break;
                    }
                }
            }

            // Worker exited: fail everything still waiting.
            let waiters: Vec<_> = lock_pending(&pending).drain().collect();
            for (id, tx) in waiters {
                let _ = tx.send(ResponseEnvelope {
                    id,
                    success: false,
                    result: None,
                    error: Some(ErrorInfo {
                        code: codes::WORKER_EXITED.to_string(),
                        message: "Worker process exited unexpectedly".to_string(),
                    }),
                });
            }
        })
    }

    /// Send a request to the worker and wait for a response.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Serialization fails
    /// - Writing to the worker fails
    /// - The request times out
    /// - The worker returns an error response
    /// - Deserialization of the response fails
    pub async fn request<P, R>(&self, method: &str, params: P) -> WorkerResult<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = uuid::Uuid::new_v4().to_string();

        let request = RequestEnvelope {
            id: id.clone(),
            method: method.to_string(),
            params: serde_json::to_value(params).map_err(WorkerError::SerializeFailed)?,
        };

        let (tx, rx) = oneshot::channel();
        lock_pending(&self.pending).insert(id.clone(), tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };

        {
            let mut stdin = self.stdin.lock().await;
            let line =
                serde_json::to_string(&request).map_err(WorkerError::SerializeFailed)? + "\n";
            let written = async {
                stdin.write_all(line.as_bytes()).await?;
                stdin.flush().await
            }
            .await;
            if let Err(e) = written {
                return Err(WorkerError::WriteFailed(e));
            }
        }

        let response = match tokio::time::timeout(self.timeout, rx).await {
            Ok(received) => received?,
            Err(_) => return Err(WorkerError::Timeout(self.timeout_ms())),
        };

        if response.success {
            let result = response.result.unwrap_or(serde_json::Value::Null);
            serde_json::from_value(result).map_err(WorkerError::DeserializeFailed)
        } else {
            let error = response.error.unwrap_or_else(|| ErrorInfo {
                code: "UNKNOWN".to_string(),
                message: "Unknown error".to_string(),
            });
            Err(self.classify_error(&error.code, &error.message))
        }
    }

    /// Classify a worker error into a more specific error type.
    fn classify_error(&self, code: &str, message: &str) -> WorkerError {
        match code {
            codes::DRIVER_NOT_FOUND => WorkerError::DriverNotFound(message.to_string()),
            codes::CONNECTION_FAILED => WorkerError::ConnectionFailed(message.to_string()),
            codes::INVALID_REQUEST => WorkerError::InvalidRequest(message.to_string()),
            codes::METHOD_NOT_FOUND => WorkerError::MethodNotFound(message.to_string()),
            codes::QUERY_TIMEOUT => WorkerError::Timeout(self.timeout_ms()),
            codes::WORKER_EXITED => WorkerError::WorkerExited,
            _ => WorkerError::remote(code, message),
        }
    }

    /// Whether the reader task is still running.
    pub fn is_alive(&self) -> bool {
        !self.reader_task.is_finished()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }
}

impl WorkerClient {
    /// Execute a read-only SQL query.
    pub async fn execute_query(
        &self,
        driver: &str,
        connection_string: &str,
        sql: &str,
        timeout_ms: Option<u64>,
        max_rows: Option<usize>,
    ) -> WorkerResult<super::protocol::ExecuteQueryResponse> {
        use super::protocol::{methods, ConnectionParams, ExecuteQueryParams};

        self.request(
            methods::EXECUTE_QUERY,
            ExecuteQueryParams {
                connection: ConnectionParams {
                    driver: driver.to_string(),
                    connection_string: connection_string.to_string(),
                },
                sql: sql.to_string(),
                timeout_ms,
                max_rows,
            },
        )
        .await
    }
}

impl Drop for WorkerClient {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

fn not_captured(stream: &str) -> WorkerError {
    WorkerError::SpawnFailed(std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        format!("worker {} not captured", stream),
    ))
}
