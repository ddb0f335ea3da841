//! Page executors - where `open_tab`, `scroll`, `search_web` and `click_ui` run
//!
//! The real executor lives out of process (a browser extension bridge, a
//! webdriver script...). It reads one JSON request per line on stdin and
//! answers with one JSON reply per line on stdout.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::command::DispatchResult;

/// Longest reply line accepted from an executor process
const MAX_LINE_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorRequest {
    pub command: String,
    pub args: BTreeMap<String, String>,
}

/// `{"status": "ok" | "noop" | "error", ...detail}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExecutorReply {
    pub status: String,
    #[serde(flatten)]
    pub detail: Map<String, Value>,
}

impl ExecutorReply {
    /// Normalize into the dispatcher's result type. Unknown statuses are errors.
    pub fn into_result(self) -> DispatchResult {
        let mut result = match self.status.trim().to_lowercase().as_str() {
            "ok" => DispatchResult::ok(),
            "noop" => DispatchResult::noop("executor_noop"),
            "error" => DispatchResult::error("executor_error"),
            other => {
                return DispatchResult::error("invalid_executor_status").with("status", other);
            }
        };
        for (key, value) in self.detail {
            let value = match value {
                Value::Null => continue,
                Value::String(s) => s,
                other => other.to_string(),
            };
            result.detail.insert(key, value);
        }
        result
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("failed to start executor '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("executor process exited")]
    ProcessExited,

    #[error("executor did not answer within {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("executor protocol error: {0}")]
    Protocol(String),

    #[error("executor unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait PageExecutor: Send + Sync {
    async fn execute(&self, request: ExecutorRequest) -> Result<ExecutorReply, ExecutorError>;
}

/// Reports what it would have done. Used when no executor is configured.
#[derive(Debug, Default)]
pub struct DryRunExecutor;

#[async_trait]
impl PageExecutor for DryRunExecutor {
    async fn execute(&self, request: ExecutorRequest) -> Result<ExecutorReply, ExecutorError> {
        info!(command = %request.command, args = ?request.args, "dry run");
        let mut detail = Map::new();
        detail.insert("dry_run".into(), Value::Bool(true));
        for (key, value) in request.args {
            detail.insert(key, Value::String(value));
        }
        Ok(ExecutorReply {
            status: "ok".into(),
            detail,
        })
    }
}

struct Pipe {
    stdin: ChildStdin,
    stdout: LineReader,
    next_id: u64,
}

/// Request as written on the wire, tagged with the id the reply must echo
#[derive(Serialize)]
struct WireRequest<'a> {
    id: u64,
    command: &'a str,
    args: &'a BTreeMap<String, String>,
}

/// Long-lived child process speaking newline-delimited JSON.
///
/// Requests are serialized through a mutex, one line out and one line back.
/// Every request carries an `id` and replies must echo it, so a reply that
/// arrives after its request timed out is skipped by the next request.
pub struct ProcessExecutor {
    pipe: Mutex<Pipe>,
    reply_timeout: Duration,
    label: String,
    // killed on drop
    _child: Child,
}

impl fmt::Debug for ProcessExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessExecutor")
            .field("label", &self.label)
            .field("reply_timeout", &self.reply_timeout)
            .finish()
    }
}

impl ProcessExecutor {
    pub fn spawn(
        program: &str,
        args: &[String],
        reply_timeout: Duration,
    ) -> Result<Self, ExecutorError> {
        let spawn_err = |source| ExecutorError::Spawn {
            command: program.to_string(),
            source,
        };

        let mut child = Command::new(program)
            .args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_err)?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(ExecutorError::Protocol("executor stdio not piped".into()));
        };

        info!(program, ?args, "executor started");
        Ok(Self {
            pipe: Mutex::new(Pipe {
                stdin,
                stdout: LineReader::new(stdout),
                next_id: 1,
            }),
            reply_timeout,
            label: program.to_string(),
            _child: child,
        })
    }
}

#[async_trait]
impl PageExecutor for ProcessExecutor {
    async fn execute(&self, request: ExecutorRequest) -> Result<ExecutorReply, ExecutorError> {
        let mut pipe = self.pipe.lock().await;
        let id = pipe.next_id;
        pipe.next_id += 1;

        let mut line = serde_json::to_string(&WireRequest {
            id,
            command: &request.command,
            args: &request.args,
        })
        .map_err(|e| ExecutorError::Protocol(e.to_string()))?;
        line.push('\n');

        debug!(executor = %self.label, id, command = %request.command, "sending request");

        pipe.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(map_write_error)?;
        pipe.stdin.flush().await.map_err(map_write_error)?;

        let reply = timeout(self.reply_timeout, read_reply(&mut pipe.stdout, id))
            .await
            .map_err(|_| ExecutorError::Timeout {
                timeout_secs: self.reply_timeout.as_secs(),
            })??;

        debug!(executor = %self.label, id, status = %reply.status, "reply received");
        Ok(reply)
    }
}

/// Reads lines until one carries `expected_id`. Replies to earlier requests
/// (ones that timed out) are dropped.
async fn read_reply(stdout: &mut LineReader, expected_id: u64) -> Result<ExecutorReply, ExecutorError> {
    loop {
        let bytes = stdout.next_line().await?;
        let text = String::from_utf8_lossy(&bytes);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }

        let mut fields: Map<String, Value> = serde_json::from_str(trimmed)
            .map_err(|e| ExecutorError::Protocol(format!("bad reply '{trimmed}': {e}")))?;

        match fields.remove("id").and_then(|id| id.as_u64()) {
            Some(id) if id == expected_id => {
                return serde_json::from_value(Value::Object(fields))
                    .map_err(|e| ExecutorError::Protocol(format!("bad reply '{trimmed}': {e}")));
            }
            Some(id) => debug!(id, expected_id, "skipping stale reply"),
            None => {
                return Err(ExecutorError::Protocol(format!("reply without id: '{trimmed}'")));
            }
        }
    }
}

/// Newline-delimited reader over the child's stdout.
///
/// Partial lines live in `pending` between calls, so a read cancelled by the
/// reply timeout loses nothing. A line longer than `MAX_LINE_BYTES` is
/// rejected as soon as the cap is crossed and the rest of it is discarded.
struct LineReader {
    inner: BufReader<ChildStdout>,
    pending: Vec<u8>,
    discarding: bool,
}

impl LineReader {
    fn new(stdout: ChildStdout) -> Self {
        Self {
            inner: BufReader::new(stdout),
            pending: Vec::new(),
            discarding: false,
        }
    }

    async fn next_line(&mut self) -> Result<Vec<u8>, ExecutorError> {
        loop {
            let (consumed, complete) = {
                let available = self
                    .inner
                    .fill_buf()
                    .await
                    .map_err(|e| ExecutorError::Protocol(e.to_string()))?;
                if available.is_empty() {
                    return Err(ExecutorError::ProcessExited);
                }
                let (chunk, consumed, complete) = match available.iter().position(|&b| b == b'\n') {
                    Some(i) => (&available[..i], i + 1, true),
                    None => (available, available.len(), false),
                };
                if !self.discarding {
                    self.pending.extend_from_slice(chunk);
                }
                (consumed, complete)
            };
            self.inner.consume(consumed);

            if self.discarding {
                if complete {
                    self.discarding = false;
                }
                continue;
            }

            if self.pending.len() > MAX_LINE_BYTES {
                self.pending.clear();
                self.discarding = !complete;
                return Err(ExecutorError::Protocol(format!(
                    "reply line exceeds {MAX_LINE_BYTES} bytes"
                )));
            }

            if complete {
                return Ok(std::mem::take(&mut self.pending));
            }
        }
    }
}

fn map_write_error(e: std::io::Error) -> ExecutorError {
    if e.kind() == std::io::ErrorKind::BrokenPipe {
        ExecutorError::ProcessExited
    } else {
        ExecutorError::Unavailable(e.to_string())
    }
}
