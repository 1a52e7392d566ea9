/// Batch execution: best-effort pipelines and MULTI/EXEC transactions
///
/// Both modes send the whole batch in one round trip to the active handle
/// and return replies in submission order.

use crate::command::Command;
use crate::core::router::ConnectionRouter;
use crate::error::{GredisError, GredisResult};
use std::fmt;
use std::time::Duration;
use tracing::warn;

/// Decoded store reply
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Nil,
    /// Simple status such as `OK` or `PONG`
    Status(String),
    Integer(i64),
    Text(String),
    /// Bulk reply that is not valid UTF-8
    Bytes(Vec<u8>),
    Double(f64),
    Boolean(bool),
    Array(Vec<Reply>),
    Map(Vec<(Reply, Reply)>),
    /// Server error for one command, or nested inside an aggregate reply
    Error(String),
}

impl Reply {
    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Nil)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// Textual payload of status and bulk replies
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Reply::Status(s) | Reply::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Reply::Integer(i) => Some(*i),
            Reply::Text(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl From<redis::Value> for Reply {
    fn from(value: redis::Value) -> Self {
        use redis::Value;

        match value {
            Value::Nil => Reply::Nil,
            Value::Int(i) => Reply::Integer(i),
            Value::BulkString(bytes) => match String::from_utf8(bytes) {
                Ok(text) => Reply::Text(text),
                Err(err) => Reply::Bytes(err.into_bytes()),
            },
            Value::SimpleString(status) => Reply::Status(status),
            Value::Okay => Reply::Status("OK".to_string()),
            Value::Array(items) | Value::Set(items) | Value::Push { data: items, .. } => {
                Reply::Array(items.into_iter().map(Reply::from).collect())
            }
            Value::Map(pairs) => Reply::Map(
                pairs
                    .into_iter()
                    .map(|(k, v)| (Reply::from(k), Reply::from(v)))
                    .collect(),
            ),
            Value::Attribute { data, .. } => Reply::from(*data),
            Value::Double(d) => Reply::Double(d),
            Value::Boolean(b) => Reply::Boolean(b),
            Value::VerbatimString { text, .. } => Reply::Text(text),
            Value::ServerError(err) => Reply::Error(err.to_string()),
            other => Reply::Text(format!("{:?}", other)),
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Nil => write!(f, "(nil)"),
            Reply::Status(s) | Reply::Text(s) => write!(f, "{}", s),
            Reply::Integer(i) => write!(f, "{}", i),
            Reply::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
            Reply::Double(d) => write!(f, "{}", d),
            Reply::Boolean(b) => write!(f, "{}", b),
            Reply::Array(items) => write!(f, "[{} items]", items.len()),
            Reply::Map(pairs) => write!(f, "{{{} entries}}", pairs.len()),
            Reply::Error(message) => write!(f, "(error) {}", message),
        }
    }
}

/// Ordered set of commands executed together
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    commands: Vec<Command>,
    timeout: Option<Duration>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command, builder style
    pub fn add(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    /// Override the router's command timeout for this batch
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    fn to_pipeline(&self) -> redis::Pipeline {
        let mut pipe = redis::pipe();
        for command in &self.commands {
            pipe.add_command(command.to_cmd());
        }
        pipe
    }
}

impl FromIterator<Command> for Batch {
    fn from_iter<I: IntoIterator<Item = Command>>(iter: I) -> Self {
        Self {
            commands: iter.into_iter().collect(),
            timeout: None,
        }
    }
}

impl Extend<Command> for Batch {
    fn extend<I: IntoIterator<Item = Command>>(&mut self, iter: I) {
        self.commands.extend(iter);
    }
}

/// Per-command results of a pipeline, in submission order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineOutcome {
    results: Vec<Result<Reply, String>>,
}

impl PipelineOutcome {
    pub fn results(&self) -> &[Result<Reply, String>] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Successful replies with their submission index
    pub fn successes(&self) -> Vec<(usize, &Reply)> {
        self.results
            .iter()
            .enumerate()
            .filter_map(|(i, result)| result.as_ref().ok().map(|reply| (i, reply)))
            .collect()
    }

    /// Server errors with their submission index
    pub fn failures(&self) -> Vec<(usize, &str)> {
        self.results
            .iter()
            .enumerate()
            .filter_map(|(i, result)| result.as_ref().err().map(|err| (i, err.as_str())))
            .collect()
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|result| result.is_err()).count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed_count() == 0
    }

    /// Every reply, or a `BatchPartialFailure` naming the failed commands
    pub fn into_result(self) -> GredisResult<Vec<Reply>> {
        let total = self.results.len();
        let mut replies = Vec::with_capacity(total);
        let mut failures = Vec::new();

        for (i, result) in self.results.into_iter().enumerate() {
            match result {
                Ok(reply) => replies.push(reply),
                Err(err) => failures.push((i, err)),
            }
        }

        if failures.is_empty() {
            Ok(replies)
        } else {
            Err(GredisError::BatchPartialFailure {
                failed: failures.len(),
                total,
                failures,
            })
        }
    }
}

impl ConnectionRouter {
    /// Send the batch as one pipeline; each command succeeds or fails alone
    ///
    /// Server errors are recorded per command. Only connection-level
    /// failures (no active handle, I/O, timeout) fail the whole call.
    pub async fn run_pipeline(&self, batch: Batch) -> GredisResult<PipelineOutcome> {
        if batch.is_empty() {
            return Ok(PipelineOutcome::default());
        }

        let total = batch.len();
        let result = self.send_pipeline(&batch).await;

        let line = match &result {
            Ok(outcome) if outcome.all_succeeded() => {
                format!("Pipeline executed {} commands", total)
            }
            Ok(outcome) => format!(
                "Pipeline executed {} commands ({} failed)",
                total,
                outcome.failed_count()
            ),
            Err(err) => {
                warn!("Pipeline of {} commands failed: {}", total, err);
                format!("Pipeline of {} commands failed: {}", total, err)
            }
        };
        self.record(line).await;

        result
    }

    async fn send_pipeline(&self, batch: &Batch) -> GredisResult<PipelineOutcome> {
        let handle = self.active().await?;
        let limit = batch.timeout().unwrap_or_else(|| handle.command_timeout());

        let mut pipe = batch.to_pipeline();
        pipe.ignore_errors();

        let replies = handle
            .run("pipeline", limit, |mut connection| async move {
                pipe.query_async::<Vec<redis::RedisResult<redis::Value>>>(&mut connection)
                    .await
            })
            .await?;

        let results = replies
            .into_iter()
            .map(|reply| reply.map(Reply::from).map_err(|err| err.to_string()))
            .collect();

        Ok(PipelineOutcome { results })
    }

    /// Send the batch inside MULTI/EXEC
    ///
    /// A command rejected while queueing aborts the transaction: the call
    /// fails and nothing is applied. Once EXEC runs, every command has been
    /// applied and the replies come back in order; a command that failed
    /// during EXEC occupies its slot as [`Reply::Error`].
    pub async fn run_transaction(&self, batch: Batch) -> GredisResult<Vec<Reply>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let total = batch.len();
        let result = self.send_transaction(&batch).await;

        let line = match &result {
            Ok(replies) => match replies.iter().filter(|reply| reply.is_error()).count() {
                0 => format!("Transaction executed {} commands", total),
                failed => format!("Transaction executed {} commands ({} failed)", total, failed),
            },
            Err(err) => {
                warn!("Transaction of {} commands aborted: {}", total, err);
                format!("Transaction of {} commands aborted: {}", total, err)
            }
        };
        self.record(line).await;

        result
    }

    async fn send_transaction(&self, batch: &Batch) -> GredisResult<Vec<Reply>> {
        let handle = self.active().await?;
        let limit = batch.timeout().unwrap_or_else(|| handle.command_timeout());

        let mut pipe = batch.to_pipeline();
        pipe.atomic().ignore_errors();

        // Queue-time rejections still fail the whole call as EXECABORT
        let replies = handle
            .run("transaction", limit, |mut connection| async move {
                pipe.query_async::<Vec<redis::RedisResult<redis::Value>>>(&mut connection)
                    .await
            })
            .await?;

        Ok(replies
            .into_iter()
            .map(|reply| match reply {
                Ok(value) => Reply::from(value),
                Err(err) => Reply::Error(err.to_string()),
            })
            .collect())
    }
}
