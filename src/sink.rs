//! Result sinks
//!
//! Every terminal execution result is handed to a sink. Recording never
//! fails or delays the dispatch that produced the result; short-lived
//! callers `flush` before exiting so queued writes land.

use crate::dispatcher::ExecutionResult;
use async_trait::async_trait;
use futures::future::join_all;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

#[async_trait]
pub trait ResultSink: Send + Sync {
    fn record(&self, result: &ExecutionResult);

    /// Wait for every result recorded so far to be written
    async fn flush(&self) {}
}

/// Logs results through `tracing` only
#[derive(Debug, Default)]
pub struct TracingSink;

impl ResultSink for TracingSink {
    fn record(&self, result: &ExecutionResult) {
        tracing::info!(
            execution_id = %result.execution_id,
            operation = %result.operation,
            chain = %result.blockchain,
            success = result.success,
            tx = result.tx_reference.as_deref().unwrap_or("-"),
            "Execution finished"
        );
    }
}

struct JsonlWriter {
    path: PathBuf,
}

impl JsonlWriter {
    fn write(&self, line: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)
    }
}

/// Appends results to a JSONL file on background tasks
#[derive(Clone)]
pub struct JsonlResultSink {
    writer: Arc<Mutex<JsonlWriter>>,
    pending: Arc<std::sync::Mutex<Vec<JoinHandle<()>>>>,
}

impl JsonlResultSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            writer: Arc::new(Mutex::new(JsonlWriter { path: path.into() })),
            pending: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl ResultSink for JsonlResultSink {
    fn record(&self, result: &ExecutionResult) {
        TracingSink.record(result);

        let line = match serde_json::to_string(result) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize execution result");
                return;
            }
        };

        let writer = self.writer.clone();
        let handle = tokio::spawn(async move {
            let writer = writer.lock().await;
            if let Err(e) = writer.write(&line) {
                tracing::warn!(path = %writer.path.display(), error = %e, "Failed to write audit log entry");
            }
        });

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    async fn flush(&self) {
        let handles = std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner));
        for joined in join_all(handles).await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "Audit log write task failed");
            }
        }
    }
}
