//! Bounded, drop-on-full query log queue.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{MAX_RESPONSE_CHARS, TelemetryError, queries};
use crate::models::query_log::{NewQueryLog, QueryStatus};

/// A validated entry ready to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryLogRecord {
    pub user_id: i64,
    pub api_key_id: Option<i64>,
    pub endpoint: String,
    pub query: String,
    pub response: Option<String>,
    pub model_provider: Option<String>,
    pub rag_contexts_count: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub latency_ms: i64,
    pub status: QueryStatus,
    pub error_message: Option<String>,
    pub conversation_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// What happened to a submitted entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutcome {
    Queued,
    /// Queue was full; the entry was discarded.
    QueueFull,
    /// No user was attached; the entry was discarded.
    MissingUser,
}

/// Where the worker writes entries.
#[async_trait]
pub trait QueryLogSink: Send + Sync {
    async fn write(&self, record: &QueryLogRecord) -> Result<(), TelemetryError>;
}

/// Persists entries into the `query_logs` table.
pub struct SqliteQueryLogSink {
    pool: SqlitePool,
}

impl SqliteQueryLogSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueryLogSink for SqliteQueryLogSink {
    async fn write(&self, record: &QueryLogRecord) -> Result<(), TelemetryError> {
        queries::insert(&self.pool, record).await.map(|_| ())
    }
}

/// Truncate to at most `max` characters.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Producer handle. Cheap to clone; the worker stops once every handle is gone.
#[derive(Clone)]
pub struct QueryLogPipeline {
    tx: mpsc::Sender<QueryLogRecord>,
}

/// Single consumer draining the queue into a sink.
pub struct QueryLogWorker {
    rx: mpsc::Receiver<QueryLogRecord>,
    sink: Arc<dyn QueryLogSink>,
}

impl QueryLogPipeline {
    /// Create a pipeline and its (not yet running) worker.
    pub fn channel(sink: Arc<dyn QueryLogSink>, capacity: usize) -> (Self, QueryLogWorker) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, QueryLogWorker { rx, sink })
    }

    /// Create a pipeline and spawn its worker.
    pub fn start(sink: Arc<dyn QueryLogSink>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (pipeline, worker) = Self::channel(sink, capacity);
        (pipeline, tokio::spawn(worker.run()))
    }

    /// Submit an entry without waiting.
    pub fn log_async(&self, entry: NewQueryLog) -> LogOutcome {
        let Some(user_id) = entry.user_id else {
            debug!(endpoint = %entry.endpoint, "Skipping query log without user");
            return LogOutcome::MissingUser;
        };

        let status = entry.status.unwrap_or(if entry.error_message.is_some() {
            QueryStatus::Error
        } else {
            QueryStatus::Success
        });

        let record = QueryLogRecord {
            user_id,
            api_key_id: entry.api_key_id,
            endpoint: entry.endpoint,
            query: entry.query,
            response: entry
                .response
                .map(|r| truncate_chars(&r, MAX_RESPONSE_CHARS)),
            model_provider: entry.model_provider.filter(|p| !p.is_empty()),
            rag_contexts_count: entry.rag_contexts_count,
            input_tokens: entry.input_tokens,
            output_tokens: entry.output_tokens,
            latency_ms: entry.latency_ms,
            status,
            error_message: entry.error_message.filter(|m| !m.is_empty()),
            conversation_id: entry.conversation_id,
            created_at: entry.created_at.unwrap_or_else(Utc::now),
        };

        match self.tx.try_send(record) {
            Ok(()) => LogOutcome::Queued,
            Err(TrySendError::Full(dropped)) => {
                warn!(endpoint = %dropped.endpoint, "Query log queue full, dropping entry");
                LogOutcome::QueueFull
            }
            Err(TrySendError::Closed(dropped)) => {
                warn!(endpoint = %dropped.endpoint, "Query log worker stopped, dropping entry");
                LogOutcome::QueueFull
            }
        }
    }
}

impl QueryLogWorker {
    /// Persist entries until every producer is dropped, then drain and exit.
    pub async fn run(mut self) {
        while let Some(record) = self.rx.recv().await {
            if let Err(e) = self.sink.write(&record).await {
                warn!(
                    user_id = record.user_id,
                    endpoint = %record.endpoint,
                    error = %e,
                    "Failed to persist query log"
                );
            }
        }
        info!("Query log worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recording {
        records: Mutex<Vec<QueryLogRecord>>,
    }

    #[async_trait]
    impl QueryLogSink for Recording {
        async fn write(&self, record: &QueryLogRecord) -> Result<(), TelemetryError> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl QueryLogSink for Failing {
        async fn write(&self, _: &QueryLogRecord) -> Result<(), TelemetryError> {
            Err(TelemetryError::Validation("disk on fire".into()))
        }
    }

    fn entry(user_id: Option<i64>) -> NewQueryLog {
        NewQueryLog {
            user_id,
            endpoint: "/api/v1/chat".into(),
            query: "q".into(),
            ..Default::default()
        }
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("日本語", 3), "日本語");
    }

    #[tokio::test]
    async fn saturated_queue_drops_without_blocking() {
        let sink = Arc::new(Recording::default());
        let (pipeline, worker) = QueryLogPipeline::channel(sink.clone(), 2);

        assert_eq!(pipeline.log_async(entry(Some(1))), LogOutcome::Queued);
        assert_eq!(pipeline.log_async(entry(Some(1))), LogOutcome::Queued);
        assert_eq!(pipeline.log_async(entry(Some(1))), LogOutcome::QueueFull);

        drop(pipeline);
        worker.run().await;
        assert_eq!(sink.records.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn entries_without_user_are_skipped() {
        let sink = Arc::new(Recording::default());
        let (pipeline, worker) = QueryLogPipeline::channel(sink.clone(), 4);
        assert_eq!(pipeline.log_async(entry(None)), LogOutcome::MissingUser);
        drop(pipeline);
        worker.run().await;
        assert!(sink.records.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn worker_drains_and_normalizes() {
        let sink = Arc::new(Recording::default());
        let (pipeline, handle) = QueryLogPipeline::start(sink.clone(), 8);

        let mut failed = entry(Some(7));
        failed.response = Some("x".repeat(MAX_RESPONSE_CHARS + 50));
        failed.error_message = Some("upstream down".into());
        failed.model_provider = Some(String::new());
        assert_eq!(pipeline.log_async(failed), LogOutcome::Queued);

        drop(pipeline);
        handle.await.unwrap();

        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.status, QueryStatus::Error);
        assert_eq!(r.response.as_ref().unwrap().chars().count(), MAX_RESPONSE_CHARS);
        assert_eq!(r.model_provider, None);
    }

    #[tokio::test]
    async fn sink_failures_do_not_stop_the_worker() {
        let (pipeline, handle) = QueryLogPipeline::start(Arc::new(Failing), 8);
        for _ in 0..3 {
            assert_eq!(pipeline.log_async(entry(Some(1))), LogOutcome::Queued);
        }
        drop(pipeline);
        handle.await.unwrap();
    }
}
