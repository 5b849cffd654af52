//! Query telemetry.
//!
//! Tracked requests are summarized into query log entries and handed to a
//! bounded queue without waiting. A single background worker persists them.
//! When the queue is full, entries are dropped; the request never slows down
//! because of telemetry.

pub mod pipeline;
pub mod queries;

use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub use pipeline::{LogOutcome, QueryLogPipeline, QueryLogRecord, QueryLogSink, QueryLogWorker, SqliteQueryLogSink};

/// Default queue depth.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Longest response text stored per entry, in characters.
pub const MAX_RESPONSE_CHARS: usize = 10_000;

/// How often the retention task prunes old entries.
pub const RETENTION_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Telemetry errors.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),

    #[error("Query log {0} not found")]
    NotFound(i64),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Periodically delete entries older than `retention` until cancelled.
pub fn spawn_retention_task(
    pool: SqlitePool,
    retention: chrono::Duration,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let cutoff = Utc::now() - retention;
                    match queries::delete_older_than(&pool, cutoff).await {
                        Ok(0) => {}
                        Ok(deleted) => info!(deleted, %cutoff, "Pruned old query logs"),
                        Err(e) => warn!(error = %e, "Query log pruning failed"),
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::queries::create_user;
    use crate::db::connect_in_memory;
    use crate::models::auth::Role;
    use crate::models::query_log::QueryStatus;

    #[tokio::test]
    async fn retention_task_prunes_on_first_tick_and_stops_on_cancel() {
        let pool = connect_in_memory().await.unwrap();
        let user_id = create_user(&pool, "keeper", "secret1", None, Role::User)
            .await
            .unwrap();
        let mut entry = QueryLogRecord {
            user_id,
            api_key_id: None,
            endpoint: "/api/v1/chat".into(),
            query: "{}".into(),
            response: None,
            model_provider: None,
            rag_contexts_count: 0,
            input_tokens: 0,
            output_tokens: 0,
            latency_ms: 1,
            status: QueryStatus::Success,
            error_message: None,
            conversation_id: None,
            created_at: Utc::now() - chrono::Duration::days(10),
        };
        queries::insert(&pool, &entry).await.unwrap();
        entry.created_at = Utc::now();
        queries::insert(&pool, &entry).await.unwrap();

        let cancel = CancellationToken::new();
        let task = spawn_retention_task(
            pool.clone(),
            chrono::Duration::days(7),
            RETENTION_INTERVAL,
            cancel.clone(),
        );

        let mut remaining = 2;
        for _ in 0..200 {
            remaining = queries::list(&pool, &Default::default()).await.unwrap().total;
            if remaining == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(remaining, 1);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
