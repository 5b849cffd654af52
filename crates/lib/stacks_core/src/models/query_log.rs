//! Query log domain models.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome recorded for a tracked request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    Success,
    Error,
}

impl QueryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryStatus::Success => "success",
            QueryStatus::Error => "error",
        }
    }

    /// 2xx and 3xx count as success.
    pub fn from_http_status(status: u16) -> Self {
        if (200..400).contains(&status) {
            QueryStatus::Success
        } else {
            QueryStatus::Error
        }
    }
}

/// An entry submitted to the telemetry pipeline.
///
/// `user_id` is optional because unauthenticated requests still reach the
/// pipeline; such entries are dropped there.
#[derive(Debug, Clone, Default)]
pub struct NewQueryLog {
    pub user_id: Option<i64>,
    pub api_key_id: Option<i64>,
    pub endpoint: String,
    pub query: String,
    pub response: Option<String>,
    pub model_provider: Option<String>,
    pub rag_contexts_count: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub latency_ms: i64,
    pub status: Option<QueryStatus>,
    pub error_message: Option<String>,
    pub conversation_id: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
}

/// A persisted query log row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct QueryLog {
    pub id: i64,
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
    pub status: String,
    pub error_message: Option<String>,
    pub conversation_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Aggregates over a time window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryLogStats {
    pub total_queries: i64,
    pub success_count: i64,
    pub error_count: i64,
    pub avg_latency_ms: f64,
    pub total_input_tokens: i64,
    pub total_output_tokens: i64,
    pub by_endpoint: BTreeMap<String, i64>,
    pub by_provider: BTreeMap<String, i64>,
}
