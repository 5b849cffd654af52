//! Query log persistence and reporting.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::TelemetryError;
use super::pipeline::QueryLogRecord;
use crate::models::query_log::{QueryLog, QueryLogStats};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 500;

const SELECT_COLUMNS: &str = "SELECT id, user_id, api_key_id, endpoint, query, response, model_provider, \
     rag_contexts_count, input_tokens, output_tokens, latency_ms, status, error_message, \
     conversation_id, created_at FROM query_logs";

/// Filters and pagination for [`list`].
#[derive(Debug, Clone, Default)]
pub struct ListParams {
    /// 1-based; defaults to 1.
    pub page: Option<i64>,
    /// Defaults to 20, capped at 500.
    pub limit: Option<i64>,
    pub user_id: Option<i64>,
    pub api_key_id: Option<i64>,
    pub status: Option<String>,
    pub endpoint: Option<String>,
    pub model_provider: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl ListParams {
    pub fn effective_page(&self) -> i64 {
        self.page.filter(|p| *p > 0).unwrap_or(1)
    }

    pub fn effective_limit(&self) -> i64 {
        match self.limit {
            Some(l) if l > 0 => l.min(MAX_PAGE_SIZE),
            _ => DEFAULT_PAGE_SIZE,
        }
    }
}

/// One page of results.
#[derive(Debug, Clone, Serialize)]
pub struct QueryLogPage {
    pub logs: Vec<QueryLog>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

/// Parse a filter date: `YYYY-MM-DD` or RFC 3339.
///
/// A bare date is the start of that day, or the last instant of it when
/// `end_of_day` is set.
pub fn parse_filter_date(raw: &str, end_of_day: bool) -> Result<DateTime<Utc>, TelemetryError> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let time = if end_of_day {
            date.and_hms_nano_opt(23, 59, 59, 999_999_999)
        } else {
            date.and_hms_opt(0, 0, 0)
        };
        return time
            .map(|t| t.and_utc())
            .ok_or_else(|| TelemetryError::Validation(format!("invalid date '{raw}'")));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| {
            TelemetryError::Validation(format!(
                "invalid date '{raw}': expected YYYY-MM-DD or RFC 3339"
            ))
        })
}

fn push_clause(qb: &mut QueryBuilder<'_, Sqlite>, first: &mut bool, sql: &str) {
    qb.push(if *first { " WHERE " } else { " AND " });
    qb.push(sql);
    *first = false;
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, params: &ListParams) {
    let mut first = true;

    if let Some(user_id) = params.user_id {
        push_clause(qb, &mut first, "user_id = ");
        qb.push_bind(user_id);
    }
    if let Some(api_key_id) = params.api_key_id {
        push_clause(qb, &mut first, "api_key_id = ");
        qb.push_bind(api_key_id);
    }
    if let Some(status) = params.status.as_ref().filter(|s| !s.is_empty()) {
        push_clause(qb, &mut first, "status = ");
        qb.push_bind(status.clone());
    }
    if let Some(endpoint) = params.endpoint.as_ref().filter(|s| !s.is_empty()) {
        push_clause(qb, &mut first, "endpoint = ");
        qb.push_bind(endpoint.clone());
    }
    if let Some(provider) = params.model_provider.as_ref().filter(|s| !s.is_empty()) {
        push_clause(qb, &mut first, "model_provider = ");
        qb.push_bind(provider.clone());
    }
    if let Some(start) = params.start_date {
        push_clause(qb, &mut first, "created_at >= ");
        qb.push_bind(start);
    }
    if let Some(end) = params.end_date {
        push_clause(qb, &mut first, "created_at <= ");
        qb.push_bind(end);
    }
}

/// Insert one entry, returning its ID.
pub async fn insert(pool: &SqlitePool, record: &QueryLogRecord) -> Result<i64, TelemetryError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO query_logs (user_id, api_key_id, endpoint, query, response, model_provider, \
         rag_contexts_count, input_tokens, output_tokens, latency_ms, status, error_message, \
         conversation_id, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(record.user_id)
    .bind(record.api_key_id)
    .bind(&record.endpoint)
    .bind(&record.query)
    .bind(record.response.as_deref())
    .bind(record.model_provider.as_deref())
    .bind(record.rag_contexts_count)
    .bind(record.input_tokens)
    .bind(record.output_tokens)
    .bind(record.latency_ms)
    .bind(record.status.as_str())
    .bind(record.error_message.as_deref())
    .bind(record.conversation_id)
    .bind(record.created_at)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

/// List entries newest first.
pub async fn list(pool: &SqlitePool, params: &ListParams) -> Result<QueryLogPage, TelemetryError> {
    let page = params.effective_page();
    let limit = params.effective_limit();

    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM query_logs");
    push_filters(&mut count, params);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let mut select = QueryBuilder::<Sqlite>::new(SELECT_COLUMNS);
    push_filters(&mut select, params);
    select.push(" ORDER BY created_at DESC, id DESC LIMIT ");
    select.push_bind(limit);
    select.push(" OFFSET ");
    select.push_bind((page - 1) * limit);
    let logs = select.build_query_as::<QueryLog>().fetch_all(pool).await?;

    Ok(QueryLogPage {
        logs,
        total,
        page,
        limit,
    })
}

/// Fetch one entry.
pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<QueryLog, TelemetryError> {
    let sql = format!("{SELECT_COLUMNS} WHERE id = ?");
    sqlx::query_as::<_, QueryLog>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(TelemetryError::NotFound(id))
}

/// Aggregate entries created within `[start, end]`.
pub async fn stats(
    pool: &SqlitePool,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<QueryLogStats, TelemetryError> {
    let window = ListParams {
        start_date: start,
        end_date: end,
        ..Default::default()
    };

    let mut totals = QueryBuilder::<Sqlite>::new(
        "SELECT COUNT(*), \
         CAST(COALESCE(SUM(CASE WHEN status = 'success' THEN 1 ELSE 0 END), 0) AS INTEGER), \
         CAST(COALESCE(SUM(CASE WHEN status = 'error' THEN 1 ELSE 0 END), 0) AS INTEGER), \
         CAST(COALESCE(AVG(latency_ms), 0) AS REAL), \
         CAST(COALESCE(SUM(input_tokens), 0) AS INTEGER), \
         CAST(COALESCE(SUM(output_tokens), 0) AS INTEGER) \
         FROM query_logs",
    );
    push_filters(&mut totals, &window);
    let (total_queries, success_count, error_count, avg_latency_ms, total_input_tokens, total_output_tokens) =
        totals
            .build_query_as::<(i64, i64, i64, f64, i64, i64)>()
            .fetch_one(pool)
            .await?;

    let mut by_endpoint = QueryBuilder::<Sqlite>::new("SELECT endpoint, COUNT(*) FROM query_logs");
    push_filters(&mut by_endpoint, &window);
    by_endpoint.push(" GROUP BY endpoint");
    let by_endpoint = by_endpoint
        .build_query_as::<(String, i64)>()
        .fetch_all(pool)
        .await?;

    let mut by_provider = QueryBuilder::<Sqlite>::new(
        "SELECT COALESCE(model_provider, ''), COUNT(*) FROM query_logs",
    );
    push_filters(&mut by_provider, &window);
    by_provider.push(" GROUP BY COALESCE(model_provider, '')");
    let by_provider = by_provider
        .build_query_as::<(String, i64)>()
        .fetch_all(pool)
        .await?;

    Ok(QueryLogStats {
        total_queries,
        success_count,
        error_count,
        avg_latency_ms,
        total_input_tokens,
        total_output_tokens,
        by_endpoint: by_endpoint.into_iter().collect(),
        by_provider: by_provider
            .into_iter()
            .filter(|(provider, _)| !provider.is_empty())
            .collect(),
    })
}

/// Delete entries created before `cutoff`, returning how many were removed.
pub async fn delete_older_than(pool: &SqlitePool, cutoff: DateTime<Utc>) -> Result<u64, TelemetryError> {
    let result = sqlx::query("DELETE FROM query_logs WHERE created_at < ?")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
