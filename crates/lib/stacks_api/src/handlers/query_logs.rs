//! Query log administration.

use axum::extract::State;
use chrono::{DateTime, Utc};
use tracing::info;

use stacks_core::models::query_log::{QueryLog, QueryLogStats};
use stacks_core::telemetry::queries::{self, ListParams, QueryLogPage, parse_filter_date};

use crate::AppState;
use crate::error::AppResult;
use crate::extract::{Json, Path, Query};
use crate::models::{PruneQuery, PruneResponse, QueryLogListQuery, QueryLogStatsQuery};

fn date(raw: Option<&str>, end_of_day: bool) -> AppResult<Option<DateTime<Utc>>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => Ok(Some(parse_filter_date(s, end_of_day)?)),
        None => Ok(None),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// `GET /api/v1/admin/query-logs`: filtered, paginated, newest first.
pub async fn list_query_logs_handler(
    State(state): State<AppState>,
    Query(q): Query<QueryLogListQuery>,
) -> AppResult<Json<QueryLogPage>> {
    let params = ListParams {
        page: q.page,
        limit: q.limit,
        user_id: q.user_id,
        api_key_id: q.api_key_id,
        status: non_empty(q.status),
        endpoint: non_empty(q.endpoint),
        model_provider: non_empty(q.model_provider),
        start_date: date(q.start_date.as_deref(), false)?,
        end_date: date(q.end_date.as_deref(), true)?,
    };
    Ok(Json(queries::list(&state.pool, &params).await?))
}

/// `GET /api/v1/admin/query-logs/{id}`
pub async fn get_query_log_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<QueryLog>> {
    Ok(Json(queries::get_by_id(&state.pool, id).await?))
}

/// `GET /api/v1/admin/query-logs/stats`
pub async fn query_log_stats_handler(
    State(state): State<AppState>,
    Query(q): Query<QueryLogStatsQuery>,
) -> AppResult<Json<QueryLogStats>> {
    let start = date(q.start_date.as_deref(), false)?;
    let end = date(q.end_date.as_deref(), true)?;
    Ok(Json(queries::stats(&state.pool, start, end).await?))
}

/// `DELETE /api/v1/admin/query-logs?before=`: delete entries created before the cutoff.
pub async fn prune_query_logs_handler(
    State(state): State<AppState>,
    Query(q): Query<PruneQuery>,
) -> AppResult<Json<PruneResponse>> {
    let cutoff = parse_filter_date(q.before.trim(), false)?;
    let deleted = queries::delete_older_than(&state.pool, cutoff).await?;
    info!(deleted, %cutoff, "Query logs pruned by admin");
    Ok(Json(PruneResponse { deleted }))
}
