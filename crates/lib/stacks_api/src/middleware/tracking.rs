//! Query tracking middleware.
//!
//! Tracked endpoints have their request body, response body, latency and
//! outcome summarized into a query log entry. Handlers add what only they
//! know (provider, tokens, context count) through a [`QueryMetrics`]
//! response extension. Entries are queued without waiting; see
//! [`stacks_core::telemetry`].

use std::time::Instant;

use axum::body::Body;
use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Extension;
use tracing::warn;

use stacks_core::codegen::{ProviderKind, TokenCount};
use stacks_core::models::query_log::{NewQueryLog, QueryStatus};

use crate::AppState;
use crate::error::{AppError, ErrorDetail};
use crate::extract::Json;
use crate::middleware::auth::ApiKeyUser;
use crate::routes;

/// Request bodies larger than this are rejected on tracked endpoints.
pub const MAX_TRACKED_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Handler-reported facts about a tracked request.
#[derive(Debug, Clone, Default)]
pub struct QueryMetrics {
    pub model_provider: Option<ProviderKind>,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub rag_contexts_count: i64,
    pub conversation_id: Option<i64>,
    pub error_message: Option<String>,
}

impl QueryMetrics {
    pub fn tokens(&mut self, input: TokenCount, output: TokenCount) {
        self.input_tokens = input.value();
        self.output_tokens = output.value();
    }
}

/// Return type for tracked handlers: metrics ride along on success and failure.
pub type Tracked<T> =
    Result<(Extension<QueryMetrics>, Json<T>), (Extension<QueryMetrics>, AppError)>;

/// Axum middleware: records tracked endpoints. Must run after `require_api_key`.
pub async fn track_queries(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .filter(|p| routes::TRACKED.contains(&p.as_str()));
    let Some(endpoint) = endpoint else {
        return next.run(request).await;
    };
    let principal = request.extensions().get::<ApiKeyUser>().map(|u| u.0);

    let (parts, body) = request.into_parts();
    let request_bytes = match axum::body::to_bytes(body, MAX_TRACKED_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return AppError::Validation(format!("Unreadable request body: {e}")).into_response();
        }
    };
    let query = String::from_utf8_lossy(&request_bytes).trim().to_string();
    let request = Request::from_parts(parts, Body::from(request_bytes));

    let started = Instant::now();
    let response = next.run(request).await;

    let (mut parts, body) = response.into_parts();
    let response_bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(endpoint = %endpoint, error = %e, "Failed to buffer tracked response");
            return AppError::Internal(e.to_string()).into_response();
        }
    };
    let latency_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);

    let metrics = parts.extensions.remove::<QueryMetrics>().unwrap_or_default();
    let detail = parts.extensions.remove::<ErrorDetail>();
    let status = QueryStatus::from_http_status(parts.status.as_u16());
    let error_message = match status {
        QueryStatus::Success => None,
        QueryStatus::Error => metrics
            .error_message
            .or(detail.map(|d| d.0))
            .or_else(|| parts.status.canonical_reason().map(str::to_owned)),
    };

    state.telemetry.log_async(NewQueryLog {
        user_id: principal.map(|p| p.user_id),
        api_key_id: principal.map(|p| p.api_key_id),
        endpoint,
        query,
        response: Some(String::from_utf8_lossy(&response_bytes).into_owned()),
        model_provider: metrics.model_provider.map(|p| p.as_str().to_owned()),
        rag_contexts_count: metrics.rag_contexts_count,
        input_tokens: metrics.input_tokens,
        output_tokens: metrics.output_tokens,
        latency_ms,
        status: Some(status),
        error_message,
        conversation_id: metrics.conversation_id,
        created_at: None,
    });

    Response::from_parts(parts, Body::from(response_bytes))
}
