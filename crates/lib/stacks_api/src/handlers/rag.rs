//! Retrieval and single-shot generation.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Extension;
use tracing::warn;

use stacks_core::orchestrator::{ChatError, GenerateRequest};

use crate::AppState;
use crate::error::AppError;
use crate::extract::Json;
use crate::middleware::tracking::{QueryMetrics, Tracked};
use crate::models::{
    GenerateRequestBody, GenerateResponse, RagHealthResponse, RetrieveRequest, RetrieveResponse,
};

/// `POST /api/v1/rag/retrieve`: formatted context plus the raw ranked snippets.
pub async fn retrieve_handler(
    State(state): State<AppState>,
    Json(body): Json<RetrieveRequest>,
) -> Tracked<RetrieveResponse> {
    let mut metrics = QueryMetrics::default();
    match state.retrieval.retrieve_context(&body.query, body.n_results).await {
        Ok(result) => {
            metrics.rag_contexts_count = i64::try_from(result.context_count()).unwrap_or(i64::MAX);
            Ok((Extension(metrics), Json(RetrieveResponse::from(result))))
        }
        Err(e) => {
            metrics.error_message = Some(e.to_string());
            Err((Extension(metrics), AppError::from(e)))
        }
    }
}

/// `POST /api/v1/rag/generate`: retrieve, then generate once. No conversation.
pub async fn generate_handler(
    State(state): State<AppState>,
    Json(body): Json<GenerateRequestBody>,
) -> Tracked<GenerateResponse> {
    let mut metrics = QueryMetrics::default();
    let cancel = state.shutdown.child_token();
    let _guard = cancel.clone().drop_guard();

    let request = GenerateRequest {
        query: body.query,
        temperature: body.temperature.unwrap_or_default(),
        max_tokens: body.max_tokens.unwrap_or_default(),
    };
    match state.orchestrator.generate(request, &cancel).await {
        Ok(outcome) => {
            metrics.model_provider = Some(outcome.provider);
            metrics.tokens(outcome.input_tokens, outcome.output_tokens);
            metrics.rag_contexts_count = i64::try_from(outcome.context_count).unwrap_or(i64::MAX);
            Ok((Extension(metrics), Json(GenerateResponse::from(outcome))))
        }
        Err(e) => {
            if matches!(e, ChatError::Generation(_)) {
                metrics.model_provider = Some(state.providers.selected());
            }
            metrics.error_message = Some(e.to_string());
            Err((Extension(metrics), AppError::from(e)))
        }
    }
}

/// `GET /api/v1/rag/health`: probe the retriever end to end.
pub async fn rag_health_handler(
    State(state): State<AppState>,
) -> (StatusCode, Json<RagHealthResponse>) {
    match state.retrieval.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(RagHealthResponse {
                status: "ok".into(),
                error: None,
            }),
        ),
        Err(e) => {
            warn!(error = %e, "Retriever health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(RagHealthResponse {
                    status: "unavailable".into(),
                    error: Some("Retriever is not reachable".into()),
                }),
            )
        }
    }
}
