//! Conversational chat handler.

use axum::extract::State;
use axum::Extension;
use tracing::{Instrument, info_span};

use stacks_core::orchestrator::{ChatError, ChatOutcome, ChatRequest};

use crate::AppState;
use crate::error::AppError;
use crate::extract::Json;
use crate::middleware::auth::ApiKeyUser;
use crate::middleware::tracking::{QueryMetrics, Tracked};
use crate::models::{ChatRequestBody, ChatResponse};

/// `POST /api/v1/chat`: answer a message, creating or continuing a conversation.
pub async fn chat_handler(
    State(state): State<AppState>,
    Extension(user): Extension<ApiKeyUser>,
    Json(body): Json<ChatRequestBody>,
) -> Tracked<ChatResponse> {
    let request = ChatRequest {
        user_id: user.0.user_id,
        query: body.query,
        temperature: body.temperature.unwrap_or_default(),
        max_tokens: body.max_tokens.unwrap_or_default(),
        conversation_id: body.conversation_id,
    };
    match run_chat(&state, request).await {
        Ok((metrics, outcome)) => Ok((Extension(metrics), Json(ChatResponse::from(&outcome)))),
        Err((metrics, e)) => Err((Extension(metrics), e)),
    }
}

/// Run one chat request under its own span, cancelled if the server shuts
/// down or the caller goes away.
pub(crate) async fn run_chat(
    state: &AppState,
    mut request: ChatRequest,
) -> Result<(QueryMetrics, ChatOutcome), (QueryMetrics, AppError)> {
    // Clients send 0 to mean "start a new conversation".
    request.conversation_id = request.conversation_id.filter(|&id| id != 0);
    let span = info_span!(
        "chat",
        user_id = request.user_id,
        conversation_id = ?request.conversation_id
    );
    let mut metrics = QueryMetrics {
        conversation_id: request.conversation_id,
        ..Default::default()
    };

    let cancel = state.shutdown.child_token();
    let _guard = cancel.clone().drop_guard();

    match state.orchestrator.chat(request, &cancel).instrument(span).await {
        Ok(outcome) => {
            record(&mut metrics, &outcome);
            Ok((metrics, outcome))
        }
        Err(e) => {
            match &e {
                ChatError::NotPersisted { outcome, .. } => record(&mut metrics, outcome),
                ChatError::Generation(_) => {
                    metrics.model_provider = Some(state.providers.selected());
                }
                // The id would violate the query log foreign key.
                ChatError::ConversationNotFound(_) => metrics.conversation_id = None,
                _ => {}
            }
            metrics.error_message = Some(e.to_string());
            Err((metrics, AppError::from(e)))
        }
    }
}

fn record(metrics: &mut QueryMetrics, outcome: &ChatOutcome) {
    metrics.model_provider = Some(outcome.provider);
    metrics.tokens(outcome.input_tokens, outcome.output_tokens);
    metrics.rag_contexts_count = i64::try_from(outcome.context_count).unwrap_or(i64::MAX);
    metrics.conversation_id = outcome.conversation_id.or(metrics.conversation_id);
}
