//! OpenAI-compatible chat completions.

use axum::extract::State;
use axum::Extension;
use chrono::Utc;
use uuid::Uuid;

use stacks_core::orchestrator::ChatRequest;

use crate::AppState;
use crate::error::AppError;
use crate::extract::Json;
use crate::handlers::chat::run_chat;
use crate::middleware::auth::ApiKeyUser;
use crate::middleware::tracking::{QueryMetrics, Tracked};
use crate::models::{
    ChatCompletionChoice, ChatCompletionRequest, ChatCompletionResponse, ChatCompletionUsage,
    CompletionMessage,
};

/// The query is the most recent `user` message.
pub fn last_user_message(messages: &[CompletionMessage]) -> Result<&str, AppError> {
    if messages.is_empty() {
        return Err(AppError::Validation("At least one message is required".into()));
    }
    messages
        .iter()
        .rev()
        .find(|m| m.role == "user" && !m.content.trim().is_empty())
        .map(|m| m.content.as_str())
        .ok_or_else(|| AppError::Validation("No user message found in messages array".into()))
}

/// `POST /v1/chat/completions`
pub async fn chat_completions_handler(
    State(state): State<AppState>,
    Extension(user): Extension<ApiKeyUser>,
    Json(body): Json<ChatCompletionRequest>,
) -> Tracked<ChatCompletionResponse> {
    let query = match last_user_message(&body.messages) {
        Ok(q) => q.to_string(),
        Err(e) => return Err((Extension(QueryMetrics::default()), e)),
    };

    let request = ChatRequest {
        user_id: user.0.user_id,
        query,
        temperature: body.temperature.unwrap_or_default(),
        max_tokens: body.max_tokens.unwrap_or_default(),
        conversation_id: body.conversation_id,
    };
    let (metrics, outcome) = run_chat(&state, request)
        .await
        .map_err(|(metrics, e)| (Extension(metrics), e))?;

    let model = body
        .model
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| outcome.provider.as_str().to_string());

    let prompt_tokens = outcome.input_tokens.value();
    let completion_tokens = outcome.output_tokens.value();
    let response = ChatCompletionResponse {
        id: format!("chatcmpl-{}", Uuid::new_v4()),
        object: "chat.completion".into(),
        created: Utc::now().timestamp(),
        model,
        choices: vec![ChatCompletionChoice {
            index: 0,
            message: CompletionMessage {
                role: "assistant".into(),
                content: outcome.message,
            },
            finish_reason: "stop".into(),
        }],
        usage: ChatCompletionUsage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        },
        conversation_id: outcome.conversation_id,
    };
    Ok((Extension(metrics), Json(response)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: &str, content: &str) -> CompletionMessage {
        CompletionMessage {
            role: role.into(),
            content: content.into(),
        }
    }

    #[test]
    fn picks_the_latest_user_message() {
        let messages = [
            msg("system", "be brief"),
            msg("user", "first"),
            msg("assistant", "ok"),
            msg("user", "second"),
        ];
        assert_eq!(last_user_message(&messages).unwrap(), "second");
    }

    #[test]
    fn requires_a_user_message() {
        assert!(matches!(last_user_message(&[]), Err(AppError::Validation(_))));
        assert!(matches!(
            last_user_message(&[msg("system", "hi")]),
            Err(AppError::Validation(m)) if m.contains("No user message")
        ));
    }
}
