//! Conversation retrieval.

use axum::Extension;
use axum::extract::State;

use stacks_core::conversations;

use crate::AppState;
use crate::error::AppResult;
use crate::extract::{Json, Path};
use crate::middleware::auth::ApiKeyUser;
use crate::models::ConversationResponse;

/// `GET /api/v1/conversations/{id}`: reload one of the caller's conversations.
pub async fn get_conversation_handler(
    State(state): State<AppState>,
    Extension(user): Extension<ApiKeyUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<ConversationResponse>> {
    let conversation = conversations::get(&state.pool, id, user.0.user_id).await?;
    Ok(Json(ConversationResponse {
        id: conversation.id.unwrap_or(id),
        history: conversation.history,
        new_message: conversation.new_message,
        created_at: conversation.created_at.to_rfc3339(),
        updated_at: conversation.updated_at.to_rfc3339(),
    }))
}
