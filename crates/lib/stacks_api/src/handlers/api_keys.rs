//! API key management handlers.

use axum::Extension;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;

use stacks_core::auth::api_keys;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::extract::{Json, Path};
use crate::middleware::auth::BasicUser;
use crate::models::{ApiKeyInfoResponse, CreateApiKeyRequest, CreateApiKeyResponse, SuccessResponse};

/// `POST /api/v1/auth/keys`: issue a new API key. The plaintext is only returned here.
pub async fn create_api_key_handler(
    State(state): State<AppState>,
    Extension(user): Extension<BasicUser>,
    body: Bytes,
) -> AppResult<(StatusCode, Json<CreateApiKeyResponse>)> {
    // The body is optional; an empty one means "use the default name".
    let body: CreateApiKeyRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CreateApiKeyRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::Validation(format!("Invalid request body: {e}")))?
    };
    let created = api_keys::generate_api_key(&state.pool, user.0.id, body.name.as_deref()).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateApiKeyResponse {
            success: true,
            message: "API key created successfully".into(),
            id: created.id,
            api_key: created.api_key,
            name: created.name,
            prefix: created.prefix,
            created_at: created.created_at.to_rfc3339(),
        }),
    ))
}

/// `GET /api/v1/auth/keys`: list the caller's keys (metadata only).
pub async fn list_api_keys_handler(
    State(state): State<AppState>,
    Extension(user): Extension<BasicUser>,
) -> AppResult<Json<Vec<ApiKeyInfoResponse>>> {
    let keys = api_keys::list_api_keys(&state.pool, user.0.id)
        .await?
        .into_iter()
        .map(|k| ApiKeyInfoResponse {
            id: k.id,
            name: k.name,
            prefix: k.prefix,
            created_at: k.created_at.to_rfc3339(),
            last_used_at: k.last_used_at.map(|t| t.to_rfc3339()),
            expires_at: k.expires_at.map(|t| t.to_rfc3339()),
            is_active: k.is_active,
        })
        .collect();
    Ok(Json(keys))
}

/// `DELETE /api/v1/auth/keys/{id}`: revoke one of the caller's keys.
pub async fn revoke_api_key_handler(
    State(state): State<AppState>,
    Extension(user): Extension<BasicUser>,
    Path(key_id): Path<i64>,
) -> AppResult<Json<SuccessResponse>> {
    api_keys::revoke_api_key(&state.pool, user.0.id, key_id).await?;
    Ok(Json(SuccessResponse {
        success: true,
        message: "API key revoked successfully".into(),
    }))
}
