//! Application error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use stacks_core::auth::AuthError;
use stacks_core::codegen::CodegenError;
use stacks_core::conversations::ConversationError;
use stacks_core::orchestrator::ChatError;
use stacks_core::retrieval::RetrievalError;
use stacks_core::telemetry::TelemetryError;

use crate::models::{ChatResponse, ErrorResponse};

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Full error text attached to error responses for the tracking middleware.
///
/// Never serialized to the client.
#[derive(Debug, Clone)]
pub struct ErrorDetail(pub String);

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// `message` goes to the client, `detail` stays server-side.
    #[error("{detail}")]
    Upstream { message: String, detail: String },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Data corruption: {0}")]
    DataCorruption(String),

    /// The answer exists but could not be saved; it is returned anyway.
    #[error("{message}")]
    NotPersisted {
        message: String,
        response: Box<ChatResponse>,
    },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let detail = ErrorDetail(self.to_string());
        let (status, error, message) = match &self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "validation_error", m.as_str()),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized", m.as_str()),
            AppError::Forbidden(m) => (StatusCode::FORBIDDEN, "forbidden", m.as_str()),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m.as_str()),
            AppError::Conflict(m) => (StatusCode::CONFLICT, "conflict", m.as_str()),
            AppError::Upstream { message, .. } => {
                (StatusCode::BAD_GATEWAY, "upstream_error", message.as_str())
            }
            AppError::Timeout(m) => (StatusCode::GATEWAY_TIMEOUT, "timeout", m.as_str()),
            AppError::DataCorruption(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "data_corruption",
                "Stored data is corrupt",
            ),
            AppError::NotPersisted { message, .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "not_persisted",
                message.as_str(),
            ),
            AppError::Cancelled => (
                StatusCode::SERVICE_UNAVAILABLE,
                "cancelled",
                "Request cancelled",
            ),
            AppError::Internal(m) => {
                error!(error = %m, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error",
                )
            }
        };

        let mut resp = match &self {
            AppError::NotPersisted { response, .. } => (
                status,
                Json(serde_json::json!({
                    "error": error,
                    "message": message,
                    "response": response,
                })),
            )
                .into_response(),
            _ => (
                status,
                Json(ErrorResponse {
                    error: error.to_string(),
                    message: message.to_string(),
                }),
            )
                .into_response(),
        };
        resp.extensions_mut().insert(detail);
        resp
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::NotFound("row not found".into()),
            _ => AppError::Internal(e.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials
            | AuthError::InvalidApiKey
            | AuthError::ApiKeyRevoked
            | AuthError::ApiKeyExpired => AppError::Unauthorized(e.to_string()),
            AuthError::Validation(msg) => AppError::Validation(msg),
            AuthError::Conflict(msg) => AppError::Conflict(msg),
            AuthError::NotFound(msg) => AppError::NotFound(msg),
            AuthError::DbError(e) => AppError::from(e),
            AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<ConversationError> for AppError {
    fn from(e: ConversationError) -> Self {
        match e {
            ConversationError::NotFound(_) => AppError::NotFound(e.to_string()),
            ConversationError::DataCorruption(msg) => AppError::DataCorruption(msg),
            ConversationError::DbError(e) => AppError::from(e),
        }
    }
}

impl From<RetrievalError> for AppError {
    fn from(e: RetrievalError) -> Self {
        match e {
            RetrievalError::Validation(msg) => AppError::Validation(msg),
            RetrievalError::Upstream(_) => AppError::Upstream {
                message: "Failed to retrieve context".into(),
                detail: e.to_string(),
            },
            RetrievalError::Timeout(_) => AppError::Timeout(e.to_string()),
        }
    }
}

impl From<CodegenError> for AppError {
    fn from(e: CodegenError) -> Self {
        match e {
            CodegenError::Timeout { .. } => AppError::Timeout(e.to_string()),
            CodegenError::Config(_) => AppError::Upstream {
                message: "Code generation provider is not configured".into(),
                detail: e.to_string(),
            },
            _ => AppError::Upstream {
                message: "Failed to generate code".into(),
                detail: e.to_string(),
            },
        }
    }
}

impl From<TelemetryError> for AppError {
    fn from(e: TelemetryError) -> Self {
        match e {
            TelemetryError::DbError(e) => AppError::from(e),
            TelemetryError::NotFound(_) => AppError::NotFound(e.to_string()),
            TelemetryError::Validation(msg) => AppError::Validation(msg),
        }
    }
}

impl From<ChatError> for AppError {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::Validation(msg) => AppError::Validation(msg),
            ChatError::ConversationNotFound(_) => AppError::NotFound(e.to_string()),
            ChatError::Conversation(e) => AppError::from(e),
            ChatError::Retrieval(e) => AppError::from(e),
            ChatError::Generation(e) => AppError::from(e),
            ChatError::NotPersisted { outcome, .. } => AppError::NotPersisted {
                message: "Response generated but conversation was not saved".into(),
                response: Box::new(ChatResponse::from(outcome.as_ref())),
            },
            ChatError::Cancelled => AppError::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use stacks_core::codegen::ProviderKind;

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn upstream_detail_stays_server_side() {
        let err = AppError::from(RetrievalError::Upstream("Traceback: chromadb exploded".into()));
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let detail = resp.extensions().get::<ErrorDetail>().cloned().unwrap();
        assert!(detail.0.contains("chromadb exploded"));

        let json = body_json(resp).await;
        assert_eq!(json["error"], "upstream_error");
        assert_eq!(json["message"], "Failed to retrieve context");
    }

    #[tokio::test]
    async fn timeouts_map_to_gateway_timeout() {
        let resp = AppError::from(RetrievalError::Timeout(Duration::from_secs(60))).into_response();
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
        let resp = AppError::from(CodegenError::Timeout {
            provider: ProviderKind::Claude,
        })
        .into_response();
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn credential_failures_are_unauthorized() {
        for e in [AuthError::InvalidCredentials, AuthError::ApiKeyRevoked] {
            let resp = AppError::from(e).into_response();
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(body_json(resp).await["error"], "unauthorized");
        }
    }

    #[tokio::test]
    async fn internal_message_is_hidden() {
        let resp = AppError::Internal("pool exhausted".into()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(resp).await["message"], "Internal server error");
    }

    #[test]
    fn missing_conversation_is_not_found() {
        let err = AppError::from(ChatError::ConversationNotFound(9));
        assert!(matches!(err, AppError::NotFound(m) if m == "Conversation 9 not found"));
    }
}
