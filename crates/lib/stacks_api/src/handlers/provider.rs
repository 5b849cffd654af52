//! Runtime codegen provider selection.

use axum::extract::State;

use stacks_core::codegen::{CodegenError, ProviderKind};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::extract::Json;
use crate::models::{ProviderResponse, SelectProviderRequest};

fn current(state: &AppState) -> ProviderResponse {
    ProviderResponse {
        provider: state.providers.selected(),
        available: ProviderKind::ALL.to_vec(),
    }
}

/// `GET /api/v1/admin/provider`
pub async fn get_provider_handler(State(state): State<AppState>) -> Json<ProviderResponse> {
    Json(current(&state))
}

/// `PUT /api/v1/admin/provider`: switch the provider for subsequent requests.
///
/// The provider is built before switching so a missing API key is reported
/// here instead of on the next chat.
pub async fn select_provider_handler(
    State(state): State<AppState>,
    Json(body): Json<SelectProviderRequest>,
) -> AppResult<Json<ProviderResponse>> {
    let kind = ProviderKind::from_name(&body.provider).ok_or_else(|| {
        AppError::Validation(format!(
            "Unknown provider '{}'; expected gemini, openai or claude",
            body.provider
        ))
    })?;
    state.providers.get(kind).await.map_err(|e| match e {
        CodegenError::Config(msg) => AppError::Validation(msg),
        other => AppError::from(other),
    })?;
    state.providers.select(kind);
    Ok(Json(current(&state)))
}
