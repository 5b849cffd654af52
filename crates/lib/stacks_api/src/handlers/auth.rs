//! Account registration and login.

use axum::extract::State;
use axum::http::StatusCode;

use stacks_core::auth::queries;
use stacks_core::models::auth::Role;

use crate::AppState;
use crate::error::AppResult;
use crate::extract::Json;
use crate::models::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

/// `POST /api/v1/auth/register`: create a regular user account.
///
/// Admins are never created through this endpoint.
pub async fn register_handler(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<RegisterResponse>)> {
    let user_id = queries::create_user(
        &state.pool,
        &body.username,
        &body.password,
        body.email.as_deref(),
        Role::User,
    )
    .await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            success: true,
            message: "User created successfully".into(),
            user_id,
            role: Role::User.to_string(),
        }),
    ))
}

/// `POST /api/v1/auth/login`: check username and password.
pub async fn login_handler(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let user = queries::authenticate(&state.pool, &body.username, &body.password).await?;
    Ok(Json(LoginResponse {
        success: true,
        message: "Authentication successful".into(),
        user_id: user.id,
        username: user.username,
    }))
}
