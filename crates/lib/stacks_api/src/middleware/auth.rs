//! Authentication middleware.
//!
//! Service calls carry an `x-api-key` header; account management and
//! administration use HTTP Basic credentials.

use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::{HeaderMap, HeaderValue};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use stacks_core::auth::{api_keys, queries};
use stacks_core::models::auth::{ApiKeyPrincipal, Role, User};

use crate::AppState;
use crate::error::AppError;

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Identity resolved from `x-api-key`, stored in request extensions.
#[derive(Debug, Clone, Copy)]
pub struct ApiKeyUser(pub ApiKeyPrincipal);

/// Identity resolved from HTTP Basic credentials, stored in request extensions.
#[derive(Debug, Clone)]
pub struct BasicUser(pub User);

/// Axum middleware: validates `x-api-key` and injects `ApiKeyUser`.
pub async fn require_api_key(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| AppError::Unauthorized("API key required".into()))?;

    let principal = api_keys::validate_api_key(&state.pool, &key).await?;
    request.extensions_mut().insert(ApiKeyUser(principal));

    Ok(next.run(request).await)
}

/// Axum middleware: verifies `Authorization: Basic ...` and injects `BasicUser`.
///
/// Failures answer 401 with a `WWW-Authenticate` challenge.
pub async fn require_basic_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let (username, password) = match basic_credentials(request.headers()) {
        Ok(creds) => creds,
        Err(e) => return challenge(e),
    };

    match queries::authenticate(&state.pool, &username, &password).await {
        Ok(user) => {
            request.extensions_mut().insert(BasicUser(user));
            next.run(request).await
        }
        Err(e) => challenge(e.into()),
    }
}

/// Axum middleware: rejects non-admin users. Must run after [`require_basic_auth`].
pub async fn require_admin(request: Request, next: Next) -> Result<Response, AppError> {
    let user = request
        .extensions()
        .get::<BasicUser>()
        .ok_or_else(|| AppError::Unauthorized("Authentication required".into()))?;
    if user.0.role != Role::Admin {
        return Err(AppError::Forbidden("Admin access required".into()));
    }
    Ok(next.run(request).await)
}

/// Decode `Authorization: Basic base64(username:password)`.
pub fn basic_credentials(headers: &HeaderMap) -> Result<(String, String), AppError> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Authorization header required".into()))?;

    let encoded = header
        .strip_prefix("Basic ")
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization header".into()))?;

    let decoded = STANDARD
        .decode(encoded.trim())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization header".into()))?;

    let (username, password) = decoded
        .split_once(':')
        .ok_or_else(|| AppError::Unauthorized("Invalid credentials format".into()))?;

    Ok((username.to_string(), password.to_string()))
}

fn challenge(error: AppError) -> Response {
    let mut resp = error.into_response();
    resp.headers_mut().insert(
        WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"Restricted\""),
    );
    resp
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        h
    }

    #[test]
    fn decodes_basic_credentials() {
        let encoded = STANDARD.encode("alice:pa:ss");
        let (user, pass) = basic_credentials(&headers(&format!("Basic {encoded}"))).unwrap();
        assert_eq!(user, "alice");
        assert_eq!(pass, "pa:ss");
    }

    #[test]
    fn rejects_malformed_headers() {
        assert!(basic_credentials(&HeaderMap::new()).is_err());
        assert!(basic_credentials(&headers("Bearer abc")).is_err());
        assert!(basic_credentials(&headers("Basic !!!")).is_err());
        let no_colon = STANDARD.encode("alice");
        assert!(basic_credentials(&headers(&format!("Basic {no_colon}"))).is_err());
    }
}
