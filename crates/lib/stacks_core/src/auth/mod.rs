//! Authentication and credential management.
//!
//! Provides password hashing, user accounts and API key lifecycle. Shared by
//! the HTTP middleware in `stacks_api`.

pub mod api_keys;
pub mod password;
pub mod queries;

use thiserror::Error;

/// Minimum username length.
pub const MIN_USERNAME_LEN: usize = 3;

/// Maximum username length.
pub const MAX_USERNAME_LEN: usize = 50;

/// Minimum password length.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown user, inactive user and wrong password all collapse into this.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("API key has been revoked")]
    ApiKeyRevoked,

    #[error("API key has expired")]
    ApiKeyExpired,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
