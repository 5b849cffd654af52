//! API key management.
//!
//! Keys are `mk_` followed by 32 alphanumerics. Only the SHA-256 hash and an
//! 8-char display prefix are stored; the plaintext is returned once at
//! creation.

use chrono::{DateTime, Utc};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tracing::{debug, warn};

use super::AuthError;
use crate::models::auth::{ApiKeyInfo, ApiKeyPrincipal, CreatedApiKey};

/// Prefix carried by every API key.
pub const API_KEY_PREFIX: &str = "mk_";

/// Number of random characters after the prefix.
const API_KEY_RANDOM_LEN: usize = 32;

/// Length of the stored display prefix.
const DISPLAY_PREFIX_LEN: usize = 8;

/// Attempts before giving up on a colliding hash.
const MAX_GENERATE_ATTEMPTS: usize = 10;

fn generate_key() -> String {
    let random: String = rng()
        .sample_iter(&Alphanumeric)
        .take(API_KEY_RANDOM_LEN)
        .map(char::from)
        .collect();
    format!("{API_KEY_PREFIX}{random}")
}

/// SHA-256 hash a key for storage.
pub fn hash_api_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn display_prefix(key: &str) -> String {
    key.chars().take(DISPLAY_PREFIX_LEN).collect()
}

fn default_key_name(now: DateTime<Utc>) -> String {
    format!("API Key {}", now.format("%Y-%m-%d %H:%M"))
}

/// Create a new API key for a user.
///
/// A blank `name` falls back to `"API Key YYYY-MM-DD HH:MM"`.
pub async fn generate_api_key(
    pool: &SqlitePool,
    user_id: i64,
    name: Option<&str>,
) -> Result<CreatedApiKey, AuthError> {
    let now = Utc::now();
    let name = match name.map(str::trim) {
        Some(n) if !n.is_empty() => n.to_string(),
        _ => default_key_name(now),
    };

    for attempt in 1..=MAX_GENERATE_ATTEMPTS {
        let key = generate_key();
        let key_hash = hash_api_key(&key);
        let prefix = display_prefix(&key);

        let result = sqlx::query_scalar::<_, i64>(
            "INSERT INTO api_keys (user_id, api_key_hash, api_key_prefix, name, created_at, is_active) \
             VALUES (?, ?, ?, ?, ?, 1) RETURNING id",
        )
        .bind(user_id)
        .bind(&key_hash)
        .bind(&prefix)
        .bind(&name)
        .bind(now)
        .fetch_one(pool)
        .await;

        match result {
            Ok(id) => {
                return Ok(CreatedApiKey {
                    id,
                    api_key: key,
                    name,
                    prefix,
                    created_at: now,
                });
            }
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                debug!(attempt, "API key hash collision, regenerating");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(AuthError::Internal(format!(
        "failed to generate a unique API key after {MAX_GENERATE_ATTEMPTS} attempts"
    )))
}

/// Validate a plaintext API key and resolve its owner.
///
/// Records `last_used_at` in a background task; the caller never waits on it.
pub async fn validate_api_key(pool: &SqlitePool, key: &str) -> Result<ApiKeyPrincipal, AuthError> {
    let key_hash = hash_api_key(key);

    let row = sqlx::query_as::<_, (i64, i64, bool, Option<DateTime<Utc>>, bool)>(
        "SELECT k.id, k.user_id, k.is_active, k.expires_at, u.is_active \
         FROM api_keys k JOIN users u ON u.id = k.user_id \
         WHERE k.api_key_hash = ?",
    )
    .bind(&key_hash)
    .fetch_optional(pool)
    .await?;

    let Some((api_key_id, user_id, key_active, expires_at, user_active)) = row else {
        return Err(AuthError::InvalidApiKey);
    };

    if !key_active {
        return Err(AuthError::ApiKeyRevoked);
    }
    if !user_active {
        return Err(AuthError::InvalidApiKey);
    }
    if expires_at.is_some_and(|at| at <= Utc::now()) {
        return Err(AuthError::ApiKeyExpired);
    }

    let pool = pool.clone();
    tokio::spawn(async move {
        if let Err(e) = sqlx::query("UPDATE api_keys SET last_used_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(api_key_id)
            .execute(&pool)
            .await
        {
            warn!(api_key_id, error = %e, "Failed to record API key usage");
        }
    });

    Ok(ApiKeyPrincipal {
        user_id,
        api_key_id,
    })
}

/// Revoke one of the user's API keys. Revoking twice is not an error.
pub async fn revoke_api_key(pool: &SqlitePool, user_id: i64, key_id: i64) -> Result<(), AuthError> {
    let result = sqlx::query("UPDATE api_keys SET is_active = 0 WHERE id = ? AND user_id = ?")
        .bind(key_id)
        .bind(user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AuthError::NotFound(format!("API key {key_id}")));
    }
    Ok(())
}

/// List a user's API keys, newest first. Never exposes hashes.
pub async fn list_api_keys(pool: &SqlitePool, user_id: i64) -> Result<Vec<ApiKeyInfo>, AuthError> {
    let keys = sqlx::query_as::<_, ApiKeyInfo>(
        "SELECT id, name, api_key_prefix AS prefix, created_at, last_used_at, expires_at, is_active \
         FROM api_keys WHERE user_id = ? ORDER BY created_at DESC, id DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(keys)
}
