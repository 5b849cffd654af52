//! User account queries.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::password::{hash_password, verify_password};
use super::{AuthError, MAX_USERNAME_LEN, MIN_PASSWORD_LEN, MIN_USERNAME_LEN};
use crate::models::auth::{Role, User};

type UserRow = (i64, String, Option<String>, bool, String, DateTime<Utc>);

fn user_from_row(row: UserRow) -> Result<User, AuthError> {
    let (id, username, email, is_active, role, created_at) = row;
    let role = role.parse::<Role>().map_err(AuthError::Internal)?;
    Ok(User {
        id,
        username,
        email,
        is_active,
        role,
        created_at,
    })
}

fn validate_new_user(username: &str, password: &str) -> Result<(), AuthError> {
    let len = username.chars().count();
    if len < MIN_USERNAME_LEN {
        return Err(AuthError::Validation(format!(
            "username must be at least {MIN_USERNAME_LEN} characters"
        )));
    }
    if len > MAX_USERNAME_LEN {
        return Err(AuthError::Validation(format!(
            "username must be at most {MAX_USERNAME_LEN} characters"
        )));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Check whether a username is already registered.
pub async fn username_exists(pool: &SqlitePool, username: &str) -> Result<bool, AuthError> {
    let exists =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE username = ?)")
            .bind(username)
            .fetch_one(pool)
            .await?;
    Ok(exists)
}

/// Create a new user, returning the user ID.
///
/// The username is trimmed before validation. A concurrent insert that wins
/// the race surfaces as `Conflict` through the UNIQUE constraint.
pub async fn create_user(
    pool: &SqlitePool,
    username: &str,
    password: &str,
    email: Option<&str>,
    role: Role,
) -> Result<i64, AuthError> {
    let username = username.trim();
    validate_new_user(username, password)?;

    if username_exists(pool, username).await? {
        return Err(AuthError::Conflict(format!(
            "username '{username}' is already taken"
        )));
    }

    let password_hash = hash_password(password)?;
    let email = email.map(str::trim).filter(|e| !e.is_empty());

    let result = sqlx::query_scalar::<_, i64>(
        "INSERT INTO users (username, password_hash, email, created_at, is_active, role) \
         VALUES (?, ?, ?, ?, 1, ?) RETURNING id",
    )
    .bind(username)
    .bind(&password_hash)
    .bind(email)
    .bind(Utc::now())
    .bind(role.as_str())
    .fetch_one(pool)
    .await;

    match result {
        Ok(id) => Ok(id),
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(AuthError::Conflict(
            format!("username '{username}' is already taken"),
        )),
        Err(e) => Err(e.into()),
    }
}

/// Verify a username/password pair and return the user.
///
/// Unknown users, inactive users and wrong passwords are indistinguishable.
pub async fn authenticate(
    pool: &SqlitePool,
    username: &str,
    password: &str,
) -> Result<User, AuthError> {
    let row = sqlx::query_as::<_, (i64, String, Option<String>, bool, String, DateTime<Utc>, String)>(
        "SELECT id, username, email, is_active, role, created_at, password_hash \
         FROM users WHERE username = ?",
    )
    .bind(username.trim())
    .fetch_optional(pool)
    .await?;

    let Some((id, username, email, is_active, role, created_at, password_hash)) = row else {
        return Err(AuthError::InvalidCredentials);
    };

    if !is_active || !verify_password(password, &password_hash)? {
        return Err(AuthError::InvalidCredentials);
    }

    user_from_row((id, username, email, is_active, role, created_at))
}

/// Fetch a user by ID.
pub async fn find_user_by_id(pool: &SqlitePool, user_id: i64) -> Result<Option<User>, AuthError> {
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id, username, email, is_active, role, created_at FROM users WHERE id = ?",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    row.map(user_from_row).transpose()
}

/// Activate or deactivate a user. Users are never deleted.
pub async fn set_user_active(
    pool: &SqlitePool,
    user_id: i64,
    is_active: bool,
) -> Result<(), AuthError> {
    let result = sqlx::query("UPDATE users SET is_active = ? WHERE id = ?")
        .bind(is_active)
        .bind(user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AuthError::NotFound(format!("user {user_id}")));
    }
    Ok(())
}
