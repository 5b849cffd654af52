//! Conversation persistence.
//!
//! A conversation is an ordered list of turns stored as a JSON array in a
//! single column. Conversations are created lazily on first save and updated
//! with last-write-wins semantics.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::error;

/// Conversation store errors.
#[derive(Debug, Error)]
pub enum ConversationError {
    /// Missing, or owned by someone else.
    #[error("Conversation {0} not found")]
    NotFound(i64),

    #[error("Stored conversation history is corrupt: {0}")]
    DataCorruption(String),

    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),
}

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    fn label(&self) -> &'static str {
        match self {
            TurnRole::User => "User",
            TurnRole::Assistant => "Assistant",
        }
    }
}

impl fmt::Display for TurnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        })
    }
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }
}

/// A multi-turn conversation owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// `None` until the first save.
    pub id: Option<i64>,
    pub user_id: i64,
    pub history: Vec<Turn>,
    /// The message currently being processed, if any.
    pub new_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// A fresh, unsaved conversation.
    pub fn new(user_id: i64) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            user_id,
            history: Vec::new(),
            new_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn push(&mut self, turn: Turn) {
        self.history.push(turn);
    }

    /// Render prior turns as prompt context. Empty when there is no history.
    pub fn history_prompt(&self) -> String {
        if self.history.is_empty() {
            return String::new();
        }
        let mut out = String::from("Previous conversation:\n");
        for turn in &self.history {
            out.push_str(turn.role.label());
            out.push_str(": ");
            out.push_str(&turn.content);
            out.push('\n');
        }
        out.push('\n');
        out
    }
}

/// Encode turns as a JSON array.
pub fn serialize_history(history: &[Turn]) -> Result<String, ConversationError> {
    serde_json::to_string(history)
        .map_err(|e| ConversationError::DataCorruption(format!("encode history: {e}")))
}

/// Decode a stored JSON array. Blank input yields an empty history.
pub fn deserialize_history(raw: &str) -> Result<Vec<Turn>, ConversationError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw).map_err(|e| ConversationError::DataCorruption(e.to_string()))
}

/// Load a conversation owned by `user_id`.
pub async fn get(
    pool: &SqlitePool,
    conversation_id: i64,
    user_id: i64,
) -> Result<Conversation, ConversationError> {
    let row = sqlx::query_as::<
        _,
        (
            i64,
            i64,
            String,
            Option<String>,
            DateTime<Utc>,
            DateTime<Utc>,
        ),
    >(
        "SELECT id, user_id, history, new_message, created_at, updated_at \
         FROM conversations WHERE id = ? AND user_id = ?",
    )
    .bind(conversation_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    let Some((id, user_id, history, new_message, created_at, updated_at)) = row else {
        return Err(ConversationError::NotFound(conversation_id));
    };

    let history = deserialize_history(&history).inspect_err(|e| {
        error!(conversation_id = id, error = %e, "Conversation history failed to decode");
    })?;

    Ok(Conversation {
        id: Some(id),
        user_id,
        history,
        new_message,
        created_at,
        updated_at,
    })
}

/// Insert or update a conversation.
///
/// Assigns `id` and timestamps on first save. Concurrent saves of the same
/// conversation overwrite each other.
pub async fn save(pool: &SqlitePool, conversation: &mut Conversation) -> Result<(), ConversationError> {
    let history = serialize_history(&conversation.history)?;
    let now = Utc::now();

    match conversation.id {
        None => {
            let id = sqlx::query_scalar::<_, i64>(
                "INSERT INTO conversations (user_id, history, new_message, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?) RETURNING id",
            )
            .bind(conversation.user_id)
            .bind(&history)
            .bind(conversation.new_message.as_deref())
            .bind(now)
            .bind(now)
            .fetch_one(pool)
            .await?;

            conversation.id = Some(id);
            conversation.created_at = now;
            conversation.updated_at = now;
        }
        Some(id) => {
            let result = sqlx::query(
                "UPDATE conversations SET history = ?, new_message = ?, updated_at = ? \
                 WHERE id = ? AND user_id = ?",
            )
            .bind(&history)
            .bind(conversation.new_message.as_deref())
            .bind(now)
            .bind(id)
            .bind(conversation.user_id)
            .execute(pool)
            .await?;

            if result.rows_affected() == 0 {
                return Err(ConversationError::NotFound(id));
            }
            conversation.updated_at = now;
        }
    }
    Ok(())
}
