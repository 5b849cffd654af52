//! Request handlers.

pub mod api_keys;
pub mod auth;
pub mod chat;
pub mod completions;
pub mod conversations;
pub mod health;
pub mod provider;
pub mod query_logs;
pub mod rag;
