//! Domain models shared between `stacks_core` and `stacks_api`.

pub mod auth;
pub mod query_log;
