//! # stacks_core
//!
//! Core domain logic for Stacks Builder.

pub mod auth;
pub mod codegen;
pub mod conversations;
pub mod db;
pub mod migrate;
pub mod models;
pub mod orchestrator;
pub mod retrieval;
pub mod telemetry;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
