//! Retrieval bridge.
//!
//! Turns a text query into ranked code and documentation snippets from an
//! external vector store. The store is reached through the [`Retriever`]
//! trait; the production implementation talks to a helper process over
//! stdin/stdout ([`subprocess::SubprocessRetriever`]).

pub mod service;
pub mod subprocess;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use service::RetrievalService;
pub use subprocess::SubprocessRetriever;

/// Default number of results when the caller passes zero.
pub const DEFAULT_N_RESULTS: i64 = 5;

/// Largest accepted `n_results`.
pub const MAX_N_RESULTS: i64 = 20;

/// Retrieval errors.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Validation error: {0}")]
    Validation(String),

    /// The retriever failed, exited non-zero or produced unusable output.
    #[error("Retriever failed: {0}")]
    Upstream(String),

    #[error("Retriever timed out after {0:?}")]
    Timeout(Duration),
}

/// Result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// One request sent to the retriever.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalRequest {
    pub query: String,
    pub n_results: u32,
    pub docs_results: u32,
}

/// Ranked snippets. Distances are parallel to their context lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    #[serde(default)]
    pub code_contexts: Vec<String>,
    #[serde(default)]
    pub code_distances: Vec<f64>,
    #[serde(default)]
    pub docs_contexts: Vec<String>,
    #[serde(default)]
    pub docs_distances: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl RetrievalResult {
    /// Total number of snippets across both collections.
    pub fn context_count(&self) -> usize {
        self.code_contexts.len() + self.docs_contexts.len()
    }

    /// Render snippets as markdown sections for display.
    pub fn format_context(&self) -> String {
        let mut out = String::new();
        if !self.code_contexts.is_empty() {
            out.push_str("## Code Contexts:\n\n");
            for (i, ctx) in self.code_contexts.iter().enumerate() {
                out.push_str(&format!(
                    "### Code Context {}:\n```clarity\n{}\n```\n\n",
                    i + 1,
                    ctx
                ));
            }
        }
        if !self.docs_contexts.is_empty() {
            out.push_str("## Documentation Contexts:\n\n");
            for (i, doc) in self.docs_contexts.iter().enumerate() {
                out.push_str(&format!(
                    "### Documentation Context {}:\n```text\n{}\n```\n\n",
                    i + 1,
                    doc
                ));
            }
        }
        out
    }
}

/// A source of grounding context.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, request: &RetrievalRequest) -> Result<RetrievalResult>;

    /// Verify the backend is reachable and answering.
    async fn health_check(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_context_numbers_sections() {
        let result = RetrievalResult {
            code_contexts: vec!["(define-data-var n int 0)".into()],
            code_distances: vec![0.1],
            docs_contexts: vec!["Data vars hold state.".into(), "Maps too.".into()],
            docs_distances: vec![0.2, 0.3],
            warning: None,
        };
        let text = result.format_context();
        assert!(text.starts_with("## Code Contexts:\n\n### Code Context 1:\n```clarity\n"));
        assert!(text.contains("### Documentation Context 2:\n```text\nMaps too.\n```"));
        assert_eq!(result.context_count(), 3);
        assert_eq!(RetrievalResult::default().format_context(), "");
    }
}
