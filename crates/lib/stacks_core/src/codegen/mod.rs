//! Code generation providers.
//!
//! Every provider receives the same instruction prompt (see [`prompt`]) and
//! returns code plus explanation split out of its reply (see [`response`]).
//!
//! # Providers
//!
//! - `"gemini"`: Google Generative Language API (default)
//! - `"openai"`: OpenAI chat completions
//! - `"claude"`: Anthropic messages
//!
//! Instances are memoized per kind by [`registry::ProviderRegistry`].

pub mod claude;
pub mod config;
pub mod gemini;
pub mod openai;
pub mod prompt;
pub mod registry;
pub mod response;

use std::fmt;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

pub use registry::{ProviderFactory, ProviderRegistry, SettingsFactory};

/// Which upstream service produces code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gemini,
    OpenAi,
    Claude,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [ProviderKind::Gemini, ProviderKind::OpenAi, ProviderKind::Claude];

    /// Parse a provider name. Unknown or blank names select Gemini.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "openai" => ProviderKind::OpenAi,
            "claude" => ProviderKind::Claude,
            _ => ProviderKind::Gemini,
        }
    }

    /// Strict parse for operator input.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "gemini" => Some(ProviderKind::Gemini),
            "openai" => Some(ProviderKind::OpenAi),
            "claude" => Some(ProviderKind::Claude),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Claude => "claude",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Code generation errors.
#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("{provider} API returned status {status}")]
    Upstream {
        provider: ProviderKind,
        status: u16,
        body: String,
    },

    #[error("{provider} returned an unusable response: {message}")]
    MalformedResponse {
        provider: ProviderKind,
        message: String,
    },

    #[error("{provider} request failed: {message}")]
    Transport {
        provider: ProviderKind,
        message: String,
    },

    #[error("{provider} request timed out")]
    Timeout { provider: ProviderKind },

    #[error("Config error: {0}")]
    Config(String),
}

/// Input to a provider.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub query: String,
    pub code_contexts: Vec<String>,
    pub doc_contexts: Vec<String>,
    /// `0.0` means the provider default.
    pub temperature: f64,
    /// `0` means the provider default.
    pub max_tokens: u32,
}

impl GenerationRequest {
    /// The instruction prompt every provider sends.
    pub fn instruction(&self) -> String {
        prompt::build_instruction(&self.query, &self.code_contexts, &self.doc_contexts)
    }
}

/// Token counts reported by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
}

/// Output of a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub code: String,
    pub explanation: String,
    #[serde(skip)]
    pub usage: Option<TokenUsage>,
}

impl GenerationResult {
    /// Split a raw reply into code and explanation.
    pub fn from_reply(text: &str, usage: Option<TokenUsage>) -> Self {
        let (code, explanation) = response::split_response(text, "clarity");
        Self {
            code,
            explanation,
            usage,
        }
    }
}

/// A code generation backend.
#[async_trait]
pub trait CodegenProvider: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, CodegenError>;

    fn kind(&self) -> ProviderKind;
}

/// A token count, labelled by where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "source", content = "value", rename_all = "lowercase")]
pub enum TokenCount {
    Reported(i64),
    Estimated(i64),
}

impl TokenCount {
    pub fn value(&self) -> i64 {
        match self {
            TokenCount::Reported(n) | TokenCount::Estimated(n) => *n,
        }
    }

    pub fn is_estimated(&self) -> bool {
        matches!(self, TokenCount::Estimated(_))
    }
}

/// Rough token estimate: one token per four characters.
pub fn estimate_tokens(text: &str) -> i64 {
    (text.chars().count() / 4) as i64
}

/// Input and output token counts, preferring what the provider reported.
pub fn token_counts(
    prompt: &str,
    output: &str,
    usage: Option<TokenUsage>,
) -> (TokenCount, TokenCount) {
    match usage {
        Some(u) => (
            TokenCount::Reported(u.input_tokens),
            TokenCount::Reported(u.output_tokens),
        ),
        None => (
            TokenCount::Estimated(estimate_tokens(prompt)),
            TokenCount::Estimated(estimate_tokens(output)),
        ),
    }
}

fn send_error(provider: ProviderKind, e: reqwest::Error) -> CodegenError {
    if e.is_timeout() {
        CodegenError::Timeout { provider }
    } else {
        CodegenError::Transport {
            provider,
            message: e.without_url().to_string(),
        }
    }
}

pub(crate) fn http_client(timeout: std::time::Duration) -> Result<reqwest::Client, CodegenError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| CodegenError::Config(format!("HTTP client: {e}")))
}

/// Send a prepared request and decode a JSON reply.
pub(crate) async fn send_json<T: DeserializeOwned>(
    provider: ProviderKind,
    request: reqwest::RequestBuilder,
) -> Result<T, CodegenError> {
    let resp = request.send().await.map_err(|e| send_error(provider, e))?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        warn!(%provider, status, body = %body, "Provider returned an error status");
        return Err(CodegenError::Upstream {
            provider,
            status,
            body,
        });
    }

    let bytes = resp.bytes().await.map_err(|e| send_error(provider, e))?;
    serde_json::from_slice(&bytes).map_err(|e| CodegenError::MalformedResponse {
        provider,
        message: format!("response parse error: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_parse_falls_back_to_gemini() {
        assert_eq!(ProviderKind::parse(" OpenAI "), ProviderKind::OpenAi);
        assert_eq!(ProviderKind::parse("claude"), ProviderKind::Claude);
        assert_eq!(ProviderKind::parse("gemini"), ProviderKind::Gemini);
        assert_eq!(ProviderKind::parse(""), ProviderKind::Gemini);
        assert_eq!(ProviderKind::parse("llama"), ProviderKind::Gemini);
        assert_eq!(ProviderKind::from_name("llama"), None);
    }

    #[test]
    fn token_counts_prefer_reported_usage() {
        let (input, output) = token_counts(
            "abcdefgh",
            "abcd",
            Some(TokenUsage {
                input_tokens: 40,
                output_tokens: 7,
            }),
        );
        assert_eq!(input, TokenCount::Reported(40));
        assert_eq!(output, TokenCount::Reported(7));

        let (input, output) = token_counts("abcdefgh", "abc", None);
        assert_eq!(input, TokenCount::Estimated(2));
        assert_eq!(output, TokenCount::Estimated(0));
        assert!(input.is_estimated());
    }
}
