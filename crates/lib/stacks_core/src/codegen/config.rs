//! Provider configuration from environment variables.

use std::env;
use std::time::Duration;

use super::ProviderKind;

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_OPENAI_SYSTEM_MESSAGE: &str = "You are a Clarity expert.";

pub const DEFAULT_CLAUDE_MODEL: &str = "claude-3-opus-20240229";
pub const DEFAULT_CLAUDE_URL: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_CLAUDE_API_VERSION: &str = "2023-06-01";
pub const DEFAULT_CLAUDE_SYSTEM_MESSAGE: &str = "You are an expert Clarity programmer.";

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash-exp";
pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// HTTP timeout for provider calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub system_message: String,
}

#[derive(Debug, Clone)]
pub struct ClaudeSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub api_version: String,
    pub system_message: String,
}

#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub api_key: Option<String>,
    pub model: String,
    /// Models collection URL; `/{model}:generateContent` is appended.
    pub base_url: String,
}

/// Settings for every provider plus the initially selected one.
#[derive(Debug, Clone)]
pub struct CodegenSettings {
    pub provider: ProviderKind,
    pub openai: OpenAiSettings,
    pub claude: ClaudeSettings,
    pub gemini: GeminiSettings,
    pub request_timeout: Duration,
}

impl Default for CodegenSettings {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl CodegenSettings {
    /// Read settings from the process environment.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `CODEGEN_PROVIDER` | `gemini` |
    /// | `OPENAI_API_KEY` | none |
    /// | `OPENAI_MODEL` | `gpt-3.5-turbo` |
    /// | `OPENAI_BASE_URL` | chat completions endpoint |
    /// | `OPENAI_SYSTEM_MESSAGE` | `You are a Clarity expert.` |
    /// | `CLAUDE_API_KEY` | none |
    /// | `CLAUDE_MODEL` | `claude-3-opus-20240229` |
    /// | `CLAUDE_BASE_URL` | messages endpoint |
    /// | `CLAUDE_API_VERSION` | `2023-06-01` |
    /// | `CLAUDE_SYSTEM_MESSAGE` | `You are an expert Clarity programmer.` |
    /// | `GEMINI_API_KEY` | none |
    /// | `GEMINI_MODEL` | `gemini-2.0-flash-exp` |
    /// | `GEMINI_BASE_URL` | models collection URL |
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build settings from an arbitrary variable lookup. Blank values count
    /// as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let or = |name: &str, default: &str| get(name).unwrap_or_else(|| default.to_string());

        Self {
            provider: ProviderKind::parse(&get("CODEGEN_PROVIDER").unwrap_or_default()),
            openai: OpenAiSettings {
                api_key: get("OPENAI_API_KEY"),
                model: or("OPENAI_MODEL", DEFAULT_OPENAI_MODEL),
                base_url: or("OPENAI_BASE_URL", DEFAULT_OPENAI_URL),
                system_message: or("OPENAI_SYSTEM_MESSAGE", DEFAULT_OPENAI_SYSTEM_MESSAGE),
            },
            claude: ClaudeSettings {
                api_key: get("CLAUDE_API_KEY"),
                model: or("CLAUDE_MODEL", DEFAULT_CLAUDE_MODEL),
                base_url: or("CLAUDE_BASE_URL", DEFAULT_CLAUDE_URL),
                api_version: or("CLAUDE_API_VERSION", DEFAULT_CLAUDE_API_VERSION),
                system_message: or("CLAUDE_SYSTEM_MESSAGE", DEFAULT_CLAUDE_SYSTEM_MESSAGE),
            },
            gemini: GeminiSettings {
                api_key: get("GEMINI_API_KEY"),
                model: or("GEMINI_MODEL", DEFAULT_GEMINI_MODEL),
                base_url: or("GEMINI_BASE_URL", DEFAULT_GEMINI_URL),
            },
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}
