//! Anthropic messages provider.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::config::ClaudeSettings;
use super::{
    CodegenError, CodegenProvider, GenerationRequest, GenerationResult, ProviderKind, TokenUsage,
    send_json,
};

const DEFAULT_TEMPERATURE: f64 = 0.7;
const DEFAULT_MAX_TOKENS: u32 = 512;

#[derive(Serialize)]
struct ContentPart<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    text: &'a str,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    system: &'a str,
    max_tokens: u32,
    temperature: f64,
    messages: Vec<Message<'a>>,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: i64,
    output_tokens: i64,
}

pub struct ClaudeProvider {
    client: Client,
    api_key: String,
    settings: ClaudeSettings,
}

impl ClaudeProvider {
    pub fn new(settings: ClaudeSettings, timeout: std::time::Duration) -> Result<Self, CodegenError> {
        let api_key = settings.api_key.clone().ok_or_else(|| {
            CodegenError::Config("CLAUDE_API_KEY environment variable not set".to_string())
        })?;
        Ok(Self {
            client: super::http_client(timeout)?,
            api_key,
            settings,
        })
    }
}

#[async_trait]
impl CodegenProvider for ClaudeProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, CodegenError> {
        let prompt = request.instruction();
        let body = MessagesRequest {
            model: &self.settings.model,
            system: &self.settings.system_message,
            max_tokens: if request.max_tokens == 0 {
                DEFAULT_MAX_TOKENS
            } else {
                request.max_tokens
            },
            temperature: if request.temperature == 0.0 {
                DEFAULT_TEMPERATURE
            } else {
                request.temperature
            },
            messages: vec![Message {
                role: "user",
                content: vec![ContentPart {
                    kind: "text",
                    text: &prompt,
                }],
            }],
        };

        let resp: MessagesResponse = send_json(
            ProviderKind::Claude,
            self.client
                .post(&self.settings.base_url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", &self.settings.api_version)
                .json(&body),
        )
        .await?;

        // Text may be split across several blocks, interleaved with other kinds.
        let text: String = resp
            .content
            .into_iter()
            .filter(|b| b.kind == "text")
            .map(|b| b.text)
            .collect();
        if text.trim().is_empty() {
            return Err(CodegenError::MalformedResponse {
                provider: ProviderKind::Claude,
                message: "response contained no content".to_string(),
            });
        }

        let usage = resp.usage.map(|u| TokenUsage {
            input_tokens: u.input_tokens,
            output_tokens: u.output_tokens,
        });

        Ok(GenerationResult::from_reply(&text, usage))
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Claude
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};

    use super::*;
    use crate::codegen::config::CodegenSettings;
    use crate::codegen::test_support::serve;

    #[tokio::test]
    async fn sends_version_header_and_reads_usage() {
        let app = Router::new().route(
            "/v1/messages",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(headers["x-api-key"], "sk-ant-test");
                assert_eq!(headers["anthropic-version"], "2023-06-01");
                assert_eq!(body["system"], "You are an expert Clarity programmer.");
                assert_eq!(body["max_tokens"], 256);
                assert_eq!(body["messages"][0]["content"][0]["type"], "text");
                Json(json!({
                    "content": [{"type": "text", "text": "Counter below.\n```clarity\n(define-data-var c uint u0)\n```"}],
                    "usage": {"input_tokens": 90, "output_tokens": 12}
                }))
            }),
        );
        let base = serve(app).await;

        let mut settings = CodegenSettings::default().claude;
        settings.api_key = Some("sk-ant-test".into());
        settings.base_url = format!("{base}/v1/messages");
        let provider = ClaudeProvider::new(settings, Duration::from_secs(5)).unwrap();

        let result = provider
            .generate(&GenerationRequest {
                query: "counter".into(),
                max_tokens: 256,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(result.code, "(define-data-var c uint u0)");
        assert_eq!(result.explanation, "Counter below.");
        assert_eq!(result.usage.map(|u| u.input_tokens), Some(90));
    }

    #[tokio::test]
    async fn missing_content_is_malformed() {
        let app = Router::new().route("/", post(|| async { Json(json!({"content": []})) }));
        let base = serve(app).await;

        let mut settings = CodegenSettings::default().claude;
        settings.api_key = Some("k".into());
        settings.base_url = format!("{base}/");
        let provider = ClaudeProvider::new(settings, Duration::from_secs(5)).unwrap();

        let err = provider
            .generate(&GenerationRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CodegenError::MalformedResponse {
                provider: ProviderKind::Claude,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn joins_text_blocks_and_skips_others() {
        let app = Router::new().route(
            "/",
            post(|| async {
                Json(json!({
                    "content": [
                        {"type": "thinking", "thinking": "plan the counter"},
                        {"type": "text", "text": "Counter below.\n```clarity\n(define-data-var c uint u0)"},
                        {"type": "text", "text": "\n```"}
                    ]
                }))
            }),
        );
        let base = serve(app).await;

        let mut settings = CodegenSettings::default().claude;
        settings.api_key = Some("k".into());
        settings.base_url = format!("{base}/");
        let provider = ClaudeProvider::new(settings, Duration::from_secs(5)).unwrap();

        let result = provider
            .generate(&GenerationRequest::default())
            .await
            .unwrap();
        assert_eq!(result.code, "(define-data-var c uint u0)");
        assert_eq!(result.explanation, "Counter below.");
        assert!(result.usage.is_none());
    }
}
