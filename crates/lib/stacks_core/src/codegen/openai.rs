//! OpenAI chat completions provider.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::config::OpenAiSettings;
use super::{
    CodegenError, CodegenProvider, GenerationRequest, GenerationResult, ProviderKind, TokenUsage,
    send_json,
};

const DEFAULT_TEMPERATURE: f64 = 0.7;
const DEFAULT_MAX_TOKENS: u32 = 512;

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: i64,
    completion_tokens: i64,
}

pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    settings: OpenAiSettings,
}

impl OpenAiProvider {
    pub fn new(settings: OpenAiSettings, timeout: std::time::Duration) -> Result<Self, CodegenError> {
        let api_key = settings.api_key.clone().ok_or_else(|| {
            CodegenError::Config("OPENAI_API_KEY environment variable not set".to_string())
        })?;
        Ok(Self {
            client: super::http_client(timeout)?,
            api_key,
            settings,
        })
    }
}

#[async_trait]
impl CodegenProvider for OpenAiProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, CodegenError> {
        let prompt = request.instruction();
        let temperature = if request.temperature == 0.0 {
            DEFAULT_TEMPERATURE
        } else {
            request.temperature
        };
        let max_tokens = if request.max_tokens == 0 {
            DEFAULT_MAX_TOKENS
        } else {
            request.max_tokens
        };

        let body = ChatRequest {
            model: &self.settings.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &self.settings.system_message,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature,
            max_tokens,
        };

        let resp: ChatResponse = send_json(
            ProviderKind::OpenAi,
            self.client
                .post(&self.settings.base_url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body),
        )
        .await?;

        let text = resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| CodegenError::MalformedResponse {
                provider: ProviderKind::OpenAi,
                message: "response contained no choices".to_string(),
            })?;

        let usage = resp.usage.map(|u| TokenUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        });

        Ok(GenerationResult::from_reply(&text, usage))
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};

    use super::*;
    use crate::codegen::config::CodegenSettings;
    use crate::codegen::test_support::serve;

    fn settings(base_url: String) -> OpenAiSettings {
        let mut s = CodegenSettings::default().openai;
        s.api_key = Some("sk-test".into());
        s.base_url = base_url;
        s
    }

    #[tokio::test]
    async fn sends_bearer_auth_and_splits_reply() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(headers["authorization"], "Bearer sk-test");
                assert_eq!(body["model"], "gpt-3.5-turbo");
                assert_eq!(body["max_tokens"], 512);
                assert_eq!(body["messages"][0]["role"], "system");
                assert!(
                    body["messages"][1]["content"]
                        .as_str()
                        .unwrap()
                        .contains("## User Question:\ncounter")
                );
                Json(json!({
                    "choices": [{"index": 0, "message": {"role": "assistant", "content": "```clarity\n(ok u1)\n```\nReturns one."}}],
                    "usage": {"prompt_tokens": 120, "completion_tokens": 30}
                }))
            }),
        );
        let base = serve(app).await;
        let provider =
            OpenAiProvider::new(settings(format!("{base}/v1/chat/completions")), Duration::from_secs(5))
                .unwrap();

        let result = provider
            .generate(&GenerationRequest {
                query: "counter".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(result.code, "(ok u1)");
        assert_eq!(result.explanation, "Returns one.");
        assert_eq!(
            result.usage,
            Some(TokenUsage {
                input_tokens: 120,
                output_tokens: 30
            })
        );
    }

    #[tokio::test]
    async fn non_success_status_is_upstream() {
        let app = Router::new().route(
            "/",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "rate limited") }),
        );
        let base = serve(app).await;
        let provider = OpenAiProvider::new(settings(format!("{base}/")), Duration::from_secs(5)).unwrap();

        let err = provider
            .generate(&GenerationRequest::default())
            .await
            .unwrap_err();
        match err {
            CodegenError::Upstream { provider, status, body } => {
                assert_eq!(provider, ProviderKind::OpenAi);
                assert_eq!(status, 429);
                assert_eq!(body, "rate limited");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_choices_is_malformed() {
        let app = Router::new().route("/", post(|| async { Json(json!({"choices": []})) }));
        let base = serve(app).await;
        let provider = OpenAiProvider::new(settings(format!("{base}/")), Duration::from_secs(5)).unwrap();

        let err = provider
            .generate(&GenerationRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CodegenError::MalformedResponse { .. }));
    }

    #[test]
    fn missing_key_is_config_error() {
        let s = CodegenSettings::default().openai;
        assert!(matches!(
            OpenAiProvider::new(s, Duration::from_secs(1)),
            Err(CodegenError::Config(_))
        ));
    }
}
