//! Google Gemini `generateContent` provider.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::config::GeminiSettings;
use super::{
    CodegenError, CodegenProvider, GenerationRequest, GenerationResult, ProviderKind, TokenUsage,
    send_json,
};

const DEFAULT_TEMPERATURE: f64 = 0.7;
const DEFAULT_MAX_TOKENS: u32 = 2000;
const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    max_output_tokens: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: i64,
    #[serde(default)]
    candidates_token_count: i64,
}

pub struct GeminiProvider {
    client: Client,
    api_key: String,
    settings: GeminiSettings,
}

impl GeminiProvider {
    pub fn new(settings: GeminiSettings, timeout: std::time::Duration) -> Result<Self, CodegenError> {
        let api_key = settings.api_key.clone().ok_or_else(|| {
            CodegenError::Config("GEMINI_API_KEY environment variable not set".to_string())
        })?;
        Ok(Self {
            client: super::http_client(timeout)?,
            api_key,
            settings,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}:generateContent",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.model
        )
    }
}

#[async_trait]
impl CodegenProvider for GeminiProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, CodegenError> {
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: request.instruction(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: if request.temperature == 0.0 {
                    DEFAULT_TEMPERATURE
                } else {
                    request.temperature
                },
                max_output_tokens: if request.max_tokens == 0 {
                    DEFAULT_MAX_TOKENS
                } else {
                    request.max_tokens
                },
            },
        };

        let resp: GenerateResponse = send_json(
            ProviderKind::Gemini,
            self.client
                .post(self.endpoint())
                .header(API_KEY_HEADER, self.api_key.as_str())
                .json(&body),
        )
        .await?;

        let text = resp
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| CodegenError::MalformedResponse {
                provider: ProviderKind::Gemini,
                message: "no content in response".to_string(),
            })?;

        let usage = resp.usage_metadata.map(|u| TokenUsage {
            input_tokens: u.prompt_token_count,
            output_tokens: u.candidates_token_count,
        });

        Ok(GenerationResult::from_reply(&text, usage))
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use axum::extract::Query;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};

    use super::*;
    use crate::codegen::config::CodegenSettings;
    use crate::codegen::test_support::serve;

    #[tokio::test]
    async fn posts_to_model_endpoint_with_key() {
        let app = Router::new().route(
            "/models/{action}",
            post(
                |axum::extract::Path(action): axum::extract::Path<String>,
                 headers: axum::http::HeaderMap,
                 Query(params): Query<HashMap<String, String>>,
                 Json(body): Json<Value>| async move {
                    assert_eq!(action, "gemini-2.0-flash-exp:generateContent");
                    assert_eq!(headers.get("x-goog-api-key").unwrap(), "g-key");
                    assert!(!params.contains_key("key"));
                    assert_eq!(body["generationConfig"]["maxOutputTokens"], 2000);
                    assert_eq!(body["generationConfig"]["temperature"], 0.2);
                    Json(json!({
                        "candidates": [{"content": {"parts": [{"text": "```clarity\n(ok true)\n```\nAlways ok."}]}}],
                        "usageMetadata": {"promptTokenCount": 50, "candidatesTokenCount": 8}
                    }))
                },
            ),
        );
        let base = serve(app).await;

        let mut settings = CodegenSettings::default().gemini;
        settings.api_key = Some("g-key".into());
        settings.base_url = format!("{base}/models");
        let provider = GeminiProvider::new(settings, Duration::from_secs(5)).unwrap();

        let result = provider
            .generate(&GenerationRequest {
                query: "always ok".into(),
                temperature: 0.2,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(result.code, "(ok true)");
        assert_eq!(result.explanation, "Always ok.");
        assert_eq!(
            result.usage,
            Some(TokenUsage {
                input_tokens: 50,
                output_tokens: 8
            })
        );
    }

    #[tokio::test]
    async fn missing_usage_leaves_usage_empty() {
        let app = Router::new().route(
            "/models/{action}",
            post(|| async {
                Json(json!({"candidates": [{"content": {"parts": [{"text": "prose only"}]}}]}))
            }),
        );
        let base = serve(app).await;

        let mut settings = CodegenSettings::default().gemini;
        settings.api_key = Some("g-key".into());
        settings.base_url = format!("{base}/models/");
        let provider = GeminiProvider::new(settings, Duration::from_secs(5)).unwrap();

        let result = provider
            .generate(&GenerationRequest::default())
            .await
            .unwrap();
        assert_eq!(result.code, "");
        assert_eq!(result.explanation, "prose only");
        assert!(result.usage.is_none());
    }

    #[tokio::test]
    async fn slow_upstream_times_out() {
        let app = Router::new().route(
            "/models/{action}",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({}))
            }),
        );
        let base = serve(app).await;

        let mut settings = CodegenSettings::default().gemini;
        settings.api_key = Some("g-key".into());
        settings.base_url = format!("{base}/models");
        let provider = GeminiProvider::new(settings, Duration::from_millis(200)).unwrap();

        let err = provider
            .generate(&GenerationRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CodegenError::Timeout {
                provider: ProviderKind::Gemini
            }
        ));
    }

    #[tokio::test]
    async fn transport_errors_do_not_carry_the_key() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut settings = CodegenSettings::default().gemini;
        settings.api_key = Some("never-log-this-key".into());
        settings.base_url = format!("http://{addr}/models");
        let provider = GeminiProvider::new(settings, Duration::from_secs(5)).unwrap();

        let err = provider
            .generate(&GenerationRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CodegenError::Transport { .. }), "{err:?}");
        assert!(!format!("{err} {err:?}").contains("never-log-this-key"));
        assert!(!err.to_string().contains(&addr.to_string()));
    }
}
