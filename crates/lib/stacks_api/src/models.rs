//! Request and response bodies.

use serde::{Deserialize, Serialize};

use stacks_core::codegen::{ProviderKind, TokenCount};
use stacks_core::conversations::Turn;
use stacks_core::orchestrator::{ChatOutcome, GenerateOutcome};
use stacks_core::retrieval::RetrievalResult;

/// Body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub message: String,
    pub user_id: i64,
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
    pub user_id: i64,
    pub username: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateApiKeyRequest {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateApiKeyResponse {
    pub success: bool,
    pub message: String,
    pub id: i64,
    pub api_key: String,
    pub name: String,
    pub prefix: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct ApiKeyInfoResponse {
    pub id: i64,
    pub name: String,
    pub prefix: String,
    pub created_at: String,
    pub last_used_at: Option<String>,
    pub expires_at: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequestBody {
    pub query: String,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub conversation_id: Option<i64>,
}

/// Token usage as reported to clients.
#[derive(Debug, Clone, Serialize)]
pub struct UsageResponse {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
    /// True when either count was estimated from text length.
    pub estimated: bool,
}

impl UsageResponse {
    pub fn new(input: TokenCount, output: TokenCount) -> Self {
        Self {
            input_tokens: input.value(),
            output_tokens: output.value(),
            total_tokens: input.value() + output.value(),
            estimated: input.is_estimated() || output.is_estimated(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub conversation_id: Option<i64>,
    pub message: String,
    pub code: String,
    pub explanation: String,
    pub provider: ProviderKind,
    pub usage: UsageResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl From<&ChatOutcome> for ChatResponse {
    fn from(o: &ChatOutcome) -> Self {
        Self {
            conversation_id: o.conversation_id,
            message: o.message.clone(),
            code: o.code.clone(),
            explanation: o.explanation.clone(),
            provider: o.provider,
            usage: UsageResponse::new(o.input_tokens, o.output_tokens),
            warning: o.retrieval_warning.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default)]
    pub model: Option<String>,
    pub messages: Vec<CompletionMessage>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub conversation_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionChoice {
    pub index: u32,
    pub message: CompletionMessage,
    pub finish_reason: String,
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionUsage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatCompletionChoice>,
    pub usage: ChatCompletionUsage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RetrieveRequest {
    pub query: String,
    #[serde(default)]
    pub n_results: i64,
}

#[derive(Debug, Serialize)]
pub struct RetrieveResponse {
    pub formatted_context: String,
    pub code_contexts: Vec<String>,
    pub code_distances: Vec<f64>,
    pub docs_contexts: Vec<String>,
    pub docs_distances: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl From<RetrievalResult> for RetrieveResponse {
    fn from(r: RetrievalResult) -> Self {
        Self {
            formatted_context: r.format_context(),
            code_contexts: r.code_contexts,
            code_distances: r.code_distances,
            docs_contexts: r.docs_contexts,
            docs_distances: r.docs_distances,
            warning: r.warning,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequestBody {
    pub query: String,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub code: String,
    pub explanation: String,
    pub provider: ProviderKind,
    pub usage: UsageResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl From<GenerateOutcome> for GenerateResponse {
    fn from(o: GenerateOutcome) -> Self {
        Self {
            usage: UsageResponse::new(o.input_tokens, o.output_tokens),
            code: o.code,
            explanation: o.explanation,
            provider: o.provider,
            warning: o.retrieval_warning,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub id: i64,
    pub history: Vec<Turn>,
    pub new_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct RagHealthResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub provider: ProviderKind,
    pub available: Vec<ProviderKind>,
}

#[derive(Debug, Deserialize)]
pub struct SelectProviderRequest {
    pub provider: String,
}

/// Query string for the query log listing.
#[derive(Debug, Default, Deserialize)]
pub struct QueryLogListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub user_id: Option<i64>,
    pub api_key_id: Option<i64>,
    pub status: Option<String>,
    pub endpoint: Option<String>,
    pub model_provider: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct QueryLogStatsQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PruneQuery {
    pub before: String,
}

#[derive(Debug, Serialize)]
pub struct PruneResponse {
    pub deleted: u64,
}
