//! Conversational code generation.
//!
//! One chat request moves through
//! `Authenticated → ConversationResolved → ContextRetrieved →
//! ResponseGenerated → Persisted → Completed`. Any failure ends the request
//! in `Errored`. Every step can be interrupted through a
//! [`CancellationToken`]; dropping the in-flight step kills the retriever
//! child process or aborts the provider HTTP call.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::codegen::{
    CodegenError, GenerationRequest, ProviderKind, ProviderRegistry, TokenCount, token_counts,
};
use crate::conversations::{self, Conversation, ConversationError, Turn};
use crate::retrieval::{DEFAULT_N_RESULTS, RetrievalError, RetrievalService};

/// Input to [`Orchestrator::chat`].
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub user_id: i64,
    pub query: String,
    /// `0.0` means the provider default.
    pub temperature: f64,
    /// `0` means the provider default.
    pub max_tokens: u32,
    /// Continue this conversation; start a new one when `None`.
    pub conversation_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatState {
    Authenticated,
    ConversationResolved,
    ContextRetrieved,
    ResponseGenerated,
    Persisted,
    Completed,
    Errored,
}

/// A generated answer and how it was produced.
#[derive(Debug, Clone, Serialize)]
pub struct ChatOutcome {
    /// `None` only when the answer could not be persisted for a new conversation.
    pub conversation_id: Option<i64>,
    /// The assistant turn as stored in the conversation.
    pub message: String,
    pub code: String,
    pub explanation: String,
    pub provider: ProviderKind,
    pub context_count: usize,
    pub retrieval_warning: Option<String>,
    pub input_tokens: TokenCount,
    pub output_tokens: TokenCount,
    pub states: Vec<ChatState>,
}

/// Input to [`Orchestrator::generate`].
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub query: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// A one-shot answer with no conversation attached.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateOutcome {
    pub code: String,
    pub explanation: String,
    pub provider: ProviderKind,
    pub context_count: usize,
    pub retrieval_warning: Option<String>,
    pub input_tokens: TokenCount,
    pub output_tokens: TokenCount,
}

/// Chat errors.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conversation {0} not found")]
    ConversationNotFound(i64),

    #[error(transparent)]
    Conversation(ConversationError),

    #[error("Failed to retrieve context: {0}")]
    Retrieval(#[source] RetrievalError),

    #[error("Failed to generate code: {0}")]
    Generation(#[source] CodegenError),

    /// The answer was generated but the conversation could not be saved.
    #[error("Response generated but conversation was not saved: {source}")]
    NotPersisted {
        outcome: Box<ChatOutcome>,
        #[source]
        source: ConversationError,
    },

    #[error("Request cancelled")]
    Cancelled,
}

impl From<ConversationError> for ChatError {
    fn from(e: ConversationError) -> Self {
        match e {
            ConversationError::NotFound(id) => ChatError::ConversationNotFound(id),
            other => ChatError::Conversation(other),
        }
    }
}

/// Assistant turn text: explanation plus the code as a fenced block.
pub fn assistant_message(code: &str, explanation: &str) -> String {
    if code.is_empty() {
        explanation.to_string()
    } else {
        format!("{explanation}\n\n```clarity\n{code}\n```")
    }
}

/// The provider-facing query for a conversation.
pub fn conversation_aware_query(conversation: &Conversation, query: &str) -> String {
    let history = conversation.history_prompt();
    if history.is_empty() {
        query.to_string()
    } else {
        format!("{history}Current user request:\n{query}")
    }
}

async fn cancellable<T>(cancel: &CancellationToken, step: impl Future<Output = T>) -> Result<T, ChatError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ChatError::Cancelled),
        value = step => Ok(value),
    }
}

struct Transitions {
    states: Vec<ChatState>,
}

impl Transitions {
    fn new() -> Self {
        let mut t = Self { states: Vec::new() };
        t.enter(ChatState::Authenticated);
        t
    }

    fn enter(&mut self, state: ChatState) {
        debug!(?state, "Chat state transition");
        self.states.push(state);
    }

    fn errored(&mut self, error: &dyn std::fmt::Display) {
        debug!(state = ?ChatState::Errored, error = %error, "Chat state transition");
        self.states.push(ChatState::Errored);
    }

    fn fail(&mut self, error: ChatError) -> ChatError {
        self.errored(&error);
        error
    }
}

/// Runs chat requests against shared services.
#[derive(Clone)]
pub struct Orchestrator {
    pool: SqlitePool,
    retrieval: RetrievalService,
    providers: Arc<ProviderRegistry>,
}

impl Orchestrator {
    pub fn new(pool: SqlitePool, retrieval: RetrievalService, providers: Arc<ProviderRegistry>) -> Self {
        Self {
            pool,
            retrieval,
            providers,
        }
    }

    pub fn providers(&self) -> &Arc<ProviderRegistry> {
        &self.providers
    }

    /// Answer one message, creating or continuing a conversation.
    pub async fn chat(
        &self,
        request: ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatOutcome, ChatError> {
        let query = request.query.trim().to_string();
        if query.is_empty() {
            return Err(ChatError::Validation("query cannot be empty".into()));
        }

        let mut t = Transitions::new();

        let mut conversation = match request.conversation_id {
            Some(id) => {
                match cancellable(cancel, conversations::get(&self.pool, id, request.user_id)).await {
                    Ok(Ok(c)) => c,
                    Ok(Err(e)) => return Err(t.fail(e.into())),
                    Err(e) => return Err(t.fail(e)),
                }
            }
            None => Conversation::new(request.user_id),
        };
        conversation.new_message = Some(query.clone());
        t.enter(ChatState::ConversationResolved);

        let provider_query = conversation_aware_query(&conversation, &query);

        let context = match cancellable(cancel, self.retrieval.retrieve_context(&query, DEFAULT_N_RESULTS)).await {
            Ok(Ok(c)) => c,
            Ok(Err(e)) => return Err(t.fail(ChatError::Retrieval(e))),
            Err(e) => return Err(t.fail(e)),
        };
        t.enter(ChatState::ContextRetrieved);

        let provider = match self.providers.current().await {
            Ok(p) => p,
            Err(e) => return Err(t.fail(ChatError::Generation(e))),
        };
        let generation = GenerationRequest {
            query: provider_query,
            code_contexts: context.code_contexts.clone(),
            doc_contexts: context.docs_contexts.clone(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };
        let generated = match cancellable(cancel, provider.generate(&generation)).await {
            Ok(Ok(g)) => g,
            Ok(Err(e)) => return Err(t.fail(ChatError::Generation(e))),
            Err(e) => return Err(t.fail(e)),
        };
        t.enter(ChatState::ResponseGenerated);

        let message = assistant_message(&generated.code, &generated.explanation);
        let (input_tokens, output_tokens) =
            token_counts(&generation.instruction(), &message, generated.usage);

        conversation.push(Turn::user(query));
        conversation.push(Turn::assistant(message.clone()));
        conversation.new_message = None;

        let mut outcome = ChatOutcome {
            conversation_id: conversation.id,
            message,
            code: generated.code,
            explanation: generated.explanation,
            provider: provider.kind(),
            context_count: context.context_count(),
            retrieval_warning: context.warning,
            input_tokens,
            output_tokens,
            states: Vec::new(),
        };

        let saved = cancellable(cancel, conversations::save(&self.pool, &mut conversation)).await;
        match saved {
            Ok(Ok(())) => {}
            Ok(Err(source)) => {
                warn!(error = %source, "Generated response could not be persisted");
                t.errored(&source);
                outcome.states = t.states;
                return Err(ChatError::NotPersisted {
                    outcome: Box::new(outcome),
                    source,
                });
            }
            Err(e) => return Err(t.fail(e)),
        }
        t.enter(ChatState::Persisted);

        outcome.conversation_id = conversation.id;
        t.enter(ChatState::Completed);
        outcome.states = t.states;
        Ok(outcome)
    }

    /// One-shot generation grounded in retrieved context. Nothing is persisted.
    pub async fn generate(
        &self,
        request: GenerateRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerateOutcome, ChatError> {
        let query = request.query.trim().to_string();
        if query.is_empty() {
            return Err(ChatError::Validation("query cannot be empty".into()));
        }

        let context = cancellable(cancel, self.retrieval.retrieve_context(&query, DEFAULT_N_RESULTS))
            .await?
            .map_err(ChatError::Retrieval)?;

        let provider = self.providers.current().await.map_err(ChatError::Generation)?;
        let generation = GenerationRequest {
            query,
            code_contexts: context.code_contexts.clone(),
            doc_contexts: context.docs_contexts.clone(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };
        let generated = cancellable(cancel, provider.generate(&generation))
            .await?
            .map_err(ChatError::Generation)?;

        let reply = assistant_message(&generated.code, &generated.explanation);
        let (input_tokens, output_tokens) =
            token_counts(&generation.instruction(), &reply, generated.usage);

        Ok(GenerateOutcome {
            code: generated.code,
            explanation: generated.explanation,
            provider: provider.kind(),
            context_count: context.context_count(),
            retrieval_warning: context.warning,
            input_tokens,
            output_tokens,
        })
    }
}
