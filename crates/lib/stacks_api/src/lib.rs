//! # stacks_api
//!
//! HTTP API library for Stacks Builder.

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use stacks_core::codegen::ProviderRegistry;
use stacks_core::orchestrator::Orchestrator;
use stacks_core::retrieval::RetrievalService;
use stacks_core::telemetry::QueryLogPipeline;

use crate::config::ApiConfig;
use crate::handlers::{
    api_keys, auth, chat, completions, conversations, health, provider, query_logs, rag,
};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// SQLite connection pool.
    pub pool: SqlitePool,
    /// API configuration.
    pub config: ApiConfig,
    pub retrieval: RetrievalService,
    pub providers: Arc<ProviderRegistry>,
    pub orchestrator: Orchestrator,
    /// Producer side of the query log queue.
    pub telemetry: QueryLogPipeline,
    /// Cancelled on server shutdown; in-flight chats derive child tokens from it.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        pool: SqlitePool,
        config: ApiConfig,
        retrieval: RetrievalService,
        providers: Arc<ProviderRegistry>,
        telemetry: QueryLogPipeline,
        shutdown: CancellationToken,
    ) -> Self {
        let orchestrator = Orchestrator::new(pool.clone(), retrieval.clone(), providers.clone());
        Self {
            pool,
            config,
            retrieval,
            providers,
            orchestrator,
            telemetry,
            shutdown,
        }
    }
}

/// Run embedded database migrations.
///
/// Delegates to `stacks_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    stacks_core::migrate::migrate(pool).await
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route(
            routes::HEALTH,
            get(health::health_handler).head(health::health_handler),
        )
        .route(routes::GET_RAG_HEALTH, get(rag::rag_health_handler))
        .route(routes::POST_AUTH_REGISTER, post(auth::register_handler))
        .route(routes::POST_AUTH_LOGIN, post(auth::login_handler));

    // Account management (HTTP Basic)
    let account = Router::new()
        .route(
            routes::AUTH_KEYS,
            post(api_keys::create_api_key_handler).get(api_keys::list_api_keys_handler),
        )
        .route(
            routes::DELETE_AUTH_KEYS_ID,
            delete(api_keys::revoke_api_key_handler),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_basic_auth,
        ));

    // Administration (HTTP Basic + admin role)
    let admin = Router::new()
        .route(
            routes::ADMIN_QUERY_LOGS,
            get(query_logs::list_query_logs_handler).delete(query_logs::prune_query_logs_handler),
        )
        .route(
            routes::GET_ADMIN_QUERY_LOGS_STATS,
            get(query_logs::query_log_stats_handler),
        )
        .route(
            routes::GET_ADMIN_QUERY_LOGS_ID,
            get(query_logs::get_query_log_handler),
        )
        .route(
            routes::ADMIN_PROVIDER,
            get(provider::get_provider_handler).put(provider::select_provider_handler),
        )
        .layer(axum::middleware::from_fn(middleware::auth::require_admin))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_basic_auth,
        ));

    // Service calls (x-api-key); the last layer runs first.
    let service = Router::new()
        .route(routes::POST_CHAT, post(chat::chat_handler))
        .route(
            routes::POST_CHAT_COMPLETIONS,
            post(completions::chat_completions_handler),
        )
        .route(routes::POST_RAG_RETRIEVE, post(rag::retrieve_handler))
        .route(routes::POST_RAG_GENERATE, post(rag::generate_handler))
        .route(
            routes::GET_CONVERSATION_ID,
            get(conversations::get_conversation_handler),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::tracking::track_queries,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_api_key,
        ));

    Router::new()
        .merge(public)
        .merge(account)
        .merge(admin)
        .merge(service)
        .layer(cors)
        .with_state(state)
}
