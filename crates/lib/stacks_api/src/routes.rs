//! Route paths.

pub const HEALTH: &str = "/health";

pub const POST_AUTH_REGISTER: &str = "/api/v1/auth/register";
pub const POST_AUTH_LOGIN: &str = "/api/v1/auth/login";
pub const AUTH_KEYS: &str = "/api/v1/auth/keys";
pub const DELETE_AUTH_KEYS_ID: &str = "/api/v1/auth/keys/{id}";

pub const POST_CHAT: &str = "/api/v1/chat";
pub const POST_CHAT_COMPLETIONS: &str = "/v1/chat/completions";
pub const GET_CONVERSATION_ID: &str = "/api/v1/conversations/{id}";

pub const POST_RAG_RETRIEVE: &str = "/api/v1/rag/retrieve";
pub const POST_RAG_GENERATE: &str = "/api/v1/rag/generate";
pub const GET_RAG_HEALTH: &str = "/api/v1/rag/health";

pub const ADMIN_QUERY_LOGS: &str = "/api/v1/admin/query-logs";
pub const GET_ADMIN_QUERY_LOGS_STATS: &str = "/api/v1/admin/query-logs/stats";
pub const GET_ADMIN_QUERY_LOGS_ID: &str = "/api/v1/admin/query-logs/{id}";
pub const ADMIN_PROVIDER: &str = "/api/v1/admin/provider";

/// Endpoints recorded by the query tracking middleware.
pub const TRACKED: [&str; 4] = [
    POST_CHAT,
    POST_CHAT_COMPLETIONS,
    POST_RAG_RETRIEVE,
    POST_RAG_GENERATE,
];
