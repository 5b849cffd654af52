//! API server configuration.

use std::time::Duration;

use stacks_core::db::DEFAULT_DATABASE_URL;
use stacks_core::retrieval::subprocess::{DEFAULT_SCRIPT_PATH, DEFAULT_TIMEOUT};
use stacks_core::telemetry::DEFAULT_QUEUE_CAPACITY;

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:8080").
    pub bind_addr: String,
    /// SQLite connection URL.
    pub database_url: String,
    /// Interpreter used to run the retriever script.
    pub python_executable: String,
    /// Path to the retriever script.
    pub python_script_path: String,
    /// Upper bound on one retriever invocation.
    pub rag_timeout: Duration,
    /// Depth of the query log queue.
    pub query_log_capacity: usize,
    /// Prune query logs older than this many days; keep forever when `None`.
    pub query_log_retention_days: Option<u32>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                   | Default                              |
    /// |----------------------------|--------------------------------------|
    /// | `BIND_ADDR`                | `127.0.0.1:8080`                     |
    /// | `DATABASE_URL`             | `sqlite://./data/stacks_builder.db`  |
    /// | `PYTHON_EXECUTABLE`        | `python3`                            |
    /// | `PYTHON_SCRIPT_PATH`       | `./scripts/rag_retriever.py`         |
    /// | `RAG_TIMEOUT_SECS`         | `60`                                 |
    /// | `QUERY_LOG_CAPACITY`       | `1000`                               |
    /// | `QUERY_LOG_RETENTION_DAYS` | unset (keep forever)                 |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`ApiConfig::from_env`] but reading from `lookup`.
    ///
    /// Unparsable numbers fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:8080".into()),
            database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.into()),
            python_executable: get("PYTHON_EXECUTABLE").unwrap_or_else(|| "python3".into()),
            python_script_path: get("PYTHON_SCRIPT_PATH")
                .unwrap_or_else(|| DEFAULT_SCRIPT_PATH.into()),
            rag_timeout: get("RAG_TIMEOUT_SECS")
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TIMEOUT),
            query_log_capacity: get("QUERY_LOG_CAPACITY")
                .and_then(|v| v.trim().parse::<usize>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_QUEUE_CAPACITY),
            query_log_retention_days: get("QUERY_LOG_RETENTION_DAYS")
                .and_then(|v| v.trim().parse::<u32>().ok())
                .filter(|days| *days > 0),
        }
    }

    /// Retention window for query logs, if pruning is enabled.
    pub fn query_log_retention(&self) -> Option<chrono::Duration> {
        self.query_log_retention_days
            .map(|days| chrono::Duration::days(i64::from(days)))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> ApiConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ApiConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let c = config(&[]);
        assert_eq!(c.bind_addr, "127.0.0.1:8080");
        assert_eq!(c.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(c.python_script_path, DEFAULT_SCRIPT_PATH);
        assert_eq!(c.rag_timeout, Duration::from_secs(60));
        assert_eq!(c.query_log_capacity, 1000);
        assert_eq!(c.query_log_retention(), None);
    }

    #[test]
    fn overrides_are_parsed() {
        let c = config(&[
            ("RAG_TIMEOUT_SECS", "5"),
            ("QUERY_LOG_CAPACITY", "10"),
            ("QUERY_LOG_RETENTION_DAYS", "30"),
            ("PYTHON_EXECUTABLE", "/usr/bin/python3.12"),
        ]);
        assert_eq!(c.rag_timeout, Duration::from_secs(5));
        assert_eq!(c.query_log_capacity, 10);
        assert_eq!(c.query_log_retention(), Some(chrono::Duration::days(30)));
        assert_eq!(c.python_executable, "/usr/bin/python3.12");
    }

    #[test]
    fn garbage_numbers_fall_back() {
        let c = config(&[("RAG_TIMEOUT_SECS", "soon"), ("QUERY_LOG_CAPACITY", "0")]);
        assert_eq!(c.rag_timeout, DEFAULT_TIMEOUT);
        assert_eq!(c.query_log_capacity, DEFAULT_QUEUE_CAPACITY);
    }
}
