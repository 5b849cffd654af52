//! Shared harness: in-memory database, scripted retriever and fake providers.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use stacks_api::{AppState, config::ApiConfig};
use stacks_core::auth::{api_keys, queries};
use stacks_core::codegen::{
    CodegenError, CodegenProvider, GenerationRequest, GenerationResult, ProviderFactory,
    ProviderKind, ProviderRegistry,
};
use stacks_core::db::connect_in_memory;
use stacks_core::models::auth::Role;
use stacks_core::retrieval::{RetrievalRequest, RetrievalResult, RetrievalService, Retriever};
use stacks_core::telemetry::{
    QueryLogPipeline, QueryLogRecord, QueryLogSink, SqliteQueryLogSink, TelemetryError,
};

pub const USER: (&str, &str) = ("builder", "builder-pass");
pub const ADMIN: (&str, &str) = ("root", "root-pass");

pub struct ScriptedRetriever {
    pub fail: bool,
}

#[async_trait]
impl Retriever for ScriptedRetriever {
    async fn retrieve(
        &self,
        request: &RetrievalRequest,
    ) -> stacks_core::retrieval::Result<RetrievalResult> {
        if self.fail {
            return Err(stacks_core::retrieval::RetrievalError::Upstream(
                "retriever exited with exit status: 1: chromadb unavailable".into(),
            ));
        }
        let n = request.n_results as usize;
        Ok(RetrievalResult {
            code_contexts: vec!["(define-data-var counter uint u0)".into(); n.min(2)],
            code_distances: vec![0.1; n.min(2)],
            docs_contexts: vec!["Data variables persist contract state.".into()],
            docs_distances: vec![0.3],
            warning: None,
        })
    }

    async fn health_check(&self) -> stacks_core::retrieval::Result<()> {
        Ok(())
    }
}

/// Answers with code naming the provider that produced it.
pub struct FakeProvider {
    kind: ProviderKind,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl CodegenProvider for FakeProvider {
    async fn generate(&self, _: &GenerationRequest) -> Result<GenerationResult, CodegenError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = format!(
            "**Code:**\n```clarity\n(define-read-only (who) (ok \"{kind}\"))\n```\n\n**Explanation:**\nWritten by {kind}.",
            kind = self.kind
        );
        Ok(GenerationResult::from_reply(&reply, None))
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }
}

pub struct FakeFactory {
    pub calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ProviderFactory for FakeFactory {
    async fn build(&self, kind: ProviderKind) -> Result<Arc<dyn CodegenProvider>, CodegenError> {
        Ok(Arc::new(FakeProvider {
            kind,
            calls: self.calls.clone(),
        }))
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub records: Mutex<Vec<QueryLogRecord>>,
}

#[async_trait]
impl QueryLogSink for RecordingSink {
    async fn write(&self, record: &QueryLogRecord) -> Result<(), TelemetryError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

impl RecordingSink {
    /// Wait until the worker has delivered `n` records.
    pub async fn wait_for(&self, n: usize) -> Vec<QueryLogRecord> {
        for _ in 0..200 {
            {
                let records = self.records.lock().unwrap();
                if records.len() >= n {
                    return records.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {n} query log records");
    }
}

pub enum Telemetry {
    Recording,
    Sqlite,
}

pub struct Harness {
    pub app: Router,
    pub pool: SqlitePool,
    pub api_key: String,
    pub provider_calls: Arc<AtomicUsize>,
    pub sink: Arc<RecordingSink>,
}

pub async fn harness(fail_retrieval: bool) -> Harness {
    harness_with(fail_retrieval, Telemetry::Recording).await
}

pub async fn harness_with(fail_retrieval: bool, telemetry: Telemetry) -> Harness {
    let pool = connect_in_memory().await.expect("in-memory pool");
    let user_id = queries::create_user(&pool, USER.0, USER.1, None, Role::User)
        .await
        .unwrap();
    queries::create_user(&pool, ADMIN.0, ADMIN.1, None, Role::Admin)
        .await
        .unwrap();
    let api_key = api_keys::generate_api_key(&pool, user_id, Some("tests"))
        .await
        .unwrap()
        .api_key;

    let provider_calls = Arc::new(AtomicUsize::new(0));
    let providers = Arc::new(ProviderRegistry::new(
        ProviderKind::Gemini,
        Arc::new(FakeFactory {
            calls: provider_calls.clone(),
        }),
    ));
    let retrieval = RetrievalService::new(Arc::new(ScriptedRetriever {
        fail: fail_retrieval,
    }));

    let sink = Arc::new(RecordingSink::default());
    let (pipeline, _worker) = match telemetry {
        Telemetry::Recording => QueryLogPipeline::start(sink.clone(), 64),
        Telemetry::Sqlite => QueryLogPipeline::start(Arc::new(SqliteQueryLogSink::new(pool.clone())), 64),
    };

    let state = AppState::new(
        pool.clone(),
        ApiConfig::default(),
        retrieval,
        providers,
        pipeline,
        CancellationToken::new(),
    );

    Harness {
        app: stacks_api::router(state),
        pool,
        api_key,
        provider_calls,
        sink,
    }
}

pub fn basic(credentials: (&str, &str)) -> String {
    format!(
        "Basic {}",
        STANDARD.encode(format!("{}:{}", credentials.0, credentials.1))
    )
}

pub struct Call {
    method: Method,
    uri: String,
    headers: Vec<(String, String)>,
    body: Option<String>,
}

pub fn call(method: Method, uri: impl Into<String>) -> Call {
    Call {
        method,
        uri: uri.into(),
        headers: Vec::new(),
        body: None,
    }
}

impl Call {
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn api_key(self, key: &str) -> Self {
        self.header("x-api-key", key)
    }

    pub fn basic(self, credentials: (&str, &str)) -> Self {
        self.header("authorization", basic(credentials))
    }

    pub fn json(self, body: Value) -> Self {
        self.raw(body.to_string())
    }

    /// Send `body` verbatim as `application/json`.
    pub fn raw(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Send through the router; returns status, `www-authenticate` and the JSON body.
    pub async fn send(self, app: &Router) -> (StatusCode, Option<String>, Value) {
        let mut builder = Request::builder().method(self.method).uri(self.uri);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let req = match self.body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let resp = app.clone().oneshot(req).await.expect("request");
        let status = resp.status();
        let challenge = resp
            .headers()
            .get("www-authenticate")
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("read body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("parse JSON")
        };
        (status, challenge, json)
    }
}
