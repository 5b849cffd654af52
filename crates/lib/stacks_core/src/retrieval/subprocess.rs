//! Retriever backed by a helper process.
//!
//! Each call spawns the helper, writes one JSON request to its stdin and
//! reads one JSON response from its stdout. The child is killed when the
//! call is dropped or times out.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{MAX_N_RESULTS, Result, RetrievalError, RetrievalRequest, RetrievalResult, Retriever};

/// Default helper script location.
pub const DEFAULT_SCRIPT_PATH: &str = "./scripts/rag_retriever.py";

/// Default bound on one request/response exchange.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Longest stdout excerpt quoted in parse errors.
const OUTPUT_EXCERPT_LEN: usize = 200;

/// Wire shape of the helper's reply.
#[derive(Debug, Deserialize)]
struct RawResponse {
    #[serde(default)]
    code_contexts: Vec<String>,
    #[serde(default)]
    code_distances: Vec<f64>,
    #[serde(default)]
    docs_contexts: Vec<String>,
    #[serde(default)]
    docs_distances: Vec<f64>,
    #[serde(default)]
    warning: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Runs `program args...` per request.
#[derive(Debug, Clone)]
pub struct SubprocessRetriever {
    program: String,
    args: Vec<String>,
    script_path: Option<PathBuf>,
    timeout: Duration,
}

impl SubprocessRetriever {
    /// Run `script_path` with the given interpreter.
    pub fn new(python: impl Into<String>, script_path: impl Into<PathBuf>) -> Self {
        let script_path = script_path.into();
        Self {
            program: python.into(),
            args: vec![script_path.to_string_lossy().into_owned()],
            script_path: Some(script_path),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Run an arbitrary command. Health checks skip the script existence test.
    pub fn with_command(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            script_path: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn script_path(&self) -> Option<&Path> {
        self.script_path.as_deref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn exchange(&self, payload: Vec<u8>) -> Result<std::process::Output> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                RetrievalError::Upstream(format!("failed to start `{}`: {e}", self.program))
            })?;

        let stdin = child.stdin.take();
        let write = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&payload).await?;
                stdin.shutdown().await?;
            }
            Ok::<_, std::io::Error>(())
        };

        let (written, output) = tokio::join!(write, child.wait_with_output());
        if let Err(e) = written {
            // The helper may exit before reading its input; its exit status says why.
            debug!(error = %e, "Retriever stdin closed early");
        }

        output.map_err(|e| RetrievalError::Upstream(format!("failed to wait for retriever: {e}")))
    }
}

fn excerpt(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= OUTPUT_EXCERPT_LEN {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(OUTPUT_EXCERPT_LEN).collect();
    format!("{cut}...")
}

fn parse_output(output: &std::process::Output) -> Result<RetrievalResult> {
    let stdout = String::from_utf8_lossy(&output.stdout);

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let reported = serde_json::from_str::<RawResponse>(&stdout)
            .ok()
            .and_then(|r| r.error);
        warn!(
            status = %output.status,
            stderr = %stderr.trim(),
            "Retriever exited unsuccessfully"
        );
        let detail = match reported {
            Some(err) => err,
            None if !stderr.trim().is_empty() => excerpt(&stderr),
            None => "no output".to_string(),
        };
        return Err(RetrievalError::Upstream(format!(
            "retriever exited with {}: {detail}",
            output.status
        )));
    }

    let raw: RawResponse = serde_json::from_str(&stdout).map_err(|e| {
        RetrievalError::Upstream(format!(
            "unparsable retriever output: {e} (output: {})",
            excerpt(&stdout)
        ))
    })?;

    if let Some(err) = raw.error.filter(|e| !e.is_empty()) {
        return Err(RetrievalError::Upstream(err));
    }

    let warning = raw.warning.filter(|w| !w.is_empty());
    if let Some(w) = &warning {
        warn!(warning = %w, "Retriever reported a warning");
    }

    Ok(RetrievalResult {
        code_contexts: raw.code_contexts,
        code_distances: raw.code_distances,
        docs_contexts: raw.docs_contexts,
        docs_distances: raw.docs_distances,
        warning,
    })
}

#[async_trait]
impl Retriever for SubprocessRetriever {
    async fn retrieve(&self, request: &RetrievalRequest) -> Result<RetrievalResult> {
        if request.query.trim().is_empty() {
            return Err(RetrievalError::Validation("query cannot be empty".into()));
        }

        let max = MAX_N_RESULTS as u32;
        let request = RetrievalRequest {
            query: request.query.clone(),
            n_results: request.n_results.clamp(1, max),
            docs_results: request.docs_results.clamp(1, max),
        };
        let payload = serde_json::to_vec(&request)
            .map_err(|e| RetrievalError::Upstream(format!("failed to encode request: {e}")))?;

        debug!(
            program = %self.program,
            n_results = request.n_results,
            "Invoking retriever"
        );

        let output = timeout(self.timeout, self.exchange(payload))
            .await
            .map_err(|_| RetrievalError::Timeout(self.timeout))??;

        parse_output(&output)
    }

    async fn health_check(&self) -> Result<()> {
        if let Some(path) = &self.script_path {
            if !path.exists() {
                return Err(RetrievalError::Upstream(format!(
                    "retriever script not found: {}",
                    path.display()
                )));
            }
        }

        let probe = RetrievalRequest {
            query: "test query".into(),
            n_results: 1,
            docs_results: 1,
        };
        self.retrieve(&probe).await.map(|_| ())
    }
}
