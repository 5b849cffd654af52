//! Validated entry point to a [`Retriever`].

use std::sync::Arc;

use super::{
    DEFAULT_N_RESULTS, MAX_N_RESULTS, Result, RetrievalError, RetrievalRequest, RetrievalResult,
    Retriever,
};

/// Wraps a retriever with request validation and defaults.
#[derive(Clone)]
pub struct RetrievalService {
    retriever: Arc<dyn Retriever>,
}

impl RetrievalService {
    pub fn new(retriever: Arc<dyn Retriever>) -> Self {
        Self { retriever }
    }

    /// Fetch context for `query`.
    ///
    /// `n_results` of 0 means the default (5); anything else outside
    /// `1..=20` is rejected. Documentation results mirror `n_results`.
    pub async fn retrieve_context(&self, query: &str, n_results: i64) -> Result<RetrievalResult> {
        if query.trim().is_empty() {
            return Err(RetrievalError::Validation("query cannot be empty".into()));
        }

        let n_results = if n_results == 0 {
            DEFAULT_N_RESULTS
        } else {
            n_results
        };
        if !(1..=MAX_N_RESULTS).contains(&n_results) {
            return Err(RetrievalError::Validation(format!(
                "n_results must be between 1 and {MAX_N_RESULTS}"
            )));
        }

        let n = n_results as u32;
        self.retriever
            .retrieve(&RetrievalRequest {
                query: query.to_string(),
                n_results: n,
                docs_results: n,
            })
            .await
    }

    pub async fn health_check(&self) -> Result<()> {
        self.retriever.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<RetrievalRequest>>,
    }

    #[async_trait]
    impl Retriever for Recording {
        async fn retrieve(&self, request: &RetrievalRequest) -> Result<RetrievalResult> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(RetrievalResult::default())
        }

        async fn health_check(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn n_results_boundaries() {
        let recording = Arc::new(Recording::default());
        let service = RetrievalService::new(recording.clone());

        for n in [0, 1, 20] {
            service.retrieve_context("token", n).await.unwrap();
        }
        for n in [21, -1] {
            let err = service.retrieve_context("token", n).await.unwrap_err();
            assert!(matches!(err, RetrievalError::Validation(_)));
        }

        let seen = recording.seen.lock().unwrap();
        let ns: Vec<u32> = seen.iter().map(|r| r.n_results).collect();
        assert_eq!(ns, vec![5, 1, 20]);
        assert!(seen.iter().all(|r| r.docs_results == r.n_results));
    }

    #[tokio::test]
    async fn empty_query_is_rejected_before_retrieval() {
        let recording = Arc::new(Recording::default());
        let service = RetrievalService::new(recording.clone());
        let err = service.retrieve_context("   ", 5).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Validation(_)));
        assert!(recording.seen.lock().unwrap().is_empty());
    }
}
