//! Retry wrapper with exponential backoff

use super::types::{Note, NoteStore, RetryPolicy, StoreError};
use crate::cli::CancellationToken;
use async_trait::async_trait;
use std::future::Future;

/// Runs a fallible store operation under a [`RetryPolicy`], honoring cancellation
#[derive(Clone)]
pub struct Retrier {
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl Retrier {
    pub fn new(policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self { policy, cancel }
    }

    /// Call `op` until it succeeds, fails permanently, runs out of attempts or is cancelled.
    ///
    /// The backoff sleep happens before each retry, never before the first attempt,
    /// and loses any race against the cancellation token.
    pub async fn attempt<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut last_error = None;

        for attempt in 0..self.policy.max_attempts {
            if self.cancel.is_cancelled() {
                return Err(StoreError::Cancelled);
            }

            if attempt > 0 {
                let delay = self.policy.delay_for_retry(attempt - 1);
                tracing::debug!(operation, attempt = attempt + 1, ?delay, "backing off before retry");

                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(StoreError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        operation,
                        attempt = attempt + 1,
                        max_attempts = self.policy.max_attempts,
                        error = %e,
                        "transient failure"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(StoreError::RetriesExhausted {
            attempts: self.policy.max_attempts,
            last: Box::new(
                last_error.unwrap_or_else(|| StoreError::network("no attempts were made")),
            ),
        })
    }
}

/// Store wrapper that routes every call through a [`Retrier`]
pub struct RetryStore<S: NoteStore> {
    inner: S,
    retrier: Retrier,
}

impl<S: NoteStore> RetryStore<S> {
    pub fn new(inner: S, policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self {
            inner,
            retrier: Retrier::new(policy, cancel),
        }
    }
}

#[async_trait]
impl<S: NoteStore> NoteStore for RetryStore<S> {
    async fn ping(&self) -> Result<(), StoreError> {
        self.retrier.attempt("ping", || self.inner.ping()).await
    }

    async fn fetch_all_notes(&self, notebook: Option<&str>) -> Result<Vec<Note>, StoreError> {
        self.retrier
            .attempt("fetch_all_notes", || self.inner.fetch_all_notes(notebook))
            .await
    }

    async fn search_notes(
        &self,
        query: &str,
        notebook: Option<&str>,
    ) -> Result<Vec<String>, StoreError> {
        self.retrier
            .attempt("search_notes", || self.inner.search_notes(query, notebook))
            .await
    }

    async fn fetch_note(&self, id: &str) -> Result<Note, StoreError> {
        self.retrier
            .attempt("fetch_note", || self.inner.fetch_note(id))
            .await
    }

    async fn update_note(&self, id: &str, body: &str) -> Result<(), StoreError> {
        self.retrier
            .attempt("update_note", || self.inner.update_note(id, body))
            .await
    }
}
