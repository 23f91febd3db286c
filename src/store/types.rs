//! Core types and traits for talking to the note store

use crate::config::RetryConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// A Joplin note as returned by the REST API
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub body: String,

    /// Notebook (folder) the note lives in
    #[serde(default)]
    pub parent_id: String,

    /// Last modification time, milliseconds since the epoch
    #[serde(default)]
    pub updated_time: i64,
}

impl Note {
    /// Create a note with just an id, title and body
    pub fn new(id: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            body: body.into(),
            ..Default::default()
        }
    }

    /// Set the parent notebook
    #[cfg(test)]
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = parent_id.into();
        self
    }

    /// Whether the note belongs to the given notebook (always true without a filter)
    pub fn in_notebook(&self, notebook: Option<&str>) -> bool {
        notebook.is_none_or(|id| self.parent_id == id)
    }
}

/// Error types that can occur while talking to the store
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Credential rejected
    #[error("authentication failed: {message}")]
    Auth { message: String },

    /// Connection refused, reset or timed out
    #[error("network error: {message}")]
    Network { message: String },

    /// 5xx from the remote service
    #[error("server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    /// Malformed request (4xx other than auth and not-found)
    #[error("bad request (HTTP {status}): {message}")]
    BadRequest { status: u16, message: String },

    #[error("not found: {message}")]
    NotFound { message: String },

    /// Failed to decode a response
    #[error("parse error: {message}")]
    Parse { message: String },

    /// The service answered, but not the way we expected
    #[error("unexpected response: {message}")]
    UnexpectedResponse { message: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("request failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<StoreError>,
    },
}

impl StoreError {
    /// Check if this error is worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Network { .. } | StoreError::Server { .. })
    }

    /// Create an auth error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a server error
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Create an unexpected-response error
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            message: message.into(),
        }
    }
}

/// Operations the replacer needs from a note store
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Liveness and credential check
    async fn ping(&self) -> Result<(), StoreError>;

    /// Fetch every note, optionally restricted to one notebook
    async fn fetch_all_notes(&self, notebook: Option<&str>) -> Result<Vec<Note>, StoreError>;

    /// IDs of the notes the server-side search reports as containing `query`
    async fn search_notes(
        &self,
        query: &str,
        notebook: Option<&str>,
    ) -> Result<Vec<String>, StoreError>;

    /// Fetch one note with its full body
    async fn fetch_note(&self, id: &str) -> Result<Note, StoreError>;

    /// Search, then fetch each hit.
    ///
    /// A hit that cannot be fetched is logged and skipped; cancellation aborts the whole fetch.
    async fn fetch_matching_notes(
        &self,
        query: &str,
        notebook: Option<&str>,
    ) -> Result<Vec<Note>, StoreError> {
        let ids = self.search_notes(query, notebook).await?;

        let mut notes = Vec::with_capacity(ids.len());
        for id in ids {
            match self.fetch_note(&id).await {
                Ok(note) => notes.push(note),
                Err(StoreError::Cancelled) => return Err(StoreError::Cancelled),
                Err(e) => {
                    tracing::warn!(note_id = %id, error = %e, "skipping note that could not be fetched");
                }
            }
        }

        Ok(notes)
    }

    /// Rewrite the body of a note; everything else is left alone
    async fn update_note(&self, id: &str, body: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: NoteStore + ?Sized> NoteStore for std::sync::Arc<T> {
    async fn ping(&self) -> Result<(), StoreError> {
        (**self).ping().await
    }

    async fn fetch_all_notes(&self, notebook: Option<&str>) -> Result<Vec<Note>, StoreError> {
        (**self).fetch_all_notes(notebook).await
    }

    async fn search_notes(
        &self,
        query: &str,
        notebook: Option<&str>,
    ) -> Result<Vec<String>, StoreError> {
        (**self).search_notes(query, notebook).await
    }

    async fn fetch_note(&self, id: &str) -> Result<Note, StoreError> {
        (**self).fetch_note(id).await
    }

    async fn fetch_matching_notes(
        &self,
        query: &str,
        notebook: Option<&str>,
    ) -> Result<Vec<Note>, StoreError> {
        (**self).fetch_matching_notes(query, notebook).await
    }

    async fn update_note(&self, id: &str, body: &str) -> Result<(), StoreError> {
        (**self).update_note(id, body).await
    }
}

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,

    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,

    /// Whether to add jitter to delays
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Create a policy from the retry section of the config
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            jitter: config.jitter,
            ..Default::default()
        }
    }

    /// Delay to wait before retry number `retry` (0 = first retry)
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let base_delay =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(retry as i32);
        let capped_delay = base_delay.min(self.max_delay.as_secs_f64());

        let final_delay = if self.jitter {
            // Add up to 25% jitter
            let jitter = rand::random::<f64>() * 0.25 * capped_delay;
            capped_delay + jitter
        } else {
            capped_delay
        };

        Duration::from_secs_f64(final_delay)
    }
}
