//! Note store access
//!
//! Provides the Joplin REST client and a retry wrapper that layers
//! exponential backoff over any [`NoteStore`].
//!
//! # Example
//!
//! ```ignore
//! use joplin_replace::store::{NoteStore, create_store};
//!
//! let store = create_store(&config, cancel.clone())?;
//!
//! store.ping().await?;
//! let notes = store.fetch_matching_notes("TODO", None).await?;
//! ```

mod joplin;
mod retry;
mod types;

pub use types::{Note, NoteStore, StoreError};

use joplin::JoplinClient;
use retry::RetryStore;
use types::RetryPolicy;

use crate::cli::CancellationToken;
use crate::config::ReplacerConfig;
use std::sync::Arc;

/// Build the retrying Joplin store described by the config
pub fn create_store(
    config: &ReplacerConfig,
    cancel: CancellationToken,
) -> Result<Arc<dyn NoteStore>, StoreError> {
    let client = JoplinClient::from_config(&config.connection)?;
    let policy = RetryPolicy::from_config(&config.retry);
    Ok(Arc::new(RetryStore::new(client, policy, cancel)))
}
