//! Configuration types and loading for joplin-replace

mod connection;
mod error;
mod loader;

pub use connection::ConnectionConfig;
pub use loader::{ReplacerConfig, RetryConfig};
