//! CLI module for joplin-replace
//!
//! This module provides:
//! - Command implementations (replace, ping)
//! - Output handlers (console, JSON, quiet)
//! - Signal handling and cancellation
//!
//! # Example
//!
//! ```ignore
//! use joplin_replace::cli::{commands, output, signals};
//!
//! let handler = output::create_handler(output::OutputMode::Console, false);
//! let exit_code = commands::replace(&config, request, &*handler, token).await?;
//! ```

pub mod commands;
pub mod output;
pub mod signals;

pub use commands::{ReplaceRequest, ping, replace};
pub use output::{OutputEvent, OutputHandler, OutputMode, create_handler};
pub use signals::{CancellationToken, cancel_after, setup_signal_handlers};
