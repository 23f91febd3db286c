//! Search-and-replace engine
//!
//! - `matcher`: literal and regex matching with byte-accurate offsets
//! - `preview`: dry-run rendering of pending changes
//! - `orchestrator`: scan phase plus the bounded update worker pool

mod matcher;
mod orchestrator;
mod preview;

pub use matcher::{Matcher, PatternSpec};
pub use orchestrator::{ReplaceOptions, run};
pub use preview::{render_all, render_summary};
