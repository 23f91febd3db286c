//! Output handlers for CLI commands
//!
//! Supports console (pretty), JSON, and quiet output modes.

use serde::{Deserialize, Serialize};
use std::io::{self, Write};

/// Output mode for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputMode {
    #[default]
    Console,
    Json,
    Quiet,
}

/// Events emitted during a run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutputEvent {
    Connected {
        base_url: String,
    },
    NotesFetched {
        count: usize,
        regex: bool,
    },
    ScanComplete {
        scanned: usize,
        notes_with_matches: usize,
        total_matches: usize,
    },
    UpdateStart {
        total: usize,
        workers: usize,
    },
    NoteUpdated {
        id: String,
        title: String,
    },
    NoteFailed {
        id: String,
        title: String,
        error: String,
    },
    UpdateProgress {
        processed: usize,
        total: usize,
    },
    UpdateComplete {
        updated: usize,
        failed: usize,
        cancelled: bool,
    },
    Info {
        message: String,
    },
    Debug {
        message: String,
    },
}

/// Output handler trait
pub trait OutputHandler: Send + Sync {
    /// Emit an event
    fn emit(&self, event: OutputEvent);

    /// Write final result
    fn result(&self, success: bool, output: Option<&str>);
}

/// Console output handler
pub struct ConsoleHandler {
    verbose: bool,
}

impl ConsoleHandler {
    /// Create a new console handler
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    fn format_progress(processed: usize, total: usize) -> String {
        let percentage = if total == 0 {
            100.0
        } else {
            processed as f64 / total as f64 * 100.0
        };
        format!("Updating notes: {}/{} ({:.1}%)", processed, total, percentage)
    }
}

impl OutputHandler for ConsoleHandler {
    fn emit(&self, event: OutputEvent) {
        match event {
            OutputEvent::Connected { base_url } => {
                if self.verbose {
                    eprintln!("Connected to Joplin at {}", base_url);
                }
            }
            OutputEvent::NotesFetched { count, regex } => {
                if self.verbose {
                    if regex {
                        eprintln!("Fetched {} notes", count);
                    } else {
                        eprintln!("Found {} notes containing the search pattern", count);
                    }
                }
            }
            OutputEvent::ScanComplete {
                notes_with_matches,
                total_matches,
                ..
            } => {
                if self.verbose {
                    eprintln!(
                        "Found {} matches in {} notes",
                        total_matches, notes_with_matches
                    );
                }
            }
            OutputEvent::UpdateStart { total, workers } => {
                if self.verbose {
                    eprintln!("Updating {} notes with {} workers", total, workers);
                }
            }
            OutputEvent::NoteUpdated { .. } => {}
            OutputEvent::NoteFailed { title, error, .. } => {
                if self.verbose {
                    eprintln!("\n✗ {}: {}", title, error);
                }
            }
            OutputEvent::UpdateProgress { processed, total } => {
                eprint!("\r{}", Self::format_progress(processed, total));
                let _ = io::stderr().flush();
            }
            OutputEvent::UpdateComplete { .. } => {
                eprintln!();
            }
            OutputEvent::Info { message } => {
                eprintln!("{}", message);
            }
            OutputEvent::Debug { message } => {
                if self.verbose {
                    eprintln!("[debug] {}", message);
                }
            }
        }
    }

    fn result(&self, _success: bool, output: Option<&str>) {
        if let Some(out) = output {
            println!("{}", out);
        }
    }
}

/// JSON output handler
pub struct JsonHandler {
    pretty: bool,
}

impl JsonHandler {
    /// Create a new JSON handler
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn print_json<T: Serialize>(&self, value: &T) {
        let json = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };

        if let Ok(s) = json {
            println!("{}", s);
        }
    }
}

impl OutputHandler for JsonHandler {
    fn emit(&self, event: OutputEvent) {
        // Progress ticks would swamp the stream; the per-note events carry the same data
        if matches!(event, OutputEvent::UpdateProgress { .. }) {
            return;
        }
        self.print_json(&event);
    }

    fn result(&self, success: bool, output: Option<&str>) {
        #[derive(Serialize)]
        struct FinalResult<'a> {
            success: bool,
            output: Option<&'a str>,
        }

        self.print_json(&FinalResult { success, output });
    }
}

/// Quiet handler that emits nothing
pub struct QuietHandler;

impl OutputHandler for QuietHandler {
    fn emit(&self, _event: OutputEvent) {}
    fn result(&self, _success: bool, output: Option<&str>) {
        // Only print final output, nothing else
        if let Some(out) = output {
            println!("{}", out);
        }
    }
}

/// Create an output handler based on mode
pub fn create_handler(mode: OutputMode, verbose: bool) -> Box<dyn OutputHandler> {
    match mode {
        OutputMode::Console => Box::new(ConsoleHandler::new(verbose)),
        OutputMode::Json => Box::new(JsonHandler::new(false)),
        OutputMode::Quiet => Box::new(QuietHandler),
    }
}
