//! Scan notes for matches and push replacements through a bounded worker pool

use super::matcher::{Match, MatchError, Matcher, PatternSpec};
use crate::cli::{CancellationToken, OutputEvent, OutputHandler};
use crate::store::{Note, NoteStore, StoreError};
use serde::Serialize;
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};

/// Matches found in one note during the scan phase
#[derive(Debug, Clone, Serialize)]
pub struct NoteMatch {
    pub note: Note,
    pub matches: Vec<Match>,
}

/// Outcome of one update attempt; `error` is `None` on success
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub note_id: String,
    pub note_title: String,
    pub error: Option<StoreError>,
}

/// Everything a run produced
#[derive(Debug, Clone, Default)]
pub struct RunResult {
    pub notes_scanned: usize,
    pub notes_with_matches: usize,
    pub total_matches: usize,
    pub notes_updated: usize,
    /// Failures in arrival order
    pub failed_updates: Vec<UpdateOutcome>,
    /// Matched notes in input order
    pub matched_notes: Vec<NoteMatch>,
    /// Cancellation fired before every update was attempted
    pub cancelled: bool,
}

impl RunResult {
    /// Human-readable summary of the run
    pub fn summary(&self, dry_run: bool) -> String {
        if self.notes_with_matches == 0 {
            return "No matches found in any notes".to_string();
        }

        let mut out = format!(
            "Scanned {} notes\nFound {} matches in {} notes\n",
            self.notes_scanned, self.total_matches, self.notes_with_matches
        );

        if dry_run {
            out.push_str("\nDRY-RUN MODE: No changes were made");
        } else {
            let _ = write!(out, "\nSuccessfully updated {} notes", self.notes_updated);
            if !self.failed_updates.is_empty() {
                let _ = write!(
                    out,
                    "\nFailed to update {} notes:",
                    self.failed_updates.len()
                );
                for failed in &self.failed_updates {
                    let error = failed
                        .error
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_default();
                    let _ = write!(
                        out,
                        "\n  - {} ({}): {}",
                        failed.note_title, failed.note_id, error
                    );
                }
            }
        }

        if self.cancelled {
            out.push_str("\nRun cancelled before all updates were attempted");
        }

        out
    }

    /// Process exit status: non-zero when any update failed or the run was cut short
    pub fn exit_code(&self) -> i32 {
        if self.failed_updates.is_empty() && !self.cancelled {
            0
        } else {
            1
        }
    }
}

/// How replacements are applied
#[derive(Debug, Clone)]
pub struct ReplaceOptions {
    pub replacement: String,
    pub dry_run: bool,
    /// Worker count, already validated to 1..=20
    pub concurrency: usize,
    /// Pause after every write, per worker
    pub delay: Duration,
}

/// Coordinates the scan and update phases
pub struct Replacer {
    matcher: Arc<Matcher>,
    options: ReplaceOptions,
}

/// Shared state handed to each worker
struct WorkerContext {
    store: Arc<dyn NoteStore>,
    matcher: Arc<Matcher>,
    replacement: Arc<str>,
    delay: Duration,
    cancel: CancellationToken,
}

impl Replacer {
    pub fn new(matcher: Matcher, options: ReplaceOptions) -> Self {
        Self {
            matcher: Arc::new(matcher),
            options,
        }
    }

    /// Find matches in every note, then (unless dry-run) write the replaced bodies back
    pub async fn process_notes(
        &self,
        store: Arc<dyn NoteStore>,
        notes: Vec<Note>,
        handler: &dyn OutputHandler,
        cancel: CancellationToken,
    ) -> RunResult {
        let mut result = self.scan(notes);

        handler.emit(OutputEvent::ScanComplete {
            scanned: result.notes_scanned,
            notes_with_matches: result.notes_with_matches,
            total_matches: result.total_matches,
        });

        if self.options.dry_run || result.matched_notes.is_empty() {
            return result;
        }

        self.apply(store, &mut result, handler, cancel).await;
        result
    }

    /// Sequential, side-effect-free scan in input order
    fn scan(&self, notes: Vec<Note>) -> RunResult {
        let mut result = RunResult {
            notes_scanned: notes.len(),
            ..Default::default()
        };

        for note in notes {
            let matches = self.matcher.find_all_matches(&note.body);
            if matches.is_empty() {
                continue;
            }

            tracing::debug!(note_id = %note.id, matches = matches.len(), "note matched");
            result.notes_with_matches += 1;
            result.total_matches += matches.len();
            result.matched_notes.push(NoteMatch { note, matches });
        }

        result
    }

    async fn apply(
        &self,
        store: Arc<dyn NoteStore>,
        result: &mut RunResult,
        handler: &dyn OutputHandler,
        cancel: CancellationToken,
    ) {
        let total = result.matched_notes.len();
        let workers = self.options.concurrency.clamp(1, total);

        let (job_tx, job_rx) = mpsc::channel::<Note>(total);
        for note_match in &result.matched_notes {
            // Capacity equals the job count, so this never waits
            if job_tx.send(note_match.note.clone()).await.is_err() {
                break;
            }
        }
        drop(job_tx);

        let queue = Arc::new(Mutex::new(job_rx));
        let (outcome_tx, mut outcome_rx) = mpsc::channel::<UpdateOutcome>(total);
        let ctx = Arc::new(WorkerContext {
            store,
            matcher: self.matcher.clone(),
            replacement: Arc::from(self.options.replacement.as_str()),
            delay: self.options.delay,
            cancel: cancel.clone(),
        });

        handler.emit(OutputEvent::UpdateStart { total, workers });
        tracing::info!(total, workers, delay = ?self.options.delay, "applying replacements");

        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let queue = queue.clone();
                let outcomes = outcome_tx.clone();
                let ctx = ctx.clone();
                tokio::spawn(update_worker(worker, queue, outcomes, ctx))
            })
            .collect();
        drop(outcome_tx);

        let mut processed = 0;
        while let Some(outcome) = outcome_rx.recv().await {
            processed += 1;
            match &outcome.error {
                None => {
                    result.notes_updated += 1;
                    handler.emit(OutputEvent::NoteUpdated {
                        id: outcome.note_id.clone(),
                        title: outcome.note_title.clone(),
                    });
                }
                Some(e) => {
                    handler.emit(OutputEvent::NoteFailed {
                        id: outcome.note_id.clone(),
                        title: outcome.note_title.clone(),
                        error: e.to_string(),
                    });
                    result.failed_updates.push(outcome);
                }
            }
            handler.emit(OutputEvent::UpdateProgress { processed, total });
        }

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "update worker did not finish cleanly");
            }
        }

        result.cancelled = cancel.is_cancelled() && processed < total;
        handler.emit(OutputEvent::UpdateComplete {
            updated: result.notes_updated,
            failed: result.failed_updates.len(),
            cancelled: result.cancelled,
        });
    }
}

/// Pull a job, write it, report one outcome, pause; until the queue is empty or cancelled
async fn update_worker(
    worker: usize,
    queue: Arc<Mutex<mpsc::Receiver<Note>>>,
    outcomes: mpsc::Sender<UpdateOutcome>,
    ctx: Arc<WorkerContext>,
) {
    loop {
        let job = queue.lock().await.recv().await;
        let Some(note) = job else {
            break;
        };

        if ctx.cancel.is_cancelled() {
            tracing::debug!(worker, note_id = %note.id, "cancelled, leaving queued job");
            break;
        }

        let body = ctx.matcher.replace(&note.body, &ctx.replacement);
        let result = ctx.store.update_note(&note.id, &body).await;

        if ctx.cancel.is_cancelled() {
            tracing::warn!(worker, note_id = %note.id, "write finished after cancellation, outcome discarded");
            break;
        }

        let outcome = UpdateOutcome {
            note_id: note.id,
            note_title: note.title,
            error: result.err(),
        };
        if outcomes.send(outcome).await.is_err() {
            break;
        }

        if !ctx.delay.is_zero() {
            tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => break,
                _ = tokio::time::sleep(ctx.delay) => {}
            }
        }
    }
}

/// Build the matcher for `spec` and process `notes` with it.
///
/// An invalid pattern is reported before any note is looked at.
pub async fn run(
    store: Arc<dyn NoteStore>,
    notes: Vec<Note>,
    spec: &PatternSpec,
    options: ReplaceOptions,
    handler: &dyn OutputHandler,
    cancel: CancellationToken,
) -> Result<RunResult, MatchError> {
    let matcher = Matcher::new(spec)?;
    Ok(Replacer::new(matcher, options)
        .process_notes(store, notes, handler, cancel)
        .await)
}
