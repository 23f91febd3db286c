//! CLI command implementations

use super::output::{OutputEvent, OutputHandler};
use super::signals::{CancellationToken, with_cancellation};
use crate::config::ReplacerConfig;
use crate::replacer::{Matcher, PatternSpec, ReplaceOptions, render_all, render_summary, run};
use crate::store::{Note, NoteStore, create_store};
use anyhow::{Context, Result, anyhow};

/// What the replace command was asked to do
#[derive(Debug, Clone)]
pub struct ReplaceRequest {
    pub pattern: PatternSpec,
    pub replacement: String,
    pub dry_run: bool,
}

/// Check that Joplin is reachable and the token is accepted
pub async fn ping(
    config: &ReplacerConfig,
    handler: &dyn OutputHandler,
    cancel: CancellationToken,
) -> Result<i32> {
    let store = create_store(config, cancel.clone())?;
    connect(store.as_ref(), config, handler, &cancel).await?;

    handler.result(true, Some("✓ Joplin is reachable and the token was accepted"));
    Ok(0)
}

/// Search and replace across notes; returns the process exit code
pub async fn replace(
    config: &ReplacerConfig,
    request: ReplaceRequest,
    handler: &dyn OutputHandler,
    cancel: CancellationToken,
) -> Result<i32> {
    // A bad pattern must fail before anything is fetched
    Matcher::new(&request.pattern).context("invalid pattern")?;

    let store = create_store(config, cancel.clone())?;
    connect(store.as_ref(), config, handler, &cancel).await?;

    if request.dry_run {
        handler.emit(OutputEvent::Info {
            message: "Dry run: no notes will be modified".to_string(),
        });
    }

    let notes = fetch_notes(store.as_ref(), config, &request.pattern, &cancel).await?;
    tracing::info!(count = notes.len(), "fetched notes");
    handler.emit(OutputEvent::NotesFetched {
        count: notes.len(),
        regex: request.pattern.is_regex,
    });

    if notes.is_empty() {
        handler.result(true, Some("No notes found matching the search criteria"));
        return Ok(0);
    }

    let options = ReplaceOptions {
        replacement: request.replacement.clone(),
        dry_run: request.dry_run,
        concurrency: config.replace.concurrency,
        delay: config.delay(),
    };
    let result = run(store, notes, &request.pattern, options, handler, cancel)
        .await
        .context("invalid pattern")?;

    let mut output = String::new();
    if request.dry_run && result.notes_with_matches > 0 {
        output.push_str(&render_all(&result.matched_notes, &request.replacement));
        output.push('\n');
        output.push_str(&render_summary(&result.matched_notes));
        output.push('\n');
    }
    output.push_str(&result.summary(request.dry_run));

    tracing::info!(
        scanned = result.notes_scanned,
        matched = result.notes_with_matches,
        updated = result.notes_updated,
        failed = result.failed_updates.len(),
        cancelled = result.cancelled,
        "run finished"
    );

    let exit_code = result.exit_code();
    handler.result(exit_code == 0, Some(&output));
    Ok(exit_code)
}

/// Ping once before touching any note; any failure here is fatal
async fn connect(
    store: &dyn NoteStore,
    config: &ReplacerConfig,
    handler: &dyn OutputHandler,
    cancel: &CancellationToken,
) -> Result<()> {
    let base_url = format!("http://{}:{}", config.connection.host, config.connection.port);
    handler.emit(OutputEvent::Debug {
        message: format!("connecting to {}", base_url),
    });

    with_cancellation(cancel, store.ping())
        .await
        .ok_or_else(|| anyhow!("cancelled while connecting to Joplin"))?
        .with_context(|| format!("cannot reach Joplin at {}", base_url))?;

    tracing::info!(%base_url, "connected to Joplin API");
    handler.emit(OutputEvent::Connected { base_url });
    Ok(())
}

/// Regex patterns need a full scan; literal ones let the server pre-filter
async fn fetch_notes(
    store: &dyn NoteStore,
    config: &ReplacerConfig,
    pattern: &PatternSpec,
    cancel: &CancellationToken,
) -> Result<Vec<Note>> {
    let notebook = config.replace.notebook.as_deref();

    let notes = if pattern.is_regex {
        with_cancellation(cancel, store.fetch_all_notes(notebook)).await
    } else {
        with_cancellation(cancel, store.fetch_matching_notes(&pattern.raw, notebook)).await
    };

    notes
        .ok_or_else(|| anyhow!("cancelled while fetching notes"))?
        .context("failed to fetch notes")
}
