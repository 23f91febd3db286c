use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// The log file always gets everything this crate emits at debug and above
const FILE_DIRECTIVE: &str = "joplin_replace=debug";

fn console_directive(verbose: bool, quiet: bool) -> &'static str {
    if verbose {
        "joplin_replace=debug"
    } else if quiet {
        "joplin_replace=error"
    } else {
        "joplin_replace=warn"
    }
}

/// Install the global subscriber: stderr at the requested verbosity, plus `log_file` if given
pub fn init_logging(verbose: bool, quiet: bool, log_file: Option<PathBuf>) -> anyhow::Result<()> {
    build_subscriber(verbose, quiet, log_file)?.init();
    Ok(())
}

fn build_subscriber(
    verbose: bool,
    quiet: bool,
    log_file: Option<PathBuf>,
) -> anyhow::Result<impl tracing::Subscriber + Send + Sync + 'static> {
    let console = fmt::layer()
        .with_target(false)
        .with_line_number(verbose)
        .with_file(verbose)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(console_directive(verbose, quiet)));

    let file = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)?;

            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_line_number(true)
                    .with_file(true)
                    .with_writer(Mutex::new(file))
                    .with_filter(EnvFilter::new(FILE_DIRECTIVE)),
            )
        }
        None => None,
    };

    Ok(tracing_subscriber::registry().with(console).with(file))
}

/// `<config dir>/joplin-replace/logs/replace-<timestamp>.log`
pub fn default_log_path() -> anyhow::Result<PathBuf> {
    let log_dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
        .join("joplin-replace")
        .join("logs");

    let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    Ok(log_dir.join(format!("replace-{}.log", timestamp)))
}
