mod cli;
mod config;
mod logging;
mod replacer;
mod store;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use cli::{CancellationToken, OutputMode, ReplaceRequest};
use config::ReplacerConfig;
use replacer::PatternSpec;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "joplin-replace")]
#[command(version)]
#[command(about = "Search and replace text in Joplin notes via the local REST API")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: ~/.config/joplin-replace/config.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Joplin API token
    #[arg(long, global = true, env = "JOPLIN_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Joplin API host
    #[arg(long, global = true, env = "JOPLIN_HOST")]
    host: Option<String>,

    /// Joplin API port
    #[arg(long, global = true, env = "JOPLIN_PORT")]
    port: Option<u16>,

    /// Per-request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Suppress normal output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputMode::Console)]
    output: OutputMode,

    /// Also log to a file (default location when no path is given)
    #[arg(long, global = true)]
    log_file: Option<Option<PathBuf>>,
}

#[derive(Subcommand)]
enum Commands {
    /// Search and replace text in notes
    ///
    /// Examples:
    ///   joplin-replace replace --dry-run "old text" "new text"
    ///   joplin-replace replace --regex "TODO:.*\n" "DONE:\n"
    ///   joplin-replace replace --case-sensitive "OldName" "NewName"
    #[command(verbatim_doc_comment)]
    Replace(ReplaceArgs),

    /// Check that Joplin is reachable and the token is valid
    Ping,
}

#[derive(Args)]
struct ReplaceArgs {
    /// Text or regex to search for
    pattern: String,

    /// Replacement text (`$1`, `${name}` refer to regex groups)
    replacement: String,

    /// Treat the search pattern as a regex
    #[arg(long)]
    regex: bool,

    /// Preview changes without applying them
    #[arg(long)]
    dry_run: bool,

    /// Case-sensitive matching
    #[arg(long)]
    case_sensitive: bool,

    /// Only touch notes in this notebook (by ID)
    #[arg(long)]
    notebook: Option<String>,

    /// Number of concurrent note updates (1-20)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Delay after each note update, in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,
}

/// Layer CLI flags and environment over the file configuration
fn apply_overrides(config: &mut ReplacerConfig, cli: &Cli) {
    if let Some(ref token) = cli.token {
        config.connection.token = Some(token.clone());
    }
    if let Some(ref host) = cli.host {
        config.connection.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.connection.port = port;
    }
    if let Some(timeout) = cli.timeout {
        config.connection.timeout_secs = timeout;
    }

    if let Commands::Replace(ref args) = cli.command {
        if args.case_sensitive {
            config.replace.case_sensitive = true;
        }
        if args.notebook.is_some() {
            config.replace.notebook = args.notebook.clone();
        }
        if let Some(concurrency) = args.concurrency {
            config.replace.concurrency = concurrency;
        }
        if let Some(delay_ms) = args.delay_ms {
            config.replace.delay_ms = delay_ms;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_file = match cli.log_file {
        Some(Some(ref path)) => Some(path.clone()),
        Some(None) => Some(logging::default_log_path()?),
        None => None,
    };
    logging::init_logging(cli.verbose, cli.quiet, log_file)?;

    let mut config = ReplacerConfig::load(cli.config.as_deref())?;
    apply_overrides(&mut config, &cli);
    config.validate()?;

    let output = if cli.quiet && cli.output == OutputMode::Console {
        OutputMode::Quiet
    } else {
        cli.output
    };
    let handler = cli::create_handler(output, cli.verbose);

    let cancel = CancellationToken::new();
    tokio::spawn(cli::setup_signal_handlers(cancel.clone()));
    tokio::spawn(cli::cancel_after(cancel.clone(), config.run_timeout()));

    let exit_code = match cli.command {
        Commands::Ping => cli::ping(&config, &*handler, cancel).await?,
        Commands::Replace(args) => {
            let request = ReplaceRequest {
                pattern: PatternSpec::new(args.pattern, args.regex, config.replace.case_sensitive),
                replacement: args.replacement,
                dry_run: args.dry_run,
            };
            cli::replace(&config, request, &*handler, cancel).await?
        }
    };

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args.iter().copied()).unwrap()
    }

    #[test]
    fn test_cli_parses_replace() {
        let cli = parse(&[
            "joplin-replace",
            "replace",
            "--regex",
            "--dry-run",
            "--concurrency",
            "8",
            "a(.)c",
            "$1",
        ]);

        match cli.command {
            Commands::Replace(args) => {
                assert_eq!(args.pattern, "a(.)c");
                assert_eq!(args.replacement, "$1");
                assert!(args.regex);
                assert!(args.dry_run);
                assert_eq!(args.concurrency, Some(8));
            }
            Commands::Ping => panic!("expected replace"),
        }
    }

    #[test]
    fn test_cli_requires_both_arguments() {
        assert!(Cli::try_parse_from(["joplin-replace", "replace", "only-pattern"]).is_err());
    }

    #[test]
    fn test_log_file_optional_value() {
        let cli = parse(&["joplin-replace", "ping", "--log-file"]);
        assert!(matches!(cli.log_file, Some(None)));

        let cli = parse(&["joplin-replace", "--log-file=/tmp/x.log", "ping"]);
        assert_eq!(cli.log_file, Some(Some(PathBuf::from("/tmp/x.log"))));
    }

    #[test]
    fn test_overrides_win_over_file_config() {
        let cli = parse(&[
            "joplin-replace",
            "--token",
            "cli-token",
            "--port",
            "5555",
            "replace",
            "--case-sensitive",
            "--delay-ms",
            "0",
            "--notebook",
            "nb1",
            "a",
            "b",
        ]);

        let mut config = ReplacerConfig::default();
        config.connection.token = Some("file-token".into());
        apply_overrides(&mut config, &cli);

        assert_eq!(config.connection.token.as_deref(), Some("cli-token"));
        assert_eq!(config.connection.port, 5555);
        assert!(config.replace.case_sensitive);
        assert_eq!(config.replace.delay_ms, 0);
        assert_eq!(config.replace.notebook.as_deref(), Some("nb1"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
