//! dripfeed - Feed huge directory trees into a playlist a few files at a time.
//!
//! Usage:
//!   dripfeed [OPTIONS] <INPUTS>...
//!
//! The inputs are classified once. Directories are enumerated incrementally;
//! anything else is kept as a plain playlist entry. After the initial refill,
//! each line on standard input is a client message such as
//! `dripfeed append 20` or `dripfeed replace`, and the resulting playlist is
//! printed to standard output after every refill.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use color_eyre::eyre::{Context, Result, eyre};
use serde_json::json;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use dripfeed_core::{FeedConfig, Notification, Playlist, TraversalMode};
use dripfeed_scan::{EnumerationEngine, RefillReport, TraversalOrchestrator};

#[derive(Parser)]
#[command(
    name = "dripfeed",
    version,
    about = "Feed large directory trees into a playlist a bounded number of files at a time",
    long_about = "dripfeed enumerates directories incrementally and remembers where it \
                  stopped, so each refill continues instead of starting over.\n\n\
                  After the initial refill, send messages like `dripfeed append 20` on \
                  standard input to fetch more."
)]
struct Cli {
    /// Directories to enumerate, or plain entries to pass through
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Configuration file (defaults to <config dir>/dripfeed/<name>.conf)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Client name that messages must be addressed to
    #[arg(short, long, default_value = "dripfeed")]
    name: String,

    /// Files fetched per refill when a message gives no budget
    #[arg(short, long)]
    limit: Option<u64>,

    /// Do not descend into subdirectories
    #[arg(long)]
    no_recurse: bool,

    /// File extensions never added (comma-separated)
    #[arg(short = 'x', long, value_delimiter = ',')]
    exclude: Vec<String>,

    /// Script option in the form <name>-<key>=<value> (repeatable)
    #[arg(short = 'o', long = "script-opt")]
    script_opts: Vec<String>,

    /// Output format
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    /// Log cursor movement and refill details to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(&cli)?;
    debug!(?config, "Effective configuration");

    let engine = EnumerationEngine::new(&config);
    let mut orchestrator = TraversalOrchestrator::from_inputs(engine, cli.inputs.iter().cloned());

    if !orchestrator.is_active() {
        debug!("No directory inputs, passing entries through");
        let mut out = io::stdout().lock();
        for entry in orchestrator.entries() {
            writeln!(out, "{}", entry.path().display())?;
        }
        return Ok(());
    }

    let mut playlist = Playlist::new();
    let mut notifier = |total: u64, mode: TraversalMode| {
        eprintln!("{}", Notification::new(total, mode));
    };

    let report = orchestrator
        .refill(config.limit, TraversalMode::Replace, &mut playlist, &mut notifier)
        .context("Initial refill failed")?;
    print_refill(&playlist, &report, cli.format)?;

    for line in io::stdin().lock().lines() {
        let line = line.context("Failed to read message")?;
        let args: Vec<&str> = line.split_whitespace().collect();
        if args.is_empty() {
            continue;
        }

        match orchestrator.handle_message(&args, &cli.name, config.limit, &mut playlist, &mut notifier) {
            Some(Ok(report)) => print_refill(&playlist, &report, cli.format)?,
            Some(Err(err)) => {
                error!(error = %err, "Refill failed");
                eprintln!("Refill failed: {err}");
            }
            None => debug!(message = %line, "Ignoring message for another client"),
        }
    }

    Ok(())
}

/// Send logs to stderr so stdout stays the playlist.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Layer the configuration: file, then script options, then dedicated flags.
fn load_config(cli: &Cli) -> Result<FeedConfig> {
    let mut config = match &cli.config {
        Some(path) => FeedConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => match FeedConfig::default_path(&cli.name) {
            Some(path) => FeedConfig::load_or_default(&path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
            None => FeedConfig::default(),
        },
    };

    let opts = cli
        .script_opts
        .iter()
        .map(|opt| {
            opt.split_once('=')
                .ok_or_else(|| eyre!("Script option {opt:?} is not of the form key=value"))
        })
        .collect::<Result<Vec<_>>>()?;
    let applied = config.apply_script_opts(&cli.name, opts);
    debug!(applied, "Applied script options");

    if let Some(limit) = cli.limit {
        config.limit = limit;
    }
    if cli.no_recurse {
        config.recurse = false;
    }
    if !cli.exclude.is_empty() {
        config.exclude = cli.exclude.clone();
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Print the playlist after a refill.
fn print_refill(playlist: &Playlist, report: &RefillReport, format: OutputFormat) -> Result<()> {
    debug!(
        added = report.total_added,
        files_per_second = report.files_per_second(),
        "Refill finished"
    );

    match format {
        OutputFormat::Text => {
            let mut out = io::stdout().lock();
            for entry in playlist.entries() {
                writeln!(out, "{}", entry.display())?;
            }
            writeln!(out)?;
            out.flush()?;

            let warnings = report.warnings().count();
            if warnings > 0 {
                eprintln!("{warnings} warning(s) during refill");
            }
        }
        OutputFormat::Json => {
            let notification = report.notification();
            let snapshot = json!({
                "report": report,
                "files_per_second": report.files_per_second(),
                "notification": {
                    "message": notification.to_string(),
                    "duration_ms": Notification::DISPLAY_DURATION.as_millis() as u64,
                },
                "playlist": playlist.entries(),
            });
            let mut out = io::stdout().lock();
            writeln!(out, "{}", serde_json::to_string(&snapshot)?)?;
            out.flush()?;
        }
    }

    Ok(())
}
