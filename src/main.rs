//! # Trawl CLI
//!
//! The `trawl` binary scans file trees into a search engine. It walks a
//! directory, classifies every file by extension and content, extracts text
//! and metadata through type-specific decoders, and bulk-writes normalized
//! document records to the configured sink.
//!
//! ## Usage
//!
//! ```bash
//! trawl --config ./trawl.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `trawl scan <root>` | Index a directory tree (incremental by default) |
//! | `trawl status` | Query the sink's version and supported features |
//! | `trawl forget <root>` | Drop the incremental snapshot for a root |
//!
//! ## Examples
//!
//! ```bash
//! # First scan: everything is parsed
//! trawl scan ~/Documents
//!
//! # Re-scan: unchanged files are skipped, deletions are propagated
//! trawl scan ~/Documents
//!
//! # Re-parse everything regardless of the snapshot
//! trawl scan ~/Documents --full
//!
//! # Classify by extension only, never sniff content
//! trawl scan ~/Documents --fast
//!
//! # Write to a JSONL file instead of a search engine
//! trawl scan ~/Documents --config jsonl.toml
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use trawl::config::{self, SinkKind};
use trawl::decode::DecoderSet;
use trawl::progress::ProgressMode;
use trawl::scan::{run_scan, snapshot_path};
use trawl::sink::{EsSink, JsonlSink, Sink};

/// Trawl — a parallel file-system content indexer.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file; a missing file falls back to the built-in defaults.
#[derive(Parser)]
#[command(
    name = "trawl",
    about = "Trawl — a parallel file-system content indexer with incremental re-scans",
    version,
    long_about = "Trawl walks a directory tree (including the contents of nested archives), \
    classifies each file's type by extension and content sniffing, extracts text and metadata \
    through type-specific decoders, and bulk-writes normalized document records to an \
    Elasticsearch-compatible search engine or a JSONL file."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./trawl.toml`. Scan behavior (threads, checksums,
    /// text-extraction budget, archive handling) and the sink are read from
    /// this file.
    #[arg(long, global = true, default_value = "./trawl.toml")]
    config: PathBuf,

    /// Enable debug logging.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Index a directory tree.
    ///
    /// Walks the root, parses every regular file, and emits one document per
    /// file to the configured sink. Re-scans are incremental: files whose
    /// modification time is unchanged since the previous scan are skipped,
    /// and files deleted since then are removed from the sink.
    Scan {
        /// Directory to scan.
        root: PathBuf,

        /// Ignore the previous snapshot — re-parse every file.
        #[arg(long)]
        full: bool,

        /// Classify by extension only; skip content sniffing.
        #[arg(long)]
        fast: bool,

        /// Progress output: `auto`, `human`, `json`, or `off`.
        #[arg(long, default_value = "auto")]
        progress: String,
    },

    /// Query the sink's version and supported features.
    ///
    /// Connects to the configured search engine, prints its version, and
    /// reports whether legacy mapping mode or nearest-neighbor indexing
    /// applies. Fails when the version is outside the supported window.
    Status,

    /// Drop the incremental snapshot for a root.
    ///
    /// The next scan of that root parses everything from scratch, as if it
    /// had never been scanned. No documents are deleted from the sink.
    Forget {
        /// Directory whose snapshot should be dropped.
        root: PathBuf,
    },
}

fn progress_mode(arg: &str) -> Result<ProgressMode> {
    match arg {
        "auto" => Ok(ProgressMode::default_for_tty()),
        "human" => Ok(ProgressMode::Human),
        "json" => Ok(ProgressMode::Json),
        "off" => Ok(ProgressMode::Off),
        other => anyhow::bail!("Unknown progress mode: {}", other),
    }
}

fn run_scan_command(
    cfg: &config::Config,
    root: &PathBuf,
    full: bool,
    mode: ProgressMode,
) -> Result<()> {
    let reporter = mode.reporter();
    let decoders = DecoderSet::new();

    let report = match cfg.sink.kind {
        SinkKind::Elasticsearch => {
            let sink = EsSink::connect(&cfg.sink)?;
            tracing::info!(version = %sink.version(), "connected to search engine");
            let (report, mut sink) = run_scan(cfg, root, full, decoders, &*reporter, sink)?;
            sink.flush()?;
            report
        }
        SinkKind::Jsonl => {
            let sink = JsonlSink::create(&cfg.sink.output)?;
            let (report, mut sink) = run_scan(cfg, root, full, decoders, &*reporter, sink)?;
            sink.flush()?;
            report
        }
    };

    println!(
        "Scan finished at {}: {} discovered, {} parsed, {} skipped, {} failed, {} deleted",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        report.discovered,
        report.parsed,
        report.skipped,
        report.failed,
        report.deleted
    );
    if report.walk_errors > 0 {
        println!("{} walk errors (see log)", report.walk_errors);
    }
    Ok(())
}

fn run_status(cfg: &config::Config) -> Result<()> {
    match cfg.sink.kind {
        SinkKind::Elasticsearch => {
            let sink = EsSink::connect(&cfg.sink)?;
            let version = sink.version();
            println!("Search engine {} at {}", version, cfg.sink.url);
            println!(
                "  mapping mode:      {}",
                if version.legacy() { "legacy" } else { "current" }
            );
            println!(
                "  nearest-neighbor:  {}",
                if version.has_knn() {
                    "available"
                } else {
                    "unavailable"
                }
            );
        }
        SinkKind::Jsonl => {
            println!("JSONL sink writing to {}", cfg.sink.output.display());
        }
    }
    Ok(())
}

fn run_forget(cfg: &config::Config, root: &PathBuf) -> Result<()> {
    let root = root.canonicalize()?;
    let snapshot = snapshot_path(cfg, &root);
    if snapshot.exists() {
        std::fs::remove_file(&snapshot)?;
        println!("Snapshot dropped for {}", root.display());
    } else {
        println!("No snapshot recorded for {}", root.display());
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new(if cli.verbose { "debug" } else { "info" })
        });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Scan {
            root,
            full,
            fast,
            progress,
        } => {
            if fast {
                cfg.scan.fast = true;
            }
            let mode = progress_mode(&progress)?;
            run_scan_command(&cfg, &root, full, mode)?;
        }
        Commands::Status => {
            run_status(&cfg)?;
        }
        Commands::Forget { root } => {
            run_forget(&cfg, &root)?;
        }
    }

    Ok(())
}
