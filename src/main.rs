//! # Inklake CLI (`ink`)
//!
//! The `ink` binary drives the ingestion engine. All commands accept a
//! `--config` flag pointing to a TOML configuration file.
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ink run` | Watch the configured roots and ingest continuously |
//! | `ink backfill [--force]` | One-shot scan and ingest |
//! | `ink reprocess` | Backfill with forced reprocessing |
//! | `ink status` | Print the processed-source count |
//! | `ink config` | Print the resolved configuration |

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use inklake::config;
use inklake::progress::ProgressMode;
use inklake::runner;

/// Inklake — a local-first file-to-vault ingestion daemon.
///
/// Watches directories for documents, deduplicates them by extracted-text
/// content, normalizes the text through an OpenAI-compatible endpoint,
/// and writes markdown notes into a vault.
#[derive(Parser)]
#[command(
    name = "ink",
    about = "Inklake — ingest local files into a markdown note vault",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ink.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Watch the configured roots and ingest continuously.
    ///
    /// Runs the filesystem watcher, the periodic rescan backstop, the
    /// debounce stage, and the single processing worker until Ctrl-C.
    Run,

    /// One-shot scan and ingest of everything under the watch roots.
    ///
    /// Already-ingested unchanged files are skipped. Press Ctrl-C once to
    /// stop after the current file, twice to terminate immediately.
    Backfill {
        /// Reprocess files even when their content is unchanged.
        #[arg(long)]
        force: bool,

        /// Progress output on stderr. Defaults to human when stderr is a
        /// TTY, off otherwise.
        #[arg(long, value_enum)]
        progress: Option<ProgressArg>,
    },

    /// Backfill with forced reprocessing of every matched file.
    Reprocess,

    /// Print the processed-source count.
    Status,

    /// Print the resolved configuration.
    Config,
}

/// Progress output selection for backfill.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Run => {
            runner::run_watch(cfg).await?;
        }
        Commands::Backfill { force, progress } => {
            let mode = progress
                .map(ProgressMode::from)
                .unwrap_or_else(ProgressMode::default_for_tty);
            runner::run_backfill(cfg, force, mode).await?;
        }
        Commands::Reprocess => {
            runner::run_backfill(cfg, true, ProgressMode::default_for_tty()).await?;
        }
        Commands::Status => {
            runner::run_status(cfg).await?;
        }
        Commands::Config => {
            runner::print_config(&cfg);
        }
    }

    Ok(())
}
