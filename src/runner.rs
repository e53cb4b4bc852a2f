//! Mode orchestration: continuous watch, one-shot backfill, status.
//!
//! Wiring is channel-shaped: watcher and rescan produce path
//! notifications, the debouncer coalesces them, the single worker
//! consumes them. Backfill bypasses the channels and drives the pipeline
//! directly over a one-shot scan snapshot.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use crate::config::Config;
use crate::debounce::DebounceCoalescer;
use crate::extract::FileExtractor;
use crate::models::SOURCE_TYPE_FILE;
use crate::normalizer::HttpNormalizer;
use crate::pipeline::{IngestPipeline, Outcome};
use crate::progress::{ProgressEvent, ProgressMode};
use crate::render::MarkdownRenderer;
use crate::scanner::{scan_paths, ExcludeRules};
use crate::store::MetadataStore;
use crate::watcher::{start_periodic_rescan, ChangeWatcher};
use crate::worker::Worker;

/// Two-stage cooperative interrupt for backfill: the first request lets
/// the in-flight item finish, the second is handled by the signal
/// listener as immediate termination.
#[derive(Clone, Default)]
pub struct StopFlag {
    state: Arc<AtomicU8>,
}

const STOP_NONE: u8 = 0;
const STOP_SOFT: u8 = 1;

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if this was the first stop request.
    pub fn request_stop(&self) -> bool {
        self.state
            .compare_exchange(STOP_NONE, STOP_SOFT, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn stop_requested(&self) -> bool {
        self.state.load(Ordering::SeqCst) != STOP_NONE
    }
}

async fn open_pipeline(config: &Config) -> Result<Arc<IngestPipeline>> {
    let store = Arc::new(
        MetadataStore::open(&config.data_lake.db_path(), config.store.log_events).await?,
    );
    let normalizer = Arc::new(HttpNormalizer::new(&config.normalizer)?);
    let renderer = match &config.vault.template {
        Some(path) => Arc::new(MarkdownRenderer::with_template_file(path)?),
        None => Arc::new(MarkdownRenderer::new()),
    };
    let pipeline = IngestPipeline::new(
        config.clone(),
        store,
        Arc::new(FileExtractor),
        normalizer,
        renderer,
    )?;
    Ok(Arc::new(pipeline))
}

/// Continuous watch mode: runs until Ctrl-C, then shuts down in order —
/// watcher first, rescan, debouncer (dropping pending), worker (bounded
/// grace for the in-flight item), store last.
pub async fn run_watch(config: Config) -> Result<()> {
    let pipeline = open_pipeline(&config).await?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let worker = Worker::start(Arc::clone(&pipeline), shutdown_rx.clone());
    let worker_tx = worker.sender();
    let debouncer = DebounceCoalescer::start(
        Duration::from_millis(config.watch.debounce_ms),
        shutdown_rx.clone(),
        move |path| {
            let _ = worker_tx.send(path);
        },
    );

    let watch_handle = debouncer.handle();
    let watcher = ChangeWatcher::start(&config.watch.paths, config.watch.recursive, move |path| {
        watch_handle.submit(path);
    })?;

    let rules = ExcludeRules::new(&config.watch.exclude_dirs, &config.watch.exclude_globs)?;
    let rescan_handle = debouncer.handle();
    let rescan = start_periodic_rescan(
        config.watch.paths.clone(),
        config.watch.recursive,
        rules,
        Duration::from_secs(config.watch.scan_interval_secs),
        shutdown_rx,
        move |path| {
            rescan_handle.submit(path);
        },
    );

    info!(
        roots = config.watch.paths.len(),
        "watching for changes, Ctrl-C to stop"
    );
    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    let _ = shutdown_tx.send(true);
    drop(watcher);
    let _ = tokio::time::timeout(Duration::from_secs(2), rescan).await;
    debouncer.stop().await;

    // The in-flight item may be blocked on the normalizer; allow the
    // full timeout-and-retry window before aborting.
    let grace = Duration::from_secs(
        config.normalizer.timeout_secs * (config.normalizer.max_retries as u64 + 1) + 5,
    );
    worker.stop(grace).await;

    pipeline.store().close().await;
    info!("stopped");
    Ok(())
}

/// Counts reported after a backfill run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BackfillSummary {
    pub scanned: u64,
    pub processed: u64,
    pub deduplicated: u64,
    pub unchanged: u64,
    pub skipped: u64,
    pub failed: u64,
    pub interrupted: bool,
}

/// One-shot scan and ingest. `force` reprocesses unchanged content.
pub async fn run_backfill(config: Config, force: bool, progress: ProgressMode) -> Result<()> {
    let pipeline = open_pipeline(&config).await?;

    let stop = StopFlag::new();
    let signal_stop = stop.clone();
    tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            if signal_stop.request_stop() {
                eprintln!("stop requested, finishing the current file...");
            } else {
                eprintln!("terminating now");
                std::process::exit(1);
            }
        }
    });

    let reporter = progress.reporter();
    reporter.report(ProgressEvent::Scanning);
    let rules = ExcludeRules::new(&config.watch.exclude_dirs, &config.watch.exclude_globs)?;
    let paths = scan_paths(&config.watch.paths, config.watch.recursive, &rules);

    let summary = backfill_paths(&pipeline, &paths, force, &stop, |n, total| {
        reporter.report(ProgressEvent::Processing { n, total });
    })
    .await;

    println!("backfill");
    println!("  scanned: {} files", summary.scanned);
    println!("  processed: {}", summary.processed);
    println!("  deduplicated: {}", summary.deduplicated);
    println!("  unchanged: {}", summary.unchanged);
    println!("  skipped: {}", summary.skipped);
    println!("  failed: {}", summary.failed);
    if summary.interrupted {
        println!("interrupted");
    } else {
        println!("ok");
    }
    Ok(())
}

/// Drive the pipeline over `paths`, isolating per-path failures and
/// honoring the stop flag between items.
pub async fn backfill_paths(
    pipeline: &IngestPipeline,
    paths: &[std::path::PathBuf],
    force: bool,
    stop: &StopFlag,
    mut on_progress: impl FnMut(u64, u64),
) -> BackfillSummary {
    let total = paths.len() as u64;
    let mut summary = BackfillSummary {
        scanned: total,
        ..BackfillSummary::default()
    };

    for (i, path) in paths.iter().enumerate() {
        if stop.stop_requested() {
            summary.interrupted = true;
            break;
        }
        on_progress(i as u64 + 1, total);

        match pipeline.process(path, force).await {
            Ok(Outcome::Processed { .. }) => summary.processed += 1,
            Ok(Outcome::Deduplicated { .. }) => summary.deduplicated += 1,
            Ok(Outcome::Unchanged { .. }) => summary.unchanged += 1,
            Ok(Outcome::Skipped(_)) => summary.skipped += 1,
            Err(error) => {
                summary.failed += 1;
                warn!(path = %path.display(), %error, "backfill item failed");
                let mut details = BTreeMap::new();
                details.insert("path".to_string(), path.to_string_lossy().to_string());
                details.insert("error".to_string(), error.to_string());
                if let Err(log_error) = pipeline.store().log_event("file_failed", &details).await {
                    warn!(%log_error, "failed to record file_failed event");
                }
            }
        }
    }

    summary
}

/// Print the processed-source count.
pub async fn run_status(config: Config) -> Result<()> {
    let store =
        MetadataStore::open(&config.data_lake.db_path(), config.store.log_events).await?;
    let count = store.count(Some(SOURCE_TYPE_FILE)).await?;
    store.close().await;
    println!("sources(file)={count}");
    Ok(())
}

/// Print the resolved configuration.
pub fn print_config(config: &Config) {
    let watch_paths: Vec<String> = config
        .watch
        .paths
        .iter()
        .map(|p| p.display().to_string())
        .collect();

    println!("{:<24} {}", "vault path", config.vault.path.display());
    println!("{:<24} {}", "notes subdir", config.vault.notes_subdir);
    println!("{:<24} {}", "data lake path", config.data_lake.path.display());
    println!("{:<24} {}", "db path", config.data_lake.db_path().display());
    println!("{:<24} {}", "watch paths", watch_paths.join(", "));
    println!("{:<24} {}", "recursive", config.watch.recursive);
    println!(
        "{:<24} {}",
        "exclude dirs",
        config.watch.exclude_dirs.join(", ")
    );
    println!(
        "{:<24} {}",
        "exclude globs",
        config.watch.exclude_globs.join(", ")
    );
    println!(
        "{:<24} {}",
        "scan interval (s)", config.watch.scan_interval_secs
    );
    println!("{:<24} {}", "debounce (ms)", config.watch.debounce_ms);
    println!("{:<24} {}", "max file (MB)", config.limits.max_file_mb);
    println!("{:<24} {}", "normalizer url", config.normalizer.base_url);
    println!("{:<24} {}", "normalizer model", config.normalizer.model);
    println!("{:<24} {}", "language", config.normalizer.language);
    println!("{:<24} {}", "event log", config.store.log_events);
}
