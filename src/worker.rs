//! Single-consumer processing queue.
//!
//! One worker pulls paths off a FIFO queue and runs the pipeline on each,
//! so at most one pipeline run is in flight: the normalization service
//! sees bounded load and no two runs race on the same note file. The
//! queue is unbounded by choice. Volume is human-scale file activity,
//! duplicates are absorbed by dedup, and a bounded queue would block the
//! watcher callback.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::pipeline::IngestPipeline;

pub struct Worker {
    tx: mpsc::UnboundedSender<PathBuf>,
    task: JoinHandle<()>,
}

impl Worker {
    pub fn start(pipeline: Arc<IngestPipeline>, mut shutdown: watch::Receiver<bool>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<PathBuf>();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    maybe_path = rx.recv() => {
                        let Some(path) = maybe_path else { break };
                        if *shutdown.borrow() {
                            break;
                        }
                        run_one(&pipeline, &path).await;
                    }
                }
            }
            // Remaining queued paths are abandoned on shutdown; the
            // rescan re-surfaces them on the next run.
            debug!("worker loop stopped");
        });

        Self { tx, task }
    }

    /// Queue sender for producers (debounce stage). Non-blocking.
    pub fn sender(&self) -> mpsc::UnboundedSender<PathBuf> {
        self.tx.clone()
    }

    pub fn submit(&self, path: PathBuf) {
        let _ = self.tx.send(path);
    }

    /// Let the in-flight item finish within `grace`, then abort.
    /// The shutdown signal must already be set.
    pub async fn stop(self, grace: Duration) {
        drop(self.tx);
        let mut task = self.task;
        if tokio::time::timeout(grace, &mut task).await.is_err() {
            warn!("worker did not stop within grace period, aborting");
            task.abort();
        }
    }
}

/// Run the pipeline for one path. Failures are logged as `file_failed`
/// events and swallowed — the worker never dies to a bad file.
async fn run_one(pipeline: &IngestPipeline, path: &Path) {
    match pipeline.process(path, false).await {
        Ok(outcome) => debug!(path = %path.display(), ?outcome, "pipeline finished"),
        Err(error) => {
            warn!(path = %path.display(), %error, "pipeline failed");
            let mut details = BTreeMap::new();
            details.insert("path".to_string(), path.to_string_lossy().to_string());
            details.insert("error".to_string(), error.to_string());
            if let Err(log_error) = pipeline.store().log_event("file_failed", &details).await {
                warn!(%log_error, "failed to record file_failed event");
            }
        }
    }
}
