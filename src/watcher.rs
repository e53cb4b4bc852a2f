//! Filesystem change subscription and the periodic rescan backstop.
//!
//! The watcher is best-effort: platform backends drop events during
//! startup races and under load. The periodic rescan re-walks every root
//! and re-submits every path it finds; downstream dedup makes the
//! redundancy free, so missed events only delay ingestion until the next
//! scan tick.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::scanner::{scan_paths, ExcludeRules};

/// Owns the native watcher subscription. Dropping it stops delivery.
pub struct ChangeWatcher {
    _watcher: RecommendedWatcher,
}

impl ChangeWatcher {
    /// Subscribe to create/modify/move events under `roots`. Paths that
    /// are files at event time are forwarded to `on_change`; directory
    /// events and removals are dropped. Roots that do not exist are
    /// skipped.
    pub fn start(
        roots: &[PathBuf],
        recursive: bool,
        on_change: impl Fn(PathBuf) + Send + 'static,
    ) -> Result<Self> {
        let mut watcher =
            notify::recommended_watcher(move |result: Result<Event, notify::Error>| {
                let event = match result {
                    Ok(event) => event,
                    Err(error) => {
                        warn!(%error, "filesystem watch error");
                        return;
                    }
                };
                match event.kind {
                    EventKind::Create(_) | EventKind::Modify(_) => {
                        // A rename carries [from, to]; the stale side no
                        // longer exists and fails the file check.
                        for path in event.paths {
                            if path.is_file() {
                                on_change(path);
                            }
                        }
                    }
                    _ => {}
                }
            })?;

        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        for root in roots {
            if !root.exists() {
                debug!(root = %root.display(), "watch root missing, skipped");
                continue;
            }
            watcher.watch(root, mode)?;
        }

        Ok(Self { _watcher: watcher })
    }
}

/// Spawn the rescan loop: walk all roots immediately and then every
/// `interval`, submitting every discovered path. Exits promptly on the
/// shutdown signal.
pub fn start_periodic_rescan(
    roots: Vec<PathBuf>,
    recursive: bool,
    rules: ExcludeRules,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
    on_path: impl Fn(PathBuf) + Send + 'static,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let found = scan_paths(&roots, recursive, &rules);
            debug!(count = found.len(), "rescan pass");
            for path in found {
                on_path(path);
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => break,
            }
        }
        debug!("rescan loop stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn rescan_submits_discovered_paths_each_tick() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "x").unwrap();
        fs::write(tmp.path().join("b.txt"), "x").unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        let handle = start_periodic_rescan(
            vec![tmp.path().to_path_buf()],
            true,
            ExcludeRules::new(&[], &[]).unwrap(),
            Duration::from_millis(50),
            shutdown_rx,
            move |_| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            },
        );

        tokio::time::sleep(Duration::from_millis(180)).await;
        shutdown_tx.send(true).unwrap();
        let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;

        // At least the immediate pass plus one tick, two paths each.
        assert!(count.load(Ordering::SeqCst) >= 4);
    }

    #[tokio::test]
    async fn rescan_stops_promptly_mid_sleep() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = start_periodic_rescan(
            vec![PathBuf::from("/nonexistent")],
            true,
            ExcludeRules::new(&[], &[]).unwrap(),
            Duration::from_secs(3600),
            shutdown_rx,
            |_| {},
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();
        assert!(tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn watcher_forwards_created_files() {
        let tmp = TempDir::new().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _watcher = ChangeWatcher::start(&[tmp.path().to_path_buf()], true, move |path| {
            let _ = tx.send(path);
        })
        .unwrap();

        // Give the backend a moment to establish the subscription.
        tokio::time::sleep(Duration::from_millis(200)).await;
        fs::write(tmp.path().join("new.txt"), "hello").unwrap();

        let forwarded = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no watch event received")
            .unwrap();
        assert!(forwarded.ends_with("new.txt"));
    }

    #[tokio::test]
    async fn missing_watch_root_is_not_an_error() {
        let result = ChangeWatcher::start(&[PathBuf::from("/definitely/not/here")], true, |_| {});
        assert!(result.is_ok());
    }
}
