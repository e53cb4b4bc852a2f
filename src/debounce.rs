//! Change-notification debouncing.
//!
//! Bursts of notifications for the same path (editors write, fsync,
//! rename, rewrite metadata) collapse into a single downstream trigger
//! once the path has been quiet for the debounce window. The window is
//! timed from the *last* submission, not the first.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Cheap-to-clone submit side, safe to call from non-runtime threads
/// (the filesystem watcher callback lands here).
#[derive(Clone)]
pub struct DebounceHandle {
    pending: Arc<Mutex<HashMap<PathBuf, Instant>>>,
}

impl DebounceHandle {
    /// Record activity for `path` now, resetting any pending timer.
    pub fn submit(&self, path: PathBuf) {
        let mut pending = self.pending.lock().expect("debounce lock poisoned");
        pending.insert(path, Instant::now());
    }
}

pub struct DebounceCoalescer {
    handle: DebounceHandle,
    task: JoinHandle<()>,
}

impl DebounceCoalescer {
    /// Spawn the poll loop. Entries older than `window` are removed and
    /// forwarded to `on_ready` exactly once. Polling granularity adapts
    /// to the window so short test windows stay responsive, capped at
    /// 500 ms.
    pub fn start(
        window: Duration,
        mut shutdown: watch::Receiver<bool>,
        on_ready: impl Fn(PathBuf) + Send + 'static,
    ) -> Self {
        let pending: Arc<Mutex<HashMap<PathBuf, Instant>>> = Arc::default();
        let handle = DebounceHandle {
            pending: Arc::clone(&pending),
        };

        let poll = (window / 4).clamp(Duration::from_millis(10), Duration::from_millis(500));
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(poll) => {}
                    _ = shutdown.changed() => break,
                }

                let now = Instant::now();
                let ready: Vec<PathBuf> = {
                    let mut pending = pending.lock().expect("debounce lock poisoned");
                    let ready: Vec<PathBuf> = pending
                        .iter()
                        .filter(|(_, ts)| now.duration_since(**ts) >= window)
                        .map(|(path, _)| path.clone())
                        .collect();
                    for path in &ready {
                        pending.remove(path);
                    }
                    ready
                };

                for path in ready {
                    on_ready(path);
                }
            }
            // Pending entries are dropped, not flushed: the periodic
            // rescan re-surfaces anything still on disk.
            debug!("debounce loop stopped");
        });

        Self { handle, task }
    }

    pub fn handle(&self) -> DebounceHandle {
        self.handle.clone()
    }

    pub fn submit(&self, path: PathBuf) {
        self.handle.submit(path);
    }

    /// Wait for the poll loop to exit. The shutdown signal must already
    /// be set.
    pub async fn stop(self) {
        let _ = tokio::time::timeout(Duration::from_secs(2), self.task).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn repeated_submits_fire_once() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let debouncer = DebounceCoalescer::start(Duration::from_millis(80), shutdown_rx, {
            move |path| {
                let _ = tx.send(path);
            }
        });

        let path = PathBuf::from("/tmp/burst.txt");
        for _ in 0..5 {
            debouncer.submit(path.clone());
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let fired = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("debounce never fired")
            .unwrap();
        assert_eq!(fired, path);

        // Nothing further pending.
        assert!(
            tokio::time::timeout(Duration::from_millis(300), rx.recv())
                .await
                .is_err()
        );

        shutdown_tx.send(true).unwrap();
        debouncer.stop().await;
    }

    #[tokio::test]
    async fn window_is_timed_from_last_submission() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let window = Duration::from_millis(100);
        let debouncer = DebounceCoalescer::start(window, shutdown_rx, move |path| {
            let _ = tx.send((path, Instant::now()));
        });

        debouncer.submit(PathBuf::from("/tmp/a.txt"));
        tokio::time::sleep(Duration::from_millis(60)).await;
        let last = Instant::now();
        debouncer.submit(PathBuf::from("/tmp/a.txt"));

        let (_, fired_at) = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("debounce never fired")
            .unwrap();
        assert!(fired_at.duration_since(last) >= window);

        shutdown_tx.send(true).unwrap();
        debouncer.stop().await;
    }

    #[tokio::test]
    async fn distinct_paths_fire_independently() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        let debouncer =
            DebounceCoalescer::start(Duration::from_millis(40), shutdown_rx, move |_| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            });

        debouncer.submit(PathBuf::from("/tmp/a.txt"));
        debouncer.submit(PathBuf::from("/tmp/b.txt"));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        shutdown_tx.send(true).unwrap();
        debouncer.stop().await;
    }

    #[tokio::test]
    async fn stop_drops_pending_entries() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        let debouncer =
            DebounceCoalescer::start(Duration::from_secs(60), shutdown_rx, move |_| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            });

        debouncer.submit(PathBuf::from("/tmp/a.txt"));
        shutdown_tx.send(true).unwrap();
        debouncer.stop().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
