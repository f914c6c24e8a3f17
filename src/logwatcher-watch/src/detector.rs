//! Change Detector — OS-native file-change notifications, one watcher per
//! parent directory of the monitored files.
//!
//! Watching the parent directory rather than the file itself is deliberate:
//! inotify watches are bound to an inode, and a `rename()`-based log
//! rotation (the common case on Linux) replaces the inode out from under a
//! file-level watch. Watching the directory survives rotation because the
//! directory's own inode never changes.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, warn};

use crate::error::WatchError;

/// Minimum backoff after a backend failure, per the detector's
/// never-terminate-on-error contract.
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// A notification that some monitored file may have new bytes. May be
/// delivered more than once per underlying write; coalescing is the
/// Tailer's job.
#[derive(Debug, Clone)]
pub struct FileChanged(pub PathBuf);

/// Runs the platform watcher backend for a fixed set of monitored files,
/// forwarding coalesced-but-possibly-duplicate [`FileChanged`] events until
/// shutdown is signalled. Never terminates on backend error; it logs,
/// backs off, and rebuilds the watcher instead.
pub struct ChangeDetector {
    errors: Arc<AtomicU64>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self {
            errors: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of backend errors observed since startup.
    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Run the detector loop until `shutdown` fires. `paths` is the fixed
    /// set of files to watch; their parent directories are deduplicated
    /// before registering watches.
    pub async fn run(
        &self,
        paths: Vec<PathBuf>,
        tx: mpsc::UnboundedSender<FileChanged>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            match build_watcher(&paths, tx.clone()) {
                Ok(_watcher) => {
                    // The watcher's background thread drives delivery; this
                    // task just needs to keep it alive until shutdown.
                    let _ = shutdown.recv().await;
                    debug!("change detector shutting down");
                    return;
                }
                Err(err) => {
                    self.errors.fetch_add(1, Ordering::Relaxed);
                    error!(error = %err, "change detector backend error, retrying");
                    tokio::select! {
                        _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                        _ = shutdown.recv() => return,
                    }
                }
            }
        }
    }
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn build_watcher(
    paths: &[PathBuf],
    tx: mpsc::UnboundedSender<FileChanged>,
) -> Result<RecommendedWatcher, WatchError> {
    let watched: HashSet<PathBuf> = paths.iter().map(|p| p.clone()).collect();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(event) => {
                if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    return;
                }
                for path in &event.paths {
                    if watched.contains(path) {
                        let _ = tx.send(FileChanged(path.clone()));
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "file watcher backend reported an error");
            }
        }
    })?;

    let mut parents: HashSet<PathBuf> = HashSet::new();
    for path in paths {
        let parent = parent_dir(path);
        if parents.insert(parent.clone()) {
            watcher.watch(&parent, RecursiveMode::NonRecursive)?;
        }
    }

    Ok(watcher)
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_else(|| path.to_path_buf())
}
