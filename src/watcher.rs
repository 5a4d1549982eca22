//! Rebuild watcher for test executables.
//!
//! [`ExecutableWatcher`] uses the `notify` crate to watch the directories
//! holding the configured executables and sends the path of an executable
//! whenever it is created, rewritten or removed, so the collaborator can
//! re-run discovery after a rebuild.
//!
//! Signals are sent with `try_send`; when the receiver lags, surplus
//! signals for a burst of writes are dropped rather than queued.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{AppError, Result};

/// Returns `true` for events that indicate a file was written or replaced.
fn is_rebuild(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Canonical parent joined with the file name, so removed files still
/// compare equal to their watched path.
fn normalize(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?;
    let parent = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    Some(parent.canonicalize().ok()?.join(name))
}

/// Emits a reload signal when a watched executable changes on disk.
///
/// Dropping the watcher stops the underlying OS watch.
pub struct ExecutableWatcher {
    _watcher: RecommendedWatcher,
    watched: Vec<PathBuf>,
}

impl ExecutableWatcher {
    /// Watch `executables`, sending the changed executable's path on `tx`.
    ///
    /// # Errors
    ///
    /// - `AppError::Config` when an executable path cannot be resolved.
    /// - `AppError::Watch` when the OS watch cannot be created.
    pub fn new(executables: &[PathBuf], tx: mpsc::Sender<PathBuf>) -> Result<Self> {
        let mut watched = Vec::with_capacity(executables.len());
        for exe in executables {
            let path = normalize(exe).ok_or_else(|| {
                AppError::Config(format!("cannot resolve executable {}", exe.display()))
            })?;
            watched.push(path);
        }

        let targets = watched.clone();
        let mut watcher = notify::recommended_watcher(
            move |result: std::result::Result<Event, notify::Error>| match result {
                Ok(event) if is_rebuild(&event) => {
                    for path in event.paths.iter().filter_map(|p| normalize(p)) {
                        if !targets.contains(&path) {
                            continue;
                        }
                        debug!(path = %path.display(), kind = ?event.kind, "executable changed");
                        if tx.try_send(path).is_err() {
                            debug!("reload signal dropped, receiver busy or closed");
                        }
                    }
                }
                Err(err) => warn!(%err, "executable watcher error"),
                _ => {}
            },
        )?;

        let dirs: BTreeSet<&Path> = watched.iter().filter_map(|p| p.parent()).collect();
        for dir in dirs {
            watcher.watch(dir, RecursiveMode::NonRecursive).map_err(|err| {
                AppError::Watch(format!("failed to watch '{}': {err}", dir.display()))
            })?;
        }

        info!(executables = watched.len(), "executable watcher started");
        Ok(Self {
            _watcher: watcher,
            watched,
        })
    }

    /// Canonical paths of the watched executables.
    #[must_use]
    pub fn watched(&self) -> &[PathBuf] {
        &self.watched
    }
}
