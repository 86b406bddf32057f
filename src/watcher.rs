//! Folder watchers.
//!
//! One watcher per folder, one level deep, add-only: pre-existing files are
//! never replayed, and modifications only matter while an addition is still
//! settling. Write bursts are coalesced with a per-path stability window
//! (`debounce_ms`); an event is emitted only once the path has been quiet
//! for the whole window and still exists. Platforms with unreliable native
//! events can opt into the polling backend via `poll_interval_ms`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use globset::{Glob, GlobSet, GlobSetBuilder};
use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::FolderSpec;
use crate::error::SmartfolderError;

/// A settled file addition inside a watched folder.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub folder: PathBuf,
    pub path: PathBuf,
}

enum AnyWatcher {
    Native(RecommendedWatcher),
    Poll(PollWatcher),
}

impl AnyWatcher {
    fn watch(&mut self, path: &std::path::Path, mode: RecursiveMode) -> notify::Result<()> {
        match self {
            AnyWatcher::Native(w) => w.watch(path, mode),
            AnyWatcher::Poll(w) => w.watch(path, mode),
        }
    }
}

pub struct FolderWatcher {
    task: JoinHandle<()>,
}

impl FolderWatcher {
    /// Attach a watcher to `spec.path`. Returns once the underlying watch is
    /// established, so a successful return means "ready".
    pub fn spawn(
        spec: &FolderSpec,
        events: flume::Sender<WatchEvent>,
    ) -> Result<Self, SmartfolderError> {
        let ignore = build_globset(&spec.ignore_globs)?;
        let folder = spec.path.clone();
        // Some backends report canonicalized event paths; match against both.
        let watch_root = folder.canonicalize().unwrap_or_else(|_| folder.clone());
        let debounce = Duration::from_millis(spec.debounce_ms.max(1));

        let (notify_tx, notify_rx) = mpsc::channel::<Result<Event, notify::Error>>(256);

        let handler = move |res: Result<Event, notify::Error>| {
            let _ = notify_tx.blocking_send(res);
        };

        let mut watcher = match spec.poll_interval_ms {
            Some(interval) => AnyWatcher::Poll(
                PollWatcher::new(
                    handler,
                    Config::default().with_poll_interval(Duration::from_millis(interval.max(100))),
                )
                .map_err(|e| SmartfolderError::Watcher(e.to_string()))?,
            ),
            None => AnyWatcher::Native(
                RecommendedWatcher::new(handler, Config::default())
                    .map_err(|e| SmartfolderError::Watcher(e.to_string()))?,
            ),
        };

        watcher
            .watch(&folder, RecursiveMode::NonRecursive)
            .map_err(|e| SmartfolderError::Watcher(e.to_string()))?;

        tracing::info!(folder = %folder.display(), "watching folder");

        let task = tokio::spawn(event_loop(
            watcher, notify_rx, folder, watch_root, ignore, debounce, events,
        ));

        Ok(Self { task })
    }

    pub fn shutdown(self) {
        self.task.abort();
    }
}

async fn event_loop(
    _watcher: AnyWatcher,
    mut notify_rx: mpsc::Receiver<Result<Event, notify::Error>>,
    folder: PathBuf,
    watch_root: PathBuf,
    ignore: GlobSet,
    debounce: Duration,
    events: flume::Sender<WatchEvent>,
) {
    // Paths still inside their stability window.
    let mut pending: HashMap<PathBuf, tokio::time::Instant> = HashMap::new();

    loop {
        let next_deadline = pending.values().min().copied();

        tokio::select! {
            received = notify_rx.recv() => {
                let event = match received {
                    Some(Ok(event)) => event,
                    Some(Err(e)) => {
                        tracing::warn!(folder = %folder.display(), "watcher error: {}", e);
                        continue;
                    }
                    // Watcher callback dropped; nothing more will arrive.
                    None => break,
                };

                for path in &event.paths {
                    if !is_direct_child(&folder, path) && !is_direct_child(&watch_root, path) {
                        continue;
                    }
                    if is_ignored(&ignore, &watch_root, path) {
                        tracing::debug!(path = %path.display(), "ignored by glob");
                        continue;
                    }

                    match additions_view(&event.kind, path) {
                        Tracking::Begin => {
                            pending.insert(
                                path.clone(),
                                tokio::time::Instant::now() + debounce,
                            );
                        }
                        Tracking::Refresh => {
                            if pending.contains_key(path) {
                                pending.insert(
                                    path.clone(),
                                    tokio::time::Instant::now() + debounce,
                                );
                            }
                        }
                        Tracking::Cancel => {
                            pending.remove(path);
                        }
                        Tracking::None => {}
                    }
                }
            }
            _ = async {
                match next_deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            } => {
                let now = tokio::time::Instant::now();
                let ready: Vec<PathBuf> = pending
                    .iter()
                    .filter(|(_, deadline)| **deadline <= now)
                    .map(|(path, _)| path.clone())
                    .collect();

                for path in ready {
                    pending.remove(&path);
                    // The burst may have ended in a delete.
                    if tokio::fs::symlink_metadata(&path).await.is_err() {
                        tracing::debug!(path = %path.display(), "addition vanished before settling");
                        continue;
                    }
                    tracing::debug!(path = %path.display(), "addition settled");
                    if events
                        .send(WatchEvent {
                            folder: folder.clone(),
                            path,
                        })
                        .is_err()
                    {
                        return;
                    }
                }
            }
        }
    }
}

/// How an event kind affects the add-tracking of a path.
enum Tracking {
    /// A fresh addition: start (or restart) the stability window.
    Begin,
    /// Activity on a path: extend the window only if already tracking.
    Refresh,
    /// The path went away mid-burst.
    Cancel,
    None,
}

fn additions_view(kind: &EventKind, path: &std::path::Path) -> Tracking {
    match kind {
        EventKind::Create(_) => Tracking::Begin,
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::To => Tracking::Begin,
            RenameMode::From => Tracking::Cancel,
            // Direction unknown: trust the filesystem.
            _ => {
                if path.exists() {
                    Tracking::Begin
                } else {
                    Tracking::Cancel
                }
            }
        },
        EventKind::Modify(_) => Tracking::Refresh,
        EventKind::Remove(_) => Tracking::Cancel,
        _ => Tracking::None,
    }
}

fn is_direct_child(folder: &std::path::Path, path: &std::path::Path) -> bool {
    path.parent() == Some(folder)
}

fn is_ignored(ignore: &GlobSet, root: &std::path::Path, path: &std::path::Path) -> bool {
    // Watch depth is one level, so the relative form is just the file name.
    let rel: &std::path::Path = path
        .strip_prefix(root)
        .ok()
        .or_else(|| path.file_name().map(std::path::Path::new))
        .unwrap_or(path);
    ignore.is_match(rel) || ignore.is_match(path)
}

pub fn build_globset(patterns: &[String]) -> Result<GlobSet, SmartfolderError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| SmartfolderError::Watcher(format!("bad ignore glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| SmartfolderError::Watcher(format!("ignore globs failed to build: {}", e)))
}
