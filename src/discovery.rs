//! Poll-based discovery of `smartfolder.md` config files.
//!
//! Every tick the service walks its root directories looking for files named
//! `smartfolder.md` (case-insensitive), skipping symlinks at every level and
//! anything the ignore globs match. The found set is diffed against the
//! previous one: new paths fire `Added`, vanished paths fire `Removed`. Each
//! discovered file also gets its own native content watcher with a short
//! stability window, so prompt edits fire `Changed` without waiting for the
//! next tick. Files that fail the parsing contract are rejected and
//! remembered, and re-attempted only when their size or mtime moves.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use globset::GlobSet;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{validate_prompt, CONFIG_FILE_MAX_BYTES};
use crate::error::{Result, SmartfolderError};
use crate::sandbox::normalize;

pub const CONFIG_FILE_NAME: &str = "smartfolder.md";

/// Stability window for per-file content watchers.
const FILE_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    Added {
        config_path: PathBuf,
        folder: PathBuf,
        prompt: String,
    },
    Changed {
        config_path: PathBuf,
        folder: PathBuf,
        prompt: String,
    },
    Removed {
        config_path: PathBuf,
        folder: PathBuf,
    },
}

/// Parse one `smartfolder.md`: the whole file is the prompt, subject to the
/// size and content contract.
pub fn parse_config_file(path: &Path) -> Result<String> {
    let meta = std::fs::symlink_metadata(path)?;
    if meta.len() > CONFIG_FILE_MAX_BYTES {
        return Err(SmartfolderError::FileTooLarge {
            path: path.display().to_string(),
            size: meta.len(),
            limit: CONFIG_FILE_MAX_BYTES,
        });
    }

    let raw = std::fs::read(path)?;
    let prompt = String::from_utf8_lossy(&raw).to_string();
    validate_prompt(&prompt)?;
    Ok(prompt.trim().to_string())
}

/// Notes sent from per-file watchers back to the discovery loop.
enum FileNote {
    Changed(PathBuf),
    Unlinked(PathBuf),
}

struct WatchedFile {
    task: JoinHandle<()>,
}

impl WatchedFile {
    fn detach(self) {
        self.task.abort();
    }
}

pub struct DiscoveryService {
    task: JoinHandle<()>,
}

impl DiscoveryService {
    pub fn spawn(
        roots: Vec<PathBuf>,
        interval: Duration,
        ignore: GlobSet,
        events: flume::Sender<DiscoveryEvent>,
    ) -> Self {
        let task = tokio::spawn(discovery_loop(roots, interval, ignore, events));
        Self { task }
    }

    pub fn shutdown(self) {
        self.task.abort();
    }
}

async fn discovery_loop(
    roots: Vec<PathBuf>,
    interval: Duration,
    ignore: GlobSet,
    events: flume::Sender<DiscoveryEvent>,
) {
    // Canonical config path -> its content watcher.
    let mut known: HashMap<PathBuf, WatchedFile> = HashMap::new();
    // Rejected paths, keyed to the (size, mtime) that failed; retried only
    // when the file moves.
    let mut rejected: HashMap<PathBuf, (u64, Option<SystemTime>)> = HashMap::new();

    let (note_tx, mut note_rx) = mpsc::channel::<FileNote>(64);
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(50)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let found = scan_roots(&roots, &ignore).await;

                // Additions.
                for path in &found {
                    if known.contains_key(path) {
                        continue;
                    }
                    if let Some(stamp) = rejected.get(path) {
                        if *stamp == file_stamp(path) {
                            continue;
                        }
                        rejected.remove(path);
                    }

                    match parse_config_file(path) {
                        Ok(prompt) => {
                            let folder = folder_of(path);
                            tracing::info!(
                                config = %path.display(),
                                folder = %folder.display(),
                                "discovered smart folder"
                            );
                            let watcher = watch_config_file(path.clone(), note_tx.clone());
                            known.insert(path.clone(), watcher);
                            let _ = events.send(DiscoveryEvent::Added {
                                config_path: path.clone(),
                                folder,
                                prompt,
                            });
                        }
                        Err(e) => {
                            tracing::warn!(
                                config = %path.display(),
                                "rejecting smart folder config: {}",
                                e
                            );
                            rejected.insert(path.clone(), file_stamp(path));
                        }
                    }
                }

                // Removals.
                let gone: Vec<PathBuf> = known
                    .keys()
                    .filter(|p| !found.contains(*p))
                    .cloned()
                    .collect();
                for path in gone {
                    if let Some(watcher) = known.remove(&path) {
                        watcher.detach();
                    }
                    tracing::info!(config = %path.display(), "smart folder config removed");
                    let _ = events.send(DiscoveryEvent::Removed {
                        folder: folder_of(&path),
                        config_path: path,
                    });
                }
                rejected.retain(|p, _| found.contains(p));
            }

            Some(note) = note_rx.recv() => {
                match note {
                    FileNote::Changed(path) => {
                        if !known.contains_key(&path) {
                            continue;
                        }
                        match parse_config_file(&path) {
                            Ok(prompt) => {
                                tracing::info!(config = %path.display(), "smart folder prompt changed");
                                let _ = events.send(DiscoveryEvent::Changed {
                                    folder: folder_of(&path),
                                    config_path: path,
                                    prompt,
                                });
                            }
                            Err(e) => {
                                tracing::warn!(
                                    config = %path.display(),
                                    "edited config no longer parses, keeping previous prompt: {}",
                                    e
                                );
                            }
                        }
                    }
                    FileNote::Unlinked(path) => {
                        if let Some(watcher) = known.remove(&path) {
                            watcher.detach();
                            tracing::info!(config = %path.display(), "smart folder config unlinked");
                            let _ = events.send(DiscoveryEvent::Removed {
                                folder: folder_of(&path),
                                config_path: path,
                            });
                        }
                    }
                }
            }
        }
    }
}

fn folder_of(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("/"))
}

fn file_stamp(path: &Path) -> (u64, Option<SystemTime>) {
    match std::fs::symlink_metadata(path) {
        Ok(meta) => (meta.len(), meta.modified().ok()),
        Err(_) => (0, None),
    }
}

/// Walk every root, depth-first, collecting canonicalized config paths.
/// `lstat` drives all type checks so symlinks are skipped at every level,
/// the roots included. Multi-root overlaps deduplicate on the canonical path.
async fn scan_roots(roots: &[PathBuf], ignore: &GlobSet) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = Vec::new();

    for root in roots {
        match std::fs::symlink_metadata(root) {
            Ok(meta) if meta.file_type().is_symlink() => {
                tracing::debug!(root = %root.display(), "skipping symlinked root");
                continue;
            }
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(root = %root.display(), "cannot stat root: {}", e);
                continue;
            }
        }

        let mut stack = vec![root.clone()];
        while let Some(dir) = stack.pop() {
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), "skipping unreadable directory: {}", e);
                    continue;
                }
            };

            for entry in entries.flatten() {
                let path = entry.path();
                let rel = path.strip_prefix(root).unwrap_or(&path);
                if ignore.is_match(rel) || ignore.is_match(&path) {
                    continue;
                }

                let meta = match std::fs::symlink_metadata(&path) {
                    Ok(m) => m,
                    Err(_) => continue,
                };
                if meta.file_type().is_symlink() {
                    continue;
                }

                if meta.is_dir() {
                    stack.push(path);
                } else if path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.eq_ignore_ascii_case(CONFIG_FILE_NAME))
                    .unwrap_or(false)
                {
                    let canonical = path.canonicalize().unwrap_or_else(|_| normalize(&path));
                    if !found.contains(&canonical) {
                        found.push(canonical);
                    }
                }
            }

            // Yield between directories so a huge tree cannot starve the
            // runtime.
            tokio::task::yield_now().await;
        }
    }

    found
}

/// Watch one config file for edits and deletion. The parent directory is
/// watched (non-recursive) so atomic-write editors are still caught; events
/// for other files are filtered out.
fn watch_config_file(path: PathBuf, notes: mpsc::Sender<FileNote>) -> WatchedFile {
    let task = tokio::spawn(async move {
        let (notify_tx, mut notify_rx) =
            mpsc::channel::<std::result::Result<Event, notify::Error>>(64);

        let parent = match path.parent() {
            Some(p) => p.to_path_buf(),
            None => return,
        };

        let mut watcher = match RecommendedWatcher::new(
            move |res| {
                let _ = notify_tx.blocking_send(res);
            },
            Config::default(),
        ) {
            Ok(w) => w,
            Err(e) => {
                tracing::warn!(config = %path.display(), "failed to create config watcher: {}", e);
                return;
            }
        };
        if let Err(e) = watcher.watch(&parent, RecursiveMode::NonRecursive) {
            tracing::warn!(config = %path.display(), "failed to watch config file: {}", e);
            return;
        }

        let mut deadline: Option<tokio::time::Instant> = None;

        loop {
            tokio::select! {
                received = notify_rx.recv() => {
                    let event = match received {
                        Some(Ok(event)) => event,
                        Some(Err(e)) => {
                            tracing::warn!(config = %path.display(), "config watcher error: {}", e);
                            continue;
                        }
                        None => break,
                    };

                    let ours = event.paths.iter().any(|p| {
                        p.file_name().map(|n| n.eq_ignore_ascii_case(path.file_name().unwrap_or_default()))
                            .unwrap_or(false)
                    });
                    if !ours {
                        continue;
                    }

                    if matches!(event.kind, EventKind::Remove(_)) && !path.exists() {
                        let _ = notes.send(FileNote::Unlinked(path.clone())).await;
                        break;
                    }
                    deadline = Some(tokio::time::Instant::now() + FILE_DEBOUNCE);
                }
                _ = async {
                    match deadline {
                        Some(d) => tokio::time::sleep_until(d).await,
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    deadline = None;
                    if path.exists() {
                        let _ = notes.send(FileNote::Changed(path.clone())).await;
                    } else {
                        let _ = notes.send(FileNote::Unlinked(path.clone())).await;
                        break;
                    }
                }
            }
        }
    });

    WatchedFile { task }
}
