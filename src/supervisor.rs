//! Supervisor: lifecycle and wiring.
//!
//! Builds the shared services (suppressor, extractors, tool registry, model
//! client), starts a watcher plus a serialized job queue per folder — either
//! from the static config or dynamically as discovery reports smart folders —
//! routes watch events into the right queue, and shuts everything down
//! gracefully on SIGINT/SIGTERM: intake stops first, then in-flight jobs are
//! awaited.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::{FolderSpec, Settings, WatchMode};
use crate::discovery::{DiscoveryEvent, DiscoveryService};
use crate::job::{self, JobContext};
use crate::llm_client::ChatModel;
use crate::metadata::ExtractorSet;
use crate::queue::FolderQueue;
use crate::state::StateManager;
use crate::suppressor::SelfChangeSuppressor;
use crate::tools::ToolRegistry;
use crate::watcher::{build_globset, FolderWatcher, WatchEvent};

/// Wait for either SIGINT (Ctrl+C) or SIGTERM.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");

    tokio::select! {
        _ = sigint.recv() => {
            tracing::info!("received SIGINT");
        }
        _ = sigterm.recv() => {
            tracing::info!("received SIGTERM");
        }
    }
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to register Ctrl+C handler");
    tracing::info!("received Ctrl+C");
}

struct ActiveFolder {
    queue: FolderQueue,
    watcher: FolderWatcher,
}

pub struct Supervisor {
    settings: Settings,
    state: StateManager,
    model: Arc<dyn ChatModel>,
    suppressor: Arc<SelfChangeSuppressor>,
    extractors: ExtractorSet,
    base_registry: ToolRegistry,
}

impl Supervisor {
    pub fn new(settings: Settings, state: StateManager, model: Arc<dyn ChatModel>) -> Self {
        Self {
            settings,
            state,
            model,
            suppressor: Arc::new(SelfChangeSuppressor::new()),
            extractors: ExtractorSet::with_available(),
            base_registry: ToolRegistry::with_defaults(),
        }
    }

    /// Run until a shutdown signal arrives.
    pub async fn run(self, run_once: bool) -> Result<()> {
        self.run_until(run_once, wait_for_shutdown_signal()).await
    }

    /// Run until `shutdown` resolves. Split out so tests can drive the
    /// lifecycle without process signals.
    pub async fn run_until(
        self,
        run_once: bool,
        shutdown: impl Future<Output = ()>,
    ) -> Result<()> {
        let (watch_tx, watch_rx) = flume::unbounded::<WatchEvent>();
        let mut active: HashMap<PathBuf, ActiveFolder> = HashMap::new();

        let discovery: Option<(DiscoveryService, flume::Receiver<DiscoveryEvent>)> =
            match &self.settings.mode {
                WatchMode::Folders(specs) => {
                    for spec in specs.clone() {
                        let folder = spec.path.clone();
                        match self.start_folder(spec, watch_tx.clone()) {
                            Ok(started) => {
                                active.insert(folder, started);
                            }
                            Err(e) => {
                                tracing::error!(
                                    folder = %folder.display(),
                                    "failed to start folder: {:#}",
                                    e
                                );
                            }
                        }
                    }
                    if active.is_empty() {
                        anyhow::bail!("no folder could be started");
                    }
                    None
                }
                WatchMode::Roots(roots) => {
                    let ignore = build_globset(&self.settings.defaults.ignore_globs)
                        .context("discovery ignore globs")?;
                    let (tx, rx) = flume::unbounded();
                    let service = DiscoveryService::spawn(
                        roots.clone(),
                        Duration::from_millis(self.settings.discovery_interval_ms),
                        ignore,
                        tx,
                    );
                    tracing::info!(roots = roots.len(), "discovery mode started");
                    Some((service, rx))
                }
            };

        if run_once {
            tracing::info!("run-once: watchers came up, shutting down again");
            self.teardown(active, discovery).await;
            return Ok(());
        }

        let discovery_rx = discovery.as_ref().map(|(_, rx)| rx.clone());
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutting down");
                    break;
                }

                event = watch_rx.recv_async() => {
                    let Ok(event) = event else { break };
                    match active.get(&event.folder) {
                        Some(folder) => {
                            folder.queue.enqueue(event.path);
                        }
                        None => tracing::debug!(
                            folder = %event.folder.display(),
                            "event for unknown folder, dropping"
                        ),
                    }
                }

                event = recv_discovery(&discovery_rx) => {
                    let Some(event) = event else { continue };
                    self.apply_discovery(event, &mut active, &watch_tx).await;
                }
            }
        }

        self.teardown(active, discovery).await;
        Ok(())
    }

    async fn apply_discovery(
        &self,
        event: DiscoveryEvent,
        active: &mut HashMap<PathBuf, ActiveFolder>,
        watch_tx: &flume::Sender<WatchEvent>,
    ) {
        match event {
            DiscoveryEvent::Added { folder, prompt, .. } => {
                if active.contains_key(&folder) {
                    return;
                }
                let spec = self
                    .settings
                    .spec_for_discovered(&folder, prompt, &self.state);
                match self.start_folder(spec, watch_tx.clone()) {
                    Ok(started) => {
                        active.insert(folder, started);
                    }
                    Err(e) => tracing::error!(
                        folder = %folder.display(),
                        "failed to attach discovered folder: {:#}",
                        e
                    ),
                }
            }
            DiscoveryEvent::Changed { folder, prompt, .. } => {
                // Prompt changes restart the folder so in-flight jobs finish
                // against the old prompt.
                if let Some(existing) = active.remove(&folder) {
                    existing.watcher.shutdown();
                    existing.queue.shutdown().await;
                }
                let spec = self
                    .settings
                    .spec_for_discovered(&folder, prompt, &self.state);
                match self.start_folder(spec, watch_tx.clone()) {
                    Ok(started) => {
                        active.insert(folder, started);
                    }
                    Err(e) => tracing::error!(
                        folder = %folder.display(),
                        "failed to restart folder after prompt change: {:#}",
                        e
                    ),
                }
            }
            DiscoveryEvent::Removed { folder, .. } => {
                if let Some(existing) = active.remove(&folder) {
                    existing.watcher.shutdown();
                    existing.queue.shutdown().await;
                    tracing::info!(folder = %folder.display(), "folder detached");
                }
            }
        }
    }

    fn start_folder(
        &self,
        spec: FolderSpec,
        watch_tx: flume::Sender<WatchEvent>,
    ) -> Result<ActiveFolder> {
        self.state
            .ensure_metadata(&spec.path, Some(&spec.prompt))
            .with_context(|| format!("state directory for {}", spec.path.display()))?;

        let registry = Arc::new(self.base_registry.filtered(&spec.tools));
        let spec = Arc::new(spec);

        let ctx = JobContext {
            spec: spec.clone(),
            model: self.model.clone(),
            model_pref: self.settings.model_pref.clone(),
            max_tool_calls: self.settings.max_tool_calls as usize,
            limits: self.settings.limits.clone(),
            extractors: self.extractors.clone(),
            suppressor: self.suppressor.clone(),
            registry,
            state: self.state.clone(),
        };

        let queue = FolderQueue::spawn(spec.path.clone(), self.suppressor.clone(), move |path| {
            let ctx = ctx.clone();
            async move { job::process_file(ctx, path).await }
        });

        let watcher = FolderWatcher::spawn(&spec, watch_tx)?;

        Ok(ActiveFolder { queue, watcher })
    }

    async fn teardown(
        &self,
        active: HashMap<PathBuf, ActiveFolder>,
        discovery: Option<(DiscoveryService, flume::Receiver<DiscoveryEvent>)>,
    ) {
        if let Some((service, _)) = discovery {
            service.shutdown();
        }
        for (folder, entry) in active {
            entry.watcher.shutdown();
            entry.queue.shutdown().await;
            tracing::debug!(folder = %folder.display(), "folder stopped");
        }
    }
}

async fn recv_discovery(
    rx: &Option<flume::Receiver<DiscoveryEvent>>,
) -> Option<DiscoveryEvent> {
    match rx {
        Some(rx) => rx.recv_async().await.ok(),
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::{AssistantTurn, ChatMessage, LlmFunctionCall, LlmToolCall};
    use crate::state::read_history;
    use crate::tools::ToolDef;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Model that renames whatever file it is shown, once, then finishes.
    struct RenamingModel {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl ChatModel for RenamingModel {
        async fn complete(
            &self,
            _model: &str,
            messages: &[ChatMessage],
            _tools: &[ToolDef],
        ) -> Result<AssistantTurn> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls % 2 == 1 {
                // Pull the original filename out of the user message frame.
                let user_text = messages
                    .iter()
                    .find_map(|m| match (&m.role[..], &m.content) {
                        ("user", Some(crate::llm_client::MessageContent::Text(t))) => {
                            Some(t.clone())
                        }
                        _ => None,
                    })
                    .unwrap_or_default();
                let name = user_text
                    .lines()
                    .find_map(|l| l.strip_prefix("- Name: "))
                    .unwrap_or("unknown.txt")
                    .to_string();
                Ok(AssistantTurn {
                    content: None,
                    tool_calls: vec![LlmToolCall {
                        id: "c1".into(),
                        call_type: "function".into(),
                        function: LlmFunctionCall {
                            name: "rename_file".into(),
                            arguments: serde_json::json!({
                                "from": name,
                                "to": format!("renamed-{}", name),
                            })
                            .to_string(),
                        },
                    }],
                })
            } else {
                Ok(AssistantTurn {
                    content: Some("done".into()),
                    tool_calls: Vec::new(),
                })
            }
        }
    }

    fn build(folder: &std::path::Path, home: &std::path::Path) -> Supervisor {
        let state = StateManager::new(home.to_path_buf());
        let settings =
            Settings::single_folder(folder, "rename descriptively", false, &state).unwrap();
        Supervisor::new(
            settings,
            state,
            Arc::new(RenamingModel {
                calls: Mutex::new(0),
            }),
        )
    }

    #[tokio::test]
    async fn folder_mode_processes_a_dropped_file_end_to_end() {
        let folder = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        let supervisor = build(folder.path(), home.path());
        let history = StateManager::new(home.path().to_path_buf()).history_path(folder.path());

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let run = tokio::spawn(supervisor.run_until(false, async move {
            let _ = stop_rx.await;
        }));

        // Give the watcher a beat, then drop a file. The folder spec uses the
        // default 1500 ms debounce, so allow generous settling time.
        tokio::time::sleep(Duration::from_millis(200)).await;
        std::fs::write(folder.path().join("a.txt"), "quarterly invoice").unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            if folder.path().join("renamed-a.txt").exists() {
                break;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "file was never processed"
            );
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let _ = stop_tx.send(());
        run.await.unwrap().unwrap();

        let records = read_history(&history);
        assert_eq!(records.len(), 1);
        assert!(records[0].result.is_some());
    }

    #[tokio::test]
    async fn run_once_starts_and_exits_without_processing() {
        let folder = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        std::fs::write(folder.path().join("preexisting.txt"), "x").unwrap();
        let supervisor = build(folder.path(), home.path());
        let history = StateManager::new(home.path().to_path_buf()).history_path(folder.path());

        supervisor
            .run_until(true, std::future::pending())
            .await
            .unwrap();

        // No events processed, but the state dir exists with metadata.
        assert!(read_history(&history).is_empty());
        let state = StateManager::new(home.path().to_path_buf());
        assert!(state
            .state_dir_for(folder.path())
            .join(crate::state::METADATA_FILE)
            .exists());
    }

    #[tokio::test]
    async fn discovery_mode_attaches_and_detaches_folders() {
        let root = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("proj")).unwrap();

        let state = StateManager::new(home.path().to_path_buf());
        let config: crate::config::ConfigFile = serde_json::from_value(serde_json::json!({
            "ai": {},
            "rootDirectories": [root.path().to_string_lossy()],
            "discoveryIntervalMs": 100,
            "globalDefaults": {"debounceMs": 100}
        }))
        .unwrap();
        let settings = Settings::from_config(config, false, &state).unwrap();
        let supervisor = Supervisor::new(
            settings,
            state.clone(),
            Arc::new(RenamingModel {
                calls: Mutex::new(0),
            }),
        );

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let run = tokio::spawn(supervisor.run_until(false, async move {
            let _ = stop_rx.await;
        }));

        // Discovery picks up the config, then a dropped file gets processed.
        std::fs::write(root.path().join("proj/smartfolder.md"), "organize").unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        std::fs::write(root.path().join("proj/b.txt"), "notes").unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            if root.path().join("proj/renamed-b.txt").exists() {
                break;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "discovered folder never processed the file"
            );
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let _ = stop_tx.send(());
        run.await.unwrap().unwrap();
    }
}
