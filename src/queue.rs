//! Per-folder job queue.
//!
//! One worker task per folder drains an unbounded channel, so jobs for a
//! folder run strictly one at a time in arrival order while folders stay
//! independent of each other. Intake consults the self-change suppressor and
//! silently drops events the agent caused itself. A failing job is logged
//! and never breaks the chain.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::suppressor::SelfChangeSuppressor;

pub struct FolderQueue {
    folder: PathBuf,
    tx: Option<mpsc::UnboundedSender<PathBuf>>,
    worker: JoinHandle<()>,
    suppressor: Arc<SelfChangeSuppressor>,
}

impl FolderQueue {
    /// Start the worker for one folder. `handler` processes a single file
    /// event to completion; its errors are caught here.
    pub fn spawn<F, Fut>(
        folder: PathBuf,
        suppressor: Arc<SelfChangeSuppressor>,
        handler: F,
    ) -> Self
    where
        F: Fn(PathBuf) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<PathBuf>();
        let worker_folder = folder.clone();

        let worker = tokio::spawn(async move {
            while let Some(path) = rx.recv().await {
                tracing::info!(
                    folder = %worker_folder.display(),
                    file = %path.display(),
                    "job started"
                );
                if let Err(e) = handler(path.clone()).await {
                    tracing::error!(
                        folder = %worker_folder.display(),
                        file = %path.display(),
                        "job failed: {:#}",
                        e
                    );
                }
            }
            tracing::debug!(folder = %worker_folder.display(), "folder queue drained");
        });

        Self {
            folder,
            tx: Some(tx),
            worker,
            suppressor,
        }
    }

    pub fn folder(&self) -> &PathBuf {
        &self.folder
    }

    /// Queue one file event. Returns false when the event was dropped
    /// (self-induced, or the queue is shutting down).
    pub fn enqueue(&self, path: PathBuf) -> bool {
        self.suppressor.sweep();
        if self.suppressor.is_ignored(&path) {
            tracing::debug!(
                file = %path.display(),
                "dropping self-induced event"
            );
            return false;
        }
        match &self.tx {
            Some(tx) => tx.send(path).is_ok(),
            None => false,
        }
    }

    /// Stop intake and wait for in-flight jobs to finish.
    pub async fn shutdown(mut self) {
        self.tx.take();
        if let Err(e) = self.worker.await {
            tracing::warn!(folder = %self.folder.display(), "queue worker ended badly: {}", e);
        }
    }
}
