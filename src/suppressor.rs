//! Self-change suppression.
//!
//! Mutating tools mark the paths they touch; the queue intake consults the
//! same map and drops events for marked paths so the agent's own writes do
//! not trigger fresh jobs. Entries expire 10 seconds after the most recent
//! mark; expired entries are pruned on probe and by a periodic sweep instead
//! of per-entry timers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// How long a mark stays authoritative after the last refresh.
pub const IGNORE_WINDOW: Duration = Duration::from_secs(10);

#[derive(Default)]
pub struct SelfChangeSuppressor {
    entries: Mutex<HashMap<PathBuf, Instant>>,
}

impl SelfChangeSuppressor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `path` as self-modified. A fresh mark replaces any earlier
    /// deadline for the same path.
    pub fn mark(&self, path: &Path) {
        let deadline = Instant::now() + IGNORE_WINDOW;
        let mut entries = self.entries.lock().expect("suppressor lock poisoned");
        entries.insert(path.to_path_buf(), deadline);
        tracing::debug!(path = %path.display(), "marked self-change");
    }

    /// True iff `path` was marked less than the ignore window ago.
    /// Expired entries are dropped as a side effect of the probe.
    pub fn is_ignored(&self, path: &Path) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("suppressor lock poisoned");
        match entries.get(path) {
            Some(deadline) if now < *deadline => true,
            Some(_) => {
                entries.remove(path);
                false
            }
            None => false,
        }
    }

    /// Drop every expired entry. Called opportunistically by the queue.
    pub fn sweep(&self) {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("suppressor lock poisoned");
        entries.retain(|_, deadline| now < *deadline);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Test hook: backdate a mark so expiry paths can be exercised without
    /// sleeping out the full window.
    #[cfg(test)]
    fn mark_with_deadline(&self, path: &Path, deadline: Instant) {
        self.entries
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), deadline);
    }
}
