//! Per-folder state directories.
//!
//! Each watched folder owns a hashed subdirectory under
//! `$SMARTFOLDER_HOME/state/` (default `~/.smartfolder/state/`) holding an
//! append-only `history.jsonl` and a `metadata.json` marker. The hash is
//! deterministic in the folder path, so the state dir survives restarts and
//! never sits inside the watched folder itself.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::sandbox::normalize;

pub const HISTORY_FILE: &str = "history.jsonl";
pub const METADATA_FILE: &str = "metadata.json";
pub const TOKEN_FILE: &str = "token";

/// One line of `history.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub timestamp: String,
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HistoryRecord {
    pub fn success(file: &str, result: serde_json::Value) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            file: file.to_string(),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(file: &str, error: String) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            file: file.to_string(),
            result: None,
            error: Some(error),
        }
    }
}

/// Contents of `metadata.json`, overwritten with each run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderStateMetadata {
    pub folder_path: String,
    pub hash: String,
    pub first_watched_at: String,
    pub last_run_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

/// State root: `$SMARTFOLDER_HOME`, else `~/.smartfolder`.
pub fn home() -> PathBuf {
    if let Ok(dir) = std::env::var("SMARTFOLDER_HOME") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".smartfolder")
}

/// First 16 hex chars of sha256 over the canonicalized folder path.
pub fn hash16(folder_path: &Path) -> String {
    let resolved = folder_path
        .canonicalize()
        .unwrap_or_else(|_| normalize(folder_path));
    let digest = Sha256::digest(resolved.to_string_lossy().as_bytes());
    let hex = format!("{:x}", digest);
    hex[..16].to_string()
}

/// Handle on the state root. Holds the home path explicitly so call sites
/// and tests never depend on process-global environment reads.
#[derive(Debug, Clone)]
pub struct StateManager {
    home: PathBuf,
}

impl StateManager {
    pub fn new(home: PathBuf) -> Self {
        Self { home }
    }

    /// Resolve the home from the environment once, at startup.
    pub fn from_env() -> Self {
        Self::new(home())
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn state_dir_for(&self, folder_path: &Path) -> PathBuf {
        self.home.join("state").join(hash16(folder_path))
    }

    pub fn history_path(&self, folder_path: &Path) -> PathBuf {
        self.state_dir_for(folder_path).join(HISTORY_FILE)
    }

    /// Token fallback file read when `AI_GATEWAY_API_KEY` is unset.
    pub fn token_path(&self) -> PathBuf {
        self.home.join(TOKEN_FILE)
    }

    /// Read-or-create the folder metadata marker: `firstWatchedAt` is
    /// preserved from the existing file, `lastRunAt` always moves to now.
    pub fn ensure_metadata(
        &self,
        folder_path: &Path,
        prompt: Option<&str>,
    ) -> std::io::Result<FolderStateMetadata> {
        let state_dir = self.state_dir_for(folder_path);
        std::fs::create_dir_all(&state_dir)?;
        let marker = state_dir.join(METADATA_FILE);
        let now = Utc::now().to_rfc3339();

        let first_watched_at = std::fs::read_to_string(&marker)
            .ok()
            .and_then(|c| serde_json::from_str::<FolderStateMetadata>(&c).ok())
            .map(|m| m.first_watched_at)
            .unwrap_or_else(|| now.clone());

        let meta = FolderStateMetadata {
            folder_path: folder_path.to_string_lossy().to_string(),
            hash: hash16(folder_path),
            first_watched_at,
            last_run_at: now,
            prompt: prompt.map(str::to_string),
        };

        let body = serde_json::to_string_pretty(&meta).expect("metadata serializes");
        std::fs::write(&marker, body)?;
        Ok(meta)
    }
}

/// Append one record to `history.jsonl`. Append failures are logged and
/// swallowed; history loss is never allowed to fail a job.
pub fn append_history(history_path: &Path, record: &HistoryRecord) {
    let line = match serde_json::to_string(record) {
        Ok(l) => l,
        Err(e) => {
            tracing::warn!("failed to serialize history record: {}", e);
            return;
        }
    };

    let result = (|| -> std::io::Result<()> {
        if let Some(parent) = history_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(history_path)?;
        writeln!(file, "{}", line)
    })();

    if let Err(e) = result {
        tracing::warn!(
            path = %history_path.display(),
            "failed to append history record: {}",
            e
        );
    }
}

/// Parse `history.jsonl` tolerantly, skipping corrupt lines with a warning.
pub fn read_history(history_path: &Path) -> Vec<HistoryRecord> {
    let contents = match std::fs::read_to_string(history_path) {
        Ok(c) => c,
        Err(_) => return Vec::new(),
    };

    let mut records = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<HistoryRecord>(line) {
            Ok(rec) => records.push(rec),
            Err(e) => tracing::warn!(
                path = %history_path.display(),
                line = idx + 1,
                "skipping corrupt history line: {}",
                e
            ),
        }
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_and_short() {
        let a = hash16(Path::new("/tmp/dl"));
        let b = hash16(Path::new("/tmp/dl"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, hash16(Path::new("/tmp/other")));
    }

    #[test]
    fn state_dir_is_outside_the_folder() {
        let home = tempfile::tempdir().unwrap();
        let state = StateManager::new(home.path().to_path_buf());
        let folder = Path::new("/tmp/dl");
        let dir = state.state_dir_for(folder);
        assert!(dir.starts_with(home.path()));
        assert!(!dir.starts_with(folder));
    }

    #[test]
    fn history_appends_one_json_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");

        append_history(
            &path,
            &HistoryRecord::success("a.pdf", serde_json::json!({"renamed": true})),
        );
        append_history(&path, &HistoryRecord::failure("b.txt", "provider down".into()));

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in &lines {
            serde_json::from_str::<serde_json::Value>(line).unwrap();
        }

        let records = read_history(&path);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].file, "a.pdf");
        assert!(records[1].error.is_some());
    }

    #[test]
    fn read_history_skips_corrupt_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        std::fs::write(
            &path,
            "{\"timestamp\":\"t\",\"file\":\"a\"}\nnot json\n{\"timestamp\":\"t\",\"file\":\"b\"}\n",
        )
        .unwrap();
        let records = read_history(&path);
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn metadata_preserves_first_watched_at() {
        let home = tempfile::tempdir().unwrap();
        let state = StateManager::new(home.path().to_path_buf());
        let folder = tempfile::tempdir().unwrap();

        let first = state.ensure_metadata(folder.path(), Some("organize")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = state.ensure_metadata(folder.path(), Some("organize")).unwrap();

        assert_eq!(first.first_watched_at, second.first_watched_at);
        assert!(second.last_run_at >= first.last_run_at);
        assert_eq!(second.prompt.as_deref(), Some("organize"));
    }

    #[test]
    fn metadata_uses_camel_case_keys() {
        let home = tempfile::tempdir().unwrap();
        let state = StateManager::new(home.path().to_path_buf());
        let folder = tempfile::tempdir().unwrap();
        state.ensure_metadata(folder.path(), None).unwrap();

        let marker = state.state_dir_for(folder.path()).join(METADATA_FILE);
        let raw = std::fs::read_to_string(marker).unwrap();
        assert!(raw.contains("folderPath"));
        assert!(raw.contains("firstWatchedAt"));
        assert!(raw.contains("lastRunAt"));
    }
}
