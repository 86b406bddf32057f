//! Path sandbox and capped filesystem helpers.
//!
//! Every tool resolves its path arguments through [`contain`] before touching
//! the filesystem. Containment is lexical: the candidate is joined to the
//! folder root, normalized, and rejected unless the result still sits under
//! the root. Symlink targets are not chased because tools must also be able
//! to refuse paths that do not exist yet.

use std::path::{Component, Path, PathBuf};

use crate::error::{Result, SmartfolderError};

/// Hard cap for tool-level and preview reads (256 KiB).
pub const MAX_READ_BYTES: u64 = 256 * 1024;

/// Lexically normalize a path: collapse `.` and resolve `..` against the
/// components already seen. A `..` that would climb past the start is kept,
/// which is exactly what makes escapes detectable after joining.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(Component::ParentDir);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Resolve `candidate` against `root` and fail with `PathEscape` unless the
/// normalized result stays inside `root`.
pub fn contain(root: &Path, candidate: &str) -> Result<PathBuf> {
    let raw = Path::new(candidate);
    let joined = if raw.is_absolute() {
        raw.to_path_buf()
    } else {
        root.join(raw)
    };
    let resolved = normalize(&joined);
    let root = normalize(root);

    match resolved.strip_prefix(&root) {
        Ok(rel)
            if !rel
                .components()
                .any(|c| matches!(c, Component::ParentDir)) =>
        {
            Ok(resolved)
        }
        _ => Err(SmartfolderError::PathEscape(candidate.to_string())),
    }
}

/// Create the parent directory chain for `abs` if it is missing.
pub async fn ensure_parent_dir(abs: &Path) -> Result<()> {
    if let Some(parent) = abs.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

pub async fn assert_exists(abs: &Path) -> Result<()> {
    match tokio::fs::symlink_metadata(abs).await {
        Ok(_) => Ok(()),
        Err(_) => Err(SmartfolderError::Missing(abs.display().to_string())),
    }
}

pub async fn assert_not_exists(abs: &Path) -> Result<()> {
    match tokio::fs::symlink_metadata(abs).await {
        Ok(_) => Err(SmartfolderError::ExistsAlready(abs.display().to_string())),
        Err(_) => Ok(()),
    }
}

/// Read a regular file, refusing anything larger than `max_bytes`.
pub async fn read_capped(abs: &Path, max_bytes: u64) -> Result<Vec<u8>> {
    let meta = tokio::fs::symlink_metadata(abs)
        .await
        .map_err(|_| SmartfolderError::Missing(abs.display().to_string()))?;

    if !meta.is_file() {
        return Err(SmartfolderError::Missing(format!(
            "{} is not a regular file",
            abs.display()
        )));
    }
    if meta.len() > max_bytes {
        return Err(SmartfolderError::SizeExceeded {
            path: abs.display().to_string(),
            size: meta.len(),
            limit: max_bytes,
        });
    }

    Ok(tokio::fs::read(abs).await?)
}

/// Extension (without the dot, lowercased) of the final path component.
/// Multi-dot names resolve to the final extension (`a.tar.gz` → `gz`).
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}
