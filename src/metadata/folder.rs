//! Folder summaries: a depth-limited recursive tally.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;

use super::{TypedExtractor, TypedMeta};
use crate::classify::FileCategory;
use crate::sandbox::extension_of;

const MAX_DEPTH: usize = 10;

pub struct FolderExtractor;

#[derive(Default)]
struct Tally {
    file_count: u64,
    subfolder_count: u64,
    total_size: u64,
    extensions: BTreeMap<String, u64>,
}

#[async_trait]
impl TypedExtractor for FolderExtractor {
    fn name(&self) -> &'static str {
        "folder"
    }

    fn handles(&self) -> &'static [FileCategory] {
        &[FileCategory::Folder]
    }

    async fn extract(&self, path: &Path) -> Option<TypedMeta> {
        let mut tally = Tally::default();
        walk(path, 0, &mut tally).await;
        Some(TypedMeta::Folder {
            file_count: tally.file_count,
            subfolder_count: tally.subfolder_count,
            total_size: tally.total_size,
            extensions: tally.extensions,
        })
    }
}

/// Recursive walk, dotfiles skipped, depth capped. Unreadable entries are
/// simply left out of the tally.
async fn walk(dir: &Path, depth: usize, tally: &mut Tally) {
    if depth >= MAX_DEPTH {
        return;
    }

    let mut read_dir = match tokio::fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) => {
            tracing::debug!(path = %dir.display(), "folder walk skipping: {}", e);
            return;
        }
    };

    while let Ok(Some(entry)) = read_dir.next_entry().await {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }

        let meta = match entry.metadata().await {
            Ok(m) => m,
            Err(_) => continue,
        };

        if meta.is_dir() {
            tally.subfolder_count += 1;
            // Box the recursion so the future stays sized.
            Box::pin(walk(&entry.path(), depth + 1, tally)).await;
        } else if meta.is_file() {
            tally.file_count += 1;
            tally.total_size += meta.len();
            let ext = extension_of(&entry.path()).unwrap_or_else(|| "(none)".to_string());
            *tally.extensions.entry(ext).or_insert(0) += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tallies_files_folders_and_extensions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "abc").unwrap();
        std::fs::write(dir.path().join("b.txt"), "de").unwrap();
        std::fs::write(dir.path().join("c.rs"), "f").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/d.txt"), "gh").unwrap();

        match FolderExtractor.extract(dir.path()).await {
            Some(TypedMeta::Folder {
                file_count,
                subfolder_count,
                total_size,
                extensions,
            }) => {
                assert_eq!(file_count, 4);
                assert_eq!(subfolder_count, 1);
                assert_eq!(total_size, 8);
                assert_eq!(extensions.get("txt"), Some(&3));
                assert_eq!(extensions.get("rs"), Some(&1));
            }
            other => panic!("expected folder metadata, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn dotfiles_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".hidden"), "x").unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join("seen.txt"), "x").unwrap();

        match FolderExtractor.extract(dir.path()).await {
            Some(TypedMeta::Folder {
                file_count,
                subfolder_count,
                ..
            }) => {
                assert_eq!(file_count, 1);
                assert_eq!(subfolder_count, 0);
            }
            other => panic!("expected folder metadata, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn depth_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        // Build a chain deeper than the cap with one file at the bottom.
        let mut current = dir.path().to_path_buf();
        for i in 0..(MAX_DEPTH + 2) {
            current = current.join(format!("d{}", i));
            std::fs::create_dir(&current).unwrap();
        }
        std::fs::write(current.join("deep.txt"), "x").unwrap();

        match FolderExtractor.extract(dir.path()).await {
            Some(TypedMeta::Folder { file_count, .. }) => {
                // The file below the cap is never reached.
                assert_eq!(file_count, 0);
            }
            other => panic!("expected folder metadata, got {:?}", other),
        }
    }
}
