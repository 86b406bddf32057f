//! File metadata extraction.
//!
//! Core stats plus a streaming SHA-256 are collected for every event. On top
//! of that, type-specific extractors run opportunistically: each one declares
//! the categories it handles and an `available()` capability probe, and the
//! factory composes only the available ones at startup. Extraction is
//! best-effort throughout — a failing extractor yields no typed metadata,
//! never an error.

pub mod archive;
pub mod folder;
pub mod image_meta;
pub mod pdf;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::classify::{mime_for_extension, FileCategory};
use crate::sandbox::extension_of;

/// Always-present stats for a single file or directory.
#[derive(Debug, Clone, Serialize)]
pub struct CoreMetadata {
    pub absolute_path: String,
    pub relative_path: String,
    pub name: String,
    pub extension: Option<String>,
    pub size: u64,
    pub created: Option<String>,
    pub modified: Option<String>,
    pub mime: Option<String>,
    pub category: FileCategory,
    pub sha256: Option<String>,
}

/// Type-specific metadata, tagged by kind.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypedMeta {
    Image {
        width: u32,
        height: u32,
        format: Option<String>,
    },
    Pdf {
        version: Option<String>,
        page_count: Option<u32>,
        encrypted: bool,
    },
    Archive {
        entry_count: u32,
    },
    Folder {
        file_count: u64,
        subfolder_count: u64,
        total_size: u64,
        extensions: BTreeMap<String, u64>,
    },
}

/// Everything the content provider and prompt builder know about a file.
#[derive(Debug, Clone, Serialize)]
pub struct MetadataBlob {
    pub core: CoreMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typed: Option<TypedMeta>,
}

/// A category-specific extractor. Implementations must be best-effort: if
/// the underlying capability is absent or parsing fails, return `None`.
#[async_trait]
pub trait TypedExtractor: Send + Sync {
    fn name(&self) -> &'static str;
    fn handles(&self) -> &'static [FileCategory];
    fn available(&self) -> bool {
        true
    }
    async fn extract(&self, path: &Path) -> Option<TypedMeta>;
}

/// The composed set of available extractors.
#[derive(Clone)]
pub struct ExtractorSet {
    extractors: Vec<Arc<dyn TypedExtractor>>,
}

impl ExtractorSet {
    /// Probe every known extractor and keep the available ones.
    pub fn with_available() -> Self {
        let candidates: Vec<Arc<dyn TypedExtractor>> = vec![
            Arc::new(image_meta::ImageExtractor),
            Arc::new(pdf::PdfExtractor),
            Arc::new(archive::ArchiveExtractor),
            Arc::new(folder::FolderExtractor),
        ];

        let extractors: Vec<_> = candidates
            .into_iter()
            .filter(|e| {
                let ok = e.available();
                if !ok {
                    tracing::debug!("extractor '{}' unavailable, skipping", e.name());
                }
                ok
            })
            .collect();

        Self { extractors }
    }

    #[cfg(test)]
    pub fn empty() -> Self {
        Self { extractors: Vec::new() }
    }

    /// Run the first available extractor that handles `category`.
    pub async fn extract(&self, category: FileCategory, path: &Path) -> Option<TypedMeta> {
        for extractor in &self.extractors {
            if extractor.handles().contains(&category) {
                return extractor.extract(path).await;
            }
        }
        None
    }
}

/// Stat a path and stream its SHA-256. Directories get no hash; hash
/// failures (e.g. the file vanished mid-read) degrade to `None`.
pub async fn extract_core(
    folder_root: &Path,
    abs_path: &Path,
    category: FileCategory,
) -> std::io::Result<CoreMetadata> {
    let meta = tokio::fs::symlink_metadata(abs_path).await?;
    let extension = extension_of(abs_path);
    let name = abs_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let relative_path = abs_path
        .strip_prefix(folder_root)
        .unwrap_or(abs_path)
        .to_string_lossy()
        .to_string();

    let sha256 = if meta.is_file() {
        match stream_sha256(abs_path).await {
            Ok(hash) => Some(hash),
            Err(e) => {
                tracing::debug!(path = %abs_path.display(), "hashing failed: {}", e);
                None
            }
        }
    } else {
        None
    };

    Ok(CoreMetadata {
        absolute_path: abs_path.to_string_lossy().to_string(),
        relative_path,
        name,
        mime: mime_for_extension(extension.as_deref()).map(str::to_string),
        extension,
        size: meta.len(),
        created: meta.created().ok().map(to_rfc3339),
        modified: meta.modified().ok().map(to_rfc3339),
        category,
        sha256,
    })
}

fn to_rfc3339(t: std::time::SystemTime) -> String {
    DateTime::<Utc>::from(t).to_rfc3339()
}

/// Hash a file in 64 KiB chunks so multi-GiB files never sit in memory.
pub async fn stream_sha256(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn core_metadata_has_stats_and_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "hello world").unwrap();

        let core = extract_core(dir.path(), &path, FileCategory::TextDocument)
            .await
            .unwrap();
        assert_eq!(core.name, "notes.txt");
        assert_eq!(core.relative_path, "notes.txt");
        assert_eq!(core.extension.as_deref(), Some("txt"));
        assert_eq!(core.size, 11);
        assert_eq!(core.mime.as_deref(), Some("text/plain"));
        // sha256 of "hello world"
        assert_eq!(
            core.sha256.as_deref(),
            Some("b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9")
        );
    }

    #[tokio::test]
    async fn streaming_hash_matches_chunked_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        // Larger than one 64 KiB chunk so the loop iterates.
        std::fs::write(&path, vec![7u8; 200 * 1024]).unwrap();

        let streamed = stream_sha256(&path).await.unwrap();
        let whole = format!("{:x}", Sha256::digest(vec![7u8; 200 * 1024]));
        assert_eq!(streamed, whole);
    }

    #[tokio::test]
    async fn directories_are_not_hashed() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        let core = extract_core(dir.path(), &sub, FileCategory::Folder)
            .await
            .unwrap();
        assert!(core.sha256.is_none());
    }

    #[tokio::test]
    async fn extractor_set_dispatches_by_category() {
        let set = ExtractorSet::with_available();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "x").unwrap();

        let typed = set.extract(FileCategory::Folder, dir.path()).await;
        assert!(matches!(typed, Some(TypedMeta::Folder { .. })));

        // No extractor handles plain text.
        let none = set
            .extract(FileCategory::TextDocument, &dir.path().join("a.txt"))
            .await;
        assert!(none.is_none());
    }
}
