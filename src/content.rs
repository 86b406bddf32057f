//! Per-category content strategy.
//!
//! Every job runs the same four-step template: extract metadata, gate on
//! whether body bytes should be sent at all, pick full vs partial, then
//! fetch. Categories differ only in policy: small text goes whole, mid-size
//! text is clipped to head and tail lines (CSV keeps its header line),
//! binary media is attached whole when the selected model natively accepts
//! it and the size cap allows, and archives/folders/office files travel as
//! metadata only.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::classify::{mime_for_extension, FileCategory};
use crate::error::Result;
use crate::metadata::MetadataBlob;
use crate::models::ModelCapability;
use crate::sandbox;

/// All nine tool ids, in the order they are offered to the model.
pub const ALL_TOOLS: [&str; 9] = [
    "read_file",
    "write_file",
    "rename_file",
    "move_file",
    "grep",
    "sed",
    "head",
    "tail",
    "create_folder",
];

const BINARY_FILE_TOOLS: [&str; 4] = ["rename_file", "move_file", "create_folder", "write_file"];
const FOLDER_TOOLS: [&str; 3] = ["move_file", "create_folder", "write_file"];

/// Config-overridable thresholds, spec defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContentLimits {
    pub text_full_max: u64,
    pub text_partial_max: u64,
    pub head_lines: usize,
    pub tail_lines: usize,
    pub image_max: u64,
    pub pdf_max: u64,
    pub audio_max: u64,
    pub video_max: u64,
}

impl Default for ContentLimits {
    fn default() -> Self {
        Self {
            text_full_max: 10 * 1024,
            text_partial_max: 100 * 1024,
            head_lines: 50,
            tail_lines: 50,
            image_max: 5 * 1024 * 1024,
            pdf_max: 10 * 1024 * 1024,
            audio_max: 10 * 1024 * 1024,
            video_max: 20 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    Full,
    Partial,
}

/// What actually gets attached to the prompt.
#[derive(Debug, Clone)]
pub enum Body {
    None,
    FullText {
        text: String,
    },
    PartialText {
        head: String,
        tail: String,
        csv_header: Option<String>,
        omitted_lines: usize,
    },
    FullBinary {
        bytes: Vec<u8>,
        media_type: String,
    },
}

#[derive(Debug, Clone)]
pub struct FileContent {
    pub metadata: MetadataBlob,
    pub body: Body,
    pub available_tools: Vec<&'static str>,
}

/// The four-step template, minus the metadata step which is shared by every
/// category and runs before dispatch.
#[async_trait]
trait ContentStrategy: Send + Sync {
    fn should_send_body(
        &self,
        meta: &MetadataBlob,
        caps: &ModelCapability,
        limits: &ContentLimits,
    ) -> bool;

    fn body_mode(&self, size: u64, limits: &ContentLimits) -> BodyMode;

    async fn fetch_body(
        &self,
        path: &Path,
        mode: BodyMode,
        meta: &MetadataBlob,
        limits: &ContentLimits,
    ) -> Result<Body>;
}

struct TextStrategy;

#[async_trait]
impl ContentStrategy for TextStrategy {
    fn should_send_body(
        &self,
        meta: &MetadataBlob,
        _caps: &ModelCapability,
        limits: &ContentLimits,
    ) -> bool {
        meta.core.size <= limits.text_partial_max
    }

    fn body_mode(&self, size: u64, limits: &ContentLimits) -> BodyMode {
        if size <= limits.text_full_max {
            BodyMode::Full
        } else {
            BodyMode::Partial
        }
    }

    async fn fetch_body(
        &self,
        path: &Path,
        mode: BodyMode,
        meta: &MetadataBlob,
        limits: &ContentLimits,
    ) -> Result<Body> {
        let bytes = sandbox::read_capped(path, limits.text_partial_max).await?;
        let text = String::from_utf8_lossy(&bytes).to_string();

        match mode {
            BodyMode::Full => Ok(Body::FullText { text }),
            BodyMode::Partial => {
                let is_csv = matches!(meta.core.extension.as_deref(), Some("csv") | Some("tsv"));
                Ok(clip_text(&text, is_csv, limits))
            }
        }
    }
}

/// Head + tail clipping with an omission count; CSV keeps its header line as
/// a separate section and clips the rows below it.
fn clip_text(text: &str, is_csv: bool, limits: &ContentLimits) -> Body {
    let mut lines: Vec<&str> = text.lines().collect();

    let csv_header = if is_csv && !lines.is_empty() {
        Some(lines.remove(0).to_string())
    } else {
        None
    };

    let keep = limits.head_lines + limits.tail_lines;
    if lines.len() <= keep {
        // Few but long lines; nothing to omit, send everything we have.
        let mut full = String::new();
        if let Some(ref header) = csv_header {
            full.push_str(header);
            full.push('\n');
        }
        full.push_str(&lines.join("\n"));
        return Body::FullText { text: full };
    }

    let head = lines[..limits.head_lines].join("\n");
    let tail = lines[lines.len() - limits.tail_lines..].join("\n");
    let omitted_lines = lines.len() - keep;

    Body::PartialText {
        head,
        tail,
        csv_header,
        omitted_lines,
    }
}

/// Whole-file base64 attachment for media the model accepts natively.
struct BinaryStrategy {
    supports: fn(&ModelCapability) -> bool,
    max_size: fn(&ContentLimits) -> u64,
    fallback_media_type: &'static str,
}

#[async_trait]
impl ContentStrategy for BinaryStrategy {
    fn should_send_body(
        &self,
        meta: &MetadataBlob,
        caps: &ModelCapability,
        limits: &ContentLimits,
    ) -> bool {
        (self.supports)(caps) && meta.core.size <= (self.max_size)(limits)
    }

    fn body_mode(&self, _size: u64, _limits: &ContentLimits) -> BodyMode {
        BodyMode::Full
    }

    async fn fetch_body(
        &self,
        path: &Path,
        _mode: BodyMode,
        meta: &MetadataBlob,
        _limits: &ContentLimits,
    ) -> Result<Body> {
        let bytes = tokio::fs::read(path).await?;
        let media_type = meta
            .core
            .mime
            .clone()
            .or_else(|| {
                mime_for_extension(meta.core.extension.as_deref()).map(str::to_string)
            })
            .unwrap_or_else(|| self.fallback_media_type.to_string());
        Ok(Body::FullBinary { bytes, media_type })
    }
}

struct MetadataOnlyStrategy;

#[async_trait]
impl ContentStrategy for MetadataOnlyStrategy {
    fn should_send_body(
        &self,
        _meta: &MetadataBlob,
        _caps: &ModelCapability,
        _limits: &ContentLimits,
    ) -> bool {
        false
    }

    fn body_mode(&self, _size: u64, _limits: &ContentLimits) -> BodyMode {
        BodyMode::Full
    }

    async fn fetch_body(
        &self,
        _path: &Path,
        _mode: BodyMode,
        _meta: &MetadataBlob,
        _limits: &ContentLimits,
    ) -> Result<Body> {
        Ok(Body::None)
    }
}

static TEXT: TextStrategy = TextStrategy;
static IMAGE: BinaryStrategy = BinaryStrategy {
    supports: |c| c.supports_image,
    max_size: |l| l.image_max,
    fallback_media_type: "image/png",
};
static PDF: BinaryStrategy = BinaryStrategy {
    supports: |c| c.supports_pdf,
    max_size: |l| l.pdf_max,
    fallback_media_type: "application/pdf",
};
static AUDIO: BinaryStrategy = BinaryStrategy {
    supports: |c| c.supports_audio,
    max_size: |l| l.audio_max,
    fallback_media_type: "application/octet-stream",
};
static VIDEO: BinaryStrategy = BinaryStrategy {
    supports: |c| c.supports_video,
    max_size: |l| l.video_max,
    fallback_media_type: "application/octet-stream",
};
static METADATA_ONLY: MetadataOnlyStrategy = MetadataOnlyStrategy;

fn strategy_for(category: FileCategory) -> &'static dyn ContentStrategy {
    match category {
        FileCategory::TextDocument | FileCategory::Code | FileCategory::Data => &TEXT,
        FileCategory::Image => &IMAGE,
        FileCategory::Pdf => &PDF,
        FileCategory::Audio => &AUDIO,
        FileCategory::Video => &VIDEO,
        FileCategory::Office | FileCategory::Archive | FileCategory::Folder => &METADATA_ONLY,
    }
}

pub fn tools_for_category(category: FileCategory) -> Vec<&'static str> {
    match category {
        FileCategory::TextDocument | FileCategory::Code | FileCategory::Data => ALL_TOOLS.to_vec(),
        FileCategory::Folder => FOLDER_TOOLS.to_vec(),
        _ => BINARY_FILE_TOOLS.to_vec(),
    }
}

/// Run the gate/mode/body steps for an already-extracted metadata blob.
pub async fn build_content(
    path: &Path,
    metadata: MetadataBlob,
    caps: &ModelCapability,
    limits: &ContentLimits,
) -> FileContent {
    let category = metadata.core.category;
    let strategy = strategy_for(category);
    let available_tools = tools_for_category(category);

    let body = if strategy.should_send_body(&metadata, caps, limits) {
        let mode = strategy.body_mode(metadata.core.size, limits);
        match strategy.fetch_body(path, mode, &metadata, limits).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(path = %path.display(), "body fetch failed, sending metadata only: {}", e);
                Body::None
            }
        }
    } else {
        Body::None
    };

    FileContent {
        metadata,
        body,
        available_tools,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::CoreMetadata;
    use crate::models;

    fn blob(name: &str, ext: Option<&str>, size: u64, category: FileCategory) -> MetadataBlob {
        MetadataBlob {
            core: CoreMetadata {
                absolute_path: format!("/tmp/dl/{}", name),
                relative_path: name.to_string(),
                name: name.to_string(),
                extension: ext.map(str::to_string),
                size,
                created: None,
                modified: None,
                mime: mime_for_extension(ext).map(str::to_string),
                category,
                sha256: None,
            },
            typed: None,
        }
    }

    fn caps(id: &str) -> &'static ModelCapability {
        models::lookup(id).unwrap()
    }

    #[tokio::test]
    async fn small_text_goes_whole() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.txt");
        std::fs::write(&path, "line one\nline two\n").unwrap();
        let meta = blob("small.txt", Some("txt"), 18, FileCategory::TextDocument);

        let content = build_content(
            &path,
            meta,
            caps("openai/gpt-4o-mini"),
            &ContentLimits::default(),
        )
        .await;
        match content.body {
            Body::FullText { text } => assert!(text.contains("line one")),
            other => panic!("expected full text, got {:?}", other),
        }
        assert_eq!(content.available_tools.len(), 9);
    }

    #[tokio::test]
    async fn mid_size_text_is_clipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mid.log");
        let line = "x".repeat(100);
        let body: String = (0..300).map(|i| format!("{} {}\n", i, line)).collect();
        std::fs::write(&path, &body).unwrap();
        let size = body.len() as u64;
        assert!(size > 10 * 1024 && size <= 100 * 1024);
        let meta = blob("mid.log", Some("log"), size, FileCategory::TextDocument);

        let content = build_content(
            &path,
            meta,
            caps("openai/gpt-4o-mini"),
            &ContentLimits::default(),
        )
        .await;
        match content.body {
            Body::PartialText {
                head,
                tail,
                csv_header,
                omitted_lines,
            } => {
                assert!(head.starts_with("0 "));
                assert_eq!(head.lines().count(), 50);
                assert_eq!(tail.lines().count(), 50);
                assert!(tail.contains("299 "));
                assert_eq!(omitted_lines, 200);
                assert!(csv_header.is_none());
            }
            other => panic!("expected partial text, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn csv_header_is_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.csv");
        let mut body = String::from("id,name,email\n");
        for i in 0..300 {
            body.push_str(&format!("{},user{},u{}@example.com{}\n", i, i, i, " ".repeat(50)));
        }
        std::fs::write(&path, &body).unwrap();
        let size = body.len() as u64;
        assert!(size > 10 * 1024);
        let meta = blob("notes.csv", Some("csv"), size, FileCategory::Data);

        let content = build_content(
            &path,
            meta,
            caps("openai/gpt-4o-mini"),
            &ContentLimits::default(),
        )
        .await;
        match content.body {
            Body::PartialText {
                head, csv_header, ..
            } => {
                assert_eq!(csv_header.as_deref(), Some("id,name,email"));
                // First data row, not the header, leads the head section.
                assert!(head.starts_with("0,user0"));
            }
            other => panic!("expected partial text, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn oversize_text_sends_no_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.txt");
        std::fs::write(&path, "irrelevant").unwrap();
        let meta = blob("huge.txt", Some("txt"), 200 * 1024, FileCategory::TextDocument);

        let content = build_content(
            &path,
            meta,
            caps("openai/gpt-4o-mini"),
            &ContentLimits::default(),
        )
        .await;
        assert!(matches!(content.body, Body::None));
    }

    #[tokio::test]
    async fn image_attaches_when_model_supports_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pic.png");
        std::fs::write(&path, b"\x89PNGfake").unwrap();
        let meta = blob("pic.png", Some("png"), 8, FileCategory::Image);

        let content = build_content(
            &path,
            meta,
            caps("openai/gpt-4o-mini"),
            &ContentLimits::default(),
        )
        .await;
        match content.body {
            Body::FullBinary { media_type, bytes } => {
                assert_eq!(media_type, "image/png");
                assert_eq!(bytes.len(), 8);
            }
            other => panic!("expected binary body, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn pdf_needs_native_pdf_support() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        std::fs::write(&path, b"%PDF-1.7 fake").unwrap();
        let meta = blob("doc.pdf", Some("pdf"), 13, FileCategory::Pdf);

        // gpt-4o has no native PDF input in the registry: metadata only.
        let without = build_content(
            &path,
            meta.clone(),
            caps("openai/gpt-4o"),
            &ContentLimits::default(),
        )
        .await;
        assert!(matches!(without.body, Body::None));

        let with = build_content(
            &path,
            meta,
            caps("anthropic/claude-3-5-sonnet"),
            &ContentLimits::default(),
        )
        .await;
        assert!(matches!(with.body, Body::FullBinary { .. }));
    }

    #[tokio::test]
    async fn oversize_image_is_metadata_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.png");
        std::fs::write(&path, b"x").unwrap();
        let meta = blob("big.png", Some("png"), 6 * 1024 * 1024, FileCategory::Image);

        let content = build_content(
            &path,
            meta,
            caps("openai/gpt-4o-mini"),
            &ContentLimits::default(),
        )
        .await;
        assert!(matches!(content.body, Body::None));
    }

    #[tokio::test]
    async fn archives_never_send_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.zip");
        std::fs::write(&path, b"PK").unwrap();
        let meta = blob("bundle.zip", Some("zip"), 2, FileCategory::Archive);

        let content = build_content(
            &path,
            meta,
            caps("google/gemini-1.5-pro"),
            &ContentLimits::default(),
        )
        .await;
        assert!(matches!(content.body, Body::None));
        assert!(content.available_tools.contains(&"rename_file"));
        assert!(!content.available_tools.contains(&"sed"));
    }

    #[test]
    fn clip_with_few_long_lines_sends_everything() {
        let limits = ContentLimits::default();
        let text = "a\nb\nc";
        match clip_text(text, false, &limits) {
            Body::FullText { text } => assert_eq!(text, "a\nb\nc"),
            other => panic!("expected full text, got {:?}", other),
        }
    }
}
