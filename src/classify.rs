//! File classification.
//!
//! A pure function of `(extension, mime)` into one of ten categories. The
//! category drives metadata extraction, the content-provider policy, and
//! which tools are offered to the model.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCategory {
    TextDocument,
    Code,
    Data,
    Image,
    Pdf,
    Audio,
    Video,
    Office,
    Archive,
    Folder,
}

impl FileCategory {
    pub fn label(&self) -> &'static str {
        match self {
            FileCategory::TextDocument => "text document",
            FileCategory::Code => "code",
            FileCategory::Data => "data",
            FileCategory::Image => "image",
            FileCategory::Pdf => "PDF",
            FileCategory::Audio => "audio",
            FileCategory::Video => "video",
            FileCategory::Office => "office document",
            FileCategory::Archive => "archive",
            FileCategory::Folder => "folder",
        }
    }
}

const CODE_EXTENSIONS: &[&str] = &[
    "rs", "py", "js", "jsx", "ts", "tsx", "go", "java", "c", "h", "cpp", "hpp", "cc", "cs", "rb",
    "php", "swift", "kt", "scala", "sh", "bash", "zsh", "fish", "ps1", "bat", "lua", "pl", "r",
    "sql", "html", "htm", "css", "scss", "less", "vue", "svelte", "zig", "ex", "exs", "erl", "hs",
    "ml", "clj", "dart", "m", "mm", "makefile", "dockerfile",
];

const DATA_EXTENSIONS: &[&str] = &[
    "json", "jsonl", "ndjson", "csv", "tsv", "xml", "yaml", "yml", "toml", "ini", "env",
    "properties", "parquet", "avro", "proto",
];

const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "rst", "org", "adoc", "log", "text", "rtf", "tex", "srt", "vtt",
];

const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "bmp", "tiff", "tif", "svg", "heic", "heif", "avif",
    "ico",
];

const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "wav", "flac", "ogg", "oga", "m4a", "aac", "wma", "opus", "aiff", "mid", "midi",
];

const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "avi", "mkv", "webm", "wmv", "flv", "mpg", "mpeg", "m4v", "3gp",
];

const OFFICE_EXTENSIONS: &[&str] = &[
    "doc", "docx", "xls", "xlsx", "ppt", "pptx", "odt", "ods", "odp", "pages", "numbers", "key",
];

const ARCHIVE_EXTENSIONS: &[&str] = &[
    "zip", "tar", "gz", "tgz", "bz2", "xz", "zst", "7z", "rar", "jar", "war", "iso", "dmg",
];

/// Classify a file by lowercased extension and optional mime type.
///
/// Mime prefixes short-circuit; otherwise the extension table decides.
/// Unknown extensions fall back to `TextDocument`.
pub fn classify(extension: Option<&str>, mime: Option<&str>) -> FileCategory {
    if let Some(mime) = mime {
        if mime == "application/pdf" {
            return FileCategory::Pdf;
        }
        if let Some(cat) = classify_mime_prefix(mime) {
            return cat;
        }
    }

    let ext = match extension {
        Some(e) => e.to_ascii_lowercase(),
        None => return FileCategory::TextDocument,
    };
    let ext = ext.as_str();

    if ext == "pdf" {
        FileCategory::Pdf
    } else if CODE_EXTENSIONS.contains(&ext) {
        FileCategory::Code
    } else if DATA_EXTENSIONS.contains(&ext) {
        FileCategory::Data
    } else if IMAGE_EXTENSIONS.contains(&ext) {
        FileCategory::Image
    } else if AUDIO_EXTENSIONS.contains(&ext) {
        FileCategory::Audio
    } else if VIDEO_EXTENSIONS.contains(&ext) {
        FileCategory::Video
    } else if OFFICE_EXTENSIONS.contains(&ext) {
        FileCategory::Office
    } else if ARCHIVE_EXTENSIONS.contains(&ext) {
        FileCategory::Archive
    } else if TEXT_EXTENSIONS.contains(&ext) {
        FileCategory::TextDocument
    } else {
        FileCategory::TextDocument
    }
}

fn classify_mime_prefix(mime: &str) -> Option<FileCategory> {
    if mime.starts_with("image/") {
        Some(FileCategory::Image)
    } else if mime.starts_with("video/") {
        Some(FileCategory::Video)
    } else if mime.starts_with("audio/") {
        Some(FileCategory::Audio)
    } else if mime.starts_with("text/") {
        Some(FileCategory::TextDocument)
    } else {
        None
    }
}

/// Best-effort mime type for an extension, used for prompt file parts and
/// classification of watcher events.
pub fn mime_for_extension(extension: Option<&str>) -> Option<&'static str> {
    let ext = extension?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tiff" | "tif" => "image/tiff",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "ogg" | "oga" => "audio/ogg",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "opus" => "audio/opus",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "json" => "application/json",
        "csv" => "text/csv",
        "xml" => "application/xml",
        "html" | "htm" => "text/html",
        "txt" | "md" | "log" => "text/plain",
        "zip" => "application/zip",
        "gz" | "tgz" => "application/gzip",
        "tar" => "application/x-tar",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => return None,
    };
    Some(mime)
}

/// Whether an extension names content the text tools must refuse.
/// Text, code, and data files are fair game; everything else is binary.
pub fn is_binary_extension(extension: Option<&str>) -> bool {
    match extension {
        None => false,
        Some(ext) => !matches!(
            classify(Some(ext), None),
            FileCategory::TextDocument | FileCategory::Code | FileCategory::Data
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_prefix_short_circuits() {
        assert_eq!(classify(Some("bin"), Some("image/png")), FileCategory::Image);
        assert_eq!(classify(None, Some("video/mp4")), FileCategory::Video);
        assert_eq!(classify(None, Some("audio/flac")), FileCategory::Audio);
        assert_eq!(
            classify(Some("weird"), Some("text/plain")),
            FileCategory::TextDocument
        );
    }

    #[test]
    fn extension_table_applies_without_mime() {
        assert_eq!(classify(Some("rs"), None), FileCategory::Code);
        assert_eq!(classify(Some("csv"), None), FileCategory::Data);
        assert_eq!(classify(Some("pdf"), None), FileCategory::Pdf);
        assert_eq!(classify(Some("docx"), None), FileCategory::Office);
        assert_eq!(classify(Some("zip"), None), FileCategory::Archive);
    }

    #[test]
    fn unknown_extension_is_text() {
        assert_eq!(classify(Some("xyzzy"), None), FileCategory::TextDocument);
        assert_eq!(classify(None, None), FileCategory::TextDocument);
    }

    #[test]
    fn multi_dot_names_use_final_extension() {
        // The caller passes the final extension; `.tar.gz` resolves to `gz`.
        assert_eq!(classify(Some("gz"), None), FileCategory::Archive);
    }

    #[test]
    fn binary_extension_gate() {
        assert!(is_binary_extension(Some("png")));
        assert!(is_binary_extension(Some("pdf")));
        assert!(is_binary_extension(Some("zip")));
        assert!(!is_binary_extension(Some("txt")));
        assert!(!is_binary_extension(Some("rs")));
        assert!(!is_binary_extension(Some("csv")));
        assert!(!is_binary_extension(None));
    }
}
