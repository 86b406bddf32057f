//! Best-effort PDF metadata from a bounded byte scan.
//!
//! No PDF parser dependency: the extractor reads at most the first mebibyte
//! and pulls the header version, an approximate page count, and the presence
//! of an `/Encrypt` dictionary. Anything unparseable degrades to `None`
//! fields rather than failing.

use std::path::Path;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;

use super::{TypedExtractor, TypedMeta};
use crate::classify::FileCategory;

const SCAN_CAP: usize = 1024 * 1024;

pub struct PdfExtractor;

#[async_trait]
impl TypedExtractor for PdfExtractor {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn handles(&self) -> &'static [FileCategory] {
        &[FileCategory::Pdf]
    }

    async fn extract(&self, path: &Path) -> Option<TypedMeta> {
        let mut file = tokio::fs::File::open(path).await.ok()?;
        let mut buf = vec![0u8; SCAN_CAP];
        let mut filled = 0;
        while filled < buf.len() {
            let n = file.read(&mut buf[filled..]).await.ok()?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);

        if !buf.starts_with(b"%PDF-") {
            return None;
        }

        let version = buf[5..]
            .split(|&b| b == b'\r' || b == b'\n')
            .next()
            .and_then(|v| std::str::from_utf8(v).ok())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        // `/Type /Page` also prefixes `/Type /Pages`; subtract the tree nodes.
        let pages_nodes = count_occurrences(&buf, b"/Type /Pages")
            + count_occurrences(&buf, b"/Type/Pages");
        let page_hits =
            count_occurrences(&buf, b"/Type /Page") + count_occurrences(&buf, b"/Type/Page");
        let page_count = page_hits
            .checked_sub(pages_nodes)
            .filter(|&n| n > 0)
            .map(|n| n as u32);

        let encrypted = count_occurrences(&buf, b"/Encrypt") > 0;

        Some(TypedMeta::Pdf {
            version,
            page_count,
            encrypted,
        })
    }
}

fn count_occurrences(haystack: &[u8], needle: &[u8]) -> usize {
    if needle.is_empty() || haystack.len() < needle.len() {
        return 0;
    }
    haystack
        .windows(needle.len())
        .filter(|w| *w == needle)
        .count()
}
