//! Archive metadata from the ZIP end-of-central-directory record.
//!
//! ZIP-family archives (`.zip`, `.jar`) expose their entry count in a fixed
//! trailer; reading the last few KiB is enough. Other archive formats are
//! reported without typed metadata.

use std::io::SeekFrom;
use std::path::Path;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::{TypedExtractor, TypedMeta};
use crate::classify::FileCategory;
use crate::sandbox::extension_of;

/// EOCD is 22 bytes plus a comment of at most 65535 bytes.
const TRAILER_SCAN: u64 = 22 + 65_535;

const EOCD_SIGNATURE: [u8; 4] = [0x50, 0x4b, 0x05, 0x06];

pub struct ArchiveExtractor;

#[async_trait]
impl TypedExtractor for ArchiveExtractor {
    fn name(&self) -> &'static str {
        "archive"
    }

    fn handles(&self) -> &'static [FileCategory] {
        &[FileCategory::Archive]
    }

    async fn extract(&self, path: &Path) -> Option<TypedMeta> {
        match extension_of(path).as_deref() {
            Some("zip") | Some("jar") | Some("war") => {}
            _ => return None,
        }

        let entry_count = zip_entry_count(path).await?;
        Some(TypedMeta::Archive { entry_count })
    }
}

async fn zip_entry_count(path: &Path) -> Option<u32> {
    let mut file = tokio::fs::File::open(path).await.ok()?;
    let len = file.metadata().await.ok()?.len();
    let scan = len.min(TRAILER_SCAN);
    if scan < 22 {
        return None;
    }

    file.seek(SeekFrom::End(-(scan as i64))).await.ok()?;
    let mut buf = vec![0u8; scan as usize];
    file.read_exact(&mut buf).await.ok()?;

    // Scan backwards: the EOCD signature nearest the end is the real one.
    for start in (0..=buf.len().saturating_sub(22)).rev() {
        if buf[start..start + 4] == EOCD_SIGNATURE {
            let total = u16::from_le_bytes([buf[start + 10], buf[start + 11]]);
            return Some(total as u32);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hand-built empty-entry ZIP: no local files, an EOCD claiming `n`
    /// entries with an empty central directory and comment.
    fn eocd_only_zip(entries: u16) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&EOCD_SIGNATURE);
        out.extend_from_slice(&[0, 0]); // disk number
        out.extend_from_slice(&[0, 0]); // cd start disk
        out.extend_from_slice(&entries.to_le_bytes()); // entries this disk
        out.extend_from_slice(&entries.to_le_bytes()); // entries total
        out.extend_from_slice(&[0, 0, 0, 0]); // cd size
        out.extend_from_slice(&[0, 0, 0, 0]); // cd offset
        out.extend_from_slice(&[0, 0]); // comment length
        out
    }

    #[tokio::test]
    async fn reads_entry_count_from_trailer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.zip");
        std::fs::write(&path, eocd_only_zip(7)).unwrap();

        match ArchiveExtractor.extract(&path).await {
            Some(TypedMeta::Archive { entry_count }) => assert_eq!(entry_count, 7),
            other => panic!("expected archive metadata, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn non_zip_formats_report_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.tar.gz");
        std::fs::write(&path, vec![0u8; 64]).unwrap();
        assert!(ArchiveExtractor.extract(&path).await.is_none());
    }

    #[tokio::test]
    async fn truncated_zip_reports_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.zip");
        std::fs::write(&path, b"PK").unwrap();
        assert!(ArchiveExtractor.extract(&path).await.is_none());
    }
}
