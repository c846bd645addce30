//! MXL container extraction
//!
//! An `.mxl` file is a zip archive holding one score document plus auxiliary
//! metadata under `META-INF/`. Only the central directory is scanned to find
//! the score entry; exactly that one entry is decompressed. The uncompressed
//! size cap is enforced on the entry itself, since a compressed-size limit
//! alone does not bound decompressed memory.

use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use zip::ZipArchive;

/// Reserved metadata directory inside MXL containers
const METADATA_DIR: &str = "META-INF/";
/// The container manifest, never a score document
const CONTAINER_MANIFEST: &str = "container.xml";

/// Extract the single embedded score document as text
///
/// Zero matching entries is fatal; among multiple matches the first entry in
/// central-directory order wins.
pub fn extract_score(path: &Path, config: &IngestConfig) -> Result<String> {
    let file = File::open(path)?;
    let mut archive =
        ZipArchive::new(file).map_err(|e| IngestError::ArchiveReadError(e.to_string()))?;

    let entry_index = find_score_entry(&mut archive)?;

    let mut entry = archive
        .by_index(entry_index)
        .map_err(|e| IngestError::ArchiveReadError(e.to_string()))?;

    // Declared size check first, then a hard read limit in case the central
    // directory lies about the entry size
    let limit = config.max_uncompressed_bytes;
    if entry.size() > limit {
        return Err(IngestError::FileTooLarge {
            size_bytes: entry.size(),
            limit_bytes: limit,
        });
    }

    let mut raw = Vec::with_capacity(entry.size() as usize);
    let read = entry
        .by_ref()
        .take(limit + 1)
        .read_to_end(&mut raw)
        .map_err(|e| IngestError::ArchiveReadError(e.to_string()))?;
    if read as u64 > limit {
        return Err(IngestError::FileTooLarge {
            size_bytes: read as u64,
            limit_bytes: limit,
        });
    }

    tracing::debug!(
        entry = entry.name(),
        uncompressed_bytes = read,
        "score entry extracted"
    );

    String::from_utf8(raw)
        .map_err(|_| IngestError::ArchiveReadError("score entry is not valid UTF-8".to_string()))
}

/// Scan the central directory for the score document entry
fn find_score_entry(archive: &mut ZipArchive<File>) -> Result<usize> {
    for i in 0..archive.len() {
        let entry = archive
            .by_index_raw(i)
            .map_err(|e| IngestError::ArchiveReadError(e.to_string()))?;
        let name = entry.name().to_string();

        if entry.is_dir() || name.starts_with("__MACOSX") {
            continue;
        }
        if name.starts_with(METADATA_DIR) {
            continue;
        }
        if name == CONTAINER_MANIFEST || name.ends_with("/container.xml") {
            continue;
        }

        let lower = name.to_lowercase();
        if lower.ends_with(".xml") || lower.ends_with(".musicxml") {
            return Ok(i);
        }
    }

    Err(IngestError::NoScoreInArchive)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn temp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("aria_ingest_archive_tests");
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    fn write_mxl(name: &str, entries: &[(&str, &str)]) -> PathBuf {
        let path = temp_path(name);
        let file = File::create(&path).unwrap();
        let mut zip = ZipWriter::new(file);
        for (entry_name, contents) in entries {
            zip.start_file(*entry_name, SimpleFileOptions::default())
                .unwrap();
            zip.write_all(contents.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
        path
    }

    const SCORE: &str = "<?xml version=\"1.0\"?><score-partwise><part id=\"P1\"><measure number=\"1\"/></part></score-partwise>";

    #[test]
    fn test_extracts_single_score_entry() {
        let path = write_mxl(
            "single.mxl",
            &[
                ("META-INF/container.xml", "<container/>"),
                ("sonata.xml", SCORE),
            ],
        );
        let text = extract_score(&path, &IngestConfig::default()).unwrap();
        assert_eq!(text, SCORE);
    }

    #[test]
    fn test_metadata_only_archive_has_no_score() {
        let path = write_mxl(
            "meta_only.mxl",
            &[("META-INF/container.xml", "<container/>")],
        );
        let err = extract_score(&path, &IngestConfig::default()).unwrap_err();
        assert!(matches!(err, IngestError::NoScoreInArchive));
    }

    #[test]
    fn test_root_container_manifest_is_not_a_score() {
        let path = write_mxl("manifest_only.mxl", &[("container.xml", "<container/>")]);
        let err = extract_score(&path, &IngestConfig::default()).unwrap_err();
        assert!(matches!(err, IngestError::NoScoreInArchive));
    }

    #[test]
    fn test_first_match_wins() {
        let path = write_mxl(
            "two_scores.mxl",
            &[("a.xml", "<first/>"), ("b.xml", "<second/>")],
        );
        let text = extract_score(&path, &IngestConfig::default()).unwrap();
        assert_eq!(text, "<first/>");
    }

    #[test]
    fn test_oversized_entry_rejected_after_decompression_check() {
        let config = IngestConfig {
            max_uncompressed_bytes: 16,
            ..Default::default()
        };
        let big = "x".repeat(64);
        let path = write_mxl("bomb.mxl", &[("score.xml", &big)]);
        let err = extract_score(&path, &config).unwrap_err();
        assert!(matches!(err, IngestError::FileTooLarge { .. }));
    }

    #[test]
    fn test_corrupt_archive_is_read_error() {
        let path = temp_path("corrupt.mxl");
        std::fs::write(&path, b"this is not a zip file at all").unwrap();
        let err = extract_score(&path, &IngestConfig::default()).unwrap_err();
        assert!(matches!(err, IngestError::ArchiveReadError(_)));
    }
}
