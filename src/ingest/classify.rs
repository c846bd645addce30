//! Path and size validation
//!
//! First line of defense against hostile or corrupted inputs: the extension
//! is checked before any I/O, the path is normalized, and the file is statted
//! exactly once. Nothing here reads file contents.

use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::types::{size_limit_for, FileClassification, ScoreFileKind};
use std::path::{Path, PathBuf};

/// Classify a caller-supplied path: normalized absolute path plus derived
/// extension/size facts
///
/// Unsupported extensions fail before the path is even touched.
pub fn classify_path(
    path: &Path,
    config: &IngestConfig,
) -> Result<(PathBuf, FileClassification)> {
    let kind = ScoreFileKind::from_path(path);
    if kind == ScoreFileKind::Unsupported {
        return Err(IngestError::UnsupportedFileType {
            extension: path
                .extension()
                .map(|e| e.to_string_lossy().to_string())
                .unwrap_or_default(),
        });
    }

    let normalized = path.canonicalize().map_err(|e| IngestError::InvalidPath {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let metadata = std::fs::metadata(&normalized).map_err(|e| IngestError::InvalidPath {
        path: normalized.clone(),
        reason: e.to_string(),
    })?;
    if !metadata.is_file() {
        return Err(IngestError::InvalidPath {
            path: normalized,
            reason: "not a regular file".to_string(),
        });
    }

    let size_bytes = metadata.len();
    let classification = FileClassification {
        kind,
        size_bytes,
        over_size_limit: size_bytes > size_limit_for(kind, config),
    };

    tracing::debug!(
        path = %normalized.display(),
        kind = ?classification.kind,
        size_bytes,
        "file classified"
    );

    Ok((normalized, classification))
}

/// Reject oversize inputs with the observed size and the applicable limit
pub fn ensure_within_limits(
    classification: &FileClassification,
    config: &IngestConfig,
) -> Result<()> {
    if classification.over_size_limit {
        return Err(IngestError::FileTooLarge {
            size_bytes: classification.size_bytes,
            limit_bytes: size_limit_for(classification.kind, config),
        });
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, contents: &[u8]) -> PathBuf {
        let dir = std::env::temp_dir().join("aria_ingest_classify_tests");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents).unwrap();
        path
    }

    #[test]
    fn test_unsupported_extension_fails_before_io() {
        let config = IngestConfig::default();
        // Path deliberately does not exist: the extension check must fire first
        let result = classify_path(Path::new("/nonexistent/score.pdf"), &config);
        match result.unwrap_err() {
            IngestError::UnsupportedFileType { extension } => assert_eq!(extension, "pdf"),
            other => panic!("expected UnsupportedFileType, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file_is_invalid_path() {
        let config = IngestConfig::default();
        let result = classify_path(Path::new("/nonexistent/score.xml"), &config);
        assert!(matches!(
            result.unwrap_err(),
            IngestError::InvalidPath { .. }
        ));
    }

    #[test]
    fn test_classification_of_small_xml() {
        let config = IngestConfig::default();
        let path = write_temp("small.xml", b"<?xml version=\"1.0\"?><score-partwise/>");
        let (normalized, classification) = classify_path(&path, &config).unwrap();
        assert!(normalized.is_absolute());
        assert_eq!(classification.kind, ScoreFileKind::Xml);
        assert_eq!(classification.size_bytes, 38);
        assert!(!classification.over_size_limit);
        assert!(ensure_within_limits(&classification, &config).is_ok());
    }

    #[test]
    fn test_oversize_flag_and_error() {
        let config = IngestConfig {
            max_uncompressed_bytes: 10,
            ..Default::default()
        };
        let path = write_temp("big.musicxml", &[b'x'; 32]);
        let (_, classification) = classify_path(&path, &config).unwrap();
        assert!(classification.over_size_limit);
        match ensure_within_limits(&classification, &config).unwrap_err() {
            IngestError::FileTooLarge {
                size_bytes,
                limit_bytes,
            } => {
                assert_eq!(size_bytes, 32);
                assert_eq!(limit_bytes, 10);
            }
            other => panic!("expected FileTooLarge, got {:?}", other),
        }
    }

    #[test]
    fn test_compressed_cap_applies_to_mxl() {
        let config = IngestConfig {
            max_compressed_bytes: 4,
            max_uncompressed_bytes: 1024,
            ..Default::default()
        };
        let path = write_temp("container.mxl", &[0u8; 16]);
        let (_, classification) = classify_path(&path, &config).unwrap();
        assert_eq!(classification.kind, ScoreFileKind::Mxl);
        assert!(classification.over_size_limit);
    }
}
