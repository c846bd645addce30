//! Error types for aria-ingest
//!
//! Every failure inside the ingestion pipeline is one of these variants; the
//! worker boundary converts them into terminal failure results, so no error
//! here ever unwinds past a job.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Ingestion error taxonomy
#[derive(Debug, Error)]
pub enum IngestError {
    /// Path could not be normalized, or does not point at a regular file
    #[error("Invalid path {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    /// File (or decompressed archive entry) exceeds the configured cap
    #[error("File too large: {size_bytes} bytes (limit {limit_bytes} bytes)")]
    FileTooLarge { size_bytes: u64, limit_bytes: u64 },

    /// Extension is not one of xml / musicxml / mxl
    #[error("Unsupported file type: .{extension}")]
    UnsupportedFileType { extension: String },

    /// Archive contains no score document outside the metadata directory
    #[error("No score document found in archive")]
    NoScoreInArchive,

    /// Container is corrupt or an entry could not be read
    #[error("Archive read error: {0}")]
    ArchiveReadError(String),

    /// Document failed the structural sanity checks
    #[error("Structural validation failed: {0}")]
    StructuralValidationFailed(String),

    /// Streaming is only defined for plain-text documents
    #[error("Streaming ingestion is not supported for archive files")]
    StreamingNotSupportedForArchive,

    /// Appending the next chunk would exceed the session buffer cap
    #[error("Streaming buffer overflow: {needed_bytes} bytes needed (cap {cap_bytes} bytes)")]
    BufferOverflow { needed_bytes: usize, cap_bytes: usize },

    /// Wall-clock bound on total pipeline time exceeded
    #[error("Parse timeout: job exceeded {timeout_secs}s")]
    ParseTimeout { timeout_secs: u64 },

    /// Job was cancelled by the host before completion
    #[error("Job cancelled")]
    Cancelled,

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Catch-all for anything not classified above
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl IngestError {
    /// Stable machine-readable code for host-side handling
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::InvalidPath { .. } => "INVALID_PATH",
            IngestError::FileTooLarge { .. } => "FILE_TOO_LARGE",
            IngestError::UnsupportedFileType { .. } => "UNSUPPORTED_FILE_TYPE",
            IngestError::NoScoreInArchive => "NO_SCORE_IN_ARCHIVE",
            IngestError::ArchiveReadError(_) => "ARCHIVE_READ_ERROR",
            IngestError::StructuralValidationFailed(_) => "STRUCTURAL_VALIDATION_FAILED",
            IngestError::StreamingNotSupportedForArchive => "STREAMING_NOT_SUPPORTED_FOR_ARCHIVE",
            IngestError::BufferOverflow { .. } => "BUFFER_OVERFLOW",
            IngestError::ParseTimeout { .. } => "PARSE_TIMEOUT",
            IngestError::Cancelled => "CANCELLED",
            IngestError::Io(_) => "IO_ERROR",
            IngestError::Unknown(_) => "UNKNOWN_ERROR",
        }
    }

    /// Deterministic errors are never worth retrying with the same input
    pub fn is_retryable(&self) -> bool {
        matches!(self, IngestError::Io(_) | IngestError::ParseTimeout { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================
