//! Core data model for score ingestion
//!
//! Jobs flow in, chunk events and exactly one terminal result flow out.

use crate::config::IngestConfig;
use crate::error::IngestError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// One ingestion request, owned by the worker for its lifetime
#[derive(Debug, Clone)]
pub struct IngestionJob {
    /// Caller-assigned correlation token, unique per request
    pub job_id: Uuid,
    /// Path to the score file; normalized by the path validator
    pub file_path: PathBuf,
}

impl IngestionJob {
    pub fn new(job_id: Uuid, file_path: impl Into<PathBuf>) -> Self {
        Self {
            job_id,
            file_path: file_path.into(),
        }
    }
}

/// Recognized score file kinds, derived from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreFileKind {
    Xml,
    MusicXml,
    Mxl,
    Unsupported,
}

impl ScoreFileKind {
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .as_deref()
        {
            Some("xml") => ScoreFileKind::Xml,
            Some("musicxml") => ScoreFileKind::MusicXml,
            Some("mxl") => ScoreFileKind::Mxl,
            _ => ScoreFileKind::Unsupported,
        }
    }

    /// Archive containers are compressed; plain documents are not
    pub fn is_compressed(&self) -> bool {
        matches!(self, ScoreFileKind::Mxl)
    }
}

/// Classification computed once per job before any content read
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FileClassification {
    pub kind: ScoreFileKind,
    pub size_bytes: u64,
    pub over_size_limit: bool,
}

/// Route selected by the dispatcher for one job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestRoute {
    /// Extract the archive entry, then validate (never streamed)
    ArchiveSync,
    /// Read the whole document, then validate
    PlainSync,
    /// Incremental measure-boundary streaming
    PlainStreaming,
}

/// Milestone payload emitted by the streaming parser
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkEvent {
    pub kind: ChunkKind,
    /// Document text accumulated so far; for `First` this is a strict byte
    /// prefix of the eventual `Complete` content
    pub content: String,
    /// Fully closed measures seen so far, exact and monotone
    pub measure_count: u64,
    pub is_complete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    First,
    Complete,
}

/// A tempo change extracted from the document
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoEvent {
    /// Offset from score start, in quarter-note beats
    pub time_offset: f64,
    pub bpm: f64,
}

/// Wall-clock durations between named pipeline marks
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct IngestionMetrics {
    pub read_time_ms: u64,
    pub parse_time_ms: u64,
    pub total_time_ms: u64,
}

/// Named timing marks scoped to one job
///
/// A mark that was never set reports a zero duration rather than an error;
/// the streaming path, for example, never sets the validate marks.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerfMarks {
    pub read_start: Option<Instant>,
    pub read_end: Option<Instant>,
    pub validate_start: Option<Instant>,
    pub validate_end: Option<Instant>,
    pub first_chunk: Option<Instant>,
}

impl PerfMarks {
    fn span_ms(start: Option<Instant>, end: Option<Instant>) -> u64 {
        match (start, end) {
            (Some(s), Some(e)) => e.saturating_duration_since(s).as_millis() as u64,
            _ => 0,
        }
    }

    pub fn into_metrics(self, total: Duration) -> IngestionMetrics {
        IngestionMetrics {
            read_time_ms: Self::span_ms(self.read_start, self.read_end),
            parse_time_ms: Self::span_ms(self.validate_start, self.validate_end),
            total_time_ms: total.as_millis() as u64,
        }
    }
}

/// Everything the pipeline hands back on success; the worker packages it
/// into the terminal result
#[derive(Debug)]
pub struct PipelineOutput {
    pub content: String,
    pub file_name: String,
    pub file_size_bytes: u64,
    /// Total measures counted; only the streaming path counts
    pub measure_count: Option<u64>,
    pub tempo_events: Vec<TempoEvent>,
    pub marks: PerfMarks,
}

/// Terminal outcome of one job, emitted exactly once
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum IngestionResult {
    Success {
        job_id: Uuid,
        file_name: String,
        file_size_bytes: u64,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        measure_count: Option<u64>,
        tempo_events: Vec<TempoEvent>,
        metrics: IngestionMetrics,
    },
    Failure {
        job_id: Uuid,
        error_code: String,
        error_message: String,
    },
}

impl IngestionResult {
    pub fn success(job_id: Uuid, output: PipelineOutput, total: Duration) -> Self {
        IngestionResult::Success {
            job_id,
            file_name: output.file_name,
            file_size_bytes: output.file_size_bytes,
            content: output.content,
            measure_count: output.measure_count,
            tempo_events: output.tempo_events,
            metrics: output.marks.into_metrics(total),
        }
    }

    pub fn failure(job_id: Uuid, error: &IngestError) -> Self {
        IngestionResult::Failure {
            job_id,
            error_code: error.code().to_string(),
            error_message: error.to_string(),
        }
    }

    pub fn job_id(&self) -> Uuid {
        match self {
            IngestionResult::Success { job_id, .. } => *job_id,
            IngestionResult::Failure { job_id, .. } => *job_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, IngestionResult::Success { .. })
    }
}

/// Per-job outbound message: zero or more chunk events, then the terminal
/// result as the last message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    Chunk(ChunkEvent),
    Finished(IngestionResult),
}

/// Size cap applying to a classified file
pub fn size_limit_for(kind: ScoreFileKind, config: &IngestConfig) -> u64 {
    config.size_limit_bytes(kind.is_compressed())
}

// ============================================================================
// Tests
// ============================================================================
