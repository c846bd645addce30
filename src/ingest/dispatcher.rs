//! Ingestion route selection and pipeline execution
//!
//! Exactly one route per job: archives are always synchronous (extraction
//! must finish before any content exists), plain documents strictly below the
//! streaming threshold are read whole, everything else streams. The selection
//! happens after classification and before any content read.

use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::events::{EventBus, TelemetryEvent};
use crate::ingest::{archive, classify, streaming, structural};
use crate::tempo::TempoExtractor;
use crate::types::{
    FileClassification, IngestRoute, IngestionJob, JobEvent, PerfMarks, PipelineOutput,
    ScoreFileKind,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// Choose the ingestion route for a classified file
///
/// The streaming threshold is an exclusive upper bound for synchronous
/// handling: a plain file exactly at the threshold streams.
pub fn select_route(classification: &FileClassification, config: &IngestConfig) -> IngestRoute {
    match classification.kind {
        ScoreFileKind::Mxl => IngestRoute::ArchiveSync,
        ScoreFileKind::Xml | ScoreFileKind::MusicXml => {
            if classification.size_bytes < config.streaming_threshold_bytes {
                IngestRoute::PlainSync
            } else {
                IngestRoute::PlainStreaming
            }
        }
        // classification already rejected unsupported kinds
        ScoreFileKind::Unsupported => IngestRoute::PlainSync,
    }
}

/// Run the full pipeline for one job: validate, route, ingest, extract tempo
///
/// Chunk events (streaming only) go out on the job channel as they happen;
/// the returned output is what the worker packages into the terminal result.
pub async fn execute_pipeline(
    job: IngestionJob,
    config: Arc<IngestConfig>,
    events: mpsc::Sender<JobEvent>,
    telemetry: EventBus,
    tempo: Arc<dyn TempoExtractor>,
    started: Instant,
) -> Result<PipelineOutput> {
    let job_id = job.job_id;
    let mut marks = PerfMarks::default();

    let (path, classification) = classify::classify_path(&job.file_path, &config)?;
    telemetry.emit_lossy(TelemetryEvent::FileStatted {
        job_id,
        size_bytes: classification.size_bytes,
        elapsed_ms: started.elapsed().as_millis() as u64,
        timestamp: Utc::now(),
    });
    classify::ensure_within_limits(&classification, &config)?;

    let route = select_route(&classification, &config);
    tracing::info!(
        job_id = %job_id,
        route = ?route,
        size_bytes = classification.size_bytes,
        "ingestion route selected"
    );
    telemetry.emit_lossy(TelemetryEvent::RouteSelected {
        job_id,
        route,
        elapsed_ms: started.elapsed().as_millis() as u64,
        timestamp: Utc::now(),
    });

    let (content, measure_count) = match route {
        IngestRoute::ArchiveSync => {
            marks.read_start = Some(Instant::now());
            let text = archive::extract_score(&path, &config)?;
            marks.read_end = Some(Instant::now());

            marks.validate_start = Some(Instant::now());
            structural::validate_structure(&text)?;
            marks.validate_end = Some(Instant::now());
            (text, None)
        }
        IngestRoute::PlainSync => {
            marks.read_start = Some(Instant::now());
            let raw = tokio::fs::read(&path).await?;
            let text = String::from_utf8(raw).map_err(|_| {
                IngestError::StructuralValidationFailed("document is not valid UTF-8".to_string())
            })?;
            marks.read_end = Some(Instant::now());

            marks.validate_start = Some(Instant::now());
            structural::validate_structure(&text)?;
            marks.validate_end = Some(Instant::now());
            (text, None)
        }
        IngestRoute::PlainStreaming => {
            let (text, measures) = streaming::stream_plain_file(
                &path,
                &classification,
                &config,
                job_id,
                &events,
                &mut marks,
            )
            .await?;
            (text, Some(measures))
        }
    };

    let tempo_events = tempo.extract(&content);
    if !tempo_events.is_empty() {
        tracing::debug!(job_id = %job_id, count = tempo_events.len(), "tempo events extracted");
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    Ok(PipelineOutput {
        content,
        file_name,
        file_size_bytes: classification.size_bytes,
        measure_count,
        tempo_events,
        marks,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn classified(kind: ScoreFileKind, size_bytes: u64) -> FileClassification {
        FileClassification {
            kind,
            size_bytes,
            over_size_limit: false,
        }
    }

    #[test]
    fn test_archives_never_stream_regardless_of_size() {
        let config = IngestConfig::default();
        let huge = config.streaming_threshold_bytes * 10;
        assert_eq!(
            select_route(&classified(ScoreFileKind::Mxl, huge), &config),
            IngestRoute::ArchiveSync
        );
    }

    #[test]
    fn test_small_plain_files_are_synchronous() {
        let config = IngestConfig::default();
        assert_eq!(
            select_route(&classified(ScoreFileKind::Xml, 2048), &config),
            IngestRoute::PlainSync
        );
        assert_eq!(
            select_route(
                &classified(ScoreFileKind::MusicXml, config.streaming_threshold_bytes - 1),
                &config
            ),
            IngestRoute::PlainSync
        );
    }

    #[test]
    fn test_threshold_is_exclusive_for_synchronous_handling() {
        let config = IngestConfig::default();
        assert_eq!(
            select_route(
                &classified(ScoreFileKind::Xml, config.streaming_threshold_bytes),
                &config
            ),
            IngestRoute::PlainStreaming
        );
        assert_eq!(
            select_route(
                &classified(ScoreFileKind::Xml, config.streaming_threshold_bytes + 1),
                &config
            ),
            IngestRoute::PlainStreaming
        );
    }
}
