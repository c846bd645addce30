//! Worker job runner
//!
//! Owns the execution boundary for ingestion jobs. The pipeline for each job
//! runs in its own tokio task; every error, panic, timeout, and cancellation
//! inside it is converted into exactly one terminal result addressed to the
//! originating job id. Nothing that happens inside a job can take down the
//! host: the host and the worker share no mutable state and communicate only
//! through the job's event channel and the lossy telemetry bus.

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::events::{EventBus, TelemetryEvent};
use crate::ingest::dispatcher;
use crate::tempo::{TempoExtractor, XmlTempoExtractor};
use crate::types::{IngestionJob, IngestionResult, JobEvent, PipelineOutput};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Buffered job events per channel; a job emits at most two chunk events plus
/// one terminal result, so this never applies back-pressure in practice
const JOB_CHANNEL_CAPACITY: usize = 16;

/// Spawns and supervises one ingestion task per submitted job
#[derive(Clone)]
pub struct IngestWorker {
    config: Arc<IngestConfig>,
    telemetry: EventBus,
    tempo: Arc<dyn TempoExtractor>,
}

impl IngestWorker {
    pub fn new(config: IngestConfig, telemetry: EventBus) -> Self {
        Self {
            config: Arc::new(config),
            telemetry,
            tempo: Arc::new(XmlTempoExtractor::new()),
        }
    }

    /// Replace the tempo extraction seam
    pub fn with_tempo_extractor(mut self, tempo: Arc<dyn TempoExtractor>) -> Self {
        self.tempo = tempo;
        self
    }

    /// Submit a job; events for it arrive on the returned handle
    ///
    /// The last message on the channel is always the terminal result, emitted
    /// exactly once whether the pipeline succeeds, fails, panics, times out,
    /// or is cancelled.
    pub fn submit(&self, job: IngestionJob) -> JobHandle {
        let (tx, rx) = mpsc::channel(JOB_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let job_id = job.job_id;

        tokio::spawn(run_job(
            job,
            self.config.clone(),
            tx,
            self.telemetry.clone(),
            self.tempo.clone(),
            cancel.clone(),
        ));

        JobHandle {
            job_id,
            events: rx,
            cancel,
        }
    }
}

/// Caller's side of one running job
pub struct JobHandle {
    pub job_id: Uuid,
    events: mpsc::Receiver<JobEvent>,
    cancel: CancellationToken,
}

impl JobHandle {
    /// Next event for this job; `None` after the terminal result was taken
    pub async fn recv(&mut self) -> Option<JobEvent> {
        self.events.recv().await
    }

    /// Ask the worker to abandon the job; it will still emit its terminal
    /// result
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Drain all remaining events through the terminal result
    pub async fn wait(mut self) -> (Vec<JobEvent>, Option<IngestionResult>) {
        let mut chunks = Vec::new();
        while let Some(event) = self.events.recv().await {
            match event {
                JobEvent::Finished(result) => return (chunks, Some(result)),
                chunk => chunks.push(chunk),
            }
        }
        (chunks, None)
    }
}

/// Supervise one job to its terminal result
async fn run_job(
    job: IngestionJob,
    config: Arc<IngestConfig>,
    tx: mpsc::Sender<JobEvent>,
    telemetry: EventBus,
    tempo: Arc<dyn TempoExtractor>,
    cancel: CancellationToken,
) {
    let job_id = job.job_id;
    let started = Instant::now();

    tracing::info!(job_id = %job_id, path = %job.file_path.display(), "ingestion job started");
    telemetry.emit_lossy(TelemetryEvent::JobStarted {
        job_id,
        file_path: job.file_path.display().to_string(),
        timestamp: Utc::now(),
    });

    let timeout = config.parse_timeout();
    let mut pipeline = tokio::spawn(dispatcher::execute_pipeline(
        job,
        config.clone(),
        tx.clone(),
        telemetry.clone(),
        tempo,
        started,
    ));

    let outcome: Result<PipelineOutput, IngestError> = tokio::select! {
        joined = &mut pipeline => match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                Err(IngestError::Unknown(format!("ingestion task panicked: {}", e)))
            }
            Err(_) => Err(IngestError::Cancelled),
        },
        _ = tokio::time::sleep(timeout) => {
            pipeline.abort();
            Err(IngestError::ParseTimeout {
                timeout_secs: config.parse_timeout_secs,
            })
        }
        _ = cancel.cancelled() => {
            pipeline.abort();
            Err(IngestError::Cancelled)
        }
    };

    let total = started.elapsed();
    let result = match outcome {
        Ok(output) => {
            tracing::info!(
                job_id = %job_id,
                file = %output.file_name,
                bytes = output.file_size_bytes,
                total_ms = total.as_millis() as u64,
                "ingestion complete"
            );
            IngestionResult::success(job_id, output, total)
        }
        Err(e) => {
            tracing::error!(job_id = %job_id, code = e.code(), "ingestion failed: {}", e);
            IngestionResult::failure(job_id, &e)
        }
    };

    telemetry.emit_lossy(TelemetryEvent::JobCompleted {
        job_id,
        success: result.is_success(),
        total_ms: total.as_millis() as u64,
        timestamp: Utc::now(),
    });

    if tx.send(JobEvent::Finished(result)).await.is_err() {
        tracing::warn!(job_id = %job_id, "result receiver dropped before terminal event");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TempoEvent;
    use std::path::PathBuf;

    fn write_temp(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("aria_ingest_worker_tests");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    const SMALL_SCORE: &str = "<?xml version=\"1.0\"?><score-partwise><part id=\"P1\"><measure number=\"1\"><note><duration>4</duration></note></measure></part></score-partwise>";

    #[tokio::test]
    async fn test_small_file_success_with_single_terminal_event() {
        let path = write_temp("ok.musicxml", SMALL_SCORE);
        let worker = IngestWorker::new(IngestConfig::default(), EventBus::new(16));
        let handle = worker.submit(IngestionJob::new(Uuid::new_v4(), &path));

        let (chunks, result) = handle.wait().await;
        assert!(chunks.is_empty(), "synchronous path emits no chunk events");
        match result.expect("terminal result") {
            IngestionResult::Success {
                content, file_name, ..
            } => {
                assert_eq!(content, SMALL_SCORE);
                assert_eq!(file_name, "ok.musicxml");
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_pipeline_error_becomes_terminal_failure() {
        let worker = IngestWorker::new(IngestConfig::default(), EventBus::new(16));
        let job_id = Uuid::new_v4();
        let handle = worker.submit(IngestionJob::new(job_id, "/nonexistent/missing.pdf"));

        let (chunks, result) = handle.wait().await;
        assert!(chunks.is_empty());
        match result.expect("terminal result") {
            IngestionResult::Failure {
                job_id: failed_id,
                error_code,
                ..
            } => {
                assert_eq!(failed_id, job_id);
                assert_eq!(error_code, "UNSUPPORTED_FILE_TYPE");
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    struct PanickingExtractor;

    impl TempoExtractor for PanickingExtractor {
        fn extract(&self, _document: &str) -> Vec<TempoEvent> {
            panic!("extractor blew up");
        }
    }

    #[tokio::test]
    async fn test_panic_inside_pipeline_is_contained() {
        let path = write_temp("panic.musicxml", SMALL_SCORE);
        let worker = IngestWorker::new(IngestConfig::default(), EventBus::new(16))
            .with_tempo_extractor(Arc::new(PanickingExtractor));
        let handle = worker.submit(IngestionJob::new(Uuid::new_v4(), &path));

        let (_, result) = handle.wait().await;
        match result.expect("terminal result") {
            IngestionResult::Failure { error_code, .. } => {
                assert_eq!(error_code, "UNKNOWN_ERROR");
            }
            other => panic!("expected contained panic, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_zero_timeout_reports_parse_timeout() {
        let path = write_temp("timeout.musicxml", SMALL_SCORE);
        let config = IngestConfig {
            parse_timeout_secs: 0,
            ..Default::default()
        };
        let worker = IngestWorker::new(config, EventBus::new(16));
        let handle = worker.submit(IngestionJob::new(Uuid::new_v4(), &path));

        let (_, result) = handle.wait().await;
        match result.expect("terminal result") {
            IngestionResult::Failure { error_code, .. } => {
                assert_eq!(error_code, "PARSE_TIMEOUT");
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancel_before_start_reports_cancelled() {
        let path = write_temp("cancel.musicxml", SMALL_SCORE);
        let worker = IngestWorker::new(IngestConfig::default(), EventBus::new(16));
        let handle = worker.submit(IngestionJob::new(Uuid::new_v4(), &path));
        handle.cancel();

        let (_, result) = handle.wait().await;
        match result.expect("terminal result") {
            IngestionResult::Failure { error_code, .. } => {
                assert_eq!(error_code, "CANCELLED");
            }
            other => panic!("expected cancellation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_telemetry_marks_all_milestones() {
        let path = write_temp("telemetry.musicxml", SMALL_SCORE);
        let bus = EventBus::new(64);
        let mut rx = bus.subscribe();
        let worker = IngestWorker::new(IngestConfig::default(), bus);
        let handle = worker.submit(IngestionJob::new(Uuid::new_v4(), &path));
        let (_, result) = handle.wait().await;
        assert!(result.unwrap().is_success());

        let mut kinds = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(TelemetryEvent::JobStarted { .. }) => kinds.push("started"),
                Ok(TelemetryEvent::FileStatted { .. }) => kinds.push("statted"),
                Ok(TelemetryEvent::RouteSelected { .. }) => kinds.push("routed"),
                Ok(TelemetryEvent::JobCompleted { .. }) => {
                    kinds.push("completed");
                    break;
                }
                Err(_) => break,
            }
        }
        assert_eq!(kinds, vec!["started", "statted", "routed", "completed"]);
    }
}
