//! aria-ingest — Score Ingest service for the ARIA practice application
//!
//! Ingests MusicXML scores (plain `.xml`/`.musicxml` documents and `.mxl`
//! zip containers) into validated in-memory text plus derived tempo events,
//! keeping the host responsive regardless of file size. Large plain-text
//! files stream incrementally: the first few measures are handed to the
//! caller long before the whole file has been read, so the UI can start
//! rendering while ingestion continues in the background.
//!
//! Each job runs in an isolated worker task and communicates exclusively by
//! message passing: chunk events and exactly one terminal result per job on
//! the job channel, lossy telemetry on a broadcast bus.

pub mod config;
pub mod error;
pub mod events;
pub mod ingest;
pub mod tempo;
pub mod types;
pub mod worker;

pub use crate::config::IngestConfig;
pub use crate::error::{IngestError, Result};
pub use crate::events::{EventBus, TelemetryEvent};
pub use crate::types::{
    ChunkEvent, ChunkKind, FileClassification, IngestRoute, IngestionJob, IngestionMetrics,
    IngestionResult, JobEvent, ScoreFileKind, TempoEvent,
};
pub use crate::worker::{IngestWorker, JobHandle};
