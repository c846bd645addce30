//! Telemetry event system
//!
//! Telemetry is best-effort observability for the host: delivery is lossy,
//! fire-and-forget, and never blocks or fails the ingestion pipeline. Chunk
//! events and terminal results use the per-job mpsc channel instead (see
//! [`crate::worker`]); this bus carries only timing/progress signals.

use crate::types::IngestRoute;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Telemetry events emitted at pipeline milestones
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// Worker accepted the job
    JobStarted {
        job_id: Uuid,
        file_path: String,
        timestamp: DateTime<Utc>,
    },

    /// Path validated and file statted
    FileStatted {
        job_id: Uuid,
        size_bytes: u64,
        elapsed_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Dispatcher committed to an ingestion route
    RouteSelected {
        job_id: Uuid,
        route: IngestRoute,
        elapsed_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Terminal result emitted
    JobCompleted {
        job_id: Uuid,
        success: bool,
        total_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast bus for telemetry events
///
/// Subscribers that fall behind lose old events; emitting with no subscribers
/// is not an error.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TelemetryEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, discarding it if nobody is listening
    pub fn emit_lossy(&self, event: TelemetryEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

// ============================================================================
// Tests
// ============================================================================
