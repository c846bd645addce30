//! Streaming measure parser
//!
//! Converts a sequential stream of byte chunks into two externally observable
//! milestones: a `first` chunk event once a configured number of complete
//! measures has been seen, and a `complete` event at end-of-stream. The
//! document is not well-formed until the stream ends, so no real XML parse
//! happens here; a byte-level boundary scanner counts `measure` elements
//! instead. Scanner state carries across chunk boundaries, so a tag split
//! anywhere, including mid-name, is neither missed nor double-counted.
//!
//! The session buffer is the sole back-pressure mechanism: a chunk that would
//! push it past the cap fails the session outright. Truncating instead would
//! corrupt downstream parsing.

use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::types::{ChunkEvent, ChunkKind, FileClassification, JobEvent, PerfMarks, ScoreFileKind};
use std::path::Path;
use std::time::Instant;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use uuid::Uuid;

const MEASURE: &[u8] = b"measure";

/// Byte-level scanner for complete `measure` elements
///
/// A measure is complete at `</measure>` (whitespace allowed before the `>`)
/// or at a self-closing `<measure/>`, which counts as one empty measure.
/// Quoted `>` inside attribute values and measure tags inside comments are
/// misread by design; counting tag occurrences without parsing is the
/// performance trade-off this component makes.
#[derive(Debug, Clone, Copy)]
pub struct MeasureBoundaryScanner {
    state: ScanState,
}

#[derive(Debug, Clone, Copy)]
enum ScanState {
    Text,
    Tag(TagState),
}

#[derive(Debug, Clone, Copy)]
struct TagState {
    closing: bool,
    name_len: usize,
    name_matches: bool,
    name_done: bool,
    prev_slash: bool,
}

impl TagState {
    fn start() -> Self {
        Self {
            closing: false,
            name_len: 0,
            name_matches: true,
            name_done: false,
            prev_slash: false,
        }
    }
}

impl MeasureBoundaryScanner {
    pub fn new() -> Self {
        Self {
            state: ScanState::Text,
        }
    }

    /// Scan one chunk, returning the number of measures completed within it
    pub fn feed(&mut self, bytes: &[u8]) -> u64 {
        let mut completed = 0;

        for &b in bytes {
            self.state = match self.state {
                ScanState::Text => {
                    if b == b'<' {
                        ScanState::Tag(TagState::start())
                    } else {
                        ScanState::Text
                    }
                }
                ScanState::Tag(mut tag) => {
                    if b == b'<' {
                        // stray '<' inside markup; restart the tag scan here
                        ScanState::Tag(TagState::start())
                    } else {
                        let mut at_delimiter = tag.name_done;
                        if !tag.name_done {
                            match b {
                                b'/' if tag.name_len == 0 && !tag.closing => {
                                    tag.closing = true;
                                }
                                b'>' | b'/' | b' ' | b'\t' | b'\r' | b'\n' => {
                                    tag.name_done = true;
                                    at_delimiter = true;
                                }
                                _ => {
                                    if !(tag.name_len < MEASURE.len()
                                        && b == MEASURE[tag.name_len])
                                    {
                                        tag.name_matches = false;
                                    }
                                    tag.name_len += 1;
                                }
                            }
                        }

                        if at_delimiter && b == b'>' {
                            let is_measure =
                                tag.name_matches && tag.name_len == MEASURE.len();
                            if is_measure && (tag.closing || tag.prev_slash) {
                                completed += 1;
                            }
                            ScanState::Text
                        } else {
                            if at_delimiter {
                                tag.prev_slash = b == b'/';
                            }
                            ScanState::Tag(tag)
                        }
                    }
                }
            };
        }

        completed
    }
}

impl Default for MeasureBoundaryScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Live state of one streaming ingestion
///
/// Owned exclusively by the driving loop for the duration of one job.
pub struct StreamingSession {
    buffer: Vec<u8>,
    buffer_cap_bytes: usize,
    first_chunk_measures: u64,
    measures_seen: u64,
    first_emitted: bool,
    scanner: MeasureBoundaryScanner,
}

impl StreamingSession {
    pub fn new(config: &IngestConfig) -> Self {
        Self {
            buffer: Vec::new(),
            buffer_cap_bytes: config.buffer_cap_bytes,
            first_chunk_measures: config.first_chunk_measures,
            measures_seen: 0,
            first_emitted: false,
            scanner: MeasureBoundaryScanner::new(),
        }
    }

    /// Append one chunk, enforcing the buffer cap before the append
    ///
    /// Returns the `first` event the first time the measure threshold is
    /// reached. The event's content is the longest valid-UTF-8 prefix of the
    /// bytes so far, so it is always a strict byte prefix of the eventual
    /// complete content.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Result<Option<ChunkEvent>> {
        let needed = self.buffer.len() + chunk.len();
        if needed > self.buffer_cap_bytes {
            return Err(IngestError::BufferOverflow {
                needed_bytes: needed,
                cap_bytes: self.buffer_cap_bytes,
            });
        }

        self.buffer.extend_from_slice(chunk);
        self.measures_seen += self.scanner.feed(chunk);

        if !self.first_emitted && self.measures_seen >= self.first_chunk_measures {
            self.first_emitted = true;
            return Ok(Some(ChunkEvent {
                kind: ChunkKind::First,
                content: utf8_prefix(&self.buffer).to_string(),
                measure_count: self.measures_seen,
                is_complete: false,
            }));
        }

        Ok(None)
    }

    /// End of input: the complete event with the full text and total count
    pub fn finish(self) -> Result<ChunkEvent> {
        let content = String::from_utf8(self.buffer).map_err(|_| {
            IngestError::StructuralValidationFailed("document is not valid UTF-8".to_string())
        })?;

        Ok(ChunkEvent {
            kind: ChunkKind::Complete,
            content,
            measure_count: self.measures_seen,
            is_complete: true,
        })
    }

    pub fn measures_seen(&self) -> u64 {
        self.measures_seen
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffer.len()
    }
}

/// Longest valid-UTF-8 prefix of the buffer; at most 3 bytes are held back
fn utf8_prefix(bytes: &[u8]) -> &str {
    match std::str::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => std::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or(""),
    }
}

/// Drive a streaming ingestion of one plain-text file
///
/// Emits at most one `first` chunk event and exactly one `complete` chunk
/// event on the job channel, and returns the full text and total measure
/// count for the terminal result. Archives cannot be streamed: they require
/// full decompression before any content exists to stream.
pub async fn stream_plain_file(
    path: &Path,
    classification: &FileClassification,
    config: &IngestConfig,
    job_id: Uuid,
    events: &mpsc::Sender<JobEvent>,
    marks: &mut PerfMarks,
) -> Result<(String, u64)> {
    if classification.kind == ScoreFileKind::Mxl {
        return Err(IngestError::StreamingNotSupportedForArchive);
    }

    let mut session = StreamingSession::new(config);
    let mut file = tokio::fs::File::open(path).await?;
    let mut chunk = vec![0u8; config.chunk_bytes];

    marks.read_start = Some(Instant::now());

    loop {
        let n = file.read(&mut chunk).await?;
        if n == 0 {
            break;
        }

        if let Some(first) = session.push_chunk(&chunk[..n])? {
            marks.first_chunk = Some(Instant::now());
            tracing::info!(
                job_id = %job_id,
                measures = first.measure_count,
                buffered_bytes = session.buffered_bytes(),
                "first usable prefix ready"
            );
            if events.send(JobEvent::Chunk(first)).await.is_err() {
                tracing::warn!(job_id = %job_id, "chunk event receiver dropped");
            }
        }
    }

    marks.read_end = Some(Instant::now());

    let complete = session.finish()?;
    let content = complete.content.clone();
    let measure_count = complete.measure_count;

    tracing::info!(
        job_id = %job_id,
        measure_count,
        bytes = content.len(),
        "stream complete"
    );
    if events.send(JobEvent::Chunk(complete)).await.is_err() {
        tracing::warn!(job_id = %job_id, "chunk event receiver dropped");
    }

    Ok((content, measure_count))
}

// ============================================================================
// Tests
// ============================================================================
