//! Tempo extraction
//!
//! Runs once the full document text is available and attaches ordered tempo
//! change events to the result. Tempo data is an enrichment, not a
//! requirement: any internal failure degrades to "no tempo data" and never
//! fails the job.

use crate::types::TempoEvent;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::warn;

/// Pluggable tempo extraction seam
///
/// Implementations must be infallible at the interface: internal errors are
/// handled (or logged) and reported as an empty list.
pub trait TempoExtractor: Send + Sync {
    fn extract(&self, document: &str) -> Vec<TempoEvent>;
}

/// Default extractor: walks the document with quick-xml, reporting
/// `<sound tempo="...">` directions in document order
///
/// Offsets are quarter-note beats from the start of the first part,
/// accumulated from note durations against the current `divisions` value.
/// Later parts repeat the same music in time, so only the first part is
/// walked. Consecutive events with an unchanged BPM are dropped.
pub struct XmlTempoExtractor;

impl XmlTempoExtractor {
    pub fn new() -> Self {
        Self
    }

    fn try_extract(&self, document: &str) -> Result<Vec<TempoEvent>, quick_xml::Error> {
        let mut reader = Reader::from_str(document);
        let mut events: Vec<TempoEvent> = Vec::new();

        // positional state within the first part
        let mut divisions: f64 = 1.0;
        let mut beats: f64 = 0.0;
        let mut parts_seen: u32 = 0;
        let mut element_stack: Vec<String> = Vec::new();
        let mut pending_text = String::new();

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    if name == "part" {
                        parts_seen += 1;
                    }
                    if parts_seen <= 1 {
                        if let Some(tempo) = sound_tempo(&e)? {
                            push_tempo(&mut events, beats, tempo);
                        }
                    }
                    element_stack.push(name);
                    pending_text.clear();
                }
                Event::Empty(e) => {
                    if parts_seen <= 1 {
                        if let Some(tempo) = sound_tempo(&e)? {
                            push_tempo(&mut events, beats, tempo);
                        }
                    }
                }
                Event::Text(t) => {
                    pending_text = t.unescape()?.into_owned();
                }
                Event::End(e) => {
                    let qname = e.name();
                    let name = String::from_utf8_lossy(qname.as_ref());
                    if parts_seen <= 1 {
                        match &*name {
                            "divisions" => {
                                if let Ok(value) = pending_text.trim().parse::<f64>() {
                                    if value > 0.0 {
                                        divisions = value;
                                    }
                                }
                            }
                            "duration" => {
                                if let Ok(value) = pending_text.trim().parse::<f64>() {
                                    let delta = value / divisions;
                                    // backup rewinds the position, forward
                                    // and notes advance it
                                    match enclosing(&element_stack) {
                                        Some("backup") => beats -= delta,
                                        Some("note") | Some("forward") => beats += delta,
                                        _ => {}
                                    }
                                }
                            }
                            _ => {}
                        }
                    }
                    element_stack.pop();
                    pending_text.clear();
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(events)
    }
}

impl Default for XmlTempoExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl TempoExtractor for XmlTempoExtractor {
    fn extract(&self, document: &str) -> Vec<TempoEvent> {
        match self.try_extract(document) {
            Ok(events) => events,
            Err(e) => {
                warn!("tempo extraction failed, continuing without tempo data: {}", e);
                Vec::new()
            }
        }
    }
}

/// The element whose content a `<duration>` belongs to
fn enclosing(stack: &[String]) -> Option<&str> {
    stack
        .iter()
        .rev()
        .find(|name| matches!(name.as_str(), "note" | "backup" | "forward"))
        .map(|s| s.as_str())
}

fn sound_tempo(
    e: &quick_xml::events::BytesStart,
) -> Result<Option<f64>, quick_xml::Error> {
    if e.name().as_ref() != b"sound" {
        return Ok(None);
    }
    match e.try_get_attribute("tempo") {
        Ok(Some(attr)) => {
            let value = attr
                .unescape_value()
                .map(|v| v.trim().parse::<f64>().ok())
                .unwrap_or(None);
            Ok(value.filter(|bpm| *bpm > 0.0))
        }
        _ => Ok(None),
    }
}

fn push_tempo(events: &mut Vec<TempoEvent>, beats: f64, bpm: f64) {
    if events.last().map(|last| last.bpm) == Some(bpm) {
        return;
    }
    events.push(TempoEvent {
        time_offset: beats,
        bpm,
    });
}

// ============================================================================
// Tests
// ============================================================================
