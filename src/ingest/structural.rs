//! Structural validation of score documents
//!
//! Two cheap textual checks run before any parser is invoked: the XML
//! declaration prefix and one of the two recognized score roots. Only if both
//! pass does a generic well-formedness parse run; its output is discarded.
//! quick-xml does not resolve external entities, so crafted documents cannot
//! inject content through entity expansion.

use crate::error::{IngestError, Result};
use quick_xml::events::Event;
use quick_xml::Reader;

/// Recognized MusicXML root elements
const SCORE_ROOTS: [&str; 2] = ["<score-partwise", "<score-timewise"];

/// Confirm the text is a well-formed score document
///
/// The check is binary: nothing is extracted.
pub fn validate_structure(text: &str) -> Result<()> {
    let head = text.trim_start();

    if !head.starts_with("<?xml") {
        return Err(IngestError::StructuralValidationFailed(
            "missing XML declaration".to_string(),
        ));
    }

    if !SCORE_ROOTS.iter().any(|root| text.contains(root)) {
        return Err(IngestError::StructuralValidationFailed(
            "no score-partwise or score-timewise root element".to_string(),
        ));
    }

    let mut reader = Reader::from_str(text);
    loop {
        match reader.read_event() {
            Ok(Event::Eof) => return Ok(()),
            Ok(_) => {}
            Err(e) => {
                return Err(IngestError::StructuralValidationFailed(format!(
                    "malformed document at byte {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<score-partwise version=\"4.0\"><part id=\"P1\"><measure number=\"1\"><note><duration>4</duration></note></measure></part></score-partwise>";

    #[test]
    fn test_valid_document_passes() {
        assert!(validate_structure(VALID).is_ok());
    }

    #[test]
    fn test_timewise_root_accepted() {
        let doc = "<?xml version=\"1.0\"?><score-timewise><measure number=\"1\"/></score-timewise>";
        assert!(validate_structure(doc).is_ok());
    }

    #[test]
    fn test_missing_declaration_fails_fast() {
        let doc = "<score-partwise><part id=\"P1\"/></score-partwise>";
        let err = validate_structure(doc).unwrap_err();
        match err {
            IngestError::StructuralValidationFailed(msg) => {
                assert!(msg.contains("declaration"), "unexpected message: {}", msg)
            }
            other => panic!("expected StructuralValidationFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_unrecognized_root_fails_fast() {
        let doc = "<?xml version=\"1.0\"?><opus><score/></opus>";
        let err = validate_structure(doc).unwrap_err();
        match err {
            IngestError::StructuralValidationFailed(msg) => {
                assert!(msg.contains("root element"), "unexpected message: {}", msg)
            }
            other => panic!("expected StructuralValidationFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_unbalanced_tags_fail_the_parse() {
        let doc = "<?xml version=\"1.0\"?><score-partwise><part></score-partwise>";
        let err = validate_structure(doc).unwrap_err();
        assert!(matches!(err, IngestError::StructuralValidationFailed(_)));
    }

    #[test]
    fn test_leading_whitespace_before_declaration_allowed() {
        let doc = "\n  <?xml version=\"1.0\"?><score-partwise/>";
        assert!(validate_structure(doc).is_ok());
    }
}
