//! Ingestion configuration
//!
//! All limits and thresholds the pipeline enforces. Values are constants for
//! the lifetime of a worker, not per-job parameters; a host may load overrides
//! from a TOML file at startup.

use crate::error::{IngestError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Resource limits and thresholds for score ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Maximum size of a compressed (.mxl) container on disk
    pub max_compressed_bytes: u64,
    /// Maximum size of an uncompressed document, on disk or after extraction
    pub max_uncompressed_bytes: u64,
    /// Plain-text files strictly below this size are read synchronously;
    /// files at or above it are streamed
    pub streaming_threshold_bytes: u64,
    /// Read size per streaming iteration
    pub chunk_bytes: usize,
    /// Hard cap on the streaming session buffer
    pub buffer_cap_bytes: usize,
    /// Complete measures required before the first partial-content event
    pub first_chunk_measures: u64,
    /// Wall-clock bound on total pipeline time per job
    pub parse_timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_compressed_bytes: 10 * 1024 * 1024,
            max_uncompressed_bytes: 50 * 1024 * 1024,
            streaming_threshold_bytes: 1024 * 1024,
            chunk_bytes: 64 * 1024,
            buffer_cap_bytes: 64 * 1024 * 1024,
            first_chunk_measures: 4,
            parse_timeout_secs: 30,
        }
    }
}

impl IngestConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// missing keys
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: IngestConfig = toml::from_str(&content)
            .map_err(|e| IngestError::Unknown(format!("config parse failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.chunk_bytes == 0 {
            return Err(IngestError::Unknown(
                "chunk_bytes must be nonzero".to_string(),
            ));
        }
        if self.buffer_cap_bytes == 0 {
            return Err(IngestError::Unknown(
                "buffer_cap_bytes must be nonzero".to_string(),
            ));
        }
        if (self.buffer_cap_bytes as u64) < self.max_uncompressed_bytes {
            warn!(
                buffer_cap_bytes = self.buffer_cap_bytes,
                max_uncompressed_bytes = self.max_uncompressed_bytes,
                "buffer cap is below the uncompressed size limit; large valid files will overflow"
            );
        }
        Ok(())
    }

    pub fn parse_timeout(&self) -> Duration {
        Duration::from_secs(self.parse_timeout_secs)
    }

    /// Size cap applying to a file of the given compressedness
    pub fn size_limit_bytes(&self, compressed: bool) -> u64 {
        if compressed {
            self.max_compressed_bytes
        } else {
            self.max_uncompressed_bytes
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_consistent() {
        let config = IngestConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.streaming_threshold_bytes < config.max_uncompressed_bytes);
        assert!(config.max_compressed_bytes < config.max_uncompressed_bytes);
        assert!(config.chunk_bytes < config.buffer_cap_bytes);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: IngestConfig =
            toml::from_str("first_chunk_measures = 8\nchunk_bytes = 16384").unwrap();
        assert_eq!(config.first_chunk_measures, 8);
        assert_eq!(config.chunk_bytes, 16384);
        assert_eq!(
            config.max_uncompressed_bytes,
            IngestConfig::default().max_uncompressed_bytes
        );
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let config = IngestConfig {
            chunk_bytes: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_size_limit_selection() {
        let config = IngestConfig::default();
        assert_eq!(config.size_limit_bytes(true), config.max_compressed_bytes);
        assert_eq!(config.size_limit_bytes(false), config.max_uncompressed_bytes);
    }
}
