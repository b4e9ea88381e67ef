// src/error.rs
//! Error taxonomy for a digest run.
//!
//! Only `ConfigInvalid` and `DigestWrite` fail a whole run; every other
//! variant is scoped to one source and is reported, not propagated.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// No usable items for a source this run (error, timeout or empty list).
    #[error("extraction unavailable for source `{source_id}`: {reason}")]
    ExtractionUnavailable { source_id: String, reason: String },

    /// One extracted record failed boundary validation.
    #[error("malformed item from source `{source_id}`: {reason}")]
    MalformedItem { source_id: String, reason: String },

    /// Persisted state could not be read back; the source restarts empty.
    #[error("state for source `{source_id}` is corrupt at {}: {reason}", path.display())]
    StateCorrupt {
        source_id: String,
        path: PathBuf,
        reason: String,
    },

    /// State could not be durably written after the digest was emitted.
    #[error("failed to persist state for source `{source_id}`: {reason}")]
    PersistFailure { source_id: String, reason: String },

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("failed to write digest to {}: {source}", path.display())]
    DigestWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type PipelineResult<T> = Result<T, PipelineError>;
