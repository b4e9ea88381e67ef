// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod differ;
pub mod digest;
pub mod error;
pub mod fingerprint;
pub mod fsio;
pub mod ingest;
pub mod metrics;
pub mod pipeline;
pub mod state;

// ---- Re-exports for stable public API ----
pub use crate::config::{DigestConfig, SourceConfig};
pub use crate::differ::{diff, DiffConfig, DiffOutcome, DiffStats};
pub use crate::digest::{generate, Digest, DigestEntry, DigestSink, FileDigestSink, MemoryDigestSink};
pub use crate::error::{PipelineError, PipelineResult};
pub use crate::fingerprint::{fingerprint, Fingerprint};
pub use crate::ingest::types::{ContentExtractor, Item, RawItem};
pub use crate::pipeline::{Pipeline, RunReport, SourceOutcome, SourceStatus};
pub use crate::state::{FileStateStore, MemoryStateStore, SeenRecord, SourceState, StateStore};
