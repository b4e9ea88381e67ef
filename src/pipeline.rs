// src/pipeline.rs
//! Run orchestration: extract → validate → diff per source (concurrently),
//! then one serialization point: render, write digest, persist state.
//!
//! No state is saved before the digest is written. Dropping the `run`
//! future before that point leaves every state file as it was.

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{DigestConfig, SourceConfig};
use crate::differ::{diff, DiffStats};
use crate::digest::{generate, Digest, DigestSink};
use crate::error::{PipelineError, PipelineResult};
use crate::ingest::types::{ContentExtractor, Item, RawItem};
use crate::ingest::{ensure_metrics_described, validate_batch};
use crate::state::{SourceState, StateStore};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceStatus {
    /// New items went into the digest and the state was saved.
    Delivered,
    /// Extraction worked but nothing new survived the diff.
    NoNewContent,
    /// Extraction failed, timed out, or yielded no valid items; state untouched.
    Unavailable { reason: String },
    /// Items are in the digest but the state save failed; they will be reported again.
    PersistFailed { reason: String },
    /// Processing for this source aborted unexpectedly; state untouched.
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceOutcome {
    pub source_id: String,
    pub status: SourceStatus,
    pub malformed: usize,
    pub stats: DiffStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub digest_path: Option<PathBuf>,
    pub digest: Option<Digest>,
    /// One entry per enabled source, in configuration order.
    pub outcomes: Vec<SourceOutcome>,
}

impl RunReport {
    pub fn total_new(&self) -> usize {
        self.digest.as_ref().map_or(0, Digest::item_count)
    }

    pub fn outcome(&self, source_id: &str) -> Option<&SourceOutcome> {
        self.outcomes.iter().find(|o| o.source_id == source_id)
    }

    pub fn count(&self, pred: impl Fn(&SourceStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

/// Result of the concurrent per-source phase.
struct SourceResult {
    outcome: SourceOutcome,
    new_items: Vec<Item>,
    updated_state: Option<SourceState>,
}

impl SourceResult {
    fn unavailable(source_id: &str, malformed: usize, reason: String) -> Self {
        Self {
            outcome: SourceOutcome {
                source_id: source_id.to_string(),
                status: SourceStatus::Unavailable { reason },
                malformed,
                stats: DiffStats::default(),
            },
            new_items: Vec::new(),
            updated_state: None,
        }
    }
}

pub struct Pipeline {
    sources: Vec<SourceConfig>,
    default_min_confidence: f32,
    extraction_timeout: Duration,
    extractor: Arc<dyn ContentExtractor>,
    store: Arc<dyn StateStore>,
    sink: Arc<dyn DigestSink>,
}

impl Pipeline {
    /// Only enabled sources are kept, in their configured order.
    pub fn new(
        sources: Vec<SourceConfig>,
        extractor: Arc<dyn ContentExtractor>,
        store: Arc<dyn StateStore>,
        sink: Arc<dyn DigestSink>,
    ) -> Self {
        Self {
            sources: sources.into_iter().filter(|s| s.enabled).collect(),
            default_min_confidence: crate::config::sources::DEFAULT_MIN_CONFIDENCE,
            extraction_timeout: Duration::from_secs(30),
            extractor,
            store,
            sink,
        }
    }

    pub fn from_config(
        cfg: &DigestConfig,
        extractor: Arc<dyn ContentExtractor>,
        store: Arc<dyn StateStore>,
        sink: Arc<dyn DigestSink>,
    ) -> Self {
        Self::new(cfg.enabled_sources(), extractor, store, sink)
            .with_min_confidence(cfg.digest.min_confidence)
            .with_timeout(cfg.digest.extraction_timeout())
    }

    pub fn with_min_confidence(mut self, c: f32) -> Self {
        self.default_min_confidence = c;
        self
    }

    pub fn with_timeout(mut self, t: Duration) -> Self {
        self.extraction_timeout = t;
        self
    }

    pub fn sources(&self) -> &[SourceConfig] {
        &self.sources
    }

    /// Execute one run with `now` as the run clock.
    ///
    /// Fails only if the digest cannot be written; per-source problems are
    /// reported in the returned `RunReport`.
    pub async fn run(&self, now: DateTime<Utc>) -> PipelineResult<RunReport> {
        ensure_metrics_described();
        tracing::info!(target: "pipeline", sources = self.sources.len(), "run started");

        let results = self.process_sources(now).await;

        let mut new_items: HashMap<String, Vec<Item>> = HashMap::new();
        let mut pending: Vec<(usize, SourceState)> = Vec::new();
        let mut outcomes = Vec::with_capacity(results.len());
        for (idx, r) in results.into_iter().enumerate() {
            if let Some(state) = r.updated_state {
                pending.push((idx, state));
                new_items.insert(r.outcome.source_id.clone(), r.new_items);
            }
            outcomes.push(r.outcome);
        }

        let digest = generate(&new_items, &self.sources, now);
        let mut report = RunReport {
            started_at: now,
            digest_path: None,
            digest: None,
            outcomes,
        };

        if digest.is_empty() {
            tracing::info!(target: "pipeline", "no new content, nothing written");
            finish_run(now);
            return Ok(report);
        }

        let rendered = digest.render();
        let path = self.sink.write(&digest, &rendered).map_err(|e| {
            tracing::error!(target: "pipeline", error = %e, "digest write failed, state left untouched");
            e
        })?;
        tracing::info!(
            target: "pipeline",
            path = %path.display(),
            sources = digest.source_count(),
            items = digest.item_count(),
            "digest written"
        );

        for (idx, state) in pending {
            let outcome = &mut report.outcomes[idx];
            match self.store.save(&outcome.source_id, &state) {
                Ok(()) => outcome.status = SourceStatus::Delivered,
                Err(e) => {
                    tracing::error!(
                        target: "state",
                        source = %outcome.source_id,
                        error = %e,
                        "state not saved; these items will be reported again next run"
                    );
                    counter!("digest_state_persist_failures_total").increment(1);
                    outcome.status = SourceStatus::PersistFailed {
                        reason: e.to_string(),
                    };
                }
            }
        }

        report.digest_path = Some(path);
        report.digest = Some(digest);
        finish_run(now);
        Ok(report)
    }

    /// Per-source phase. Each source runs in its own task; results come back
    /// in configuration order regardless of completion order.
    async fn process_sources(&self, now: DateTime<Utc>) -> Vec<SourceResult> {
        let handles: Vec<_> = self
            .sources
            .iter()
            .cloned()
            .map(|src| {
                let extractor = Arc::clone(&self.extractor);
                let store = Arc::clone(&self.store);
                let timeout = self.extraction_timeout;
                let min_conf = self.default_min_confidence;
                let id = src.id.clone();
                let handle = tokio::spawn(async move {
                    let raw = extract_with_timeout(extractor.as_ref(), &src, timeout).await;
                    // State loads hit the disk; keep them off the runtime workers.
                    tokio::task::spawn_blocking(move || {
                        process_source(&src, raw, store.as_ref(), min_conf, now)
                    })
                    .await
                });
                (id, handle)
            })
            .collect();

        let mut out = Vec::with_capacity(handles.len());
        for (id, handle) in handles {
            match handle.await {
                Ok(Ok(r)) => out.push(r),
                Ok(Err(e)) | Err(e) => {
                    tracing::error!(target: "pipeline", source = %id, error = %e, "source task aborted");
                    out.push(SourceResult {
                        outcome: SourceOutcome {
                            source_id: id,
                            status: SourceStatus::Failed {
                                reason: e.to_string(),
                            },
                            malformed: 0,
                            stats: DiffStats::default(),
                        },
                        new_items: Vec::new(),
                        updated_state: None,
                    });
                }
            }
        }
        out
    }
}

fn finish_run(now: DateTime<Utc>) {
    counter!("digest_runs_total").increment(1);
    gauge!("digest_last_run_ts").set(now.timestamp().max(0) as f64);
}

async fn extract_with_timeout(
    extractor: &dyn ContentExtractor,
    src: &SourceConfig,
    timeout: Duration,
) -> PipelineResult<Vec<RawItem>> {
    let unavailable = |reason: String| PipelineError::ExtractionUnavailable {
        source_id: src.id.clone(),
        reason,
    };

    let t0 = std::time::Instant::now();
    let res = tokio::time::timeout(timeout, extractor.extract(src)).await;
    histogram!("digest_extract_ms", "source" => src.id.clone())
        .record(t0.elapsed().as_secs_f64() * 1_000.0);

    match res {
        Err(_) => Err(unavailable(format!(
            "{} timed out after {timeout:?}",
            extractor.name()
        ))),
        Ok(Err(e)) => Err(unavailable(format!("{}: {e:#}", extractor.name()))),
        Ok(Ok(v)) if v.is_empty() => Err(unavailable("no items extracted".into())),
        Ok(Ok(v)) => Ok(v),
    }
}

/// Validate, load state and diff one source. Never writes state.
fn process_source(
    src: &SourceConfig,
    raw: PipelineResult<Vec<RawItem>>,
    store: &dyn StateStore,
    default_min_confidence: f32,
    now: DateTime<Utc>,
) -> SourceResult {
    let raw = match raw {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(target: "extract", source = %src.id, error = %e, "source skipped");
            counter!("digest_extraction_errors_total", "source" => src.id.clone()).increment(1);
            return SourceResult::unavailable(&src.id, 0, e.to_string());
        }
    };
    counter!("digest_items_extracted_total", "source" => src.id.clone()).increment(raw.len() as u64);

    let (items, malformed) = validate_batch(&src.id, raw, now);
    counter!("digest_items_malformed_total", "source" => src.id.clone()).increment(malformed as u64);
    if items.is_empty() {
        tracing::warn!(target: "extract", source = %src.id, malformed, "no valid items, source skipped");
        counter!("digest_extraction_errors_total", "source" => src.id.clone()).increment(1);
        return SourceResult::unavailable(
            &src.id,
            malformed,
            format!("all {malformed} extracted records were malformed"),
        );
    }

    let state = store.load(&src.id);
    let cfg = src.diff_config(default_min_confidence);
    let out = diff(&items, &state, &cfg, now);
    let stats = out.stats;

    counter!("digest_items_new_total", "source" => src.id.clone()).increment(stats.new as u64);
    counter!("digest_items_seen_total", "source" => src.id.clone()).increment(stats.already_seen as u64);
    counter!("digest_items_low_confidence_total", "source" => src.id.clone())
        .increment(stats.below_confidence as u64);
    counter!("digest_items_stale_total", "source" => src.id.clone()).increment(stats.stale as u64);
    counter!("digest_items_duplicate_total", "source" => src.id.clone())
        .increment(stats.duplicate_in_batch as u64);

    tracing::info!(
        target: "pipeline",
        source = %src.id,
        considered = stats.considered,
        new = stats.new,
        seen = stats.already_seen,
        low_confidence = stats.below_confidence,
        stale = stats.stale,
        duplicates = stats.duplicate_in_batch,
        malformed,
        "source diffed"
    );

    let has_new = stats.has_changes();
    SourceResult {
        outcome: SourceOutcome {
            source_id: src.id.clone(),
            // Upgraded to Delivered / PersistFailed once the digest is out.
            status: SourceStatus::NoNewContent,
            malformed,
            stats,
        },
        new_items: out.new_items,
        updated_state: has_new.then_some(out.updated_state),
    }
}
