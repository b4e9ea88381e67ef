// src/differ.rs
//! Classify a source's extracted items against its state.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashSet;

use crate::fingerprint::{fingerprint, Fingerprint};
use crate::ingest::types::Item;
use crate::state::SourceState;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiffConfig {
    pub min_confidence: f32,
    /// Items older than this (by `published_at`, else `extracted_at`) are skipped.
    pub max_age: Option<Duration>,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            min_confidence: crate::config::sources::DEFAULT_MIN_CONFIDENCE,
            max_age: None,
        }
    }
}

/// Per-source change summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffStats {
    pub considered: usize,
    pub new: usize,
    pub already_seen: usize,
    pub below_confidence: usize,
    pub stale: usize,
    pub duplicate_in_batch: usize,
}

impl DiffStats {
    pub fn has_changes(&self) -> bool {
        self.new > 0
    }
}

#[derive(Debug, Clone)]
pub struct DiffOutcome {
    /// New items in extraction order.
    pub new_items: Vec<Item>,
    pub updated_state: SourceState,
    pub stats: DiffStats,
}

fn is_stale(item: &Item, max_age: Option<Duration>, now: DateTime<Utc>) -> bool {
    let Some(max_age) = max_age else {
        return false;
    };
    let at = item.published_at.unwrap_or(item.extracted_at);
    now.signed_duration_since(at) > max_age
}

/// Split `items` into new vs already-seen and return the grown state.
///
/// Filtered items (low confidence, stale) leave no trace in state, so they
/// can still be reported by a later run. `state` itself is not modified.
pub fn diff(items: &[Item], state: &SourceState, cfg: &DiffConfig, now: DateTime<Utc>) -> DiffOutcome {
    let mut updated = state.clone();
    let mut stats = DiffStats {
        considered: items.len(),
        ..DiffStats::default()
    };
    let mut batch: HashSet<Fingerprint> = HashSet::new();
    let mut new_items = Vec::new();

    for item in items {
        if item.confidence < cfg.min_confidence {
            stats.below_confidence += 1;
            continue;
        }
        if is_stale(item, cfg.max_age, now) {
            stats.stale += 1;
            continue;
        }

        let fp = fingerprint(item);
        if state.contains(&fp) {
            stats.already_seen += 1;
            continue;
        }
        if !batch.insert(fp.clone()) {
            stats.duplicate_in_batch += 1;
            continue;
        }
        updated.record_new(fp, now);
        new_items.push(item.clone());
    }
    stats.new = new_items.len();

    DiffOutcome {
        new_items,
        updated_state: updated,
        stats,
    }
}
