// src/state.rs
//! Durable per-source memory of reported fingerprints.
//!
//! State only ever grows: records are appended on first sight and never
//! rewritten or removed, so `first_seen_at` is fixed once written.

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{PipelineError, PipelineResult};
use crate::fingerprint::Fingerprint;
use crate::fsio::write_atomic;

pub const STATE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenRecord {
    pub fingerprint: Fingerprint,
    pub first_seen_at: DateTime<Utc>,
    pub source_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceState {
    version: u32,
    source_id: String,
    // Sorted so the persisted file is byte-stable across runs.
    records: BTreeMap<Fingerprint, SeenRecord>,
}

impl SourceState {
    pub fn empty(source_id: impl Into<String>) -> Self {
        Self {
            version: STATE_FORMAT_VERSION,
            source_id: source_id.into(),
            records: BTreeMap::new(),
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, fp: &Fingerprint) -> bool {
        self.records.contains_key(fp)
    }

    pub fn get(&self, fp: &Fingerprint) -> Option<&SeenRecord> {
        self.records.get(fp)
    }

    pub fn records(&self) -> impl Iterator<Item = &SeenRecord> {
        self.records.values()
    }

    /// Record `fp` as first seen at `at`. Returns false (and changes nothing)
    /// when the fingerprint is already known.
    pub fn record_new(&mut self, fp: Fingerprint, at: DateTime<Utc>) -> bool {
        if self.records.contains_key(&fp) {
            return false;
        }
        let rec = SeenRecord {
            fingerprint: fp.clone(),
            first_seen_at: at,
            source_id: self.source_id.clone(),
        };
        self.records.insert(fp, rec);
        true
    }

    /// True if every record of `other` is present here, unchanged.
    pub fn is_superset_of(&self, other: &SourceState) -> bool {
        other
            .records
            .iter()
            .all(|(fp, rec)| self.records.get(fp) == Some(rec))
    }

    fn check_integrity(&self, expected_source: &str) -> Result<(), String> {
        if self.version != STATE_FORMAT_VERSION {
            return Err(format!("unsupported state version {}", self.version));
        }
        if self.source_id != expected_source {
            return Err(format!("file belongs to source `{}`", self.source_id));
        }
        for (fp, rec) in &self.records {
            if &rec.fingerprint != fp || rec.source_id != self.source_id {
                return Err(format!("inconsistent record under key {fp}"));
            }
        }
        Ok(())
    }
}

/// Persistence seam for source state. `load` never fails; `save` is atomic.
pub trait StateStore: Send + Sync {
    fn load(&self, source_id: &str) -> SourceState;
    fn save(&self, source_id: &str, state: &SourceState) -> PipelineResult<()>;
}

/// One JSON file per source under a state directory.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, source_id: &str) -> PathBuf {
        self.dir.join(format!("{source_id}.json"))
    }

    /// Like `load`, but surfaces corruption instead of recovering from it.
    /// `Ok(None)` means no state has been written yet.
    pub fn load_checked(&self, source_id: &str) -> PipelineResult<Option<SourceState>> {
        let path = self.path_for(source_id);
        let corrupt = |reason: String| PipelineError::StateCorrupt {
            source_id: source_id.to_string(),
            path: path.clone(),
            reason,
        };

        let raw = match fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(corrupt(e.to_string())),
        };
        let state: SourceState =
            serde_json::from_str(&raw).map_err(|e| corrupt(e.to_string()))?;
        state.check_integrity(source_id).map_err(corrupt)?;
        Ok(Some(state))
    }
}

impl StateStore for FileStateStore {
    fn load(&self, source_id: &str) -> SourceState {
        match self.load_checked(source_id) {
            Ok(Some(state)) => {
                tracing::debug!(target: "state", source = source_id, records = state.len(), "state loaded");
                state
            }
            Ok(None) => {
                tracing::info!(target: "state", source = source_id, "no prior state, starting empty");
                SourceState::empty(source_id)
            }
            Err(e) => {
                tracing::warn!(
                    target: "state",
                    source = source_id,
                    error = %e,
                    "state unreadable, resetting; previously seen items may be reported again"
                );
                counter!("digest_state_corrupt_total").increment(1);
                SourceState::empty(source_id)
            }
        }
    }

    fn save(&self, source_id: &str, state: &SourceState) -> PipelineResult<()> {
        let persist_failure = |reason: String| PipelineError::PersistFailure {
            source_id: source_id.to_string(),
            reason,
        };
        if state.source_id() != source_id {
            return Err(persist_failure(format!(
                "state belongs to source `{}`",
                state.source_id()
            )));
        }
        let json = serde_json::to_vec_pretty(state).map_err(|e| persist_failure(e.to_string()))?;
        let path = self.path_for(source_id);
        write_atomic(&path, &json)
            .map_err(|e| persist_failure(format!("{}: {e}", path.display())))?;
        tracing::debug!(target: "state", source = source_id, records = state.len(), "state saved");
        Ok(())
    }
}

/// In-memory store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    states: Mutex<HashMap<String, SourceState>>,
    failing: Mutex<HashSet<String>>,
    saves: Mutex<Vec<String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(self, state: SourceState) -> Self {
        self.states
            .lock()
            .expect("state mutex poisoned")
            .insert(state.source_id().to_string(), state);
        self
    }

    /// Make every subsequent `save` for `source_id` fail.
    pub fn fail_saves_for(&self, source_id: &str) {
        self.failing
            .lock()
            .expect("state mutex poisoned")
            .insert(source_id.to_string());
    }

    pub fn snapshot(&self, source_id: &str) -> Option<SourceState> {
        self.states
            .lock()
            .expect("state mutex poisoned")
            .get(source_id)
            .cloned()
    }

    /// Source ids of successful saves, in call order.
    pub fn saved_sources(&self) -> Vec<String> {
        self.saves.lock().expect("state mutex poisoned").clone()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, source_id: &str) -> SourceState {
        self.snapshot(source_id)
            .unwrap_or_else(|| SourceState::empty(source_id))
    }

    fn save(&self, source_id: &str, state: &SourceState) -> PipelineResult<()> {
        if self
            .failing
            .lock()
            .expect("state mutex poisoned")
            .contains(source_id)
        {
            return Err(PipelineError::PersistFailure {
                source_id: source_id.to_string(),
                reason: "injected failure".into(),
            });
        }
        self.states
            .lock()
            .expect("state mutex poisoned")
            .insert(source_id.to_string(), state.clone());
        self.saves
            .lock()
            .expect("state mutex poisoned")
            .push(source_id.to_string());
        Ok(())
    }
}
