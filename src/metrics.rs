// src/metrics.rs
use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::path::{Path, PathBuf};

use crate::fsio::write_atomic;

pub const ENV_METRICS_PATH: &str = "DIGEST_METRICS_PATH";

/// Prometheus recorder whose exposition is dumped to a textfile at the end of
/// a run (for node-exporter's textfile collector; a batch job has no port).
pub struct Metrics {
    pub handle: PrometheusHandle,
    path: PathBuf,
}

impl Metrics {
    /// Install the global recorder if `DIGEST_METRICS_PATH` is set.
    pub fn from_env() -> Result<Option<Self>> {
        match std::env::var(ENV_METRICS_PATH) {
            Ok(p) if !p.trim().is_empty() => Self::init(PathBuf::from(p)).map(Some),
            _ => Ok(None),
        }
    }

    pub fn init(path: PathBuf) -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        crate::ingest::ensure_metrics_described();
        Ok(Self { handle, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the current exposition text atomically.
    pub fn flush(&self) -> Result<()> {
        let text = self.handle.render();
        write_atomic(&self.path, text.as_bytes())
            .with_context(|| format!("writing metrics to {}", self.path.display()))
    }
}
