// src/config/sources.rs
//! Source list and run settings, loaded from TOML or JSON.
//!
//! Resolution order for the config file:
//! 1) `$DIGEST_CONFIG_PATH`
//! 2) `config/sources.toml`
//! 3) `config/sources.json`
//!
//! Environment overrides (`DIGEST_MIN_CONFIDENCE`, `DIGEST_OUTPUT_DIR`,
//! `DIGEST_STATE_DIR`, `DIGEST_EXTRACTION_DIR`) are applied on top of the file.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::differ::DiffConfig;
use crate::error::PipelineError;

pub const ENV_CONFIG_PATH: &str = "DIGEST_CONFIG_PATH";
pub const ENV_MIN_CONFIDENCE: &str = "DIGEST_MIN_CONFIDENCE";
pub const ENV_OUTPUT_DIR: &str = "DIGEST_OUTPUT_DIR";
pub const ENV_STATE_DIR: &str = "DIGEST_STATE_DIR";
pub const ENV_EXTRACTION_DIR: &str = "DIGEST_EXTRACTION_DIR";

pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.7;

fn default_output_dir() -> PathBuf {
    PathBuf::from("data/daily-digest")
}
fn default_state_dir() -> PathBuf {
    PathBuf::from("data/state")
}
fn default_extraction_dir() -> PathBuf {
    PathBuf::from("data/extracted")
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_min_confidence() -> f32 {
    DEFAULT_MIN_CONFIDENCE
}
fn default_icon() -> String {
    "🔗".to_string()
}
fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSettings {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    #[serde(default = "default_extraction_dir")]
    pub extraction_dir: PathBuf,
    #[serde(default = "default_timeout_secs")]
    pub extraction_timeout_secs: u64,
    /// Used by sources without their own `min_confidence`.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            state_dir: default_state_dir(),
            extraction_dir: default_extraction_dir(),
            extraction_timeout_secs: default_timeout_secs(),
            min_confidence: default_min_confidence(),
        }
    }
}

impl RunSettings {
    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.extraction_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceConfig {
    /// Stable identity; also names the source's state file.
    pub id: String,
    pub display_name: String,
    #[serde(default = "default_icon")]
    pub icon: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub min_confidence: Option<f32>,
    #[serde(default)]
    pub max_age_days: Option<u32>,
}

impl SourceConfig {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            icon: default_icon(),
            enabled: true,
            min_confidence: None,
            max_age_days: None,
        }
    }

    pub fn diff_config(&self, default_min_confidence: f32) -> DiffConfig {
        DiffConfig {
            min_confidence: self.min_confidence.unwrap_or(default_min_confidence),
            max_age: self
                .max_age_days
                .map(|d| chrono::Duration::days(i64::from(d))),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DigestConfig {
    #[serde(default)]
    pub digest: RunSettings,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl DigestConfig {
    /// Enabled sources, in declaration order.
    pub fn enabled_sources(&self) -> Vec<SourceConfig> {
        self.sources.iter().filter(|s| s.enabled).cloned().collect()
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |msg: String| Err(PipelineError::ConfigInvalid(msg));

        if self.digest.extraction_timeout_secs == 0 {
            return invalid("extraction_timeout_secs must be > 0".into());
        }
        if !valid_confidence(self.digest.min_confidence) {
            return invalid(format!(
                "min_confidence {} outside [0, 1]",
                self.digest.min_confidence
            ));
        }

        let mut seen = HashSet::new();
        for s in &self.sources {
            if !valid_source_id(&s.id) {
                return invalid(format!(
                    "source id `{}` must be non-empty and use only [A-Za-z0-9_-]",
                    s.id
                ));
            }
            if !seen.insert(s.id.as_str()) {
                return invalid(format!("duplicate source id `{}`", s.id));
            }
            if let Some(c) = s.min_confidence {
                if !valid_confidence(c) {
                    return invalid(format!("source `{}`: min_confidence {c} outside [0, 1]", s.id));
                }
            }
            if s.max_age_days == Some(0) {
                return invalid(format!("source `{}`: max_age_days must be > 0", s.id));
            }
        }

        if !self.sources.iter().any(|s| s.enabled) {
            return invalid("no enabled sources".into());
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Some(t) = parse_confidence_env(std::env::var(ENV_MIN_CONFIDENCE).ok()) {
            self.digest.min_confidence = t;
        }
        if let Ok(p) = std::env::var(ENV_OUTPUT_DIR) {
            self.digest.output_dir = PathBuf::from(p);
        }
        if let Ok(p) = std::env::var(ENV_STATE_DIR) {
            self.digest.state_dir = PathBuf::from(p);
        }
        if let Ok(p) = std::env::var(ENV_EXTRACTION_DIR) {
            self.digest.extraction_dir = PathBuf::from(p);
        }
    }
}

fn valid_confidence(c: f32) -> bool {
    c.is_finite() && (0.0..=1.0).contains(&c)
}

fn valid_source_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

// parse optional float env and clamp to <0.0..=1.0>
fn parse_confidence_env(raw: Option<String>) -> Option<f32> {
    raw.and_then(|s| s.trim().parse::<f32>().ok())
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, 1.0))
}

/// Load and validate config from an explicit path. Supports TOML or JSON.
pub fn load_config_from(path: &Path) -> Result<DigestConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading digest config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let cfg = parse_config(&content, ext.as_str())
        .with_context(|| format!("parsing digest config {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Load config using env var + fallbacks, then apply env overrides.
pub fn load_config_default() -> Result<DigestConfig> {
    let path = resolve_config_path()?;
    let mut cfg = load_config_from(&path)?;
    cfg.apply_env_overrides();
    cfg.validate()?;
    Ok(cfg)
}

fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return Ok(pb);
        }
        return Err(anyhow!(PipelineError::ConfigInvalid(format!(
            "{ENV_CONFIG_PATH} points to non-existent path {}",
            pb.display()
        ))));
    }
    for candidate in ["config/sources.toml", "config/sources.json"] {
        let pb = PathBuf::from(candidate);
        if pb.exists() {
            return Ok(pb);
        }
    }
    Err(anyhow!(PipelineError::ConfigInvalid(
        "no config found (set DIGEST_CONFIG_PATH or create config/sources.toml)".into()
    )))
}

fn parse_config(s: &str, hint_ext: &str) -> Result<DigestConfig> {
    match hint_ext {
        "toml" => return toml::from_str(s).map_err(Into::into),
        "json" => return serde_json::from_str(s).map_err(Into::into),
        _ => {}
    }
    // No usable hint: JSON documents start with `{`, everything else is tried as TOML.
    if s.trim_start().starts_with('{') {
        serde_json::from_str(s).map_err(Into::into)
    } else {
        toml::from_str(s).map_err(Into::into)
    }
}
