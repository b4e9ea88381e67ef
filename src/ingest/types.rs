// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SourceConfig;

/// A validated candidate content record for one source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub source_id: String,
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub description: String,
    pub confidence: f32, // 0.0 ..= 1.0
    pub extracted_at: DateTime<Utc>,
    /// The content's own date, when the extractor knows it.
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

/// Loosely typed record as handed over by the extraction collaborator.
/// Nothing here is trusted until `ingest::validate_item` accepts it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawItem {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, alias = "url")]
    pub link: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default, alias = "date")]
    pub published_at: Option<String>,
    #[serde(default)]
    pub extracted_at: Option<String>,
}

impl RawItem {
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            link: Some(link.into()),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, d: impl Into<String>) -> Self {
        self.description = Some(d.into());
        self
    }

    pub fn with_confidence(mut self, c: f64) -> Self {
        self.confidence = Some(c);
        self
    }
}

/// Where items come from. Implementations differ only in origin, never in shape.
#[async_trait::async_trait]
pub trait ContentExtractor: Send + Sync {
    /// Ordered candidate records for `source`. An `Err` or an empty list
    /// means the source is unavailable for this run.
    async fn extract(&self, source: &SourceConfig) -> Result<Vec<RawItem>>;
    fn name(&self) -> &'static str;
}
