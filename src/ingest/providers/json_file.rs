// src/ingest/providers/json_file.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::ingest::types::RawItem;

// --- tolerant shapes of extractor output ---

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExtractionDoc {
    Wrapped { recommendations: Vec<Value> },
    Items { items: Vec<Value> },
    Bare(Vec<Value>),
}

/// Parse the extractor's JSON output into raw records, in document order.
///
/// Records that do not even have the right shape are kept as empty
/// `RawItem`s so validation drops and counts them like any other bad record.
pub fn parse_json_items(s: &str) -> Result<Vec<RawItem>> {
    let doc: ExtractionDoc = serde_json::from_str(s).context("parsing extraction json")?;
    let values = match doc {
        ExtractionDoc::Wrapped { recommendations } => recommendations,
        ExtractionDoc::Items { items } => items,
        ExtractionDoc::Bare(v) => v,
    };

    Ok(values
        .into_iter()
        .map(|v| {
            serde_json::from_value::<RawItem>(v).unwrap_or_else(|e| {
                tracing::debug!(target: "extract", error = %e, "record has wrong shape");
                RawItem::default()
            })
        })
        .collect())
}
