// tests/metrics.rs
// One test per binary: the Prometheus recorder is process-global.
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use daily_digest::ingest::providers::StaticExtractor;
use daily_digest::metrics::Metrics;
use daily_digest::{MemoryDigestSink, MemoryStateStore, Pipeline, RawItem, SourceConfig};

#[tokio::test]
async fn textfile_contains_run_series() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("digest.prom");
    let metrics = Metrics::init(path.clone()).unwrap();

    let p = Pipeline::new(
        vec![SourceConfig::new("src", "Source"), SourceConfig::new("gone", "Gone")],
        Arc::new(StaticExtractor::new().with_items(
            "src",
            vec![RawItem::new("X", "https://x.test"), RawItem::default()],
        )),
        Arc::new(MemoryStateStore::new()),
        Arc::new(MemoryDigestSink::new()),
    );
    p.run(Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap())
        .await
        .unwrap();

    metrics.flush().unwrap();
    assert_eq!(metrics.path(), path.as_path());
    let text = std::fs::read_to_string(&path).unwrap();

    for needle in [
        "digest_runs_total 1",
        "digest_last_run_ts",
        "digest_items_extracted_total{source=\"src\"} 2",
        "digest_items_malformed_total{source=\"src\"} 1",
        "digest_items_new_total{source=\"src\"} 1",
        "digest_extraction_errors_total{source=\"gone\"} 1",
        "digest_extract_ms",
        "# HELP digest_runs_total",
    ] {
        assert!(text.contains(needle), "missing `{needle}` in:\n{text}");
    }
}
