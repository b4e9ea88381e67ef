//! Daily digest binary entrypoint.
//! Loads config, runs one pipeline pass, and exits. Scheduling is external (cron, CI).

use std::process::ExitCode;
use std::sync::Arc;

use daily_digest::config::load_config_default;
use daily_digest::ingest::providers::DirectoryExtractor;
use daily_digest::metrics::Metrics;
use daily_digest::{FileDigestSink, FileStateStore, Pipeline, SourceStatus};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Compact logs by default; `DIGEST_LOG_JSON=1` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("DIGEST_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

async fn run() -> anyhow::Result<()> {
    let metrics = Metrics::from_env()?;

    let cfg = load_config_default()?;
    let settings = &cfg.digest;
    tracing::info!(
        output = %settings.output_dir.display(),
        state = %settings.state_dir.display(),
        extraction = %settings.extraction_dir.display(),
        "config loaded"
    );

    let pipeline = Pipeline::from_config(
        &cfg,
        Arc::new(DirectoryExtractor::new(&settings.extraction_dir)),
        Arc::new(FileStateStore::new(&settings.state_dir)),
        Arc::new(FileDigestSink::new(&settings.output_dir)),
    );

    let result = pipeline.run(chrono::Utc::now()).await;

    // Flush metrics even when the run failed.
    if let Some(m) = &metrics {
        if let Err(e) = m.flush() {
            tracing::warn!(error = %format!("{e:#}"), "metrics not written");
        }
    }

    let report = result?;
    match &report.digest_path {
        Some(p) => tracing::info!(path = %p.display(), items = report.total_new(), "digest ready"),
        None => tracing::info!("no new content today"),
    }
    let persist_failed = report.count(|s| matches!(s, SourceStatus::PersistFailed { .. }));
    let unavailable = report.count(|s| {
        matches!(s, SourceStatus::Unavailable { .. } | SourceStatus::Failed { .. })
    });
    if persist_failed > 0 || unavailable > 0 {
        tracing::warn!(persist_failed, unavailable, "run finished with per-source problems");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("run failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}
