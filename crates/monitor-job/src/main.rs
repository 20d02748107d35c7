//! monitor-job: scheduled evaluation, drift check and alert sweep for one
//! scoring pipeline.
//!
//! Usage:
//!   cargo run -p monitor-job
//!   cargo run -p monitor-job -- --freeze-baseline
//!   cargo run -p monitor-job -- --dry-run
//!
//! Inputs and thresholds come from the environment (see `config.rs`).

mod config;
mod pipeline;

use std::path::Path;

use alerting::{RuleSet, SqliteAlertStateStore};
use anyhow::{Context, Result};
use drift_monitor::{ProductionBatch, SqliteBaselineStore};
use eval_core::ScoredSnapshot;
use serde::de::DeserializeOwned;

use config::JobConfig;
use pipeline::JobInputs;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "monitor_job=info,drift_monitor=info,alerting=info".into())
    };
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(filter()).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter()).init();
    }

    let args: Vec<String> = std::env::args().collect();
    let config = JobConfig::from_env()?.with_args(&args);
    tracing::info!(
        pipeline = %config.pipeline,
        dry_run = config.dry_run,
        freeze_baseline = config.freeze_baseline,
        "Starting monitoring run"
    );

    let snapshots: Vec<ScoredSnapshot> = read_json(&config.snapshots_path).await?;
    let batch = match &config.features_path {
        Some(path) => Some(read_json::<ProductionBatch>(path).await?),
        None => None,
    };
    let rules = match &config.rules_path {
        Some(path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            Some(RuleSet::from_json(&text).with_context(|| format!("loading rules from {}", path.display()))?)
        }
        None => None,
    };
    tracing::info!(
        snapshots = snapshots.len(),
        rules = rules.as_ref().map(|r| r.len()).unwrap_or(0),
        "Inputs loaded"
    );

    let baselines = SqliteBaselineStore::connect(&config.database_url).await?;
    let alert_states = SqliteAlertStateStore::connect(&config.database_url).await?;

    let inputs = JobInputs {
        snapshots,
        batch,
        rules,
    };
    let report = pipeline::run(&config, inputs, &baselines, &alert_states).await?;

    if let Some(path) = &config.output_path {
        let json = serde_json::to_string_pretty(&report)?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        tracing::info!("Run report written to {}", path.display());
    }

    Ok(())
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}
