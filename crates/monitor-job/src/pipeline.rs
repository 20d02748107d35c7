//! One monitoring run: evaluate the window, check drift, sweep alert rules.

use std::collections::BTreeMap;

use alerting::{Alert, AlertConditionEngine, AlertDispatcher, AlertStateStore, LogSink, RuleSet};
use anyhow::{Context, Result};
use backtest_metrics::{BaselineStrategy, ExtendedBacktestMetrics, ExtendedMetricsEngine};
use chrono::{DateTime, Utc};
use drift_monitor::{Baseline, BaselineStore, DriftMonitor, DriftReport, ProductionBatch};
use eval_core::{MetricProjection, MetricsSchema, MetricsSnapshot, ScoredSnapshot};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::JobConfig;

/// Everything a run reads, already parsed.
pub struct JobInputs {
    pub snapshots: Vec<ScoredSnapshot>,
    pub batch: Option<ProductionBatch>,
    pub rules: Option<RuleSet>,
}

/// What a run produced. Written as JSON when an output path is configured.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub pipeline: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub evaluation: Option<BTreeMap<String, Value>>,
    pub evaluation_error: Option<String>,
    pub drift: Option<DriftReport>,
    pub drift_error: Option<String>,
    pub baseline_frozen: bool,
    pub alerts: Vec<Alert>,
    pub rule_failures: BTreeMap<String, String>,
    pub active_alerts: usize,
}

fn strategies(config: &JobConfig) -> Vec<BaselineStrategy> {
    let mut strategies = vec![
        BaselineStrategy::Random {
            seed: config.random_seed,
        },
        BaselineStrategy::momentum(),
    ];
    if let Some(field) = &config.cap_weight_field {
        strategies.push(BaselineStrategy::CapWeighted {
            field: field.clone(),
        });
    }
    strategies
}

/// Keys the run can produce, known before any data is evaluated.
pub fn expected_schema(config: &JobConfig, batch: Option<&ProductionBatch>) -> MetricsSchema {
    let strategies = strategies(config);
    let mut schema = ExtendedBacktestMetrics::schema_for(
        strategies.iter().map(|s| s.name()),
        config.include_classification,
    );
    if let Some(batch) = batch {
        schema.extend(DriftReport::schema_for(
            batch.features.keys().map(String::as_str),
            batch.categorical.keys().map(String::as_str),
            !batch.predictions.is_empty(),
        ));
    }
    schema
}

pub async fn run(
    config: &JobConfig,
    inputs: JobInputs,
    baselines: &dyn BaselineStore,
    alert_states: &dyn AlertStateStore,
) -> Result<RunReport> {
    let started_at = Utc::now();

    // Rule problems are configuration errors and stop the run before any work
    if let Some(rules) = &inputs.rules {
        rules
            .validate_against(&expected_schema(config, inputs.batch.as_ref()))
            .context("alert rules reference unknown metrics")?;
    }

    let mut metrics = MetricsSnapshot::new();
    let mut report = RunReport {
        pipeline: config.pipeline.clone(),
        started_at,
        finished_at: started_at,
        dry_run: config.dry_run,
        evaluation: None,
        evaluation_error: None,
        drift: None,
        drift_error: None,
        baseline_frozen: false,
        alerts: Vec::new(),
        rule_failures: BTreeMap::new(),
        active_alerts: 0,
    };

    let engine = ExtendedMetricsEngine::new(config.evaluation_params())
        .context("invalid evaluation parameters")?;
    let predictions: Vec<f64> = inputs.snapshots.iter().map(|s| s.predicted_score).collect();
    match engine.evaluate_with_baselines(&inputs.snapshots, &predictions, &strategies(config)) {
        Ok(evaluation) => {
            for (stage, message) in evaluation.stage_failures() {
                warn!(stage = stage.as_str(), "Partial evaluation: {}", message);
            }
            evaluation.project_into(&mut metrics);
            report.evaluation = Some(evaluation.to_flat_map());
        }
        Err(e) => {
            error!(snapshots = inputs.snapshots.len(), "Evaluation failed: {}", e);
            report.evaluation_error = Some(e.to_string());
        }
    }

    if let Some(batch) = &inputs.batch {
        if config.freeze_baseline {
            let baseline = Baseline::freeze(batch, Utc::now());
            if config.dry_run {
                info!(sample_size = baseline.sample_size, "Dry run, baseline not persisted");
            } else {
                baselines.save(&config.pipeline, &baseline).await?;
            }
            report.baseline_frozen = true;
        } else {
            match check_drift(config, batch, baselines).await? {
                Ok(drift) => {
                    drift.project_into(&mut metrics);
                    report.drift = Some(drift);
                }
                Err(message) => report.drift_error = Some(message),
            }
        }
    }

    if let Some(rules) = inputs.rules {
        let state = alert_states.load(&config.pipeline).await?;
        let mut alerts = AlertConditionEngine::with_state(rules, state);
        let sweep = alerts.evaluate_all(&metrics);

        let dispatcher = AlertDispatcher::new().with_sink(LogSink);
        dispatcher.dispatch(&sweep.fired).await;

        if config.dry_run {
            info!(active = alerts.state().len(), "Dry run, alert state not persisted");
        } else {
            alert_states.save(&config.pipeline, alerts.state()).await?;
        }

        report.rule_failures = sweep
            .failures
            .into_iter()
            .map(|f| (f.rule_id, f.error.to_string()))
            .collect();
        report.alerts = sweep.fired;
        report.active_alerts = alerts.state().len();
    }

    report.finished_at = Utc::now();
    info!(
        pipeline = %report.pipeline,
        evaluated = report.evaluation.is_some(),
        drift_checked = report.drift.is_some(),
        alerts = report.alerts.len(),
        "Monitoring run complete"
    );
    Ok(report)
}

/// Outer error: storage failed. Inner error: the check itself could not run.
async fn check_drift(
    config: &JobConfig,
    batch: &ProductionBatch,
    baselines: &dyn BaselineStore,
) -> Result<std::result::Result<DriftReport, String>> {
    let Some(baseline) = baselines.load(&config.pipeline).await? else {
        warn!(
            pipeline = %config.pipeline,
            "No baseline stored, run with --freeze-baseline first"
        );
        return Ok(Err("no baseline stored".to_string()));
    };

    let mut monitor = DriftMonitor::new(config.pipeline.clone(), config.drift_thresholds())
        .context("invalid drift thresholds")?;
    if let Some(max_age) = config.max_baseline_age() {
        monitor = monitor.with_max_baseline_age(max_age);
    }
    monitor.install_baseline(baseline);

    Ok(monitor.check(batch).map_err(|e| {
        warn!("Drift check failed: {}", e);
        e.to_string()
    }))
}
