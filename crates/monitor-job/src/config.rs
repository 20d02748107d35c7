use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use backtest_metrics::EvaluationParams;
use chrono::Duration;
use drift_monitor::DriftThresholds;

/// Settings for one monitoring run, read from the environment.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// JSON array of scored snapshots for the evaluation window.
    pub snapshots_path: PathBuf,
    /// JSON production batch for drift checks. Drift is skipped when unset.
    pub features_path: Option<PathBuf>,
    /// JSON array of alert rules. Alerting is skipped when unset.
    pub rules_path: Option<PathBuf>,
    /// Where the run report is written.
    pub output_path: Option<PathBuf>,
    pub database_url: String,
    /// Names the monitored model for baselines and alert state.
    pub pipeline: String,

    pub top_k: Option<usize>,
    pub risk_free_rate: f64,
    pub periods_per_year: u32,
    pub include_classification: bool,
    pub random_seed: u64,
    /// Snapshot attribute for the cap-weighted baseline. The baseline is
    /// skipped when unset.
    pub cap_weight_field: Option<String>,

    pub ks_threshold: f64,
    pub psi_threshold: f64,
    pub max_baseline_age_days: Option<i64>,

    /// Freeze the features batch as the new baseline instead of checking it.
    pub freeze_baseline: bool,
    /// Evaluate and log, but persist nothing.
    pub dry_run: bool,
}

impl JobConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            snapshots_path: var("EVAL_SNAPSHOTS_PATH")
                .unwrap_or_else(|| "snapshots.json".to_string())
                .into(),
            features_path: var("EVAL_FEATURES_PATH").map(PathBuf::from),
            rules_path: var("EVAL_RULES_PATH").map(PathBuf::from),
            output_path: var("EVAL_OUTPUT_PATH").map(PathBuf::from),
            database_url: var("MONITOR_DATABASE_URL").unwrap_or_else(|| "sqlite:monitor.db".to_string()),
            pipeline: var("MONITOR_PIPELINE").unwrap_or_else(|| "default".to_string()),

            top_k: parse_optional(&var, "EVAL_TOP_K")?,
            risk_free_rate: parse_or(&var, "EVAL_RISK_FREE_RATE", 0.0)?,
            periods_per_year: parse_or(&var, "EVAL_PERIODS_PER_YEAR", 252)?,
            include_classification: parse_or(&var, "EVAL_INCLUDE_CLASSIFICATION", false)?,
            random_seed: parse_or(&var, "EVAL_RANDOM_SEED", 42)?,
            cap_weight_field: var("EVAL_CAP_WEIGHT_FIELD").map(|v| v.trim().to_string()),

            ks_threshold: parse_or(&var, "DRIFT_KS_THRESHOLD", 0.05)?,
            psi_threshold: parse_or(&var, "DRIFT_PSI_THRESHOLD", 0.2)?,
            max_baseline_age_days: parse_optional(&var, "DRIFT_MAX_BASELINE_AGE_DAYS")?,

            freeze_baseline: false,
            dry_run: false,
        })
    }

    /// Apply command-line flags on top of the environment.
    pub fn with_args(mut self, args: &[String]) -> Self {
        self.freeze_baseline = args.iter().any(|a| a == "--freeze-baseline");
        self.dry_run = args.iter().any(|a| a == "--dry-run");
        self
    }

    pub fn evaluation_params(&self) -> EvaluationParams {
        EvaluationParams {
            top_k: self.top_k,
            risk_free_rate: self.risk_free_rate,
            periods_per_year: self.periods_per_year,
            include_classification: self.include_classification,
        }
    }

    pub fn drift_thresholds(&self) -> DriftThresholds {
        DriftThresholds {
            ks_significance: self.ks_threshold,
            psi_threshold: self.psi_threshold,
            ..DriftThresholds::default()
        }
    }

    pub fn max_baseline_age(&self) -> Option<Duration> {
        self.max_baseline_age_days.map(Duration::days)
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    Ok(parse_optional(var, key)?.unwrap_or(default))
}

fn parse_optional<T, F>(var: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    var(key)
        .map(|raw| raw.trim().parse::<T>().with_context(|| format!("invalid {key}: '{raw}'")))
        .transpose()
}
