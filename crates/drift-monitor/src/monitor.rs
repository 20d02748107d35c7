//! Drift Monitor
//!
//! Holds the frozen baseline of one monitored target and compares
//! production batches against it.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use eval_core::stats::{self, chi_square_test, ks_test, population_stability_index};
use eval_core::StatsError;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::baseline::{category_counts, Baseline, ProductionBatch};
use crate::error::{DriftError, Result};
use crate::report::{DriftReport, DriftSeverity, DriftTestKind, DriftTestResult};

/// Lifecycle of a monitored target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    NoBaseline,
    BaselineSet,
    Monitoring,
}

/// Per-instance decision thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftThresholds {
    /// KS p-values below this flag drift.
    pub ks_significance: f64,
    /// PSI above this flags significant drift.
    pub psi_threshold: f64,
    /// PSI at or above this is reported as moderate.
    pub psi_moderate: f64,
    pub chi_square_significance: f64,
    pub num_bins: usize,
}

impl Default for DriftThresholds {
    fn default() -> Self {
        Self {
            ks_significance: 0.05,
            psi_threshold: 0.2,
            psi_moderate: 0.1,
            chi_square_significance: 0.05,
            num_bins: stats::DEFAULT_PSI_BINS,
        }
    }
}

impl DriftThresholds {
    pub fn validate(&self) -> Result<()> {
        let unit = |name: &str, v: f64| {
            if v > 0.0 && v < 1.0 {
                Ok(())
            } else {
                Err(DriftError::InvalidThresholds(format!(
                    "{name} must be in (0, 1), got {v}"
                )))
            }
        };
        unit("ks_significance", self.ks_significance)?;
        unit("chi_square_significance", self.chi_square_significance)?;
        if !(self.psi_moderate > 0.0 && self.psi_moderate <= self.psi_threshold) {
            return Err(DriftError::InvalidThresholds(format!(
                "psi_moderate ({}) must be positive and not above psi_threshold ({})",
                self.psi_moderate, self.psi_threshold
            )));
        }
        if self.num_bins < 2 {
            return Err(DriftError::InvalidThresholds(format!(
                "num_bins must be at least 2, got {}",
                self.num_bins
            )));
        }
        Ok(())
    }
}

pub struct DriftMonitor {
    target: String,
    thresholds: DriftThresholds,
    baseline: Option<Arc<Baseline>>,
    state: MonitorState,
    max_baseline_age: Option<Duration>,
}

impl DriftMonitor {
    pub fn new(target: impl Into<String>, thresholds: DriftThresholds) -> Result<Self> {
        thresholds.validate()?;
        Ok(Self {
            target: target.into(),
            thresholds,
            baseline: None,
            state: MonitorState::NoBaseline,
            max_baseline_age: None,
        })
    }

    /// Drop the baseline on `check` once it is older than `max_age`.
    pub fn with_max_baseline_age(mut self, max_age: Duration) -> Self {
        self.max_baseline_age = Some(max_age);
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn thresholds(&self) -> &DriftThresholds {
        &self.thresholds
    }

    pub fn baseline(&self) -> Option<Arc<Baseline>> {
        self.baseline.clone()
    }

    /// Freeze `batch` as the new baseline, replacing any previous one.
    pub fn set_baseline(&mut self, batch: &ProductionBatch) -> Arc<Baseline> {
        self.install_baseline(Baseline::freeze(batch, Utc::now()))
    }

    /// Adopt an already frozen baseline, e.g. one loaded from a store.
    pub fn install_baseline(&mut self, baseline: Baseline) -> Arc<Baseline> {
        let baseline = Arc::new(baseline);
        self.baseline = Some(Arc::clone(&baseline));
        self.state = MonitorState::BaselineSet;
        info!(
            target_name = %self.target,
            features = baseline.feature_distributions.len(),
            sample_size = baseline.sample_size,
            "Baseline set"
        );
        baseline
    }

    /// KS and PSI for every feature present in both `baseline` and `current`.
    pub fn detect_feature_drift(
        &self,
        baseline: &Baseline,
        current: &BTreeMap<String, Vec<f64>>,
    ) -> DriftReport {
        self.detect_feature_drift_at(baseline, current, Utc::now())
    }

    fn detect_feature_drift_at(
        &self,
        baseline: &Baseline,
        current: &BTreeMap<String, Vec<f64>>,
        now: DateTime<Utc>,
    ) -> DriftReport {
        let mut report = DriftReport::new(&self.target, baseline.created_at, now);

        let common: Vec<(&String, &Vec<f64>, &Vec<f64>)> = baseline
            .feature_distributions
            .iter()
            .filter_map(|(name, reference)| current.get(name).map(|cur| (name, reference, cur)))
            .collect();

        let outcomes: Vec<(String, std::result::Result<DriftTestResult, StatsError>)> = common
            .par_iter()
            .map(|(name, reference, cur)| ((*name).clone(), self.numeric_test(name, reference, cur)))
            .collect();

        for (name, outcome) in outcomes {
            match outcome {
                Ok(result) => {
                    report.feature_results.insert(name, result);
                }
                Err(e) => {
                    debug!(feature = %name, error = %e, "Feature skipped");
                    report.skipped.insert(name, e.to_string());
                }
            }
        }

        report.missing_features = baseline
            .feature_distributions
            .keys()
            .filter(|name| !current.contains_key(*name))
            .cloned()
            .collect();

        report.refresh_flag();
        report
    }

    /// The same battery applied to the model's output distribution.
    pub fn detect_prediction_drift(&self, baseline: &Baseline, current: &[f64]) -> DriftReport {
        self.detect_prediction_drift_at(baseline, current, Utc::now())
    }

    fn detect_prediction_drift_at(
        &self,
        baseline: &Baseline,
        current: &[f64],
        now: DateTime<Utc>,
    ) -> DriftReport {
        let mut report = DriftReport::new(&self.target, baseline.created_at, now);
        match self.numeric_test("prediction", &baseline.prediction_distribution, current) {
            Ok(result) => report.prediction_result = Some(result),
            Err(e) => {
                report.skipped.insert("prediction".to_string(), e.to_string());
            }
        }
        report.refresh_flag();
        report
    }

    /// Chi-square homogeneity for every categorical feature on both sides.
    pub fn detect_categorical_drift(
        &self,
        baseline: &Baseline,
        current: &BTreeMap<String, Vec<String>>,
    ) -> DriftReport {
        self.detect_categorical_drift_at(baseline, current, Utc::now())
    }

    fn detect_categorical_drift_at(
        &self,
        baseline: &Baseline,
        current: &BTreeMap<String, Vec<String>>,
        now: DateTime<Utc>,
    ) -> DriftReport {
        let mut report = DriftReport::new(&self.target, baseline.created_at, now);
        for (name, reference) in &baseline.categorical_distributions {
            let Some(labels) = current.get(name) else {
                report.missing_features.push(name.clone());
                continue;
            };
            match self.categorical_test(name, reference, labels) {
                Ok(result) => {
                    report.feature_results.insert(name.clone(), result);
                }
                Err(e) => {
                    report.skipped.insert(name.clone(), e.to_string());
                }
            }
        }
        report.refresh_flag();
        report
    }

    /// Run every battery against the held baseline.
    pub fn check(&mut self, batch: &ProductionBatch) -> Result<DriftReport> {
        self.check_at(batch, Utc::now())
    }

    pub fn check_at(&mut self, batch: &ProductionBatch, now: DateTime<Utc>) -> Result<DriftReport> {
        let baseline = self.baseline.clone().ok_or_else(|| DriftError::NoBaseline {
            target: self.target.clone(),
        })?;

        if let Some(max_age) = self.max_baseline_age {
            let age = baseline.age(now);
            if age > max_age {
                warn!(
                    target_name = %self.target,
                    age_days = age.num_days(),
                    "Baseline exceeded maximum age, dropping it"
                );
                self.baseline = None;
                self.state = MonitorState::NoBaseline;
                return Err(DriftError::StaleBaseline {
                    target: self.target.clone(),
                    age_days: age.num_days(),
                    max_age_days: max_age.num_days(),
                });
            }
        }

        let mut report = self.detect_feature_drift_at(&baseline, &batch.features, now);
        if !baseline.prediction_distribution.is_empty() || !batch.predictions.is_empty() {
            report = report.merge(self.detect_prediction_drift_at(&baseline, &batch.predictions, now));
        }
        if !baseline.categorical_distributions.is_empty() {
            report = report.merge(self.detect_categorical_drift_at(&baseline, &batch.categorical, now));
        }

        self.state = MonitorState::Monitoring;
        info!(
            target_name = %self.target,
            drift_detected = report.drift_detected,
            drifted = report.drifted_features().len(),
            skipped = report.skipped.len(),
            "Drift check complete"
        );
        Ok(report)
    }

    fn numeric_test(
        &self,
        name: &str,
        reference: &[f64],
        current: &[f64],
    ) -> std::result::Result<DriftTestResult, StatsError> {
        let ks = ks_test(reference, current)?;
        let psi = population_stability_index(reference, current, self.thresholds.num_bins)?;

        let ks_flag = ks.p_value < self.thresholds.ks_significance;
        let psi_flag = psi > self.thresholds.psi_threshold;
        let severity = if psi_flag {
            DriftSeverity::Significant
        } else if ks_flag || psi >= self.thresholds.psi_moderate {
            DriftSeverity::Moderate
        } else {
            DriftSeverity::None
        };

        let reference = stats::finite_values(reference);
        let current = stats::finite_values(current);
        Ok(DriftTestResult {
            name: name.to_string(),
            kind: DriftTestKind::Numeric,
            statistic: ks.statistic,
            p_value: ks.p_value,
            psi,
            drift_detected: ks_flag || psi_flag,
            severity,
            reference_size: reference.len(),
            current_size: current.len(),
            reference_mean: stats::mean(&reference),
            current_mean: stats::mean(&current),
        })
    }

    fn categorical_test(
        &self,
        name: &str,
        reference: &BTreeMap<String, u64>,
        labels: &[String],
    ) -> std::result::Result<DriftTestResult, StatsError> {
        let current = category_counts(labels);
        let mut categories: Vec<&String> = reference.keys().chain(current.keys()).collect();
        categories.sort();
        categories.dedup();

        let ref_counts: Vec<u64> = categories
            .iter()
            .map(|c| reference.get(*c).copied().unwrap_or(0))
            .collect();
        let cur_counts: Vec<u64> = categories
            .iter()
            .map(|c| current.get(*c).copied().unwrap_or(0))
            .collect();

        let chi = chi_square_test(&ref_counts, &cur_counts)?;
        let drift_detected = chi.p_value < self.thresholds.chi_square_significance;

        Ok(DriftTestResult {
            name: name.to_string(),
            kind: DriftTestKind::Categorical,
            statistic: chi.statistic,
            p_value: chi.p_value,
            psi: f64::NAN,
            drift_detected,
            severity: if drift_detected {
                DriftSeverity::Significant
            } else {
                DriftSeverity::None
            },
            reference_size: ref_counts.iter().sum::<u64>() as usize,
            current_size: labels.len(),
            reference_mean: f64::NAN,
            current_mean: f64::NAN,
        })
    }
}
