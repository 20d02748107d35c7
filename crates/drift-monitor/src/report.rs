//! Drift reports and their projection into alertable metrics.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use eval_core::{sentinel, MetricProjection, MetricsSchema, MetricsSnapshot};
use serde::{Deserialize, Serialize};

/// Drift tier of a single test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftSeverity {
    None,
    Moderate,
    Significant,
}

impl DriftSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriftSeverity::None => "none",
            DriftSeverity::Moderate => "moderate",
            DriftSeverity::Significant => "significant",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftTestKind {
    /// Kolmogorov-Smirnov plus PSI on a numeric sample.
    Numeric,
    /// Chi-square homogeneity on category counts.
    Categorical,
}

/// Outcome of the test battery for one feature or the prediction output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftTestResult {
    pub name: String,
    pub kind: DriftTestKind,
    /// KS distance or chi-square statistic, depending on `kind`.
    #[serde(with = "sentinel")]
    pub statistic: f64,
    #[serde(with = "sentinel")]
    pub p_value: f64,
    /// NaN for categorical tests.
    #[serde(with = "sentinel")]
    pub psi: f64,
    pub drift_detected: bool,
    pub severity: DriftSeverity,
    pub reference_size: usize,
    pub current_size: usize,
    #[serde(with = "sentinel")]
    pub reference_mean: f64,
    #[serde(with = "sentinel")]
    pub current_mean: f64,
}

impl DriftTestResult {
    fn project_into(&self, prefix: &str, snapshot: &mut MetricsSnapshot) {
        match self.kind {
            DriftTestKind::Numeric => {
                snapshot.insert(format!("{prefix}.ks_statistic"), self.statistic);
                snapshot.insert(format!("{prefix}.ks_p_value"), self.p_value);
                snapshot.insert(format!("{prefix}.psi"), self.psi);
            }
            DriftTestKind::Categorical => {
                snapshot.insert(format!("{prefix}.chi_square"), self.statistic);
                snapshot.insert(format!("{prefix}.chi_square_p_value"), self.p_value);
            }
        }
        snapshot.insert_flag(format!("{prefix}.detected"), self.drift_detected);
    }
}

/// Comparison of one production batch against a frozen baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub target: String,
    pub feature_results: BTreeMap<String, DriftTestResult>,
    #[serde(default)]
    pub prediction_result: Option<DriftTestResult>,
    /// True if any feature or the prediction output drifted.
    pub drift_detected: bool,
    /// Features present on both sides that could not be tested, with the reason.
    #[serde(default)]
    pub skipped: BTreeMap<String, String>,
    /// Baseline features absent from the batch.
    #[serde(default)]
    pub missing_features: Vec<String>,
    pub baseline_created_at: DateTime<Utc>,
    pub evaluated_at: DateTime<Utc>,
}

impl DriftReport {
    pub(crate) fn new(
        target: &str,
        baseline_created_at: DateTime<Utc>,
        evaluated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            target: target.to_string(),
            feature_results: BTreeMap::new(),
            prediction_result: None,
            drift_detected: false,
            skipped: BTreeMap::new(),
            missing_features: Vec::new(),
            baseline_created_at,
            evaluated_at,
        }
    }

    pub(crate) fn refresh_flag(&mut self) {
        self.drift_detected = self.feature_results.values().any(|r| r.drift_detected)
            || self
                .prediction_result
                .as_ref()
                .map(|r| r.drift_detected)
                .unwrap_or(false);
    }

    /// Combine two reports over the same baseline.
    pub fn merge(mut self, other: DriftReport) -> Self {
        self.feature_results.extend(other.feature_results);
        if other.prediction_result.is_some() {
            self.prediction_result = other.prediction_result;
        }
        self.skipped.extend(other.skipped);
        self.missing_features.extend(other.missing_features);
        self.missing_features.sort();
        self.missing_features.dedup();
        self.evaluated_at = self.evaluated_at.max(other.evaluated_at);
        self.refresh_flag();
        self
    }

    pub fn drifted_features(&self) -> Vec<&str> {
        self.feature_results
            .values()
            .filter(|r| r.drift_detected)
            .map(|r| r.name.as_str())
            .collect()
    }

    /// Largest PSI over numeric features and the prediction output; NaN if none.
    pub fn max_psi(&self) -> f64 {
        self.feature_results
            .values()
            .chain(self.prediction_result.iter())
            .filter(|r| r.kind == DriftTestKind::Numeric && r.psi.is_finite())
            .map(|r| r.psi)
            .fold(f64::NAN, f64::max)
    }

    pub fn max_severity(&self) -> DriftSeverity {
        self.feature_results
            .values()
            .chain(self.prediction_result.iter())
            .map(|r| r.severity)
            .max()
            .unwrap_or(DriftSeverity::None)
    }

    /// Keys projected for a baseline with these numeric and categorical features.
    pub fn schema_for<'a>(
        numeric: impl IntoIterator<Item = &'a str>,
        categorical: impl IntoIterator<Item = &'a str>,
        with_predictions: bool,
    ) -> MetricsSchema {
        let mut schema = MetricsSchema::from_keys([
            "drift.detected",
            "drift.drifted_feature_count",
            "drift.max_psi",
            "drift.max_severity",
        ]);
        for name in numeric {
            for key in ["ks_statistic", "ks_p_value", "psi", "detected"] {
                schema.insert(format!("drift.feature.{name}.{key}"));
            }
        }
        for name in categorical {
            for key in ["chi_square", "chi_square_p_value", "detected"] {
                schema.insert(format!("drift.feature.{name}.{key}"));
            }
        }
        if with_predictions {
            for key in ["ks_statistic", "ks_p_value", "psi", "detected"] {
                schema.insert(format!("drift.prediction.{key}"));
            }
        }
        schema
    }
}

impl MetricProjection for DriftReport {
    fn project_into(&self, snapshot: &mut MetricsSnapshot) {
        snapshot.insert_flag("drift.detected", self.drift_detected);
        snapshot.insert(
            "drift.drifted_feature_count",
            self.drifted_features().len() as f64,
        );
        snapshot.insert("drift.max_psi", self.max_psi());
        // none = 0, moderate = 1, significant = 2
        snapshot.insert("drift.max_severity", self.max_severity() as u8 as f64);
        for (name, result) in &self.feature_results {
            result.project_into(&format!("drift.feature.{name}"), snapshot);
        }
        if let Some(result) = &self.prediction_result {
            result.project_into("drift.prediction", snapshot);
        }
    }
}
