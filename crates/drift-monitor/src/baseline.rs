use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use eval_core::stats::finite_values;
use serde::{Deserialize, Serialize};

/// One production batch: feature samples plus the model outputs scored on them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductionBatch {
    #[serde(default)]
    pub features: BTreeMap<String, Vec<f64>>,
    #[serde(default)]
    pub predictions: Vec<f64>,
    /// Categorical features as raw labels.
    #[serde(default)]
    pub categorical: BTreeMap<String, Vec<String>>,
}

impl ProductionBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feature(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.features.insert(name.into(), values);
        self
    }

    pub fn with_predictions(mut self, predictions: Vec<f64>) -> Self {
        self.predictions = predictions;
        self
    }

    pub fn with_categorical(mut self, name: impl Into<String>, labels: Vec<String>) -> Self {
        self.categorical.insert(name.into(), labels);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.features.values().all(|v| v.is_empty())
            && self.predictions.is_empty()
            && self.categorical.values().all(|v| v.is_empty())
    }
}

/// Frozen reference distributions that later batches are compared against.
///
/// Read-only once built; the monitor shares it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub feature_distributions: BTreeMap<String, Vec<f64>>,
    pub prediction_distribution: Vec<f64>,
    /// Category label → count, per categorical feature.
    #[serde(default)]
    pub categorical_distributions: BTreeMap<String, BTreeMap<String, u64>>,
    pub created_at: DateTime<Utc>,
    pub sample_size: usize,
}

impl Baseline {
    /// Freeze a batch. Non-finite values are dropped.
    pub fn freeze(batch: &ProductionBatch, created_at: DateTime<Utc>) -> Self {
        let feature_distributions: BTreeMap<String, Vec<f64>> = batch
            .features
            .iter()
            .map(|(name, values)| (name.clone(), finite_values(values)))
            .collect();
        let prediction_distribution = finite_values(&batch.predictions);
        let categorical_distributions = batch
            .categorical
            .iter()
            .map(|(name, labels)| (name.clone(), category_counts(labels)))
            .collect();

        let sample_size = if prediction_distribution.is_empty() {
            feature_distributions.values().map(Vec::len).max().unwrap_or(0)
        } else {
            prediction_distribution.len()
        };

        Self {
            feature_distributions,
            prediction_distribution,
            categorical_distributions,
            created_at,
            sample_size,
        }
    }

    pub fn feature(&self, name: &str) -> Option<&[f64]> {
        self.feature_distributions.get(name).map(Vec::as_slice)
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.created_at
    }
}

pub fn category_counts(labels: &[String]) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for label in labels {
        *counts.entry(label.clone()).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freeze_drops_non_finite() {
        let batch = ProductionBatch::new()
            .with_feature("volume", vec![1.0, f64::NAN, 3.0])
            .with_predictions(vec![0.1, 0.2, f64::INFINITY, 0.4]);
        let baseline = Baseline::freeze(&batch, Utc::now());
        assert_eq!(baseline.feature("volume"), Some(&[1.0, 3.0][..]));
        assert_eq!(baseline.prediction_distribution, vec![0.1, 0.2, 0.4]);
        assert_eq!(baseline.sample_size, 3);
    }

    #[test]
    fn test_sample_size_without_predictions() {
        let batch = ProductionBatch::new()
            .with_feature("a", vec![1.0, 2.0])
            .with_feature("b", vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(Baseline::freeze(&batch, Utc::now()).sample_size, 4);
    }

    #[test]
    fn test_category_counts() {
        let labels: Vec<String> = ["tech", "energy", "tech"].iter().map(|s| s.to_string()).collect();
        let counts = category_counts(&labels);
        assert_eq!(counts["tech"], 2);
        assert_eq!(counts["energy"], 1);
    }
}
