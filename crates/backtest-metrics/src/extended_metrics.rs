use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::Utc;
use eval_core::{sentinel, MetricProjection, MetricsSchema, MetricsSnapshot, ScoredSnapshot};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::baselines::{BaselineRun, BaselineStrategy, BaselineStrategyComparator};
use crate::error::{EvaluationError, Result, Stage};
use crate::ic::InformationCoefficientCalculator;
use crate::models::*;
use crate::risk::RiskMetricsCalculator;

/// Complete evaluation of one scoring strategy.
///
/// Built by [`ExtendedMetricsEngine`]; never modified afterwards. Attaching
/// baseline comparisons produces a new value. A stage that could not be
/// computed is absent and its error is kept in `stage_failures`; the other
/// stages are still reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtendedBacktestMetrics {
    #[serde(default)]
    ic_metrics: Option<IcMetrics>,
    risk_metrics: RiskMetrics,
    #[serde(default)]
    classification_metrics: Option<ClassificationMetrics>,
    #[serde(default)]
    baseline_comparisons: BTreeMap<String, ComparisonResult>,
    #[serde(default)]
    baseline_failures: BaselineFailures,
    #[serde(default)]
    stage_failures: BTreeMap<Stage, String>,
    metadata: EvaluationMetadata,
}

impl ExtendedBacktestMetrics {
    /// `None` when the IC stage failed; see [`Self::stage_failures`].
    pub fn ic_metrics(&self) -> Option<&IcMetrics> {
        self.ic_metrics.as_ref()
    }

    pub fn risk_metrics(&self) -> &RiskMetrics {
        &self.risk_metrics
    }

    pub fn classification_metrics(&self) -> Option<&ClassificationMetrics> {
        self.classification_metrics.as_ref()
    }

    pub fn baseline_comparisons(&self) -> &BTreeMap<String, ComparisonResult> {
        &self.baseline_comparisons
    }

    pub fn baseline_failures(&self) -> &BaselineFailures {
        &self.baseline_failures
    }

    pub fn stage_failures(&self) -> &BTreeMap<Stage, String> {
        &self.stage_failures
    }

    pub fn is_complete(&self) -> bool {
        self.stage_failures.is_empty()
    }

    pub fn metadata(&self) -> &EvaluationMetadata {
        &self.metadata
    }

    /// Copy of `self` carrying comparisons against each successful baseline
    /// and the failure message of each baseline that could not be computed.
    pub fn with_baselines(&self, run: &BaselineRun) -> Self {
        let mut next = self.clone();
        next.baseline_comparisons = compare_extended_metrics(self, &run.results);
        next.baseline_failures = run.failures.clone();
        next
    }

    /// Flat string-keyed export. Values are JSON numbers, strings, or the
    /// `"NaN"` / `"Infinity"` / `"-Infinity"` sentinels.
    pub fn to_flat_map(&self) -> BTreeMap<String, Value> {
        let mut out = BTreeMap::new();
        for (key, value) in self.project().iter() {
            out.insert(key.clone(), sentinel::to_json(*value));
        }
        for (name, message) in &self.baseline_failures {
            out.insert(
                format!("baseline_failures.{name}"),
                Value::String(message.clone()),
            );
        }
        for (stage, message) in &self.stage_failures {
            out.insert(
                format!("stage_failures.{}", stage.as_str()),
                Value::String(message.clone()),
            );
        }
        for period in self.ic_metrics.iter().flat_map(|ic| &ic.period_ics) {
            out.insert(
                format!("ic.period.{}", period.period),
                sentinel::to_json(period.ic),
            );
        }

        let meta = &self.metadata;
        out.insert(
            "metadata.top_k".to_string(),
            meta.params
                .top_k
                .map(|k| Value::from(k as u64))
                .unwrap_or_else(|| Value::String("all".to_string())),
        );
        out.insert(
            "metadata.risk_free_rate".to_string(),
            sentinel::to_json(meta.params.risk_free_rate),
        );
        out.insert(
            "metadata.periods_per_year".to_string(),
            Value::from(meta.params.periods_per_year),
        );
        out.insert(
            "metadata.selection".to_string(),
            Value::String(meta.selection.as_str().to_string()),
        );
        out.insert(
            "metadata.snapshot_count".to_string(),
            Value::from(meta.snapshot_count as u64),
        );
        out.insert(
            "metadata.resolved_count".to_string(),
            Value::from(meta.resolved_count as u64),
        );
        out.insert(
            "metadata.selected_count".to_string(),
            Value::from(meta.selected_count as u64),
        );
        out.insert(
            "metadata.computed_at".to_string(),
            Value::String(meta.computed_at.to_rfc3339()),
        );
        out
    }

    /// Keys projected for an evaluation with the given baselines, known
    /// before any data is evaluated.
    pub fn schema_for<'a>(
        baseline_names: impl IntoIterator<Item = &'a str>,
        include_classification: bool,
    ) -> MetricsSchema {
        let mut schema = MetricsSchema::new();
        for (key, _) in RiskMetrics::empty().fields() {
            schema.insert(format!("risk.{key}"));
        }
        for (key, _) in empty_ic().fields() {
            schema.insert(format!("ic.{key}"));
        }
        if include_classification {
            for (key, _) in ClassificationMetrics::from_pairs(&[], &[]).fields() {
                schema.insert(format!("classification.{key}"));
            }
        }
        for name in baseline_names {
            for (key, _) in empty_comparison().fields() {
                schema.insert(format!("baseline.{name}.{key}"));
            }
        }
        schema
    }
}

impl MetricProjection for ExtendedBacktestMetrics {
    fn project_into(&self, snapshot: &mut MetricsSnapshot) {
        if let Some(ic) = &self.ic_metrics {
            for (key, value) in ic.fields() {
                snapshot.insert(format!("ic.{key}"), value);
            }
        }
        for (key, value) in self.risk_metrics.fields() {
            snapshot.insert(format!("risk.{key}"), value);
        }
        if let Some(classification) = &self.classification_metrics {
            for (key, value) in classification.fields() {
                snapshot.insert(format!("classification.{key}"), value);
            }
        }
        for (name, comparison) in &self.baseline_comparisons {
            for (key, value) in comparison.fields() {
                snapshot.insert(format!("baseline.{name}.{key}"), value);
            }
        }
    }
}

fn empty_ic() -> IcMetrics {
    IcMetrics {
        pearson: f64::NAN,
        pearson_p_value: f64::NAN,
        spearman: f64::NAN,
        spearman_p_value: f64::NAN,
        kendall_tau: f64::NAN,
        kendall_p_value: f64::NAN,
        hit_rate: f64::NAN,
        ic_mean: f64::NAN,
        ic_std: f64::NAN,
        ic_information_ratio: f64::NAN,
        ic_t_stat: f64::NAN,
        positive_period_ratio: f64::NAN,
        sample_size: 0,
        excluded_pairs: 0,
        periods_evaluated: 0,
        period_ics: Vec::new(),
    }
}

fn empty_comparison() -> ComparisonResult {
    ComparisonResult {
        ic_improvement: f64::NAN,
        sharpe_improvement: f64::NAN,
        return_improvement: f64::NAN,
        risk_adjusted_better: false,
    }
}

/// Primary-minus-baseline differences for each named baseline.
pub fn compare_extended_metrics(
    primary: &ExtendedBacktestMetrics,
    baselines: &BTreeMap<String, ExtendedBacktestMetrics>,
) -> BTreeMap<String, ComparisonResult> {
    baselines
        .iter()
        .map(|(name, baseline)| {
            let pearson = |m: &ExtendedBacktestMetrics| m.ic_metrics.as_ref().map_or(f64::NAN, |ic| ic.pearson);
            let ic_improvement = pearson(primary) - pearson(baseline);
            let sharpe_improvement =
                primary.risk_metrics.sharpe_ratio - baseline.risk_metrics.sharpe_ratio;
            let return_improvement =
                primary.risk_metrics.annualized_return - baseline.risk_metrics.annualized_return;
            let comparison = ComparisonResult {
                ic_improvement,
                sharpe_improvement,
                return_improvement,
                // NaN compares false
                risk_adjusted_better: sharpe_improvement > 0.0,
            };
            (name.clone(), comparison)
        })
        .collect()
}

// =============================================================================
// Engine
// =============================================================================

/// Computes [`ExtendedBacktestMetrics`] for a scored snapshot set.
///
/// The engine owns its [`EvaluationParams`] so a primary run and every
/// baseline compared against it share the same top-K, risk-free rate and
/// annualization.
#[derive(Debug, Clone)]
pub struct ExtendedMetricsEngine {
    params: EvaluationParams,
}

impl ExtendedMetricsEngine {
    pub fn new(params: EvaluationParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &EvaluationParams {
        &self.params
    }

    /// Evaluate `predictions` against the realized returns of `snapshots`.
    ///
    /// `predictions[i]` scores `snapshots[i]`; the lengths must match. The
    /// top-K selection considers resolved snapshots only and ranks them by
    /// prediction descending with ties broken by identifier then input
    /// position. When every snapshot carries a period
    /// label, each period contributes one equal-weighted return of its own
    /// top-K; otherwise the selected returns form one series in timestamp
    /// order.
    pub fn calculate_extended_metrics(
        &self,
        snapshots: &[ScoredSnapshot],
        predictions: &[f64],
    ) -> Result<ExtendedBacktestMetrics> {
        if snapshots.len() != predictions.len() {
            return Err(EvaluationError::DimensionMismatch {
                snapshots: snapshots.len(),
                predictions: predictions.len(),
            });
        }

        let actuals: Vec<f64> = snapshots.iter().map(|s| s.realized_return).collect();
        let labels = period_labels(snapshots);

        let mut stage_failures = BTreeMap::new();
        let ic_metrics =
            match InformationCoefficientCalculator::calculate(predictions, &actuals, labels.as_deref()) {
                Ok(ic) => Some(ic),
                Err(e) => {
                    let error = EvaluationError::stage(Stage::InformationCoefficient, e);
                    warn!(snapshots = snapshots.len(), "{}", error);
                    stage_failures.insert(Stage::InformationCoefficient, error.to_string());
                    None
                }
            };

        let selection = match &labels {
            Some(labels) => select_per_period(snapshots, predictions, labels, self.params.top_k),
            None => select_pooled(snapshots, predictions, self.params.top_k),
        };

        let risk_metrics = RiskMetricsCalculator::calculate(
            &selection.returns,
            self.params.risk_free_rate,
            self.params.periods_per_year,
        );

        let classification_metrics = self
            .params
            .include_classification
            .then(|| ClassificationMetrics::from_pairs(predictions, &actuals));

        let metadata = EvaluationMetadata {
            params: self.params.clone(),
            selection: selection.mode,
            snapshot_count: snapshots.len(),
            resolved_count: snapshots.iter().filter(|s| s.is_resolved()).count(),
            selected_count: selection.selected,
            computed_at: Utc::now(),
        };

        debug!(
            snapshots = metadata.snapshot_count,
            selected = metadata.selected_count,
            mode = metadata.selection.as_str(),
            pearson = ic_metrics.as_ref().map_or(f64::NAN, |ic| ic.pearson),
            sharpe = risk_metrics.sharpe_ratio,
            "Computed extended metrics"
        );

        Ok(ExtendedBacktestMetrics {
            ic_metrics,
            risk_metrics,
            classification_metrics,
            baseline_comparisons: BTreeMap::new(),
            baseline_failures: BTreeMap::new(),
            stage_failures,
            metadata,
        })
    }

    /// Primary evaluation plus comparison against each baseline strategy.
    ///
    /// A failing baseline is recorded in `baseline_failures` and does not
    /// affect the primary result or the other baselines.
    pub fn evaluate_with_baselines(
        &self,
        snapshots: &[ScoredSnapshot],
        predictions: &[f64],
        strategies: &[BaselineStrategy],
    ) -> Result<ExtendedBacktestMetrics> {
        let primary = self.calculate_extended_metrics(snapshots, predictions)?;
        let run = BaselineStrategyComparator::new(self).evaluate_all(strategies, snapshots);
        for (name, message) in &run.failures {
            warn!(baseline = %name, error = %message, "Baseline evaluation failed");
        }
        Ok(primary.with_baselines(&run))
    }
}

/// Labels of every snapshot, or `None` if any snapshot is unlabelled.
fn period_labels(snapshots: &[ScoredSnapshot]) -> Option<Vec<String>> {
    if snapshots.is_empty() {
        return None;
    }
    snapshots.iter().map(|s| s.period_label.clone()).collect()
}

struct Selection {
    returns: Vec<f64>,
    selected: usize,
    mode: SelectionMode,
}

/// Indices ordered best-first. Non-finite scores sort last.
fn rank_indices(snapshots: &[ScoredSnapshot], scores: &[f64], mut indices: Vec<usize>) -> Vec<usize> {
    indices.sort_by(|&a, &b| {
        let (sa, sb) = (scores[a], scores[b]);
        match (sa.is_finite(), sb.is_finite()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (true, true) => sb.total_cmp(&sa),
            (false, false) => Ordering::Equal,
        }
        .then_with(|| snapshots[a].identifier.cmp(&snapshots[b].identifier))
        .then_with(|| a.cmp(&b))
    });
    indices
}

fn take_top(ranked: Vec<usize>, top_k: Option<usize>) -> Vec<usize> {
    match top_k {
        Some(k) => ranked.into_iter().take(k).collect(),
        None => ranked,
    }
}

fn select_pooled(snapshots: &[ScoredSnapshot], scores: &[f64], top_k: Option<usize>) -> Selection {
    let resolved = (0..snapshots.len()).filter(|&i| snapshots[i].is_resolved()).collect();
    let ranked = rank_indices(snapshots, scores, resolved);
    let mut chosen = take_top(ranked, top_k);
    chosen.sort_by(|&a, &b| {
        snapshots[a]
            .timestamp
            .cmp(&snapshots[b].timestamp)
            .then_with(|| snapshots[a].identifier.cmp(&snapshots[b].identifier))
            .then_with(|| a.cmp(&b))
    });

    Selection {
        returns: chosen.iter().map(|&i| snapshots[i].realized_return).collect(),
        selected: chosen.len(),
        mode: SelectionMode::Pooled,
    }
}

fn select_per_period(
    snapshots: &[ScoredSnapshot],
    scores: &[f64],
    labels: &[String],
    top_k: Option<usize>,
) -> Selection {
    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, label) in labels.iter().enumerate() {
        if snapshots[i].is_resolved() {
            groups.entry(label.as_str()).or_default().push(i);
        }
    }

    let mut returns = Vec::with_capacity(groups.len());
    let mut selected = 0;
    for (_, members) in groups {
        let chosen = take_top(rank_indices(snapshots, scores, members), top_k);
        selected += chosen.len();
        let realized: f64 = chosen.iter().map(|&i| snapshots[i].realized_return).sum();
        returns.push(realized / chosen.len() as f64);
    }

    Selection {
        returns,
        selected,
        mode: SelectionMode::PerPeriod,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn snapshot(id: &str, score: f64, realized: f64, day: i64) -> ScoredSnapshot {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        ScoredSnapshot::new(id, score, realized, t0 + Duration::days(day))
    }

    fn scores(snapshots: &[ScoredSnapshot]) -> Vec<f64> {
        snapshots.iter().map(|s| s.predicted_score).collect()
    }

    #[test]
    fn test_rejects_length_mismatch() {
        let engine = ExtendedMetricsEngine::new(EvaluationParams::default()).unwrap();
        let snaps = vec![snapshot("A", 0.1, 0.01, 0), snapshot("B", 0.2, 0.02, 1)];
        let err = engine.calculate_extended_metrics(&snaps, &[0.1]).unwrap_err();
        assert_eq!(
            err,
            EvaluationError::DimensionMismatch {
                snapshots: 2,
                predictions: 1
            }
        );
    }

    #[test]
    fn test_invalid_params_rejected() {
        assert!(ExtendedMetricsEngine::new(EvaluationParams::default().with_top_k(0)).is_err());
        assert!(ExtendedMetricsEngine::new(EvaluationParams::default().with_periods_per_year(0)).is_err());
    }

    #[test]
    fn test_ic_failure_keeps_risk_metrics() {
        let engine = ExtendedMetricsEngine::new(EvaluationParams::default()).unwrap();
        let snaps = vec![snapshot("A", 0.1, 0.05, 0), snapshot("B", 0.2, f64::NAN, 1)];
        let m = engine
            .calculate_extended_metrics(&snaps, &scores(&snaps))
            .unwrap();

        assert!(m.ic_metrics().is_none());
        assert!(!m.is_complete());
        let message = &m.stage_failures()[&Stage::InformationCoefficient];
        assert_eq!(message, "IC calculation failed: insufficient data, n=1");

        assert!((m.risk_metrics().total_return - 0.05).abs() < 1e-12);
        let projected = m.project();
        assert_eq!(projected.get("risk.total_return"), Some(m.risk_metrics().total_return));
        assert!(!projected.contains_key("ic.pearson"));
        assert_eq!(
            m.to_flat_map()["stage_failures.information_coefficient"],
            Value::String(message.clone())
        );
    }

    #[test]
    fn test_unresolved_snapshots_never_selected() {
        let engine = ExtendedMetricsEngine::new(EvaluationParams::default().with_top_k(5)).unwrap();
        let mut snaps: Vec<ScoredSnapshot> = (0..20)
            .map(|i| snapshot(&format!("R{i:02}"), i as f64 / 100.0, 0.01, i))
            .collect();
        for i in 0..3 {
            snaps.push(snapshot(&format!("U{i}"), 1.0 + i as f64, f64::NAN, 20 + i));
        }
        let m = engine
            .calculate_extended_metrics(&snaps, &scores(&snaps))
            .unwrap();

        assert_eq!(m.metadata().selected_count, 5);
        assert_eq!(m.metadata().resolved_count, 20);
        assert_eq!(m.risk_metrics().num_periods, 5);
        assert!((m.risk_metrics().total_return - (1.01f64.powi(5) - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_unresolved_period_members_skipped() {
        let engine = ExtendedMetricsEngine::new(EvaluationParams::default().with_top_k(1)).unwrap();
        let snaps = vec![
            snapshot("A", 0.9, f64::NAN, 0).with_period("2024-01"),
            snapshot("B", 0.1, 0.02, 0).with_period("2024-01"),
            snapshot("A", 0.9, f64::NAN, 1).with_period("2024-02"),
            snapshot("B", 0.5, 0.01, 1).with_period("2024-02"),
            snapshot("C", 0.4, 0.03, 1).with_period("2024-02"),
        ];
        let m = engine
            .calculate_extended_metrics(&snaps, &scores(&snaps))
            .unwrap();

        assert_eq!(m.metadata().selected_count, 2);
        assert_eq!(m.risk_metrics().num_periods, 2);
        assert!((m.risk_metrics().total_return - (1.02 * 1.01 - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_top_k_tie_break_by_identifier() {
        let engine = ExtendedMetricsEngine::new(EvaluationParams::default().with_top_k(2)).unwrap();
        let snaps = vec![
            snapshot("C", 0.5, 0.03, 0),
            snapshot("B", 0.5, 0.02, 1),
            snapshot("A", 0.5, 0.01, 2),
            snapshot("D", 0.1, -0.05, 3),
        ];
        let m = engine
            .calculate_extended_metrics(&snaps, &scores(&snaps))
            .unwrap();
        // A and B win the tie; their returns compound in timestamp order
        assert_eq!(m.metadata().selected_count, 2);
        let expected = 1.02 * 1.01 - 1.0;
        assert!((m.risk_metrics().total_return - expected).abs() < 1e-12);
    }

    #[test]
    fn test_non_finite_predictions_rank_last() {
        let engine = ExtendedMetricsEngine::new(EvaluationParams::default().with_top_k(1)).unwrap();
        let snaps = vec![
            snapshot("A", 0.1, 0.01, 0),
            snapshot("B", 0.2, 0.02, 1),
            snapshot("C", 0.3, 0.03, 2),
        ];
        let preds = [0.1, 0.2, f64::NAN];
        let m = engine.calculate_extended_metrics(&snaps, &preds).unwrap();
        assert!((m.risk_metrics().total_return - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_per_period_selection() {
        let engine = ExtendedMetricsEngine::new(EvaluationParams::default().with_top_k(1)).unwrap();
        let snaps = vec![
            snapshot("A", 0.9, 0.04, 0).with_period("2024-02"),
            snapshot("B", 0.1, -0.02, 0).with_period("2024-02"),
            snapshot("A", 0.2, -0.01, 1).with_period("2024-01"),
            snapshot("B", 0.8, 0.03, 1).with_period("2024-01"),
        ];
        let m = engine
            .calculate_extended_metrics(&snaps, &scores(&snaps))
            .unwrap();
        assert_eq!(m.metadata().selection, SelectionMode::PerPeriod);
        assert_eq!(m.risk_metrics().num_periods, 2);
        assert!((m.risk_metrics().total_return - (1.03 * 1.04 - 1.0)).abs() < 1e-12);
        assert_eq!(m.ic_metrics().unwrap().period_ics.len(), 2);
    }

    #[test]
    fn test_mixed_labels_fall_back_to_pooled() {
        let engine = ExtendedMetricsEngine::new(EvaluationParams::default()).unwrap();
        let snaps = vec![
            snapshot("A", 0.1, 0.01, 0).with_period("2024-01"),
            snapshot("B", 0.2, 0.02, 1),
            snapshot("C", 0.3, 0.03, 2),
        ];
        let m = engine
            .calculate_extended_metrics(&snaps, &scores(&snaps))
            .unwrap();
        assert_eq!(m.metadata().selection, SelectionMode::Pooled);
        assert_eq!(m.ic_metrics().unwrap().periods_evaluated, 0);
    }

    #[test]
    fn test_classification_optional() {
        let snaps = vec![
            snapshot("A", 0.5, 0.02, 0),
            snapshot("B", -0.5, -0.01, 1),
            snapshot("C", 0.3, -0.02, 2),
            snapshot("D", -0.1, 0.01, 3),
        ];
        let preds = scores(&snaps);

        let without = ExtendedMetricsEngine::new(EvaluationParams::default()).unwrap();
        assert!(without
            .calculate_extended_metrics(&snaps, &preds)
            .unwrap()
            .classification_metrics()
            .is_none());

        let with = ExtendedMetricsEngine::new(EvaluationParams::default().with_classification(true)).unwrap();
        let m = with.calculate_extended_metrics(&snaps, &preds).unwrap();
        let c = m.classification_metrics().unwrap();
        assert_eq!(c.accuracy, 0.5);
        assert_eq!(c.precision, 0.5);
        assert_eq!(c.recall, 0.5);
        assert_eq!(c.true_positives, 1);
        assert!(m.project().contains_key("classification.f1_score"));
    }

    #[test]
    fn test_projection_matches_static_schema() {
        let engine = ExtendedMetricsEngine::new(EvaluationParams::default()).unwrap();
        let snaps: Vec<ScoredSnapshot> = (0..10)
            .map(|i| snapshot(&format!("S{i}"), i as f64, i as f64 / 100.0, i))
            .collect();
        let m = engine
            .calculate_extended_metrics(&snaps, &scores(&snaps))
            .unwrap();
        let schema = ExtendedBacktestMetrics::schema_for(std::iter::empty(), false);
        assert_eq!(m.metric_schema(), schema);
    }

    #[test]
    fn test_flat_map_uses_sentinels() {
        let engine = ExtendedMetricsEngine::new(EvaluationParams::default()).unwrap();
        let snaps = vec![snapshot("A", 0.1, 0.01, 0), snapshot("B", 0.2, 0.01, 1)];
        let m = engine
            .calculate_extended_metrics(&snaps, &scores(&snaps))
            .unwrap();
        let flat = m.to_flat_map();
        // Constant realized returns: zero volatility, undefined Sharpe
        assert_eq!(flat["risk.sharpe_ratio"], Value::String("NaN".to_string()));
        assert_eq!(flat["risk.profit_factor"], Value::String("Infinity".to_string()));
        assert_eq!(flat["metadata.top_k"], Value::String("all".to_string()));
    }

    #[test]
    fn test_serde_round_trip_keeps_nan() {
        let engine = ExtendedMetricsEngine::new(EvaluationParams::default()).unwrap();
        let snaps = vec![snapshot("A", 0.1, 0.01, 0), snapshot("B", 0.2, 0.01, 1)];
        let m = engine
            .calculate_extended_metrics(&snaps, &scores(&snaps))
            .unwrap();
        let json = serde_json::to_string(&m).unwrap();
        let back: ExtendedBacktestMetrics = serde_json::from_str(&json).unwrap();
        assert!(back.risk_metrics().sharpe_ratio.is_nan());
        assert_eq!(back.risk_metrics().profit_factor, f64::INFINITY);
        assert_eq!(back.metadata(), m.metadata());
    }

    #[test]
    fn test_compare_nan_sharpe_is_not_better() {
        let engine = ExtendedMetricsEngine::new(EvaluationParams::default()).unwrap();
        let flat = vec![snapshot("A", 0.1, 0.01, 0), snapshot("B", 0.2, 0.01, 1)];
        let primary = engine
            .calculate_extended_metrics(&flat, &scores(&flat))
            .unwrap();
        let mut baselines = BTreeMap::new();
        baselines.insert("same".to_string(), primary.clone());
        let cmp = compare_extended_metrics(&primary, &baselines);
        assert!(cmp["same"].sharpe_improvement.is_nan());
        assert!(!cmp["same"].risk_adjusted_better);
    }
}
