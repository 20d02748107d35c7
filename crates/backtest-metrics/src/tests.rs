use chrono::{Duration, TimeZone, Utc};
use eval_core::{MetricProjection, ScoredSnapshot};

use crate::*;

/// 100 snapshots whose realized return is twice the score plus a tiny
/// deterministic perturbation.
fn informative_universe() -> (Vec<ScoredSnapshot>, Vec<f64>) {
    let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap();
    let snapshots: Vec<ScoredSnapshot> = (0..100)
        .map(|i| {
            let score = (i as f64 - 50.0) / 1000.0;
            let noise = 1e-5 * (i as f64).sin();
            ScoredSnapshot::new(
                format!("TICK{i:03}"),
                score,
                2.0 * score + noise,
                t0 + Duration::hours(i as i64),
            )
            .with_attribute("liquidity", ((i * 37) % 100) as f64)
            .with_attribute("trailing_return", -score)
        })
        .collect();
    let predictions = snapshots.iter().map(|s| s.predicted_score).collect();
    (snapshots, predictions)
}

// =============================================================================
// Test 1: Informative scores produce strong IC and a better top-K Sharpe
// =============================================================================

#[test]
fn test_informative_scores_end_to_end() {
    let (snapshots, predictions) = informative_universe();

    let top = ExtendedMetricsEngine::new(EvaluationParams::default().with_top_k(10)).unwrap();
    let metrics = top
        .calculate_extended_metrics(&snapshots, &predictions)
        .unwrap();

    assert!(metrics.ic_metrics().unwrap().pearson > 0.8);
    assert!(metrics.ic_metrics().unwrap().spearman > 0.8);
    assert!(metrics.ic_metrics().unwrap().pearson_p_value < 0.01);
    assert!(metrics.ic_metrics().unwrap().hit_rate > 0.9);
    assert_eq!(metrics.metadata().selected_count, 10);
    assert_eq!(metrics.risk_metrics().num_periods, 10);

    let everything = ExtendedMetricsEngine::new(EvaluationParams::default()).unwrap();
    let population = everything
        .calculate_extended_metrics(&snapshots, &predictions)
        .unwrap();

    assert!(metrics.risk_metrics().sharpe_ratio > population.risk_metrics().sharpe_ratio);
}

// =============================================================================
// Test 2: Mismatched predictions are rejected before any computation
// =============================================================================

#[test]
fn test_dimension_mismatch() {
    let (snapshots, predictions) = informative_universe();
    let engine = ExtendedMetricsEngine::new(EvaluationParams::default()).unwrap();
    let err = engine
        .calculate_extended_metrics(&snapshots, &predictions[..99])
        .unwrap_err();
    assert!(matches!(
        err,
        EvaluationError::DimensionMismatch {
            snapshots: 100,
            predictions: 99
        }
    ));
}

// =============================================================================
// Test 3: Baseline comparisons share the primary parameters
// =============================================================================

#[test]
fn test_baselines_attached_to_primary() {
    let (snapshots, predictions) = informative_universe();
    let engine = ExtendedMetricsEngine::new(
        EvaluationParams::default()
            .with_top_k(10)
            .with_risk_free_rate(0.02),
    )
    .unwrap();

    let metrics = engine
        .evaluate_with_baselines(
            &snapshots,
            &predictions,
            &[
                BaselineStrategy::Random { seed: 42 },
                BaselineStrategy::CapWeighted {
                    field: "market_cap".to_string(),
                },
                BaselineStrategy::momentum(),
            ],
        )
        .unwrap();

    let comparisons = metrics.baseline_comparisons();
    assert_eq!(comparisons.len(), 2);
    // Momentum here is the inverted score: the primary must beat it
    assert!(comparisons["momentum"].risk_adjusted_better);
    assert!(comparisons["momentum"].return_improvement > 0.0);
    assert!(comparisons["random"].sharpe_improvement > 0.0);
    assert!(metrics.baseline_failures()["cap_weighted"].contains("market_cap"));

    let projected = metrics.project();
    assert_eq!(projected.get("baseline.momentum.risk_adjusted_better"), Some(1.0));
    assert!(!projected.contains_key("baseline.cap_weighted.ic_improvement"));
}

// =============================================================================
// Test 4: Period-labelled universes evaluate one portfolio per period
// =============================================================================

#[test]
fn test_periodic_universe() {
    let (snapshots, predictions) = informative_universe();
    let labelled: Vec<ScoredSnapshot> = snapshots
        .into_iter()
        .enumerate()
        .map(|(i, s)| s.with_period(format!("2024-W{:02}", i % 5)))
        .collect();

    let engine = ExtendedMetricsEngine::new(EvaluationParams::default().with_top_k(3).with_periods_per_year(52))
        .unwrap();
    let metrics = engine
        .calculate_extended_metrics(&labelled, &predictions)
        .unwrap();

    assert_eq!(metrics.metadata().selection, SelectionMode::PerPeriod);
    assert_eq!(metrics.metadata().selected_count, 15);
    assert_eq!(metrics.risk_metrics().num_periods, 5);
    assert_eq!(metrics.ic_metrics().unwrap().periods_evaluated, 5);
    assert!(metrics.ic_metrics().unwrap().ic_mean > 0.8);
    assert_eq!(metrics.ic_metrics().unwrap().positive_period_ratio, 1.0);

    let flat = metrics.to_flat_map();
    assert!(flat.contains_key("ic.period.2024-W00"));
    assert_eq!(flat["metadata.selection"], "per_period");
}
