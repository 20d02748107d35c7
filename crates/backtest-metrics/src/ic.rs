use std::collections::BTreeMap;

use eval_core::stats::{self, descriptive::ZERO_TOLERANCE};
use eval_core::StatsError;

use crate::models::{IcMetrics, PeriodIc};

pub struct InformationCoefficientCalculator;

impl InformationCoefficientCalculator {
    /// Correlation between predicted scores and realized returns.
    ///
    /// Pairs where either side is non-finite are excluded and counted in
    /// `excluded_pairs`. With `periods`, one Pearson IC is computed per
    /// distinct label and `ic_mean`/`ic_std`/`ic_information_ratio` summarize
    /// that series. Periods whose IC is undefined are left out of the
    /// summary. Without periods `ic_mean` is the pooled Pearson IC and the
    /// dispersion fields are NaN.
    pub fn calculate(
        predictions: &[f64],
        actuals: &[f64],
        periods: Option<&[String]>,
    ) -> Result<IcMetrics, StatsError> {
        if predictions.len() != actuals.len() {
            return Err(StatsError::dimension_mismatch(
                "predictions vs actuals",
                predictions.len(),
                actuals.len(),
            ));
        }
        if let Some(labels) = periods {
            if labels.len() != predictions.len() {
                return Err(StatsError::dimension_mismatch(
                    "period labels vs predictions",
                    labels.len(),
                    predictions.len(),
                ));
            }
        }

        let valid: Vec<usize> = (0..predictions.len())
            .filter(|&i| predictions[i].is_finite() && actuals[i].is_finite())
            .collect();
        if valid.len() < 2 {
            return Err(StatsError::InsufficientData { n: valid.len() });
        }

        let x: Vec<f64> = valid.iter().map(|&i| predictions[i]).collect();
        let y: Vec<f64> = valid.iter().map(|&i| actuals[i]).collect();

        let pearson = stats::pearson(&x, &y)?;
        let spearman = stats::spearman(&x, &y)?;
        let kendall = stats::kendall_tau(&x, &y)?;

        let hits = x
            .iter()
            .zip(&y)
            .filter(|(p, a)| sign_bucket(**p) == sign_bucket(**a))
            .count();
        let hit_rate = hits as f64 / valid.len() as f64;

        let mut metrics = IcMetrics {
            pearson: pearson.coefficient,
            pearson_p_value: pearson.p_value,
            spearman: spearman.coefficient,
            spearman_p_value: spearman.p_value,
            kendall_tau: kendall.coefficient,
            kendall_p_value: kendall.p_value,
            hit_rate,
            ic_mean: pearson.coefficient,
            ic_std: f64::NAN,
            ic_information_ratio: f64::NAN,
            ic_t_stat: f64::NAN,
            positive_period_ratio: f64::NAN,
            sample_size: valid.len(),
            excluded_pairs: predictions.len() - valid.len(),
            periods_evaluated: 0,
            period_ics: Vec::new(),
        };

        if let Some(labels) = periods {
            let period_ics = per_period_ics(&valid, predictions, actuals, labels);
            summarize_periods(&mut metrics, period_ics);
        }

        Ok(metrics)
    }
}

/// Three-way sign: a zero prediction only hits a zero outcome.
fn sign_bucket(value: f64) -> i8 {
    if value > 0.0 {
        1
    } else if value < 0.0 {
        -1
    } else {
        0
    }
}

fn per_period_ics(
    valid: &[usize],
    predictions: &[f64],
    actuals: &[f64],
    labels: &[String],
) -> Vec<PeriodIc> {
    let mut groups: BTreeMap<&str, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
    for &i in valid {
        let entry = groups.entry(labels[i].as_str()).or_default();
        entry.0.push(predictions[i]);
        entry.1.push(actuals[i]);
    }

    groups
        .into_iter()
        .map(|(period, (x, y))| {
            let ic = stats::pearson(&x, &y)
                .map(|c| c.coefficient)
                .unwrap_or(f64::NAN);
            PeriodIc {
                period: period.to_string(),
                ic,
                sample_size: x.len(),
            }
        })
        .collect()
}

fn summarize_periods(metrics: &mut IcMetrics, period_ics: Vec<PeriodIc>) {
    let defined: Vec<f64> = period_ics
        .iter()
        .map(|p| p.ic)
        .filter(|ic| ic.is_finite())
        .collect();

    let k = defined.len();
    metrics.periods_evaluated = k;
    metrics.period_ics = period_ics;

    if k == 0 {
        metrics.ic_mean = f64::NAN;
        return;
    }

    let ic_mean = stats::mean(&defined);
    let ic_std = stats::sample_std(&defined);
    metrics.ic_mean = ic_mean;
    metrics.ic_std = ic_std;
    metrics.positive_period_ratio = defined.iter().filter(|ic| **ic > 0.0).count() as f64 / k as f64;

    if ic_std.is_finite() && ic_std > ZERO_TOLERANCE {
        metrics.ic_information_ratio = ic_mean / ic_std;
        metrics.ic_t_stat = ic_mean / (ic_std / (k as f64).sqrt());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_perfect_relationship() {
        let pred: Vec<f64> = (0..20).map(|i| i as f64 / 10.0 - 1.0).collect();
        let actual: Vec<f64> = pred.iter().map(|p| 2.0 * p).collect();
        let m = InformationCoefficientCalculator::calculate(&pred, &actual, None).unwrap();

        assert!((m.pearson - 1.0).abs() < 1e-12);
        assert!((m.spearman - 1.0).abs() < 1e-12);
        assert!((m.kendall_tau - 1.0).abs() < 1e-12);
        assert_eq!(m.ic_mean, m.pearson);
        assert!(m.ic_std.is_nan());
        assert!(m.ic_information_ratio.is_nan());
        // The zero prediction maps to a zero outcome: every pair hits
        assert_eq!(m.hit_rate, 1.0);
        assert_eq!(m.sample_size, 20);
    }

    #[test]
    fn test_non_finite_pairs_excluded() {
        let pred = [0.1, 0.2, f64::NAN, 0.4, 0.5];
        let actual = [0.01, 0.03, 0.05, f64::NAN, 0.04];
        let m = InformationCoefficientCalculator::calculate(&pred, &actual, None).unwrap();
        assert_eq!(m.sample_size, 3);
        assert_eq!(m.excluded_pairs, 2);
    }

    #[test]
    fn test_too_few_valid_pairs() {
        let err = InformationCoefficientCalculator::calculate(&[0.1, f64::NAN], &[0.2, 0.3], None)
            .unwrap_err();
        assert_eq!(err, StatsError::InsufficientData { n: 1 });
        assert!(err.is_insufficient_data());
    }

    #[test]
    fn test_length_mismatch() {
        let err = InformationCoefficientCalculator::calculate(&[0.1, 0.2], &[0.1], None).unwrap_err();
        assert!(matches!(err, StatsError::DimensionMismatch { .. }));

        let periods = labels(&["a"]);
        let err = InformationCoefficientCalculator::calculate(&[0.1, 0.2], &[0.1, 0.2], Some(&periods))
            .unwrap_err();
        assert!(matches!(err, StatsError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_constant_predictions_give_nan_correlations() {
        let m = InformationCoefficientCalculator::calculate(&[0.5; 5], &[0.1, -0.2, 0.3, 0.0, 0.1], None)
            .unwrap();
        assert!(m.pearson.is_nan());
        assert!(m.spearman.is_nan());
    }

    #[test]
    fn test_per_period_summary() {
        // Period a: perfect positive, period b: perfect negative, period c: one pair
        let pred = [1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 1.0];
        let actual = [0.1, 0.2, 0.3, 0.3, 0.2, 0.1, 0.5];
        let periods = labels(&["a", "a", "a", "b", "b", "b", "c"]);
        let m = InformationCoefficientCalculator::calculate(&pred, &actual, Some(&periods)).unwrap();

        assert_eq!(m.period_ics.len(), 3);
        assert!(m.period_ics[2].ic.is_nan());
        assert_eq!(m.periods_evaluated, 2);
        assert!(m.ic_mean.abs() < 1e-12);
        assert!((m.ic_std - 2.0_f64.sqrt()).abs() < 1e-9);
        assert!(m.ic_information_ratio.abs() < 1e-9);
        assert_eq!(m.positive_period_ratio, 0.5);
    }

    #[test]
    fn test_single_period_has_no_information_ratio() {
        let pred = [1.0, 2.0, 3.0];
        let actual = [0.1, 0.3, 0.2];
        let periods = labels(&["2024-01", "2024-01", "2024-01"]);
        let m = InformationCoefficientCalculator::calculate(&pred, &actual, Some(&periods)).unwrap();
        assert_eq!(m.periods_evaluated, 1);
        assert!(m.ic_mean.is_finite());
        assert!(m.ic_std.is_nan());
        assert!(m.ic_information_ratio.is_nan());
    }

    #[test]
    fn test_consistent_periods_have_positive_t_stat() {
        let mut pred = Vec::new();
        let mut actual = Vec::new();
        let mut periods = Vec::new();
        for p in 0..6 {
            for i in 0..10 {
                let score = i as f64;
                pred.push(score);
                // Noise term varies by period so the ICs are not identical
                actual.push(score + ((i * (p + 1)) % 7) as f64);
                periods.push(format!("p{p}"));
            }
        }
        let m = InformationCoefficientCalculator::calculate(&pred, &actual, Some(&periods)).unwrap();
        assert_eq!(m.periods_evaluated, 6);
        assert!(m.ic_mean > 0.0);
        assert!(m.ic_t_stat > 0.0);
        assert_eq!(m.positive_period_ratio, 1.0);
    }
}
