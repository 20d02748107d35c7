//! Two-sample distribution comparison: Kolmogorov–Smirnov, Population
//! Stability Index and chi-square homogeneity.
//!
//! Non-finite observations are ignored by every test here; a sample that is
//! empty after filtering is `InsufficientData`.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};

use super::descriptive::{finite_values, quantile};
use crate::StatsError;

/// Default number of reference-quantile bins for PSI.
pub const DEFAULT_PSI_BINS: usize = 10;

/// Added to every bin share so empty bins never produce ln(0) or x/0.
pub const PSI_EPSILON: f64 = 1e-6;

/// Two-sample Kolmogorov–Smirnov result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KsResult {
    /// Largest absolute gap between the two empirical CDFs, in [0, 1].
    #[serde(with = "crate::sentinel")]
    pub statistic: f64,
    #[serde(with = "crate::sentinel")]
    pub p_value: f64,
}

/// Chi-square homogeneity result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChiSquareResult {
    #[serde(with = "crate::sentinel")]
    pub statistic: f64,
    #[serde(with = "crate::sentinel")]
    pub p_value: f64,
    pub degrees_of_freedom: usize,
}

/// Conventional PSI interpretation bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PsiBand {
    /// PSI < 0.1
    Stable,
    /// 0.1 ≤ PSI ≤ 0.2
    Moderate,
    /// PSI > 0.2
    Significant,
}

impl PsiBand {
    pub fn from_psi(psi: f64) -> Self {
        if psi > 0.2 {
            PsiBand::Significant
        } else if psi >= 0.1 {
            PsiBand::Moderate
        } else {
            PsiBand::Stable
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PsiBand::Stable => "stable",
            PsiBand::Moderate => "moderate",
            PsiBand::Significant => "significant",
        }
    }
}

fn sorted_finite(sample: &[f64]) -> Result<Vec<f64>, StatsError> {
    let mut values = finite_values(sample);
    if values.is_empty() {
        return Err(StatsError::InsufficientData { n: 0 });
    }
    values.sort_by(|a, b| a.total_cmp(b));
    Ok(values)
}

/// Two-sample Kolmogorov–Smirnov test.
///
/// The p-value uses the asymptotic Kolmogorov distribution with Stephens'
/// effective-sample-size correction.
pub fn ks_test(reference: &[f64], current: &[f64]) -> Result<KsResult, StatsError> {
    let a = sorted_finite(reference)?;
    let b = sorted_finite(current)?;
    let (n, m) = (a.len(), b.len());

    let mut i = 0;
    let mut j = 0;
    let mut statistic = 0.0_f64;
    while i < n && j < m {
        let x = if a[i] <= b[j] { a[i] } else { b[j] };
        while i < n && a[i] <= x {
            i += 1;
        }
        while j < m && b[j] <= x {
            j += 1;
        }
        let gap = (i as f64 / n as f64 - j as f64 / m as f64).abs();
        statistic = statistic.max(gap);
    }

    let effective_n = ((n * m) as f64 / (n + m) as f64).sqrt();
    let lambda = (effective_n + 0.12 + 0.11 / effective_n) * statistic;

    Ok(KsResult {
        statistic,
        p_value: kolmogorov_survival(lambda),
    })
}

/// Q_KS(λ) = 2 Σ (−1)^(j−1) exp(−2 j² λ²).
fn kolmogorov_survival(lambda: f64) -> f64 {
    if lambda < 1e-3 {
        return 1.0;
    }
    let exponent = -2.0 * lambda * lambda;
    let mut sign = 2.0;
    let mut sum = 0.0;
    let mut previous = 0.0_f64;
    for j in 1..=100 {
        let jf = j as f64;
        let term = sign * (exponent * jf * jf).exp();
        sum += term;
        if term.abs() <= 1e-3 * previous || term.abs() <= 1e-8 * sum.abs() {
            return sum.clamp(0.0, 1.0);
        }
        sign = -sign;
        previous = term.abs();
    }
    // No convergence: the two samples are indistinguishable.
    1.0
}

/// Population Stability Index of `current` against `reference`.
///
/// Bins are cut at the reference sample's quantiles (duplicate edges from
/// heavily tied data are merged), so each bin holds roughly 1/`num_bins` of
/// the reference. PSI = Σ (cur% − ref%) · ln(cur% / ref%).
pub fn population_stability_index(
    reference: &[f64],
    current: &[f64],
    num_bins: usize,
) -> Result<f64, StatsError> {
    if num_bins < 2 {
        return Err(StatsError::InvalidParameter(format!(
            "PSI needs at least 2 bins, got {num_bins}"
        )));
    }
    let reference = sorted_finite(reference)?;
    let current = finite_values(current);
    if current.is_empty() {
        return Err(StatsError::InsufficientData { n: 0 });
    }

    let mut edges: Vec<f64> = (1..num_bins)
        .map(|k| quantile(&reference, k as f64 / num_bins as f64))
        .collect();
    edges.dedup();

    let ref_counts = bin_counts(&reference, &edges);
    let cur_counts = bin_counts(&current, &edges);
    let ref_total = reference.len() as f64;
    let cur_total = current.len() as f64;

    let psi = ref_counts
        .iter()
        .zip(&cur_counts)
        .map(|(&r, &c)| {
            let ref_pct = r as f64 / ref_total + PSI_EPSILON;
            let cur_pct = c as f64 / cur_total + PSI_EPSILON;
            (cur_pct - ref_pct) * (cur_pct / ref_pct).ln()
        })
        .sum::<f64>();

    Ok(psi.max(0.0))
}

/// Bin `i` covers (edges[i-1], edges[i]]; the outer bins are open-ended.
fn bin_counts(values: &[f64], edges: &[f64]) -> Vec<u64> {
    let mut counts = vec![0_u64; edges.len() + 1];
    for v in values {
        let idx = edges.partition_point(|e| *e < *v);
        counts[idx] += 1;
    }
    counts
}

/// Chi-square test of homogeneity between two category-count vectors.
///
/// Both vectors index the same categories. Categories empty in both samples
/// are dropped before computing degrees of freedom.
pub fn chi_square_test(
    reference_counts: &[u64],
    current_counts: &[u64],
) -> Result<ChiSquareResult, StatsError> {
    if reference_counts.len() != current_counts.len() {
        return Err(StatsError::UnequalLengths {
            left: reference_counts.len(),
            right: current_counts.len(),
        });
    }
    let columns: Vec<(f64, f64)> = reference_counts
        .iter()
        .zip(current_counts)
        .filter(|(r, c)| **r + **c > 0)
        .map(|(r, c)| (*r as f64, *c as f64))
        .collect();
    if columns.len() < 2 {
        return Err(StatsError::InsufficientData { n: columns.len() });
    }

    let ref_total: f64 = columns.iter().map(|(r, _)| r).sum();
    let cur_total: f64 = columns.iter().map(|(_, c)| c).sum();
    if ref_total == 0.0 || cur_total == 0.0 {
        return Err(StatsError::InsufficientData { n: 0 });
    }
    let grand_total = ref_total + cur_total;

    let statistic = columns
        .iter()
        .map(|(r, c)| {
            let column_total = r + c;
            let expected_ref = column_total * ref_total / grand_total;
            let expected_cur = column_total * cur_total / grand_total;
            (r - expected_ref).powi(2) / expected_ref + (c - expected_cur).powi(2) / expected_cur
        })
        .sum::<f64>();

    let degrees_of_freedom = columns.len() - 1;
    let p_value = match ChiSquared::new(degrees_of_freedom as f64) {
        Ok(dist) => (1.0 - dist.cdf(statistic)).clamp(0.0, 1.0),
        Err(_) => f64::NAN,
    };

    Ok(ChiSquareResult {
        statistic,
        p_value,
        degrees_of_freedom,
    })
}
