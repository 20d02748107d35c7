use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use eval_core::sentinel;
use serde::{Deserialize, Serialize};

use crate::error::{EvaluationError, Result};

fn nan() -> f64 {
    f64::NAN
}

// =============================================================================
// Parameters
// =============================================================================

/// Knobs shared by a primary evaluation and every baseline it is compared to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationParams {
    /// Evaluate only the K highest-scored snapshots (per period when every
    /// snapshot carries a period label). `None` selects everything.
    #[serde(default)]
    pub top_k: Option<usize>,
    /// Annual risk-free rate as a decimal (0.02 = 2%).
    #[serde(default)]
    pub risk_free_rate: f64,
    #[serde(default = "default_periods_per_year")]
    pub periods_per_year: u32,
    #[serde(default)]
    pub include_classification: bool,
}

fn default_periods_per_year() -> u32 {
    252
}

impl Default for EvaluationParams {
    fn default() -> Self {
        Self {
            top_k: None,
            risk_free_rate: 0.0,
            periods_per_year: default_periods_per_year(),
            include_classification: false,
        }
    }
}

impl EvaluationParams {
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_risk_free_rate(mut self, rate: f64) -> Self {
        self.risk_free_rate = rate;
        self
    }

    pub fn with_periods_per_year(mut self, periods: u32) -> Self {
        self.periods_per_year = periods;
        self
    }

    pub fn with_classification(mut self, enabled: bool) -> Self {
        self.include_classification = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.top_k == Some(0) {
            return Err(EvaluationError::InvalidParams(
                "top_k must be at least 1".to_string(),
            ));
        }
        if self.periods_per_year == 0 {
            return Err(EvaluationError::InvalidParams(
                "periods_per_year must be positive".to_string(),
            ));
        }
        if !self.risk_free_rate.is_finite() {
            return Err(EvaluationError::InvalidParams(format!(
                "risk_free_rate must be finite, got {}",
                self.risk_free_rate
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Risk
// =============================================================================

/// Return and risk statistics of a return series.
///
/// Ratios are annualized using `periods_per_year`. A ratio whose denominator
/// is zero is NaN, except `profit_factor` which is +Infinity when there are
/// gains and no losses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    #[serde(with = "sentinel")]
    pub total_return: f64,
    #[serde(with = "sentinel")]
    pub annualized_return: f64,
    #[serde(with = "sentinel")]
    pub mean_return: f64,
    #[serde(with = "sentinel")]
    pub volatility: f64,
    #[serde(with = "sentinel")]
    pub downside_deviation: f64,
    /// Largest peak-to-trough decline of the compounded equity curve, <= 0.
    #[serde(with = "sentinel")]
    pub max_drawdown: f64,
    #[serde(with = "sentinel")]
    pub sharpe_ratio: f64,
    #[serde(with = "sentinel")]
    pub sortino_ratio: f64,
    #[serde(with = "sentinel")]
    pub calmar_ratio: f64,
    #[serde(with = "sentinel")]
    pub win_rate: f64,
    #[serde(with = "sentinel")]
    pub profit_factor: f64,
    #[serde(with = "sentinel", default = "nan")]
    pub skewness: f64,
    #[serde(with = "sentinel", default = "nan")]
    pub excess_kurtosis: f64,
    /// 5th percentile of period returns (historical VaR at 95%).
    #[serde(with = "sentinel", default = "nan")]
    pub value_at_risk_95: f64,
    /// Mean of the returns at or below `value_at_risk_95`.
    #[serde(with = "sentinel", default = "nan")]
    pub conditional_var_95: f64,
    pub num_periods: usize,
}

impl RiskMetrics {
    /// Metrics of an empty series.
    pub fn empty() -> Self {
        Self {
            total_return: f64::NAN,
            annualized_return: f64::NAN,
            mean_return: f64::NAN,
            volatility: f64::NAN,
            downside_deviation: f64::NAN,
            max_drawdown: 0.0,
            sharpe_ratio: f64::NAN,
            sortino_ratio: f64::NAN,
            calmar_ratio: f64::NAN,
            win_rate: f64::NAN,
            profit_factor: f64::NAN,
            skewness: f64::NAN,
            excess_kurtosis: f64::NAN,
            value_at_risk_95: f64::NAN,
            conditional_var_95: f64::NAN,
            num_periods: 0,
        }
    }

    /// Named numeric fields, in a stable order.
    pub fn fields(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("total_return", self.total_return),
            ("annualized_return", self.annualized_return),
            ("mean_return", self.mean_return),
            ("volatility", self.volatility),
            ("downside_deviation", self.downside_deviation),
            ("max_drawdown", self.max_drawdown),
            ("sharpe_ratio", self.sharpe_ratio),
            ("sortino_ratio", self.sortino_ratio),
            ("calmar_ratio", self.calmar_ratio),
            ("win_rate", self.win_rate),
            ("profit_factor", self.profit_factor),
            ("skewness", self.skewness),
            ("excess_kurtosis", self.excess_kurtosis),
            ("value_at_risk_95", self.value_at_risk_95),
            ("conditional_var_95", self.conditional_var_95),
            ("num_periods", self.num_periods as f64),
        ]
    }
}

// =============================================================================
// Information coefficient
// =============================================================================

/// Cross-sectional IC of a single period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodIc {
    pub period: String,
    /// NaN when the period has fewer than two pairs or constant input.
    #[serde(with = "sentinel")]
    pub ic: f64,
    pub sample_size: usize,
}

/// Rank and linear association between predicted scores and realized returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IcMetrics {
    #[serde(with = "sentinel")]
    pub pearson: f64,
    #[serde(with = "sentinel")]
    pub pearson_p_value: f64,
    #[serde(with = "sentinel")]
    pub spearman: f64,
    #[serde(with = "sentinel")]
    pub spearman_p_value: f64,
    #[serde(with = "sentinel")]
    pub kendall_tau: f64,
    #[serde(with = "sentinel")]
    pub kendall_p_value: f64,
    /// Fraction of pairs whose prediction and outcome share a sign.
    #[serde(with = "sentinel")]
    pub hit_rate: f64,
    /// Mean per-period IC, or the pooled Pearson IC without periods.
    #[serde(with = "sentinel")]
    pub ic_mean: f64,
    #[serde(with = "sentinel")]
    pub ic_std: f64,
    #[serde(with = "sentinel")]
    pub ic_information_ratio: f64,
    #[serde(with = "sentinel", default = "nan")]
    pub ic_t_stat: f64,
    #[serde(with = "sentinel", default = "nan")]
    pub positive_period_ratio: f64,
    pub sample_size: usize,
    #[serde(default)]
    pub excluded_pairs: usize,
    #[serde(default)]
    pub periods_evaluated: usize,
    #[serde(default)]
    pub period_ics: Vec<PeriodIc>,
}

impl IcMetrics {
    pub fn fields(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("pearson", self.pearson),
            ("pearson_p_value", self.pearson_p_value),
            ("spearman", self.spearman),
            ("spearman_p_value", self.spearman_p_value),
            ("kendall_tau", self.kendall_tau),
            ("kendall_p_value", self.kendall_p_value),
            ("hit_rate", self.hit_rate),
            ("mean", self.ic_mean),
            ("std", self.ic_std),
            ("information_ratio", self.ic_information_ratio),
            ("t_stat", self.ic_t_stat),
            ("positive_period_ratio", self.positive_period_ratio),
            ("sample_size", self.sample_size as f64),
            ("excluded_pairs", self.excluded_pairs as f64),
            ("periods_evaluated", self.periods_evaluated as f64),
        ]
    }
}

// =============================================================================
// Classification
// =============================================================================

/// Direction-call quality: a positive score is a call for a positive return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    #[serde(with = "sentinel")]
    pub accuracy: f64,
    #[serde(with = "sentinel")]
    pub precision: f64,
    #[serde(with = "sentinel")]
    pub recall: f64,
    #[serde(with = "sentinel")]
    pub f1_score: f64,
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

impl ClassificationMetrics {
    /// Pairs with a non-finite side are skipped.
    pub fn from_pairs(predictions: &[f64], actuals: &[f64]) -> Self {
        let (mut tp, mut fp, mut tn, mut fneg) = (0usize, 0usize, 0usize, 0usize);
        for (&p, &a) in predictions.iter().zip(actuals) {
            if !p.is_finite() || !a.is_finite() {
                continue;
            }
            match (p > 0.0, a > 0.0) {
                (true, true) => tp += 1,
                (true, false) => fp += 1,
                (false, false) => tn += 1,
                (false, true) => fneg += 1,
            }
        }

        let total = tp + fp + tn + fneg;
        let accuracy = fraction(tp + tn, total);
        let precision = fraction(tp, tp + fp);
        let recall = fraction(tp, tp + fneg);
        let f1_score = if precision.is_finite() && recall.is_finite() && precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            f64::NAN
        };

        Self {
            accuracy,
            precision,
            recall,
            f1_score,
            true_positives: tp,
            false_positives: fp,
            true_negatives: tn,
            false_negatives: fneg,
        }
    }

    pub fn fields(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("accuracy", self.accuracy),
            ("precision", self.precision),
            ("recall", self.recall),
            ("f1_score", self.f1_score),
        ]
    }
}

fn fraction(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        f64::NAN
    } else {
        numerator as f64 / denominator as f64
    }
}

// =============================================================================
// Baseline comparison
// =============================================================================

/// Primary-minus-baseline differences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    /// Difference in Pearson IC.
    #[serde(with = "sentinel")]
    pub ic_improvement: f64,
    #[serde(with = "sentinel")]
    pub sharpe_improvement: f64,
    /// Difference in annualized return.
    #[serde(with = "sentinel")]
    pub return_improvement: f64,
    /// True only when the Sharpe improvement is defined and positive.
    pub risk_adjusted_better: bool,
}

impl ComparisonResult {
    pub fn fields(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("ic_improvement", self.ic_improvement),
            ("sharpe_improvement", self.sharpe_improvement),
            ("return_improvement", self.return_improvement),
            (
                "risk_adjusted_better",
                if self.risk_adjusted_better { 1.0 } else { 0.0 },
            ),
        ]
    }
}

// =============================================================================
// Run metadata
// =============================================================================

/// How the evaluated return series was assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// One series of individual returns ordered by timestamp.
    Pooled,
    /// One equal-weighted return per period label.
    PerPeriod,
}

impl SelectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionMode::Pooled => "pooled",
            SelectionMode::PerPeriod => "per_period",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetadata {
    pub params: EvaluationParams,
    pub selection: SelectionMode,
    pub snapshot_count: usize,
    pub resolved_count: usize,
    /// Snapshots that entered the return series.
    pub selected_count: usize,
    pub computed_at: DateTime<Utc>,
}

/// Baseline results that could not be computed, keyed by baseline name.
pub type BaselineFailures = BTreeMap<String, String>;
