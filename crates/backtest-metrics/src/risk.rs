use eval_core::stats::descriptive::{finite_values, mean, quantile, sample_std, ZERO_TOLERANCE};

use crate::models::RiskMetrics;

/// Minimum observations before the tail estimates are reported.
const MIN_TAIL_SAMPLES: usize = 10;

pub struct RiskMetricsCalculator;

impl RiskMetricsCalculator {
    /// Risk statistics of a periodic return series.
    ///
    /// `returns` are simple decimal returns in chronological order. Non-finite
    /// entries are dropped first; an empty series yields
    /// [`RiskMetrics::empty`]. `risk_free_rate` is annual and is converted to
    /// a per-period hurdle for the downside deviation.
    pub fn calculate(returns: &[f64], risk_free_rate: f64, periods_per_year: u32) -> RiskMetrics {
        let returns = finite_values(returns);
        if returns.is_empty() {
            return RiskMetrics::empty();
        }

        let n = returns.len() as f64;
        let ppy = periods_per_year.max(1) as f64;

        let growth: f64 = returns.iter().map(|r| 1.0 + r).product();
        let total_return = growth - 1.0;
        let annualized_return = annualize(growth, returns.len(), ppy);
        let mean_return = mean(&returns);

        // NaN below two observations, exactly zero for a constant series
        let volatility = sample_std(&returns) * ppy.sqrt();

        let hurdle = risk_free_rate / ppy;
        let downside_sq: f64 = returns
            .iter()
            .map(|r| (r - hurdle).min(0.0).powi(2))
            .sum();
        let downside_deviation = (downside_sq / n).sqrt() * ppy.sqrt();

        let excess_return = mean_return * ppy - risk_free_rate;
        let sharpe_ratio = safe_ratio(excess_return, volatility);
        let sortino_ratio = safe_ratio(excess_return, downside_deviation);

        let max_drawdown = max_drawdown(&returns);
        let calmar_ratio = if max_drawdown == 0.0 {
            f64::NAN
        } else {
            safe_ratio(annualized_return, max_drawdown.abs())
        };

        let wins = returns.iter().filter(|r| **r > 0.0).count();
        let win_rate = wins as f64 / n;

        let gross_profit: f64 = returns.iter().filter(|r| **r > 0.0).sum();
        let gross_loss: f64 = returns.iter().filter(|r| **r < 0.0).map(|r| r.abs()).sum();
        let profit_factor = if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else if gross_profit > 0.0 {
            f64::INFINITY
        } else {
            f64::NAN
        };

        let (value_at_risk_95, conditional_var_95) = historical_tail(&returns, 0.05);

        RiskMetrics {
            total_return,
            annualized_return,
            mean_return,
            volatility,
            downside_deviation,
            max_drawdown,
            sharpe_ratio,
            sortino_ratio,
            calmar_ratio,
            win_rate,
            profit_factor,
            skewness: skewness(&returns),
            excess_kurtosis: excess_kurtosis(&returns),
            value_at_risk_95,
            conditional_var_95,
            num_periods: returns.len(),
        }
    }
}

/// NaN when either side is non-finite or the denominator is zero.
fn safe_ratio(numerator: f64, denominator: f64) -> f64 {
    if !numerator.is_finite() || !denominator.is_finite() || denominator.abs() < ZERO_TOLERANCE {
        f64::NAN
    } else {
        numerator / denominator
    }
}

fn annualize(growth: f64, periods: usize, periods_per_year: f64) -> f64 {
    if growth == 0.0 {
        return -1.0;
    }
    if growth < 0.0 {
        return f64::NAN;
    }
    let years = periods as f64 / periods_per_year;
    growth.powf(1.0 / years) - 1.0
}

/// Peak-to-trough decline of the equity curve that starts at 1.0.
pub fn max_drawdown(returns: &[f64]) -> f64 {
    let mut equity = 1.0_f64;
    let mut peak = 1.0_f64;
    let mut worst = 0.0_f64;
    for r in returns {
        equity *= 1.0 + r;
        if equity > peak {
            peak = equity;
        }
        let drawdown = equity / peak - 1.0;
        if drawdown < worst {
            worst = drawdown;
        }
    }
    worst
}

fn central_moments(returns: &[f64]) -> (f64, f64, f64) {
    let n = returns.len() as f64;
    let mu = returns.iter().sum::<f64>() / n;
    let m2 = returns.iter().map(|r| (r - mu).powi(2)).sum::<f64>() / n;
    let m3 = returns.iter().map(|r| (r - mu).powi(3)).sum::<f64>() / n;
    let m4 = returns.iter().map(|r| (r - mu).powi(4)).sum::<f64>() / n;
    (m2, m3, m4)
}

fn skewness(returns: &[f64]) -> f64 {
    if returns.len() < 3 {
        return f64::NAN;
    }
    let (m2, m3, _) = central_moments(returns);
    let std = m2.sqrt();
    if std > 1e-15 {
        m3 / std.powi(3)
    } else {
        f64::NAN
    }
}

fn excess_kurtosis(returns: &[f64]) -> f64 {
    if returns.len() < 4 {
        return f64::NAN;
    }
    let (m2, _, m4) = central_moments(returns);
    if m2 > 1e-15 {
        m4 / m2.powi(2) - 3.0
    } else {
        f64::NAN
    }
}

/// Historical VaR and CVaR at the `alpha` tail.
fn historical_tail(returns: &[f64], alpha: f64) -> (f64, f64) {
    if returns.len() < MIN_TAIL_SAMPLES {
        return (f64::NAN, f64::NAN);
    }
    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let var = quantile(&sorted, alpha);
    let tail: Vec<f64> = sorted.iter().copied().filter(|r| *r <= var).collect();
    let cvar = if tail.is_empty() { var } else { mean(&tail) };
    (var, cvar)
}
